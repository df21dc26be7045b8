//! Local audit trail of signed operations.

use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Oldest entries are dropped beyond this many.
pub const MAX_AUDIT_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    /// Unix seconds.
    pub timestamp: u64,
    pub operation: String,
    /// Wallet address that signed the operation, if any.
    pub actor: Option<String>,
    pub details: Value,
}

/// Criteria for [`AuditLog::entries`]; empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub operation: Option<String>,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        self.start.map_or(true, |start| entry.timestamp >= start)
            && self.end.map_or(true, |end| entry.timestamp <= end)
            && self
                .operation
                .as_deref()
                .map_or(true, |op| entry.operation == op)
    }
}

#[derive(Debug)]
pub struct AuditLog {
    enabled: bool,
    entries: Mutex<VecDeque<AuditEntry>>,
}

impl AuditLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Append an entry. Returns its id, or `None` when logging is disabled.
    pub async fn record(&self, operation: &str, actor: Option<String>, details: Value) -> Option<Uuid> {
        if !self.enabled {
            return None;
        }

        let entry = AuditEntry {
            id: Uuid::new_v4(),
            timestamp: unix_now(),
            operation: operation.to_string(),
            actor,
            details,
        };
        let id = entry.id;

        let mut entries = self.entries.lock().await;
        if entries.len() >= MAX_AUDIT_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(entry);
        tracing::debug!(operation, id = %id, "Audit entry recorded");
        Some(id)
    }

    pub async fn entries(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
