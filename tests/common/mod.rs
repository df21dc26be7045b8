//! Shared utilities for integration testing against local mock services.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use pipeiq::config::schema::{CacheConfig, ClientConfig, RateLimitConfig, RetryConfig, RetryStrategy};

/// One request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path including the query string.
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn query(&self) -> &str {
        self.target.split_once('?').map(|(_, q)| q).unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl MockResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: vec![("Content-Type".into(), "application/json".into())],
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Mock HTTP backend on an ephemeral port.
pub struct MockServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Start a programmable mock backend. `handler` sees every request in order.
pub async fn start_mock_backend<F>(handler: F) -> MockServer
where
    F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let recorded = requests.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let handler = handler.clone();
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let _ = serve_connection(socket, handler, recorded).await;
            });
        }
    });

    MockServer { addr, requests }
}

/// Backend that answers every request with the same JSON body.
pub async fn start_json_backend(status: u16, body: Value) -> MockServer {
    start_mock_backend(move |_| MockResponse::json(status, body.clone())).await
}

async fn serve_connection<F>(
    mut socket: TcpStream,
    handler: Arc<F>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()>
where
    F: Fn(&RecordedRequest) -> MockResponse,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let request = RecordedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    };
    let response = handler(&request);
    recorded.lock().unwrap().push(request);

    let mut raw = format!(
        "HTTP/1.1 {} Mock\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        response.body.len()
    );
    for (name, value) in &response.headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str("\r\n");
    raw.push_str(&response.body);

    socket.write_all(raw.as_bytes()).await?;
    socket.shutdown().await
}

/// What the WebSocket mock saw from its single client.
#[derive(Debug, Default, Clone)]
pub struct WsRecord {
    pub authorization: Option<String>,
    pub subscribe: Option<Value>,
}

/// WebSocket server that accepts one connection, records the handshake and
/// the first message, pushes `events` and then closes.
pub async fn start_ws_backend(events: Vec<Value>) -> (SocketAddr, Arc<Mutex<WsRecord>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let record = Arc::new(Mutex::new(WsRecord::default()));

    let seen = record.clone();
    tokio::spawn(async move {
        let Ok((socket, _)) = listener.accept().await else { return };
        let handshake_record = seen.clone();
        let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            handshake_record.lock().unwrap().authorization = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok(response)
        };
        let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, callback).await else { return };

        if let Some(Ok(Message::Text(text))) = ws.next().await {
            seen.lock().unwrap().subscribe = serde_json::from_str(text.as_str()).ok();
        }
        for event in events {
            if ws.send(Message::Text(event.to_string().into())).await.is_err() {
                return;
            }
        }
        let _ = ws.close(None).await;
    });

    (addr, record)
}

/// Client config pointed at a mock, tuned for fast tests: quick constant
/// retries, roomy rate limit, short timeout.
pub fn test_client_config(base_url: &str) -> ClientConfig {
    let mut config = ClientConfig::new(base_url).with_api_key("test-key");
    config.timeout_secs = 2;
    config.rate_limit = RateLimitConfig {
        requests_per_window: 1000,
        window_secs: 1,
        ..Default::default()
    };
    config.cache = CacheConfig::default();
    config.retries = RetryConfig {
        max_retries: 3,
        initial_delay_ms: 10,
        max_delay_ms: 50,
        strategy: RetryStrategy::Constant,
        ..Default::default()
    };
    config
}

/// A base URL nothing is listening on.
pub async fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
