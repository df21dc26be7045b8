//! HelloMoon Solana data API: REST queries plus WebSocket subscriptions.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::schema::HelloMoonConfig;
use crate::error::{ApiError, ApiResult};
use crate::http::{segment, ApiRequest, RequestPipeline};
use crate::resilience::timeouts::with_timeout;

/// SPL token program, the default owner program for token account lookups.
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Pagination for the NFT marketplace feeds.
#[derive(Debug, Clone)]
pub struct MarketQuery {
    pub collection_id: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for MarketQuery {
    fn default() -> Self {
        Self {
            collection_id: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

#[derive(Debug)]
pub struct HelloMoonClient {
    pipeline: RequestPipeline,
    ws_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HelloMoonClient {
    pub fn new(config: HelloMoonConfig) -> ApiResult<Self> {
        let pipeline = RequestPipeline::new("hellomoon", &config.client)?;
        Ok(Self {
            pipeline,
            ws_url: config.ws_url,
            api_key: config.client.api_key,
            timeout: Duration::from_secs(config.client.timeout_secs),
        })
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub async fn get_account_info(&self, address: &str) -> ApiResult<Value> {
        let address = segment("address", address)?;
        self.pipeline.execute(ApiRequest::get(format!("account/{address}"))).await
    }

    pub async fn get_transaction(&self, signature: &str) -> ApiResult<Value> {
        let signature = segment("signature", signature)?;
        self.pipeline.execute(ApiRequest::get(format!("transaction/{signature}"))).await
    }

    pub async fn get_token_metadata(&self, mint: &str) -> ApiResult<Value> {
        let mint = segment("mint", mint)?;
        self.pipeline.execute(ApiRequest::get(format!("token/{mint}/metadata"))).await
    }

    pub async fn get_nft_metadata(&self, mint: &str) -> ApiResult<Value> {
        let mint = segment("mint", mint)?;
        self.pipeline.execute(ApiRequest::get(format!("nft/{mint}/metadata"))).await
    }

    pub async fn get_nft_collection(&self, collection_address: &str) -> ApiResult<Value> {
        let collection = segment("collection_address", collection_address)?;
        self.pipeline.execute(ApiRequest::get(format!("nft/collection/{collection}"))).await
    }

    pub async fn get_market_data(&self, mint: &str) -> ApiResult<Value> {
        let mint = segment("mint", mint)?;
        self.pipeline.execute(ApiRequest::get(format!("market/{mint}"))).await
    }

    /// Historical price points, e.g. `timeframe = "1d"` or `"1h"`.
    pub async fn get_token_price_history(&self, mint: &str, timeframe: &str, limit: u32) -> ApiResult<Value> {
        let mint = segment("mint", mint)?;
        let request = ApiRequest::get(format!("market/{mint}/history"))
            .query("timeframe", timeframe)
            .query("limit", limit);
        self.pipeline.execute(request).await
    }

    pub async fn get_token_holders(&self, mint: &str, limit: u32, offset: u32) -> ApiResult<Value> {
        let mint = segment("mint", mint)?;
        let request = ApiRequest::get(format!("token/{mint}/holders"))
            .query("limit", limit)
            .query("offset", offset);
        self.pipeline.execute(request).await
    }

    pub async fn get_token_transfers(&self, mint: &str, limit: u32, before: Option<&str>) -> ApiResult<Value> {
        let mint = segment("mint", mint)?;
        self.paged(format!("token/{mint}/transfers"), limit, before).await
    }

    pub async fn get_program_instructions(&self, program_id: &str, limit: u32, before: Option<&str>) -> ApiResult<Value> {
        let program_id = segment("program_id", program_id)?;
        self.paged(format!("program/{program_id}/instructions"), limit, before).await
    }

    pub async fn get_account_changes(&self, address: &str, limit: u32, before: Option<&str>) -> ApiResult<Value> {
        let address = segment("address", address)?;
        self.paged(format!("account/{address}/changes"), limit, before).await
    }

    pub async fn get_signatures_for_address(&self, address: &str, limit: u32, before: Option<&str>) -> ApiResult<Value> {
        let address = segment("address", address)?;
        self.paged(format!("signatures/{address}"), limit, before).await
    }

    async fn paged(&self, endpoint: String, limit: u32, before: Option<&str>) -> ApiResult<Value> {
        let request = ApiRequest::get(endpoint)
            .query("limit", limit)
            .query_opt("before", before);
        self.pipeline.execute(request).await
    }

    /// Token accounts owned by `owner`; `program_id` defaults to [`TOKEN_PROGRAM_ID`].
    pub async fn get_token_accounts(&self, owner: &str, program_id: Option<&str>) -> ApiResult<Value> {
        let owner = segment("owner", owner)?;
        let request = ApiRequest::get(format!("token/accounts/{owner}"))
            .query("programId", program_id.unwrap_or(TOKEN_PROGRAM_ID));
        self.pipeline.execute(request).await
    }

    pub async fn get_program_accounts(&self, program_id: &str, filters: Vec<Value>) -> ApiResult<Value> {
        let program_id = segment("program_id", program_id)?;
        let request = ApiRequest::post("program/accounts").json(json!({
            "programId": program_id,
            "filters": filters,
        }));
        self.pipeline.execute(request).await
    }

    pub async fn batch_get_accounts(&self, addresses: &[String]) -> ApiResult<Value> {
        if addresses.is_empty() {
            return Err(ApiError::invalid("addresses must not be empty"));
        }
        let request = ApiRequest::post("batch/accounts").json(json!({ "addresses": addresses }));
        self.pipeline.execute(request).await
    }

    pub async fn batch_get_transactions(&self, signatures: &[String]) -> ApiResult<Value> {
        if signatures.is_empty() {
            return Err(ApiError::invalid("signatures must not be empty"));
        }
        let request = ApiRequest::post("batch/transactions").json(json!({ "signatures": signatures }));
        self.pipeline.execute(request).await
    }

    pub async fn get_recent_sales(&self, query: &MarketQuery) -> ApiResult<Value> {
        self.market_feed("sales", query).await
    }

    pub async fn get_active_listings(&self, query: &MarketQuery) -> ApiResult<Value> {
        self.market_feed("listings", query).await
    }

    pub async fn get_active_offers(&self, query: &MarketQuery) -> ApiResult<Value> {
        self.market_feed("offers", query).await
    }

    pub async fn get_active_bids(&self, query: &MarketQuery) -> ApiResult<Value> {
        self.market_feed("bids", query).await
    }

    async fn market_feed(&self, endpoint: &str, query: &MarketQuery) -> ApiResult<Value> {
        let request = ApiRequest::get(endpoint)
            .query("limit", query.limit)
            .query("offset", query.offset)
            .query_opt("collection_id", query.collection_id.as_deref());
        self.pipeline.execute(request).await
    }

    /// Stream account updates for `address`.
    pub async fn subscribe_to_account(&self, address: &str) -> ApiResult<Subscription> {
        let address = segment("address", address)?;
        self.subscribe("accountSubscribe", address).await
    }

    /// Stream transfer events for the token `mint`.
    pub async fn subscribe_to_token_transfers(&self, mint: &str) -> ApiResult<Subscription> {
        let mint = segment("mint", mint)?;
        self.subscribe("tokenTransferSubscribe", mint).await
    }

    async fn subscribe(&self, method: &'static str, param: &str) -> ApiResult<Subscription> {
        let mut request = self
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| ApiError::invalid(format!("invalid ws_url {:?}: {e}", self.ws_url)))?;
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| ApiError::invalid("api_key contains invalid header characters"))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let mut stream = with_timeout(self.timeout, async {
            connect_async(request)
                .await
                .map(|(stream, _)| stream)
                .map_err(|e| ApiError::Network(format!("websocket connect failed: {e}")))
        })
        .await?;

        let message = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": [param],
        });
        stream
            .send(Message::Text(message.to_string().into()))
            .await
            .map_err(|e| ApiError::Network(format!("websocket send failed: {e}")))?;

        tracing::info!(service = "hellomoon", method, subject = param, "Subscription opened");
        Ok(Subscription { method, stream })
    }

    pub fn close(self) {
        self.pipeline.close();
    }
}

/// Live WebSocket subscription. Dropping it closes the socket.
pub struct Subscription {
    method: &'static str,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("method", &self.method).finish()
    }
}

impl Subscription {
    /// Next JSON event; `None` once the server closes the connection.
    pub async fn next_event(&mut self) -> Option<ApiResult<Value>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(text.as_str()).map_err(ApiError::from))
                }
                Ok(Message::Binary(bytes)) => {
                    return Some(serde_json::from_slice(&bytes).map_err(ApiError::from))
                }
                Ok(Message::Close(_)) => {
                    tracing::info!(method = self.method, "Subscription closed by server");
                    return None;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(method = self.method, error = %e, "Subscription error");
                    return Some(Err(ApiError::Network(e.to_string())));
                }
            }
        }
        None
    }

    pub async fn close(mut self) -> ApiResult<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ApiError::Network(format!("websocket close failed: {e}")))
    }
}
