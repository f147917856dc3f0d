//! `WsLogSubscriber`, the concrete `LogSubscriber` for EVM nodes using a JSON-RPC
//! WebSocket subscription (`eth_subscribe("logs", filter)`).
//!
//! Each subscription owns its own connection. Setup (connect, subscribe, wait
//! for the subscription id) happens inside `subscribe()`, so a setup failure
//! is reported to the caller and no stream is created. After that a
//! background task forwards notifications until the socket fails or the
//! subscription is closed.
//!
//! # Usage
//! ```no_run
//! use shieldlog_core::chains;
//! use shieldlog_stream::ws_subscriber::{WsLogSubscriber, WsSubscriberConfig};
//!
//! let subscriber = WsLogSubscriber::new(chains::anvil(), WsSubscriberConfig::default());
//! ```

use crate::subscriber::{ErrorTrigger, LogSubscriber, Subscription, SubscriptionHandle};
use async_trait::async_trait;
use futures::{stream::SplitSink, stream::SplitStream, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shieldlog_core::{
    error::{DecodeError, SubscriptionError},
    event::RawLog,
    Address, ChainEndpoint, B256,
};
use shieldlog_evm::TopicFilter;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

const SUBSCRIBE_REQUEST_ID: u64 = 1;
const UNSUBSCRIBE_REQUEST_ID: u64 = 2;

/// Timeouts for the WebSocket subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsSubscriberConfig {
    /// Upper bound on connect + `eth_subscribe` round trip
    #[serde(default = "default_setup_timeout_ms")]
    pub setup_timeout_ms: u64,
    /// Upper bound on `eth_unsubscribe` + socket close
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

fn default_setup_timeout_ms() -> u64 { 10_000 }
fn default_close_timeout_ms() -> u64 { 5_000 }

impl Default for WsSubscriberConfig {
    fn default() -> Self {
        Self {
            setup_timeout_ms: default_setup_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

/// EVM WebSocket log subscriber.
pub struct WsLogSubscriber {
    endpoint: ChainEndpoint,
    config: WsSubscriberConfig,
}

impl WsLogSubscriber {
    pub fn new(endpoint: ChainEndpoint, config: WsSubscriberConfig) -> Self {
        Self { endpoint, config }
    }

    fn setup_error(&self, reason: impl Into<String>) -> SubscriptionError {
        SubscriptionError::Setup {
            url: self.endpoint.url.clone(),
            reason: reason.into(),
        }
    }

    async fn establish(&self, filter: &TopicFilter) -> Result<(String, WsWrite, WsRead), SubscriptionError> {
        let url = url::Url::parse(&self.endpoint.url)
            .map_err(|e| self.setup_error(format!("invalid url: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(self.setup_error(format!("unsupported scheme '{}'", url.scheme())));
        }

        info!("Connecting to WebSocket: {}", self.endpoint.url);
        let (ws, _) = connect_async(self.endpoint.url.as_str())
            .await
            .map_err(|e| self.setup_error(e.to_string()))?;
        let (mut write, mut read) = ws.split();

        let sub_msg = serde_json::json!({
            "jsonrpc": "2.0",
            "id": SUBSCRIBE_REQUEST_ID,
            "method": "eth_subscribe",
            "params": ["logs", filter.to_rpc_params()]
        });
        write
            .send(Message::Text(sub_msg.to_string()))
            .await
            .map_err(|e| self.setup_error(format!("failed to send eth_subscribe: {e}")))?;

        // Wait for the subscription id
        while let Some(msg) = read.next().await {
            match msg {
                Err(e) => return Err(self.setup_error(e.to_string())),
                Ok(Message::Text(text)) => match parse_subscribe_response(&text) {
                    Some(Ok(id)) => return Ok((id, write, read)),
                    Some(Err(reason)) => return Err(self.setup_error(reason)),
                    None => debug!("ignoring pre-subscription message"),
                },
                Ok(Message::Ping(data)) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
            }
        }
        Err(self.setup_error("connection closed before subscription was confirmed"))
    }
}

#[async_trait]
impl LogSubscriber for WsLogSubscriber {
    fn endpoint(&self) -> &ChainEndpoint {
        &self.endpoint
    }

    async fn subscribe(&self, filter: &TopicFilter) -> Result<Subscription, SubscriptionError> {
        let setup_timeout = Duration::from_millis(self.config.setup_timeout_ms);
        let (id, write, read) = tokio::time::timeout(setup_timeout, self.establish(filter))
            .await
            .map_err(|_| self.setup_error(format!("timed out after {}ms", self.config.setup_timeout_ms)))??;

        info!(subscription = %id, url = %self.endpoint.url, "log subscription established");

        let (log_tx, log_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = oneshot::channel();
        let (close_tx, close_rx) = oneshot::channel();

        let task = tokio::spawn(run_ws_subscription(
            id.clone(),
            write,
            read,
            log_tx,
            err_tx,
            close_rx,
        ));

        Ok(Subscription::new(
            id,
            log_rx,
            err_rx,
            Box::new(WsHandle {
                close_tx,
                task,
                close_timeout: Duration::from_millis(self.config.close_timeout_ms),
            }),
        ))
    }
}

struct WsHandle {
    close_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
    close_timeout: Duration,
}

#[async_trait]
impl SubscriptionHandle for WsHandle {
    async fn unsubscribe(self: Box<Self>) -> Result<(), SubscriptionError> {
        // The task may already be gone after a runtime error; that is fine
        let _ = self.close_tx.send(());
        match tokio::time::timeout(self.close_timeout, self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SubscriptionError::Close { reason: e.to_string() }),
            Err(_) => Err(SubscriptionError::Close {
                reason: format!("timed out after {}ms", self.close_timeout.as_millis()),
            }),
        }
    }
}

// ─── Internal WebSocket loop ──────────────────────────────────────────────────

async fn run_ws_subscription(
    sub_id: String,
    mut write: WsWrite,
    mut read: WsRead,
    logs: mpsc::UnboundedSender<RawLog>,
    errors: ErrorTrigger,
    mut close_rx: oneshot::Receiver<()>,
) {
    let failure = loop {
        tokio::select! {
            // Resolves on close() and also when the Subscription is dropped
            _ = &mut close_rx => {
                let unsub = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": UNSUBSCRIBE_REQUEST_ID,
                    "method": "eth_unsubscribe",
                    "params": [sub_id]
                });
                if let Err(e) = write.send(Message::Text(unsub.to_string())).await {
                    debug!(error = %e, "eth_unsubscribe not sent");
                }
                let _ = write.close().await;
                info!(subscription = %sub_id, "log subscription closed");
                return;
            }
            msg = read.next() => match msg {
                None => break SubscriptionError::Closed,
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break SubscriptionError::Runtime { reason: e.to_string() };
                }
                Some(Ok(Message::Text(text))) => {
                    debug!("WS message: {}", text.chars().take(120).collect::<String>());
                    match parse_log_notification(&text, &sub_id) {
                        Some(Ok(log)) => {
                            if logs.send(log).is_err() {
                                debug!("log receiver dropped");
                            }
                        }
                        Some(Err(e)) => warn!(error = %e, "dropping malformed log notification"),
                        None => {}
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    // Respond to server pings to keep the connection alive
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    info!("WebSocket closed by server");
                    break SubscriptionError::Runtime { reason: "connection closed by server".into() };
                }
                Some(Ok(_)) => {} // binary / pong
            }
        }
    };

    error!(subscription = %sub_id, error = %failure, "log subscription failed");
    let _ = errors.send(failure);
}

// ─── Message parsing ─────────────────────────────────────────────────────────

/// Parse the response to our `eth_subscribe` request.
/// Returns `None` for unrelated messages.
fn parse_subscribe_response(text: &str) -> Option<Result<String, String>> {
    let v: Value = serde_json::from_str(text).ok()?;
    if v.get("id")?.as_u64()? != SUBSCRIBE_REQUEST_ID {
        return None;
    }
    if let Some(err) = v.get("error") {
        let code = err.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = err.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        return Some(Err(format!("RPC error {code}: {message}")));
    }
    match v.get("result").and_then(Value::as_str) {
        Some(id) => Some(Ok(id.to_string())),
        None => Some(Err("eth_subscribe returned no subscription id".into())),
    }
}

/// Parse an `eth_subscription` log notification into a `RawLog`.
/// Returns `None` for other subscriptions, other message kinds and removed logs.
fn parse_log_notification(text: &str, sub_id: &str) -> Option<Result<RawLog, DecodeError>> {
    let v: Value = serde_json::from_str(text).ok()?;

    if v.get("method")?.as_str()? != "eth_subscription" {
        return None;
    }
    let params = v.get("params")?;
    if params.get("subscription")?.as_str()? != sub_id {
        return None;
    }
    let result = params.get("result")?;

    // Skip reorged/removed logs
    if result.get("removed").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }

    Some(raw_log_from_json(result))
}

fn raw_log_from_json(result: &Value) -> Result<RawLog, DecodeError> {
    let invalid = |reason: String| DecodeError::InvalidRawLog { reason };

    let address = result
        .get("address")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing address".into()))?;
    let address = Address::from_str(address).map_err(|e| invalid(format!("address: {e}")))?;

    let topics = result
        .get("topics")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing topics".into()))?
        .iter()
        .map(|t| {
            t.as_str()
                .ok_or_else(|| invalid("topic is not a string".into()))
                .and_then(|s| B256::from_str(s).map_err(|e| invalid(format!("topic: {e}"))))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let data_hex = result.get("data").and_then(Value::as_str).unwrap_or("0x");
    let data = hex::decode(data_hex.strip_prefix("0x").unwrap_or(data_hex))
        .map_err(|e| invalid(format!("data: {e}")))?;

    let mut log = RawLog::new(address, topics, data);
    log.block_number = hex_u64(result.get("blockNumber"));
    log.log_index = hex_u64(result.get("logIndex"));
    log.transaction_hash = result
        .get("transactionHash")
        .and_then(Value::as_str)
        .and_then(|s| B256::from_str(s).ok());
    Ok(log)
}

fn hex_u64(v: Option<&Value>) -> Option<u64> {
    let h = v?.as_str()?;
    u64::from_str_radix(h.strip_prefix("0x").unwrap_or(h), 16).ok()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
