use crate::error::DataError;
use futures_util::{SinkExt, StreamExt};
use helix_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::Message, Error as WsError},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

const IDLE_PING_TIMEOUT: Duration = Duration::from_secs(30);
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);
const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A single `{t(ms), o, h, l, c, v}` bar, the cache schema the engine's kline dispatcher
/// consumes (spec §4.B, §4.D Per-symbol kline dispatch).
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct Kline {
    pub open_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub is_closed: bool,
}

/// A decoded kline frame, already mapped back to its canonical symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct KlineUpdate {
    pub symbol: Symbol,
    pub kline: Kline,
}

/// How to subscribe and decode a specific venue's kline WebSocket protocol. Kept separate
/// from [`KlineStream`] so the reconnect/ping/backoff plumbing is shared across venues while
/// each venue's subscribe-message shape and frame layout stays adapter-owned.
pub trait KlineProtocol: Send + Sync {
    /// One subscribe message per registered symbol, sent immediately after connecting.
    fn subscribe_messages(&self, symbols: &[Symbol], interval: &str) -> Vec<Message>;

    /// Decode a text frame. Returns `None` for frames that aren't kline payloads (e.g.
    /// subscription acks), `Some(Err)` for a kline-shaped frame that failed to parse.
    fn decode(&self, text: &str) -> Option<Result<KlineUpdate, DataError>>;
}

/// Single WebSocket client fanning kline updates in for every registered symbol at one
/// interval (spec §4.B). One instance per live-trading engine.
pub struct KlineStream {
    url: String,
    symbols: Vec<Symbol>,
    interval: String,
    protocol: Arc<dyn KlineProtocol>,
    stop: Arc<AtomicBool>,
}

impl KlineStream {
    pub fn new(url: impl Into<String>, symbols: Vec<Symbol>, interval: impl Into<String>, protocol: Arc<dyn KlineProtocol>) -> Self {
        Self {
            url: url.into(),
            symbols,
            interval: interval.into(),
            protocol,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A clone of the stop flag; setting it causes the run loop's receive to return promptly,
    /// the socket to close, and the subscriptions map to be released (spec §4.B cancellation).
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Runs the reconnect loop until `stop_handle()` is set, forwarding every decoded
    /// [`KlineUpdate`] to `tx`.
    pub async fn run(self, tx: tokio::sync::mpsc::UnboundedSender<KlineUpdate>) {
        let mut backoff = BACKOFF_INITIAL;

        while !self.stop.load(Ordering::Relaxed) {
            match self.connect_and_subscribe().await {
                Ok(socket) => {
                    backoff = BACKOFF_INITIAL;
                    self.receive_loop(socket, &tx).await;
                }
                Err(error) => {
                    warn!(?error, url = %self.url, "failed to connect kline stream, backing off");
                }
            }

            if self.stop.load(Ordering::Relaxed) {
                break;
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(BACKOFF_MAX);
        }

        info!(url = %self.url, "kline stream stopped");
    }

    async fn connect_and_subscribe(&self) -> Result<WsStream, DataError> {
        let (mut socket, _) = connect_async(&self.url).await.map_err(DataError::from)?;

        for message in self.protocol.subscribe_messages(&self.symbols, &self.interval) {
            socket.send(message).await.map_err(DataError::from)?;
        }

        info!(url = %self.url, symbols = self.symbols.len(), "kline stream connected and subscribed");
        Ok(socket)
    }

    async fn receive_loop(&self, mut socket: WsStream, tx: &tokio::sync::mpsc::UnboundedSender<KlineUpdate>) {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                let _ = socket.close(None).await;
                return;
            }

            let next = tokio::time::timeout(RECEIVE_TIMEOUT, socket.next()).await;

            let frame = match next {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(error))) => {
                    warn!(?error, "kline stream socket error, reconnecting");
                    return;
                }
                Ok(None) => {
                    warn!("kline stream closed by remote, reconnecting");
                    return;
                }
                Err(_elapsed) => {
                    debug!("kline stream idle, sending ping");
                    if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                        return;
                    }
                    if tokio::time::timeout(IDLE_PING_TIMEOUT, socket.next()).await.is_err() {
                        warn!("kline stream pong timeout, reconnecting");
                        return;
                    }
                    continue;
                }
            };

            match frame {
                Message::Text(text) => {
                    let Some(result) = self.protocol.decode(text.as_str()) else {
                        continue;
                    };
                    match result {
                        Ok(update) => {
                            if tx.send(update).is_err() {
                                error!("kline update receiver dropped, stopping stream");
                                return;
                            }
                        }
                        Err(error) => warn!(?error, "failed to decode kline frame"),
                    }
                }
                Message::Ping(payload) => {
                    let _ = socket.send(Message::Pong(payload)).await;
                }
                Message::Close(_) => {
                    warn!("kline stream received close frame, reconnecting");
                    return;
                }
                _ => {}
            }
        }
    }
}

impl From<WsError> for DataError {
    fn from(error: WsError) -> Self {
        DataError::Transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProtocol;

    impl KlineProtocol for EchoProtocol {
        fn subscribe_messages(&self, symbols: &[Symbol], interval: &str) -> Vec<Message> {
            symbols
                .iter()
                .map(|symbol| Message::Text(format!("{{\"sub\":\"{symbol}@kline_{interval}\"}}").into()))
                .collect()
        }

        fn decode(&self, text: &str) -> Option<Result<KlineUpdate, DataError>> {
            if !text.contains("kline") {
                return None;
            }
            Some(Ok(KlineUpdate {
                symbol: Symbol::new("ETH_USDC_PERP"),
                kline: Kline {
                    open_time_ms: 0,
                    open: Decimal::ZERO,
                    high: Decimal::ZERO,
                    low: Decimal::ZERO,
                    close: Decimal::ZERO,
                    volume: Decimal::ZERO,
                    is_closed: true,
                },
            }))
        }
    }

    #[test]
    fn subscribe_messages_one_per_symbol() {
        let protocol = EchoProtocol;
        let symbols = vec![Symbol::new("ETH_USDC_PERP"), Symbol::new("BTC_USDC_PERP")];
        let messages = protocol.subscribe_messages(&symbols, "15m");
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn decode_ignores_non_kline_frames() {
        let protocol = EchoProtocol;
        assert!(protocol.decode("{\"result\":null,\"id\":1}").is_none());
        assert!(protocol.decode("{\"e\":\"kline\"}").is_some());
    }

    #[tokio::test]
    async fn stop_flag_is_shared_via_handle() {
        let stream = KlineStream::new("wss://example.invalid", vec![Symbol::new("ETH_USDC_PERP")], "15m", Arc::new(EchoProtocol));
        let handle = stream.stop_handle();
        assert!(!handle.load(Ordering::Relaxed));
        handle.store(true, Ordering::Relaxed);
        assert!(stream.stop.load(Ordering::Relaxed));
    }
}
