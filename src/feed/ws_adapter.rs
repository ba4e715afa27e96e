//! Reference [`Provider`] implementation: JSON-over-WebSocket streaming
//! plus an HTTP side channel for synchronous `Get` pulls (`spec.md` §4.4).
//! The teacher has no networking code of its own; the reconnect-loop shape
//! is grounded on `usealtoal-edgelord/src/infrastructure/exchange/reconnecting.rs`
//! and the normalized-message decoding on
//! `hot3246624-pm_as_ofi/src/polymarket/messages.rs`.

use crate::distributor::event::EventPayload;
use crate::distributor::provider::{Provider, ProviderCallback, ProviderError};
use crate::distributor::subscription::{DataType, Interval};
use crate::engine::book::{BookSnapshot, LevelAgg};
use crate::feed::messages::{OutboundFrame, RawFeedMessage, RawLevel};
use crate::feed::reconnect::{Backoff, ReconnectConfig};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// The transport stream type for the reference adapter: plain or
/// TLS-wrapped TCP, matched on by `tokio_tungstenite::connect_async`.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The channel name a (data-type, interval) pair is multiplexed onto on
/// the wire. Interval is folded into the channel name for OHLCV so a
/// single upstream connection can carry several candle widths.
fn channel_name(data_type: DataType, interval: Option<Interval>) -> String {
    match (data_type, interval) {
        (DataType::OrderBook, _) => "book".to_string(),
        (DataType::Trade, _) => "trade".to_string(),
        (DataType::Ticker, _) => "ticker".to_string(),
        (DataType::Ohlcv, Some(interval)) => format!("ohlcv.{}", interval.millis()),
        (DataType::Ohlcv, None) => "ohlcv".to_string(),
    }
}

#[derive(Default)]
struct SubscriptionEntry {
    refcount: usize,
    callbacks: Vec<Arc<dyn ProviderCallback>>,
}

struct AdapterState {
    name: String,
    subscriptions: DashMap<(String, DataType, Option<Interval>), SubscriptionEntry>,
    outbound: Mutex<Option<mpsc::UnboundedSender<OutboundFrame>>>,
    connected: AtomicBool,
    cancel: CancellationToken,
}

impl AdapterState {
    fn dispatch(&self, symbol: &str, data_type: DataType, interval: Option<Interval>, payload: EventPayload) {
        if let Some(entry) = self.subscriptions.get(&(symbol.to_string(), data_type, interval)) {
            for callback in &entry.callbacks {
                callback.on_event(symbol, data_type, payload.clone());
            }
        }
    }

    fn send_outbound(&self, frame: OutboundFrame) {
        if let Some(tx) = self.outbound.lock().unwrap().as_ref() {
            if tx.send(frame).is_err() {
                warn!(provider = %self.name, "outbound channel closed, frame dropped");
            }
        }
    }

    /// Replay every currently-registered subscription as a fresh `Subscribe`
    /// frame after a reconnect (`spec.md` §4.4 "on reconnect all prior
    /// subscriptions are restored before any new Subscribe requests").
    fn resubscribe_all(&self) {
        for entry in self.subscriptions.iter() {
            let (symbol, data_type, interval) = entry.key().clone();
            self.send_outbound(OutboundFrame::Subscribe {
                channel: channel_name(data_type, interval),
                symbol,
            });
        }
    }
}

/// A WebSocket + HTTP market-data provider, multiplexing many logical
/// `(symbol, data-type[, interval])` subscriptions onto one transport
/// connection.
pub struct WsFeedAdapter {
    state: Arc<AdapterState>,
    ws_url: Url,
    http_base: Url,
    http_client: reqwest::Client,
    backoff: ReconnectConfig,
    run_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WsFeedAdapter {
    /// Build an adapter for `ws_url` (streaming) and `http_base`
    /// (synchronous `Get`/historical side channel). Does not connect.
    #[must_use]
    pub fn new(name: impl Into<String>, ws_url: Url, http_base: Url) -> Self {
        Self {
            state: Arc::new(AdapterState {
                name: name.into(),
                subscriptions: DashMap::new(),
                outbound: Mutex::new(None),
                connected: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
            ws_url,
            http_base,
            http_client: reqwest::Client::new(),
            backoff: ReconnectConfig::default_policy(),
            run_handle: Mutex::new(None),
        }
    }

    /// Override the reconnect backoff policy (`spec.md` §6 knobs).
    #[must_use]
    pub fn with_backoff(mut self, backoff: ReconnectConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl Provider for WsFeedAdapter {
    async fn connect(&self) -> Result<(), ProviderError> {
        if self.state.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        let (stream, _response) = tokio_tungstenite::connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| ProviderError(format!("initial connect failed: {e}")))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.state.outbound.lock().unwrap() = Some(outbound_tx);
        self.state.connected.store(true, Ordering::SeqCst);

        let state = Arc::clone(&self.state);
        let ws_url = self.ws_url.clone();
        let backoff_config = self.backoff;
        let handle = tokio::spawn(run_connection_loop(state, ws_url, backoff_config, stream, outbound_rx));
        *self.run_handle.lock().unwrap() = Some(handle);
        info!(provider = %self.state.name, "connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.state.cancel.cancel();
        self.state.connected.store(false, Ordering::SeqCst);
        *self.state.outbound.lock().unwrap() = None;
        if let Some(handle) = self.run_handle.lock().unwrap().take() {
            handle.abort();
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        symbol: &str,
        data_type: DataType,
        interval: Option<Interval>,
        callback: Arc<dyn ProviderCallback>,
    ) -> Result<(), ProviderError> {
        let key = (symbol.to_string(), data_type, interval);
        let mut is_first = false;
        self.state
            .subscriptions
            .entry(key)
            .and_modify(|e| {
                e.refcount += 1;
                e.callbacks.push(callback.clone());
            })
            .or_insert_with(|| {
                is_first = true;
                SubscriptionEntry { refcount: 1, callbacks: vec![callback] }
            });

        if is_first {
            self.state.send_outbound(OutboundFrame::Subscribe {
                channel: channel_name(data_type, interval),
                symbol: symbol.to_string(),
            });
        }
        Ok(())
    }

    async fn unsubscribe(
        &self,
        symbol: &str,
        data_type: DataType,
        interval: Option<Interval>,
    ) -> Result<(), ProviderError> {
        let key = (symbol.to_string(), data_type, interval);
        let should_deregister = match self.state.subscriptions.get_mut(&key) {
            Some(mut entry) => {
                entry.refcount = entry.refcount.saturating_sub(1);
                entry.refcount == 0
            }
            None => false,
        };
        if should_deregister {
            self.state.subscriptions.remove(&key);
            self.state.send_outbound(OutboundFrame::Unsubscribe {
                channel: channel_name(data_type, interval),
                symbol: symbol.to_string(),
            });
        }
        Ok(())
    }

    async fn get(
        &self,
        symbol: &str,
        data_type: DataType,
        interval: Option<Interval>,
    ) -> Result<EventPayload, ProviderError> {
        let path = match (data_type, interval) {
            (DataType::OrderBook, _) => format!("book/{symbol}"),
            (DataType::Trade, _) => format!("trades/{symbol}"),
            (DataType::Ticker, _) => format!("ticker/{symbol}"),
            (DataType::Ohlcv, Some(interval)) => format!("ohlcv/{symbol}/{}", interval.millis()),
            (DataType::Ohlcv, None) => {
                return Err(ProviderError("ohlcv get requires an interval".to_string()));
            }
        };
        let url = self
            .http_base
            .join(&path)
            .map_err(|e| ProviderError(format!("bad request path: {e}")))?;
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError(format!("http request failed: {e}")))?;
        let raw: RawFeedMessage = response
            .json()
            .await
            .map_err(|e| ProviderError(format!("response decode failed: {e}")))?;
        normalize(raw).ok_or_else(|| ProviderError("unexpected message shape for get".to_string()))
    }

    fn name(&self) -> &str {
        &self.state.name
    }
}

async fn run_connection_loop(
    state: Arc<AdapterState>,
    ws_url: Url,
    backoff_config: ReconnectConfig,
    mut stream: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
) {
    loop {
        if state.cancel.is_cancelled() {
            return;
        }
        drive_connection(&state, &mut stream, &mut outbound_rx).await;
        if state.cancel.is_cancelled() {
            return;
        }
        state.connected.store(false, Ordering::SeqCst);
        warn!(provider = %state.name, "connection lost, reconnecting");

        let mut backoff = Backoff::new(backoff_config);
        loop {
            if state.cancel.is_cancelled() {
                return;
            }
            let delay = backoff.next_delay();
            tokio::time::sleep(delay).await;
            match tokio_tungstenite::connect_async(ws_url.as_str()).await {
                Ok((new_stream, _)) => {
                    stream = new_stream;
                    state.connected.store(true, Ordering::SeqCst);
                    state.resubscribe_all();
                    info!(provider = %state.name, attempt = backoff.attempt(), "reconnected");
                    break;
                }
                Err(error) => {
                    debug!(provider = %state.name, %error, attempt = backoff.attempt(), "reconnect attempt failed");
                }
            }
        }
    }
}

/// Run one connection's duplex loop until it errors, closes, or the
/// adapter is cancelled.
async fn drive_connection(
    state: &Arc<AdapterState>,
    stream: &mut WsStream,
    outbound_rx: &mut mpsc::UnboundedReceiver<OutboundFrame>,
) {
    loop {
        tokio::select! {
            () = state.cancel.cancelled() => return,
            frame = outbound_rx.recv() => {
                match frame {
                    Some(frame) => {
                        let Ok(text) = serde_json::to_string(&frame) else { continue };
                        if stream.send(Message::Text(text)).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_inbound_text(state, &text),
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = stream.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        error!(provider = %state.name, %error, "websocket read error");
                        return;
                    }
                }
            }
        }
    }
}

fn handle_inbound_text(state: &Arc<AdapterState>, text: &str) {
    let raw: RawFeedMessage = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(error) => {
            warn!(provider = %state.name, %error, "failed to parse inbound frame");
            return;
        }
    };
    dispatch_raw(state, raw);
}

fn dispatch_raw(state: &Arc<AdapterState>, raw: RawFeedMessage) {
    match &raw {
        RawFeedMessage::BookUpdate { symbol, .. } => {
            if let Some(payload) = normalize(raw.clone()) {
                state.dispatch(symbol, DataType::OrderBook, None, payload);
            }
        }
        RawFeedMessage::Trade { symbol, .. } => {
            if let Some(payload) = normalize(raw.clone()) {
                state.dispatch(symbol, DataType::Trade, None, payload);
            }
        }
        RawFeedMessage::SubscriptionAck { channel, symbol } => {
            debug!(provider = %state.name, %channel, %symbol, "subscription acknowledged");
        }
        RawFeedMessage::Error { message } => {
            warn!(provider = %state.name, %message, "upstream error frame");
        }
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw).ok()
}

fn normalize_level(level: &RawLevel) -> Option<LevelAgg> {
    Some(LevelAgg {
        price: crate::common::Price::new(parse_decimal(&level.price)?),
        quantity: crate::common::Quantity::new(parse_decimal(&level.size)?),
    })
}

/// Turn one raw wire message into the payload shape subscribers expect.
/// Returns `None` for control frames that never surface as an event.
fn normalize(raw: RawFeedMessage) -> Option<EventPayload> {
    match raw {
        RawFeedMessage::BookUpdate { symbol, bids, asks, .. } => {
            let bids = bids.iter().filter_map(normalize_level).collect();
            let asks = asks.iter().filter_map(normalize_level).collect();
            Some(EventPayload::OrderBook(BookSnapshot { symbol, bids, asks, sequence: 0 }))
        }
        RawFeedMessage::Trade { symbol, price, size, taker_side, timestamp_millis } => {
            let price = parse_decimal(&price)?;
            let size = parse_decimal(&size)?;
            Some(EventPayload::Trade(crate::engine::trade::Trade {
                id: crate::common::TradeId::new(),
                symbol,
                price: crate::common::Price::new(price),
                quantity: crate::common::Quantity::new(size),
                taker_side: taker_side.into(),
                maker_order_id: crate::common::OrderId::new(),
                taker_order_id: crate::common::OrderId::new(),
                timestamp: timestamp_millis,
                sequence: 0,
            }))
        }
        RawFeedMessage::SubscriptionAck { .. } | RawFeedMessage::Error { .. } => None,
    }
}
