//! Live feed WebSocket client implementation
//!
//! A single worker task owns the transport. Callers talk to it through
//! [`LiveFeedClient`], whose commands are processed strictly in the order they
//! were sent, so an unsubscribe issued before a subscribe always reaches the
//! wire first.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use backoff::backoff::{Backoff, Constant};
use chrono::Utc;
use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, error, info, warn};

use super::types::{
    ConnectionStatus, FeedError, FeedEventType, FeedMessage, InstrumentRef, OutboundMessage, Tick,
};
use crate::config::BackendConfig;
use crate::metrics::{FeedStats, FeedStatsSnapshot};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Connection and reconnect settings for the live feed
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub url: String,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub handshake_timeout: Duration,
}

impl FeedSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            handshake_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            url: config.ws_url.clone(),
            reconnect_interval: config.reconnect_interval(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            handshake_timeout: config.handshake_timeout(),
        }
    }
}

enum FeedCommand {
    Subscribe {
        instrument: InstrumentRef,
        listener_id: u64,
        tick_tx: mpsc::UnboundedSender<Tick>,
    },
    Unsubscribe {
        scrip_code: u32,
        listener_id: u64,
    },
    Reconnect,
    Shutdown,
}

/// Registration of one listener for one instrument's ticks
#[derive(Debug)]
pub struct FeedSubscription {
    id: u64,
    instrument: InstrumentRef,
    ticks: mpsc::UnboundedReceiver<Tick>,
}

impl FeedSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn instrument(&self) -> InstrumentRef {
        self.instrument
    }

    /// Wait for the next tick; `None` once the feed client is gone
    pub async fn next_tick(&mut self) -> Option<Tick> {
        self.ticks.recv().await
    }

    pub fn try_next_tick(&mut self) -> Option<Tick> {
        self.ticks.try_recv().ok()
    }
}

/// Live feed client handle
pub struct LiveFeedClient {
    cmd_tx: mpsc::UnboundedSender<FeedCommand>,
    status_rx: watch::Receiver<ConnectionStatus>,
    next_listener_id: AtomicU64,
    stats: Arc<FeedStats>,
    task: Option<JoinHandle<()>>,
}

impl LiveFeedClient {
    /// Spawn the feed worker and start connecting
    pub fn spawn(settings: FeedSettings) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let stats = Arc::new(FeedStats::default());

        let worker = FeedWorker {
            settings,
            cmd_rx,
            status_tx,
            listeners: HashMap::new(),
            stats: stats.clone(),
        };
        let task = tokio::spawn(worker.run());

        Self {
            cmd_tx,
            status_rx,
            next_listener_id: AtomicU64::new(1),
            stats,
            task: Some(task),
        }
    }

    /// Get current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        self.status_rx.borrow().is_connected()
    }

    /// Receiver that observes every status transition
    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    pub fn stats(&self) -> FeedStatsSnapshot {
        self.stats.snapshot()
    }

    /// Register for an instrument's ticks
    ///
    /// When the feed is not connected the intent is queued and replayed once
    /// the connection is acknowledged.
    pub fn subscribe(&self, instrument: InstrumentRef) -> Result<FeedSubscription, FeedError> {
        let listener_id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (tick_tx, ticks) = mpsc::unbounded_channel();

        self.cmd_tx
            .send(FeedCommand::Subscribe {
                instrument,
                listener_id,
                tick_tx,
            })
            .map_err(|_| FeedError::Closed)?;

        debug!("Requested subscription #{} for {}", listener_id, instrument);
        Ok(FeedSubscription {
            id: listener_id,
            instrument,
            ticks,
        })
    }

    /// Drop a registration; no further ticks are delivered to it
    pub fn unsubscribe(&self, subscription: FeedSubscription) -> Result<(), FeedError> {
        debug!(
            "Requested unsubscribe #{} for {}",
            subscription.id, subscription.instrument
        );
        self.cmd_tx
            .send(FeedCommand::Unsubscribe {
                scrip_code: subscription.instrument.scrip_code,
                listener_id: subscription.id,
            })
            .map_err(|_| FeedError::Closed)
    }

    /// Restart the connect cycle after the retry budget was exhausted
    pub fn reconnect(&self) -> Result<(), FeedError> {
        self.cmd_tx
            .send(FeedCommand::Reconnect)
            .map_err(|_| FeedError::Closed)
    }

    /// Unsubscribe everything, close the transport and stop the worker
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            if self.cmd_tx.send(FeedCommand::Shutdown).is_err() {
                debug!("Feed worker already stopped");
            }
            if let Err(e) = task.await {
                warn!("Feed worker terminated abnormally: {}", e);
            }
            info!("Live feed client shutdown completed");
        }
        Ok(())
    }

    /// Classify message based on event name
    pub fn classify_message(value: &Value) -> Option<FeedEventType> {
        value
            .get("event")
            .and_then(|v| v.as_str())
            .and_then(|event| match event {
                "connection_response" | "connected" => Some(FeedEventType::ConnectionResponse),
                "subscribed" => Some(FeedEventType::Subscribed),
                "unsubscribed" => Some(FeedEventType::Unsubscribed),
                "stock_update" => Some(FeedEventType::StockUpdate),
                "error" => Some(FeedEventType::Error),
                _ => None,
            })
    }

    /// Decode an incoming frame
    pub fn process_message(msg: Message) -> Result<FeedMessage, FeedError> {
        let value: Value = match msg {
            Message::Text(text) => {
                debug!("Received feed message: {}", text);
                serde_json::from_str(&text)
                    .map_err(|e| FeedError::ParseError(format!("Failed to parse JSON: {}", e)))?
            }
            Message::Binary(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| FeedError::ParseError(format!("Failed to parse JSON: {}", e)))?,
            Message::Ping(_) => return Ok(FeedMessage::Ping),
            Message::Pong(_) => return Ok(FeedMessage::Pong),
            Message::Close(_) => {
                return Err(FeedError::ConnectionError(
                    "Connection closed".to_string(),
                ));
            }
            _ => {
                return Err(FeedError::ParseError(
                    "Unsupported message type".to_string(),
                ));
            }
        };

        let data = value.get("data").cloned().unwrap_or(Value::Null);

        match Self::classify_message(&value) {
            Some(FeedEventType::ConnectionResponse) => Ok(FeedMessage::ConnectionAck),
            Some(FeedEventType::Subscribed) => Ok(FeedMessage::Subscribed { data }),
            Some(FeedEventType::Unsubscribed) => Ok(FeedMessage::Unsubscribed { data }),
            Some(FeedEventType::StockUpdate) => {
                let entries = match data {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                let received_at = Utc::now();
                let mut ticks = Vec::with_capacity(entries.len());
                let mut dropped = 0;

                for entry in &entries {
                    match Tick::from_value(entry, received_at) {
                        Ok(tick) => ticks.push(tick),
                        Err(e) => {
                            warn!("Dropping malformed stock_update entry: {}", e);
                            dropped += 1;
                        }
                    }
                }

                Ok(FeedMessage::Ticks { ticks, dropped })
            }
            Some(FeedEventType::Error) => {
                let message = data
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                Ok(FeedMessage::ServerError { message })
            }
            None => Ok(FeedMessage::Unknown {
                event: value
                    .get("event")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
            }),
        }
    }
}

impl Drop for LiveFeedClient {
    fn drop(&mut self) {
        if self.task.is_some() {
            warn!("LiveFeedClient dropped without shutdown, stopping worker");
            let _ = self.cmd_tx.send(FeedCommand::Shutdown);
        }
    }
}

/// Listeners registered for one scrip code
struct ListenerSlot {
    instrument: InstrumentRef,
    senders: Vec<(u64, mpsc::UnboundedSender<Tick>)>,
}

enum Control {
    Continue,
    Shutdown,
}

enum Establish {
    Connected(WsStream),
    Exhausted(String),
    Shutdown,
}

enum SessionEnd {
    Dropped(String),
    Shutdown,
}

struct FeedWorker {
    settings: FeedSettings,
    cmd_rx: mpsc::UnboundedReceiver<FeedCommand>,
    status_tx: watch::Sender<ConnectionStatus>,
    listeners: HashMap<u32, ListenerSlot>,
    stats: Arc<FeedStats>,
}

impl FeedWorker {
    async fn run(mut self) {
        info!("Live feed worker started for {}", self.settings.url);
        let mut initial = true;

        loop {
            let ws = match self.establish(initial).await {
                Establish::Connected(ws) => ws,
                Establish::Shutdown => break,
                Establish::Exhausted(reason) => {
                    error!("{}", reason);
                    self.set_status(ConnectionStatus::Failed(reason));
                    match self.wait_while_failed().await {
                        Control::Continue => {
                            initial = true;
                            continue;
                        }
                        Control::Shutdown => break,
                    }
                }
            };
            initial = false;

            match self.drive(ws).await {
                SessionEnd::Shutdown => break,
                SessionEnd::Dropped(reason) => {
                    warn!("Live feed connection lost: {}", reason);
                    self.set_status(ConnectionStatus::Disconnected);
                }
            }
        }

        self.listeners.clear();
        self.set_status(ConnectionStatus::Disconnected);
        info!("Live feed worker stopped");
    }

    fn set_status(&self, status: ConnectionStatus) {
        if *self.status_tx.borrow() != status {
            debug!("Feed status -> {:?}", status);
            self.status_tx.send_replace(status);
        }
    }

    /// Connect, retrying with a fixed delay up to the configured budget
    ///
    /// The first connect of a cycle is immediate; the budget counts the
    /// delayed retries that follow it, and after a dropped session every
    /// attempt is a delayed retry.
    async fn establish(&mut self, initial: bool) -> Establish {
        let mut policy = Constant::new(self.settings.reconnect_interval);
        let mut last_error = String::from("not attempted");

        if initial {
            match self.try_connect().await {
                Ok(Some(ws)) => return Establish::Connected(ws),
                Ok(None) => return Establish::Shutdown,
                Err(e) => {
                    warn!("Initial feed connection failed: {}", e);
                    last_error = e;
                }
            }
        }

        for attempt in 1..=self.settings.max_reconnect_attempts {
            self.set_status(ConnectionStatus::Reconnecting { attempt });
            let delay = policy
                .next_backoff()
                .unwrap_or(self.settings.reconnect_interval);
            if let Control::Shutdown = self.idle(delay).await {
                return Establish::Shutdown;
            }

            self.stats.record_reconnect_attempt();
            info!(
                "Reconnect attempt {}/{} to {}",
                attempt, self.settings.max_reconnect_attempts, self.settings.url
            );

            match self.try_connect().await {
                Ok(Some(ws)) => {
                    info!("Reconnected successfully after {} attempts", attempt);
                    return Establish::Connected(ws);
                }
                Ok(None) => return Establish::Shutdown,
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt, e);
                    last_error = e;
                }
            }
        }

        Establish::Exhausted(format!(
            "Failed to reconnect after {} attempts: {}",
            self.settings.max_reconnect_attempts, last_error
        ))
    }

    /// One connect + handshake, still serving commands meanwhile
    ///
    /// `Ok(None)` means shutdown was requested while connecting.
    async fn try_connect(&mut self) -> Result<Option<WsStream>, String> {
        self.set_status(ConnectionStatus::Connecting);

        let connect = open_and_handshake(self.settings.url.clone(), self.settings.handshake_timeout);
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => return result.map(Some),
                command = self.cmd_rx.recv() => {
                    if let Control::Shutdown = self.handle_offline_command(command) {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Sleep for `delay` while serving commands
    async fn idle(&mut self, delay: Duration) -> Control {
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Control::Continue,
                command = self.cmd_rx.recv() => {
                    if let Control::Shutdown = self.handle_offline_command(command) {
                        return Control::Shutdown;
                    }
                }
            }
        }
    }

    async fn wait_while_failed(&mut self) -> Control {
        loop {
            match self.cmd_rx.recv().await {
                Some(FeedCommand::Reconnect) => {
                    info!("Manual reconnect requested");
                    return Control::Continue;
                }
                command => {
                    if let Control::Shutdown = self.handle_offline_command(command) {
                        return Control::Shutdown;
                    }
                }
            }
        }
    }

    /// Commands received without a live transport only update subscription intent
    fn handle_offline_command(&mut self, command: Option<FeedCommand>) -> Control {
        match command {
            Some(FeedCommand::Subscribe {
                instrument,
                listener_id,
                tick_tx,
            }) => {
                self.add_listener(instrument, listener_id, tick_tx);
                info!("Queued subscription for {} until connected", instrument);
                Control::Continue
            }
            Some(FeedCommand::Unsubscribe {
                scrip_code,
                listener_id,
            }) => {
                self.remove_listener(scrip_code, listener_id);
                debug!("Dropped queued subscription for {}", scrip_code);
                Control::Continue
            }
            Some(FeedCommand::Reconnect) => {
                debug!("Reconnect requested while already connecting");
                Control::Continue
            }
            Some(FeedCommand::Shutdown) | None => Control::Shutdown,
        }
    }

    /// Serve one connected session until it drops or shutdown is requested
    async fn drive(&mut self, ws: WsStream) -> SessionEnd {
        let (mut write, mut read) = ws.split();
        self.set_status(ConnectionStatus::Connected);
        self.stats.record_connection();
        info!("Connected to live feed at {}", self.settings.url);

        let pending: Vec<InstrumentRef> = self.listeners.values().map(|s| s.instrument).collect();
        for instrument in pending {
            if let Err(e) = send_outbound(&mut write, &OutboundMessage::subscribe(&instrument)).await {
                return SessionEnd::Dropped(e.to_string());
            }
            info!("Replayed subscription for {}", instrument);
        }

        loop {
            tokio::select! {
                command = self.cmd_rx.recv() => {
                    match command {
                        Some(FeedCommand::Subscribe { instrument, listener_id, tick_tx }) => {
                            if self.add_listener(instrument, listener_id, tick_tx) {
                                if let Err(e) = send_outbound(&mut write, &OutboundMessage::subscribe(&instrument)).await {
                                    return SessionEnd::Dropped(e.to_string());
                                }
                                info!("Subscribed to {}", instrument);
                            }
                        }
                        Some(FeedCommand::Unsubscribe { scrip_code, listener_id }) => {
                            if self.remove_listener(scrip_code, listener_id) {
                                if let Err(e) = send_outbound(&mut write, &OutboundMessage::unsubscribe(scrip_code)).await {
                                    return SessionEnd::Dropped(e.to_string());
                                }
                                info!("Unsubscribed from {}", scrip_code);
                            }
                        }
                        Some(FeedCommand::Reconnect) => {
                            debug!("Reconnect requested while connected, ignoring");
                        }
                        Some(FeedCommand::Shutdown) | None => {
                            self.close(&mut write).await;
                            return SessionEnd::Shutdown;
                        }
                    }
                }

                frame = read.next() => {
                    match frame {
                        Some(Ok(msg)) => {
                            if let Some(end) = self.handle_frame(msg, &mut write).await {
                                return end;
                            }
                        }
                        Some(Err(e)) => return SessionEnd::Dropped(format!("Feed read error: {}", e)),
                        None => return SessionEnd::Dropped("Feed stream ended".to_string()),
                    }
                }
            }
        }
    }

    async fn handle_frame(&mut self, msg: Message, write: &mut WsWriter) -> Option<SessionEnd> {
        match LiveFeedClient::process_message(msg) {
            Ok(FeedMessage::Ticks { ticks, dropped }) => {
                for _ in 0..dropped {
                    self.stats.record_dropped_frame();
                }
                for tick in ticks {
                    if let Some(orphan) = self.deliver(tick) {
                        if let Err(e) = send_outbound(write, &OutboundMessage::unsubscribe(orphan)).await {
                            return Some(SessionEnd::Dropped(e.to_string()));
                        }
                        info!("Unsubscribed from {} after its listeners went away", orphan);
                    }
                }
            }
            Ok(FeedMessage::ConnectionAck) => debug!("Duplicate connection_response"),
            Ok(FeedMessage::Subscribed { data }) => info!("Feed acknowledged subscription: {}", data),
            Ok(FeedMessage::Unsubscribed { data }) => debug!("Feed acknowledged unsubscribe: {}", data),
            Ok(FeedMessage::ServerError { message }) => warn!("Feed reported error: {}", message),
            Ok(FeedMessage::Ping) | Ok(FeedMessage::Pong) => debug!("Feed keepalive"),
            Ok(FeedMessage::Unknown { event }) => debug!("Ignoring feed event '{}'", event),
            Err(FeedError::ConnectionError(reason)) => return Some(SessionEnd::Dropped(reason)),
            Err(e) => {
                warn!("Dropping malformed feed frame: {}", e);
                self.stats.record_dropped_frame();
            }
        }
        None
    }

    /// Fan a tick out to its listeners; returns the scrip code if none are left
    fn deliver(&mut self, tick: Tick) -> Option<u32> {
        let scrip_code = tick.scrip_code;
        let Some(slot) = self.listeners.get_mut(&scrip_code) else {
            debug!("Tick for unsubscribed scrip {} ignored", scrip_code);
            return None;
        };

        slot.senders.retain(|(_, tx)| tx.send(tick.clone()).is_ok());
        self.stats.record_tick();

        if slot.senders.is_empty() {
            self.listeners.remove(&scrip_code);
            return Some(scrip_code);
        }
        None
    }

    /// Returns true when this is the first listener for the scrip code
    fn add_listener(
        &mut self,
        instrument: InstrumentRef,
        listener_id: u64,
        tick_tx: mpsc::UnboundedSender<Tick>,
    ) -> bool {
        match self.listeners.get_mut(&instrument.scrip_code) {
            Some(slot) => {
                slot.senders.push((listener_id, tick_tx));
                false
            }
            None => {
                self.listeners.insert(
                    instrument.scrip_code,
                    ListenerSlot {
                        instrument,
                        senders: vec![(listener_id, tick_tx)],
                    },
                );
                true
            }
        }
    }

    /// Returns true when the last listener for the scrip code went away
    fn remove_listener(&mut self, scrip_code: u32, listener_id: u64) -> bool {
        let Some(slot) = self.listeners.get_mut(&scrip_code) else {
            return false;
        };
        slot.senders.retain(|(id, _)| *id != listener_id);
        if slot.senders.is_empty() {
            self.listeners.remove(&scrip_code);
            true
        } else {
            false
        }
    }

    /// Unsubscribe whatever is still registered, then close the transport
    async fn close(&mut self, write: &mut WsWriter) {
        let codes: Vec<u32> = self.listeners.keys().copied().collect();
        for scrip_code in codes {
            if let Err(e) = send_outbound(write, &OutboundMessage::unsubscribe(scrip_code)).await {
                warn!("Failed to unsubscribe {} during shutdown: {}", scrip_code, e);
            }
        }
        self.listeners.clear();

        if let Err(e) = write.close().await {
            warn!("Error closing feed connection: {}", e);
        }
        info!("Disconnected from live feed");
    }
}

async fn open_and_handshake(url: String, handshake_timeout: Duration) -> Result<WsStream, String> {
    let (mut ws, _) = connect_async(url.as_str())
        .await
        .map_err(|e| format!("Failed to connect to feed: {}", e))?;

    let ack = tokio::time::timeout(handshake_timeout, async {
        while let Some(frame) = ws.next().await {
            let frame = frame.map_err(|e| format!("Feed read error: {}", e))?;
            match LiveFeedClient::process_message(frame) {
                Ok(FeedMessage::ConnectionAck) => return Ok(()),
                Ok(other) => debug!("Ignoring {:?} before connection_response", other),
                Err(FeedError::ConnectionError(reason)) => return Err(reason),
                Err(e) => warn!("Dropping malformed frame during handshake: {}", e),
            }
        }
        Err("Feed closed before connection_response".to_string())
    })
    .await;

    match ack {
        Ok(Ok(())) => Ok(ws),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(format!(
            "Timed out after {:?} waiting for connection_response",
            handshake_timeout
        )),
    }
}

async fn send_outbound(write: &mut WsWriter, message: &OutboundMessage) -> Result<(), FeedError> {
    let text = serde_json::to_string(message)?;
    write
        .send(Message::Text(text))
        .await
        .map_err(|e| FeedError::ConnectionError(format!("Failed to send: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(value: Value) -> Message {
        Message::Text(value.to_string())
    }

    #[test]
    fn test_settings_from_default_config() {
        let settings = FeedSettings::from_config(&BackendConfig::default());
        assert_eq!(settings.reconnect_interval, Duration::from_secs(1));
        assert_eq!(settings.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_classify_message() {
        let value = json!({"event": "stock_update", "data": {}});
        assert_eq!(
            LiveFeedClient::classify_message(&value),
            Some(FeedEventType::StockUpdate)
        );
        let value = json!({"event": "connected", "data": {"status": "ok"}});
        assert_eq!(
            LiveFeedClient::classify_message(&value),
            Some(FeedEventType::ConnectionResponse)
        );
        assert_eq!(LiveFeedClient::classify_message(&json!({"event": "noise"})), None);
        assert_eq!(LiveFeedClient::classify_message(&json!({"ScripCode": 1})), None);
    }

    #[test]
    fn test_process_stock_update() {
        let msg = text(json!({
            "event": "stock_update",
            "data": {"ScripCode": 1660, "LastTradedPrice": "313.75", "High": 315.0}
        }));
        match LiveFeedClient::process_message(msg).unwrap() {
            FeedMessage::Ticks { ticks, dropped } => {
                assert_eq!(dropped, 0);
                assert_eq!(ticks.len(), 1);
                assert_eq!(ticks[0].scrip_code, 1660);
                assert!((ticks[0].last_traded_price - 313.75).abs() < 1e-9);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_process_batched_update_drops_bad_entries() {
        let msg = text(json!({
            "event": "stock_update",
            "data": [
                {"ScripCode": 1660, "LastRate": 313.0},
                {"ScripCode": 2885},
                {"Token": 2885, "LTP": "2950.10"}
            ]
        }));
        match LiveFeedClient::process_message(msg).unwrap() {
            FeedMessage::Ticks { ticks, dropped } => {
                assert_eq!(ticks.len(), 2);
                assert_eq!(dropped, 1);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_process_invalid_json_is_parse_error() {
        let result = LiveFeedClient::process_message(Message::Text("{not json".to_string()));
        assert!(matches!(result, Err(FeedError::ParseError(_))));
    }

    #[test]
    fn test_process_close_and_control_frames() {
        assert!(matches!(
            LiveFeedClient::process_message(Message::Close(None)),
            Err(FeedError::ConnectionError(_))
        ));
        assert_eq!(
            LiveFeedClient::process_message(Message::Pong(b"x".to_vec())).unwrap(),
            FeedMessage::Pong
        );
    }

    #[test]
    fn test_process_server_error() {
        let msg = text(json!({"event": "error", "data": {"message": "bad scrip"}}));
        assert_eq!(
            LiveFeedClient::process_message(msg).unwrap(),
            FeedMessage::ServerError {
                message: "bad scrip".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_feed_fails_after_retry_budget() {
        let settings = FeedSettings {
            url: "ws://127.0.0.1:9/feed".to_string(),
            reconnect_interval: Duration::from_millis(10),
            max_reconnect_attempts: 2,
            handshake_timeout: Duration::from_millis(200),
        };
        let mut client = LiveFeedClient::spawn(settings);
        let mut status_rx = client.status_receiver();

        let failed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if matches!(*status_rx.borrow_and_update(), ConnectionStatus::Failed(_)) {
                    break;
                }
                if status_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;

        assert!(failed.is_ok());
        assert!(!client.is_connected());
        assert_eq!(client.stats().reconnect_attempts, 2);
        client.shutdown().await.unwrap();
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
    }
}
