//! Shared helpers for integration tests: an in-process live feed server

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;

use scripwatch::backend::ConnectionStatus;
use scripwatch::backend::websocket::FeedSettings;

#[derive(Debug, Clone)]
enum ServerAction {
    Send(String),
    Drop,
}

/// Local websocket server speaking the live feed protocol
///
/// Every accepted connection gets a `connection_response` (unless disabled),
/// its inbound text frames are recorded in arrival order, and pushes are
/// broadcast to all open connections.
pub struct MockFeedServer {
    addr: SocketAddr,
    inbound: Arc<Mutex<Vec<Value>>>,
    connections: Arc<AtomicUsize>,
    actions: broadcast::Sender<ServerAction>,
    accept_task: Option<JoinHandle<()>>,
}

impl MockFeedServer {
    pub async fn start() -> Self {
        Self::start_with_ack(true).await
    }

    /// Server that never sends `connection_response`
    pub async fn start_silent() -> Self {
        Self::start_with_ack(false).await
    }

    async fn start_with_ack(ack: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock feed");
        let addr = listener.local_addr().expect("local addr");
        let inbound = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (actions, _) = broadcast::channel(64);

        let accept_task = tokio::spawn({
            let inbound = inbound.clone();
            let connections = connections.clone();
            let actions = actions.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let inbound = inbound.clone();
                    let mut action_rx = actions.subscribe();
                    connections.fetch_add(1, Ordering::SeqCst);

                    tokio::spawn(async move {
                        let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                            return;
                        };
                        let (mut write, mut read) = ws.split();

                        if ack {
                            let hello = json!({"event": "connection_response", "data": {"status": "ok"}});
                            if write.send(Message::Text(hello.to_string())).await.is_err() {
                                return;
                            }
                        }

                        loop {
                            tokio::select! {
                                frame = read.next() => match frame {
                                    Some(Ok(Message::Text(text))) => {
                                        if let Ok(value) = serde_json::from_str::<Value>(&text) {
                                            inbound.lock().unwrap().push(value);
                                        }
                                    }
                                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                },
                                action = action_rx.recv() => match action {
                                    Ok(ServerAction::Send(text)) => {
                                        if write.send(Message::Text(text)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Ok(ServerAction::Drop) | Err(_) => break,
                                },
                            }
                        }
                    });
                }
            }
        });

        Self {
            addr,
            inbound,
            connections,
            actions,
            accept_task: Some(accept_task),
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Feed settings with short delays suited to tests
    pub fn settings(&self) -> FeedSettings {
        FeedSettings {
            url: self.url(),
            reconnect_interval: Duration::from_millis(100),
            max_reconnect_attempts: 5,
            handshake_timeout: Duration::from_secs(2),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// All JSON messages received from clients, in arrival order
    pub fn received(&self) -> Vec<Value> {
        self.inbound.lock().unwrap().clone()
    }

    /// `(event, scrip_code)` for every received message
    pub fn received_events(&self) -> Vec<(String, u64)> {
        self.received()
            .iter()
            .map(|value| {
                let event = value["event"].as_str().unwrap_or_default().to_string();
                let scrip = value["data"]["scrip_code"].as_u64().unwrap_or_default();
                (event, scrip)
            })
            .collect()
    }

    pub fn count_event(&self, event: &str) -> usize {
        self.received_events()
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }

    /// Poll until at least `count` messages named `event` arrived
    pub async fn wait_for_event(&self, event: &str, count: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while self.count_event(event) < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(
            waited.is_ok(),
            "expected {} '{}' messages, got {:?}",
            count,
            event,
            self.received_events()
        );
    }

    pub fn push(&self, value: Value) {
        let _ = self.actions.send(ServerAction::Send(value.to_string()));
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.actions.send(ServerAction::Send(text.to_string()));
    }

    /// Send one `stock_update` for `scrip_code`
    pub fn push_tick(&self, scrip_code: u32, price: &str) {
        self.push(json!({
            "event": "stock_update",
            "data": {
                "ScripCode": scrip_code,
                "LastTradedPrice": price,
                "High": "320.10",
                "Low": "305.00",
                "Volume": 1_250_000
            }
        }));
    }

    /// Drop every open connection without a close handshake
    pub fn drop_connections(&self) {
        let _ = self.actions.send(ServerAction::Drop);
    }

    /// Stop accepting; later connects are refused
    pub fn stop_accepting(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

impl Drop for MockFeedServer {
    fn drop(&mut self) {
        self.stop_accepting();
        self.drop_connections();
    }
}

/// Wait until the status channel reports a status matching `predicate`
pub async fn wait_for_status<F>(
    status_rx: &mut tokio::sync::watch::Receiver<ConnectionStatus>,
    timeout: Duration,
    predicate: F,
) -> ConnectionStatus
where
    F: Fn(&ConnectionStatus) -> bool,
{
    let result = tokio::time::timeout(timeout, async {
        loop {
            {
                let status = status_rx.borrow_and_update();
                if predicate(&*status) {
                    return status.clone();
                }
            }
            if status_rx.changed().await.is_err() {
                return status_rx.borrow().clone();
            }
        }
    })
    .await;

    match result {
        Ok(status) => status,
        Err(_) => panic!("timed out waiting for status, last {:?}", *status_rx.borrow()),
    }
}
