//! Price display controller
//!
//! Combines a one-shot snapshot with the live feed into a single displayed
//! price. One view owns exactly one subscription slot; switching instruments
//! always unsubscribes the old instrument before anything else happens.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::backend::{
    ConnectionStatus, FeedError, FeedSubscription, InstrumentRef, LiveFeedClient, MarketDataError,
    Snapshot, SnapshotFetcher, Tick,
};

/// Data-freshness badge; follows connection state, not tick recency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceBadge {
    Live,
    Delayed,
}

impl std::fmt::Display for PriceBadge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceBadge::Live => write!(f, "LIVE"),
            PriceBadge::Delayed => write!(f, "DELAYED"),
        }
    }
}

/// Where the displayed price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Snapshot,
    Tick,
}

/// Displayed quote for the current instrument
#[derive(Debug, Clone, PartialEq)]
pub struct PriceView {
    pub instrument: InstrumentRef,
    pub price: f64,
    pub source: PriceSource,
    pub change: f64,
    pub change_percent: f64,
    pub high: f64,
    pub low: f64,
    pub volume: u64,
}

/// State changes reported to the view
#[derive(Debug, Clone, PartialEq)]
pub enum PriceEvent {
    SnapshotLoaded { price: f64 },
    SnapshotFailed { error: MarketDataError },
    Tick { price: f64 },
    StatusChanged { status: ConnectionStatus },
}

struct SnapshotOutcome {
    generation: u64,
    instrument: InstrumentRef,
    result: Result<Snapshot, MarketDataError>,
}

pub struct PriceDisplayController<F> {
    fetcher: Arc<F>,
    feed: LiveFeedClient,
    status_rx: watch::Receiver<ConnectionStatus>,
    feed_alive: bool,
    subscription: Option<FeedSubscription>,
    instrument: Option<InstrumentRef>,
    generation: u64,
    snapshot_tx: mpsc::UnboundedSender<SnapshotOutcome>,
    snapshot_rx: mpsc::UnboundedReceiver<SnapshotOutcome>,
    snapshot: Option<Snapshot>,
    last_tick: Option<Tick>,
    loading: bool,
    error: Option<MarketDataError>,
}

impl<F: SnapshotFetcher> PriceDisplayController<F> {
    pub fn new(fetcher: Arc<F>, feed: LiveFeedClient) -> Self {
        let status_rx = feed.status_receiver();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();

        Self {
            fetcher,
            feed,
            status_rx,
            feed_alive: true,
            subscription: None,
            instrument: None,
            generation: 0,
            snapshot_tx,
            snapshot_rx,
            snapshot: None,
            last_tick: None,
            loading: false,
            error: None,
        }
    }

    /// Show `instrument`, replacing whatever was shown before
    pub fn open(&mut self, instrument: InstrumentRef) -> Result<(), FeedError> {
        self.release_subscription()?;

        self.snapshot = None;
        self.last_tick = None;
        self.error = None;
        self.loading = true;
        self.instrument = Some(instrument);
        self.generation += 1;

        info!("Price view -> {}", instrument);
        self.start_snapshot_fetch(instrument);
        Ok(())
    }

    /// Fetch the snapshot again for the current instrument
    pub fn reload(&mut self) -> Result<(), FeedError> {
        match self.instrument {
            Some(instrument) => self.open(instrument),
            None => Ok(()),
        }
    }

    fn start_snapshot_fetch(&self, instrument: InstrumentRef) {
        let generation = self.generation;
        let fetcher = self.fetcher.clone();
        let snapshot_tx = self.snapshot_tx.clone();

        tokio::spawn(async move {
            let result = fetcher.fetch_snapshot(instrument).await;
            let _ = snapshot_tx.send(SnapshotOutcome {
                generation,
                instrument,
                result,
            });
        });
    }

    fn release_subscription(&mut self) -> Result<(), FeedError> {
        if let Some(subscription) = self.subscription.take() {
            info!("Releasing live subscription for {}", subscription.instrument());
            self.feed.unsubscribe(subscription)?;
        }
        Ok(())
    }

    /// Wait for the next state change
    pub async fn next_event(&mut self) -> Result<PriceEvent, FeedError> {
        loop {
            tokio::select! {
                Some(outcome) = self.snapshot_rx.recv() => {
                    if let Some(event) = self.apply_snapshot(outcome)? {
                        return Ok(event);
                    }
                }
                tick = next_tick(&mut self.subscription) => {
                    match tick {
                        Some(tick) => {
                            if let Some(event) = self.apply_tick(tick) {
                                return Ok(event);
                            }
                        }
                        None => {
                            warn!("Live feed closed the tick stream");
                            self.subscription = None;
                        }
                    }
                }
                changed = self.status_rx.changed(), if self.feed_alive => {
                    match changed {
                        Ok(()) => {
                            let status = self.status_rx.borrow_and_update().clone();
                            return Ok(PriceEvent::StatusChanged { status });
                        }
                        Err(_) => {
                            debug!("Feed status channel closed");
                            self.feed_alive = false;
                        }
                    }
                }
            }
        }
    }

    fn apply_snapshot(&mut self, outcome: SnapshotOutcome) -> Result<Option<PriceEvent>, FeedError> {
        if outcome.generation != self.generation || Some(outcome.instrument) != self.instrument {
            debug!(
                "Discarding stale snapshot for {} (#{}, current #{})",
                outcome.instrument, outcome.generation, self.generation
            );
            return Ok(None);
        }

        self.loading = false;
        match outcome.result {
            Ok(snapshot) => {
                let price = snapshot.price;
                self.snapshot = Some(snapshot);
                self.subscription = Some(self.feed.subscribe(outcome.instrument)?);
                Ok(Some(PriceEvent::SnapshotLoaded { price }))
            }
            Err(e) => {
                error!("Snapshot for {} failed: {}", outcome.instrument, e);
                self.error = Some(e.clone());
                Ok(Some(PriceEvent::SnapshotFailed { error: e }))
            }
        }
    }

    fn apply_tick(&mut self, tick: Tick) -> Option<PriceEvent> {
        if self.instrument.map(|i| i.scrip_code) != Some(tick.scrip_code) {
            debug!("Ignoring tick for {} on another view", tick.scrip_code);
            return None;
        }

        let price = tick.last_traded_price;
        self.last_tick = Some(tick);
        Some(PriceEvent::Tick { price })
    }

    /// Price to display; the latest tick wins over the snapshot
    pub fn displayed_price(&self) -> Option<f64> {
        if self.error.is_some() {
            return None;
        }
        self.last_tick
            .as_ref()
            .map(|tick| tick.last_traded_price)
            .or_else(|| self.snapshot.as_ref().map(|s| s.price))
    }

    /// Full quote line, once a snapshot is present
    pub fn view(&self) -> Option<PriceView> {
        let snapshot = self.snapshot.as_ref()?;
        let instrument = self.instrument?;

        let (price, source) = match &self.last_tick {
            Some(tick) => (tick.last_traded_price, PriceSource::Tick),
            None => (snapshot.price, PriceSource::Snapshot),
        };
        let (change, change_percent) = match source {
            PriceSource::Snapshot => (snapshot.change, snapshot.change_percent),
            PriceSource::Tick => change_from(price, snapshot.prev_close),
        };
        let tick = self.last_tick.as_ref();

        Some(PriceView {
            instrument,
            price,
            source,
            change,
            change_percent,
            high: tick
                .and_then(|t| t.high)
                .unwrap_or(snapshot.high)
                .max(price),
            low: tick
                .and_then(|t| t.low)
                .unwrap_or(snapshot.low)
                .min(price),
            volume: tick.and_then(|t| t.volume).unwrap_or(snapshot.volume),
        })
    }

    pub fn badge(&self) -> PriceBadge {
        if self.status_rx.borrow().is_connected() {
            PriceBadge::Live
        } else {
            PriceBadge::Delayed
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    pub fn instrument(&self) -> Option<InstrumentRef> {
        self.instrument
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&MarketDataError> {
        self.error.as_ref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn feed(&self) -> &LiveFeedClient {
        &self.feed
    }

    /// Restart the feed after it gave up reconnecting
    pub fn reconnect(&self) -> Result<(), FeedError> {
        self.feed.reconnect()
    }

    /// Unsubscribe, then close the feed transport
    pub async fn close(&mut self) -> Result<()> {
        self.release_subscription()?;
        self.generation += 1;
        self.loading = false;
        self.feed.shutdown().await?;
        info!("Price view closed");
        Ok(())
    }
}

async fn next_tick(slot: &mut Option<FeedSubscription>) -> Option<Tick> {
    match slot {
        Some(subscription) => subscription.next_tick().await,
        None => std::future::pending().await,
    }
}

fn change_from(price: f64, prev_close: f64) -> (f64, f64) {
    if prev_close <= 0.0 {
        return (0.0, 0.0);
    }
    let change = price - prev_close;
    (change, change / prev_close * 100.0)
}
