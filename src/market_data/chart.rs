//! Chart controller: candle series, interval selection and auto-refresh

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::candle::{Candle, CandleRequest, DateRange, Interval};
use super::market_hours::{Clock, MarketHours, SystemClock};
use super::scheduler::{AutoRefreshScheduler, RefreshSignal, SchedulerState};
use crate::backend::{CandleFetcher, InstrumentRef, MarketDataError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    /// Loading indicator shown; `restart` re-arms the scheduler on success
    Full { restart: bool },
    /// Scheduler-driven, no loading indicator
    Silent,
}

struct FetchOutcome {
    generation: u64,
    kind: FetchKind,
    instrument: InstrumentRef,
    request: CandleRequest,
    result: Result<Vec<Candle>, MarketDataError>,
}

/// State changes reported to the view
#[derive(Debug, Clone, PartialEq)]
pub enum ChartEvent {
    /// A silent re-fetch was started by the scheduler
    Refreshing,
    /// New candles applied
    Updated { candles: usize, silent: bool },
    /// The backend had no candles for the period
    Empty,
    /// The latest fetch failed
    Failed { error: MarketDataError, silent: bool },
}

/// Renderable chart state for one view
pub struct ChartController<F, C = SystemClock> {
    fetcher: Arc<F>,
    clock: Arc<C>,
    market_hours: MarketHours,
    scheduler: AutoRefreshScheduler,
    refresh_rx: mpsc::UnboundedReceiver<RefreshSignal>,
    result_tx: mpsc::UnboundedSender<FetchOutcome>,
    result_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    generation: u64,
    instrument: Option<InstrumentRef>,
    interval: Interval,
    range: Option<DateRange>,
    candles: Vec<Candle>,
    loading: bool,
    error: Option<MarketDataError>,
    empty: bool,
    last_updated: Option<DateTime<Utc>>,
    market_open: bool,
}

impl<F: CandleFetcher> ChartController<F, SystemClock> {
    pub fn new(fetcher: Arc<F>, market_hours: MarketHours, interval: Interval) -> Self {
        Self::with_clock(fetcher, Arc::new(SystemClock), market_hours, interval)
    }
}

impl<F: CandleFetcher, C: Clock> ChartController<F, C> {
    pub fn with_clock(
        fetcher: Arc<F>,
        clock: Arc<C>,
        market_hours: MarketHours,
        interval: Interval,
    ) -> Self {
        let (scheduler, refresh_rx) = AutoRefreshScheduler::new();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let market_open = market_hours.is_open(clock.now());

        Self {
            fetcher,
            clock,
            market_hours,
            scheduler,
            refresh_rx,
            result_tx,
            result_rx,
            generation: 0,
            instrument: None,
            interval,
            range: None,
            candles: Vec::new(),
            loading: false,
            error: None,
            empty: false,
            last_updated: None,
            market_open,
        }
    }

    /// Show a new instrument with the already-selected interval
    pub fn set_instrument(&mut self, instrument: InstrumentRef) {
        info!("Chart instrument -> {}", instrument);
        self.instrument = Some(instrument);
        self.reconfigure();
    }

    /// Switch interval; leaves ranged mode
    pub fn select_interval(&mut self, interval: Interval) {
        info!("Chart interval -> {}", interval);
        self.interval = interval;
        self.range = None;
        self.reconfigure();
    }

    /// Switch to an explicit date range at `interval`
    pub fn select_range(&mut self, interval: Interval, range: DateRange) {
        info!(
            "Chart range -> {} from {} to {}",
            interval,
            range.from(),
            range.to()
        );
        self.interval = interval;
        self.range = Some(range);
        self.reconfigure();
    }

    /// Re-run the full fetch for the current configuration
    ///
    /// Running timers are left alone.
    pub fn retry(&mut self) {
        info!("Retrying chart fetch");
        self.start_fetch(FetchKind::Full { restart: false });
    }

    /// Stop the scheduler and ignore anything still in flight
    pub fn close(&mut self) {
        self.scheduler.stop();
        self.generation += 1;
        self.loading = false;
        info!("Chart closed");
    }

    fn reconfigure(&mut self) {
        self.scheduler.stop();
        self.candles.clear();
        self.empty = false;
        self.error = None;
        self.start_fetch(FetchKind::Full { restart: true });
    }

    fn request(&self) -> CandleRequest {
        match self.range {
            Some(range) => CandleRequest::Range {
                interval: self.interval,
                range,
            },
            None => CandleRequest::Interval(self.interval),
        }
    }

    fn start_fetch(&mut self, kind: FetchKind) {
        let Some(instrument) = self.instrument else {
            debug!("No instrument selected, nothing to fetch");
            return;
        };

        self.generation += 1;
        if let FetchKind::Full { .. } = kind {
            self.loading = true;
        }

        let generation = self.generation;
        let request = self.request();
        let fetcher = self.fetcher.clone();
        let result_tx = self.result_tx.clone();
        debug!(
            "Starting {:?} candle fetch #{} for {} ({:?})",
            kind, generation, instrument, request
        );

        tokio::spawn(async move {
            let result = fetcher.fetch_candles(instrument, request).await;
            // The receiver lives as long as the controller
            let _ = result_tx.send(FetchOutcome {
                generation,
                kind,
                instrument,
                request,
                result,
            });
        });
    }

    /// Wait for the next state change
    ///
    /// Stale fetch results and refresh signals from stopped timers are
    /// swallowed here.
    pub async fn next_event(&mut self) -> ChartEvent {
        loop {
            tokio::select! {
                Some(outcome) = self.result_rx.recv() => {
                    if let Some(event) = self.apply(outcome) {
                        return event;
                    }
                }
                Some(signal) = self.refresh_rx.recv() => {
                    if self.scheduler.is_current(&signal) {
                        self.start_fetch(FetchKind::Silent);
                        return ChartEvent::Refreshing;
                    }
                    debug!("Ignoring refresh signal from stopped timers");
                }
            }
        }
    }

    fn apply(&mut self, outcome: FetchOutcome) -> Option<ChartEvent> {
        if outcome.generation != self.generation
            || Some(outcome.instrument) != self.instrument
            || outcome.request != self.request()
        {
            debug!(
                "Discarding stale candle fetch #{} (current #{})",
                outcome.generation, self.generation
            );
            return None;
        }

        self.loading = false;
        let silent = outcome.kind == FetchKind::Silent;

        match outcome.result {
            Ok(candles) if !candles.is_empty() => {
                let count = candles.len();
                self.candles = candles;
                self.empty = false;
                self.error = None;
                self.mark_success(outcome.kind);
                Some(ChartEvent::Updated {
                    candles: count,
                    silent,
                })
            }
            Ok(_) => self.apply_empty(outcome.kind),
            Err(e) if !e.is_failure() => {
                debug!("Candle fetch for {} reported: {}", outcome.instrument, e);
                self.apply_empty(outcome.kind)
            }
            Err(e) => {
                error!("Candle fetch for {} failed: {}", outcome.instrument, e);
                self.error = Some(e.clone());
                Some(ChartEvent::Failed { error: e, silent })
            }
        }
    }

    fn apply_empty(&mut self, kind: FetchKind) -> Option<ChartEvent> {
        if kind == FetchKind::Silent && !self.candles.is_empty() {
            warn!("Silent refresh returned no candles, keeping the current series");
        } else {
            self.candles.clear();
            self.empty = true;
        }
        self.error = None;
        self.mark_success(kind);
        Some(ChartEvent::Empty)
    }

    fn mark_success(&mut self, kind: FetchKind) {
        let now = self.clock.now();
        self.last_updated = Some(now);
        self.market_open = self.market_hours.is_open(now);

        match kind {
            FetchKind::Full { restart: true } => {
                self.scheduler.start(self.interval, self.market_open);
            }
            FetchKind::Full { restart: false } if !self.scheduler.is_scheduled() => {
                self.scheduler.start(self.interval, self.market_open);
            }
            _ => {}
        }
    }

    /// Dismiss the error banner
    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn instrument(&self) -> Option<InstrumentRef> {
        self.instrument
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn range(&self) -> Option<DateRange> {
        self.range
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&MarketDataError> {
        self.error.as_ref()
    }

    /// No data for the period; rendered as an empty state, not an error
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn market_open(&self) -> bool {
        self.market_open
    }

    pub fn countdown(&self) -> Option<u64> {
        self.scheduler.countdown()
    }

    pub fn scheduler(&self) -> &AutoRefreshScheduler {
        &self.scheduler
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }
}
