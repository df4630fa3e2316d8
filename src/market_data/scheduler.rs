//! Auto-refresh scheduler for chart data
//!
//! One start arms a pair of timers: a one-second countdown for display and a
//! refresh timer that emits a [`RefreshSignal`] every period. Market hours are
//! only consulted when starting; a market that closes mid-period still gets the
//! refreshes already scheduled.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use super::candle::Interval;

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No timers: daily interval, closed market, or never started
    Idle,
    /// Timers armed for `interval`
    Scheduled { interval: Interval },
    /// Torn down by its owner
    Stopped,
}

/// Request for a silent re-fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSignal {
    pub generation: u64,
}

pub struct AutoRefreshScheduler {
    state: SchedulerState,
    generation: u64,
    refresh_tx: mpsc::UnboundedSender<RefreshSignal>,
    countdown_tx: watch::Sender<Option<u64>>,
    timers: Option<(JoinHandle<()>, JoinHandle<()>)>,
    pairs_started: u64,
    pairs_stopped: u64,
}

impl AutoRefreshScheduler {
    /// Create an idle scheduler and the receiver its refresh signals arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RefreshSignal>) {
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let (countdown_tx, _) = watch::channel(None);

        let scheduler = Self {
            state: SchedulerState::Idle,
            generation: 0,
            refresh_tx,
            countdown_tx,
            timers: None,
            pairs_started: 0,
            pairs_stopped: 0,
        };
        (scheduler, refresh_rx)
    }

    /// (Re)arm the timers for `interval`
    ///
    /// Any running pair is stopped first. Returns whether a new pair was armed.
    pub fn start(&mut self, interval: Interval, market_open: bool) -> bool {
        self.cancel_timers();

        let Some(period) = interval.refresh_period() else {
            debug!("No auto-refresh for {} candles", interval);
            self.state = SchedulerState::Idle;
            return false;
        };
        if !market_open {
            info!("Market closed, auto-refresh for {} not started", interval);
            self.state = SchedulerState::Idle;
            return false;
        }

        self.generation += 1;
        let generation = self.generation;
        let period_secs = period.as_secs();

        let armed_at = Instant::now();

        self.countdown_tx.send_replace(Some(period_secs));
        let countdown_tx = self.countdown_tx.clone();
        let countdown = tokio::spawn(async move {
            let mut ticker = interval_at(armed_at + COUNTDOWN_STEP, COUNTDOWN_STEP);
            let mut remaining = period_secs;
            loop {
                ticker.tick().await;
                remaining = if remaining == 0 { period_secs } else { remaining - 1 };
                countdown_tx.send_replace(Some(remaining));
            }
        });

        let refresh_tx = self.refresh_tx.clone();
        let refresh = tokio::spawn(async move {
            let mut ticker = interval_at(armed_at + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                debug!("Auto-refresh timer fired (generation {})", generation);
                if refresh_tx.send(RefreshSignal { generation }).is_err() {
                    break;
                }
            }
        });

        self.timers = Some((countdown, refresh));
        self.pairs_started += 1;
        self.state = SchedulerState::Scheduled { interval };
        info!(
            "Auto-refresh scheduled every {}s for {} candles",
            period_secs, interval
        );
        true
    }

    /// Stop both timers unconditionally
    pub fn stop(&mut self) {
        if self.cancel_timers() {
            info!("Auto-refresh stopped");
        }
        self.state = SchedulerState::Stopped;
    }

    fn cancel_timers(&mut self) -> bool {
        // Bumping the generation turns any signal already queued into a stale one
        self.generation += 1;
        self.countdown_tx.send_replace(None);

        match self.timers.take() {
            Some((countdown, refresh)) => {
                countdown.abort();
                refresh.abort();
                self.pairs_stopped += 1;
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self.state, SchedulerState::Scheduled { .. })
    }

    /// Whether a signal belongs to the currently armed timer pair
    pub fn is_current(&self, signal: &RefreshSignal) -> bool {
        self.is_scheduled() && signal.generation == self.generation
    }

    /// Seconds until the next refresh, `None` when no countdown is shown
    pub fn countdown(&self) -> Option<u64> {
        *self.countdown_tx.borrow()
    }

    pub fn countdown_receiver(&self) -> watch::Receiver<Option<u64>> {
        self.countdown_tx.subscribe()
    }

    pub fn timer_pairs_started(&self) -> u64 {
        self.pairs_started
    }

    pub fn timer_pairs_stopped(&self) -> u64 {
        self.pairs_stopped
    }

    /// Armed pairs not yet stopped; never more than one
    pub fn active_timer_pairs(&self) -> u64 {
        self.pairs_started - self.pairs_stopped
    }
}

impl Drop for AutoRefreshScheduler {
    fn drop(&mut self) {
        if let Some((countdown, refresh)) = self.timers.take() {
            countdown.abort();
            refresh.abort();
        }
    }
}
