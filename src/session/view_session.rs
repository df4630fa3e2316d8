//! View session: one instrument view with its price line and chart
//!
//! All controller state is owned by the session task and mutated from its
//! select loop, one event at a time.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use super::action_channel::{ActionChannel, SessionEvent};
use super::command_router::{CommandRouter, InteractiveCommand};
use crate::backend::{CandleFetcher, InstrumentRef, LiveFeedClient, SnapshotFetcher};
use crate::market_data::{
    ChartController, ChartEvent, Clock, Interval, MarketHours, PriceDisplayController, PriceEvent,
    SystemClock,
};
use crate::ui::{ChartSummary, cli};

/// Session state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    ShuttingDown,
    Terminated,
}

/// Session statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub commands_processed: u64,
    pub price_events: u64,
    pub chart_events: u64,
    pub errors_encountered: u64,
}

pub struct ViewSession<B, C = SystemClock> {
    price: PriceDisplayController<B>,
    chart: ChartController<B, C>,
    action_channel: ActionChannel,
    market_hours: MarketHours,
    state: SessionState,
    stats: SessionStats,
    render: bool,
}

impl<B> ViewSession<B, SystemClock>
where
    B: SnapshotFetcher + CandleFetcher,
{
    pub fn new(
        backend: Arc<B>,
        feed: LiveFeedClient,
        market_hours: MarketHours,
        interval: Interval,
    ) -> Self {
        Self::with_clock(backend, feed, Arc::new(SystemClock), market_hours, interval)
    }
}

impl<B, C> ViewSession<B, C>
where
    B: SnapshotFetcher + CandleFetcher,
    C: Clock,
{
    pub fn with_clock(
        backend: Arc<B>,
        feed: LiveFeedClient,
        clock: Arc<C>,
        market_hours: MarketHours,
        interval: Interval,
    ) -> Self {
        Self {
            price: PriceDisplayController::new(backend.clone(), feed),
            chart: ChartController::with_clock(backend, clock, market_hours, interval),
            action_channel: ActionChannel::new(),
            market_hours,
            state: SessionState::Starting,
            stats: SessionStats::default(),
            render: true,
        }
    }

    /// Silence terminal output
    pub fn quiet(mut self) -> Self {
        self.render = false;
        self
    }

    /// Sender for commands from outside the loop
    pub fn action_sender(&self) -> ActionChannel {
        self.action_channel.clone()
    }

    /// Feed stdin into the session
    pub fn attach_stdin(&self, router: CommandRouter) -> tokio::task::JoinHandle<()> {
        router.spawn_stdin_reader(self.action_channel.clone())
    }

    /// Show `instrument` in both the price line and the chart
    pub fn open(&mut self, instrument: InstrumentRef) -> Result<()> {
        info!("Opening view for {}", instrument);
        self.price.open(instrument)?;
        self.chart.set_instrument(instrument);
        self.render_price();
        self.render_chart();
        Ok(())
    }

    pub fn price(&self) -> &PriceDisplayController<B> {
        &self.price
    }

    pub fn chart(&self) -> &ChartController<B, C> {
        &self.chart
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Run until quit, then tear the view down
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting view session loop");
        self.state = SessionState::Running;

        while self.state == SessionState::Running {
            tokio::select! {
                Some(event) = self.action_channel.next_event() => {
                    if let Err(e) = self.handle_event(event) {
                        self.stats.errors_encountered += 1;
                        error!("Command failed: {}", e);
                    }
                }

                price_event = self.price.next_event() => {
                    self.stats.price_events += 1;
                    match price_event {
                        Ok(event) => self.handle_price_event(event),
                        Err(e) => {
                            self.stats.errors_encountered += 1;
                            error!("Live feed error: {}", e);
                        }
                    }
                }

                chart_event = self.chart.next_event() => {
                    self.stats.chart_events += 1;
                    self.handle_chart_event(chart_event);
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received interrupt");
                    self.state = SessionState::ShuttingDown;
                }
            }
        }

        self.shutdown().await
    }

    fn handle_event(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::UserCommand { command } => self.handle_command(command)?,
            SessionEvent::Error { message } => {
                self.stats.errors_encountered += 1;
                if self.render {
                    let _ = cli::display_error(&message);
                }
            }
            SessionEvent::InputClosed => {
                info!("Input closed, session keeps running until interrupted");
            }
            SessionEvent::ShutdownRequested => {
                info!("Shutdown requested");
                self.state = SessionState::ShuttingDown;
            }
        }
        Ok(())
    }

    /// Handle user command
    pub fn handle_command(&mut self, command: InteractiveCommand) -> Result<()> {
        debug!("Handling command: {:?}", command);
        self.stats.commands_processed += 1;

        match command {
            InteractiveCommand::Interval { interval } => {
                self.chart.select_interval(interval);
                self.render_chart();
            }
            InteractiveCommand::Range { range } => {
                let interval = self.chart.interval();
                self.chart.select_range(interval, range);
                self.render_chart();
            }
            InteractiveCommand::Open { instrument } => self.open(instrument)?,
            InteractiveCommand::Retry => {
                if self.price.error().is_some() {
                    self.price.reload()?;
                    self.render_price();
                }
                self.chart.retry();
                self.render_chart();
            }
            InteractiveCommand::Dismiss => {
                self.price.dismiss_error();
                self.chart.dismiss_error();
                self.render_chart();
            }
            InteractiveCommand::Reconnect => {
                self.price.reconnect()?;
                info!("Requested live feed reconnect");
            }
            InteractiveCommand::Status => {
                if self.render {
                    let feed = self.price.feed();
                    let _ = cli::display_status(&feed.status(), &feed.stats());
                    let now = chrono::Utc::now();
                    let _ = cli::display_market_status(
                        self.market_hours.is_open(now),
                        now,
                        self.market_hours.offset(),
                    );
                }
            }
            InteractiveCommand::Help => {
                if self.render {
                    let _ = cli::display_help(CommandRouter::help_messages());
                }
            }
            InteractiveCommand::Quit => {
                info!("Quit requested");
                self.state = SessionState::ShuttingDown;
            }
        }
        Ok(())
    }

    fn handle_price_event(&mut self, event: PriceEvent) {
        match &event {
            PriceEvent::SnapshotFailed { error } => {
                self.stats.errors_encountered += 1;
                warn!("Quote unavailable: {}", error);
            }
            PriceEvent::StatusChanged { status } => info!("Live feed status: {:?}", status),
            PriceEvent::SnapshotLoaded { .. } | PriceEvent::Tick { .. } => {}
        }
        self.render_price();
    }

    fn handle_chart_event(&mut self, event: ChartEvent) {
        match &event {
            ChartEvent::Failed { error, silent } => {
                self.stats.errors_encountered += 1;
                warn!("Chart fetch failed (silent: {}): {}", silent, error);
            }
            ChartEvent::Refreshing => {
                debug!("Silent chart refresh started");
                return;
            }
            ChartEvent::Updated { .. } | ChartEvent::Empty => {}
        }
        self.render_chart();
    }

    fn render_price(&self) {
        if !self.render {
            return;
        }
        let view = self.price.view();
        if let Err(e) = cli::display_price(
            view.as_ref(),
            self.price.badge(),
            self.price.is_loading(),
            self.price.error(),
        ) {
            warn!("Failed to render price: {}", e);
        }
    }

    fn render_chart(&self) {
        if !self.render {
            return;
        }
        let summary = ChartSummary::from_controller(&self.chart);
        if let Err(e) = cli::display_chart(&summary, self.market_hours.offset()) {
            warn!("Failed to render chart: {}", e);
        }
    }

    /// Stop the chart timers, then unsubscribe and close the feed
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state == SessionState::Terminated {
            return Ok(());
        }
        self.state = SessionState::ShuttingDown;
        info!("Shutting down view session");

        self.chart.close();
        self.price.close().await?;

        self.state = SessionState::Terminated;
        info!(
            "View session terminated after {} commands",
            self.stats.commands_processed
        );
        Ok(())
    }
}
