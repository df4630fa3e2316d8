use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use scripwatch::{
    AppResult,
    backend::{BackendRestClient, Exchange, ExchangeType, InstrumentRef, LiveFeedClient},
    backend::websocket::FeedSettings,
    cli::{Cli, Commands, InstrumentArgs},
    config::Config,
    init_logging,
    market_data::{CandleRequest, DateRange, Interval},
    session::{CommandRouter, SessionContext, ViewSession},
    ui::cli as output,
};

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse_args();

    if let Commands::Config { action } = &cli.command {
        Config::handle_command(action, &cli.config_file)?;
        return Ok(());
    }

    // Load configuration
    let config = Config::load_or_default(&cli.config_file);

    // Initialize logging
    let _log_guard = init_logging(
        &cli.effective_log_level(&config.log_level),
        &config.log.file_path,
    )?;

    tracing::info!("Scripwatch starting...");
    tracing::debug!("CLI arguments: {:?}", cli);

    let session = SessionContext::init(config);
    let result = run(&cli, session.clone()).await;
    session.logout();

    result?;
    Ok(())
}

async fn run(cli: &Cli, session: Arc<SessionContext>) -> Result<()> {
    let config = session.config().clone();
    let market_hours = config.market.market_hours()?;
    let client = BackendRestClient::new(session)?;

    match &cli.command {
        Commands::Watch {
            instrument,
            interval,
        } => {
            let interval = resolve_interval(interval.as_deref(), &config)?;
            let default_exchange = config.chart.exchange()?;
            let instrument = resolve_instrument(instrument, &client, &config).await?;

            output::display_welcome_page().map_err(|e| anyhow::anyhow!(e))?;

            let feed = LiveFeedClient::spawn(FeedSettings::from_config(&config.backend));
            let mut view = ViewSession::new(Arc::new(client), feed, market_hours, interval);
            view.open(instrument)?;
            let input = view.attach_stdin(CommandRouter::new(default_exchange));

            let result = view.run().await;
            input.abort();
            result
        }

        Commands::Snapshot { instrument } => {
            let instrument = resolve_instrument(instrument, &client, &config).await?;
            let snapshot = client.get_snapshot(&instrument).await?;
            output::display_snapshot(&snapshot, market_hours.offset()).map_err(|e| anyhow::anyhow!(e))
        }

        Commands::Candles {
            instrument,
            interval,
            from,
            to,
            lookback,
        } => {
            let interval = resolve_interval(interval.as_deref(), &config)?;
            let instrument = resolve_instrument(instrument, &client, &config).await?;
            let request = match (from, to) {
                (Some(from), Some(to)) => {
                    let range = DateRange::new(parse_date(from)?, parse_date(to)?)
                        .map_err(|e| anyhow::anyhow!(e))?;
                    CandleRequest::Range { interval, range }
                }
                (None, Some(to)) => CandleRequest::Range {
                    interval,
                    range: DateRange::ending_on(parse_date(to)?, interval),
                },
                _ if *lookback => CandleRequest::Range {
                    interval,
                    range: DateRange::ending_today(market_hours.offset(), interval),
                },
                _ => CandleRequest::Interval(interval),
            };

            let candles = client.get_candles(&instrument, request).await?;
            output::display_candles(&candles, market_hours.offset()).map_err(|e| anyhow::anyhow!(e))
        }

        Commands::Search { symbol, exchange } => {
            let exchange = resolve_exchange(exchange.as_deref(), &config)?;
            let results = client.search_scrip_codes(symbol, exchange).await?;
            output::display_search_results(symbol, &results).map_err(|e| anyhow::anyhow!(e))
        }

        Commands::MarketStatus => {
            let now = Utc::now();
            output::display_market_status(market_hours.is_open(now), now, market_hours.offset())
                .map_err(|e| anyhow::anyhow!(e))
        }

        Commands::Config { .. } => Ok(()),
    }
}

fn resolve_interval(value: Option<&str>, config: &Config) -> Result<Interval> {
    match value {
        Some(code) => code.parse::<Interval>().map_err(|e| anyhow::anyhow!(e)),
        None => config.chart.interval(),
    }
}

fn resolve_exchange(value: Option<&str>, config: &Config) -> Result<Exchange> {
    match value {
        Some(code) => {
            Exchange::parse(code).with_context(|| format!("Unknown exchange '{}', expected N or B", code))
        }
        None => config.chart.exchange(),
    }
}

async fn resolve_instrument(
    args: &InstrumentArgs,
    client: &BackendRestClient,
    config: &Config,
) -> Result<InstrumentRef> {
    let exchange = resolve_exchange(args.exchange.as_deref(), config)?;
    let exchange_type = ExchangeType::parse(&args.segment)
        .with_context(|| format!("Unknown segment '{}', expected C or D", args.segment))?;

    let scrip_code = match (args.scrip, &args.symbol) {
        (Some(code), _) => code,
        (None, Some(symbol)) => {
            let results = client.search_scrip_codes(symbol, exchange).await?;
            let first = results
                .first()
                .with_context(|| format!("No scrip code found for symbol {}", symbol))?;
            tracing::info!("Resolved {} to scrip code {}", symbol, first.scrip_code);
            first.scrip_code
        }
        (None, None) => anyhow::bail!("Either a scrip code or --symbol is required"),
    };

    Ok(InstrumentRef::new(scrip_code, exchange, exchange_type))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))
}
