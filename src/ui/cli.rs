//! Simple CLI output implementation
//!
//! Provides line-oriented output for quotes, charts and feed status.

use chrono::{DateTime, FixedOffset, Utc};
use colored::{ColoredString, Colorize};

use super::ChartSummary;
use crate::AppResult;
use crate::backend::{ConnectionStatus, MarketDataError, ScripMatch, Snapshot};
use crate::market_data::{Candle, PriceBadge, PriceSource, PriceView};
use crate::metrics::FeedStatsSnapshot;

fn signed(value: f64, text: String) -> ColoredString {
    if value > 0.0 {
        text.green()
    } else if value < 0.0 {
        text.red()
    } else {
        text.normal()
    }
}

fn badge_label(badge: PriceBadge) -> ColoredString {
    match badge {
        PriceBadge::Live => badge.to_string().black().on_green().bold(),
        PriceBadge::Delayed => badge.to_string().black().on_yellow().bold(),
    }
}

fn local_time(time: DateTime<Utc>, offset: FixedOffset) -> String {
    time.with_timezone(&offset).format("%H:%M:%S").to_string()
}

/// Print the welcome banner for a watch session
pub fn display_welcome_page() -> AppResult<()> {
    println!();
    println!("{}", "┌─ Scripwatch ─────────────────────────────────────────────┐".cyan());
    println!("{}", "│   Live quotes and candle charts for NSE/BSE instruments   │".cyan());
    println!("{}", "│   Type 'help' for commands, 'quit' to exit                │".cyan());
    println!("{}", "└──────────────────────────────────────────────────────────┘".cyan());
    println!();
    Ok(())
}

/// Banner follow-up: transient failures suggest a retry
pub fn error_hint(error: &MarketDataError) -> &'static str {
    if error.is_retryable() {
        "Type 'retry' to try again"
    } else {
        "Type 'dismiss' to hide, or 'open' another scrip"
    }
}

/// Print the price line of a watch session
pub fn display_price(
    view: Option<&PriceView>,
    badge: PriceBadge,
    loading: bool,
    error: Option<&MarketDataError>,
) -> AppResult<()> {
    if let Some(error) = error {
        println!("💲 {} {}", "Quote unavailable:".red().bold(), error);
        println!("   {}", error_hint(error));
        return Ok(());
    }

    let Some(view) = view else {
        if loading {
            println!("💲 {}", "Loading quote...".dimmed());
        }
        return Ok(());
    };

    let source = match view.source {
        PriceSource::Tick => "tick",
        PriceSource::Snapshot => "snapshot",
    };
    println!(
        "💲 {}  ₹{:.2}  {}  [{}] ({})",
        view.instrument.to_string().bold(),
        view.price,
        signed(
            view.change,
            format!("{:+.2} ({:+.2}%)", view.change, view.change_percent)
        ),
        badge_label(badge),
        source.dimmed()
    );
    println!(
        "   High: ₹{:.2}  Low: ₹{:.2}  Volume: {}",
        view.high, view.low, view.volume
    );
    Ok(())
}

/// Print the chart summary line of a watch session
pub fn display_chart(summary: &ChartSummary<'_>, offset: FixedOffset) -> AppResult<()> {
    let market = if summary.market_open {
        "market open".green()
    } else {
        "market closed".yellow()
    };
    let instrument = summary
        .instrument
        .map(|i| i.to_string())
        .unwrap_or_else(|| "-".to_string());

    println!("📈 {} {} ({})", instrument.bold(), summary.interval, market);

    if summary.loading {
        println!("   {}", "Loading candles...".dimmed());
    }

    if let Some(error) = summary.error {
        println!("   {} {}", "Chart error:".red().bold(), error);
        println!("   {}", error_hint(error));
    }

    if summary.empty {
        println!("   No candles for this period");
    } else if let (Some(last), Some((high, low))) = (summary.candles.last(), summary.range()) {
        println!(
            "   {} candles  Last: O {:.2} H {:.2} L {:.2} C {:.2}  Range: {:.2} - {:.2}",
            summary.candles.len(),
            last.open,
            last.high,
            last.low,
            last.close,
            low,
            high
        );
        if let Some((change, percent)) = summary.series_change() {
            println!(
                "   Series change: {}",
                signed(change, format!("{:+.2} ({:+.2}%)", change, percent))
            );
        }
    }

    let mut footer = Vec::new();
    if let Some(updated) = summary.last_updated {
        footer.push(format!("updated {}", local_time(updated, offset)));
    }
    if let Some(countdown) = summary.countdown {
        footer.push(format!("next refresh in {}s", countdown));
    }
    if !footer.is_empty() {
        println!("   {}", footer.join(" | ").dimmed());
    }

    Ok(())
}

/// Print a full snapshot
pub fn display_snapshot(snapshot: &Snapshot, offset: FixedOffset) -> AppResult<()> {
    println!("📊 {}", snapshot.instrument.to_string().bold());
    println!(
        "   Price: ₹{:.2} {}",
        snapshot.price,
        signed(
            snapshot.change,
            format!("{:+.2} ({:+.2}%)", snapshot.change, snapshot.change_percent)
        )
    );
    println!(
        "   Open: ₹{:.2}  High: ₹{:.2}  Low: ₹{:.2}  Prev close: ₹{:.2}",
        snapshot.open, snapshot.high, snapshot.low, snapshot.prev_close
    );
    println!("   Volume: {}", snapshot.volume);
    println!(
        "   52w: ₹{:.2} - ₹{:.2}  Circuit: ₹{:.2} - ₹{:.2}",
        snapshot.week52_low, snapshot.week52_high, snapshot.lower_circuit, snapshot.upper_circuit
    );
    println!("   As of {}", local_time(snapshot.timestamp, offset).dimmed());
    Ok(())
}

/// Print a candle table
pub fn display_candles(candles: &[Candle], offset: FixedOffset) -> AppResult<()> {
    if candles.is_empty() {
        println!("No candles for this period");
        return Ok(());
    }

    println!(
        "{:<17} {:>10} {:>10} {:>10} {:>10} {:>12}",
        "Time", "Open", "High", "Low", "Close", "Volume"
    );
    for candle in candles {
        let line = format!(
            "{:<17} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>12}",
            candle
                .bucket_start
                .with_timezone(&offset)
                .format(if candle.interval.is_intraday() {
                    "%Y-%m-%d %H:%M"
                } else {
                    "%Y-%m-%d"
                }),
            candle.open,
            candle.high,
            candle.low,
            candle.close,
            candle.volume
        );
        println!("{}", signed(candle.close - candle.open, line));
    }
    Ok(())
}

/// Print symbol search results
pub fn display_search_results(symbol: &str, results: &[ScripMatch]) -> AppResult<()> {
    println!("🔍 Results for {}:", symbol.bold());
    if results.is_empty() {
        println!("   (No matches)");
    } else {
        for (i, result) in results.iter().enumerate() {
            println!(
                "   {}. {} [{}] scrip {}  {}",
                i + 1,
                result.name,
                result.exchange,
                result.scrip_code.to_string().bold(),
                result.full_name.as_deref().unwrap_or("").dimmed()
            );
        }
    }
    Ok(())
}

/// Print whether the exchange is open
pub fn display_market_status(open: bool, now: DateTime<Utc>, offset: FixedOffset) -> AppResult<()> {
    let state = if open { "OPEN".green().bold() } else { "CLOSED".red().bold() };
    println!(
        "🕘 Market is {} ({})",
        state,
        now.with_timezone(&offset).format("%a %Y-%m-%d %H:%M")
    );
    Ok(())
}

/// Print feed connection status and counters
pub fn display_status(status: &ConnectionStatus, stats: &FeedStatsSnapshot) -> AppResult<()> {
    let state = match status {
        ConnectionStatus::Connected => "Connected".green(),
        ConnectionStatus::Connecting => "Connecting".yellow(),
        ConnectionStatus::Reconnecting { attempt } => format!("Reconnecting (attempt {})", attempt).yellow(),
        ConnectionStatus::Disconnected => "Disconnected".red(),
        ConnectionStatus::Failed(reason) => format!("Failed: {}", reason).red(),
    };

    println!("🔍 Live feed status:");
    println!("   Connection: {}", state);
    println!("   Ticks: {} ({:.1}/s)", stats.ticks, stats.ticks_per_second);
    println!("   Dropped frames: {}", stats.dropped_frames);
    println!("   Connections: {}", stats.connections);
    println!("   Reconnect attempts: {}", stats.reconnect_attempts);
    if matches!(status, ConnectionStatus::Failed(_)) {
        println!("   Type 'reconnect' to try again");
    }
    Ok(())
}

/// Print interactive command help
pub fn display_help(lines: &[&str]) -> AppResult<()> {
    println!("Commands:");
    for line in lines {
        println!("  {}", line);
    }
    Ok(())
}

pub fn display_error(message: &str) -> AppResult<()> {
    println!("{} {}", "Error:".red().bold(), message);
    Ok(())
}
