//! Command Router for interactive command processing

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use super::action_channel::{ActionChannel, SessionEvent};
use crate::backend::{Exchange, ExchangeType, InstrumentRef};
use crate::market_data::candle::{DateRange, Interval};

/// Interactive commands for a watch session
#[derive(Debug, Clone, PartialEq)]
pub enum InteractiveCommand {
    /// Switch the chart interval
    Interval { interval: Interval },
    /// Show an explicit date range at the current interval
    Range { range: DateRange },
    /// Show another instrument
    Open { instrument: InstrumentRef },
    /// Re-run the failed fetches
    Retry,
    /// Hide the current error banner
    Dismiss,
    /// Restart the live feed after it gave up
    Reconnect,
    /// Show connection and feed statistics
    Status,
    /// Show command help
    Help,
    /// Quit the session
    Quit,
}

/// Parses interactive input into commands
pub struct CommandRouter {
    /// Exchange assumed by `open` when none is given
    default_exchange: Exchange,
}

impl CommandRouter {
    pub fn new(default_exchange: Exchange) -> Self {
        Self { default_exchange }
    }

    /// Parse interactive command from string input
    pub fn parse_interactive_command(&self, input: &str) -> Result<Option<InteractiveCommand>> {
        let input = input.trim();

        if input.is_empty() {
            return Ok(None);
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        let name = parts[0].trim_start_matches('/').to_ascii_lowercase();

        match name.as_str() {
            "interval" | "i" => {
                let Some(code) = parts.get(1) else {
                    return Err(anyhow::anyhow!("Usage: interval <1m|5m|15m|30m|1h|1d>"));
                };
                let interval = code
                    .parse::<Interval>()
                    .map_err(|e| anyhow::anyhow!(e))?;
                Ok(Some(InteractiveCommand::Interval { interval }))
            }
            "range" => {
                let (Some(from), Some(to)) = (parts.get(1), parts.get(2)) else {
                    return Err(anyhow::anyhow!("Usage: range <YYYY-MM-DD> <YYYY-MM-DD>"));
                };
                let from = parse_date(from)?;
                let to = parse_date(to)?;
                let range = DateRange::new(from, to).map_err(|e| anyhow::anyhow!(e))?;
                Ok(Some(InteractiveCommand::Range { range }))
            }
            "open" | "o" => {
                let Some(code) = parts.get(1) else {
                    return Err(anyhow::anyhow!("Usage: open <scrip> [N|B] [C|D]"));
                };
                let scrip_code = code
                    .parse::<u32>()
                    .map_err(|_| anyhow::anyhow!("Invalid scrip code: {}", code))?;
                let exchange = match parts.get(2) {
                    Some(value) => Exchange::parse(value)
                        .ok_or_else(|| anyhow::anyhow!("Unknown exchange: {}", value))?,
                    None => self.default_exchange,
                };
                let exchange_type = match parts.get(3) {
                    Some(value) => ExchangeType::parse(value)
                        .ok_or_else(|| anyhow::anyhow!("Unknown segment: {}", value))?,
                    None => ExchangeType::Cash,
                };
                Ok(Some(InteractiveCommand::Open {
                    instrument: InstrumentRef::new(scrip_code, exchange, exchange_type),
                }))
            }
            "retry" | "r" => Ok(Some(InteractiveCommand::Retry)),
            "dismiss" | "d" => Ok(Some(InteractiveCommand::Dismiss)),
            "reconnect" => Ok(Some(InteractiveCommand::Reconnect)),
            "status" | "s" => Ok(Some(InteractiveCommand::Status)),
            "help" | "?" => Ok(Some(InteractiveCommand::Help)),
            "quit" | "exit" | "q" => Ok(Some(InteractiveCommand::Quit)),
            _ => Err(anyhow::anyhow!(
                "Unknown command: {}. Type 'help' for available commands.",
                parts[0]
            )),
        }
    }

    pub fn help_messages() -> &'static [&'static str] {
        &[
            "interval <1m|5m|15m|30m|1h|1d>  - Switch chart interval",
            "range <from> <to>                - Show a date range (YYYY-MM-DD)",
            "open <scrip> [N|B] [C|D]         - Show another instrument",
            "retry                            - Re-run failed fetches",
            "dismiss                          - Hide the error banner",
            "reconnect                        - Restart the live feed",
            "status                           - Show connection statistics",
            "help                             - Show this help",
            "quit                             - Exit",
        ]
    }

    /// Read stdin lines and forward them as session events until EOF
    pub fn spawn_stdin_reader(self, channel: ActionChannel) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let event = match self.parse_interactive_command(&line) {
                            Ok(Some(command)) => SessionEvent::UserCommand { command },
                            Ok(None) => continue,
                            Err(e) => SessionEvent::Error {
                                message: e.to_string(),
                            },
                        };
                        if channel.send_event(event).is_err() {
                            debug!("Session gone, stopping input reader");
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Input closed");
                        let _ = channel.send_event(SessionEvent::InputClosed);
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read input: {}", e);
                        let _ = channel.send_event(SessionEvent::InputClosed);
                        break;
                    }
                }
            }
        })
    }
}

fn parse_date(value: &str) -> Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("Invalid date: {} (expected YYYY-MM-DD)", value))
}
