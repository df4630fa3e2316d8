//! Backend data types, wire payloads and error taxonomy

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::market_data::candle::{Candle, Interval};

/// Exchange an instrument is listed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    #[serde(rename = "N")]
    Nse,
    #[serde(rename = "B")]
    Bse,
}

impl Exchange {
    /// Single-letter code used on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Exchange::Nse => "N",
            Exchange::Bse => "B",
        }
    }

    /// Parse `N`, `NSE`, `B` or `BSE` (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "N" | "NSE" => Some(Exchange::Nse),
            "B" | "BSE" => Some(Exchange::Bse),
            _ => None,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Nse => write!(f, "NSE"),
            Exchange::Bse => write!(f, "BSE"),
        }
    }
}

/// Market segment of an instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeType {
    #[serde(rename = "C")]
    Cash,
    #[serde(rename = "D")]
    Derivative,
}

impl ExchangeType {
    pub fn code(&self) -> &'static str {
        match self {
            ExchangeType::Cash => "C",
            ExchangeType::Derivative => "D",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "C" | "CASH" => Some(ExchangeType::Cash),
            "D" | "DERIVATIVE" => Some(ExchangeType::Derivative),
            _ => None,
        }
    }
}

/// Identity of a tradable instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentRef {
    pub scrip_code: u32,
    pub exchange: Exchange,
    pub exchange_type: ExchangeType,
}

impl InstrumentRef {
    pub fn new(scrip_code: u32, exchange: Exchange, exchange_type: ExchangeType) -> Self {
        Self {
            scrip_code,
            exchange,
            exchange_type,
        }
    }

    /// Cash-segment instrument on the given exchange
    pub fn cash(scrip_code: u32, exchange: Exchange) -> Self {
        Self::new(scrip_code, exchange, ExchangeType::Cash)
    }
}

impl fmt::Display for InstrumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}/{}",
            self.scrip_code,
            self.exchange.code(),
            self.exchange_type.code()
        )
    }
}

/// Connection status for the live feed
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Point-in-time quote for an instrument
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub instrument: InstrumentRef,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub prev_close: f64,
    pub volume: u64,
    pub week52_high: f64,
    pub week52_low: f64,
    pub upper_circuit: f64,
    pub lower_circuit: f64,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot body returned by `GET /snapshot/{scrip}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    #[serde(deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(default, deserialize_with = "de_f64_or_zero")]
    pub change: f64,
    #[serde(default, deserialize_with = "de_f64_or_zero")]
    pub change_percent: f64,
    #[serde(default, deserialize_with = "de_f64_or_zero")]
    pub open: f64,
    #[serde(default, deserialize_with = "de_f64_or_zero")]
    pub high: f64,
    #[serde(default, deserialize_with = "de_f64_or_zero")]
    pub low: f64,
    #[serde(default, deserialize_with = "de_f64_or_zero")]
    pub volume: f64,
    #[serde(default, deserialize_with = "de_f64_or_zero")]
    pub prev_close: f64,
    #[serde(default, deserialize_with = "de_f64_or_zero")]
    pub week52_high: f64,
    #[serde(default, deserialize_with = "de_f64_or_zero")]
    pub week52_low: f64,
    #[serde(default, deserialize_with = "de_f64_or_zero")]
    pub upper_circuit: f64,
    #[serde(default, deserialize_with = "de_f64_or_zero")]
    pub lower_circuit: f64,
}

impl SnapshotPayload {
    pub fn into_snapshot(self, instrument: InstrumentRef, timestamp: DateTime<Utc>) -> Snapshot {
        Snapshot {
            instrument,
            price: self.price,
            change: self.change,
            change_percent: self.change_percent,
            open: self.open,
            high: self.high,
            low: self.low,
            prev_close: self.prev_close,
            volume: self.volume.max(0.0) as u64,
            week52_high: self.week52_high,
            week52_low: self.week52_low,
            upper_circuit: self.upper_circuit,
            lower_circuit: self.lower_circuit,
            timestamp,
        }
    }
}

/// One candle as returned by `GET /historical/{scrip}`
#[derive(Debug, Clone, Deserialize)]
pub struct CandlePayload {
    #[serde(alias = "date")]
    pub time: Value,
    #[serde(deserialize_with = "de_f64")]
    pub open: f64,
    #[serde(deserialize_with = "de_f64")]
    pub high: f64,
    #[serde(deserialize_with = "de_f64")]
    pub low: f64,
    #[serde(deserialize_with = "de_f64")]
    pub close: f64,
    #[serde(default, deserialize_with = "de_f64_or_zero")]
    pub volume: f64,
}

impl CandlePayload {
    /// Convert to a domain candle, reading naive timestamps as exchange-local time
    pub fn into_candle(
        self,
        instrument: InstrumentRef,
        interval: Interval,
        exchange_offset: FixedOffset,
    ) -> Result<Candle, MarketDataError> {
        let bucket_start = parse_bucket_time(&self.time, exchange_offset).ok_or_else(|| {
            MarketDataError::Malformed(format!("Unrecognised candle time: {}", self.time))
        })?;

        Ok(Candle {
            instrument,
            interval,
            bucket_start,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume.max(0.0) as u64,
        })
    }
}

/// Body of `GET /historical/{scrip}`
#[derive(Debug, Clone, Deserialize)]
pub struct HistoricalResponse {
    #[serde(default)]
    pub candles: Vec<CandlePayload>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One symbol search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScripMatch {
    pub name: String,
    #[serde(default)]
    pub exchange: String,
    pub scrip_code: u32,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Body of `GET /search-scripcode`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<ScripMatch>,
}

/// Error body the backend attaches to non-success responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn describe(&self) -> Option<String> {
        match (&self.error, &self.message) {
            (Some(error), Some(message)) => Some(format!("{}: {}", error, message)),
            (Some(text), None) | (None, Some(text)) => Some(text.clone()),
            (None, None) => None,
        }
    }
}

/// Incremental live price update
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub scrip_code: u32,
    pub last_traded_price: f64,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<u64>,
    pub received_at: DateTime<Utc>,
}

const SCRIP_CODE_KEYS: [&str; 5] = ["ScripCode", "scrip_code", "Scripcode", "scripCode", "Token"];
const PRICE_KEYS: [&str; 4] = ["LastTradedPrice", "LastRate", "LTP", "ltp"];

impl Tick {
    /// Parse a `stock_update` object
    pub fn from_value(value: &Value, received_at: DateTime<Utc>) -> Result<Self, FeedError> {
        let object = value
            .as_object()
            .ok_or_else(|| FeedError::ParseError("stock_update is not an object".to_string()))?;

        let scrip_code = first_number(object, &SCRIP_CODE_KEYS)
            .filter(|code| *code > 0.0 && code.fract() == 0.0 && *code <= u32::MAX as f64)
            .ok_or_else(|| FeedError::ParseError("stock_update without scrip code".to_string()))?
            as u32;

        let last_traded_price = first_number(object, &PRICE_KEYS)
            .filter(|price| price.is_finite() && *price > 0.0)
            .ok_or_else(|| {
                FeedError::ParseError(format!("stock_update for {} without price", scrip_code))
            })?;

        Ok(Self {
            scrip_code,
            last_traded_price,
            high: object.get("High").and_then(value_as_f64),
            low: object.get("Low").and_then(value_as_f64),
            volume: first_number(object, &["Volume", "TotalQty"]).map(|v| v.max(0.0) as u64),
            received_at,
        })
    }
}

/// Outbound live-feed message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    SubscribeStock {
        scrip_code: u32,
        exchange: Exchange,
        exchange_type: ExchangeType,
    },
    UnsubscribeStock {
        scrip_code: u32,
    },
}

impl OutboundMessage {
    pub fn subscribe(instrument: &InstrumentRef) -> Self {
        OutboundMessage::SubscribeStock {
            scrip_code: instrument.scrip_code,
            exchange: instrument.exchange,
            exchange_type: instrument.exchange_type,
        }
    }

    pub fn unsubscribe(scrip_code: u32) -> Self {
        OutboundMessage::UnsubscribeStock { scrip_code }
    }
}

/// Inbound event names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEventType {
    ConnectionResponse,
    Subscribed,
    Unsubscribed,
    StockUpdate,
    Error,
}

/// Decoded inbound live-feed message
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// Handshake ack
    ConnectionAck,
    Subscribed { data: Value },
    Unsubscribed { data: Value },
    /// Valid ticks from one `stock_update` frame plus the count of entries dropped as malformed
    Ticks { ticks: Vec<Tick>, dropped: usize },
    ServerError { message: String },
    Ping,
    Pong,
    Unknown { event: String },
}

/// Market data error taxonomy surfaced to controllers
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarketDataError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Instrument not found: {0}")]
    NotFound(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("No data for the requested period")]
    EmptyResult,
    #[error("Live feed connection lost")]
    ConnectionLost,
}

impl MarketDataError {
    /// `EmptyResult` is a valid outcome rendered as an empty state, not an error banner
    pub fn is_failure(&self) -> bool {
        !matches!(self, MarketDataError::EmptyResult)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MarketDataError::Network(_)
                | MarketDataError::ServiceUnavailable(_)
                | MarketDataError::ConnectionLost
        )
    }
}

/// Error types for live-feed operations
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Feed connection error: {0}")]
    ConnectionError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Feed client is closed")]
    Closed,
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Read a JSON number or numeric string
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn first_number(object: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find_map(value_as_f64)
}

fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_as_f64(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected a number, got {}", value)))
}

fn de_f64_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_as_f64(&value).unwrap_or(0.0))
}

/// Parse a candle bucket timestamp
///
/// Accepts epoch seconds or milliseconds, RFC3339, naive ISO datetimes (read as
/// exchange-local time) and plain dates (exchange-local midnight).
pub fn parse_bucket_time(value: &Value, exchange_offset: FixedOffset) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw > 100_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            let naive = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                })?;
            exchange_offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        }
        _ => None,
    }
}
