//! Candle data structure, intervals and helpers

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::backend::types::InstrumentRef;

/// Candle interval selectable on a chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    OneDay,
}

impl Interval {
    pub const ALL: [Interval; 6] = [
        Interval::OneMinute,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::OneDay,
    ];

    /// Code sent to the backend as `interval=`
    pub fn code(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "60m",
            Interval::OneDay => "1d",
        }
    }

    /// Auto-refresh period, `None` for daily candles
    pub fn refresh_period(&self) -> Option<Duration> {
        let secs = match self {
            Interval::OneMinute => 60,
            Interval::FiveMinutes => 300,
            Interval::FifteenMinutes => 900,
            Interval::ThirtyMinutes => 1800,
            Interval::OneHour => 3600,
            Interval::OneDay => return None,
        };
        Some(Duration::from_secs(secs))
    }

    pub fn is_intraday(&self) -> bool {
        !matches!(self, Interval::OneDay)
    }

    /// Default history window for ranged requests
    pub fn default_lookback(&self) -> chrono::Duration {
        match self {
            Interval::OneMinute => chrono::Duration::days(5),
            Interval::FiveMinutes | Interval::FifteenMinutes => chrono::Duration::days(30),
            Interval::ThirtyMinutes | Interval::OneHour => chrono::Duration::days(90),
            Interval::OneDay => chrono::Duration::days(180),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "1m" => Ok(Interval::OneMinute),
            "5" | "5m" => Ok(Interval::FiveMinutes),
            "15" | "15m" => Ok(Interval::FifteenMinutes),
            "30" | "30m" => Ok(Interval::ThirtyMinutes),
            "60" | "60m" | "1h" => Ok(Interval::OneHour),
            "d" | "1d" => Ok(Interval::OneDay),
            other => Err(format!(
                "Unknown interval '{}'. Supported: 1m, 5m, 15m, 30m, 1h, 1d",
                other
            )),
        }
    }
}

/// Inclusive calendar date range for ranged candle requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, String> {
        if from > to {
            return Err(format!("Range start {} is after end {}", from, to));
        }
        Ok(Self { from, to })
    }

    /// Range ending on `to` covering the interval's default lookback
    pub fn ending_on(to: NaiveDate, interval: Interval) -> Self {
        Self {
            from: to - interval.default_lookback(),
            to,
        }
    }

    /// Range ending on the exchange-local date of `now`
    pub fn ending_at(now: DateTime<Utc>, offset: FixedOffset, interval: Interval) -> Self {
        Self::ending_on(now.with_timezone(&offset).date_naive(), interval)
    }

    pub fn ending_today(offset: FixedOffset, interval: Interval) -> Self {
        Self::ending_at(Utc::now(), offset, interval)
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }
}

/// Candle fetch mode: interval-driven intraday, or an explicit date range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleRequest {
    Interval(Interval),
    Range { interval: Interval, range: DateRange },
}

impl CandleRequest {
    pub fn interval(&self) -> Interval {
        match self {
            CandleRequest::Interval(interval) => *interval,
            CandleRequest::Range { interval, .. } => *interval,
        }
    }
}

/// One OHLCV bucket
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub instrument: InstrumentRef,
    pub interval: Interval,
    pub bucket_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Sort candles ascending by bucket and collapse duplicate buckets to the last one received
pub fn normalize_candles(mut candles: Vec<Candle>) -> Vec<Candle> {
    // stable sort keeps arrival order within a bucket
    candles.sort_by_key(|candle| candle.bucket_start);

    let mut normalized: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match normalized.last_mut() {
            Some(last) if last.bucket_start == candle.bucket_start => *last = candle,
            _ => normalized.push(candle),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::Exchange;
    use chrono::TimeZone;

    fn candle_at(minute: u32, close: f64) -> Candle {
        Candle {
            instrument: InstrumentRef::cash(1660, Exchange::Nse),
            interval: Interval::OneMinute,
            bucket_start: Utc.with_ymd_and_hms(2024, 7, 15, 4, minute, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1,
        }
    }

    #[test]
    fn test_interval_parsing_and_periods() {
        assert_eq!("5m".parse::<Interval>().unwrap(), Interval::FiveMinutes);
        assert_eq!("60".parse::<Interval>().unwrap(), Interval::OneHour);
        assert_eq!("1D".parse::<Interval>().unwrap(), Interval::OneDay);
        assert!("2m".parse::<Interval>().is_err());

        assert_eq!(Interval::FiveMinutes.refresh_period(), Some(Duration::from_secs(300)));
        assert_eq!(Interval::OneHour.code(), "60m");
        assert_eq!(Interval::OneDay.refresh_period(), None);
    }

    #[test]
    fn test_date_range() {
        let to = NaiveDate::from_ymd_opt(2024, 7, 15).unwrap();
        let range = DateRange::ending_on(to, Interval::OneMinute);
        assert_eq!(range.from(), NaiveDate::from_ymd_opt(2024, 7, 10).unwrap());
        assert!(DateRange::new(to, range.from()).is_err());
    }

    #[test]
    fn test_range_ends_on_exchange_date() {
        use chrono::TimeZone;

        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        // 00:30 IST on the 15th is still the 14th in UTC
        let now = Utc.with_ymd_and_hms(2024, 7, 14, 19, 0, 0).unwrap();
        let range = DateRange::ending_at(now, ist, Interval::OneDay);
        assert_eq!(range.to(), NaiveDate::from_ymd_opt(2024, 7, 15).unwrap());
        assert_eq!(range.from(), NaiveDate::from_ymd_opt(2024, 1, 17).unwrap());
    }

    #[test]
    fn test_normalize_sorts_and_dedups() {
        let candles = vec![candle_at(2, 3.0), candle_at(0, 1.0), candle_at(2, 4.0), candle_at(1, 2.0)];
        let normalized = normalize_candles(candles);
        let closes: Vec<f64> = normalized.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 4.0]);
    }
}
