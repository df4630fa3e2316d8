//! User Interface module
//!
//! Line-oriented terminal output for the watch session and one-shot commands.

/// Simple CLI output functions
pub mod cli;

use chrono::{DateTime, Utc};

use crate::backend::{CandleFetcher, InstrumentRef, MarketDataError};
use crate::market_data::{Candle, ChartController, Clock, Interval};

/// Everything the chart line needs, borrowed from a [`ChartController`]
#[derive(Debug, Clone)]
pub struct ChartSummary<'a> {
    pub instrument: Option<InstrumentRef>,
    pub interval: Interval,
    pub candles: &'a [Candle],
    pub loading: bool,
    pub error: Option<&'a MarketDataError>,
    pub empty: bool,
    pub countdown: Option<u64>,
    pub market_open: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl<'a> ChartSummary<'a> {
    pub fn from_controller<F: CandleFetcher, C: Clock>(chart: &'a ChartController<F, C>) -> Self {
        Self {
            instrument: chart.instrument(),
            interval: chart.interval(),
            candles: chart.candles(),
            loading: chart.is_loading(),
            error: chart.error(),
            empty: chart.is_empty(),
            countdown: chart.countdown(),
            market_open: chart.market_open(),
            last_updated: chart.last_updated(),
        }
    }

    /// Close-to-close change over the visible series
    pub fn series_change(&self) -> Option<(f64, f64)> {
        let first = self.candles.first()?;
        let last = self.candles.last()?;
        if first.open <= 0.0 {
            return None;
        }
        let change = last.close - first.open;
        Some((change, change / first.open * 100.0))
    }

    /// Highest high and lowest low of the visible series
    pub fn range(&self) -> Option<(f64, f64)> {
        let high = self.candles.iter().map(|c| c.high).reduce(f64::max)?;
        let low = self.candles.iter().map(|c| c.low).reduce(f64::min)?;
        Some((high, low))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Exchange, MockBackend};

    fn summary(candles: &[Candle]) -> ChartSummary<'_> {
        ChartSummary {
            instrument: None,
            interval: Interval::OneDay,
            candles,
            loading: false,
            error: None,
            empty: candles.is_empty(),
            countdown: None,
            market_open: false,
            last_updated: None,
        }
    }

    #[test]
    fn test_series_statistics() {
        let instrument = InstrumentRef::cash(1660, Exchange::Nse);
        let candles = MockBackend::sample_candles(instrument, Interval::OneDay, 4);
        let summary = summary(&candles);

        let (high, low) = summary.range().unwrap();
        assert!(candles.iter().all(|c| c.high <= high && c.low >= low));
        assert!(summary.series_change().is_some());
    }

    #[test]
    fn test_empty_series_has_no_statistics() {
        let summary = summary(&[]);
        assert_eq!(summary.range(), None);
        assert_eq!(summary.series_change(), None);
    }
}
