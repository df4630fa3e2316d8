//! In-memory backend used for testing and offline runs
//!
//! Responses are scripted per scrip code; every call can be delayed to
//! reproduce out-of-order completion.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::time::sleep;

use super::types::{InstrumentRef, MarketDataError, Snapshot};
use super::{CandleFetcher, SnapshotFetcher};
use crate::market_data::candle::{Candle, CandleRequest, Interval};

type CandleKey = (u32, Interval);

struct Scripted<T> {
    delay: Duration,
    result: Result<T, MarketDataError>,
}

/// Mock backend implementing both fetchers
#[derive(Default)]
pub struct MockBackend {
    snapshots: Mutex<HashMap<u32, Result<Snapshot, MarketDataError>>>,
    candles: Mutex<HashMap<CandleKey, VecDeque<Scripted<Vec<Candle>>>>>,
    delays: Mutex<HashMap<u32, Duration>>,
    snapshot_calls: AtomicUsize,
    candle_calls: Mutex<Vec<(InstrumentRef, CandleRequest)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the snapshot answer for a scrip code
    pub fn set_snapshot(&self, scrip_code: u32, result: Result<Snapshot, MarketDataError>) {
        lock(&self.snapshots).insert(scrip_code, result);
    }

    /// Delay every answer for a scrip code
    pub fn set_delay(&self, scrip_code: u32, delay: Duration) {
        lock(&self.delays).insert(scrip_code, delay);
    }

    /// Queue a candle answer; the last queued answer repeats once the queue drains
    pub fn push_candles(
        &self,
        scrip_code: u32,
        interval: Interval,
        result: Result<Vec<Candle>, MarketDataError>,
    ) {
        self.push_candles_delayed(scrip_code, interval, Duration::ZERO, result);
    }

    /// Queue a candle answer with its own delay
    pub fn push_candles_delayed(
        &self,
        scrip_code: u32,
        interval: Interval,
        delay: Duration,
        result: Result<Vec<Candle>, MarketDataError>,
    ) {
        lock(&self.candles)
            .entry((scrip_code, interval))
            .or_default()
            .push_back(Scripted { delay, result });
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn candle_calls(&self) -> Vec<(InstrumentRef, CandleRequest)> {
        lock(&self.candle_calls).clone()
    }

    fn delay_for(&self, scrip_code: u32) -> Duration {
        lock(&self.delays)
            .get(&scrip_code)
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    fn next_candles(&self, key: CandleKey) -> (Duration, Result<Vec<Candle>, MarketDataError>) {
        let mut candles = lock(&self.candles);
        match candles.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .map(|s| (s.delay, s.result))
                .unwrap_or_else(|| (Duration::ZERO, Ok(Vec::new()))),
            Some(queue) => match queue.front() {
                Some(s) => (s.delay, s.result.clone()),
                None => (Duration::ZERO, Ok(Vec::new())),
            },
            None => (
                Duration::ZERO,
                Err(MarketDataError::NotFound(format!("No candles for {}", key.0))),
            ),
        }
    }

    /// Snapshot with plausible fields around `price`
    pub fn sample_snapshot(instrument: InstrumentRef, price: f64) -> Snapshot {
        Snapshot {
            instrument,
            price,
            change: 1.25,
            change_percent: 0.4,
            open: price - 1.0,
            high: price + 2.0,
            low: price - 3.0,
            prev_close: price - 1.25,
            volume: 125_000,
            week52_high: price * 1.3,
            week52_low: price * 0.7,
            upper_circuit: price * 1.1,
            lower_circuit: price * 0.9,
            timestamp: Utc::now(),
        }
    }

    /// `count` consecutive candles starting 2024-07-15 09:15 IST
    pub fn sample_candles(instrument: InstrumentRef, interval: Interval, count: usize) -> Vec<Candle> {
        let start = Utc
            .with_ymd_and_hms(2024, 7, 15, 3, 45, 0)
            .single()
            .unwrap_or_default();
        let step = interval
            .refresh_period()
            .map(|period| chrono::Duration::seconds(period.as_secs() as i64))
            .unwrap_or_else(|| chrono::Duration::days(1));

        (0..count)
            .map(|i| {
                let close = 100.0 + i as f64;
                Candle {
                    instrument,
                    interval,
                    bucket_start: start + step * i as i32,
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000 + i as u64,
                }
            })
            .collect()
    }
}

impl SnapshotFetcher for MockBackend {
    async fn fetch_snapshot(&self, instrument: InstrumentRef) -> Result<Snapshot, MarketDataError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_for(instrument.scrip_code);
        let result = lock(&self.snapshots)
            .get(&instrument.scrip_code)
            .cloned()
            .unwrap_or_else(|| {
                Err(MarketDataError::NotFound(format!(
                    "Unknown scrip code {}",
                    instrument.scrip_code
                )))
            });

        if !delay.is_zero() {
            sleep(delay).await;
        }
        result
    }
}

impl CandleFetcher for MockBackend {
    async fn fetch_candles(
        &self,
        instrument: InstrumentRef,
        request: CandleRequest,
    ) -> Result<Vec<Candle>, MarketDataError> {
        lock(&self.candle_calls).push((instrument, request));
        let (scripted_delay, result) = self.next_candles((instrument.scrip_code, request.interval()));
        let delay = scripted_delay + self.delay_for(instrument.scrip_code);

        if !delay.is_zero() {
            sleep(delay).await;
        }
        result
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::Exchange;

    #[tokio::test]
    async fn test_unknown_instrument_is_not_found() {
        let backend = MockBackend::new();
        let result = backend
            .fetch_snapshot(InstrumentRef::cash(1, Exchange::Nse))
            .await;
        assert!(matches!(result, Err(MarketDataError::NotFound(_))));
        assert_eq!(backend.snapshot_calls(), 1);
    }

    #[tokio::test]
    async fn test_candle_queue_repeats_last_answer() {
        let backend = MockBackend::new();
        let instrument = InstrumentRef::cash(1660, Exchange::Nse);
        let candles = MockBackend::sample_candles(instrument, Interval::FiveMinutes, 3);
        backend.push_candles(1660, Interval::FiveMinutes, Ok(candles.clone()));
        backend.push_candles(1660, Interval::FiveMinutes, Err(MarketDataError::Network("down".into())));

        let request = CandleRequest::Interval(Interval::FiveMinutes);
        assert_eq!(backend.fetch_candles(instrument, request).await.unwrap(), candles);
        assert!(backend.fetch_candles(instrument, request).await.is_err());
        assert!(backend.fetch_candles(instrument, request).await.is_err());
        assert_eq!(backend.candle_calls().len(), 3);
    }

    #[test]
    fn test_sample_candles_are_ascending() {
        let instrument = InstrumentRef::cash(1660, Exchange::Nse);
        let candles = MockBackend::sample_candles(instrument, Interval::OneMinute, 4);
        assert!(candles.windows(2).all(|w| w[0].bucket_start < w[1].bucket_start));
    }
}
