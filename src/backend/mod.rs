//! Backend integration module
//!
//! Handles the live-feed WebSocket connection, REST API calls, and data parsing
//! for the market data backend.

use std::future::Future;

pub mod mock;
pub mod rest;
pub mod types;
pub mod websocket;

// Re-export commonly used types
pub use mock::MockBackend;
pub use rest::BackendRestClient;
pub use types::*;
pub use websocket::{FeedSubscription, LiveFeedClient};

use crate::market_data::candle::{Candle, CandleRequest};

/// Point-in-time quote source
///
/// One request per call, no caching and no retries.
pub trait SnapshotFetcher: Send + Sync + 'static {
    fn fetch_snapshot(
        &self,
        instrument: InstrumentRef,
    ) -> impl Future<Output = Result<Snapshot, MarketDataError>> + Send;
}

/// Candle series source
pub trait CandleFetcher: Send + Sync + 'static {
    fn fetch_candles(
        &self,
        instrument: InstrumentRef,
        request: CandleRequest,
    ) -> impl Future<Output = Result<Vec<Candle>, MarketDataError>> + Send;
}
