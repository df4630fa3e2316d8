//! Backend REST API client implementation

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::types::{
    ErrorBody, Exchange, HistoricalResponse, InstrumentRef, MarketDataError, ScripMatch,
    SearchResponse, Snapshot, SnapshotPayload,
};
use super::{CandleFetcher, SnapshotFetcher};
use crate::market_data::candle::{Candle, CandleRequest, normalize_candles};
use crate::session::context::SessionContext;

/// Backend REST API client
pub struct BackendRestClient {
    base_url: String,
    client: reqwest::Client,
    session: Arc<SessionContext>,
    timeout: Duration,
    exchange_offset: FixedOffset,
}

impl BackendRestClient {
    /// Build a client from the session's backend and market configuration
    pub fn new(session: Arc<SessionContext>) -> Result<Self> {
        let config = session.config();
        let exchange_offset = config.market.market_hours()?.offset();
        let timeout = config.backend.request_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.backend.rest_url.trim_end_matches('/').to_string(),
            client,
            session,
            timeout,
            exchange_offset,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get a point-in-time quote for an instrument
    pub async fn get_snapshot(&self, instrument: &InstrumentRef) -> Result<Snapshot, MarketDataError> {
        let url = format!("{}/snapshot/{}", self.base_url, instrument.scrip_code);
        let query = [
            ("exchange", instrument.exchange.code().to_string()),
            ("exchangeType", instrument.exchange_type.code().to_string()),
        ];

        let payload: SnapshotPayload = self.get_json(&url, &query).await?;
        let snapshot = payload.into_snapshot(*instrument, Utc::now());

        info!(
            "Fetched snapshot for {}: price={}, change={}%",
            instrument, snapshot.price, snapshot.change_percent
        );
        Ok(snapshot)
    }

    /// Get the candle series for an instrument, ordered ascending by bucket
    ///
    /// An empty series is a valid answer and is returned as `Ok`.
    pub async fn get_candles(
        &self,
        instrument: &InstrumentRef,
        request: CandleRequest,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let url = format!("{}/historical/{}", self.base_url, instrument.scrip_code);
        let interval = request.interval();
        let mut query = vec![
            ("exchange", instrument.exchange.code().to_string()),
            ("exchangeType", instrument.exchange_type.code().to_string()),
            ("interval", interval.code().to_string()),
        ];
        if let CandleRequest::Range { range, .. } = request {
            query.push(("from_date", range.from().format("%Y-%m-%d").to_string()));
            query.push(("to_date", range.to().format("%Y-%m-%d").to_string()));
        }

        let response: HistoricalResponse = self.get_json(&url, &query).await?;

        if let Some(error) = response.error {
            let detail = response.message.unwrap_or(error);
            warn!("Backend reported candle error for {}: {}", instrument, detail);
            return Err(MarketDataError::ServiceUnavailable(detail));
        }

        let candles = response
            .candles
            .into_iter()
            .map(|payload| payload.into_candle(*instrument, interval, self.exchange_offset))
            .collect::<Result<Vec<_>, _>>()?;
        let candles = normalize_candles(candles);

        info!(
            "Fetched {} candles for {} at {}",
            candles.len(),
            instrument,
            interval
        );
        Ok(candles)
    }

    /// Resolve a trading symbol to scrip codes
    pub async fn search_scrip_codes(
        &self,
        symbol: &str,
        exchange: Exchange,
    ) -> Result<Vec<ScripMatch>, MarketDataError> {
        let url = format!("{}/search-scripcode", self.base_url);
        let query = [
            ("symbol", symbol.trim().to_ascii_uppercase()),
            ("exchange", exchange.code().to_string()),
        ];

        let response: SearchResponse = self.get_json(&url, &query).await?;
        debug!("Search for {} returned {} results", symbol, response.results.len());
        Ok(response.results)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, MarketDataError> {
        debug!("GET {} {:?}", url, query);

        let mut request = self.client.get(url).query(query).timeout(self.timeout);
        if let Some(token) = self.session.auth_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MarketDataError::Network(format!("Failed to send HTTP request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.describe())
                .unwrap_or_else(|| format!("HTTP error {}", status));
            warn!("GET {} failed with {}: {}", url, status, detail);

            return Err(match status.as_u16() {
                400 | 404 => MarketDataError::NotFound(detail),
                _ => MarketDataError::ServiceUnavailable(detail),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| MarketDataError::Network(format!("Failed to read response body: {}", e)))?;

        serde_json::from_slice(&body)
            .map_err(|e| MarketDataError::Malformed(format!("Failed to parse response: {}", e)))
    }
}

impl SnapshotFetcher for BackendRestClient {
    async fn fetch_snapshot(&self, instrument: InstrumentRef) -> Result<Snapshot, MarketDataError> {
        self.get_snapshot(&instrument).await
    }
}

impl CandleFetcher for BackendRestClient {
    async fn fetch_candles(
        &self,
        instrument: InstrumentRef,
        request: CandleRequest,
    ) -> Result<Vec<Candle>, MarketDataError> {
        self.get_candles(&instrument, request).await
    }
}
