//! REST client tests against a wiremock backend

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scripwatch::backend::{
    BackendRestClient, Exchange, InstrumentRef, MarketDataError, SnapshotFetcher,
};
use scripwatch::config::Config;
use scripwatch::market_data::{CandleRequest, DateRange, Interval};
use scripwatch::session::SessionContext;

fn itc() -> InstrumentRef {
    InstrumentRef::cash(1660, Exchange::Nse)
}

fn client_for(server: &MockServer, token: Option<&str>) -> BackendRestClient {
    let mut config = Config::default();
    config.backend.rest_url = format!("{}/api/stocks", server.uri());
    config.backend.timeout_seconds = 1;
    let session = SessionContext::with_token(config, token.map(str::to_string));
    BackendRestClient::new(session).unwrap()
}

/// Test snapshot path, query, bearer header and field mapping
#[tokio::test]
async fn test_snapshot_request_and_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stocks/snapshot/1660"))
        .and(query_param("exchange", "N"))
        .and(query_param("exchangeType", "C"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "price": 312.4,
            "change": "1.25",
            "changePercent": 0.4,
            "open": 311.0,
            "high": 314.5,
            "low": 309.8,
            "volume": 1250000,
            "prevClose": 311.15,
            "week52High": 499.7,
            "week52Low": 300.1,
            "upperCircuit": 343.6,
            "lowerCircuit": 281.2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("test-token"));
    let snapshot = client.fetch_snapshot(itc()).await.unwrap();

    assert_eq!(snapshot.instrument, itc());
    assert!((snapshot.price - 312.4).abs() < 1e-9);
    assert!((snapshot.change - 1.25).abs() < 1e-9);
    assert!((snapshot.prev_close - 311.15).abs() < 1e-9);
    assert_eq!(snapshot.volume, 1_250_000);
    assert!((snapshot.upper_circuit - 343.6).abs() < 1e-9);
}

/// Test that no authorization header is sent without a token
#[tokio::test]
async fn test_snapshot_without_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stocks/snapshot/1660"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"price": 312.4})))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    client.get_snapshot(&itc()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(
        !requests[0]
            .headers
            .keys()
            .any(|name| name.as_str().eq_ignore_ascii_case("authorization"))
    );
}

/// Test HTTP status mapping into the error taxonomy
#[tokio::test]
async fn test_status_codes_map_to_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stocks/snapshot/404"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "Scrip not found"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/stocks/snapshot/503"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/stocks/snapshot/200"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, None);

    let not_found = client
        .get_snapshot(&InstrumentRef::cash(404, Exchange::Nse))
        .await;
    assert_eq!(
        not_found,
        Err(MarketDataError::NotFound("Scrip not found".to_string()))
    );

    let unavailable = client
        .get_snapshot(&InstrumentRef::cash(503, Exchange::Nse))
        .await;
    assert!(matches!(
        unavailable,
        Err(MarketDataError::ServiceUnavailable(_))
    ));

    let malformed = client
        .get_snapshot(&InstrumentRef::cash(200, Exchange::Nse))
        .await;
    assert!(matches!(malformed, Err(MarketDataError::Malformed(_))));
}

/// Test that transport failures surface as network errors
#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let mut config = Config::default();
    config.backend.rest_url = "http://127.0.0.1:9/api/stocks".to_string();
    let client = BackendRestClient::new(SessionContext::with_token(config, None)).unwrap();

    let result = client.get_snapshot(&itc()).await;
    assert!(matches!(result, Err(MarketDataError::Network(_))));
}

/// Test that a slow backend times out as a network error
#[tokio::test]
async fn test_slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stocks/snapshot/1660"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"price": 312.4}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let result = client.get_snapshot(&itc()).await;
    assert!(matches!(result, Err(MarketDataError::Network(_))));
}

/// Test interval candles come back sorted and de-duplicated
#[tokio::test]
async fn test_candles_are_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stocks/historical/1660"))
        .and(query_param("exchange", "N"))
        .and(query_param("interval", "5m"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candles": [
                {"time": "2024-07-15 09:25:00", "open": 312, "high": 313, "low": 311.5, "close": 312.8, "volume": 900},
                {"time": "2024-07-15 09:15:00", "open": 310, "high": 311, "low": 309.5, "close": 310.5, "volume": 1200},
                {"time": "2024-07-15 09:20:00", "open": "310.5", "high": "312", "low": "310", "close": "311.9", "volume": "1000"},
                {"time": "2024-07-15 09:20:00", "open": 310.5, "high": 312, "low": 310, "close": 312.0, "volume": 1100}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let candles = client
        .get_candles(&itc(), CandleRequest::Interval(Interval::FiveMinutes))
        .await
        .unwrap();

    assert_eq!(candles.len(), 3);
    assert!(
        candles
            .windows(2)
            .all(|w| w[0].bucket_start < w[1].bucket_start)
    );
    // 09:15 IST
    assert_eq!(
        candles[0].bucket_start,
        Utc.with_ymd_and_hms(2024, 7, 15, 3, 45, 0).unwrap()
    );
    assert!(candles.iter().all(|c| c.interval == Interval::FiveMinutes));
}

/// Test ranged requests send both dates
#[tokio::test]
async fn test_range_request_sends_dates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stocks/historical/1660"))
        .and(query_param("interval", "1d"))
        .and(query_param("from_date", "2024-07-01"))
        .and(query_param("to_date", "2024-07-12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candles": [
                {"date": "2024-07-11", "open": 300, "high": 305, "low": 298, "close": 304, "volume": 5000000},
                {"date": "2024-07-12", "open": 304, "high": 310, "low": 303, "close": 309, "volume": 6000000}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let range = DateRange::new(
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 7, 12).unwrap(),
    )
    .unwrap();
    let candles = client
        .get_candles(
            &itc(),
            CandleRequest::Range {
                interval: Interval::OneDay,
                range,
            },
        )
        .await
        .unwrap();

    assert_eq!(candles.len(), 2);
    assert!((candles[1].close - 309.0).abs() < 1e-9);
}

/// Test that an empty series is a valid answer
#[tokio::test]
async fn test_empty_candles_are_ok() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stocks/historical/1660"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candles": []})))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let candles = client
        .get_candles(&itc(), CandleRequest::Interval(Interval::OneMinute))
        .await
        .unwrap();
    assert!(candles.is_empty());
}

/// Test that an `error` field in a 200 body is a failure
#[tokio::test]
async fn test_historical_error_field() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stocks/historical/1660"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candles": [],
            "error": "upstream",
            "message": "Broker session expired"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let result = client
        .get_candles(&itc(), CandleRequest::Interval(Interval::OneMinute))
        .await;
    assert_eq!(
        result,
        Err(MarketDataError::ServiceUnavailable(
            "Broker session expired".to_string()
        ))
    );
}

/// Test symbol search query and result mapping
#[tokio::test]
async fn test_search_scrip_codes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stocks/search-scripcode"))
        .and(query_param("symbol", "ITC"))
        .and(query_param("exchange", "B"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"name": "ITC", "exchange": "B", "scripCode": 500875, "fullName": "ITC LTD"}
            ]
        })))
        .mount(&server)
        .await;

    let client = Arc::new(client_for(&server, None));
    let results = client.search_scrip_codes(" itc ", Exchange::Bse).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].scrip_code, 500875);
    assert_eq!(results[0].full_name.as_deref(), Some("ITC LTD"));
}
