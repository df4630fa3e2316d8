//! End-to-end view session test: commands in, feed traffic out

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use common::MockFeedServer;
use scripwatch::backend::{Exchange, InstrumentRef, LiveFeedClient, MockBackend};
use scripwatch::market_data::{Interval, MarketHours};
use scripwatch::session::{InteractiveCommand, SessionState, ViewSession};

fn itc() -> InstrumentRef {
    InstrumentRef::cash(1660, Exchange::Nse)
}

fn reliance() -> InstrumentRef {
    InstrumentRef::cash(2885, Exchange::Nse)
}

fn backend() -> Arc<MockBackend> {
    let backend = MockBackend::new();
    for instrument in [itc(), reliance()] {
        backend.set_snapshot(
            instrument.scrip_code,
            Ok(MockBackend::sample_snapshot(instrument, 300.0)),
        );
        backend.push_candles(
            instrument.scrip_code,
            Interval::OneDay,
            Ok(MockBackend::sample_candles(instrument, Interval::OneDay, 20)),
        );
    }
    Arc::new(backend)
}

/// Test switching instruments and quitting from the command channel
#[tokio::test]
async fn test_open_switch_and_quit() {
    let server = Arc::new(MockFeedServer::start().await);
    let feed = LiveFeedClient::spawn(server.settings());
    let backend = backend();

    let mut view =
        ViewSession::new(backend.clone(), feed, MarketHours::nse(), Interval::OneDay).quiet();
    view.open(itc()).unwrap();
    let sender = view.action_sender();

    let driver = tokio::spawn({
        let server = server.clone();
        async move {
            server.wait_for_event("subscribe_stock", 1).await;
            sender
                .send_command(InteractiveCommand::Open {
                    instrument: reliance(),
                })
                .unwrap();
            server.wait_for_event("subscribe_stock", 2).await;
            sender.send_command(InteractiveCommand::Quit).unwrap();
        }
    });

    timeout(Duration::from_secs(10), view.run())
        .await
        .expect("session should quit")
        .unwrap();
    driver.await.unwrap();

    assert_eq!(view.state(), SessionState::Terminated);
    assert_eq!(view.stats().commands_processed, 2);
    assert_eq!(view.price().instrument(), Some(reliance()));
    assert_eq!(view.chart().instrument(), Some(reliance()));

    server.wait_for_event("unsubscribe_stock", 2).await;
    assert_eq!(
        server.received_events(),
        vec![
            ("subscribe_stock".to_string(), 1660),
            ("unsubscribe_stock".to_string(), 1660),
            ("subscribe_stock".to_string(), 2885),
            ("unsubscribe_stock".to_string(), 2885),
        ]
    );
    assert_eq!(backend.snapshot_calls(), 2);
}

/// Test that a shutdown request ends the loop even with the feed unreachable
#[tokio::test]
async fn test_shutdown_request_with_feed_down() {
    let mut server = MockFeedServer::start().await;
    let settings = server.settings();
    server.stop_accepting();

    let feed = LiveFeedClient::spawn(settings);
    let mut view =
        ViewSession::new(backend(), feed, MarketHours::nse(), Interval::OneDay).quiet();
    view.open(itc()).unwrap();
    view.action_sender().request_shutdown().unwrap();

    timeout(Duration::from_secs(5), view.run())
        .await
        .expect("shutdown should not wait for the feed")
        .unwrap();
    assert_eq!(view.state(), SessionState::Terminated);
    assert!(!view.price().feed().is_connected());
}
