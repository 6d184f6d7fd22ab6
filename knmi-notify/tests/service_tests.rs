//! Integration tests for the notification service.
//!
//! These drive the full stream (connect, decode, dispatch, reconnect, stop)
//! over a scripted transport with paused tokio time.


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use knmi_notify::{
    consumer_fn, ConnectionState, EventConsumer, KnownDataset, NotificationConfig,
    NotificationEvent, NotificationService, RetryPolicy, SessionError, TOPIC_FILTERS,
};
use test_helpers::{garbage, notification, ScriptedConnector, SessionEnd, Step};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(3600);

fn service(connector: Arc<ScriptedConnector>, retry: RetryPolicy) -> NotificationService {
    let config = NotificationConfig::default().with_retry(retry);
    NotificationService::with_connector(connector, config).expect("valid config")
}

fn forwarding(tx: mpsc::UnboundedSender<Arc<NotificationEvent>>) -> Arc<dyn EventConsumer> {
    consumer_fn(move |event| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(event);
            Ok(())
        }
    })
}

async fn wait_for_state(service: &NotificationService, expected: ConnectionState) {
    let mut state = service.watch_state();
    timeout(WAIT, state.wait_for(|state| *state == expected))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

#[tokio::test(start_paused = true)]
async fn test_radar_forecast_event_reaches_only_its_consumer() {
    let connector = ScriptedConnector::new([Step::hold(vec![
        garbage("not json"),
        garbage(r#"{"data":{}}"#),
        notification("some-other-dataset", "x.nc"),
        notification("radar_forecast", "RAD_NL25_PCP_FM_202405011200.h5"),
    ])]);
    let service = service(connector.clone(), RetryPolicy::default());

    let (radar_tx, mut radar_rx) = mpsc::unbounded_channel();
    let observations_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&observations_calls);

    service.set_callback(KnownDataset::RadarForecast, "radar", forwarding(radar_tx));
    service.set_callback(
        KnownDataset::TenMinuteObservations,
        "observations",
        consumer_fn(move |_event| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
    );

    service.start().unwrap();

    let event = timeout(WAIT, radar_rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.dataset().as_str(), "radar_forecast");
    assert_eq!(event.data.filename(), Some("RAD_NL25_PCP_FM_202405011200.h5"));
    assert_eq!(event.event_type(), Some("nl.knmi.dataplatform.file.created.v1"));
    assert_eq!(event.topic, "dataplatform/file/v1/radar_forecast/2.0/created");

    service.stop().await.unwrap();

    assert!(radar_rx.try_recv().is_err(), "delivered more than once");
    assert_eq!(observations_calls.load(Ordering::SeqCst), 0);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_every_connect_subscribes_all_topic_filters_in_order() {
    let connector = ScriptedConnector::new([
        Step::serve(Vec::new(), SessionEnd::Closed),
        Step::hold(Vec::new()),
    ]);
    let service = service(connector.clone(), RetryPolicy::fixed(Duration::from_secs(30)));

    service.start().unwrap();
    while connector.attempts() < 2 {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    service.stop().await.unwrap();

    let expected: Vec<String> = TOPIC_FILTERS.iter().map(|topic| topic.to_string()).collect();
    assert_eq!(connector.subscribed_topics(), vec![expected.clone(), expected]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_failures_with_one_live_session() {
    let connector = ScriptedConnector::new([
        Step::Refuse(SessionError::Connection("connection reset".to_string())),
        Step::serve(
            vec![notification("radar_forecast", "first.h5")],
            SessionEnd::Error(SessionError::Connection("websocket closed".to_string())),
        ),
        Step::serve(vec![notification("radar_forecast", "second.h5")], SessionEnd::Closed),
        Step::hold(vec![notification("radar_forecast", "third.h5")]),
    ]);
    let service = service(
        connector.clone(),
        RetryPolicy::exponential(Duration::from_secs(1), Duration::from_secs(60)),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    service.set_callback("radar_forecast", "radar", forwarding(tx));
    service.start().unwrap();

    let mut files = Vec::new();
    for _ in 0..3 {
        let event = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        files.push(event.data.filename().unwrap_or_default().to_string());
    }
    assert_eq!(files, vec!["first.h5", "second.h5", "third.h5"]);

    service.stop().await.unwrap();

    assert_eq!(connector.attempts(), 4);
    assert_eq!(connector.max_live_sessions(), 1);
    assert_eq!(connector.live_sessions(), 0);
    assert_eq!(connector.closed_sessions(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_not_authorized_is_retried_until_accepted() {
    let connector = ScriptedConnector::new([
        Step::Refuse(SessionError::NotAuthorized),
        Step::Refuse(SessionError::NotAuthorized),
        Step::hold(Vec::new()),
    ]);
    let service = service(connector.clone(), RetryPolicy::default());

    service.start().unwrap();
    wait_for_state(&service, ConnectionState::Connected).await;

    assert_eq!(connector.attempts(), 3);
    service.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_connected_closes_session_and_stops_retrying() {
    let connector = ScriptedConnector::new([Step::hold(Vec::new())]);
    let service = service(connector.clone(), RetryPolicy::fixed(Duration::from_secs(1)));

    service.start().unwrap();
    wait_for_state(&service, ConnectionState::Connected).await;
    assert_eq!(connector.live_sessions(), 1);

    service.stop().await.unwrap();
    assert_eq!(service.connection_state(), ConnectionState::Stopped);
    assert!(!service.is_running());
    assert_eq!(connector.closed_sessions(), 1);
    assert_eq!(connector.live_sessions(), 0);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_backoff_wait() {
    let connector = ScriptedConnector::new([Step::Refuse(SessionError::Connection(
        "dns failure".to_string(),
    ))]);
    let service = service(connector.clone(), RetryPolicy::fixed(Duration::from_secs(300)));

    service.start().unwrap();
    wait_for_state(
        &service,
        ConnectionState::Reconnecting {
            attempt: 2,
            delay: Duration::from_secs(300),
        },
    )
    .await;

    service.stop().await.unwrap();
    tokio::time::sleep(Duration::from_secs(900)).await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(connector.live_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failing_consumer_does_not_affect_stream() {
    let connector = ScriptedConnector::new([Step::hold(vec![
        notification("radar_forecast", "a.h5"),
        notification("radar_forecast", "b.h5"),
    ])]);
    let service = service(connector.clone(), RetryPolicy::default());

    let (tx, mut rx) = mpsc::unbounded_channel();
    service.set_callback(
        "radar_forecast",
        "broken",
        consumer_fn(|_event| async { Err("cannot refresh".into()) }),
    );
    service.set_callback("radar_forecast", "healthy", forwarding(tx));
    service.start().unwrap();

    for expected in ["a.h5", "b.h5"] {
        let event = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.data.filename(), Some(expected));
    }

    assert_eq!(service.connection_state(), ConnectionState::Connected);
    assert_eq!(connector.attempts(), 1);
    service.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_messages_are_dispatched_one_at_a_time() {
    let connector = ScriptedConnector::new([Step::hold(vec![
        notification("radar_forecast", "1.h5"),
        notification("radar_forecast", "2.h5"),
        notification("radar_forecast", "3.h5"),
    ])]);
    let service = service(connector, RetryPolicy::default());

    let in_flight = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let tracker = Arc::clone(&in_flight);
    service.set_callback(
        "radar_forecast",
        "slow",
        consumer_fn(move |event| {
            let tracker = Arc::clone(&tracker);
            let tx = tx.clone();
            async move {
                let overlapping = tracker.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(10)).await;
                tracker.fetch_sub(1, Ordering::SeqCst);
                let _ = tx.send((overlapping, event.data.filename().map(str::to_string)));
                Ok(())
            }
        }),
    );
    service.start().unwrap();

    for expected in ["1.h5", "2.h5", "3.h5"] {
        let (overlapping, filename) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(overlapping, 0);
        assert_eq!(filename.as_deref(), Some(expected));
    }
    service.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_consumers_registered_while_running_receive_later_events() {
    let connector = ScriptedConnector::new([
        Step::serve(vec![notification("radar_forecast", "early.h5")], SessionEnd::Closed),
        Step::hold(vec![notification("radar_forecast", "late.h5")]),
    ]);
    let service = Arc::new(service(connector.clone(), RetryPolicy::fixed(Duration::from_secs(60))));

    let (early_tx, mut early_rx) = mpsc::unbounded_channel();
    service.set_callback("radar_forecast", "early", forwarding(early_tx));
    service.start().unwrap();

    let first = timeout(WAIT, early_rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.data.filename(), Some("early.h5"));

    // register from another task while the stream waits to reconnect
    let (late_tx, mut late_rx) = mpsc::unbounded_channel();
    let registering = Arc::clone(&service);
    tokio::spawn(async move {
        registering.set_callback("radar_forecast", "late", forwarding(late_tx));
    })
    .await
    .unwrap();

    let late = timeout(WAIT, late_rx.recv()).await.unwrap().unwrap();
    assert_eq!(late.data.filename(), Some("late.h5"));

    assert!(service.remove_callback("radar_forecast", "late"));
    service.stop().await.unwrap();
}
