//! End-to-end tests for the viewer wiring.
//!
//! These tests verify:
//! - Poll changes and health transitions arrive at live sessions as hub events
//! - Session filters select one server's events
//! - Control holder changes are pushed to every session
//! - Closing a controlling session releases control after the grace period

mod mock_server;

use mock_server::{MockNetwork, MockServer};
use plantview::control_manager::ControlConfig;
use plantview::notify_hub::{HubEvent, Subscriber};
use plantview::server_manager::{PollSettings, ProtocolFamily, ServerConfig};
use plantview::{Viewer, ViewerConfig, ViewerError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn config() -> ViewerConfig {
    ViewerConfig::default()
        .with_poll_settings(
            PollSettings::default()
                .with_object_interval(Duration::from_millis(20))
                .with_protocol_interval(Duration::from_millis(20))
                .with_health_interval(Duration::from_millis(20))
                .with_probe_timeout(Duration::from_millis(100)),
        )
        .with_shutdown_timeout(Duration::from_secs(1))
}

/// Collect events until `deadline` passes without anything new
async fn drain(session: &mut Subscriber, deadline: Duration) -> Vec<Arc<HubEvent>> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(deadline, session.recv()).await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_changes_reach_sessions() {
    let server = MockServer::new(&["Pump1"]);
    server.set_item(ProtocolFamily::Ionc, 1, json!(20.5));
    server.set_item(ProtocolFamily::Ionc, 2, json!(21.0));

    let viewer = Viewer::start(
        config().with_server(ServerConfig::new("plant1", "http://plant1")),
        MockNetwork::new(vec![("plant1", server.clone())]),
    )
    .unwrap();

    let mut session = viewer.open_session(None);
    let instance = viewer.servers().server("plant1").unwrap();
    instance.subscribe_object("Pump1");
    instance.subscribe_items(ProtocolFamily::Ionc, "Pump1", [1, 2]);

    let events = drain(&mut session, Duration::from_millis(150)).await;
    let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();

    assert!(types.contains(&"server_status"));
    assert!(types.contains(&"objects_changed"));
    assert!(types.contains(&"object_data"));

    let protocol: Vec<_> = events
        .iter()
        .filter_map(|e| match e.as_ref() {
            HubEvent::ProtocolData { family, object, items, .. } => Some((family.clone(), object.clone(), items.len())),
            _ => None,
        })
        .collect();
    assert_eq!(protocol, vec![("ionc".to_string(), "Pump1".to_string(), 2)]);

    // Only the changed item is pushed afterwards
    server.set_item(ProtocolFamily::Ionc, 2, json!(22.0));
    let events = drain(&mut session, Duration::from_millis(150)).await;
    let changed: Vec<_> = events
        .iter()
        .filter_map(|e| match e.as_ref() {
            HubEvent::ProtocolData { items, .. } => Some(items.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0][0]["id"], 2);
    assert_eq!(changed[0][0]["value"], 22.0);

    viewer.shutdown().await.unwrap();
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_session_filter_selects_server() {
    let network = MockNetwork::new(vec![("a", MockServer::new(&["X"])), ("b", MockServer::new(&["Y"]))]);
    let viewer = Viewer::start(
        config()
            .with_server(ServerConfig::new("a", "http://a"))
            .with_server(ServerConfig::new("b", "http://b")),
        network,
    )
    .unwrap();

    let mut only_b = viewer.open_session(Some("b".to_string()));
    let events = drain(&mut only_b, Duration::from_millis(150)).await;

    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e.filter_key() == Some("b")));

    viewer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_outage_is_reported_once() {
    let server = MockServer::new(&["Pump1"]);
    let viewer = Viewer::start(
        config().with_server(ServerConfig::new("plant1", "http://plant1")),
        MockNetwork::new(vec![("plant1", server.clone())]),
    )
    .unwrap();

    let mut session = viewer.open_session(None);
    drain(&mut session, Duration::from_millis(100)).await;

    server.set_offline(true);
    let events = drain(&mut session, Duration::from_millis(150)).await;

    let statuses: Vec<_> = events
        .iter()
        .filter_map(|e| match e.as_ref() {
            HubEvent::ServerStatus { status, .. } => Some(status.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0]["connected"], false);
    assert_eq!(statuses[0]["lastError"], "Server unreachable: connection refused");

    viewer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_control_changes_are_pushed() {
    let viewer = Viewer::start(
        config().with_control(ControlConfig::new().with_tokens(["admin", "operator"])),
        MockNetwork::new(vec![]),
    )
    .unwrap();

    let mut filtered = viewer.open_session(Some("plant1".to_string()));

    viewer.control().take_control("admin").unwrap();
    let event = tokio::time::timeout(Duration::from_secs(1), filtered.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*event, HubEvent::ControlStatus { has_controller: true });

    viewer.control().release_control("admin").unwrap();
    let event = tokio::time::timeout(Duration::from_secs(1), filtered.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*event, HubEvent::ControlStatus { has_controller: false });

    viewer.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_closing_controlling_session_releases_after_grace() {
    let viewer = Viewer::start(
        config().with_control(
            ControlConfig::new()
                .with_tokens(["admin"])
                .with_grace_period(Duration::from_secs(3)),
        ),
        MockNetwork::new(vec![]),
    )
    .unwrap();

    let session = viewer.open_session(None);
    viewer.control().take_control("admin").unwrap();

    viewer.close_session(&session, Some("admin"));
    assert!(session.is_closed());
    assert_eq!(viewer.hub().subscriber_count(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(viewer.control().has_controller());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!viewer.control().has_controller());

    viewer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let result = Viewer::start(
        config().with_hub_capacity(0),
        MockNetwork::new(vec![]),
    );
    assert!(matches!(result, Err(ViewerError::Configuration(_))));
}

#[tokio::test]
async fn test_unreachable_server_fails_start() {
    let result = Viewer::start(
        config().with_server(ServerConfig::new("ghost", "http://ghost")),
        MockNetwork::new(vec![]),
    );
    assert!(matches!(result, Err(ViewerError::Manager(_))));
}
