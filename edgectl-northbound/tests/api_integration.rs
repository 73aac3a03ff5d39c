//! API integration tests for edgectl-northbound: exercised through
//! axum's tower service interface (no TCP), grounded in
//! `RephlexZero-strata`'s `strata-control/tests/api_integration.rs`.
//! Unlike that crate, no external database is needed: the state under
//! test is the in-memory `Topology`/`RequestStore`.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use edgectl_model::CosRegistry;
use edgectl_monitor::StateUpdater;
use edgectl_northbound::{router, AppState, ConfigView};
use edgectl_protocol::RequestStore;
use edgectl_topology::Topology;

fn test_config() -> ConfigView {
    ConfigView {
        decoy_mac: "fe:ff:ff:ff:ff:ff".into(),
        decoy_ip: "192.0.2.1".into(),
        ofp_port: 6633,
        verbose: false,
        network_address: "10.0.0.0/8".into(),
        stp_enabled: false,
        api_port: 8080,
        udp_port: 7070,
        udp_timeout: 3,
        orchestrator_paths: false,
        node_algorithm: "SIMPLE".into(),
        path_algorithm: "DIJKSTRA".into(),
        path_weight: "HOP".into(),
        protocol_send_to: "NONE".into(),
        protocol_timeout: 1,
        protocol_retries: 3,
        monitor_period: 1,
        monitor_samples: 2,
    }
}

fn test_app() -> axum::Router {
    let topology = Topology::new();
    let updater = StateUpdater::new(topology.clone(), Duration::from_secs(1));
    let requests = RequestStore::new();
    let cos_registry = CosRegistry::default();
    let state = AppState::new(topology, updater, requests, cos_registry, test_config());
    router(state)
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_default()
}

fn json_req(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(method)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn creating_a_node_then_repeating_it_conflicts() {
    let app = test_app();
    let body = json!({"id": "host-1", "state": true, "type": "Server"});

    let resp = app.clone().oneshot(json_req("POST", "/node", body.clone())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(json_req("POST", "/node", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn deleting_an_unknown_node_is_404() {
    let app = test_app();
    let resp = app
        .oneshot(Request::builder().uri("/node/ghost").method("DELETE").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn node_specs_round_trip_then_show_up_in_metrics() {
    let app = test_app();
    let create = json!({"id": "host-2", "state": true, "type": "Server"});
    let resp = app.clone().oneshot(json_req("POST", "/node", create)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let specs = json!({"cpu_count": 8.0, "cpu_free": 6.0});
    let resp = app.clone().oneshot(json_req("PUT", "/node_specs/host-2", specs)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("edgectl_node_cpu_free{id=\"host-2\"} 6"));
}

#[tokio::test]
async fn unknown_interface_in_node_specs_update_is_rejected() {
    let app = test_app();
    let create = json!({"id": "host-3", "state": true, "type": "Server"});
    app.clone().oneshot(json_req("POST", "/node", create)).await.unwrap();

    let specs = json!({"interfaces": [{"name": "eth0", "capacity": 100.0}]});
    let resp = app.oneshot(json_req("PUT", "/node_specs/host-3", specs)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn posting_a_request_then_repeating_it_conflicts() {
    let app = test_app();
    let body = json!({
        "id": "req-1",
        "src": {"Unknown": "198.51.100.7"},
        "cos_id": 1,
        "state": "Hreq",
        "hreq_at": "2026-01-01T00:00:00Z",
    });

    let resp = app.clone().oneshot(json_req("POST", "/request", body.clone())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(json_req("POST", "/request", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn get_config_reflects_the_running_configuration() {
    let app = test_app();
    let resp = app.oneshot(Request::builder().uri("/config").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["api_port"], 8080);
}
