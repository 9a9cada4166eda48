//! HTTP surface tests over the assembled router.

use axum::body::Body;
use http::{header, Request, StatusCode};
use probehub_core::managers::SessionHandle;
use probehub_core::test_utils::{test_agent_info, test_descriptor, test_state, MockTransport};
use std::time::Duration;
use tower::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn list_agents_empty_returns_ok() {
    let (state, _store) = test_state(vec![]);
    let app = probehub_core::app(state);

    let response = app.oneshot(get("/api/agents")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn get_connected_agent_returns_ok() {
    let (state, _store) = test_state(vec![]);
    let session = SessionHandle::spawn("jvm-1", MockTransport::new(), 16);
    state.registry.register(test_agent_info("jvm-1"), session);
    let app = probehub_core::app(state);

    let response = app.oneshot(get("/api/agents/jvm-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn get_unknown_agent_returns_not_found() {
    let (state, _store) = test_state(vec![]);
    let app = probehub_core::app(state);

    let response = app.oneshot(get("/api/agents/ghost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_config_reaches_the_session() {
    let (state, _store) = test_state(vec![]);
    let transport = MockTransport::new();
    let session = SessionHandle::spawn("jvm-1", transport.clone(), 16);
    state.registry.register(test_agent_info("jvm-1"), session);
    let app = probehub_core::app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/api/agents/jvm-1/config")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"level":"debug"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.texts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn update_config_unknown_agent_returns_not_found() {
    let (state, _store) = test_state(vec![]);
    let app = probehub_core::app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/api/agents/ghost/config")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn load_plugin_returns_ok_and_ships_binary() {
    let (state, _store) = test_state(vec![test_descriptor("coverage", Some(vec![1, 2, 3]))]);
    let transport = MockTransport::new();
    let session = SessionHandle::spawn("jvm-1", transport.clone(), 16);
    state.registry.register(test_agent_info("jvm-1"), session);
    let app = probehub_core::app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/agents/jvm-1/plugins/coverage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.binaries.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn load_unknown_plugin_returns_not_found() {
    let (state, _store) = test_state(vec![]);
    let session = SessionHandle::spawn("jvm-1", MockTransport::new(), 16);
    state.registry.register(test_agent_info("jvm-1"), session);
    let app = probehub_core::app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/agents/jvm-1/plugins/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dispatch_to_closed_session_returns_gone() {
    let (state, _store) = test_state(vec![test_descriptor("coverage", Some(vec![1]))]);
    let session = SessionHandle::spawn("jvm-1", MockTransport::new(), 16);
    state
        .registry
        .register(test_agent_info("jvm-1"), session.clone());
    session.close();
    for _ in 0..200 {
        if session.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let app = probehub_core::app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/agents/jvm-1/plugins/coverage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn unload_plugin_returns_ok() {
    let (state, _store) = test_state(vec![test_descriptor("coverage", None)]);
    let transport = MockTransport::new();
    let session = SessionHandle::spawn("jvm-1", transport.clone(), 16);
    state.registry.register(test_agent_info("jvm-1"), session);
    let app = probehub_core::app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/agents/jvm-1/plugins/coverage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.texts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn list_plugins_returns_ok() {
    let (state, _store) = test_state(vec![
        test_descriptor("coverage", Some(vec![1])),
        test_descriptor("threads", None),
    ]);
    let app = probehub_core::app(state);

    let response = app.oneshot(get("/api/plugins")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn telemetry_stream_is_server_sent_events() {
    let (state, _store) = test_state(vec![test_descriptor("coverage", None)]);
    let app = probehub_core::app(state);

    let response = app
        .oneshot(get("/api/telemetry/coverage?session=run-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
}

#[tokio::test]
async fn unknown_route_returns_not_found() {
    let (state, _store) = test_state(vec![]);
    let app = probehub_core::app(state);

    let response = app.oneshot(get("/api/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
