//! End-to-end tests: client ↔ gateway ↔ mock backend.

use std::time::Duration;

use futures_util::SinkExt;
use serde_json::json;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use tunnel_gateway::config::{BackendConfig, EndpointConfig, GatewayConfig};

mod common;

use common::{BackendMode, TestGateway};

async fn gateway_with(endpoints: Vec<EndpointConfig>) -> TestGateway {
    let config = GatewayConfig {
        endpoints,
        ..GatewayConfig::default()
    };
    common::start_gateway(config).await
}

#[tokio::test]
async fn binary_and_text_round_trip_unmodified() {
    let backend = common::start_ws_backend(BackendMode::Echo).await;
    let gateway = gateway_with(vec![common::tunnel_endpoint(
        "/ws",
        &backend.http_host(),
        "/echo",
        json!({}),
    )])
    .await;

    let mut client = common::connect(&gateway.ws_url("/ws"), &[]).await;

    let payload = vec![0u8, 1, 2, 255, 254];
    client.send(Message::Binary(payload.clone().into())).await.unwrap();
    match common::next_message(&mut client).await {
        Some(Message::Binary(data)) => assert_eq!(data.as_ref(), payload.as_slice()),
        other => panic!("unexpected message: {other:?}"),
    }

    client.send(Message::Text("héllo".into())).await.unwrap();
    match common::next_message(&mut client).await {
        Some(Message::Text(text)) => assert_eq!(text.as_str(), "héllo"),
        other => panic!("unexpected message: {other:?}"),
    }

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn auth_headers_reach_backend_handshake() {
    let backend = common::start_ws_backend(BackendMode::Echo).await;
    let gateway = gateway_with(vec![common::tunnel_endpoint(
        "/ws",
        &backend.http_host(),
        "/echo",
        json!({}),
    )])
    .await;

    let mut client = common::connect(
        &gateway.ws_url("/ws"),
        &[
            ("X-User-Id", "user-42"),
            ("X-Random", "ignored"),
            ("X-Auth-Token", "secret"),
            ("X-Group-Admins", "ops"),
        ],
    )
    .await;

    client.send(Message::Text("ping".into())).await.unwrap();
    assert!(common::next_message(&mut client).await.is_some());

    let headers = backend.last_handshake().expect("backend saw no handshake");
    assert_eq!(headers["x-user-id"], "user-42");
    assert_eq!(headers["x-auth-token"], "secret");
    assert_eq!(headers["x-group-admins"], "ops");
    assert!(headers.get("x-random").is_none());

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn named_backend_resolves_through_registry() {
    let backend = common::start_ws_backend(BackendMode::Echo).await;

    let mut config = GatewayConfig::default();
    config.extra_config.insert(
        "websocket_backends".into(),
        json!({ "backends": { "chat": format!("ws://{}", backend.addr) } }),
    );
    config
        .endpoints
        .push(common::named_endpoint("/chat", "chat", "/rooms/lobby"));
    let gateway = common::start_gateway(config).await;

    let mut client = common::connect(&gateway.ws_url("/chat"), &[]).await;
    client.send(Message::Text("hi".into())).await.unwrap();

    match common::next_message(&mut client).await {
        Some(Message::Text(text)) => assert_eq!(text.as_str(), "hi"),
        other => panic!("unexpected message: {other:?}"),
    }

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn backend_close_closes_client() {
    let backend = common::start_ws_backend(BackendMode::CloseAfterFirst).await;
    let gateway = gateway_with(vec![common::tunnel_endpoint(
        "/ws",
        &backend.http_host(),
        "/echo",
        json!({}),
    )])
    .await;

    let mut client = common::connect(&gateway.ws_url("/ws"), &[]).await;
    client.send(Message::Text("only".into())).await.unwrap();

    let (code, reason) = common::expect_close(&mut client).await;
    assert_eq!(code, CloseCode::Normal);
    assert_eq!(reason, "done");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn unreachable_backend_closes_client_with_internal_error() {
    let dead = common::unused_addr().await;
    let gateway = gateway_with(vec![common::tunnel_endpoint(
        "/ws",
        &format!("http://{dead}"),
        "/echo",
        json!({ "handshake_timeout": "2s" }),
    )])
    .await;

    let mut client = common::connect(&gateway.ws_url("/ws"), &[]).await;

    let (code, reason) = common::expect_close(&mut client).await;
    assert_eq!(code, CloseCode::Error);
    assert_eq!(reason, "Backend connection failed");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn gateway_shutdown_ends_session_with_going_away() {
    let backend = common::start_ws_backend(BackendMode::Echo).await;
    let gateway = gateway_with(vec![common::tunnel_endpoint(
        "/ws",
        &backend.http_host(),
        "/echo",
        json!({}),
    )])
    .await;

    let mut client = common::connect(&gateway.ws_url("/ws"), &[]).await;
    client.send(Message::Text("warmup".into())).await.unwrap();
    assert!(common::next_message(&mut client).await.is_some());

    gateway.shutdown.trigger();

    let (code, reason) = common::expect_close(&mut client).await;
    assert_eq!(code, CloseCode::Away);
    assert_eq!(reason, "Going away");

    let served = tokio::time::timeout(Duration::from_secs(10), gateway.handle)
        .await
        .expect("gateway did not stop");
    assert!(served.unwrap().is_ok());
}

#[tokio::test]
async fn plain_requests_on_tunnel_endpoint_reach_http_handler() {
    let upstream = common::start_http_backend("plain response").await;
    let gateway = gateway_with(vec![common::tunnel_endpoint(
        "/ws",
        &format!("http://{upstream}"),
        "/echo",
        json!({}),
    )])
    .await;

    let response = reqwest::get(gateway.http_url("/ws")).await.unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "plain response");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn endpoints_without_tunnel_config_are_forwarded() {
    let upstream = common::start_http_backend("forwarded").await;

    let mut plain = EndpointConfig::new("/api");
    plain.backend.push(BackendConfig {
        url_pattern: "/v1".into(),
        host: vec![format!("http://{upstream}")],
    });
    let gateway = gateway_with(vec![plain]).await;

    let response = reqwest::get(gateway.http_url("/api")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "forwarded");

    let missing = reqwest::get(gateway.http_url("/nope")).await.unwrap();
    assert_eq!(missing.status(), 404);

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn client_close_is_forwarded_to_backend() {
    let backend = common::start_ws_backend(BackendMode::Echo).await;
    let gateway = gateway_with(vec![common::tunnel_endpoint(
        "/ws",
        &backend.http_host(),
        "/echo",
        json!({}),
    )])
    .await;

    let mut client = common::connect(&gateway.ws_url("/ws"), &[]).await;
    client.send(Message::Text("hello".into())).await.unwrap();
    assert!(common::next_message(&mut client).await.is_some());

    client
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();

    let frame = backend.wait_for_close().await.expect("close without code");
    assert_eq!(frame.code, CloseCode::Normal);
    assert_eq!(frame.reason.as_str(), "bye");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn backend_dropping_tcp_closes_client_normally() {
    let backend = common::start_ws_backend(BackendMode::DropAfterFirst).await;
    let gateway = gateway_with(vec![common::tunnel_endpoint(
        "/ws",
        &backend.http_host(),
        "/echo",
        json!({}),
    )])
    .await;

    let mut client = common::connect(&gateway.ws_url("/ws"), &[]).await;
    client.send(Message::Text("once".into())).await.unwrap();

    let (code, reason) = common::expect_close(&mut client).await;
    assert_eq!(code, CloseCode::Normal);
    assert_eq!(reason, "Connection closed");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn oversized_client_message_closes_client_with_1009() {
    let backend = common::start_ws_backend(BackendMode::Echo).await;
    let gateway = gateway_with(vec![common::tunnel_endpoint(
        "/ws",
        &backend.http_host(),
        "/echo",
        json!({ "max_message_size": 1024 }),
    )])
    .await;

    let mut client = common::connect(&gateway.ws_url("/ws"), &[]).await;
    client
        .send(Message::Binary(vec![1u8; 4096].into()))
        .await
        .unwrap();

    let (code, reason) = common::expect_close(&mut client).await;
    assert_eq!(code, CloseCode::Size);
    assert_eq!(reason, "Message too big");

    let frame = backend.wait_for_close().await.expect("close without code");
    assert_eq!(frame.code, CloseCode::Normal);

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn oversized_backend_message_closes_backend_with_1009() {
    let backend = common::start_ws_backend(BackendMode::ReplyWith(4096)).await;
    let gateway = gateway_with(vec![common::tunnel_endpoint(
        "/ws",
        &backend.http_host(),
        "/echo",
        json!({ "max_message_size": 1024 }),
    )])
    .await;

    let mut client = common::connect(&gateway.ws_url("/ws"), &[]).await;
    client.send(Message::Text("small".into())).await.unwrap();

    let (code, reason) = common::expect_close(&mut client).await;
    assert_eq!(code, CloseCode::Normal);
    assert_eq!(reason, "Connection closed");

    let frame = backend.wait_for_close().await.expect("close without code");
    assert_eq!(frame.code, CloseCode::Size);
    assert_eq!(frame.reason.as_str(), "Message too big");

    gateway.shutdown.trigger();
}

#[tokio::test]
async fn shutdown_closes_client_when_backend_stops_reading() {
    let backend = common::start_ws_backend(BackendMode::NeverRead).await;
    let gateway = gateway_with(vec![common::tunnel_endpoint(
        "/ws",
        &backend.http_host(),
        "/echo",
        json!({}),
    )])
    .await;

    let mut client = common::connect(&gateway.ws_url("/ws"), &[]).await;

    // Fill every buffer between the client and the backend.
    let chunk = vec![0u8; 256 * 1024];
    let mut stalled = false;
    for _ in 0..400 {
        let sent = tokio::time::timeout(
            Duration::from_millis(500),
            client.send(Message::Binary(chunk.clone().into())),
        )
        .await;
        match sent {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => panic!("send failed before stalling: {e}"),
            Err(_) => {
                stalled = true;
                break;
            }
        }
    }
    assert!(stalled, "writes never stalled");

    gateway.shutdown.trigger();

    let (code, reason) = common::expect_close(&mut client).await;
    assert_eq!(code, CloseCode::Away);
    assert_eq!(reason, "Going away");

    let served = tokio::time::timeout(Duration::from_secs(10), gateway.handle)
        .await
        .expect("gateway did not stop");
    assert!(served.unwrap().is_ok());
}
