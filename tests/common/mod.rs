//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::HeaderMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use tunnel_gateway::config::{BackendConfig, EndpointConfig, GatewayConfig};
use tunnel_gateway::lifecycle::{Gateway, Shutdown};

pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a mock WebSocket backend treats its connections.
#[derive(Debug, Clone, Copy)]
pub enum BackendMode {
    /// Echo every data message.
    Echo,
    /// Echo the first data message, then close with 1000 "done".
    CloseAfterFirst,
    /// Echo the first data message, then drop the TCP connection without a
    /// close frame.
    DropAfterFirst,
    /// Answer every data message with a binary message of this many bytes.
    ReplyWith(usize),
    /// Complete the handshake, then never read again.
    NeverRead,
}

/// A running mock WebSocket backend.
pub struct WsBackend {
    pub addr: SocketAddr,
    /// Handshake headers of every accepted connection, in order.
    pub handshakes: Arc<Mutex<Vec<HeaderMap>>>,
    /// Close frames received from the gateway.
    pub closes: Arc<Mutex<Vec<Option<CloseFrame>>>>,
}

impl WsBackend {
    pub fn http_host(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn last_handshake(&self) -> Option<HeaderMap> {
        self.handshakes.lock().unwrap().last().cloned()
    }

    /// First close frame the backend received, waiting up to five seconds.
    pub async fn wait_for_close(&self) -> Option<CloseFrame> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(frame) = self.closes.lock().unwrap().first().cloned() {
                    return frame;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("backend saw no close frame")
    }
}

/// Start a mock WebSocket backend on an ephemeral port.
pub async fn start_ws_backend(mode: BackendMode) -> WsBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handshakes = Arc::new(Mutex::new(Vec::new()));

    let closes = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&handshakes);
    let received_closes = Arc::clone(&closes);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let captured = Arc::clone(&captured);
            let received_closes = Arc::clone(&received_closes);
            tokio::spawn(async move {
                let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    captured.lock().unwrap().push(request.headers().clone());
                    Ok(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, callback).await else {
                    return;
                };

                if let BackendMode::NeverRead = mode {
                    let _held = ws;
                    std::future::pending::<()>().await;
                    return;
                }

                while let Some(Ok(message)) = ws.next().await {
                    if let Message::Close(frame) = &message {
                        received_closes.lock().unwrap().push(frame.clone());
                        continue;
                    }
                    if !(message.is_text() || message.is_binary()) {
                        continue;
                    }
                    let reply = match mode {
                        BackendMode::ReplyWith(size) => Message::Binary(vec![7u8; size].into()),
                        _ => message,
                    };
                    if ws.send(reply).await.is_err() {
                        return;
                    }
                    match mode {
                        BackendMode::CloseAfterFirst => {
                            let _ = ws
                                .close(Some(CloseFrame {
                                    code: CloseCode::Normal,
                                    reason: "done".into(),
                                }))
                                .await;
                            while ws.next().await.is_some() {}
                            return;
                        }
                        BackendMode::DropAfterFirst => return,
                        _ => {}
                    }
                }
            });
        }
    });

    WsBackend {
        addr,
        handshakes,
        closes,
    }
}

/// Start a plain HTTP backend that answers every request with `body`.
pub async fn start_http_backend(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A tunnel endpoint in the host-list shape.
pub fn tunnel_endpoint(path: &str, host: &str, url_pattern: &str, websocket: Value) -> EndpointConfig {
    let mut endpoint = EndpointConfig::new(path);
    endpoint.extra_config.insert("websocket".into(), websocket);
    endpoint.backend.push(BackendConfig {
        url_pattern: url_pattern.into(),
        host: vec![host.into()],
    });
    endpoint
}

/// A tunnel endpoint in the named-backend shape.
pub fn named_endpoint(path: &str, backend: &str, backend_path: &str) -> EndpointConfig {
    let mut endpoint = EndpointConfig::new(path);
    endpoint.extra_config.insert("websocket".into(), json!({}));
    endpoint.extra_config.insert("backend".into(), json!(backend));
    endpoint
        .extra_config
        .insert("backend_path".into(), json!(backend_path));
    endpoint
}

/// A running gateway.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestGateway {
    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the gateway on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let gateway = Gateway::build(&config, &shutdown);
    let handle = tokio::spawn(gateway.serve(listener));

    TestGateway {
        addr,
        shutdown,
        handle,
    }
}

/// Open a client WebSocket with extra request headers.
pub async fn connect(url: &str, headers: &[(&'static str, &'static str)]) -> ClientStream {
    let mut request = url.into_client_request().unwrap();
    for &(name, value) in headers {
        request.headers_mut().insert(name, value.parse().unwrap());
    }
    let (ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    ws
}

/// Next non-control message, or `None` when the stream ends.
pub async fn next_message(ws: &mut ClientStream) -> Option<Message> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(message)) => return Some(message),
                Some(Err(_)) | None => return None,
            }
        }
    })
    .await
    .expect("timed out waiting for message")
}

/// Code and reason of the next close frame the client sees.
pub async fn expect_close(ws: &mut ClientStream) -> (CloseCode, String) {
    loop {
        match next_message(ws).await {
            Some(Message::Close(Some(frame))) => return (frame.code, frame.reason.to_string()),
            Some(Message::Close(None)) => panic!("close frame without code"),
            Some(_) => continue,
            None => panic!("stream ended without close frame"),
        }
    }
}
