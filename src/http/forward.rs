//! Plain HTTP forwarding.
//!
//! # Responsibilities
//! - Default [`HandlerFactory`] for non-tunnel traffic
//! - Forward to `backend[0].host[0] + url_pattern`, keeping the query string
//! - Copy method, headers and body; stream the upstream response back
//!
//! # Design Decisions
//! - No retries: a failed upstream request is a 502
//! - The endpoint's configured method is enforced (`ANY` disables the check)

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, uri::PathAndQuery, Method, Request, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
    Json,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::json;

use crate::config::{EndpointConfig, TimeoutConfig};
use crate::observability::metrics;
use crate::tunnel::handler::{EndpointHandler, HandlerFactory};

/// Builds handlers that forward plain HTTP requests upstream.
#[derive(Clone)]
pub struct ForwardingFactory {
    client: Client<HttpConnector, Body>,
}

impl ForwardingFactory {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }
}

impl HandlerFactory for ForwardingFactory {
    fn build(&self, endpoint: &EndpointConfig) -> EndpointHandler {
        let route = Forward {
            client: self.client.clone(),
            endpoint: endpoint.endpoint.clone(),
            method: allowed_method(&endpoint.method),
            upstream: upstream_base(endpoint),
        };

        EndpointHandler::new(move |request| {
            let route = route.clone();
            async move {
                let response = route.handle(request).await;
                metrics::record_http_request(response.status().as_u16());
                response
            }
        })
    }
}

#[derive(Clone)]
struct Forward {
    client: Client<HttpConnector, Body>,
    endpoint: String,
    /// `None` accepts every method.
    method: Option<Method>,
    upstream: Option<String>,
}

impl Forward {
    async fn handle(&self, request: Request<Body>) -> Response {
        if let Some(method) = &self.method {
            if request.method() != method {
                return (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, method.as_str())])
                    .into_response();
            }
        }

        let Some(upstream) = &self.upstream else {
            tracing::warn!(endpoint = %self.endpoint, "No backend configured");
            return error_response(StatusCode::BAD_GATEWAY, "No backend configured");
        };

        let (mut parts, body) = request.into_parts();
        let target = match parts.uri.query() {
            Some(query) => format!("{upstream}?{query}"),
            None => upstream.clone(),
        };
        let uri = match target.parse::<Uri>() {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(endpoint = %self.endpoint, target = %target, error = %e, "Invalid upstream URI");
                return error_response(StatusCode::BAD_GATEWAY, "Invalid upstream");
            }
        };

        let method = parts.method.clone();
        parts.uri = uri;
        parts.version = Version::HTTP_11;
        parts.headers.remove(header::HOST);
        parts.extensions = Default::default();

        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        tracing::debug!(
            request_id = %request_id,
            endpoint = %self.endpoint,
            method = %method,
            upstream = %target,
            "Forwarding request"
        );

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => into_axum(response),
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    endpoint = %self.endpoint,
                    upstream = %target,
                    error = %e,
                    "Upstream error"
                );
                error_response(StatusCode::BAD_GATEWAY, "Upstream request failed")
            }
        }
    }
}

fn into_axum(response: hyper::Response<Incoming>) -> Response {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn allowed_method(method: &str) -> Option<Method> {
    if method.eq_ignore_ascii_case("ANY") || method.is_empty() {
        return None;
    }
    Method::from_bytes(method.to_ascii_uppercase().as_bytes()).ok()
}

/// `backend[0].host[0]` joined with `url_pattern`, or `None` when either is
/// missing.
fn upstream_base(endpoint: &EndpointConfig) -> Option<String> {
    let backend = endpoint.backend.first()?;
    let host = backend.host.first()?;
    let path = PathAndQuery::try_from(backend.url_pattern.as_str())
        .map(|p| p.path().to_string())
        .unwrap_or_else(|_| "/".to_string());
    Some(format!("{}{}", host.trim_end_matches('/'), path))
}
