use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{HeaderName, ACCESS_CONTROL_ALLOW_ORIGIN};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use log::{debug, warn};
use serde::Deserialize;

use crate::errors::RelayError;
use crate::network;
use crate::tile::PROXY_ROUTE;

/// Shared state of the relay endpoint. Cheap to clone: the reqwest client
/// is already reference-counted internally.
#[derive(Clone)]
pub struct RelayState {
    pub http_client: reqwest::Client,
    pub allowed_hosts: Vec<String>,
}

#[derive(Deserialize)]
struct ProxyParams {
    url: Option<String>,
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route(PROXY_ROUTE, get(relay_handler))
        .with_state(state)
}

/// `GET /api/proxy?url=<percent-encoded absolute URL>`
///
/// Forwards the decoded target URL upstream and mirrors the upstream
/// response back, with `Access-Control-Allow-Origin: *` always set on the
/// result. The upstream status is relayed verbatim, including non-2xx.
async fn relay_handler(
    State(state): State<RelayState>,
    Query(params): Query<ProxyParams>,
) -> Response {
    let target = match params.url.as_deref() {
        None | Some("") => {
            return (StatusCode::BAD_REQUEST, "Missing url parameter").into_response();
        }
        Some(target) => target,
    };
    match forward(&state, target).await {
        Ok(response) => response,
        Err(err @ RelayError::ForbiddenHost { .. }) => {
            warn!("Refusing to relay '{}': {}", target, err);
            (StatusCode::FORBIDDEN, err.to_string()).into_response()
        }
        Err(err) => {
            warn!("Unable to relay '{}': {}", target, err);
            (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
        }
    }
}

async fn forward(state: &RelayState, target: &str) -> Result<Response, RelayError> {
    network::check_host(target, &state.allowed_hosts)?;
    debug!("Relaying '{}'", target);
    let upstream = state.http_client.get(target).send().await?;
    let status = upstream.status();
    debug!("Upstream answered '{}' with {}", target, status);

    let mut headers = HeaderMap::with_capacity(upstream.headers().len() + 1);
    for (name, value) in upstream.headers() {
        if !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Hop-by-hop headers describe the connection to the upstream server, not
/// the payload, and must not be blindly copied onto our own connection.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[test]
fn test_is_hop_by_hop() {
    use axum::http::header;
    assert!(is_hop_by_hop(&header::TRANSFER_ENCODING));
    assert!(is_hop_by_hop(&header::CONNECTION));
    assert!(!is_hop_by_hop(&header::CONTENT_TYPE));
    assert!(!is_hop_by_hop(&header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
