//! Gateway HTTP Routes
//!
//! - `GET /` liveness
//! - `GET /getservertime` server clock in epoch milliseconds
//! - `GET /:route` a configured query; parameters come from the query
//!   string and the caller's IP address is its identity
//!
//! The two built-in routes bypass the request gate.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::gateway::{success_body, Dispatcher, STATUS_SUCCESS};
use crate::storage::Storage;

/// Shared state for gateway handlers
pub struct GatewayState<S: Storage> {
    pub dispatcher: Arc<Dispatcher<S>>,
    pub pretty: bool,
}

impl<S: Storage> Clone for GatewayState<S> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            pretty: self.pretty,
        }
    }
}

pub fn gateway_routes<S: Storage>(state: GatewayState<S>) -> Router {
    Router::new()
        .route("/", get(root_handler::<S>))
        .route("/getservertime", get(server_time_handler::<S>))
        .route("/:route", get(query_handler::<S>))
        .with_state(state)
}

/// JSON response, indented when `pretty`
pub fn json_response(status: StatusCode, body: &Value, pretty: bool) -> Response {
    let encoded = if pretty {
        serde_json::to_vec_pretty(body)
    } else {
        serde_json::to_vec(body)
    };
    match encoded {
        Ok(bytes) => (
            status,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
            bytes,
        )
            .into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn root_handler<S: Storage>(State(state): State<GatewayState<S>>) -> Response {
    let body = json!({ "status": STATUS_SUCCESS, "message": "Server is running" });
    json_response(StatusCode::OK, &body, state.pretty)
}

async fn server_time_handler<S: Storage>(State(state): State<GatewayState<S>>) -> Response {
    let body = json!({ "status": STATUS_SUCCESS, "date": Utc::now().timestamp_millis() });
    json_response(StatusCode::OK, &body, state.pretty)
}

async fn query_handler<S: Storage>(
    State(state): State<GatewayState<S>>,
    Path(route): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let identity = addr.ip().to_string();
    match state.dispatcher.handle(&route, &identity, &params).await {
        Ok(data) => json_response(StatusCode::OK, &success_body(data), state.pretty),
        Err(err) => json_response(err.status_code(), &err.body(), state.pretty),
    }
}
