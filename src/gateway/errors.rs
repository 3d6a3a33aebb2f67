//! Gateway error types
//!
//! `GatewayError` is a per-request outcome that always produces a
//! response. `StartupError` aborts initialization.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Duration;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::ConfigError;
use crate::gate::GateError;
use crate::query::{BindError, TemplateError};
use crate::schema::SchemaError;
use crate::storage::StorageError;

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_ACCESS_DENIED: &str = "access-denied";
pub const STATUS_RATE_LIMITED: &str = "rate-limited";

pub type GatewayResult<T> = Result<T, GatewayError>;

pub type StartupResult<T> = Result<T, StartupError>;

/// Why a routed request did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::UnknownRoute(_) => StatusCode::NOT_FOUND,
            GatewayError::Gate(GateError::AccessDenied) => StatusCode::UNAUTHORIZED,
            GatewayError::Gate(GateError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Bind(_) | GatewayError::Storage(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::UnknownRoute(_) => "GATE_UNKNOWN_ROUTE",
            GatewayError::Gate(err) => err.code(),
            GatewayError::Bind(_) => "GATE_INVALID_REQUEST",
            GatewayError::Storage(err) => err.code(),
        }
    }

    /// Response body
    pub fn body(&self) -> Value {
        match self {
            GatewayError::Gate(GateError::AccessDenied) => json!({
                "status": STATUS_ACCESS_DENIED,
                "message": "Access denied",
            }),
            GatewayError::Gate(GateError::RateLimited { remaining }) => json!({
                "status": STATUS_RATE_LIMITED,
                "message": "Rate limited",
                "time": whole_millis(*remaining),
            }),
            other => json!({
                "status": STATUS_FAILED,
                "message": other.to_string(),
            }),
        }
    }
}

/// Milliseconds left, rounded up so a client never sees 0 while blocked
fn whole_millis(remaining: Duration) -> i64 {
    let millis = remaining.num_milliseconds();
    if remaining > Duration::milliseconds(millis) {
        millis + 1
    } else {
        millis
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

/// Body for a successful routed request
pub fn success_body(data: Value) -> Value {
    json!({ "status": STATUS_SUCCESS, "data": data })
}

/// Failure that stops the gateway from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to bind {addr}: {message}")]
    Bind { addr: String, message: String },
}

impl StartupError {
    pub fn code(&self) -> &'static str {
        match self {
            StartupError::Config(_) => "GATE_CONFIG",
            StartupError::Schema(err) => err.code(),
            StartupError::Template(_) => "GATE_TEMPLATE",
            StartupError::Storage(err) => err.code(),
            StartupError::Bind { .. } => "GATE_LISTEN",
        }
    }
}
