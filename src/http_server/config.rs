//! HTTP Server Configuration
//!
//! Listener address, response encoding and CORS settings.

use serde::{Deserialize, Serialize};

/// The only payload encoding the gateway speaks
pub const PAYLOAD_JSON: &str = "json";

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 3000); `PORT` in the environment wins
    #[serde(default = "default_port")]
    pub port: u16,

    /// Response encoding (default: "json")
    #[serde(default = "default_payload_type")]
    pub payload_type: String,

    /// Indent response bodies by two spaces
    #[serde(default)]
    pub pretty: bool,

    /// CORS allowed origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_payload_type() -> String {
    PAYLOAD_JSON.to_string()
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            payload_type: default_payload_type(),
            pretty: false,
            cors_origins: Vec::new(),
        }
    }
}

impl HttpServerConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Replace the port with a valid `PORT` value, if any
    pub fn apply_port_override(&mut self, value: Option<&str>) {
        if let Some(port) = value.and_then(|raw| raw.trim().parse::<u16>().ok()) {
            self.port = port;
        }
    }
}
