//! # tablegate HTTP Server Module
//!
//! Exposes a gateway over HTTP with axum.
//!
//! # Endpoints
//!
//! - `/` - Liveness
//! - `/getservertime` - Server clock
//! - `/:route` - Configured queries

pub mod config;
pub mod gateway_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use gateway_routes::{gateway_routes, json_response, GatewayState};
pub use server::HttpServer;
