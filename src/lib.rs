//! tablegate - a configuration-driven HTTP gateway over a relational table
//!
//! A JSON configuration names a field list and a set of query templates.
//! On startup the gateway reconciles one table against the field list,
//! compiles each template to positional SQL, and serves every query as an
//! HTTP route behind a shared secret and a per-client rate limit.

pub mod cli;
pub mod config;
pub mod gate;
pub mod gateway;
pub mod http_server;
pub mod observability;
pub mod query;
pub mod schema;
pub mod storage;
