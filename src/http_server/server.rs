//! # HTTP Server
//!
//! Binds the gateway router to a TCP listener and serves until the
//! shutdown future resolves. Connections carry their peer address so the
//! gateway can use it as the caller identity.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::config::HttpServerConfig;
use super::gateway_routes::{gateway_routes, GatewayState};
use crate::gateway::Dispatcher;
use crate::observability::{log_event, Event};
use crate::storage::Storage;

/// HTTP server for one gateway
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new<S: Storage>(config: HttpServerConfig, dispatcher: Arc<Dispatcher<S>>) -> Self {
        let router = Self::build_router(&config, dispatcher);
        Self { config, router }
    }

    fn build_router<S: Storage>(config: &HttpServerConfig, dispatcher: Arc<Dispatcher<S>>) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new().allow_origin(Any).allow_methods(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
        };

        gateway_routes(GatewayState {
            dispatcher,
            pretty: config.pretty,
        })
        .layer(cors)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind the configured address
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.config.socket_addr()).await
    }

    /// Serve on `listener` until `shutdown` resolves; in-flight requests
    /// are allowed to finish
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        log_event(Event::Serving, &[("addr", addr.to_string().as_str())]);

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::RequestGate;
    use crate::observability::MetricsRegistry;
    use crate::storage::SqliteStorage;
    use std::collections::HashMap;

    fn dispatcher() -> Arc<Dispatcher<SqliteStorage>> {
        Arc::new(Dispatcher::new(
            HashMap::new(),
            Arc::new(RequestGate::open()),
            Arc::new(SqliteStorage::open_in_memory().unwrap()),
            Arc::new(MetricsRegistry::new()),
        ))
    }

    #[test]
    fn test_server_address() {
        let server = HttpServer::new(HttpServerConfig::with_port(8080), dispatcher());
        assert_eq!(server.socket_addr(), "0.0.0.0:8080");
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let mut config = HttpServerConfig::with_port(0);
        config.host = "127.0.0.1".into();
        let server = HttpServer::new(config, dispatcher());
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(listener, async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
