//! Route dispatch
//!
//! A routed request runs: secret check, rate limit, bind, one storage
//! call, serializer. The first failing step decides the response.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::gate::{GateError, RequestGate};
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::query::CompiledQuery;
use crate::storage::Storage;

use super::errors::{GatewayError, GatewayResult};

/// Query parameter carrying the caller's key
pub const SECRET_PARAM: &str = "secret";

pub struct Dispatcher<S: Storage> {
    routes: HashMap<String, CompiledQuery>,
    gate: Arc<RequestGate>,
    storage: Arc<S>,
    metrics: Arc<MetricsRegistry>,
}

impl<S: Storage> Dispatcher<S> {
    pub fn new(
        routes: HashMap<String, CompiledQuery>,
        gate: Arc<RequestGate>,
        storage: Arc<S>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            routes,
            gate,
            storage,
            metrics,
        }
    }

    /// Route names, sorted
    pub fn route_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn route(&self, name: &str) -> Option<&CompiledQuery> {
        self.routes.get(name)
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Run `route` for `identity` with the request's query parameters
    pub async fn handle(
        &self,
        route: &str,
        identity: &str,
        params: &HashMap<String, String>,
    ) -> GatewayResult<Value> {
        let query = self
            .routes
            .get(route)
            .ok_or_else(|| GatewayError::UnknownRoute(route.to_string()))?;

        let request_id = Uuid::new_v4().to_string();
        let provided = params.get(SECRET_PARAM).map(String::as_str);

        if let Err(err) = self.gate.check(identity, provided) {
            self.record_gate_refusal(&err, route, identity, &request_id);
            return Err(err.into());
        }

        let values = query.bind(params).map_err(|err| {
            self.metrics.increment_rejected();
            Logger::info(
                Event::QueryRejected.as_str(),
                &[
                    ("field", err.field()),
                    ("message", err.to_string().as_str()),
                    ("request_id", request_id.as_str()),
                    ("route", route),
                ],
            );
            GatewayError::from(err)
        })?;

        let rows = self
            .storage
            .query(query.sql(), values)
            .await
            .map_err(|err| {
                self.metrics.increment_failed();
                Logger::error(
                    Event::QueryFailed.as_str(),
                    &[
                        ("code", err.code()),
                        ("message", err.to_string().as_str()),
                        ("request_id", request_id.as_str()),
                        ("route", route),
                    ],
                );
                GatewayError::from(err)
            })?;

        self.metrics.increment_served();
        Logger::trace(
            Event::QueryServed.as_str(),
            &[
                ("request_id", request_id.as_str()),
                ("route", route),
                ("rows", rows.len().to_string().as_str()),
            ],
        );

        Ok(query.serialize(rows))
    }

    fn record_gate_refusal(&self, err: &GateError, route: &str, identity: &str, request_id: &str) {
        let event = match err {
            GateError::AccessDenied => {
                self.metrics.increment_denied();
                Event::RequestDenied
            }
            GateError::RateLimited { .. } => {
                self.metrics.increment_rate_limited();
                Event::RequestRateLimited
            }
        };
        Logger::warn(
            event.as_str(),
            &[
                ("identity", identity),
                ("request_id", request_id),
                ("route", route),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::SecretPolicy;
    use crate::query::{compile, BindError, QueryDefinition, TemplateContext};
    use crate::schema::ColumnMeta;
    use crate::storage::{SqliteStorage, StorageError};
    use serde_json::json;

    async fn dispatcher(gate: RequestGate) -> Dispatcher<SqliteStorage> {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .create_table("data", &[ColumnMeta::new("temp", "DOUBLE", None)], "date")
            .await
            .unwrap();

        let fields = vec!["temp".to_string()];
        let ctx = TemplateContext::new("data", "date", &fields);
        let mut routes = HashMap::new();
        for (name, definition) in [
            (
                "insert",
                QueryDefinition::new("INSERT INTO {table} ({fields[0]}) VALUES ({temp})"),
            ),
            (
                "count",
                QueryDefinition::new("SELECT COUNT(*) AS n FROM {table}")
                    .with_serializer(|rows| rows[0]["n"].clone()),
            ),
            ("broken", QueryDefinition::new("SELECT * FROM nowhere")),
        ] {
            routes.insert(name.to_string(), compile(name, &definition, &ctx).unwrap());
        }

        Dispatcher::new(
            routes,
            Arc::new(gate),
            Arc::new(storage),
            Arc::new(MetricsRegistry::new()),
        )
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_insert_then_count() {
        let d = dispatcher(RequestGate::open()).await;
        d.handle("insert", "ip", &params(&[("temp", "21.5")])).await.unwrap();
        d.handle("insert", "ip", &params(&[("temp", "19")])).await.unwrap();
        assert_eq!(d.handle("count", "ip", &params(&[])).await.unwrap(), json!(2));
        assert_eq!(d.metrics().snapshot().served, 3);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let d = dispatcher(RequestGate::open()).await;
        assert_eq!(
            d.handle("nope", "ip", &params(&[])).await.unwrap_err(),
            GatewayError::UnknownRoute("nope".into())
        );
    }

    #[tokio::test]
    async fn test_denied_before_binding() {
        let d = dispatcher(RequestGate::new(SecretPolicy::Static("k".into()), -1)).await;
        // Missing `temp` would fail binding, but the secret check runs first
        let err = d.handle("insert", "ip", &params(&[])).await.unwrap_err();
        assert_eq!(err, GatewayError::Gate(GateError::AccessDenied));
        assert_eq!(d.metrics().snapshot().denied, 1);

        d.handle("insert", "ip", &params(&[("secret", "k"), ("temp", "1")]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rate_limited_before_binding() {
        let d = dispatcher(RequestGate::new(SecretPolicy::disabled(), 60_000)).await;
        d.handle("count", "ip", &params(&[])).await.unwrap();
        let err = d.handle("insert", "ip", &params(&[])).await.unwrap_err();
        assert!(matches!(err, GatewayError::Gate(GateError::RateLimited { .. })));
        // Another identity is unaffected
        d.handle("count", "other", &params(&[])).await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_does_not_reach_storage() {
        let d = dispatcher(RequestGate::open()).await;
        let err = d.handle("insert", "ip", &params(&[("temp", "")])).await.unwrap_err();
        assert_eq!(err, GatewayError::Bind(BindError::MissingField("temp".into())));
        assert_eq!(d.handle("count", "ip", &params(&[])).await.unwrap(), json!(0));
        assert_eq!(d.metrics().snapshot().rejected, 1);
    }

    #[tokio::test]
    async fn test_storage_failure_carries_driver_message() {
        let d = dispatcher(RequestGate::open()).await;
        let err = d.handle("broken", "ip", &params(&[])).await.unwrap_err();
        match err {
            GatewayError::Storage(StorageError::Backend(message)) => {
                assert!(message.contains("no such table"))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(d.metrics().snapshot().failed, 1);
    }
}
