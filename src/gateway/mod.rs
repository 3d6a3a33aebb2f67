//! Gateway assembly
//!
//! Startup order:
//! 1. Validate the field list and compile every query (no storage access)
//! 2. Create or reconcile the table, awaiting each statement
//! 3. Build the request gate and the dispatcher
//!
//! Only then may a listener accept traffic. `GatewayHandle` is the
//! administrative surface for the running gateway.

mod bootstrap;
mod dispatcher;
mod errors;

pub use bootstrap::{plan_schema, reconcile, SchemaPlan, TableTarget};
pub use dispatcher::{Dispatcher, SECRET_PARAM};
pub use errors::{
    success_body, GatewayError, GatewayResult, StartupError, StartupResult, STATUS_ACCESS_DENIED,
    STATUS_FAILED, STATUS_RATE_LIMITED, STATUS_SUCCESS,
};

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::watch;

use crate::config::GatewayConfig;
use crate::gate::{RequestGate, SecretPolicy};
use crate::observability::{log_event, log_metrics, Event, MetricsRegistry, MetricsSnapshot};
use crate::query::{compile, CompiledQuery, QueryDefinition, TemplateContext};
use crate::schema::validate_fields;
use crate::storage::{Storage, StorageResult};

/// Query definitions named in the configuration
pub fn definitions_from_config(config: &GatewayConfig) -> StartupResult<BTreeMap<String, QueryDefinition>> {
    config
        .queries
        .iter()
        .map(|(name, spec)| {
            let definition = QueryDefinition::from_spec(name, spec)?;
            Ok::<_, StartupError>((name.clone(), definition))
        })
        .collect()
}

/// Validate fields and compile every definition against the configured
/// table. Touches no storage.
pub fn compile_routes(
    config: &GatewayConfig,
    definitions: &BTreeMap<String, QueryDefinition>,
) -> StartupResult<HashMap<String, CompiledQuery>> {
    validate_fields(&config.fields, &config.database.date_field)?;

    let field_names = config.field_names();
    let ctx = TemplateContext::new(
        &config.database.table,
        &config.database.date_field,
        &field_names,
    );

    let mut routes = HashMap::with_capacity(definitions.len());
    for (name, definition) in definitions {
        let compiled = compile(name, definition, &ctx)?;
        log_event(
            Event::QueryCompiled,
            &[
                ("parameters", compiled.variable_order().len().to_string().as_str()),
                ("route", name.as_str()),
                ("sql", compiled.sql()),
            ],
        );
        routes.insert(name.clone(), compiled);
    }
    Ok(routes)
}

/// A reconciled, ready-to-serve gateway
pub struct Gateway<S: Storage> {
    dispatcher: Arc<Dispatcher<S>>,
    schema_plan: SchemaPlan,
    shutdown: Arc<watch::Sender<bool>>,
}

impl<S: Storage> Gateway<S> {
    /// Start from configuration alone
    pub async fn bootstrap(config: &GatewayConfig, storage: S) -> StartupResult<Self> {
        let definitions = definitions_from_config(config)?;
        Self::bootstrap_with(config, definitions, config.secret.clone(), storage).await
    }

    /// Start with query definitions and a secret policy supplied in code,
    /// e.g. closures for hooks or a predicate policy
    pub async fn bootstrap_with(
        config: &GatewayConfig,
        definitions: BTreeMap<String, QueryDefinition>,
        secret: SecretPolicy,
        storage: S,
    ) -> StartupResult<Self> {
        log_event(Event::BootStart, &[]);

        let routes = compile_routes(config, &definitions)?;

        let metrics = Arc::new(MetricsRegistry::new());
        let target = TableTarget {
            table: &config.database.table,
            timestamp_column: &config.database.date_field,
            fields: &config.fields,
        };
        let schema_plan = reconcile(&storage, &target, config.allow_alter_table, &metrics).await?;

        let gate = Arc::new(RequestGate::new(secret, config.rate_limit_ms));
        let dispatcher = Arc::new(Dispatcher::new(routes, gate, Arc::new(storage), metrics));
        let (shutdown, _) = watch::channel(false);

        log_event(
            Event::BootComplete,
            &[
                ("routes", dispatcher.route_names().join(",").as_str()),
                ("schema", schema_plan.to_string().as_str()),
            ],
        );

        Ok(Self {
            dispatcher,
            schema_plan,
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher<S>> {
        Arc::clone(&self.dispatcher)
    }

    /// What startup reconciliation did
    pub fn schema_plan(&self) -> &SchemaPlan {
        &self.schema_plan
    }

    pub fn handle(&self) -> GatewayHandle<S> {
        GatewayHandle {
            dispatcher: Arc::clone(&self.dispatcher),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

/// Administrative operations on a running gateway
pub struct GatewayHandle<S: Storage> {
    dispatcher: Arc<Dispatcher<S>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl<S: Storage> Clone for GatewayHandle<S> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<S: Storage> GatewayHandle<S> {
    /// Replace the active secret policy; the next request sees it
    pub fn set_secret(&self, policy: SecretPolicy) {
        self.dispatcher.gate().set_secret(policy);
        log_event(Event::SecretReplaced, &[]);
    }

    /// Configured rate-limit window, `None` when unlimited
    pub fn rate_limit_window(&self) -> Option<Duration> {
        self.dispatcher.gate().rate_limit_window()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.dispatcher.metrics().snapshot()
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stop the listener and release storage. Later query work fails with
    /// `StorageError::Closed`.
    pub async fn close(&self) -> StorageResult<()> {
        log_event(Event::ShutdownStart, &[]);
        self.shutdown.send_replace(true);
        self.dispatcher.storage().close().await?;
        log_event(Event::StorageClosed, &[]);
        log_metrics(Event::ShutdownComplete, &self.metrics());
        Ok(())
    }

    /// Resolves once `close` has been called
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.shutdown.subscribe();
        async move {
            loop {
                let closed = *receiver.borrow_and_update();
                if closed || receiver.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateError;
    use crate::storage::{SqliteStorage, StorageError};
    use serde_json::json;

    fn config() -> GatewayConfig {
        GatewayConfig::from_json_str(
            r#"{
                "database": { "path": ":memory:" },
                "fields": [ { "name": "temp", "type": "number" } ],
                "queries": {
                    "insert": {
                        "query": "INSERT INTO {table} ({fields[0]}) VALUES ({temp})",
                        "validators": { "temp": "number" },
                        "preprocessor": { "temp": "number" }
                    },
                    "all": { "query": "SELECT {fields[0]} FROM {table}", "serializer": "column:temp" }
                }
            }"#,
        )
        .unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_bootstrap_creates_table_and_serves() {
        let gateway = Gateway::bootstrap(&config(), SqliteStorage::open_in_memory().unwrap())
            .await
            .unwrap();
        assert!(matches!(gateway.schema_plan(), SchemaPlan::Create(_)));

        let dispatcher = gateway.dispatcher();
        assert_eq!(dispatcher.route_names(), vec!["all", "insert"]);
        dispatcher
            .handle("insert", "ip", &params(&[("temp", "4.5")]))
            .await
            .unwrap();
        assert_eq!(
            dispatcher.handle("all", "ip", &params(&[])).await.unwrap(),
            json!([4.5])
        );
    }

    #[tokio::test]
    async fn test_bad_template_fails_before_storage() {
        let mut config = config();
        config.queries.insert(
            "bad".into(),
            crate::query::QuerySpec::Template("SELECT {fields[3]} FROM {table}".into()),
        );
        let storage = SqliteStorage::open_in_memory().unwrap();
        let observer = storage.clone();
        let err = Gateway::bootstrap(&config, storage).await.err().unwrap();
        assert!(matches!(err, StartupError::Template(_)));
        assert_eq!(observer.describe_table("data").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_handle_admin_operations() {
        let mut config = config();
        config.rate_limit_ms = 500;
        let gateway = Gateway::bootstrap(&config, SqliteStorage::open_in_memory().unwrap())
            .await
            .unwrap();
        let handle = gateway.handle();
        assert_eq!(handle.rate_limit_window(), Some(Duration::milliseconds(500)));

        handle.set_secret(SecretPolicy::Static("rotated".into()));
        let err = gateway
            .dispatcher()
            .handle("all", "ip", &params(&[]))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Gate(GateError::AccessDenied));
        assert_eq!(handle.metrics().denied, 1);

        assert!(!handle.is_closed());
        let signal = handle.shutdown_signal();
        handle.close().await.unwrap();
        signal.await;
        assert!(handle.is_closed());

        handle.set_secret(SecretPolicy::disabled());
        let err = gateway
            .dispatcher()
            .handle("all", "other", &params(&[]))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Storage(StorageError::Closed));
    }

    #[tokio::test]
    async fn test_bootstrap_with_code_hooks() {
        let mut definitions = BTreeMap::new();
        definitions.insert(
            "even".to_string(),
            QueryDefinition::new("SELECT {n} AS n")
                .with_validator("n", |raw| raw.parse::<i64>().map(|n| n % 2 == 0).unwrap_or(false)),
        );
        let gateway = Gateway::bootstrap_with(
            &config(),
            definitions,
            SecretPolicy::predicate(|_, identity| identity == "trusted"),
            SqliteStorage::open_in_memory().unwrap(),
        )
        .await
        .unwrap();
        let dispatcher = gateway.dispatcher();

        assert!(dispatcher.handle("even", "trusted", &params(&[("n", "4")])).await.is_ok());
        assert!(matches!(
            dispatcher.handle("even", "trusted", &params(&[("n", "3")])).await,
            Err(GatewayError::Bind(_))
        ));
        assert!(matches!(
            dispatcher.handle("even", "stranger", &params(&[("n", "4")])).await,
            Err(GatewayError::Gate(GateError::AccessDenied))
        ));
    }
}
