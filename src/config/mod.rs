//! Gateway configuration
//!
//! One JSON document describes the whole gateway: listener, database,
//! field list, queries and gate settings. Every optional key has a default,
//! so a file naming only `fields` is a working configuration.

mod errors;

pub use errors::{ConfigError, ConfigResult};

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::gate::{SecretPolicy, DISABLED_WINDOW_MS};
use crate::http_server::config::PAYLOAD_JSON;
use crate::http_server::HttpServerConfig;
use crate::query::QuerySpec;
use crate::schema::{is_safe_identifier, FieldSpec};

/// Used when no `--config` is given
pub const DEFAULT_CONFIG_PATH: &str = "./tablegate.json";

/// Routes served by the gateway itself
pub const BUILTIN_ROUTES: &[&str] = &["getservertime"];

/// Environment variable that overrides `server.port`
pub const PORT_ENV: &str = "PORT";

/// Where the managed table lives
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`
    #[serde(default = "default_database_path")]
    pub path: String,

    #[serde(default = "default_table")]
    pub table: String,

    /// Timestamp column, filled on insert
    #[serde(default = "default_date_field")]
    pub date_field: String,
}

fn default_database_path() -> String {
    "./tablegate.db".to_string()
}

fn default_table() -> String {
    "data".to_string()
}

fn default_date_field() -> String {
    "date".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            table: default_table(),
            date_field: default_date_field(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: HttpServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    /// Apply schema drift to an existing table (default: true)
    #[serde(default = "default_allow_alter_table")]
    pub allow_alter_table: bool,

    /// Desired columns, in order
    #[serde(default)]
    pub fields: Vec<FieldSpec>,

    /// Route name to query
    #[serde(default)]
    pub queries: BTreeMap<String, QuerySpec>,

    /// Empty string (the default) disables authentication
    #[serde(default)]
    pub secret: SecretPolicy,

    /// Per-identity window in milliseconds; -1 disables limiting
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: i64,
}

fn default_allow_alter_table() -> bool {
    true
}

fn default_rate_limit_ms() -> i64 {
    DISABLED_WINDOW_MS
}

impl GatewayConfig {
    /// Load from file, apply the `PORT` override, then validate
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut config = Self::parse(&content)?;
        config
            .server
            .apply_port_override(std::env::var(PORT_ENV).ok().as_deref());
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating or consulting the environment
    pub fn parse(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse and validate
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.payload_type != PAYLOAD_JSON {
            return Err(ConfigError::invalid(format!(
                "Invalid payload type: '{}'. Only '{}' is supported.",
                self.server.payload_type, PAYLOAD_JSON
            )));
        }

        for (key, value) in [
            ("database.table", &self.database.table),
            ("database.date_field", &self.database.date_field),
        ] {
            if !is_safe_identifier(value) {
                return Err(ConfigError::invalid(format!(
                    "{} '{}' is not a valid SQL identifier",
                    key, value
                )));
            }
        }

        for route in self.queries.keys() {
            validate_route_name(route)?;
        }

        Ok(())
    }

    /// Field names in configured order
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.name.clone()).collect()
    }
}

fn validate_route_name(route: &str) -> ConfigResult<()> {
    if route.is_empty() {
        return Err(ConfigError::invalid("query route name must not be empty"));
    }
    if !route
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::invalid(format!(
            "query route '{}' may only contain letters, digits, '_' and '-'",
            route
        )));
    }
    if BUILTIN_ROUTES.contains(&route) {
        return Err(ConfigError::invalid(format!(
            "query route '{}' shadows a built-in route",
            route
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "server": { "port": 8081, "pretty": true },
        "database": { "path": ":memory:", "table": "iot", "date_field": "recorded_at" },
        "allow_alter_table": false,
        "fields": [
            { "name": "temperature", "type": "number" },
            { "name": "label", "type": "string(64)" }
        ],
        "queries": {
            "latest": "SELECT * FROM {table} ORDER BY {date} DESC LIMIT 1",
            "insert": {
                "query": "INSERT INTO {table} ({fields[0]}) VALUES ({temperature})",
                "validators": { "temperature": "number" },
                "serializer": "count"
            }
        },
        "secret": { "127.0.0.1": "key-a" },
        "rate_limit_ms": 1000
    }"#;

    #[test]
    fn test_full_document() {
        let config = GatewayConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.database.table, "iot");
        assert!(!config.allow_alter_table);
        assert_eq!(config.field_names(), vec!["temperature", "label"]);
        assert_eq!(config.queries.len(), 2);
        assert!(matches!(config.secret, SecretPolicy::PerIdentity(_)));
        assert_eq!(config.rate_limit_ms, 1000);
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_json_str("{}").unwrap();
        assert_eq!(config.database, DatabaseConfig::default());
        assert!(config.allow_alter_table);
        assert!(config.secret.is_disabled());
        assert_eq!(config.rate_limit_ms, DISABLED_WINDOW_MS);
        assert!(config.queries.is_empty());
    }

    #[test]
    fn test_rejects_non_json_payload() {
        let err = GatewayConfig::from_json_str(r#"{"server": {"payload_type": "xml"}}"#).unwrap_err();
        assert!(err.to_string().contains("Invalid payload type"));
    }

    #[test]
    fn test_rejects_unsafe_table_name() {
        let err =
            GatewayConfig::from_json_str(r#"{"database": {"table": "data; DROP TABLE x"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_network_credentials() {
        let err = GatewayConfig::from_json_str(r#"{"database": {"host": "localhost"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_route_names() {
        assert!(validate_route_name("latest-reading_2").is_ok());
        assert!(validate_route_name("").is_err());
        assert!(validate_route_name("a/b").is_err());
        assert!(validate_route_name("getservertime").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = GatewayConfig::load(file.path()).unwrap();
        assert_eq!(config.database.date_field, "recorded_at");
    }

    #[test]
    fn test_load_missing_file() {
        let err = GatewayConfig::load(Path::new("/nonexistent/tablegate.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
