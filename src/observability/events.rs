//! Observable gateway events

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    BootStart,
    BootComplete,
    ConfigLoaded,
    /// Listener bound, accepting requests
    Serving,
    ShutdownStart,
    ShutdownComplete,
    /// Startup aborted
    BootFailed,

    // Schema
    SchemaTableCreated,
    SchemaInSync,
    SchemaMigrationPlanned,
    SchemaMigrationApplied,
    /// Drift detected while table alteration is disallowed
    SchemaDriftIgnored,
    SchemaMigrationFailed,

    // Queries
    QueryCompiled,
    QueryServed,
    QueryRejected,
    QueryFailed,

    // Gate
    AuthDisabled,
    SecretReplaced,
    RequestDenied,
    RequestRateLimited,

    // Storage
    StorageClosed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "BOOT_START",
            Event::BootComplete => "BOOT_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::Serving => "SERVING",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
            Event::BootFailed => "BOOT_FAILED",

            Event::SchemaTableCreated => "SCHEMA_TABLE_CREATED",
            Event::SchemaInSync => "SCHEMA_IN_SYNC",
            Event::SchemaMigrationPlanned => "SCHEMA_MIGRATION_PLANNED",
            Event::SchemaMigrationApplied => "SCHEMA_MIGRATION_APPLIED",
            Event::SchemaDriftIgnored => "SCHEMA_DRIFT_IGNORED",
            Event::SchemaMigrationFailed => "SCHEMA_MIGRATION_FAILED",

            Event::QueryCompiled => "QUERY_COMPILED",
            Event::QueryServed => "QUERY_SERVED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::QueryFailed => "QUERY_FAILED",

            Event::AuthDisabled => "AUTH_DISABLED",
            Event::SecretReplaced => "SECRET_REPLACED",
            Event::RequestDenied => "REQUEST_DENIED",
            Event::RequestRateLimited => "REQUEST_RATE_LIMITED",

            Event::StorageClosed => "STORAGE_CLOSED",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::BootFailed | Event::SchemaMigrationFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
