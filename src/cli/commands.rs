//! CLI command implementations
//!
//! `serve` runs a single-threaded tokio runtime: one worker drives every
//! request, and storage calls yield to it while SQLite works on the
//! blocking pool.

use std::path::Path;

use tokio::runtime::{Builder, Runtime};

use crate::config::GatewayConfig;
use crate::gateway::{compile_routes, definitions_from_config, plan_schema, Gateway, TableTarget};
use crate::http_server::HttpServer;
use crate::observability::{log_event, Event, Logger};
use crate::storage::{SqliteStorage, Storage};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config } => serve(&config),
        Command::Plan { config } => plan(&config),
        Command::Check { config } => check(&config),
    }
}

fn load_config(path: &Path) -> CliResult<GatewayConfig> {
    let config = GatewayConfig::load(path)?;
    log_event(
        Event::ConfigLoaded,
        &[
            ("fields", config.fields.len().to_string().as_str()),
            ("path", path.display().to_string().as_str()),
            ("queries", config.queries.len().to_string().as_str()),
        ],
    );
    Ok(config)
}

fn runtime() -> CliResult<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::io_error(format!("Failed to create tokio runtime: {}", e)))
}

/// Reconcile the table, then serve until Ctrl-C or an administrative close
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let storage = SqliteStorage::open(&config.database.path)?;

    runtime()?.block_on(async {
        let gateway = match Gateway::bootstrap(&config, storage).await {
            Ok(gateway) => gateway,
            Err(e) => {
                Logger::fatal(
                    Event::BootFailed.as_str(),
                    &[("code", e.code()), ("message", e.to_string().as_str())],
                );
                return Err(CliError::from(e));
            }
        };

        let handle = gateway.handle();
        let server = HttpServer::new(config.server.clone(), gateway.dispatcher());
        let listener = server.bind().await.map_err(|e| {
            CliError::boot_failed(format!("Failed to bind {}: {}", config.server.socket_addr(), e))
        })?;

        let closed = handle.shutdown_signal();
        let shutdown = async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = closed => {}
            }
        };

        server
            .serve(listener, shutdown)
            .await
            .map_err(|e| CliError::io_error(format!("HTTP server failed: {}", e)))?;

        if !handle.is_closed() {
            handle.close().await?;
        }
        Ok(())
    })
}

/// Print the statements startup would run against the configured database
pub fn plan(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let storage = SqliteStorage::open(&config.database.path)?;
    let target = TableTarget {
        table: &config.database.table,
        timestamp_column: &config.database.date_field,
        fields: &config.fields,
    };

    let statements = runtime()?.block_on(async {
        let sql = match plan_schema(&storage, &target).await {
            Ok(plan) => plan.sql(&storage, &target).await,
            Err(e) => Err(e),
        };
        storage.close().await?;
        Ok::<_, CliError>(sql?)
    })?;

    if statements.is_empty() {
        println!("-- table '{}' is in sync", config.database.table);
    }
    for statement in statements {
        println!("{};", statement);
    }
    Ok(())
}

/// Validate configuration and compile every query without opening storage
pub fn check(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let definitions = definitions_from_config(&config)?;
    let routes = compile_routes(&config, &definitions)?;

    let mut names: Vec<&String> = routes.keys().collect();
    names.sort();
    for name in names {
        println!("/{} -> {}", name, routes[name].sql());
    }
    println!(
        "configuration ok: {} fields, {} routes",
        config.fields.len(),
        routes.len()
    );
    Ok(())
}
