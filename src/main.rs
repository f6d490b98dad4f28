//! schema-repo - connectivity check for a multi-schema PostgreSQL database.
//!
//! Connects every listed schema, pings each one, prints pool statistics as
//! JSON and closes the registry.

use clap::Parser;
use schema_repo::ConnectionRegistry;
use schema_repo::config::Config;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[derive(Debug, Serialize)]
struct SchemaReport {
    reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<schema_repo::ConnectionStats>,
}

#[derive(Debug, Serialize)]
struct Report {
    database: String,
    default_schema: String,
    schemas: BTreeMap<String, SchemaReport>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    let database = config.database()?;
    let schemas: Vec<&str> = config
        .schemas
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    info!(
        host = database.host().as_deref().unwrap_or("-"),
        url = %database.masked_url(),
        schemas = ?schemas,
        "Starting schema-repo v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry = ConnectionRegistry::new();
    if let Err(e) = registry.connect(&database, &schemas).await {
        error!(error = %e, "Connect failed");
        return Err(e.into());
    }

    let mut report = Report {
        database: database.masked_url(),
        default_schema: registry.default_schema().await,
        schemas: BTreeMap::new(),
    };

    let mut failed = false;
    for schema in &schemas {
        let stats = registry.stats(schema).await.ok();
        let entry = match registry.ping(schema).await {
            Ok(()) => SchemaReport {
                reachable: true,
                error: None,
                stats,
            },
            Err(e) => {
                failed = true;
                error!(schema = %schema, error = %e, "Ping failed");
                SchemaReport {
                    reachable: false,
                    error: Some(e.to_string()),
                    stats,
                }
            }
        };
        report.schemas.insert(schema.to_string(), entry);
        // A failed ping disconnects the whole registry.
        if failed {
            break;
        }
    }

    println!("{}", serde_json::to_string_pretty(&report)?);

    registry.close().await?;
    info!("Registry closed");

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
