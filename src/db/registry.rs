//! Schema connection registry.
//!
//! One [`ConnectionRegistry`] owns a pooled connection per schema of a
//! single PostgreSQL database. Connect and close hold the write lock for
//! their whole duration; lookups take the read lock only long enough to
//! clone a [`SchemaHandle`].

use crate::config::DatabaseConfig;
use crate::db::entity::{Entity, Migration};
use crate::db::executor::Query;
use crate::db::sql::{qualified_table, quote_ident};
use crate::error::{RepoError, RepoResult};
use crate::models::ConnectionStats;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, Executor, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const UUID_EXTENSION_SQL: &str = r#"CREATE EXTENSION IF NOT EXISTS "uuid-ossp" WITH SCHEMA public"#;

/// A pooled connection bound to one schema.
#[derive(Debug, Clone)]
pub struct SchemaHandle {
    name: String,
    pool: PgPool,
    max_connections: u32,
    opened: Arc<AtomicU64>,
}

impl SchemaHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `"schema"."table"`
    pub fn table(&self, table: &str) -> String {
        qualified_table(&self.name, table)
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats::new(
            self.max_connections,
            self.pool.size(),
            self.pool.num_idle() as u32,
            self.opened.load(Ordering::Relaxed),
        )
    }

    /// Open the pool for `schema`. With `lazy` no connection is made until
    /// first use.
    async fn open(config: &DatabaseConfig, schema: &str, lazy: bool) -> RepoResult<Self> {
        let options = config.connect_options()?;
        let opened = Arc::new(AtomicU64::new(0));
        let search_path = format!("SET search_path TO {}, public", quote_ident(schema));

        let counter = Arc::clone(&opened);
        let pool_options: PgPoolOptions = config
            .pool_options
            .to_pg_pool_options()
            .after_connect(move |conn, _meta| {
                let counter = Arc::clone(&counter);
                let search_path = search_path.clone();
                Box::pin(async move {
                    conn.execute(search_path.as_str()).await?;
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                })
            });

        let pool = if lazy {
            pool_options.connect_lazy_with(options)
        } else {
            pool_options
                .connect_with(options)
                .await
                .map_err(|e| RepoError::connection(schema, e))?
        };

        Ok(Self {
            name: schema.to_string(),
            pool,
            max_connections: config.pool_options.max_connections_or_default(),
            opened,
        })
    }

    async fn ensure_uuid_extension(&self) {
        if let Err(e) = self.pool.execute(UUID_EXTENSION_SQL).await {
            warn!(
                schema = %self.name,
                error = %e,
                "Could not create uuid-ossp extension"
            );
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    schemas: HashMap<String, SchemaHandle>,
    default_schema: String,
}

impl RegistryState {
    fn resolve(&self, schema: &str) -> RepoResult<SchemaHandle> {
        if self.schemas.is_empty() {
            return Err(RepoError::NotConnected);
        }
        let name = if schema.is_empty() {
            self.default_schema.as_str()
        } else {
            schema
        };
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| RepoError::unknown_schema(name))
    }
}

/// Schema name to pooled handle, plus connection state.
///
/// Create one at startup, share it as `Arc<ConnectionRegistry>`, and close
/// it at shutdown.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    connected: Arc<AtomicBool>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pool for every schema in `schemas`.
    ///
    /// Either every schema is registered or none is: on the first failure
    /// the pools opened by this call are closed and the registry keeps its
    /// previous state. The first schema becomes the default.
    pub async fn connect(&self, config: &DatabaseConfig, schemas: &[&str]) -> RepoResult<()> {
        self.connect_inner(config, schemas, false).await
    }

    /// Register pools without opening any connection. Connection errors
    /// surface on first use.
    pub async fn connect_lazy(&self, config: &DatabaseConfig, schemas: &[&str]) -> RepoResult<()> {
        self.connect_inner(config, schemas, true).await
    }

    async fn connect_inner(
        &self,
        config: &DatabaseConfig,
        schemas: &[&str],
        lazy: bool,
    ) -> RepoResult<()> {
        if schemas.is_empty() {
            return Err(RepoError::config("no schema provided"));
        }

        let mut state = self.state.write().await;

        if self.connected.load(Ordering::SeqCst) {
            return Err(RepoError::config("registry already connected, close it first"));
        }

        for (i, schema) in schemas.iter().enumerate() {
            if schema.is_empty() {
                return Err(RepoError::config("schema name cannot be empty"));
            }
            if schemas[..i].contains(schema) {
                return Err(RepoError::config(format!("schema {} listed twice", schema)));
            }
        }

        info!(
            url = %config.masked_url(),
            schemas = ?schemas,
            lazy,
            "Connecting schemas"
        );

        let mut staged: Vec<SchemaHandle> = Vec::with_capacity(schemas.len());
        for schema in schemas {
            match SchemaHandle::open(config, schema, lazy).await {
                Ok(handle) => {
                    if !lazy {
                        handle.ensure_uuid_extension().await;
                    }
                    debug!(schema = %schema, "Schema pool opened");
                    staged.push(handle);
                }
                Err(e) => {
                    warn!(schema = %schema, error = %e, "Schema connection failed, rolling back");
                    for handle in &staged {
                        handle.close().await;
                    }
                    return Err(e);
                }
            }
        }

        // Handles left behind by a failed ping are replaced.
        let stale: Vec<SchemaHandle> = state.schemas.drain().map(|(_, h)| h).collect();
        for handle in &stale {
            handle.close().await;
        }

        state.default_schema = schemas[0].to_string();
        state.schemas = staged
            .into_iter()
            .map(|handle| (handle.name.clone(), handle))
            .collect();
        self.connected.store(true, Ordering::SeqCst);

        info!(
            default_schema = %state.default_schema,
            count = state.schemas.len(),
            "Connected"
        );
        Ok(())
    }

    /// Check liveness of `schema` (`""` for the default).
    ///
    /// A failed ping marks the whole registry disconnected.
    pub async fn ping(&self, schema: &str) -> RepoResult<()> {
        if !self.is_connected() {
            return Err(RepoError::NotConnected);
        }
        let handle = self.handle(schema).await?;

        let result = match handle.pool.acquire().await {
            Ok(mut conn) => conn.ping().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(schema = %handle.name, "Ping ok");
                Ok(())
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                warn!(
                    schema = %handle.name,
                    error = %e,
                    "Ping failed, registry marked disconnected"
                );
                Err(RepoError::connection(handle.name, e))
            }
        }
    }

    /// Close every pool and reset to the initial empty state.
    ///
    /// Also releases handles left registered after a failed ping.
    pub async fn close(&self) -> RepoResult<()> {
        let mut state = self.state.write().await;
        if state.schemas.is_empty() {
            return Err(RepoError::NotConnected);
        }

        for (name, handle) in state.schemas.drain() {
            info!(schema = %name, "Closing schema pool");
            handle.close().await;
        }
        state.default_schema.clear();
        self.connected.store(false, Ordering::SeqCst);

        info!("All schema pools closed");
        Ok(())
    }

    /// Pool counters for `schema` (`""` for the default).
    pub async fn stats(&self, schema: &str) -> RepoResult<ConnectionStats> {
        if !self.is_connected() {
            return Err(RepoError::NotConnected);
        }
        Ok(self.handle(schema).await?.stats())
    }

    /// Create `schema` if needed and apply `migrations` in order.
    pub async fn migrate(&self, schema: &str, migrations: &[&dyn Migration]) -> RepoResult<()> {
        if !self.is_connected() {
            return Err(RepoError::NotConnected);
        }
        let handle = self.handle(schema).await?;
        let create = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&handle.name));
        handle.pool.execute(create.as_str()).await?;

        for migration in migrations {
            info!(schema = %handle.name, migration = %migration.name(), "Applying migration");
            for statement in migration.statements(&handle.name) {
                debug!(schema = %handle.name, sql = %statement, "Executing migration statement");
                handle.pool.execute(statement.as_str()).await?;
            }
        }
        Ok(())
    }

    /// Build a query over `E` rows mapped to `D`, bound to `schema`
    /// (`""` for the default).
    ///
    /// # Panics
    ///
    /// Panics if `schema` is not registered. A query cannot run without a
    /// handle, so this is a setup bug. Use [`try_query`](Self::try_query)
    /// to get an error instead.
    pub async fn query<D, E: Entity>(&self, schema: &str) -> Query<D, E> {
        match self.try_query(schema).await {
            Ok(query) => query,
            Err(e) => panic!("cannot build query for schema '{}': {}", schema, e),
        }
    }

    pub async fn try_query<D, E: Entity>(&self, schema: &str) -> RepoResult<Query<D, E>> {
        let handle = self.handle(schema).await?;
        Ok(Query::new(handle, Arc::clone(&self.connected)))
    }

    /// Resolve `schema` (`""` for the default) to its handle.
    pub async fn handle(&self, schema: &str) -> RepoResult<SchemaHandle> {
        self.state.read().await.resolve(schema)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Empty when nothing is registered.
    pub async fn default_schema(&self) -> String {
        self.state.read().await.default_schema.clone()
    }

    pub async fn schema_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().await.schemas.keys().cloned().collect();
        names.sort();
        names
    }
}
