//! Backing store of the counting service.
//!
//! The dialect is picked from the connection string. Postgres, MySQL and
//! SQLite go through `sqlx` pools; SQL Server needs the `sqlserver` feature.

#[cfg(feature = "sqlserver")]
mod sqlserver;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::TryStreamExt;
use sqlx::{mysql::MySqlPoolOptions, postgres::PgPoolOptions, sqlite::SqlitePoolOptions};
use sqlx::{MySqlPool, PgPool, SqlitePool};

use common::config::AppConfig;
use common::errors::{AppError, AppResult};

use crate::migrations::{Migration, MigrationTarget};

const COUNT_SQL: &str = "SELECT COUNT(*) FROM historico_contagem";
const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS schema_versions (
    version     BIGINT       NOT NULL PRIMARY KEY,
    script_name VARCHAR(255) NOT NULL,
    applied_at  VARCHAR(64)  NOT NULL
)";
const LEDGER_SELECT: &str = "SELECT version FROM schema_versions";
const LEDGER_INSERT_PG: &str =
    "INSERT INTO schema_versions (version, script_name, applied_at) VALUES ($1, $2, $3)";
const LEDGER_INSERT: &str =
    "INSERT INTO schema_versions (version, script_name, applied_at) VALUES (?, ?, ?)";

/// SQL dialect of a backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
    SqlServer,
}

impl Dialect {
    /// Infers the dialect from a connection string.
    ///
    /// URL forms select Postgres, MySQL or SQLite; an ADO-style
    /// `Key=Value;...` string selects SQL Server.
    pub fn detect(connection_string: &str) -> AppResult<Self> {
        let lower = connection_string.trim().to_ascii_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Ok(Dialect::Postgres)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Ok(Dialect::MySql)
        } else if lower.starts_with("sqlite:") {
            Ok(Dialect::Sqlite)
        } else if lower.contains('=') && (lower.contains("server=") || lower.contains("data source=")) {
            Ok(Dialect::SqlServer)
        } else {
            Err(AppError::Config(
                "unrecognized connection string (expected postgres://, mysql://, sqlite: or Server=...)".into(),
            ))
        }
    }
}

impl Dialect {
    /// Fails for dialects this build cannot connect to.
    pub fn ensure_supported(self) -> AppResult<()> {
        if self == Dialect::SqlServer && cfg!(not(feature = "sqlserver")) {
            return Err(AppError::Config(
                "SQL Server support requires the `sqlserver` feature".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::MySql => write!(f, "mysql"),
            Dialect::Sqlite => write!(f, "sqlite"),
            Dialect::SqlServer => write!(f, "sqlserver"),
        }
    }
}

/// Connection to the counted database.
#[derive(Debug)]
pub enum CountStore {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
    #[cfg(feature = "sqlserver")]
    SqlServer(sqlserver::SqlServerStore),
}

impl CountStore {
    /// Connects to the store described by `connection_string`.
    pub async fn connect(connection_string: &str, config: &AppConfig) -> AppResult<Self> {
        let timeout = Duration::from_secs(config.connect_timeout_secs);
        let max_connections = config.max_connections;
        let connection_error = |e: sqlx::Error| AppError::DatabaseConnection(e.to_string());

        match Dialect::detect(connection_string)? {
            Dialect::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(timeout)
                    .connect(connection_string)
                    .await
                    .map_err(connection_error)?;
                Ok(CountStore::Postgres(pool))
            }
            Dialect::MySql => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(timeout)
                    .connect(connection_string)
                    .await
                    .map_err(connection_error)?;
                Ok(CountStore::MySql(pool))
            }
            Dialect::Sqlite => {
                // A single long-lived connection keeps `sqlite::memory:` alive.
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .acquire_timeout(timeout)
                    .connect(connection_string)
                    .await
                    .map_err(connection_error)?;
                Ok(CountStore::Sqlite(pool))
            }
            #[cfg(feature = "sqlserver")]
            Dialect::SqlServer => Ok(CountStore::SqlServer(
                sqlserver::SqlServerStore::connect(connection_string).await?,
            )),
            #[cfg(not(feature = "sqlserver"))]
            Dialect::SqlServer => Err(AppError::Config(
                "SQL Server support requires the `sqlserver` feature".into(),
            )),
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            CountStore::Postgres(_) => Dialect::Postgres,
            CountStore::MySql(_) => Dialect::MySql,
            CountStore::Sqlite(_) => Dialect::Sqlite,
            #[cfg(feature = "sqlserver")]
            CountStore::SqlServer(_) => Dialect::SqlServer,
        }
    }

    /// Current number of rows in `historico_contagem`.
    pub async fn count_rows(&self) -> AppResult<i64> {
        let result: Result<i64, sqlx::Error> = match self {
            CountStore::Postgres(pool) => sqlx::query_scalar::<_, i64>(COUNT_SQL).fetch_one(pool).await,
            CountStore::MySql(pool) => sqlx::query_scalar::<_, i64>(COUNT_SQL).fetch_one(pool).await,
            CountStore::Sqlite(pool) => sqlx::query_scalar::<_, i64>(COUNT_SQL).fetch_one(pool).await,
            #[cfg(feature = "sqlserver")]
            CountStore::SqlServer(store) => return store.count_rows().await,
        };
        result.map_err(|e| AppError::DatabaseQuery(e.to_string()))
    }
}

/// Runs one migration plus its ledger insert inside a transaction.
macro_rules! apply_in_transaction {
    ($pool:expr, $insert:expr, $migration:expr) => {{
        let query_error = |e: sqlx::Error| AppError::DatabaseQuery(e.to_string());
        let mut tx = $pool.begin().await.map_err(query_error)?;
        sqlx::Executor::execute_many(&mut *tx, sqlx::raw_sql($migration.sql))
            .try_collect::<Vec<_>>()
            .await
            .map_err(query_error)?;
        sqlx::query($insert)
            .bind(i64::from($migration.version))
            .bind($migration.name)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        tx.commit().await.map_err(query_error)
    }};
}

#[async_trait]
impl MigrationTarget for CountStore {
    async fn ensure_ledger(&self) -> AppResult<()> {
        let result = match self {
            CountStore::Postgres(pool) => sqlx::query(LEDGER_DDL).execute(pool).await.map(|_| ()),
            CountStore::MySql(pool) => sqlx::query(LEDGER_DDL).execute(pool).await.map(|_| ()),
            CountStore::Sqlite(pool) => sqlx::query(LEDGER_DDL).execute(pool).await.map(|_| ()),
            #[cfg(feature = "sqlserver")]
            CountStore::SqlServer(store) => return store.ensure_ledger().await,
        };
        result.map_err(|e| AppError::DatabaseQuery(format!("failed to create ledger: {e}")))
    }

    async fn applied_versions(&self) -> AppResult<Vec<u32>> {
        let versions: Vec<i64> = match self {
            CountStore::Postgres(pool) => sqlx::query_scalar::<_, i64>(LEDGER_SELECT).fetch_all(pool).await,
            CountStore::MySql(pool) => sqlx::query_scalar::<_, i64>(LEDGER_SELECT).fetch_all(pool).await,
            CountStore::Sqlite(pool) => sqlx::query_scalar::<_, i64>(LEDGER_SELECT).fetch_all(pool).await,
            #[cfg(feature = "sqlserver")]
            CountStore::SqlServer(store) => return store.applied_versions().await,
        }
        .map_err(|e| AppError::DatabaseQuery(e.to_string()))?;

        versions
            .into_iter()
            .map(|v| {
                u32::try_from(v)
                    .map_err(|_| AppError::Migration(format!("invalid ledger version {v}")))
            })
            .collect()
    }

    async fn apply(&self, migration: &Migration) -> AppResult<()> {
        match self {
            CountStore::Postgres(pool) => apply_in_transaction!(pool, LEDGER_INSERT_PG, migration),
            CountStore::MySql(pool) => apply_in_transaction!(pool, LEDGER_INSERT, migration),
            CountStore::Sqlite(pool) => apply_in_transaction!(pool, LEDGER_INSERT, migration),
            #[cfg(feature = "sqlserver")]
            CountStore::SqlServer(store) => store.apply(migration).await,
        }
    }
}
