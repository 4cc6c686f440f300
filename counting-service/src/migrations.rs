//! Schema migrations.
//!
//! Scripts are embedded per dialect and applied in ascending version order.
//! Applied versions are recorded in the `schema_versions` ledger table, so a
//! script runs at most once per store no matter how often the service boots.

use async_trait::async_trait;
use tracing::info;

use common::errors::{AppError, AppResult};

use crate::store::Dialect;

/// One versioned schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

macro_rules! embedded {
    ($dialect:literal: $(($version:literal, $name:literal)),+ $(,)?) => {
        vec![$(Migration {
            version: $version,
            name: $name,
            sql: include_str!(concat!("../migrations/", $dialect, "/", $name, ".sql")),
        }),+]
    };
}

/// Embedded scripts for `dialect`.
pub fn scripts(dialect: Dialect) -> Vec<Migration> {
    match dialect {
        Dialect::Postgres => embedded!("postgres":
            (1, "0001_create_historico_contagem"),
            (2, "0002_index_historico_contagem_created_at"),
        ),
        Dialect::MySql => embedded!("mysql":
            (1, "0001_create_historico_contagem"),
            (2, "0002_index_historico_contagem_created_at"),
        ),
        Dialect::Sqlite => embedded!("sqlite":
            (1, "0001_create_historico_contagem"),
            (2, "0002_index_historico_contagem_created_at"),
        ),
        Dialect::SqlServer => embedded!("sqlserver":
            (1, "0001_create_historico_contagem"),
            (2, "0002_index_historico_contagem_created_at"),
        ),
    }
}

/// A store migrations can be applied to.
#[async_trait]
pub trait MigrationTarget: Send + Sync {
    /// Creates the ledger table if it does not exist.
    async fn ensure_ledger(&self) -> AppResult<()>;

    /// Versions already recorded in the ledger.
    async fn applied_versions(&self) -> AppResult<Vec<u32>>;

    /// Runs `migration` and records it in the ledger, atomically where the
    /// backend allows it.
    async fn apply(&self, migration: &Migration) -> AppResult<()>;
}

/// Outcome of a migration run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Scripts applied by this run, in order.
    pub applied: Vec<&'static str>,
    /// Scripts skipped because the ledger already had them.
    pub skipped: usize,
}

/// Applies a fixed set of scripts to a [`MigrationTarget`].
#[derive(Debug)]
pub struct Migrator {
    scripts: Vec<Migration>,
}

impl Migrator {
    /// Orders `scripts` by version.
    ///
    /// # Errors
    /// Returns `AppError::Migration` if two scripts share a version.
    pub fn new(mut scripts: Vec<Migration>) -> AppResult<Self> {
        scripts.sort_by_key(|m| m.version);
        if let Some(pair) = scripts.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(AppError::Migration(format!(
                "duplicate version {}: {} and {}",
                pair[0].version, pair[0].name, pair[1].name
            )));
        }
        Ok(Self { scripts })
    }

    pub fn scripts(&self) -> &[Migration] {
        &self.scripts
    }

    /// Applies every script missing from the ledger, lowest version first.
    ///
    /// Stops at the first failing script; scripts applied before it stay
    /// recorded.
    pub async fn run<T>(&self, target: &T) -> AppResult<MigrationReport>
    where
        T: MigrationTarget + ?Sized,
    {
        target.ensure_ledger().await?;
        let applied = target.applied_versions().await?;

        let mut report = MigrationReport::default();
        for migration in &self.scripts {
            if applied.contains(&migration.version) {
                report.skipped += 1;
                continue;
            }
            info!(version = migration.version, script = migration.name, "applying migration");
            target.apply(migration).await.map_err(|e| {
                AppError::Migration(format!("{} failed: {e}", migration.name))
            })?;
            report.applied.push(migration.name);
        }

        if report.applied.is_empty() {
            info!(skipped = report.skipped, "no pending migrations");
        } else {
            info!(applied = report.applied.len(), skipped = report.skipped, "migrations applied");
        }
        Ok(report)
    }
}
