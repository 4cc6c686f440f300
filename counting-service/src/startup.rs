//! 启动流程
//!
//! Waits for the database, applies pending migrations through the
//! `BaseMaster` connection and only then opens the serving store. Nothing
//! binds a listener before [`prepare_store`] succeeds.

use std::time::Duration;

use thiserror::Error;
use tracing::info;

use common::config::{self, AppConfig};
use common::errors::AppError;

use crate::migrations::{self, Migration, Migrator};
use crate::store::{CountStore, Dialect};

/// Exit status when migrations fail.
pub const EXIT_MIGRATION_FAILURE: u8 = 3;
/// Exit status for every other startup failure.
pub const EXIT_STARTUP_FAILURE: u8 = 1;

/// Default wait before touching the database, in seconds.
pub const DEFAULT_STARTUP_DELAY_SECS: u64 = 12;

/// Reasons the service can fail to come up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("migration failure: {0}")]
    Migration(AppError),

    #[error("could not open the counting store: {0}")]
    Store(AppError),

    #[error("could not start HTTP server: {0}")]
    Server(#[from] std::io::Error),
}

impl StartupError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::Migration(_) => EXIT_MIGRATION_FAILURE,
            _ => EXIT_STARTUP_FAILURE,
        }
    }
}

/// Database settings of the counting service.
#[derive(Debug, Clone)]
pub struct CountingSettings {
    /// Connection used to run migrations (`BaseMaster`).
    pub base_master: String,
    /// Connection used to serve counts (`BaseContagem`), defaults to `base_master`.
    pub base_contagem: Option<String>,
    /// Wait before the first connection attempt.
    pub startup_delay: Duration,
}

impl CountingSettings {
    pub fn load() -> Result<Self, StartupError> {
        let base_master = config::connection_string("BaseMaster")
            .ok_or_else(|| StartupError::Config("missing connection string BaseMaster".into()))?;
        Ok(Self {
            base_master,
            base_contagem: config::connection_string("BaseContagem"),
            startup_delay: Duration::from_secs(config::parse_or(
                "MIGRATION_STARTUP_DELAY_SECS",
                DEFAULT_STARTUP_DELAY_SECS,
            )),
        })
    }

    /// Dialect of `BaseMaster`, once both connection strings are known to
    /// be usable by this build.
    fn checked_dialect(&self) -> Result<Dialect, StartupError> {
        let config_error = |e: AppError| StartupError::Config(e.to_string());
        let dialect = Dialect::detect(&self.base_master).map_err(config_error)?;
        dialect.ensure_supported().map_err(config_error)?;
        if let Some(contagem) = &self.base_contagem {
            Dialect::detect(contagem)
                .and_then(Dialect::ensure_supported)
                .map_err(config_error)?;
        }
        Ok(dialect)
    }

    fn serves_from_master(&self) -> bool {
        self.base_contagem
            .as_deref()
            .map_or(true, |contagem| contagem == self.base_master)
    }
}

/// Runs the embedded migrations for the configured dialect and returns the
/// store to serve from.
pub async fn prepare_store(
    settings: &CountingSettings,
    config: &AppConfig,
) -> Result<CountStore, StartupError> {
    let dialect = settings.checked_dialect()?;
    prepare_store_with(settings, config, migrations::scripts(dialect)).await
}

/// [`prepare_store`] with an explicit script set.
pub async fn prepare_store_with(
    settings: &CountingSettings,
    config: &AppConfig,
    scripts: Vec<Migration>,
) -> Result<CountStore, StartupError> {
    settings.checked_dialect()?;
    if !settings.startup_delay.is_zero() {
        info!(delay_secs = settings.startup_delay.as_secs(), "waiting for database");
        tokio::time::sleep(settings.startup_delay).await;
    }

    let migrator = Migrator::new(scripts).map_err(StartupError::Migration)?;
    info!(scripts = migrator.scripts().len(), "running migrations");
    let master = CountStore::connect(&settings.base_master, config)
        .await
        .map_err(StartupError::Migration)?;
    let report = migrator
        .run(&master)
        .await
        .map_err(StartupError::Migration)?;
    info!(
        dialect = %master.dialect(),
        applied = ?report.applied,
        skipped = report.skipped,
        "migrations completed successfully"
    );

    if settings.serves_from_master() {
        return Ok(master);
    }
    let contagem = settings.base_contagem.as_deref().unwrap_or(&settings.base_master);
    CountStore::connect(contagem, config)
        .await
        .map_err(StartupError::Store)
}
