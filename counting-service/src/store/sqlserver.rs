//! SQL Server backend (`tiberius`).
//!
//! One TDS connection guarded by a mutex; requests to the counting endpoint
//! are serialized over it.

use chrono::Utc;
use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use common::errors::{AppError, AppResult};

use crate::migrations::Migration;

const COUNT_SQL: &str = "SELECT COUNT_BIG(*) FROM dbo.historico_contagem";
const LEDGER_DDL: &str = "IF OBJECT_ID(N'dbo.schema_versions', N'U') IS NULL
CREATE TABLE dbo.schema_versions (
    version     BIGINT       NOT NULL PRIMARY KEY,
    script_name VARCHAR(255) NOT NULL,
    applied_at  VARCHAR(64)  NOT NULL
)";
const LEDGER_SELECT: &str = "SELECT version FROM dbo.schema_versions";
const LEDGER_INSERT: &str =
    "INSERT INTO dbo.schema_versions (version, script_name, applied_at) VALUES (@P1, @P2, @P3)";

fn query_error(e: tiberius::error::Error) -> AppError {
    AppError::DatabaseQuery(e.to_string())
}

pub struct SqlServerStore {
    client: Mutex<Client<Compat<TcpStream>>>,
}

impl std::fmt::Debug for SqlServerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlServerStore").finish_non_exhaustive()
    }
}

impl SqlServerStore {
    /// Opens a connection from an ADO.NET style connection string.
    pub async fn connect(connection_string: &str) -> AppResult<Self> {
        let connection_error = |e: String| AppError::DatabaseConnection(e);

        let config = Config::from_ado_string(connection_string)
            .map_err(|e| AppError::Config(format!("invalid SQL Server connection string: {e}")))?;
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| connection_error(e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| connection_error(e.to_string()))?;
        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| connection_error(e.to_string()))?;

        Ok(Self {
            client: Mutex::new(client),
        })
    }

    pub async fn count_rows(&self) -> AppResult<i64> {
        let mut client = self.client.lock().await;
        let row = client
            .query(COUNT_SQL, &[])
            .await
            .map_err(query_error)?
            .into_row()
            .await
            .map_err(query_error)?;
        Ok(row.and_then(|r| r.get::<i64, _>(0)).unwrap_or(0))
    }

    pub async fn ensure_ledger(&self) -> AppResult<()> {
        let mut client = self.client.lock().await;
        client
            .simple_query(LEDGER_DDL)
            .await
            .map_err(query_error)?
            .into_results()
            .await
            .map_err(query_error)?;
        Ok(())
    }

    pub async fn applied_versions(&self) -> AppResult<Vec<u32>> {
        let mut client = self.client.lock().await;
        let rows = client
            .query(LEDGER_SELECT, &[])
            .await
            .map_err(query_error)?
            .into_first_result()
            .await
            .map_err(query_error)?;

        rows.iter()
            .filter_map(|row| row.get::<i64, _>(0))
            .map(|v| {
                u32::try_from(v)
                    .map_err(|_| AppError::Migration(format!("invalid ledger version {v}")))
            })
            .collect()
    }

    /// Runs the script and its ledger insert in one transaction.
    pub async fn apply(&self, migration: &Migration) -> AppResult<()> {
        let mut client = self.client.lock().await;
        client
            .simple_query("BEGIN TRANSACTION")
            .await
            .map_err(query_error)?
            .into_results()
            .await
            .map_err(query_error)?;

        let outcome = async {
            client
                .simple_query(migration.sql)
                .await?
                .into_results()
                .await?;
            client
                .execute(
                    LEDGER_INSERT,
                    &[
                        &i64::from(migration.version),
                        &migration.name,
                        &Utc::now().to_rfc3339(),
                    ],
                )
                .await?;
            Ok::<_, tiberius::error::Error>(())
        }
        .await;

        let finish = if outcome.is_ok() {
            "COMMIT TRANSACTION"
        } else {
            "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION"
        };
        client
            .simple_query(finish)
            .await
            .map_err(query_error)?
            .into_results()
            .await
            .map_err(query_error)?;

        outcome.map_err(query_error)
    }
}
