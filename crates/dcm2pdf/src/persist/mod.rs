//! Persistence stage
//!
//! Stores converted documents in `pdf_storage`. Each write opens its own
//! connection, runs one insert inside a transaction, commits or rolls back,
//! and closes the connection before returning.

pub mod schema;

use async_trait::async_trait;
use dcm2pdf_common::PipelineError;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Postgres, Transaction};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::PersistedRecord;

#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The database refused or dropped the connection
    #[error("Database connection failed: {0}. Check the [database] settings.")]
    Connect(String),

    /// The insert (or its commit) failed; the transaction was rolled back
    #[error("Insert of '{filename}' failed and was rolled back: {source}")]
    Insert {
        filename: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl From<PersistenceError> for PipelineError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Connect(msg) => PipelineError::Connection(msg),
            other => PipelineError::Persistence(other.to_string()),
        }
    }
}

/// Destination for converted documents
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store one document. Not idempotent: the same filename twice yields two rows.
    async fn persist(&self, filename: &str, encoded_content: &str) -> Result<(), PersistenceError>;
}

const INSERT_DOCUMENT: &str = "INSERT INTO pdf_storage (filename, file_content) VALUES ($1, $2)";

const SELECT_BY_FILENAME: &str = r#"
    SELECT id, filename, file_content, status, created_at, updated_at
    FROM pdf_storage
    WHERE filename = $1
    ORDER BY id
"#;

/// Open a connection for one logical operation
pub(crate) async fn connect(options: &PgConnectOptions) -> Result<PgConnection, PersistenceError> {
    PgConnection::connect_with(options)
        .await
        .map_err(|e| PersistenceError::Connect(e.to_string()))
}

/// Close a scoped connection, logging instead of failing
pub(crate) async fn release(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        warn!(error = %e, "Failed to close database connection");
    }
}

/// `pdf_storage` in PostgreSQL, one connection per call
#[derive(Debug, Clone)]
pub struct PgArtifactStore {
    options: PgConnectOptions,
}

impl PgArtifactStore {
    pub fn new(options: PgConnectOptions) -> Self {
        Self { options }
    }

    /// All rows stored under `filename`, oldest first
    pub async fn records_for(&self, filename: &str) -> Result<Vec<PersistedRecord>, PersistenceError> {
        let mut conn = connect(&self.options).await?;

        let result = sqlx::query_as::<_, PersistedRecord>(SELECT_BY_FILENAME)
            .bind(filename)
            .fetch_all(&mut conn)
            .await
            .map_err(PersistenceError::from);

        release(conn).await;
        result
    }

    async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        filename: &str,
        encoded_content: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(INSERT_DOCUMENT)
            .bind(filename)
            .bind(encoded_content)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn persist_in(
        conn: &mut PgConnection,
        filename: &str,
        encoded_content: &str,
    ) -> Result<(), PersistenceError> {
        let mut tx = conn.begin().await?;

        match Self::insert(&mut tx, filename, encoded_content).await {
            Ok(()) => tx.commit().await.map_err(|source| PersistenceError::Insert {
                filename: filename.to_string(),
                source,
            }),
            Err(source) => {
                if let Err(e) = tx.rollback().await {
                    warn!(filename, error = %e, "Rollback failed");
                }
                Err(PersistenceError::Insert {
                    filename: filename.to_string(),
                    source,
                })
            },
        }
    }
}

#[async_trait]
impl ArtifactStore for PgArtifactStore {
    async fn persist(&self, filename: &str, encoded_content: &str) -> Result<(), PersistenceError> {
        let mut conn = connect(&self.options).await?;

        let result = Self::persist_in(&mut conn, filename, encoded_content).await;

        release(conn).await;

        if result.is_ok() {
            debug!(filename, bytes = encoded_content.len(), "Document stored");
        }
        result
    }
}
