//! Database bootstrap and static DDL for the document store

use sqlx::postgres::PgConnectOptions;
use tracing::info;

use super::{connect, release, PersistenceError};

/// Statements applied in order; each is idempotent.
pub const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS pdf_storage (
        id SERIAL PRIMARY KEY,
        filename VARCHAR(255) NOT NULL,
        file_content TEXT NOT NULL,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        status VARCHAR(50) DEFAULT 'active'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_pdf_filename ON pdf_storage(filename)",
    "CREATE INDEX IF NOT EXISTS idx_pdf_status ON pdf_storage(status)",
];

/// Database every server has, used to create the configured one
pub const MAINTENANCE_DATABASE: &str = "postgres";

const DATABASE_EXISTS: &str = "SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1";

/// Quote a name for use as an SQL identifier
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Create database `name` if the server does not have it yet.
///
/// Connects to the maintenance database with the same credentials. Returns
/// whether the database was created.
pub async fn ensure_database(options: &PgConnectOptions, name: &str) -> Result<bool, PersistenceError> {
    let maintenance = options.clone().database(MAINTENANCE_DATABASE);
    let mut conn = connect(&maintenance).await?;

    let result = create_if_missing(&mut conn, name).await;

    release(conn).await;

    match result {
        Ok(true) => info!(database = name, "Database created"),
        Ok(false) => info!(database = name, "Database already exists"),
        Err(_) => {},
    }
    result
}

async fn create_if_missing(conn: &mut sqlx::PgConnection, name: &str) -> Result<bool, PersistenceError> {
    let exists = sqlx::query(DATABASE_EXISTS)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        .is_some();

    if exists {
        return Ok(false);
    }

    // CREATE DATABASE cannot take bind parameters or run in a transaction
    sqlx::raw_sql(&format!("CREATE DATABASE {}", quote_identifier(name)))
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

/// Create the document table and its indexes if missing
pub async fn apply(options: &PgConnectOptions) -> Result<(), PersistenceError> {
    let mut conn = connect(options).await?;

    let mut result = Ok(());
    for statement in STATEMENTS {
        if let Err(e) = sqlx::query(*statement).execute(&mut conn).await {
            result = Err(PersistenceError::from(e));
            break;
        }
    }

    release(conn).await;

    if result.is_ok() {
        info!(statements = STATEMENTS.len(), "Schema applied");
    }
    result
}
