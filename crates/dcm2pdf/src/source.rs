//! Batch candidate enumeration

use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use tracing::{info, warn};

use crate::persist::{connect, release, PersistenceError};
use crate::types::BatchItem;

/// Supplies the items of one batch, in processing order
#[async_trait]
pub trait BatchSource: Send + Sync {
    async fn candidates(&self, limit: usize) -> Result<Vec<BatchItem>, PersistenceError>;
}

/// A fixed manifest of items
#[async_trait]
impl BatchSource for Vec<BatchItem> {
    async fn candidates(&self, limit: usize) -> Result<Vec<BatchItem>, PersistenceError> {
        Ok(self.iter().take(limit).cloned().collect())
    }
}

const SELECT_STUDIES: &str = r#"
    SELECT filepath, accession_no
    FROM public.study
    WHERE filepath IS NOT NULL
    LIMIT $1
"#;

/// Studies from the archive's `public.study` table
#[derive(Debug, Clone)]
pub struct PgStudySource {
    options: PgConnectOptions,
}

impl PgStudySource {
    pub fn new(options: PgConnectOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BatchSource for PgStudySource {
    async fn candidates(&self, limit: usize) -> Result<Vec<BatchItem>, PersistenceError> {
        let mut conn = connect(&self.options).await?;

        let rows = sqlx::query_as::<_, (String, Option<String>)>(SELECT_STUDIES)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&mut conn)
            .await;

        release(conn).await;

        let items: Vec<BatchItem> = rows?
            .into_iter()
            .filter_map(|(filepath, accession_no)| match accession_no {
                Some(accession_no) if !accession_no.trim().is_empty() => {
                    Some(BatchItem::new(filepath, accession_no.trim()))
                },
                _ => {
                    warn!(filepath = %filepath, "Study has no accession number, skipping");
                    None
                },
            })
            .collect();

        info!(count = items.len(), limit, "Batch candidates loaded");
        Ok(items)
    }
}
