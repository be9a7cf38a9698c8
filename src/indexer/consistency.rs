// Cross-store consistency validation
// After a run commits, the relational chunk rows and the embedding rows
// should agree one-to-one.

use anyhow::Result;
use tracing::{debug, info};

use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;

/// Row counts from both stores after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub chunk_rows: usize,
    pub embedding_rows: usize,
}

impl ConsistencyReport {
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.chunk_rows == self.embedding_rows
    }
}

/// Compare chunk row and embedding row counts across the two stores.
#[inline]
pub async fn validate_consistency(
    database: &Database,
    vector_store: &VectorStore,
) -> Result<ConsistencyReport> {
    debug!("Validating cross-store consistency");

    let chunk_rows = database.count_chunks().await? as usize;
    let embedding_rows = vector_store.count_rows().await?;

    let report = ConsistencyReport {
        chunk_rows,
        embedding_rows,
    };

    if report.is_consistent() {
        info!("Stores are consistent with {} rows each", chunk_rows);
    }

    Ok(report)
}
