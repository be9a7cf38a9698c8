// LanceDB vector database module
// Stores chunk embeddings and answers similarity queries for the hybrid
// retriever. Rows are keyed on `source_path#chunk_index` so re-indexing a
// document upserts in place instead of appending duplicates.

#[cfg(test)]
mod tests;

use crate::database::sqlite::SearchFilters;
use crate::{KbError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TABLE_NAME: &str = "embeddings";

/// Embedding row stored in LanceDB
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    /// Stable row key: `source_path#chunk_index`
    pub id: String,
    pub vector: Vec<f32>,
    /// Join key back to the relational chunk row
    pub content_hash: String,
    pub source_path: String,
    pub chunk_index: u32,
    pub category: String,
    pub section_type: String,
}

/// A similarity hit: the chunk's content hash plus its cosine similarity
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub content_hash: String,
    pub similarity: f32,
}

/// Vector store backed by LanceDB
pub struct VectorStore {
    connection: Connection,
    dimension: usize,
}

impl VectorStore {
    /// Open (or create) the vector store at the given directory.
    #[inline]
    pub async fn new<P: AsRef<Path>>(db_path: P, dimension: usize) -> Result<Self> {
        let db_path = db_path.as_ref();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                KbError::Database(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let store = Self {
            connection,
            dimension,
        };
        store.initialize_table().await?;

        info!("Vector store initialized successfully");
        Ok(store)
    }

    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&TABLE_NAME.to_string()) {
            let existing = self.detect_existing_dimension().await?;
            if existing != self.dimension {
                // Dimension mismatch means the embedding model changed; the
                // old vectors are unusable with the new model.
                warn!(
                    "Vector dimension changed from {} to {}, recreating table",
                    existing, self.dimension
                );
                self.connection
                    .drop_table(TABLE_NAME)
                    .await
                    .map_err(|e| KbError::Database(format!("Failed to drop table: {}", e)))?;
            } else {
                debug!("Embeddings table exists with dimension {}", existing);
                return Ok(());
            }
        }

        info!(
            "Creating embeddings table with {} dimensions",
            self.dimension
        );
        self.connection
            .create_empty_table(TABLE_NAME, self.schema())
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to create table: {}", e)))?;

        Ok(())
    }

    async fn detect_existing_dimension(&self) -> Result<usize> {
        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to open existing table: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| KbError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(KbError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("content_hash", DataType::Utf8, false),
            Field::new("source_path", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("category", DataType::Utf8, false),
            Field::new("section_type", DataType::Utf8, false),
        ]))
    }

    /// Upsert a batch of embeddings, keyed on `id`.
    ///
    /// Re-submitting the same id updates the row in place, which keeps
    /// repeated index runs idempotent.
    #[inline]
    pub async fn upsert_batch(&self, records: &[EmbeddingRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(());
        }

        for record in records {
            if record.vector.len() != self.dimension {
                return Err(KbError::Database(format!(
                    "Embedding for {} has dimension {}, expected {}",
                    record.id,
                    record.vector.len(),
                    self.dimension
                )));
            }
        }

        debug!("Upserting batch of {} embeddings", records.len());

        let record_batch = self.create_record_batch(records)?;
        let schema = record_batch.schema();
        let reader = Box::new(RecordBatchIterator::new(
            std::iter::once(Ok(record_batch)),
            schema,
        ));

        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to open table: {}", e)))?;

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(reader)
            .await
            .map_err(|e| KbError::Database(format!("Failed to upsert embeddings: {}", e)))?;

        info!("Stored {} embeddings", records.len());
        Ok(())
    }

    fn create_record_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch> {
        let len = records.len();
        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);
        let mut content_hashes = Vec::with_capacity(len);
        let mut source_paths = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut categories = Vec::with_capacity(len);
        let mut section_types = Vec::with_capacity(len);

        for record in records {
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            content_hashes.push(record.content_hash.as_str());
            source_paths.push(record.source_path.as_str());
            chunk_indices.push(record.chunk_index);
            categories.push(record.category.as_str());
            section_types.push(record.section_type.as_str());
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| KbError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn arrow::array::Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(content_hashes)),
            Arc::new(StringArray::from(source_paths)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(categories)),
            Arc::new(StringArray::from(section_types)),
        ];

        RecordBatch::try_new(self.schema(), arrays)
            .map_err(|e| KbError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Cosine similarity search, dropping hits below `similarity_floor`.
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
        similarity_floor: f32,
        filters: &SearchFilters,
    ) -> Result<Vec<VectorHit>> {
        debug!("Searching for similar vectors with limit: {}", limit);

        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to open table: {}", e)))?;

        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| KbError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit);

        if let Some(category) = &filters.category {
            query = query.only_if(format!("category = '{}'", escape_literal(category)));
        }
        if let Some(section_type) = &filters.section_type {
            query = query.only_if(format!("section_type = '{}'", escape_literal(section_type)));
        }

        let mut stream = query
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| KbError::Database(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(parse_search_batch(&batch, similarity_floor)?);
        }

        debug!("Vector search returned {} hits above floor", hits.len());
        Ok(hits)
    }

    /// Delete every embedding for one document.
    #[inline]
    pub async fn delete_source(&self, source_path: &str) -> Result<()> {
        debug!("Deleting embeddings for source: {}", source_path);

        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to open table: {}", e)))?;

        let predicate = format!("source_path = '{}'", escape_literal(source_path));
        table
            .delete(&predicate)
            .await
            .map_err(|e| KbError::Database(format!("Failed to delete embeddings: {}", e)))?;

        Ok(())
    }

    /// Delete stale tail embeddings after a document shrank on re-index.
    #[inline]
    pub async fn delete_beyond(&self, source_path: &str, chunk_count: usize) -> Result<()> {
        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to open table: {}", e)))?;

        let predicate = format!(
            "source_path = '{}' AND chunk_index >= {}",
            escape_literal(source_path),
            chunk_count
        );
        table
            .delete(&predicate)
            .await
            .map_err(|e| KbError::Database(format!("Failed to trim stale embeddings: {}", e)))?;

        Ok(())
    }

    /// Total number of embeddings stored.
    #[inline]
    pub async fn count_rows(&self) -> Result<usize> {
        let table = self
            .connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to open table: {}", e)))?;

        table
            .count_rows(None)
            .await
            .map_err(|e| KbError::Database(format!("Failed to count rows: {}", e)))
    }
}

fn parse_search_batch(batch: &RecordBatch, similarity_floor: f32) -> Result<Vec<VectorHit>> {
    let content_hashes = batch
        .column_by_name("content_hash")
        .ok_or_else(|| KbError::Database("Missing content_hash column".to_string()))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| KbError::Database("Invalid content_hash column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut hits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        // Cosine distance is 0-2; similarity is its complement.
        let similarity = 1.0 - distance;
        if similarity < similarity_floor {
            continue;
        }

        hits.push(VectorHit {
            content_hash: content_hashes.value(row).to_string(),
            similarity,
        });
    }

    Ok(hits)
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
