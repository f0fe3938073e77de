#[cfg(test)]
mod tests;

use super::{ChunkMetadata, EmbeddingRecord};
use crate::config::Config;
use crate::embeddings::EmbeddingProvider;
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Number of rows returned by [`VectorStore::stats`]
pub const PEEK_LIMIT: usize = 10;

const TABLE_NAME: &str = "documents";

/// Vector database store using LanceDB for similarity search.
///
/// Clones share the connection and the lock: searches and stats run
/// concurrently, while writes and resets are exclusive.
#[derive(Clone)]
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    path: PathBuf,
    lock: Arc<RwLock<()>>,
}

/// A chunk returned by similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub content: String,
    pub source: String,
    pub chunk_index: u32,
    /// Cosine distance to the query, lower is closer
    pub distance: f32,
    /// `1 - distance`, higher is better
    pub score: f32,
}

/// A stored row as shown by [`VectorStore::stats`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    pub id: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub count: usize,
    pub sample: Vec<StoredChunk>,
}

impl VectorStore {
    /// Open the store under the configured base directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(config.vector_database_path()).await
    }

    /// Open (or create) a store at `db_path`; the table is created by the first write
    #[inline]
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            RagError::StoreUnavailable(format!(
                "Failed to create vector database directory {}: {}",
                db_path.display(),
                e
            ))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri).execute().await.map_err(|e| {
            error!("Failed to connect to LanceDB: {}", e);
            RagError::StoreUnavailable(format!("Failed to connect to LanceDB: {}", e))
        })?;

        info!("Vector store opened at {}", db_path.display());
        Ok(Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            path: db_path,
            lock: Arc::new(RwLock::new(())),
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append records in a single write, returning how many were stored.
    ///
    /// Every record gets a fresh UUID. Records whose dimension or embedding
    /// model differs from the rows already stored are rejected.
    #[inline]
    pub async fn add(&self, records: Vec<EmbeddingRecord>) -> Result<usize> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(0);
        }

        let vector_dim = records[0].vector.len();
        if vector_dim == 0 {
            return Err(RagError::Embedding("cannot store empty vectors".to_string()));
        }
        if let Some(other) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(RagError::EmbeddingMismatch(format!(
                "batch mixes {} and {} dimensional vectors",
                vector_dim,
                other.vector.len()
            )));
        }

        let _guard = self.lock.write().await;
        debug!("Storing batch of {} embeddings", records.len());

        let record_batch = create_record_batch(&records, vector_dim)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        match self.open_table().await? {
            Some(table) => {
                self.ensure_compatible(&table, vector_dim, &records).await?;
                table
                    .add(reader)
                    .execute()
                    .await
                    .map_err(|e| RagError::Database(format!("Failed to insert embeddings: {}", e)))?;
            }
            None => {
                // The first batch creates the table, so a failed write leaves nothing behind
                info!(
                    "Creating documents table with {} dimensional vectors",
                    vector_dim
                );
                self.connection
                    .create_table(&self.table_name, reader)
                    .execute()
                    .await
                    .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;
            }
        }

        info!("Successfully stored {} embeddings", records.len());
        Ok(records.len())
    }

    /// Nearest chunks to `query`, closest first, at most `k` of them.
    ///
    /// The query is embedded with `embedder` only when there is something to
    /// search; an absent or empty table yields no results.
    #[inline]
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let _guard = self.lock.read().await;

        let Some(table) = self.open_table().await? else {
            debug!("No documents table yet, nothing to search");
            return Ok(Vec::new());
        };
        if count_rows(&table).await? == 0 {
            return Ok(Vec::new());
        }

        let foreign_rows = count_foreign_rows(&table, embedder.model_id()).await?;
        if foreign_rows > 0 {
            return Err(RagError::EmbeddingMismatch(format!(
                "{} stored chunks were embedded with a model other than {}",
                foreign_rows,
                embedder.model_id()
            )));
        }

        let query_vector = embedder.embed_query(query).await?;
        let stored_dim = detect_vector_dimension(&table).await?;
        if query_vector.len() != stored_dim {
            return Err(RagError::EmbeddingMismatch(format!(
                "query embedding from {} has {} dimensions but the store holds {} dimensional vectors",
                embedder.model_id(),
                query_vector.len(),
                stored_dim
            )));
        }

        debug!("Searching for similar vectors with limit: {}", k);
        let results = table
            .vector_search(query_vector.as_slice())
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to execute search: {}", e)))?;

        let mut chunks = parse_search_results_stream(results).await?;
        chunks.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        chunks.truncate(k);

        debug!("Found {} similar chunks", chunks.len());
        Ok(chunks)
    }

    /// Row count plus up to [`PEEK_LIMIT`] stored rows
    #[inline]
    pub async fn stats(&self) -> Result<StoreStats> {
        let _guard = self.lock.read().await;

        let Some(table) = self.open_table().await? else {
            return Ok(StoreStats::default());
        };

        let count = count_rows(&table).await?;
        let mut stream = table
            .query()
            .limit(PEEK_LIMIT)
            .execute()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to read table: {}", e)))?;

        let mut sample = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to read result stream: {}", e)))?
        {
            sample.extend(parse_stored_batch(&batch)?);
        }
        sample.truncate(PEEK_LIMIT);

        Ok(StoreStats { count, sample })
    }

    /// Drop the documents table; every stored chunk is lost
    #[inline]
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.lock.write().await;

        let table_names = self.table_names().await?;
        if table_names.contains(&self.table_name) {
            info!("Dropping documents table");
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        } else {
            debug!("Documents table does not exist, nothing to reset");
        }

        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to list tables: {}", e)))
    }

    async fn open_table(&self) -> Result<Option<Table>> {
        if !self.table_names().await?.contains(&self.table_name) {
            return Ok(None);
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to open table: {}", e)))?;
        Ok(Some(table))
    }

    async fn ensure_compatible(
        &self,
        table: &Table,
        vector_dim: usize,
        records: &[EmbeddingRecord],
    ) -> Result<()> {
        let stored_dim = detect_vector_dimension(table).await?;
        if stored_dim != vector_dim {
            return Err(RagError::EmbeddingMismatch(format!(
                "store holds {} dimensional vectors, got {}",
                stored_dim, vector_dim
            )));
        }

        let mut models: Vec<&str> = records
            .iter()
            .map(|r| r.metadata.embedding_model.as_str())
            .collect();
        models.sort_unstable();
        models.dedup();

        for model in models {
            let foreign_rows = count_foreign_rows(table, model).await?;
            if foreign_rows > 0 {
                return Err(RagError::EmbeddingMismatch(format!(
                    "{} stored chunks were embedded with a model other than {}",
                    foreign_rows, model
                )));
            }
        }

        Ok(())
    }
}

/// Rows embedded with anything other than `model`
async fn count_foreign_rows(table: &Table, model: &str) -> Result<usize> {
    let filter = format!("embedding_model != '{}'", model.replace('\'', "''"));
    table
        .count_rows(Some(filter))
        .await
        .map_err(|e| RagError::StoreUnavailable(format!("Failed to count rows: {}", e)))
}

async fn count_rows(table: &Table) -> Result<usize> {
    table
        .count_rows(None)
        .await
        .map_err(|e| RagError::StoreUnavailable(format!("Failed to count rows: {}", e)))
}

/// Detect vector dimension from the table schema
async fn detect_vector_dimension(table: &Table) -> Result<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| RagError::StoreUnavailable(format!("Failed to get table schema: {}", e)))?;

    schema
        .fields()
        .iter()
        .find(|field| field.name() == "vector")
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        })
        .ok_or_else(|| {
            RagError::StoreUnavailable(
                "Could not find vector column or determine dimension".to_string(),
            )
        })
}

fn vector_item_field() -> Arc<Field> {
    Arc::new(Field::new("item", DataType::Float32, true))
}

fn list_size(vector_dim: usize) -> Result<i32> {
    i32::try_from(vector_dim)
        .map_err(|_| RagError::Embedding(format!("vector dimension {} is too large", vector_dim)))
}

fn create_schema(vector_dim: usize) -> Result<Arc<Schema>> {
    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(vector_item_field(), list_size(vector_dim)?),
            false,
        ),
        Field::new("source", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("embedding_model", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
    ])))
}

/// Create a RecordBatch from embedding records, assigning fresh ids
fn create_record_batch(records: &[EmbeddingRecord], vector_dim: usize) -> Result<RecordBatch> {
    let len = records.len();

    let ids: Vec<String> = (0..len).map(|_| uuid::Uuid::new_v4().to_string()).collect();
    let mut flat_values = Vec::with_capacity(len * vector_dim);
    let mut sources = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut models = Vec::with_capacity(len);
    let mut created_ats = Vec::with_capacity(len);

    for record in records {
        flat_values.extend_from_slice(&record.vector);
        sources.push(record.metadata.source.as_str());
        contents.push(record.metadata.content.as_str());
        chunk_indices.push(record.metadata.chunk_index);
        models.push(record.metadata.embedding_model.as_str());
        created_ats.push(record.metadata.created_at.as_str());
    }

    let vector_array = FixedSizeListArray::try_new(
        vector_item_field(),
        list_size(vector_dim)?,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(sources)),
        Arc::new(StringArray::from(contents)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(StringArray::from(models)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(create_schema(vector_dim)?, arrays)
        .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
}

async fn parse_search_results_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<RetrievedChunk>> {
    let mut chunks = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| RagError::StoreUnavailable(format!("Failed to read result stream: {}", e)))?
    {
        chunks.extend(parse_search_batch(&batch)?);
    }

    debug!("Parsed {} search results from stream", chunks.len());
    Ok(chunks)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::StoreUnavailable(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::StoreUnavailable(format!("Invalid {} column type", name)))
}

fn chunk_index_column(batch: &RecordBatch) -> Result<&UInt32Array> {
    batch
        .column_by_name("chunk_index")
        .ok_or_else(|| RagError::StoreUnavailable("Missing chunk_index column".to_string()))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::StoreUnavailable("Invalid chunk_index column type".to_string()))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<RetrievedChunk>> {
    let sources = string_column(batch, "source")?;
    let contents = string_column(batch, "content")?;
    let chunk_indices = chunk_index_column(batch)?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    Ok((0..batch.num_rows())
        .map(|row| {
            let distance = distances
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });
            RetrievedChunk {
                content: contents.value(row).to_string(),
                source: sources.value(row).to_string(),
                chunk_index: chunk_indices.value(row),
                distance,
                score: 1.0 - distance,
            }
        })
        .collect())
}

fn parse_stored_batch(batch: &RecordBatch) -> Result<Vec<StoredChunk>> {
    let ids = string_column(batch, "id")?;
    let sources = string_column(batch, "source")?;
    let contents = string_column(batch, "content")?;
    let chunk_indices = chunk_index_column(batch)?;
    let models = string_column(batch, "embedding_model")?;
    let created_ats = string_column(batch, "created_at")?;

    Ok((0..batch.num_rows())
        .map(|row| StoredChunk {
            id: ids.value(row).to_string(),
            metadata: ChunkMetadata {
                source: sources.value(row).to_string(),
                content: contents.value(row).to_string(),
                chunk_index: chunk_indices.value(row),
                embedding_model: models.value(row).to_string(),
                created_at: created_ats.value(row).to_string(),
            },
        })
        .collect())
}
