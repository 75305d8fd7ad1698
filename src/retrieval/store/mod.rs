
use crate::{ConciergeError, Result};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_VECTOR_DIMENSION: usize = 768;

/// Passage index backed by LanceDB. Stores embedded passages and answers
/// vector similarity queries over them.
pub struct PassageStore {
    connection: Connection,
    table_name: String,
    vector_dimension: Option<usize>,
}

/// One passage to index, with its embedding vector.
#[derive(Debug, Clone)]
pub struct PassageRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub source: String,
}

/// One hit from a similarity search.
#[derive(Debug, Clone)]
pub struct StoreSearchResult {
    pub content: String,
    pub source: String,
    pub distance: f32,
}

impl PassageStore {
    /// Open (or create) the passage store at the given directory.
    #[inline]
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConciergeError::Database(format!("Failed to create vector database directory: {e}"))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| ConciergeError::Database(format!("Failed to connect to LanceDB: {e}")))?;

        let mut store = Self {
            connection,
            table_name: "passages".to_string(),
            vector_dimension: None,
        };

        store.initialize_table().await?;

        info!("Passage store initialized successfully");
        Ok(store)
    }

    async fn initialize_table(&mut self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| ConciergeError::Database(format!("Failed to list tables: {e}")))?;

        if table_names.contains(&self.table_name) {
            match self.detect_existing_vector_dimension().await {
                Ok(dim) => {
                    debug!("Detected existing vector dimension: {}", dim);
                    self.vector_dimension = Some(dim);
                }
                Err(e) => {
                    debug!("Could not detect vector dimension from existing table: {e}");
                    self.vector_dimension = Some(DEFAULT_VECTOR_DIMENSION);
                }
            }
            return Ok(());
        }

        // The placeholder dimension is replaced when the first batch of
        // records reveals the real one.
        let schema = Self::create_schema(DEFAULT_VECTOR_DIMENSION);
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| ConciergeError::Database(format!("Failed to create table: {e}")))?;

        self.vector_dimension = Some(DEFAULT_VECTOR_DIMENSION);
        info!(
            "Passages table created with {} dimensions",
            DEFAULT_VECTOR_DIMENSION
        );
        Ok(())
    }

    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| ConciergeError::Database(format!("Failed to open existing table: {e}")))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| ConciergeError::Database(format!("Failed to get table schema: {e}")))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(ConciergeError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Store a batch of embedded passages.
    #[inline]
    pub async fn add_passages(&mut self, records: Vec<PassageRecord>) -> Result<()> {
        if records.is_empty() {
            debug!("No passages to store");
            return Ok(());
        }

        debug!("Storing batch of {} passages", records.len());

        // Recreate the table if the embedding model's dimension differs from
        // the placeholder or a previous model's.
        let vector_dim = records[0].vector.len();
        if self.vector_dimension != Some(vector_dim) {
            info!(
                "Vector dimension changed from {:?} to {}, recreating table",
                self.vector_dimension, vector_dim
            );
            self.recreate_table_with_dimension(vector_dim).await?;
            self.vector_dimension = Some(vector_dim);
        }

        let record_batch = self.create_record_batch(&records)?;

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| ConciergeError::Database(format!("Failed to open table: {e}")))?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| ConciergeError::Database(format!("Failed to insert passages: {e}")))?;

        info!("Successfully stored {} passages", records.len());
        Ok(())
    }

    async fn recreate_table_with_dimension(&self, vector_dim: usize) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| ConciergeError::Database(format!("Failed to list tables: {e}")))?;

        if table_names.contains(&self.table_name) {
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| ConciergeError::Database(format!("Failed to drop table: {e}")))?;
        }

        let schema = Self::create_schema(vector_dim);
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| {
                ConciergeError::Database(format!("Failed to create table with new dimensions: {e}"))
            })?;

        info!("Table recreated with {} dimensions", vector_dim);
        Ok(())
    }

    fn create_record_batch(&self, records: &[PassageRecord]) -> Result<RecordBatch> {
        let len = records.len();
        let vector_dim = self
            .vector_dimension
            .ok_or_else(|| ConciergeError::Database("Vector dimension not set".to_string()))?;

        let mut ids = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);

        let now = chrono::Utc::now().to_rfc3339();
        for record in records {
            if record.vector.len() != vector_dim {
                return Err(ConciergeError::Database(format!(
                    "Inconsistent vector dimension: expected {}, got {}",
                    vector_dim,
                    record.vector.len()
                )));
            }
            ids.push(record.id.as_str());
            contents.push(record.content.as_str());
            sources.push(record.source.as_str());
            created_ats.push(now.clone());
            flat_values.extend_from_slice(&record.vector);
        }

        let schema = Self::create_schema(vector_dim);

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    ConciergeError::Database(format!("Failed to create vector array: {e}"))
                })?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(schema, arrays)
            .map_err(|e| ConciergeError::Database(format!("Failed to create record batch: {e}")))
    }

    /// Search for the passages most similar to the query vector.
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<StoreSearchResult>> {
        debug!("Searching for similar passages with limit: {}", limit);

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| ConciergeError::Database(format!("Failed to open table: {e}")))?;

        let results = table
            .vector_search(query_vector)
            .map_err(|e| ConciergeError::Database(format!("Failed to create vector search: {e}")))?
            .column("vector")
            .limit(limit)
            .execute()
            .await
            .map_err(|e| ConciergeError::Database(format!("Failed to execute search: {e}")))?;

        self.parse_search_results_stream(results).await
    }

    async fn parse_search_results_stream(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<StoreSearchResult>> {
        let mut search_results = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| ConciergeError::Database(format!("Failed to read result stream: {e}")))?
        {
            search_results.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<StoreSearchResult>> {
        let contents = string_column(batch, "content")?;
        let sources = string_column(batch, "source")?;

        let distances = batch
            .column_by_name("_distance")
            .map(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut search_results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let distance = distances
                .flatten()
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            search_results.push(StoreSearchResult {
                content: contents.value(row).to_string(),
                source: sources.value(row).to_string(),
                distance,
            });
        }

        Ok(search_results)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ConciergeError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| ConciergeError::Database(format!("Invalid {name} column type")))
}
