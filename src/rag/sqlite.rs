//! SQLite-backed vector index.
//!
//! In-process store using SQLite for vectors and metadata and brute-force
//! cosine similarity for search. The corpus is small (hundreds of examples
//! times a handful of phrasings), so a full scan per query is fine.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use super::store::{IndexRecord, SearchHit, VectorIndex};
use crate::core::errors::{PipelineError, PipelineResult};
use crate::vector_math::rank_descending_by_cosine;

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteVectorIndex {
    pub async fn open(db_path: impl AsRef<Path>) -> PipelineResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(PipelineError::storage)?;

        let index = Self { pool, db_path };
        index.init_schema().await?;
        tracing::info!("Vector index opened at {}", index.db_path.display());
        Ok(index)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> PipelineResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(PipelineError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vectors (
                collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
                id TEXT NOT NULL,
                embedding BLOB NOT NULL,
                fields TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (collection, id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(PipelineError::storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_collection ON vectors(collection)")
            .execute(&self.pool)
            .await
            .map_err(PipelineError::storage)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    async fn insert_rows(
        tx: &mut Transaction<'_, Sqlite>,
        name: &str,
        records: &[IndexRecord],
    ) -> PipelineResult<()> {
        for record in records {
            let blob = Self::serialize_embedding(&record.vector);
            let fields = serde_json::to_string(&record.fields).map_err(PipelineError::storage)?;

            sqlx::query(
                "INSERT INTO vectors (collection, id, embedding, fields) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(name)
            .bind(&record.id)
            .bind(&blob)
            .bind(&fields)
            .execute(&mut **tx)
            .await
            .map_err(PipelineError::storage)?;
        }
        Ok(())
    }

    async fn require_dimension(&self, name: &str) -> PipelineResult<usize> {
        self.collection_dimension(name).await?.ok_or_else(|| {
            PipelineError::Storage(format!("collection '{}' does not exist", name))
        })
    }
}

fn check_record_dimensions(
    name: &str,
    dimension: usize,
    records: &[IndexRecord],
) -> PipelineResult<()> {
    match records.iter().find(|r| r.vector.len() != dimension) {
        Some(bad) => Err(PipelineError::dimension_mismatch(
            &format!("insert into '{}'", name),
            dimension,
            bad.vector.len(),
        )),
        None => Ok(()),
    }
}

fn project_fields(raw: &str, wanted: &[&str]) -> Map<String, Value> {
    let stored: Map<String, Value> = serde_json::from_str(raw).unwrap_or_default();
    if wanted.is_empty() {
        return stored;
    }
    wanted
        .iter()
        .filter_map(|name| stored.get(*name).map(|v| (name.to_string(), v.clone())))
        .collect()
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn has_collection(&self, name: &str) -> PipelineResult<bool> {
        Ok(self.collection_dimension(name).await?.is_some())
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> PipelineResult<()> {
        if dimension == 0 {
            return Err(PipelineError::Configuration(
                "collection dimension must be positive".to_string(),
            ));
        }
        if self.has_collection(name).await? {
            return Err(PipelineError::Storage(format!(
                "collection '{}' already exists",
                name
            )));
        }

        sqlx::query("INSERT INTO collections (name, dimension, created_at) VALUES (?1, ?2, ?3)")
            .bind(name)
            .bind(dimension as i64)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(PipelineError::storage)?;

        tracing::info!("Created collection '{}' (dimension {})", name, dimension);
        Ok(())
    }

    async fn collection_dimension(&self, name: &str) -> PipelineResult<Option<usize>> {
        let dimension: Option<i64> =
            sqlx::query_scalar("SELECT dimension FROM collections WHERE name = ?1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(PipelineError::storage)?;
        Ok(dimension.map(|d| d as usize))
    }

    async fn insert(&self, name: &str, records: Vec<IndexRecord>) -> PipelineResult<()> {
        let dimension = self.require_dimension(name).await?;
        check_record_dimensions(name, dimension, &records)?;
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(PipelineError::storage)?;
        Self::insert_rows(&mut tx, name, &records).await?;
        tx.commit().await.map_err(PipelineError::storage)?;

        tracing::debug!("Inserted {} rows into '{}'", records.len(), name);
        Ok(())
    }

    async fn create_with_records(
        &self,
        name: &str,
        dimension: usize,
        records: Vec<IndexRecord>,
    ) -> PipelineResult<()> {
        if dimension == 0 {
            return Err(PipelineError::Configuration(
                "collection dimension must be positive".to_string(),
            ));
        }
        check_record_dimensions(name, dimension, &records)?;

        // dropped without commit on any error, which rolls the collection back
        let mut tx = self.pool.begin().await.map_err(PipelineError::storage)?;
        sqlx::query("INSERT INTO collections (name, dimension, created_at) VALUES (?1, ?2, ?3)")
            .bind(name)
            .bind(dimension as i64)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                PipelineError::Storage(format!("cannot create collection '{}': {}", name, e))
            })?;
        Self::insert_rows(&mut tx, name, &records).await?;
        tx.commit().await.map_err(PipelineError::storage)?;

        tracing::info!(
            "Created collection '{}' (dimension {}) with {} rows",
            name,
            dimension,
            records.len()
        );
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
        fields: &[&str],
    ) -> PipelineResult<Vec<SearchHit>> {
        let dimension = self.require_dimension(name).await?;
        if query.len() != dimension {
            return Err(PipelineError::dimension_mismatch(
                &format!("query against '{}'", name),
                dimension,
                query.len(),
            ));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, embedding, fields FROM vectors WHERE collection = ?1 ORDER BY rowid",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(PipelineError::storage)?;

        let embeddings: Vec<Vec<f32>> = rows
            .iter()
            .map(|row| {
                let bytes: Vec<u8> = row.get("embedding");
                Self::deserialize_embedding(&bytes)
            })
            .collect();

        let hits = rank_descending_by_cosine(query, &embeddings)
            .into_iter()
            .take(k)
            .map(|(idx, score)| {
                let row = &rows[idx];
                let raw_fields: String = row.get("fields");
                SearchHit {
                    id: row.get("id"),
                    score,
                    fields: project_fields(&raw_fields, fields),
                }
            })
            .collect();

        Ok(hits)
    }

    async fn count(&self, name: &str) -> PipelineResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE collection = ?1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(PipelineError::storage)?;
        Ok(count as usize)
    }

    async fn drop_collection(&self, name: &str) -> PipelineResult<bool> {
        let mut tx = self.pool.begin().await.map_err(PipelineError::storage)?;
        sqlx::query("DELETE FROM vectors WHERE collection = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(PipelineError::storage)?;
        let result = sqlx::query("DELETE FROM collections WHERE name = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(PipelineError::storage)?;
        tx.commit().await.map_err(PipelineError::storage)?;

        let dropped = result.rows_affected() > 0;
        if dropped {
            tracing::info!("Dropped collection '{}'", name);
        }
        Ok(dropped)
    }
}
