//! Per-user vector collections and the process-wide index registry.
//!
//! Every user gets an isolated, disk-persisted collection named
//! `user_<user_id>`, backed by its own SQLite file at
//! `<index.dir>/<user_id>/vectors.sqlite`. Collections are created on first
//! reference and their handles cached for the lifetime of the process; the
//! only eviction is the explicit one performed when a user deletes their
//! history, and that removes the in-memory handle only, not on-disk data.
//!
//! The registry replaces the bare per-user maps of a single-worker design
//! with a mutex-guarded map, and each collection carries a per-user async
//! lock around its "documents loaded" flag so that first ingestion is
//! check-and-mark atomic under concurrent requests. The flag itself is
//! process-local with no persistence guarantee: after a restart it resets
//! and ingestion re-runs its (idempotent) checks.
//!
//! Similarity search is brute-force cosine over the stored vectors; ranking
//! and the embedding itself are delegated to the embedding provider.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, Embedder};
use crate::models::{Chunk, ChunkMeta};

/// Summary of what a user's collection currently holds.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub total_chunks: i64,
    pub loaded_files: Vec<String>,
}

/// Process-wide map from user id to collection handle.
pub struct IndexRegistry {
    index_dir: PathBuf,
    batch_size: usize,
    embedder: Arc<dyn Embedder>,
    inner: Mutex<HashMap<String, Arc<UserIndex>>>,
}

impl IndexRegistry {
    pub fn new(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn Embedder> =
            Arc::from(embedding::create_embedder(&config.embedding)?);
        Ok(Self {
            index_dir: config.index.dir.clone(),
            batch_size: config.embedding.batch_size,
            embedder,
            inner: Mutex::new(HashMap::new()),
        })
    }

    /// Get the user's collection handle, creating and migrating the backing
    /// store on first reference.
    pub async fn get_or_create(&self, user_id: &str) -> Result<Arc<UserIndex>> {
        let mut map = self.inner.lock().await;
        if let Some(index) = map.get(user_id) {
            return Ok(index.clone());
        }

        let path = self.index_dir.join(user_id).join("vectors.sqlite");
        let pool = db::open_pool(&path).await?;
        migrate_collection(&pool).await?;

        let index = Arc::new(UserIndex {
            user_id: user_id.to_string(),
            collection: format!("user_{}", user_id),
            pool,
            batch_size: self.batch_size,
            embedder: self.embedder.clone(),
            loaded: Mutex::new(false),
        });
        map.insert(user_id.to_string(), index.clone());
        Ok(index)
    }

    /// Drop the cached handle for a user, if any. Best-effort: on-disk data
    /// stays in place and the collection is recreated on next access.
    pub async fn evict(&self, user_id: &str) {
        let mut map = self.inner.lock().await;
        if let Some(index) = map.remove(user_id) {
            index.pool.close().await;
        }
    }
}

/// One user's isolated vector collection.
pub struct UserIndex {
    user_id: String,
    collection: String,
    pool: SqlitePool,
    batch_size: usize,
    embedder: Arc<dyn Embedder>,
    /// Process-local "documents loaded" flag. Holding the guard across
    /// ingestion makes first-ingestion-per-user atomic.
    loaded: Mutex<bool>,
}

impl UserIndex {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Lock the loaded flag. Ingestion holds this guard from the
    /// already-loaded check through the final mark.
    pub async fn lock_loaded(&self) -> MutexGuard<'_, bool> {
        self.loaded.lock().await
    }

    pub async fn is_loaded(&self) -> bool {
        *self.loaded.lock().await
    }

    /// Number of chunks currently stored in this collection.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Embed and insert a batch of chunks in one transaction per batch.
    pub async fn add(&self, chunks: &[Chunk]) -> Result<()> {
        let model = self.embedder.model_name().to_string();
        let dims = self.embedder.dims() as i64;

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;

            let mut tx = self.pool.begin().await?;
            for (chunk, vec) in batch.iter().zip(vectors.iter()) {
                sqlx::query(
                    r#"
                    INSERT INTO chunks (id, collection, user_id, file_name, source, loaded_at, text, hash)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&chunk.id)
                .bind(&self.collection)
                .bind(&chunk.meta.user_id)
                .bind(&chunk.meta.file_name)
                .bind(&chunk.meta.source)
                .bind(chunk.meta.loaded_at.to_rfc3339())
                .bind(&chunk.text)
                .bind(&chunk.hash)
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    "INSERT INTO chunk_vectors (chunk_id, model, dims, embedding) VALUES (?, ?, ?, ?)",
                )
                .bind(&chunk.id)
                .bind(&model)
                .bind(dims)
                .bind(embedding::vec_to_blob(vec))
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }

        Ok(())
    }

    /// Top-k similarity query: embed the question, rank stored vectors by
    /// cosine similarity (descending), truncate to `k`. May return fewer
    /// than `k` results, or none.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<Chunk>> {
        let query_vec = self.embedder.embed_query(text).await?;

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.user_id, c.file_name, c.source, c.loaded_at, c.text, c.hash,
                   cv.embedding
            FROM chunks c
            JOIN chunk_vectors cv ON cv.chunk_id = c.id
            WHERE c.collection = ?
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, Chunk)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = embedding::blob_to_vec(&blob);
                let similarity = embedding::cosine_similarity(&query_vec, &vec);
                (similarity, row_to_chunk(row))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, chunk)| chunk).collect())
    }

    /// Chunk count plus the distinct file names currently stored.
    pub async fn info(&self) -> Result<IndexInfo> {
        let total_chunks = self.count().await?;
        let loaded_files: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT file_name FROM chunks WHERE collection = ? ORDER BY file_name",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(IndexInfo {
            total_chunks,
            loaded_files,
        })
    }
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let loaded_at: String = row.get("loaded_at");
    let loaded_at = DateTime::parse_from_rfc3339(&loaded_at)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Chunk {
        id: row.get("id"),
        text: row.get("text"),
        hash: row.get("hash"),
        meta: ChunkMeta {
            user_id: row.get("user_id"),
            file_name: row.get("file_name"),
            source: row.get("source"),
            loaded_at,
        },
    }
}

async fn migrate_collection(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            user_id TEXT NOT NULL,
            file_name TEXT NOT NULL,
            source TEXT NOT NULL,
            loaded_at TEXT NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection)")
        .execute(pool)
        .await?;

    Ok(())
}
