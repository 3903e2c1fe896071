//! Top-k retrieval with lazy ingestion.
//!
//! Ensures the user's collection is populated (triggering data-folder
//! ingestion on first use), then runs a single similarity query. Any error
//! on this path is caught, logged, and converted to an empty result: a
//! retrieval failure is never fatal to the chat flow, which degrades to an
//! ungrounded answer.

use crate::config::Config;
use crate::index::IndexRegistry;
use crate::ingest;
use crate::models::Chunk;

/// Retrieve up to `k` chunks relevant to `question` from `user_id`'s
/// collection. Ordering is the index's own similarity ranking; no
/// re-ranking and no deduplication.
pub async fn retrieve(
    registry: &IndexRegistry,
    config: &Config,
    question: &str,
    user_id: &str,
    k: usize,
) -> Vec<Chunk> {
    match try_retrieve(registry, config, question, user_id, k).await {
        Ok(chunks) => chunks,
        Err(e) => {
            eprintln!("Warning: error retrieving documents for {}: {}", user_id, e);
            Vec::new()
        }
    }
}

async fn try_retrieve(
    registry: &IndexRegistry,
    config: &Config,
    question: &str,
    user_id: &str,
    k: usize,
) -> anyhow::Result<Vec<Chunk>> {
    let index = registry.get_or_create(user_id).await?;

    // Auto-load on first use, or when the collection is empty.
    if index.count().await? == 0 || !index.is_loaded().await {
        println!(
            "Collection empty for user {}, loading documents from data folder...",
            user_id
        );
        let success = ingest::ingest_data_folder(registry, config, user_id).await?;
        if !success {
            println!("No documents available after loading attempt");
            return Ok(Vec::new());
        }
    }

    if index.count().await? == 0 {
        println!("Collection still empty after loading attempt");
        return Ok(Vec::new());
    }

    let results = index.query(question, k).await?;
    println!("Found {} relevant document chunks", results.len());
    Ok(results)
}
