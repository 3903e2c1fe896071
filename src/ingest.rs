//! Data-folder ingestion.
//!
//! Loads every supported file (`.pdf`, `.docx`, `.txt`) from the shared
//! per-deployment data folder, chunks the extracted text, stamps provenance
//! metadata, and inserts the batch into the requesting user's collection.
//!
//! The folder is shared across all users: each user ingests the same files
//! into their own collection on first use, tagged with their user id. A
//! per-file failure is logged and skipped; it never aborts the batch.

use anyhow::Result;
use chrono::Utc;
use walkdir::WalkDir;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::extract;
use crate::index::IndexRegistry;
use crate::models::Chunk;

/// Ingest the data folder into `user_id`'s collection.
///
/// Returns `true` when the user's collection has ingested content (either
/// from this call or an earlier one in this process), `false` when the
/// folder yielded nothing. The already-loaded short-circuit is process-local
/// and checked under the collection's ingestion lock, so two concurrent
/// first requests cannot both insert.
pub async fn ingest_data_folder(
    registry: &IndexRegistry,
    config: &Config,
    user_id: &str,
) -> Result<bool> {
    let index = registry.get_or_create(user_id).await?;
    let mut loaded = index.lock_loaded().await;

    if *loaded {
        println!("Documents already loaded for user {}", user_id);
        return Ok(true);
    }

    let folder = &config.data.folder;
    if !folder.exists() {
        eprintln!(
            "Warning: data folder '{}' does not exist. Creating empty folder.",
            folder.display()
        );
        std::fs::create_dir_all(folder)?;
        *loaded = false;
        return Ok(false);
    }

    let loaded_at = Utc::now();
    let mut all_chunks: Vec<Chunk> = Vec::new();
    let mut supported_files = 0usize;

    // The data folder is a flat listing; subdirectories are not scanned.
    let mut entries: Vec<_> = WalkDir::new(folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect();
    entries.sort_by_key(|e| e.file_name().to_os_string());

    for entry in entries {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().to_string();
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if !extract::is_supported_extension(&ext) {
            println!("Skipping unsupported file type: {}", file_name);
            continue;
        }
        supported_files += 1;

        let chunks = match load_file(path, &file_name, &ext, user_id, loaded_at, config) {
            Ok(chunks) => chunks,
            Err(e) => {
                eprintln!("Warning: error processing {}: {}", file_name, e);
                continue;
            }
        };

        println!("Processed {}: {} chunks", file_name, chunks.len());
        all_chunks.extend(chunks);
    }

    if all_chunks.is_empty() {
        println!("No supported documents found in data folder");
        *loaded = false;
        return Ok(false);
    }

    let total = all_chunks.len();
    index.add(&all_chunks).await?;
    *loaded = true;
    println!(
        "Loaded {} document chunks from {} files for user {}",
        total, supported_files, user_id
    );

    Ok(true)
}

fn load_file(
    path: &std::path::Path,
    file_name: &str,
    ext: &str,
    user_id: &str,
    loaded_at: chrono::DateTime<Utc>,
    config: &Config,
) -> Result<Vec<Chunk>> {
    let bytes = std::fs::read(path)?;
    let text = extract::extract_text(&bytes, ext)?;
    Ok(chunk_document(
        &text,
        user_id,
        file_name,
        loaded_at,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    ))
}
