//! Fixed-size overlapping text chunker.
//!
//! Splits extracted document text into chunks of at most `chunk_size`
//! characters, with `chunk_overlap` characters repeated between consecutive
//! chunks so that sentences straddling a boundary stay retrievable. Both
//! parameters are configuration constants, not per-call knobs.
//!
//! Each chunk receives a random UUID plus a SHA-256 hash of its text for
//! staleness detection.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, ChunkMeta};

/// Split text into overlapping pieces of at most `chunk_size` characters.
///
/// Boundaries prefer the last whitespace inside the window so words are not
/// cut mid-way; a single unbroken run longer than `chunk_size` is hard-split.
/// `overlap` must be strictly smaller than `chunk_size` (validated at config
/// load).
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= chunk_size {
        return vec![trimmed.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let hard_end = (start + chunk_size).min(chars.len());

        // Prefer a whitespace boundary, but never one that would erase
        // forward progress.
        let end = if hard_end < chars.len() {
            match chars[start..hard_end]
                .iter()
                .rposition(|c| c.is_whitespace())
            {
                Some(pos) if start + pos > start + overlap => start + pos + 1,
                _ => hard_end,
            }
        } else {
            hard_end
        };

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim().to_string();
        if !piece.is_empty() {
            pieces.push(piece);
        }

        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    pieces
}

/// Chunk one file's extracted text and stamp every chunk with provenance.
pub fn chunk_document(
    text: &str,
    user_id: &str,
    file_name: &str,
    loaded_at: DateTime<Utc>,
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    split_text(text, chunk_size, overlap)
        .into_iter()
        .map(|piece| {
            let mut hasher = Sha256::new();
            hasher.update(piece.as_bytes());
            let hash = format!("{:x}", hasher.finalize());

            Chunk {
                id: Uuid::new_v4().to_string(),
                text: piece,
                hash,
                meta: ChunkMeta {
                    user_id: user_id.to_string(),
                    file_name: file_name.to_string(),
                    source: "data_folder".to_string(),
                    loaded_at,
                },
            }
        })
        .collect()
}
