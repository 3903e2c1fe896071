//! Core data types used throughout docuchat.
//!
//! These types represent the document chunks, conversation turns, and
//! per-turn state that flow through the ingestion and chat pipeline.

use chrono::{DateTime, Utc};

/// Provenance metadata stamped on every chunk at ingestion time.
#[derive(Debug, Clone)]
pub struct ChunkMeta {
    /// The user whose collection owns this chunk.
    pub user_id: String,
    /// File the chunk was extracted from.
    pub file_name: String,
    /// Where the file came from. Currently always `"data_folder"`.
    pub source: String,
    /// When ingestion produced this chunk.
    pub loaded_at: DateTime<Utc>,
}

/// A bounded-length slice of a document's extracted text.
///
/// Immutable once created; owned by the user's vector collection after
/// insertion.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// SHA-256 of the text, for staleness detection.
    pub hash: String,
    pub meta: ChunkMeta,
}

/// One persisted message/response exchange.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub response: String,
    pub created_at: i64,
}

/// A record of a file a user has uploaded.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub uploaded_at: i64,
    pub processed: bool,
}

/// Ephemeral state for one chat invocation.
///
/// Filled progressively: the retrieval step populates `context` and
/// `documents`, the generation step fills `response`. Never shared across
/// invocations.
#[derive(Debug, Clone)]
pub struct TurnState {
    pub user_id: String,
    pub question: String,
    /// Retrieved chunk texts joined by `"\n\n"`, or empty when retrieval
    /// was skipped or found nothing.
    pub context: String,
    pub documents: Vec<Chunk>,
    pub response: String,
}

impl TurnState {
    pub fn new(user_id: &str, question: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            question: question.to_string(),
            context: String::new(),
            documents: Vec::new(),
            response: String::new(),
        }
    }
}
