//! docuchat: a per-user retrieval-augmented chat service.
//!
//! Documents dropped into a user's data folder are extracted, chunked,
//! embedded, and stored in a per-user SQLite vector collection. Chat
//! requests retrieve the closest chunks, inject them into a grounding
//! prompt, and call a chat-completion model; turns are persisted to an
//! application database alongside accounts and sessions.

pub mod agent;
pub mod auth;
pub mod chunk;
pub mod compose;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod history;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod server;
