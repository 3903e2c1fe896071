//! Chat-turn and uploaded-document persistence.
//!
//! Conversation turns are written once after a successful generation and
//! never mutated; the only delete is the bulk per-user one triggered by the
//! delete-chat endpoint.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{ConversationTurn, UploadedDocument};

/// Persist one message/response exchange for a user.
pub async fn save_turn(
    pool: &SqlitePool,
    user_id: &str,
    message: &str,
    response: &str,
) -> Result<ConversationTurn> {
    let turn = ConversationTurn {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        message: message.to_string(),
        response: response.to_string(),
        created_at: chrono::Utc::now().timestamp(),
    };

    sqlx::query(
        "INSERT INTO chats (id, user_id, message, response, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&turn.id)
    .bind(&turn.user_id)
    .bind(&turn.message)
    .bind(&turn.response)
    .bind(turn.created_at)
    .execute(pool)
    .await?;

    Ok(turn)
}

/// All of a user's turns, oldest first.
pub async fn list_turns(pool: &SqlitePool, user_id: &str) -> Result<Vec<ConversationTurn>> {
    let rows = sqlx::query(
        "SELECT id, user_id, message, response, created_at FROM chats WHERE user_id = ? ORDER BY created_at ASC, id ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ConversationTurn {
            id: row.get("id"),
            user_id: row.get("user_id"),
            message: row.get("message"),
            response: row.get("response"),
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Record a file uploaded by a user.
///
/// No server or CLI path writes these yet (documents arrive via the shared
/// data folder); the record type exists so [`delete_user_history`] clears
/// upload records together with the conversation turns.
pub async fn record_uploaded_document(
    pool: &SqlitePool,
    user_id: &str,
    file_name: &str,
) -> Result<UploadedDocument> {
    let doc = UploadedDocument {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        file_name: file_name.to_string(),
        uploaded_at: chrono::Utc::now().timestamp(),
        processed: false,
    };

    sqlx::query(
        "INSERT INTO uploaded_documents (id, user_id, file_name, uploaded_at, processed) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&doc.id)
    .bind(&doc.user_id)
    .bind(&doc.file_name)
    .bind(doc.uploaded_at)
    .bind(doc.processed)
    .execute(pool)
    .await?;

    Ok(doc)
}

/// Delete all conversation turns and uploaded-document records for one
/// user. Other users' rows are untouched.
pub async fn delete_user_history(pool: &SqlitePool, user_id: &str) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chats WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM uploaded_documents WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
