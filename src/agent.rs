//! One-turn chat orchestration.
//!
//! A single invocation is a straight-line flow with one branch: retrieve
//! (which internally decides whether the user has anything to retrieve,
//! triggering lazy ingestion) and then generate. Both the
//! context-populated and empty-context paths converge on the same single
//! generation step; nothing ever re-enters retrieval within a turn.

use anyhow::Result;

use crate::compose;
use crate::config::Config;
use crate::index::IndexRegistry;
use crate::llm::{ChatMessage, ChatModel};
use crate::models::TurnState;
use crate::retrieve;

/// Separator between retrieved chunk texts in the prompt context.
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Run one complete chat turn: retrieval decision, optional context
/// injection, one generation.
///
/// Retrieval failures degrade to an empty context; generation failures
/// propagate as errors.
pub async fn run_turn(
    registry: &IndexRegistry,
    config: &Config,
    model: &dyn ChatModel,
    user_id: &str,
    question: &str,
) -> Result<TurnState> {
    let mut state = TurnState::new(user_id, question);

    let documents = retrieve::retrieve(
        registry,
        config,
        question,
        user_id,
        config.retrieval.top_k,
    )
    .await;

    state.context = documents
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);
    state.documents = documents;

    let messages = vec![ChatMessage::user(question)];
    state.response = compose::compose(model, &messages, &state.context).await?;

    Ok(state)
}
