//! Prompt construction and model invocation.
//!
//! Decides whether retrieved context is injected, which system template to
//! use, and sends exactly one completion call. Two fixed templates exist:
//! a document-analysis template for explicit summary requests, and a generic
//! grounded template that instructs the model to answer naturally without
//! revealing that retrieval occurred. When no context is available the
//! system prompt is bypassed entirely and the raw conversation is sent.

use anyhow::Result;

use crate::llm::{ChatMessage, ChatModel};

/// Both substrings must appear (case-insensitively) in the latest user
/// message for it to count as a document-summary request.
const SUMMARY_INTENT_A: &str = "please analyze the uploaded documents";
const SUMMARY_INTENT_B: &str = "provide a summary or key insights";

const DOCUMENT_ANALYSIS_TEMPLATE: &str = "You are a helpful assistant analyzing documents for the user.

The user has uploaded documents and wants you to analyze them.

Relevant document context:
{context}

Please provide a comprehensive analysis of the uploaded documents. Focus on the content naturally without mentioning that you're accessing documents.";

const GROUNDED_ANSWER_TEMPLATE: &str = "You are a helpful AI assistant. You have to answer the user's questions naturally. Don't mention that you're accessing documents or have special capabilities - just provide helpful answers based on the available information. If information not available, answer it by your knowledge.

Available information:
{context}

Answer naturally as if you're having a normal conversation.";

/// True when the message asks for a summary of the uploaded documents.
pub fn is_document_summary_request(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains(SUMMARY_INTENT_A) && lower.contains(SUMMARY_INTENT_B)
}

/// Build the outbound message sequence for one turn.
///
/// With context: one system message (template chosen by intent) followed by
/// the user turns. Without context: the user turns only.
pub fn build_messages(messages: &[ChatMessage], context: &str) -> Vec<ChatMessage> {
    if context.is_empty() {
        return messages.to_vec();
    }

    let latest_user = messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or("");

    let template = if is_document_summary_request(latest_user) {
        DOCUMENT_ANALYSIS_TEMPLATE
    } else {
        GROUNDED_ANSWER_TEMPLATE
    };

    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(ChatMessage::system(template.replace("{context}", context)));
    out.extend(messages.iter().cloned());
    out
}

/// Run one completion over the composed messages and return the model's
/// text verbatim. Model failures propagate as errors; they are never
/// disguised as assistant speech.
pub async fn compose(
    model: &dyn ChatModel,
    messages: &[ChatMessage],
    context: &str,
) -> Result<String> {
    let outbound = build_messages(messages, context);
    model.complete(&outbound).await
}
