pub mod chat_api;

use std::sync::Arc;

use async_trait::async_trait;
use indoc::formatdoc;
use serde::{Deserialize, Serialize};

use crate::corpus::QaPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Sends the conversation and returns the reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String>;
}

pub type SharedChatCompletion = Arc<dyn ChatCompletion>;

fn knowledge_text(references: &[QaPair]) -> String {
    references
        .iter()
        .map(|QaPair { question, answer }| format!("Q: {question}\nA: {answer}\n\n"))
        .collect()
}

pub fn system_prompt(references: &[QaPair]) -> String {
    formatdoc! {r#"
        You are a compassionate mental health therapist assistant. Answer the user's question using only the following therapist Q&A references. Do not add any extra advice beyond what is provided. If the answer is not present in the provided data, say you do not know.

        Therapist Q&A references:
        {knowledge}"#,
    knowledge = knowledge_text(references)}
}

/// System instruction, then prior turns, then the new user message.
pub fn build_messages(
    references: &[QaPair],
    history: &[ChatMessage],
    user_message: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt(references)));
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(user_message));
    messages
}

pub async fn generate_response(
    chat: &dyn ChatCompletion,
    references: &[QaPair],
    history: &[ChatMessage],
    user_message: &str,
) -> anyhow::Result<String> {
    let messages = build_messages(references, history, user_message);
    chat.complete(&messages).await
}
