use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;

use crate::{
    embed::SharedEmbedder,
    error::AppResult,
    knowledge_base::KnowledgeBase,
    prompt::{self, ChatMessage, SharedChatCompletion},
    session::{self, store::ChatSessionStore, SessionKey},
};

pub type SharedKnowledgeBase = Arc<KnowledgeBase>;

pub const EMPTY_MESSAGE_REPLY: &str = "Please enter a message.";
pub const RESET_REPLY: &str = "Conversation reset.";

#[derive(Debug, Clone, Copy)]
pub struct ChatSettings {
    pub top_n: usize,
}

/// # POST /chat

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
}

#[allow(clippy::too_many_arguments)]
pub async fn chat(
    State(knowledge_base): State<SharedKnowledgeBase>,
    State(embedder): State<SharedEmbedder>,
    State(chat_client): State<SharedChatCompletion>,
    State(session_store): State<ChatSessionStore>,
    State(session_key): State<SessionKey>,
    State(settings): State<ChatSettings>,
    cookies: Cookies,
    body: Option<Json<ChatBody>>,
) -> AppResult<Response> {
    let user_message = match body.and_then(|Json(body)| body.message) {
        Some(message) if !message.is_empty() => message,
        _ => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(ChatReply {
                    response: EMPTY_MESSAGE_REPLY.to_string(),
                }),
            )
                .into_response())
        }
    };

    let session_id = session::session_id(&cookies, &session_key);
    let history = session_store.load_history(session_id);

    let references = knowledge_base
        .find_relevant(embedder.as_ref(), &user_message, settings.top_n)
        .await?;
    let reply = prompt::generate_response(
        chat_client.as_ref(),
        &references,
        &history,
        &user_message,
    )
    .await?;

    session_store.record_turn(
        session_id,
        ChatMessage::user(user_message),
        ChatMessage::assistant(reply.clone()),
    );
    tracing::debug!(session = %session_id, turns = history.len() / 2 + 1, "Chat turn recorded");

    Ok(Json(ChatReply { response: reply }).into_response())
}

/// # POST /reset

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetReply {
    pub message: String,
}

pub async fn reset_conversation(
    State(session_store): State<ChatSessionStore>,
    State(session_key): State<SessionKey>,
    cookies: Cookies,
) -> Json<ResetReply> {
    if let Some(session_id) = session::existing_session_id(&cookies, &session_key) {
        session_store.destroy_session(session_id);
        tracing::debug!(session = %session_id, "Conversation reset");
    }

    Json(ResetReply {
        message: RESET_REPLY.to_string(),
    })
}
