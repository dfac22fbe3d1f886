use std::path::Path;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use anyhow::anyhow;
use async_trait::async_trait;

use crate::{
    embed::Embedder,
    mood::{encoders::LabelEncoders, model::MoodModel, scaler::Scaler},
    prompt::{ChatCompletion, ChatMessage, Role},
    survey::NUM_FIELDS,
};

pub fn bundled_encoders() -> LabelEncoders {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("config/artifacts/label_encoders.json");
    LabelEncoders::from_file(&path).unwrap()
}

pub fn identity_scaler() -> Scaler {
    Scaler::Standard {
        mean: vec![0.0; NUM_FIELDS],
        scale: vec![1.0; NUM_FIELDS],
    }
}

/// Returns the same scores for every input and remembers the last input.
pub struct FixedMoodModel {
    scores: Vec<f32>,
    pub last_input: Mutex<Vec<f32>>,
}

impl FixedMoodModel {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            last_input: Mutex::new(Vec::new()),
        }
    }
}

impl MoodModel for FixedMoodModel {
    fn predict(&self, sequence: &[f32]) -> anyhow::Result<Vec<f32>> {
        *self.last_input.lock().unwrap() = sequence.to_vec();
        Ok(self.scores.clone())
    }
}

const KEYWORDS: [&str; 8] = [
    "sleep", "night", "anxious", "work", "family", "sad", "stress", "friends",
];

/// One dimension per keyword, counting occurrences in the lowercased text.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = text.to_lowercase();
        Ok(KEYWORDS
            .iter()
            .map(|keyword| text.matches(keyword).count() as f32)
            .collect())
    }

    fn model(&self) -> &str {
        "keyword-counts"
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Err(anyhow!("embedding service unavailable"))
    }

    fn model(&self) -> &str {
        "failing"
    }
}

/// Replies with the last user message and records every request.
#[derive(Default)]
pub struct EchoChat {
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl EchoChat {
    pub fn last_request(&self) -> Vec<ChatMessage> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatCompletion for EchoChat {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(format!("echo: {last_user}"))
    }
}

pub struct FailingChat;

#[async_trait]
impl ChatCompletion for FailingChat {
    async fn complete(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
        Err(anyhow!("Chat API error: upstream unavailable"))
    }
}
