//! The static Q&A reference corpus. Row order is fixed at load time and is the
//! row order of the embedding cache.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pairs: Vec<QaPair>,
}

impl Corpus {
    pub fn new(pairs: Vec<QaPair>) -> Self {
        Self { pairs }
    }

    /// CSV rows first, then the JSON rows. A broken JSON file only loses its own rows.
    pub fn load(csv_path: &Path, json_path: &Path) -> anyhow::Result<Self> {
        let mut pairs = read_csv_pairs(csv_path)?;
        let csv_rows = pairs.len();

        match read_json_pairs(json_path) {
            Ok(json_pairs) => pairs.extend(json_pairs),
            Err(e) => tracing::error!("Error loading chat JSON file: {:#}", e),
        }

        tracing::info!(
            csv_rows,
            json_rows = pairs.len() - csv_rows,
            "Corpus loaded"
        );
        Ok(Self { pairs })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QaPair> {
        self.pairs.get(index)
    }

    pub fn questions(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|p| p.question.as_str())
    }

    /// Hex SHA-256 over the ordered questions.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for question in self.questions() {
            hasher.update((question.len() as u64).to_le_bytes());
            hasher.update(question.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "questionTitle")]
    question_title: Option<String>,
    #[serde(rename = "questionText")]
    question_text: Option<String>,
    #[serde(rename = "answerText")]
    answer_text: Option<String>,
}

fn read_csv_pairs(path: &Path) -> anyhow::Result<Vec<QaPair>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open corpus CSV {}", path.display()))?;

    reader
        .deserialize::<CsvRow>()
        .enumerate()
        .map(|(i, row)| {
            let row = row.with_context(|| format!("Invalid corpus CSV row {}", i + 1))?;
            let question = format!(
                "{} {}",
                row.question_title.unwrap_or_default(),
                row.question_text.unwrap_or_default()
            );
            Ok(QaPair::new(question, row.answer_text.unwrap_or_default()))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct JsonCorpus {
    #[serde(default)]
    train: Vec<JsonItem>,
}

#[derive(Debug, Deserialize)]
struct JsonItem {
    #[serde(default)]
    utterances: Vec<Utterance>,
}

#[derive(Debug, Deserialize)]
struct Utterance {
    #[serde(default)]
    history: Vec<String>,
    #[serde(default)]
    candidates: Vec<String>,
}

fn read_json_pairs(path: &Path) -> anyhow::Result<Vec<QaPair>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus JSON {}", path.display()))?;
    let corpus: JsonCorpus = serde_json::from_str(&raw).context("Corpus JSON is invalid")?;

    let pairs = corpus
        .train
        .into_iter()
        .flat_map(|item| item.utterances)
        .filter_map(|utterance| {
            let question = utterance.history.into_iter().next()?;
            let answer = utterance.candidates.into_iter().next()?;
            (!question.is_empty() && !answer.is_empty()).then(|| QaPair::new(question, answer))
        })
        .collect();

    Ok(pairs)
}
