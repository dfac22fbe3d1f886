use std::{collections::HashMap, path::Path};

use anyhow::{anyhow, ensure, Context};
use serde::Deserialize;

use crate::survey::SurveySchema;

/// Categorical value -> integer code, where a code is the value's position in
/// the fitted class list.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> Self {
        Self { classes }
    }

    pub fn transform(&self, value: &str) -> anyhow::Result<usize> {
        self.classes
            .iter()
            .position(|class| class == value)
            .ok_or_else(|| {
                anyhow!(
                    "unseen label '{}', expected one of [{}]",
                    value,
                    self.classes.join(", ")
                )
            })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct LabelEncoders(HashMap<String, LabelEncoder>);

impl LabelEncoders {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read label encoders at {}", path.display()))?;
        serde_json::from_str(&raw).context("Label encoder artifact is invalid")
    }

    pub fn get(&self, field: &str) -> Option<&LabelEncoder> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, field: impl Into<String>, encoder: LabelEncoder) {
        self.0.insert(field.into(), encoder);
    }

    /// Every option the survey offers must be a known class of its field's
    /// encoder. Fields without an encoder are skipped.
    pub fn check_covers(&self, survey: &SurveySchema) -> anyhow::Result<()> {
        for (field, options) in survey {
            let Some(encoder) = self.get(field) else {
                continue;
            };
            let unknown: Vec<&str> = options
                .iter()
                .copied()
                .filter(|option| !encoder.classes().iter().any(|class| class == option))
                .collect();
            ensure!(
                unknown.is_empty(),
                "label encoder for {} does not know {:?}",
                field,
                unknown
            );
        }
        Ok(())
    }
}
