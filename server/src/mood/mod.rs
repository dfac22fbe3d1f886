pub mod encoders;
pub mod model;
pub mod scaler;

use anyhow::{anyhow, ensure, Context};
use serde_json::{Map, Value};

use crate::{server_config::ClassifierConfig, survey};

use encoders::LabelEncoders;
use model::{argmax, load_mood_model, SharedMoodModel};
use scaler::Scaler;

pub type SurveyAnswers = Map<String, Value>;

/// Encodes a survey payload and runs it through the classifier.
pub struct MoodPredictor {
    encoders: LabelEncoders,
    scaler: Scaler,
    model: SharedMoodModel,
    num_classes: usize,
}

impl MoodPredictor {
    pub fn new(
        encoders: LabelEncoders,
        scaler: Scaler,
        model: SharedMoodModel,
        num_classes: usize,
    ) -> Self {
        Self {
            encoders,
            scaler,
            model,
            num_classes,
        }
    }

    pub fn load(config: &ClassifierConfig) -> anyhow::Result<Self> {
        let model = load_mood_model(&config.model)?;

        let scaler = Scaler::from_file(&config.scaler)?;
        tracing::info!(features = scaler.n_features(), "Scaler loaded");

        let encoders = LabelEncoders::from_file(&config.label_encoders)?;
        encoders.check_covers(&survey::SURVEY)?;
        tracing::info!(fields = encoders.len(), "Label encoders loaded");

        Ok(Self::new(encoders, scaler, model, config.num_classes))
    }

    /// Builds the feature vector in survey field order.
    pub fn encode(&self, answers: &SurveyAnswers) -> anyhow::Result<Vec<f32>> {
        survey::field_names()
            .map(|field| -> anyhow::Result<f32> {
                let value = answers
                    .get(field)
                    .ok_or_else(|| anyhow!("missing survey field '{}'", field))?;

                match self.encoders.get(field) {
                    Some(encoder) => {
                        let label = value.as_str().ok_or_else(|| {
                            anyhow!("field '{}' expects a string, got {}", field, value)
                        })?;
                        let code = encoder
                            .transform(label)
                            .with_context(|| format!("Failed to encode field {}", field))?;
                        Ok(code as f32)
                    }
                    None => Ok(coerce_numeric(value)),
                }
            })
            .collect()
    }

    /// Returns the predicted class index.
    pub fn predict(&self, answers: &SurveyAnswers) -> anyhow::Result<usize> {
        let features = self.encode(answers)?;
        let scaled = self.scaler.transform(&features)?;

        let probabilities = self.model.predict(&scaled)?;
        ensure!(
            probabilities.len() == self.num_classes,
            "classifier returned {} scores, expected {}",
            probabilities.len(),
            self.num_classes
        );

        argmax(&probabilities).context("classifier returned no scores")
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Lenient numeric conversion, unparseable values become NaN.
fn coerce_numeric(value: &Value) -> f32 {
    match value {
        Value::Number(n) => n.as_f64().map_or(f32::NAN, |n| n as f32),
        Value::String(s) => s.trim().parse::<f32>().unwrap_or(f32::NAN),
        Value::Bool(b) => u8::from(*b) as f32,
        _ => f32::NAN,
    }
}
