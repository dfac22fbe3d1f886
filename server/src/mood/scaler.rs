use std::path::Path;

use anyhow::{ensure, Context};
use serde::Deserialize;

use crate::survey::NUM_FIELDS;

/// A fitted feature normalization, applied column-wise.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
    /// `(x - mean) / scale`
    Standard { mean: Vec<f32>, scale: Vec<f32> },
    /// `x * scale + min`
    MinMax { min: Vec<f32>, scale: Vec<f32> },
}

impl Scaler {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scaler at {}", path.display()))?;
        let scaler: Scaler = serde_json::from_str(&raw).context("Scaler artifact is invalid")?;
        scaler.validate()?;
        ensure!(
            scaler.n_features() == NUM_FIELDS,
            "Scaler is fitted for {} features, the survey has {}",
            scaler.n_features(),
            NUM_FIELDS
        );
        Ok(scaler)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let (offsets, scale) = self.parts();
        ensure!(
            offsets.len() == scale.len(),
            "Scaler has {} offsets but {} scale factors",
            offsets.len(),
            scale.len()
        );
        Ok(())
    }

    fn parts(&self) -> (&[f32], &[f32]) {
        match self {
            Scaler::Standard { mean, scale } => (mean, scale),
            Scaler::MinMax { min, scale } => (min, scale),
        }
    }

    pub fn n_features(&self) -> usize {
        self.parts().1.len()
    }

    pub fn transform(&self, features: &[f32]) -> anyhow::Result<Vec<f32>> {
        ensure!(
            features.len() == self.n_features(),
            "X has {} features, but the scaler is expecting {} features",
            features.len(),
            self.n_features()
        );

        let scaled = match self {
            Scaler::Standard { mean, scale } => features
                .iter()
                .zip(mean.iter().zip(scale))
                .map(|(x, (m, s))| (x - m) / s)
                .collect(),
            Scaler::MinMax { min, scale } => features
                .iter()
                .zip(min.iter().zip(scale))
                .map(|(x, (m, s))| x * s + m)
                .collect(),
        };

        Ok(scaled)
    }
}
