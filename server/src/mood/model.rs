//! The pre-trained sequence classifier, invoked as a black box.

use std::path::Path;
use std::sync::Arc;

/// A classifier over a single sequence of shape `[1, len, 1]`, one scaled
/// feature per timestep. Returns one probability per class.
pub trait MoodModel: Send + Sync {
    fn predict(&self, sequence: &[f32]) -> anyhow::Result<Vec<f32>>;
}

pub type SharedMoodModel = Arc<dyn MoodModel>;

#[cfg(feature = "onnx")]
pub use onnx::OnnxMoodModel;

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::Path;
    use std::sync::Mutex;

    use anyhow::{anyhow, Context};
    use ort::session::{builder::GraphOptimizationLevel, Session};
    use ort::value::Tensor;
    use tracing::{debug, info};

    use super::MoodModel;

    pub struct OnnxMoodModel {
        session: Mutex<Session>,
    }

    impl OnnxMoodModel {
        pub fn load(model_path: &Path) -> anyhow::Result<Self> {
            anyhow::ensure!(
                model_path.exists(),
                "classifier not found at {}",
                model_path.display()
            );

            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(1)?
                .commit_from_file(model_path)
                .with_context(|| format!("Failed to load classifier {}", model_path.display()))?;

            info!(model = %model_path.display(), "Classifier loaded");
            Ok(Self {
                session: Mutex::new(session),
            })
        }
    }

    impl MoodModel for OnnxMoodModel {
        fn predict(&self, sequence: &[f32]) -> anyhow::Result<Vec<f32>> {
            let shape = [1usize, sequence.len(), 1];
            let input = Tensor::from_array((shape, sequence.to_vec().into_boxed_slice()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|e| anyhow!("Session lock error: {e}"))?;
            let outputs = session.run(ort::inputs![input])?;

            let (output_shape, probabilities) = outputs[0].try_extract_tensor::<f32>()?;
            debug!(?output_shape, "Classifier output");

            Ok(probabilities.to_vec())
        }
    }
}

#[cfg(feature = "onnx")]
pub fn load_mood_model(model_path: &Path) -> anyhow::Result<SharedMoodModel> {
    Ok(Arc::new(OnnxMoodModel::load(model_path)?))
}

#[cfg(not(feature = "onnx"))]
pub fn load_mood_model(model_path: &Path) -> anyhow::Result<SharedMoodModel> {
    anyhow::bail!(
        "cannot load classifier {}: built without the `onnx` feature",
        model_path.display()
    )
}

/// Index of the highest score; the first one wins on ties. NaN scores are
/// never picked, so a row of only NaN yields `None`.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &score)| match best {
            _ if score.is_nan() => best,
            Some((_, top)) if score <= top => best,
            _ => Some((i, score)),
        })
        .map(|(i, _)| i)
}
