use std::sync::Arc;

use anyhow::Context;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{AppError, AppJsonResult, NO_INPUT_MESSAGE},
    mood::MoodPredictor,
};

pub type SharedMoodPredictor = Arc<MoodPredictor>;

/// # POST /predict_mood

#[derive(Debug, Serialize, Deserialize)]
pub struct MoodPrediction {
    pub predicted_mood_class: usize,
}

pub async fn predict_mood(
    State(predictor): State<SharedMoodPredictor>,
    payload: Option<Json<Value>>,
) -> AppJsonResult<MoodPrediction> {
    let answers = match payload {
        Some(Json(Value::Object(answers))) if !answers.is_empty() => answers,
        _ => return Err(AppError::BadRequest(NO_INPUT_MESSAGE.to_string())),
    };

    let prediction = tokio::task::spawn_blocking(move || predictor.predict(&answers))
        .await
        .context("Prediction task failed")?;

    match prediction {
        Ok(predicted_mood_class) => {
            tracing::info!(predicted_mood_class, "Mood predicted");
            Ok(Json(MoodPrediction {
                predicted_mood_class,
            }))
        }
        Err(e) => {
            tracing::error!("Error during prediction: {:#}", e);
            Err(AppError::Internal(e))
        }
    }
}
