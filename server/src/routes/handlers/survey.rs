use axum::Json;

use crate::survey::{SurveySchema, SURVEY};

/// # GET /survey
pub async fn get_survey_questions() -> Json<&'static SurveySchema> {
    Json(&*SURVEY)
}
