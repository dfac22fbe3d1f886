use std::time::Duration;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use http::{HeaderValue, Method};
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

use crate::{request_tracing, server_config::ServerSettings, ServerState};

use super::handlers::{chat, home, mood, survey};

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState, settings: &ServerSettings) -> Router {
        let origins = settings
            .frontend_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    tracing::warn!("Ignoring invalid frontend origin {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>();

        let cors_layer = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([http::header::CONTENT_TYPE])
            .allow_credentials(true);

        let router = Router::new()
            .route("/", get(home::home))
            .route("/health", get(|| async { "OK" }))
            .route("/predict_mood", post(mood::predict_mood))
            .route("/chat", post(chat::chat))
            .route("/reset", post(chat::reset_conversation))
            .route("/survey", get(survey::get_survey_questions))
            .layer(CookieManagerLayer::new())
            .layer(TimeoutLayer::new(Duration::from_secs(
                settings.request_timeout_secs,
            )))
            .layer(cors_layer)
            .fallback(handler_404)
            .with_state(state);

        request_tracing::with_request_tracing(router)
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}
