#![allow(dead_code)]

mod corpus;
mod embed;
mod error;
mod knowledge_base;
mod mood;
mod prompt;
mod rate_limiters;
mod request_tracing;
mod routes;
mod server_config;
mod session;
mod survey;
#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{extract::FromRef, Router};
use corpus::Corpus;
use embed::{cache::EmbeddingCache, ApiEmbedder, SharedEmbedder};
use knowledge_base::KnowledgeBase;
use mimalloc::MiMalloc;
use mood::MoodPredictor;
use prompt::{chat_api::ApiChat, SharedChatCompletion};
use rate_limiters::RateLimiters;
use routes::{
    handlers::{
        chat::{ChatSettings, SharedKnowledgeBase},
        home::{self, Templates},
        mood::SharedMoodPredictor,
    },
    AppRouter,
};
use server_config::{cfg, ServerConfig};
use session::{store::ChatSessionStore, SessionKey};
use tokio::signal;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[derive(Clone, FromRef)]
struct ServerState {
    mood_predictor: SharedMoodPredictor,
    knowledge_base: SharedKnowledgeBase,
    embedder: SharedEmbedder,
    chat_client: SharedChatCompletion,
    session_store: ChatSessionStore,
    session_key: SessionKey,
    chat_settings: ChatSettings,
    templates: Templates,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    // check config
    println!("{}", *cfg);
    if cfg.api.key.is_empty() {
        tracing::warn!("API_KEY is not set, embedding and chat calls will be rejected");
    }

    let http_client = reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .timeout(Duration::from_secs(cfg.api.timeout_secs))
        .build()?;

    let state = build_state(&cfg, http_client).await?;
    let router = AppRouter::create(state.clone(), &cfg.server);

    let scheduler = JobScheduler::new()
        .await
        .context("Failed to create scheduler")?;

    // Cleanup session storage
    let session_store = state.session_store.clone();
    scheduler
        .add(Job::new_repeated(
            Duration::from_secs(3 * 60),
            move |_uuid, _lock| {
                session_store.clean_store();
            },
        )?)
        .await?;

    scheduler
        .start()
        .await
        .context("Failed to start scheduler")?;

    run_server(router, scheduler, cfg.server.port).await
}

/// Loads every startup artifact. Any failure here aborts the process.
async fn build_state(
    config: &ServerConfig,
    http_client: HttpClient,
) -> anyhow::Result<ServerState> {
    let mood_predictor = Arc::new(
        MoodPredictor::load(&config.classifier).context("Failed to load mood classifier")?,
    );

    let embedder: SharedEmbedder = Arc::new(ApiEmbedder::new(http_client.clone(), &config.api)?);
    let chat_client: SharedChatCompletion =
        Arc::new(ApiChat::new(http_client, &config.api, &config.model)?);

    let corpus = Corpus::load(&config.corpus.csv, &config.corpus.json)?;
    let rate_limiters = RateLimiters::from_config(&config.retrieval);
    let embeddings = EmbeddingCache::load_or_compute(
        &config.corpus.embedding_cache,
        &corpus,
        embedder.as_ref(),
        &rate_limiters,
    )
    .await?;
    let knowledge_base = Arc::new(KnowledgeBase::new(corpus, embeddings)?);
    tracing::info!(entries = knowledge_base.len(), "Knowledge base ready");

    Ok(ServerState {
        mood_predictor,
        knowledge_base,
        embedder,
        chat_client,
        session_store: ChatSessionStore::new(
            config.chat.session_ttl_mins * 60,
            config.chat.max_history_turns,
        ),
        session_key: SessionKey::from_env()?,
        chat_settings: ChatSettings {
            top_n: config.retrieval.top_n,
        },
        templates: home::templates()?,
    })
}

async fn shutdown_signal(mut scheduler: JobScheduler) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    if let Err(e) = scheduler.shutdown().await {
        tracing::error!("Failed to shut down scheduler: {:?}", e);
    }
    tracing::info!("Cleanups done, shutting down");
}

async fn run_server(router: Router, scheduler: JobScheduler, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Mindcheck server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(scheduler))
    .await
    .context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        corpus::QaPair,
        prompt::{ChatCompletion, Role},
        server_config::ServerSettings,
        survey::SURVEY,
        testing::common::{
            bundled_encoders, identity_scaler, EchoChat, FailingChat, FailingEmbedder,
            FixedMoodModel, KeywordEmbedder,
        },
    };
    use reqwest::StatusCode;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    pub struct TestServer {
        pub addr: SocketAddr,
        pub state: ServerState,
        pub client: reqwest::Client,
        shutdown_tx: tokio::sync::oneshot::Sender<()>,
    }

    impl TestServer {
        pub fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
            self.client
                .post(self.url(path))
                .json(&body)
                .send()
                .await
                .unwrap()
        }

        pub async fn get(&self, path: &str) -> reqwest::Response {
            self.client.get(self.url(path)).send().await.unwrap()
        }

        pub async fn shutdown(self) {
            let _ = self.shutdown_tx.send(());
        }
    }

    async fn knowledge_base(embedder: &KeywordEmbedder) -> KnowledgeBase {
        let corpus = Corpus::new(vec![
            QaPair::new("I can't sleep at night", "Keep a regular bedtime."),
            QaPair::new("I feel anxious at work", "Try short breaks."),
            QaPair::new("My family argues a lot", "Consider family counselling."),
            QaPair::new("I feel sad without friends", "Reach out to one person."),
        ]);
        let embeddings = EmbeddingCache::compute(
            &corpus,
            embedder,
            &RateLimiters::new(Duration::from_millis(1)),
        )
        .await
        .unwrap();
        KnowledgeBase::new(corpus, embeddings).unwrap()
    }

    pub async fn setup(chat_client: SharedChatCompletion) -> TestServer {
        setup_with(chat_client, Arc::new(KeywordEmbedder::default())).await
    }

    pub async fn setup_with(
        chat_client: SharedChatCompletion,
        embedder: SharedEmbedder,
    ) -> TestServer {
        let knowledge_base = Arc::new(knowledge_base(&KeywordEmbedder::default()).await);

        let state = ServerState {
            mood_predictor: Arc::new(MoodPredictor::new(
                bundled_encoders(),
                identity_scaler(),
                Arc::new(FixedMoodModel::new(vec![0.1, 0.2, 0.7])),
                3,
            )),
            knowledge_base,
            embedder,
            chat_client,
            session_store: ChatSessionStore::new(60 * 60, 20),
            session_key: SessionKey::from_secret("test session secret").unwrap(),
            chat_settings: ChatSettings { top_n: 2 },
            templates: home::templates().unwrap(),
        };

        let settings = ServerSettings {
            port: 0,
            frontend_origins: vec!["http://localhost:3000".to_string()],
            request_timeout_secs: 30,
        };
        let router = AppRouter::create(state.clone(), &settings);

        // Bind to port 0 to get a random available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
        });

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .unwrap();

        TestServer {
            addr,
            state,
            client,
            shutdown_tx,
        }
    }

    fn survey_answers() -> Value {
        let answers: serde_json::Map<String, Value> = SURVEY
            .iter()
            .map(|(field, options)| (field.to_string(), json!(options.last().unwrap())))
            .collect();
        Value::Object(answers)
    }

    #[tokio::test]
    async fn test_survey_matches_schema_and_is_idempotent() {
        let server = setup(Arc::new(EchoChat::default())).await;

        let first = server.get("/survey").await;
        assert_eq!(first.status(), StatusCode::OK);
        let first = first.text().await.unwrap();
        let second = server.get("/survey").await.text().await.unwrap();
        assert_eq!(first, second);

        let body: Value = serde_json::from_str(&first).unwrap();
        let body = body.as_object().unwrap();
        assert_eq!(body.len(), SURVEY.len());
        for (field, options) in SURVEY.iter() {
            assert_eq!(body[*field], json!(options), "{field}");
        }

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_predict_mood_valid_payload() {
        let server = setup(Arc::new(EchoChat::default())).await;

        let resp = server.post("/predict_mood", survey_answers()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({ "predicted_mood_class": 2 }));

        let class = body["predicted_mood_class"].as_u64().unwrap() as usize;
        assert!(class < server.state.mood_predictor.num_classes());

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_predict_mood_unknown_option_is_server_error() {
        let server = setup(Arc::new(EchoChat::default())).await;

        let mut answers = survey_answers();
        answers["Growing_Stress"] = json!("Sometimes");
        let resp = server.post("/predict_mood", answers).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("Sometimes"));

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_predict_mood_without_input() {
        let server = setup(Arc::new(EchoChat::default())).await;

        let resp = server.post("/predict_mood", json!({})).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({ "error": "No input data provided" }));

        let resp = server
            .client
            .post(server.url("/predict_mood"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_chat_requires_message() {
        let server = setup(Arc::new(EchoChat::default())).await;

        for body in [json!({}), json!({ "message": "" })] {
            let resp = server.post("/chat", body).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body, json!({ "response": "Please enter a message." }));
        }

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_chat_uses_references_and_history() {
        let chat = Arc::new(EchoChat::default());
        let server = setup(chat.clone()).await;

        let resp = server
            .post("/chat", json!({ "message": "Why can't I sleep?" }))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({ "response": "echo: Why can't I sleep?" }));

        let sent = chat.last_request();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].role, Role::System);
        assert!(sent[0]
            .content
            .contains("Q: I can't sleep at night\nA: Keep a regular bedtime."));

        server
            .post("/chat", json!({ "message": "Work makes me anxious" }))
            .await;
        let sent = chat.last_request();
        let roles: Vec<Role> = sent.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(sent[1].content, "Why can't I sleep?");
        assert_eq!(sent[2].content, "echo: Why can't I sleep?");
        assert!(sent[0].content.contains("I feel anxious at work"));

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_reset_then_chat_starts_fresh() {
        let chat = Arc::new(EchoChat::default());
        let server = setup(chat.clone()).await;

        server.post("/chat", json!({ "message": "first" })).await;
        server.post("/chat", json!({ "message": "second" })).await;

        let resp = server.post("/reset", json!({})).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({ "message": "Conversation reset." }));

        server.post("/chat", json!({ "message": "after reset" })).await;
        assert_eq!(chat.last_request().len(), 2);

        // Exactly one exchange was kept since the reset
        server.post("/chat", json!({ "message": "next" })).await;
        let sent = chat.last_request();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[1].content, "after reset");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_sessions_are_per_client() {
        let chat = Arc::new(EchoChat::default());
        let server = setup(chat.clone()).await;

        server.post("/chat", json!({ "message": "mine" })).await;

        let other_client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .unwrap();
        other_client
            .post(server.url("/chat"))
            .json(&json!({ "message": "theirs" }))
            .send()
            .await
            .unwrap();

        assert_eq!(chat.last_request().len(), 2);
        assert_eq!(chat.request_count(), 2);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_chat_upstream_failure_is_json_error() {
        let server = setup(Arc::new(FailingChat)).await;

        let resp = server.post("/chat", json!({ "message": "hello" })).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("upstream unavailable"));
        assert_eq!(server.state.session_store.len(), 0);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_chat_embedding_failure_is_json_error() {
        let chat = Arc::new(EchoChat::default());
        let server = setup_with(chat.clone(), Arc::new(FailingEmbedder)).await;

        let resp = server.post("/chat", json!({ "message": "hello" })).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("embedding service unavailable"));

        assert_eq!(chat.request_count(), 0);
        assert_eq!(server.state.session_store.len(), 0);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_home_and_health() {
        let server = setup(Arc::new(EchoChat::default())).await;

        let resp = server.get("/").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.text().await.unwrap().contains("Mood check-in"));

        let resp = server.get("/health").await;
        assert_eq!(resp.text().await.unwrap(), "OK");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let server = setup(Arc::new(EchoChat::default())).await;

        let resp = server.get("/nope").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.text().await.unwrap(), "Route does not exist");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let server = setup(Arc::new(EchoChat::default())).await;

        let resp = server
            .client
            .get(server.url("/health"))
            .header(request_tracing::REQUEST_ID_HEADER, "abc-123")
            .send()
            .await
            .unwrap();
        assert_eq!(
            resp.headers()[request_tracing::REQUEST_ID_HEADER],
            "abc-123"
        );

        let resp = server.get("/health").await;
        assert!(resp
            .headers()
            .contains_key(request_tracing::REQUEST_ID_HEADER));

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_echo_chat_is_a_chat_completion() {
        let chat: Arc<dyn ChatCompletion> = Arc::new(EchoChat::default());
        let reply = chat
            .complete(&[prompt::ChatMessage::user("ping")])
            .await
            .unwrap();
        assert_eq!(reply, "echo: ping");
    }
}
