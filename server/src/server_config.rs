use config::{Config, ConfigError};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{
    env,
    path::{Path, PathBuf},
    result::Result,
};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub port: u16,
    pub frontend_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
    #[serde(default)]
    pub key: String,
}

// Keeps the credential out of the startup dump
impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("embedding_model", &self.embedding_model)
            .field("timeout_secs", &self.timeout_secs)
            .field("key", &if self.key.is_empty() { "<unset>" } else { "<set>" })
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub chat_model: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    pub model: PathBuf,
    pub scaler: PathBuf,
    pub label_encoders: PathBuf,
    pub num_classes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorpusConfig {
    pub csv: PathBuf,
    pub json: PathBuf,
    pub embedding_cache: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub top_n: usize,
    pub embedding_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub max_history_turns: usize,
    pub session_ttl_mins: i64,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    server: ServerSettings,
    api: ApiConfig,
    model: ModelConfig,
    classifier: ClassifierConfig,
    corpus: CorpusConfig,
    retrieval: RetrievalConfig,
    chat: ChatConfig,
}

#[derive(Debug)]
pub struct ServerConfig {
    pub root: PathBuf,
    pub server: ServerSettings,
    pub api: ApiConfig,
    pub model: ModelConfig,
    pub classifier: ClassifierConfig,
    pub corpus: CorpusConfig,
    pub retrieval: RetrievalConfig,
    pub chat: ChatConfig,
}

impl ServerConfig {
    /// Reads `config.toml` from `root` and resolves every artifact path against it.
    /// `PORT` and `API_KEY` from the environment take precedence over the file.
    pub fn from_dir(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join("config.toml");
        let cfg_file: ConfigFile = Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;

        let ConfigFile {
            mut server,
            mut api,
            model,
            mut classifier,
            mut corpus,
            retrieval,
            chat,
        } = cfg_file;

        if let Some(port) = env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            server.port = port;
        }
        if let Ok(key) = env::var("API_KEY") {
            api.key = key;
        }

        classifier.model = root.join(&classifier.model);
        classifier.scaler = root.join(&classifier.scaler);
        classifier.label_encoders = root.join(&classifier.label_encoders);
        corpus.csv = root.join(&corpus.csv);
        corpus.json = root.join(&corpus.json);
        corpus.embedding_cache = root.join(&corpus.embedding_cache);

        Ok(ServerConfig {
            root: root.to_path_buf(),
            server,
            api,
            model,
            classifier,
            corpus,
            retrieval,
            chat,
        })
    }
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server Config ({}):\n{:?}\n\nAPI: {:?}\n\nModel: {:?}\n\nClassifier: {:?}\n\nCorpus: {:?}\n\nRetrieval: {:?}\n\nChat: {:?}",
            self.root.display(),
            self.server,
            self.api,
            self.model,
            self.classifier,
            self.corpus,
            self.retrieval,
            self.chat,
        )
    }
}

pub fn app_dir() -> PathBuf {
    env::var("APP_DIR").map(PathBuf::from).unwrap_or_else(|_| {
        let dir =
            env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
        Path::new(&dir)
            .parent()
            .expect("Failed to get parent dir")
            .join("config")
    })
}

lazy_static! {
    pub static ref cfg: ServerConfig =
        ServerConfig::from_dir(&app_dir()).expect("config.toml is required and must be valid");
}
