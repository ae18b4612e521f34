use crate::storage::{self, StorageManager};
use homedir::my_home;
use serde::{Deserialize, Serialize};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Dimensionality of text-embedding-3-small vectors
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;
const DEFAULT_CAPTION_MODEL: &str = "gpt-4o";
const DEFAULT_TRANSCRIPTION_MODEL: &str = "gpt-4o-transcribe";
/// Timeout for embedding/caption/transcription calls in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

const DEFAULT_ADMIN_USERNAME: &str = "admin";
/// Admin sessions last 12 hours
const DEFAULT_SESSION_TTL_SECS: i64 = 12 * 60 * 60;

/// Configuration for the OpenAI-backed model calls (embedding, image
/// captioning, audio transcription).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key; the OPENAI_API_KEY env var takes precedence when set
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Expected embedding vector length; every stored entry carries a
    /// vector of exactly this size
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    #[serde(default = "default_caption_model")]
    pub caption_model: String,

    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            caption_model: DEFAULT_CAPTION_MODEL.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl OpenAiConfig {
    /// Resolved API key: env var wins over the config file.
    pub fn resolved_api_key(&self) -> String {
        std::env::var("OPENAI_API_KEY").unwrap_or_else(|_| self.api_key.clone())
    }
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimensions() -> usize {
    DEFAULT_EMBEDDING_DIMENSIONS
}

fn default_caption_model() -> String {
    DEFAULT_CAPTION_MODEL.to_string()
}

fn default_transcription_model() -> String {
    DEFAULT_TRANSCRIPTION_MODEL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Credentials for the two-sided authorization gate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Static API key checked against the x-api-key header.
    /// Empty means API-key access is disabled.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_admin_username")]
    pub admin_username: String,

    /// Empty means admin sign-in is disabled.
    #[serde(default)]
    pub admin_password: String,

    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            admin_password: String::new(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

fn default_admin_username() -> String {
    DEFAULT_ADMIN_USERNAME.to_string()
}

fn default_session_ttl_secs() -> i64 {
    DEFAULT_SESSION_TTL_SECS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            auth: AuthConfig::default(),
            openai: OpenAiConfig::default(),
            base_path: String::new(),
        }
    }
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

/// Data directory: SYNAPSE_BASE_PATH or ~/.local/share/synapse
pub fn base_path() -> String {
    std::env::var("SYNAPSE_BASE_PATH").unwrap_or(format!(
        "{}/.local/share/synapse",
        my_home()
            .expect("couldnt find home dir")
            .expect("couldnt find home dir")
            .to_string_lossy()
    ))
}

impl Config {
    fn validate(&self) {
        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            panic!("bind_addr is not a valid socket address: {}", self.bind_addr);
        }

        if self.openai.embedding_dimensions == 0 {
            panic!("openai.embedding_dimensions must be greater than 0");
        }

        if self.openai.request_timeout_secs == 0 {
            panic!("openai.request_timeout_secs must be greater than 0");
        }

        if self.auth.session_ttl_secs <= 0 {
            panic!("auth.session_ttl_secs must be greater than 0");
        }
    }

    pub fn load() -> Self {
        Self::load_with(&base_path())
    }

    pub fn load_with(base_path: &str) -> Self {
        let store = storage::BackendLocal::new(base_path).expect("couldnt create data dir");

        // create new if does not exist
        if !store.exists("config.yaml") {
            store
                .write(
                    "config.yaml",
                    serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
                )
                .expect("couldnt write default config");
        }

        let config_str = String::from_utf8(store.read("config.yaml").expect("couldnt read config"))
            .expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let store =
            storage::BackendLocal::new(&self.base_path).expect("couldnt create data dir");

        let config_str = serde_yml::to_string(&self).unwrap();
        store
            .write("config.yaml", config_str.as_bytes())
            .expect("couldnt write config");
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Directory uploaded media blobs live in, served at /api/file/.
    pub fn media_dir(&self) -> String {
        format!("{}/media", self.base_path)
    }

    /// Path of the entry table's backing file.
    pub fn entries_path(&self) -> String {
        format!("{}/entries.json", self.base_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().to_str().unwrap();

        let config = Config::load_with(base);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.openai.embedding_dimensions, 1536);

        // second load reads the file written by the first
        let again = Config::load_with(base);
        assert_eq!(again.openai.embedding_model, config.openai.embedding_model);
    }

    #[test]
    fn test_partial_config_gets_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().to_str().unwrap();
        std::fs::write(
            format!("{base}/config.yaml"),
            "auth:\n  api_key: sekrit\n",
        )
        .unwrap();

        let config = Config::load_with(base);
        assert_eq!(config.auth.api_key, "sekrit");
        assert_eq!(config.auth.admin_username, "admin");
        assert_eq!(config.openai.embedding_dimensions, 1536);
    }
}
