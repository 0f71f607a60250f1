use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub matcher: MatcherConfig,
    pub vectorizer: VectorizerConfig,
    pub worker: WorkerConfig,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
    /// Lowercase extensions accepted on upload
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    /// HTTP only; images are processed elsewhere
    Api,
    /// Queue consumers only
    Worker,
    All,
}

impl ServiceMode {
    pub fn runs_api(&self) -> bool {
        matches!(self, ServiceMode::Api | ServiceMode::All)
    }

    pub fn runs_workers(&self) -> bool {
        matches!(self, ServiceMode::Worker | ServiceMode::All)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub mode: ServiceMode,
    /// Consumers started in this process
    pub count: usize,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Gcs,
    Local,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// GCS bucket name (required when backend is gcs)
    pub gcs_bucket: Option<String>,
    /// Path to GCS service account JSON (optional, defaults to ADC)
    pub gcs_credentials_file: Option<String>,
}

#[derive(Debug, Clone)]
pub enum QueueBackend {
    Local,
    PubSub,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    /// Queue name; the Pub/Sub topic
    pub name: String,
    pub poll_interval_seconds: u64,
    pub batch_size: usize,
    /// How long a fetched message stays hidden (local backend)
    pub visibility_timeout_seconds: u64,
    pub pubsub_project: Option<String>,
    pub pubsub_subscription: String,
    pub pubsub_credentials_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Faces closer than this (strictly) are the same person
    pub distance_threshold: f64,
    pub embedding_size: usize,
}

#[derive(Debug, Clone)]
pub enum VectorizerBackend {
    Command,
    Http,
}

#[derive(Debug, Clone)]
pub struct VectorizerConfig {
    pub backend: VectorizerBackend,
    pub command: String,
    pub url: Option<String>,
    /// Path prefix as seen inside this container
    pub mounted_data_dir: Option<String>,
    /// The same directory as seen by the docker host
    pub host_data_dir: Option<String>,
}

pub const DEFAULT_VECTORIZER_COMMAND: &str =
    "docker run --rm -v {path}:/{name}:ro cwolff/face_recognition /{name}";

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_storage_path: "./files".to_string(),
            gcs_bucket: None,
            gcs_credentials_file: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Local,
            name: "faceanalysis".to_string(),
            poll_interval_seconds: 3,
            batch_size: 32,
            visibility_timeout_seconds: 30,
            pubsub_project: None,
            pubsub_subscription: "faceanalysis".to_string(),
            pubsub_credentials_file: None,
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 0.6,
            embedding_size: 128,
        }
    }
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            backend: VectorizerBackend::Command,
            command: DEFAULT_VECTORIZER_COMMAND.to_string(),
            url: None,
            mounted_data_dir: None,
            host_data_dir: None,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: ServiceMode::All,
            count: 1,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let mode = match std::env::var("SERVICE_MODE")
            .unwrap_or_else(|_| "all".to_string())
            .to_lowercase()
            .as_str()
        {
            "api" => ServiceMode::Api,
            "worker" => ServiceMode::Worker,
            "all" => ServiceMode::All,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "SERVICE_MODE must be api, worker or all, got '{other}'"
                )))
            }
        };

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let max_upload_size = env_parse("MAX_UPLOAD_SIZE", 50 * 1024 * 1024); // 50MB

        let storage_backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "gcs" => StorageBackend::Gcs,
            _ => StorageBackend::Local,
        };

        let local_storage_path =
            std::env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| "./files".to_string());

        let gcs_bucket = std::env::var("GCS_BUCKET").ok();
        let gcs_credentials_file = std::env::var("GCS_CREDENTIALS_FILE").ok();

        let queue_backend = match std::env::var("QUEUE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "pubsub" => QueueBackend::PubSub,
            _ => QueueBackend::Local,
        };

        let queue_name =
            std::env::var("QUEUE_NAME").unwrap_or_else(|_| "faceanalysis".to_string());
        let pubsub_subscription =
            std::env::var("PUBSUB_SUBSCRIPTION").unwrap_or_else(|_| queue_name.clone());
        let pubsub_credentials_file = std::env::var("PUBSUB_CREDENTIALS_FILE")
            .ok()
            .or_else(|| gcs_credentials_file.clone());

        let vectorizer_backend = match std::env::var("VECTORIZER_BACKEND")
            .unwrap_or_else(|_| "command".to_string())
            .to_lowercase()
            .as_str()
        {
            "http" => VectorizerBackend::Http,
            _ => VectorizerBackend::Command,
        };

        let allowed_extensions = std::env::var("ALLOWED_IMAGE_FILE_EXTENSIONS")
            .map(|v| parse_extensions(&v))
            .unwrap_or_else(|_| parse_extensions("jpg,jpeg,png"));

        let config = Config {
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            storage: StorageConfig {
                backend: storage_backend,
                local_storage_path,
                gcs_bucket,
                gcs_credentials_file,
            },
            queue: QueueConfig {
                backend: queue_backend,
                name: queue_name,
                poll_interval_seconds: env_parse("QUEUE_POLL_INTERVAL_SECONDS", 3),
                batch_size: env_parse("QUEUE_BATCH_SIZE", 32),
                visibility_timeout_seconds: env_parse("QUEUE_VISIBILITY_TIMEOUT_SECONDS", 30),
                pubsub_project: std::env::var("PUBSUB_PROJECT").ok(),
                pubsub_subscription,
                pubsub_credentials_file,
            },
            matcher: MatcherConfig {
                distance_threshold: env_parse("DISTANCE_SCORE_THRESHOLD", 0.6),
                embedding_size: env_parse("EMBEDDING_SIZE", 128),
            },
            vectorizer: VectorizerConfig {
                backend: vectorizer_backend,
                command: std::env::var("VECTORIZER_COMMAND")
                    .unwrap_or_else(|_| DEFAULT_VECTORIZER_COMMAND.to_string()),
                url: std::env::var("VECTORIZER_URL").ok(),
                mounted_data_dir: std::env::var("MOUNTED_DATA_DIR").ok(),
                host_data_dir: std::env::var("HOST_DATA_DIR").ok(),
            },
            worker: WorkerConfig {
                mode,
                count: env_parse("WORKER_COUNT", 1),
            },
            test_mode,
            max_upload_size,
            allowed_extensions,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.matcher.distance_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "DISTANCE_SCORE_THRESHOLD must be a positive number, got {threshold}"
            )));
        }

        if self.matcher.embedding_size == 0 {
            return Err(ConfigError::ValidationError(
                "EMBEDDING_SIZE cannot be 0".to_string(),
            ));
        }

        if self.worker.mode.runs_workers() && self.worker.count == 0 {
            return Err(ConfigError::ValidationError(
                "WORKER_COUNT must be at least 1 when SERVICE_MODE runs workers".to_string(),
            ));
        }

        if self.queue.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "QUEUE_BATCH_SIZE cannot be 0".to_string(),
            ));
        }

        if matches!(self.storage.backend, StorageBackend::Gcs) && self.storage.gcs_bucket.is_none()
        {
            return Err(ConfigError::ValidationError(
                "GCS_BUCKET is required when STORAGE_BACKEND=gcs".to_string(),
            ));
        }

        if matches!(self.queue.backend, QueueBackend::PubSub) && self.queue.pubsub_project.is_none()
        {
            return Err(ConfigError::ValidationError(
                "PUBSUB_PROJECT is required when QUEUE_BACKEND=pubsub".to_string(),
            ));
        }

        match self.vectorizer.backend {
            VectorizerBackend::Command if self.vectorizer.command.trim().is_empty() => {
                return Err(ConfigError::ValidationError(
                    "VECTORIZER_COMMAND cannot be empty".to_string(),
                ));
            }
            VectorizerBackend::Http if self.vectorizer.url.is_none() => {
                return Err(ConfigError::ValidationError(
                    "VECTORIZER_URL is required when VECTORIZER_BACKEND=http".to_string(),
                ));
            }
            _ => {}
        }

        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::ValidationError(
                "ALLOWED_IMAGE_FILE_EXTENSIONS cannot be empty".to_string(),
            ));
        }

        if self.vectorizer.mounted_data_dir.is_some() != self.vectorizer.host_data_dir.is_some() {
            tracing::warn!(
                "Only one of MOUNTED_DATA_DIR and HOST_DATA_DIR is set; paths are passed unchanged"
            );
        }

        if matches!(self.queue.backend, QueueBackend::Local) && !self.worker.mode.runs_workers() {
            tracing::warn!(
                "QUEUE_BACKEND=local with SERVICE_MODE=api: only workers sharing DATA_DIR will see messages"
            );
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Accepts `,`, `_` or whitespace between entries; leading dots are dropped.
fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == '_' || c.is_whitespace())
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            node: NodeConfig {
                bind_address: "127.0.0.1:0".to_string(),
                data_dir: "./data".to_string(),
            },
            storage: StorageConfig::default(),
            queue: QueueConfig::default(),
            matcher: MatcherConfig::default(),
            vectorizer: VectorizerConfig::default(),
            worker: WorkerConfig::default(),
            test_mode: false,
            max_upload_size: 1024,
            allowed_extensions: parse_extensions("jpg,jpeg,png"),
        }
    }

    #[test]
    fn test_parse_extensions() {
        assert_eq!(parse_extensions("jpg,JPEG, .png"), vec!["jpg", "jpeg", "png"]);
        assert_eq!(parse_extensions("jpg_png"), vec!["jpg", "png"]);
        assert!(parse_extensions(" , ").is_empty());
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_threshold() {
        for threshold in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = valid();
            config.matcher.distance_threshold = threshold;
            assert!(config.validate().is_err(), "{threshold} accepted");
        }
    }

    #[test]
    fn test_worker_count_only_matters_for_workers() {
        let mut config = valid();
        config.worker.count = 0;
        assert!(config.validate().is_err());

        config.worker.mode = ServiceMode::Api;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backends_need_their_settings() {
        let mut config = valid();
        config.storage.backend = StorageBackend::Gcs;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.queue.backend = QueueBackend::PubSub;
        assert!(config.validate().is_err());
        config.queue.pubsub_project = Some("proj".to_string());
        assert!(config.validate().is_ok());

        let mut config = valid();
        config.vectorizer.backend = VectorizerBackend::Http;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.vectorizer.command = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.matcher.embedding_size = 0;
        assert!(config.validate().is_err());
    }
}
