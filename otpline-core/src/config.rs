use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct OtplineConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub expiry_sweep: ExpirySweepConfig,
    #[serde(default)]
    pub dev: DevConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

impl ServiceConfig {
    /// Socket path with `~` and `$VAR` expanded.
    pub fn expanded_socket_path(&self) -> String {
        shellexpand::full(&self.socket_path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| self.socket_path.clone())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    pub url: String,
    pub max_connections: u32,
    #[serde(default)]
    pub apply_schema: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Webhook ingestion tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Width of the time bucket used in content-hash dedupe keys when the
    /// provider does not supply a message id.
    pub dedupe_window_seconds: u64,
    pub transition_max_retries: usize,
    pub transition_retry_delay_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dedupe_window_seconds: 300,
            transition_max_retries: 3,
            transition_retry_delay_ms: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExpirySweepConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for ExpirySweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DevConfig {
    pub enable_test_routes: bool,
    pub test_number: String,
    pub test_user_id: uuid::Uuid,
    pub test_country: String,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            enable_test_routes: false,
            test_number: "+14243800358".to_string(),
            test_user_id: uuid::Uuid::nil(),
            test_country: "US".to_string(),
        }
    }
}

impl OtplineConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("OTPLINE").separator("__"))
            .build()?;
        s.try_deserialize()
    }

    /// In-memory configuration used by tests and `--memory` runs.
    pub fn for_memory() -> Self {
        Self {
            service: ServiceConfig {
                socket_path: "/tmp/otpline.sock".to_string(),
                log_level: "info".to_string(),
            },
            database: DatabaseConfig {
                backend: StorageBackend::Memory,
                url: String::new(),
                max_connections: 1,
                apply_schema: false,
            },
            http: HttpConfig::default(),
            ingest: IngestConfig::default(),
            expiry_sweep: ExpirySweepConfig::default(),
            dev: DevConfig::default(),
        }
    }
}
