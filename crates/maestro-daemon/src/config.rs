//! Configuration for maestro-daemon

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Defaults applied to deployment requests
    pub defaults: DefaultsConfig,

    /// Collaborator endpoints
    pub collaborators: CollaboratorsConfig,

    /// Engine timing
    pub engine: EngineSection,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            defaults: DefaultsConfig::default(),
            collaborators: CollaboratorsConfig::default(),
            engine: EngineSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".parse().unwrap(),
            enable_cors: true,
        }
    }
}

/// Defaults applied when a request leaves them out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Region deployed to when the request names none
    pub region: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            region: "eu-west-1".to_string(),
        }
    }
}

/// Collaborator endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    /// Asgard base url per region
    pub asgard: HashMap<String, String>,

    /// Application registry base url
    pub onix_url: String,

    /// Configuration service base url
    pub tyranitar_url: String,

    /// Policy-configuration service base url
    pub shuppet_url: String,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        let mut asgard = HashMap::new();
        asgard.insert(
            "eu-west-1".to_string(),
            "http://asgard.eu-west-1.example.com:8080".to_string(),
        );
        Self {
            asgard,
            onix_url: "http://onix.example.com:8080".to_string(),
            tyranitar_url: "http://tyranitar.example.com:8080".to_string(),
            shuppet_url: "http://shuppet.example.com:8080".to_string(),
        }
    }
}

/// Engine timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Seconds between remote-task observations and health polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Tick budget for one remote task
    #[serde(default = "default_tracker_budget")]
    pub tracker_budget_ticks: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            tracker_budget_ticks: 3600,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    1
}

fn default_tracker_budget() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then an optional file, then
    /// MAESTRO_-prefixed environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MAESTRO")
                .separator("_")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// The engine timing this configuration asks for.
    pub fn engine_config(&self) -> maestro_engine::EngineConfig {
        maestro_engine::EngineConfig {
            poll_interval: std::time::Duration::from_secs(self.engine.poll_interval_secs),
            tracker_budget_ticks: self.engine.tracker_budget_ticks,
        }
    }
}
