use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::board::VariantResolver;
use crate::jobs::BoardJobSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// SQLite file holding the job records. Defaults to
    /// `~/.atelier/data/atelier.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            analysis: AnalysisConfig::default(),
            auth: AuthConfig::default(),
            board: BoardConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}

impl Config {
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Analysis endpoint; the host refuses to start without one.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl AnalysisConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Where credentials come from. Token values are never stored in the
/// config file, only the names of the environment variables holding them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default = "default_refresh_token_env")]
    pub refresh_token_env: String,
    #[serde(default = "default_id_token_env")]
    pub id_token_env: String,
    /// Token for the board provider, forwarded to `board.pins_endpoint`.
    #[serde(default = "default_board_token_env")]
    pub board_token_env: String,
}

fn default_refresh_token_env() -> String {
    "ATELIER_REFRESH_TOKEN".to_string()
}

fn default_id_token_env() -> String {
    "ATELIER_ID_TOKEN".to_string()
}

fn default_board_token_env() -> String {
    "ATELIER_BOARD_TOKEN".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: None,
            refresh_token_env: default_refresh_token_env(),
            id_token_env: default_id_token_env(),
            board_token_env: default_board_token_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default = "default_sample_cap")]
    pub sample_cap: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_preferred_variants")]
    pub preferred_variants: Vec<String>,
    #[serde(default = "default_max_variant_width")]
    pub max_variant_width: u32,
    #[serde(default = "default_max_fetch_items")]
    pub max_fetch_items: usize,
    /// Endpoint returning board items page by page. Used when a board job
    /// is started without candidate items.
    #[serde(default)]
    pub pins_endpoint: Option<String>,
}

fn default_sample_cap() -> usize {
    8
}

fn default_batch_size() -> usize {
    3
}

fn default_batch_delay_ms() -> u64 {
    200
}

fn default_preferred_variants() -> Vec<String> {
    vec!["600x".to_string(), "400x300".to_string()]
}

fn default_max_variant_width() -> u32 {
    1200
}

fn default_max_fetch_items() -> usize {
    100
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            sample_cap: default_sample_cap(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            preferred_variants: default_preferred_variants(),
            max_variant_width: default_max_variant_width(),
            max_fetch_items: default_max_fetch_items(),
            pins_endpoint: None,
        }
    }
}

impl BoardConfig {
    pub fn job_settings(&self) -> BoardJobSettings {
        BoardJobSettings {
            sample_cap: self.sample_cap,
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
        }
    }

    pub fn resolver(&self) -> VariantResolver {
        VariantResolver::new(self.preferred_variants.clone(), self.max_variant_width)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    500
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
