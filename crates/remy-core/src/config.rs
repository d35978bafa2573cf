use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{RemyError, Result};
use crate::types::UserId;

pub const DEFAULT_PORT: u16 = 8790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 5;
pub const DEFAULT_FACT_MERGE_THRESHOLD: f32 = 0.15;

/// Top-level config (`remy.toml` + `REMY_*` env overrides), grounded in the
/// teacher's `SkynetConfig::load` figment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemyConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Allow-listed user ids; any other caller is rejected at the gateway boundary.
    #[serde(default)]
    pub allowed_users: Vec<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enables `GET /metrics` (Prometheus exposition). Optional per spec §6.
    #[serde(default)]
    pub metrics_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            metrics_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Primary model name (vendor SDK, tool-use capable).
    pub primary_model: String,
    /// Alt-A model name (OpenAI-style SSE, no tools).
    pub alt_a_model: Option<String>,
    /// Alt-B model name (second OpenAI-compatible SSE provider).
    pub alt_b_model: Option<String>,
    /// Local fallback model name (served by the local Ollama-style endpoint).
    #[serde(default = "default_local_model")]
    pub local_model: String,
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Sliding window, in seconds, for the per-user rate limiter.
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,
    /// IANA tz database name used to evaluate cron expressions and to render
    /// the briefing/check-in timestamps in local time.
    #[serde(default = "default_timezone")]
    pub local_timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub primary: Option<ProviderCredentials>,
    pub alt_a: Option<ProviderCredentials>,
    pub alt_b: Option<ProviderCredentials>,
    #[serde(default = "default_local_base_url")]
    pub local_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub api_key: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DatabaseConfig {
    pub fn knowledge_db_path(&self) -> String {
        format!("{}/knowledge.db", self.data_dir)
    }

    pub fn sessions_dir(&self) -> String {
        format!("{}/sessions", self.data_dir)
    }

    pub fn logs_dir(&self) -> String {
        format!("{}/logs", self.data_dir)
    }

    pub fn delivery_db_path(&self) -> String {
        format!("{}/delivery.db", self.data_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Per-category semantic-merge cosine-distance threshold. The bare
    /// default applies to any category without an explicit override.
    #[serde(default = "default_fact_merge_threshold")]
    pub fact_merge_threshold: f32,
    #[serde(default)]
    pub fact_merge_threshold_overrides: HashMap<String, f32>,
    #[serde(default = "default_true")]
    pub nightly_reindex_enabled: bool,
    #[serde(default = "default_injector_max_chars")]
    pub injector_max_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            fact_merge_threshold: default_fact_merge_threshold(),
            fact_merge_threshold_overrides: HashMap::new(),
            nightly_reindex_enabled: default_true(),
            injector_max_chars: default_injector_max_chars(),
        }
    }
}

impl MemoryConfig {
    pub fn threshold_for_category(&self, category: &str) -> f32 {
        self.fact_merge_threshold_overrides
            .get(category)
            .copied()
            .unwrap_or(self.fact_merge_threshold)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_briefing_cron")]
    pub morning_briefing_cron: String,
    #[serde(default = "default_checkin_cron")]
    pub evening_checkin_cron: String,
    #[serde(default = "default_consolidation_cron")]
    pub nightly_consolidation_cron: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            morning_briefing_cron: default_briefing_cron(),
            evening_checkin_cron: default_checkin_cron(),
            nightly_consolidation_cron: default_consolidation_cron(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_retry_count")]
    pub max_attempts: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_attempts: default_retry_count(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    /// Base directories the file-adjacent tools (external collaborators)
    /// are permitted to touch. Enforced at the tool-registry boundary.
    #[serde(default)]
    pub allowed_base_dirs: Vec<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_local_model() -> String {
    "llama3.1".to_string()
}
fn default_max_tool_iterations() -> u32 {
    DEFAULT_MAX_TOOL_ITERATIONS
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_rate_limit_window_secs() -> u64 {
    60
}
fn default_rate_limit_max_requests() -> u32 {
    20
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_local_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.remy", home)
}
fn default_fact_merge_threshold() -> f32 {
    DEFAULT_FACT_MERGE_THRESHOLD
}
fn default_true() -> bool {
    true
}
fn default_injector_max_chars() -> usize {
    4000
}
fn default_briefing_cron() -> String {
    "0 7 * * *".to_string()
}
fn default_checkin_cron() -> String {
    "0 19 * * *".to_string()
}
fn default_consolidation_cron() -> String {
    "0 3 * * *".to_string()
}
fn default_poll_interval_secs() -> u64 {
    1
}
fn default_retention_days() -> i64 {
    7
}

impl RemyConfig {
    /// Load config from a TOML file with `REMY_*` env var overrides,
    /// grounded in the teacher's `Figment::new().merge(Toml).merge(Env)` pipeline.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.map(String::from).unwrap_or_else(default_config_path);

        let config: RemyConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("REMY_").split("_"))
            .extract()
            .map_err(|e| RemyError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn is_allowed(&self, user: &UserId) -> bool {
        self.allowed_users.iter().any(|u| u == user)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.remy/remy.toml", home)
}
