use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{DeskPilotError, DeskPilotResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (falls back to env var DESKPILOT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Upper bound on one request, streamed body included.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// Maps engine roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Turns an intent into a JSON action plan.
    pub planning: Option<RoleEntry>,
    /// Screen analysis and text extraction from screenshots.
    pub vision: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
}

fn default_temperature() -> f64 {
    0.1
}

/// Screen rectangle in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x
            && py >= self.y
            && (px as i64) < self.x as i64 + self.width as i64
            && (py as i64) < self.y as i64 + self.height as i64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub sandbox_mode: bool,
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
    #[serde(default = "default_forbidden_hotkeys")]
    pub forbidden_hotkeys: Vec<String>,
    #[serde(default = "default_dangerous_patterns")]
    pub dangerous_patterns: Vec<String>,
    #[serde(default = "default_pointer_rate")]
    pub max_pointer_actions_per_minute: u32,
    #[serde(default = "default_key_rate")]
    pub max_key_actions_per_minute: u32,
    #[serde(default = "default_sandbox_text_length")]
    pub max_sandbox_text_length: usize,
    #[serde(default)]
    pub forbidden_regions: Vec<Rect>,
}

fn default_screen_width() -> u32 {
    1920
}

fn default_screen_height() -> u32 {
    1080
}

fn default_forbidden_hotkeys() -> Vec<String> {
    [
        "ctrl+alt+delete",
        "ctrl+shift+escape",
        "win+l",
        "win+r",
        "cmd+alt+escape",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_dangerous_patterns() -> Vec<String> {
    [
        "rm -rf",
        "format c:",
        "del /f",
        "del /s",
        "mkfs",
        "shutdown",
        "reboot",
        "sudo ",
        ":(){",
        "drop table",
        "powershell -enc",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_pointer_rate() -> u32 {
    120
}

fn default_key_rate() -> u32 {
    300
}

fn default_sandbox_text_length() -> usize {
    1000
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            sandbox_mode: false,
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            forbidden_hotkeys: default_forbidden_hotkeys(),
            dangerous_patterns: default_dangerous_patterns(),
            max_pointer_actions_per_minute: default_pointer_rate(),
            max_key_actions_per_minute: default_key_rate(),
            max_sandbox_text_length: default_sandbox_text_length(),
            forbidden_regions: Vec::new(),
        }
    }
}

/// Whether the executor asks before running a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Block on the confirmation callback; no callback means no run.
    #[default]
    Confirm,
    /// Skip the confirmation gate entirely.
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default = "default_inter_action_pause_ms")]
    pub inter_action_pause_ms: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_sequence_timeout_secs")]
    pub sequence_timeout_secs: u64,
    #[serde(default = "default_action_timeout_secs")]
    pub default_action_timeout_secs: f64,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    #[serde(default)]
    pub history_enabled: bool,
}

fn default_inter_action_pause_ms() -> u64 {
    500
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_sequence_timeout_secs() -> u64 {
    300
}

fn default_action_timeout_secs() -> f64 {
    30.0
}

fn default_max_retries() -> u32 {
    2
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            inter_action_pause_ms: default_inter_action_pause_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            sequence_timeout_secs: default_sequence_timeout_secs(),
            default_action_timeout_secs: default_action_timeout_secs(),
            default_max_retries: default_max_retries(),
            history_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// App name used by fallback plans that need a web browser.
    #[serde(default = "default_browser")]
    pub default_browser: String,
}

fn default_browser() -> String {
    "chrome".to_string()
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_browser: default_browser(),
        }
    }
}

fn resolve_config_path() -> DeskPilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("deskpilot").join("config.toml");
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(DeskPilotError::Config(
        "config.toml not found next to executable, in working directory or user config dir".into(),
    ))
}

pub fn load_config_from(path: &std::path::Path) -> DeskPilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        provider = %config.llm.active_provider,
        sandbox = config.security.sandbox_mode,
        "config loaded"
    );
    Ok(config)
}

pub fn load_config() -> DeskPilotResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

/// Like [`load_config`], but a missing file yields defaults instead of an error.
pub fn load_config_or_default() -> DeskPilotResult<AppConfig> {
    match resolve_config_path() {
        Ok(path) => load_config_from(&path),
        Err(DeskPilotError::Config(msg)) => {
            tracing::warn!(reason = %msg, "using default config");
            Ok(AppConfig::default())
        }
        Err(e) => Err(e),
    }
}

pub fn save_config_to(config: &AppConfig, path: &std::path::Path) -> DeskPilotResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

pub fn save_config(config: &AppConfig) -> DeskPilotResult<()> {
    let path = resolve_config_path()?;
    save_config_to(config, &path)
}
