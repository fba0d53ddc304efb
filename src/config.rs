//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AUTOCHAT__*` 覆盖（双下划线表示嵌套，如 `AUTOCHAT__CHAT__MAX_TURNS=20`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub chat: ChatSection,
    #[serde(default)]
    pub user: UserSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
}

/// [service] 段：远端聊天服务地址、超时与轮询策略
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// 单次 HTTP 请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 发送消息后轮询回复状态的间隔（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
    #[serde(default = "default_persona_page_size")]
    pub persona_page_size: u32,
}

fn default_api_url() -> String {
    "https://vchars.onlyailabs.dev/api/v1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_max_attempts() -> u32 {
    100
}

fn default_persona_page_size() -> u32 {
    100
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_max_attempts: default_poll_max_attempts(),
            persona_page_size: default_persona_page_size(),
        }
    }
}

impl ServiceSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// [llm] 段：回复生成后端（Groq / OpenAI 兼容）
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：groq / openai
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "groq".to_string()
}

fn default_model() -> String {
    "llama3-8b-8192".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    150
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// [chat] 段：账号文件、开场白、角色预设与对话上限
#[derive(Debug, Clone, Deserialize)]
pub struct ChatSection {
    #[serde(default = "default_accounts_file")]
    pub accounts_file: PathBuf,
    #[serde(default = "default_opening_message")]
    pub opening_message: String,
    /// 预设角色 slug；设置后跳过交互选择
    pub persona: Option<String>,
    /// 单个账号最多对话轮数，0 表示不限
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_message_delay_ms")]
    pub message_delay_ms: u64,
    /// 是否在每轮消息之间等待 message_delay_ms
    #[serde(default)]
    pub enforce_message_delay: bool,
}

fn default_accounts_file() -> PathBuf {
    PathBuf::from("data.txt")
}

fn default_opening_message() -> String {
    "Hi!".to_string()
}

fn default_max_turns() -> usize {
    50
}

fn default_message_delay_ms() -> u64 {
    2000
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            accounts_file: default_accounts_file(),
            opening_message: default_opening_message(),
            persona: None,
            max_turns: default_max_turns(),
            message_delay_ms: default_message_delay_ms(),
            enforce_message_delay: false,
        }
    }
}

impl ChatSection {
    /// 实际生效的轮数上限；0 视为不限
    pub fn turn_limit(&self) -> Option<usize> {
        (self.max_turns > 0).then_some(self.max_turns)
    }

    /// 实际生效的消息间隔；未开启时为 None
    pub fn message_delay(&self) -> Option<Duration> {
        self.enforce_message_delay
            .then(|| Duration::from_millis(self.message_delay_ms))
    }
}

/// [user] 段：登录时提交的默认资料
#[derive(Debug, Clone, Deserialize)]
pub struct UserSection {
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default = "default_gender")]
    pub gender: String,
    #[serde(default = "default_gender_preferences")]
    pub gender_preferences: String,
    #[serde(default = "default_start_code")]
    pub default_start_code: String,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_gender() -> String {
    "non_binary".to_string()
}

fn default_gender_preferences() -> String {
    "all".to_string()
}

fn default_start_code() -> String {
    "marine_6944804952".to_string()
}

impl Default for UserSection {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            gender: default_gender(),
            gender_preferences: default_gender_preferences(),
            default_start_code: default_start_code(),
        }
    }
}

/// [schedule] 段：每日循环、失败重试与账号间隔（秒）
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSection {
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_account_delay_secs")]
    pub account_delay_secs: u64,
}

fn default_cycle_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_retry_interval_secs() -> u64 {
    60 * 60
}

fn default_account_delay_secs() -> u64 {
    5
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval_secs(),
            retry_interval_secs: default_retry_interval_secs(),
            account_delay_secs: default_account_delay_secs(),
        }
    }
}

/// 默认配置文件的候选位置（按顺序取第一个存在的）
const DEFAULT_CONFIG_CANDIDATES: [&str; 3] =
    ["config/default.toml", "../config/default.toml", "default.toml"];

/// 分层加载配置：默认文件 -> 显式指定的文件 -> 环境变量 AUTOCHAT__*（双下划线表示嵌套键）
///
/// 显式指定的文件不存在时返回 NotFound，而不是悄悄退回默认值。
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(default_file) = DEFAULT_CONFIG_CANDIDATES
        .iter()
        .map(Path::new)
        .find(|p| p.is_file())
    {
        tracing::debug!(path = %default_file.display(), "loading default config");
        builder = builder.add_source(config::File::from(default_file));
    }

    if let Some(path) = config_path {
        if !path.is_file() {
            return Err(config::ConfigError::NotFound(path.display().to_string()));
        }
        builder = builder.add_source(config::File::from(path));
    }

    builder
        .add_source(
            config::Environment::with_prefix("AUTOCHAT")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
