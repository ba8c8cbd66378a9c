//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__PROVIDER=openai`）。
//! 重试上限与工具轮次预算按可配置处理，默认取最保守的有限终止解释。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub manager: ManagerSection,
}

/// [app] 段：应用名与记忆目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 记忆目录（长期库 + 向量存储文件），未设置时用 ./memory
    pub memory_dir: Option<PathBuf>,
}

impl AppSection {
    pub fn memory_dir(&self) -> PathBuf {
        self.memory_dir.clone().unwrap_or_else(|| PathBuf::from("./memory"))
    }
}

/// [llm] 段：后端选择、嵌入模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock；无 API Key 时自动退回 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 相似度记忆使用的嵌入模型
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            embedding_model: default_embedding_model(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [tools] 段：工具超时、Search 端点、Notify 超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub notify: NotifySection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            search: SearchSection::default(),
            notify: NotifySection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [tools.search] 段：搜索 API 端点、请求超时、返回条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_search_max_results")]
    pub max_results: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            timeout_secs: default_search_timeout_secs(),
            max_results: default_search_max_results(),
        }
    }
}

fn default_search_endpoint() -> String {
    crate::tools::DEFAULT_SEARCH_ENDPOINT.to_string()
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_search_max_results() -> usize {
    10
}

/// [tools.notify] 段：推送请求超时（凭据走 PUSHOVER_* 环境变量）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            timeout_secs: default_notify_timeout_secs(),
        }
    }
}

fn default_notify_timeout_secs() -> u64 {
    10
}

/// [manager] 段：Schema 违例重试上限与单任务工具轮次预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerSection {
    #[serde(default = "default_schema_retry_limit")]
    pub schema_retry_limit: usize,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            schema_retry_limit: default_schema_retry_limit(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

fn default_schema_retry_limit() -> usize {
    1
}

fn default_max_tool_rounds() -> usize {
    6
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            tools: ToolsSection::default(),
            manager: ManagerSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
