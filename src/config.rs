//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SWARM__*` 覆盖（双下划线表示嵌套，如 `SWARM__AGENT__MAX_ITERATIONS=8`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub workflow: WorkflowSection,
    #[serde(default)]
    pub llm: LlmSection,
}

/// [agent] 段：顶层对话的推理循环
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 单次对话最大推理步数
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// 拼 prompt 时读取的最近消息条数
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            history_window: default_history_window(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_max_iterations() -> usize {
    5
}

fn default_history_window() -> usize {
    10
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [orchestrator] 段：子 Agent 委派
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// 子 Agent 推理步数上限（比顶层更严格）
    #[serde(default = "default_sub_agent_max_iterations")]
    pub sub_agent_max_iterations: usize,
    /// 同时运行的子 Agent 数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            sub_agent_max_iterations: default_sub_agent_max_iterations(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_sub_agent_max_iterations() -> usize {
    3
}

fn default_max_concurrent() -> usize {
    4
}

/// [workflow] 段：DAG 执行器
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    /// 等待同批步骤时的轮询间隔（毫秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 每个步骤的推理步数上限
    #[serde(default = "default_sub_agent_max_iterations")]
    pub step_max_iterations: usize,
    /// 设置后使用 JSON 文件存储工作流，否则使用内存存储
    pub store_dir: Option<PathBuf>,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            step_max_iterations: default_sub_agent_max_iterations(),
            store_dir: None,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// [llm] 段：默认模型与按角色的模型路由
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    pub default_model: Option<String>,
    pub code_model: Option<String>,
    pub reasoning_model: Option<String>,
    pub summary_model: Option<String>,
    pub fast_model: Option<String>,
}

/// 从 config 目录加载配置，环境变量 SWARM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SWARM__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("SWARM")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 加载失败时记录告警并回落到默认配置
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}
