//! 认知层：ReAct 推理循环（prompt 拼装、输出解析、工具调度、步数上限）

pub mod events;
pub mod loop_;
pub mod parser;
pub mod prompt;
pub mod types;

pub use events::ReactEvent;
pub use loop_::{ReasoningLoop, RunOptions};
pub use parser::{extract_action_input, match_braces, parse_react_output};
pub use types::{AgentResponse, ReasoningStep};
