//! 工具层：Tool trait、注册表、白名单、执行器与内置工具（echo / current_time / delegate / spawn）

pub mod delegate;
pub mod echo;
pub mod executor;
pub mod filter;
pub mod registry;

pub use delegate::{DelegateTool, Delegator, DelegatorHandle, SpawnTool};
pub use echo::{CurrentTimeTool, EchoTool};
pub use executor::{observation_text, ToolExecutor};
pub use filter::ToolFilter;
pub use registry::{Tool, ToolRegistry};
