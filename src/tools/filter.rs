//! 工具白名单

use serde::{Deserialize, Serialize};

/// 工具过滤器：All 为显式的“全部允许”哨兵，Only 为白名单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ToolFilter {
    #[default]
    All,
    Only(Vec<String>),
}

impl ToolFilter {
    /// 空列表映射为 All
    pub fn from_allow_list(names: &[String]) -> Self {
        let names: Vec<String> = names
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            ToolFilter::All
        } else {
            ToolFilter::Only(names)
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        match self {
            ToolFilter::All => true,
            ToolFilter::Only(names) => names.iter().any(|n| n == name),
        }
    }
}
