//! # Interact 模块
//!
//! 外部输入系统调用的交互能力。

use serde::{Deserialize, Serialize};

/// 发起交互的主体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRef {
    pub name: String,
}

impl AgentRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// 可交互对象
pub trait Interactable {
    fn interact(&mut self, agent: &AgentRef);
}
