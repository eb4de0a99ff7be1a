//! # Host 层
//!
//! `seq-runtime` 的宿主层实现：场景对象、行为组件与 headless 驱动。
//!
//! ## 架构说明
//!
//! Host 层负责：
//! - 加载配置并构建场景对象注册表
//! - 初始化组件（开场文字、机房门锁、矿物放置、故障效果）
//! - 以固定 tick 推进会话并注入外部事件
//!
//! 序列推进、事件分发与 Gate 逻辑全部在 Runtime 中，Host 层只负责把它们接到场景对象上。

pub mod app;
pub mod components;
pub mod config;
pub mod error;
pub mod scene;

pub use app::{
    Action, AppState, JitterTrace, RunSummary, SceneLoader, TimedAction, Timeline, apply_action,
    run_headless, update,
};
pub use components::{GlitchyEffect, LockEngineRoom, OpeningTitleSequence, PlaceMinerals};
pub use config::{
    AppConfig, BindingConfig, ConfigError, DriverConfig, GlitchConfig, OpeningConfig, TitleConfig,
};
pub use error::{HostError, HostResult};
pub use scene::{Door, Scene, SceneError, SceneHook, SceneObject, Task, TextLabel};
