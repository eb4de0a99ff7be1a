//! # Components 模块
//!
//! 场景行为组件。每个组件在初始化时解析自己引用的场景对象与频道，
//! 之后只通过事件总线和调度器与外界交互。

mod engine_room;
mod glitch;
mod minerals;
mod opening;

pub use engine_room::LockEngineRoom;
pub use glitch::GlitchyEffect;
pub use minerals::PlaceMinerals;
pub use opening::{OpeningTitleSequence, opening_sequence, title_sequence};

/// 发电机关闭（触发标题揭示）
pub const SHUTDOWN_CHANNEL: &str = "generator-shutdown";

/// 故障强度采样（`Payload::Scalar`）
pub const GLITCH_INTENSITY_CHANNEL: &str = "glitch-intensity";

/// 矿物已放置
pub const MINERALS_PLACED_CHANNEL: &str = "minerals-placed";
