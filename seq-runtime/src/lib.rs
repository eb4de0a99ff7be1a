//! # Seq Runtime
//!
//! 定时演出序列与事件门控的核心运行时库。
//!
//! ## 架构概述
//!
//! `seq-runtime` 是纯逻辑核心，不依赖任何 IO 或渲染引擎，也不创建线程。
//! 一切都在宿主的单一逻辑线程上，由宿主每帧调用一次 [`Session::advance`] 驱动：
//!
//! ```text
//! Host                               Runtime
//!   │── EventBus::publish ─────────►│ Gate 触发一次性变更 / owner 启动序列
//!   │                               │
//!   │── Session::advance(dt) ──────►│ SequenceScheduler 推进 → FadeTarget::apply
//!   │◄── Vec<SequenceEvent> ────────│
//! ```
//!
//! ## 核心类型
//!
//! - [`EventBus`]：显式的发布/订阅总线
//! - [`Curve`] / [`evaluate`]：纯函数曲线求值
//! - [`SequenceScheduler`]：协作式、可取消的多阶段序列
//! - [`GateController`]：至多触发一次的状态变更绑定
//! - [`IntensitySignal`] / [`ScanLineJitter`]：强度信号与抖动参数
//! - [`Session`]：会话与 tick 驱动
//!
//! ## 模块结构
//!
//! - [`bus`]：事件总线
//! - [`curve`]：曲线与插值
//! - [`sequence`]：序列与阶段定义
//! - [`scheduler`]：序列调度
//! - [`gate`]：门控
//! - [`jitter`]：强度信号
//! - [`interact`]：交互能力
//! - [`session`]：会话
//! - [`error`]：错误类型定义

pub mod bus;
pub mod curve;
pub mod error;
pub mod gate;
pub mod interact;
pub mod jitter;
pub mod scheduler;
pub mod sequence;
pub mod session;

// 重导出核心类型
pub use bus::{
    ChannelId, DeferGuard, Delivery, EventBus, HandlerFault, HandlerId, HandlerResult, Payload,
    Subscription,
};
pub use curve::{
    Color, Curve, Keyframe, KeyframeCurve, Lerp, StageValue, evaluate, fade_endpoints, interpolate,
};
pub use error::{BusError, GateError, SchedulerError, SeqError, SeqResult};
pub use gate::{GateController, GateId, GateState, Mutation};
pub use interact::{AgentRef, Interactable};
pub use jitter::{IntensitySignal, JitterSink, ScanLineJitter};
pub use scheduler::{
    Cursor, FINISHED_HISTORY, FadeTarget, OwnerId, SequenceEvent, SequenceScheduler,
};
pub use sequence::{Direction, Sequence, SequenceId, SequenceState, Span, Stage, Step};
pub use session::{Session, SharedScheduler};
