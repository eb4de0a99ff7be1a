//! # Error 模块
//!
//! 定义 seq-runtime 中使用的错误类型。
//!
//! 这里只有“配置类”错误会被返回给调用方：
//! 时长非正、同一 owner 上重复启动序列、handler 执行失败都在内部恢复，不会冒泡。

use thiserror::Error;

use crate::bus::ChannelId;
use crate::scheduler::OwnerId;

/// 事件总线错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    /// 频道未注册
    #[error("频道 {channel} 未在总线上注册")]
    UnknownChannel { channel: ChannelId },

    /// 频道名为空
    #[error("频道名不能为空")]
    EmptyChannelName,
}

/// 序列调度错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// owner 未注册
    #[error("{owner} 未注册")]
    UnknownOwner { owner: OwnerId },

    /// owner 已停用
    #[error("{owner} 已停用，不能启动新序列")]
    OwnerInactive { owner: OwnerId },

    /// 目标已被其他 owner 独占
    #[error("目标已被 {owner} 独占")]
    TargetAlreadyOwned { owner: OwnerId },

    /// 空序列
    #[error("序列 '{name}' 不包含任何步骤")]
    EmptySequence { name: String },
}

/// Gate 绑定错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    /// 变更集合为空
    #[error("Gate '{label}' 的变更集合为空")]
    EmptyMutationSet { label: String },

    /// 绑定的频道无效
    #[error("Gate '{label}' 绑定失败: {source}")]
    Channel {
        label: String,
        #[source]
        source: BusError,
    },
}

/// seq-runtime 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeqError {
    /// 总线错误
    #[error("总线错误: {0}")]
    Bus(#[from] BusError),

    /// 调度错误
    #[error("调度错误: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Gate 错误
    #[error("Gate 错误: {0}")]
    Gate(#[from] GateError),
}

/// Result 类型别名
pub type SeqResult<T> = Result<T, SeqError>;
