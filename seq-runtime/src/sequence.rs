//! # Sequence 模块
//!
//! 多阶段定时序列的数据定义。
//!
//! 一个 [`Sequence`] 是按顺序执行的 [`Step`] 列表：
//!
//! ```text
//! Wait(0.5) ─► Fade(clear → white, 0.5s) ─► Wait(2.5) ─► Fade(white → clear, 0.5s) ─► Wait(0.5)
//! ```
//!
//! 序列本身不持有运行状态，运行状态（当前步骤索引 + 步骤内已用时间）由调度器保存。

use serde::{Deserialize, Serialize};

use crate::curve::{self, Color, Curve, StageValue, evaluate, fade_endpoints};

/// 序列 ID（由调度器在启动时分配）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId(pub(crate) u64);

impl SequenceId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SequenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SequenceId({})", self.0)
    }
}

/// 序列状态
///
/// ```text
/// Idle ──start──► Running ──最后一步结束──► Completed
///                    │
///                    └──cancel / 新序列抢占 / owner 停用──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceState {
    #[default]
    Idle,
    Running,
    Cancelled,
    Completed,
}

impl SequenceState {
    /// 是否已结束（终态）
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }
}

/// 阶段方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// start → end
    #[default]
    Forward,
    /// end → start
    Reverse,
}

/// 阶段的取值区间
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Span {
    Scalar { from: f32, to: f32 },
    Color { from: Color, to: Color },
}

/// 单个定时阶段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// 时长（秒）；`<= 0` 时立即取终值
    pub duration: f32,
    pub span: Span,
    #[serde(default)]
    pub curve: Curve,
    #[serde(default)]
    pub direction: Direction,
}

impl Stage {
    /// 数值阶段
    pub fn scalar(from: f32, to: f32, duration: f32) -> Self {
        Self {
            duration,
            span: Span::Scalar { from, to },
            curve: Curve::default(),
            direction: Direction::Forward,
        }
    }

    /// 颜色阶段
    pub fn color(from: Color, to: Color, duration: f32) -> Self {
        Self {
            duration,
            span: Span::Color { from, to },
            curve: Curve::default(),
            direction: Direction::Forward,
        }
    }

    /// 设置曲线
    pub fn with_curve(mut self, curve: Curve) -> Self {
        self.curve = curve;
        self
    }

    /// 设置方向
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// 反向播放（朝 start 方向）
    pub fn reversed(self) -> Self {
        self.with_direction(Direction::Reverse)
    }

    /// 按方向整理后的起止值
    fn endpoints(&self) -> (StageValue, StageValue) {
        let (a, b) = match self.span {
            Span::Scalar { from, to } => (StageValue::Scalar(from), StageValue::Scalar(to)),
            Span::Color { from, to } => {
                let (from, to) = fade_endpoints(from, to);
                (StageValue::Color(from), StageValue::Color(to))
            }
        };
        match self.direction {
            Direction::Forward => (a, b),
            Direction::Reverse => (b, a),
        }
    }

    /// 阶段开始时的值
    pub fn start_value(&self) -> StageValue {
        self.endpoints().0
    }

    /// 阶段结束时的值
    pub fn end_value(&self) -> StageValue {
        self.endpoints().1
    }

    /// 已用时间 `elapsed` 处的值；`elapsed >= duration` 时精确等于终值
    pub fn value_at(&self, elapsed: f32) -> StageValue {
        let t = evaluate(&self.curve, elapsed, self.duration);
        match self.endpoints() {
            (StageValue::Scalar(a), StageValue::Scalar(b)) => {
                StageValue::Scalar(curve::interpolate(a, b, t))
            }
            (StageValue::Color(a), StageValue::Color(b)) => {
                StageValue::Color(curve::interpolate(a, b, t))
            }
            // endpoints() 总是返回同类型的一对值
            (_, end) => end,
        }
    }
}

/// 序列中的一步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// 等待（秒）
    Wait(f32),
    /// 执行一个阶段
    Fade(Stage),
}

impl Step {
    /// 这一步的时长（非正值按 0 计）
    pub fn duration(&self) -> f32 {
        match self {
            Step::Wait(secs) => secs.max(0.0),
            Step::Fade(stage) => stage.duration.max(0.0),
        }
    }
}

/// 多阶段序列
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Sequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// 追加等待
    pub fn wait(mut self, secs: f32) -> Self {
        self.steps.push(Step::Wait(secs));
        self
    }

    /// 追加阶段
    pub fn fade(mut self, stage: Stage) -> Self {
        self.steps.push(Step::Fade(stage));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// 所有步骤的总时长
    pub fn total_duration(&self) -> f32 {
        self.steps.iter().map(Step::duration).sum()
    }
}
