//! # Curve 模块
//!
//! 淡入淡出曲线求值：纯函数，不持有任何状态。
//!
//! - [`evaluate`]: `(curve, elapsed, duration) -> t ∈ [0, 1]`
//! - [`interpolate`]: `(start, end, t) -> value`
//!
//! `elapsed >= duration` 时直接返回 1.0，而不是曲线在末端附近的近似值，
//! 长时间累加 dt 造成的浮点漂移因此不会影响最终值。

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// 缓动曲线
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curve {
    /// 线性
    Linear,
    /// 二次缓入
    EaseInQuad,
    /// 二次缓出
    EaseOutQuad,
    /// 三次缓入
    EaseInCubic,
    /// 三次缓出
    EaseOutCubic,
    /// 三次缓入缓出
    #[default]
    EaseInOut,
    /// 正弦缓入缓出
    EaseInOutSine,
    /// smoothstep（3t² - 2t³）
    SmoothStep,
    /// 弹性缓出（求值结果会被截断到 [0, 1]）
    EaseOutElastic,
    /// 弹跳缓出
    EaseOutBounce,
    /// 关键帧曲线
    Keyframes(KeyframeCurve),
}

impl Curve {
    /// 计算曲线在归一化时间 `t` 处的值（t 先被截断到 [0, 1]）
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Curve::Linear => t,
            Curve::EaseInQuad => t * t,
            Curve::EaseOutQuad => t * (2.0 - t),
            Curve::EaseInCubic => t * t * t,
            Curve::EaseOutCubic => 1.0 - (1.0 - t).powi(3),
            Curve::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Curve::EaseInOutSine => (1.0 - (PI * t).cos()) / 2.0,
            Curve::SmoothStep => t * t * (3.0 - 2.0 * t),
            Curve::EaseOutElastic => elastic_out(t),
            Curve::EaseOutBounce => bounce_out(t),
            Curve::Keyframes(keys) => keys.sample(t),
        }
    }
}

fn elastic_out(t: f32) -> f32 {
    if t <= 0.0 || t >= 1.0 {
        return t;
    }
    let period = (2.0 * PI) / 3.0;
    2.0_f32.powf(-10.0 * t) * ((t * 10.0 - 0.75) * period).sin() + 1.0
}

fn bounce_out(t: f32) -> f32 {
    const N: f32 = 7.5625;
    const D: f32 = 2.75;

    if t < 1.0 / D {
        N * t * t
    } else if t < 2.0 / D {
        let t = t - 1.5 / D;
        N * t * t + 0.75
    } else if t < 2.5 / D {
        let t = t - 2.25 / D;
        N * t * t + 0.9375
    } else {
        let t = t - 2.625 / D;
        N * t * t + 0.984375
    }
}

/// 关键帧
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// 归一化时间 (0.0 - 1.0)
    pub time: f32,
    /// 该时间点的值
    pub value: f32,
}

impl Keyframe {
    pub fn new(time: f32, value: f32) -> Self {
        Self { time, value }
    }
}

/// 关键帧曲线：按时间排序的关键帧之间做线性插值
///
/// 第一个关键帧之前取首帧值，最后一个关键帧之后取末帧值。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Keyframe>", into = "Vec<Keyframe>")]
pub struct KeyframeCurve {
    keys: Vec<Keyframe>,
}

impl KeyframeCurve {
    /// 创建关键帧曲线（自动按时间排序）
    pub fn new(mut keys: Vec<Keyframe>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    /// 在时间 `t` 处采样；没有关键帧时退化为线性
    pub fn sample(&self, t: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return t;
        };
        if t <= first.time {
            return first.value;
        }
        if t >= last.time {
            return last.value;
        }

        // keys 已排序且 first.time < t < last.time，必然存在相邻区间
        let upper = self.keys.partition_point(|k| k.time <= t);
        let a = self.keys[upper - 1];
        let b = self.keys[upper];
        let span = b.time - a.time;
        if span <= f32::EPSILON {
            return b.value;
        }
        a.value + (b.value - a.value) * ((t - a.time) / span)
    }
}

impl From<Vec<Keyframe>> for KeyframeCurve {
    fn from(keys: Vec<Keyframe>) -> Self {
        Self::new(keys)
    }
}

impl From<KeyframeCurve> for Vec<Keyframe> {
    fn from(curve: KeyframeCurve) -> Self {
        curve.keys
    }
}

/// 求值：`elapsed` 时刻在 `duration` 内的曲线进度
///
/// - `duration <= 0` 或 `elapsed >= duration`: 精确返回 1.0
/// - `elapsed <= 0`: 精确返回 0.0
/// - 其余情况: `curve.apply(elapsed / duration)`，结果截断到 [0, 1]
pub fn evaluate(curve: &Curve, elapsed: f32, duration: f32) -> f32 {
    if duration <= 0.0 || elapsed >= duration {
        return 1.0;
    }
    if elapsed <= 0.0 {
        return 0.0;
    }
    curve.apply(elapsed / duration).clamp(0.0, 1.0)
}

/// 线性插值
pub trait Lerp: Copy {
    fn lerp(self, other: Self, t: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Lerp for Color {
    fn lerp(self, other: Self, t: f32) -> Self {
        Color {
            r: self.r.lerp(other.r, t),
            g: self.g.lerp(other.g, t),
            b: self.b.lerp(other.b, t),
            a: self.a.lerp(other.a, t),
        }
    }
}

/// 在 `start` 与 `end` 之间按 `t` 插值；`t >= 1` 时精确返回 `end`
pub fn interpolate<T: Lerp>(start: T, end: T, t: f32) -> T {
    if t >= 1.0 {
        end
    } else if t <= 0.0 {
        start
    } else {
        start.lerp(end, t)
    }
}

/// RGBA 颜色（各通道 0.0 - 1.0）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Color {
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    /// 全透明（黑色通道）
    pub const CLEAR: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// 替换 alpha
    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// 是否完全透明
    pub fn is_transparent(&self) -> bool {
        self.a <= 0.0
    }
}

/// 整理颜色淡入淡出的两个端点
///
/// 某个端点完全透明时，它的 RGB 被替换为另一端点的 RGB，
/// 这样只改变 alpha 的淡入淡出不会出现色相偏移。
pub fn fade_endpoints(start: Color, end: Color) -> (Color, Color) {
    match (start.is_transparent(), end.is_transparent()) {
        (true, false) => (end.with_alpha(start.a), end),
        (false, true) => (start, start.with_alpha(end.a)),
        _ => (start, end),
    }
}

/// 阶段插值值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StageValue {
    Scalar(f32),
    Color(Color),
}

impl StageValue {
    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            StageValue::Scalar(v) => Some(*v),
            StageValue::Color(_) => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            StageValue::Color(c) => Some(*c),
            StageValue::Scalar(_) => None,
        }
    }
}
