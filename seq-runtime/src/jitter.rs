//! # Jitter 模块
//!
//! 强度信号与扫描线抖动参数。
//!
//! 强度信号每个渲染 tick 消费一次，消费后归零；
//! 抖动参数公式保持与原效果逐位一致：
//!
//! ```text
//! threshold    = clamp(1 - intensity * 1.2, 0, 1)
//! displacement = intensity³ * 0.05
//! ```

/// 单通道强度信号，值始终在 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IntensitySignal {
    value: f32,
}

impl IntensitySignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入强度（截断到 [0, 1]，NaN 视为 0）
    pub fn set(&mut self, value: f32) {
        self.value = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        };
    }

    /// 当前强度
    pub fn value(&self) -> f32 {
        self.value
    }

    /// 消费本 tick 的强度并归零
    pub fn take(&mut self) -> f32 {
        std::mem::take(&mut self.value)
    }
}

/// 扫描线抖动参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanLineJitter {
    pub displacement: f32,
    pub threshold: f32,
}

impl ScanLineJitter {
    /// 由强度计算抖动参数
    pub fn from_intensity(intensity: f32) -> Self {
        let intensity = intensity.clamp(0.0, 1.0);
        Self {
            displacement: intensity.powi(3) * 0.05,
            threshold: (1.0 - intensity * 1.2).clamp(0.0, 1.0),
        }
    }
}

/// 视觉效果接收端（外部渲染管线）
pub trait JitterSink {
    fn write(&mut self, displacement: f32, threshold: f32);
}
