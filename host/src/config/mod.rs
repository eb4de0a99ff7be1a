//! # Config 模块
//!
//! 运行时配置管理，集中管理所有配置项。
//!
//! ## 配置优先级
//!
//! 1. 命令行参数（最高）
//! 2. 配置文件 (config.json)
//! 3. 默认值（最低）

use serde::{Deserialize, Serialize};
use seq_runtime::{Color, Curve};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 开场文字序列
    #[serde(default)]
    pub opening: OpeningConfig,

    /// 标题揭示序列
    #[serde(default)]
    pub title: TitleConfig,

    /// 故障效果
    #[serde(default)]
    pub glitch: GlitchConfig,

    /// headless 驱动
    #[serde(default)]
    pub driver: DriverConfig,

    /// 组件引用的场景对象名
    #[serde(default)]
    pub bindings: BindingConfig,
}

/// 开场文字配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningConfig {
    /// 淡入/淡出时长（秒）
    #[serde(default = "default_fade_time")]
    pub fade_time: f32,

    /// 完全显示后的停留时长（秒）
    #[serde(default = "default_hold_time")]
    pub hold_time: f32,

    /// 序列首尾的等待时长（秒）
    ///
    /// 未配置时等于 `fade_time`；设为 0 则序列总时长为 `2 * fade_time + hold_time`。
    #[serde(default)]
    pub edge_wait: Option<f32>,

    #[serde(default)]
    pub text_color: Color,

    #[serde(default)]
    pub curve: Curve,
}

/// 标题配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleConfig {
    /// 淡入前、淡出前的等待时长（秒）
    #[serde(default = "default_title_wait_time")]
    pub wait_time: f32,

    #[serde(default = "default_title_fade_in_time")]
    pub fade_in_time: f32,

    #[serde(default = "default_title_fade_out_time")]
    pub fade_out_time: f32,

    #[serde(default = "default_title_color")]
    pub text_color: Color,

    #[serde(default)]
    pub curve: Curve,
}

/// 故障效果配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlitchConfig {
    /// 强制满强度（调试用）
    #[serde(default)]
    pub full_glitch: bool,
}

/// headless 驱动配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// 每秒 tick 数
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,

    /// 未指定 tick 数时的最长运行时间（秒）
    #[serde(default = "default_max_seconds")]
    pub max_seconds: f32,

    /// 日志级别（trace/debug/info/warn/error）
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// 场景对象绑定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    #[serde(default = "default_opening_text")]
    pub opening_text: String,

    #[serde(default = "default_title_text")]
    pub title_text: String,

    /// 完成后锁门的任务
    #[serde(default = "default_engine_room_task")]
    pub engine_room_task: String,

    /// 任务完成后上锁的门
    #[serde(default = "default_doors")]
    pub doors: Vec<String>,

    #[serde(default = "default_crystal")]
    pub crystal: String,

    #[serde(default = "default_container_arrow")]
    pub container_arrow: String,

    #[serde(default = "default_monitor_arrow")]
    pub monitor_arrow: String,

    #[serde(default = "default_transition_collider")]
    pub transition_collider: String,
}

// 默认值函数
fn default_fade_time() -> f32 {
    0.5
}

fn default_hold_time() -> f32 {
    2.5
}

fn default_title_wait_time() -> f32 {
    1.5
}

fn default_title_fade_in_time() -> f32 {
    3.0
}

fn default_title_fade_out_time() -> f32 {
    1.5
}

fn default_title_color() -> Color {
    Color::rgba(0.91, 0.76, 0.42, 1.0)
}

fn default_tick_rate() -> u32 {
    60
}

fn default_max_seconds() -> f32 {
    30.0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_opening_text() -> String {
    "opening_text".to_string()
}

fn default_title_text() -> String {
    "title_text".to_string()
}

fn default_engine_room_task() -> String {
    "restart_generator".to_string()
}

fn default_doors() -> Vec<String> {
    vec!["engine_room_door".to_string(), "cargo_door".to_string()]
}

fn default_crystal() -> String {
    "crystal".to_string()
}

fn default_container_arrow() -> String {
    "container_arrow".to_string()
}

fn default_monitor_arrow() -> String {
    "monitor_arrow".to_string()
}

fn default_transition_collider() -> String {
    "transition_collider".to_string()
}

impl Default for OpeningConfig {
    fn default() -> Self {
        Self {
            fade_time: default_fade_time(),
            hold_time: default_hold_time(),
            edge_wait: None,
            text_color: Color::WHITE,
            curve: Curve::default(),
        }
    }
}

impl OpeningConfig {
    /// 实际使用的首尾等待时长
    pub fn edge_wait(&self) -> f32 {
        self.edge_wait.unwrap_or(self.fade_time)
    }

    /// 开场序列总时长
    pub fn total_time(&self) -> f32 {
        2.0 * self.edge_wait() + 2.0 * self.fade_time + self.hold_time
    }
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            wait_time: default_title_wait_time(),
            fade_in_time: default_title_fade_in_time(),
            fade_out_time: default_title_fade_out_time(),
            text_color: default_title_color(),
            curve: Curve::default(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_rate: default_tick_rate(),
            max_seconds: default_max_seconds(),
            log_level: default_log_level(),
        }
    }
}

impl DriverConfig {
    /// 单个 tick 的时长（秒）
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            opening_text: default_opening_text(),
            title_text: default_title_text(),
            engine_room_task: default_engine_room_task(),
            doors: default_doors(),
            crystal: default_crystal(),
            container_arrow: default_container_arrow(),
            monitor_arrow: default_monitor_arrow(),
            transition_collider: default_transition_collider(),
        }
    }
}

impl AppConfig {
    /// 加载配置文件
    ///
    /// 如果文件不存在或解析失败，返回默认配置并输出警告。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let (config, error) = Self::load_or_default(path);
        Self::report_load(path, error.as_ref());
        config
    }

    /// 加载配置文件，失败时返回默认配置与失败原因，不输出日志
    ///
    /// 日志系统初始化之前使用：先拿到配置决定日志级别，再调用 [`AppConfig::report_load`]。
    pub fn load_or_default(path: impl AsRef<Path>) -> (Self, Option<ConfigError>) {
        match Self::load_strict(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// 输出加载结果
    pub fn report_load(path: &Path, error: Option<&ConfigError>) {
        match error {
            None => info!(path = %path.display(), "配置文件加载成功"),
            Some(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "配置文件不存在，使用默认配置")
            }
            Some(e) => warn!(error = %e, "配置文件加载失败，使用默认配置"),
        }
    }

    /// 严格加载：读取或解析失败时返回错误（供 `xtask config-check` 使用）
    pub fn load_strict(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("opening.fade_time", self.opening.fade_time),
            ("opening.hold_time", self.opening.hold_time),
            ("title.wait_time", self.title.wait_time),
            ("title.fade_in_time", self.title.fade_in_time),
            ("title.fade_out_time", self.title.fade_out_time),
            ("driver.max_seconds", self.driver.max_seconds),
        ];
        for (field, value) in durations {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{field} 必须为正数，当前为 {value}"
                )));
            }
        }

        if let Some(edge) = self.opening.edge_wait
            && !(edge.is_finite() && edge >= 0.0)
        {
            return Err(ConfigError::ValidationFailed(format!(
                "opening.edge_wait 不能为负数，当前为 {edge}"
            )));
        }

        if self.driver.tick_rate == 0 {
            return Err(ConfigError::ValidationFailed(
                "driver.tick_rate 必须大于 0".to_string(),
            ));
        }

        if self.driver.log_level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::ValidationFailed(format!(
                "未知日志级别: {}",
                self.driver.log_level
            )));
        }

        if self.bindings.doors.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "bindings.doors 至少需要一扇门".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置 IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置解析失败: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("配置验证失败: {0}")]
    ValidationFailed(String),
}
