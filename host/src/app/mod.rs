//! # App 模块
//!
//! 应用状态与主循环逻辑。

mod headless;
mod init;
mod tick;

pub use headless::{Action, RunSummary, TimedAction, Timeline, apply_action, run_headless};
pub use tick::update;

use seq_runtime::{JitterSink, ScanLineJitter, Session};
use tracing::info;

use crate::AppConfig;
use crate::components::{GlitchyEffect, LockEngineRoom, OpeningTitleSequence, PlaceMinerals};
use crate::error::HostResult;
use crate::scene::{Scene, SceneHook};

/// 场景加载器（headless：只记录切换）
#[derive(Debug, Default)]
pub struct SceneLoader {
    /// 当前场景在构建顺序中的序号
    pub build_index: usize,
    /// 切换次数
    pub advances: u32,
}

impl SceneHook for SceneLoader {
    fn advance_scene(&mut self) {
        self.build_index += 1;
        self.advances += 1;
        info!(build_index = self.build_index, "切换到下一个场景");
    }
}

/// 扫描线抖动记录（headless 渲染端）
#[derive(Debug, Default)]
pub struct JitterTrace {
    pub writes: u64,
    pub last: Option<ScanLineJitter>,
    /// 出现过的最大位移
    pub peak_displacement: f32,
}

impl JitterSink for JitterTrace {
    fn write(&mut self, displacement: f32, threshold: f32) {
        self.writes += 1;
        self.peak_displacement = self.peak_displacement.max(displacement);
        self.last = Some(ScanLineJitter {
            displacement,
            threshold,
        });
    }
}

/// 应用状态
pub struct AppState {
    /// 应用配置
    pub config: AppConfig,
    pub session: Session,
    pub scene: Scene,

    // ===== 组件 =====
    pub opening: OpeningTitleSequence,
    pub engine_room: LockEngineRoom,
    pub minerals: PlaceMinerals,
    pub glitch: GlitchyEffect,

    // ===== 外部协作方 =====
    pub scene_loader: SceneLoader,
    pub jitter: JitterTrace,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("ticks", &self.session.ticks())
            .field("scene", &self.scene)
            .field("scene_advances", &self.scene_loader.advances)
            .finish()
    }
}

impl AppState {
    /// 校验配置、构建场景、初始化全部组件并开始开场序列
    pub fn new(config: AppConfig) -> HostResult<Self> {
        config.validate()?;

        let session = Session::new();
        let scene = init::create_scene(&session)?;
        let mut opening = init::create_opening(&session, &scene, &config)?;
        let engine_room = init::create_engine_room(&session, &scene, &config)?;
        let minerals = init::create_minerals(&session, &scene, &config)?;
        let glitch = init::create_glitch(&session, &config)?;

        opening.start(&session)?;

        Ok(Self {
            config,
            session,
            scene,
            opening,
            engine_room,
            minerals,
            glitch,
            scene_loader: SceneLoader::default(),
            jitter: JitterTrace::default(),
        })
    }

    /// 拆除全部组件并结束会话
    pub fn shutdown(&mut self) {
        if self.session.is_closed() {
            return;
        }
        self.opening.teardown();
        self.engine_room.teardown();
        self.glitch.disable();
        self.session.teardown();
        info!(ticks = self.session.ticks(), "应用已关闭");
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.shutdown();
    }
}
