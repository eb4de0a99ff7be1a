//! AppState 初始化拆分
//!
//! 按组件拆开初始化逻辑，`app/mod.rs` 只负责组装。
//! 任何绑定缺失都在这里以错误返回，不会带着半初始化的组件继续运行。

use seq_runtime::Session;
use tracing::info;

use crate::AppConfig;
use crate::components::{GlitchyEffect, LockEngineRoom, OpeningTitleSequence, PlaceMinerals};
use crate::error::HostResult;
use crate::scene::Scene;

pub fn create_scene(session: &Session) -> HostResult<Scene> {
    Scene::ship(session.bus())
}

pub fn create_opening(
    session: &Session,
    scene: &Scene,
    config: &AppConfig,
) -> HostResult<OpeningTitleSequence> {
    let opening = OpeningTitleSequence::new(session, scene, config)?;
    info!(
        fade_time = config.opening.fade_time,
        hold_time = config.opening.hold_time,
        edge_wait = config.opening.edge_wait(),
        "开场组件初始化成功"
    );
    Ok(opening)
}

pub fn create_engine_room(
    session: &Session,
    scene: &Scene,
    config: &AppConfig,
) -> HostResult<LockEngineRoom> {
    let engine_room = LockEngineRoom::new(session.bus(), scene, &config.bindings)?;
    info!(
        task = %config.bindings.engine_room_task,
        doors = ?config.bindings.doors,
        "机房门锁组件初始化成功"
    );
    Ok(engine_room)
}

pub fn create_minerals(
    session: &Session,
    scene: &Scene,
    config: &AppConfig,
) -> HostResult<PlaceMinerals> {
    let minerals = PlaceMinerals::new(session.bus(), scene, &config.bindings)?;
    info!(crystal = %config.bindings.crystal, "矿物放置组件初始化成功");
    Ok(minerals)
}

pub fn create_glitch(session: &Session, config: &AppConfig) -> HostResult<GlitchyEffect> {
    let mut glitch = GlitchyEffect::new(session.bus(), config.glitch.full_glitch)?;
    glitch.enable()?;
    info!(full_glitch = config.glitch.full_glitch, "故障效果初始化成功");
    Ok(glitch)
}
