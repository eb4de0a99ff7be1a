//! Headless 驱动
//!
//! 不依赖窗口与渲染，按固定 tick 推进会话，并在预定时间注入外部事件
//! （发电机关闭、任务完成、交互、故障强度）。

use serde::Serialize;
use seq_runtime::{AgentRef, Interactable, Payload};
use tracing::{debug, info};

use super::{AppState, update};
use crate::error::HostResult;

/// 外部事件
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// 发布发电机关闭事件
    Shutdown,
    /// 完成机房任务
    CompleteTask,
    /// 与矿物交互
    Interact { agent: String },
    /// 发布一次故障强度采样
    Glitch { intensity: f32 },
}

/// 带时间点的外部事件
#[derive(Debug, Clone, PartialEq)]
pub struct TimedAction {
    /// 会话时间（秒）
    pub at: f32,
    pub action: Action,
}

/// 外部事件时间线（按时间排序，同一时间按加入顺序）
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    actions: Vec<TimedAction>,
    cursor: usize,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, at: f32, action: Action) -> Self {
        self.push(at, action);
        self
    }

    pub fn push(&mut self, at: f32, action: Action) {
        let index = self.actions.partition_point(|a| a.at <= at);
        self.actions.insert(index, TimedAction { at, action });
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// 取出所有已到期的事件
    pub fn due(&mut self, clock: f32) -> Vec<Action> {
        let start = self.cursor;
        while self
            .actions
            .get(self.cursor)
            .is_some_and(|a| a.at <= clock)
        {
            self.cursor += 1;
        }
        self.actions[start..self.cursor]
            .iter()
            .map(|a| a.action.clone())
            .collect()
    }
}

/// 运行结果摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub seconds: f64,
    pub scene_advances: u32,
    pub doors_locked: usize,
    pub title_revealed: bool,
    pub minerals_interactions: u32,
    pub handler_faults: u64,
    pub jitter_writes: u64,
    pub peak_displacement: f32,
}

impl RunSummary {
    pub fn collect(app_state: &AppState) -> Self {
        Self {
            ticks: app_state.session.ticks(),
            seconds: app_state.session.clock(),
            scene_advances: app_state.scene_loader.advances,
            doors_locked: app_state.scene.locked_door_count(),
            title_revealed: app_state.opening.title_gate_state() == seq_runtime::GateState::Fired,
            minerals_interactions: app_state.minerals.interactions(),
            handler_faults: app_state.session.bus().fault_count(),
            jitter_writes: app_state.jitter.writes,
            peak_displacement: app_state.jitter.peak_displacement,
        }
    }
}

/// 执行一个外部事件
pub fn apply_action(app_state: &mut AppState, action: Action) -> HostResult<()> {
    debug!(action = ?action, clock = app_state.session.clock(), "注入外部事件");
    let bus = app_state.session.bus().clone();
    match action {
        Action::Shutdown => {
            bus.emit(app_state.opening.shutdown_channel())?;
        }
        Action::CompleteTask => {
            app_state.engine_room.task().complete(&bus)?;
        }
        Action::Interact { agent } => {
            app_state.minerals.interact(&AgentRef::new(agent));
        }
        Action::Glitch { intensity } => {
            bus.publish(app_state.glitch.channel(), Payload::Scalar(intensity))?;
        }
    }
    Ok(())
}

/// 按固定 tick 运行 `ticks` 次
pub fn run_headless(
    app_state: &mut AppState,
    mut timeline: Timeline,
    ticks: u64,
) -> HostResult<RunSummary> {
    let dt = app_state.config.driver.tick_dt();
    info!(ticks, dt, actions = timeline.len(), "headless 运行开始");

    for _ in 0..ticks {
        let clock = app_state.session.clock() as f32;
        for action in timeline.due(clock) {
            apply_action(app_state, action)?;
        }
        update(app_state, dt);
    }

    let summary = RunSummary::collect(app_state);
    info!(summary = ?summary, "headless 运行结束");
    Ok(summary)
}
