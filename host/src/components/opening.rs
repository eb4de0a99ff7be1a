//! 开场文字与标题揭示
//!
//! ```text
//! 开场文字: 等待 → 淡入 → 停留 → 淡出 → 等待 → advance_scene()
//! 标题文字: (generator-shutdown，仅一次) → 等待 → 淡入 → 等待 → 淡出
//! ```

use std::rc::Rc;

use seq_runtime::{
    ChannelId, Color, GateController, GateId, GateState, HandlerFault, Mutation, OwnerId,
    Sequence, SequenceEvent, SequenceId, Session, SharedScheduler, Stage,
};
use tracing::info;

use super::SHUTDOWN_CHANNEL;
use crate::config::{AppConfig, OpeningConfig, TitleConfig};
use crate::error::HostResult;
use crate::scene::{Scene, SceneHook, TextLabel};

/// 开场序列：首尾等待，中间淡入、停留、淡出
pub fn opening_sequence(config: &OpeningConfig) -> Sequence {
    let visible = config.text_color;
    Sequence::new("opening")
        .wait(config.edge_wait())
        .fade(Stage::color(Color::CLEAR, visible, config.fade_time).with_curve(config.curve.clone()))
        .wait(config.hold_time)
        .fade(Stage::color(visible, Color::CLEAR, config.fade_time).with_curve(config.curve.clone()))
        .wait(config.edge_wait())
}

/// 标题序列
pub fn title_sequence(config: &TitleConfig) -> Sequence {
    let visible = config.text_color;
    Sequence::new("title")
        .wait(config.wait_time)
        .fade(
            Stage::color(Color::CLEAR, visible, config.fade_in_time)
                .with_curve(config.curve.clone()),
        )
        .wait(config.wait_time)
        .fade(
            Stage::color(visible, Color::CLEAR, config.fade_out_time)
                .with_curve(config.curve.clone()),
        )
}

/// 开场文字与标题揭示组件
pub struct OpeningTitleSequence {
    scheduler: SharedScheduler,
    opening_text: Rc<TextLabel>,
    title_text: Rc<TextLabel>,
    opening_owner: OwnerId,
    title_owner: OwnerId,
    opening: OpeningConfig,
    shutdown: ChannelId,
    gates: GateController,
    title_gate: GateId,
    opening_sequence: Option<SequenceId>,
    scene_advanced: bool,
}

impl std::fmt::Debug for OpeningTitleSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpeningTitleSequence")
            .field("opening_owner", &self.opening_owner)
            .field("title_owner", &self.title_owner)
            .field("opening_sequence", &self.opening_sequence)
            .field("scene_advanced", &self.scene_advanced)
            .finish()
    }
}

impl OpeningTitleSequence {
    /// 解析文字对象、注册 owner、绑定标题 Gate
    pub fn new(session: &Session, scene: &Scene, config: &AppConfig) -> HostResult<Self> {
        let opening_text = scene.label(&config.bindings.opening_text)?;
        let title_text = scene.label(&config.bindings.title_text)?;
        let shutdown = session.channel(SHUTDOWN_CHANNEL)?;

        let scheduler = session.scheduler().clone();
        let (opening_owner, title_owner) = {
            let mut scheduler = scheduler.borrow_mut();
            let opening_owner = scheduler.register(opening_text.name(), opening_text.clone())?;
            let title_owner = scheduler.register(title_text.name(), title_text.clone())?;
            (opening_owner, title_owner)
        };

        let mut gates = GateController::new(session.bus().clone());
        let title_gate = gates.bind(
            "title-reveal",
            shutdown,
            vec![reveal_title(scheduler.clone(), title_owner, &config.title)],
        )?;

        Ok(Self {
            scheduler,
            opening_text,
            title_text,
            opening_owner,
            title_owner,
            opening: config.opening.clone(),
            shutdown,
            gates,
            title_gate,
            opening_sequence: None,
            scene_advanced: false,
        })
    }

    /// 隐藏两段文字并开始开场序列
    pub fn start(&mut self, session: &Session) -> HostResult<SequenceId> {
        self.opening_text.set_color(Color::CLEAR);
        self.title_text.set_color(Color::CLEAR);

        let id = session.start(self.opening_owner, opening_sequence(&self.opening))?;
        info!(
            sequence = %id,
            total = self.opening.total_time(),
            "开场序列开始"
        );
        self.opening_sequence = Some(id);
        Ok(id)
    }

    /// 处理调度事件：开场序列完成时切换场景（只切换一次）
    pub fn on_sequence_event(&mut self, event: &SequenceEvent, hook: &mut dyn SceneHook) {
        let SequenceEvent::Completed { sequence, .. } = *event else {
            return;
        };
        if self.opening_sequence != Some(sequence) || self.scene_advanced {
            return;
        }
        self.scene_advanced = true;
        info!(sequence = %sequence, "开场序列完成，切换场景");
        hook.advance_scene();
    }

    /// 拆除：释放 Gate 订阅并停用两个 owner
    pub fn teardown(&mut self) {
        self.gates.unbind_all();
        if let Ok(mut scheduler) = self.scheduler.try_borrow_mut() {
            scheduler.deactivate(self.opening_owner);
            scheduler.deactivate(self.title_owner);
        }
    }

    pub fn opening_owner(&self) -> OwnerId {
        self.opening_owner
    }

    pub fn title_owner(&self) -> OwnerId {
        self.title_owner
    }

    /// 触发标题揭示的频道
    pub fn shutdown_channel(&self) -> ChannelId {
        self.shutdown
    }

    pub fn title_gate_state(&self) -> GateState {
        self.gates.state(self.title_gate)
    }

    pub fn scene_advanced(&self) -> bool {
        self.scene_advanced
    }

    pub fn opening_text(&self) -> &Rc<TextLabel> {
        &self.opening_text
    }

    pub fn title_text(&self) -> &Rc<TextLabel> {
        &self.title_text
    }
}

/// 启动标题序列
///
/// `Session` 推进调度器时持有总线的 `DeferGuard`，shutdown 事件会排到调度器释放之后，
/// 正常驱动下不会遇到调度器已被借用。直接在借用期间 publish 时以 `HandlerFault` 上报。
fn reveal_title(scheduler: SharedScheduler, owner: OwnerId, config: &TitleConfig) -> Mutation {
    let sequence = title_sequence(config);
    Box::new(move || {
        let mut scheduler = scheduler
            .try_borrow_mut()
            .map_err(|_| HandlerFault::new("调度器正忙，标题序列未能启动"))?;
        let id = scheduler
            .start(owner, sequence)
            .map_err(|e| HandlerFault::new(format!("标题序列启动失败: {e}")))?;
        info!(sequence = %id, "标题序列开始");
        Ok(())
    })
}
