//! 更新逻辑（每 tick 调用）

use seq_runtime::SequenceEvent;
use tracing::trace;

use super::AppState;

/// 更新入口
///
/// 推进会话，把调度事件交给关心它的组件，最后渲染故障效果。
pub fn update(app_state: &mut AppState, dt: f32) -> Vec<SequenceEvent> {
    let events = app_state.session.advance(dt);

    for event in &events {
        trace!(event = ?event, "调度事件");
        app_state
            .opening
            .on_sequence_event(event, &mut app_state.scene_loader);
    }

    app_state.glitch.render(&mut app_state.jitter);
    events
}
