//! 场景对象
//!
//! 所有对象都以 `Rc` 共享给组件，状态使用 `Cell` 内部可变。

use std::cell::Cell;

use seq_runtime::{BusError, ChannelId, Color, Delivery, EventBus, FadeTarget, StageValue};
use tracing::{debug, info, trace};

/// 可激活/隐藏的场景对象（箭头、晶体、碰撞体等）
#[derive(Debug)]
pub struct SceneObject {
    name: String,
    active: Cell<bool>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, active: bool) -> Self {
        Self {
            name: name.into(),
            active: Cell::new(active),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn set_active(&self, active: bool) {
        if self.active.replace(active) != active {
            debug!(object = %self.name, active, "场景对象状态变更");
        }
    }
}

/// 门
///
/// 上锁是幂等的；门不会自行解锁。
#[derive(Debug)]
pub struct Door {
    name: String,
    locked: Cell<bool>,
}

impl Door {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locked: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    /// 上锁；返回本次调用是否改变了状态
    pub fn lock(&self) -> bool {
        if self.locked.replace(true) {
            debug!(door = %self.name, "门已处于锁定状态");
            return false;
        }
        info!(door = %self.name, "门已上锁");
        true
    }
}

/// 任务
///
/// 完成时在自己的完成频道上发布事件。
#[derive(Debug)]
pub struct Task {
    name: String,
    channel: ChannelId,
    completed: Cell<bool>,
}

impl Task {
    pub fn new(name: impl Into<String>, channel: ChannelId) -> Self {
        Self {
            name: name.into(),
            channel,
            completed: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 完成事件频道
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }

    /// 标记完成并发布完成事件
    ///
    /// 重复完成同样会发布事件，由订阅方决定是否响应。
    pub fn complete(&self, bus: &EventBus) -> Result<Delivery, BusError> {
        self.completed.set(true);
        info!(task = %self.name, "任务完成");
        bus.emit(self.channel)
    }
}

/// 可淡入淡出的文字
#[derive(Debug)]
pub struct TextLabel {
    name: String,
    color: Cell<Color>,
}

impl TextLabel {
    /// 创建文字（初始完全透明）
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: Cell::new(Color::CLEAR),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> Color {
        self.color.get()
    }

    pub fn set_color(&self, color: Color) {
        self.color.set(color);
    }

    /// 不透明度
    pub fn alpha(&self) -> f32 {
        self.color.get().a
    }

    pub fn is_visible(&self) -> bool {
        !self.color.get().is_transparent()
    }
}

impl FadeTarget for TextLabel {
    fn apply(&self, value: StageValue) {
        match value {
            StageValue::Color(color) => self.color.set(color),
            StageValue::Scalar(alpha) => self.color.set(self.color.get().with_alpha(alpha)),
        }
        trace!(label = %self.name, alpha = self.alpha(), "文字颜色更新");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_door_lock_is_idempotent() {
        let door = Door::new("engine_room_door");
        assert!(!door.is_locked());
        assert!(door.lock());
        assert!(!door.lock());
        assert!(door.is_locked());
    }

    #[test]
    fn test_task_publishes_completion() {
        let bus = EventBus::new();
        let channel = bus.channel("task-completed/t").unwrap();
        let task = Task::new("t", channel);

        assert_eq!(task.complete(&bus).unwrap(), Delivery::Dispatched(0));
        assert!(task.is_completed());
    }

    #[test]
    fn test_text_label_accepts_scalar_and_color() {
        let label = TextLabel::new("title");
        assert!(!label.is_visible());

        label.apply(StageValue::Color(Color::rgba(1.0, 0.0, 0.0, 0.5)));
        assert_eq!(label.color(), Color::rgba(1.0, 0.0, 0.0, 0.5));

        label.apply(StageValue::Scalar(1.0));
        assert_eq!(label.color(), Color::rgba(1.0, 0.0, 0.0, 1.0));
        assert!(label.is_visible());
    }
}
