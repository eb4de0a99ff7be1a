//! 放置矿物
//!
//! 交互后点亮晶体、隐藏货箱箭头、显示监视器箭头、启用场景切换碰撞体，
//! 然后发布 `minerals-placed`。

use std::rc::Rc;

use seq_runtime::{AgentRef, ChannelId, EventBus, Interactable};
use tracing::{info, warn};

use super::MINERALS_PLACED_CHANNEL;
use crate::config::BindingConfig;
use crate::error::HostResult;
use crate::scene::{Scene, SceneObject};

#[derive(Debug)]
pub struct PlaceMinerals {
    bus: Rc<EventBus>,
    placed_channel: ChannelId,
    crystal: Rc<SceneObject>,
    container_arrow: Rc<SceneObject>,
    monitor_arrow: Rc<SceneObject>,
    transition_collider: Rc<SceneObject>,
    interactions: u32,
}

impl PlaceMinerals {
    pub fn new(bus: &Rc<EventBus>, scene: &Scene, bindings: &BindingConfig) -> HostResult<Self> {
        Ok(Self {
            bus: bus.clone(),
            placed_channel: bus.channel(MINERALS_PLACED_CHANNEL)?,
            crystal: scene.object(&bindings.crystal)?,
            container_arrow: scene.object(&bindings.container_arrow)?,
            monitor_arrow: scene.object(&bindings.monitor_arrow)?,
            transition_collider: scene.object(&bindings.transition_collider)?,
            interactions: 0,
        })
    }

    pub fn placed_channel(&self) -> ChannelId {
        self.placed_channel
    }

    /// 交互次数
    pub fn interactions(&self) -> u32 {
        self.interactions
    }
}

impl Interactable for PlaceMinerals {
    fn interact(&mut self, agent: &AgentRef) {
        self.interactions += 1;

        self.crystal.set_active(true);
        self.container_arrow.set_active(false);
        self.monitor_arrow.set_active(true);
        self.transition_collider.set_active(true);
        info!(agent = %agent.name, "矿物已放置");

        if let Err(e) = self.bus.emit(self.placed_channel) {
            warn!(error = %e, "minerals-placed 发布失败");
        }
    }
}
