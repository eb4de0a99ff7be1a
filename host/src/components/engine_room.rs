//! 任务完成后锁上机房的门

use std::rc::Rc;

use seq_runtime::{EventBus, GateController, GateId, GateState, Mutation};
use tracing::debug;

use crate::config::BindingConfig;
use crate::error::HostResult;
use crate::scene::{Door, Scene, Task};

/// 每扇门一个 Gate，全部绑定在任务的完成频道上
#[derive(Debug)]
pub struct LockEngineRoom {
    task: Rc<Task>,
    doors: Vec<Rc<Door>>,
    gates: GateController,
    gate_ids: Vec<GateId>,
}

impl LockEngineRoom {
    pub fn new(bus: &Rc<EventBus>, scene: &Scene, bindings: &BindingConfig) -> HostResult<Self> {
        let task = scene.task(&bindings.engine_room_task)?;
        let doors = bindings
            .doors
            .iter()
            .map(|name| scene.door(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut gates = GateController::new(bus.clone());
        let mut gate_ids = Vec::with_capacity(doors.len());
        for door in &doors {
            let target = door.clone();
            let lock: Mutation = Box::new(move || {
                target.lock();
                Ok(())
            });
            gate_ids.push(gates.bind(format!("{}-lock", door.name()), task.channel(), vec![lock])?);
        }
        debug!(task = %task.name(), doors = doors.len(), "机房门锁已就绪");

        Ok(Self {
            task,
            doors,
            gates,
            gate_ids,
        })
    }

    pub fn task(&self) -> &Rc<Task> {
        &self.task
    }

    pub fn doors(&self) -> &[Rc<Door>] {
        &self.doors
    }

    /// 各门锁 Gate 的状态（与 `doors()` 顺序一致）
    pub fn gate_states(&self) -> Vec<GateState> {
        self.gate_ids.iter().map(|id| self.gates.state(*id)).collect()
    }

    pub fn all_locked(&self) -> bool {
        self.doors.iter().all(|d| d.is_locked())
    }

    /// 拆除：释放 Gate 订阅（已上锁的门保持锁定）
    pub fn teardown(&mut self) {
        self.gates.unbind_all();
    }
}
