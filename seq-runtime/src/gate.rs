//! # Gate 模块
//!
//! 事件触发、至多执行一次的状态变更绑定。
//!
//! ```text
//! Unbound ──bind──► Armed ──首次收到频道事件──► Fired（终态，不会重新 arm）
//! ```
//!
//! 同一频道可以绑定多个 Gate，各 Gate 的变更集合彼此独立，不依赖执行先后。
//! 某个变更失败（返回 `Err` 或 panic）时记录日志并继续执行其余变更，Gate 仍进入 Fired。

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::bus::{ChannelId, EventBus, HandlerFault, HandlerResult, Subscription, panic_message};
use crate::error::GateError;

/// 单个状态变更（只会被调用一次）
///
/// 返回 `Err` 与 panic 一样计为失败：记录日志，并在整组变更执行完后上报给总线。
pub type Mutation = Box<dyn FnOnce() -> HandlerResult>;

/// Gate 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    #[default]
    Unbound,
    Armed,
    Fired,
}

/// Gate 标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GateId(usize);

impl std::fmt::Display for GateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GateId({})", self.0)
    }
}

struct GateCell {
    label: String,
    state: GateState,
    mutations: Vec<Mutation>,
}

struct GateEntry {
    cell: Rc<RefCell<GateCell>>,
    channel: ChannelId,
    subscription: Option<Subscription>,
}

/// Gate 控制器
///
/// 持有全部 Gate 的订阅；控制器析构或 `unbind_all()` 时订阅全部释放。
pub struct GateController {
    bus: Rc<EventBus>,
    gates: Vec<GateEntry>,
}

impl std::fmt::Debug for GateController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateController")
            .field("gates", &self.gates.len())
            .field("fired", &self.fired_count())
            .finish()
    }
}

impl GateController {
    pub fn new(bus: Rc<EventBus>) -> Self {
        Self {
            bus,
            gates: Vec::new(),
        }
    }

    /// 绑定 Gate
    ///
    /// 变更集合为空或频道无效时立即返回错误。
    pub fn bind(
        &mut self,
        label: impl Into<String>,
        channel: ChannelId,
        mutations: Vec<Mutation>,
    ) -> Result<GateId, GateError> {
        let label = label.into();
        if mutations.is_empty() {
            return Err(GateError::EmptyMutationSet { label });
        }

        let cell = Rc::new(RefCell::new(GateCell {
            label: label.clone(),
            state: GateState::Armed,
            mutations,
        }));

        let handler_cell = cell.clone();
        let subscription = self
            .bus
            .subscription(channel, move |_payload| fire(&handler_cell))
            .map_err(|source| GateError::Channel {
                label: label.clone(),
                source,
            })?;

        let id = GateId(self.gates.len());
        debug!(gate = %id, label = %label, channel = %channel, "Gate 已绑定");
        self.gates.push(GateEntry {
            cell,
            channel,
            subscription: Some(subscription),
        });
        Ok(id)
    }

    /// Gate 状态；未知 ID 视为 Unbound
    pub fn state(&self, id: GateId) -> GateState {
        self.gates
            .get(id.0)
            .map_or(GateState::Unbound, |g| g.cell.borrow().state)
    }

    /// Gate 绑定的频道
    pub fn channel(&self, id: GateId) -> Option<ChannelId> {
        self.gates.get(id.0).map(|g| g.channel)
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// 已触发的 Gate 数量
    pub fn fired_count(&self) -> usize {
        self.count(GateState::Fired)
    }

    /// 仍在等待的 Gate 数量
    pub fn armed_count(&self) -> usize {
        self.count(GateState::Armed)
    }

    fn count(&self, state: GateState) -> usize {
        self.gates
            .iter()
            .filter(|g| g.cell.borrow().state == state)
            .count()
    }

    /// 释放全部订阅（owner 拆除）
    ///
    /// 未触发的 Gate 回到 Unbound；已触发的保持 Fired。
    pub fn unbind_all(&mut self) {
        for gate in &mut self.gates {
            gate.subscription = None;
            let mut cell = gate.cell.borrow_mut();
            if cell.state == GateState::Armed {
                cell.state = GateState::Unbound;
                cell.mutations.clear();
            }
        }
    }
}

fn fire(cell: &RefCell<GateCell>) -> Result<(), HandlerFault> {
    let (label, mutations) = {
        let mut gate = cell
            .try_borrow_mut()
            .map_err(|_| HandlerFault::new("Gate 正在执行中"))?;
        if gate.state != GateState::Armed {
            return Ok(());
        }
        // 先进入 Fired，变更执行失败也不会再次触发
        gate.state = GateState::Fired;
        (gate.label.clone(), std::mem::take(&mut gate.mutations))
    };

    info!(gate = %label, mutations = mutations.len(), "Gate 触发");
    let mut failed = 0usize;
    for (index, mutation) in mutations.into_iter().enumerate() {
        // 单个变更失败不影响同一 Gate 的其余变更
        let fault = match panic::catch_unwind(AssertUnwindSafe(mutation)) {
            Ok(Ok(())) => continue,
            Ok(Err(fault)) => fault.0,
            Err(panic) => panic_message(panic.as_ref()),
        };
        failed += 1;
        warn!(gate = %label, mutation = index, fault = %fault, "Gate 变更执行失败");
    }

    if failed > 0 {
        return Err(HandlerFault::new(format!(
            "Gate '{label}' 有 {failed} 个变更执行失败"
        )));
    }
    Ok(())
}
