//! # Bus 模块
//!
//! 显式的发布/订阅事件总线。
//!
//! ## 设计说明
//!
//! - 总线是普通实例（通常以 `Rc<EventBus>` 共享），会话开始时创建，结束时 `clear()`
//! - 频道在会话开始时注册一次，之后通过 [`ChannelId`] 引用
//! - `publish` 在调用方线程上同步分发，按订阅顺序调用 handler
//! - 分发前对 handler 列表做快照：分发过程中新增的订阅从下一次 publish 开始生效
//! - 分发过程中（或持有 [`DeferGuard`] 期间）发出的 publish 进入队列，
//!   当前分发结束后按 FIFO 顺序投递，不会重入
//! - 单个 handler 失败（返回 `Err` 或 panic）只记录日志，不影响同一次分发中的其他 handler
//!
//! ```text
//! publish(c, p) ──► snapshot(handlers[c]) ──► h1(p) ─► h2(p) ─► ... ──► drain(pending)
//!                                                 │
//!                                                 └─ publish(c2, p2) ──► pending
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::error::BusError;

/// 总线实例编号，进程内唯一
static NEXT_BUS_ID: AtomicU32 = AtomicU32::new(1);

/// 频道 ID
///
/// 带有所属总线的编号：其他总线注册的频道即使索引相同也不会被接受。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId {
    bus: u32,
    index: u32,
}

impl ChannelId {
    /// 获取内部索引
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelId({}:{})", self.bus, self.index)
    }
}

/// Handler 身份
///
/// 同一频道内 handler 身份是集合键：同一身份重复订阅不会重复投递。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandlerId({})", self.0)
    }
}

/// 事件负载
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Payload {
    /// 无负载
    #[default]
    Empty,
    /// 数值
    Scalar(f32),
    /// 文本
    Text(String),
}

impl Payload {
    /// 取出数值负载
    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            Payload::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// 取出文本负载
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// handler 执行失败
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct HandlerFault(pub String);

impl HandlerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// handler 返回值
pub type HandlerResult = Result<(), HandlerFault>;

type Handler = Rc<dyn Fn(&Payload) -> HandlerResult>;

/// publish 的投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 已同步分发给 n 个 handler
    Dispatched(usize),
    /// 分发进行中，已排队
    Deferred,
}

/// 已注册的频道
struct Channel {
    name: String,
    /// 按订阅顺序排列
    handlers: Vec<(HandlerId, Handler)>,
}

/// 事件总线
pub struct EventBus {
    id: u32,
    channels: RefCell<Vec<Channel>>,
    names: RefCell<HashMap<String, ChannelId>>,
    next_handler_id: Cell<u64>,
    /// 分发深度 + DeferGuard 数量；大于 0 时 publish 进入队列
    hold_depth: Cell<u32>,
    pending: RefCell<VecDeque<(ChannelId, Payload)>>,
    fault_count: Cell<u64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("channels", &self.channels.borrow().len())
            .field("pending", &self.pending.borrow().len())
            .field("faults", &self.fault_count.get())
            .finish()
    }
}

impl EventBus {
    /// 创建空总线
    pub fn new() -> Self {
        Self {
            id: NEXT_BUS_ID.fetch_add(1, Ordering::Relaxed),
            channels: RefCell::new(Vec::new()),
            names: RefCell::new(HashMap::new()),
            next_handler_id: Cell::new(1),
            hold_depth: Cell::new(0),
            pending: RefCell::new(VecDeque::new()),
            fault_count: Cell::new(0),
        }
    }

    // ========== 频道管理 ==========

    /// 注册频道（已存在则返回原 ID）
    pub fn channel(&self, name: &str) -> Result<ChannelId, BusError> {
        if name.is_empty() {
            return Err(BusError::EmptyChannelName);
        }
        if let Some(id) = self.names.borrow().get(name) {
            return Ok(*id);
        }

        let mut channels = self.channels.borrow_mut();
        let id = ChannelId {
            bus: self.id,
            index: channels.len() as u32,
        };
        channels.push(Channel {
            name: name.to_string(),
            handlers: Vec::new(),
        });
        self.names.borrow_mut().insert(name.to_string(), id);
        debug!(channel = %name, id = %id, "注册频道");
        Ok(id)
    }

    /// 按名称查找频道
    pub fn lookup(&self, name: &str) -> Option<ChannelId> {
        self.names.borrow().get(name).copied()
    }

    /// 频道名称
    pub fn channel_name(&self, channel: ChannelId) -> Option<String> {
        let index = self.slot(channel)?;
        Some(self.channels.borrow()[index].name.clone())
    }

    /// 已注册频道数量
    pub fn channel_count(&self) -> usize {
        self.channels.borrow().len()
    }

    /// 本总线注册过的频道返回其索引
    fn slot(&self, channel: ChannelId) -> Option<usize> {
        (channel.bus == self.id && channel.index() < self.channels.borrow().len())
            .then(|| channel.index())
    }

    fn check(&self, channel: ChannelId) -> Result<(), BusError> {
        self.slot(channel)
            .map(|_| ())
            .ok_or(BusError::UnknownChannel { channel })
    }

    // ========== 订阅 ==========

    /// 分配新的 handler 身份
    pub fn handler_id(&self) -> HandlerId {
        let id = HandlerId(self.next_handler_id.get());
        self.next_handler_id.set(id.0 + 1);
        id
    }

    /// 订阅频道，返回新分配的 handler 身份
    pub fn subscribe<F>(&self, channel: ChannelId, handler: F) -> Result<HandlerId, BusError>
    where
        F: Fn(&Payload) -> HandlerResult + 'static,
    {
        let id = self.handler_id();
        self.subscribe_with_id(channel, id, handler)?;
        Ok(id)
    }

    /// 以指定身份订阅频道
    ///
    /// # 返回
    /// - `Ok(true)`: 新增订阅
    /// - `Ok(false)`: 该身份已订阅，保持原 handler，不重复投递
    pub fn subscribe_with_id<F>(
        &self,
        channel: ChannelId,
        id: HandlerId,
        handler: F,
    ) -> Result<bool, BusError>
    where
        F: Fn(&Payload) -> HandlerResult + 'static,
    {
        self.check(channel)?;
        let mut channels = self.channels.borrow_mut();
        let entry = &mut channels[channel.index()];
        if entry.handlers.iter().any(|(existing, _)| *existing == id) {
            return Ok(false);
        }
        entry.handlers.push((id, Rc::new(handler)));
        trace!(channel = %entry.name, handler = %id, "订阅");
        Ok(true)
    }

    /// 订阅频道，返回作用域守卫；守卫析构时自动退订
    pub fn subscription<F>(
        self: &Rc<Self>,
        channel: ChannelId,
        handler: F,
    ) -> Result<Subscription, BusError>
    where
        F: Fn(&Payload) -> HandlerResult + 'static,
    {
        let id = self.subscribe(channel, handler)?;
        Ok(Subscription {
            bus: Rc::downgrade(self),
            channel,
            id,
        })
    }

    /// 退订；handler 不存在时什么也不做
    ///
    /// # 返回
    /// 是否确实移除了 handler
    pub fn unsubscribe(&self, channel: ChannelId, id: HandlerId) -> bool {
        let Some(index) = self.slot(channel) else {
            return false;
        };
        let mut channels = self.channels.borrow_mut();
        let entry = &mut channels[index];
        let before = entry.handlers.len();
        entry.handlers.retain(|(existing, _)| *existing != id);
        let removed = entry.handlers.len() != before;
        if removed {
            trace!(channel = %entry.name, handler = %id, "退订");
        }
        removed
    }

    /// handler 是否仍在订阅
    pub fn is_subscribed(&self, channel: ChannelId, id: HandlerId) -> bool {
        self.slot(channel).is_some_and(|index| {
            self.channels.borrow()[index]
                .handlers
                .iter()
                .any(|(existing, _)| *existing == id)
        })
    }

    /// 频道当前订阅数量
    pub fn handler_count(&self, channel: ChannelId) -> usize {
        self.slot(channel)
            .map_or(0, |index| self.channels.borrow()[index].handlers.len())
    }

    // ========== 发布 ==========

    /// 发布事件
    ///
    /// 没有订阅者时静默丢弃。分发进行中时排队，当前分发结束后投递。
    pub fn publish(&self, channel: ChannelId, payload: Payload) -> Result<Delivery, BusError> {
        self.check(channel)?;

        if self.hold_depth.get() > 0 {
            trace!(channel = %channel, "分发进行中，事件排队");
            self.pending.borrow_mut().push_back((channel, payload));
            return Ok(Delivery::Deferred);
        }

        let count = self.dispatch(channel, &payload);
        self.drain();
        Ok(Delivery::Dispatched(count))
    }

    /// 发布无负载事件
    pub fn emit(&self, channel: ChannelId) -> Result<Delivery, BusError> {
        self.publish(channel, Payload::Empty)
    }

    /// 暂缓投递：守卫存活期间的 publish 全部排队，守卫析构时统一投递
    pub fn defer(&self) -> DeferGuard<'_> {
        self.hold_depth.set(self.hold_depth.get() + 1);
        DeferGuard { bus: self }
    }

    /// 排队中的事件数量
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// 累计 handler 失败次数
    pub fn fault_count(&self) -> u64 {
        self.fault_count.get()
    }

    /// 会话结束：清空所有频道的 handler 与排队事件（频道本身保留）
    pub fn clear(&self) {
        for channel in self.channels.borrow_mut().iter_mut() {
            channel.handlers.clear();
        }
        self.pending.borrow_mut().clear();
        debug!("总线已清空");
    }

    fn dispatch(&self, channel: ChannelId, payload: &Payload) -> usize {
        let (name, snapshot): (String, Vec<(HandlerId, Handler)>) = {
            let channels = self.channels.borrow();
            let entry = &channels[channel.index()];
            (entry.name.clone(), entry.handlers.clone())
        };

        self.hold_depth.set(self.hold_depth.get() + 1);
        let mut invoked = 0;
        for (id, handler) in snapshot {
            // 快照之后被退订的 handler 不再接收本次事件
            if !self.is_subscribed(channel, id) {
                continue;
            }
            invoked += 1;
            self.invoke(&name, id, &handler, payload);
        }
        self.hold_depth.set(self.hold_depth.get() - 1);
        invoked
    }

    fn invoke(&self, channel: &str, id: HandlerId, handler: &Handler, payload: &Payload) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(payload)));
        let fault = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(fault)) => fault.0,
            Err(panic) => panic_message(panic.as_ref()),
        };
        self.fault_count.set(self.fault_count.get() + 1);
        warn!(channel = %channel, handler = %id, fault = %fault, "handler 执行失败，继续分发");
    }

    fn drain(&self) {
        while self.hold_depth.get() == 0 {
            let Some((channel, payload)) = self.pop_pending() else {
                break;
            };
            self.dispatch(channel, &payload);
        }
    }

    fn pop_pending(&self) -> Option<(ChannelId, Payload)> {
        self.pending.borrow_mut().pop_front()
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// 暂缓投递守卫
#[must_use = "守卫析构时才会投递排队的事件"]
pub struct DeferGuard<'a> {
    bus: &'a EventBus,
}

impl Drop for DeferGuard<'_> {
    fn drop(&mut self) {
        self.bus.hold_depth.set(self.bus.hold_depth.get() - 1);
        self.bus.drain();
    }
}

/// 作用域订阅
///
/// owner 激活时获取，析构（owner 停用）时退订，保证已拆除的 owner 收不到迟到的回调。
#[must_use = "丢弃 Subscription 会立即退订"]
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<EventBus>,
    channel: ChannelId,
    id: HandlerId,
}

impl Subscription {
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.channel, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type BoxedHandler = Box<dyn Fn(&Payload) -> HandlerResult>;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> BoxedHandler) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_for = log.clone();
        let make = move |tag: &str| {
            let log = log_for.clone();
            let tag = tag.to_string();
            Box::new(move |payload: &Payload| {
                let value = match payload {
                    Payload::Empty => "-".to_string(),
                    Payload::Scalar(v) => v.to_string(),
                    Payload::Text(s) => s.clone(),
                };
                log.borrow_mut().push(format!("{tag}:{value}"));
                Ok(())
            }) as BoxedHandler
        };
        (log, make)
    }

    #[test]
    fn test_channel_registration() {
        let bus = EventBus::new();
        let a = bus.channel("task-completed").unwrap();
        let b = bus.channel("shutdown").unwrap();
        assert_ne!(a, b);
        assert_eq!(bus.channel("task-completed").unwrap(), a);
        assert_eq!(bus.lookup("shutdown"), Some(b));
        assert_eq!(bus.channel_name(a).as_deref(), Some("task-completed"));
        assert_eq!(bus.channel(""), Err(BusError::EmptyChannelName));
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::new();
        let c = bus.channel("nobody").unwrap();
        assert_eq!(bus.emit(c).unwrap(), Delivery::Dispatched(0));
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_unknown_channel() {
        let bus = EventBus::new();
        let other = EventBus::new();
        other.channel("a").unwrap();
        let foreign = other.channel("b").unwrap();

        assert_eq!(
            bus.emit(foreign),
            Err(BusError::UnknownChannel { channel: foreign })
        );
        assert!(bus.subscribe(foreign, |_| Ok(())).is_err());
    }

    /// 其他总线的频道索引在本总线范围内时同样拒绝，不会投递到同索引的频道
    #[test]
    fn test_foreign_channel_with_local_index_is_rejected() {
        let bus = EventBus::new();
        let x = bus.channel("x").unwrap();
        let y = bus.channel("y").unwrap();
        let (log, make) = recorder();
        bus.subscribe(x, make("x")).unwrap();
        bus.subscribe(y, make("y")).unwrap();

        let other = EventBus::new();
        other.channel("a").unwrap();
        let foreign = other.channel("b").unwrap();
        assert_eq!(foreign.index(), y.index());

        assert_eq!(
            bus.emit(foreign),
            Err(BusError::UnknownChannel { channel: foreign })
        );
        assert!(bus.subscribe(foreign, |_| Ok(())).is_err());
        assert_eq!(bus.channel_name(foreign), None);
        assert_eq!(bus.handler_count(foreign), 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_dispatch_in_subscription_order() {
        let bus = EventBus::new();
        let c = bus.channel("tick").unwrap();
        let (log, make) = recorder();
        bus.subscribe(c, make("first")).unwrap();
        bus.subscribe(c, make("second")).unwrap();

        bus.publish(c, Payload::Scalar(1.0)).unwrap();
        bus.publish(c, Payload::Scalar(2.0)).unwrap();

        insta::assert_snapshot!(log.borrow().join("\n"), @r"
        first:1
        second:1
        first:2
        second:2
        ");
    }

    #[test]
    fn test_unsubscribe_is_symmetric() {
        let bus = EventBus::new();
        let c = bus.channel("c").unwrap();
        let (log, make) = recorder();
        let h = bus.subscribe(c, make("h")).unwrap();
        let other = bus.subscribe(c, make("other")).unwrap();

        assert!(bus.unsubscribe(c, h));
        // 重复退订是 no-op
        assert!(!bus.unsubscribe(c, h));

        bus.emit(c).unwrap();
        assert_eq!(*log.borrow(), vec!["other:-".to_string()]);
        assert!(bus.is_subscribed(c, other));
    }

    #[test]
    fn test_duplicate_identity_not_delivered_twice() {
        let bus = EventBus::new();
        let c = bus.channel("c").unwrap();
        let (log, make) = recorder();
        let id = bus.handler_id();

        assert!(bus.subscribe_with_id(c, id, make("h")).unwrap());
        assert!(!bus.subscribe_with_id(c, id, make("h")).unwrap());
        assert_eq!(bus.handler_count(c), 1);

        bus.emit(c).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_handler_added_during_dispatch_waits_for_next_publish() {
        let bus = Rc::new(EventBus::new());
        let c = bus.channel("c").unwrap();
        let (log, make) = recorder();

        let late = Rc::new(RefCell::new(Some(make("late"))));
        let bus_in = bus.clone();
        bus.subscribe(c, move |_| {
            if let Some(handler) = late.borrow_mut().take() {
                bus_in
                    .subscribe(c, handler)
                    .map_err(|e| HandlerFault::new(e.to_string()))?;
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(bus.emit(c).unwrap(), Delivery::Dispatched(1));
        assert!(log.borrow().is_empty());

        bus.emit(c).unwrap();
        assert_eq!(*log.borrow(), vec!["late:-".to_string()]);
    }

    #[test]
    fn test_handler_removed_during_dispatch_is_skipped() {
        let bus = Rc::new(EventBus::new());
        let c = bus.channel("c").unwrap();
        let (log, make) = recorder();

        let victim = Rc::new(Cell::new(None::<HandlerId>));
        let victim_in = victim.clone();
        let bus_in = bus.clone();
        bus.subscribe(c, move |_| {
            if let Some(id) = victim_in.get() {
                bus_in.unsubscribe(c, id);
            }
            Ok(())
        })
        .unwrap();
        victim.set(Some(bus.subscribe(c, make("victim")).unwrap()));

        bus.emit(c).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_publish_from_handler_is_deferred() {
        let bus = Rc::new(EventBus::new());
        let first = bus.channel("first").unwrap();
        let second = bus.channel("second").unwrap();
        let (log, make) = recorder();

        let bus_in = bus.clone();
        let inner_log = log.clone();
        bus.subscribe(first, move |_| {
            let delivery = bus_in
                .emit(second)
                .map_err(|e| HandlerFault::new(e.to_string()))?;
            assert_eq!(delivery, Delivery::Deferred);
            inner_log.borrow_mut().push("first:done".to_string());
            Ok(())
        })
        .unwrap();
        bus.subscribe(first, make("first-b")).unwrap();
        bus.subscribe(second, make("second")).unwrap();

        bus.emit(first).unwrap();

        insta::assert_snapshot!(log.borrow().join("\n"), @r"
        first:done
        first-b:-
        second:-
        ");
    }

    #[test]
    fn test_defer_guard_holds_until_drop() {
        let bus = EventBus::new();
        let c = bus.channel("c").unwrap();
        let (log, make) = recorder();
        bus.subscribe(c, make("h")).unwrap();

        {
            let _hold = bus.defer();
            assert_eq!(bus.emit(c).unwrap(), Delivery::Deferred);
            assert!(log.borrow().is_empty());
            assert_eq!(bus.pending_count(), 1);
        }

        assert_eq!(log.borrow().len(), 1);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_fault_is_isolated() {
        let bus = EventBus::new();
        let c = bus.channel("c").unwrap();
        let (log, make) = recorder();

        bus.subscribe(c, |_| Err(HandlerFault::new("boom"))).unwrap();
        bus.subscribe(c, |_| panic!("kaboom")).unwrap();
        bus.subscribe(c, make("survivor")).unwrap();

        assert_eq!(bus.emit(c).unwrap(), Delivery::Dispatched(3));
        assert_eq!(*log.borrow(), vec!["survivor:-".to_string()]);
        assert_eq!(bus.fault_count(), 2);
    }

    #[test]
    fn test_subscription_guard_unsubscribes_on_drop() {
        let bus = Rc::new(EventBus::new());
        let c = bus.channel("c").unwrap();
        let (log, make) = recorder();

        let guard = bus.subscription(c, make("scoped")).unwrap();
        bus.emit(c).unwrap();
        drop(guard);
        bus.emit(c).unwrap();

        assert_eq!(log.borrow().len(), 1);
        assert_eq!(bus.handler_count(c), 0);
    }

    #[test]
    fn test_clear_drops_all_handlers() {
        let bus = EventBus::new();
        let a = bus.channel("a").unwrap();
        let b = bus.channel("b").unwrap();
        bus.subscribe(a, |_| Ok(())).unwrap();
        bus.subscribe(b, |_| Ok(())).unwrap();

        bus.clear();
        assert_eq!(bus.handler_count(a), 0);
        assert_eq!(bus.handler_count(b), 0);
        // 频道保留
        assert_eq!(bus.lookup("a"), Some(a));
    }

    #[test]
    fn test_payload_accessors() {
        assert_eq!(Payload::Scalar(0.5).as_scalar(), Some(0.5));
        assert_eq!(Payload::Empty.as_scalar(), None);
        assert_eq!(Payload::Text("x".into()).as_text(), Some("x"));

        let json = serde_json::to_string(&Payload::Scalar(0.25)).unwrap();
        let back: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Payload::Scalar(0.25));
    }
}
