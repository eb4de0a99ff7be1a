//! # Session 模块
//!
//! 会话：持有事件总线与序列调度器，是唯一的 tick 驱动入口。
//!
//! ## 执行模型
//!
//! ```text
//! Host                              Session
//!   │── bus.publish(..) ───────────►│ 立即分发（在下一次 advance 之前可见）
//!   │                               │
//!   │── advance(dt) ───────────────►│ defer(bus) → scheduler.tick(dt) → 投递期间排队的事件
//!   │◄── Vec<SequenceEvent> ────────│
//!   │                               │
//!   │── teardown() ────────────────►│ 取消全部序列、清空全部 handler
//! ```
//!
//! 调度器以 `Rc<RefCell<_>>` 共享，handler 可以在分发时启动序列；
//! 调度器推进期间发出的事件会推迟到推进结束后才投递，因此 handler 不会与 tick 重入。

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::bus::{ChannelId, EventBus};
use crate::error::{BusError, SchedulerError};
use crate::scheduler::{OwnerId, SequenceEvent, SequenceScheduler};
use crate::sequence::{Sequence, SequenceId};

/// 共享的调度器
pub type SharedScheduler = Rc<RefCell<SequenceScheduler>>;

/// 会话
#[derive(Debug)]
pub struct Session {
    bus: Rc<EventBus>,
    scheduler: SharedScheduler,
    ticks: u64,
    /// 会话累计时间（秒）
    clock: f64,
    closed: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        debug!("会话开始");
        Self {
            bus: Rc::new(EventBus::new()),
            scheduler: Rc::new(RefCell::new(SequenceScheduler::new())),
            ticks: 0,
            clock: 0.0,
            closed: false,
        }
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn scheduler(&self) -> &SharedScheduler {
        &self.scheduler
    }

    /// 注册频道
    pub fn channel(&self, name: &str) -> Result<ChannelId, BusError> {
        self.bus.channel(name)
    }

    /// 在 owner 上启动序列
    ///
    /// 启动时写入的初始值如果触发了事件，事件在启动完成后才投递。
    pub fn start(
        &self,
        owner: OwnerId,
        sequence: Sequence,
    ) -> Result<SequenceId, SchedulerError> {
        let hold = self.bus.defer();
        let started = self.scheduler.borrow_mut().start(owner, sequence);
        drop(hold);
        started
    }

    /// 推进一个 tick
    pub fn advance(&mut self, dt: f32) -> Vec<SequenceEvent> {
        if self.closed {
            warn!("会话已结束，忽略 advance");
            return Vec::new();
        }

        let hold = self.bus.defer();
        let events = self.scheduler.borrow_mut().tick(dt);
        drop(hold);

        self.ticks += 1;
        if dt.is_finite() && dt > 0.0 {
            self.clock += f64::from(dt);
        }
        events
    }

    /// 已推进的 tick 数
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// 会话累计时间（秒）
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 结束会话：取消全部序列、注销全部 owner、清空全部 handler
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.scheduler.borrow_mut().clear();
        self.bus.clear();
        self.closed = true;
        debug!(ticks = self.ticks, clock = self.clock, "会话结束");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::HandlerFault;
    use crate::curve::StageValue;
    use crate::scheduler::FadeTarget;
    use crate::sequence::Stage;
    use std::cell::Cell;

    struct Level {
        value: Cell<f32>,
        bus: Rc<EventBus>,
        channel: ChannelId,
    }

    impl FadeTarget for Level {
        fn apply(&self, value: StageValue) {
            if let Some(v) = value.as_scalar() {
                self.value.set(v);
                let _ = self.bus.emit(self.channel);
            }
        }
    }

    #[test]
    fn test_publish_during_step_is_deferred() {
        let mut session = Session::new();
        let written = session.channel("written").unwrap();
        let level = Rc::new(Level {
            value: Cell::new(0.0),
            bus: session.bus().clone(),
            channel: written,
        });
        let owner = session
            .scheduler()
            .borrow_mut()
            .register("level", level.clone())
            .unwrap();

        // handler 在分发时访问调度器：推进期间事件被推迟，所以不会出现 RefCell 冲突
        let scheduler = session.scheduler().clone();
        let seen_running = Rc::new(Cell::new(0));
        let seen = seen_running.clone();
        session
            .bus()
            .subscribe(written, move |_| {
                let scheduler = scheduler
                    .try_borrow()
                    .map_err(|_| HandlerFault::new("scheduler busy"))?;
                if scheduler.is_running(owner) {
                    seen.set(seen.get() + 1);
                }
                Ok(())
            })
            .unwrap();

        session
            .start(owner, Sequence::new("s").fade(Stage::scalar(0.0, 1.0, 1.0)))
            .unwrap();
        session.advance(0.5);

        assert_eq!(session.bus().fault_count(), 0);
        assert!(seen_running.get() >= 1);
        assert_eq!(session.bus().pending_count(), 0);
    }

    #[test]
    fn test_handler_can_start_sequence() {
        let mut session = Session::new();
        let go = session.channel("go").unwrap();
        let level = Rc::new(Level {
            value: Cell::new(0.0),
            bus: session.bus().clone(),
            channel: session.channel("unused").unwrap(),
        });
        let owner = session
            .scheduler()
            .borrow_mut()
            .register("level", level.clone())
            .unwrap();

        let scheduler = session.scheduler().clone();
        session
            .bus()
            .subscribe(go, move |_| {
                scheduler
                    .borrow_mut()
                    .start(owner, Sequence::new("s").fade(Stage::scalar(0.0, 1.0, 0.5)))
                    .map_err(|e| HandlerFault::new(e.to_string()))?;
                Ok(())
            })
            .unwrap();

        session.bus().emit(go).unwrap();
        session.advance(1.0);
        assert_eq!(level.value.get(), 1.0);
    }

    #[test]
    fn test_clock_and_teardown() {
        let mut session = Session::new();
        let c = session.channel("c").unwrap();
        session.bus().subscribe(c, |_| Ok(())).unwrap();

        session.advance(0.25);
        session.advance(0.25);
        session.advance(-1.0);
        assert_eq!(session.ticks(), 3);
        assert!((session.clock() - 0.5).abs() < 1e-9);

        session.teardown();
        assert!(session.is_closed());
        assert_eq!(session.bus().handler_count(c), 0);
        assert!(session.advance(1.0).is_empty());
        assert_eq!(session.ticks(), 3);
    }
}
