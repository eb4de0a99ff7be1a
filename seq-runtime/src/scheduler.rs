//! # Scheduler 模块
//!
//! 协作式、由外部 tick 驱动的序列调度器。
//!
//! ## 执行模型
//!
//! - 每个 owner 独占一个 [`FadeTarget`]，同一时刻最多运行一个序列
//! - 在已有序列运行的 owner 上启动新序列，会先取消旧序列（不会出现两个序列交错写同一目标）
//! - 挂起状态只有 `(步骤索引, 步骤内已用时间)`，没有额外的栈
//! - 某一步在 tick 中途结束时，剩余时间顺延给下一步，序列总时长与各步时长之和的误差不超过一个 tick
//! - 取消立即生效：目标停留在最后一次写入的值，不会写入半个阶段
//! - 已结束序列的状态只保留最近 [`FINISHED_HISTORY`] 条，更早的查询结果为 Idle
//!
//! ```text
//! tick(dt)
//!   └─ for owner in owners (按 OwnerId 顺序)
//!        └─ step(cursor, dt) ──► target.apply(value)
//!                            └─► SequenceEvent::{Started, Completed, Cancelled}
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::curve::StageValue;
use crate::error::SchedulerError;
use crate::sequence::{Sequence, SequenceId, SequenceState, Step};

/// 序列写入的目标
///
/// 由 owner 独占；实现方自己决定如何使用收到的值（文字颜色、效果强度……）。
pub trait FadeTarget {
    fn apply(&self, value: StageValue);
}

/// owner 标识（由调度器分配）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OwnerId({})", self.0)
    }
}

/// 调度事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    Started { owner: OwnerId, sequence: SequenceId },
    Completed { owner: OwnerId, sequence: SequenceId },
    Cancelled { owner: OwnerId, sequence: SequenceId },
}

impl SequenceEvent {
    pub fn owner(&self) -> OwnerId {
        match self {
            Self::Started { owner, .. }
            | Self::Completed { owner, .. }
            | Self::Cancelled { owner, .. } => *owner,
        }
    }

    pub fn sequence(&self) -> SequenceId {
        match self {
            Self::Started { sequence, .. }
            | Self::Completed { sequence, .. }
            | Self::Cancelled { sequence, .. } => *sequence,
        }
    }
}

/// 挂起点
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cursor {
    /// 当前步骤索引
    pub step: usize,
    /// 当前步骤内已用时间（秒）
    pub elapsed: f32,
}

/// 正在运行的序列
struct RunningSequence {
    id: SequenceId,
    sequence: Sequence,
    cursor: Cursor,
}

impl RunningSequence {
    /// 推进 `dt` 秒
    ///
    /// # 返回
    /// - `true`: 序列已走完
    /// - `false`: 仍在某一步中挂起
    fn advance(&mut self, target: &dyn FadeTarget, dt: f32) -> bool {
        let mut budget = dt;
        loop {
            let Some(step) = self.sequence.steps.get(self.cursor.step) else {
                return true;
            };

            match step {
                Step::Wait(secs) => {
                    let remaining = secs - self.cursor.elapsed;
                    if budget < remaining {
                        self.cursor.elapsed += budget;
                        return false;
                    }
                    budget -= remaining.max(0.0);
                }
                Step::Fade(stage) => {
                    let remaining = stage.duration - self.cursor.elapsed;
                    if budget < remaining {
                        self.cursor.elapsed += budget;
                        target.apply(stage.value_at(self.cursor.elapsed));
                        return false;
                    }
                    budget -= remaining.max(0.0);
                    target.apply(stage.end_value());
                }
            }

            self.cursor = Cursor {
                step: self.cursor.step + 1,
                elapsed: 0.0,
            };
        }
    }
}

/// 保留状态的已结束序列数量
pub const FINISHED_HISTORY: usize = 64;

/// 已注册的 owner
struct OwnerSlot {
    label: String,
    target: Rc<dyn FadeTarget>,
    active: bool,
    running: Option<RunningSequence>,
}

/// 序列调度器
pub struct SequenceScheduler {
    owners: BTreeMap<OwnerId, OwnerSlot>,
    states: HashMap<SequenceId, SequenceState>,
    /// 已结束序列，按结束先后排列
    finished: VecDeque<SequenceId>,
    next_owner_id: u64,
    next_sequence_id: u64,
    /// 待返回的事件
    events: Vec<SequenceEvent>,
}

impl Default for SequenceScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SequenceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceScheduler")
            .field("owners", &self.owners.len())
            .field("running", &self.running_count())
            .finish()
    }
}

impl SequenceScheduler {
    pub fn new() -> Self {
        Self {
            owners: BTreeMap::new(),
            states: HashMap::new(),
            finished: VecDeque::new(),
            next_owner_id: 1,
            next_sequence_id: 1,
            events: Vec::new(),
        }
    }

    // ========== owner 管理 ==========

    /// 注册 owner 及其独占目标
    ///
    /// 同一个目标不能被两个 owner 注册。
    pub fn register(
        &mut self,
        label: impl Into<String>,
        target: Rc<dyn FadeTarget>,
    ) -> Result<OwnerId, SchedulerError> {
        let addr = Rc::as_ptr(&target) as *const ();
        if let Some((owner, _)) = self
            .owners
            .iter()
            .find(|(_, slot)| Rc::as_ptr(&slot.target) as *const () == addr)
        {
            return Err(SchedulerError::TargetAlreadyOwned { owner: *owner });
        }

        let id = OwnerId(self.next_owner_id);
        self.next_owner_id += 1;
        let label = label.into();
        debug!(owner = %id, label = %label, "注册 owner");
        self.owners.insert(
            id,
            OwnerSlot {
                label,
                target,
                active: true,
                running: None,
            },
        );
        Ok(id)
    }

    /// 注销 owner（运行中的序列被取消）
    pub fn unregister(&mut self, owner: OwnerId) {
        self.cancel(owner);
        self.owners.remove(&owner);
    }

    /// 停用 owner：立即取消运行中的序列，之后拒绝启动新序列
    pub fn deactivate(&mut self, owner: OwnerId) {
        self.cancel(owner);
        if let Some(slot) = self.owners.get_mut(&owner) {
            slot.active = false;
        }
    }

    /// 重新激活 owner
    pub fn activate(&mut self, owner: OwnerId) {
        if let Some(slot) = self.owners.get_mut(&owner) {
            slot.active = true;
        }
    }

    pub fn is_registered(&self, owner: OwnerId) -> bool {
        self.owners.contains_key(&owner)
    }

    pub fn is_active(&self, owner: OwnerId) -> bool {
        self.owners.get(&owner).is_some_and(|slot| slot.active)
    }

    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    // ========== 序列控制 ==========

    /// 在 owner 上启动序列
    ///
    /// owner 已有序列在运行时，先取消旧序列再启动新序列。
    /// 开头的零时长步骤会立即结算，第一个阶段的起始值会立即写入目标。
    pub fn start(
        &mut self,
        owner: OwnerId,
        sequence: Sequence,
    ) -> Result<SequenceId, SchedulerError> {
        let Some(slot) = self.owners.get(&owner) else {
            return Err(SchedulerError::UnknownOwner { owner });
        };
        if !slot.active {
            return Err(SchedulerError::OwnerInactive { owner });
        }
        if sequence.is_empty() {
            return Err(SchedulerError::EmptySequence {
                name: sequence.name,
            });
        }

        self.cancel(owner);

        let id = SequenceId(self.next_sequence_id);
        self.next_sequence_id += 1;
        debug!(owner = %owner, sequence = %id, name = %sequence.name, "启动序列");

        let mut running = RunningSequence {
            id,
            sequence,
            cursor: Cursor::default(),
        };
        self.states.insert(id, SequenceState::Running);
        self.events.push(SequenceEvent::Started {
            owner,
            sequence: id,
        });

        let Some(slot) = self.owners.get_mut(&owner) else {
            return Err(SchedulerError::UnknownOwner { owner });
        };
        if running.advance(slot.target.as_ref(), 0.0) {
            self.finish(owner, id);
        } else {
            slot.running = Some(running);
        }
        Ok(id)
    }

    /// 取消 owner 上运行中的序列；目标保持最后写入的值
    ///
    /// # 返回
    /// 被取消的序列 ID
    pub fn cancel(&mut self, owner: OwnerId) -> Option<SequenceId> {
        let running = self.owners.get_mut(&owner)?.running.take()?;
        debug!(owner = %owner, sequence = %running.id, step = running.cursor.step, "取消序列");
        self.record_finished(running.id, SequenceState::Cancelled);
        self.events.push(SequenceEvent::Cancelled {
            owner,
            sequence: running.id,
        });
        Some(running.id)
    }

    /// 取消全部序列并注销全部 owner
    pub fn clear(&mut self) {
        let owners: Vec<OwnerId> = self.owners.keys().copied().collect();
        for owner in owners {
            self.unregister(owner);
        }
    }

    /// 推进所有运行中的序列
    ///
    /// `dt` 为负数或非有限值时按 0 处理。
    ///
    /// # 返回
    /// 自上次 tick 以来产生的事件（包括 start/cancel 产生的事件）
    pub fn tick(&mut self, dt: f32) -> Vec<SequenceEvent> {
        let dt = sanitize_dt(dt);
        let mut completed = Vec::new();

        for (owner, slot) in &mut self.owners {
            let Some(running) = slot.running.as_mut() else {
                continue;
            };
            if running.advance(slot.target.as_ref(), dt) {
                completed.push((*owner, running.id));
                slot.running = None;
            }
        }

        for (owner, id) in completed {
            self.finish(owner, id);
        }

        std::mem::take(&mut self.events)
    }

    fn finish(&mut self, owner: OwnerId, id: SequenceId) {
        let label = self
            .owners
            .get(&owner)
            .map(|slot| slot.label.as_str())
            .unwrap_or_default();
        debug!(owner = %owner, label = %label, sequence = %id, "序列完成");
        self.record_finished(id, SequenceState::Completed);
        self.events.push(SequenceEvent::Completed {
            owner,
            sequence: id,
        });
    }

    fn record_finished(&mut self, id: SequenceId, state: SequenceState) {
        self.states.insert(id, state);
        self.finished.push_back(id);
        while self.finished.len() > FINISHED_HISTORY {
            if let Some(evicted) = self.finished.pop_front() {
                self.states.remove(&evicted);
            }
        }
    }

    // ========== 查询 ==========

    /// owner 是否有序列在运行
    pub fn is_running(&self, owner: OwnerId) -> bool {
        self.running_sequence(owner).is_some()
    }

    /// owner 当前运行的序列
    pub fn running_sequence(&self, owner: OwnerId) -> Option<SequenceId> {
        self.owners.get(&owner)?.running.as_ref().map(|r| r.id)
    }

    /// owner 当前的挂起点
    pub fn cursor(&self, owner: OwnerId) -> Option<Cursor> {
        self.owners.get(&owner)?.running.as_ref().map(|r| r.cursor)
    }

    /// 序列状态
    ///
    /// 未知 ID 以及超出保留数量、已被淘汰的旧序列都视为 Idle。
    pub fn state(&self, sequence: SequenceId) -> SequenceState {
        self.states.get(&sequence).copied().unwrap_or_default()
    }

    /// 运行中的序列数量
    pub fn running_count(&self) -> usize {
        self.owners
            .values()
            .filter(|slot| slot.running.is_some())
            .count()
    }
}

fn sanitize_dt(dt: f32) -> f32 {
    if dt.is_finite() && dt >= 0.0 {
        dt
    } else {
        warn!(dt = dt, "无效的 dt，按 0 处理");
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Curve;
    use crate::sequence::Stage;
    use std::cell::RefCell;

    /// 记录每次写入的测试目标
    #[derive(Default)]
    struct Probe {
        writes: RefCell<Vec<f32>>,
    }

    impl Probe {
        fn last(&self) -> Option<f32> {
            self.writes.borrow().last().copied()
        }

        fn count(&self) -> usize {
            self.writes.borrow().len()
        }
    }

    impl FadeTarget for Probe {
        fn apply(&self, value: StageValue) {
            if let Some(v) = value.as_scalar() {
                self.writes.borrow_mut().push(v);
            }
        }
    }

    fn setup() -> (SequenceScheduler, Rc<Probe>, OwnerId) {
        let mut scheduler = SequenceScheduler::new();
        let probe = Rc::new(Probe::default());
        let owner = scheduler.register("probe", probe.clone()).unwrap();
        (scheduler, probe, owner)
    }

    fn linear(from: f32, to: f32, duration: f32) -> Stage {
        Stage::scalar(from, to, duration).with_curve(Curve::Linear)
    }

    #[test]
    fn test_finished_states_are_bounded() {
        let (mut scheduler, _probe, owner) = setup();

        let ids: Vec<SequenceId> = (0..FINISHED_HISTORY + 10)
            .map(|i| {
                scheduler
                    .start(owner, Sequence::new(format!("s{i}")).wait(1.0))
                    .unwrap()
            })
            .collect();
        let last = *ids.last().unwrap();

        // 每次 start 都取消前一个，最后一个仍在运行
        assert_eq!(scheduler.state(last), SequenceState::Running);
        assert_eq!(scheduler.state(ids[0]), SequenceState::Idle);
        assert_eq!(
            scheduler.state(ids[ids.len() - 2]),
            SequenceState::Cancelled
        );
        assert_eq!(scheduler.states.len(), FINISHED_HISTORY + 1);

        scheduler.tick(1.0);
        assert_eq!(scheduler.state(last), SequenceState::Completed);
        assert_eq!(scheduler.states.len(), FINISHED_HISTORY);
    }

    #[test]
    fn test_register_rejects_shared_target() {
        let (mut scheduler, probe, owner) = setup();
        let err = scheduler.register("again", probe).unwrap_err();
        assert_eq!(err, SchedulerError::TargetAlreadyOwned { owner });
    }

    #[test]
    fn test_start_errors() {
        let (mut scheduler, _probe, owner) = setup();

        let empty = scheduler.start(owner, Sequence::new("empty"));
        assert!(matches!(empty, Err(SchedulerError::EmptySequence { .. })));

        scheduler.deactivate(owner);
        let inactive = scheduler.start(owner, Sequence::new("s").wait(1.0));
        assert_eq!(inactive, Err(SchedulerError::OwnerInactive { owner }));

        scheduler.unregister(owner);
        let unknown = scheduler.start(owner, Sequence::new("s").wait(1.0));
        assert_eq!(unknown, Err(SchedulerError::UnknownOwner { owner }));
    }

    #[test]
    fn test_steps_run_in_order() {
        let (mut scheduler, probe, owner) = setup();
        let id = scheduler
            .start(
                owner,
                Sequence::new("s")
                    .wait(0.5)
                    .fade(linear(0.0, 1.0, 1.0))
                    .fade(linear(1.0, 0.0, 1.0)),
            )
            .unwrap();

        // 等待期间不写入
        scheduler.tick(0.25);
        assert_eq!(probe.count(), 0);
        assert_eq!(scheduler.cursor(owner), Some(Cursor { step: 0, elapsed: 0.25 }));

        // 0.25 结束等待，剩余 0.25 进入第一个阶段
        scheduler.tick(0.5);
        assert!((probe.last().unwrap() - 0.25).abs() < 1e-6);

        scheduler.tick(0.75);
        assert_eq!(scheduler.cursor(owner).unwrap().step, 2);

        let events = scheduler.tick(10.0);
        assert_eq!(probe.last(), Some(0.0));
        assert!(events.contains(&SequenceEvent::Completed { owner, sequence: id }));
        assert_eq!(scheduler.state(id), SequenceState::Completed);
        assert!(!scheduler.is_running(owner));
    }

    #[test]
    fn test_start_writes_initial_value() {
        let (mut scheduler, probe, owner) = setup();
        scheduler
            .start(owner, Sequence::new("s").fade(linear(0.3, 1.0, 1.0)))
            .unwrap();
        assert_eq!(probe.last(), Some(0.3));
    }

    #[test]
    fn test_end_value_is_exact() {
        let (mut scheduler, probe, owner) = setup();
        scheduler
            .start(owner, Sequence::new("s").fade(Stage::scalar(0.0, 0.7, 1.0)))
            .unwrap();
        for _ in 0..300 {
            scheduler.tick(1.0 / 60.0);
        }
        assert_eq!(probe.last(), Some(0.7));
    }

    #[test]
    fn test_zero_duration_stage_snaps() {
        let (mut scheduler, probe, owner) = setup();
        let id = scheduler
            .start(
                owner,
                Sequence::new("snap")
                    .fade(linear(0.0, 0.4, 0.0))
                    .fade(linear(0.4, 0.9, -1.0)),
            )
            .unwrap();

        // 全部步骤在启动时结算
        assert_eq!(probe.last(), Some(0.9));
        assert_eq!(scheduler.state(id), SequenceState::Completed);
        let events = scheduler.tick(0.0);
        assert_eq!(
            events,
            vec![
                SequenceEvent::Started { owner, sequence: id },
                SequenceEvent::Completed { owner, sequence: id },
            ]
        );
    }

    #[test]
    fn test_restart_cancels_previous() {
        let (mut scheduler, probe, owner) = setup();
        let a = scheduler
            .start(owner, Sequence::new("a").fade(linear(0.0, 1.0, 1.0)))
            .unwrap();
        scheduler.tick(0.5);
        scheduler.tick(0.0);

        let writes_before = probe.count();
        let b = scheduler
            .start(owner, Sequence::new("b").fade(linear(10.0, 20.0, 1.0)))
            .unwrap();

        assert_eq!(scheduler.state(a), SequenceState::Cancelled);
        assert_eq!(scheduler.running_sequence(owner), Some(b));

        let events = scheduler.tick(0.5);
        assert_eq!(
            events,
            vec![
                SequenceEvent::Cancelled { owner, sequence: a },
                SequenceEvent::Started { owner, sequence: b },
            ]
        );

        // B 启动之后只出现 B 的值
        let writes = probe.writes.borrow();
        assert!(writes[writes_before..].iter().all(|v| *v >= 10.0));
    }

    #[test]
    fn test_cancel_freezes_value() {
        let (mut scheduler, probe, owner) = setup();
        let id = scheduler
            .start(
                owner,
                Sequence::new("s")
                    .fade(linear(0.0, 1.0, 1.0))
                    .fade(linear(1.0, 5.0, 1.0)),
            )
            .unwrap();
        scheduler.tick(0.4);
        let frozen = probe.last().unwrap();
        let count = probe.count();

        assert_eq!(scheduler.cancel(owner), Some(id));
        for _ in 0..10 {
            scheduler.tick(0.5);
        }

        assert_eq!(probe.last(), Some(frozen));
        assert_eq!(probe.count(), count);
        assert_eq!(scheduler.state(id), SequenceState::Cancelled);
        assert_eq!(scheduler.cancel(owner), None);
    }

    #[test]
    fn test_deactivate_invalidates_continuation() {
        let (mut scheduler, probe, owner) = setup();
        scheduler
            .start(owner, Sequence::new("s").wait(0.1).fade(linear(0.0, 1.0, 1.0)))
            .unwrap();
        scheduler.deactivate(owner);
        scheduler.tick(5.0);
        assert_eq!(probe.count(), 0);
        assert!(!scheduler.is_active(owner));

        scheduler.activate(owner);
        assert!(scheduler
            .start(owner, Sequence::new("again").wait(1.0))
            .is_ok());
    }

    #[test]
    fn test_total_time_within_one_tick() {
        let (mut scheduler, _probe, owner) = setup();
        let seq = Sequence::new("timed")
            .fade(linear(0.0, 1.0, 0.5))
            .wait(2.5)
            .fade(linear(1.0, 0.0, 0.5));
        let expected = seq.total_duration();
        scheduler.start(owner, seq).unwrap();

        let dt = 1.0 / 60.0;
        let mut elapsed = 0.0;
        loop {
            elapsed += dt;
            let events = scheduler.tick(dt);
            if events
                .iter()
                .any(|e| matches!(e, SequenceEvent::Completed { .. }))
            {
                break;
            }
            assert!(elapsed < expected + 1.0, "sequence never completed");
        }
        assert!((elapsed - expected).abs() <= dt + 1e-4);
    }

    #[test]
    fn test_invalid_dt_is_ignored() {
        let (mut scheduler, _probe, owner) = setup();
        scheduler.start(owner, Sequence::new("s").wait(1.0)).unwrap();
        scheduler.tick(-1.0);
        scheduler.tick(f32::NAN);
        assert_eq!(scheduler.cursor(owner), Some(Cursor { step: 0, elapsed: 0.0 }));
    }

    #[test]
    fn test_clear() {
        let (mut scheduler, _probe, owner) = setup();
        scheduler.start(owner, Sequence::new("s").wait(1.0)).unwrap();
        scheduler.clear();
        assert_eq!(scheduler.owner_count(), 0);
        assert_eq!(scheduler.running_count(), 0);
    }
}
