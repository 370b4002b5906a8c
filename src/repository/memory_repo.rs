// ==========================================
// 再制造工厂仿真 - 内存仓储
// ==========================================
// 职责: 同时实现 OrderRepository 与 QueueRepository，用于回放与测试
// 原子性: 在状态副本上应用批次，全部成功后整体替换
// ==========================================

use crate::domain::order::{Order, PhaseHistoryEntry};
use crate::domain::queue::{sort_fcfs, QueueEntry};
use crate::domain::transition::{check_not_backdated, QueueOp, TransitionBatch};
use crate::domain::types::{Phase, QueueStage, SimMinute};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::order_repo::OrderRepository;
use crate::repository::queue_repo::QueueRepository;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

type QueueKey = (String, QueueStage, String);

#[derive(Debug, Clone, Default)]
struct MemoryState {
    orders: BTreeMap<String, Order>,
    queues: BTreeMap<QueueKey, QueueEntry>,
    windows: BTreeMap<(String, QueueStage), SimMinute>,
}

impl MemoryState {
    fn order_mut(&mut self, factory_id: &str, order_id: &str) -> RepositoryResult<&mut Order> {
        self.orders
            .get_mut(order_id)
            .filter(|o| o.factory_id == factory_id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "customer_order".to_string(),
                id: order_id.to_string(),
            })
    }

    fn push_phase(order: &mut Order, to: Phase, sim_minute: SimMinute) -> RepositoryResult<()> {
        check_not_backdated(order.last_recorded_minute(), sim_minute).map_err(|reason| {
            RepositoryError::InvalidStateTransition {
                order_id: order.order_id.clone(),
                from: order.phase.to_string(),
                to: to.to_string(),
                reason,
            }
        })?;
        order.phase_history.push(PhaseHistoryEntry {
            from_phase: order.phase,
            to_phase: to,
            sim_minute,
        });
        order.phase = to;
        if to.is_terminal() {
            order.final_completion_sim_minute = Some(sim_minute);
        }
        Ok(())
    }

    fn insert_order(&mut self, order: &Order) -> RepositoryResult<()> {
        order.check_invariants().map_err(RepositoryError::ValidationError)?;
        if self.orders.contains_key(&order.order_id) {
            return Err(RepositoryError::DuplicateEntry {
                entity: "customer_order".to_string(),
                id: order.order_id.clone(),
            });
        }
        self.orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    fn enqueue(&mut self, entry: &QueueEntry) -> RepositoryResult<()> {
        entry.payload.validate().map_err(RepositoryError::ValidationError)?;
        let queued = self
            .queues
            .keys()
            .find(|(f, _, o)| *f == entry.factory_id && *o == entry.order_id);
        if let Some((_, stage, _)) = queued {
            return Err(RepositoryError::DuplicateEntry {
                entity: format!("queue_entry[{}]", stage),
                id: entry.order_id.clone(),
            });
        }
        let key = (entry.factory_id.clone(), entry.stage, entry.order_id.clone());
        self.queues.insert(key, entry.clone());
        Ok(())
    }

    fn dequeue(&mut self, factory_id: &str, stage: QueueStage, order_id: &str) -> RepositoryResult<QueueEntry> {
        self.queues
            .remove(&(factory_id.to_string(), stage, order_id.to_string()))
            .ok_or_else(|| RepositoryError::NotFound {
                entity: format!("queue_entry[{}]", stage),
                id: order_id.to_string(),
            })
    }

    fn stage_entries(&self, factory_id: &str, stage: QueueStage) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> = self
            .queues
            .values()
            .filter(|e| e.factory_id == factory_id && e.stage == stage)
            .cloned()
            .collect();
        sort_fcfs(&mut entries);
        entries
    }

    fn apply(&mut self, factory_id: &str, batch: &TransitionBatch) -> RepositoryResult<usize> {
        for transition in &batch.transitions {
            let order = self.order_mut(factory_id, &transition.order_id)?;
            transition
                .check_against(order.phase)
                .map_err(|reason| RepositoryError::InvalidStateTransition {
                    order_id: transition.order_id.clone(),
                    from: transition.from_phase.to_string(),
                    to: transition.to_phase.to_string(),
                    reason,
                })?;
            Self::push_phase(order, transition.to_phase, batch.sim_minute)?;
        }
        for op in &batch.queue_ops {
            match op {
                QueueOp::Enqueue(entry) => self.enqueue(entry)?,
                QueueOp::Dequeue { stage, order_id } => {
                    self.dequeue(factory_id, *stage, order_id)?;
                }
            }
        }
        Ok(batch.transitions.len())
    }
}

// ==========================================
// InMemoryStore - 内存仓储
// ==========================================
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    fail_next_commit: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 以副本整体替换状态；注入的故障在此处生效
    fn commit(&self, state: &mut MemoryState, draft: MemoryState) -> RepositoryResult<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::DatabaseTransactionError(
                "注入的提交失败".to_string(),
            ));
        }
        *state = draft;
        Ok(())
    }

    /// 令下一次批次提交（推进或受理）失败（故障注入）
    pub fn inject_commit_failure(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn find_orders_by_phase(
        &self,
        factory_id: &str,
        phase: Phase,
    ) -> RepositoryResult<Vec<Order>> {
        let state = self.lock()?;
        Ok(state
            .orders
            .values()
            .filter(|o| o.factory_id == factory_id && o.phase == phase)
            .cloned()
            .collect())
    }

    async fn find_orders_by_factory(&self, factory_id: &str) -> RepositoryResult<Vec<Order>> {
        let state = self.lock()?;
        Ok(state
            .orders
            .values()
            .filter(|o| o.factory_id == factory_id)
            .cloned()
            .collect())
    }

    async fn find_order(
        &self,
        factory_id: &str,
        order_id: &str,
    ) -> RepositoryResult<Option<Order>> {
        let state = self.lock()?;
        Ok(state
            .orders
            .get(order_id)
            .filter(|o| o.factory_id == factory_id)
            .cloned())
    }

    async fn latest_sim_minute(&self, factory_id: &str) -> RepositoryResult<Option<SimMinute>> {
        let state = self.lock()?;
        Ok(state
            .orders
            .values()
            .filter(|o| o.factory_id == factory_id)
            .map(|o| {
                o.last_recorded_minute()
                    .map_or(o.created_at_sim_minute, |last| last.max(o.created_at_sim_minute))
            })
            .max())
    }

    async fn insert_order(&self, order: &Order) -> RepositoryResult<()> {
        self.lock()?.insert_order(order)
    }

    async fn insert_order_queued(&self, order: &Order, entry: &QueueEntry) -> RepositoryResult<()> {
        let mut state = self.lock()?;
        let mut draft = state.clone();
        draft.insert_order(order)?;
        draft.enqueue(entry)?;
        self.commit(&mut state, draft)
    }

    async fn apply_transitions(
        &self,
        factory_id: &str,
        batch: &TransitionBatch,
    ) -> RepositoryResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut state = self.lock()?;
        let mut draft = state.clone();
        let applied = draft.apply(factory_id, batch)?;
        self.commit(&mut state, draft)?;
        Ok(applied)
    }

    async fn force_complete(
        &self,
        factory_id: &str,
        order_id: &str,
        sim_minute: SimMinute,
    ) -> RepositoryResult<Order> {
        let mut state = self.lock()?;
        let order = state.order_mut(factory_id, order_id)?;
        if order.phase.is_terminal() {
            return Err(RepositoryError::InvalidStateTransition {
                order_id: order_id.to_string(),
                from: order.phase.to_string(),
                to: Phase::Auftragsabschluss.to_string(),
                reason: "订单已完结".to_string(),
            });
        }
        MemoryState::push_phase(order, Phase::Auftragsabschluss, sim_minute)?;
        let completed = order.clone();
        state
            .queues
            .retain(|(f, _, o), _| !(f == factory_id && o == order_id));
        Ok(completed)
    }
}

#[async_trait]
impl QueueRepository for InMemoryStore {
    async fn enqueue(&self, entry: &QueueEntry) -> RepositoryResult<()> {
        self.lock()?.enqueue(entry)
    }

    async fn dequeue(
        &self,
        factory_id: &str,
        stage: QueueStage,
        order_id: &str,
    ) -> RepositoryResult<QueueEntry> {
        self.lock()?.dequeue(factory_id, stage, order_id)
    }

    async fn list_eligible(
        &self,
        factory_id: &str,
        stage: QueueStage,
        now: SimMinute,
    ) -> RepositoryResult<Vec<QueueEntry>> {
        let state = self.lock()?;
        Ok(state
            .stage_entries(factory_id, stage)
            .into_iter()
            .filter(|e| e.is_eligible(now))
            .collect())
    }

    async fn list_stage(
        &self,
        factory_id: &str,
        stage: QueueStage,
    ) -> RepositoryResult<Vec<QueueEntry>> {
        Ok(self.lock()?.stage_entries(factory_id, stage))
    }

    async fn batch_window(
        &self,
        factory_id: &str,
        stage: QueueStage,
    ) -> RepositoryResult<Option<SimMinute>> {
        Ok(self
            .lock()?
            .windows
            .get(&(factory_id.to_string(), stage))
            .copied())
    }

    async fn set_batch_window(
        &self,
        factory_id: &str,
        stage: QueueStage,
        anchor: SimMinute,
    ) -> RepositoryResult<()> {
        self.lock()?
            .windows
            .insert((factory_id.to_string(), stage), anchor);
        Ok(())
    }

    async fn reset_batch_window(&self, factory_id: &str, stage: QueueStage) -> RepositoryResult<()> {
        self.lock()?.windows.remove(&(factory_id.to_string(), stage));
        Ok(())
    }

    async fn clear_stage(&self, factory_id: &str, stage: QueueStage) -> RepositoryResult<usize> {
        let mut state = self.lock()?;
        let before = state.queues.len();
        state
            .queues
            .retain(|(f, s, _), _| !(f == factory_id && *s == stage));
        state.windows.remove(&(factory_id.to_string(), stage));
        Ok(before - state.queues.len())
    }
}
