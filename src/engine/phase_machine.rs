// ==========================================
// 再制造工厂仿真 - 阶段状态机
// ==========================================
// 职责: 校验并应用阶段推进，追加历史
// 红线: 只允许直接后继；旧读防护；批次原子
// 说明: 强制完工是独立的管理操作，不经过调度策略
// ==========================================

use crate::domain::order::Order;
use crate::domain::transition::{PhaseTransition, TransitionBatch};
use crate::domain::types::{Phase, SimMinute};
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::OrderRepository;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct PhaseStateMachine {
    order_repo: Arc<dyn OrderRepository>,
}

impl PhaseStateMachine {
    pub fn new(order_repo: Arc<dyn OrderRepository>) -> Self {
        Self { order_repo }
    }

    /// 对照订单快照校验推进（纯函数，不访问仓储）
    pub fn validate(order: &Order, from: Phase, to: Phase) -> EngineResult<PhaseTransition> {
        let transition = PhaseTransition {
            order_id: order.order_id.clone(),
            from_phase: from,
            to_phase: to,
        };
        transition
            .check_against(order.phase)
            .map_err(|reason| EngineError::InvalidTransition {
                order_id: order.order_id.clone(),
                from: from.to_string(),
                to: to.to_string(),
                reason,
            })?;
        Ok(transition)
    }

    /// 应用单个推进
    pub async fn apply_transition(
        &self,
        factory_id: &str,
        order_id: &str,
        from: Phase,
        to: Phase,
        sim_minute: SimMinute,
    ) -> EngineResult<()> {
        let mut batch = TransitionBatch::new(sim_minute);
        batch.transitions.push(PhaseTransition {
            order_id: order_id.to_string(),
            from_phase: from,
            to_phase: to,
        });
        self.apply_transitions(factory_id, &batch).await?;
        Ok(())
    }

    /// 原子应用一个批次（全部成功或全部不生效）
    #[instrument(skip(self, batch), fields(
        sim_minute = batch.sim_minute,
        transitions = batch.transitions.len(),
        queue_ops = batch.queue_ops.len()
    ))]
    pub async fn apply_transitions(
        &self,
        factory_id: &str,
        batch: &TransitionBatch,
    ) -> EngineResult<usize> {
        match self.order_repo.apply_transitions(factory_id, batch).await {
            Ok(applied) => {
                info!(applied, "阶段推进批次已提交");
                Ok(applied)
            }
            Err(e) => {
                warn!(error = %e, "阶段推进批次回滚");
                Err(e.into())
            }
        }
    }

    /// 管理员强制完工（* → 终态，越过序列）
    pub async fn force_complete(
        &self,
        factory_id: &str,
        order_id: &str,
        sim_minute: SimMinute,
    ) -> EngineResult<Order> {
        let order = self
            .order_repo
            .force_complete(factory_id, order_id, sim_minute)
            .await?;
        warn!(
            factory_id,
            order_id,
            sim_minute,
            "管理员强制完工（越过阶段序列）"
        );
        Ok(order)
    }
}
