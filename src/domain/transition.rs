// ==========================================
// 再制造工厂仿真 - 阶段推进与持久化批次
// ==========================================
// 职责: 策略决策、已校验的阶段推进、队列变更、原子提交批次
// 红线: 批次必须整体生效或整体回滚
// ==========================================

use crate::domain::queue::QueueEntry;
use crate::domain::types::{Phase, QueueStage, SimMinute};
use serde::{Deserialize, Serialize};

/// 策略输出的准入决策
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionDecision {
    pub order_id: String,
    pub target_phase: Phase,
}

impl TransitionDecision {
    pub fn new(order_id: impl Into<String>, target_phase: Phase) -> Self {
        Self {
            order_id: order_id.into(),
            target_phase,
        }
    }
}

/// 已校验的阶段推进（from_phase 用于提交时的旧读防护）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub order_id: String,
    pub from_phase: Phase,
    pub to_phase: Phase,
}

impl PhaseTransition {
    /// 对照订单当前状态校验推进
    ///
    /// # 规则
    /// 1) from_phase 等于订单当前阶段（旧读防护）
    /// 2) to_phase 是 from_phase 的直接后继（不允许回退/跳跃）
    pub fn check_against(&self, current: Phase) -> Result<(), String> {
        if self.from_phase != current {
            return Err(format!(
                "阶段已变更: expected={}, actual={}",
                self.from_phase, current
            ));
        }
        if self.from_phase.successor() != Some(self.to_phase) {
            return Err(format!(
                "非直接后继: {} -> {}",
                self.from_phase, self.to_phase
            ));
        }
        Ok(())
    }
}

/// 新历史项的时间不得早于订单已记录的最后一项
pub fn check_not_backdated(last_recorded: Option<SimMinute>, at: SimMinute) -> Result<(), String> {
    match last_recorded {
        Some(last) if at < last => Err(format!(
            "推进时间早于已记录历史: last={}, requested={}",
            last, at
        )),
        _ => Ok(()),
    }
}

/// 与阶段推进同批提交的队列变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueueOp {
    Enqueue(QueueEntry),
    Dequeue { stage: QueueStage, order_id: String },
}

/// 原子提交批次
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionBatch {
    pub sim_minute: SimMinute,
    pub transitions: Vec<PhaseTransition>,
    pub queue_ops: Vec<QueueOp>,
}

impl TransitionBatch {
    pub fn new(sim_minute: SimMinute) -> Self {
        Self {
            sim_minute,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty() && self.queue_ops.is_empty()
    }

    /// 批次内是否已包含该订单的推进
    pub fn touches_order(&self, order_id: &str) -> bool {
        self.transitions.iter().any(|t| t.order_id == order_id)
    }
}
