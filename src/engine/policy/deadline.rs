// ==========================================
// 再制造工厂仿真 - 交期策略
// ==========================================
// 规则: 计划交付时间最早者先准入；无计划交付排最后；再按 FCFS
// ==========================================

use super::{FactorySnapshot, SchedulingPolicy, StageState};
use crate::domain::factory::FactoryConfig;
use crate::domain::transition::TransitionDecision;
use crate::domain::types::SimMinute;
use crate::engine::error::EngineResult;

pub struct DeadlinePolicy;

impl SchedulingPolicy for DeadlinePolicy {
    fn name(&self) -> &'static str {
        "deadline"
    }

    fn description(&self) -> &'static str {
        "最早计划交付优先"
    }

    fn decide(
        &self,
        snapshot: &FactorySnapshot,
        stage: &StageState,
        _config: &FactoryConfig,
        _now: SimMinute,
    ) -> EngineResult<Vec<TransitionDecision>> {
        let due = |order_id: &str| {
            snapshot
                .order(order_id)
                .and_then(|o| o.planned_delivery_sim_minute)
                .unwrap_or(SimMinute::MAX)
        };
        let mut ordered: Vec<_> = stage.eligible.iter().collect();
        ordered.sort_by(|a, b| {
            due(&a.order_id)
                .cmp(&due(&b.order_id))
                .then_with(|| a.fcfs_key().cmp(&b.fcfs_key()))
        });
        Ok(stage.admit_in_order(snapshot, ordered))
    }
}
