// ==========================================
// 再制造工厂仿真 - 优先级策略
// ==========================================
// 规则: premium 订单先于 basic，同级内 FCFS
// ==========================================

use super::{FactorySnapshot, SchedulingPolicy, StageState};
use crate::domain::factory::FactoryConfig;
use crate::domain::transition::TransitionDecision;
use crate::domain::types::{ProductType, SimMinute};
use crate::engine::error::EngineResult;

pub struct PriorityPolicy;

impl SchedulingPolicy for PriorityPolicy {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn description(&self) -> &'static str {
        "premium 优先，同级先到先服务"
    }

    fn decide(
        &self,
        snapshot: &FactorySnapshot,
        stage: &StageState,
        _config: &FactoryConfig,
        _now: SimMinute,
    ) -> EngineResult<Vec<TransitionDecision>> {
        let mut ordered: Vec<_> = stage.eligible.iter().collect();
        ordered.sort_by(|a, b| {
            let rank = |order_id: &str| match snapshot.order(order_id).map(|o| o.product_type) {
                Some(ProductType::Premium) => 0,
                _ => 1,
            };
            rank(&a.order_id)
                .cmp(&rank(&b.order_id))
                .then_with(|| a.fcfs_key().cmp(&b.fcfs_key()))
        });
        Ok(stage.admit_in_order(snapshot, ordered))
    }
}
