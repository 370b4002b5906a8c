// ==========================================
// 再制造工厂仿真 - 负载均衡策略
// ==========================================
// 规则: 每次准入选择当前在装配中（含本轮已选）数量最少的产品类型，
//       类型内 FCFS；并列时按产品类型声明顺序
// ==========================================

use super::{FactorySnapshot, SchedulingPolicy, StageState};
use crate::domain::factory::FactoryConfig;
use crate::domain::queue::QueueEntry;
use crate::domain::transition::TransitionDecision;
use crate::domain::types::{ProductType, SimMinute};
use crate::engine::error::EngineResult;
use std::collections::{BTreeMap, VecDeque};

pub struct LoadBalancingPolicy;

impl SchedulingPolicy for LoadBalancingPolicy {
    fn name(&self) -> &'static str {
        "load_balancing"
    }

    fn description(&self) -> &'static str {
        "在产品类型之间均衡装配负载"
    }

    fn decide(
        &self,
        snapshot: &FactorySnapshot,
        stage: &StageState,
        _config: &FactoryConfig,
        _now: SimMinute,
    ) -> EngineResult<Vec<TransitionDecision>> {
        let limit = stage.capacity_limit(snapshot);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut load: BTreeMap<ProductType, usize> =
            ProductType::ALL.iter().map(|t| (*t, 0)).collect();
        for order in snapshot.active_orders() {
            *load.entry(order.product_type).or_insert(0) += 1;
        }

        let mut ordered: Vec<&QueueEntry> = stage.eligible.iter().collect();
        ordered.sort_by(|a, b| a.fcfs_key().cmp(&b.fcfs_key()));
        let mut lanes: BTreeMap<ProductType, VecDeque<&QueueEntry>> = BTreeMap::new();
        for entry in ordered {
            if let Some(order) = snapshot.order(&entry.order_id) {
                lanes.entry(order.product_type).or_default().push_back(entry);
            }
        }

        let target = stage.stage.target_phase();
        let mut decisions = Vec::new();
        while decisions.len() < limit {
            let next = lanes
                .iter()
                .filter(|(_, lane)| !lane.is_empty())
                .map(|(ty, _)| *ty)
                .min_by_key(|ty| (load.get(ty).copied().unwrap_or(0), *ty));
            let Some(ty) = next else { break };
            let Some(entry) = lanes.get_mut(&ty).and_then(|lane| lane.pop_front()) else {
                break;
            };
            *load.entry(ty).or_insert(0) += 1;
            decisions.push(TransitionDecision::new(entry.order_id.clone(), target));
        }
        Ok(decisions)
    }
}
