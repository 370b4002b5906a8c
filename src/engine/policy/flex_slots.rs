// ==========================================
// 再制造工厂仿真 - 固定/柔性工位分配（FCFS Flex Slots）
// ==========================================
// 规则:
// 1. admission = min(空闲 MON, DEM, 队列长度)
// 2. rigid = floor((1 - flex_share) × admission)，flex = admission - rigid
// 3. 固定工位: 按产品类型频次降序（并列取最早出现者），类型内 FCFS
// 4. 柔性工位: 剩余队列 FCFS，优先已等待 ≥ setup_time 的订单；不足时去掉等待约束
// 5. 已选集合保证同一订单不被两轮重复计入
// ==========================================

use super::{FactorySnapshot, SchedulingPolicy, StageState};
use crate::domain::factory::FactoryConfig;
use crate::domain::queue::QueueEntry;
use crate::domain::transition::TransitionDecision;
use crate::domain::types::{ProductType, SimMinute};
use crate::engine::capacity_allocator::CapacityAllocator;
use crate::engine::error::EngineResult;
use std::collections::HashSet;
use tracing::debug;

/// 分配结果（订单号，按准入顺序）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlexAllocation {
    pub rigid: Vec<String>,
    pub flex: Vec<String>,
}

impl FlexAllocation {
    pub fn len(&self) -> usize {
        self.rigid.len() + self.flex.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_order_ids(self) -> impl Iterator<Item = String> {
        self.rigid.into_iter().chain(self.flex)
    }
}

/// 固定/柔性工位分配
///
/// `entries` 须已按 FCFS 排序；`product_of` 给出订单的产品类型（未知为 None，单独成组）
pub fn allocate_flex_slots<F>(
    entries: &[&QueueEntry],
    product_of: F,
    admission: usize,
    flex_share: f64,
    setup_minutes: i64,
    now: SimMinute,
) -> FlexAllocation
where
    F: Fn(&str) -> Option<ProductType>,
{
    let admission = admission.min(entries.len());
    let split = CapacityAllocator::split(admission, flex_share);
    let mut picked: HashSet<&str> = HashSet::new();
    let mut allocation = FlexAllocation::default();

    // 类型频次（首次出现位置用于并列）
    let mut groups: Vec<(Option<ProductType>, usize, usize)> = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        let ty = product_of(&entry.order_id);
        match groups.iter_mut().find(|(g, _, _)| *g == ty) {
            Some(group) => group.1 += 1,
            None => groups.push((ty, 1, idx)),
        }
    }
    groups.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    // 固定工位
    'rigid: for (ty, _, _) in &groups {
        for entry in entries {
            if allocation.rigid.len() >= split.rigid {
                break 'rigid;
            }
            if product_of(&entry.order_id) == *ty && picked.insert(entry.order_id.as_str()) {
                allocation.rigid.push(entry.order_id.clone());
            }
        }
    }

    // 柔性工位：先满足等待约束的，再放宽
    for require_wait in [true, false] {
        for entry in entries {
            if allocation.flex.len() >= split.flex {
                break;
            }
            if picked.contains(entry.order_id.as_str()) {
                continue;
            }
            if require_wait && entry.waited_minutes(now) < setup_minutes {
                continue;
            }
            picked.insert(entry.order_id.as_str());
            allocation.flex.push(entry.order_id.clone());
        }
    }

    allocation
}

pub struct FcfsFlexSlotsPolicy;

impl SchedulingPolicy for FcfsFlexSlotsPolicy {
    fn name(&self) -> &'static str {
        "fcfs_flex_slots"
    }

    fn description(&self) -> &'static str {
        "固定工位按高频产品类型，柔性工位先到先服务"
    }

    fn decide(
        &self,
        snapshot: &FactorySnapshot,
        stage: &StageState,
        config: &FactoryConfig,
        now: SimMinute,
    ) -> EngineResult<Vec<TransitionDecision>> {
        let admission = stage.capacity_limit(snapshot).min(stage.eligible.len());
        if admission == 0 {
            return Ok(Vec::new());
        }

        let mut ordered: Vec<&QueueEntry> = stage.eligible.iter().collect();
        ordered.sort_by(|a, b| a.fcfs_key().cmp(&b.fcfs_key()));

        let setup_minutes = (config.capacity.setup_time_hours * 60.0).ceil() as i64;
        let allocation = allocate_flex_slots(
            &ordered,
            |order_id| snapshot.order(order_id).map(|o| o.product_type),
            admission,
            config.capacity.flex_share,
            setup_minutes,
            now,
        );
        debug!(
            admission,
            rigid = allocation.rigid.len(),
            flex = allocation.flex.len(),
            "固定/柔性工位分配"
        );

        let target = stage.stage.target_phase();
        Ok(allocation
            .into_order_ids()
            .map(|id| TransitionDecision::new(id, target))
            .collect())
    }
}
