// ==========================================
// 再制造工厂仿真 - 瓶颈感知策略
// ==========================================
// 规则:
// 1. 统计占用 MON 工位订单的主导组件类型
// 2. 最高占用类型的利用率 > 阈值时，暂缓准入同类型订单
// 3. 被暂缓的订单在跳过 max_skipped_ticks 个 tick 后强制准入（排最前）
// 说明: 跳过次数由 (now - eligible_from) / minutes_per_tick 推导，策略本身无状态
// ==========================================

use super::{FactorySnapshot, SchedulingPolicy, StageState};
use crate::domain::factory::FactoryConfig;
use crate::domain::queue::QueueEntry;
use crate::domain::transition::TransitionDecision;
use crate::domain::types::SimMinute;
use crate::engine::error::EngineResult;
use std::collections::BTreeMap;
use tracing::debug;

pub struct BottleneckAwarePolicy;

/// 最高占用组件类型
#[derive(Debug, Clone, PartialEq)]
pub struct Bottleneck {
    pub component_type: String,
    pub active_count: usize,
    pub utilization: f64,
}

impl BottleneckAwarePolicy {
    /// 按主导组件类型统计在装配中的订单数
    pub fn component_occupancy(snapshot: &FactorySnapshot) -> BTreeMap<String, usize> {
        let mut occupancy = BTreeMap::new();
        for order in snapshot.active_orders() {
            if let Some(ty) = order.dominant_component_type() {
                *occupancy.entry(ty).or_insert(0) += 1;
            }
        }
        occupancy
    }

    /// 最高占用类型（并列取名称最小者）
    pub fn find_bottleneck(snapshot: &FactorySnapshot) -> Option<Bottleneck> {
        let mon_slots = snapshot.capacity.mon_slots;
        if mon_slots <= 0 {
            return None;
        }
        let mut best: Option<(String, usize)> = None;
        for (ty, count) in Self::component_occupancy(snapshot) {
            match &best {
                Some((_, best_count)) if count <= *best_count => {}
                _ => best = Some((ty, count)),
            }
        }
        best.map(|(component_type, active_count)| Bottleneck {
            utilization: active_count as f64 / mon_slots as f64,
            component_type,
            active_count,
        })
    }

    /// 条目已被跳过的 tick 数
    pub fn skipped_ticks(entry: &QueueEntry, now: SimMinute, minutes_per_tick: i64) -> i64 {
        (now - entry.eligible_from()).max(0) / minutes_per_tick.max(1)
    }
}

impl SchedulingPolicy for BottleneckAwarePolicy {
    fn name(&self) -> &'static str {
        "bottleneck_aware"
    }

    fn description(&self) -> &'static str {
        "瓶颈组件类型超阈值时暂缓同类订单，超时强制准入"
    }

    fn decide(
        &self,
        snapshot: &FactorySnapshot,
        stage: &StageState,
        config: &FactoryConfig,
        now: SimMinute,
    ) -> EngineResult<Vec<TransitionDecision>> {
        let mut ordered: Vec<&QueueEntry> = stage.eligible.iter().collect();
        ordered.sort_by(|a, b| a.fcfs_key().cmp(&b.fcfs_key()));

        let threshold = config.bottleneck.utilization_threshold;
        let hot = Self::find_bottleneck(snapshot).filter(|b| b.utilization > threshold);
        let Some(hot) = hot else {
            return Ok(stage.admit_in_order(snapshot, ordered));
        };

        let mut starved = Vec::new();
        let mut normal = Vec::new();
        let mut held = 0usize;
        for entry in ordered {
            let dominant = snapshot
                .order(&entry.order_id)
                .and_then(|o| o.dominant_component_type());
            if dominant.as_deref() != Some(hot.component_type.as_str()) {
                normal.push(entry);
            } else if Self::skipped_ticks(entry, now, config.minutes_per_tick)
                >= config.bottleneck.max_skipped_ticks
            {
                starved.push(entry);
            } else {
                held += 1;
            }
        }
        debug!(
            bottleneck = %hot.component_type,
            utilization = hot.utilization,
            starved = starved.len(),
            held,
            "瓶颈类型超阈值"
        );

        Ok(stage.admit_in_order(snapshot, starved.into_iter().chain(normal)))
    }
}
