// ==========================================
// 再制造工厂仿真 - 产能分配器
// ==========================================
// 红线: MON 空闲工位为 0 时不得准入任何订单
// 职责: 计算空闲 MON 工位与本 tick 准入上限
// 输入: 产能参数 + 完工检测后的阶段计数
// 输出: CapacityView / SlotSplit
// ==========================================

use crate::domain::factory::CapacityParams;
use crate::domain::order::Order;
use serde::Serialize;
use tracing::debug;

/// 本 tick 的产能视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapacityView {
    pub mon_slots: i64,
    pub dem_slots: i64,
    /// 占用 MON 工位的订单数（REASSEMBLY_START + REASSEMBLY_ENDE）
    pub active_mon: i64,
    pub free_mon_slots: i64,
}

/// 固定工位 / 柔性工位拆分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotSplit {
    pub rigid: usize,
    pub flex: usize,
}

// ==========================================
// CapacityAllocator - 无状态
// ==========================================
pub struct CapacityAllocator;

impl CapacityAllocator {
    /// 根据订单快照计算产能视图
    pub fn compute<'a, I>(params: &CapacityParams, orders: I) -> CapacityView
    where
        I: IntoIterator<Item = &'a Order>,
    {
        let active_mon = orders
            .into_iter()
            .filter(|o| o.phase.occupies_mon_slot())
            .count() as i64;
        let view = CapacityView {
            mon_slots: params.mon_slots,
            dem_slots: params.dem_slots,
            active_mon,
            free_mon_slots: (params.mon_slots - active_mon).max(0),
        };
        debug!(
            mon_slots = view.mon_slots,
            active_mon = view.active_mon,
            free_mon_slots = view.free_mon_slots,
            "产能视图"
        );
        view
    }

    /// 准入上限 = min(空闲 MON, DEM 工位, 队列长度)
    pub fn admission_limit(view: &CapacityView, queue_length: usize) -> usize {
        if view.free_mon_slots <= 0 || view.dem_slots <= 0 {
            return 0;
        }
        let cap = view.free_mon_slots.min(view.dem_slots) as usize;
        cap.min(queue_length)
    }

    /// rigid = floor((1 - flex_share) × admission)，其余为柔性工位
    pub fn split(admission: usize, flex_share: f64) -> SlotSplit {
        let share = flex_share.clamp(0.0, 1.0);
        // 1e-9 吸收浮点误差（0.7 × 10 需得到 7）
        let rigid = (((1.0 - share) * admission as f64) + 1e-9).floor() as usize;
        let rigid = rigid.min(admission);
        SlotSplit {
            rigid,
            flex: admission - rigid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Phase, ProductType};

    fn order_in(id: &str, phase: Phase) -> Order {
        let mut order = Order::new(id, "F1", ProductType::Basic, 0);
        order.phase = phase;
        order
    }

    #[test]
    fn test_free_slots_count_start_and_ende() {
        let params = CapacityParams {
            mon_slots: 3,
            ..CapacityParams::default()
        };
        let orders = vec![
            order_in("A", Phase::ReassemblyStart),
            order_in("B", Phase::ReassemblyEnde),
            order_in("C", Phase::Inspektion),
        ];
        let view = CapacityAllocator::compute(&params, &orders);
        assert_eq!(view.active_mon, 2);
        assert_eq!(view.free_mon_slots, 1);
    }

    #[test]
    fn test_full_mon_gates_admission() {
        let params = CapacityParams {
            mon_slots: 1,
            dem_slots: 5,
            ..CapacityParams::default()
        };
        let orders = vec![order_in("A", Phase::ReassemblyStart)];
        let view = CapacityAllocator::compute(&params, &orders);
        assert_eq!(CapacityAllocator::admission_limit(&view, 10), 0);
    }

    #[test]
    fn test_admission_is_min_of_three() {
        let view = CapacityView {
            mon_slots: 4,
            dem_slots: 2,
            active_mon: 0,
            free_mon_slots: 4,
        };
        assert_eq!(CapacityAllocator::admission_limit(&view, 10), 2);
        assert_eq!(CapacityAllocator::admission_limit(&view, 1), 1);
        assert_eq!(CapacityAllocator::admission_limit(&view, 0), 0);
    }

    #[test]
    fn test_split_rigid_flex() {
        assert_eq!(
            CapacityAllocator::split(10, 0.3),
            SlotSplit { rigid: 7, flex: 3 }
        );
        assert_eq!(CapacityAllocator::split(1, 0.3), SlotSplit { rigid: 0, flex: 1 });
        assert_eq!(CapacityAllocator::split(4, 0.0), SlotSplit { rigid: 4, flex: 0 });
        assert_eq!(CapacityAllocator::split(4, 1.0), SlotSplit { rigid: 0, flex: 4 });
    }
}
