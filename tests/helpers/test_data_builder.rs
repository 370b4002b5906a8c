// ==========================================
// 测试数据构建器 - 用于集成测试
// ==========================================

use reassembly_sim::domain::{
    ComponentInstance, Order, Phase, PhaseHistoryEntry, ProductType, QueueEntry, QueueStage,
    ReplacementFlag, SimMinute,
};

// ==========================================
// Order 构建器
// ==========================================

pub struct OrderBuilder {
    order: Order,
}

impl OrderBuilder {
    pub fn new(order_id: &str) -> Self {
        Self {
            order: Order::new(order_id, "F1", ProductType::Basic, 0),
        }
    }

    pub fn factory(mut self, factory_id: &str) -> Self {
        self.order.factory_id = factory_id.to_string();
        self
    }

    pub fn premium(mut self) -> Self {
        self.order.product_type = ProductType::Premium;
        self
    }

    pub fn planned(mut self, sim_minute: SimMinute) -> Self {
        self.order.planned_delivery_sim_minute = Some(sim_minute);
        self
    }

    /// 添加一个组件（拆解/装配工时各占一半）
    pub fn component(mut self, component_type: &str, total_hours: f64) -> Self {
        let idx = self.order.components.len() + 1;
        self.order.components.push(ComponentInstance {
            component_id: format!("{}-C{}", self.order.order_id, idx),
            component_type: component_type.to_string(),
            demontagezeit: Some(total_hours / 2.0),
            montagezeit: Some(total_hours / 2.0),
            replacement: ReplacementFlag::None,
        });
        self
    }

    /// 沿阶段序列推进到目标阶段，每步记在给定分钟
    pub fn advanced_to(mut self, target: Phase, at: SimMinute) -> Self {
        while self.order.phase != target {
            let Some(next) = self.order.phase.successor() else {
                break;
            };
            self.order.phase_history.push(PhaseHistoryEntry {
                from_phase: self.order.phase,
                to_phase: next,
                sim_minute: at,
            });
            self.order.phase = next;
        }
        self
    }

    pub fn build(self) -> Order {
        self.order
    }
}

/// 构造某阶段的队列条目
pub fn queue_entry(
    factory_id: &str,
    stage: QueueStage,
    order_id: &str,
    queued_at: SimMinute,
    release_after: i64,
) -> QueueEntry {
    QueueEntry::new(factory_id, stage, order_id, queued_at, release_after)
}
