// ==========================================
// 再制造工厂仿真 - 完工检测
// ==========================================
// 职责:
// 1. REASSEMBLY_START → REASSEMBLY_ENDE（开始分钟 + 预计工时 ≤ now）
// 2. REASSEMBLY_ENDE → QUALITAETSPRUEFUNG 交接（无队列，下一 tick 即移交）
// 说明: 在准入之前执行，准入按完工之后的阶段计数计算产能
// ==========================================

use crate::domain::order::Order;
use crate::domain::transition::PhaseTransition;
use crate::domain::types::{Phase, SimMinute};
use tracing::{debug, warn};

pub struct CompletionDetector;

impl CompletionDetector {
    /// 检测装配完工的订单
    pub fn detect_completions<'a, I>(orders: I, now: SimMinute) -> Vec<PhaseTransition>
    where
        I: IntoIterator<Item = &'a Order>,
    {
        let mut transitions = Vec::new();
        for order in orders {
            if order.phase != Phase::ReassemblyStart {
                continue;
            }
            let Some(started) = order.entered_phase_at(Phase::ReassemblyStart) else {
                warn!(order_id = %order.order_id, "REASSEMBLY_START 订单缺少进入记录，跳过完工检测");
                continue;
            };
            let finish_at = started + order.expected_processing_minutes();
            if finish_at <= now {
                debug!(order_id = %order.order_id, started, finish_at, now, "装配完工");
                transitions.push(PhaseTransition {
                    order_id: order.order_id.clone(),
                    from_phase: Phase::ReassemblyStart,
                    to_phase: Phase::ReassemblyEnde,
                });
            }
        }
        transitions
    }

    /// 已结束装配的订单移交质检
    pub fn detect_handovers<'a, I>(orders: I) -> Vec<PhaseTransition>
    where
        I: IntoIterator<Item = &'a Order>,
    {
        orders
            .into_iter()
            .filter(|o| o.phase == Phase::ReassemblyEnde)
            .map(|o| PhaseTransition {
                order_id: o.order_id.clone(),
                from_phase: Phase::ReassemblyEnde,
                to_phase: Phase::Qualitaetspruefung,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{ComponentInstance, PhaseHistoryEntry};
    use crate::domain::types::{ProductType, ReplacementFlag};

    fn started_order(id: &str, start: SimMinute, hours: f64) -> Order {
        let mut order = Order::new(id, "F1", ProductType::Basic, 0).with_components(vec![
            ComponentInstance {
                component_id: format!("{}-c1", id),
                component_type: "motor".into(),
                demontagezeit: Some(hours / 2.0),
                montagezeit: Some(hours / 2.0),
                replacement: ReplacementFlag::None,
            },
        ]);
        let path = [
            (Phase::Auftragsannahme, Phase::Inspektion, 0),
            (Phase::Inspektion, Phase::ReassemblyStart, start),
        ];
        for (from, to, at) in path {
            order.phase_history.push(PhaseHistoryEntry {
                from_phase: from,
                to_phase: to,
                sim_minute: at,
            });
        }
        order.phase = Phase::ReassemblyStart;
        order
    }

    #[test]
    fn test_completion_boundary() {
        let order = started_order("O1", 0, 2.0);
        assert!(CompletionDetector::detect_completions([&order], 119).is_empty());
        let done = CompletionDetector::detect_completions([&order], 120);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].to_phase, Phase::ReassemblyEnde);
    }

    #[test]
    fn test_default_hours_without_components() {
        let mut order = started_order("O2", 10, 2.0);
        order.components.clear();
        // 默认 4 小时
        assert!(CompletionDetector::detect_completions([&order], 249).is_empty());
        assert_eq!(CompletionDetector::detect_completions([&order], 250).len(), 1);
    }

    #[test]
    fn test_handover_only_from_ende() {
        let mut ende = started_order("O3", 0, 1.0);
        ende.phase = Phase::ReassemblyEnde;
        let start = started_order("O4", 0, 1.0);
        let handovers = CompletionDetector::detect_handovers([&ende, &start]);
        assert_eq!(handovers.len(), 1);
        assert_eq!(handovers[0].order_id, "O3");
    }
}
