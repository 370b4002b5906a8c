// ==========================================
// 再制造工厂仿真 - FCFS 策略
// ==========================================
// 规则: 按入队时间升序准入，订单号兜底
// ==========================================

use super::{FactorySnapshot, SchedulingPolicy, StageState};
use crate::domain::factory::FactoryConfig;
use crate::domain::transition::TransitionDecision;
use crate::domain::types::SimMinute;
use crate::engine::error::EngineResult;

pub struct FcfsPolicy;

impl SchedulingPolicy for FcfsPolicy {
    fn name(&self) -> &'static str {
        "fcfs"
    }

    fn description(&self) -> &'static str {
        "先到先服务"
    }

    fn decide(
        &self,
        snapshot: &FactorySnapshot,
        stage: &StageState,
        _config: &FactoryConfig,
        _now: SimMinute,
    ) -> EngineResult<Vec<TransitionDecision>> {
        let mut ordered: Vec<_> = stage.eligible.iter().collect();
        ordered.sort_by(|a, b| a.fcfs_key().cmp(&b.fcfs_key()));
        Ok(stage.admit_in_order(snapshot, ordered))
    }
}
