// ==========================================
// 再制造工厂仿真 - 引擎层
// ==========================================
// 职责: 阶段推进、产能计算、调度策略、tick 编排、交付指标
// 红线: Engine 不拼 SQL，仓储写入只经由 PhaseStateMachine 的批次提交
// ==========================================

pub mod capacity_allocator;
pub mod clock;
pub mod completion;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod phase_machine;
pub mod policy;
pub mod scheduler;

// 重导出核心引擎
pub use capacity_allocator::{CapacityAllocator, CapacityView, SlotSplit};
pub use clock::{sim_minute_to_iso, sim_minute_to_wall_clock, Clock};
pub use completion::CompletionDetector;
pub use error::{EngineError, EngineResult};
pub use metrics::{DeliveryMetrics, DeliveryMetricsEngine, DeviationSample};
pub use orchestrator::{TickOrchestrator, TickReport};
pub use phase_machine::PhaseStateMachine;
pub use policy::{
    FactorySnapshot, PolicyInfo, PolicyRegistry, SchedulingPolicy, StageState,
};
pub use scheduler::{FactoryScheduler, FactoryTickOutcome, SchedulerSummary};
