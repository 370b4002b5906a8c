// ==========================================
// 再制造工厂仿真 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod factory;
pub mod order;
pub mod queue;
pub mod transition;
pub mod types;

// 重导出核心类型
pub use factory::{BottleneckParams, CapacityParams, FactoryConfig, QueueConfig, StageConfig};
pub use order::{ComponentInstance, Order, PhaseHistoryEntry};
pub use queue::{ProcessTime, QueueEntry, QueuePayload};
pub use transition::{PhaseTransition, QueueOp, TransitionBatch, TransitionDecision};
pub use types::{Phase, ProductType, QueueStage, ReplacementFlag, SimMinute};
