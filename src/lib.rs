// ==========================================
// 再制造工厂仿真 - 队列准入调度引擎
// ==========================================
// 分层: domain → repository → engine → api
// config / db / logging 为横向基础设施
// ==========================================

pub mod domain;
pub mod repository;
pub mod engine;
pub mod config;
pub mod db;
pub mod logging;
pub mod api;

pub use domain::types::{Phase, ProductType, QueueStage, ReplacementFlag, SimMinute};
pub use domain::{
    ComponentInstance, FactoryConfig, Order, PhaseTransition, QueueEntry, TransitionBatch,
    TransitionDecision,
};
pub use engine::{
    CapacityAllocator, Clock, DeliveryMetricsEngine, EngineError, FactoryScheduler,
    PhaseStateMachine, PolicyRegistry, SchedulingPolicy, TickOrchestrator,
};
pub use api::{AdminApi, DashboardApi};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const APP_NAME: &str = "再制造工厂仿真";
