// ==========================================
// 再制造工厂仿真 - 调度策略
// ==========================================
// 职责: 决定本 tick 从某个队列阶段准入哪些订单
// 红线:
// - 策略只返回决策，不写仓储
// - 决策数不得超过 admission_limit
// - admission_limit 为 0 时必须返回空
// ==========================================

pub mod bottleneck_aware;
pub mod deadline;
pub mod fcfs;
pub mod flex_slots;
pub mod load_balancing;
pub mod priority;

use crate::domain::factory::FactoryConfig;
use crate::domain::order::Order;
use crate::domain::queue::QueueEntry;
use crate::domain::transition::TransitionDecision;
use crate::domain::types::{Phase, QueueStage, SimMinute};
use crate::engine::capacity_allocator::CapacityView;
use crate::engine::error::{EngineError, EngineResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use bottleneck_aware::BottleneckAwarePolicy;
pub use deadline::DeadlinePolicy;
pub use fcfs::FcfsPolicy;
pub use flex_slots::{allocate_flex_slots, FcfsFlexSlotsPolicy, FlexAllocation};
pub use load_balancing::LoadBalancingPolicy;
pub use priority::PriorityPolicy;

// ==========================================
// 策略输入
// ==========================================

/// 完工检测之后的工厂快照（只读）
#[derive(Debug, Clone)]
pub struct FactorySnapshot {
    pub factory_id: String,
    pub orders: BTreeMap<String, Order>,
    pub capacity: CapacityView,
}

impl FactorySnapshot {
    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn count_in_phase(&self, phase: Phase) -> usize {
        self.orders.values().filter(|o| o.phase == phase).count()
    }

    /// 占用 MON 工位的订单
    pub fn active_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| o.phase.occupies_mon_slot())
    }
}

/// 单个队列阶段的输入
#[derive(Debug, Clone)]
pub struct StageState {
    pub stage: QueueStage,
    /// 已满足释放延迟的条目（FCFS 排序）
    pub eligible: Vec<QueueEntry>,
    /// 本 tick 最多准入数
    pub admission_limit: usize,
}

impl StageState {
    /// 实际可用上限：进入装配的阶段受 MON 空闲工位硬闸门约束
    pub fn capacity_limit(&self, snapshot: &FactorySnapshot) -> usize {
        if self.stage.target_phase().occupies_mon_slot() && snapshot.capacity.free_mon_slots <= 0 {
            return 0;
        }
        self.admission_limit
    }

    /// 按给定顺序生成决策，截断到可用上限
    pub fn admit_in_order<'a, I>(
        &self,
        snapshot: &FactorySnapshot,
        entries: I,
    ) -> Vec<TransitionDecision>
    where
        I: IntoIterator<Item = &'a QueueEntry>,
    {
        let target = self.stage.target_phase();
        entries
            .into_iter()
            .take(self.capacity_limit(snapshot))
            .map(|e| TransitionDecision::new(e.order_id.clone(), target))
            .collect()
    }
}

// ==========================================
// SchedulingPolicy trait
// ==========================================
pub trait SchedulingPolicy: Send + Sync {
    /// 注册名（配置 policy/active 的取值）
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn decide(
        &self,
        snapshot: &FactorySnapshot,
        stage: &StageState,
        config: &FactoryConfig,
        now: SimMinute,
    ) -> EngineResult<Vec<TransitionDecision>>;
}

/// 策略描述（供看板/CLI 列出）
#[derive(Debug, Clone, Serialize)]
pub struct PolicyInfo {
    pub name: String,
    pub description: String,
}

// ==========================================
// PolicyRegistry - 名称 → 策略
// ==========================================
pub struct PolicyRegistry {
    policies: BTreeMap<String, Arc<dyn SchedulingPolicy>>,
}

impl PolicyRegistry {
    pub fn empty() -> Self {
        Self {
            policies: BTreeMap::new(),
        }
    }

    /// 注册全部内置策略
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(FcfsPolicy));
        registry.register(Arc::new(PriorityPolicy));
        registry.register(Arc::new(BottleneckAwarePolicy));
        registry.register(Arc::new(FcfsFlexSlotsPolicy));
        registry.register(Arc::new(DeadlinePolicy));
        registry.register(Arc::new(LoadBalancingPolicy));
        registry
    }

    pub fn register(&mut self, policy: Arc<dyn SchedulingPolicy>) {
        self.policies.insert(policy.name().to_string(), policy);
    }

    /// 解析策略名（大小写不敏感，'-' 等同 '_'）
    pub fn resolve(&self, name: &str) -> EngineResult<Arc<dyn SchedulingPolicy>> {
        let key = normalize_policy_name(name);
        self.policies
            .get(&key)
            .cloned()
            .ok_or_else(|| EngineError::Configuration(format!("未知调度策略: {}", name)))
    }

    pub fn list(&self) -> Vec<PolicyInfo> {
        self.policies
            .values()
            .map(|p| PolicyInfo {
                name: p.name().to_string(),
                description: p.description().to_string(),
            })
            .collect()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn normalize_policy_name(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('-', "_")
}
