// ==========================================
// Tick 编排集成测试
// ==========================================
// 职责: 验证单工厂 tick 的完整流程（内存仓储 + Mock 配置）
// 场景: 准入顺序、产能门控、完工检测、批次窗口、故障回滚
// ==========================================

mod helpers;

use helpers::mock_config::MockConfig;
use helpers::test_data_builder::OrderBuilder;
use helpers::test_env::MemoryEnv;
use reassembly_sim::domain::{
    FactoryConfig, Phase, QueueStage, SimMinute, TransitionDecision,
};
use reassembly_sim::engine::{
    Clock, EngineError, EngineResult, FactorySnapshot, PolicyRegistry, SchedulingPolicy,
    StageState,
};
use reassembly_sim::repository::{OrderRepository, QueueRepository};
use std::sync::Arc;

const F: &str = "F1";

fn config_with<G: FnOnce(&mut FactoryConfig)>(f: G) -> MockConfig {
    let mut factory = FactoryConfig::with_defaults(F);
    f(&mut factory);
    MockConfig::new().with_factory(factory)
}

// ==========================================
// 准入顺序与上限
// ==========================================

#[tokio::test]
async fn test_fcfs_admits_oldest_entries_up_to_batch_size() {
    let env = MemoryEnv::new(config_with(|c| c.queue.pre_acceptance.batch_size = Some(2)));
    for (id, minute) in [("O10", 10), ("O0", 0), ("O5", 5)] {
        env.accept_all(vec![OrderBuilder::new(id).build()], minute).await;
    }

    let report = env.tick_at(F, 10).await;

    assert_eq!(
        report.admitted.get(&QueueStage::PreAcceptance),
        Some(&vec!["O0".to_string(), "O5".to_string()])
    );
    assert_eq!(env.phase_of(F, "O0").await, Phase::Inspektion);
    assert_eq!(env.phase_of(F, "O5").await, Phase::Inspektion);
    assert_eq!(env.phase_of(F, "O10").await, Phase::Auftragsannahme);

    let remaining = env.store.list_stage(F, QueueStage::PreAcceptance).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].order_id, "O10");

    // 刚进入 INSPEKTION 的订单在本 tick 不会继续推进
    let inspection = env.store.list_stage(F, QueueStage::PreInspection).await.unwrap();
    assert_eq!(inspection.len(), 2);
    assert!(inspection.iter().all(|e| e.queued_at_sim_minute == 10));
}

#[tokio::test]
async fn test_release_delay_boundary() {
    let env = MemoryEnv::new(config_with(|c| c.queue.pre_acceptance.release_minutes = 15));
    env.accept_all(vec![OrderBuilder::new("O1").build()], 10).await;

    let early = env.tick_at(F, 24).await;
    assert_eq!(early.admitted_count(), 0);

    let on_time = env.tick_at(F, 25).await;
    assert_eq!(
        on_time.admitted.get(&QueueStage::PreAcceptance),
        Some(&vec!["O1".to_string()])
    );
}

// ==========================================
// 完整生命周期
// ==========================================

#[tokio::test]
async fn test_full_lifecycle_reaches_terminal_phase() {
    let env = MemoryEnv::new(MockConfig::single(F));
    env.accept_all(vec![OrderBuilder::new("O1").planned(300).build()], 0).await;

    env.tick_at(F, 0).await;
    assert_eq!(env.phase_of(F, "O1").await, Phase::Inspektion);

    let report = env.tick_at(F, 1).await;
    assert_eq!(
        report.admitted.get(&QueueStage::PreInspection),
        Some(&vec!["O1".to_string()])
    );
    assert_eq!(env.phase_of(F, "O1").await, Phase::ReassemblyStart);
    // 装配中订单不在任何队列
    for stage in QueueStage::ALL {
        assert!(env.store.list_stage(F, stage).await.unwrap().is_empty());
    }

    // 无组件工时：默认 4 小时
    assert!(env.tick_at(F, 240).await.completed.is_empty());
    let report = env.tick_at(F, 241).await;
    assert_eq!(report.completed, vec!["O1".to_string()]);
    assert_eq!(env.phase_of(F, "O1").await, Phase::ReassemblyEnde);

    let report = env.tick_at(F, 242).await;
    assert_eq!(report.handed_over, vec!["O1".to_string()]);
    assert_eq!(env.phase_of(F, "O1").await, Phase::Qualitaetspruefung);
    assert_eq!(report.admitted_count(), 0);

    let report = env.tick_at(F, 243).await;
    assert_eq!(
        report.admitted.get(&QueueStage::PostInspection),
        Some(&vec!["O1".to_string()])
    );

    let order = env.store.find_order(F, "O1").await.unwrap().unwrap();
    assert_eq!(order.phase, Phase::Auftragsabschluss);
    assert_eq!(order.final_completion_sim_minute, Some(243));
    assert_eq!(order.phase_history.len(), 5);
    assert!(order.check_invariants().is_ok());
    let minutes: Vec<SimMinute> = order.phase_history.iter().map(|h| h.sim_minute).collect();
    assert_eq!(minutes, vec![0, 1, 241, 242, 243]);
    for stage in QueueStage::ALL {
        assert!(env.store.list_stage(F, stage).await.unwrap().is_empty());
    }

    // 终态订单不再变化
    let idle = env.tick_at(F, 500).await;
    assert_eq!(idle.transition_count(), 0);
}

// ==========================================
// 产能门控
// ==========================================

#[tokio::test]
async fn test_mon_capacity_gates_pre_inspection() {
    let env = MemoryEnv::new(config_with(|c| c.capacity.mon_slots = 1));
    env.accept_all(
        vec![
            OrderBuilder::new("A").component("motor", 1.0).build(),
            OrderBuilder::new("B").component("motor", 1.0).build(),
        ],
        0,
    )
    .await;

    env.tick_at(F, 0).await;
    let report = env.tick_at(F, 1).await;
    assert_eq!(
        report.admitted.get(&QueueStage::PreInspection),
        Some(&vec!["A".to_string()])
    );

    // 工位已满
    let blocked = env.tick_at(F, 2).await;
    assert!(blocked.admitted.get(&QueueStage::PreInspection).is_none());
    assert_eq!(blocked.capacity.unwrap().free_mon_slots, 0);

    // 完工后 ENDE 仍占工位
    let report = env.tick_at(F, 61).await;
    assert_eq!(report.completed, vec!["A".to_string()]);
    assert!(report.admitted.get(&QueueStage::PreInspection).is_none());

    // 移交质检后同一 tick 释放工位
    let report = env.tick_at(F, 62).await;
    assert_eq!(report.handed_over, vec!["A".to_string()]);
    assert_eq!(
        report.admitted.get(&QueueStage::PreInspection),
        Some(&vec!["B".to_string()])
    );
    assert_eq!(env.phase_of(F, "B").await, Phase::ReassemblyStart);
}

#[tokio::test]
async fn test_dem_slots_cap_pre_inspection() {
    let env = MemoryEnv::new(config_with(|c| {
        c.capacity.mon_slots = 10;
        c.capacity.dem_slots = 2;
    }));
    let orders = (0..5).map(|i| OrderBuilder::new(&format!("O{}", i)).build()).collect();
    env.accept_all(orders, 0).await;

    env.tick_at(F, 0).await;
    let report = env.tick_at(F, 1).await;
    assert_eq!(report.admitted[&QueueStage::PreInspection].len(), 2);
}

#[tokio::test]
async fn test_zero_dem_slots_block_pre_inspection() {
    let env = MemoryEnv::new(config_with(|c| c.capacity.dem_slots = 0));
    env.accept_all(vec![OrderBuilder::new("O1").build()], 0).await;

    env.tick_at(F, 0).await;
    let report = env.tick_at(F, 1).await;
    assert_eq!(report.admitted_count(), 0);
    assert_eq!(env.phase_of(F, "O1").await, Phase::Inspektion);
}

// ==========================================
// 完工检测
// ==========================================

#[tokio::test]
async fn test_completion_at_expected_processing_boundary() {
    let env = MemoryEnv::new(MockConfig::single(F));
    let order = OrderBuilder::new("O1")
        .component("gearbox", 2.0)
        .advanced_to(Phase::ReassemblyStart, 0)
        .build();
    env.store.insert_order(&order).await.unwrap();

    assert!(env.tick_at(F, 119).await.completed.is_empty());
    assert_eq!(env.tick_at(F, 120).await.completed, vec!["O1".to_string()]);
    assert_eq!(env.phase_of(F, "O1").await, Phase::ReassemblyEnde);
}

// ==========================================
// 批次窗口
// ==========================================

#[tokio::test]
async fn test_batch_window_anchor_precedence() {
    let env = MemoryEnv::new(config_with(|c| {
        c.queue.pre_acceptance.batch_start_sim_minute = Some(30);
        c.queue.pre_acceptance.batch_size = Some(1);
    }));
    env.accept_all(
        vec![OrderBuilder::new("O1").build(), OrderBuilder::new("O2").build()],
        0,
    )
    .await;

    // 配置锚点未到
    let report = env.tick_at(F, 10).await;
    assert!(report.closed_stages.contains(&QueueStage::PreAcceptance));
    assert_eq!(report.admitted_count(), 0);

    // 运行时锚点优先
    env.store
        .set_batch_window(F, QueueStage::PreAcceptance, 5)
        .await
        .unwrap();
    let report = env.tick_at(F, 11).await;
    assert!(report.closed_stages.is_empty());
    assert_eq!(
        report.admitted.get(&QueueStage::PreAcceptance),
        Some(&vec!["O1".to_string()])
    );

    // 清除后回退到配置锚点
    env.store
        .reset_batch_window(F, QueueStage::PreAcceptance)
        .await
        .unwrap();
    let report = env.tick_at(F, 12).await;
    assert!(report.closed_stages.contains(&QueueStage::PreAcceptance));

    let report = env.tick_at(F, 30).await;
    assert_eq!(
        report.admitted.get(&QueueStage::PreAcceptance),
        Some(&vec!["O2".to_string()])
    );
}

// ==========================================
// 错误处理
// ==========================================

#[tokio::test]
async fn test_unknown_policy_is_configuration_error() {
    let env = MemoryEnv::new(config_with(|c| c.queue.active_policy = "lottery".to_string()));
    let clock = Clock::at(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH, 0);

    let result = env.orchestrator.tick(F, &clock).await;
    assert!(matches!(result, Err(EngineError::Configuration(_))));
}

#[tokio::test]
async fn test_policy_name_is_normalized() {
    let env = MemoryEnv::new(config_with(|c| c.queue.active_policy = "FCFS-Flex-Slots".to_string()));
    let report = env.tick_at(F, 0).await;
    assert_eq!(report.policy, "fcfs_flex_slots");
}

#[tokio::test]
async fn test_commit_failure_discards_tick_and_retry_succeeds() {
    let env = MemoryEnv::new(MockConfig::single(F));
    env.accept_all(
        vec![OrderBuilder::new("O1").build(), OrderBuilder::new("O2").build()],
        0,
    )
    .await;

    env.store.inject_commit_failure();
    let clock = Clock::at(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH, 0);
    let result = env.orchestrator.tick(F, &clock).await;
    assert!(matches!(result, Err(EngineError::Persistence(_))));

    // 状态未变
    assert_eq!(env.phase_of(F, "O1").await, Phase::Auftragsannahme);
    assert_eq!(
        env.store.list_stage(F, QueueStage::PreAcceptance).await.unwrap().len(),
        2
    );
    assert!(env.store.list_stage(F, QueueStage::PreInspection).await.unwrap().is_empty());

    let report = env.tick_at(F, 0).await;
    assert_eq!(report.admitted_count(), 2);
    assert_eq!(env.phase_of(F, "O2").await, Phase::Inspektion);
}

#[tokio::test]
async fn test_duplicate_acceptance_rejected() {
    let env = MemoryEnv::new(MockConfig::single(F));
    env.accept_all(vec![OrderBuilder::new("O1").build()], 0).await;

    let result = env
        .orchestrator
        .accept_order(OrderBuilder::new("O1").build(), Default::default(), 1)
        .await;
    assert!(matches!(result, Err(EngineError::DuplicateEntry(_))));
}

#[tokio::test]
async fn test_intake_commit_failure_leaves_no_order_behind() {
    let env = MemoryEnv::new(MockConfig::single(F));
    env.store.inject_commit_failure();

    let result = env
        .orchestrator
        .accept_order(OrderBuilder::new("O1").build(), Default::default(), 0)
        .await;
    assert!(matches!(result, Err(EngineError::Persistence(_))));
    assert!(env.store.find_order(F, "O1").await.unwrap().is_none());
    assert!(env
        .store
        .list_stage(F, QueueStage::PreAcceptance)
        .await
        .unwrap()
        .is_empty());

    // 重试成功后订单与队列条目同时存在
    env.accept_all(vec![OrderBuilder::new("O1").build()], 0).await;
    assert_eq!(env.phase_of(F, "O1").await, Phase::Auftragsannahme);
    assert_eq!(
        env.store.list_stage(F, QueueStage::PreAcceptance).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_accept_rejects_advanced_order() {
    let env = MemoryEnv::new(MockConfig::single(F));
    let order = OrderBuilder::new("O1").advanced_to(Phase::Inspektion, 0).build();

    let result = env.orchestrator.accept_order(order, Default::default(), 0).await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
    assert!(env.store.find_order(F, "O1").await.unwrap().is_none());
}

// ==========================================
// 自定义策略：无效决策与策略失败
// ==========================================

/// 输出混合有效/无效决策的策略
struct SloppyPolicy;

impl SchedulingPolicy for SloppyPolicy {
    fn name(&self) -> &'static str {
        "sloppy"
    }

    fn description(&self) -> &'static str {
        "测试用：夹带无效决策"
    }

    fn decide(
        &self,
        _snapshot: &FactorySnapshot,
        _stage: &StageState,
        _config: &FactoryConfig,
        _now: SimMinute,
    ) -> EngineResult<Vec<TransitionDecision>> {
        Ok(vec![
            TransitionDecision::new("GHOST", Phase::Inspektion),
            TransitionDecision::new("O1", Phase::ReassemblyStart),
            TransitionDecision::new("O2", Phase::Inspektion),
            TransitionDecision::new("O2", Phase::Inspektion),
        ])
    }
}

/// 总是失败的策略
struct BrokenPolicy;

impl SchedulingPolicy for BrokenPolicy {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn description(&self) -> &'static str {
        "测试用：总是失败"
    }

    fn decide(
        &self,
        _snapshot: &FactorySnapshot,
        _stage: &StageState,
        _config: &FactoryConfig,
        _now: SimMinute,
    ) -> EngineResult<Vec<TransitionDecision>> {
        Err(EngineError::Policy {
            policy: self.name().to_string(),
            message: "故意失败".to_string(),
        })
    }
}

fn registry_with_test_policies() -> PolicyRegistry {
    let mut registry = PolicyRegistry::with_defaults();
    registry.register(Arc::new(SloppyPolicy));
    registry.register(Arc::new(BrokenPolicy));
    registry
}

#[tokio::test]
async fn test_invalid_decisions_are_dropped() {
    let env = MemoryEnv::with_registry(
        config_with(|c| c.queue.active_policy = "sloppy".to_string()),
        registry_with_test_policies(),
    );
    env.accept_all(
        vec![OrderBuilder::new("O1").build(), OrderBuilder::new("O2").build()],
        0,
    )
    .await;

    let report = env.tick_at(F, 0).await;

    assert_eq!(
        report.admitted.get(&QueueStage::PreAcceptance),
        Some(&vec!["O2".to_string()])
    );
    assert_eq!(report.rejected_decisions, 3);
    assert_eq!(env.phase_of(F, "O1").await, Phase::Auftragsannahme);
    assert_eq!(env.phase_of(F, "O2").await, Phase::Inspektion);
}

#[tokio::test]
async fn test_policy_failure_degrades_to_no_admission() {
    let env = MemoryEnv::with_registry(
        config_with(|c| c.queue.active_policy = "broken".to_string()),
        registry_with_test_policies(),
    );
    env.accept_all(vec![OrderBuilder::new("O1").build()], 0).await;

    let report = env.tick_at(F, 0).await;

    assert_eq!(report.policy_failures, vec![QueueStage::PreAcceptance]);
    assert_eq!(report.admitted_count(), 0);
    assert_eq!(env.phase_of(F, "O1").await, Phase::Auftragsannahme);
}

// ==========================================
// 并发
// ==========================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ticks_on_same_factory_are_serialized() {
    let env = MemoryEnv::new(MockConfig::single(F));
    env.accept_all(vec![OrderBuilder::new("O1").build()], 0).await;

    let clock = Clock::at(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH, 0);
    let (a, b) = tokio::join!(
        env.orchestrator.tick(F, &clock),
        env.orchestrator.tick(F, &clock)
    );
    assert!(a.is_ok());
    assert!(b.is_ok());

    // 两次 tick 依次各推进一步，不会因旧读失败
    let order = env.store.find_order(F, "O1").await.unwrap().unwrap();
    assert_eq!(order.phase, Phase::ReassemblyStart);
    assert_eq!(order.phase_history.len(), 2);
    assert!(order.check_invariants().is_ok());
}
