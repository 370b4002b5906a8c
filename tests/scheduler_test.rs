// ==========================================
// 多工厂调度循环测试
// ==========================================
// 场景: 并行 tick、配置错误跳过、持久化失败后重试
// ==========================================

mod helpers;

use helpers::mock_config::MockConfig;
use helpers::test_data_builder::OrderBuilder;
use helpers::test_env::{MemoryEnv, SqliteEnv};
use reassembly_sim::domain::{FactoryConfig, Phase};
use reassembly_sim::engine::{FactoryScheduler, FactoryTickOutcome};
use reassembly_sim::repository::OrderRepository;

fn outcome_for<'a>(outcomes: &'a [FactoryTickOutcome], factory_id: &str) -> &'a FactoryTickOutcome {
    outcomes
        .iter()
        .find(|o| o.factory_id() == factory_id)
        .expect("缺少工厂结果")
}

#[tokio::test]
async fn test_round_ticks_every_factory_and_advances_clocks() {
    let config = MockConfig::new()
        .with_factory(FactoryConfig::with_defaults("F1"))
        .with_factory({
            let mut f = FactoryConfig::with_defaults("F2");
            f.minutes_per_tick = 5;
            f
        });
    let env = MemoryEnv::new(config);
    env.accept_all(vec![OrderBuilder::new("A1").factory("F1").build()], 0).await;
    env.accept_all(vec![OrderBuilder::new("B1").factory("F2").build()], 0).await;

    let mut scheduler = FactoryScheduler::new(env.config.clone(), env.orchestrator.clone());
    let outcomes = scheduler.run_round().await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(FactoryTickOutcome::is_completed));
    assert_eq!(env.phase_of("F1", "A1").await, Phase::Inspektion);
    assert_eq!(env.phase_of("F2", "B1").await, Phase::Inspektion);

    // 首个 tick 在 0 分钟执行，之后按各自步长推进
    assert_eq!(scheduler.clocks()["F1"].now(), 1);
    assert_eq!(scheduler.clocks()["F2"].now(), 5);
}

#[tokio::test]
async fn test_misconfigured_factory_is_skipped_without_affecting_others() {
    let config = MockConfig::single("F1");
    config.break_factory("F2");
    let env = MemoryEnv::new(config);
    env.accept_all(vec![OrderBuilder::new("A1").factory("F1").build()], 0).await;

    let mut scheduler = FactoryScheduler::new(env.config.clone(), env.orchestrator.clone());
    let outcomes = scheduler.run_round().await.unwrap();

    assert!(outcome_for(&outcomes, "F1").is_completed());
    assert!(matches!(
        outcome_for(&outcomes, "F2"),
        FactoryTickOutcome::Skipped { .. }
    ));
    assert!(!scheduler.clocks().contains_key("F2"));

    // 修复配置后下一轮恢复
    env.config.put(FactoryConfig::with_defaults("F2"));
    env.config.repair_factory("F2");
    let outcomes = scheduler.run_round().await.unwrap();
    assert!(outcome_for(&outcomes, "F2").is_completed());
    assert_eq!(scheduler.clocks()["F2"].now(), 1);
}

#[tokio::test]
async fn test_config_broken_mid_run_is_skipped() {
    let env = MemoryEnv::new(MockConfig::single("F1"));
    let mut scheduler = FactoryScheduler::new(env.config.clone(), env.orchestrator.clone());
    scheduler.run_round().await.unwrap();

    env.config
        .update("F1", |c| c.queue.active_policy = "lottery".to_string());
    let outcomes = scheduler.run_round().await.unwrap();
    assert!(matches!(
        outcome_for(&outcomes, "F1"),
        FactoryTickOutcome::Skipped { .. }
    ));
}

#[tokio::test]
async fn test_persistence_failure_is_reported_and_retried_next_round() {
    let env = MemoryEnv::new(MockConfig::single("F1"));
    env.accept_all(vec![OrderBuilder::new("A1").factory("F1").build()], 0).await;
    let mut scheduler = FactoryScheduler::new(env.config.clone(), env.orchestrator.clone());

    env.store.inject_commit_failure();
    let outcomes = scheduler.run_round().await.unwrap();
    assert!(matches!(
        outcome_for(&outcomes, "F1"),
        FactoryTickOutcome::Failed { .. }
    ));
    assert_eq!(env.phase_of("F1", "A1").await, Phase::Auftragsannahme);

    let outcomes = scheduler.run_round().await.unwrap();
    assert!(outcome_for(&outcomes, "F1").is_completed());
    assert_eq!(env.phase_of("F1", "A1").await, Phase::Inspektion);
}

#[tokio::test]
async fn test_run_summarizes_rounds() {
    let env = MemoryEnv::new(MockConfig::single("F1"));
    let orders = (0..3)
        .map(|i| OrderBuilder::new(&format!("O{}", i)).factory("F1").build())
        .collect();
    env.accept_all(orders, 0).await;
    let mut scheduler = FactoryScheduler::new(env.config.clone(), env.orchestrator.clone());

    let summary = scheduler.run(3).await.unwrap();

    assert_eq!(summary.rounds, 3);
    assert_eq!(summary.completed_ticks, 3);
    assert_eq!(summary.skipped_ticks, 0);
    assert_eq!(summary.failed_ticks, 0);
    // 3 单受理 + 默认 DEM=2 在第二轮 2 单开工、第三轮 1 单开工
    assert_eq!(summary.transitions, 6);
}

#[tokio::test]
async fn test_restarted_scheduler_resumes_from_persisted_progress() {
    let env = SqliteEnv::new();
    env.config
        .save_factory_config(&FactoryConfig::with_defaults("F1"))
        .unwrap();
    let orchestrator = env.orchestrator();
    orchestrator
        .accept_order(OrderBuilder::new("A1").build(), Default::default(), 0)
        .await
        .unwrap();

    // A1: 第 0 分钟进入检验，第 1 分钟开工
    let mut first = FactoryScheduler::new(env.config.clone(), orchestrator);
    first.run(2).await.unwrap();
    assert_eq!(first.clocks()["F1"].now(), 2);

    // 重新启动：时钟从最后一条历史（第 1 分钟）续接，而不是回到 0
    let orchestrator = env.orchestrator();
    orchestrator
        .accept_order(OrderBuilder::new("A2").build(), Default::default(), 1)
        .await
        .unwrap();
    let mut second = FactoryScheduler::new(env.config.clone(), orchestrator);
    let outcomes = second.run_round().await.unwrap();

    let FactoryTickOutcome::Completed { report } = outcome_for(&outcomes, "F1") else {
        panic!("续接后的 tick 应成功: {:?}", outcomes);
    };
    assert_eq!(report.sim_minute, 1);
    assert_eq!(report.admitted_count(), 1);
    assert_eq!(second.clocks()["F1"].now(), 2);

    let orders = env.order_repo.find_orders_by_factory("F1").await.unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders.iter().all(|o| o.check_invariants().is_ok()));
}
