// ==========================================
// 再制造工厂仿真 - 命令行入口
// ==========================================
// 用法:
//   reassembly-sim [--db PATH] [--ticks N] [--seed-demo]
// 流程: 打开数据库 → （可选）写入演示工厂 → 运行 N 轮 tick → 输出指标 JSON
// ==========================================

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use reassembly_sim::api::{AdminApi, DashboardApi, NewOrderRequest};
use reassembly_sim::config::{ConfigManager, FactoryConfigReader};
use reassembly_sim::domain::{ComponentInstance, FactoryConfig, ProductType, ReplacementFlag};
use reassembly_sim::engine::{FactoryScheduler, PolicyRegistry, TickOrchestrator};
use reassembly_sim::repository::{SqliteOrderRepository, SqliteQueueRepository};
use reassembly_sim::{db, logging};
use serde_json::json;
use tracing::info;

const DEFAULT_TICKS: usize = 480;
const DEMO_FACTORY: &str = "DEMO";
const DEMO_ORDERS: usize = 12;

#[derive(Debug, Default)]
struct CliArgs {
    db_path: Option<String>,
    ticks: Option<usize>,
    seed_demo: bool,
}

impl CliArgs {
    fn parse<I: Iterator<Item = String>>(mut args: I) -> Result<Self> {
        let mut parsed = CliArgs::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => parsed.db_path = Some(args.next().context("--db 需要路径参数")?),
                "--ticks" => {
                    let raw = args.next().context("--ticks 需要数值参数")?;
                    parsed.ticks = Some(raw.parse().with_context(|| format!("无效的 tick 数: {}", raw))?);
                }
                "--seed-demo" => parsed.seed_demo = true,
                "-h" | "--help" => {
                    println!("用法: reassembly-sim [--db PATH] [--ticks N] [--seed-demo]");
                    std::process::exit(0);
                }
                other => bail!("未知参数: {}", other),
            }
        }
        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = CliArgs::parse(std::env::args().skip(1))?;

    info!("==================================================");
    info!("{} - 系统版本: {}", reassembly_sim::APP_NAME, reassembly_sim::VERSION);
    info!("==================================================");

    let db_path = args.db_path.clone().unwrap_or_else(db::default_db_path);
    info!("使用数据库: {}", db_path);
    let conn = db::open_shared_connection(&db_path)
        .with_context(|| format!("无法打开数据库: {}", db_path))?;

    let config = Arc::new(ConfigManager::from_connection(conn.clone()));
    let order_repo = Arc::new(SqliteOrderRepository::from_connection(conn.clone()));
    let queue_repo = Arc::new(SqliteQueueRepository::from_connection(conn));
    let orchestrator = Arc::new(TickOrchestrator::new(
        config.clone(),
        order_repo.clone(),
        queue_repo.clone(),
        Arc::new(PolicyRegistry::with_defaults()),
    ));

    if args.seed_demo {
        let admin = AdminApi::new(orchestrator.clone(), queue_repo.clone());
        seed_demo(&config, &admin).await?;
    }

    let mut scheduler = FactoryScheduler::new(config.clone(), orchestrator);
    let summary = scheduler.run(args.ticks.unwrap_or(DEFAULT_TICKS)).await?;

    let dashboard = DashboardApi::new(order_repo, queue_repo, config.clone());
    let mut factories = Vec::new();
    for factory_id in config.list_factories().await.map_err(|e| anyhow!(e))? {
        let phase_counts = dashboard.get_phase_counts(&factory_id).await?;
        let metrics = dashboard.get_delivery_metrics(&factory_id, 10).await?;
        factories.push(json!({
            "factory_id": factory_id,
            "clock": scheduler.clocks().get(&factory_id),
            "phase_counts": phase_counts,
            "delivery_metrics": metrics,
        }));
    }

    let output = json!({ "summary": summary, "factories": factories });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// 写入演示工厂配置与一批订单（已存在则跳过）
async fn seed_demo(
    config: &Arc<ConfigManager>,
    admin: &AdminApi<ConfigManager>,
) -> Result<()> {
    let existing = config.list_factories().await.map_err(|e| anyhow!(e))?;
    if existing.iter().any(|f| f == DEMO_FACTORY) {
        info!(factory_id = DEMO_FACTORY, "演示工厂已存在，跳过写入");
        return Ok(());
    }

    let mut factory = FactoryConfig::with_defaults(DEMO_FACTORY);
    factory.queue.active_policy = "fcfs_flex_slots".to_string();
    factory.queue.pre_acceptance.release_minutes = 5;
    factory.queue.pre_inspection.release_minutes = 30;
    factory.queue.post_inspection.release_minutes = 15;
    config.save_factory_config(&factory).map_err(|e| anyhow!(e))?;

    let component_types = ["motor", "gearbox", "housing"];
    for i in 0..DEMO_ORDERS {
        let product_type = if i % 3 == 0 {
            ProductType::Premium
        } else {
            ProductType::Basic
        };
        let ty = component_types[i % component_types.len()];
        let request = NewOrderRequest {
            factory_id: DEMO_FACTORY.to_string(),
            order_id: Some(format!("DEMO-{:03}", i + 1)),
            product_type,
            planned_delivery_sim_minute: Some(240 + (i as i64) * 20),
            components: vec![ComponentInstance {
                component_id: format!("DEMO-{:03}-C1", i + 1),
                component_type: ty.to_string(),
                demontagezeit: Some(0.5 + (i % 4) as f64 * 0.25),
                montagezeit: Some(1.0 + (i % 3) as f64 * 0.5),
                replacement: if i % 5 == 0 {
                    ReplacementFlag::Required
                } else {
                    ReplacementFlag::None
                },
            }],
            payload: Default::default(),
        };
        admin.accept_order(request, 0).await?;
    }
    info!(factory_id = DEMO_FACTORY, orders = DEMO_ORDERS, "演示数据已写入");
    Ok(())
}
