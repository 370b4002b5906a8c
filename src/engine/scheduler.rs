// ==========================================
// 再制造工厂仿真 - 多工厂调度循环
// ==========================================
// 职责: 为每个已配置工厂维护时钟，并行执行 tick
// 错误策略:
// - Configuration: 跳过该工厂本轮，其他工厂不受影响
// - 其他错误: 记录为失败，时钟照常推进，下一轮自然重试
// 说明: 本层不做内部重试
// ==========================================

use crate::config::FactoryConfigReader;
use crate::engine::clock::Clock;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::orchestrator::{TickOrchestrator, TickReport};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 单个工厂一轮的结果
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FactoryTickOutcome {
    Completed { report: TickReport },
    Skipped { factory_id: String, reason: String },
    Failed { factory_id: String, error: String },
}

impl FactoryTickOutcome {
    pub fn factory_id(&self) -> &str {
        match self {
            FactoryTickOutcome::Completed { report } => &report.factory_id,
            FactoryTickOutcome::Skipped { factory_id, .. } => factory_id,
            FactoryTickOutcome::Failed { factory_id, .. } => factory_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, FactoryTickOutcome::Completed { .. })
    }
}

/// 多轮运行汇总
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerSummary {
    pub rounds: usize,
    pub completed_ticks: usize,
    pub skipped_ticks: usize,
    pub failed_ticks: usize,
    pub transitions: usize,
}

pub struct FactoryScheduler<C>
where
    C: FactoryConfigReader,
{
    config: Arc<C>,
    orchestrator: Arc<TickOrchestrator<C>>,
    clocks: BTreeMap<String, Clock>,
}

impl<C> FactoryScheduler<C>
where
    C: FactoryConfigReader,
{
    pub fn new(config: Arc<C>, orchestrator: Arc<TickOrchestrator<C>>) -> Self {
        Self {
            config,
            orchestrator,
            clocks: BTreeMap::new(),
        }
    }

    /// 当前各工厂时钟
    pub fn clocks(&self) -> &BTreeMap<String, Clock> {
        &self.clocks
    }

    async fn ensure_clock(&mut self, factory_id: &str) -> EngineResult<Clock> {
        if let Some(clock) = self.clocks.get(factory_id) {
            return Ok(*clock);
        }
        let config = self.orchestrator.load_config(factory_id).await?;
        let mut clock = Clock::new(config.simulation_start, config.minutes_per_tick);
        // 重启后从已持久化的最晚分钟续接，避免写入早于历史的推进
        let resume_at = self.orchestrator.resume_minute(factory_id).await?;
        clock.advance_to(resume_at)?;
        if resume_at > 0 {
            info!(factory_id = %factory_id, resume_at, "时钟从已持久化进度续接");
        }
        self.clocks.insert(factory_id.to_string(), clock);
        Ok(clock)
    }

    /// 执行一轮：所有工厂并行 tick，随后推进各自时钟
    pub async fn run_round(&mut self) -> EngineResult<Vec<FactoryTickOutcome>> {
        let factories = self
            .config
            .list_factories()
            .await
            .map_err(|e| EngineError::Configuration(format!("工厂列表读取失败: {}", e)))?;

        let mut outcomes = Vec::new();
        let mut runnable = Vec::new();
        for factory_id in factories {
            match self.ensure_clock(&factory_id).await {
                Ok(clock) => runnable.push((factory_id, clock)),
                Err(e) if e.is_configuration() => {
                    warn!(factory_id = %factory_id, error = %e, "工厂配置错误，跳过本轮");
                    outcomes.push(FactoryTickOutcome::Skipped {
                        factory_id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    error!(factory_id = %factory_id, error = %e, "时钟续接失败，下一轮重试");
                    outcomes.push(FactoryTickOutcome::Failed {
                        factory_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let orchestrator = self.orchestrator.clone();
        let ticks = runnable.iter().map(|(factory_id, clock)| {
            let orchestrator = orchestrator.clone();
            async move { orchestrator.tick(factory_id, clock).await }
        });
        let results = join_all(ticks).await;

        for ((factory_id, _), result) in runnable.into_iter().zip(results) {
            let outcome = match result {
                Ok(report) => FactoryTickOutcome::Completed { report },
                Err(e) if e.is_configuration() => {
                    warn!(factory_id = %factory_id, error = %e, "工厂配置错误，跳过本轮");
                    FactoryTickOutcome::Skipped {
                        factory_id: factory_id.clone(),
                        reason: e.to_string(),
                    }
                }
                Err(e) => {
                    error!(factory_id = %factory_id, error = %e, "tick 失败，下一轮重试");
                    FactoryTickOutcome::Failed {
                        factory_id: factory_id.clone(),
                        error: e.to_string(),
                    }
                }
            };
            if let Some(clock) = self.clocks.get_mut(&factory_id) {
                clock.advance();
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// 连续执行多轮
    pub async fn run(&mut self, rounds: usize) -> EngineResult<SchedulerSummary> {
        let mut summary = SchedulerSummary::default();
        for _ in 0..rounds {
            let outcomes = self.run_round().await?;
            summary.rounds += 1;
            for outcome in outcomes {
                match outcome {
                    FactoryTickOutcome::Completed { report } => {
                        summary.completed_ticks += 1;
                        summary.transitions += report.transition_count();
                    }
                    FactoryTickOutcome::Skipped { .. } => summary.skipped_ticks += 1,
                    FactoryTickOutcome::Failed { .. } => summary.failed_ticks += 1,
                }
            }
        }
        info!(
            rounds = summary.rounds,
            completed = summary.completed_ticks,
            skipped = summary.skipped_ticks,
            failed = summary.failed_ticks,
            transitions = summary.transitions,
            "调度循环结束"
        );
        Ok(summary)
    }
}
