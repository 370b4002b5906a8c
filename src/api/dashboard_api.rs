// ==========================================
// 再制造工厂仿真 - 看板 API
// ==========================================
// 职责: 只读聚合查询
// - 阶段计数（零填充）
// - 队列概览
// - 阶段推进汇总
// - 交付偏差指标
// ==========================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::api::error::{ApiError, ApiResult};
use crate::config::FactoryConfigReader;
use crate::domain::types::{Phase, QueueStage, SimMinute};
use crate::engine::clock::sim_minute_to_iso;
use crate::engine::metrics::{DeliveryMetrics, DeliveryMetricsEngine};
use crate::repository::{OrderRepository, QueueRepository};

/// 各阶段订单数
#[derive(Debug, Clone, Serialize)]
pub struct PhaseCounts {
    pub factory_id: String,
    pub counts: BTreeMap<Phase, usize>,
    pub total: usize,
}

/// 单个队列阶段概览
#[derive(Debug, Clone, Serialize)]
pub struct StageOverview {
    pub stage: QueueStage,
    pub length: usize,
    pub eligible: usize,
    pub release_minutes: i64,
    /// 最早入队条目已等待的分钟数
    pub oldest_wait_minutes: Option<i64>,
    /// 生效的批次窗口锚点（实时锚点优先，其次配置）
    pub batch_window_anchor: Option<SimMinute>,
    pub window_open: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionCount {
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionRecord {
    pub order_id: String,
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub sim_minute: SimMinute,
    pub at: Option<String>,
}

/// 阶段推进汇总
#[derive(Debug, Clone, Serialize)]
pub struct TransitionSummary {
    pub factory_id: String,
    pub counts: Vec<TransitionCount>,
    pub recent: Vec<TransitionRecord>,
}

// ==========================================
// DashboardApi
// ==========================================
pub struct DashboardApi {
    order_repo: Arc<dyn OrderRepository>,
    queue_repo: Arc<dyn QueueRepository>,
    config: Arc<dyn FactoryConfigReader>,
}

impl DashboardApi {
    pub fn new(
        order_repo: Arc<dyn OrderRepository>,
        queue_repo: Arc<dyn QueueRepository>,
        config: Arc<dyn FactoryConfigReader>,
    ) -> Self {
        Self {
            order_repo,
            queue_repo,
            config,
        }
    }

    fn require_factory(factory_id: &str) -> ApiResult<()> {
        if factory_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("factory_id 不能为空".to_string()));
        }
        Ok(())
    }

    /// 阶段计数（所有阶段均出现，无订单为 0）
    pub async fn get_phase_counts(&self, factory_id: &str) -> ApiResult<PhaseCounts> {
        Self::require_factory(factory_id)?;
        let orders = self.order_repo.find_orders_by_factory(factory_id).await?;
        let mut counts: BTreeMap<Phase, usize> = Phase::ALL.iter().map(|p| (*p, 0)).collect();
        for order in &orders {
            *counts.entry(order.phase).or_insert(0) += 1;
        }
        Ok(PhaseCounts {
            factory_id: factory_id.to_string(),
            counts,
            total: orders.len(),
        })
    }

    /// 队列概览
    pub async fn get_queue_overview(
        &self,
        factory_id: &str,
        now: SimMinute,
    ) -> ApiResult<Vec<StageOverview>> {
        Self::require_factory(factory_id)?;
        let config = self
            .config
            .get_factory_config(factory_id)
            .await
            .map_err(|e| ApiError::ConfigurationError(e.to_string()))?;

        let mut overview = Vec::with_capacity(QueueStage::ALL.len());
        for stage in QueueStage::ALL {
            let entries = self.queue_repo.list_stage(factory_id, stage).await?;
            let live = self.queue_repo.batch_window(factory_id, stage).await?;
            let anchor = live.or(config.queue.stage(stage).batch_start_sim_minute);
            overview.push(StageOverview {
                stage,
                length: entries.len(),
                eligible: entries.iter().filter(|e| e.is_eligible(now)).count(),
                release_minutes: config.queue.release_minutes(stage),
                oldest_wait_minutes: entries.iter().map(|e| e.waited_minutes(now)).max(),
                batch_window_anchor: anchor,
                window_open: anchor.map_or(true, |a| now >= a),
            });
        }
        Ok(overview)
    }

    /// 阶段推进汇总
    ///
    /// # 参数
    /// - recent_limit: 最近推进记录条数上限
    pub async fn get_transition_summary(
        &self,
        factory_id: &str,
        recent_limit: usize,
    ) -> ApiResult<TransitionSummary> {
        Self::require_factory(factory_id)?;
        let config = self
            .config
            .get_factory_config(factory_id)
            .await
            .map_err(|e| ApiError::ConfigurationError(e.to_string()))?;
        let orders = self.order_repo.find_orders_by_factory(factory_id).await?;

        let mut counts: BTreeMap<(Phase, Phase), usize> = BTreeMap::new();
        let mut records = Vec::new();
        for order in &orders {
            for entry in &order.phase_history {
                *counts.entry((entry.from_phase, entry.to_phase)).or_insert(0) += 1;
                records.push(TransitionRecord {
                    order_id: order.order_id.clone(),
                    from_phase: entry.from_phase,
                    to_phase: entry.to_phase,
                    sim_minute: entry.sim_minute,
                    at: sim_minute_to_iso(config.simulation_start, entry.sim_minute),
                });
            }
        }
        records.sort_by(|a, b| {
            b.sim_minute
                .cmp(&a.sim_minute)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        records.truncate(recent_limit);

        Ok(TransitionSummary {
            factory_id: factory_id.to_string(),
            counts: counts
                .into_iter()
                .map(|((from_phase, to_phase), count)| TransitionCount {
                    from_phase,
                    to_phase,
                    count,
                })
                .collect(),
            recent: records,
        })
    }

    /// 交付偏差指标
    pub async fn get_delivery_metrics(
        &self,
        factory_id: &str,
        top_n: usize,
    ) -> ApiResult<DeliveryMetrics> {
        Self::require_factory(factory_id)?;
        let start = self
            .config
            .get_simulation_start(factory_id)
            .await
            .map_err(|e| ApiError::ConfigurationError(e.to_string()))?;
        let orders = self.order_repo.find_orders_by_factory(factory_id).await?;
        Ok(DeliveryMetricsEngine::compute(&orders, start, top_n))
    }
}
