// ==========================================
// 再制造工厂仿真 - 管理 API
// ==========================================
// 职责:
// - 订单受理（写入订单并排入 PRE_ACCEPTANCE）
// - 强制完工（越过阶段序列，不经过调度策略）
// - 清空队列阶段 / 批次窗口维护
// ==========================================

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::config::FactoryConfigReader;
use crate::domain::order::{ComponentInstance, Order};
use crate::domain::queue::{QueueEntry, QueuePayload};
use crate::domain::types::{ProductType, QueueStage, SimMinute};
use crate::engine::orchestrator::TickOrchestrator;
use crate::repository::QueueRepository;

/// 新订单请求
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NewOrderRequest {
    pub factory_id: String,
    /// 为空时自动生成
    #[serde(default)]
    pub order_id: Option<String>,
    pub product_type: ProductType,
    #[serde(default)]
    pub planned_delivery_sim_minute: Option<SimMinute>,
    #[serde(default)]
    pub components: Vec<ComponentInstance>,
    #[serde(default)]
    pub payload: QueuePayload,
}

pub struct AdminApi<C>
where
    C: FactoryConfigReader,
{
    orchestrator: Arc<TickOrchestrator<C>>,
    queue_repo: Arc<dyn QueueRepository>,
}

impl<C> AdminApi<C>
where
    C: FactoryConfigReader,
{
    pub fn new(orchestrator: Arc<TickOrchestrator<C>>, queue_repo: Arc<dyn QueueRepository>) -> Self {
        Self {
            orchestrator,
            queue_repo,
        }
    }

    /// 受理订单
    pub async fn accept_order(
        &self,
        request: NewOrderRequest,
        now: SimMinute,
    ) -> ApiResult<QueueEntry> {
        if request.factory_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("factory_id 不能为空".to_string()));
        }
        let order_id = match request.order_id {
            Some(id) if id.trim().is_empty() => {
                return Err(ApiError::InvalidInput("order_id 不能为空字符串".to_string()))
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let mut order = Order::new(order_id, request.factory_id, request.product_type, now)
            .with_components(request.components);
        order.planned_delivery_sim_minute = request.planned_delivery_sim_minute;

        let entry = self
            .orchestrator
            .accept_order(order, request.payload, now)
            .await?;
        Ok(entry)
    }

    /// 强制完工
    pub async fn force_complete(
        &self,
        factory_id: &str,
        order_id: &str,
        now: SimMinute,
    ) -> ApiResult<Order> {
        let order = self
            .orchestrator
            .state_machine()
            .force_complete(factory_id, order_id, now)
            .await?;
        Ok(order)
    }

    /// 清空队列阶段（同时重置批次窗口）
    pub async fn clear_stage(&self, factory_id: &str, stage: QueueStage) -> ApiResult<usize> {
        let removed = self.queue_repo.clear_stage(factory_id, stage).await?;
        info!(factory_id, stage = %stage.as_str(), removed, "队列阶段已清空");
        Ok(removed)
    }

    /// 设置实时批次窗口锚点
    pub async fn open_batch_window(
        &self,
        factory_id: &str,
        stage: QueueStage,
        anchor: SimMinute,
    ) -> ApiResult<()> {
        self.queue_repo
            .set_batch_window(factory_id, stage, anchor)
            .await?;
        Ok(())
    }

    /// 重置实时批次窗口（回退到配置锚点）
    pub async fn reset_batch_window(&self, factory_id: &str, stage: QueueStage) -> ApiResult<()> {
        self.queue_repo.reset_batch_window(factory_id, stage).await?;
        Ok(())
    }
}
