// ==========================================
// 再制造工厂仿真 - 准入队列仓储接口
// ==========================================
// 职责: 按工厂、按队列阶段保存待准入订单
// 红线: 每个订单在同一阶段至多一条记录
// ==========================================

use crate::domain::queue::QueueEntry;
use crate::domain::types::{QueueStage, SimMinute};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// QueueRepository Trait
// ==========================================
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// 入队
    ///
    /// # 错误
    /// - DuplicateEntry: 订单在该阶段已有条目
    async fn enqueue(&self, entry: &QueueEntry) -> RepositoryResult<()>;

    /// 出队
    ///
    /// # 错误
    /// - NotFound: 条目不存在
    async fn dequeue(&self, factory_id: &str, stage: QueueStage, order_id: &str)
        -> RepositoryResult<QueueEntry>;

    /// 列出已满足驻留时长的条目
    ///
    /// 排序: 入队时间升序，订单号兜底（保证确定性）
    async fn list_eligible(
        &self,
        factory_id: &str,
        stage: QueueStage,
        now: SimMinute,
    ) -> RepositoryResult<Vec<QueueEntry>>;

    /// 列出阶段全部条目（含未到驻留时长的），排序同上
    async fn list_stage(&self, factory_id: &str, stage: QueueStage)
        -> RepositoryResult<Vec<QueueEntry>>;

    /// 读取阶段批次窗口锚点
    async fn batch_window(&self, factory_id: &str, stage: QueueStage)
        -> RepositoryResult<Option<SimMinute>>;

    /// 设置阶段批次窗口锚点
    async fn set_batch_window(
        &self,
        factory_id: &str,
        stage: QueueStage,
        anchor: SimMinute,
    ) -> RepositoryResult<()>;

    /// 清除阶段批次窗口锚点
    async fn reset_batch_window(&self, factory_id: &str, stage: QueueStage)
        -> RepositoryResult<()>;

    /// 清空阶段（同时清除批次窗口锚点）
    ///
    /// # 返回
    /// - Ok(usize): 删除的条目数
    async fn clear_stage(&self, factory_id: &str, stage: QueueStage) -> RepositoryResult<usize>;
}
