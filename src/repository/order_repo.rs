// ==========================================
// 再制造工厂仿真 - 订单仓储接口
// ==========================================
// 职责: 定义引擎消费的订单数据访问接口（不包含实现）
// 红线: Repository 不含调度规则，只做读取与原子提交
// ==========================================

use crate::domain::order::Order;
use crate::domain::queue::QueueEntry;
use crate::domain::transition::TransitionBatch;
use crate::domain::types::{Phase, SimMinute};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// OrderRepository Trait
// ==========================================
// 实现者: SqliteOrderRepository / InMemoryStore
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// 按阶段查询工厂订单（订单号升序）
    async fn find_orders_by_phase(
        &self,
        factory_id: &str,
        phase: Phase,
    ) -> RepositoryResult<Vec<Order>>;

    /// 查询工厂全部订单（订单号升序）
    async fn find_orders_by_factory(&self, factory_id: &str) -> RepositoryResult<Vec<Order>>;

    /// 查询单个订单
    async fn find_order(&self, factory_id: &str, order_id: &str)
        -> RepositoryResult<Option<Order>>;

    /// 工厂已持久化的最晚仿真分钟（订单受理时间与阶段历史取最大）
    ///
    /// 无订单时返回 None；供调度循环在重启后续接时钟
    async fn latest_sim_minute(&self, factory_id: &str) -> RepositoryResult<Option<SimMinute>>;

    /// 新增订单（订单受理）
    ///
    /// # 错误
    /// - DuplicateEntry: 订单号已存在
    async fn insert_order(&self, order: &Order) -> RepositoryResult<()>;

    /// 受理入口：订单与首个队列条目在同一事务内写入
    ///
    /// # 错误
    /// - DuplicateEntry: 订单号已存在，或订单已在某个队列中
    /// - 任一失败时订单与队列条目均不落盘
    async fn insert_order_queued(&self, order: &Order, entry: &QueueEntry) -> RepositoryResult<()>;

    /// 原子提交阶段推进及队列变更
    ///
    /// # 规则
    /// 1) 每个推进的 from_phase 必须等于订单当前阶段（旧读防护）
    /// 2) to_phase 必须是 from_phase 的直接后继
    /// 3) 每个推进追加一条阶段历史；进入终态时写入 final_completion_sim_minute
    /// 4) 任一失败则整个批次回滚
    ///
    /// # 返回
    /// - Ok(usize): 已应用的推进数
    async fn apply_transitions(
        &self,
        factory_id: &str,
        batch: &TransitionBatch,
    ) -> RepositoryResult<usize>;

    /// 管理员强制完工（越过阶段序列，直接进入终态）
    ///
    /// 同时删除该订单的全部队列条目
    async fn force_complete(
        &self,
        factory_id: &str,
        order_id: &str,
        sim_minute: SimMinute,
    ) -> RepositoryResult<Order>;
}
