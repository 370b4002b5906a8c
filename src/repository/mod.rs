// ==========================================
// 再制造工厂仿真 - 数据仓储层
// ==========================================
// 红线: Repository 不含调度规则
// ==========================================
// 职责: 提供订单/队列数据访问接口,屏蔽存储细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod memory_repo;
pub mod order_repo;
pub mod order_repo_impl;
pub mod queue_repo;
pub mod queue_repo_impl;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use memory_repo::InMemoryStore;
pub use order_repo::OrderRepository;
pub use order_repo_impl::SqliteOrderRepository;
pub use queue_repo::QueueRepository;
pub use queue_repo_impl::SqliteQueueRepository;
