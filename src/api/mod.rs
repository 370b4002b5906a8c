// ==========================================
// 再制造工厂仿真 - API 层
// ==========================================
// 职责: 提供看板只读查询与管理操作接口
// ==========================================

pub mod admin_api;
pub mod dashboard_api;
pub mod error;

// 重导出核心类型
pub use admin_api::{AdminApi, NewOrderRequest};
pub use dashboard_api::{
    DashboardApi, PhaseCounts, StageOverview, TransitionCount, TransitionRecord,
    TransitionSummary,
};
pub use error::{ApiError, ApiResult};
