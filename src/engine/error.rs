// ==========================================
// 再制造工厂仿真 - 引擎层错误类型
// ==========================================
// 分类:
// - InvalidTransition: 状态机契约违反（记录日志，tick 继续，仅丢弃该决策）
// - DuplicateEntry / NotFound: 队列误用（上游缺陷，必须上报）
// - Configuration: 策略无法解析/参数非法/上游数据畸形（跳过该工厂本次 tick）
// - Policy: 策略执行失败（降级为本 tick 无准入）
// - Persistence: 仓储调用失败（整个 tick 的决策作废，交由外部循环下次重试）
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("无效的阶段转换: order_id={order_id}, {from} -> {to}: {reason}")]
    InvalidTransition {
        order_id: String,
        from: String,
        to: String,
        reason: String,
    },

    #[error("重复的队列条目: {0}")]
    DuplicateEntry(String),

    #[error("记录未找到: {0}")]
    NotFound(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("策略执行失败: policy={policy}: {message}")]
    Policy { policy: String, message: String },

    #[error("持久化失败: {0}")]
    Persistence(String),
}

impl EngineError {
    /// 是否应使外部调度循环跳过该工厂（而非当作故障）
    pub fn is_configuration(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                EngineError::NotFound(format!("{} id={}", entity, id))
            }
            RepositoryError::DuplicateEntry { entity, id } => {
                EngineError::DuplicateEntry(format!("{} id={}", entity, id))
            }
            RepositoryError::InvalidStateTransition {
                order_id,
                from,
                to,
                reason,
            } => EngineError::InvalidTransition {
                order_id,
                from,
                to,
                reason,
            },
            // 上游数据形状错误按配置错误处理，不默认为零
            shape if shape.is_data_shape() => EngineError::Configuration(shape.to_string()),
            other => EngineError::Persistence(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
