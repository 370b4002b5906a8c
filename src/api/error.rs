// ==========================================
// 再制造工厂仿真 - API层错误类型
// ==========================================
// 职责: 把仓储/引擎错误收敛为看板与管理接口可展示的类别
// 每个类别带稳定的 code，供前端分支判断
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("重复记录: {0}")]
    DuplicateEntry(String),

    #[error("无效的阶段转换: order_id={order_id}, {from} -> {to}: {reason}")]
    InvalidStateTransition {
        order_id: String,
        from: String,
        to: String,
        reason: String,
    },

    /// 工厂配置缺失/非法，或持久化数据形状错误
    #[error("配置错误: {0}")]
    ConfigurationError(String),

    #[error("调度策略错误: {0}")]
    PolicyError(String),

    /// 存储故障（可重试）
    #[error("存储错误: {0}")]
    StorageError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::DuplicateEntry(_) => "DUPLICATE",
            ApiError::InvalidStateTransition { .. } => "INVALID_TRANSITION",
            ApiError::ConfigurationError(_) => "CONFIGURATION",
            ApiError::PolicyError(_) => "POLICY",
            ApiError::StorageError(_) => "STORAGE",
            ApiError::Other(_) => "INTERNAL",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::StorageError(_))
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DuplicateEntry { entity, id } => {
                ApiError::DuplicateEntry(format!("{}(id={})已存在", entity, id))
            }
            RepositoryError::UniqueConstraintViolation(msg) => ApiError::DuplicateEntry(msg),
            RepositoryError::InvalidStateTransition {
                order_id,
                from,
                to,
                reason,
            } => ApiError::InvalidStateTransition {
                order_id,
                from,
                to,
                reason,
            },
            RepositoryError::Other(err) => ApiError::Other(err),
            shape if shape.is_data_shape() => ApiError::ConfigurationError(shape.to_string()),
            storage => ApiError::StorageError(storage.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidTransition {
                order_id,
                from,
                to,
                reason,
            } => ApiError::InvalidStateTransition {
                order_id,
                from,
                to,
                reason,
            },
            EngineError::DuplicateEntry(msg) => ApiError::DuplicateEntry(msg),
            EngineError::NotFound(msg) => ApiError::NotFound(msg),
            EngineError::Configuration(msg) => ApiError::ConfigurationError(msg),
            EngineError::Policy { policy, message } => {
                ApiError::PolicyError(format!("{}: {}", policy, message))
            }
            EngineError::Persistence(msg) => ApiError::StorageError(msg),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
