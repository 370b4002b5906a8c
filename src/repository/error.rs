// ==========================================
// 再制造工厂仿真 - 仓储层错误类型
// ==========================================
// 分类:
// - 记录: 订单/队列条目不存在或重复
// - 阶段守卫: 提交时发现旧读或非法跳转
// - 数据形状: 持久化 JSON / 枚举字段无法解析
// - 存储: 锁、事务、SQL 执行失败
// ==========================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    // ----- 记录 -----
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("重复记录: {entity} with id={id}")]
    DuplicateEntry { entity: String, id: String },

    // ----- 阶段守卫 -----
    #[error("阶段推进被拒绝: order_id={order_id}, {from} -> {to}: {reason}")]
    InvalidStateTransition {
        order_id: String,
        from: String,
        to: String,
        reason: String,
    },

    // ----- 数据形状 -----
    #[error("持久化数据非法: {0}")]
    ValidationError(String),

    #[error("字段无法解析 (field={field}): {message}")]
    FieldValueError { field: String, message: String },

    // ----- 存储 -----
    #[error("连接锁获取失败: {0}")]
    LockError(String),

    #[error("事务提交失败: {0}")]
    DatabaseTransactionError(String),

    #[error("SQL 执行失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束冲突: {0}")]
    UniqueConstraintViolation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepositoryError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        RepositoryError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// 上游数据形状错误（引擎按配置错误处理）
    pub fn is_data_shape(&self) -> bool {
        matches!(
            self,
            RepositoryError::ValidationError(_) | RepositoryError::FieldValueError { .. }
        )
    }
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("UNIQUE") => {
                RepositoryError::UniqueConstraintViolation(msg)
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::not_found("row", "?"),
            // 列类型与期望不符，视为数据形状问题
            rusqlite::Error::InvalidColumnType(idx, name, ty) => RepositoryError::FieldValueError {
                field: name,
                message: format!("列 {} 类型为 {}", idx, ty),
            },
            rusqlite::Error::FromSqlConversionFailure(idx, ty, inner) => {
                RepositoryError::FieldValueError {
                    field: format!("column#{}", idx),
                    message: format!("{} 转换失败: {}", ty, inner),
                }
            }
            other => RepositoryError::DatabaseQueryError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::ValidationError(format!("JSON 字段格式错误: {}", err))
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;
