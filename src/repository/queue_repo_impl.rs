// ==========================================
// 再制造工厂仿真 - 准入队列仓储（SQLite 实现）
// ==========================================
// 职责: 管理 queue_entry / queue_batch_window 表
// 说明: 行级读写函数以 &Connection 为参数，供订单仓储在同一事务内复用
// ==========================================

use crate::domain::queue::{QueueEntry, QueuePayload};
use crate::domain::types::{QueueStage, SimMinute};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::queue_repo::QueueRepository;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// 原始行（先取原始值，再在闭包外做结构化校验）
type QueueRow = (String, String, String, i64, i64, Option<i64>, String);

const SELECT_COLUMNS: &str = r#"
    SELECT factory_id, stage, order_id, queued_at_sim_minute,
           release_after_minutes, processing_order, payload_json
    FROM queue_entry
"#;

fn row_to_entry(row: QueueRow) -> RepositoryResult<QueueEntry> {
    let (factory_id, stage, order_id, queued_at, release_after, processing_order, payload_json) =
        row;
    let stage: QueueStage = stage.parse().map_err(|e: String| RepositoryError::FieldValueError {
        field: "stage".to_string(),
        message: e,
    })?;
    let payload: QueuePayload = serde_json::from_str(&payload_json)?;
    payload.validate().map_err(|e| RepositoryError::FieldValueError {
        field: "payload_json".to_string(),
        message: format!("order_id={}: {}", order_id, e),
    })?;

    Ok(QueueEntry {
        factory_id,
        stage,
        order_id,
        queued_at_sim_minute: queued_at,
        release_after_minutes: release_after,
        processing_order,
        payload,
    })
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

/// 查询单条队列记录
pub(crate) fn select_entry(
    conn: &Connection,
    factory_id: &str,
    stage: QueueStage,
    order_id: &str,
) -> RepositoryResult<Option<QueueEntry>> {
    let sql = format!(
        "{} WHERE factory_id = ?1 AND stage = ?2 AND order_id = ?3",
        SELECT_COLUMNS
    );
    let row = conn
        .query_row(&sql, params![factory_id, stage.as_str(), order_id], read_row)
        .optional()?;
    row.map(row_to_entry).transpose()
}

/// 查询阶段全部记录（FCFS 排序）
pub(crate) fn select_stage(
    conn: &Connection,
    factory_id: &str,
    stage: QueueStage,
) -> RepositoryResult<Vec<QueueEntry>> {
    let sql = format!(
        "{} WHERE factory_id = ?1 AND stage = ?2 ORDER BY queued_at_sim_minute, order_id",
        SELECT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![factory_id, stage.as_str()], read_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(row_to_entry).collect()
}

/// 订单当前所在的队列阶段（任一阶段）
fn queued_stage(conn: &Connection, factory_id: &str, order_id: &str) -> RepositoryResult<Option<String>> {
    let stage = conn
        .query_row(
            "SELECT stage FROM queue_entry WHERE factory_id = ?1 AND order_id = ?2 LIMIT 1",
            params![factory_id, order_id],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(stage)
}

/// 插入队列记录
///
/// 订单同一时刻只能位于一个队列；同批次内先出队再入队的交接不受影响
pub(crate) fn insert_entry(conn: &Connection, entry: &QueueEntry) -> RepositoryResult<()> {
    entry.payload.validate().map_err(RepositoryError::ValidationError)?;
    if let Some(stage) = queued_stage(conn, &entry.factory_id, &entry.order_id)? {
        return Err(RepositoryError::DuplicateEntry {
            entity: format!("queue_entry[{}]", stage),
            id: entry.order_id.clone(),
        });
    }
    conn.execute(
        r#"
        INSERT INTO queue_entry (
            factory_id, stage, order_id, queued_at_sim_minute,
            release_after_minutes, processing_order, payload_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            entry.factory_id,
            entry.stage.as_str(),
            entry.order_id,
            entry.queued_at_sim_minute,
            entry.release_after_minutes,
            entry.processing_order,
            serde_json::to_string(&entry.payload)?,
        ],
    )?;
    Ok(())
}

/// 删除队列记录
pub(crate) fn delete_entry(
    conn: &Connection,
    factory_id: &str,
    stage: QueueStage,
    order_id: &str,
) -> RepositoryResult<QueueEntry> {
    let entry = select_entry(conn, factory_id, stage, order_id)?.ok_or_else(|| {
        RepositoryError::NotFound {
            entity: format!("queue_entry[{}]", stage),
            id: order_id.to_string(),
        }
    })?;
    conn.execute(
        "DELETE FROM queue_entry WHERE factory_id = ?1 AND stage = ?2 AND order_id = ?3",
        params![factory_id, stage.as_str(), order_id],
    )?;
    Ok(entry)
}

// ==========================================
// SqliteQueueRepository - 准入队列仓储
// ==========================================
pub struct SqliteQueueRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteQueueRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn enqueue(&self, entry: &QueueEntry) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        insert_entry(&conn, entry)
    }

    async fn dequeue(
        &self,
        factory_id: &str,
        stage: QueueStage,
        order_id: &str,
    ) -> RepositoryResult<QueueEntry> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let entry = delete_entry(&tx, factory_id, stage, order_id)?;
        tx.commit()?;
        Ok(entry)
    }

    async fn list_eligible(
        &self,
        factory_id: &str,
        stage: QueueStage,
        now: SimMinute,
    ) -> RepositoryResult<Vec<QueueEntry>> {
        let conn = self.get_conn()?;
        let entries = select_stage(&conn, factory_id, stage)?;
        Ok(entries.into_iter().filter(|e| e.is_eligible(now)).collect())
    }

    async fn list_stage(
        &self,
        factory_id: &str,
        stage: QueueStage,
    ) -> RepositoryResult<Vec<QueueEntry>> {
        let conn = self.get_conn()?;
        select_stage(&conn, factory_id, stage)
    }

    async fn batch_window(
        &self,
        factory_id: &str,
        stage: QueueStage,
    ) -> RepositoryResult<Option<SimMinute>> {
        let conn = self.get_conn()?;
        let anchor = conn
            .query_row(
                "SELECT batch_start_sim_minute FROM queue_batch_window WHERE factory_id = ?1 AND stage = ?2",
                params![factory_id, stage.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(anchor)
    }

    async fn set_batch_window(
        &self,
        factory_id: &str,
        stage: QueueStage,
        anchor: SimMinute,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO queue_batch_window (factory_id, stage, batch_start_sim_minute)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(factory_id, stage) DO UPDATE SET batch_start_sim_minute = ?3
            "#,
            params![factory_id, stage.as_str(), anchor],
        )?;
        Ok(())
    }

    async fn reset_batch_window(&self, factory_id: &str, stage: QueueStage) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "DELETE FROM queue_batch_window WHERE factory_id = ?1 AND stage = ?2",
            params![factory_id, stage.as_str()],
        )?;
        Ok(())
    }

    async fn clear_stage(&self, factory_id: &str, stage: QueueStage) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM queue_entry WHERE factory_id = ?1 AND stage = ?2",
            params![factory_id, stage.as_str()],
        )?;
        tx.execute(
            "DELETE FROM queue_batch_window WHERE factory_id = ?1 AND stage = ?2",
            params![factory_id, stage.as_str()],
        )?;
        tx.commit()?;
        Ok(removed)
    }
}
