// ==========================================
// 再制造工厂仿真 - 订单仓储（SQLite 实现）
// ==========================================
// 职责: 管理 customer_order / phase_history 表
// 红线: apply_transitions 在单个事务内完成（含队列变更），任一失败整体回滚
// ==========================================

use crate::domain::order::{ComponentInstance, Order, PhaseHistoryEntry};
use crate::domain::queue::QueueEntry;
use crate::domain::transition::{check_not_backdated, QueueOp, TransitionBatch};
use crate::domain::types::{Phase, ProductType, QueueStage, SimMinute};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::order_repo::OrderRepository;
use crate::repository::queue_repo_impl::{delete_entry, insert_entry};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

type OrderRow = (String, String, String, i64, Option<i64>, Option<i64>, String, String);

const SELECT_ORDER: &str = r#"
    SELECT order_id, factory_id, phase, created_at_sim_minute,
           planned_delivery_sim_minute, final_completion_sim_minute,
           product_type, components_json
    FROM customer_order
"#;

fn read_order_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn parse_field<T: std::str::FromStr<Err = String>>(field: &str, raw: &str) -> RepositoryResult<T> {
    raw.parse::<T>().map_err(|message| RepositoryError::FieldValueError {
        field: field.to_string(),
        message,
    })
}

fn load_history(conn: &Connection, order_id: &str) -> RepositoryResult<Vec<PhaseHistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT from_phase, to_phase, sim_minute FROM phase_history WHERE order_id = ?1 ORDER BY history_id",
    )?;
    let rows = stmt
        .query_map(params![order_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(from, to, sim_minute)| {
            Ok(PhaseHistoryEntry {
                from_phase: parse_field("from_phase", &from)?,
                to_phase: parse_field("to_phase", &to)?,
                sim_minute,
            })
        })
        .collect()
}

/// 行 → 订单（含历史，校验 JSON 形状与不变量）
fn hydrate(conn: &Connection, row: OrderRow) -> RepositoryResult<Order> {
    let (order_id, factory_id, phase, created_at, planned, final_completion, product_type, components_json) =
        row;
    let components: Vec<ComponentInstance> = serde_json::from_str(&components_json)?;
    let phase_history = load_history(conn, &order_id)?;

    let order = Order {
        phase: parse_field::<Phase>("phase", &phase)?,
        product_type: parse_field::<ProductType>("product_type", &product_type)?,
        order_id,
        factory_id,
        phase_history,
        created_at_sim_minute: created_at,
        planned_delivery_sim_minute: planned,
        final_completion_sim_minute: final_completion,
        components,
    };
    order.check_invariants().map_err(RepositoryError::ValidationError)?;
    Ok(order)
}

fn select_order(conn: &Connection, factory_id: &str, order_id: &str) -> RepositoryResult<Option<Order>> {
    let sql = format!("{} WHERE factory_id = ?1 AND order_id = ?2", SELECT_ORDER);
    let row = conn
        .query_row(&sql, params![factory_id, order_id], read_order_row)
        .optional()?;
    row.map(|r| hydrate(conn, r)).transpose()
}

fn current_phase(conn: &Connection, factory_id: &str, order_id: &str) -> RepositoryResult<Phase> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT phase FROM customer_order WHERE factory_id = ?1 AND order_id = ?2",
            params![factory_id, order_id],
            |row| row.get(0),
        )
        .optional()?;
    let raw = raw.ok_or_else(|| RepositoryError::NotFound {
        entity: "customer_order".to_string(),
        id: order_id.to_string(),
    })?;
    parse_field("phase", &raw)
}

fn last_recorded_minute(conn: &Connection, order_id: &str) -> RepositoryResult<Option<SimMinute>> {
    let last = conn.query_row(
        "SELECT MAX(sim_minute) FROM phase_history WHERE order_id = ?1",
        params![order_id],
        |row| row.get::<_, Option<i64>>(0),
    )?;
    Ok(last)
}

/// 写入一条推进（含历史时间校验）
fn write_phase(
    conn: &Connection,
    order_id: &str,
    from: Phase,
    to: Phase,
    sim_minute: SimMinute,
) -> RepositoryResult<()> {
    check_not_backdated(last_recorded_minute(conn, order_id)?, sim_minute).map_err(|reason| {
        RepositoryError::InvalidStateTransition {
            order_id: order_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            reason,
        }
    })?;
    conn.execute(
        "INSERT INTO phase_history (order_id, from_phase, to_phase, sim_minute) VALUES (?1, ?2, ?3, ?4)",
        params![order_id, from.as_str(), to.as_str(), sim_minute],
    )?;
    if to.is_terminal() {
        conn.execute(
            "UPDATE customer_order SET phase = ?1, final_completion_sim_minute = ?2 WHERE order_id = ?3",
            params![to.as_str(), sim_minute, order_id],
        )?;
    } else {
        conn.execute(
            "UPDATE customer_order SET phase = ?1 WHERE order_id = ?2",
            params![to.as_str(), order_id],
        )?;
    }
    Ok(())
}

/// 事务内写入订单及其历史
fn insert_order_rows(conn: &Connection, order: &Order) -> RepositoryResult<()> {
    order.check_invariants().map_err(RepositoryError::ValidationError)?;
    let exists: bool = conn
        .query_row(
            "SELECT 1 FROM customer_order WHERE order_id = ?1",
            params![order.order_id],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
    if exists {
        return Err(RepositoryError::DuplicateEntry {
            entity: "customer_order".to_string(),
            id: order.order_id.clone(),
        });
    }

    conn.execute(
        r#"
        INSERT INTO customer_order (
            order_id, factory_id, phase, created_at_sim_minute,
            planned_delivery_sim_minute, final_completion_sim_minute,
            product_type, components_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            order.order_id,
            order.factory_id,
            order.phase.as_str(),
            order.created_at_sim_minute,
            order.planned_delivery_sim_minute,
            order.final_completion_sim_minute,
            order.product_type.as_str(),
            serde_json::to_string(&order.components)?,
        ],
    )?;
    for entry in &order.phase_history {
        conn.execute(
            "INSERT INTO phase_history (order_id, from_phase, to_phase, sim_minute) VALUES (?1, ?2, ?3, ?4)",
            params![
                order.order_id,
                entry.from_phase.as_str(),
                entry.to_phase.as_str(),
                entry.sim_minute
            ],
        )?;
    }
    Ok(())
}

/// 事务内应用批次（由调用方负责提交/回滚）
fn apply_batch(conn: &Connection, factory_id: &str, batch: &TransitionBatch) -> RepositoryResult<usize> {
    for transition in &batch.transitions {
        let current = current_phase(conn, factory_id, &transition.order_id)?;
        transition
            .check_against(current)
            .map_err(|reason| RepositoryError::InvalidStateTransition {
                order_id: transition.order_id.clone(),
                from: transition.from_phase.to_string(),
                to: transition.to_phase.to_string(),
                reason,
            })?;
        write_phase(
            conn,
            &transition.order_id,
            transition.from_phase,
            transition.to_phase,
            batch.sim_minute,
        )?;
    }

    for op in &batch.queue_ops {
        match op {
            QueueOp::Enqueue(entry) => insert_entry(conn, entry)?,
            QueueOp::Dequeue { stage, order_id } => {
                delete_entry(conn, factory_id, *stage, order_id)?;
            }
        }
    }

    Ok(batch.transitions.len())
}

// ==========================================
// SqliteOrderRepository - 订单仓储
// ==========================================
pub struct SqliteOrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteOrderRepository {
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

    fn query_orders(
        &self,
        where_clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> RepositoryResult<Vec<Order>> {
        let conn = self.get_conn()?;
        let sql = format!("{} {} ORDER BY order_id", SELECT_ORDER, where_clause);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, read_order_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(|r| hydrate(&conn, r)).collect()
    }
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn find_orders_by_phase(
        &self,
        factory_id: &str,
        phase: Phase,
    ) -> RepositoryResult<Vec<Order>> {
        self.query_orders(
            "WHERE factory_id = ?1 AND phase = ?2",
            &[&factory_id, &phase.as_str()],
        )
    }

    async fn find_orders_by_factory(&self, factory_id: &str) -> RepositoryResult<Vec<Order>> {
        self.query_orders("WHERE factory_id = ?1", &[&factory_id])
    }

    async fn find_order(
        &self,
        factory_id: &str,
        order_id: &str,
    ) -> RepositoryResult<Option<Order>> {
        let conn = self.get_conn()?;
        select_order(&conn, factory_id, order_id)
    }

    async fn latest_sim_minute(&self, factory_id: &str) -> RepositoryResult<Option<SimMinute>> {
        let conn = self.get_conn()?;
        let latest = conn.query_row(
            r#"
            SELECT MAX(m) FROM (
                SELECT MAX(created_at_sim_minute) AS m FROM customer_order WHERE factory_id = ?1
                UNION ALL
                SELECT MAX(h.sim_minute) AS m
                FROM phase_history h
                JOIN customer_order o ON o.order_id = h.order_id
                WHERE o.factory_id = ?1
            )
            "#,
            params![factory_id],
            |row| row.get::<_, Option<i64>>(0),
        )?;
        Ok(latest)
    }

    async fn insert_order(&self, order: &Order) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        insert_order_rows(&tx, order)?;
        tx.commit()?;
        Ok(())
    }

    async fn insert_order_queued(&self, order: &Order, entry: &QueueEntry) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        insert_order_rows(&tx, order)?;
        insert_entry(&tx, entry)?;
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(())
    }

    async fn apply_transitions(
        &self,
        factory_id: &str,
        batch: &TransitionBatch,
    ) -> RepositoryResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        // 出错时 tx 被 drop，自动回滚
        let applied = apply_batch(&tx, factory_id, batch)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(applied)
    }

    async fn force_complete(
        &self,
        factory_id: &str,
        order_id: &str,
        sim_minute: SimMinute,
    ) -> RepositoryResult<Order> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let current = current_phase(&tx, factory_id, order_id)?;
        if current.is_terminal() {
            return Err(RepositoryError::InvalidStateTransition {
                order_id: order_id.to_string(),
                from: current.to_string(),
                to: Phase::Auftragsabschluss.to_string(),
                reason: "订单已完结".to_string(),
            });
        }
        write_phase(&tx, order_id, current, Phase::Auftragsabschluss, sim_minute)?;
        for stage in QueueStage::ALL {
            tx.execute(
                "DELETE FROM queue_entry WHERE factory_id = ?1 AND stage = ?2 AND order_id = ?3",
                params![factory_id, stage.as_str(), order_id],
            )?;
        }
        let order = select_order(&tx, factory_id, order_id)?.ok_or_else(|| {
            RepositoryError::NotFound {
                entity: "customer_order".to_string(),
                id: order_id.to_string(),
            }
        })?;
        tx.commit()?;
        Ok(order)
    }
}
