// ==========================================
// 再制造工厂仿真 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发 tick 写入时的偶发 busy 错误
// - 建表（幂等）并登记 schema_version
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS customer_order (
    order_id TEXT PRIMARY KEY,
    factory_id TEXT NOT NULL,
    phase TEXT NOT NULL,
    created_at_sim_minute INTEGER NOT NULL,
    planned_delivery_sim_minute INTEGER,
    final_completion_sim_minute INTEGER,
    product_type TEXT NOT NULL,
    components_json TEXT NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS idx_order_factory_phase ON customer_order(factory_id, phase);

CREATE TABLE IF NOT EXISTS phase_history (
    history_id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id TEXT NOT NULL REFERENCES customer_order(order_id) ON DELETE CASCADE,
    from_phase TEXT NOT NULL,
    to_phase TEXT NOT NULL,
    sim_minute INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_phase_history_order ON phase_history(order_id, history_id);

CREATE TABLE IF NOT EXISTS queue_entry (
    factory_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    order_id TEXT NOT NULL,
    queued_at_sim_minute INTEGER NOT NULL,
    release_after_minutes INTEGER NOT NULL,
    processing_order INTEGER,
    payload_json TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (factory_id, stage, order_id)
);

CREATE TABLE IF NOT EXISTS queue_batch_window (
    factory_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    batch_start_sim_minute INTEGER NOT NULL,
    PRIMARY KEY (factory_id, stage)
);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开连接、建表，返回可在各仓储间共享的连接
pub fn open_shared_connection(db_path: &str) -> rusqlite::Result<Arc<Mutex<Connection>>> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 建表（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 默认数据库路径
///
/// 优先读取环境变量 REASSEMBLY_SIM_DB_PATH，其次用户数据目录，最后回退到当前目录
pub fn default_db_path() -> String {
    if let Ok(path) = std::env::var("REASSEMBLY_SIM_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./reassembly_sim.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("reassembly-sim");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("reassembly_sim.db");
        }
    }
    path.to_string_lossy().to_string()
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }
}
