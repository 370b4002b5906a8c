// ==========================================
// 再制造工厂仿真 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (scope_id = 工厂ID，缺省回落到 'global')
// 红线: 配置存在但格式错误时报错，不静默回落为默认值
// ==========================================

use crate::config::factory_config_trait::{ConfigResult, FactoryConfigReader};
use crate::db::open_shared_connection;
use crate::domain::factory::{
    BottleneckParams, CapacityParams, FactoryConfig, QueueConfig, StageConfig, DEFAULT_POLICY,
};
use crate::domain::types::QueueStage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// 全局作用域
pub const GLOBAL_SCOPE: &str = "global";

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    pub const MON_SLOTS: &str = "capacity/mon_slots";
    pub const DEM_SLOTS: &str = "capacity/dem_slots";
    pub const FLEX_SHARE: &str = "capacity/flex_share";
    pub const SETUP_TIME_HOURS: &str = "capacity/setup_time_hours";

    pub const ACTIVE_POLICY: &str = "policy/active";
    pub const BOTTLENECK_THRESHOLD: &str = "policy/bottleneck_threshold";
    pub const BOTTLENECK_MAX_SKIPPED_TICKS: &str = "policy/bottleneck_max_skipped_ticks";

    pub const SIMULATION_START: &str = "simulation/start_time";
    pub const MINUTES_PER_TICK: &str = "simulation/minutes_per_tick";

    /// 队列阶段配置键：queue/{stage}_{suffix}
    pub fn stage_key(prefix: &str, suffix: &str) -> String {
        format!("queue/{}_{}", prefix, suffix)
    }

    pub const RELEASE_MINUTES: &str = "release_minutes";
    pub const BATCH_SIZE: &str = "batch_size";
    pub const BATCH_START_SIM_MINUTE: &str = "batch_start_sim_minute";
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例（会建表）
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_shared_connection(db_path)?;
        Ok(Self { conn })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 读取指定作用域的原始配置值
    fn get_scoped_value(&self, scope_id: &str, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![scope_id, key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取配置值：工厂作用域优先，其次 global
    pub fn get_config_value(&self, factory_id: &str, key: &str) -> ConfigResult<Option<String>> {
        if let Some(value) = self.get_scoped_value(factory_id, key)? {
            return Ok(Some(value));
        }
        self.get_scoped_value(GLOBAL_SCOPE, key)
    }

    /// 读取并解析配置值；缺失取默认值，格式错误报错
    fn get_parsed_or<T>(&self, factory_id: &str, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_config_value(factory_id, key)? {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|e| {
                format!(
                    "配置格式错误: factory_id={}, key={}, value={:?}: {}",
                    factory_id, key, raw, e
                )
                .into()
            }),
        }
    }

    /// 读取可选配置值（缺失或空串为 None）
    fn get_optional<T>(&self, factory_id: &str, key: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_config_value(factory_id, key)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                format!(
                    "配置格式错误: factory_id={}, key={}, value={:?}: {}",
                    factory_id, key, raw, e
                )
                .into()
            }),
        }
    }

    /// 写入配置值（UPSERT）
    pub fn set_config_value(&self, scope_id: &str, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![scope_id, key, value],
        )?;
        Ok(())
    }

    /// 将完整工厂配置写入该工厂作用域
    pub fn save_factory_config(&self, config: &FactoryConfig) -> ConfigResult<()> {
        config.validate()?;
        let scope = config.factory_id.as_str();
        let mut entries: Vec<(String, String)> = vec![
            (config_keys::MON_SLOTS.into(), config.capacity.mon_slots.to_string()),
            (config_keys::DEM_SLOTS.into(), config.capacity.dem_slots.to_string()),
            (config_keys::FLEX_SHARE.into(), config.capacity.flex_share.to_string()),
            (
                config_keys::SETUP_TIME_HOURS.into(),
                config.capacity.setup_time_hours.to_string(),
            ),
            (config_keys::ACTIVE_POLICY.into(), config.queue.active_policy.clone()),
            (
                config_keys::BOTTLENECK_THRESHOLD.into(),
                config.bottleneck.utilization_threshold.to_string(),
            ),
            (
                config_keys::BOTTLENECK_MAX_SKIPPED_TICKS.into(),
                config.bottleneck.max_skipped_ticks.to_string(),
            ),
            (config_keys::SIMULATION_START.into(), config.simulation_start.to_rfc3339()),
            (config_keys::MINUTES_PER_TICK.into(), config.minutes_per_tick.to_string()),
        ];
        for stage in QueueStage::ALL {
            let stage_config = config.queue.stage(stage);
            let prefix = stage.config_prefix();
            entries.push((
                config_keys::stage_key(prefix, config_keys::RELEASE_MINUTES),
                stage_config.release_minutes.to_string(),
            ));
            entries.push((
                config_keys::stage_key(prefix, config_keys::BATCH_SIZE),
                stage_config.batch_size.map(|v| v.to_string()).unwrap_or_default(),
            ));
            entries.push((
                config_keys::stage_key(prefix, config_keys::BATCH_START_SIM_MINUTE),
                stage_config
                    .batch_start_sim_minute
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            ));
        }

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.unchecked_transaction()?;
        for (key, value) in &entries {
            tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
                params![scope, key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// 获取工厂生效配置快照（JSON，已合并 global）
    pub fn get_config_snapshot(&self, factory_id: &str) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt = conn.prepare(
            "SELECT scope_id, key, value FROM config_kv WHERE scope_id IN ('global', ?1) ORDER BY key",
        )?;
        let rows = stmt
            .query_map(params![factory_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        // global 先写，工厂作用域覆盖
        for (_, key, value) in rows.iter().filter(|(s, _, _)| s == GLOBAL_SCOPE) {
            merged.insert(key.clone(), value.clone());
        }
        for (_, key, value) in rows.iter().filter(|(s, _, _)| s != GLOBAL_SCOPE) {
            merged.insert(key.clone(), value.clone());
        }
        Ok(serde_json::to_string(&merged)?)
    }

    fn read_stage(&self, factory_id: &str, stage: QueueStage) -> ConfigResult<StageConfig> {
        let prefix = stage.config_prefix();
        Ok(StageConfig {
            release_minutes: self.get_parsed_or(
                factory_id,
                &config_keys::stage_key(prefix, config_keys::RELEASE_MINUTES),
                0i64,
            )?,
            batch_size: self.get_optional(
                factory_id,
                &config_keys::stage_key(prefix, config_keys::BATCH_SIZE),
            )?,
            batch_start_sim_minute: self.get_optional(
                factory_id,
                &config_keys::stage_key(prefix, config_keys::BATCH_START_SIM_MINUTE),
            )?,
        })
    }
}

#[async_trait]
impl FactoryConfigReader for ConfigManager {
    async fn list_factories(&self) -> ConfigResult<Vec<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT scope_id FROM config_kv WHERE scope_id <> ?1 ORDER BY scope_id",
        )?;
        let factories = stmt
            .query_map(params![GLOBAL_SCOPE], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(factories)
    }

    async fn get_queue_config(&self, factory_id: &str) -> ConfigResult<QueueConfig> {
        let active_policy: String = self.get_parsed_or(
            factory_id,
            config_keys::ACTIVE_POLICY,
            DEFAULT_POLICY.to_string(),
        )?;
        Ok(QueueConfig {
            pre_acceptance: self.read_stage(factory_id, QueueStage::PreAcceptance)?,
            pre_inspection: self.read_stage(factory_id, QueueStage::PreInspection)?,
            post_inspection: self.read_stage(factory_id, QueueStage::PostInspection)?,
            active_policy,
        })
    }

    async fn get_capacity_params(&self, factory_id: &str) -> ConfigResult<CapacityParams> {
        let defaults = CapacityParams::default();
        let params = CapacityParams {
            mon_slots: self.get_parsed_or(factory_id, config_keys::MON_SLOTS, defaults.mon_slots)?,
            dem_slots: self.get_parsed_or(factory_id, config_keys::DEM_SLOTS, defaults.dem_slots)?,
            flex_share: self.get_parsed_or(factory_id, config_keys::FLEX_SHARE, defaults.flex_share)?,
            setup_time_hours: self.get_parsed_or(
                factory_id,
                config_keys::SETUP_TIME_HOURS,
                defaults.setup_time_hours,
            )?,
        };
        params.validate()?;
        Ok(params)
    }

    async fn get_bottleneck_params(&self, factory_id: &str) -> ConfigResult<BottleneckParams> {
        let defaults = BottleneckParams::default();
        Ok(BottleneckParams {
            utilization_threshold: self.get_parsed_or(
                factory_id,
                config_keys::BOTTLENECK_THRESHOLD,
                defaults.utilization_threshold,
            )?,
            max_skipped_ticks: self.get_parsed_or(
                factory_id,
                config_keys::BOTTLENECK_MAX_SKIPPED_TICKS,
                defaults.max_skipped_ticks,
            )?,
        })
    }

    async fn get_simulation_start(&self, factory_id: &str) -> ConfigResult<DateTime<Utc>> {
        match self.get_config_value(factory_id, config_keys::SIMULATION_START)? {
            None => Ok(DateTime::<Utc>::UNIX_EPOCH),
            Some(raw) => Ok(DateTime::parse_from_rfc3339(raw.trim())
                .map_err(|e| format!("仿真起点格式错误: {:?}: {}", raw, e))?
                .with_timezone(&Utc)),
        }
    }

    async fn get_minutes_per_tick(&self, factory_id: &str) -> ConfigResult<i64> {
        self.get_parsed_or(factory_id, config_keys::MINUTES_PER_TICK, 1i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn setup() -> (NamedTempFile, ConfigManager) {
        let temp_file = NamedTempFile::new().unwrap();
        let manager = ConfigManager::new(temp_file.path().to_str().unwrap()).unwrap();
        (temp_file, manager)
    }

    #[tokio::test]
    async fn test_defaults_when_missing() {
        let (_tmp, manager) = setup();
        let config = manager.get_factory_config("F1").await.unwrap();
        assert_eq!(config.queue.active_policy, DEFAULT_POLICY);
        assert_eq!(config.capacity, CapacityParams::default());
        assert_eq!(config.minutes_per_tick, 1);
    }

    #[tokio::test]
    async fn test_factory_scope_overrides_global() {
        let (_tmp, manager) = setup();
        manager.set_config_value(GLOBAL_SCOPE, config_keys::MON_SLOTS, "10").unwrap();
        manager.set_config_value("F2", config_keys::MON_SLOTS, "3").unwrap();

        assert_eq!(manager.get_capacity_params("F1").await.unwrap().mon_slots, 10);
        assert_eq!(manager.get_capacity_params("F2").await.unwrap().mon_slots, 3);
        assert_eq!(manager.list_factories().await.unwrap(), vec!["F2".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_value_is_error() {
        let (_tmp, manager) = setup();
        manager.set_config_value("F1", config_keys::FLEX_SHARE, "abc").unwrap();
        assert!(manager.get_capacity_params("F1").await.is_err());

        manager.set_config_value("F1", config_keys::FLEX_SHARE, "1.7").unwrap();
        assert!(manager.get_capacity_params("F1").await.is_err());
    }

    #[tokio::test]
    async fn test_save_and_reload_roundtrip() {
        let (_tmp, manager) = setup();
        let mut config = FactoryConfig::with_defaults("F1");
        config.queue.active_policy = "fcfs_flex_slots".to_string();
        config.queue.pre_inspection.release_minutes = 30;
        config.queue.post_inspection.batch_size = Some(5);
        config.capacity.mon_slots = 12;
        manager.save_factory_config(&config).unwrap();

        let loaded = manager.get_factory_config("F1").await.unwrap();
        assert_eq!(loaded, config);

        let snapshot = manager.get_config_snapshot("F1").unwrap();
        assert!(snapshot.contains("fcfs_flex_slots"));
    }
}
