// ==========================================
// 再制造工厂仿真 - 工厂配置读取 Trait
// ==========================================
// 职责: 定义引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含调度逻辑
// ==========================================

use crate::domain::factory::{BottleneckParams, CapacityParams, FactoryConfig, QueueConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::error::Error;

/// 配置读取结果
pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// FactoryConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait FactoryConfigReader: Send + Sync {
    /// 列出已配置的工厂（scope_id，升序）
    async fn list_factories(&self) -> ConfigResult<Vec<String>>;

    /// 获取队列配置（三个阶段 + 当前算法包）
    async fn get_queue_config(&self, factory_id: &str) -> ConfigResult<QueueConfig>;

    /// 获取产能参数
    ///
    /// # 默认值
    /// - mon_slots=4, dem_slots=2, flex_share=0.3, setup_time_hours=1.0
    async fn get_capacity_params(&self, factory_id: &str) -> ConfigResult<CapacityParams>;

    /// 获取瓶颈感知策略参数
    ///
    /// # 默认值
    /// - utilization_threshold=0.9, max_skipped_ticks=30
    async fn get_bottleneck_params(&self, factory_id: &str) -> ConfigResult<BottleneckParams>;

    /// 获取仿真起点（用于墙钟换算）
    async fn get_simulation_start(&self, factory_id: &str) -> ConfigResult<DateTime<Utc>>;

    /// 获取每 tick 推进的仿真分钟
    async fn get_minutes_per_tick(&self, factory_id: &str) -> ConfigResult<i64>;

    /// 组装并校验完整工厂配置
    ///
    /// 任一项读取失败或校验失败都返回错误（引擎视为配置错误，跳过该工厂本次 tick）
    async fn get_factory_config(&self, factory_id: &str) -> ConfigResult<FactoryConfig> {
        let config = FactoryConfig {
            factory_id: factory_id.to_string(),
            queue: self.get_queue_config(factory_id).await?,
            capacity: self.get_capacity_params(factory_id).await?,
            bottleneck: self.get_bottleneck_params(factory_id).await?,
            simulation_start: self.get_simulation_start(factory_id).await?,
            minutes_per_tick: self.get_minutes_per_tick(factory_id).await?,
        };
        config.validate()?;
        Ok(config)
    }
}
