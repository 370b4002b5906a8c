// ==========================================
// Mock 配置实现 - 用于集成测试
// ==========================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reassembly_sim::config::{ConfigResult, FactoryConfigReader};
use reassembly_sim::domain::{BottleneckParams, CapacityParams, FactoryConfig, QueueConfig};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// Mock 配置结构（可在测试过程中修改）
#[derive(Debug, Default)]
pub struct MockConfig {
    factories: Mutex<BTreeMap<String, FactoryConfig>>,
    broken: Mutex<BTreeSet<String>>,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单工厂默认配置（release 全为 0，便于逐 tick 推进）
    pub fn single(factory_id: &str) -> Self {
        let config = Self::new();
        config.put(FactoryConfig::with_defaults(factory_id));
        config
    }

    pub fn with_factory(self, factory: FactoryConfig) -> Self {
        self.put(factory);
        self
    }

    pub fn put(&self, factory: FactoryConfig) {
        self.factories
            .lock()
            .unwrap()
            .insert(factory.factory_id.clone(), factory);
    }

    /// 修改已有工厂配置
    pub fn update<F: FnOnce(&mut FactoryConfig)>(&self, factory_id: &str, f: F) {
        let mut factories = self.factories.lock().unwrap();
        let factory = factories
            .get_mut(factory_id)
            .expect("工厂未配置");
        f(factory);
    }

    /// 令该工厂的配置读取失败
    pub fn break_factory(&self, factory_id: &str) {
        self.broken.lock().unwrap().insert(factory_id.to_string());
    }

    pub fn repair_factory(&self, factory_id: &str) {
        self.broken.lock().unwrap().remove(factory_id);
    }

    fn lookup(&self, factory_id: &str) -> ConfigResult<FactoryConfig> {
        if self.broken.lock().unwrap().contains(factory_id) {
            return Err(format!("配置损坏: factory_id={}", factory_id).into());
        }
        self.factories
            .lock()
            .unwrap()
            .get(factory_id)
            .cloned()
            .ok_or_else(|| format!("工厂未配置: {}", factory_id).into())
    }
}

#[async_trait]
impl FactoryConfigReader for MockConfig {
    async fn list_factories(&self) -> ConfigResult<Vec<String>> {
        let mut ids: BTreeSet<String> = self.factories.lock().unwrap().keys().cloned().collect();
        ids.extend(self.broken.lock().unwrap().iter().cloned());
        Ok(ids.into_iter().collect())
    }

    async fn get_queue_config(&self, factory_id: &str) -> ConfigResult<QueueConfig> {
        Ok(self.lookup(factory_id)?.queue)
    }

    async fn get_capacity_params(&self, factory_id: &str) -> ConfigResult<CapacityParams> {
        Ok(self.lookup(factory_id)?.capacity)
    }

    async fn get_bottleneck_params(&self, factory_id: &str) -> ConfigResult<BottleneckParams> {
        Ok(self.lookup(factory_id)?.bottleneck)
    }

    async fn get_simulation_start(&self, factory_id: &str) -> ConfigResult<DateTime<Utc>> {
        Ok(self.lookup(factory_id)?.simulation_start)
    }

    async fn get_minutes_per_tick(&self, factory_id: &str) -> ConfigResult<i64> {
        Ok(self.lookup(factory_id)?.minutes_per_tick)
    }
}
