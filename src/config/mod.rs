// ==========================================
// 再制造工厂仿真 - 配置层
// ==========================================
// 职责: 工厂配置管理,支持 global / 工厂两级覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod factory_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, GLOBAL_SCOPE};
pub use factory_config_trait::{ConfigResult, FactoryConfigReader};
