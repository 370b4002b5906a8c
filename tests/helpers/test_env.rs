// ==========================================
// 测试环境 - 内存仓储 / 临时 SQLite 数据库
// ==========================================

use super::mock_config::MockConfig;
use reassembly_sim::config::ConfigManager;
use reassembly_sim::{db, logging};
use reassembly_sim::domain::{Order, Phase};
use reassembly_sim::engine::{Clock, PolicyRegistry, TickOrchestrator, TickReport};
use reassembly_sim::repository::{
    InMemoryStore, OrderRepository, QueueRepository, SqliteOrderRepository,
    SqliteQueueRepository,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

// ==========================================
// 内存环境
// ==========================================

pub struct MemoryEnv {
    pub config: Arc<MockConfig>,
    pub store: Arc<InMemoryStore>,
    pub orchestrator: Arc<TickOrchestrator<MockConfig>>,
}

impl MemoryEnv {
    pub fn new(config: MockConfig) -> Self {
        Self::with_registry(config, PolicyRegistry::with_defaults())
    }

    pub fn with_registry(config: MockConfig, registry: PolicyRegistry) -> Self {
        logging::init_test();
        let config = Arc::new(config);
        let store = Arc::new(InMemoryStore::new());
        let orchestrator = Arc::new(TickOrchestrator::new(
            config.clone(),
            store.clone(),
            store.clone(),
            Arc::new(registry),
        ));
        Self {
            config,
            store,
            orchestrator,
        }
    }

    pub fn order_repo(&self) -> Arc<dyn OrderRepository> {
        self.store.clone()
    }

    pub fn queue_repo(&self) -> Arc<dyn QueueRepository> {
        self.store.clone()
    }

    /// 受理一批订单（空载荷）
    pub async fn accept_all(&self, orders: Vec<Order>, now: i64) {
        for order in orders {
            self.orchestrator
                .accept_order(order, Default::default(), now)
                .await
                .expect("订单受理失败");
        }
    }

    /// 在指定分钟执行一次 tick
    pub async fn tick_at(&self, factory_id: &str, minute: i64) -> TickReport {
        let clock = Clock::at(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH, minute);
        self.orchestrator
            .tick(factory_id, &clock)
            .await
            .expect("tick 执行失败")
    }

    pub async fn phase_of(&self, factory_id: &str, order_id: &str) -> Phase {
        self.store
            .find_order(factory_id, order_id)
            .await
            .unwrap()
            .expect("订单不存在")
            .phase
    }
}

// ==========================================
// SQLite 临时数据库
// ==========================================

/// 创建临时数据库并建表
///
/// 返回的 NamedTempFile 必须在测试期间保持存活
pub fn create_test_db() -> (NamedTempFile, String) {
    logging::init_test();
    let temp_file = NamedTempFile::new().expect("无法创建临时文件");
    let db_path = temp_file.path().to_str().unwrap().to_string();
    let conn = db::open_sqlite_connection(&db_path).expect("无法打开数据库");
    db::init_schema(&conn).expect("建表失败");
    (temp_file, db_path)
}

pub struct SqliteEnv {
    pub _temp_file: NamedTempFile,
    pub conn: Arc<Mutex<Connection>>,
    pub config: Arc<ConfigManager>,
    pub order_repo: Arc<SqliteOrderRepository>,
    pub queue_repo: Arc<SqliteQueueRepository>,
}

impl SqliteEnv {
    pub fn new() -> Self {
        let (temp_file, db_path) = create_test_db();
        let conn = db::open_shared_connection(&db_path).expect("无法打开共享连接");
        Self {
            _temp_file: temp_file,
            config: Arc::new(ConfigManager::from_connection(conn.clone())),
            order_repo: Arc::new(SqliteOrderRepository::from_connection(conn.clone())),
            queue_repo: Arc::new(SqliteQueueRepository::from_connection(conn.clone())),
            conn,
        }
    }

    pub fn orchestrator(&self) -> Arc<TickOrchestrator<ConfigManager>> {
        Arc::new(TickOrchestrator::new(
            self.config.clone(),
            self.order_repo.clone(),
            self.queue_repo.clone(),
            Arc::new(PolicyRegistry::with_defaults()),
        ))
    }
}
