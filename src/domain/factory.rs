// ==========================================
// 再制造工厂仿真 - 工厂配置模型
// ==========================================
// 职责: 队列配置、产能参数、策略参数（外部配置，引擎只读）
// ==========================================

use crate::domain::types::{QueueStage, SimMinute};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 默认策略名
pub const DEFAULT_POLICY: &str = "fcfs";

// ==========================================
// StageConfig - 单个队列阶段配置
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// 入队后最短驻留时长（分钟）
    pub release_minutes: i64,
    /// 每 tick 最大准入数（None = 不限；PreInspection 另受 MON/DEM 约束）
    pub batch_size: Option<u32>,
    /// 批次窗口锚点：早于此分钟不放行
    pub batch_start_sim_minute: Option<SimMinute>,
}

// ==========================================
// QueueConfig - 队列配置（按工厂）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub pre_acceptance: StageConfig,
    pub pre_inspection: StageConfig,
    pub post_inspection: StageConfig,
    /// 当前启用的算法包（策略名）
    pub active_policy: String,
}

impl QueueConfig {
    pub fn stage(&self, stage: QueueStage) -> &StageConfig {
        match stage {
            QueueStage::PreAcceptance => &self.pre_acceptance,
            QueueStage::PreInspection => &self.pre_inspection,
            QueueStage::PostInspection => &self.post_inspection,
        }
    }

    pub fn stage_mut(&mut self, stage: QueueStage) -> &mut StageConfig {
        match stage {
            QueueStage::PreAcceptance => &mut self.pre_acceptance,
            QueueStage::PreInspection => &mut self.pre_inspection,
            QueueStage::PostInspection => &mut self.post_inspection,
        }
    }

    pub fn release_minutes(&self, stage: QueueStage) -> i64 {
        self.stage(stage).release_minutes
    }
}

// ==========================================
// CapacityParams - 产能参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityParams {
    /// 装配（MON）工位总数
    pub mon_slots: i64,
    /// 每 tick 可离开检验的拆解（DEM）数量
    pub dem_slots: i64,
    /// 柔性槽位占比 [0, 1]
    pub flex_share: f64,
    /// 柔性槽位切换产品类型前的最短等待（小时）
    pub setup_time_hours: f64,
}

impl Default for CapacityParams {
    fn default() -> Self {
        Self {
            mon_slots: 4,
            dem_slots: 2,
            flex_share: 0.3,
            setup_time_hours: 1.0,
        }
    }
}

impl CapacityParams {
    /// 校验产能参数
    pub fn validate(&self) -> Result<(), String> {
        if self.mon_slots < 0 {
            return Err(format!("mon_slots 不能为负: {}", self.mon_slots));
        }
        if self.dem_slots < 0 {
            return Err(format!("dem_slots 不能为负: {}", self.dem_slots));
        }
        if !self.flex_share.is_finite() || !(0.0..=1.0).contains(&self.flex_share) {
            return Err(format!("flex_share 必须在 [0,1]: {}", self.flex_share));
        }
        if !self.setup_time_hours.is_finite() || self.setup_time_hours < 0.0 {
            return Err(format!("setup_time_hours 非法: {}", self.setup_time_hours));
        }
        Ok(())
    }
}

// ==========================================
// BottleneckParams - 瓶颈感知策略参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckParams {
    /// 利用率阈值（超过后对该组件类型降级准入）
    pub utilization_threshold: f64,
    /// 最多被跳过的 tick 数，超过则强制准入
    pub max_skipped_ticks: i64,
}

impl Default for BottleneckParams {
    fn default() -> Self {
        Self {
            utilization_threshold: 0.9,
            max_skipped_ticks: 30,
        }
    }
}

// ==========================================
// FactoryConfig - 单工厂完整配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactoryConfig {
    pub factory_id: String,
    pub queue: QueueConfig,
    pub capacity: CapacityParams,
    pub bottleneck: BottleneckParams,
    /// 仿真起点（墙钟）
    pub simulation_start: DateTime<Utc>,
    /// 每 tick 推进的仿真分钟
    pub minutes_per_tick: i64,
}

impl FactoryConfig {
    /// 默认配置（全部阶段零驻留，FCFS 策略）
    pub fn with_defaults(factory_id: impl Into<String>) -> Self {
        Self {
            factory_id: factory_id.into(),
            queue: QueueConfig {
                active_policy: DEFAULT_POLICY.to_string(),
                ..QueueConfig::default()
            },
            capacity: CapacityParams::default(),
            bottleneck: BottleneckParams::default(),
            simulation_start: DateTime::<Utc>::UNIX_EPOCH,
            minutes_per_tick: 1,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.capacity.validate()?;
        if self.queue.active_policy.trim().is_empty() {
            return Err("未配置算法包".to_string());
        }
        if self.minutes_per_tick <= 0 {
            return Err(format!("minutes_per_tick 必须为正: {}", self.minutes_per_tick));
        }
        let threshold = self.bottleneck.utilization_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(format!("瓶颈阈值非法: {}", threshold));
        }
        if self.bottleneck.max_skipped_ticks < 0 {
            return Err(format!(
                "max_skipped_ticks 不能为负: {}",
                self.bottleneck.max_skipped_ticks
            ));
        }
        for stage in QueueStage::ALL {
            if self.queue.release_minutes(stage) < 0 {
                return Err(format!("{} 驻留时长不能为负", stage));
            }
        }
        Ok(())
    }
}
