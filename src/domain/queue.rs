// ==========================================
// 再制造工厂仿真 - 准入队列条目
// ==========================================
// 职责: 队列条目及上游规划载荷（结构化，仓储边界校验）
// 红线: 每个订单在同一队列阶段至多一条记录
// ==========================================

use crate::domain::types::{QueueStage, SimMinute};
use serde::{Deserialize, Serialize};

/// 上游规划给出的单工序时长
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessTime {
    pub step: String,
    pub minutes: i64,
}

/// 上游规划载荷（引擎不解释，仅透传）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueuePayload {
    #[serde(default)]
    pub possible_sequence: Vec<String>,
    #[serde(default)]
    pub process_times: Vec<ProcessTime>,
}

impl QueuePayload {
    /// 校验载荷形状
    pub fn validate(&self) -> Result<(), String> {
        if let Some(bad) = self.process_times.iter().find(|p| p.minutes < 0) {
            return Err(format!("工序时长为负: step={}, minutes={}", bad.step, bad.minutes));
        }
        if let Some(step) = self.process_times.iter().find(|p| p.step.trim().is_empty()) {
            return Err(format!("工序名为空: minutes={}", step.minutes));
        }
        Ok(())
    }

    pub fn total_minutes(&self) -> i64 {
        self.process_times.iter().map(|p| p.minutes).sum()
    }
}

// ==========================================
// QueueEntry - 队列条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub factory_id: String,
    pub stage: QueueStage,
    pub order_id: String,
    pub queued_at_sim_minute: SimMinute,
    /// 最短驻留时长，之后才可准入
    pub release_after_minutes: i64,
    /// 上游规划给出的处理序号
    pub processing_order: Option<i64>,
    pub payload: QueuePayload,
}

impl QueueEntry {
    pub fn new(
        factory_id: impl Into<String>,
        stage: QueueStage,
        order_id: impl Into<String>,
        queued_at_sim_minute: SimMinute,
        release_after_minutes: i64,
    ) -> Self {
        Self {
            factory_id: factory_id.into(),
            stage,
            order_id: order_id.into(),
            queued_at_sim_minute,
            release_after_minutes,
            processing_order: None,
            payload: QueuePayload::default(),
        }
    }

    /// 可准入的最早仿真分钟
    pub fn eligible_from(&self) -> SimMinute {
        self.queued_at_sim_minute + self.release_after_minutes.max(0)
    }

    pub fn is_eligible(&self, now: SimMinute) -> bool {
        now - self.queued_at_sim_minute >= self.release_after_minutes
    }

    /// 已等待时长（分钟）
    pub fn waited_minutes(&self, now: SimMinute) -> i64 {
        (now - self.queued_at_sim_minute).max(0)
    }

    /// FCFS 基准排序键：入队时间，其次订单号
    pub fn fcfs_key(&self) -> (SimMinute, &str) {
        (self.queued_at_sim_minute, self.order_id.as_str())
    }
}

/// 按 FCFS 基准排序（入队时间升序，订单号兜底）
pub fn sort_fcfs(entries: &mut [QueueEntry]) {
    entries.sort_by(|a, b| a.fcfs_key().cmp(&b.fcfs_key()));
}
