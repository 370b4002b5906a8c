// ==========================================
// 再制造工厂仿真 - 仿真时钟
// ==========================================
// 职责: 持有当前仿真分钟（单调递增），与墙钟互转
// 说明: 显式值对象，随每次 tick 传入，不使用进程级全局状态
// ==========================================

use crate::domain::types::SimMinute;
use crate::engine::error::{EngineError, EngineResult};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    simulation_start: DateTime<Utc>,
    sim_minute: SimMinute,
    minutes_per_tick: i64,
}

impl Clock {
    /// 从仿真起点创建时钟（当前为第 0 分钟）
    pub fn new(simulation_start: DateTime<Utc>, minutes_per_tick: i64) -> Self {
        Self {
            simulation_start,
            sim_minute: 0,
            minutes_per_tick: minutes_per_tick.max(1),
        }
    }

    /// 创建位于指定仿真分钟的时钟
    pub fn at(simulation_start: DateTime<Utc>, sim_minute: SimMinute) -> Self {
        Self {
            simulation_start,
            sim_minute,
            minutes_per_tick: 1,
        }
    }

    pub fn now(&self) -> SimMinute {
        self.sim_minute
    }

    pub fn minutes_per_tick(&self) -> i64 {
        self.minutes_per_tick
    }

    pub fn simulation_start(&self) -> DateTime<Utc> {
        self.simulation_start
    }

    /// 推进一个 tick，返回新的仿真分钟
    pub fn advance(&mut self) -> SimMinute {
        self.sim_minute += self.minutes_per_tick;
        self.sim_minute
    }

    /// 推进到指定分钟（不允许倒退）
    pub fn advance_to(&mut self, sim_minute: SimMinute) -> EngineResult<()> {
        if sim_minute < self.sim_minute {
            return Err(EngineError::Configuration(format!(
                "仿真时钟不可倒退: now={}, requested={}",
                self.sim_minute, sim_minute
            )));
        }
        self.sim_minute = sim_minute;
        Ok(())
    }

    /// 仿真分钟 → 墙钟（start + minute * 60000ms），超出 chrono 可表示范围时为 None
    pub fn to_wall_clock(&self, sim_minute: SimMinute) -> Option<DateTime<Utc>> {
        sim_minute_to_wall_clock(self.simulation_start, sim_minute)
    }

    /// 墙钟 → 仿真分钟（向下取整）
    pub fn from_wall_clock(&self, at: DateTime<Utc>) -> SimMinute {
        (at - self.simulation_start).num_milliseconds().div_euclid(60_000)
    }

    /// 当前时刻的 ISO 字符串
    pub fn now_iso(&self) -> Option<String> {
        sim_minute_to_iso(self.simulation_start, self.sim_minute)
    }
}

/// 仿真分钟 → 墙钟
///
/// 分钟数来自调用方输入（如计划交付时间），溢出时返回 None
pub fn sim_minute_to_wall_clock(start: DateTime<Utc>, sim_minute: SimMinute) -> Option<DateTime<Utc>> {
    let offset = Duration::try_minutes(sim_minute)?;
    start.checked_add_signed(offset)
}

/// 仿真分钟 → ISO 8601（毫秒精度，UTC 'Z' 后缀）
pub fn sim_minute_to_iso(start: DateTime<Utc>, sim_minute: SimMinute) -> Option<String> {
    sim_minute_to_wall_clock(start, sim_minute)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
}
