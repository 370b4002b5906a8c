// ==========================================
// 再制造工厂仿真 - 订单领域模型
// ==========================================
// 职责: 订单、阶段历史、组件实例
// 红线: phase 必须等于最后一条历史的 to_phase（无历史时为初始阶段）
// ==========================================

use crate::domain::types::{Phase, ProductType, ReplacementFlag, SimMinute};
use serde::{Deserialize, Serialize};

/// 预计处理时长下限（小时）
pub const MIN_PROCESSING_HOURS: f64 = 1.0;
/// 预计处理时长上限（小时）
pub const MAX_PROCESSING_HOURS: f64 = 48.0;
/// 无组件工时信息时的默认处理时长（小时）
pub const DEFAULT_PROCESSING_HOURS: f64 = 4.0;

// ==========================================
// PhaseHistoryEntry - 阶段历史
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseHistoryEntry {
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub sim_minute: SimMinute,
}

// ==========================================
// ComponentInstance - 订单组件
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInstance {
    pub component_id: String,
    /// 组件类型（瓶颈感知策略按此统计工位占用）
    pub component_type: String,
    /// 拆解工时（小时）
    pub demontagezeit: Option<f64>,
    /// 装配工时（小时）
    pub montagezeit: Option<f64>,
    #[serde(default)]
    pub replacement: ReplacementFlag,
}

impl ComponentInstance {
    /// 组件合计工时（小时），缺失视为 0
    pub fn total_hours(&self) -> f64 {
        self.demontagezeit.unwrap_or(0.0) + self.montagezeit.unwrap_or(0.0)
    }

    /// 校验工时字段（负数/非有限值视为上游数据错误）
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("demontagezeit", self.demontagezeit),
            ("montagezeit", self.montagezeit),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(format!(
                        "组件工时非法: component_id={}, {}={}",
                        self.component_id, name, v
                    ));
                }
            }
        }
        Ok(())
    }
}

// ==========================================
// Order - 客户订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub factory_id: String,
    pub phase: Phase,
    /// 只追加；按仿真时间单调不减
    pub phase_history: Vec<PhaseHistoryEntry>,
    /// 受理（入队）时间
    pub created_at_sim_minute: SimMinute,
    pub planned_delivery_sim_minute: Option<SimMinute>,
    pub final_completion_sim_minute: Option<SimMinute>,
    pub product_type: ProductType,
    pub components: Vec<ComponentInstance>,
}

impl Order {
    /// 创建受理阶段的新订单
    pub fn new(
        order_id: impl Into<String>,
        factory_id: impl Into<String>,
        product_type: ProductType,
        created_at_sim_minute: SimMinute,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            factory_id: factory_id.into(),
            phase: Phase::initial(),
            phase_history: Vec::new(),
            created_at_sim_minute,
            planned_delivery_sim_minute: None,
            final_completion_sim_minute: None,
            product_type,
            components: Vec::new(),
        }
    }

    pub fn with_planned_delivery(mut self, sim_minute: SimMinute) -> Self {
        self.planned_delivery_sim_minute = Some(sim_minute);
        self
    }

    pub fn with_components(mut self, components: Vec<ComponentInstance>) -> Self {
        self.components = components;
        self
    }

    /// 由历史推导出的当前阶段
    pub fn derived_phase(&self) -> Phase {
        self.phase_history
            .last()
            .map(|entry| entry.to_phase)
            .unwrap_or_else(Phase::initial)
    }

    /// 校验订单不变量
    ///
    /// # 规则
    /// 1) 当前阶段与历史末项一致
    /// 2) 历史时间单调不减
    /// 3) 组件工时合法
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.phase != self.derived_phase() {
            return Err(format!(
                "订单阶段与历史不一致: order_id={}, phase={}, history_last={}",
                self.order_id,
                self.phase,
                self.derived_phase()
            ));
        }
        let monotonic = self
            .phase_history
            .windows(2)
            .all(|w| w[0].sim_minute <= w[1].sim_minute);
        if !monotonic {
            return Err(format!("阶段历史时间倒序: order_id={}", self.order_id));
        }
        for component in &self.components {
            component.validate()?;
        }
        Ok(())
    }

    /// 最后一条阶段历史的仿真分钟
    pub fn last_recorded_minute(&self) -> Option<SimMinute> {
        self.phase_history.last().map(|entry| entry.sim_minute)
    }

    /// 最近一次进入指定阶段的仿真分钟
    pub fn entered_phase_at(&self, phase: Phase) -> Option<SimMinute> {
        self.phase_history
            .iter()
            .rev()
            .find(|entry| entry.to_phase == phase)
            .map(|entry| entry.sim_minute)
    }

    /// 预计处理时长（小时）
    ///
    /// 组件工时之和，限制在 [1, 48]；无工时信息时取默认值
    pub fn expected_processing_hours(&self) -> f64 {
        let total: f64 = self.components.iter().map(|c| c.total_hours()).sum();
        if self.components.is_empty() || total <= 0.0 {
            return DEFAULT_PROCESSING_HOURS;
        }
        total.clamp(MIN_PROCESSING_HOURS, MAX_PROCESSING_HOURS)
    }

    /// 预计处理时长（仿真分钟，向上取整）
    pub fn expected_processing_minutes(&self) -> SimMinute {
        (self.expected_processing_hours() * 60.0).ceil() as SimMinute
    }

    /// 主导组件类型（工时最大的类型；并列时取名称最小者）
    pub fn dominant_component_type(&self) -> Option<String> {
        let mut totals: std::collections::BTreeMap<&str, f64> = std::collections::BTreeMap::new();
        for component in &self.components {
            *totals.entry(component.component_type.as_str()).or_insert(0.0) +=
                component.total_hours();
        }
        let mut best: Option<(&str, f64)> = None;
        for (ty, hours) in totals {
            match best {
                Some((_, best_hours)) if hours <= best_hours => {}
                _ => best = Some((ty, hours)),
            }
        }
        best.map(|(ty, _)| ty.to_string())
    }
}
