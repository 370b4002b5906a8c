// ==========================================
// 再制造工厂仿真 - 交付偏差指标
// ==========================================
// 口径:
// - deviation = final - planned（分钟）
// - late: > 0.5；early: < -0.5；其余 on-time
// - 缺少实际完工的订单计为 pending，不参与偏差统计
// - 无计划交付的订单计为 unplanned，不参与偏差统计
// - completed_count = 0 时平均值为 None（区别于"偏差为 0"）
// ==========================================

use crate::domain::order::Order;
use crate::domain::types::{ProductType, SimMinute};
use crate::engine::clock::sim_minute_to_iso;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

pub const LATE_THRESHOLD_MINUTES: f64 = 0.5;
pub const DEFAULT_WORST_OFFENDERS: usize = 10;

/// 单个订单的偏差样本
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviationSample {
    pub order_id: String,
    pub product_type: ProductType,
    pub planned_sim_minute: SimMinute,
    pub final_sim_minute: SimMinute,
    pub deviation_minutes: i64,
    /// 超出可表示的墙钟范围时为 None
    pub planned_at: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryMetrics {
    pub total_orders: usize,
    /// 同时具备计划与实际完工的订单数
    pub completed_count: usize,
    pub pending_count: usize,
    pub unplanned_count: usize,
    pub late_count: usize,
    pub early_count: usize,
    pub on_time_count: usize,
    pub average_deviation_minutes: Option<f64>,
    pub mean_absolute_deviation_minutes: Option<f64>,
    pub worst_offenders: Vec<DeviationSample>,
}

impl DeliveryMetrics {
    /// 是否已有可统计的完工数据
    pub fn has_data(&self) -> bool {
        self.completed_count > 0
    }
}

pub struct DeliveryMetricsEngine;

impl DeliveryMetricsEngine {
    /// 计算交付偏差
    ///
    /// # 参数
    /// - orders: 参与统计的订单
    /// - simulation_start: 仿真起点（用于 ISO 时间渲染）
    /// - top_n: worst offenders 样本上限
    pub fn compute<'a, I>(orders: I, simulation_start: DateTime<Utc>, top_n: usize) -> DeliveryMetrics
    where
        I: IntoIterator<Item = &'a Order>,
    {
        let mut total_orders = 0usize;
        let mut pending_count = 0usize;
        let mut unplanned_count = 0usize;
        let mut samples = Vec::new();

        for order in orders {
            total_orders += 1;
            let Some(planned) = order.planned_delivery_sim_minute else {
                unplanned_count += 1;
                continue;
            };
            let Some(actual) = order.final_completion_sim_minute else {
                pending_count += 1;
                continue;
            };
            samples.push(DeviationSample {
                order_id: order.order_id.clone(),
                product_type: order.product_type,
                planned_sim_minute: planned,
                final_sim_minute: actual,
                deviation_minutes: actual.saturating_sub(planned),
                planned_at: sim_minute_to_iso(simulation_start, planned),
                completed_at: sim_minute_to_iso(simulation_start, actual),
            });
        }

        let completed_count = samples.len();
        let (mut late_count, mut early_count, mut on_time_count) = (0, 0, 0);
        let mut sum = 0.0;
        let mut abs_sum = 0.0;
        for sample in &samples {
            let deviation = sample.deviation_minutes as f64;
            if deviation > LATE_THRESHOLD_MINUTES {
                late_count += 1;
            } else if deviation < -LATE_THRESHOLD_MINUTES {
                early_count += 1;
            } else {
                on_time_count += 1;
            }
            sum += deviation;
            abs_sum += deviation.abs();
        }
        let (average, mad) = if completed_count == 0 {
            (None, None)
        } else {
            let n = completed_count as f64;
            (Some(sum / n), Some(abs_sum / n))
        };

        samples.sort_by(|a, b| {
            b.deviation_minutes
                .unsigned_abs()
                .cmp(&a.deviation_minutes.unsigned_abs())
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        samples.truncate(top_n);

        debug!(
            total_orders,
            completed_count,
            pending_count,
            late_count,
            early_count,
            "交付偏差统计完成"
        );

        DeliveryMetrics {
            total_orders,
            completed_count,
            pending_count,
            unplanned_count,
            late_count,
            early_count,
            on_time_count,
            average_deviation_minutes: average,
            mean_absolute_deviation_minutes: mad,
            worst_offenders: samples,
        }
    }
}
