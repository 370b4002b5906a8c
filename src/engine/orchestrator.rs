// ==========================================
// 再制造工厂仿真 - Tick 编排器
// ==========================================
// 用途: 单工厂单 tick 的完整流程
// 流程:
// 1. 读取工厂配置、解析调度策略
// 2. 读取订单快照与三段队列
// 3. 完工检测（START → ENDE）与质检交接（ENDE → QP）
// 4. 以完工后的计数计算产能
// 5. 逐队列阶段调用策略，校验决策
// 6. 全部推进与队列变更作为一个批次原子提交
// 红线:
// - 同一工厂的 tick 串行执行
// - 持久化失败时本 tick 全部作废
// ==========================================

use crate::config::FactoryConfigReader;
use crate::domain::factory::FactoryConfig;
use crate::domain::order::Order;
use crate::domain::queue::{sort_fcfs, QueueEntry, QueuePayload};
use crate::domain::transition::{PhaseTransition, QueueOp, TransitionBatch, TransitionDecision};
use crate::domain::types::{Phase, QueueStage, SimMinute};
use crate::engine::capacity_allocator::{CapacityAllocator, CapacityView};
use crate::engine::clock::Clock;
use crate::engine::completion::CompletionDetector;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::phase_machine::PhaseStateMachine;
use crate::engine::policy::{FactorySnapshot, PolicyRegistry, StageState};
use crate::repository::{OrderRepository, QueueRepository};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 准入处理顺序：下游优先
const ADMISSION_ORDER: [QueueStage; 3] = [
    QueueStage::PostInspection,
    QueueStage::PreInspection,
    QueueStage::PreAcceptance,
];

// ==========================================
// TickReport - 单次 tick 结果
// ==========================================
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub tick_id: String,
    pub factory_id: String,
    pub sim_minute: SimMinute,
    pub policy: String,
    /// 装配完工（START → ENDE）
    pub completed: Vec<String>,
    /// 移交质检（ENDE → QP）
    pub handed_over: Vec<String>,
    /// 各阶段准入的订单
    pub admitted: BTreeMap<QueueStage, Vec<String>>,
    /// 被丢弃的策略决策数
    pub rejected_decisions: usize,
    /// 策略执行失败的阶段
    pub policy_failures: Vec<QueueStage>,
    /// 批次窗口未开放的阶段
    pub closed_stages: Vec<QueueStage>,
    pub capacity: Option<CapacityView>,
}

impl TickReport {
    pub fn admitted_count(&self) -> usize {
        self.admitted.values().map(Vec::len).sum()
    }

    pub fn transition_count(&self) -> usize {
        self.completed.len() + self.handed_over.len() + self.admitted_count()
    }
}

// ==========================================
// TickOrchestrator
// ==========================================
pub struct TickOrchestrator<C>
where
    C: FactoryConfigReader,
{
    config: Arc<C>,
    order_repo: Arc<dyn OrderRepository>,
    queue_repo: Arc<dyn QueueRepository>,
    registry: Arc<PolicyRegistry>,
    state_machine: PhaseStateMachine,
    tick_guards: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<C> TickOrchestrator<C>
where
    C: FactoryConfigReader,
{
    pub fn new(
        config: Arc<C>,
        order_repo: Arc<dyn OrderRepository>,
        queue_repo: Arc<dyn QueueRepository>,
        registry: Arc<PolicyRegistry>,
    ) -> Self {
        Self {
            state_machine: PhaseStateMachine::new(order_repo.clone()),
            config,
            order_repo,
            queue_repo,
            registry,
            tick_guards: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn state_machine(&self) -> &PhaseStateMachine {
        &self.state_machine
    }

    /// 读取并校验工厂配置
    pub async fn load_config(&self, factory_id: &str) -> EngineResult<FactoryConfig> {
        self.config
            .get_factory_config(factory_id)
            .await
            .map_err(|e| EngineError::Configuration(format!("factory_id={}: {}", factory_id, e)))
    }

    /// 续接时钟的起始分钟：已持久化的最晚分钟，无记录时为 0
    pub async fn resume_minute(&self, factory_id: &str) -> EngineResult<SimMinute> {
        let latest = self.order_repo.latest_sim_minute(factory_id).await?;
        Ok(latest.unwrap_or(0).max(0))
    }

    fn factory_guard(&self, factory_id: &str) -> EngineResult<Arc<tokio::sync::Mutex<()>>> {
        let mut guards = self
            .tick_guards
            .lock()
            .map_err(|e| EngineError::Persistence(format!("tick 锁表获取失败: {}", e)))?;
        Ok(guards
            .entry(factory_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    // ==========================================
    // tick
    // ==========================================

    /// 执行一个工厂的一次 tick
    #[instrument(skip(self, clock), fields(sim_minute = clock.now()))]
    pub async fn tick(&self, factory_id: &str, clock: &Clock) -> EngineResult<TickReport> {
        let guard = self.factory_guard(factory_id)?;
        let _running = guard.lock().await;

        let now = clock.now();
        let config = self.load_config(factory_id).await?;
        let policy = self.registry.resolve(&config.queue.active_policy)?;

        let mut report = TickReport {
            tick_id: Uuid::new_v4().to_string(),
            factory_id: factory_id.to_string(),
            sim_minute: now,
            policy: policy.name().to_string(),
            ..TickReport::default()
        };
        info!(tick_id = %report.tick_id, policy = %report.policy, "开始执行 tick");

        // ==========================================
        // 步骤1: 读取快照
        // ==========================================
        let orders: BTreeMap<String, Order> = self
            .order_repo
            .find_orders_by_factory(factory_id)
            .await?
            .into_iter()
            .map(|o| (o.order_id.clone(), o))
            .collect();
        let mut queues: BTreeMap<QueueStage, Vec<QueueEntry>> = BTreeMap::new();
        for stage in QueueStage::ALL {
            queues.insert(stage, self.queue_repo.list_stage(factory_id, stage).await?);
        }

        let mut batch = TransitionBatch::new(now);
        let mut working = orders.clone();

        // ==========================================
        // 步骤2: 完工检测与质检交接
        // ==========================================
        debug!("步骤2: 完工检测");
        let completions = CompletionDetector::detect_completions(orders.values(), now);
        let handovers = CompletionDetector::detect_handovers(orders.values());
        for transition in completions {
            report.completed.push(transition.order_id.clone());
            Self::stage_transition(&mut working, &mut batch, transition);
        }
        for transition in handovers {
            let order_id = transition.order_id.clone();
            Self::stage_transition(&mut working, &mut batch, transition);
            let stage = QueueStage::PostInspection;
            let entry = QueueEntry::new(
                factory_id,
                stage,
                &order_id,
                now,
                config.queue.release_minutes(stage),
            );
            batch.queue_ops.push(QueueOp::Enqueue(entry));
            report.handed_over.push(order_id);
        }

        // ==========================================
        // 步骤3: 产能（完工之后计数）
        // ==========================================
        let capacity = CapacityAllocator::compute(&config.capacity, working.values());
        report.capacity = Some(capacity);
        let mut snapshot = FactorySnapshot {
            factory_id: factory_id.to_string(),
            orders: working,
            capacity,
        };

        // ==========================================
        // 步骤4: 逐阶段准入
        // ==========================================
        for stage in ADMISSION_ORDER {
            let entries = queues.remove(&stage).unwrap_or_default();
            if !self.batch_window_open(factory_id, stage, &config, now).await? {
                debug!(stage = %stage.as_str(), "批次窗口未开放");
                report.closed_stages.push(stage);
                continue;
            }

            let mut eligible: Vec<QueueEntry> =
                entries.into_iter().filter(|e| e.is_eligible(now)).collect();
            sort_fcfs(&mut eligible);
            if eligible.is_empty() {
                continue;
            }

            let admission_limit = Self::stage_limit(&config, &snapshot.capacity, stage, eligible.len());
            let stage_state = StageState {
                stage,
                eligible,
                admission_limit,
            };

            let decisions = match policy.decide(&snapshot, &stage_state, &config, now) {
                Ok(decisions) => decisions,
                Err(e) => {
                    warn!(stage = %stage.as_str(), error = %e, "策略执行失败，本阶段不准入");
                    report.policy_failures.push(stage);
                    continue;
                }
            };

            let accepted = self.screen_decisions(&snapshot, &stage_state, decisions, &mut report);
            let mut admitted_ids = Vec::with_capacity(accepted.len());
            for (transition, entry) in accepted {
                batch.queue_ops.push(QueueOp::Dequeue {
                    stage,
                    order_id: entry.order_id.clone(),
                });
                if let Some(next_stage) = QueueStage::fed_by(transition.to_phase) {
                    let mut next = QueueEntry::new(
                        factory_id,
                        next_stage,
                        &entry.order_id,
                        now,
                        config.queue.release_minutes(next_stage),
                    );
                    next.processing_order = entry.processing_order;
                    next.payload = entry.payload.clone();
                    batch.queue_ops.push(QueueOp::Enqueue(next));
                }
                admitted_ids.push(entry.order_id.clone());
                Self::stage_transition(&mut snapshot.orders, &mut batch, transition);
            }
            if !admitted_ids.is_empty() {
                info!(stage = %stage.as_str(), admitted = admitted_ids.len(), "阶段准入");
                report.admitted.insert(stage, admitted_ids);
            }
        }

        // ==========================================
        // 步骤5: 原子提交
        // ==========================================
        if !batch.is_empty() {
            self.state_machine.apply_transitions(factory_id, &batch).await?;
        }

        info!(
            tick_id = %report.tick_id,
            completed = report.completed.len(),
            handed_over = report.handed_over.len(),
            admitted = report.admitted_count(),
            rejected = report.rejected_decisions,
            "tick 完成"
        );
        Ok(report)
    }

    /// 在工作副本上应用推进，并记入批次
    fn stage_transition(
        working: &mut BTreeMap<String, Order>,
        batch: &mut TransitionBatch,
        transition: PhaseTransition,
    ) {
        if let Some(order) = working.get_mut(&transition.order_id) {
            order.phase = transition.to_phase;
        }
        batch.transitions.push(transition);
    }

    /// 批次窗口：now 早于锚点时阶段关闭
    async fn batch_window_open(
        &self,
        factory_id: &str,
        stage: QueueStage,
        config: &FactoryConfig,
        now: SimMinute,
    ) -> EngineResult<bool> {
        let live = self.queue_repo.batch_window(factory_id, stage).await?;
        let anchor = live.or(config.queue.stage(stage).batch_start_sim_minute);
        Ok(anchor.map_or(true, |anchor| now >= anchor))
    }

    /// 阶段准入上限（装配阶段受 MON/DEM 约束，其余受 batch_size 约束）
    fn stage_limit(
        config: &FactoryConfig,
        capacity: &CapacityView,
        stage: QueueStage,
        queue_length: usize,
    ) -> usize {
        if stage.target_phase().occupies_mon_slot() {
            return CapacityAllocator::admission_limit(capacity, queue_length);
        }
        match config.queue.stage(stage).batch_size {
            Some(size) => queue_length.min(size as usize),
            None => queue_length,
        }
    }

    /// 校验策略决策，丢弃无效项（记录日志，不中断 tick）
    fn screen_decisions<'s>(
        &self,
        snapshot: &FactorySnapshot,
        stage_state: &'s StageState,
        decisions: Vec<TransitionDecision>,
        report: &mut TickReport,
    ) -> Vec<(PhaseTransition, &'s QueueEntry)> {
        let limit = stage_state.capacity_limit(snapshot);
        let stage = stage_state.stage;
        let mut seen: HashSet<String> = HashSet::new();
        let mut accepted = Vec::new();

        for decision in decisions {
            if accepted.len() >= limit {
                warn!(
                    stage = %stage.as_str(),
                    order_id = %decision.order_id,
                    limit,
                    "决策超出准入上限，已丢弃"
                );
                report.rejected_decisions += 1;
                continue;
            }
            if !seen.insert(decision.order_id.clone()) {
                report.rejected_decisions += 1;
                continue;
            }
            let Some(entry) = stage_state
                .eligible
                .iter()
                .find(|e| e.order_id == decision.order_id)
            else {
                warn!(
                    stage = %stage.as_str(),
                    order_id = %decision.order_id,
                    "决策订单不在可准入队列中，已丢弃"
                );
                report.rejected_decisions += 1;
                continue;
            };
            let Some(order) = snapshot.order(&decision.order_id) else {
                warn!(order_id = %decision.order_id, "队列条目无对应订单，已丢弃");
                report.rejected_decisions += 1;
                continue;
            };
            match PhaseStateMachine::validate(order, stage.source_phase(), decision.target_phase) {
                Ok(transition) => accepted.push((transition, entry)),
                Err(e) => {
                    warn!(error = %e, "无效决策，已丢弃");
                    report.rejected_decisions += 1;
                }
            }
        }
        accepted
    }

    // ==========================================
    // 订单受理
    // ==========================================

    /// 受理新订单：写入订单并排入 PRE_ACCEPTANCE（单一事务）
    #[instrument(skip(self, order, payload), fields(factory_id = %order.factory_id, order_id = %order.order_id))]
    pub async fn accept_order(
        &self,
        order: Order,
        payload: QueuePayload,
        now: SimMinute,
    ) -> EngineResult<QueueEntry> {
        if order.phase != Phase::initial() || !order.phase_history.is_empty() {
            return Err(EngineError::InvalidTransition {
                order_id: order.order_id.clone(),
                from: order.phase.to_string(),
                to: Phase::initial().to_string(),
                reason: "新订单必须处于初始阶段且无历史".to_string(),
            });
        }
        for component in &order.components {
            component.validate().map_err(EngineError::Configuration)?;
        }
        payload.validate().map_err(EngineError::Configuration)?;

        let config = self.load_config(&order.factory_id).await?;

        let stage = QueueStage::PreAcceptance;
        let mut entry = QueueEntry::new(
            &order.factory_id,
            stage,
            &order.order_id,
            now,
            config.queue.release_minutes(stage),
        );
        entry.payload = payload;

        // 订单与队列条目同一事务写入，不会留下无队列的受理订单
        self.order_repo.insert_order_queued(&order, &entry).await?;

        info!(release_after_minutes = entry.release_after_minutes, "订单已受理");
        Ok(entry)
    }
}
