// ==========================================
// 再制造工厂仿真 - 领域类型定义
// ==========================================
// 职责: 阶段、产品类型、队列阶段等枚举
// 序列化格式: 阶段/队列 SCREAMING_SNAKE_CASE（与数据库一致）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 仿真分钟（离散仿真时间单位）
pub type SimMinute = i64;

// ==========================================
// 订单阶段 (Phase)
// ==========================================
// 红线: 只允许沿序列前进一步；强制完工不走此通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Auftragsannahme,    // 订单受理
    Inspektion,         // 入厂检验
    ReassemblyStart,    // 再装配开始
    ReassemblyEnde,     // 再装配结束
    Qualitaetspruefung, // 质量检验
    #[serde(alias = "ABGESCHLOSSEN")]
    Auftragsabschluss, // 订单完结（终态）
}

impl Phase {
    /// 全部阶段（按流水线顺序，终态在最后）
    pub const ALL: [Phase; 6] = [
        Phase::Auftragsannahme,
        Phase::Inspektion,
        Phase::ReassemblyStart,
        Phase::ReassemblyEnde,
        Phase::Qualitaetspruefung,
        Phase::Auftragsabschluss,
    ];

    /// 初始阶段
    pub fn initial() -> Self {
        Phase::Auftragsannahme
    }

    /// 在序列中的位置
    pub fn index(&self) -> usize {
        match self {
            Phase::Auftragsannahme => 0,
            Phase::Inspektion => 1,
            Phase::ReassemblyStart => 2,
            Phase::ReassemblyEnde => 3,
            Phase::Qualitaetspruefung => 4,
            Phase::Auftragsabschluss => 5,
        }
    }

    /// 直接后继阶段（终态返回 None）
    pub fn successor(&self) -> Option<Phase> {
        Phase::ALL.get(self.index() + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Auftragsabschluss)
    }

    /// 是否占用装配（MON）工位
    pub fn occupies_mon_slot(&self) -> bool {
        matches!(self, Phase::ReassemblyStart | Phase::ReassemblyEnde)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Auftragsannahme => "AUFTRAGSANNAHME",
            Phase::Inspektion => "INSPEKTION",
            Phase::ReassemblyStart => "REASSEMBLY_START",
            Phase::ReassemblyEnde => "REASSEMBLY_ENDE",
            Phase::Qualitaetspruefung => "QUALITAETSPRUEFUNG",
            Phase::Auftragsabschluss => "AUFTRAGSABSCHLUSS",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AUFTRAGSANNAHME" => Ok(Phase::Auftragsannahme),
            "INSPEKTION" => Ok(Phase::Inspektion),
            "REASSEMBLY_START" => Ok(Phase::ReassemblyStart),
            "REASSEMBLY_ENDE" => Ok(Phase::ReassemblyEnde),
            "QUALITAETSPRUEFUNG" => Ok(Phase::Qualitaetspruefung),
            "AUFTRAGSABSCHLUSS" | "ABGESCHLOSSEN" => Ok(Phase::Auftragsabschluss),
            other => Err(format!("未知阶段: {}", other)),
        }
    }
}

// ==========================================
// 产品类型 (Product Type)
// ==========================================
// 用于策略优先级与刚性槽位按类型分组
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Basic,
    Premium,
}

impl ProductType {
    pub const ALL: [ProductType; 2] = [ProductType::Basic, ProductType::Premium];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Basic => "basic",
            ProductType::Premium => "premium",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(ProductType::Basic),
            "premium" => Ok(ProductType::Premium),
            other => Err(format!("未知产品类型: {}", other)),
        }
    }
}

// ==========================================
// 队列阶段 (Queue Stage)
// ==========================================
// 三个串行准入队列，每个队列对应一次阶段推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStage {
    PreAcceptance,  // 受理后待检验
    PreInspection,  // 检验后待装配（MON/DEM 门控）
    PostInspection, // 质检后待完结
}

impl QueueStage {
    pub const ALL: [QueueStage; 3] = [
        QueueStage::PreAcceptance,
        QueueStage::PreInspection,
        QueueStage::PostInspection,
    ];

    /// 队列中订单所处的阶段
    pub fn source_phase(&self) -> Phase {
        match self {
            QueueStage::PreAcceptance => Phase::Auftragsannahme,
            QueueStage::PreInspection => Phase::Inspektion,
            QueueStage::PostInspection => Phase::Qualitaetspruefung,
        }
    }

    /// 准入后进入的阶段
    pub fn target_phase(&self) -> Phase {
        match self {
            QueueStage::PreAcceptance => Phase::Inspektion,
            QueueStage::PreInspection => Phase::ReassemblyStart,
            QueueStage::PostInspection => Phase::Auftragsabschluss,
        }
    }

    /// 进入某阶段后需要排入的队列
    pub fn fed_by(phase: Phase) -> Option<QueueStage> {
        QueueStage::ALL
            .into_iter()
            .find(|stage| stage.source_phase() == phase)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStage::PreAcceptance => "PRE_ACCEPTANCE",
            QueueStage::PreInspection => "PRE_INSPECTION",
            QueueStage::PostInspection => "POST_INSPECTION",
        }
    }

    /// 配置键前缀
    pub fn config_prefix(&self) -> &'static str {
        match self {
            QueueStage::PreAcceptance => "pre_acceptance",
            QueueStage::PreInspection => "pre_inspection",
            QueueStage::PostInspection => "post_inspection",
        }
    }
}

impl fmt::Display for QueueStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QueueStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "PRE_ACCEPTANCE" => Ok(QueueStage::PreAcceptance),
            "PRE_INSPECTION" => Ok(QueueStage::PreInspection),
            "POST_INSPECTION" => Ok(QueueStage::PostInspection),
            other => Err(format!("未知队列阶段: {}", other)),
        }
    }
}

// ==========================================
// 组件更换标记 (Replacement Flag)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplacementFlag {
    #[default]
    None,
    Required, // 必须更换
    Desired,  // 建议更换
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_successor_chain() {
        let mut phase = Phase::initial();
        let mut visited = vec![phase];
        while let Some(next) = phase.successor() {
            visited.push(next);
            phase = next;
        }
        assert_eq!(visited, Phase::ALL.to_vec());
        assert!(phase.is_terminal());
    }

    #[test]
    fn test_phase_serde_alias() {
        let p: Phase = serde_json::from_str("\"ABGESCHLOSSEN\"").unwrap();
        assert_eq!(p, Phase::Auftragsabschluss);
        assert_eq!(
            serde_json::to_string(&Phase::ReassemblyStart).unwrap(),
            "\"REASSEMBLY_START\""
        );
        assert_eq!("abgeschlossen".parse::<Phase>().unwrap(), Phase::Auftragsabschluss);
    }

    #[test]
    fn test_stage_routing() {
        assert_eq!(QueueStage::fed_by(Phase::Inspektion), Some(QueueStage::PreInspection));
        assert_eq!(QueueStage::fed_by(Phase::ReassemblyStart), None);
        for stage in QueueStage::ALL {
            assert_eq!(stage.source_phase().successor(), Some(stage.target_phase()));
        }
    }
}
