//! Record types shared by every pipeline stage
//!
//! Field names here are the on-disk contract: stage result files, the
//! consensus snapshot, and exports all serialize these structs directly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

// ============================================================================
// Entity kinds
// ============================================================================

/// Kind of an input or library entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Amino-acid sequence
    Protein,
    /// Small molecule (SMILES)
    Ligand,
}

impl EntityKind {
    /// The kind a partner must have to pair with this kind
    pub fn opposite(self) -> Self {
        match self {
            EntityKind::Protein => EntityKind::Ligand,
            EntityKind::Ligand => EntityKind::Protein,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Protein => "protein",
            EntityKind::Ligand => "ligand",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "protein" => Ok(EntityKind::Protein),
            "ligand" => Ok(EntityKind::Ligand),
            other => Err(Error::InvalidInput(format!(
                "Invalid entity type {other}; expected 'protein' or 'ligand'"
            ))),
        }
    }
}

// ============================================================================
// Stages
// ============================================================================

/// Pipeline stage discriminator
///
/// Declaration order is execution order; `Ord` follows it so maps keyed by
/// stage serialize as dti, docking, mmgbsa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Drug-target interaction screen over the full library
    Dti,
    /// Docking over DTI survivors
    Docking,
    /// MM/GBSA rescoring over docking survivors
    Mmgbsa,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Dti, Stage::Docking, Stage::Mmgbsa];

    /// Tag used as the trailing scoring component and as the results directory name
    pub fn tag(self) -> &'static str {
        match self {
            Stage::Dti => "dti",
            Stage::Docking => "docking",
            Stage::Mmgbsa => "mmgbsa",
        }
    }

    /// Stage whose persisted survivors feed this one (`None` for the library screen)
    pub fn upstream(self) -> Option<Stage> {
        match self {
            Stage::Dti => None,
            Stage::Docking => Some(Stage::Dti),
            Stage::Mmgbsa => Some(Stage::Docking),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// User supplied sequence or SMILES entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub value: String,
}

/// Library partner entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub value: String,
}

// ============================================================================
// Results
// ============================================================================

/// One ranked (input, partner) result of a single stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub input_id: String,
    pub partner_id: String,
    #[serde(rename = "partner_type")]
    pub partner_kind: EntityKind,
    pub stage: Stage,
    /// Synthetic score in [0, 1)
    pub score: f64,
    /// 1-based, contiguous within (input_id, stage)
    pub rank: usize,
}

/// Raw per-stage scores carried on a consensus row; `None` marks an absent stage
pub type StageScores = BTreeMap<Stage, Option<f64>>;

/// Fused ranking row for one (input, partner) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusEntry {
    pub input_id: String,
    pub partner_id: String,
    #[serde(rename = "partner_type")]
    pub partner_kind: EntityKind,
    #[serde(rename = "scores")]
    pub per_stage_scores: StageScores,
    pub consensus_score: f64,
    pub rank: usize,
}

impl ConsensusEntry {
    /// Stages that actually scored this partner
    pub fn stages_present(&self) -> Vec<Stage> {
        self.per_stage_scores
            .iter()
            .filter_map(|(stage, score)| score.map(|_| *stage))
            .collect()
    }
}

/// Row of the cross-input ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalRankingEntry {
    pub input_id: String,
    pub partner_id: String,
    pub consensus_score: f64,
    pub rank: usize,
}

/// Per-input consensus block of the snapshot document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConsensus {
    pub input_id: String,
    pub partners: Vec<ConsensusEntry>,
}

/// Document written by the aggregate stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSnapshot {
    pub generated_at: String,
    pub config_digest: String,
    pub inputs: Vec<InputConsensus>,
    pub global_ranking: Vec<GlobalRankingEntry>,
}
