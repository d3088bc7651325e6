//! Consensus Aggregator
//!
//! Joins the persisted stage results, fuses them per input with weighted
//! reciprocal rank fusion, and merges every input's fused list into one
//! global ranking.
//!
//! A stage with no results for an input is left out of that input's fusion
//! and the remaining stage weights are rescaled to sum to 1. Absent scores
//! are carried as `null`, never as zero.

use duet_common::config::{Config, StageWeights};
use duet_common::models::{
    ConsensusEntry, ConsensusSnapshot, EntityKind, GlobalRankingEntry, InputConsensus, ScoreEntry,
    Stage, StageScores,
};
use duet_common::records::{read_jsonl, write_json};
use duet_common::time;
use duet_common::Error;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ScreenResult;
use crate::fusion::weighted_reciprocal_rank_fusion;

// ============================================================================
// Stage snapshots
// ============================================================================

/// Score and persisted rank of one (input, partner) pair
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    score: f64,
    rank: usize,
}

/// Scores of one stage keyed by input id, then partner id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageSnapshot {
    placements: BTreeMap<String, BTreeMap<String, Placement>>,
    kinds: BTreeMap<String, BTreeMap<String, EntityKind>>,
}

impl StageSnapshot {
    /// Replay a stage's result set; a repeated pair keeps its last score
    pub fn from_entries(entries: &[ScoreEntry]) -> Self {
        let mut snapshot = Self::default();
        for entry in entries {
            snapshot
                .placements
                .entry(entry.input_id.clone())
                .or_default()
                .insert(
                    entry.partner_id.clone(),
                    Placement {
                        score: entry.score,
                        rank: entry.rank,
                    },
                );
            snapshot
                .kinds
                .entry(entry.input_id.clone())
                .or_default()
                .insert(entry.partner_id.clone(), entry.partner_kind);
        }
        snapshot
    }

    /// Read a persisted stage result file
    pub fn load(path: &Path, stage: Stage) -> duet_common::Result<Self> {
        let what = format!("Required stage output ({stage})");
        let entries: Vec<ScoreEntry> = read_jsonl(path, &what)?;
        Ok(Self::from_entries(&entries))
    }

    pub fn input_ids(&self) -> impl Iterator<Item = &String> {
        self.placements.keys()
    }

    pub fn score(&self, input_id: &str, partner_id: &str) -> Option<f64> {
        self.placements
            .get(input_id)?
            .get(partner_id)
            .map(|placement| placement.score)
    }

    pub fn kind(&self, input_id: &str, partner_id: &str) -> Option<EntityKind> {
        self.kinds.get(input_id)?.get(partner_id).copied()
    }

    /// Partner ids for `input_id`, best score first
    ///
    /// Equal scores keep the order the stage persisted (its `rank`), then
    /// ascending id. `None` when the stage produced nothing for the input.
    pub fn ranked(&self, input_id: &str) -> Option<Vec<String>> {
        let placements = self.placements.get(input_id).filter(|p| !p.is_empty())?;
        let mut ordered: Vec<(&String, &Placement)> = placements.iter().collect();
        ordered.sort_by(|(a_id, a), (b_id, b)| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.rank.cmp(&b.rank))
                .then_with(|| a_id.cmp(b_id))
        });
        Some(ordered.into_iter().map(|(id, _)| id.clone()).collect())
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Rescale weights to sum to 1; all-zero weights are returned unchanged
pub fn renormalize_weights(weights: &[f64]) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        weights.iter().map(|w| w / total).collect()
    } else {
        weights.to_vec()
    }
}

/// Per-input consensus plus the cross-input ranking
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    pub inputs: Vec<InputConsensus>,
    pub global_ranking: Vec<GlobalRankingEntry>,
}

/// Fuse stage snapshots into a consensus
///
/// Stages missing from `snapshots` count as absent for every input. Inputs
/// are processed in ascending id order.
pub fn aggregate(
    snapshots: &BTreeMap<Stage, StageSnapshot>,
    weights: &StageWeights,
    constant: f64,
) -> ScreenResult<Consensus> {
    let input_ids: BTreeSet<&String> = snapshots
        .values()
        .flat_map(StageSnapshot::input_ids)
        .collect();

    let mut inputs = Vec::with_capacity(input_ids.len());
    for input_id in input_ids {
        let mut lists = Vec::new();
        let mut stage_weights = Vec::new();
        let mut present = Vec::new();
        for (stage, snapshot) in snapshots {
            if let Some(ranked) = snapshot.ranked(input_id) {
                lists.push(ranked);
                stage_weights.push(weights.weight(*stage));
                present.push(*stage);
            }
        }
        if lists.is_empty() {
            continue;
        }

        let normalized = renormalize_weights(&stage_weights);
        debug!(input_id = %input_id, stages = ?present, weights = ?normalized, "Fusing stages");
        let fused = weighted_reciprocal_rank_fusion(&lists, &normalized, constant)?;

        let partners = fused
            .into_iter()
            .enumerate()
            .map(|(position, (partner_id, consensus_score))| -> ScreenResult<ConsensusEntry> {
                let per_stage_scores: StageScores = Stage::ALL
                    .iter()
                    .map(|stage| {
                        let score = snapshots
                            .get(stage)
                            .and_then(|snapshot| snapshot.score(input_id, &partner_id));
                        (*stage, score)
                    })
                    .collect();
                let partner_kind = present
                    .iter()
                    .find_map(|stage| snapshots.get(stage)?.kind(input_id, &partner_id))
                    .ok_or_else(|| {
                        Error::Internal(format!("No stage recorded a type for partner {partner_id}"))
                    })?;
                Ok(ConsensusEntry {
                    input_id: input_id.clone(),
                    partner_id,
                    partner_kind,
                    per_stage_scores,
                    consensus_score,
                    rank: position + 1,
                })
            })
            .collect::<ScreenResult<Vec<_>>>()?;

        inputs.push(InputConsensus {
            input_id: input_id.clone(),
            partners,
        });
    }

    let global_ranking = global_ranking(&inputs);
    Ok(Consensus {
        inputs,
        global_ranking,
    })
}

/// Merge per-input lists: score descending, then input id, then per-input rank
pub fn global_ranking(inputs: &[InputConsensus]) -> Vec<GlobalRankingEntry> {
    let mut merged: Vec<&ConsensusEntry> = inputs.iter().flat_map(|i| i.partners.iter()).collect();
    merged.sort_by(|a, b| {
        b.consensus_score
            .total_cmp(&a.consensus_score)
            .then_with(|| a.input_id.cmp(&b.input_id))
            .then_with(|| a.rank.cmp(&b.rank))
    });
    merged
        .into_iter()
        .enumerate()
        .map(|(position, entry)| GlobalRankingEntry {
            input_id: entry.input_id.clone(),
            partner_id: entry.partner_id.clone(),
            consensus_score: entry.consensus_score,
            rank: position + 1,
        })
        .collect()
}

/// Aggregate the persisted stage results and write the consensus snapshot
///
/// Every stage result file must exist.
pub fn run_aggregate(config: &Config) -> ScreenResult<PathBuf> {
    let mut snapshots = BTreeMap::new();
    for stage in Stage::ALL {
        let snapshot = StageSnapshot::load(&config.paths.stage_results(stage), stage)?;
        snapshots.insert(stage, snapshot);
    }

    let consensus = aggregate(
        &snapshots,
        &config.pipeline.stage_weights,
        config.pipeline.consensus_constant,
    )?;
    let snapshot = ConsensusSnapshot {
        generated_at: time::now_utc_iso(),
        config_digest: config.digest(),
        inputs: consensus.inputs,
        global_ranking: consensus.global_ranking,
    };

    let output = config.paths.aggregate();
    write_json(&output, &snapshot)?;
    info!(
        inputs = snapshot.inputs.len(),
        ranked = snapshot.global_ranking.len(),
        output = %output.display(),
        "Consensus written"
    );
    Ok(output)
}
