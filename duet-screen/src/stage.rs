//! Stage Runner
//!
//! Scores every (input, candidate) pair for one stage, keeps the top-K per
//! input, and persists the ranked survivors. The three stages differ only in
//! their tag and in where candidates come from:
//!
//! | Stage     | Candidates                                             |
//! |-----------|--------------------------------------------------------|
//! | `dti`     | library entries of the opposite kind                   |
//! | `docking` | `dti/results.jsonl` survivors, in prior rank order     |
//! | `mmgbsa`  | `docking/results.jsonl` survivors, in prior rank order |

use duet_common::config::Config;
use duet_common::models::{InputRecord, PartnerRecord, ScoreEntry, Stage};
use duet_common::records::{read_jsonl_numbered, write_jsonl};
use duet_common::Error;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::data::Library;
use crate::error::ScreenResult;
use crate::scheduler::{DeviceId, DeviceScheduler, Task, TaskError};
use crate::scoring::score;

/// One input with the candidates it is scored against
#[derive(Debug, Clone)]
pub struct StageWork {
    pub input: InputRecord,
    pub candidates: Vec<PartnerRecord>,
}

/// Rank candidates for one input and keep the best `top_k`
///
/// Ties keep the candidates' original order.
pub fn rank_candidates(
    input: &InputRecord,
    candidates: &[PartnerRecord],
    stage: Stage,
    top_k: usize,
) -> Vec<ScoreEntry> {
    let mut scored: Vec<(&PartnerRecord, f64)> = candidates
        .iter()
        .map(|candidate| {
            let value = score(&[input.value.as_str(), candidate.value.as_str(), stage.tag()]);
            (candidate, value)
        })
        .collect();
    // sort_by is stable
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);

    scored
        .into_iter()
        .enumerate()
        .map(|(position, (candidate, value))| ScoreEntry {
            input_id: input.id.clone(),
            partner_id: candidate.id.clone(),
            partner_kind: candidate.kind,
            stage,
            score: value,
            rank: position + 1,
        })
        .collect()
}

/// Score a chunk of inputs in parallel, preserving input order
pub fn score_chunk(work: &[StageWork], stage: Stage, top_k: usize) -> Vec<ScoreEntry> {
    work.par_iter()
        .map(|item| rank_candidates(&item.input, &item.candidates, stage, top_k))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

/// Runs stages against a loaded input set and library
pub struct StageRunner<'a> {
    config: &'a Config,
    library: &'a Library,
    scheduler: DeviceScheduler,
}

impl<'a> StageRunner<'a> {
    pub fn new(config: &'a Config, library: &'a Library) -> ScreenResult<Self> {
        let scheduler = DeviceScheduler::new(
            config.pipeline.devices.clone(),
            config.pipeline.max_retries,
        )?;
        Ok(Self {
            config,
            library,
            scheduler,
        })
    }

    /// Build the per-input candidate lists for `stage`
    pub fn collect_work(
        &self,
        stage: Stage,
        inputs: &[InputRecord],
    ) -> ScreenResult<Vec<StageWork>> {
        let Some(upstream) = stage.upstream() else {
            return Ok(inputs
                .iter()
                .map(|input| StageWork {
                    input: input.clone(),
                    candidates: self.library.opposite_partners(input.kind).to_vec(),
                })
                .collect());
        };

        let source = self.config.paths.stage_results(upstream);
        let what = format!("{} results", upstream.tag().to_uppercase());
        let rows: Vec<(usize, ScoreEntry)> = read_jsonl_numbered(&source, &what)?;

        let known: HashMap<&str, &InputRecord> =
            inputs.iter().map(|input| (input.id.as_str(), input)).collect();
        let mut survivors: HashMap<&str, Vec<(usize, PartnerRecord)>> = HashMap::new();
        for &(line, ref row) in &rows {
            let Some(&input) = known.get(row.input_id.as_str()) else {
                let reason = format!("Unknown input id {}", row.input_id);
                return Err(Error::malformed(&source, line, reason).into());
            };
            if row.partner_kind != input.kind.opposite() {
                let reason = format!(
                    "Partner {} has type {} but input {} is a {}",
                    row.partner_id, row.partner_kind, input.id, input.kind
                );
                return Err(Error::malformed(&source, line, reason).into());
            }
            let partner = self
                .library
                .lookup(row.partner_kind, &row.partner_id)
                .ok_or_else(|| {
                    let reason = format!("Unknown partner id {}", row.partner_id);
                    Error::malformed(&source, line, reason)
                })?;
            survivors
                .entry(input.id.as_str())
                .or_default()
                .push((row.rank, partner.clone()));
        }

        Ok(inputs
            .iter()
            .filter_map(|input| {
                let mut ranked = survivors.remove(input.id.as_str())?;
                ranked.sort_by_key(|(rank, _)| *rank);
                Some(StageWork {
                    input: input.clone(),
                    candidates: ranked.into_iter().map(|(_, partner)| partner).collect(),
                })
            })
            .collect())
    }

    /// Run one stage and persist its results; returns the results path
    pub async fn run(
        &self,
        stage: Stage,
        inputs: &[InputRecord],
        cancel: &CancellationToken,
    ) -> ScreenResult<PathBuf> {
        let started = Instant::now();
        let work = self.collect_work(stage, inputs)?;
        let top_k = self.config.pipeline.top_k(stage);

        let tasks: Vec<Task<Vec<StageWork>>> = work
            .chunks(self.config.pipeline.chunk_size)
            .enumerate()
            .map(|(index, chunk)| {
                Task::new(index, format!("{stage}_chunk_{index}"), chunk.to_vec())
            })
            .collect();
        info!(
            stage = %stage,
            inputs = work.len(),
            chunks = tasks.len(),
            devices = ?self.scheduler.devices(),
            dispatch = ?self.config.pipeline.dispatch,
            "Starting stage"
        );

        let worker = move |task: &Task<Vec<StageWork>>,
                           device: DeviceId|
              -> Result<Vec<ScoreEntry>, TaskError> {
            let entries = score_chunk(&task.payload, stage, top_k);
            debug!(task = %task.name, device, entries = entries.len(), "Chunk scored");
            Ok(entries)
        };
        let mut completed = self
            .scheduler
            .dispatch_with(self.config.pipeline.dispatch, tasks, worker, cancel)
            .await?;

        // Completion order depends on the backend; persist in submission order
        completed.sort_by_key(|dispatched| dispatched.task.index);
        let entries: Vec<ScoreEntry> = completed
            .into_iter()
            .flat_map(|dispatched| dispatched.result)
            .collect();

        let output = self.config.paths.stage_results(stage);
        write_jsonl(&output, &entries)?;
        info!(
            stage = %stage,
            entries = entries.len(),
            output = %output.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stage complete"
        );
        Ok(output)
    }
}
