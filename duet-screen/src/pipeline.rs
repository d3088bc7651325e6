//! Command orchestration
//!
//! Each stage reads the persisted output of the one before it, so stages
//! run strictly in order and a stage can be re-run on its own.

use duet_common::config::Config;
use duet_common::models::{InputRecord, Stage};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::consensus;
use crate::data::{load_inputs, Library};
use crate::error::ScreenResult;
use crate::report;
use crate::stage::StageRunner;
use crate::workspace;

/// Inputs and library shared by the stage commands
pub struct StageContext {
    pub inputs: Vec<InputRecord>,
    pub library: Library,
}

impl StageContext {
    pub fn load(config: &Config) -> ScreenResult<Self> {
        let library = Library::load(&config.library)?;
        let inputs = load_inputs(&config.inputs.sequences)?;
        Ok(Self { inputs, library })
    }
}

/// Run one stage and return its results path
pub async fn run_stage(
    config: &Config,
    context: &StageContext,
    stage: Stage,
    cancel: &CancellationToken,
) -> ScreenResult<PathBuf> {
    StageRunner::new(config, &context.library)?
        .run(stage, &context.inputs, cancel)
        .await
}

/// validate, prep, every stage, aggregate, report
///
/// Returns the text report path.
pub async fn run_all(config: &Config, cancel: &CancellationToken) -> ScreenResult<PathBuf> {
    workspace::run_validate(config)?;
    let context = StageContext::load(config)?;
    workspace::run_prep(config)?;

    for stage in Stage::ALL {
        run_stage(config, &context, stage, cancel).await?;
    }
    consensus::run_aggregate(config)?;
    let report = report::run_report(config)?;
    info!(report = %report.display(), "Pipeline complete");
    Ok(report)
}
