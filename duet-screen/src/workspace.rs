//! Workspace checks and layout
//!
//! `validate` confirms the input file exists and the output locations can
//! be created; `prep` lays out one results directory per stage.

use duet_common::config::{Config, WORK_SUBDIRS};
use duet_common::{Error, Result};
use std::path::PathBuf;
use tracing::info;

/// Confirm inputs exist and output directories are creatable
pub fn run_validate(config: &Config) -> Result<()> {
    let sequences = &config.inputs.sequences;
    if !sequences.is_file() {
        return Err(Error::missing("Input sequence file", sequences));
    }
    std::fs::create_dir_all(&config.paths.workdir)?;
    std::fs::create_dir_all(&config.paths.reports)?;
    info!(
        inputs = %sequences.display(),
        workdir = %config.paths.workdir.display(),
        "Configuration validated"
    );
    Ok(())
}

/// Create the workdir layout; returns the directories ensured
pub fn run_prep(config: &Config) -> Result<Vec<PathBuf>> {
    let mut created = vec![config.paths.workdir.clone(), config.paths.reports.clone()];
    created.extend(WORK_SUBDIRS.iter().map(|name| config.paths.workdir.join(name)));
    for dir in &created {
        std::fs::create_dir_all(dir)?;
    }
    info!(workdir = %config.paths.workdir.display(), dirs = created.len(), "Workspace prepared");
    Ok(created)
}
