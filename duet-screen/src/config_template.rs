//! Starter configuration files for `init-config`
//!
//! Builds a config document from command-line values, checks it with the
//! same rules the loader applies, and writes it as TOML, or as JSON when
//! the destination ends in `.json`.

use duet_common::config::{LibraryLigand, LibraryProtein, PipelineSettings};
use duet_common::records::write_atomic;
use duet_common::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Proteins written when no protein library file is given
pub fn sample_proteins() -> Vec<LibraryProtein> {
    [
        ("CRBN", "MMDKEVQKSSSRTPSYQPGVSQSVE"),
        ("IKZF1", "MPLGKKAKLPEKKAPVTPQLPQLQ"),
    ]
    .into_iter()
    .map(|(id, sequence)| LibraryProtein {
        id: id.to_string(),
        sequence: sequence.to_string(),
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputsTemplate {
    pub sequences: PathBuf,
}

/// Scalar keys precede the entry arrays so the TOML form stays flat
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LibraryTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proteins_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ligands_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub proteins: Vec<LibraryProtein>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ligands: Vec<LibraryLigand>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathsTemplate {
    pub workdir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reports: Option<PathBuf>,
}

/// A complete configuration document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigTemplate {
    pub pipeline: PipelineSettings,
    pub inputs: InputsTemplate,
    pub library: LibraryTemplate,
    pub paths: PathsTemplate,
}

impl ConfigTemplate {
    /// Apply the loader's rules so a written file always loads
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.pipeline.stage_weights.normalized()?;
        let library = &self.library;
        if library.proteins.is_empty() && library.proteins_file.is_none() {
            return Err(Error::Config("The library needs at least one protein".to_string()));
        }
        if library.ligands.is_empty() && library.ligands_file.is_none() {
            return Err(Error::Config("The library needs at least one ligand".to_string()));
        }
        Ok(())
    }

    /// Serialize as JSON or TOML
    pub fn render(&self, json: bool) -> Result<String> {
        if json {
            let mut text = serde_json::to_string_pretty(self)?;
            text.push('\n');
            Ok(text)
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| Error::Config(format!("Render TOML config failed: {}", e)))
        }
    }
}

/// Write `template` to `path`; an existing file is only replaced with `force`
pub fn write_config_template(path: &Path, template: &ConfigTemplate, force: bool) -> Result<PathBuf> {
    if path.exists() && !force {
        return Err(Error::InvalidInput(format!(
            "{} already exists (use --force to replace it)",
            path.display()
        )));
    }
    template.validate()?;

    let json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    write_atomic(path, template.render(json)?.as_bytes())?;
    info!(path = %path.display(), format = if json { "json" } else { "toml" }, "Config written");
    Ok(path.to_path_buf())
}
