//! Reports and exports built from the consensus snapshot

use duet_common::config::Config;
use duet_common::models::{ConsensusEntry, ConsensusSnapshot, Stage};
use duet_common::records::{read_json, write_atomic, write_json};
use duet_common::{Error, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::data::Library;

/// Partners listed per input in the text report
pub const REPORT_TOP_N: usize = 5;

/// Default partner limit per input for exports
pub const DEFAULT_EXPORT_LIMIT: usize = 50;

fn load_snapshot(config: &Config) -> Result<ConsensusSnapshot> {
    read_json(&config.paths.aggregate(), "Aggregate results")
}

// ============================================================================
// Report
// ============================================================================

/// Render the human-readable summary
pub fn render_text(snapshot: &ConsensusSnapshot) -> String {
    let mut out = String::new();
    out.push_str("DUET-Screen Report\n");
    out.push_str("==================\n");
    out.push_str(&format!("Generated at: {}\n", snapshot.generated_at));
    out.push('\n');

    for input in &snapshot.inputs {
        out.push_str(&format!("Input: {}\n", input.input_id));
        if input.partners.is_empty() {
            out.push_str("  No partners ranked.\n");
        }
        for partner in input.partners.iter().take(REPORT_TOP_N) {
            out.push_str(&format!(
                "  {}. {} ({}) -> {:.6}\n",
                partner.rank, partner.partner_id, partner.partner_kind, partner.consensus_score
            ));
        }
        out.push('\n');
    }

    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out.push('\n');
    out
}

/// Write `report.json` and `report.txt`; returns the text report path
pub fn run_report(config: &Config) -> Result<PathBuf> {
    let snapshot = load_snapshot(config)?;

    write_json(&config.paths.report_json(), &snapshot)?;
    let report_txt = config.paths.report_txt();
    write_atomic(&report_txt, render_text(&snapshot).as_bytes())?;

    info!(
        inputs = snapshot.inputs.len(),
        report = %report_txt.display(),
        "Report written"
    );
    Ok(report_txt)
}

// ============================================================================
// Export
// ============================================================================

/// Descriptive statistics over the stage scores a partner actually has
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreAnalysis {
    pub stages_present: Vec<Stage>,
    pub stage_count: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Population standard deviation
    pub std: Option<f64>,
}

impl ScoreAnalysis {
    pub fn of(entry: &ConsensusEntry) -> Self {
        let values: Vec<f64> = entry.per_stage_scores.values().flatten().copied().collect();
        let stages_present = entry.stages_present();
        if values.is_empty() {
            return Self {
                stages_present,
                stage_count: 0,
                mean: None,
                min: None,
                max: None,
                std: None,
            };
        }

        let count = values.len() as f64;
        let mean = values.iter().sum::<f64>() / count;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
        Self {
            stages_present,
            stage_count: values.len(),
            mean: Some(mean),
            min: values.iter().copied().reduce(f64::min),
            max: values.iter().copied().reduce(f64::max),
            std: Some(variance.sqrt()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedPartner {
    #[serde(flatten)]
    pub entry: ConsensusEntry,
    /// Sequence or SMILES from the library, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub analysis: ScoreAnalysis,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedInput {
    pub input_id: String,
    pub partners: Vec<ExportedPartner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub generated_at: String,
    pub config_digest: String,
    pub inputs: Vec<ExportedInput>,
}

/// Export filter options
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Only these inputs; empty exports all
    pub input_ids: Vec<String>,
    pub limit: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            input_ids: Vec::new(),
            limit: DEFAULT_EXPORT_LIMIT,
        }
    }
}

/// Select and enrich consensus rows; fails if no input matches
pub fn build_export(
    snapshot: &ConsensusSnapshot,
    library: Option<&Library>,
    options: &ExportOptions,
) -> Result<ExportDocument> {
    let selected: BTreeSet<&str> = options.input_ids.iter().map(String::as_str).collect();

    let inputs: Vec<ExportedInput> = snapshot
        .inputs
        .iter()
        .filter(|input| selected.is_empty() || selected.contains(input.input_id.as_str()))
        .map(|input| ExportedInput {
            input_id: input.input_id.clone(),
            partners: input
                .partners
                .iter()
                .take(options.limit)
                .map(|entry| ExportedPartner {
                    value: library
                        .and_then(|lib| lib.lookup(entry.partner_kind, &entry.partner_id))
                        .map(|partner| partner.value.clone()),
                    analysis: ScoreAnalysis::of(entry),
                    entry: entry.clone(),
                })
                .collect(),
        })
        .collect();

    if inputs.is_empty() {
        return Err(Error::InvalidInput(
            "No inputs matched the export criteria".to_string(),
        ));
    }
    Ok(ExportDocument {
        generated_at: snapshot.generated_at.clone(),
        config_digest: snapshot.config_digest.clone(),
        inputs,
    })
}

/// Export the consensus to `output` (default `<reports>/export.json`)
pub fn run_export(
    config: &Config,
    library: Option<&Library>,
    options: &ExportOptions,
    output: Option<&Path>,
) -> Result<PathBuf> {
    let snapshot = load_snapshot(config)?;
    let document = build_export(&snapshot, library, options)?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.paths.reports.join("export.json"));
    write_json(&output, &document)?;

    let rows: usize = document.inputs.iter().map(|i| i.partners.len()).sum();
    info!(
        inputs = document.inputs.len(),
        partners = rows,
        output = %output.display(),
        "Exported consensus rows"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_common::models::{EntityKind, InputConsensus, StageScores};

    fn consensus_entry(input: &str, partner: &str, rank: usize, scores: [Option<f64>; 3]) -> ConsensusEntry {
        let per_stage_scores: StageScores = Stage::ALL.into_iter().zip(scores).collect();
        ConsensusEntry {
            input_id: input.to_string(),
            partner_id: partner.to_string(),
            partner_kind: EntityKind::Ligand,
            per_stage_scores,
            consensus_score: 0.5 / rank as f64,
            rank,
        }
    }

    fn snapshot() -> ConsensusSnapshot {
        ConsensusSnapshot {
            generated_at: "2026-01-01T00:00:00.000000+00:00".to_string(),
            config_digest: "abc".to_string(),
            inputs: vec![
                InputConsensus {
                    input_id: "CRBN".to_string(),
                    partners: (1..=7)
                        .map(|r| consensus_entry("CRBN", &format!("L{r}"), r, [Some(0.5), None, None]))
                        .collect(),
                },
                InputConsensus {
                    input_id: "VHL".to_string(),
                    partners: vec![],
                },
            ],
            global_ranking: vec![],
        }
    }

    #[test]
    fn test_analysis_uses_present_stages_only() {
        let entry = consensus_entry("A", "B", 1, [Some(0.2), None, Some(0.6)]);
        let analysis = ScoreAnalysis::of(&entry);

        assert_eq!(analysis.stages_present, vec![Stage::Dti, Stage::Mmgbsa]);
        assert_eq!(analysis.stage_count, 2);
        assert!((analysis.mean.unwrap() - 0.4).abs() < 1e-12);
        assert_eq!(analysis.min, Some(0.2));
        assert_eq!(analysis.max, Some(0.6));
        assert!((analysis.std.unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_analysis_of_no_scores() {
        let entry = consensus_entry("A", "B", 1, [None, None, None]);
        let analysis = ScoreAnalysis::of(&entry);
        assert_eq!(analysis.stage_count, 0);
        assert_eq!(analysis.mean, None);
    }

    #[test]
    fn test_render_text_lists_top_five() {
        let text = render_text(&snapshot());

        assert!(text.starts_with("DUET-Screen Report\n==================\nGenerated at: 2026-01-01"));
        assert!(text.contains("Input: CRBN\n  1. L1 (ligand) -> 0.500000\n"));
        assert!(text.contains("  5. L5 (ligand) -> 0.100000\n"));
        assert!(!text.contains("L6"));
        assert!(text.ends_with("Input: VHL\n  No partners ranked.\n"));
    }

    #[test]
    fn test_export_filters_and_limits() {
        let options = ExportOptions {
            input_ids: vec!["CRBN".to_string()],
            limit: 3,
        };
        let document = build_export(&snapshot(), None, &options).unwrap();

        assert_eq!(document.inputs.len(), 1);
        assert_eq!(document.inputs[0].partners.len(), 3);

        let json = serde_json::to_value(&document).unwrap();
        let partner = &json["inputs"][0]["partners"][0];
        assert_eq!(partner["partner_type"], "ligand");
        assert_eq!(partner["analysis"]["stage_count"], 1);
        assert!(partner.get("value").is_none());
    }

    #[test]
    fn test_export_without_match_fails() {
        let options = ExportOptions {
            input_ids: vec!["DDB1".to_string()],
            ..ExportOptions::default()
        };
        assert!(matches!(
            build_export(&snapshot(), None, &options),
            Err(Error::InvalidInput(_))
        ));
    }
}
