//! Configuration loading and validation
//!
//! A [`Config`] is assembled once at process start and handed by reference
//! to every component. Resolution order, highest first:
//! 1. `DUET_<SECTION>__<KEY>` environment overrides
//! 2. TOML or JSON config file
//! 3. Compiled defaults for optional keys
//!
//! The loader never reads the process environment itself; callers pass the
//! variables in, which keeps every other component free of ambient state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::Stage;
use crate::{Error, Result};

/// Prefix for environment variables that override config keys
pub const ENV_PREFIX: &str = "DUET_";

/// Subdirectory names created under the workdir by `prep`
pub const WORK_SUBDIRS: [&str; 5] = ["dti", "docking", "mmgbsa", "aggregate", "logs"];

// ============================================================================
// Settings
// ============================================================================

/// Weights for consensus aggregation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageWeights {
    pub dti: f64,
    pub docking: f64,
    pub mmgbsa: f64,
}

impl Default for StageWeights {
    fn default() -> Self {
        Self {
            dti: 0.4,
            docking: 0.35,
            mmgbsa: 0.25,
        }
    }
}

impl StageWeights {
    /// Scale the weights so they sum to 1
    pub fn normalized(&self) -> Result<Self> {
        for stage in Stage::ALL {
            let weight = self.weight(stage);
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::Config(format!(
                    "Stage weight for {stage} must be a non-negative number, got {weight}"
                )));
            }
        }
        let total = self.dti + self.docking + self.mmgbsa;
        if total <= 0.0 {
            return Err(Error::Config(
                "Stage weights must sum to a positive value".to_string(),
            ));
        }
        Ok(Self {
            dti: self.dti / total,
            docking: self.docking / total,
            mmgbsa: self.mmgbsa / total,
        })
    }

    pub fn weight(&self, stage: Stage) -> f64 {
        match stage {
            Stage::Dti => self.dti,
            Stage::Docking => self.docking,
            Stage::Mmgbsa => self.mmgbsa,
        }
    }
}

/// Scheduler backend used to run stage chunks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One chunk at a time on the calling task
    #[default]
    Sequential,
    /// One concurrent worker per device slot
    Pooled,
}

/// Compute pipeline behaviour
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSettings {
    pub chunk_size: usize,
    pub devices: Vec<u32>,
    pub max_retries: u32,
    pub dispatch: DispatchMode,
    pub dti_top_k: usize,
    pub docking_top_k: usize,
    pub mmgbsa_top_k: usize,
    pub consensus_constant: f64,
    /// Normalized to sum to 1 at load time
    pub stage_weights: StageWeights,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 32,
            devices: vec![0],
            max_retries: 1,
            dispatch: DispatchMode::Sequential,
            dti_top_k: 5,
            docking_top_k: 5,
            mmgbsa_top_k: 5,
            consensus_constant: 60.0,
            stage_weights: StageWeights::default(),
        }
    }
}

impl PipelineSettings {
    pub fn top_k(&self, stage: Stage) -> usize {
        match stage {
            Stage::Dti => self.dti_top_k,
            Stage::Docking => self.docking_top_k,
            Stage::Mmgbsa => self.mmgbsa_top_k,
        }
    }

    /// Replace the device pool (command-line `--devices`)
    pub fn with_devices(mut self, devices: Vec<u32>) -> Result<Self> {
        if devices.is_empty() {
            return Err(Error::Config("At least one device id is required".to_string()));
        }
        self.devices = devices;
        Ok(self)
    }

    /// Reject settings that no stage could run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size < 1 {
            return Err(Error::Config("pipeline.chunk_size must be at least 1".to_string()));
        }
        if self.devices.is_empty() {
            return Err(Error::Config("pipeline.devices must not be empty".to_string()));
        }
        for stage in Stage::ALL {
            if self.top_k(stage) < 1 {
                return Err(Error::Config(format!(
                    "pipeline.{stage}_top_k must be at least 1"
                )));
            }
        }
        if !self.consensus_constant.is_finite() || self.consensus_constant <= 0.0 {
            return Err(Error::Config(format!(
                "pipeline.consensus_constant must be positive, got {}",
                self.consensus_constant
            )));
        }
        Ok(())
    }
}

/// Input file definitions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSettings {
    pub sequences: PathBuf,
}

/// Reference protein entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryProtein {
    pub id: String,
    pub sequence: String,
}

/// Reference ligand entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryLigand {
    pub id: String,
    pub smiles: String,
}

/// Synthetic library of partner molecules
///
/// Inline entries come first; entries from the optional CSV sources are
/// appended when the library is loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LibrarySettings {
    pub proteins: Vec<LibraryProtein>,
    pub ligands: Vec<LibraryLigand>,
    pub proteins_source: Option<PathBuf>,
    pub ligands_source: Option<PathBuf>,
}

/// Filesystem layout for intermediate results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathSettings {
    pub workdir: PathBuf,
    pub manifest: PathBuf,
    pub reports: PathBuf,
}

impl PathSettings {
    /// `<workdir>/<stage>/results.jsonl`
    pub fn stage_results(&self, stage: Stage) -> PathBuf {
        self.workdir.join(stage.tag()).join("results.jsonl")
    }

    /// `<workdir>/aggregate/final_rankings.json`
    pub fn aggregate(&self) -> PathBuf {
        self.workdir.join("aggregate").join("final_rankings.json")
    }

    pub fn report_json(&self) -> PathBuf {
        self.reports.join("report.json")
    }

    pub fn report_txt(&self) -> PathBuf {
        self.reports.join("report.txt")
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Root configuration model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub pipeline: PipelineSettings,
    pub inputs: InputSettings,
    pub library: LibrarySettings,
    pub paths: PathSettings,
    pub logging: LoggingConfig,
}

impl Config {
    /// Swap in a new pipeline section, keeping everything else
    pub fn with_pipeline(self, pipeline: PipelineSettings) -> Self {
        Self { pipeline, ..self }
    }

    /// Short fingerprint of the settings that influence results
    pub fn digest(&self) -> String {
        let canonical = serde_json::json!({
            "pipeline": &self.pipeline,
            "inputs": { "sequences": self.inputs.sequences.to_string_lossy() },
            "paths": &self.paths,
        });
        let hash = Sha256::digest(canonical.to_string().as_bytes());
        hash.iter().take(12).map(|b| format!("{:02x}", b)).collect()
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load configuration from a TOML or JSON file, applying `DUET_*` overrides from `env`
pub fn load_config<I, K, V>(path: &Path, env: I) -> Result<Config>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::missing("Config file", path));
        }
        Err(err) => return Err(err.into()),
    };

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let mut raw = parse_config_text(&text, is_json)?;
    let applied = apply_env_overrides(&mut raw, env)?;
    if applied > 0 {
        info!(overrides = applied, "Applied environment overrides to configuration");
    }

    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    let config = build_config(raw, base_dir)?;
    debug!(config = ?config, "Configuration loaded");
    Ok(config)
}

/// Parse config text into a JSON value tree
pub fn parse_config_text(text: &str, is_json: bool) -> Result<Value> {
    let stripped = text.trim();
    if stripped.is_empty() {
        return Err(Error::Config("Config file is empty".to_string()));
    }
    if is_json || stripped.starts_with('{') {
        return serde_json::from_str(stripped)
            .map_err(|e| Error::Config(format!("Parse JSON config failed: {}", e)));
    }
    let table: toml::Value = toml::from_str(stripped)
        .map_err(|e| Error::Config(format!("Parse TOML config failed: {}", e)))?;
    serde_json::to_value(table).map_err(|e| Error::Config(format!("Convert TOML config failed: {}", e)))
}

/// Write `DUET_SECTION__KEY=value` variables into the raw tree; returns how many applied
pub fn apply_env_overrides<I, K, V>(raw: &mut Value, env: I) -> Result<usize>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut applied = 0;
    for (key, value) in env {
        let Some(rest) = key.as_ref().strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<String> = rest.to_lowercase().split("__").map(str::to_string).collect();
        if path.iter().any(|segment| segment.is_empty()) {
            return Err(Error::Config(format!(
                "Malformed override variable name: {}",
                key.as_ref()
            )));
        }
        write_nested(raw, &path, parse_env_value(value.as_ref()));
        debug!(variable = key.as_ref(), "Config override applied");
        applied += 1;
    }
    Ok(applied)
}

/// Keep the Unicode variables of a process environment (`std::env::vars_os`)
///
/// Other variables are skipped, except `DUET_*` ones: an override that
/// cannot be read is a configuration error.
pub fn utf8_env_vars<I>(vars: I) -> Result<Vec<(String, String)>>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut env = Vec::new();
    for (key, value) in vars {
        match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => env.push((key, value)),
            (Ok(key), Err(_)) if key.starts_with(ENV_PREFIX) => {
                return Err(Error::Config(format!(
                    "Override variable {key} is not valid UTF-8"
                )));
            }
            (Err(key), _) if key.to_string_lossy().starts_with(ENV_PREFIX) => {
                return Err(Error::Config(format!(
                    "Override variable name {} is not valid UTF-8",
                    key.to_string_lossy()
                )));
            }
            _ => {}
        }
    }
    Ok(env)
}

fn write_nested(node: &mut Value, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        write_nested(child, rest, value);
    }
}

/// Interpret an override value: bool, integer, float, `[a, b]` list, else string
pub fn parse_env_value(value: &str) -> Value {
    let value = value.trim();
    if value.is_empty() {
        return Value::String(String::new());
    }
    match value.to_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(int) = value.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = value.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        let inner = inner.trim();
        if inner.is_empty() {
            return Value::Array(Vec::new());
        }
        return Value::Array(inner.split(',').map(parse_env_value).collect());
    }
    Value::String(value.to_string())
}

// ============================================================================
// Raw file model
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawConfig {
    pipeline: Option<RawPipeline>,
    inputs: Option<RawInputs>,
    library: Option<RawLibrary>,
    paths: Option<RawPaths>,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDevices {
    List(Vec<u32>),
    Single(u32),
    Text(String),
}

impl RawDevices {
    fn into_list(self) -> Result<Vec<u32>> {
        match self {
            RawDevices::List(list) => Ok(list),
            RawDevices::Single(device) => Ok(vec![device]),
            RawDevices::Text(text) => parse_device_list(&text),
        }
    }
}

/// Parse a comma-separated device list such as `"0,1"`
pub fn parse_device_list(text: &str) -> Result<Vec<u32>> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>()
                .map_err(|_| Error::Config(format!("Invalid device id: {part}")))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RawPipeline {
    chunk_size: Option<usize>,
    devices: Option<RawDevices>,
    max_retries: Option<u32>,
    dispatch: Option<DispatchMode>,
    dti_top_k: Option<usize>,
    docking_top_k: Option<usize>,
    mmgbsa_top_k: Option<usize>,
    consensus_constant: Option<f64>,
    #[serde(default)]
    stage_weights: StageWeights,
}

#[derive(Debug, Deserialize)]
struct RawInputs {
    sequences: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawLibrary {
    #[serde(default)]
    proteins: Vec<LibraryProtein>,
    #[serde(default)]
    ligands: Vec<LibraryLigand>,
    proteins_file: Option<PathBuf>,
    ligands_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawPaths {
    workdir: PathBuf,
    manifest: Option<PathBuf>,
    reports: Option<PathBuf>,
}

fn missing_section(name: &str) -> Error {
    Error::Config(format!("Missing required config section: {name}"))
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn build_config(raw: Value, base_dir: &Path) -> Result<Config> {
    let raw: RawConfig = serde_json::from_value(raw)
        .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;

    let pipeline_raw = raw.pipeline.ok_or_else(|| missing_section("pipeline"))?;
    let inputs_raw = raw.inputs.ok_or_else(|| missing_section("inputs"))?;
    let library_raw = raw.library.ok_or_else(|| missing_section("library"))?;
    let paths_raw = raw.paths.ok_or_else(|| missing_section("paths"))?;

    let defaults = PipelineSettings::default();
    let devices = match pipeline_raw.devices {
        Some(devices) => devices.into_list()?,
        None => defaults.devices.clone(),
    };
    let pipeline = PipelineSettings {
        chunk_size: pipeline_raw.chunk_size.unwrap_or(defaults.chunk_size),
        devices,
        max_retries: pipeline_raw.max_retries.unwrap_or(defaults.max_retries),
        dispatch: pipeline_raw.dispatch.unwrap_or(defaults.dispatch),
        dti_top_k: pipeline_raw.dti_top_k.unwrap_or(defaults.dti_top_k),
        docking_top_k: pipeline_raw.docking_top_k.unwrap_or(defaults.docking_top_k),
        mmgbsa_top_k: pipeline_raw.mmgbsa_top_k.unwrap_or(defaults.mmgbsa_top_k),
        consensus_constant: pipeline_raw
            .consensus_constant
            .unwrap_or(defaults.consensus_constant),
        stage_weights: pipeline_raw.stage_weights.normalized()?,
    };
    pipeline.validate()?;

    let library = LibrarySettings {
        proteins: library_raw.proteins,
        ligands: library_raw.ligands,
        proteins_source: library_raw.proteins_file.map(|p| resolve(base_dir, &p)),
        ligands_source: library_raw.ligands_file.map(|p| resolve(base_dir, &p)),
    };

    let workdir = resolve(base_dir, &paths_raw.workdir);
    let manifest = paths_raw
        .manifest
        .map(|p| resolve(base_dir, &p))
        .unwrap_or_else(|| workdir.join("MANIFEST.json"));
    let reports = paths_raw
        .reports
        .map(|p| resolve(base_dir, &p))
        .unwrap_or_else(|| workdir.join("reports"));

    Ok(Config {
        pipeline,
        inputs: InputSettings {
            sequences: resolve(base_dir, &inputs_raw.sequences),
        },
        library,
        paths: PathSettings {
            workdir,
            manifest,
            reports,
        },
        logging: raw.logging,
    })
}
