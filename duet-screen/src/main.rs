//! duet-screen - command-line entry point
//!
//! Every pipeline command loads the same configuration, runs one step (or
//! all of them for `run`), and records itself in the workspace manifest.
//! `init-config` writes a starter configuration and needs none.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use duet_common::config::{
    load_config, parse_device_list, utf8_env_vars, Config, PipelineSettings, StageWeights,
};
use duet_common::Stage;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use duet_screen::config_template::{
    sample_proteins, write_config_template, ConfigTemplate, InputsTemplate, LibraryTemplate,
    PathsTemplate,
};
use duet_screen::data::Library;
use duet_screen::pipeline::{self, StageContext};
use duet_screen::report::{ExportOptions, DEFAULT_EXPORT_LIMIT};
use duet_screen::{consensus, manifest, report, workspace};

/// Deterministic multi-stage screening pipeline
#[derive(Parser, Debug)]
#[command(name = "duet-screen")]
#[command(about = "Deterministic DTI, docking and MM/GBSA screening with consensus ranking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// Device ids overriding pipeline.devices, e.g. "0,1"
    #[arg(long, value_name = "IDS")]
    devices: Option<String>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Input id to export (repeatable); defaults to every input
    #[arg(long = "input-id", value_name = "ID")]
    input_ids: Vec<String>,

    /// Maximum partners per input
    #[arg(long, default_value_t = DEFAULT_EXPORT_LIMIT)]
    limit: usize,

    /// Destination file (default: <reports>/export.json)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InitConfigArgs {
    /// Config file to write (.json for JSON, otherwise TOML)
    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,

    /// Ligand library CSV
    #[arg(long, value_name = "PATH")]
    ligands_file: PathBuf,

    /// Protein library CSV (default: two sample proteins inline)
    #[arg(long, value_name = "PATH")]
    proteins_file: Option<PathBuf>,

    /// Input sequences CSV
    #[arg(long, value_name = "PATH", default_value = "inputs.csv")]
    input_csv: PathBuf,

    /// Workspace directory for outputs
    #[arg(long, value_name = "PATH", default_value = "workspace")]
    workdir: PathBuf,

    /// Manifest file (default: <workdir>/MANIFEST.json)
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,

    /// Reports directory (default: <workdir>/reports)
    #[arg(long, value_name = "PATH")]
    reports: Option<PathBuf>,

    #[arg(long, default_value_t = 32)]
    chunk_size: usize,

    /// Device ids, e.g. "0,1"
    #[arg(long, value_name = "IDS", default_value = "0")]
    devices: String,

    #[arg(long, default_value_t = 1)]
    max_retries: u32,

    #[arg(long, default_value_t = 5)]
    dti_top_k: usize,

    #[arg(long, default_value_t = 5)]
    docking_top_k: usize,

    #[arg(long, default_value_t = 5)]
    mmgbsa_top_k: usize,

    #[arg(long, default_value_t = 0.4)]
    dti_weight: f64,

    #[arg(long, default_value_t = 0.35)]
    docking_weight: f64,

    #[arg(long, default_value_t = 0.25)]
    mmgbsa_weight: f64,

    /// WRRF constant
    #[arg(long, default_value_t = 60.0)]
    consensus_constant: f64,

    /// Replace an existing file
    #[arg(long)]
    force: bool,
}

impl InitConfigArgs {
    fn template(&self) -> Result<ConfigTemplate> {
        let pipeline = PipelineSettings {
            chunk_size: self.chunk_size,
            max_retries: self.max_retries,
            dti_top_k: self.dti_top_k,
            docking_top_k: self.docking_top_k,
            mmgbsa_top_k: self.mmgbsa_top_k,
            consensus_constant: self.consensus_constant,
            stage_weights: StageWeights {
                dti: self.dti_weight,
                docking: self.docking_weight,
                mmgbsa: self.mmgbsa_weight,
            },
            ..PipelineSettings::default()
        }
        .with_devices(parse_device_list(&self.devices)?)?;

        let proteins = match self.proteins_file {
            Some(_) => Vec::new(),
            None => sample_proteins(),
        };
        Ok(ConfigTemplate {
            pipeline,
            inputs: InputsTemplate {
                sequences: self.input_csv.clone(),
            },
            library: LibraryTemplate {
                proteins_file: self.proteins_file.clone(),
                ligands_file: Some(self.ligands_file.clone()),
                proteins,
                ligands: Vec::new(),
            },
            paths: PathsTemplate {
                workdir: self.workdir.clone(),
                manifest: self.manifest.clone(),
                reports: self.reports.clone(),
            },
        })
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a starter configuration file
    InitConfig(InitConfigArgs),
    /// Check that inputs exist and output directories can be created
    Validate(CommonArgs),
    /// Create the workspace directory layout
    Prep(CommonArgs),
    /// Drug-target interaction screen over the full library
    Dti(CommonArgs),
    /// Docking over DTI survivors
    Dock(CommonArgs),
    /// MM/GBSA rescoring over docking survivors
    Mmgbsa(CommonArgs),
    /// Fuse stage results into the consensus ranking
    Aggregate(CommonArgs),
    /// Write report.json and report.txt
    Report(CommonArgs),
    /// validate, prep, dti, dock, mmgbsa, aggregate, report
    Run(CommonArgs),
    /// Export filtered consensus rows with per-partner statistics
    Export(ExportArgs),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::InitConfig(_) => "init-config",
            Command::Validate(_) => "validate",
            Command::Prep(_) => "prep",
            Command::Dti(_) => "dti",
            Command::Dock(_) => "dock",
            Command::Mmgbsa(_) => "mmgbsa",
            Command::Aggregate(_) => "aggregate",
            Command::Report(_) => "report",
            Command::Run(_) => "run",
            Command::Export(_) => "export",
        }
    }

    /// Shared arguments; `None` for commands that run without a config
    fn common(&self) -> Option<&CommonArgs> {
        let args = match self {
            Command::InitConfig(_) => return None,
            Command::Validate(args)
            | Command::Prep(args)
            | Command::Dti(args)
            | Command::Dock(args)
            | Command::Mmgbsa(args)
            | Command::Aggregate(args)
            | Command::Report(args)
            | Command::Run(args) => args,
            Command::Export(args) => &args.common,
        };
        Some(args)
    }
}

/// Load config, then apply `--devices`
fn resolve_config(args: &CommonArgs) -> Result<Config> {
    let env = utf8_env_vars(std::env::vars_os())?;
    let config = load_config(&args.config, env)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    match &args.devices {
        Some(devices) => {
            let devices = parse_device_list(devices)?;
            let pipeline = config.pipeline.clone().with_devices(devices)?;
            Ok(config.with_pipeline(pipeline))
        }
        None => Ok(config),
    }
}

/// RUST_LOG wins; otherwise `default_level`
fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Cancel outstanding dispatch on Ctrl+C
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            child.cancel();
        }
    });
    token
}

async fn run_stage_command(
    config: &Config,
    stage: Stage,
    cancel: &CancellationToken,
) -> Result<()> {
    let context = StageContext::load(config)?;
    let output = pipeline::run_stage(config, &context, stage, cancel).await?;
    println!("{} results written to {}", stage.tag().to_uppercase(), output.display());
    Ok(())
}

fn init_config(args: &InitConfigArgs) -> Result<()> {
    let output = write_config_template(&args.output, &args.template()?, args.force)?;
    println!("Wrote config to {}", output.display());
    Ok(())
}

async fn execute(command: &Command, config: &Config, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::InitConfig(args) => init_config(args)?,
        Command::Validate(_) => {
            workspace::run_validate(config)?;
            println!("Configuration and inputs look good.");
        }
        Command::Prep(_) => {
            workspace::run_prep(config)?;
            println!("Workspace prepared at {}", config.paths.workdir.display());
        }
        Command::Dti(_) => run_stage_command(config, Stage::Dti, cancel).await?,
        Command::Dock(_) => run_stage_command(config, Stage::Docking, cancel).await?,
        Command::Mmgbsa(_) => run_stage_command(config, Stage::Mmgbsa, cancel).await?,
        Command::Aggregate(_) => {
            let output = consensus::run_aggregate(config)?;
            println!("Aggregate written to {}", output.display());
        }
        Command::Report(_) => {
            let output = report::run_report(config)?;
            println!("Report written to {}", output.display());
        }
        Command::Run(_) => {
            let output = pipeline::run_all(config, cancel).await?;
            println!("Pipeline complete; report at {}", output.display());
        }
        Command::Export(args) => {
            let library = Library::load(&config.library)?;
            let options = ExportOptions {
                input_ids: args.input_ids.clone(),
                limit: args.limit,
            };
            let output =
                report::run_export(config, Some(&library), &options, args.output.as_deref())?;
            println!("Export written to {}", output.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Command::InitConfig(args) = &cli.command {
        init_tracing("info");
        return init_config(args).context("init-config failed");
    }
    let common = cli
        .command
        .common()
        .context("Command requires --config")?;
    let config = resolve_config(common)?;
    init_tracing(&config.logging.level);

    info!(
        command = cli.command.name(),
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        config_digest = %config.digest(),
        "Starting duet-screen"
    );

    let cancel = cancel_on_interrupt();
    execute(&cli.command, &config, &cancel)
        .await
        .with_context(|| format!("{} failed", cli.command.name()))?;

    manifest::log_invocation(
        &config.paths.manifest,
        cli.command.name(),
        Some(common.config.as_path()),
        common.devices.as_deref(),
    )?;
    Ok(())
}
