//! Run manifest
//!
//! `MANIFEST.json` records where and with what build a workspace was
//! produced, plus one entry per successful CLI command.

use duet_common::records::{read_json, write_json};
use duet_common::{time, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Build identification captured by build.rs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub version: String,
    pub git_commit: String,
    pub build_timestamp: String,
    pub build_profile: String,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_commit: env!("GIT_HASH").to_string(),
            build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
            build_profile: env!("BUILD_PROFILE").to_string(),
        }
    }
}

/// Host the workspace was created on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
    pub family: String,
}

impl PlatformInfo {
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            family: std::env::consts::FAMILY.to_string(),
        }
    }
}

/// One logged CLI command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub timestamp: String,
    pub command: String,
    pub config: Option<String>,
    pub devices: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub created_at: String,
    pub build: BuildInfo,
    pub platform: PlatformInfo,
    #[serde(default)]
    pub invocations: Vec<Invocation>,
}

impl Manifest {
    /// Fresh manifest describing the current binary and host
    pub fn new() -> Self {
        Self {
            created_at: time::now_utc_iso(),
            build: BuildInfo::current(),
            platform: PlatformInfo::current(),
            invocations: Vec::new(),
        }
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Existing manifest at `path`, or a fresh one if none was written yet
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    if path.exists() {
        read_json(path, "Manifest")
    } else {
        Ok(Manifest::new())
    }
}

/// Append a command to the manifest, creating it on first use
pub fn log_invocation(
    path: &Path,
    command: &str,
    config: Option<&Path>,
    devices: Option<&str>,
) -> Result<()> {
    let mut manifest = load_manifest(path)?;
    manifest.invocations.push(Invocation {
        timestamp: time::now_utc_iso(),
        command: command.to_string(),
        config: config.map(|p| p.display().to_string()),
        devices: devices.map(str::to_string),
    });
    write_json(path, &manifest)?;
    debug!(path = %path.display(), command, invocations = manifest.invocations.len(), "Manifest updated");
    Ok(())
}
