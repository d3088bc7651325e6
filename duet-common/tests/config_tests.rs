//! Integration tests for configuration loading
//!
//! Covers file formats, defaults, path resolution, environment overrides,
//! and the configuration errors that must stop a run before any stage.

use duet_common::config::{load_config, DispatchMode};
use duet_common::{Error, Stage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const NO_ENV: [(&str, &str); 0] = [];

const BASIC_TOML: &str = r#"
[pipeline]
chunk_size = 2
devices = [0, 1]
dti_top_k = 3
docking_top_k = 2
mmgbsa_top_k = 2
consensus_constant = 10

[pipeline.stage_weights]
dti = 0.5
docking = 0.3
mmgbsa = 0.2

[inputs]
sequences = "inputs.csv"

[library]
proteins = [{ id = "IKZF1", sequence = "MPLGKKAKLPEKKAPVTPQLPQLQ" }]
ligands = [{ id = "LEN", smiles = "O=C1NC(=O)CCC1" }]

[paths]
workdir = "workspace"
"#;

fn write_config(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_toml_config_loads_with_resolved_paths() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.toml", BASIC_TOML);

    let config = load_config(&path, NO_ENV).unwrap();

    assert_eq!(config.pipeline.chunk_size, 2);
    assert_eq!(config.pipeline.devices, vec![0, 1]);
    assert_eq!(config.pipeline.top_k(Stage::Dti), 3);
    assert_eq!(config.pipeline.consensus_constant, 10.0);
    assert_eq!(config.pipeline.dispatch, DispatchMode::Sequential);
    assert_eq!(config.inputs.sequences, dir.path().join("inputs.csv"));
    assert_eq!(config.paths.workdir, dir.path().join("workspace"));
    assert_eq!(
        config.paths.manifest,
        dir.path().join("workspace").join("MANIFEST.json")
    );
    assert_eq!(config.paths.reports, dir.path().join("workspace").join("reports"));
    assert_eq!(config.library.proteins.len(), 1);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_stage_weights_are_normalized_once_at_load() {
    let dir = TempDir::new().unwrap();
    let contents = BASIC_TOML.replace("dti = 0.5", "dti = 1.0");
    let path = write_config(&dir, "config.toml", &contents);

    let config = load_config(&path, NO_ENV).unwrap();
    let weights = config.pipeline.stage_weights;

    assert!((weights.dti - 1.0 / 1.5).abs() < 1e-12);
    assert!((weights.docking - 0.3 / 1.5).abs() < 1e-12);
    assert!((weights.mmgbsa - 0.2 / 1.5).abs() < 1e-12);
}

#[test]
fn test_json_config_is_accepted() {
    let dir = TempDir::new().unwrap();
    let json = serde_json::json!({
        "pipeline": { "devices": "0,2", "dispatch": "pooled", "num_workers": 1, "simulator": true },
        "inputs": { "sequences": "/data/inputs.csv" },
        "library": {
            "proteins": [{ "id": "P", "sequence": "MK" }],
            "ligands": [{ "id": "L", "smiles": "CCO" }]
        },
        "paths": { "workdir": "/w", "reports": "/r" }
    });
    let path = write_config(&dir, "config.json", &json.to_string());

    let config = load_config(&path, NO_ENV).unwrap();

    assert_eq!(config.pipeline.devices, vec![0, 2]);
    assert_eq!(config.pipeline.dispatch, DispatchMode::Pooled);
    assert_eq!(config.pipeline.chunk_size, 32);
    assert_eq!(config.inputs.sequences, Path::new("/data/inputs.csv"));
    assert_eq!(config.paths.reports, Path::new("/r"));
}

#[test]
fn test_env_overrides_take_priority_over_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.toml", BASIC_TOML);
    let env = vec![
        ("DUET_PIPELINE__DTI_TOP_K".to_string(), "7".to_string()),
        ("DUET_PIPELINE__DEVICES".to_string(), "[2, 3]".to_string()),
        ("DUET_PATHS__WORKDIR".to_string(), "/tmp/duet-override".to_string()),
        ("DUET_LOGGING__LEVEL".to_string(), "debug".to_string()),
    ];

    let config = load_config(&path, env).unwrap();

    assert_eq!(config.pipeline.dti_top_k, 7);
    assert_eq!(config.pipeline.devices, vec![2, 3]);
    assert_eq!(config.paths.workdir, Path::new("/tmp/duet-override"));
    assert_eq!(
        config.paths.manifest,
        Path::new("/tmp/duet-override/MANIFEST.json")
    );
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_missing_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let err = load_config(&dir.path().join("absent.toml"), NO_ENV).unwrap_err();
    assert!(matches!(err, Error::MissingPrerequisite { .. }));
}

#[test]
fn test_empty_config_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.toml", "   \n");
    let err = load_config(&path, NO_ENV).unwrap_err();
    assert!(err.to_string().contains("empty"));
}

#[test]
fn test_missing_section_named_in_error() {
    let dir = TempDir::new().unwrap();
    let contents = BASIC_TOML.replace("[paths]\nworkdir = \"workspace\"\n", "");
    let path = write_config(&dir, "config.toml", &contents);

    let err = load_config(&path, NO_ENV).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Configuration error: Missing required config section: paths"
    );
}

#[test]
fn test_configuration_errors_are_fatal() {
    let dir = TempDir::new().unwrap();
    let cases = [
        ("dti_top_k = 3", "dti_top_k = 0"),
        ("chunk_size = 2", "chunk_size = 0"),
        ("devices = [0, 1]", "devices = []"),
        ("consensus_constant = 10", "consensus_constant = -1"),
        ("dti = 0.5\ndocking = 0.3\nmmgbsa = 0.2", "dti = 0\ndocking = 0\nmmgbsa = 0"),
    ];

    for (from, to) in cases {
        let path = write_config(&dir, "config.toml", &BASIC_TOML.replace(from, to));
        let err = load_config(&path, NO_ENV).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{to}: {err}");
    }
}

#[test]
fn test_digest_changes_with_pipeline_settings() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.toml", BASIC_TOML);
    let base = load_config(&path, NO_ENV).unwrap();
    let again = load_config(&path, NO_ENV).unwrap();
    let changed = load_config(&path, [("DUET_PIPELINE__MMGBSA_TOP_K", "4")]).unwrap();

    assert_eq!(base.digest(), again.digest());
    assert_eq!(base.digest().len(), 24);
    assert_ne!(base.digest(), changed.digest());
}
