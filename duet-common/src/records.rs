//! Flat-file persistence for stage results and snapshots
//!
//! Every write goes to a temporary file in the destination directory and is
//! renamed into place, so a reader never observes a partially written file.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{Error, Result};

/// Write rows as JSON Lines, replacing `path` atomically
pub fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut buffer = Vec::with_capacity(rows.len() * 128);
    for row in rows {
        serde_json::to_writer(&mut buffer, row)?;
        buffer.push(b'\n');
    }
    write_atomic(path, &buffer)?;
    debug!(path = %path.display(), rows = rows.len(), "Wrote JSONL file");
    Ok(())
}

/// Read every row of a JSON Lines file
///
/// `what` names the file in the error raised when it does not exist.
/// Blank lines are skipped; any other line that fails to parse is fatal.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path, what: &str) -> Result<Vec<T>> {
    Ok(read_jsonl_numbered(path, what)?
        .into_iter()
        .map(|(_, row)| row)
        .collect())
}

/// [`read_jsonl`] keeping each row's 1-based line number in the file
pub fn read_jsonl_numbered<T: DeserializeOwned>(
    path: &Path,
    what: &str,
) -> Result<Vec<(usize, T)>> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::missing(what, path));
        }
        Err(err) => return Err(err.into()),
    };

    let mut rows = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let row = serde_json::from_str(trimmed)
            .map_err(|e| Error::malformed(path, index + 1, e.to_string()))?;
        rows.push((index + 1, row));
    }
    Ok(rows)
}

/// Write a pretty-printed JSON document, replacing `path` atomically
pub fn write_json<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    let mut buffer = serde_json::to_vec_pretty(document)?;
    buffer.push(b'\n');
    write_atomic(path, &buffer)
}

/// Read a JSON document written by [`write_json`]
pub fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::missing(what, path));
        }
        Err(err) => return Err(err.into()),
    };
    serde_json::from_str(&content).map_err(|e| Error::malformed(path, e.line(), e.to_string()))
}

/// Replace `path` with `contents` via a sibling temporary file
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKind, ScoreEntry, Stage};

    fn entry(partner: &str, rank: usize) -> ScoreEntry {
        ScoreEntry {
            input_id: "IN".into(),
            partner_id: partner.into(),
            partner_kind: EntityKind::Ligand,
            stage: Stage::Dti,
            score: 0.123_456_789_012_345_6,
            rank,
        }
    }

    #[test]
    fn test_write_then_read_preserves_rows_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dti").join("results.jsonl");
        let rows = vec![entry("B", 1), entry("A", 2)];

        write_jsonl(&path, &rows).unwrap();
        let loaded: Vec<ScoreEntry> = read_jsonl(&path, "DTI results").unwrap();

        assert_eq!(loaded, rows);
    }

    #[test]
    fn test_missing_file_is_missing_prerequisite() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_jsonl::<ScoreEntry>(&dir.path().join("nope.jsonl"), "DTI results")
            .unwrap_err();
        assert!(matches!(err, Error::MissingPrerequisite { .. }));
        assert!(err.to_string().starts_with("DTI results missing"));
    }

    #[test]
    fn test_row_missing_field_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        std::fs::write(
            &path,
            "\n{\"input_id\":\"A\",\"partner_id\":\"B\",\"partner_type\":\"ligand\",\"stage\":\"dti\",\"rank\":1}\n",
        )
        .unwrap();

        let err = read_jsonl::<ScoreEntry>(&path, "DTI results").unwrap_err();
        match err {
            Error::MalformedRecord { line, reason, .. } => {
                assert_eq!(line, 2);
                assert!(reason.contains("score"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_numbered_rows_count_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let row = |p: &str| serde_json::to_string(&entry(p, 1)).unwrap();
        std::fs::write(&path, format!("{}\n\n  \n{}\n", row("A"), row("B"))).unwrap();

        let rows: Vec<(usize, ScoreEntry)> = read_jsonl_numbered(&path, "DTI results").unwrap();

        let lines: Vec<(usize, &str)> = rows.iter().map(|(n, r)| (*n, r.partner_id.as_str())).collect();
        assert_eq!(lines, vec![(1, "A"), (4, "B")]);
    }

    #[test]
    fn test_write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, "old contents that are longer").unwrap();

        write_json(&path, &serde_json::json!({"k": 1})).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\n  \"k\": 1\n}\n");
        // No stray temporaries left beside the target
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
