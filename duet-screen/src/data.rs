//! Input and library loading
//!
//! Inputs come from a CSV file with an `id,type,value` header. The partner
//! library combines inline config entries with optional CSV sources; the
//! inline entries keep their position ahead of the file entries.

use csv::{ReaderBuilder, StringRecord};
use duet_common::config::{LibraryLigand, LibraryProtein, LibrarySettings};
use duet_common::models::{EntityKind, InputRecord, PartnerRecord};
use duet_common::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

const ID_COLUMNS: [&str; 3] = ["id", "ID", "zinc_id"];
const SEQUENCE_COLUMNS: [&str; 2] = ["sequence", "Sequence"];
const SMILES_COLUMNS: [&str; 4] = ["smiles", "SMILES", "Smiles", "value"];

// ============================================================================
// CSV helpers
// ============================================================================

struct CsvTable {
    headers: StringRecord,
    rows: Vec<(usize, StringRecord)>,
}

impl CsvTable {
    fn read(path: &Path, what: &str) -> Result<Self> {
        if !path.exists() {
            return Err(Error::missing(what, path));
        }
        let mut reader = ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(|e| Error::malformed(path, 0, e.to_string()))?;

        let headers = reader
            .headers()
            .map_err(|e| Error::malformed(path, 1, e.to_string()))?
            .clone();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| {
                let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
                Error::malformed(path, line, e.to_string())
            })?;
            let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
            rows.push((line, record));
        }
        Ok(Self { headers, rows })
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// First column among `names` that exists and holds a non-empty value for `row`
    fn first_of<'r>(&self, row: &'r StringRecord, names: &[&str]) -> Option<&'r str> {
        names
            .iter()
            .filter_map(|name| self.column(name))
            .filter_map(|index| row.get(index))
            .find(|value| !value.is_empty())
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// Load user inputs in file order
///
/// Rows missing `id`, `type`, or `value`, rows with an unknown type, and
/// duplicate ids are rejected. A file with no rows is an error.
pub fn load_inputs(path: &Path) -> Result<Vec<InputRecord>> {
    let table = CsvTable::read(path, "Input sequences file")?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(table.rows.len());
    for (line, row) in &table.rows {
        let field = |name: &str| table.first_of(row, &[name]);
        let (Some(id), Some(kind), Some(value)) = (field("id"), field("type"), field("value")) else {
            return Err(Error::malformed(
                path,
                *line,
                "Input row missing required fields (id, type, value)",
            ));
        };
        let kind: EntityKind = kind
            .parse()
            .map_err(|e: Error| Error::malformed(path, *line, e.to_string()))?;
        if !seen.insert(id.to_string()) {
            return Err(Error::malformed(path, *line, format!("Duplicate input id {id}")));
        }
        records.push(InputRecord {
            id: id.to_string(),
            kind,
            value: value.to_string(),
        });
    }

    if records.is_empty() {
        return Err(Error::InvalidInput(format!(
            "No input records found in {}",
            path.display()
        )));
    }
    info!(path = %path.display(), count = records.len(), "Loaded input records");
    Ok(records)
}

// ============================================================================
// Library
// ============================================================================

/// Read library proteins from CSV (`id|ID|zinc_id`, `sequence|Sequence`)
pub fn load_library_proteins(path: &Path) -> Result<Vec<LibraryProtein>> {
    let table = CsvTable::read(path, "Library proteins file")?;
    table
        .rows
        .iter()
        .map(|(line, row)| {
            match (table.first_of(row, &ID_COLUMNS), table.first_of(row, &SEQUENCE_COLUMNS)) {
                (Some(id), Some(sequence)) => Ok(LibraryProtein {
                    id: id.to_string(),
                    sequence: sequence.to_string(),
                }),
                _ => Err(Error::malformed(path, *line, "Protein row missing id or sequence")),
            }
        })
        .collect()
}

/// Read library ligands from CSV (`id|ID|zinc_id`, `smiles|SMILES|Smiles|value`)
pub fn load_library_ligands(path: &Path) -> Result<Vec<LibraryLigand>> {
    let table = CsvTable::read(path, "Library ligands file")?;
    table
        .rows
        .iter()
        .map(|(line, row)| {
            match (table.first_of(row, &ID_COLUMNS), table.first_of(row, &SMILES_COLUMNS)) {
                (Some(id), Some(smiles)) => Ok(LibraryLigand {
                    id: id.to_string(),
                    smiles: smiles.to_string(),
                }),
                _ => Err(Error::malformed(path, *line, "Ligand row missing id or SMILES")),
            }
        })
        .collect()
}

/// Partner library, read-only for the whole run
#[derive(Debug, Clone)]
pub struct Library {
    proteins: Vec<PartnerRecord>,
    ligands: Vec<PartnerRecord>,
    index: HashMap<(EntityKind, String), usize>,
}

impl Library {
    /// Build from settings, appending entries from any configured CSV sources
    pub fn load(settings: &LibrarySettings) -> Result<Self> {
        let mut proteins = settings.proteins.clone();
        if let Some(source) = &settings.proteins_source {
            proteins.extend(load_library_proteins(source)?);
        }
        let mut ligands = settings.ligands.clone();
        if let Some(source) = &settings.ligands_source {
            ligands.extend(load_library_ligands(source)?);
        }

        let proteins = proteins
            .into_iter()
            .map(|p| PartnerRecord {
                id: p.id,
                kind: EntityKind::Protein,
                value: p.sequence,
            })
            .collect();
        let ligands = ligands
            .into_iter()
            .map(|l| PartnerRecord {
                id: l.id,
                kind: EntityKind::Ligand,
                value: l.smiles,
            })
            .collect();
        Self::from_partners(proteins, ligands)
    }

    /// Build from partner lists; both kinds must be present and ids unique per kind
    pub fn from_partners(proteins: Vec<PartnerRecord>, ligands: Vec<PartnerRecord>) -> Result<Self> {
        if proteins.is_empty() {
            return Err(Error::Config(
                "library.proteins must contain at least one entry".to_string(),
            ));
        }
        if ligands.is_empty() {
            return Err(Error::Config(
                "library.ligands must contain at least one entry".to_string(),
            ));
        }

        let mut index = HashMap::new();
        for partners in [&proteins, &ligands] {
            for (position, partner) in partners.iter().enumerate() {
                if index
                    .insert((partner.kind, partner.id.clone()), position)
                    .is_some()
                {
                    return Err(Error::Config(format!(
                        "Duplicate library {} id {}",
                        partner.kind, partner.id
                    )));
                }
            }
        }
        debug!(proteins = proteins.len(), ligands = ligands.len(), "Library ready");
        Ok(Self {
            proteins,
            ligands,
            index,
        })
    }

    /// Every entry of `kind`, in library order
    pub fn partners(&self, kind: EntityKind) -> &[PartnerRecord] {
        match kind {
            EntityKind::Protein => &self.proteins,
            EntityKind::Ligand => &self.ligands,
        }
    }

    /// Entries that can pair with an input of `input_kind`
    pub fn opposite_partners(&self, input_kind: EntityKind) -> &[PartnerRecord] {
        self.partners(input_kind.opposite())
    }

    pub fn lookup(&self, kind: EntityKind, id: &str) -> Option<&PartnerRecord> {
        self.index
            .get(&(kind, id.to_string()))
            .and_then(|&position| self.partners(kind).get(position))
    }
}
