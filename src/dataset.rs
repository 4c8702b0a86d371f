//! Dataset-level metadata: `participants.tsv`, `participants.json`,
//! `dataset_description.json` and the per-session `scans.tsv`.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{ConversionConfig, DatasetConfig};
use crate::error::{Error, Result};
use crate::sidecar;
use crate::subject::{is_missing, SubjectId};
use crate::table::ReferenceTable;

pub const BIDS_VERSION: &str = "1.9.0";

pub const PARTICIPANTS_TSV: &str = "participants.tsv";
pub const PARTICIPANTS_JSON: &str = "participants.json";
pub const DATASET_DESCRIPTION: &str = "dataset_description.json";

/// Placeholder for blank cells in BIDS tables.
pub const NA: &str = "n/a";

// ── participants ──────────────────────────────────────────────────────────

/// Rewrite `participants.tsv` from the reference table and merge column
/// descriptions into `participants.json`.  Returns the number of rows.
///
/// The TSV is replaced; the JSON only gains keys it does not have yet.
pub fn write_participants(
    root: &Path,
    table: &ReferenceTable,
    config: &ConversionConfig,
) -> Result<usize> {
    table.require_key_column()?;
    let extra: Vec<&str> = config
        .demographic_columns
        .iter()
        .map(String::as_str)
        .filter(|c| table.has_column(c))
        .collect();

    let mut header = vec!["participant_id", "source_id"];
    header.extend(&extra);
    let mut lines = vec![header.join("\t")];

    for row in table.rows() {
        let Some(source) = row.key().filter(|k| !is_missing(k)) else {
            continue;
        };
        let id = SubjectId::parse(source)?;
        let mut cells = vec![id.bids_tag(), source.to_string()];
        cells.extend(extra.iter().map(|c| row.get(c).unwrap_or(NA).to_string()));
        lines.push(cells.join("\t"));
    }

    std::fs::create_dir_all(root)?;
    let tsv = root.join(PARTICIPANTS_TSV);
    std::fs::write(&tsv, lines.join("\n") + "\n")?;
    let n_rows = lines.len() - 1;

    let json_path = root.join(PARTICIPANTS_JSON);
    let mut descriptions = sidecar::read_object_or_empty(&json_path)?;
    sidecar::set_if_absent(
        &mut descriptions,
        "source_id",
        json!({ "Description": "Original MEG subject identifier (e.g., C01)" }),
    );
    sidecar::write_object(&json_path, &descriptions)?;

    tracing::info!(path = %tsv.display(), rows = n_rows, "wrote participants table");
    Ok(n_rows)
}

/// Whether `participants.tsv` under `root` lists `subject`.
///
/// An existing but unreadable table counts as listing it, so a re-run of a
/// partially converted dataset overwrites rather than aborts.
pub fn participants_lists(root: &Path, subject: &SubjectId) -> bool {
    let path = root.join(PARTICIPANTS_TSV);
    if !path.exists() {
        return false;
    }
    let Ok(text) = std::fs::read_to_string(&path) else {
        return true;
    };
    let tag = subject.bids_tag();
    let mut lines = text.lines();
    let Some(col) = lines
        .next()
        .and_then(|h| h.split('\t').position(|c| c.trim() == "participant_id"))
    else {
        return false;
    };
    lines.any(|l| l.split('\t').nth(col).is_some_and(|c| c.trim() == tag))
}

// ── dataset_description ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatasetDescription {
    pub name: String,
    #[serde(rename = "BIDSVersion")]
    pub bids_version: String,
    pub dataset_type: String,
    pub license: String,
    pub authors: Vec<String>,
    pub acknowledgements: String,
    pub funding: Vec<String>,
}

impl DatasetDescription {
    pub fn from_config(dataset: &DatasetConfig) -> Self {
        Self {
            name: dataset.name.clone(),
            bids_version: BIDS_VERSION.into(),
            dataset_type: "raw".into(),
            license: dataset.license.clone(),
            authors: dataset.authors.clone(),
            acknowledgements: dataset.acknowledgements.clone(),
            funding: dataset.funding.clone(),
        }
    }
}

/// Write `dataset_description.json`.  Generated keys are refreshed; keys
/// added by hand are kept.
pub fn write_dataset_description(root: &Path, description: &DatasetDescription) -> Result<PathBuf> {
    let path = root.join(DATASET_DESCRIPTION);
    let mut object = sidecar::read_object_or_empty(&path)?;
    let Value::Object(generated) = serde_json::to_value(description)? else {
        return Err(Error::Validation("dataset description did not serialize to an object".into()));
    };
    for (key, value) in generated {
        object.insert(key, value);
    }
    std::fs::create_dir_all(root)?;
    sidecar::write_object(&path, &object)?;
    tracing::info!(path = %path.display(), "wrote dataset description");
    Ok(path)
}

// ── scans ────────────────────────────────────────────────────────────────

/// Add or replace the `scans.tsv` row for `entry`.  Rows are kept sorted by
/// filename; a recording without a date gets `n/a`.
pub fn upsert_scans(path: &Path, entry: &str, acq_time: Option<DateTime<Utc>>) -> Result<()> {
    let mut rows: BTreeMap<String, String> = BTreeMap::new();
    if path.exists() {
        for line in std::fs::read_to_string(path)?.lines().skip(1) {
            if let Some((file, rest)) = line.split_once('\t') {
                rows.insert(file.to_string(), rest.to_string());
            }
        }
    }
    let acq = acq_time.map_or_else(
        || NA.to_string(),
        |t| t.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
    );
    rows.insert(entry.to_string(), acq);

    let mut out = String::from("filename\tacq_time\n");
    for (file, rest) in &rows {
        out.push_str(&format!("{file}\t{rest}\n"));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, out)?;
    Ok(())
}
