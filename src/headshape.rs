//! Attach digitized head points to an already converted dataset.
//!
//! ```text
//! pos_root/A3122_head.pos ──┐  select_point_file  (secondary id from table)
//!                           │  parse_points → infer_units
//!                           ▼
//! bids_root/sub-001/[ses-*/]meg/
//!   ├─ sub-001_acq-HEAD_headshape.pos        copied, mtime preserved
//!   ├─ *_coordsystem.json                    DigitizedHeadPoints* keys merged
//!   └─ *_meg.json                            DigitizedHeadPoints = true
//! ```
//!
//! Every filesystem mutation goes through [`FsEffects`], so a dry run walks
//! exactly the same decisions and only swaps writes for log lines.
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::Serialize;
use serde_json::Value;

use crate::config::ConversionConfig;
use crate::error::{Error, Result};
use crate::report::BatchReport;
use crate::sidecar;
use crate::subject::SubjectId;
use crate::table::ReferenceTable;

/// Acquisition entity of the copied headshape file.
pub const ACQUISITION: &str = "HEAD";

/// Extension of digitizer exports.
pub const POINT_FILE_EXT: &str = "pos";

/// Median |coordinate| at or below which points are taken to be centimetres.
pub const CM_MEDIAN_THRESHOLD: f64 = 30.0;

// ── Point sets ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Cm,
    Mm,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Cm => "cm",
            Units::Mm => "mm",
        }
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered digitization points, shape `[N, 3]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    pub points: Array2<f64>,
}

impl PointSet {
    pub fn read(path: &Path) -> Result<Self> {
        Ok(parse_points(&std::fs::read_to_string(path)?))
    }

    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// Median of the absolute value of every coordinate.  Even counts
    /// average the two middle values.
    pub fn median_abs(&self) -> Option<f64> {
        let mut mags: Vec<f64> = self.points.iter().map(|v| v.abs()).collect();
        if mags.is_empty() {
            return None;
        }
        mags.sort_by(f64::total_cmp);
        let mid = mags.len() / 2;
        Some(if mags.len() % 2 == 0 {
            (mags[mid - 1] + mags[mid]) / 2.0
        } else {
            mags[mid]
        })
    }
}

/// Parse a digitizer export.
///
/// Each line is split on whitespace; tokens that are not numbers are
/// dropped.  A line contributes one point from its **last three** numeric
/// tokens, or nothing if it has fewer than three.
pub fn parse_points(text: &str) -> PointSet {
    let mut flat = Vec::new();
    for line in text.lines() {
        let numbers: Vec<f64> = line
            .split_whitespace()
            .filter_map(|tok| tok.parse::<f64>().ok())
            .collect();
        if let [.., x, y, z] = numbers[..] {
            flat.extend([x, y, z]);
        }
    }
    let n = flat.len() / 3;
    let points = Array2::from_shape_vec((n, 3), flat).unwrap_or_else(|_| Array2::zeros((0, 3)));
    PointSet { points }
}

/// `cm` when the median |coordinate| is ≤ 30, otherwise `mm`.
pub fn infer_units(points: &PointSet) -> Result<Units> {
    let median = points
        .median_abs()
        .ok_or_else(|| Error::Validation("no coordinate points found".into()))?;
    Ok(if median <= CM_MEDIAN_THRESHOLD { Units::Cm } else { Units::Mm })
}

// ── File selection & naming ───────────────────────────────────────────────

/// Pick the point file for `secondary_id` in `pos_root`.
///
/// Candidates are `<secondary_id>*.pos`.  With `prefer_non_face`, names
/// without `face` (any case) are preferred when at least one exists.  The
/// most recently modified candidate wins; equal mtimes go to the
/// lexicographically last name.
pub fn select_point_file(
    secondary_id: &str,
    pos_root: &Path,
    prefer_non_face: bool,
) -> Result<Option<PathBuf>> {
    if secondary_id.is_empty() {
        return Ok(None);
    }
    let suffix = format!(".{POINT_FILE_EXT}");
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(pos_root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(secondary_id) && name.ends_with(&suffix) {
            candidates.push((entry.metadata()?.modified()?, name, entry.path()));
        }
    }

    if prefer_non_face && candidates.iter().any(|(_, n, _)| !is_face_scan(n)) {
        candidates.retain(|(_, n, _)| !is_face_scan(n));
    }

    Ok(candidates
        .into_iter()
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, _, path)| path))
}

fn is_face_scan(name: &str) -> bool {
    name.to_lowercase().contains("face")
}

/// `sub-001[_ses-01]_acq-HEAD_headshape.pos`.
pub fn headshape_filename(subject: &SubjectId, session: Option<&str>) -> String {
    let mut parts = vec![subject.bids_tag()];
    if let Some(ses) = session {
        parts.push(format!("ses-{ses}"));
    }
    parts.push(format!("acq-{ACQUISITION}"));
    format!("{}_headshape.{POINT_FILE_EXT}", parts.join("_"))
}

/// MEG directories of `subject`: `sub-<id>/ses-*/meg` when session
/// directories exist, otherwise `sub-<id>/meg`.  Sorted; empty when none.
pub fn collect_meg_dirs(bids_root: &Path, subject: &SubjectId) -> Result<Vec<PathBuf>> {
    let subject_dir = bids_root.join(subject.bids_tag());
    if !subject_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for entry in std::fs::read_dir(&subject_dir)? {
        let path = entry?.path();
        let is_session = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("ses-"));
        if is_session && path.is_dir() {
            sessions.push(path);
        }
    }

    let mut dirs: Vec<PathBuf> = if sessions.is_empty() {
        vec![subject_dir.join("meg")]
    } else {
        sessions.into_iter().map(|s| s.join("meg")).collect()
    };
    dirs.retain(|d| d.is_dir());
    dirs.sort();
    Ok(dirs)
}

/// Session label of a `.../ses-<label>/meg` directory.
pub fn session_label(meg_dir: &Path) -> Option<String> {
    let parent = meg_dir.parent()?.file_name()?.to_str()?;
    parent.strip_prefix("ses-").map(str::to_string)
}

fn sorted_glob_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(suffix)) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

// ── Effects ───────────────────────────────────────────────────────────────

/// The mutating half of the attacher.  With `dry_run` set every method still
/// reads its inputs, so it fails exactly where a real run would, but logs
/// the write instead of doing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsEffects {
    pub dry_run: bool,
}

impl FsEffects {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Copy `src` to `dst` and carry the modification time over.
    pub fn copy_preserving_mtime(&self, src: &Path, dst: &Path) -> Result<()> {
        let mut reader = std::fs::File::open(src)?;
        let mtime = reader.metadata()?.modified()?;
        if self.dry_run {
            tracing::info!(src = %src.display(), dst = %dst.display(), "dry run: would copy");
            return Ok(());
        }
        let mut writer = std::fs::File::create(dst)?;
        std::io::copy(&mut reader, &mut writer)?;
        writer.set_modified(mtime)?;
        tracing::debug!(src = %src.display(), dst = %dst.display(), "copied");
        Ok(())
    }

    /// Merge `updates` into the JSON object at `path`.
    pub fn merge_json(&self, path: &Path, updates: Vec<(String, Value)>) -> Result<()> {
        let keys: Vec<String> = updates.iter().map(|(k, _)| k.clone()).collect();
        let object = sidecar::merged(path, updates)?;
        if self.dry_run {
            tracing::info!(path = %path.display(), ?keys, "dry run: would update");
            return Ok(());
        }
        sidecar::write_object(path, &object)?;
        tracing::debug!(path = %path.display(), "updated sidecar");
        Ok(())
    }
}

// ── Batch driver ──────────────────────────────────────────────────────────

/// One successfully attached subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachedHeadshape {
    /// Identifier as the caller supplied it.
    pub subject: String,
    /// Selected point file name.
    pub point_file: String,
    pub units: Units,
    /// Copied headshape files, one per MEG directory.
    pub destinations: Vec<PathBuf>,
}

/// Attach headshape files for every entry of `subjects`.
///
/// Fails as a whole only when the digitization directory is missing or the
/// table lacks the primary or secondary identifier column.  Per-subject
/// failures land in the report's `failed` bucket.
pub fn attach_headshapes<S: AsRef<str>>(
    subjects: &[S],
    table: &ReferenceTable,
    config: &ConversionConfig,
    effects: FsEffects,
) -> Result<BatchReport<AttachedHeadshape>> {
    let pos_root = &config.paths.pos_root;
    if !pos_root.is_dir() {
        return Err(Error::NotFound(format!(
            "digitization directory {}",
            pos_root.display()
        )));
    }
    table.require_key_column()?;
    if !table.has_column(&config.secondary_id_column) {
        return Err(Error::Validation(format!(
            "reference table is missing the '{}' column",
            config.secondary_id_column
        )));
    }

    let mut report = BatchReport::new();
    for raw in subjects {
        let raw = raw.as_ref();
        let mut notes = Vec::new();
        let outcome = attach_one(raw, table, config, effects, &mut notes);
        for note in notes {
            report.skip(raw, note);
        }
        report.record(raw, outcome);
    }
    report.log_summary("headshape");
    Ok(report)
}

fn attach_one(
    raw: &str,
    table: &ReferenceTable,
    config: &ConversionConfig,
    effects: FsEffects,
    notes: &mut Vec<String>,
) -> Result<AttachedHeadshape> {
    let subject = SubjectId::parse(raw)?;
    let row = table.row(&subject)?;
    let secondary = row
        .get(&config.secondary_id_column)
        .ok_or_else(|| Error::Validation(format!("missing {}", config.secondary_id_column)))?;

    let source = select_point_file(secondary, &config.paths.pos_root, config.prefer_non_face)?
        .ok_or_else(|| Error::NotFound(format!(".{POINT_FILE_EXT} file for {secondary}")))?;
    let units = infer_units(&PointSet::read(&source)?)?;

    let meg_dirs = collect_meg_dirs(&config.paths.bids_root, &subject)?;
    if meg_dirs.is_empty() {
        return Err(Error::NotFound(format!("MEG directory for {}", subject.bids_tag())));
    }

    let mut destinations = Vec::with_capacity(meg_dirs.len());
    for meg_dir in &meg_dirs {
        let session = session_label(meg_dir);
        let name = headshape_filename(&subject, session.as_deref());
        let dest = meg_dir.join(&name);
        effects.copy_preserving_mtime(&source, &dest)?;

        let coordsystems = sorted_glob_suffix(meg_dir, "_coordsystem.json")?;
        if coordsystems.is_empty() {
            notes.push("no coordsystem JSON found".to_string());
        }
        for path in &coordsystems {
            effects.merge_json(
                path,
                vec![
                    ("DigitizedHeadPoints".into(), Value::from(name.as_str())),
                    (
                        "DigitizedHeadPointsCoordinateSystem".into(),
                        Value::from(config.coordinate_system.as_str()),
                    ),
                    ("DigitizedHeadPointsCoordinateUnits".into(), Value::from(units.as_str())),
                ],
            )?;
        }
        for path in sorted_glob_suffix(meg_dir, "_meg.json")? {
            effects.merge_json(&path, vec![("DigitizedHeadPoints".into(), Value::Bool(true))])?;
        }
        destinations.push(dest);
    }

    let point_file = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::info!(%subject, point_file, %units, n_dirs = destinations.len(), "headshape attached");
    Ok(AttachedHeadshape { subject: raw.to_string(), point_file, units, destinations })
}
