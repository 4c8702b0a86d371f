//! Run numbering and raw-recording lookup.
//!
//! Each subject recorded six runs whose order depends on the randomization
//! group, so the run that holds a task differs between groups.  A
//! [`RunMap`] records that order; [`RunPathResolver`] inverts it and finds the
//! one file on disk carrying the run number:
//!
//! ```text
//! raw_root/C01/C01-1/
//!   ├─ C01_FGCM_20230504_01.fif  run 1
//!   ├─ C01_FGCM_20230504_02.fif  run 2
//!   └─ …
//! ```
//!
//! Ambiguity is always an error: silently picking one of two candidates
//! risks converting the wrong run.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ConversionConfig;
use crate::error::{Error, Result};
use crate::subject::{Group, SubjectId};
use crate::table::ReferenceTable;

// ── RunMap ────────────────────────────────────────────────────────────────

/// `run number → task name` for one group.  Task names are unique.
///
/// Serialized as a table keyed by two-digit run strings (`"01" = "audio_base"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct RunMap {
    runs: BTreeMap<u32, String>,
}

impl RunMap {
    /// Build from `(run, task)` pairs, rejecting duplicate tasks or runs.
    pub fn new<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        let mut runs = BTreeMap::new();
        for (run, task) in pairs {
            let task = task.into();
            if let Some((other, _)) = runs.iter().find(|(_, t)| **t == task) {
                return Err(Error::Validation(format!(
                    "task '{task}' mapped to both run {other:02} and run {run:02}"
                )));
            }
            if runs.insert(run, task).is_some() {
                return Err(Error::Validation(format!("run {run:02} listed twice")));
            }
        }
        Ok(Self { runs })
    }

    pub fn task(&self, run: u32) -> Option<&str> {
        self.runs.get(&run).map(String::as_str)
    }

    /// Inverse lookup.  `None` if the task is absent; a `ValidationError` if
    /// it maps to more than one run.
    pub fn run_for_task(&self, task: &str) -> Result<Option<u32>> {
        let mut hits = self.runs.iter().filter(|(_, t)| *t == task).map(|(&r, _)| r);
        let first = hits.next();
        if let Some(second) = hits.next() {
            return Err(Error::Validation(format!(
                "task '{task}' maps to several runs ({:02}, {second:02}, …)",
                first.unwrap_or_default()
            )));
        }
        Ok(first)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.runs.iter().map(|(&r, t)| (r, t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl TryFrom<BTreeMap<String, String>> for RunMap {
    type Error = Error;

    fn try_from(raw: BTreeMap<String, String>) -> Result<Self> {
        let pairs = raw
            .into_iter()
            .map(|(run, task)| {
                run.trim()
                    .parse::<u32>()
                    .map(|r| (r, task))
                    .map_err(|_| Error::Config(format!("run number '{run}' is not an integer")))
            })
            .collect::<Result<Vec<_>>>()?;
        RunMap::new(pairs)
    }
}

impl From<RunMap> for BTreeMap<String, String> {
    fn from(map: RunMap) -> Self {
        map.runs.into_iter().map(|(r, t)| (format!("{r:02}"), t)).collect()
    }
}

/// The two group variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMaps {
    #[serde(rename = "A")]
    pub a: RunMap,
    #[serde(rename = "B")]
    pub b: RunMap,
}

impl Default for RunMaps {
    /// Group A records the auditory block first, group B the visual block.
    fn default() -> Self {
        let ordered = |tasks: [&str; 6]| RunMap {
            runs: (1..).zip(tasks.iter().map(|t| t.to_string())).collect(),
        };
        Self {
            a: ordered([
                "audio_base",
                "audio_cond",
                "audio_test",
                "visual_base",
                "visual_cond",
                "visual_test",
            ]),
            b: ordered([
                "visual_base",
                "visual_cond",
                "visual_test",
                "audio_base",
                "audio_cond",
                "audio_test",
            ]),
        }
    }
}

impl RunMaps {
    /// Tasks of both variants, sorted and deduplicated.
    pub fn tasks(&self) -> Vec<&str> {
        let mut tasks: Vec<&str> = self.a.iter().chain(self.b.iter()).map(|(_, t)| t).collect();
        tasks.sort_unstable();
        tasks.dedup();
        tasks
    }

    pub fn for_group(&self, group: Group) -> &RunMap {
        match group {
            Group::A => &self.a,
            Group::B => &self.b,
        }
    }
}

// ── Locator ───────────────────────────────────────────────────────────────

/// A resolved raw recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingLocator {
    pub subject_dir: PathBuf,
    pub run: u32,
    pub path: PathBuf,
}

/// Run number embedded in a recording name: the digits between the last `_`
/// and `.<ext>`.  `C01_FGCM_02.fif` → `Some(2)`.
pub fn run_number_from_name(name: &str, ext: &str) -> Option<u32> {
    let stem = name.strip_suffix(ext)?.strip_suffix('.')?;
    let (_, digits) = stem.rsplit_once('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Directory holding a subject's raw recordings: `root/C01/C01-1`.
pub fn subject_raw_dir(raw_root: &Path, subject: &SubjectId) -> PathBuf {
    let native = subject.native();
    raw_root.join(&native).join(format!("{native}-1"))
}

/// Resolves `(subject, task)` to exactly one raw recording.
pub struct RunPathResolver<'a> {
    config: &'a ConversionConfig,
    table: &'a ReferenceTable,
}

impl<'a> RunPathResolver<'a> {
    pub fn new(config: &'a ConversionConfig, table: &'a ReferenceTable) -> Self {
        Self { config, table }
    }

    /// Run number holding `task` for `subject`.
    pub fn run_for(&self, subject: &SubjectId, task: &str) -> Result<u32> {
        let group = self.table.group_of(subject, &self.config.group_columns)?;
        self.config
            .run_maps
            .for_group(group)
            .run_for_task(task)?
            .ok_or_else(|| Error::TaskNotMapped { task: task.to_string(), group })
    }

    pub fn resolve(&self, subject: &SubjectId, task: &str) -> Result<RecordingLocator> {
        let run = self.run_for(subject, task)?;
        let subject_dir = subject_raw_dir(&self.config.paths.raw_root, subject);
        let path = find_run_recording(&subject_dir, run, &self.config.recording_ext)?;
        tracing::debug!(%subject, task, run, path = %path.display(), "resolved raw recording");
        Ok(RecordingLocator { subject_dir, run, path })
    }
}

/// The single entry in `dir` with extension `ext` whose name embeds `run`.
///
/// Entries may be files or directories (CTF `.ds`).  Only locating is done
/// here; opening the entry is up to the configured recording backend.
pub fn find_run_recording(dir: &Path, run: u32, ext: &str) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(Error::NotFound(format!("subject directory {}", dir.display())));
    }

    let suffix = format!(".{ext}");
    let mut recordings: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&suffix))
        })
        .collect();
    recordings.sort();
    if recordings.is_empty() {
        return Err(Error::NotFound(format!("no {suffix} recordings in {}", dir.display())));
    }

    let mut by_run: BTreeMap<u32, Vec<&PathBuf>> = BTreeMap::new();
    for path in &recordings {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if let Some(r) = run_number_from_name(name, ext) {
            by_run.entry(r).or_default().push(path);
        }
    }

    match by_run.get(&run).map(Vec::as_slice) {
        None | Some([]) => Err(Error::NotFound(format!(
            "no recording for run {run:02} in {}; available: {}",
            dir.display(),
            file_names(recordings.iter())
        ))),
        Some([only]) => Ok((*only).clone()),
        Some(many) => Err(Error::AmbiguousMatch(format!(
            "{} recordings for run {run:02} in {}: {}",
            many.len(),
            dir.display(),
            file_names(many.iter().copied())
        ))),
    }
}

fn file_names<'p>(paths: impl Iterator<Item = &'p PathBuf>) -> String {
    paths
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_number_extraction() {
        assert_eq!(run_number_from_name("C01_FGCM_20230504_02.ds", "ds"), Some(2));
        assert_eq!(run_number_from_name("C01_run_10.fif", "fif"), Some(10));
        assert_eq!(run_number_from_name("C01_FGCM.ds", "ds"), None);
        assert_eq!(run_number_from_name("C01_02.ds.bak", "ds"), None);
        assert_eq!(run_number_from_name("C01_02ds", "ds"), None);
        assert_eq!(run_number_from_name("C01_.ds", "ds"), None);
    }

    #[test]
    fn run_map_rejects_duplicate_tasks() {
        let err = RunMap::new([(1, "audio_base"), (2, "audio_base")]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn run_map_inverse_lookup() {
        let map = RunMap::new([(1, "visual_base"), (4, "audio_base")]).unwrap();
        assert_eq!(map.run_for_task("audio_base").unwrap(), Some(4));
        assert_eq!(map.run_for_task("audio_test").unwrap(), None);
        assert_eq!(map.task(1), Some("visual_base"));
    }

    #[test]
    fn run_map_string_keys_round_trip() {
        let mut raw = BTreeMap::new();
        raw.insert("01".to_string(), "audio_base".to_string());
        raw.insert("02".to_string(), "audio_cond".to_string());
        let map = RunMap::try_from(raw.clone()).unwrap();
        assert_eq!(BTreeMap::<String, String>::from(map), raw);
    }

    #[test]
    fn run_map_rejects_non_numeric_run() {
        let mut raw = BTreeMap::new();
        raw.insert("first".to_string(), "audio_base".to_string());
        assert!(matches!(RunMap::try_from(raw), Err(Error::Config(_))));
    }

    #[test]
    fn study_maps_swap_blocks() {
        let maps = RunMaps::default();
        assert_eq!(maps.a.run_for_task("audio_base").unwrap(), Some(1));
        assert_eq!(maps.b.run_for_task("audio_base").unwrap(), Some(4));
        assert_eq!(maps.for_group(Group::B).task(1), Some("visual_base"));
        assert_eq!(maps.tasks().len(), 6);
    }

    #[test]
    fn subject_dir_layout() {
        let id = SubjectId::parse("sub-003").unwrap();
        assert_eq!(
            subject_raw_dir(Path::new("/raw"), &id),
            PathBuf::from("/raw/C03/C03-1")
        );
    }
}
