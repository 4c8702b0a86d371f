//! Output naming inside the converted tree.
//!
//! ```text
//! root/
//!   └─ sub-001/
//!        ├─ sub-001_scans.tsv
//!        └─ meg/
//!             ├─ sub-001_task-audiobase_meg.fif
//!             ├─ sub-001_task-audiobase_meg.json
//!             ├─ sub-001_task-audiobase_channels.tsv
//!             └─ sub-001_coordsystem.json
//! ```
//!
//! BIDS labels are alphanumeric, so task names lose their underscores
//! (`audio_base` → `audiobase`).
use std::fmt;
use std::path::{Path, PathBuf};

use crate::subject::SubjectId;

/// Datatype directory for every file this crate writes.
pub const DATATYPE: &str = "meg";

/// Strip everything BIDS does not accept in a label.
pub fn bids_label(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidsPath {
    pub root: PathBuf,
    pub subject: SubjectId,
    pub session: Option<String>,
    /// Task label, already sanitized.
    pub task: String,
}

impl BidsPath {
    pub fn new(root: impl Into<PathBuf>, subject: SubjectId, task: &str) -> Self {
        Self { root: root.into(), subject, session: None, task: bids_label(task) }
    }

    pub fn with_session(mut self, session: &str) -> Self {
        self.session = Some(bids_label(session));
        self
    }

    /// `sub-001[_ses-01]`.
    pub fn entity_prefix(&self) -> String {
        match &self.session {
            Some(ses) => format!("{}_ses-{ses}", self.subject.bids_tag()),
            None => self.subject.bids_tag(),
        }
    }

    /// `sub-001[_ses-01]_task-audiobase`.
    pub fn basename(&self) -> String {
        format!("{}_task-{}", self.entity_prefix(), self.task)
    }

    /// `root/sub-001[/ses-01]`.
    pub fn session_dir(&self) -> PathBuf {
        let dir = self.root.join(self.subject.bids_tag());
        match &self.session {
            Some(ses) => dir.join(format!("ses-{ses}")),
            None => dir,
        }
    }

    /// `root/sub-001[/ses-01]/meg`.
    pub fn datatype_dir(&self) -> PathBuf {
        self.session_dir().join(DATATYPE)
    }

    /// `<datatype_dir>/<basename>_<suffix>.<ext>`.
    pub fn file(&self, suffix: &str, ext: &str) -> PathBuf {
        self.datatype_dir().join(format!("{}_{suffix}.{ext}", self.basename()))
    }

    /// Coordinate-system sidecar; shared by every task of the session.
    pub fn coordsystem_file(&self) -> PathBuf {
        self.datatype_dir().join(format!("{}_coordsystem.json", self.entity_prefix()))
    }

    pub fn scans_file(&self) -> PathBuf {
        self.session_dir().join(format!("{}_scans.tsv", self.entity_prefix()))
    }

    /// `path` relative to [`session_dir`](Self::session_dir), `/`-separated,
    /// as listed in the scans table.
    pub fn scans_entry(&self, path: &Path) -> String {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        format!("{DATATYPE}/{name}")
    }
}

impl fmt::Display for BidsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.basename())
    }
}
