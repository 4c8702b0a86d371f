//! Error taxonomy for the conversion pipeline.
//!
//! Resolution and table errors are fatal for the single item being processed;
//! the batch drivers in [`crate::convert`] and [`crate::headshape`] catch them
//! and record them in a [`crate::report::BatchReport`].
use std::path::PathBuf;
use thiserror::Error;

use crate::subject::Group;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing directory, file or reference-table row.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one recording candidate for a single run.
    #[error("ambiguous match: {0}")]
    AmbiguousMatch(String),

    /// Task absent from the subject group's run map.
    #[error("task '{task}' is not mapped to a run for group {group}")]
    TaskNotMapped { task: String, group: Group },

    /// Required column missing, empty point set, inconsistent run map.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unparseable subject identifier.
    #[error("format error: {0}")]
    Format(String),

    /// Destination exists and overwriting was not requested.
    #[error("refusing to overwrite existing {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reference table error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure inside a recording backend (reader or writer).
    #[error(transparent)]
    Recording(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
