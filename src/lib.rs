//! # megbids: raw MEG recordings to a BIDS dataset
//!
//! `megbids` converts the raw MEG runs of the FGCM study into a
//! [BIDS](https://bids.neuroimaging.io) tree and attaches the digitized head
//! shapes afterwards.  The study's conventions (subject ids, run order per
//! randomization group, channel names, expected trigger labels) live in one
//! [`ConversionConfig`] that every call receives explicitly.
//!
//! ## Pipeline overview
//!
//! ```text
//! FGCM_Demographics.csv ──▶ ReferenceTable (ids, groups, ibbid)
//!                               │
//! raw/C01/C01-1/*_NN.fif        │
//!   │                           │
//!   ├─ RunPathResolver          group → run map → unique file
//!   ├─ RecordingBackend::read   fiff::FifBackend (native FIFF reader)
//!   ├─ classify_channels        exact + prefix rules, coil side effect
//!   ├─ audit_triggers           expected labels per task
//!   ├─ clamp_days_back          shift ≥ 1901-12-13 (i32 epoch)
//!   └─ RecordingBackend::write  sub-001/meg/sub-001_task-…_meg.fif + sidecars
//!        │
//!        ├─ dataset_description.json, participants.tsv
//!        └─ attach_headshapes   *.pos → sub-001[_ses-…]_acq-HEAD_headshape.pos
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use megbids::{convert_dataset, ConversionConfig, FifBackend, ReferenceTable};
//!
//! let cfg = ConversionConfig::default();
//! let table = ReferenceTable::load(&cfg.paths.subject_table, &cfg.id_columns).unwrap();
//! let subjects = table.subject_keys().unwrap();
//!
//! let report = convert_dataset(&FifBackend::new(&cfg), &cfg, &table, &subjects, &cfg.tasks).unwrap();
//! println!("{} converted, {} failed", report.success.len(), report.failed.len());
//! ```
//!
//! ## Attaching head shapes
//!
//! ```no_run
//! use megbids::{attach_headshapes, ConversionConfig, FsEffects, ReferenceTable};
//!
//! let cfg = ConversionConfig::default();
//! let table = ReferenceTable::load(&cfg.paths.subject_table, &cfg.id_columns).unwrap();
//! let subjects = table.subject_keys().unwrap();
//!
//! // dry run: classify and log, touch nothing
//! let report = attach_headshapes(&subjects, &table, &cfg, FsEffects::new(true)).unwrap();
//! for note in &report.failed {
//!     println!("{note}");
//! }
//! ```

pub mod anonymize;
pub mod bids_path;
pub mod channels;
pub mod config;
pub mod convert;
pub mod dataset;
pub mod error;
pub mod fiff;
pub mod headshape;
pub mod recording;
pub mod report;
pub mod runs;
pub mod sidecar;
pub mod subject;
pub mod table;
pub mod triggers;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config / errors
pub use config::ConversionConfig;
pub use error::{Error, Result};

// identifiers + reference table
pub use subject::{normalize_to_native, normalize_to_numeric, Group, SubjectId};
pub use table::ReferenceTable;

// conversion
pub use anonymize::{clamp_days_back, AnonymizationParams, MeasDate};
pub use bids_path::BidsPath;
pub use channels::{apply_channel_types, classify_channels, ChannelRule, ChannelType, ChannelTypeMap};
pub use convert::{Converted, Converter, PlannedConversion};
pub use recording::{InMemoryRecording, Recording, RecordingBackend};
pub use runs::{RecordingLocator, RunMap, RunMaps, RunPathResolver};
pub use triggers::{audit_triggers, TriggerReport};

// backend
pub use fiff::{open_recording, FifBackend, FifRecording};

// post-conversion
pub use dataset::{write_dataset_description, write_participants, DatasetDescription};
pub use headshape::{attach_headshapes, AttachedHeadshape, FsEffects, PointSet, Units};
pub use report::{BatchReport, ItemNote};

/// Convert every (subject, task) pair, then refresh the dataset-level files.
///
/// Per-pair failures are collected in the returned report and do not stop
/// the batch.  `dataset_description.json` and `participants.tsv` are written
/// after the batch; a failure there is returned as `Err`.
///
/// # Examples
///
/// ```no_run
/// use megbids::{convert_dataset, ConversionConfig, FifBackend, ReferenceTable};
///
/// let cfg = ConversionConfig::default();
/// let table = ReferenceTable::load(&cfg.paths.subject_table, &cfg.id_columns).unwrap();
/// let report = convert_dataset(&FifBackend::new(&cfg), &cfg, &table, &["C01"], &["audio_base"]).unwrap();
/// assert!(report.processed() <= 1);
/// ```
pub fn convert_dataset<B, S, T>(
    backend: &B,
    config: &ConversionConfig,
    table: &ReferenceTable,
    subjects: &[S],
    tasks: &[T],
) -> Result<BatchReport<Converted>>
where
    B: RecordingBackend,
    S: AsRef<str>,
    T: AsRef<str>,
{
    let report = Converter::new(backend, config, table).convert_batch(subjects, tasks);

    let root = &config.paths.bids_root;
    write_dataset_description(root, &DatasetDescription::from_config(&config.dataset))?;
    write_participants(root, table, config)?;
    Ok(report)
}
