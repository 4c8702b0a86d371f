//! Subjects × tasks conversion driver.
//!
//! ```text
//! (subject, task)
//!   ├─ RunPathResolver::resolve      raw recording on disk
//!   ├─ backend.read_recording
//!   ├─ classify + apply channel types
//!   ├─ audit_triggers                informational
//!   ├─ set_line_freq
//!   ├─ clamp_days_back               anonymization shift
//!   └─ backend.write_converted       sub-001/meg/sub-001_task-…_meg.fif
//! ```
//!
//! A subject already listed in `participants.tsv` is overwritten; any other
//! existing output is an [`Error::AlreadyExists`] for that item.
use std::path::PathBuf;

use serde::Serialize;

use crate::anonymize::clamp_days_back;
use crate::bids_path::BidsPath;
use crate::channels::{apply_channel_types, classify_channels};
use crate::config::ConversionConfig;
use crate::dataset::participants_lists;
use crate::error::Result;
use crate::recording::{Recording, RecordingBackend};
use crate::report::BatchReport;
use crate::runs::RunPathResolver;
use crate::subject::SubjectId;
use crate::table::ReferenceTable;
use crate::triggers::{audit_triggers, TriggerReport};

/// Where one (subject, task) pair would be read from and written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedConversion {
    pub subject: String,
    pub task: String,
    pub run: u32,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// One converted recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Converted {
    pub subject: String,
    pub task: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Applied shift in days; `None` when anonymization is off.
    pub days_back: Option<i64>,
    pub overwrote: bool,
    pub triggers: Option<TriggerReport>,
}

pub struct Converter<'a, B: RecordingBackend> {
    backend: &'a B,
    config: &'a ConversionConfig,
    table: &'a ReferenceTable,
}

impl<'a, B: RecordingBackend> Converter<'a, B> {
    pub fn new(backend: &'a B, config: &'a ConversionConfig, table: &'a ReferenceTable) -> Self {
        Self { backend, config, table }
    }

    fn destination(&self, subject: SubjectId, task: &str) -> BidsPath {
        BidsPath::new(&self.config.paths.bids_root, subject, task)
    }

    /// Resolve paths without reading or writing anything.
    pub fn plan(&self, subject: &SubjectId, task: &str) -> Result<PlannedConversion> {
        let locator = RunPathResolver::new(self.config, self.table).resolve(subject, task)?;
        Ok(PlannedConversion {
            subject: subject.native(),
            task: task.to_string(),
            run: locator.run,
            source: locator.path,
            destination: self.destination(*subject, task).file("meg", "fif"),
        })
    }

    /// Convert the recording holding `task` for `subject`.
    pub fn convert_one(&self, subject: &SubjectId, task: &str) -> Result<Converted> {
        let config = self.config;
        let native = subject.native();
        let locator = RunPathResolver::new(config, self.table).resolve(subject, task)?;
        tracing::info!(subject = %native, task, run = locator.run, "converting");

        let mut recording = self.backend.read_recording(&locator.path)?;

        let types = classify_channels(
            &recording.channel_names(),
            &config.channels.exact,
            &config.channels.prefix,
        );
        apply_channel_types(&mut recording, &types)?;

        if config.has_inverted_triggers(subject) {
            tracing::warn!(
                subject = %native,
                task,
                "trigger inversion requested but no correction rule is defined; triggers left as recorded"
            );
        }

        let triggers = config.check_triggers.then(|| {
            let report = audit_triggers(&recording.annotations(), config.expected_triggers(task));
            report.log(&native, task);
            report
        });

        recording.set_line_freq(config.line_freq);

        let dest = self.destination(*subject, task);
        let overwrite = participants_lists(&config.paths.bids_root, subject);
        if overwrite {
            tracing::info!(subject = %subject.bids_tag(), "already in participants.tsv; overwriting");
        }

        let anonymize = config
            .anonymize
            .then(|| clamp_days_back(config.days_back, recording.meas_date()));

        let destination =
            self.backend.write_converted(&recording, &dest, anonymize.as_ref(), overwrite)?;

        Ok(Converted {
            subject: native,
            task: task.to_string(),
            source: locator.path,
            destination,
            days_back: anonymize.map(|a| a.days_back),
            overwrote: overwrite,
            triggers,
        })
    }

    /// Convert every (subject, task) pair.  A failing pair is recorded and
    /// the batch moves on.
    pub fn convert_batch<S, T>(&self, subjects: &[S], tasks: &[T]) -> BatchReport<Converted>
    where
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let mut report = BatchReport::new();
        for raw in subjects {
            let raw = raw.as_ref();
            let subject = match SubjectId::parse(raw) {
                Ok(id) => id,
                Err(e) => {
                    report.fail(raw, e);
                    continue;
                }
            };
            for task in tasks {
                let task = task.as_ref();
                report.record(
                    format!("{}/{task}", subject.native()),
                    self.convert_one(&subject, task),
                );
            }
        }
        report.log_summary("convert");
        report
    }
}
