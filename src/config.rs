//! Conversion configuration.
//!
//! [`ConversionConfig`] holds every study-specific constant the pipeline
//! needs: paths, run maps, channel rules, expected trigger labels and the
//! dataset metadata.  The defaults reproduce the FGCM study; a TOML file can
//! override any subset of fields.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::anonymize::DEFAULT_DAYS_BACK;
use crate::channels::{ChannelRule, ChannelType};
use crate::error::{Error, Result};
use crate::runs::RunMaps;
use crate::subject::SubjectId;

/// Filesystem roots.  Relative paths are resolved against the working
/// directory of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw recordings, laid out as `<raw_root>/C01/C01-1/*_<NN>.<ext>`.
    ///
    /// Default: `FGCM_MEG_RAW`.
    pub raw_root: PathBuf,

    /// Converted dataset root.
    ///
    /// Default: `FGCM_BIDS`.
    pub bids_root: PathBuf,

    /// Directory of digitizer exports (`<ibbid>*.pos`).
    ///
    /// Default: `FGCM_POS`.
    pub pos_root: PathBuf,

    /// Demographics / randomization sheet.
    ///
    /// Default: `FGCM_Demographics.csv`.
    pub subject_table: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_root: PathBuf::from("FGCM_MEG_RAW"),
            bids_root: PathBuf::from("FGCM_BIDS"),
            pos_root: PathBuf::from("FGCM_POS"),
            subject_table: PathBuf::from("FGCM_Demographics.csv"),
        }
    }
}

/// Exact and prefix channel rules.  See [`crate::channels::classify_channels`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub exact: Vec<ChannelRule>,
    pub prefix: Vec<ChannelRule>,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            exact: vec![
                ChannelRule::new("ECG", ChannelType::Ecg),
                ChannelRule::new("UPPT001", ChannelType::Stim),
                ChannelRule::new("UPPT002", ChannelType::Stim),
            ],
            prefix: vec![
                // gaze x / y
                ChannelRule::new("UADC005", ChannelType::Eyegaze),
                ChannelRule::new("UADC006", ChannelType::Eyegaze),
                ChannelRule::new("UADC007", ChannelType::Pupil),
            ],
        }
    }
}

/// Values written to `dataset_description.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub name: String,
    pub authors: Vec<String>,
    pub license: String,
    pub acknowledgements: String,
    pub funding: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: "FearGenCrossMod (FGCM)".into(),
            authors: vec![
                "Riccardo Bianco".into(),
                "Alejandro Espino".into(),
                "Markus junghoefer".into(),
            ],
            license: "CC-BY-4.0".into(),
            acknowledgements: String::new(),
            funding: vec![],
        }
    }
}

/// Configuration for the whole conversion pipeline.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use megbids::ConversionConfig;
///
/// let cfg = ConversionConfig {
///     recording_ext: "ds".into(),   // CTF directories; needs a CTF backend
///     anonymize: false,
///     ..ConversionConfig::default()
/// };
/// assert_eq!(cfg.days_back, 3650);
/// ```
///
/// Or load a partial TOML file with [`ConversionConfig::load`]; absent keys
/// keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub paths: PathsConfig,

    /// Extension of raw recordings (without the dot).
    ///
    /// Default: `fif`.  `ds` selects CTF recording directories when
    /// resolving runs, but reading them needs a CTF-capable
    /// [`RecordingBackend`](crate::recording::RecordingBackend);
    /// [`FifBackend`](crate::fiff::FifBackend) only opens `.fif` files.
    pub recording_ext: String,

    /// Candidate primary identifier columns, in order of preference.
    ///
    /// Default: `["megid", "subid"]`.
    pub id_columns: Vec<String>,

    /// Candidate group-indicator columns, in order of preference.
    ///
    /// Default: `["randval", "group"]`.
    pub group_columns: Vec<String>,

    /// Column holding the digitizer identifier used to find point files.
    ///
    /// Default: `ibbid`.
    pub secondary_id_column: String,

    /// Table columns copied into `participants.tsv` when present.
    ///
    /// Default: `["age", "sex"]`.
    pub demographic_columns: Vec<String>,

    /// Tasks converted when no `--task` is given.
    pub tasks: Vec<String>,

    pub run_maps: RunMaps,

    pub channels: ChannelsConfig,

    /// MNE channel type → BIDS `type` column.  Types absent here use
    /// [`ChannelType::default_bids_name`].
    ///
    /// Default: CTF axial gradiometers, `meg → MEGGRADAXIAL` and
    /// `ref_meg → MEGREFGRADAXIAL`.
    pub bids_channel_types: BTreeMap<String, String>,

    /// Expected annotation labels per task.  Tasks absent here are not audited.
    pub trigger_labels: BTreeMap<String, Vec<String>>,

    /// Native ids of subjects whose trigger lines were recorded inverted.
    ///
    /// Default: `["C03", "C04"]`.
    pub inverted_trigger_subjects: Vec<String>,

    /// Power-line frequency in Hz written to the recording and `*_meg.json`.
    ///
    /// Default: `50.0` (Europe).
    pub line_freq: f64,

    /// Shift measurement dates back by [`days_back`](Self::days_back).
    ///
    /// Default: `true`.
    pub anonymize: bool,

    /// Requested anonymization shift in days, before clamping.
    ///
    /// Default: `3650` (~10 years).
    pub days_back: i64,

    /// Audit annotations against [`trigger_labels`](Self::trigger_labels).
    ///
    /// Default: `true`.
    pub check_triggers: bool,

    /// Coordinate system recorded for digitized head points.
    ///
    /// Default: `CTF`.
    pub coordinate_system: String,

    /// Prefer point files whose name does not contain `face`.
    ///
    /// Default: `true`.
    pub prefer_non_face: bool,

    pub dataset: DatasetConfig,
}

impl Default for ConversionConfig {
    /// Returns the FGCM study configuration.
    fn default() -> Self {
        let run_maps = RunMaps::default();
        let tasks = run_maps.a.iter().map(|(_, t)| t.to_string()).collect();
        Self {
            paths: PathsConfig::default(),
            recording_ext: "fif".into(),
            id_columns: vec!["megid".into(), "subid".into()],
            group_columns: vec!["randval".into(), "group".into()],
            secondary_id_column: "ibbid".into(),
            demographic_columns: vec!["age".into(), "sex".into()],
            tasks,
            run_maps,
            channels: ChannelsConfig::default(),
            bids_channel_types: [("meg", "MEGGRADAXIAL"), ("ref_meg", "MEGREFGRADAXIAL")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            trigger_labels: default_trigger_labels(),
            inverted_trigger_subjects: vec!["C03".into(), "C04".into()],
            line_freq: 50.0,
            anonymize: true,
            days_back: DEFAULT_DAYS_BACK,
            check_triggers: true,
            coordinate_system: "CTF".into(),
            prefer_non_face: true,
            dataset: DatasetConfig::default(),
        }
    }
}

impl ConversionConfig {
    /// Read a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let cfg = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Cross-field checks: every configured task must have a run in both
    /// group maps, and the identifier columns must not be empty.
    pub fn validate(&self) -> Result<()> {
        if self.id_columns.is_empty() {
            return Err(Error::Config("id_columns must name at least one column".into()));
        }
        if self.recording_ext.is_empty() || self.recording_ext.starts_with('.') {
            return Err(Error::Config(format!(
                "recording_ext '{}' must be a bare extension such as 'fif'",
                self.recording_ext
            )));
        }
        for task in &self.tasks {
            for (label, map) in [("A", &self.run_maps.a), ("B", &self.run_maps.b)] {
                if map.run_for_task(task)?.is_none() {
                    return Err(Error::Config(format!(
                        "task '{task}' has no run in the group {label} map"
                    )));
                }
            }
        }
        Ok(())
    }

    /// BIDS `type` column value for `ty`.
    pub fn bids_channel_type(&self, ty: ChannelType) -> &str {
        self.bids_channel_types
            .get(ty.as_str())
            .map(String::as_str)
            .unwrap_or_else(|| ty.default_bids_name())
    }

    /// Expected annotation labels of `task`, if the task is audited.
    pub fn expected_triggers(&self, task: &str) -> Option<&[String]> {
        self.trigger_labels.get(task).map(Vec::as_slice)
    }

    pub fn has_inverted_triggers(&self, subject: &SubjectId) -> bool {
        self.inverted_trigger_subjects
            .iter()
            .any(|s| SubjectId::parse(s).is_ok_and(|id| id == *subject))
    }
}

fn default_trigger_labels() -> BTreeMap<String, Vec<String>> {
    const GEN: [&str; 7] = ["Gen1", "Gen2", "Gen3", "Gen4", "Gen5", "Gen6", "Gen7"];

    let base = |beep: bool| -> Vec<String> {
        let mut labels = vec!["startACQ", "CSminus", "CSplusUnpaired"];
        labels.extend(GEN);
        labels.extend(["USface", "WarningTrial"]);
        if beep {
            labels.push("acTrgBeep");
        }
        labels.push("acTrgScream");
        labels.into_iter().map(String::from).collect()
    };
    let cond = |beep: bool| -> Vec<String> {
        let mut labels = vec!["startACQ", "CSminus", "CSplusUnpaired", "CSplusPaired", "USface"];
        if beep {
            labels.push("acTrgBeep");
        }
        labels.push("acTrgScream");
        labels.into_iter().map(String::from).collect()
    };
    let test = |beep: bool| -> Vec<String> {
        let mut labels = vec!["startACQ", "CSminus", "CSplusUnpaired", "CSplusPaired"];
        labels.extend(GEN);
        labels.push("USface");
        if beep {
            labels.push("acTrgBeep");
        }
        labels.push("acTrgScream");
        labels.into_iter().map(String::from).collect()
    };

    [
        ("audio_base", base(true)),
        ("audio_cond", cond(true)),
        ("audio_test", test(true)),
        ("visual_base", base(false)),
        ("visual_cond", cond(false)),
        ("visual_test", test(false)),
    ]
    .into_iter()
    .map(|(task, labels)| (task.to_string(), labels))
    .collect()
}
