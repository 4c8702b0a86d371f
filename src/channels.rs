//! Channel classification: raw channel names → semantic channel types.
//!
//! Two rule tables drive the classifier:
//!
//! * **exact** rules match a channel name verbatim (`ECG`, `UPPT001`);
//! * **prefix** rules match the start of a name (`UADC005…`).
//!
//! Exact rules always win.  Among prefix rules the first match in table order
//! wins, so every channel receives at most one type.
//!
//! Eye-tracker channels also get a FIFF coil type: readers identify gaze and
//! pupil channels by coil, not by kind.  [`apply_channel_types`] sets both.
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fiff::constants::*;
use crate::recording::Recording;

// ── Channel types ─────────────────────────────────────────────────────────

/// Semantic channel type, named after MNE's channel-type strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Meg,
    RefMeg,
    Eeg,
    Eog,
    Ecg,
    Emg,
    Stim,
    Resp,
    Misc,
    Eyegaze,
    Pupil,
}

impl ChannelType {
    pub const ALL: [ChannelType; 11] = [
        ChannelType::Meg,
        ChannelType::RefMeg,
        ChannelType::Eeg,
        ChannelType::Eog,
        ChannelType::Ecg,
        ChannelType::Emg,
        ChannelType::Stim,
        ChannelType::Resp,
        ChannelType::Misc,
        ChannelType::Eyegaze,
        ChannelType::Pupil,
    ];

    /// MNE spelling (`"ref_meg"`, `"eyegaze"`, …).
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Meg => "meg",
            ChannelType::RefMeg => "ref_meg",
            ChannelType::Eeg => "eeg",
            ChannelType::Eog => "eog",
            ChannelType::Ecg => "ecg",
            ChannelType::Emg => "emg",
            ChannelType::Stim => "stim",
            ChannelType::Resp => "resp",
            ChannelType::Misc => "misc",
            ChannelType::Eyegaze => "eyegaze",
            ChannelType::Pupil => "pupil",
        }
    }

    /// BIDS `type` column value before any study-specific override.
    pub fn default_bids_name(&self) -> &'static str {
        match self {
            ChannelType::Meg => "MEGMAG",
            ChannelType::RefMeg => "MEGREFMAG",
            ChannelType::Eeg => "EEG",
            ChannelType::Eog => "EOG",
            ChannelType::Ecg => "ECG",
            ChannelType::Emg => "EMG",
            ChannelType::Stim => "TRIG",
            ChannelType::Resp => "RESP",
            ChannelType::Misc => "MISC",
            ChannelType::Eyegaze => "EYEGAZE",
            ChannelType::Pupil => "PUPIL",
        }
    }

    /// Physical unit written to `*_channels.tsv`.
    pub fn units(&self) -> &'static str {
        match self {
            ChannelType::Meg | ChannelType::RefMeg => "T",
            ChannelType::Eeg | ChannelType::Eog | ChannelType::Ecg | ChannelType::Emg => "V",
            _ => "n/a",
        }
    }

    /// FIFF channel kind (`FIFFV_*_CH`).
    pub fn fiff_kind(&self) -> i32 {
        match self {
            ChannelType::Meg => FIFFV_MEG_CH,
            ChannelType::RefMeg => FIFFV_REF_MEG_CH,
            ChannelType::Eeg => FIFFV_EEG_CH,
            ChannelType::Eog => FIFFV_EOG_CH,
            ChannelType::Ecg => FIFFV_ECG_CH,
            ChannelType::Emg => FIFFV_EMG_CH,
            ChannelType::Stim => FIFFV_STIM_CH,
            ChannelType::Resp => FIFFV_RESP_CH,
            ChannelType::Misc => FIFFV_MISC_CH,
            ChannelType::Eyegaze | ChannelType::Pupil => FIFFV_EYETRACK_CH,
        }
    }

    /// Inverse of [`fiff_kind`](Self::fiff_kind); the coil type separates
    /// gaze from pupil channels.  Unknown kinds map to `None`.
    pub fn from_fiff(kind: i32, coil_type: i32) -> Option<Self> {
        Some(match kind {
            FIFFV_MEG_CH => ChannelType::Meg,
            FIFFV_REF_MEG_CH => ChannelType::RefMeg,
            FIFFV_EEG_CH => ChannelType::Eeg,
            FIFFV_EOG_CH => ChannelType::Eog,
            FIFFV_ECG_CH => ChannelType::Ecg,
            FIFFV_EMG_CH => ChannelType::Emg,
            FIFFV_STIM_CH => ChannelType::Stim,
            FIFFV_RESP_CH => ChannelType::Resp,
            FIFFV_MISC_CH => ChannelType::Misc,
            FIFFV_EYETRACK_CH if coil_type == FIFFV_COIL_EYETRACK_PUPIL => ChannelType::Pupil,
            FIFFV_EYETRACK_CH => ChannelType::Eyegaze,
            _ => return None,
        })
    }

    /// Hardware descriptor (FIFF coil type) that must accompany this type.
    pub fn hardware_descriptor(&self) -> Option<i32> {
        match self {
            ChannelType::Eyegaze => Some(FIFFV_COIL_EYETRACK_POS),
            ChannelType::Pupil => Some(FIFFV_COIL_EYETRACK_PUPIL),
            _ => None,
        }
    }
}

// ── Rules ─────────────────────────────────────────────────────────────────

/// One classification rule: a channel name (exact table) or name prefix
/// (prefix table) and the type it assigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRule {
    pub pattern: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
}

impl ChannelRule {
    pub fn new(pattern: impl Into<String>, channel_type: ChannelType) -> Self {
        Self { pattern: pattern.into(), channel_type }
    }
}

// ── Classification ────────────────────────────────────────────────────────

/// Channel name → type, restricted to channels present in the recording and
/// kept in recording order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelTypeMap {
    entries: Vec<(String, ChannelType)>,
}

impl ChannelTypeMap {
    pub fn get(&self, name: &str) -> Option<ChannelType> {
        self.entries.iter().find(|(n, _)| n == name).map(|&(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ChannelType)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), *t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Classify `names` with the exact and prefix rule tables.
///
/// Channels matching no rule are absent from the result and keep whatever
/// type the recording already assigns them.
pub fn classify_channels<S: AsRef<str>>(
    names: &[S],
    exact: &[ChannelRule],
    prefix: &[ChannelRule],
) -> ChannelTypeMap {
    let mut map = ChannelTypeMap::default();
    for name in names {
        let name = name.as_ref();
        if map.get(name).is_some() {
            continue;
        }
        let matched = exact
            .iter()
            .find(|r| r.pattern == name)
            .or_else(|| prefix.iter().find(|r| name.starts_with(r.pattern.as_str())));
        if let Some(rule) = matched {
            map.entries.push((name.to_string(), rule.channel_type));
        }
    }
    map
}

/// Write the classification into `recording`, including the hardware
/// descriptor for eye-tracker channels.
pub fn apply_channel_types<R: Recording + ?Sized>(
    recording: &mut R,
    map: &ChannelTypeMap,
) -> Result<()> {
    for (name, ty) in map.iter() {
        recording.set_channel_type(name, ty)?;
        if let Some(coil) = ty.hardware_descriptor() {
            recording.set_hardware_descriptor(name, coil)?;
        }
    }
    if !map.is_empty() {
        tracing::debug!(n_channels = map.len(), "applied channel types");
    }
    Ok(())
}
