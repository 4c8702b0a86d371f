//! FIFF implementation of [`Recording`] / [`RecordingBackend`].
//!
//! # Read
//! 1. Load the tag directory (embedded dir tag, else a sequential scan).
//! 2. Build the block tree.
//! 3. Read `MeasInfo` and the MNE annotation descriptions.
//! 4. Count samples in the raw-data buffers for the recording duration.
//!
//! # Write
//! ```text
//! source.fif ──copy──▶ sub-001/meg/sub-001_task-x_meg.fif
//!                        ├─ FIFF_CH_INFO      kind + coil rewritten
//!                        ├─ FIFF_MEAS_DATE    secs − days_back·86400
//!                        ├─ FIFFT_ID_STRUCT   secs shifted likewise
//!                        └─ FIFF_LINE_FREQ    overwritten when present
//!                      + _meg.json, _channels.tsv, _coordsystem.json, _scans.tsv
//! ```
//!
//! Every patch keeps the payload size, so signal data is never touched and
//! the tag chain stays valid.  A file without a `FIFF_LINE_FREQ` tag keeps
//! no line frequency on disk; the value still reaches `*_meg.json`.
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::anonymize::{AnonymizationParams, MeasDate};
use crate::bids_path::BidsPath;
use crate::channels::ChannelType;
use crate::config::ConversionConfig;
use crate::dataset::{upsert_scans, NA};
use crate::error::{Error, Result};
use crate::recording::{Recording, RecordingBackend};
use crate::sidecar;

use super::constants::*;
use super::info::{read_annotations, read_meas_info, ChannelInfo, MeasInfo};
use super::tag::{patch_f32, patch_i32, read_raw_bytes, TagHeader};
use super::tree::{load_directory, read_tree, Node};

// ── FifRecording ─────────────────────────────────────────────────────────

/// An opened FIF recording.  Channel and line-frequency edits are held in
/// memory until [`FifBackend::write_converted`].
#[derive(Debug, Clone)]
pub struct FifRecording {
    pub path:        PathBuf,
    pub info:        MeasInfo,
    pub annotations: Vec<String>,
    /// Samples in the raw-data buffers, if a raw-data block exists.
    pub n_times:     Option<usize>,
    directory:       Vec<TagHeader>,
}

impl FifRecording {
    pub fn duration_secs(&self) -> Option<f64> {
        self.n_times.map(|n| n as f64 / self.info.sfreq)
    }

    fn channel_mut(&mut self, name: &str) -> Result<&mut ChannelInfo> {
        self.info
            .channel_mut(name)
            .ok_or_else(|| Error::NotFound(format!("channel {name} not in recording")))
    }
}

/// Open a `.fif` file and read its metadata.  Signal data is not loaded.
pub fn open_recording(path: &Path) -> anyhow::Result<FifRecording> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let directory = load_directory(&mut reader)?;
    let tree = read_tree(&mut reader, &directory)?;
    let info = read_meas_info(&mut reader, &tree)
        .with_context(|| format!("read measurement info of {}", path.display()))?;
    let annotations = read_annotations(&mut reader, &tree)?;
    let n_times = count_samples(&tree, info.n_chan);

    tracing::debug!(
        path = %path.display(),
        n_chan = info.n_chan,
        sfreq = info.sfreq,
        n_annotations = annotations.len(),
        "opened FIF recording"
    );
    Ok(FifRecording { path: path.to_path_buf(), info, annotations, n_times, directory })
}

/// Total samples over the `FIFF_DATA_BUFFER` tags of the raw-data block.
fn count_samples(tree: &Node, n_chan: usize) -> Option<usize> {
    if n_chan == 0 {
        return None;
    }
    let meas = tree.find_block(FIFFB_MEAS)?;
    let raw = meas
        .find_block(FIFFB_RAW_DATA)
        .or_else(|| meas.find_block(FIFFB_CONTINUOUS_DATA))?;
    Some(
        raw.entries
            .iter()
            .filter(|e| e.kind == FIFF_DATA_BUFFER)
            .filter_map(|e| {
                let bps = bytes_per_sample(e.ftype)?;
                Some(e.size.max(0) as usize / (bps * n_chan))
            })
            .sum(),
    )
}

impl Recording for FifRecording {
    fn channel_names(&self) -> Vec<String> {
        self.info.chs.iter().map(|c| c.name.clone()).collect()
    }

    fn channel_type(&self, name: &str) -> Option<ChannelType> {
        let ch = self.info.channel(name)?;
        ChannelType::from_fiff(ch.kind, ch.coil_type)
    }

    fn set_channel_type(&mut self, name: &str, ty: ChannelType) -> Result<()> {
        self.channel_mut(name)?.kind = ty.fiff_kind();
        Ok(())
    }

    fn hardware_descriptor(&self, name: &str) -> Option<i32> {
        self.info.channel(name).map(|c| c.coil_type)
    }

    fn set_hardware_descriptor(&mut self, name: &str, coil_type: i32) -> Result<()> {
        self.channel_mut(name)?.coil_type = coil_type;
        Ok(())
    }

    fn annotations(&self) -> Vec<String> {
        self.annotations.clone()
    }

    fn meas_date(&self) -> Option<MeasDate> {
        self.info.meas_date.map(|d| MeasDate::Stamp { secs: d.secs as i64, usecs: d.usecs as i64 })
    }

    fn line_freq(&self) -> Option<f64> {
        self.info.line_freq
    }

    fn set_line_freq(&mut self, hz: f64) {
        self.info.line_freq = Some(hz);
    }
}

// ── Sidecar payloads ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MegSidecar {
    task_name: String,
    sampling_frequency: f64,
    power_line_frequency: Value,
    dewar_position: &'static str,
    software_filters: &'static str,
    digitized_landmarks: bool,
    digitized_head_points: bool,
    #[serde(rename = "MEGChannelCount")]
    meg_channel_count: usize,
    #[serde(rename = "MEGREFChannelCount")]
    meg_ref_channel_count: usize,
    #[serde(rename = "EEGChannelCount")]
    eeg_channel_count: usize,
    #[serde(rename = "EOGChannelCount")]
    eog_channel_count: usize,
    #[serde(rename = "ECGChannelCount")]
    ecg_channel_count: usize,
    #[serde(rename = "EMGChannelCount")]
    emg_channel_count: usize,
    misc_channel_count: usize,
    trigger_channel_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    recording_duration: Option<f64>,
    recording_type: &'static str,
}

// ── FifBackend ───────────────────────────────────────────────────────────

/// Reads `.fif` recordings and writes converted copies.
#[derive(Debug, Clone)]
pub struct FifBackend {
    config: ConversionConfig,
}

impl FifBackend {
    pub fn new(config: &ConversionConfig) -> Self {
        Self { config: config.clone() }
    }

    fn bids_type(&self, ty: Option<ChannelType>) -> &str {
        self.config.bids_channel_type(ty.unwrap_or(ChannelType::Misc))
    }

    fn write_meg_json(&self, rec: &FifRecording, dest: &BidsPath) -> Result<PathBuf> {
        let mut counts: BTreeMap<ChannelType, usize> = BTreeMap::new();
        for name in rec.channel_names() {
            *counts.entry(rec.channel_type(&name).unwrap_or(ChannelType::Misc)).or_default() += 1;
        }
        let n = |ty: ChannelType| counts.get(&ty).copied().unwrap_or(0);

        let payload = MegSidecar {
            task_name: dest.task.clone(),
            sampling_frequency: rec.info.sfreq,
            power_line_frequency: rec.info.line_freq.map_or(Value::from(NA), Value::from),
            dewar_position: NA,
            software_filters: NA,
            digitized_landmarks: false,
            digitized_head_points: false,
            meg_channel_count: n(ChannelType::Meg),
            meg_ref_channel_count: n(ChannelType::RefMeg),
            eeg_channel_count: n(ChannelType::Eeg),
            eog_channel_count: n(ChannelType::Eog),
            ecg_channel_count: n(ChannelType::Ecg),
            emg_channel_count: n(ChannelType::Emg),
            misc_channel_count: n(ChannelType::Misc)
                + n(ChannelType::Resp)
                + n(ChannelType::Eyegaze)
                + n(ChannelType::Pupil),
            trigger_channel_count: n(ChannelType::Stim),
            recording_duration: rec.duration_secs(),
            recording_type: "continuous",
        };
        let path = dest.file("meg", "json");
        std::fs::write(&path, sidecar::to_pretty_string(&payload)?)?;
        Ok(path)
    }

    fn write_channels_tsv(&self, rec: &FifRecording, dest: &BidsPath) -> Result<PathBuf> {
        let cutoff = |v: Option<f64>| v.map_or_else(|| NA.to_string(), |hz| hz.to_string());
        let low = cutoff(rec.info.highpass);
        let high = cutoff(rec.info.lowpass);

        let mut out = String::from(
            "name\ttype\tunits\tlow_cutoff\thigh_cutoff\tsampling_frequency\tstatus\n",
        );
        for ch in &rec.info.chs {
            let ty = ChannelType::from_fiff(ch.kind, ch.coil_type);
            let status = if rec.info.bad_ch_names.contains(&ch.name) { "bad" } else { "good" };
            out.push_str(&format!(
                "{}\t{}\t{}\t{low}\t{high}\t{}\t{status}\n",
                ch.name,
                self.bids_type(ty),
                ty.map_or(NA, |t| t.units()),
                rec.info.sfreq,
            ));
        }
        let path = dest.file("channels", "tsv");
        std::fs::write(&path, out)?;
        Ok(path)
    }

    /// Merge the MEG coordinate keys; digitization keys written by a later
    /// headshape pass survive a re-conversion.
    fn write_coordsystem(&self, dest: &BidsPath) -> Result<PathBuf> {
        let path = dest.coordsystem_file();
        let mut object = sidecar::read_object_or_empty(&path)?;
        object.insert("MEGCoordinateSystem".into(), Value::from(self.config.coordinate_system.as_str()));
        object.insert("MEGCoordinateUnits".into(), Value::from("m"));
        sidecar::write_object(&path, &object)?;
        Ok(path)
    }
}

impl RecordingBackend for FifBackend {
    type Handle = FifRecording;

    fn read_recording(&self, path: &Path) -> Result<FifRecording> {
        Ok(open_recording(path)?)
    }

    fn write_converted(
        &self,
        handle: &FifRecording,
        dest: &BidsPath,
        anonymize: Option<&AnonymizationParams>,
        overwrite: bool,
    ) -> Result<PathBuf> {
        let out = dest.file("meg", "fif");
        if out.exists() && !overwrite {
            return Err(Error::AlreadyExists(out));
        }
        std::fs::create_dir_all(dest.datatype_dir())?;
        copy_contents(&handle.path, &out)?;
        let acq_time = patch_copy(&out, handle, anonymize)
            .with_context(|| format!("patch {}", out.display()))?;

        self.write_meg_json(handle, dest)?;
        self.write_channels_tsv(handle, dest)?;
        self.write_coordsystem(dest)?;
        upsert_scans(&dest.scans_file(), &dest.scans_entry(&out), acq_time)?;

        tracing::info!(
            src = %handle.path.display(),
            dst = %out.display(),
            days_back = anonymize.map(|a| a.days_back),
            "wrote converted recording"
        );
        Ok(out)
    }
}

/// Copy bytes only; the destination gets default permissions so it can be
/// patched even when the raw archive is read-only.
fn copy_contents(src: &Path, dst: &Path) -> Result<()> {
    let mut reader = File::open(src)?;
    let mut writer = File::create(dst)?;
    std::io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(())
}

fn shift_secs(secs: i32, shift: i64) -> anyhow::Result<i32> {
    i32::try_from(secs as i64 - shift)
        .map_err(|_| anyhow!("shifting {secs} s back by {shift} s leaves the FIFF date range"))
}

/// Apply channel, line-frequency and date edits to the copy at `out`.
/// Returns the (shifted) acquisition time.
fn patch_copy(
    out: &Path,
    rec: &FifRecording,
    anonymize: Option<&AnonymizationParams>,
) -> anyhow::Result<Option<DateTime<Utc>>> {
    let mut file = OpenOptions::new().read(true).write(true).open(out)?;

    // only kind and coil change; the name and calibration bytes stay as read
    for (ch, tag) in rec.info.chs.iter().zip(&rec.info.ch_tags) {
        patch_i32(&mut file, tag, ChannelInfo::KIND_OFFSET, ch.kind)?;
        patch_i32(&mut file, tag, ChannelInfo::COIL_TYPE_OFFSET, ch.coil_type)?;
    }

    match (rec.info.line_freq, rec.info.line_freq_tag) {
        (Some(hz), Some(tag)) => patch_f32(&mut file, &tag, 0, hz as f32)?,
        (Some(hz), None) => tracing::debug!(hz, "no FIFF_LINE_FREQ tag to patch"),
        _ => {}
    }

    let shift = anonymize.map_or(0, |a| a.shift_secs());
    let mut acq_time = None;
    if let (Some(stamp), Some(tag)) = (rec.info.meas_date, rec.info.meas_date_tag) {
        let secs = shift_secs(stamp.secs, shift)?;
        if shift != 0 {
            patch_i32(&mut file, &tag, 0, secs)?;
        }
        let nanos = u32::try_from(stamp.usecs).unwrap_or(0).saturating_mul(1_000);
        acq_time = DateTime::<Utc>::from_timestamp(secs as i64, nanos);
    }

    if shift != 0 {
        for tag in rec.directory.iter().filter(|t| t.ftype == FIFFT_ID_STRUCT && t.size >= 20) {
            let raw = read_raw_bytes(&mut file, tag)?;
            let o = ID_STRUCT_SECS_OFFSET as usize;
            let secs = i32::from_be_bytes([raw[o], raw[o + 1], raw[o + 2], raw[o + 3]]);
            // 0 marks an id without a timestamp
            if secs != 0 {
                patch_i32(&mut file, tag, ID_STRUCT_SECS_OFFSET, shift_secs(secs, shift)?)?;
            }
        }
    }

    file.flush()?;
    Ok(acq_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_rejects_underflow() {
        assert_eq!(shift_secs(86_400, 86_400).unwrap(), 0);
        assert!(shift_secs(i32::MIN + 10, 100).is_err());
    }

    #[test]
    fn bids_type_uses_override_then_default() {
        let backend = FifBackend::new(&ConversionConfig::default());
        assert_eq!(backend.bids_type(Some(ChannelType::Meg)), "MEGGRADAXIAL");
        assert_eq!(backend.bids_type(Some(ChannelType::Pupil)), "PUPIL");
        assert_eq!(backend.bids_type(None), "MISC");
    }
}
