//! The narrow interface to the recording library.
//!
//! The pipeline never looks at a signal file's binary layout; it reads and
//! writes recordings through these two traits.  [`crate::fiff::FifBackend`]
//! is the backend shipped with the crate; [`InMemoryRecording`] is a handle
//! with no file behind it, used to exercise the classification and
//! conversion logic without a signal file.
use std::path::{Path, PathBuf};

use crate::anonymize::{AnonymizationParams, MeasDate};
use crate::bids_path::BidsPath;
use crate::channels::ChannelType;
use crate::error::{Error, Result};
use crate::fiff::constants::FIFFV_COIL_NONE;

/// An opened recording whose channel metadata can be edited before writing.
pub trait Recording {
    /// Channel names in acquisition order.
    fn channel_names(&self) -> Vec<String>;

    /// Current type of `name`, if the channel exists and has a known type.
    fn channel_type(&self, name: &str) -> Option<ChannelType>;

    fn set_channel_type(&mut self, name: &str, ty: ChannelType) -> Result<()>;

    /// Hardware descriptor (FIFF coil type) of `name`.
    fn hardware_descriptor(&self, name: &str) -> Option<i32>;

    fn set_hardware_descriptor(&mut self, name: &str, coil_type: i32) -> Result<()>;

    /// Annotation / event labels, one entry per occurrence.
    fn annotations(&self) -> Vec<String>;

    /// True measurement date, if the file records one.
    fn meas_date(&self) -> Option<MeasDate>;

    fn line_freq(&self) -> Option<f64>;

    fn set_line_freq(&mut self, hz: f64);
}

/// Opens raw recordings and writes converted ones.
pub trait RecordingBackend {
    type Handle: Recording;

    fn read_recording(&self, path: &Path) -> Result<Self::Handle>;

    /// Write `handle` to the location named by `dest`.  Returns the path of
    /// the written recording.
    fn write_converted(
        &self,
        handle: &Self::Handle,
        dest: &BidsPath,
        anonymize: Option<&AnonymizationParams>,
        overwrite: bool,
    ) -> Result<PathBuf>;
}

// ── In-memory handle ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryChannel {
    pub name: String,
    pub channel_type: Option<ChannelType>,
    pub coil_type: i32,
}

/// A recording held entirely in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryRecording {
    pub channels: Vec<InMemoryChannel>,
    pub annotations: Vec<String>,
    pub meas_date: Option<MeasDate>,
    pub line_freq: Option<f64>,
}

impl InMemoryRecording {
    /// Untyped channels with no coil, no annotations and no date.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: names
                .into_iter()
                .map(|n| InMemoryChannel {
                    name: n.into(),
                    channel_type: None,
                    coil_type: FIFFV_COIL_NONE,
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_annotations<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.annotations = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_meas_date(mut self, date: MeasDate) -> Self {
        self.meas_date = Some(date);
        self
    }

    fn channel_mut(&mut self, name: &str) -> Result<&mut InMemoryChannel> {
        self.channels
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::NotFound(format!("channel {name} not in recording")))
    }
}

impl Recording for InMemoryRecording {
    fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    fn channel_type(&self, name: &str) -> Option<ChannelType> {
        self.channels.iter().find(|c| c.name == name)?.channel_type
    }

    fn set_channel_type(&mut self, name: &str, ty: ChannelType) -> Result<()> {
        self.channel_mut(name)?.channel_type = Some(ty);
        Ok(())
    }

    fn hardware_descriptor(&self, name: &str) -> Option<i32> {
        self.channels.iter().find(|c| c.name == name).map(|c| c.coil_type)
    }

    fn set_hardware_descriptor(&mut self, name: &str, coil_type: i32) -> Result<()> {
        self.channel_mut(name)?.coil_type = coil_type;
        Ok(())
    }

    fn annotations(&self) -> Vec<String> {
        self.annotations.clone()
    }

    fn meas_date(&self) -> Option<MeasDate> {
        self.meas_date
    }

    fn line_freq(&self) -> Option<f64> {
        self.line_freq
    }

    fn set_line_freq(&mut self, hz: f64) {
        self.line_freq = Some(hz);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_channel_is_not_found() {
        let mut rec = InMemoryRecording::new(["MLC11"]);
        let err = rec.set_channel_type("ECG", ChannelType::Ecg).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn builder_sets_annotations_and_line_freq() {
        let mut rec = InMemoryRecording::new(["UPPT001"]).with_annotations(["CSminus", "Gen1"]);
        rec.set_line_freq(50.0);
        assert_eq!(rec.annotations(), ["CSminus", "Gen1"]);
        assert_eq!(rec.line_freq(), Some(50.0));
        assert_eq!(rec.channel_type("UPPT001"), None);
    }
}
