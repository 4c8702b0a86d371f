//! Native FIFF support: reads the measurement info of a `.fif` recording
//! and writes converted copies, compatible with
//! [MNE-Python](https://mne.tools).
//!
//! # Quick start
//! ```no_run
//! use megbids::fiff::open_recording;
//! use megbids::recording::Recording;
//!
//! let rec = open_recording("raw/C01/C01_run1.fif".as_ref()).unwrap();
//! println!("{} channels @ {} Hz", rec.info.n_chan, rec.info.sfreq);
//! println!("events: {:?}", rec.annotations());
//! ```
pub mod backend;
pub mod constants;
pub mod info;
pub mod tag;
pub mod tree;

// Re-export the most commonly used items.
pub use backend::{open_recording, FifBackend, FifRecording};
pub use info::{read_annotations, read_meas_info, ChannelInfo, MeasDateStamp, MeasInfo};
pub use tag::{
    TagHeader, read_tag_header,
    read_i32, read_f32, read_string, read_i32_array, read_raw_bytes, read_directory,
    patch_payload, patch_i32, patch_f32,
};
pub use tree::{Node, load_directory, read_tree, scan_directory, try_load_directory};
