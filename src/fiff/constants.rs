//! FIFF format constants.
//!
//! Names mirror [`mne/_fiff/constants.py`][mne-src] so the code can be
//! cross-referenced with MNE.  Only the subset touched by the converter is
//! listed: block kinds needed to find the measurement info and annotations,
//! the tags that are read or patched, and the channel-kind / coil codes the
//! classifier assigns.
//!
//! Every piece of data in a FIF file is wrapped in a **tag**, a 16-byte
//! header (`kind`, `type`, `size`, `next`) followed by a payload.  Tags are
//! grouped into **blocks** by `FIFF_BLOCK_START` / `FIFF_BLOCK_END` sentinel
//! tags, forming a tree.
//!
//! [mne-src]: https://github.com/mne-tools/mne-python/blob/main/mne/_fiff/constants.py

#![allow(dead_code)]

// ── Block kinds ───────────────────────────────────────────────────────────

/// Measurement block, the top-level container for one recording.
pub const FIFFB_MEAS:            i32 = 100;
/// Measurement-info block: channel metadata, sfreq, dates.
pub const FIFFB_MEAS_INFO:       i32 = 101;
/// Raw (continuous) data block.
pub const FIFFB_RAW_DATA:        i32 = 102;
/// Continuous data block (alias used by some acquisition systems).
pub const FIFFB_CONTINUOUS_DATA: i32 = 112;
/// MNE annotations block (onsets, durations, `:`-joined descriptions).
pub const FIFFB_MNE_ANNOTATIONS: i32 = 3810;

// ── Tag kinds: structural ─────────────────────────────────────────────────

/// Unique file identifier (first tag in every FIF file).
pub const FIFF_FILE_ID:         i32 = 100;
/// Pointer to the embedded tag directory (second tag, payload = byte offset).
pub const FIFF_DIR_POINTER:     i32 = 101;
/// Block identifier payload (inside `FIFF_BLOCK_START`).
pub const FIFF_BLOCK_ID:        i32 = 103;
/// Opens a new block; payload = block kind (i32).
pub const FIFF_BLOCK_START:     i32 = 104;
/// Closes the most recently opened block.
pub const FIFF_BLOCK_END:       i32 = 105;
/// Parent block identifier.
pub const FIFF_PARENT_BLOCK_ID: i32 = 110;

// ── Tag kinds: measurement info ───────────────────────────────────────────

/// Number of channels (i32).
pub const FIFF_NCHAN:        i32 = 200;
/// Sampling frequency in Hz (f32).
pub const FIFF_SFREQ:        i32 = 201;
/// Channel info struct (one per channel; see [`super::info::ChannelInfo`]).
pub const FIFF_CH_INFO:      i32 = 203;
/// Measurement date: two i32, seconds and microseconds since the Unix epoch.
pub const FIFF_MEAS_DATE:    i32 = 204;
/// Free-text comment (string).  Inside `FIFFB_MNE_ANNOTATIONS` it holds the
/// annotation descriptions.
pub const FIFF_COMMENT:      i32 = 206;
/// Online lowpass cutoff in Hz (f32); may be NaN if not set.
pub const FIFF_LOWPASS:      i32 = 219;
/// Colon-separated list of bad channel names (string).
pub const FIFF_BAD_CHS:      i32 = 220;
/// Online highpass cutoff in Hz (f32); may be NaN if not set.
pub const FIFF_HIGHPASS:     i32 = 223;
/// Power-line frequency in Hz (f32).
pub const FIFF_LINE_FREQ:    i32 = 235;

// ── Tag kinds: data buffers ───────────────────────────────────────────────

/// One buffer of raw signal samples (interleaved `[n_samp, n_chan]`).
pub const FIFF_DATA_BUFFER:  i32 = 300;

// ── Tag payload types (the `type` field of a tag header) ──────────────────

/// Void / no payload.
pub const FIFFT_VOID:              u32 = 0;
/// Big-endian signed 16-bit integer.
pub const FIFFT_SHORT:             u32 = 2;
/// Big-endian signed 32-bit integer.
pub const FIFFT_INT:               u32 = 3;
/// Big-endian IEEE 754 single-precision float (4 bytes).
pub const FIFFT_FLOAT:             u32 = 4;
/// Big-endian IEEE 754 double-precision float (8 bytes).
pub const FIFFT_DOUBLE:            u32 = 5;
/// Latin-1 (ISO 8859-1) string, **not** NUL-terminated.
pub const FIFFT_STRING:            u32 = 10;
/// 16-bit DAU packed sample (same wire width as `FIFFT_SHORT`).
pub const FIFFT_DAU_PACK16:        u32 = 16;
/// Complex single-precision (real f32 + imag f32, 8 bytes).
pub const FIFFT_COMPLEX_FLOAT:     u32 = 20;
/// Complex double-precision (real f64 + imag f64, 16 bytes).
pub const FIFFT_COMPLEX_DOUBLE:    u32 = 21;
/// 96-byte channel info struct (see [`super::info::ChannelInfo`]).
pub const FIFFT_CH_INFO_STRUCT:    u32 = 30;
/// File-ID struct: version, 8-byte machine id, secs, usecs (20 bytes).
pub const FIFFT_ID_STRUCT:         u32 = 31;
/// Tag-directory entry struct (16 bytes per entry).
pub const FIFFT_DIR_ENTRY_STRUCT:  u32 = 32;

/// Byte offset of the `secs` field inside a `FIFFT_ID_STRUCT` payload.
pub const ID_STRUCT_SECS_OFFSET: u64 = 12;

// ── `next` field sentinels in a tag header ────────────────────────────────

/// The next tag follows immediately: `next_pos = pos + 16 + size`.
pub const FIFFV_NEXT_SEQ:  i32 = 0;
/// There is no next tag (end of sequence / block).
pub const FIFFV_NEXT_NONE: i32 = -1;

// ── Channel kind codes (`ChannelInfo::kind`) ──────────────────────────────

/// MEG magnetometer or gradiometer channel.
pub const FIFFV_MEG_CH:      i32 = 1;
/// EEG scalp-potential channel.
pub const FIFFV_EEG_CH:      i32 = 2;
/// Stimulus / trigger channel.
pub const FIFFV_STIM_CH:     i32 = 3;
/// Electro-oculogram channel.
pub const FIFFV_EOG_CH:      i32 = 202;
/// MEG reference (compensation) channel.
pub const FIFFV_REF_MEG_CH:  i32 = 301;
/// Electromyogram channel.
pub const FIFFV_EMG_CH:      i32 = 302;
/// Electrocardiogram channel.
pub const FIFFV_ECG_CH:      i32 = 402;
/// Miscellaneous auxiliary channel.
pub const FIFFV_MISC_CH:     i32 = 502;
/// Respiration channel.
pub const FIFFV_RESP_CH:     i32 = 602;
/// Eye-tracker channel; the coil type separates gaze from pupil.
pub const FIFFV_EYETRACK_CH: i32 = 1001;

// ── Coil types (`ChannelInfo::coil_type`) ─────────────────────────────────

/// No coil (non-MEG channels).
pub const FIFFV_COIL_NONE:           i32 = 0;
/// Eye-tracker gaze position.
pub const FIFFV_COIL_EYETRACK_POS:   i32 = 400;
/// Eye-tracker pupil size.
pub const FIFFV_COIL_EYETRACK_PUPIL: i32 = 401;

// ── Helpers ───────────────────────────────────────────────────────────────

/// Return the number of bytes occupied by one sample of the given tag type.
///
/// Returns `None` for types that do not represent scalar numeric samples
/// (e.g. strings, structs).
///
/// # Examples
///
/// ```
/// use megbids::fiff::constants::{bytes_per_sample, FIFFT_FLOAT, FIFFT_DOUBLE, FIFFT_SHORT};
/// assert_eq!(bytes_per_sample(FIFFT_FLOAT),  Some(4));
/// assert_eq!(bytes_per_sample(FIFFT_DOUBLE), Some(8));
/// assert_eq!(bytes_per_sample(FIFFT_SHORT),  Some(2));
/// assert_eq!(bytes_per_sample(99),            None);
/// ```
pub fn bytes_per_sample(tag_type: u32) -> Option<usize> {
    match tag_type {
        FIFFT_DAU_PACK16 | FIFFT_SHORT  => Some(2),
        FIFFT_FLOAT                     => Some(4),
        FIFFT_DOUBLE                    => Some(8),
        FIFFT_INT                       => Some(4),
        FIFFT_COMPLEX_FLOAT             => Some(8),
        FIFFT_COMPLEX_DOUBLE            => Some(16),
        _                               => None,
    }
}
