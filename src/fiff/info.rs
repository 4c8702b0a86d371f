//! Measurement info (MNE's `Info` struct) read from a FIF file.
//!
//! Only the fields the converter reads or patches are extracted.  Each
//! patchable value keeps the [`TagHeader`] it came from so the writer can
//! overwrite the payload in place.
use std::io::{Read, Seek};
use anyhow::{bail, Result};

use super::constants::*;
use super::tag::*;
use super::tree::Node;

// ── Channel info ─────────────────────────────────────────────────────────

/// Channel info, parsed from a `FIFFT_CH_INFO_STRUCT` (30) tag.
///
/// On-disk layout (big-endian):
/// ```text
///  4  scanno       i32
///  4  logno        i32
///  4  kind         i32
///  4  range        f32
///  4  cal          f32
///  4  coil_type    i32
/// 48  loc          12 × f32
///  4  unit         i32
///  4  unit_mul     i32
/// 16  ch_name      16 × u8 (null-padded Latin-1)
/// ─────────────────
/// 96 bytes
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub scan_no:   i32,
    pub log_no:    i32,
    pub kind:      i32,
    pub range:     f32,
    pub cal:       f32,
    pub coil_type: i32,
    /// Position + orientation: `[x, y, z, nx0, ny0, nz0, …]` in metres.
    pub loc:       [f32; 12],
    pub unit:      i32,
    pub unit_mul:  i32,
    pub name:      String,
}

impl ChannelInfo {
    /// Size of the on-disk struct.
    pub const SIZE: usize = 96;
    /// Byte offset of `kind` in the on-disk struct.
    pub const KIND_OFFSET: u64 = 8;
    /// Byte offset of `coil_type` in the on-disk struct.
    pub const COIL_TYPE_OFFSET: u64 = 20;

    /// Parse from the 96-byte payload of a FIFFT_CH_INFO_STRUCT tag.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < Self::SIZE {
            bail!("ch_info payload too short: {} bytes (need 96)", raw.len());
        }
        let i32_at = |o: usize| i32::from_be_bytes([raw[o], raw[o + 1], raw[o + 2], raw[o + 3]]);
        let f32_at = |o: usize| f32::from_be_bytes([raw[o], raw[o + 1], raw[o + 2], raw[o + 3]]);

        let mut loc = [0f32; 12];
        for (i, v) in loc.iter_mut().enumerate() {
            *v = f32_at(24 + i * 4);
        }
        // Channel name: null-terminated Latin-1, 16 bytes
        let name_bytes = &raw[80..96];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(16);
        let name = name_bytes[..end].iter().map(|&b| b as char).collect();
        Ok(ChannelInfo {
            scan_no:   i32_at(0),
            log_no:    i32_at(4),
            kind:      i32_at(8),
            range:     f32_at(12),
            cal:       f32_at(16),
            coil_type: i32_at(20),
            loc,
            unit:      i32_at(72),
            unit_mul:  i32_at(76),
            name,
        })
    }

    /// Encode back into the 96-byte wire form.  The name field holds 16
    /// bytes; shorter names are NUL-terminated, longer ones truncated.
    pub fn to_bytes(&self) -> [u8; 96] {
        let mut out = [0u8; 96];
        out[0..4].copy_from_slice(&self.scan_no.to_be_bytes());
        out[4..8].copy_from_slice(&self.log_no.to_be_bytes());
        out[8..12].copy_from_slice(&self.kind.to_be_bytes());
        out[12..16].copy_from_slice(&self.range.to_be_bytes());
        out[16..20].copy_from_slice(&self.cal.to_be_bytes());
        out[20..24].copy_from_slice(&self.coil_type.to_be_bytes());
        for (i, v) in self.loc.iter().enumerate() {
            out[24 + i * 4..28 + i * 4].copy_from_slice(&v.to_be_bytes());
        }
        out[72..76].copy_from_slice(&self.unit.to_be_bytes());
        out[76..80].copy_from_slice(&self.unit_mul.to_be_bytes());
        let latin1: Vec<u8> = self.name.chars().map(|c| u8::try_from(c).unwrap_or(b'?')).take(16).collect();
        out[80..80 + latin1.len()].copy_from_slice(&latin1);
        out
    }
}

// ── Measurement info ─────────────────────────────────────────────────────

/// `FIFF_MEAS_DATE` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasDateStamp {
    pub secs:  i32,
    pub usecs: i32,
}

/// Measurement metadata extracted from `FIFFB_MEAS_INFO`.
#[derive(Debug, Clone)]
pub struct MeasInfo {
    pub n_chan:       usize,
    pub sfreq:        f64,
    pub lowpass:      Option<f64>,
    pub highpass:     Option<f64>,
    pub line_freq:    Option<f64>,
    pub meas_date:    Option<MeasDateStamp>,
    pub chs:          Vec<ChannelInfo>,
    pub bad_ch_names: Vec<String>,
    /// Tag of each entry in `chs`, same order.
    pub ch_tags:        Vec<TagHeader>,
    pub meas_date_tag:  Option<TagHeader>,
    pub line_freq_tag:  Option<TagHeader>,
}

impl MeasInfo {
    /// Channel names in order.
    pub fn ch_names(&self) -> Vec<&str> {
        self.chs.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelInfo> {
        self.chs.iter().find(|c| c.name == name)
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut ChannelInfo> {
        self.chs.iter_mut().find(|c| c.name == name)
    }
}

/// Read `MeasInfo` from an open FIF file given the tree.
pub fn read_meas_info<R: Read + Seek>(reader: &mut R, tree: &Node) -> Result<MeasInfo> {
    let meas_node = tree
        .find_block(FIFFB_MEAS)
        .ok_or_else(|| anyhow::anyhow!("FIFFB_MEAS block not found"))?;
    let info_node = meas_node
        .find_block(FIFFB_MEAS_INFO)
        .ok_or_else(|| anyhow::anyhow!("FIFFB_MEAS_INFO block not found"))?;

    let mut n_chan        = None::<usize>;
    let mut sfreq         = None::<f64>;
    let mut lowpass       = None::<f64>;
    let mut highpass      = None::<f64>;
    let mut line_freq     = None::<f64>;
    let mut meas_date     = None::<MeasDateStamp>;
    let mut chs           = Vec::<ChannelInfo>::new();
    let mut ch_tags       = Vec::<TagHeader>::new();
    let mut bad_ch_names  = Vec::<String>::new();
    let mut meas_date_tag = None::<TagHeader>;
    let mut line_freq_tag = None::<TagHeader>;

    let finite = |v: f32| v.is_finite().then_some(v as f64);

    for ent in &info_node.entries {
        match ent.kind {
            FIFF_NCHAN => n_chan = Some(usize::try_from(read_i32(reader, ent)?)?),
            FIFF_SFREQ => sfreq = Some(read_f32(reader, ent)? as f64),
            FIFF_LOWPASS => lowpass = finite(read_f32(reader, ent)?),
            FIFF_HIGHPASS => highpass = finite(read_f32(reader, ent)?),
            FIFF_LINE_FREQ => {
                line_freq = finite(read_f32(reader, ent)?);
                line_freq_tag = Some(*ent);
            }
            FIFF_MEAS_DATE => {
                // [secs, usecs]; a single int is an old-style seconds-only stamp.
                let v = read_i32_array(reader, ent)?;
                if let Some(&secs) = v.first() {
                    meas_date = Some(MeasDateStamp { secs, usecs: v.get(1).copied().unwrap_or(0) });
                    meas_date_tag = Some(*ent);
                }
            }
            FIFF_CH_INFO => {
                let raw = read_raw_bytes(reader, ent)?;
                chs.push(ChannelInfo::from_bytes(&raw)?);
                ch_tags.push(*ent);
            }
            FIFF_BAD_CHS => {
                // List of bad channel names separated by colons.
                let s = read_string(reader, ent)?;
                bad_ch_names = s
                    .split(':')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => {}
        }
    }

    let n_chan = n_chan.ok_or_else(|| anyhow::anyhow!("FIFF_NCHAN not found"))?;
    let sfreq  = sfreq.ok_or_else(|| anyhow::anyhow!("FIFF_SFREQ not found"))?;

    if chs.len() != n_chan {
        bail!("expected {n_chan} ch_info structs, got {}", chs.len());
    }

    Ok(MeasInfo {
        n_chan, sfreq, lowpass, highpass, line_freq, meas_date, chs, bad_ch_names,
        ch_tags, meas_date_tag, line_freq_tag,
    })
}

/// Annotation descriptions from every `FIFFB_MNE_ANNOTATIONS` block, one
/// entry per annotation, in file order.
///
/// MNE joins descriptions with `:` and stores literal colons as `;`.
pub fn read_annotations<R: Read + Seek>(reader: &mut R, tree: &Node) -> Result<Vec<String>> {
    let mut labels = Vec::new();
    for block in tree.find_blocks(FIFFB_MNE_ANNOTATIONS) {
        if let Some(tag) = block.find_tag(FIFF_COMMENT) {
            let joined = read_string(reader, tag)?;
            let mut parts: Vec<&str> = joined.split(':').collect();
            // a terminating separator leaves one empty tail, not an annotation
            if parts.last() == Some(&"") {
                parts.pop();
            }
            labels.extend(parts.into_iter().map(|s| s.replace(';', ":")));
        }
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ch_info_from_bytes_basic() {
        // Construct a minimal 96-byte payload.
        let mut raw = vec![0u8; 96];
        // kind = 402 (FIFFV_ECG_CH)
        raw[8..12].copy_from_slice(&402_i32.to_be_bytes());
        // range = 1.0
        raw[12..16].copy_from_slice(&1_f32.to_be_bytes());
        // coil = 400
        raw[20..24].copy_from_slice(&400_i32.to_be_bytes());
        // loc[0] = 0.5
        raw[24..28].copy_from_slice(&0.5_f32.to_be_bytes());
        raw[80..84].copy_from_slice(b"ECG\0");

        let ch = ChannelInfo::from_bytes(&raw).unwrap();
        assert_eq!(ch.kind, FIFFV_ECG_CH);
        assert_eq!(ch.coil_type, FIFFV_COIL_EYETRACK_POS);
        approx::assert_abs_diff_eq!(ch.range, 1.0_f32, epsilon = 1e-7);
        approx::assert_abs_diff_eq!(ch.loc[0], 0.5_f32, epsilon = 1e-7);
        assert_eq!(ch.name, "ECG");
        assert_eq!(ch.to_bytes().to_vec(), raw);
    }

    #[test]
    fn ch_info_too_short() {
        assert!(ChannelInfo::from_bytes(&[0u8; 95]).is_err());
    }

    #[test]
    fn name_field_holds_sixteen_characters() {
        let raw = [0u8; 96];
        let mut ch = ChannelInfo::from_bytes(&raw).unwrap();
        ch.name = "MISC001-2104ABCD".into();
        let back = ChannelInfo::from_bytes(&ch.to_bytes()).unwrap();
        assert_eq!(back.name, "MISC001-2104ABCD");

        ch.name = "ABCDEFGHIJKLMNOPQRST".into();
        let back = ChannelInfo::from_bytes(&ch.to_bytes()).unwrap();
        assert_eq!(back.name, "ABCDEFGHIJKLMNOP");
    }

    #[test]
    fn field_offsets_match_decoder() {
        let mut raw = [0u8; 96];
        let k = ChannelInfo::KIND_OFFSET as usize;
        let c = ChannelInfo::COIL_TYPE_OFFSET as usize;
        raw[k..k + 4].copy_from_slice(&FIFFV_STIM_CH.to_be_bytes());
        raw[c..c + 4].copy_from_slice(&FIFFV_COIL_EYETRACK_PUPIL.to_be_bytes());
        let ch = ChannelInfo::from_bytes(&raw).unwrap();
        assert_eq!(ch.kind, FIFFV_STIM_CH);
        assert_eq!(ch.coil_type, FIFFV_COIL_EYETRACK_PUPIL);
    }
}
