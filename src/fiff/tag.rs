//! FIFF tag I/O.
//!
//! A tag is the smallest structural unit of a FIF file.
//! On-disk layout (always big-endian):
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  kind : i32  │  type : u32  │  size : i32  │ next : i32 │  ← 16 bytes
//! ├──────────────────────────────────────────────────────┤
//! │  <size bytes of payload data>                        │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! `next == 0` means the next tag follows immediately (pos + 16 + size).
//! `next  > 0` means seek to byte offset `next`.
//! `next == -1` means there is no next tag (end of sequence).
//!
//! Besides the readers this module has the in-place patchers used by the
//! converter: a patch never changes a payload's size, so the tag chain and
//! the embedded directory stay valid.
use std::io::{Read, Seek, SeekFrom, Write};
use anyhow::{bail, Context, Result};

use super::constants::*;

/// Size of a tag header in bytes.
pub const TAG_HEADER_SIZE: u64 = 16;

// ── Tag header ────────────────────────────────────────────────────────────

/// Tag header only; the payload is read on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub kind: i32,
    pub ftype: u32,   // "type" is a Rust keyword
    pub size: i32,
    pub next: i32,
    pub pos: u64,     // byte offset of the header in the file
}

impl TagHeader {
    /// Byte position of the first payload byte.
    #[inline]
    pub fn data_pos(&self) -> u64 {
        self.pos + TAG_HEADER_SIZE
    }

    /// Position of the NEXT tag header (or `None` if this is the last tag).
    pub fn next_pos(&self) -> Option<u64> {
        if self.next == FIFFV_NEXT_SEQ {
            Some(self.pos + TAG_HEADER_SIZE + self.size.max(0) as u64)
        } else if self.next > 0 {
            Some(self.next as u64)
        } else {
            None // FIFFV_NEXT_NONE (-1) or any other negative
        }
    }
}

#[inline]
fn be_i32(b: &[u8], o: usize) -> i32 {
    i32::from_be_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}

#[inline]
fn be_u32(b: &[u8], o: usize) -> u32 {
    u32::from_be_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}

/// Read only the 16-byte tag header at the given file position.
pub fn read_tag_header<R: Read + Seek>(reader: &mut R, pos: u64) -> Result<TagHeader> {
    reader.seek(SeekFrom::Start(pos))
        .with_context(|| format!("seek to tag header @ {pos:#x}"))?;
    let mut buf = [0u8; 16];
    reader.read_exact(&mut buf)
        .with_context(|| format!("read tag header @ {pos:#x}"))?;
    Ok(TagHeader {
        kind:  be_i32(&buf, 0),
        ftype: be_u32(&buf, 4),
        size:  be_i32(&buf, 8),
        next:  be_i32(&buf, 12),
        pos,
    })
}

// ── Payload readers ───────────────────────────────────────────────────────

/// Read a single big-endian i32 payload.
pub fn read_i32<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<i32> {
    seek_data(reader, tag)?;
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

/// Read a single big-endian f32 payload.
pub fn read_f32<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<f32> {
    seek_data(reader, tag)?;
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_be_bytes(buf))
}

/// Read a Latin-1 string payload.
pub fn read_string<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<String> {
    let buf = read_raw_bytes(reader, tag)?;
    // FIFF strings are ISO-8859-1 / Latin-1; safe to decode byte-by-byte.
    Ok(buf.iter().map(|&b| b as char).collect())
}

/// Read a big-endian i32 array (one or more ints).
pub fn read_i32_array<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<Vec<i32>> {
    let buf = read_raw_bytes(reader, tag)?;
    Ok(buf.chunks_exact(4).map(|c| be_i32(c, 0)).collect())
}

/// Read the entire payload as raw bytes (used for struct payloads).
pub fn read_raw_bytes<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<Vec<u8>> {
    seek_data(reader, tag)?;
    let n = tag.size.max(0) as usize;
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf)
        .with_context(|| format!("read {n} payload bytes of tag {} @ {:#x}", tag.kind, tag.pos))?;
    Ok(buf)
}

// ── In-place patchers ─────────────────────────────────────────────────────

/// Overwrite `bytes` at `offset` within the payload of `tag`.
///
/// Fails if the write would run past the end of the payload.
pub fn patch_payload<W: Write + Seek>(
    writer: &mut W,
    tag: &TagHeader,
    offset: u64,
    bytes: &[u8],
) -> Result<()> {
    let end = offset + bytes.len() as u64;
    if end > tag.size.max(0) as u64 {
        bail!(
            "patch of {} bytes at +{offset} exceeds the {}-byte payload of tag {} @ {:#x}",
            bytes.len(),
            tag.size,
            tag.kind,
            tag.pos
        );
    }
    writer
        .seek(SeekFrom::Start(tag.data_pos() + offset))
        .with_context(|| format!("seek to patch tag {} @ {:#x}", tag.kind, tag.pos))?;
    writer.write_all(bytes)?;
    Ok(())
}

pub fn patch_i32<W: Write + Seek>(writer: &mut W, tag: &TagHeader, offset: u64, v: i32) -> Result<()> {
    patch_payload(writer, tag, offset, &v.to_be_bytes())
}

pub fn patch_f32<W: Write + Seek>(writer: &mut W, tag: &TagHeader, offset: u64, v: f32) -> Result<()> {
    patch_payload(writer, tag, offset, &v.to_be_bytes())
}

// ── Directory tag (FIFFT_DIR_ENTRY_STRUCT) ────────────────────────────────

/// Read a directory of tag headers embedded in a `FIFF_DIR_POINTER` tag.
/// Each entry is a 16-byte structure identical to a tag header, but the
/// `next` field stores the real file position of that tag.
pub fn read_directory<R: Read + Seek>(
    reader: &mut R,
    tag: &TagHeader,
) -> Result<Vec<TagHeader>> {
    if tag.ftype != FIFFT_DIR_ENTRY_STRUCT {
        bail!("expected FIFFT_DIR_ENTRY_STRUCT, got {}", tag.ftype);
    }
    let buf = read_raw_bytes(reader, tag)?;
    Ok(buf
        .chunks_exact(16)
        .map(|e| TagHeader {
            kind:  be_i32(e, 0),
            ftype: be_u32(e, 4),
            size:  be_i32(e, 8),
            next:  FIFFV_NEXT_NONE,
            pos:   be_u32(e, 12) as u64,
        })
        .collect())
}

// ── Helpers ───────────────────────────────────────────────────────────────

#[inline]
fn seek_data<R: Seek>(reader: &mut R, tag: &TagHeader) -> Result<()> {
    reader
        .seek(SeekFrom::Start(tag.data_pos()))
        .with_context(|| format!("seek to tag data @ {:#x}", tag.data_pos()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_tag_bytes(kind: i32, ftype: u32, size: i32, next: i32) -> [u8; 16] {
        let mut b = [0u8; 16];
        b[0..4].copy_from_slice(&kind.to_be_bytes());
        b[4..8].copy_from_slice(&ftype.to_be_bytes());
        b[8..12].copy_from_slice(&size.to_be_bytes());
        b[12..16].copy_from_slice(&next.to_be_bytes());
        b
    }

    #[test]
    fn reads_meas_date_pair() {
        let mut buf = make_tag_bytes(FIFF_MEAS_DATE, FIFFT_INT, 8, FIFFV_NEXT_NONE).to_vec();
        buf.extend_from_slice(&1_683_201_600_i32.to_be_bytes());
        buf.extend_from_slice(&250_i32.to_be_bytes());

        let mut cursor = Cursor::new(buf);
        let tag = read_tag_header(&mut cursor, 0).unwrap();
        assert_eq!(tag.kind, FIFF_MEAS_DATE);
        assert_eq!(read_i32_array(&mut cursor, &tag).unwrap(), [1_683_201_600, 250]);
    }

    #[test]
    fn patch_stays_inside_payload() {
        let mut buf = make_tag_bytes(FIFF_LINE_FREQ, FIFFT_FLOAT, 4, FIFFV_NEXT_NONE).to_vec();
        buf.extend_from_slice(&60_f32.to_be_bytes());
        let mut cursor = Cursor::new(buf);
        let tag = read_tag_header(&mut cursor, 0).unwrap();

        patch_f32(&mut cursor, &tag, 0, 50.0).unwrap();
        approx::assert_abs_diff_eq!(read_f32(&mut cursor, &tag).unwrap(), 50.0_f32);
        assert!(patch_i32(&mut cursor, &tag, 2, 7).is_err());
        assert_eq!(cursor.get_ref().len(), 20);
    }

    #[test]
    fn next_pos_variants() {
        let seq = TagHeader { kind: 1, ftype: 3, size: 8, next: 0, pos: 100 };
        assert_eq!(seq.next_pos(), Some(124)); // 100 + 16 + 8
        let jump = TagHeader { next: 5000, ..seq };
        assert_eq!(jump.next_pos(), Some(5000));
        let last = TagHeader { next: -1, ..seq };
        assert_eq!(last.next_pos(), None);
    }

    #[test]
    fn string_tag_is_latin1() {
        let text = [b'C', b'S', 0xB5];
        let mut buf = make_tag_bytes(FIFF_COMMENT, FIFFT_STRING, 3, -1).to_vec();
        buf.extend_from_slice(&text);
        let mut cursor = Cursor::new(buf);
        let tag = read_tag_header(&mut cursor, 0).unwrap();
        assert_eq!(read_string(&mut cursor, &tag).unwrap(), "CS\u{b5}");
    }
}
