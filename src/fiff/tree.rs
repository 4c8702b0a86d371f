//! FIF directory tree construction.
//!
//! Mirrors `mne/_fiff/tree.py` but uses owned Rust types throughout.
//!
//! The tree is built by walking the flat tag directory and grouping headers
//! into blocks delimited by `FIFF_BLOCK_START` / `FIFF_BLOCK_END` tags.
use std::io::{Read, Seek};
use anyhow::Result;

use super::constants::*;
use super::tag::{read_directory, read_i32, read_tag_header, TagHeader};

// ── Node ─────────────────────────────────────────────────────────────────

/// One node in the FIF tree, analogous to MNE's `dict` node.
#[derive(Debug, Default, Clone)]
pub struct Node {
    /// Block kind (e.g. `FIFFB_MEAS`, `FIFFB_MNE_ANNOTATIONS`, …).
    /// 0 = root / unknown.
    pub block:    i32,
    /// All non-structural tag headers in this node (not including BLOCK_START/END).
    pub entries:  Vec<TagHeader>,
    /// Child nodes.
    pub children: Vec<Node>,
}

impl Node {
    /// Recursively find the first node (self included) with the given block kind.
    pub fn find_block(&self, kind: i32) -> Option<&Node> {
        if self.block == kind {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_block(kind))
    }

    /// Recursively collect all nodes with the given block kind.
    pub fn find_blocks(&self, kind: i32) -> Vec<&Node> {
        let mut out = Vec::new();
        self.collect_blocks(kind, &mut out);
        out
    }

    fn collect_blocks<'a>(&'a self, kind: i32, out: &mut Vec<&'a Node>) {
        if self.block == kind {
            out.push(self);
        }
        for child in &self.children {
            child.collect_blocks(kind, out);
        }
    }

    /// Find the first tag header with the given kind in this node's entries.
    /// Does NOT recurse into children.
    pub fn find_tag(&self, kind: i32) -> Option<&TagHeader> {
        self.entries.iter().find(|e| e.kind == kind)
    }
}

// ── Tree builder ─────────────────────────────────────────────────────────

/// Walk a flat directory and build the tree, resolving block kinds from the file.
///
/// Unbalanced `FIFF_BLOCK_START`s (truncated files) are closed at the end.
pub fn read_tree<R: Read + Seek>(reader: &mut R, directory: &[TagHeader]) -> Result<Node> {
    let mut stack: Vec<Node> = vec![Node::default()];

    for &tag in directory {
        match tag.kind {
            FIFF_BLOCK_START => {
                let block = read_i32(reader, &tag).unwrap_or(0);
                stack.push(Node { block, ..Node::default() });
            }
            FIFF_BLOCK_END if stack.len() > 1 => {
                if let Some(finished) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(finished);
                    }
                }
            }
            FIFF_BLOCK_END => {}
            _ => {
                if let Some(node) = stack.last_mut() {
                    node.entries.push(tag);
                }
            }
        }
    }

    while stack.len() > 1 {
        if let Some(orphan) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(orphan);
            }
        }
    }
    Ok(stack.pop().unwrap_or_default())
}

// ── Directory loading ─────────────────────────────────────────────────────

/// Read every tag header by following the `next` pointer chain.
/// This is MNE's "slow path", used when there is no embedded directory.
pub fn scan_directory<R: Read + Seek>(reader: &mut R) -> Result<Vec<TagHeader>> {
    let mut directory = Vec::new();
    let mut pos: Option<u64> = Some(0);
    while let Some(p) = pos {
        let tag = read_tag_header(reader, p)?;
        pos = tag.next_pos();
        directory.push(tag);
    }
    Ok(directory)
}

/// Try to load the pre-built tag directory embedded at the end of the file.
///
/// MNE checks `FIFF_DIR_POINTER` (tag kind 101) right after the file id; if
/// its payload is > 0 it points to a `FIFFT_DIR_ENTRY_STRUCT` tag containing
/// all headers.  Returns `None` if missing or corrupt.
pub fn try_load_directory<R: Read + Seek>(reader: &mut R) -> Result<Option<Vec<TagHeader>>> {
    let id_tag = read_tag_header(reader, 0)?;
    if id_tag.kind != FIFF_FILE_ID {
        return Ok(None);
    }
    let Some(next) = id_tag.next_pos() else {
        return Ok(None);
    };
    let dir_ptr_tag = read_tag_header(reader, next)?;
    if dir_ptr_tag.kind != FIFF_DIR_POINTER {
        return Ok(None);
    }
    let dirpos = read_i32(reader, &dir_ptr_tag)?;
    if dirpos <= 0 {
        return Ok(None);
    }
    let dir_tag = read_tag_header(reader, dirpos as u64)?;
    if dir_tag.ftype != FIFFT_DIR_ENTRY_STRUCT {
        return Ok(None);
    }
    Ok(Some(read_directory(reader, &dir_tag)?))
}

/// Embedded directory when present, otherwise a sequential scan.
pub fn load_directory<R: Read + Seek>(reader: &mut R) -> Result<Vec<TagHeader>> {
    match try_load_directory(reader)? {
        Some(dir) => Ok(dir),
        None => scan_directory(reader),
    }
}
