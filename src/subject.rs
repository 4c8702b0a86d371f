//! Subject identifiers and randomization groups.
//!
//! The study assigns native identifiers such as `C01`; the BIDS layout uses a
//! zero-padded numeric label (`001`) and the tagged form `sub-001`.  All three
//! spellings are accepted at the boundary by [`SubjectId::parse`], and the
//! rest of the crate only ever handles a [`SubjectId`].
//!
//! ```
//! use megbids::subject::SubjectId;
//!
//! let id = SubjectId::parse("sub-007").unwrap();
//! assert_eq!(id.native(), "C07");
//! assert_eq!(id.bids_id(), "007");
//! ```
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Letter prefix of the native identifiers.
pub const NATIVE_PREFIX: char = 'C';

/// Prefix of the tagged BIDS form.
pub const BIDS_TAG_PREFIX: &str = "sub-";

/// Largest number representable in the 3-digit BIDS label.
pub const MAX_SUBJECT_NUMBER: u32 = 999;

// ── SubjectId ─────────────────────────────────────────────────────────────

/// Canonical subject identifier.
///
/// Ordering follows the numeric suffix, so sorting `SubjectId`s sorts both
/// the native and the BIDS spellings consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubjectId {
    number: u32,
}

impl SubjectId {
    /// Build from the bare subject number.
    pub fn from_number(number: u32) -> Result<Self> {
        if number > MAX_SUBJECT_NUMBER {
            return Err(Error::Format(format!(
                "subject number {number} does not fit the 3-digit BIDS label"
            )));
        }
        Ok(Self { number })
    }

    /// Normalize any accepted spelling into a `SubjectId`.
    ///
    /// Accepted forms (surrounding whitespace ignored):
    /// * native: `C01`, `c1`, `C100`
    /// * numeric: `001`, `1`
    /// * tagged: `sub-001`
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let body = trimmed.strip_prefix(BIDS_TAG_PREFIX).unwrap_or(trimmed);

        let digits = match body.chars().next() {
            Some(c) if c.is_ascii_digit() => body,
            Some(c) if c.eq_ignore_ascii_case(&NATIVE_PREFIX) => &body[c.len_utf8()..],
            Some(_) => {
                return Err(Error::Format(format!(
                    "'{raw}' is not a native ({NATIVE_PREFIX}NN), numeric (NNN) or tagged (sub-NNN) identifier"
                )))
            }
            None => return Err(Error::Format("empty subject identifier".into())),
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Format(format!("no numeric suffix in '{raw}'")));
        }
        let number: u32 = digits
            .parse()
            .map_err(|_| Error::Format(format!("numeric suffix of '{raw}' is out of range")))?;
        Self::from_number(number)
    }

    #[inline]
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Native study form, e.g. `C01`.
    pub fn native(&self) -> String {
        format!("{NATIVE_PREFIX}{:02}", self.number)
    }

    /// Zero-padded BIDS label, e.g. `001`.
    pub fn bids_id(&self) -> String {
        format!("{:03}", self.number)
    }

    /// Tagged BIDS form, e.g. `sub-001`.
    pub fn bids_tag(&self) -> String {
        format!("{BIDS_TAG_PREFIX}{}", self.bids_id())
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.native())
    }
}

impl FromStr for SubjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// `C01` → `001`.
pub fn normalize_to_numeric(native: &str) -> Result<String> {
    Ok(SubjectId::parse(native)?.bids_id())
}

/// `001` → `C01`.
pub fn normalize_to_native(numeric: &str) -> Result<String> {
    Ok(SubjectId::parse(numeric)?.native())
}

// ── Group ─────────────────────────────────────────────────────────────────

/// A/B randomization group; selects the run → task order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Group {
    #[default]
    A,
    B,
}

impl Group {
    /// Parse one cell of a group-indicator column.
    ///
    /// | cell                                     | group |
    /// |------------------------------------------|-------|
    /// | `0`, `0.0`                               | A     |
    /// | any other number (`1`, `2.0`, …)         | B     |
    /// | `A` / `a`                                | A     |
    /// | `B` / `b`                                | B     |
    /// | blank, `nan`, `n/a`, `na`, `none`        | `None`|
    ///
    /// Anything else is also `None`; the caller decides the default.
    pub fn from_indicator(cell: &str) -> Option<Self> {
        let cell = cell.trim();
        if is_missing(cell) {
            return None;
        }
        if cell.eq_ignore_ascii_case("a") {
            return Some(Group::A);
        }
        if cell.eq_ignore_ascii_case("b") {
            return Some(Group::B);
        }
        match cell.parse::<f64>() {
            Ok(v) if v.is_finite() => Some(if v == 0.0 { Group::A } else { Group::B }),
            _ => None,
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Group::A => "A",
            Group::B => "B",
        })
    }
}

/// Spreadsheet spellings of an empty cell.
pub(crate) fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty()
        || ["nan", "n/a", "na", "none"]
            .iter()
            .any(|m| cell.eq_ignore_ascii_case(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_forms() {
        for raw in ["C01", "c1", "001", "1", "sub-001", "  C01 "] {
            let id = SubjectId::parse(raw).unwrap();
            assert_eq!(id.number(), 1, "{raw}");
        }
    }

    #[test]
    fn renders_native_and_bids() {
        let id = SubjectId::from_number(10).unwrap();
        assert_eq!(id.native(), "C10");
        assert_eq!(id.bids_id(), "010");
        assert_eq!(id.bids_tag(), "sub-010");
        assert_eq!(id.to_string(), "C10");
    }

    #[test]
    fn three_digit_numbers_keep_all_digits() {
        let id = SubjectId::parse("C123").unwrap();
        assert_eq!(id.native(), "C123");
        assert_eq!(id.bids_id(), "123");
    }

    #[test]
    fn round_trip_every_padded_number() {
        for n in 1..=999u32 {
            let padded = format!("{n:03}");
            let native = normalize_to_native(&padded).unwrap();
            assert_eq!(normalize_to_numeric(&native).unwrap(), padded);
        }
    }

    #[test]
    fn ordering_follows_numeric_suffix() {
        let mut ids: Vec<SubjectId> = ["C10", "C02", "sub-001"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        ids.sort();
        let natives: Vec<String> = ids.iter().map(SubjectId::native).collect();
        assert_eq!(natives, ["C01", "C02", "C10"]);
    }

    #[test]
    fn rejects_unparseable_identifiers() {
        for raw in ["", "C", "sub-", "Cx1", "C01a", "A3122", "1000", "-1"] {
            assert!(
                matches!(SubjectId::parse(raw), Err(Error::Format(_))),
                "{raw:?} should be a format error"
            );
        }
    }

    #[test]
    fn group_indicator_forms() {
        assert_eq!(Group::from_indicator("0"), Some(Group::A));
        assert_eq!(Group::from_indicator("0.0"), Some(Group::A));
        assert_eq!(Group::from_indicator("1"), Some(Group::B));
        assert_eq!(Group::from_indicator("1.0"), Some(Group::B));
        assert_eq!(Group::from_indicator("a"), Some(Group::A));
        assert_eq!(Group::from_indicator(" B "), Some(Group::B));
        assert_eq!(Group::from_indicator(""), None);
        assert_eq!(Group::from_indicator("NaN"), None);
        assert_eq!(Group::from_indicator("n/a"), None);
        assert_eq!(Group::from_indicator("maybe"), None);
    }
}
