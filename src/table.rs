//! Subject reference table (demographics / randomization sheet).
//!
//! The sheet is a delimited text file with one header line and one row per
//! subject.  Tabs or commas are accepted; the delimiter that splits the
//! header into more columns wins.  Fields may be double-quoted, and a quoted
//! field may contain the delimiter.
//!
//! Rows are keyed by the first configured identifier column present in the
//! header (`megid`, falling back to `subid`).  Key cells are compared through
//! [`SubjectId`], so `C1` in the sheet matches `C01` from the command line.
use std::path::Path;

use csv::{ReaderBuilder, Trim};

use crate::error::{Error, Result};
use crate::subject::{is_missing, Group, SubjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Tab,
    Comma,
}

impl Delimiter {
    fn as_byte(self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
        }
    }

    /// Pick the delimiter yielding more columns in `header`.
    pub fn detect(header: &str) -> Self {
        let tabs = header.split('\t').count();
        let commas = header.split(',').count();
        if tabs >= commas && tabs > 1 {
            Delimiter::Tab
        } else if commas > 1 {
            Delimiter::Comma
        } else {
            Delimiter::Tab
        }
    }
}

/// Immutable, loaded-once reference table.
#[derive(Debug, Clone)]
pub struct ReferenceTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    key_column: Option<usize>,
    delimiter: Delimiter,
}

impl ReferenceTable {
    /// Load from disk.  `id_columns` lists candidate key columns in order of
    /// preference.
    pub fn load(path: &Path, id_columns: &[String]) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("reference table {}", path.display()))
            }
            _ => Error::Io(e),
        })?;
        let table = Self::parse(&text, id_columns)?;
        tracing::debug!(
            path = %path.display(),
            rows = table.len(),
            delimiter = ?table.delimiter,
            "loaded reference table"
        );
        Ok(table)
    }

    /// Parse table text.  Fails when there is no header line; reader errors
    /// surface as [`Error::Csv`].
    pub fn parse(text: &str, id_columns: &[String]) -> Result<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let header = text
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::Validation("reference table is empty".into()))?;
        let delimiter = Delimiter::detect(header);
        let body = text.find(header).map_or(text, |at| &text[at..]);

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter.as_byte())
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(body.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
            cells.resize(headers.len(), String::new());
            rows.push(cells);
        }

        let key_column = id_columns
            .iter()
            .find_map(|c| headers.iter().position(|h| h == c));

        Ok(Self { headers, rows, key_column, delimiter })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Name of the primary identifier column, if one was found.
    pub fn key_column_name(&self) -> Option<&str> {
        self.key_column.map(|i| self.headers[i].as_str())
    }

    /// Index of the primary identifier column, or a `ValidationError`.
    pub fn require_key_column(&self) -> Result<usize> {
        self.key_column.ok_or_else(|| {
            Error::Validation(format!(
                "reference table has no subject identifier column (columns: {})",
                self.headers.join(", ")
            ))
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row { table: self, cells })
    }

    /// Identifier cells of every row, in file order.  Blank keys are skipped.
    pub fn subject_keys(&self) -> Result<Vec<String>> {
        let key = self.require_key_column()?;
        Ok(self
            .rows
            .iter()
            .map(|r| r[key].clone())
            .filter(|k| !is_missing(k))
            .collect())
    }

    /// Row of `subject`, or `NotFoundError`.
    pub fn row(&self, subject: &SubjectId) -> Result<Row<'_>> {
        let key = self.require_key_column()?;
        let native = subject.native();
        self.rows()
            .find(|row| {
                let cell = row.cells[key].as_str();
                match SubjectId::parse(cell) {
                    Ok(id) => id == *subject,
                    Err(_) => cell == native,
                }
            })
            .ok_or_else(|| Error::NotFound(format!("subject {subject} not in reference table")))
    }

    /// Randomization group of `subject`.
    ///
    /// `group_columns` are tried in order; the first cell that parses via
    /// [`Group::from_indicator`] decides.  Without any usable cell the
    /// subject is assigned to group A.
    pub fn group_of(&self, subject: &SubjectId, group_columns: &[String]) -> Result<Group> {
        let row = self.row(subject)?;
        for column in group_columns {
            if let Some(group) = row.get(column).and_then(Group::from_indicator) {
                return Ok(group);
            }
        }
        tracing::debug!(%subject, "no group information; defaulting to A");
        Ok(Group::A)
    }
}

/// Borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a ReferenceTable,
    cells: &'a [String],
}

impl<'a> Row<'a> {
    /// Cell in `column`, or `None` when the column is absent or the cell is
    /// blank / `nan` / `n/a`.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.table.column_index(column)?;
        let cell = self.cells.get(idx)?.as_str();
        if is_missing(cell) {
            None
        } else {
            Some(cell)
        }
    }

    /// Primary identifier cell.
    pub fn key(&self) -> Option<&'a str> {
        let idx = self.table.key_column?;
        self.cells.get(idx).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<String> {
        vec!["megid".into(), "subid".into()]
    }

    fn groups() -> Vec<String> {
        vec!["randval".into(), "group".into()]
    }

    #[test]
    fn detects_tab_and_comma() {
        assert_eq!(Delimiter::detect("megid\tibbid\tage"), Delimiter::Tab);
        assert_eq!(Delimiter::detect("megid,ibbid,age"), Delimiter::Comma);
        assert_eq!(Delimiter::detect("megid"), Delimiter::Tab);
    }

    #[test]
    fn parses_quoted_comma_table() {
        let t = ReferenceTable::parse("\"megid\",\"age\"\n\"C01\",\"23\"\n", &ids()).unwrap();
        assert_eq!(t.headers(), ["megid", "age"]);
        let id = SubjectId::parse("C01").unwrap();
        assert_eq!(t.row(&id).unwrap().get("age"), Some("23"));
    }

    #[test]
    fn quoted_delimiter_stays_in_its_cell() {
        let text = "megid,notes,ibbid,randval\nC01,\"left-handed, glasses\",A3122,1\n";
        let t = ReferenceTable::parse(text, &ids()).unwrap();
        let id = SubjectId::parse("C01").unwrap();
        let row = t.row(&id).unwrap();
        assert_eq!(row.get("notes"), Some("left-handed, glasses"));
        assert_eq!(row.get("ibbid"), Some("A3122"));
        assert_eq!(t.group_of(&id, &groups()).unwrap(), Group::B);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let t = ReferenceTable::parse("\nmegid\tage\n\nC01\t30\n\n", &ids()).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.headers(), ["megid", "age"]);
    }

    #[test]
    fn key_column_falls_back_to_subid() {
        let t = ReferenceTable::parse("subid\trandval\nC02\t1\n", &ids()).unwrap();
        assert_eq!(t.key_column_name(), Some("subid"));
    }

    #[test]
    fn row_lookup_tolerates_unpadded_keys() {
        let t = ReferenceTable::parse("megid\tage\nC1\t30\n", &ids()).unwrap();
        let id = SubjectId::parse("001").unwrap();
        assert_eq!(t.row(&id).unwrap().key(), Some("C1"));
    }

    #[test]
    fn missing_row_is_not_found() {
        let t = ReferenceTable::parse("megid\nC01\n", &ids()).unwrap();
        let id = SubjectId::parse("C09").unwrap();
        assert!(matches!(t.row(&id), Err(Error::NotFound(_))));
    }

    #[test]
    fn missing_key_column_is_validation_error() {
        let t = ReferenceTable::parse("name\tage\nx\t1\n", &ids()).unwrap();
        assert!(matches!(t.subject_keys(), Err(Error::Validation(_))));
    }

    #[test]
    fn group_resolution_forms() {
        let text = "megid\trandval\tgroup\n\
                    C01\t0\t\n\
                    C02\t1\t\n\
                    C03\tnan\tB\n\
                    C04\t\t\n";
        let t = ReferenceTable::parse(text, &ids()).unwrap();
        let g = |s: &str| t.group_of(&SubjectId::parse(s).unwrap(), &groups()).unwrap();
        assert_eq!(g("C01"), Group::A);
        assert_eq!(g("C02"), Group::B);
        assert_eq!(g("C03"), Group::B);
        assert_eq!(g("C04"), Group::A);
    }

    #[test]
    fn group_defaults_to_a_without_columns() {
        let t = ReferenceTable::parse("megid\nC05\n", &ids()).unwrap();
        let id = SubjectId::parse("C05").unwrap();
        assert_eq!(t.group_of(&id, &groups()).unwrap(), Group::A);
    }

    #[test]
    fn short_rows_are_padded() {
        let t = ReferenceTable::parse("megid\tibbid\tage\nC01\tA3122\n", &ids()).unwrap();
        let row = t.row(&SubjectId::parse("C01").unwrap()).unwrap();
        assert_eq!(row.get("ibbid"), Some("A3122"));
        assert_eq!(row.get("age"), None);
        assert_eq!(t.subject_keys().unwrap(), ["C01"]);
    }
}
