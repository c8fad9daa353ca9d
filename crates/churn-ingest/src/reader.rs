//! CSV row reader
//!
//! Turns a comma-separated file with a header line into a lazy sequence of
//! [`Row`]s. A file that does not exist reads as empty, so an absent entity
//! file makes its stage a no-op rather than a failure.

use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{IngestError, Result};

/// One data line keyed by header name
///
/// Short lines simply lack the trailing columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: HashMap<String, String>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Value of `column`, with an empty or absent field read as `None`
    pub fn non_empty(&self, column: &str) -> Option<String> {
        self.get(column)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Single-pass reader over one entity file
pub struct RowReader {
    path: PathBuf,
    headers: Vec<String>,
    records: Option<csv::StringRecordsIntoIter<File>>,
    peeked: Option<Row>,
}

impl RowReader {
    /// Open `path`; a missing file yields a reader with no rows
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Input file not found, reading as empty");
                return Ok(Self::empty(path));
            },
            Err(source) => return Err(IngestError::Io { path, source }),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let headers = match reader.headers() {
            Ok(record) => record.iter().map(str::to_string).collect(),
            Err(source) => return Err(IngestError::Read { path, source }),
        };

        Ok(Self {
            path,
            headers,
            records: Some(reader.into_records()),
            peeked: None,
        })
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            headers: Vec::new(),
            records: None,
            peeked: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Look at the first unread row without consuming it
    pub fn peek(&mut self) -> Result<Option<&Row>> {
        if self.peeked.is_none() {
            self.peeked = self.read_next().transpose()?;
        }
        Ok(self.peeked.as_ref())
    }

    /// Fail with [`IngestError::Schema`] if the file has data but lacks any of `required`
    ///
    /// Only the header is checked, and only when at least one data row exists.
    pub fn require_columns(&mut self, required: &[&str]) -> Result<()> {
        if self.peek()?.is_none() {
            return Ok(());
        }

        let missing: Vec<String> = required
            .iter()
            .filter(|column| !self.headers.iter().any(|h| h == *column))
            .map(|column| column.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(IngestError::Schema {
                file: self.file_name(),
                missing,
            })
        }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn read_next(&mut self) -> Option<Result<Row>> {
        let record = match self.records.as_mut()?.next()? {
            Ok(record) => record,
            Err(source) => {
                return Some(Err(IngestError::Read {
                    path: self.path.clone(),
                    source,
                }))
            },
        };

        Some(Ok(self
            .headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.as_str(), value))
            .collect()))
    }
}

impl Iterator for RowReader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.peeked.take() {
            Some(row) => Some(Ok(row)),
            None => self.read_next(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_rows_keyed_by_header_in_file_order() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "events.csv",
            "external_id,event_type\nC1,login\nC2,\"logout, forced\"\n",
        );

        let rows: Vec<Row> = RowReader::open(&path).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("external_id"), Some("C1"));
        assert_eq!(rows[0].get("event_type"), Some("login"));
        assert_eq!(rows[1].get("event_type"), Some("logout, forced"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut reader = RowReader::open(dir.path().join("events.csv")).unwrap();
        assert!(reader.headers().is_empty());
        assert!(reader.require_columns(&["external_id"]).is_ok());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_header_only_file_skips_column_check() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "churn_labels.csv", "something_else\n");
        let mut reader = RowReader::open(&path).unwrap();
        assert!(reader.require_columns(&["external_id", "label"]).is_ok());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_require_columns_reports_all_missing() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "customers.csv", "external_id,country\nC1,NO\n");
        let mut reader = RowReader::open(&path).unwrap();

        let err = reader
            .require_columns(&["external_id", "region", "country", "city"])
            .unwrap_err();
        match err {
            IngestError::Schema { file, missing } => {
                assert_eq!(file, "customers.csv");
                assert_eq!(missing, vec!["region", "city"]);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_peek_does_not_consume() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "customers.csv", "external_id\nC1\nC2\n");
        let mut reader = RowReader::open(&path).unwrap();

        reader.require_columns(&["external_id"]).unwrap();
        assert_eq!(reader.peek().unwrap().unwrap().get("external_id"), Some("C1"));

        let ids: Vec<String> = reader
            .map(|r| r.unwrap().get("external_id").unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["C1", "C2"]);
    }

    #[test]
    fn test_short_line_lacks_trailing_columns() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "churn_labels.csv", "external_id,label,notes\nC1,true\n");
        let row = RowReader::open(&path).unwrap().next().unwrap().unwrap();
        assert_eq!(row.get("label"), Some("true"));
        assert_eq!(row.get("notes"), None);
        assert_eq!(row.non_empty("notes"), None);
    }

    #[test]
    fn test_invalid_utf8_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.csv");
        std::fs::write(&path, b"external_id,event_type\nC1,\xff\xfe\n").unwrap();

        let result = RowReader::open(&path).unwrap().next().unwrap();
        assert!(matches!(result, Err(IngestError::Read { .. })));
    }
}
