//! CSV record source with encoding and delimiter auto-detection.
//!
//! The whole file is decoded once into memory; [`CsvSource::records`] can be
//! called any number of times, each call restarting from the first data row.

use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

use crate::error::{SourceError, SourceResult};
use crate::models::RawRecord;

/// Row counts gathered by a full scan of the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCount {
    /// Every data row, blank ones included.
    pub rows: usize,
    /// Rows whose fields are all empty.
    pub blank: usize,
    /// Rows the CSV reader rejected.
    pub malformed: usize,
}

impl RecordCount {
    /// Rows that will be handed to the extractor.
    pub fn usable(&self) -> usize {
        self.rows - self.blank - self.malformed
    }
}

/// A decoded, restartable CSV table.
#[derive(Debug, Clone)]
pub struct CsvSource {
    content: Arc<str>,
    header: Arc<[String]>,
    delimiter: char,
    encoding: String,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to a string; unknown encodings fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting occurrences in the first line.
///
/// Falls back to `,` when no candidate separator appears.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

impl CsvSource {
    /// Open a CSV file, detecting encoding and delimiter.
    pub fn open(path: impl AsRef<Path>) -> SourceResult<Self> {
        Self::open_with(path, None)
    }

    /// Open a CSV file with an optional explicit delimiter.
    pub fn open_with(path: impl AsRef<Path>, delimiter: Option<char>) -> SourceResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| SourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(&bytes, delimiter)
    }

    /// Build a source from raw bytes.
    pub fn from_bytes(bytes: &[u8], delimiter: Option<char>) -> SourceResult<Self> {
        let encoding = detect_encoding(bytes);
        let content = decode_content(bytes, &encoding);
        if content.trim().is_empty() {
            return Err(SourceError::EmptyFile);
        }

        let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&content));
        if !delimiter.is_ascii() {
            return Err(SourceError::InvalidDelimiter(delimiter));
        }
        let header = read_header(&content, delimiter)?;

        Ok(Self {
            content: content.into(),
            header,
            delimiter,
            encoding,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Header as a shareable handle for work units.
    pub fn shared_header(&self) -> Arc<[String]> {
        Arc::clone(&self.header)
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Iterate over data rows from the beginning.
    pub fn records(&self) -> impl Iterator<Item = SourceResult<RawRecord>> + Send + '_ {
        reader(&self.content, self.delimiter)
            .into_records()
            .enumerate()
            .map(|(idx, result)| match result {
                Ok(row) => {
                    let line = row
                        .position()
                        .map(|p| p.line() as usize)
                        .unwrap_or(idx + 2);
                    Ok(RawRecord::new(line, row.iter().map(str::to_string).collect()))
                }
                Err(e) => Err(SourceError::Malformed {
                    line: e
                        .position()
                        .map(|p| p.line() as usize)
                        .unwrap_or(idx + 2),
                    message: e.to_string(),
                }),
            })
    }

    /// Scan the whole table once.
    pub fn count(&self) -> RecordCount {
        let mut count = RecordCount::default();
        for record in self.records() {
            count.rows += 1;
            match record {
                Ok(r) if r.is_blank() => count.blank += 1,
                Ok(_) => {}
                Err(_) => count.malformed += 1,
            }
        }
        count
    }

    /// Rows as JSON objects keyed by header, blank rows skipped.
    pub fn to_json(&self) -> SourceResult<Vec<Value>> {
        let mut rows = Vec::new();
        for record in self.records() {
            let record = record?;
            if record.is_blank() {
                continue;
            }
            let mut obj = Map::new();
            for (i, column) in self.header.iter().enumerate() {
                let value = record.fields.get(i).cloned().unwrap_or_default();
                obj.insert(column.clone(), Value::String(value));
            }
            rows.push(Value::Object(obj));
        }
        Ok(rows)
    }
}

/// `delimiter` is ASCII, checked in [`CsvSource::from_bytes`].
fn reader(content: &str, delimiter: char) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes())
}

fn read_header(content: &str, delimiter: char) -> SourceResult<Arc<[String]>> {
    let mut rdr = reader(content, delimiter);
    let headers = rdr.headers().map_err(|e| SourceError::Malformed {
        line: 1,
        message: e.to_string(),
    })?;

    let header: Vec<String> = headers
        .iter()
        .map(|h| h.trim_matches('"').to_string())
        .collect();

    if header.iter().all(|h| h.is_empty()) {
        return Err(SourceError::NoHeaders);
    }
    Ok(header.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source(csv: &str) -> CsvSource {
        CsvSource::from_bytes(csv.as_bytes(), None).unwrap()
    }

    #[test]
    fn test_header_and_records() {
        let src = source("Name,Phone,Email\nAcme Corp,555-1234567,bad-email\n");
        assert_eq!(src.header(), &["Name", "Phone", "Email"]);

        let records: Vec<RawRecord> = src.records().map(Result::unwrap).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].line, 2);
        assert_eq!(records[0].fields, vec!["Acme Corp", "555-1234567", "bad-email"]);
    }

    #[test]
    fn test_records_restartable() {
        let src = source("a,b\n1,2\n3,4\n");
        assert_eq!(src.records().count(), 2);
        assert_eq!(src.records().count(), 2);
    }

    #[test]
    fn test_quoted_values_with_delimiter() {
        let src = source("name,location\n\"Acme, Inc\",\"Paris, FR\"\n");
        let record = src.records().next().unwrap().unwrap();
        assert_eq!(record.fields, vec!["Acme, Inc", "Paris, FR"]);
    }

    #[test]
    fn test_count_blank_rows() {
        let src = source("a,b\n1,2\n,\n  ,  \n3,4\n");
        let count = src.count();
        assert_eq!(count.rows, 4);
        assert_eq!(count.blank, 2);
        assert_eq!(count.usable(), 2);
    }

    #[test]
    fn test_short_rows_are_kept() {
        let src = source("a,b,c\n1\n");
        let record = src.records().next().unwrap().unwrap();
        assert_eq!(record.fields, vec!["1"]);
    }

    #[test]
    fn test_empty_input_error() {
        assert!(matches!(
            CsvSource::from_bytes(b"", None),
            Err(SourceError::EmptyFile)
        ));
        assert!(matches!(
            CsvSource::from_bytes(b" \n", None),
            Err(SourceError::EmptyFile)
        ));
    }

    #[test]
    fn test_blank_header_error() {
        assert!(matches!(
            CsvSource::from_bytes(b",,\n1,2,3\n", None),
            Err(SourceError::NoHeaders)
        ));
    }

    #[test]
    fn test_missing_file_error() {
        let err = CsvSource::open("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[test]
    fn test_open_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name;sector").unwrap();
        writeln!(file, "Acme;Fintech").unwrap();

        let src = CsvSource::open(file.path()).unwrap();
        assert_eq!(src.delimiter(), ';');
        assert_eq!(src.to_json().unwrap()[0]["sector"], "Fintech");
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let src = CsvSource::from_bytes(b"\xEF\xBB\xBFName,Email\nA,b\n", None).unwrap();
        assert_eq!(src.header()[0], "Name");
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let err = CsvSource::from_bytes("Name§Phone\nAcme§555\n".as_bytes(), Some('§')).unwrap_err();
        assert!(matches!(err, SourceError::InvalidDelimiter('§')));

        let source = CsvSource::from_bytes(b"Name|Phone\nAcme|555\n", Some('|')).unwrap();
        assert_eq!(source.header(), ["Name", "Phone"]);
    }
}
