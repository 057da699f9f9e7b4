//! CSV helpers shared by the import commands.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::LazyLock;

static CAMEL_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("valid pattern"));
static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid pattern"));

/// A CSV file read fully into memory, header row kept apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Reads `path`, trimming every cell and dropping stray `"` characters.
    /// Rows may have different lengths.
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        Self::from_reader(file).with_context(|| format!("Failed to read CSV from {:?}", path))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = reader.byte_records();
        let headers = match records.next() {
            Some(record) => clean_record(&record?),
            None => return Ok(Self::default()),
        };

        let mut rows = Vec::new();
        for record in records {
            rows.push(clean_record(&record?));
        }

        Ok(Self { headers, rows })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at `index` of `row`, or `""` when the row is short.
    pub fn cell<'r>(row: &'r [String], index: usize) -> &'r str {
        row.get(index).map(String::as_str).unwrap_or("")
    }
}

// Invalid UTF-8 is dropped rather than rejected.
fn clean_record(record: &csv::ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|field| {
            String::from_utf8_lossy(field)
                .replace('\u{FFFD}', "")
                .replace('"', "")
                .trim()
                .to_string()
        })
        .collect()
}

/// `"new york city"` -> `"New York City"`.
pub fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `"JohnDoe"` -> `"John Doe"`.
pub fn uncamel(text: &str) -> String {
    let spaced = CAMEL_WORD.replace_all(text, "$1 $2");
    let spaced = CAMEL_BOUNDARY.replace_all(&spaced, "$1 $2");
    spaced.replace("  ", " ")
}

/// Counts newline characters in a file.
pub fn count_lines(path: &Path) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut reader = BufReader::new(file);
    let mut buf = vec![0u8; 1024 * 1024];
    let mut lines = 0;
    loop {
        let read = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read {:?}", path))?;
        if read == 0 {
            break;
        }
        lines += buf[..read].iter().filter(|&&b| b == b'\n').count();
    }
    Ok(lines)
}
