//! Delimited text (CSV/TSV) as a single-sheet spreadsheet.
use crate::error::ResultMessage;
use crate::error::RustyChunkerError;
use crate::spreadsheet::options::ReadOptions;
use crate::spreadsheet::options::CSV_NULLS;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use crate::table::Grid;
use crate::table::Value;
use std::fs;
use std::path::Path;

/// Delimiters tried when none is configured, in order of preference on ties.
const DELIMITER_CANDIDATES: &[u8] = &[b'\t', b';', b',', b'|'];
/// Lines sampled by the delimiter sniffer.
const SNIFF_LINES: usize = 10;

/// A CSV or TSV file. Delimited text has exactly one sheet, named after the file stem.
pub(crate) struct DelimitedSpreadsheet {
    name: String,
    sheet_name: String,
    content: String,
    delimiter: u8,
    options: ReadOptions,
}

impl DelimitedSpreadsheet {
    /// Opens a delimited text file. `delimiter` overrides both the configured
    /// and the sniffed delimiter (TSV files).
    pub(crate) fn open(path: &Path, options: &ReadOptions, delimiter: Option<u8>) -> Result<Self, RustyChunkerError> {
        let content = read_file_as_utf8(path)?;
        let delimiter = delimiter
            .or(options.delimiter)
            .unwrap_or_else(|| sniff_delimiter(&content));
        let sheet_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(DelimitedSpreadsheet {
            name: path.display().to_string(),
            sheet_name,
            content,
            delimiter,
            options: options.to_owned(),
        })
    }
}

impl Spreadsheet for DelimitedSpreadsheet {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    fn sheet_names(&self) -> Vec<String> {
        vec![self.sheet_name.to_owned()]
    }

    fn is_workbook(&self) -> bool {
        false
    }

    fn read_sheet(&mut self, sheet_name: &str) -> Result<Grid, RustyChunkerError> {
        if sheet_name != self.sheet_name {
            Err(SpreadsheetError::SheetNotFoundError(self.name.to_owned(), sheet_name.to_owned()))?;
        }
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(self.content.as_bytes());

        let mut sheet = Sheet::new(sheet_name, &self.options, CSV_NULLS);
        for (row, result) in reader.records().enumerate() {
            if sheet.after_row_upper_bound(row) {
                break;
            }
            let record = result.map_err(RustyChunkerError::from).with_prefix(&format!("Read line {} failed", row + 1))?;
            for (col, field) in record.iter().enumerate() {
                if !sheet.is_null_literal(field) {
                    sheet.push(row, col, infer_value(field));
                }
            }
        }
        Ok(sheet.into_grid())
    }
}

/// Types a field that is not a null literal: numbers, then booleans,
/// otherwise text. `NaN` spellings stay text.
fn infer_value(field: &str) -> Value {
    if let Some(number) = field.trim().parse::<f64>().ok().filter(|number| !number.is_nan()) {
        Value::Number(number)
    } else if field.eq_ignore_ascii_case("true") {
        Value::Boolean(true)
    } else if field.eq_ignore_ascii_case("false") {
        Value::Boolean(false)
    } else {
        Value::Text(field.to_owned())
    }
}

/// Detects the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate, count fields per line. The delimiter that produces the most
/// consistent field count (more than one field) wins.
fn sniff_delimiter(content: &str) -> u8 {
    let sample_lines: Vec<&str> = content.lines().take(SNIFF_LINES).collect();
    let mut best = b',';
    let mut best_score = 0usize;
    for &delimiter in DELIMITER_CANDIDATES {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delimiter)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|record| record.ok())
                    .map(|record| record.len())
                    .unwrap_or(1)
            })
            .collect();

        // The first line must split for the candidate to be viable
        let target = counts.first().copied().unwrap_or(0);
        if target <= 1 {
            continue;
        }
        let score = counts.iter().filter(|&&count| count == target).count() * target;
        if score > best_score {
            best_score = score;
            best = delimiter;
        }
    }
    best
}

/// Reads the file as UTF-8, falling back to Windows-1252 for legacy exports.
fn read_file_as_utf8(path: &Path) -> Result<String, RustyChunkerError> {
    let bytes = fs::read(path)?;
    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(error) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(error.as_bytes());
            decoded.into_owned()
        }
    };
    Ok(content.strip_prefix('\u{feff}').map(str::to_owned).unwrap_or(content))
}
