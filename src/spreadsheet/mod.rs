//! # Spreadsheet Loading
//!
//! Turns spreadsheet files into dense grids of typed values, one per sheet.
//! Supported formats are Excel 2007+ workbooks (`.xlsx`, `.xlsm`, `.xltx`,
//! `.xltm`), Excel 97-2003 workbooks (`.xls`), OpenDocument spreadsheets
//! (`.ods`) and delimited text (`.csv`, `.tsv`).
pub(crate) mod cell;
pub(crate) mod delimited;
pub(crate) mod excel;
pub mod ods;
pub mod options;
pub mod range;
pub(crate) mod reference;
pub(crate) mod sheet;
pub mod xls;
pub(crate) mod xlsx;

use crate::error::RustyChunkerError;
use crate::spreadsheet::delimited::DelimitedSpreadsheet;
use crate::spreadsheet::ods::OdsSpreadsheet;
use crate::spreadsheet::options::ReadOptions;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use crate::table::Grid;
use std::path::Path;
use thiserror::Error;

/// Errors raised while opening or reading a spreadsheet.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Unsupported file format '{0}'")]
    UnsupportedFormatError(String),

    #[error("Spreadsheet '{0}' is password protected")]
    SpreadsheetPasswordProtectedError(String),

    #[error("Spreadsheet '{0}' has no sheet")]
    SpreadsheetEmptyError(String),

    #[error("Missing part '{0}' in spreadsheet archive")]
    FileError(String),

    #[error("Sheet '{1}' not found in '{0}'")]
    SheetNotFoundError(String, String),

    #[error("Invalid cell value at '{0}': {1}")]
    CellValueError(String, String),
}

/// A spreadsheet file opened for reading.
pub trait Spreadsheet {
    /// Returns the file name of this spreadsheet
    fn name(&self) -> String;

    /// Sheet names in source order
    fn sheet_names(&self) -> Vec<String>;

    /// Whether the format holds named sheets, in which case records are tagged
    /// with the sheet they come from
    fn is_workbook(&self) -> bool;

    /// Reads one sheet as a grid spanning its used cells
    fn read_sheet(&mut self, sheet_name: &str) -> Result<Grid, RustyChunkerError>;
}

/// Opens a spreadsheet, choosing the reader by file extension.
pub fn open_spreadsheet(path: &Path, options: &ReadOptions) -> Result<Box<dyn Spreadsheet>, RustyChunkerError> {
    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let spreadsheet: Box<dyn Spreadsheet> = match extension.as_str() {
        "xlsx" | "xlsm" | "xltx" | "xltm" => Box::new(XlsxSpreadsheet::open(path, options)?),
        "xls" => Box::new(XlsSpreadsheet::open(path, options)?),
        "ods" => Box::new(OdsSpreadsheet::open(path, options)?),
        "csv" => Box::new(DelimitedSpreadsheet::open(path, options, None)?),
        "tsv" => Box::new(DelimitedSpreadsheet::open(path, options, Some(b'\t'))?),
        _ => Err(SpreadsheetError::UnsupportedFormatError(path.display().to_string()))?,
    };
    Ok(spreadsheet)
}

/// Loads every sheet of a spreadsheet, in source order.
pub fn load(path: &Path, options: &ReadOptions) -> Result<Vec<(String, Grid)>, RustyChunkerError> {
    let mut spreadsheet = open_spreadsheet(path, options)?;
    spreadsheet
        .sheet_names()
        .into_iter()
        .map(|sheet_name| {
            let grid = spreadsheet.read_sheet(&sheet_name)?;
            Ok((sheet_name, grid))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extensions_are_unsupported() {
        for name in ["report.xlsb", "notes.txt", "README"] {
            let error = open_spreadsheet(Path::new(name), &ReadOptions::default()).err().unwrap();
            assert!(matches!(
                error,
                RustyChunkerError::SpreadsheetError(SpreadsheetError::UnsupportedFormatError(_))
            ));
        }
    }
}
