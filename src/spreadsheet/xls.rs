//! Excel 97-2003 workbooks (`.xls`): a BIFF8 record stream stored in an OLE
//! compound file.
use crate::error::ResultMessage;
use crate::error::RustyChunkerError;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::options::ReadOptions;
use crate::spreadsheet::options::WORKBOOK_NULLS;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use crate::table::Grid;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

// BIFF8 record types
const FORMULA: u16 = 6;
const EOF: u16 = 10;
const DATE1904: u16 = 34;
const FILE_PASS: u16 = 47;
const CODE_PAGE: u16 = 66;
const BOUND_SHEET8: u16 = 133;
const MUL_RK: u16 = 189;
const XF: u16 = 224;
const SST: u16 = 252;
const LABEL_SST: u16 = 253;
const NUMBER: u16 = 515;
const LABEL: u16 = 516;
const BOOL_ERR: u16 = 517;
const STRING: u16 = 519;
const ARRAY: u16 = 545;
const TABLE: u16 = 566;
const RK: u16 = 638;
const FORMAT: u16 = 1054;
const SHR_FMLA: u16 = 1212;
const BOF: u16 = 2057;

/// Sheet type of worksheets in BOUNDSHEET8; macro, chart and VBA sheets are skipped
const WORKSHEET: u8 = 0;

#[derive(Error, Debug)]
pub enum XlsError {
    #[error("Invalid Code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid Formula value '{0:#018X}'")]
    FormulaValueError(u64),
}

/// Type of a cell record: fixed by the record, or looked up from its style.
enum CellKind {
    Typed(CellType),
    Styled(usize),
}

pub(crate) struct XlsSpreadsheet {
    name: String,
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    /// Cell types by XF (style) index
    number_formats: Vec<CellType>,
    /// Worksheets as (name, BOF position in the stream)
    sheets: Vec<(String, usize)>,
    options: ReadOptions,
}

impl XlsSpreadsheet {
    /// Opens the workbook stream and reads its globals substream: code page,
    /// date system, number formats, shared strings and the sheet list.
    pub(crate) fn open(path: &Path, options: &ReadOptions) -> Result<XlsSpreadsheet, RustyChunkerError> {
        let file_name = path.display().to_string();
        let cfb = Cfb::new(&mut BufReader::new(File::open(path)?))?;
        let stream = match cfb.read("Workbook")? {
            Some(stream) => stream,
            None => cfb.read("Book")?.ok_or_else(|| SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?,
        };
        let mut reader = Biff8Reader::new(stream);

        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: Vec<(String, String)> = Vec::new();
        let mut format_indexes: Vec<String> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::SpreadsheetPasswordProtectedError(file_name.to_owned()))?,
            DATE1904 => is_1904 = reader.read_u16()? == 1,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                reader.encoding = Some(codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?);
            }
            FORMAT => {
                let id = reader.read_u16()?;
                custom_formats.push((id.to_string(), reader.read_xl_unicode_string()?));
            }
            XF => {
                reader.skip(2)?;
                format_indexes.push(reader.read_u16()?.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                let _visibility = reader.read_u8()?;
                let kind = reader.read_u8()?;
                let sheet_name = reader.read_short_xl_unicode_string()?;
                if kind == WORKSHEET {
                    sheets.push((sheet_name, pointer));
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?
        }

        // DATE1904 may follow the formats it affects
        let custom_formats: HashMap<String, CellType> = custom_formats
            .into_iter()
            .map(|(id, format)| (id, CellType::parse_custom_number_format(&format, is_1904)))
            .collect();
        let number_formats = load_number_formats(format_indexes, custom_formats, is_1904);
        debug!(file = %file_name, sheets = sheets.len(), strings = shared_strings.len(), "read xls globals");

        Ok(XlsSpreadsheet {
            name: file_name,
            reader,
            shared_strings,
            number_formats,
            sheets,
            options: options.to_owned(),
        })
    }

    fn cell_type(&self, kind: CellKind) -> CellType {
        match kind {
            CellKind::Typed(kind) => kind,
            CellKind::Styled(index) => self.number_formats.get(index).copied().unwrap_or(CellType::Number),
        }
    }

    fn push(&self, sheet: &mut Sheet, cell: &Cell) -> Result<(), RustyChunkerError> {
        if cell.value.is_empty() {
            return Ok(());
        }
        sheet
            .push_cell(cell, &self.shared_strings)
            .with_prefix(&format!("Read cell {} of sheet '{}' failed", cell.reference(), sheet.name))
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    fn is_workbook(&self) -> bool {
        true
    }

    /// Walks the sheet substream from its BOF to its EOF, collecting cells in range.
    fn read_sheet(&mut self, sheet_name: &str) -> Result<Grid, RustyChunkerError> {
        let pointer = self
            .sheets
            .iter()
            .find(|(name, _)| name == sheet_name)
            .map(|(_, pointer)| *pointer)
            .ok_or_else(|| SpreadsheetError::SheetNotFoundError(self.name.to_owned(), sheet_name.to_owned()))?;

        let mut sheet = Sheet::new(sheet_name, &self.options, WORKBOOK_NULLS);
        self.reader.goto(pointer);
        self.reader.next()?;
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let col_lower_bound = self.reader.read_u16()? as usize;
                    let col_upper_bound = self.reader.get_u16_back(2)? as usize;
                    for col in col_lower_bound..=col_upper_bound {
                        let index = self.reader.read_u16()? as usize;
                        let value = self.reader.read_rk_number()?;
                        if sheet.contains(row, col) {
                            let cell = Cell { row, col, kind: self.cell_type(CellKind::Styled(index)), value };
                            self.push(&mut sheet, &cell)?;
                        }
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    if !sheet.contains(row, col) {
                        continue;
                    }
                    let (kind, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => read_number_cell(&mut self.reader)?,
                        RK => read_rk_cell(&mut self.reader)?,
                        LABEL_SST => read_label_sst_cell(&mut self.reader)?,
                        LABEL => read_label_cell(&mut self.reader)?,
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    let cell = Cell { row, col, kind: self.cell_type(kind), value };
                    self.push(&mut sheet, &cell)?;
                }
                _ => (),
            }
        }
        Ok(sheet.into_grid())
    }
}

/// Reads the SST record: total and unique counts, then the unique strings.
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, RustyChunkerError> {
    reader.skip(4)?;
    let count = reader.read_usize()?;
    let mut shared_strings = Vec::with_capacity(count.min(u16::MAX as usize));
    for _ in 0..count {
        shared_strings.push(reader.read_xl_unicode_rich_extended_string()?);
    }
    Ok(shared_strings)
}

fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), RustyChunkerError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let is_error = reader.read_u8()? != 0;
    Ok(if is_error {
        (CellKind::Typed(CellType::Error), to_error_value(value).to_owned())
    } else {
        (CellKind::Typed(CellType::Boolean), value.to_string())
    })
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), RustyChunkerError> {
    let index = reader.read_u16()? as usize;
    Ok((CellKind::Styled(index), reader.read_f64()?.to_string()))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), RustyChunkerError> {
    let index = reader.read_u16()? as usize;
    Ok((CellKind::Styled(index), reader.read_rk_number()?))
}

fn read_label_sst_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), RustyChunkerError> {
    reader.skip(2)?;
    Ok((CellKind::Typed(CellType::SharedString), reader.read_usize()?.to_string()))
}

fn read_label_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), RustyChunkerError> {
    reader.skip(2)?;
    Ok((CellKind::Typed(CellType::InlineString), reader.read_xl_unicode_string()?))
}

/// Reads the cached result of a formula. A number is stored as is; other
/// results are tagged by 0xFFFF in the top bytes, and text results follow
/// in a STRING record.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String), RustyChunkerError> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    if formula & 0xFFFF_0000_0000_0000 != 0xFFFF_0000_0000_0000 {
        return Ok((CellKind::Styled(index), f64::from_bits(formula).to_string()));
    }
    match formula & 0xFF {
        0 => {
            while let Some(kind) = reader.next()? {
                match kind {
                    STRING => return Ok((CellKind::Typed(CellType::InlineString), reader.read_xl_unicode_string()?)),
                    SHR_FMLA | ARRAY | TABLE => continue,
                    _ => break,
                }
            }
            Err(XlsError::FormulaValueError(formula))?
        }
        1 => {
            let value = if (formula >> 16) & 0xFF != 0 { "1" } else { "0" };
            Ok((CellKind::Typed(CellType::Boolean), value.to_owned()))
        }
        2 => Ok((CellKind::Typed(CellType::Error), to_error_value(((formula >> 16) & 0xFF) as u8).to_owned())),
        3 => Ok((CellKind::Typed(CellType::InlineString), String::new())),
        _ => Err(XlsError::FormulaValueError(formula))?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::cfb::tests::compound_file;
    use crate::table::Temporal;
    use crate::table::Value;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record(kind: u16, body: &[u8]) -> Vec<u8> {
        [&kind.to_le_bytes()[..], &(body.len() as u16).to_le_bytes(), body].concat()
    }

    fn text(value: &str) -> Vec<u8> {
        [&(value.len() as u16).to_le_bytes()[..], &[0], value.as_bytes()].concat()
    }

    /// Cell record: row, column and style index, then the payload.
    fn cell(kind: u16, row: u16, col: u16, style: u16, payload: &[u8]) -> Vec<u8> {
        let body = [&row.to_le_bytes()[..], &col.to_le_bytes(), &style.to_le_bytes(), payload].concat();
        record(kind, &body)
    }

    fn rk(integer: u32) -> [u8; 4] {
        ((integer << 2) | 0x02).to_le_bytes()
    }

    fn formula(row: u16, col: u16, value: u64) -> Vec<u8> {
        let payload = [&value.to_le_bytes()[..], &[0; 8]].concat();
        cell(FORMULA, row, col, 0, &payload)
    }

    /// Workbook stream with the given globals records and one worksheet
    /// named `Stock`. XF 1 formats dates.
    fn workbook(globals: &[Vec<u8>], cells: &[Vec<u8>]) -> Vec<u8> {
        let bof = |kind: u16| record(BOF, &[&0x0600u16.to_le_bytes()[..], &kind.to_le_bytes(), &[0; 12]].concat());
        let mut prefix = [bof(0x0005), record(CODE_PAGE, &1200u16.to_le_bytes())].concat();
        prefix.extend(globals.concat());
        prefix.extend(record(FORMAT, &[&164u16.to_le_bytes()[..], &text("yyyy-mm-dd")].concat()));
        for format in [0u16, 164] {
            prefix.extend(record(XF, &[&[0, 0][..], &format.to_le_bytes(), &[0; 16]].concat()));
        }
        let strings = ["item", "qty", "since", "ok"];
        let mut sst = [8u32.to_le_bytes(), (strings.len() as u32).to_le_bytes()].concat();
        strings.iter().for_each(|string| sst.extend(text(string)));
        prefix.extend(record(SST, &sst));

        let bound_sheet = |position: u32, kind: u8, name: &str| {
            let body = [&position.to_le_bytes()[..], &[0, kind, name.len() as u8, 0], name.as_bytes()].concat();
            record(BOUND_SHEET8, &body)
        };
        let globals_size = prefix.len() + bound_sheet(0, 2, "Chart").len() + bound_sheet(0, 0, "Stock").len() + 4;
        let mut stream = prefix;
        stream.extend(bound_sheet(0, 2, "Chart"));
        stream.extend(bound_sheet(globals_size as u32, 0, "Stock"));
        stream.extend(record(EOF, &[]));
        stream.extend(bof(0x0010));
        stream.extend(cells.concat());
        stream.extend(record(EOF, &[]));
        stream
    }

    fn open(dir: &TempDir, stream: &[u8], options: &ReadOptions) -> Result<XlsSpreadsheet, RustyChunkerError> {
        let path = dir.path().join("book.xls");
        std::fs::write(&path, compound_file("Workbook", stream)).unwrap();
        XlsSpreadsheet::open(&path, options)
    }

    fn date(year: i32, month: u32, day: u32) -> Value {
        Value::Temporal(Temporal::Date(NaiveDate::from_ymd_opt(year, month, day).unwrap()))
    }

    fn stock() -> Vec<Vec<u8>> {
        let mut cells: Vec<Vec<u8>> = (0..4u16).map(|col| cell(LABEL_SST, 0, col, 0, &(col as u32).to_le_bytes())).collect();
        cells.push(cell(LABEL, 1, 0, 0, &text("bolt")));
        cells.push(cell(NUMBER, 1, 1, 0, &3.5f64.to_le_bytes()));
        cells.push(cell(RK, 1, 2, 1, &rk(45306)));
        cells.push(cell(BOOL_ERR, 1, 3, 0, &[1, 0]));
        cells.push(cell(LABEL, 2, 0, 0, &text("nut")));
        let mul_rk = [&2u16.to_le_bytes()[..], &1u16.to_le_bytes(), &0u16.to_le_bytes(), &rk(4), &1u16.to_le_bytes(), &rk(45307), &2u16.to_le_bytes()].concat();
        cells.push(record(MUL_RK, &mul_rk));
        cells.push(cell(BOOL_ERR, 2, 3, 0, &[0x2A, 1]));
        cells
    }

    #[test]
    fn worksheets_with_typed_cells() {
        let dir = TempDir::new().unwrap();
        let mut spreadsheet = open(&dir, &workbook(&[], &stock()), &ReadOptions::default()).unwrap();
        assert!(spreadsheet.is_workbook());
        assert_eq!(spreadsheet.sheet_names(), vec!["Stock"]);

        let grid = spreadsheet.read_sheet("Stock").unwrap();
        assert_eq!((grid.height(), grid.width()), (3, 4));
        assert_eq!(grid.get(0, 2), &Value::from("since"));
        assert_eq!(grid.get(1, 0), &Value::from("bolt"));
        assert_eq!(grid.get(1, 1), &Value::Number(3.5));
        assert_eq!(grid.get(1, 2), &date(2024, 1, 15));
        assert_eq!(grid.get(1, 3), &Value::Boolean(true));
        assert_eq!(grid.get(2, 1), &Value::Number(4.0));
        assert_eq!(grid.get(2, 2), &date(2024, 1, 16));
        assert_eq!(grid.get(2, 3), &Value::from("#N/A"));
        assert!(spreadsheet.read_sheet("Chart").is_err());
    }

    #[test]
    fn range_and_error_options() {
        let dir = TempDir::new().unwrap();
        let options = ReadOptions::parse(r#"{"range": "B2:D3", "error_as_null": true}"#).unwrap();
        let grid = open(&dir, &workbook(&[], &stock()), &options).unwrap().read_sheet("Stock").unwrap();
        assert_eq!((grid.height(), grid.width()), (2, 3));
        assert_eq!(grid.get(0, 0), &Value::Number(3.5));
        assert_eq!(grid.get(1, 1), &date(2024, 1, 16));
        assert!(grid.get(1, 2).is_null());
    }

    #[test]
    fn formula_results() {
        let dir = TempDir::new().unwrap();
        let cells = vec![
            formula(0, 0, 2.5f64.to_bits()),
            formula(0, 1, 0xFFFF_0000_0000_0000),
            record(SHR_FMLA, &[0; 10]),
            record(STRING, &text("hex")),
            formula(0, 2, 0xFFFF_0000_0001_0001),
            formula(0, 3, 0xFFFF_0000_0007_0002),
            formula(0, 4, 0xFFFF_0000_0000_0003),
        ];
        let grid = open(&dir, &workbook(&[], &cells), &ReadOptions::default()).unwrap().read_sheet("Stock").unwrap();
        assert_eq!(grid.width(), 4);
        assert_eq!(grid.get(0, 0), &Value::Number(2.5));
        assert_eq!(grid.get(0, 1), &Value::from("hex"));
        assert_eq!(grid.get(0, 2), &Value::Boolean(true));
        assert_eq!(grid.get(0, 3), &Value::from("#DIV/0!"));

        let dangling = vec![formula(0, 0, 0xFFFF_0000_0000_0000), cell(NUMBER, 0, 1, 0, &1f64.to_le_bytes())];
        let error = open(&dir, &workbook(&[], &dangling), &ReadOptions::default()).unwrap().read_sheet("Stock").unwrap_err();
        assert!(matches!(error, RustyChunkerError::XlsError(XlsError::FormulaValueError(_))));
    }

    #[test]
    fn date_system_and_protection() {
        let dir = TempDir::new().unwrap();
        let date1904 = record(DATE1904, &1u16.to_le_bytes());
        let cells = vec![cell(RK, 0, 0, 1, &rk(0))];
        let grid = open(&dir, &workbook(&[date1904], &cells), &ReadOptions::default()).unwrap().read_sheet("Stock").unwrap();
        assert_eq!(grid.get(0, 0), &date(1904, 1, 1));

        let file_pass = record(FILE_PASS, &[0; 6]);
        let error = open(&dir, &workbook(&[file_pass], &cells), &ReadOptions::default()).err().unwrap();
        assert!(matches!(
            error,
            RustyChunkerError::SpreadsheetError(SpreadsheetError::SpreadsheetPasswordProtectedError(_))
        ));

        let unknown = record(CODE_PAGE, &7u16.to_le_bytes());
        let error = open(&dir, &workbook(&[unknown], &cells), &ReadOptions::default()).err().unwrap();
        assert!(matches!(error, RustyChunkerError::XlsError(XlsError::CodePageError(7))));
    }
}
