use crate::error::ResultMessage;
use crate::error::RustyChunkerError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlTextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::options::ReadOptions;
use crate::spreadsheet::options::WORKBOOK_NULLS;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use crate::table::Grid;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::path::Path;
use thiserror::Error;
use zip::ZipArchive;

/// ODS file MIME type identifier
const MIME_TYPE: &str = "application/vnd.oasis.opendocument.spreadsheet";
/// XML element name for spreadsheet root
const SPREADSHEET: QName = QName(b"office:spreadsheet");
/// XML element name for table (sheet)
const TABLE: QName = QName(b"table:table");
/// XML element name for table row
const TABLE_ROW: QName = QName(b"table:table-row");
/// XML element name for table cell
const TABLE_CELL: QName = QName(b"table:table-cell");
/// XML element name for covered table cell (merged cells)
const TABLE_COVERED_CELL: QName = QName(b"table:covered-table-cell");
/// XML element name for annotations (comments)
const ANNOTATION: QName = QName(b"office:annotation");
/// XML element name for paragraph text
const PARAGRAPH: QName = QName(b"text:p");
/// XML element name for string (space) text
const STRING: QName = QName(b"text:s");

/// Error types specific to ODS spreadsheet processing
#[derive(Error, Debug)]
pub enum OdsError {
    /// Invalid ODS MIME type detected in file
    #[error("Invalid ODS MIME type '{0}'")]
    MimeTypeError(String),
}

/// ODS spreadsheet handler for reading OpenDocument Spreadsheet files
pub(crate) struct OdsSpreadsheet {
    /// Name of the ODS file
    name: String,
    /// ZIP archive containing the ODS file contents
    zip: ZipArchive<BufReader<File>>,
    /// Table names in document order
    sheets: Vec<String>,
    /// How cells are read
    options: ReadOptions,
}

impl OdsSpreadsheet {
    /// Opens an ODS file, validates its format, and lists its tables
    pub(crate) fn open(path: &Path, options: &ReadOptions) -> Result<Self, RustyChunkerError> {
        let file_name = path.display().to_string();
        let file = File::open(path)?;
        let mut zip = ZipArchive::new(BufReader::new(file))?;
        check_mime(&mut zip)?;
        if is_password_protected(&mut zip)? {
            Err(SpreadsheetError::SpreadsheetPasswordProtectedError(file_name.to_owned()))?;
        }
        let sheets = load_sheet_names(&mut zip)?;
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?;
        }
        Ok(OdsSpreadsheet {
            name: file_name,
            zip,
            sheets,
            options: options.to_owned(),
        })
    }
}

impl Spreadsheet for OdsSpreadsheet {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.to_owned()
    }

    fn is_workbook(&self) -> bool {
        true
    }

    /// Reads one table of content.xml, expanding repeated rows and columns
    /// only where they carry values.
    fn read_sheet(&mut self, sheet_name: &str) -> Result<Grid, RustyChunkerError> {
        let mut reader = self.zip.required_xml_reader("content.xml")?;
        let mut found = false;
        match_xml_events!(reader => {
            Event::End(event) if event.name() == SPREADSHEET => break,
            Event::Start(event) if event.name() == TABLE => {
                if event.get_attribute_value("table:name")?.map(|name| name == sheet_name).unwrap_or(false) {
                    found = true;
                    break;
                }
            }
        });
        if !found {
            Err(SpreadsheetError::SheetNotFoundError(self.name.to_owned(), sheet_name.to_owned()))?;
        }

        let mut sheet = Sheet::new(sheet_name, &self.options, WORKBOOK_NULLS);
        let mut row = 0usize;
        let mut col = 0usize;
        let mut row_count = 1usize;
        let mut col_count = 1usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        let mut element_context = false; // Reading paragraph children of a string cell
        let mut comment_context = false; // Inside an annotation
        match_xml_events!(reader => {
            Event::End(event) if event.name() == TABLE => break,
            Event::Start(event) if event.name() == TABLE_ROW => {
                row_count = event.parse_attribute_value("table:number-rows-repeated")?.unwrap_or(1);
                col = 0;
            }
            Event::End(event) if event.name() == TABLE_ROW => {
                row += row_count;
                if sheet.after_row_upper_bound(row) {
                    break;
                }
            }
            Event::Start(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                value.clear();
                col_count = event.parse_attribute_value::<usize>("table:number-columns-repeated")?.unwrap_or(1);
                let value_type = event.get_attribute_value("office:value-type")?;
                kind = match value_type.as_deref() {
                    None => CellType::Empty,
                    Some("boolean") => CellType::Boolean,
                    Some("date") => CellType::IsoDateTime,
                    Some("time") => CellType::IsoDuration,
                    Some("string") if event.get_attribute_value("calcext:value-type")?.map(|cow| cow == "error").unwrap_or(false) => CellType::Error,
                    Some("string") => CellType::InlineString,
                    Some(_) => CellType::Number,
                };
                let attribute = match kind {
                    CellType::Boolean => "office:boolean-value",
                    CellType::IsoDateTime => "office:date-value",
                    CellType::IsoDuration => "office:time-value",
                    _ => "office:value",
                };
                match kind {
                    CellType::Empty => (),
                    CellType::InlineString | CellType::Error => element_context = true,
                    CellType::Boolean => {
                        let truth = event.get_attribute_value(attribute)?.map(|cow| cow != "false" && cow != "0").unwrap_or(false);
                        value.push_str(if truth { "1" } else { "0" });
                    }
                    _ => if let Some(data) = event.get_attribute_value(attribute)? {
                        value.push_str(&data);
                    }
                }
            }
            Event::End(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                if kind != CellType::Empty && !value.is_empty() {
                    for row_number in row..row + row_count {
                        if sheet.after_row_upper_bound(row_number) {
                            break;
                        }
                        for col_number in col..col + col_count {
                            let cell = Cell { row: row_number, col: col_number, kind, value: value.to_owned() };
                            sheet.push_cell(&cell, &[])
                                .with_prefix(&format!("Read cell {} of sheet '{}' failed", cell.reference(), sheet.name))?;
                        }
                    }
                }
                col += col_count;
                kind = CellType::Empty;
                element_context = false;
                comment_context = false;
            }
            Event::Start(event) if element_context && event.name() == ANNOTATION => comment_context = true,
            Event::End(event) if element_context && comment_context && event.name() == ANNOTATION => comment_context = false,
            Event::Start(event) if element_context && !comment_context && event.name() == PARAGRAPH => {
                if !value.is_empty() {
                    value.push('\n');
                }
            }
            Event::Start(event) if element_context && !comment_context && event.name() == STRING => {
                let count = event.parse_attribute_value("text:c")?.unwrap_or(1);
                for _ in 0..count {
                    value.push(' ');
                }
            }
            Event::Text(event) if element_context && !comment_context => value.push_text(&event)?,
            Event::GeneralRef(event) if element_context && !comment_context => value.push_reference(&event)?,
        });
        Ok(sheet.into_grid())
    }
}

/// Lists table names of content.xml in document order.
fn load_sheet_names<R: Read + Seek>(zip: &mut ZipArchive<R>) -> Result<Vec<String>, RustyChunkerError> {
    let mut reader = zip.required_xml_reader("content.xml")?;
    let mut sheets = Vec::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == SPREADSHEET => break,
        Event::Start(event) if event.name() == TABLE => {
            if let Some(name) = event.get_attribute_value("table:name")? {
                sheets.push(name.to_string());
            }
        }
    });
    Ok(sheets)
}

/// Validates the MIME type entry when the archive carries one
fn check_mime<R: Read + Seek>(zip: &mut ZipArchive<R>) -> Result<(), RustyChunkerError> {
    if let Some(file) = &mut zip.file("mimetype")? {
        let mut mime = String::new();
        file.read_to_string(&mut mime)?;
        if !mime.trim().starts_with(MIME_TYPE) {
            Err(OdsError::MimeTypeError(mime.trim().to_owned()))?;
        }
    }
    Ok(())
}

/// Checks if the ODS file is password protected by examining the manifest
fn is_password_protected<R: Read + Seek>(zip: &mut ZipArchive<R>) -> Result<bool, RustyChunkerError> {
    let mut reader = match zip.xml_reader("META-INF/manifest.xml")? {
        Some(reader) => reader,
        None => return Ok(false),
    };
    let mut in_file_entry = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == QName(b"manifest:file-entry") => in_file_entry = true,
        Event::End(event) if event.name() == QName(b"manifest:file-entry") => in_file_entry = false,
        Event::Start(event) if in_file_entry && event.name() == QName(b"manifest:encryption-data") => {
            return Ok(true);
        }
    });
    Ok(false)
}
