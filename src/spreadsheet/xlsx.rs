use crate::error::RustyChunkerError;
use crate::error::ResultMessage;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::options::ReadOptions;
use crate::spreadsheet::options::WORKBOOK_NULLS;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use crate::table::Grid;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::path::Path;
use zip::ZipArchive;

// XML tag names for parsing Excel XLSX format
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts"); // Custom number formats container
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");   // Individual custom number format
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");  // Cell format indexes container
const TAG_FORMAT_INDEX: QName = QName(b"xf");         // Individual cell format index
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");   // Shared string table item
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");       // Phonetic text for Asian languages
const TAG_TEXT: QName = QName(b"t");                  // Text content within strings
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr"); // Workbook properties
const TAG_SHEET: QName = QName(b"sheet");             // Worksheet definition
const TAG_ROW: QName = QName(b"row");                 // Row in worksheet
const TAG_CELL: QName = QName(b"c");                  // Cell in worksheet
const TAG_INLINE_STRING: QName = QName(b"is");        // Inline string value
const TAG_VALUE: QName = QName(b"v");                 // Cell value content

/// Represents an Excel XLSX spreadsheet file
pub(crate) struct XlsxSpreadsheet {
    /// File name of the spreadsheet
    name: String,
    /// ZIP archive containing the XLSX file contents
    zip: ZipArchive<BufReader<File>>,
    /// Parsed number formats for cell type detection
    number_formats: Vec<CellType>,
    /// List of worksheets with (name, zip_path) pairs
    sheets: Vec<(String, String)>,
    /// Shared string table, referenced by index from cells
    shared_strings: Vec<String>,
    /// How cells are read
    options: ReadOptions,
}

impl XlsxSpreadsheet {
    /// Opens an XLSX spreadsheet file and parses its structure
    pub(crate) fn open(path: &Path, options: &ReadOptions) -> Result<XlsxSpreadsheet, RustyChunkerError> {
        let (mut zip, number_formats, sheets) = excel::open(path, load_workbook, load_number_formats)?;
        let shared_strings = load_shared_strings(&mut zip)?;
        Ok(XlsxSpreadsheet {
            name: path.display().to_string(),
            zip,
            number_formats,
            sheets,
            shared_strings,
            options: options.to_owned(),
        })
    }
}

impl Spreadsheet for XlsxSpreadsheet {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    fn is_workbook(&self) -> bool {
        true
    }

    /// Parses the worksheet XML and collects its cells, applying range filtering.
    fn read_sheet(&mut self, sheet_name: &str) -> Result<Grid, RustyChunkerError> {
        let zip_path = self.sheets
            .iter()
            .find(|(name, _)| name == sheet_name)
            .map(|(_, zip_path)| zip_path.to_owned())
            .ok_or_else(|| SpreadsheetError::SheetNotFoundError(self.name.to_owned(), sheet_name.to_owned()))?;

        let mut sheet = Sheet::new(sheet_name, &self.options, WORKBOOK_NULLS);
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut cell = Cell { row: 0, col: 0, kind: CellType::default(), value: String::new() };
        let mut reader = self.zip.required_xml_reader(&zip_path)?;
        match_xml_events!(reader => {
            Event::End(event) if event.name() == TAG_ROW => {
                row_count += 1;
                col_count = 0;
            }
            Event::Start(event) if event.name() == TAG_CELL => {
                (cell.row, cell.col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row_count, col_count));
                // Rows without a reference follow the previous explicit one
                row_count = cell.row;
                col_count = cell.col + 1;
                cell.value.clear();
                if sheet.after_row_upper_bound(cell.row) {
                    break;
                } else if sheet.contains(cell.row, cell.col) {
                    cell.kind = event.get_attribute_value("t")?.map(|t| {
                        match t.as_ref() {
                            "inlineStr" | "str" => CellType::InlineString,
                            "s" => CellType::SharedString,
                            "d" => CellType::IsoDateTime,
                            "b" => CellType::Boolean,
                            "e" => CellType::Error,
                            _ => CellType::Number,
                        }
                    }).unwrap_or(CellType::Number);
                    if let Some(format_id) = event.get_attribute_value("s")? {
                        if cell.kind == CellType::Number && !format_id.is_empty() {
                            let index = format_id.parse::<usize>()?;
                            cell.kind = self.number_formats.get(index).copied().unwrap_or(CellType::Number);
                        }
                    }
                } else {
                    cell.kind = CellType::default();
                }
            }
            Event::Start(event) if cell.kind != CellType::Empty && event.name() == TAG_INLINE_STRING => {
                cell.value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if cell.kind != CellType::Empty && event.name() == TAG_VALUE => {
                cell.value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::End(event) if event.name() == TAG_CELL => {
                if cell.kind != CellType::Empty && !cell.value.is_empty() {
                    sheet.push_cell(&cell, &self.shared_strings)
                        .with_prefix(&format!("Read cell {} of sheet '{}' failed", cell.reference(), sheet.name))?;
                }
                cell.kind = CellType::default();
            }
        });
        Ok(sheet.into_grid())
    }
}

/// Loads the shared string table; absent in workbooks without text cells.
fn load_shared_strings<R: Read + Seek>(zip: &mut ZipArchive<R>) -> Result<Vec<String>, RustyChunkerError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_reader("xl/sharedStrings.xml")? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
            shared_strings.push(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?);
        }
    });
    Ok(shared_strings)
}

/// Loads workbook structure and worksheet information from XLSX file
///
/// # Returns
/// Tuple of (worksheets, is_1904_date_system) where worksheets are (name, zip_path) pairs
fn load_workbook<R: Read + Seek>(zip: &mut ZipArchive<R>) -> Result<(Vec<(String, String)>, bool), RustyChunkerError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip.required_xml_reader("xl/workbook.xml")?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let name = event.get_local_attribute_value("name")?;
            let id = event.get_local_attribute_value("id")?;
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(&*id) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value.eq("1") || value.eq("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Loads number formats and cell styles from XLSX styles.xml file
///
/// # Returns
/// Vector of CellType values indexed by style ID
fn load_number_formats<R: Read + Seek>(zip: &mut ZipArchive<R>, is_1904: bool) -> Result<Vec<CellType>, RustyChunkerError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();

    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                let style = CellType::parse_custom_number_format(&format, is_1904);
                custom_formats.insert(id.to_string(), style);
            }
        }

        Event::Start(event) if event.name() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.name() == TAG_FORMAT_INDEXES => break,
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?.unwrap_or(Cow::Borrowed("0"));
            format_indexes.push(id.to_string());
        }
    });

    Ok(excel::load_number_formats(format_indexes, custom_formats, is_1904))
}

/// Reads string value from XML content, handling text and CDATA sections
///
/// Skips phonetic text annotations. With `is_text_content` every text node
/// counts, otherwise only the content of `<t>` elements.
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, RustyChunkerError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_text(&event)?,
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_reference(&event)?,
    });
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn string_value(xml: &str, end_tag: QName, is_text_content: bool) -> String {
        let mut reader = XmlReader::new(Cursor::new(xml.as_bytes()));
        read_string_value(&mut reader, end_tag, is_text_content).unwrap()
    }

    #[test]
    fn rich_text_skips_phonetic_runs() {
        let xml = "<r><t>東京</t></r><rPh><t>トウキョウ</t></rPh><r><t xml:space=\"preserve\"> &amp; more</t></r></si>";
        assert_eq!(string_value(xml, TAG_SHARED_STRING_ITEM, false), "東京 & more");
    }

    #[test]
    fn plain_value() {
        assert_eq!(string_value("42.5</v>", TAG_VALUE, true), "42.5");
    }
}
