//! Microsoft Office Excel Helpers
use crate::error::RustyChunkerError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;
use zip::ZipArchive;

/// XML tag name for relationship elements in Excel files
const TAG_RELATIONSHIP: &[u8] = b"Relationship";

/// Signature of OLE compound files, which wrap encrypted OOXML packages
const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Opened Excel package: archive, number formats by style index, and
/// worksheets as (name, zip path) pairs.
pub(super) type ExcelPackage<R> = (ZipArchive<R>, Vec<CellType>, Vec<(String, String)>);

/// Opens an Excel file and loads its contents
///
/// # Arguments
/// * `path` - Path to the Excel file
/// * `load_workbook` - Function to load workbook metadata and sheets
/// * `load_number_formats` - Function to load number formatting information
pub(super) fn open<W, F>(path: &Path, load_workbook: W, load_number_formats: F) -> Result<ExcelPackage<BufReader<File>>, RustyChunkerError>
where
    W: Fn(&mut ZipArchive<BufReader<File>>) -> Result<(Vec<(String, String)>, bool), RustyChunkerError>,
    F: Fn(&mut ZipArchive<BufReader<File>>, bool) -> Result<Vec<CellType>, RustyChunkerError>,
{
    let file_name = path.display().to_string();
    let mut reader = BufReader::new(File::open(path)?);

    // Check if password protected
    if is_password_protected(&mut reader)? {
        Err(SpreadsheetError::SpreadsheetPasswordProtectedError(file_name.to_owned()))?;
    }

    let mut zip = ZipArchive::new(reader)?;
    let (sheets, is_1904) = load_workbook(&mut zip)?;
    if sheets.is_empty() {
        Err(SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?
    }

    let number_formats = load_number_formats(&mut zip, is_1904)?;
    Ok((zip, number_formats, sheets))
}

/// Loads worksheet relationships from an Excel file
///
/// # Returns
/// Mapping of relationship IDs to worksheet paths
pub(super) fn load_relationships<R: Read + Seek>(zip: &mut ZipArchive<R>, path: &str) -> Result<HashMap<String, String>, RustyChunkerError> {
    let mut reader = zip.required_xml_reader(path)?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            // Only process worksheet relationships
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Maps format indexes to cell types using custom and built-in formats
pub(super) fn load_number_formats(format_indexes: Vec<String>, custom_formats: HashMap<String, CellType>, is_1904: bool) -> Vec<CellType> {
    format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Normalizes a relationship target to its location within the zip archive
pub(crate) fn to_zip_path(path: Cow<'_, str>) -> String {
    if let Some(absolute) = path.strip_prefix('/') {
        absolute.to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Checks if an Excel file is password protected.
/// Encrypted packages are stored in an OLE compound file instead of a zip archive.
fn is_password_protected<R: Read + Seek>(reader: &mut R) -> Result<bool, RustyChunkerError> {
    let mut signature = [0u8; 8];
    let length = reader.read(&mut signature)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(length == signature.len() && signature == CFB_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn zip_paths() {
        assert_eq!(to_zip_path(Cow::from("worksheets/sheet1.xml")), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path(Cow::from("/xl/worksheets/sheet1.xml")), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path(Cow::from("xl/worksheets/sheet2.xml")), "xl/worksheets/sheet2.xml");
    }

    #[test]
    fn number_formats_by_style() {
        let custom = HashMap::from([("164".to_owned(), CellType::NumberDate1900)]);
        let formats = load_number_formats(vec!["0".to_owned(), "164".to_owned(), "22".to_owned()], custom, false);
        assert_eq!(formats, vec![CellType::Number, CellType::NumberDate1900, CellType::NumberDateTime1900]);
    }

    #[test]
    fn compound_file_is_password_protected() {
        let mut encrypted = Cursor::new([CFB_SIGNATURE.to_vec(), vec![0u8; 8]].concat());
        assert!(is_password_protected(&mut encrypted).unwrap());
        assert_eq!(encrypted.position(), 0);
        assert!(!is_password_protected(&mut Cursor::new(b"PK\x03\x04".to_vec())).unwrap());
    }
}
