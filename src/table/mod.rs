//! # Table Extraction
//!
//! Turns one loaded sheet into records: the grid is segmented into
//! regions, every region gets a resolved header, and every data row of
//! the resulting table becomes a record.
pub mod grid;
pub mod header;
pub mod record;
pub mod segment;

pub use grid::Grid;
pub use grid::Temporal;
pub use grid::Value;
pub use header::normalize;
pub use header::Table;
pub use record::project;
pub use record::Record;
pub use segment::segment;
pub use segment::Region;

/// Tables found in one grid, flattened into records.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Header of every table, in region order
    pub headers: Vec<Vec<String>>,
    /// Records of every table, in region then row order
    pub records: Vec<Record>,
}

/// Extracts the records of every table found in the grid.
pub fn extract(grid: &Grid, rotated: bool, sheet_tag: Option<&str>) -> Extraction {
    let mut extraction = Extraction::default();
    for region in segment(grid) {
        let table = record::resolve_table(&region, rotated);
        extraction.records.extend(project(&table, sheet_tag));
        extraction.headers.push(table.header);
    }
    extraction
}
