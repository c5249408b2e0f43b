use crate::error::RustyChunkerError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::options::ReadOptions;
use crate::spreadsheet::range::Range;
use crate::table::Grid;
use crate::table::Value;
use std::collections::HashSet;

/// Collects the cells of one sheet and tracks the bounds of the data they cover.
pub(crate) struct Sheet {
    /// Sheet name
    pub(crate) name: String,
    /// Non-null cells as (row, col, value)
    cells: Vec<(usize, usize, Value)>,
    /// Expected data range (user-specified)
    range: Range,
    /// Text values read as null
    nulls: HashSet<String>,
    /// Whether error cells are dropped
    error_as_null: bool,
    /// Actual data range (determined from cell data)
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    /// Creates an empty sheet reading with `options`; `default_nulls` apply
    /// when the options carry no null literals.
    pub(crate) fn new(name: &str, options: &ReadOptions, default_nulls: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            cells: Vec::new(),
            range: options.range,
            nulls: options.null_literals(default_nulls),
            error_as_null: options.error_as_null,
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    /// Returns true if the sheet holds no value.
    pub(crate) fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Checks if a row is after the upper bound of the specified range.
    pub(crate) fn after_row_upper_bound(&self, row: usize) -> bool {
        self.range.after_row_upper_bound(row)
    }

    /// Checks if a cell at (row, col) is within the specified range.
    pub(crate) fn contains(&self, row: usize, col: usize) -> bool {
        self.range.contains(row, col)
    }

    /// Resolves a raw cell and adds it to the sheet.
    pub(crate) fn push_cell(&mut self, cell: &Cell, shared_strings: &[String]) -> Result<(), RustyChunkerError> {
        if !self.contains(cell.row, cell.col) || (self.error_as_null && cell.kind == CellType::Error) {
            return Ok(());
        }
        let value = cell.to_value(shared_strings)?;
        self.push(cell.row, cell.col, value);
        Ok(())
    }

    /// Adds a typed value to the sheet; nulls and null literals are skipped.
    pub(crate) fn push(&mut self, row: usize, col: usize, value: Value) {
        if !self.contains(row, col) || value.is_null() {
            return;
        }
        let value = match value {
            Value::Text(text) if self.is_null_literal(&text) => return,
            value => value,
        };
        self.update_bound(row, col);
        self.cells.push((row, col, value));
    }

    /// Whether the raw text is read as null. Delimited text checks its
    /// fields before typing them.
    pub(crate) fn is_null_literal(&self, text: &str) -> bool {
        self.nulls.contains(text)
    }

    /// Updates the actual data range boundaries based on cell positions.
    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_lower_bound.map(|lower| row < lower).unwrap_or(true) {
            self.row_lower_bound = Some(row);
        }
        if self.row_upper_bound.map(|upper| upper < row).unwrap_or(true) {
            self.row_upper_bound = Some(row);
        }
        if self.col_lower_bound.map(|lower| col < lower).unwrap_or(true) {
            self.col_lower_bound = Some(col);
        }
        if self.col_upper_bound.map(|upper| upper < col).unwrap_or(true) {
            self.col_upper_bound = Some(col);
        }
    }

    /// Lays the cells out as a grid spanning the used bounds.
    pub(crate) fn into_grid(self) -> Grid {
        let bounds = self.row_lower_bound.zip(self.row_upper_bound).zip(self.col_lower_bound.zip(self.col_upper_bound));
        let Some(((row_lower, row_upper), (col_lower, col_upper))) = bounds else {
            return Grid::default();
        };
        let width = col_upper - col_lower + 1;
        let mut rows = vec![vec![Value::Null; width]; row_upper - row_lower + 1];
        for (row, col, value) in self.cells {
            rows[row - row_lower][col - col_lower] = value;
        }
        Grid::new(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(sheet: &mut Sheet, row: usize, col: usize, value: &str) {
        sheet.push(row, col, Value::from(value));
    }

    #[test]
    fn sheet_initial() {
        let sheet = Sheet::new("", &ReadOptions::default(), &[""]);
        assert!(sheet.is_empty());
        assert_eq!(sheet.row_lower_bound, None);
        assert_eq!(sheet.col_upper_bound, None);
        assert!(sheet.into_grid().is_empty());
    }

    #[test]
    fn sheet_update() {
        let mut sheet = Sheet::new("", &ReadOptions::default(), &[""]);
        text(&mut sheet, 1, 3, "b");
        text(&mut sheet, 1, 1, "a");
        text(&mut sheet, 3, 1, "c");
        text(&mut sheet, 3, 3, "d");

        assert_eq!(sheet.row_lower_bound, Some(1));
        assert_eq!(sheet.row_upper_bound, Some(3));
        assert_eq!(sheet.col_lower_bound, Some(1));
        assert_eq!(sheet.col_upper_bound, Some(3));

        let grid = sheet.into_grid();
        assert_eq!((grid.height(), grid.width()), (3, 3));
        assert_eq!(grid.get(0, 0), &Value::from("a"));
        assert_eq!(grid.get(0, 2), &Value::from("b"));
        assert!(grid.get(1, 1).is_null());
        assert_eq!(grid.get(2, 2), &Value::from("d"));
    }

    #[test]
    fn sheet_skips_null_literals() {
        let mut sheet = Sheet::new("", &ReadOptions::default(), &["", "NA"]);
        text(&mut sheet, 0, 0, "NA");
        text(&mut sheet, 0, 1, "");
        sheet.push(0, 2, Value::Null);
        assert!(sheet.is_empty());
        text(&mut sheet, 2, 2, "kept");
        assert_eq!(sheet.into_grid().height(), 1);
    }

    #[test]
    fn sheet_update_with_range() {
        let options = ReadOptions::parse(r#"{"range": "B2:C3"}"#).unwrap();
        let mut sheet = Sheet::new("", &options, &[""]);
        text(&mut sheet, 0, 0, "outside");
        text(&mut sheet, 1, 1, "a");
        text(&mut sheet, 2, 2, "b");
        text(&mut sheet, 3, 3, "outside");
        assert!(sheet.after_row_upper_bound(3));

        let grid = sheet.into_grid();
        assert_eq!((grid.height(), grid.width()), (2, 2));
        assert_eq!(grid.get(1, 1), &Value::from("b"));
    }

    #[test]
    fn sheet_error_cells() {
        let error = Cell { row: 0, col: 0, kind: CellType::Error, value: "#DIV/0!".to_owned() };

        let mut sheet = Sheet::new("", &ReadOptions::default(), &[""]);
        sheet.push_cell(&error, &[]).unwrap();
        assert_eq!(sheet.into_grid().get(0, 0), &Value::from("#DIV/0!"));

        let options = ReadOptions { error_as_null: true, ..ReadOptions::default() };
        let mut sheet = Sheet::new("", &options, &[""]);
        sheet.push_cell(&error, &[]).unwrap();
        assert!(sheet.is_empty());
    }
}
