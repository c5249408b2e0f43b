use crate::config::ConfigurationError;
use crate::spreadsheet::reference::col_to_index;
use crate::spreadsheet::reference::row_to_index;
use regex::Regex;

/// Represents an Excel-style cell range with optional boundaries.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Range {
    /// Lower row bound (0-based index), None for unbounded
    pub row_lower_bound: Option<usize>,
    /// Upper row bound (0-based index), None for unbounded
    pub row_upper_bound: Option<usize>,
    /// Lower column bound (0-based index), None for unbounded
    pub col_lower_bound: Option<usize>,
    /// Upper column bound (0-based index), None for unbounded
    pub col_upper_bound: Option<usize>,
}

impl Range {
    /// Checks if a row is after the upper bound.
    pub(crate) fn after_row_upper_bound(&self, row: usize) -> bool {
        self.row_upper_bound.map(|upper| upper < row).unwrap_or(false)
    }

    /// Checks if a cell at (row, col) is within the range.
    pub(crate) fn contains(&self, row: usize, col: usize) -> bool {
        self.row_lower_bound.map(|lower| lower <= row).unwrap_or(true)
            && !self.after_row_upper_bound(row)
            && self.col_lower_bound.map(|lower| lower <= col).unwrap_or(true)
            && self.col_upper_bound.map(|upper| col <= upper).unwrap_or(true)
    }
}

impl TryFrom<&str> for Range {
    type Error = ConfigurationError;

    /// Parses an Excel-style range string (e.g., "A1", "B2:C5", "A:C", "3:10", "B2:").
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let pattern = Regex::new(r"^([A-Z]*)(\d*)(:([A-Z]*)(\d*))?$").expect("Hardcode regex pattern");
        let upper = value.trim().to_ascii_uppercase();
        let captures = pattern
            .captures(upper.as_str())
            .ok_or_else(|| ConfigurationError::RangeError(value.to_owned()))?;
        let part = |index: usize| captures.get(index).map(|matcher| matcher.as_str()).filter(|text| !text.is_empty());
        let parse = |index: usize, convert: fn(&str) -> Option<usize>| -> Result<Option<usize>, ConfigurationError> {
            part(index)
                .map(|text| convert(text).ok_or_else(|| ConfigurationError::RangeError(value.to_owned())))
                .transpose()
        };
        let range = Range {
            col_lower_bound: parse(1, col_to_index)?,
            row_lower_bound: parse(2, row_to_index)?,
            col_upper_bound: parse(4, col_to_index)?,
            row_upper_bound: parse(5, row_to_index)?,
        };
        let inverted = |lower: Option<usize>, upper: Option<usize>| lower.zip(upper).map(|(l, u)| u < l).unwrap_or(false);
        if inverted(range.row_lower_bound, range.row_upper_bound) || inverted(range.col_lower_bound, range.col_upper_bound) {
            Err(ConfigurationError::RangeError(value.to_owned()))
        } else {
            Ok(range)
        }
    }
}
