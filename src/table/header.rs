use crate::table::grid::Value;
use crate::table::segment::Region;
use std::collections::HashSet;

/// Prefix of synthesized labels, also recognized as a placeholder when a
/// header row already carries it.
pub(crate) const PLACEHOLDER_PREFIX: &str = "Unnamed";

/// A region with a resolved header row and its remaining data rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    /// One unique label per column
    pub header: Vec<String>,
    /// Data rows, each `header.len()` cells wide
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn width(&self) -> usize {
        self.header.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A header candidate: the resolved labels and how many were synthesized.
struct Candidate {
    labels: Vec<String>,
    synthesized: usize,
}

impl Candidate {
    /// Resolves a row into labels, replacing placeholders with
    /// `Unnamed{column}`.
    fn from_row(row: &[Value], width: usize) -> Self {
        let mut synthesized = 0usize;
        let labels = (0..width)
            .map(|col| match row.get(col).and_then(label_of) {
                Some(label) => label,
                None => {
                    synthesized += 1;
                    format!("{PLACEHOLDER_PREFIX}{col}")
                }
            })
            .collect();
        Candidate { labels, synthesized }
    }

    /// More than half of the columns needed a synthesized label.
    fn is_invalid(&self) -> bool {
        self.synthesized * 2 > self.labels.len()
    }
}

/// Returns the declared label of a header cell, or `None` when the cell is
/// missing or holds a placeholder.
fn label_of(cell: &Value) -> Option<String> {
    let label = cell.to_canonical_string()?;
    let label = label.trim();
    if label.is_empty() || label.starts_with(PLACEHOLDER_PREFIX) || label.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(label.to_owned())
    }
}

/// Makes repeated labels unique by suffixing `.1`, `.2`, ... to the later
/// occurrences.
fn deduplicate(labels: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(labels.len());
    labels
        .into_iter()
        .map(|label| {
            let mut unique = label.to_owned();
            let mut suffix = 0usize;
            while seen.contains(&unique) {
                suffix += 1;
                unique = format!("{label}.{suffix}");
            }
            seen.insert(unique.to_owned());
            unique
        })
        .collect()
}

/// Resolves the header of a region.
pub fn normalize(region: &Region) -> Table {
    normalize_rows(region.to_rows())
}

/// Resolves the header of a block of rows.
///
/// The first row is the header candidate. While more than half of a
/// candidate's labels had to be synthesized, the candidate is dropped and
/// the next row is tried instead. When the last row is dropped the result
/// keeps that row's labels and has no data rows.
pub fn normalize_rows(rows: Vec<Vec<Value>>) -> Table {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut rows = rows.into_iter();
    let mut candidate = match rows.next() {
        Some(row) => Candidate::from_row(&row, width),
        None => return Table::default(),
    };
    let mut remaining: Vec<Vec<Value>> = rows.collect();
    let mut offset = 0usize;
    while candidate.is_invalid() && offset < remaining.len() {
        candidate = Candidate::from_row(&remaining[offset], width);
        offset += 1;
    }
    if candidate.is_invalid() {
        remaining.clear();
    } else {
        remaining.drain(..offset);
    }
    for row in remaining.iter_mut() {
        row.resize(width, Value::Null);
    }
    Table {
        header: deduplicate(candidate.labels),
        rows: remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[Option<&str>]) -> Vec<Value> {
        cells.iter().map(|cell| Value::from(*cell)).collect()
    }

    #[test]
    fn first_row_is_header() {
        let table = normalize_rows(vec![row(&[Some("Name"), Some("Age")]), row(&[Some("Ann"), Some("7")])]);
        assert_eq!(table.header, vec!["Name", "Age"]);
        assert_eq!(table.rows, vec![row(&[Some("Ann"), Some("7")])]);
    }

    #[test]
    fn minority_placeholders_are_synthesized() {
        let table = normalize_rows(vec![
            row(&[Some("Name"), None, Some("City")]),
            row(&[Some("Ann"), Some("7"), Some("Oslo")]),
        ]);
        assert_eq!(table.header, vec!["Name", "Unnamed1", "City"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn majority_placeholders_promote_next_row() {
        let table = normalize_rows(vec![
            row(&[Some("Name"), Some("Unnamed: 1"), Some("Unnamed: 2")]),
            row(&[Some("First"), Some("Last"), Some("Age")]),
            row(&[Some("Ann"), Some("Lee"), Some("7")]),
        ]);
        assert_eq!(table.header, vec!["First", "Last", "Age"]);
        assert_eq!(table.rows, vec![row(&[Some("Ann"), Some("Lee"), Some("7")])]);
    }

    #[test]
    fn exactly_half_placeholders_is_valid() {
        let table = normalize_rows(vec![row(&[Some("a"), Some("nan")]), row(&[Some("1"), Some("2")])]);
        assert_eq!(table.header, vec!["a", "Unnamed1"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn all_rows_invalid_yields_empty_table() {
        let table = normalize_rows(vec![
            row(&[None, None, Some("x")]),
            row(&[Some("y"), None, None]),
        ]);
        assert_eq!(table.header, vec!["y", "Unnamed1", "Unnamed2"]);
        assert!(table.is_empty());
    }

    #[test]
    fn numeric_labels_are_canonical() {
        let table = normalize_rows(vec![vec![Value::from(2023.0), Value::from(true)]]);
        assert_eq!(table.header, vec!["2023", "true"]);
    }

    #[test]
    fn duplicate_labels_are_suffixed() {
        let table = normalize_rows(vec![row(&[Some("a"), Some("a"), Some("a.1"), Some("a")])]);
        assert_eq!(table.header, vec!["a", "a.1", "a.1.1", "a.2"]);
    }
}
