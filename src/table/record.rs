use crate::table::grid::Value;
use crate::table::header::normalize_rows;
use crate::table::header::Table;
use crate::table::segment::Region;
use serde::Serialize;
use serde_json::Map;
use serde_json::Number;

/// Field name carrying the sheet tag.
pub const SHEET_FIELD: &str = "sheet";

/// One data row rendered as an ordered `label -> value` mapping.
/// Null cells have no entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record(Map<String, serde_json::Value>);

impl Record {
    pub fn new() -> Self {
        Record(Map::new())
    }

    /// Sets a field; an existing field keeps its position.
    pub fn insert(&mut self, key: &str, value: serde_json::Value) {
        self.0.insert(key.to_owned(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compact JSON text of the record, keys in header order.
    pub fn to_json(&self) -> String {
        serde_json::Value::Object(self.0.clone()).to_string()
    }
}

impl<const N: usize> From<[(&str, serde_json::Value); N]> for Record {
    fn from(fields: [(&str, serde_json::Value); N]) -> Self {
        let mut record = Record::new();
        for (key, value) in fields {
            record.insert(key, value);
        }
        record
    }
}

/// Converts a cell to its record value. Numbers and booleans keep their
/// JSON type, everything else becomes its canonical string.
fn to_json_value(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::Null => None,
        Value::Boolean(boolean) => Some(serde_json::Value::Bool(*boolean)),
        Value::Number(number) if number.is_finite() && number.fract() == 0.0 && number.abs() < 9.0e15 => {
            Some(serde_json::Value::Number(Number::from(*number as i64)))
        }
        Value::Number(number) => Some(
            Number::from_f64(*number)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(number.to_string())),
        ),
        Value::Text(_) | Value::Temporal(_) => value.to_canonical_string().map(serde_json::Value::String),
    }
}

/// Transposes a block of rows; the former first column becomes the first row.
pub fn rotate(rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|col| {
            rows.iter()
                .map(|row| row.get(col).cloned().unwrap_or_default())
                .collect()
        })
        .collect()
}

/// Drops the columns that are null in every data row, then the rows that
/// are null in every column. A table without data rows keeps its header.
pub fn drop_null_lines(table: Table) -> Table {
    if table.rows.is_empty() {
        return table;
    }
    let keep: Vec<usize> = (0..table.width())
        .filter(|col| table.rows.iter().any(|row| !row[*col].is_null()))
        .collect();
    let header = keep.iter().map(|col| table.header[*col].to_owned()).collect();
    let rows = table
        .rows
        .into_iter()
        .map(|row| keep.iter().map(|col| row[*col].to_owned()).collect::<Vec<Value>>())
        .filter(|row| row.iter().any(|cell| !cell.is_null()))
        .collect();
    Table { header, rows }
}

/// Emits one record per data row, in row order, with null fields omitted
/// and the sheet tag attached when given.
pub fn project(table: &Table, sheet_tag: Option<&str>) -> Vec<Record> {
    table
        .rows
        .iter()
        .map(|row| {
            let mut record = Record::new();
            for (label, cell) in table.header.iter().zip(row) {
                if let Some(value) = to_json_value(cell) {
                    record.insert(label, value);
                }
            }
            if let Some(tag) = sheet_tag {
                record.insert(SHEET_FIELD, serde_json::Value::String(tag.to_owned()));
            }
            record
        })
        .collect()
}

/// Turns a region into a normalized table, rotating it first if asked.
pub fn resolve_table(region: &Region, rotated: bool) -> Table {
    let rows = region.to_rows();
    let rows = if rotated { rotate(rows) } else { rows };
    drop_null_lines(normalize_rows(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::grid::Grid;
    use crate::table::grid::Temporal;
    use crate::table::segment::segment;
    use chrono::NaiveDate;
    use serde_json::json;

    fn row(cells: &[Option<&str>]) -> Vec<Value> {
        cells.iter().map(|cell| Value::from(*cell)).collect()
    }

    #[test]
    fn records_omit_null_fields() {
        let table = Table {
            header: vec!["a".to_owned(), "b".to_owned()],
            rows: vec![row(&[Some("1"), None]), row(&[None, Some("2")])],
        };
        let records = project(&table, None);
        assert_eq!(records, vec![Record::from([("a", json!("1"))]), Record::from([("b", json!("2"))])]);
    }

    #[test]
    fn values_keep_json_types() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let table = Table {
            header: vec!["n".to_owned(), "f".to_owned(), "b".to_owned(), "d".to_owned()],
            rows: vec![vec![
                Value::from(42.0),
                Value::from(0.5),
                Value::from(true),
                Value::Temporal(Temporal::Date(date)),
            ]],
        };
        let records = project(&table, None);
        assert_eq!(records[0].to_json(), r#"{"n":42,"f":0.5,"b":true,"d":"2024-02-29"}"#);
    }

    #[test]
    fn sheet_tag_is_appended_or_replaced() {
        let table = Table {
            header: vec!["sheet".to_owned(), "x".to_owned()],
            rows: vec![row(&[Some("old"), Some("1")])],
        };
        let records = project(&table, Some("Q1"));
        assert_eq!(records[0].to_json(), r#"{"sheet":"Q1","x":"1"}"#);

        let table = Table {
            header: vec!["x".to_owned()],
            rows: vec![row(&[Some("1")])],
        };
        let records = project(&table, Some("Q1"));
        assert_eq!(records[0].keys().collect::<Vec<_>>(), vec!["x", "sheet"]);
    }

    #[test]
    fn null_columns_and_rows_are_dropped() {
        let table = Table {
            header: vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
            rows: vec![
                row(&[Some("1"), None, Some("2")]),
                row(&[None, None, None]),
                row(&[Some("3"), None, None]),
            ],
        };
        let table = drop_null_lines(table);
        assert_eq!(table.header, vec!["a", "c"]);
        assert_eq!(table.rows, vec![row(&[Some("1"), Some("2")]), row(&[Some("3"), None])]);
    }

    #[test]
    fn rotation_makes_first_column_the_header() {
        let grid = Grid::new(vec![
            row(&[Some("name"), Some("Ann")]),
            row(&[Some("age"), Some("7")]),
            row(&[Some("city"), Some("Oslo")]),
        ]);
        let regions = segment(&grid);
        let table = resolve_table(&regions[0], true);
        assert_eq!(table.header, vec!["name", "age", "city"]);
        assert_eq!(table.rows, vec![row(&[Some("Ann"), Some("7"), Some("Oslo")])]);

        let table = resolve_table(&regions[0], false);
        assert_eq!(table.header, vec!["name", "Ann"]);
        assert_eq!(table.rows.len(), 2);
    }
}
