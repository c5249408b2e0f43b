use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::TimeDelta;
use std::fmt::Display;

/// Date and time flavours a loader can produce.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Temporal {
    /// Calendar date without time of day
    Date(NaiveDate),
    /// Time of day without date
    Time(NaiveTime),
    /// Date with time of day
    DateTime(NaiveDateTime),
    /// Elapsed time (ODS `time` cells)
    Duration(TimeDelta),
}

impl Display for Temporal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Temporal::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Temporal::Time(time) => write!(f, "{}", time.format("%H:%M:%S%.f")),
            Temporal::DateTime(datetime) => write!(f, "{}", datetime.format("%Y-%m-%d %H:%M:%S%.f")),
            Temporal::Duration(duration) => {
                let sign = if duration.num_seconds() < 0 { "-" } else { "" };
                let seconds = duration.num_seconds().abs();
                write!(f, "{sign}{:02}:{:02}:{:02}", seconds / 3600, seconds % 3600 / 60, seconds % 60)
            }
        }
    }
}

/// A single cell value, as typed by the loader.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Number(f64),
    Boolean(bool),
    Text(String),
    Temporal(Temporal),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical text form used for header labels and for every
    /// non-numeric, non-boolean record value.
    pub fn to_canonical_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Number(number) => Some(format_number(*number)),
            Value::Boolean(boolean) => Some(boolean.to_string()),
            Value::Text(text) => Some(text.to_owned()),
            Value::Temporal(temporal) => Some(temporal.to_string()),
        }
    }
}

/// Formats a number without a trailing `.0` when it is integral.
pub(crate) fn format_number(number: f64) -> String {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// The dense cell matrix of one sheet. Every row has `width` cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<Value>>,
    width: usize,
}

impl Grid {
    /// Builds a grid from rows of possibly different lengths, padding
    /// short rows with nulls.
    pub fn new(mut rows: Vec<Vec<Value>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in rows.iter_mut() {
            row.resize(width, Value::Null);
        }
        Grid { rows, width }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.width == 0
    }

    pub fn get(&self, row: usize, col: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.rows.get(row).and_then(|cells| cells.get(col)).unwrap_or(&NULL)
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_pads_ragged_rows() {
        let grid = Grid::new(vec![vec![Value::from("a")], vec![Value::from(1.0), Value::from(true)]]);
        assert_eq!(grid.width(), 2);
        assert_eq!(grid.get(0, 1), &Value::Null);
        assert_eq!(grid.get(9, 9), &Value::Null);
    }

    #[test]
    fn canonical_strings() {
        assert_eq!(Value::from(3.0).to_canonical_string().as_deref(), Some("3"));
        assert_eq!(Value::from(2.5).to_canonical_string().as_deref(), Some("2.5"));
        assert_eq!(Value::from(false).to_canonical_string().as_deref(), Some("false"));
        assert_eq!(Value::Null.to_canonical_string(), None);

        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(Value::Temporal(Temporal::Date(date)).to_string_lossy(), "2024-01-05");
        let datetime = date.and_hms_opt(13, 4, 5).unwrap();
        assert_eq!(Value::Temporal(Temporal::DateTime(datetime)).to_string_lossy(), "2024-01-05 13:04:05");
        let duration = TimeDelta::seconds(3 * 3600 + 25 * 60 + 7);
        assert_eq!(Value::Temporal(Temporal::Duration(duration)).to_string_lossy(), "03:25:07");
    }

    impl Value {
        fn to_string_lossy(&self) -> String {
            self.to_canonical_string().unwrap_or_default()
        }
    }
}
