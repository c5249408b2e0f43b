use crate::error::RustyChunkerError;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::SpreadsheetError;
use crate::table::Temporal;
use crate::table::Value;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::TimeDelta;
use iso8601_duration::Duration as IsoDuration;

/// Types of cell data in spreadsheet files.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values (true/false)
    Boolean,
    /// Numeric values
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as numbers from 1900 epoch
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as numbers from 1904 epoch
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    /// ISO 8601 duration strings
    IsoDuration,
    /// Inline string values
    InlineString,
    /// Shared string table references
    SharedString,
    /// Error values
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Parses custom number format strings to determine cell type.
    /// Scans format codes for date/time tokens outside literals and brackets.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_date = false;
        let mut is_time = false;
        let mut is_color = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' if !is_escaped => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_literal && !is_color => is_literal = true,

                ']' if is_color => is_color = false,
                '[' if !is_color && !is_literal => is_color = true,
                _ if is_literal || is_color => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }

    fn is_1904(&self) -> bool {
        matches!(self, Self::NumberDateTime1904 | Self::NumberDate1904 | Self::NumberTime1904)
    }
}

/// Represents a single cell read from a spreadsheet file.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    /// Cell data type
    pub(crate) kind: CellType,
    /// Raw cell value as stored in the file
    pub(crate) value: String,
}

impl Cell {
    /// Returns the Excel-style cell reference (e.g., "A1", "B2").
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    fn invalid(&self, message: String) -> RustyChunkerError {
        SpreadsheetError::CellValueError(self.reference(), message).into()
    }

    /// Converts the raw value to a typed value, resolving shared strings
    /// and serial dates.
    pub(crate) fn to_value(&self, shared_strings: &[String]) -> Result<Value, RustyChunkerError> {
        let value = match self.kind {
            CellType::Empty => Value::Null,
            CellType::Boolean => Value::Boolean(self.value == "1" || self.value.eq_ignore_ascii_case("true")),
            CellType::Number => Value::Number(self.to_double()?),
            CellType::NumberDate1900 | CellType::NumberDate1904 => {
                let datetime = self.to_serial_datetime()?;
                Value::Temporal(Temporal::Date(datetime.date()))
            }
            CellType::NumberTime1900 | CellType::NumberTime1904 => {
                let datetime = self.to_serial_datetime()?;
                if self.to_double()? < 1.0 {
                    Value::Temporal(Temporal::Time(datetime.time()))
                } else {
                    Value::Temporal(Temporal::DateTime(datetime))
                }
            }
            CellType::NumberDateTime1900 | CellType::NumberDateTime1904 => {
                Value::Temporal(Temporal::DateTime(self.to_serial_datetime()?))
            }
            CellType::IsoDateTime => Value::Temporal(self.to_iso_datetime()?),
            CellType::IsoDuration => Value::Temporal(Temporal::Duration(self.to_iso_duration()?)),
            CellType::InlineString | CellType::Error => Value::Text(self.value.to_owned()),
            CellType::SharedString => {
                let index = self.value.parse::<usize>()?;
                let text = shared_strings
                    .get(index)
                    .ok_or_else(|| self.invalid(format!("shared string {index} not found")))?;
                Value::Text(text.to_owned())
            }
        };
        Ok(value)
    }

    /// Converts cell value to double-precision floating point.
    fn to_double(&self) -> Result<f64, RustyChunkerError> {
        self.value
            .trim()
            .parse::<f64>()
            .map_err(|_| self.invalid(format!("parse '{}' to double failed", self.value)))
    }

    /// Converts an Excel serial number to a date and time.
    fn to_serial_datetime(&self) -> Result<NaiveDateTime, RustyChunkerError> {
        let serial = self.to_double()?;
        from_serial(serial, self.kind.is_1904())
            .ok_or_else(|| self.invalid(format!("serial date '{}' out of range", self.value)))
    }

    /// Parses ISO 8601 dates (`2024-01-05`) and date-times (`2024-01-05T10:30:00`).
    fn to_iso_datetime(&self) -> Result<Temporal, RustyChunkerError> {
        let value = self.value.trim().trim_end_matches('Z');
        if value.contains('T') {
            Ok(Temporal::DateTime(NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")?))
        } else {
            Ok(Temporal::Date(NaiveDate::parse_from_str(value, "%Y-%m-%d")?))
        }
    }

    /// Parses ISO 8601 durations such as `PT12H30M15S`.
    fn to_iso_duration(&self) -> Result<TimeDelta, RustyChunkerError> {
        let duration = self
            .value
            .parse::<IsoDuration>()
            .map_err(|_| self.invalid(format!("parse '{}' to iso8601 duration failed", self.value)))?;
        let seconds = ((duration.day as f64 * 24.0 + duration.hour as f64) * 60.0 + duration.minute as f64) * 60.0
            + duration.second as f64;
        Ok(TimeDelta::milliseconds((seconds * 1000.0).round() as i64))
    }
}

/// Display text of a binary error code.
pub(crate) fn to_error_value(code: u8) -> &'static str {
    match code {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// Converts an Excel serial date to a date-time.
/// Handles the Lotus 1-2-3 leap year bug of the 1900 date system.
pub(crate) fn from_serial(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        return None;
    }
    let days = serial.trunc() as i64;
    let offset = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    let milliseconds = (serial.fract() * 86_400_000f64).round() as i64;
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    Some(epoch + TimeDelta::days(days + offset) + TimeDelta::milliseconds(milliseconds))
}
