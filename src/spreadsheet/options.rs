use crate::config::ConfigurationError;
use crate::spreadsheet::range::Range;
use serde::Deserialize;
use std::collections::HashSet;

/// Null literals of workbook formats.
pub(crate) const WORKBOOK_NULLS: &[&str] = &[""];

/// Null literals of delimited text, the usual dataframe defaults.
pub(crate) const CSV_NULLS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Read options as written by the caller, a JSON object.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadOptionsParameters {
    range: Option<String>,
    nulls: Option<Vec<String>>,
    error_as_null: Option<bool>,
    delimiter: Option<char>,
}

/// Options handed to the grid loaders.
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    /// Area of every sheet to read
    pub range: Range,
    /// Text values read as null; `None` uses the format's defaults
    pub nulls: Option<HashSet<String>>,
    /// Read spreadsheet error cells as null instead of their error code
    pub error_as_null: bool,
    /// Field delimiter of delimited text; sniffed when absent
    pub delimiter: Option<u8>,
}

impl ReadOptions {
    /// Parses read options from a JSON object such as
    /// `{"range": "A1:F20", "nulls": ["-"], "delimiter": ";"}`.
    /// An empty string yields the defaults.
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        if text.trim().is_empty() {
            return Ok(ReadOptions::default());
        }
        let parameters: ReadOptionsParameters = serde_json::from_str(text)
            .map_err(|error| ConfigurationError::ReadOptionsError(text.to_owned(), error.to_string()))?;
        let range = parameters
            .range
            .as_deref()
            .map(Range::try_from)
            .transpose()?
            .unwrap_or_default();
        let delimiter = parameters
            .delimiter
            .map(|delimiter| {
                if delimiter.is_ascii() {
                    Ok(delimiter as u8)
                } else {
                    Err(ConfigurationError::DelimiterError(delimiter))
                }
            })
            .transpose()?;
        Ok(ReadOptions {
            range,
            nulls: parameters.nulls.map(|nulls| nulls.into_iter().collect()),
            error_as_null: parameters.error_as_null.unwrap_or(false),
            delimiter,
        })
    }

    /// The null literals in effect, falling back to `defaults`.
    pub(crate) fn null_literals(&self, defaults: &[&str]) -> HashSet<String> {
        self.nulls
            .to_owned()
            .unwrap_or_else(|| defaults.iter().map(|null| null.to_string()).collect())
    }
}
