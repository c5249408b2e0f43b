use thiserror::Error;

/// Main error type of the chunker.
/// Aggregates errors from the standard library, dependencies, and internal modules.
#[derive(Error, Debug)]
pub enum RustyChunkerError {
    #[error("{0}")]
    WithContextError(String),

    /// Failure reported by the token cost function, passed through as is
    #[error("{0}")]
    TokenizerError(anyhow::Error),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    ParseDateTimeError(#[from] chrono::ParseError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    CsvError(#[from] csv::Error),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    // Helper module errors
    #[error("{0}")]
    BytesError(#[from] crate::helpers::bytes::BytesError),

    #[error("{0}")]
    CfbError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    Biff8Error(#[from] crate::helpers::biff8::Biff8Error),

    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    OdsError(#[from] crate::spreadsheet::ods::OdsError),

    #[error("{0}")]
    XlsError(#[from] crate::spreadsheet::xls::XlsError),

    #[error("{0}")]
    ConfigurationError(#[from] crate::config::ConfigurationError),
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, RustyChunkerError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| RustyChunkerError::WithContextError(format!("{}: {}", message, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_wraps_message() {
        let result: Result<(), RustyChunkerError> = Err(std::io::Error::other("disk gone").into());
        let error = result.with_prefix("Read sheet 'Q1' failed").unwrap_err();
        assert_eq!(error.to_string(), "Read sheet 'Q1' failed: disk gone");
    }
}
