//! Run configuration threaded through loading, extraction, and packing.
use crate::chunk::SheetBoundary;
use glob::Pattern;
use thiserror::Error;

/// Default chunk size bound in tokens.
pub const DEFAULT_TOKEN_LIMIT: usize = 1000;

/// Invalid option supplied by the caller. Raised before any sheet is read.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid read options '{0}': {1}")]
    ReadOptionsError(String, String),

    #[error("Invalid range '{0}'")]
    RangeError(String),

    #[error("Invalid sheet pattern '{0}': {1}")]
    SheetPatternError(String, String),

    #[error("Invalid delimiter '{0}': expected a single ASCII character")]
    DelimiterError(char),

    #[error("Token limit must be greater than zero")]
    TokenLimitError,
}

/// Which sheets of a workbook to process, in source order.
#[derive(Clone, Debug, Default)]
pub struct SheetSelector {
    /// Sheet name patterns; a sheet is selected if it matches any of them.
    /// No patterns selects every sheet.
    pub patterns: Vec<Pattern>,
    /// Maximum number of sheets to process.
    pub limit: Option<usize>,
}

impl SheetSelector {
    /// Compiles glob patterns such as `Q*` or `Sales ?`.
    pub fn new<S: AsRef<str>>(patterns: &[S], limit: Option<usize>) -> Result<Self, ConfigurationError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern.as_ref()).map_err(|error| {
                    ConfigurationError::SheetPatternError(pattern.as_ref().to_owned(), error.to_string())
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SheetSelector { patterns, limit })
    }

    /// Checks if a sheet name matches the patterns.
    /// Returns true if no patterns are specified or if name matches any pattern.
    pub fn accept(&self, sheet_name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|pattern| pattern.matches(sheet_name))
    }

    /// Filters sheet names down to the selected ones, keeping source order.
    pub fn select(&self, sheet_names: &[String]) -> Vec<String> {
        sheet_names
            .iter()
            .filter(|name| self.accept(name))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

/// Options of one chunking run.
#[derive(Clone, Debug)]
pub struct ChunkConfig {
    /// Intended token cost bound of a chunk
    pub token_limit: usize,
    /// When a sheet transition closes the current chunk
    pub boundary: SheetBoundary,
    /// Transpose every table before resolving its header
    pub rotate: bool,
    /// Sheets to process
    pub sheet_selector: SheetSelector,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkConfig {
            token_limit: DEFAULT_TOKEN_LIMIT,
            boundary: SheetBoundary::default(),
            rotate: false,
            sheet_selector: SheetSelector::default(),
        }
    }
}

impl ChunkConfig {
    /// Forces a chunk boundary at every sheet when `split_every_sheet` is set.
    pub fn with_split_every_sheet(mut self, split_every_sheet: bool) -> Self {
        if split_every_sheet {
            self.boundary = SheetBoundary::EverySheet;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.token_limit == 0 {
            Err(ConfigurationError::TokenLimitError)
        } else {
            Ok(())
        }
    }
}
