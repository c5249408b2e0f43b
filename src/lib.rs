//! # Rusty Chunker
//!
//! Turns spreadsheets into token-bounded chunks of JSON records, ready to be
//! fed to a consumer with a hard input-size budget such as an LLM context
//! window.
//!
//! ## Features
//!
//! - **Multi-format support**: Excel 2007+ workbooks (`.xlsx`, `.xlsm`, `.xltx`, `.xltm`),
//!   Excel 97-2003 workbooks (`.xls`), OpenDocument spreadsheets (`.ods`) and delimited
//!   text (`.csv`, `.tsv`)
//! - **Table segmentation**: several tables on one sheet, separated by empty rows or
//!   columns, are found and handled independently
//! - **Header resolution**: placeholder headers are synthesized, and a row that is mostly
//!   placeholders gives way to the next one
//! - **Rotation**: tables laid out column-wise can be transposed before header resolution
//! - **Token-bounded packing**: records are grouped into chunks under a token limit,
//!   with configurable boundaries between sheets
//! - **Pluggable tokenizer**: any [`TokenCounter`]; `cl100k_base` through the default `tiktoken`
//!   feature, a length-based estimate without it
//!
//! ## Example
//!
//! ```no_run
//! use rusty_chunker::{ChunkConfig, Chunker, EstimateCounter, ReadOptions};
//! use std::path::Path;
//!
//! let chunker = Chunker::new(ChunkConfig::default(), ReadOptions::default(), EstimateCounter);
//! for chunk in chunker.chunk_file(Path::new("inventory.xlsx"))? {
//!     println!("{}", chunk.text());
//! }
//! # Ok::<(), rusty_chunker::RustyChunkerError>(())
//! ```
pub mod chunk;
pub mod config;
pub mod error;
mod helpers;
pub mod pipeline;
pub mod spreadsheet;
pub mod table;

pub use chunk::pack;
pub use chunk::Chunk;
pub use chunk::ChunkPacker;
pub use chunk::EstimateCounter;
pub use chunk::FnCounter;
pub use chunk::SheetBoundary;
pub use chunk::TokenCounter;
pub use config::ChunkConfig;
pub use config::ConfigurationError;
pub use config::SheetSelector;
pub use error::RustyChunkerError;
pub use pipeline::write_chunks;
pub use pipeline::Chunker;
pub use pipeline::OutputFormat;
pub use spreadsheet::open_spreadsheet;
pub use spreadsheet::options::ReadOptions;
pub use spreadsheet::Spreadsheet;
pub use spreadsheet::SpreadsheetError;
pub use table::extract;
pub use table::Grid;
pub use table::Record;
pub use table::Value;
