//! End-to-end run: load a source, extract its tables sheet by sheet, and
//! pack the record stream into chunks.
use crate::chunk::Chunk;
use crate::chunk::ChunkPacker;
use crate::chunk::TokenCounter;
use crate::config::ChunkConfig;
use crate::error::ResultMessage;
use crate::error::RustyChunkerError;
use crate::spreadsheet::open_spreadsheet;
use crate::spreadsheet::options::ReadOptions;
use crate::spreadsheet::Spreadsheet;
use crate::table::extract;
use clap::ValueEnum;
use serde::Deserialize;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::debug;
use tracing::info;

/// Chunks a source file with one configuration and token counter.
pub struct Chunker<C: TokenCounter> {
    config: ChunkConfig,
    read_options: ReadOptions,
    counter: C,
}

/// Counts of one run, logged when it finishes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub sheets: usize,
    pub regions: usize,
    pub records: usize,
    pub chunks: usize,
}

impl<C: TokenCounter> Chunker<C> {
    pub fn new(config: ChunkConfig, read_options: ReadOptions, counter: C) -> Self {
        Chunker { config, read_options, counter }
    }

    /// Opens the file and chunks every selected sheet.
    /// Configuration is validated before the file is touched.
    pub fn chunk_file(&self, path: &Path) -> Result<Vec<Chunk>, RustyChunkerError> {
        self.config.validate()?;
        let mut spreadsheet = open_spreadsheet(path, &self.read_options)?;
        info!(source = %path.display(), "opened spreadsheet");
        self.chunk_spreadsheet(spreadsheet.as_mut())
    }

    /// Chunks every selected sheet of an opened spreadsheet, in source order.
    pub fn chunk_spreadsheet(&self, spreadsheet: &mut dyn Spreadsheet) -> Result<Vec<Chunk>, RustyChunkerError> {
        self.config.validate()?;
        let sheet_names = spreadsheet.sheet_names();
        let selected = self.config.sheet_selector.select(&sheet_names);
        debug!(available = sheet_names.len(), selected = selected.len(), "selected sheets");

        let mut summary = Summary::default();
        let mut packer = ChunkPacker::new(&self.counter, self.config.token_limit).with_boundary(self.config.boundary);
        for sheet_name in selected {
            let grid = spreadsheet
                .read_sheet(&sheet_name)
                .with_prefix(&format!("Read sheet '{}' of '{}' failed", sheet_name, spreadsheet.name()))?;
            let sheet_tag = spreadsheet.is_workbook().then_some(sheet_name.as_str());
            let extraction = extract(&grid, self.config.rotate, sheet_tag);
            debug!(
                sheet = %sheet_name,
                rows = grid.height(),
                cols = grid.width(),
                regions = extraction.headers.len(),
                records = extraction.records.len(),
                "extracted sheet"
            );

            summary.sheets += 1;
            summary.regions += extraction.headers.len();
            summary.records += extraction.records.len();
            if extraction.records.is_empty() {
                debug!(sheet = %sheet_name, "skipped sheet without records");
                continue;
            }
            packer.start_sheet(extraction.headers);
            packer.extend(extraction.records)?;
        }

        let chunks = packer.finish();
        summary.chunks = chunks.len();
        info!(
            sheets = summary.sheets,
            regions = summary.regions,
            records = summary.records,
            chunks = summary.chunks,
            "chunking finished"
        );
        Ok(chunks)
    }
}

/// How chunks are laid out in the destination.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// One chunk per line
    #[default]
    Lines,
    /// A JSON array of chunk strings
    Json,
}

/// Writes chunks to `writer` in the given layout.
pub fn write_chunks<W: Write>(writer: &mut W, chunks: &[Chunk], format: OutputFormat) -> Result<(), RustyChunkerError> {
    match format {
        OutputFormat::Lines => {
            for chunk in chunks {
                writeln!(writer, "{}", chunk.text())?;
            }
        }
        OutputFormat::Json => {
            let texts: Vec<String> = chunks.iter().map(Chunk::text).collect();
            serde_json::to_writer_pretty(&mut *writer, &texts)?;
            writeln!(writer)?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::EstimateCounter;
    use crate::chunk::FnCounter;
    use crate::chunk::SheetBoundary;
    use crate::config::SheetSelector;
    use crate::table::Grid;
    use crate::table::Value;

    /// In-memory workbook.
    struct Workbook(Vec<(String, Grid)>);

    impl Spreadsheet for Workbook {
        fn name(&self) -> String {
            "memory".to_owned()
        }

        fn sheet_names(&self) -> Vec<String> {
            self.0.iter().map(|(name, _)| name.to_owned()).collect()
        }

        fn is_workbook(&self) -> bool {
            true
        }

        fn read_sheet(&mut self, sheet_name: &str) -> Result<Grid, RustyChunkerError> {
            Ok(self.0.iter().find(|(name, _)| name == sheet_name).map(|(_, grid)| grid.to_owned()).unwrap_or_default())
        }
    }

    fn grid(rows: &[&[&str]]) -> Grid {
        Grid::new(
            rows.iter()
                .map(|row| row.iter().map(|cell| if cell.is_empty() { Value::Null } else { Value::from(*cell) }).collect())
                .collect(),
        )
    }

    fn workbook() -> Workbook {
        Workbook(vec![
            ("Q1".to_owned(), grid(&[&["item", "qty"], &["bolt", "3"], &["nut", "4"]])),
            ("Empty".to_owned(), grid(&[&["", ""]])),
            ("Q2".to_owned(), grid(&[&["item", "qty"], &["gear", "1"]])),
            ("Notes".to_owned(), grid(&[&["note"], &["check stock"]])),
        ])
    }

    fn one_token() -> FnCounter<impl Fn(&str) -> anyhow::Result<usize>> {
        FnCounter(|_: &str| -> anyhow::Result<usize> { Ok(1) })
    }

    #[test]
    fn header_change_groups_sheets_with_equal_headers() {
        let chunker = Chunker::new(ChunkConfig::default(), ReadOptions::default(), one_token());
        let chunks = chunker.chunk_spreadsheet(&mut workbook()).unwrap();
        let sizes: Vec<usize> = chunks.iter().map(|chunk| chunk.records.len()).collect();
        assert_eq!(sizes, vec![3, 1]);
        assert_eq!(chunks[0].records[2].get("sheet"), Some(&serde_json::json!("Q2")));
    }

    #[test]
    fn split_every_sheet() {
        let config = ChunkConfig::default().with_split_every_sheet(true);
        let chunks = Chunker::new(config, ReadOptions::default(), one_token())
            .chunk_spreadsheet(&mut workbook())
            .unwrap();
        let sizes: Vec<usize> = chunks.iter().map(|chunk| chunk.records.len()).collect();
        assert_eq!(sizes, vec![2, 1, 1]);
    }

    #[test]
    fn continuous_ignores_sheets() {
        let config = ChunkConfig { boundary: SheetBoundary::Continuous, ..ChunkConfig::default() };
        let chunks = Chunker::new(config, ReadOptions::default(), one_token())
            .chunk_spreadsheet(&mut workbook())
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].records.len(), 4);
    }

    #[test]
    fn selected_sheets_only() {
        let config = ChunkConfig {
            sheet_selector: SheetSelector::new(&["Q*"], None).unwrap(),
            ..ChunkConfig::default()
        };
        let chunks = Chunker::new(config, ReadOptions::default(), EstimateCounter)
            .chunk_spreadsheet(&mut workbook())
            .unwrap();
        let sheets: Vec<_> = chunks
            .iter()
            .flat_map(|chunk| chunk.records.iter())
            .filter_map(|record| record.get("sheet").and_then(|sheet| sheet.as_str()).map(str::to_owned))
            .collect();
        assert_eq!(sheets, vec!["Q1", "Q1", "Q2"]);
    }

    #[test]
    fn invalid_configuration_fails_before_reading() {
        let config = ChunkConfig { token_limit: 0, ..ChunkConfig::default() };
        let error = Chunker::new(config, ReadOptions::default(), EstimateCounter)
            .chunk_spreadsheet(&mut workbook())
            .unwrap_err();
        assert!(matches!(error, RustyChunkerError::ConfigurationError(_)));
    }

    #[test]
    fn write_lines_and_json() {
        let chunks = Chunker::new(ChunkConfig::default(), ReadOptions::default(), one_token())
            .chunk_spreadsheet(&mut workbook())
            .unwrap();

        let mut lines = Vec::new();
        write_chunks(&mut lines, &chunks, OutputFormat::Lines).unwrap();
        let lines = String::from_utf8(lines).unwrap();
        assert_eq!(lines.lines().count(), 2);
        assert!(lines.starts_with(r#"{"item":"bolt","qty":"3","sheet":"Q1"}"#));

        let mut json = Vec::new();
        write_chunks(&mut json, &chunks, OutputFormat::Json).unwrap();
        let texts: Vec<String> = serde_json::from_slice(&json).unwrap();
        assert_eq!(texts, lines.lines().map(str::to_owned).collect::<Vec<_>>());
    }
}
