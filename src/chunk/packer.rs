use crate::chunk::token::TokenCounter;
use crate::error::RustyChunkerError;
use crate::table::Record;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

/// When a sheet transition forces the current chunk to close.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SheetBoundary {
    /// Never; records of consecutive sheets share chunks.
    Continuous,
    /// Whenever a sheet's table headers differ from the previous sheet's.
    #[default]
    HeaderChange,
    /// At every sheet.
    EverySheet,
}

/// An ordered group of records forming one output unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chunk {
    pub records: Vec<Record>,
    /// Sum of the records' token costs
    pub tokens: usize,
}

impl Chunk {
    /// The serialized records, concatenated.
    pub fn text(&self) -> String {
        self.records.iter().map(Record::to_json).collect()
    }
}

/// Single-pass packer that groups records into chunks bounded by a token
/// limit.
///
/// The running counter is compared against the limit after each record's
/// cost is added. When it goes over, the records gathered so far become a
/// chunk, the counter restarts at zero, and the record that went over opens
/// the next chunk. A chunk can therefore exceed the limit by up to one
/// record's cost.
pub struct ChunkPacker<C: TokenCounter> {
    counter: C,
    token_limit: usize,
    boundary: SheetBoundary,
    running_tokens: usize,
    buffer: Vec<Record>,
    buffer_tokens: usize,
    last_signature: Option<Vec<Vec<String>>>,
    chunks: Vec<Chunk>,
}

impl<C: TokenCounter> ChunkPacker<C> {
    pub fn new(counter: C, token_limit: usize) -> Self {
        ChunkPacker {
            counter,
            token_limit,
            boundary: SheetBoundary::default(),
            running_tokens: 0,
            buffer: Vec::new(),
            buffer_tokens: 0,
            last_signature: None,
            chunks: Vec::new(),
        }
    }

    pub fn with_boundary(mut self, boundary: SheetBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Adds one record, closing the current chunk first if the record takes
    /// the running counter over the limit.
    pub fn push(&mut self, record: Record) -> Result<(), RustyChunkerError> {
        let tokens = self
            .counter
            .count(&record.to_json())
            .map_err(RustyChunkerError::TokenizerError)?;
        self.running_tokens += tokens;
        if self.running_tokens > self.token_limit {
            self.close();
            self.running_tokens = 0;
        }
        self.buffer.push(record);
        self.buffer_tokens += tokens;
        Ok(())
    }

    pub fn extend<I>(&mut self, records: I) -> Result<(), RustyChunkerError>
    where
        I: IntoIterator<Item = Record>,
    {
        records.into_iter().try_for_each(|record| self.push(record))
    }

    /// Announces the next sheet by the headers of its tables, closing the
    /// current chunk if the boundary mode asks for it.
    pub fn start_sheet(&mut self, signature: Vec<Vec<String>>) {
        let forced = match self.boundary {
            SheetBoundary::Continuous => false,
            SheetBoundary::HeaderChange => self
                .last_signature
                .as_ref()
                .map(|last| *last != signature)
                .unwrap_or(false),
            SheetBoundary::EverySheet => true,
        };
        if forced {
            debug!(records = self.buffer.len(), "sheet boundary closes chunk");
            self.reset();
        }
        self.last_signature = Some(signature);
    }

    /// Closes the current chunk and restarts the counter.
    pub fn reset(&mut self) {
        self.close();
        self.running_tokens = 0;
    }

    fn close(&mut self) {
        if !self.buffer.is_empty() {
            self.chunks.push(Chunk {
                records: std::mem::take(&mut self.buffer),
                tokens: std::mem::take(&mut self.buffer_tokens),
            });
        }
    }

    /// Flushes the last chunk and returns every chunk in order.
    pub fn finish(mut self) -> Vec<Chunk> {
        self.close();
        self.chunks
    }
}

/// Packs a record stream into chunks in one pass.
pub fn pack<I, C>(records: I, token_limit: usize, counter: C) -> Result<Vec<Chunk>, RustyChunkerError>
where
    I: IntoIterator<Item = Record>,
    C: TokenCounter,
{
    let mut packer = ChunkPacker::new(counter, token_limit);
    packer.extend(records)?;
    Ok(packer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::token::FnCounter;
    use anyhow::anyhow;
    use serde_json::json;

    fn records(count: usize) -> Vec<Record> {
        (0..count).map(|index| Record::from([("i", json!(index))])).collect()
    }

    fn flat(cost: usize) -> FnCounter<impl Fn(&str) -> anyhow::Result<usize>> {
        FnCounter(move |_: &str| -> anyhow::Result<usize> { Ok(cost) })
    }

    #[test]
    fn limit_reached_exactly_keeps_chunk_open() {
        let chunks = pack(records(6), 50, flat(10)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].records, records(5));
        assert_eq!(chunks[0].tokens, 50);
        assert_eq!(chunks[1].records, records(6)[5..].to_vec());
    }

    #[test]
    fn overflowing_record_opens_next_chunk_with_fresh_counter() {
        // The counter restarts at zero after a break, so the second chunk
        // holds the overflowing record plus a full limit's worth.
        let chunks = pack(records(13), 50, flat(10)).unwrap();
        let sizes: Vec<usize> = chunks.iter().map(|chunk| chunk.records.len()).collect();
        assert_eq!(sizes, vec![5, 6, 2]);
        assert_eq!(chunks[1].tokens, 60);
    }

    #[test]
    fn oversized_first_record_does_not_emit_empty_chunk() {
        let chunks = pack(records(2), 5, flat(10)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|chunk| chunk.records.len() == 1));
    }

    #[test]
    fn empty_input_has_no_chunk() {
        assert!(pack(Vec::new(), 10, flat(1)).unwrap().is_empty());
    }

    #[test]
    fn chunk_text_concatenates_records() {
        let chunks = pack(records(2), 100, flat(1)).unwrap();
        assert_eq!(chunks[0].text(), r#"{"i":0}{"i":1}"#);
    }

    #[test]
    fn tokenizer_failure_is_propagated() {
        let counter = FnCounter(|_: &str| -> anyhow::Result<usize> { Err(anyhow!("vocabulary missing")) });
        let error = pack(records(1), 10, counter).unwrap_err();
        assert!(matches!(error, RustyChunkerError::TokenizerError(_)));
        assert_eq!(error.to_string(), "vocabulary missing");
    }

    #[test]
    fn header_change_forces_boundary() {
        let mut packer = ChunkPacker::new(flat(1), 100).with_boundary(SheetBoundary::HeaderChange);
        packer.start_sheet(vec![vec!["a".to_owned()]]);
        packer.extend(records(2)).unwrap();
        packer.start_sheet(vec![vec!["a".to_owned()]]);
        packer.extend(records(2)).unwrap();
        packer.start_sheet(vec![vec!["b".to_owned()]]);
        packer.extend(records(1)).unwrap();
        let sizes: Vec<usize> = packer.finish().iter().map(|chunk| chunk.records.len()).collect();
        assert_eq!(sizes, vec![4, 1]);
    }

    #[test]
    fn every_sheet_and_continuous_boundaries() {
        let signature = || vec![vec!["a".to_owned()]];

        let mut packer = ChunkPacker::new(flat(1), 100).with_boundary(SheetBoundary::EverySheet);
        for _ in 0..3 {
            packer.start_sheet(signature());
            packer.extend(records(1)).unwrap();
        }
        assert_eq!(packer.finish().len(), 3);

        let mut packer = ChunkPacker::new(flat(1), 100).with_boundary(SheetBoundary::Continuous);
        packer.start_sheet(vec![vec!["a".to_owned()]]);
        packer.extend(records(1)).unwrap();
        packer.start_sheet(vec![vec!["b".to_owned()]]);
        packer.extend(records(1)).unwrap();
        assert_eq!(packer.finish().len(), 1);
    }

    #[test]
    fn boundary_restarts_counter() {
        let mut packer = ChunkPacker::new(flat(10), 20).with_boundary(SheetBoundary::EverySheet);
        packer.start_sheet(vec![]);
        packer.extend(records(2)).unwrap();
        packer.start_sheet(vec![]);
        packer.extend(records(2)).unwrap();
        let sizes: Vec<usize> = packer.finish().iter().map(|chunk| chunk.records.len()).collect();
        assert_eq!(sizes, vec![2, 2]);
    }
}
