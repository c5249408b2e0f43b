use clap::ArgAction;
use clap::Parser;
use rusty_chunker::chunk::default_counter;
use rusty_chunker::chunk::TokenCounter;
use rusty_chunker::ChunkConfig;
use rusty_chunker::EstimateCounter;
use rusty_chunker::Chunker;
use rusty_chunker::OutputFormat;
use rusty_chunker::ReadOptions;
use rusty_chunker::RustyChunkerError;
use rusty_chunker::SheetBoundary;
use rusty_chunker::SheetSelector;
use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rusty-chunker")]
#[command(about = "Split spreadsheet tables into token-bounded chunks of JSON records")]
#[command(version)]
struct Cli {
    /// Spreadsheet to read (.xlsx, .xlsm, .xltx, .xltm, .xls, .ods, .csv, .tsv)
    source: PathBuf,

    /// File to write chunks to; standard output when omitted
    destination: Option<PathBuf>,

    /// Intended token cost bound of a chunk
    #[arg(long, short = 't', default_value_t = rusty_chunker::config::DEFAULT_TOKEN_LIMIT)]
    token_limit: usize,

    /// Start a new chunk at every sheet
    #[arg(long, short = 's')]
    split: bool,

    /// Transpose every table before resolving its header
    #[arg(long, short = 'r')]
    rotate: bool,

    /// When a sheet transition closes the current chunk
    #[arg(long, value_enum, default_value_t = SheetBoundary::HeaderChange)]
    boundary: SheetBoundary,

    /// Only process sheets matching this glob pattern (repeatable)
    #[arg(long = "sheet", value_name = "GLOB")]
    sheets: Vec<String>,

    /// Maximum number of sheets to process
    #[arg(long)]
    sheet_limit: Option<usize>,

    /// Reader options as a JSON object, e.g. '{"range": "A1:F40", "nulls": ["-"]}'
    #[arg(long, default_value = "")]
    read_options: String,

    /// Estimate token costs from text length instead of cl100k_base tokens
    #[arg(long)]
    estimate_tokens: bool,

    /// Layout of the destination
    #[arg(long, value_enum, default_value_t = OutputFormat::Lines)]
    output: OutputFormat,

    /// Log more (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short = 'v', action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn token_counter(estimate: bool) -> Result<Box<dyn TokenCounter>, RustyChunkerError> {
    if estimate {
        Ok(Box::new(EstimateCounter))
    } else {
        default_counter().map_err(RustyChunkerError::TokenizerError)
    }
}

fn run(cli: Cli) -> Result<(), RustyChunkerError> {
    let config = ChunkConfig {
        token_limit: cli.token_limit,
        boundary: cli.boundary,
        rotate: cli.rotate,
        sheet_selector: SheetSelector::new(&cli.sheets, cli.sheet_limit)?,
    }
    .with_split_every_sheet(cli.split);
    let read_options = ReadOptions::parse(&cli.read_options)?;
    let counter = token_counter(cli.estimate_tokens)?;

    let chunks = Chunker::new(config, read_options, counter).chunk_file(&cli.source)?;
    match &cli.destination {
        Some(path) => rusty_chunker::write_chunks(&mut BufWriter::new(File::create(path)?), &chunks, cli.output),
        None => rusty_chunker::write_chunks(&mut io::stdout().lock(), &chunks, cli.output),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_flags() {
        let cli = Cli::parse_from(["rusty-chunker", "book.xlsx", "out.txt", "-t", "50", "-s", "--sheet", "Q*", "-vv"]);
        assert_eq!(cli.token_limit, 50);
        assert!(cli.split);
        assert_eq!(cli.sheets, vec!["Q*"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.output, OutputFormat::Lines);
        assert!(!cli.estimate_tokens);
    }

    #[test]
    fn estimate_flag_selects_byte_estimate() {
        let cli = Cli::parse_from(["rusty-chunker", "book.xlsx", "--estimate-tokens"]);
        assert!(cli.estimate_tokens);
        let counter = token_counter(cli.estimate_tokens).unwrap();
        assert_eq!(counter.count("abcdefgh").unwrap(), 2);
    }
}
