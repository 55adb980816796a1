//! keyline CLI
//!
//! Command-line interface for writing, indexing and querying datasets.
//! Records are arbitrary JSON objects keyed by one top-level field.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use keyline::{
    default_index_path, CancellationToken, IndexStore, JsonCodec, KeylineError, Reader, Result,
    WriteSummary, Writer,
};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

/// keyline CLI
#[derive(Parser, Debug)]
#[command(name = "keyline")]
#[command(about = "Key-indexed random access over newline-delimited JSON")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write records from a JSONL input into a dataset and its index
    Write {
        /// Input file, or "-" for stdin
        #[arg(short, long, default_value = "-")]
        input: String,

        /// Data file to create
        #[arg(short, long)]
        data: PathBuf,

        /// Top-level field holding each record's key
        #[arg(short, long)]
        key_field: String,

        /// Index file (defaults to the data path with an .index extension)
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Rebuild an index by scanning an existing data file
    Index {
        #[arg(short, long)]
        data: PathBuf,

        #[arg(short, long)]
        key_field: String,

        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Print the records stored under the given keys
    Get {
        #[arg(short, long)]
        data: PathBuf,

        #[arg(long)]
        index: Option<PathBuf>,

        /// Worker count for multi-key lookups
        #[arg(short, long)]
        parallelism: Option<usize>,

        /// Keys to look up
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// List every indexed key
    Keys {
        #[arg(short, long)]
        data: PathBuf,

        #[arg(long)]
        index: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,keyline=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Write {
            input,
            data,
            key_field,
            index,
        } => {
            let index = index.unwrap_or_else(|| default_index_path(&data));
            let summary = write_stream(open_input(&input)?, &key_field, &data, &index)?;
            println!(
                "wrote {} records ({} keys, {} bytes) to {}",
                summary.records,
                summary.keys,
                summary.bytes,
                summary.data_path.display()
            );
            Ok(())
        }

        Commands::Index {
            data,
            key_field,
            index,
        } => {
            let index = index.unwrap_or_else(|| default_index_path(&data));
            if index == data {
                return Err(KeylineError::Config(
                    "index path must differ from data path".to_string(),
                ));
            }
            let store = IndexStore::build_from_data(&data, &JsonCodec, |record: &Value| {
                field_key(record, &key_field)
            })?;
            store.persist(&index)?;
            println!("indexed {} keys into {}", store.len(), index.display());
            Ok(())
        }

        Commands::Get {
            data,
            index,
            parallelism,
            keys,
        } => {
            let reader = open_reader(data, index)?;
            let found = reader.read_by_keys(&keys, parallelism)?;

            let stdout = io::stdout();
            let mut out = stdout.lock();
            for key in &keys {
                match found.get(key) {
                    Some(record) => writeln!(out, "{}\t{}", key, record)?,
                    None => tracing::warn!(key = %key, "key not found"),
                }
            }
            Ok(())
        }

        Commands::Keys { data, index } => {
            let reader = open_reader(data, index)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for key in reader.keys() {
                writeln!(out, "{}", key)?;
            }
            Ok(())
        }
    }
}

fn open_reader(data: PathBuf, index: Option<PathBuf>) -> Result<Reader<Value, String>> {
    let builder = Reader::builder(data);
    match index {
        Some(index) => builder.index_path(index).open(),
        None => builder.open(),
    }
}

/// Key of a record: the field's string value, or its JSON text otherwise
fn field_key(record: &Value, field: &str) -> String {
    match record.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn open_input(input: &str) -> Result<Box<dyn BufRead>> {
    if input == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let path = Path::new(input);
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => KeylineError::NotFound {
            what: "Input file",
            path: path.to_path_buf(),
        },
        _ => e.into(),
    })?;
    Ok(Box::new(BufReader::new(file)))
}

/// Stream `source` through a Writer one line at a time.
///
/// A bad input line stops the stream and cancels the session, so the data
/// file is left truncated with no index, then the line's error is returned.
fn write_stream(
    source: Box<dyn BufRead>,
    key_field: &str,
    data: &Path,
    index: &Path,
) -> Result<WriteSummary> {
    let cancel = CancellationToken::new();
    let mut failure = None;

    let result = {
        let records = parse_records(source, key_field, &mut failure, &cancel);
        let mut writer = Writer::new(|record: &Value| field_key(record, key_field));
        writer.write_with_cancel(records, data, index, &cancel)
    };

    match failure {
        Some(err) => Err(err),
        None => result,
    }
}

/// Lazily parse non-blank lines. The first failure is stored in `failure`,
/// fires `cancel` and ends the iterator.
fn parse_records<'a>(
    source: Box<dyn BufRead>,
    key_field: &'a str,
    failure: &'a mut Option<KeylineError>,
    cancel: &'a CancellationToken,
) -> impl Iterator<Item = Value> + 'a {
    let mut lines = source.lines().enumerate();
    std::iter::from_fn(move || loop {
        let (line_no, line) = lines.next()?;
        match parse_line(line, line_no + 1, key_field) {
            Ok(Some(value)) => return Some(value),
            Ok(None) => continue,
            Err(e) => {
                *failure = Some(e);
                cancel.cancel();
                return None;
            }
        }
    })
}

fn parse_line(line: io::Result<String>, line_no: usize, key_field: &str) -> Result<Option<Value>> {
    let line = line?;
    if line.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(&line)
        .map_err(|e| KeylineError::Encode(format!("input line {}: {}", line_no, e)))?;
    if value.get(key_field).is_none() {
        return Err(KeylineError::Encode(format!(
            "input line {}: missing key field '{}'",
            line_no, key_field
        )));
    }
    Ok(Some(value))
}
