// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! `avrocli`: inspect, convert, recode and concatenate Avro container files.
//!
//! Every path argument accepts `-` for standard input or standard output. Logs go to standard
//! error; the level comes from `RUST_LOG` (default `warn`) and is raised by `-v`.

use anyhow::{Context, Result};
use avro_container::{
    DEFAULT_SYNC_INTERVAL, Reader, WriteSummary,
    json::JsonLines,
    ops::{self, RecodeOptions, WriteOptions},
    schema::Schema,
    text::{TextLines, text_schema},
};
use clap::{ArgAction, Args, Parser, Subcommand, builder::PossibleValuesParser};
use log::{info, warn};
use serde_json::{Map, Value as JsonValue};
use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    time::Instant,
};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

#[cfg(feature = "snappy")]
const DEFAULT_CODEC: &str = "snappy";
#[cfg(not(feature = "snappy"))]
const DEFAULT_CODEC: &str = "deflate";

#[derive(Parser)]
#[command(name = "avrocli", version, about = "Avro CLI")]
struct Cli {
    /// Log more details to standard error (repeat for more)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct WriteArgs {
    /// Codec to use
    #[arg(
        short,
        long,
        value_name = "CODEC",
        default_value = DEFAULT_CODEC,
        value_parser = PossibleValuesParser::new(ops::list_codecs()),
    )]
    codec: String,

    /// Uncompressed size of a block before it is written out
    #[arg(long, default_value_t = DEFAULT_SYNC_INTERVAL)]
    sync_interval: usize,

    /// Metadata values
    #[arg(short, long, value_name = "KEY=VALUE")]
    metadata: Vec<String>,
}

impl WriteArgs {
    fn options(self, fail_safe: bool) -> Result<WriteOptions> {
        Ok(WriteOptions {
            codec: self.codec,
            sync_interval: self.sync_interval,
            metadata: ops::parse_metadata_args(&self.metadata)?,
            fail_safe,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List available codecs.
    Codecs,

    /// Concatenates avro files without re-compressing.
    Concat {
        #[arg(required = true)]
        input: Vec<PathBuf>,
        output: PathBuf,
    },

    /// Reads JSON records and writes an Avro data file.
    #[command(name = "fromjson")]
    FromJson {
        input: PathBuf,
        output: PathBuf,

        /// Schema of the records
        #[arg(short, long)]
        schema: PathBuf,

        #[command(flatten)]
        write: WriteArgs,

        /// Wrap every JSON value as `{"value": ...}`
        #[arg(long)]
        json_value: bool,

        /// Skip the records that do not match the schema
        #[arg(long)]
        fail_safe: bool,
    },

    /// Imports a text file into an avro data file, one record per line.
    #[command(name = "fromtext")]
    FromText {
        #[arg(required = true)]
        input: Vec<PathBuf>,
        output: PathBuf,

        #[command(flatten)]
        write: WriteArgs,
    },

    /// Prints out the metadata of an Avro data file.
    #[command(name = "getmeta")]
    GetMeta { file: PathBuf },

    /// Prints out schema of an Avro data file.
    #[command(name = "getschema")]
    GetSchema { file: PathBuf },

    /// Reads every record of an Avro data file, reporting the time it took.
    #[command(name = "readbench")]
    ReadBench { input: PathBuf },

    /// Alters the codec of a data file.
    Recodec {
        input: PathBuf,
        output: PathBuf,

        /// Codec to use, the codec of the input by default
        #[arg(
            short,
            long,
            value_name = "CODEC",
            value_parser = PossibleValuesParser::new(ops::list_codecs()),
        )]
        codec: Option<String>,

        #[arg(long, default_value_t = DEFAULT_SYNC_INTERVAL)]
        sync_interval: usize,

        /// Metadata values
        #[arg(short, long, value_name = "KEY=VALUE")]
        metadata: Vec<String>,
    },

    /// Dumps an Avro data file as JSON, one record per line.
    #[command(name = "tojson")]
    ToJson {
        #[arg(required = true)]
        input: Vec<PathBuf>,
        output: PathBuf,
    },

    /// Converts Avro data files of bytes records to a text file.
    #[command(name = "totext")]
    ToText {
        #[arg(required = true)]
        input: Vec<PathBuf>,
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_broken_pipe(&e) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn is_broken_pipe(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
    })
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Codecs => print_line(&ops::list_codecs().join("\n")),
        Commands::Concat { input, output } => {
            let summary = if is_stdio(&output) || input.iter().any(|path| is_stdio(path)) {
                let inputs = input
                    .iter()
                    .map(|path| open_input(path))
                    .collect::<Result<Vec<_>>>()?;
                ops::concat(inputs, create_output(&output)?)?
            } else {
                ops::concat_files(&input, &output)?
            };
            report(&summary);
            Ok(())
        }
        Commands::FromJson {
            input,
            output,
            schema,
            write,
            json_value,
            fail_safe,
        } => {
            let schema = read_schema(&schema)?;
            let options = write.options(fail_safe)?;
            let records = JsonLines::new(open_input(&input)?).wrap_values(json_value);
            let (_, summary) =
                ops::write_records(create_output(&output)?, &schema, &options, records)?;
            report(&summary);
            Ok(())
        }
        Commands::FromText {
            input,
            output,
            write,
        } => {
            let options = write.options(false)?;
            let records = input
                .iter()
                .map(|path| open_input(path))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .flat_map(TextLines::new);
            let (_, summary) =
                ops::write_records(create_output(&output)?, &text_schema(), &options, records)?;
            report(&summary);
            Ok(())
        }
        Commands::GetMeta { file } => {
            let reader = open_reader(&file)?;
            print_line(&serde_json::to_string_pretty(&reader.metadata_str())?)
        }
        Commands::GetSchema { file } => {
            let reader = open_reader(&file)?;
            let schema = reader
                .metadata()
                .get("avro.schema")
                .context("No schema in the file metadata")?;
            let schema: JsonValue =
                serde_json::from_slice(schema).context("Invalid schema in the file metadata")?;
            print_line(&serde_json::to_string_pretty(&sort_keys(schema))?)
        }
        Commands::ReadBench { input } => {
            let started = Instant::now();
            let count = read_all(open_reader(&input)?)?;
            info!(
                "Read {count} records from {} in {:.2?}",
                input.display(),
                started.elapsed()
            );
            Ok(())
        }
        Commands::Recodec {
            input,
            output,
            codec,
            sync_interval,
            metadata,
        } => {
            let options = RecodeOptions {
                codec,
                sync_interval,
                metadata: ops::parse_metadata_args(&metadata)?,
            };
            let summary = if is_stdio(&input) || is_stdio(&output) {
                ops::recode(open_input(&input)?, create_output(&output)?, &options)?
            } else {
                ops::recode_file(&input, &output, &options)?
            };
            report(&summary);
            Ok(())
        }
        Commands::ToJson { input, output } => {
            let mut out = create_output(&output)?;
            for path in &input {
                let count = ops::json_export(open_reader(path)?, &mut out)?;
                info!("Exported {count} records from {}", path.display());
            }
            Ok(())
        }
        Commands::ToText { input, output } => {
            let mut out = create_output(&output)?;
            for path in &input {
                let count = ops::text_export(open_reader(path)?, &mut out)?;
                info!("Exported {count} records from {}", path.display());
            }
            Ok(())
        }
    }
}

fn is_stdio(path: &Path) -> bool {
    path == Path::new("-")
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if is_stdio(path) {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn create_output(path: &Path) -> Result<Box<dyn Write>> {
    if is_stdio(path) {
        return Ok(Box::new(BufWriter::new(io::stdout().lock())));
    }
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

fn open_reader(path: &Path) -> Result<Reader<Box<dyn BufRead>>> {
    Reader::new(open_input(path)?)
        .with_context(|| format!("Cannot read the container {}", path.display()))
}

fn read_schema(path: &Path) -> Result<Schema> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Could not load schema file {}", path.display()))?;
    Schema::parse_str(&text).with_context(|| format!("Invalid schema in {}", path.display()))
}

fn print_line(text: &str) -> Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{text}")?;
    out.flush()?;
    Ok(())
}

/// Decode and discard every record. Returns the number of records.
fn read_all<R: Read>(reader: Reader<R>) -> Result<usize> {
    let mut count = 0;
    for value in reader {
        value?;
        count += 1;
    }
    Ok(count)
}

fn report(summary: &WriteSummary) {
    info!(
        "Wrote {} records in {} blocks",
        summary.records_written, summary.blocks_written
    );
    if !summary.errors.is_empty() {
        warn!("Skipped {} records", summary.errors.len());
    }
}

/// Order the keys of every JSON object.
fn sort_keys(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            JsonValue::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect::<Map<_, _>>(),
            )
        }
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
