//!
//! # sorparse
//!
//! Command-line front end for the sorparse library: reads a SOR file and
//! prints a text summary, JSON or CBOR. Individual blocks that fail to
//! decode are reported inside the output; only an unreadable file or an
//! unusable map block fails the run.
//!
use clap::{Parser, ValueEnum};
use sorparse::types::SorRecord;
use sorparse::{summary, ParseOptions};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    version,
    about = "sorparse decodes Telcordia SOR files, as written by optical time-domain reflectometers, into text summaries, JSON or CBOR"
)]
struct Opts {
    /// SOR file to parse
    input: PathBuf,
    /// Emit the record as compact JSON instead of a text summary
    #[arg(long)]
    json: bool,
    /// Pretty-print the JSON output (implies --json)
    #[arg(long)]
    pretty: bool,
    /// Output format; --json and --pretty are shorthand for json
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Write the output to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Extract the raw backscatter samples into the record as well
    #[arg(long)]
    with_trace_data: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Cbor,
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let opts = Opts::parse();
    let format = if opts.json || opts.pretty {
        OutputFormat::Json
    } else {
        opts.format
    };
    let options = ParseOptions {
        include_trace_samples: opts.with_trace_data,
    };

    let record = match sorparse::parse_file(&opts.input, &options) {
        Ok(record) => record,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let out = match encode(&record, format, opts.pretty) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = write_output(&out, opts.output.as_ref()) {
        eprintln!("error: {}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn encode(record: &SorRecord, format: OutputFormat, pretty: bool) -> Result<Vec<u8>, String> {
    match format {
        OutputFormat::Text => Ok(summary::render(record).into_bytes()),
        OutputFormat::Json if pretty => serde_json::to_vec_pretty(record)
            .map(|mut bytes| {
                bytes.push(b'\n');
                bytes
            })
            .map_err(|err| format!("JSON serialisation failed: {}", err)),
        OutputFormat::Json => serde_json::to_vec(record)
            .map(|mut bytes| {
                bytes.push(b'\n');
                bytes
            })
            .map_err(|err| format!("JSON serialisation failed: {}", err)),
        OutputFormat::Cbor => {
            serde_cbor::to_vec(record).map_err(|err| format!("CBOR serialisation failed: {}", err))
        }
    }
}

fn write_output(bytes: &[u8], output: Option<&PathBuf>) -> Result<(), String> {
    match output {
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(bytes)
                .map_err(|err| format!("writing to stdout failed: {}", err))
        }
        Some(path) => {
            let mut file = File::create(path)
                .map_err(|err| format!("cannot create {}: {}", path.display(), err))?;
            file.write_all(bytes)
                .map_err(|err| format!("writing {} failed: {}", path.display(), err))
        }
    }
}

#[test]
fn test_cli_definition() {
    use clap::CommandFactory;
    Opts::command().debug_assert();
}
