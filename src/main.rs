//! Purpose: `tuplerow` CLI entry point: load JSON lines, project rows, print a fixed-width table.
//! Role: Demo consumer of the library; owns process exit codes and stderr diagnostics.
//! Invariants: Stdout carries table lines only; diagnostics and row failures go to stderr.
//! Invariants: Errors map to stable exit codes via `to_exit_code`.
mod load;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::io::{self, IsTerminal, Write};

use clap::error::ErrorKind as ClapErrorKind;
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value as JsonValue, json};
use tracing_subscriber::EnvFilter;
use tuplerow::api::{
    AutoSizeConfig, AutoSizingStage, Column, Error, ErrorKind, Pipeline, PipelineConfig,
    PipelineOutputs, Row, RowProjector, RowWithProps, RunningPipeline, Schema, TooLongBehavior,
    TransformFailure, Value, join_line, to_exit_code,
};

use load::{ColumnSpec, columns_from_specs, load_jsonl};

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let code = if err.kind() == ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand {
                    2
                } else {
                    0
                };
                return Ok(code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `tuplerow --help`."));
            }
        },
    };

    match cli.command {
        Command::Table(args) => run_table(args),
    }
}

#[derive(Parser)]
#[command(
    name = "tuplerow",
    version,
    about = "Project tagged tuples into rows and print them as a fixed-width table",
    after_help = r#"EXAMPLES
  $ printf '{"id":1,"name":"Bob","age":30}\n' | \
      tuplerow table --column id:int:key --column name:string --column age:int

  RUST_LOG=debug shows stage lifecycle on stderr."#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read JSON objects (one per line) from stdin and print a fixed-width table.
    Table(TableArgs),
}

#[derive(Args)]
struct TableArgs {
    #[arg(
        long = "column",
        required = true,
        value_name = "NAME:TYPE[:key]",
        help = "Repeatable column declaration; types: int|uint|float|bool|string|bytes|any"
    )]
    columns: Vec<ColumnSpec>,
    #[arg(
        long = "select",
        value_name = "NAME",
        help = "Repeatable column to print, in order (default: all)"
    )]
    select: Vec<String>,
    #[arg(
        long,
        default_value_t = 100,
        help = "Rows sampled to size columns; 0 samples all input"
    )]
    sample: usize,
    #[arg(
        long = "too-long",
        default_value = "truncate",
        help = "Values wider than their column: error|skip|truncate|hash|print-all"
    )]
    too_long: TooLongBehavior,
    #[arg(long, default_value_t = 64, help = "Queue capacity between pipeline stages")]
    channel_capacity: usize,
    #[arg(long, help = "Omit the header line")]
    no_header: bool,
}

fn run_table(args: TableArgs) -> Result<i32, Error> {
    let columns = columns_from_specs(&args.columns);
    let schema = Schema::new(columns.clone())?;
    let mut seen = HashMap::new();
    for column in schema.columns() {
        if seen.insert(column.name.as_str(), column.tag).is_some() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("column '{}' is declared twice", column.name)));
        }
    }

    let selected = select_columns(&schema, &args.select)?;
    let tag_to_index = selected
        .iter()
        .enumerate()
        .map(|(i, column)| (column.tag, i))
        .collect();
    let projector = RowProjector::new(tag_to_index, columns.clone(), selected.len())?;
    let config = PipelineConfig {
        channel_capacity: args.channel_capacity,
    };
    config.validate()?;

    let header = Row::new(
        selected
            .iter()
            .map(|column| Value::from(column.name.as_str()))
            .collect(),
    );
    let stage = AutoSizingStage::new(
        Schema::new(selected)?,
        AutoSizeConfig {
            sample_size: args.sample,
            too_long: args.too_long,
        },
    );

    let map = load_jsonl(io::stdin().lock(), &columns)?;
    let mut pipeline = Pipeline::new(map.full_scan(projector), config)?;
    if !args.no_header {
        pipeline = pipeline.inject_row(RowWithProps::new(header));
    }
    let pipeline = pipeline.add_stage(stage);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start runtime")
                .with_source(err)
        })?;
    let failures = runtime.block_on(async {
        let (running, outputs) = pipeline.start();
        drain(running, outputs).await
    })?;
    if failures > 0 {
        tracing::warn!(failures, "some rows could not be formatted");
    }
    Ok(0)
}

fn select_columns(schema: &Schema, names: &[String]) -> Result<Vec<Column>, Error> {
    if names.is_empty() {
        return Ok(schema.columns().to_vec());
    }
    names
        .iter()
        .map(|name| {
            schema.column_by_name(name).cloned().ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("unknown column '{name}'"))
                    .with_column(name.clone())
                    .with_hint("--select names must match a --column declaration")
            })
        })
        .collect()
}

/// Writes rows to stdout and failures to stderr until both queues close.
async fn drain(running: RunningPipeline, mut outputs: PipelineOutputs) -> Result<u64, Error> {
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let mut failures = 0u64;
    let mut write_err = None;
    let mut rows_open = true;
    let mut failures_open = true;
    while rows_open || failures_open {
        tokio::select! {
            item = outputs.rows.recv(), if rows_open => match item {
                Some(item) => {
                    if let Err(err) = writeln!(out, "{}", join_line(&item.row).trim_end()) {
                        write_err = Some(err);
                        running.cancel();
                        break;
                    }
                }
                None => rows_open = false,
            },
            failure = outputs.failures.recv(), if failures_open => match failure {
                Some(failure) => {
                    failures += 1;
                    emit_failure(&failure);
                }
                None => failures_open = false,
            },
        }
    }
    drop(outputs);
    running.wait().await?;

    let flushed = match write_err {
        Some(err) => Err(err),
        None => out.flush(),
    };
    flushed.map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write output")
            .with_source(err)
    })?;
    Ok(failures)
}

fn emit_failure(failure: &TransformFailure) {
    let value = json!({
        "failure": {
            "stage": failure.stage,
            "detail": failure.detail,
            "row": failure.row,
        }
    });
    eprintln!("{value}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::MalformedInput => "malformed input".to_string(),
        ErrorKind::Conversion => "conversion failed".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> JsonValue {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(column) = err.column() {
        inner.insert("column".to_string(), json!(column));
    }
    if let Some(tag) = err.tag() {
        inner.insert("tag".to_string(), json!(tag));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), JsonValue::Object(inner));
    JsonValue::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(column) = err.column() {
        lines.push(format!("column: {column}"));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
