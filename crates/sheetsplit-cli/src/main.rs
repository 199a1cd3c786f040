use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use sheetsplit::{
    CollisionPolicy, ContainerFormat, ErrorPolicy, SheetCatalog, SplitOptions, SplitSession,
    XlsxPackageLimits,
};

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OnCollision {
    Suffix,
    Error,
    Overwrite,
}

impl From<OnCollision> for CollisionPolicy {
    fn from(value: OnCollision) -> Self {
        match value {
            OnCollision::Suffix => CollisionPolicy::Suffix,
            OnCollision::Error => CollisionPolicy::Error,
            OnCollision::Overwrite => CollisionPolicy::Overwrite,
        }
    }
}

#[derive(Parser)]
#[command(about = "Split an XLSX/XLSM workbook into one workbook per sheet, keeping formatting.")]
struct Args {
    /// Source workbook.
    input: PathBuf,

    /// Directory the split workbooks (and archive) are written to.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Print the sheet names and exit.
    #[arg(long)]
    list: bool,

    /// Only split these sheets (repeatable). Output order still follows the workbook.
    #[arg(long = "sheet")]
    sheets: Vec<String>,

    /// Also write `<stem>_split_files.zip` holding every produced workbook.
    #[arg(long)]
    archive: bool,

    /// Skip writing the individual workbooks (useful with `--archive`).
    #[arg(long)]
    no_files: bool,

    /// What to do when two sheets map to the same file name.
    #[arg(long, value_enum, default_value_t = OnCollision::Suffix)]
    on_collision: OnCollision,

    /// Keep going after a sheet fails instead of stopping the batch.
    #[arg(long)]
    continue_on_error: bool,

    /// Maximum uncompressed size of a single package part.
    #[arg(long)]
    max_part_bytes: Option<u64>,

    /// Maximum uncompressed size of the whole package.
    #[arg(long)]
    max_total_bytes: Option<u64>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct JsonCatalog<'a> {
    source: &'a str,
    format: ContainerFormat,
    sheets: &'a SheetCatalog,
}

#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
    file_name: &'a str,
    sheet: &'a str,
    bytes: usize,
    mime_type: &'static str,
}

#[derive(Debug, Serialize)]
struct JsonFailure<'a> {
    sheet: &'a str,
    error: String,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    source: &'a str,
    format: ContainerFormat,
    sheets: &'a SheetCatalog,
    collision: CollisionPolicy,
    on_error: ErrorPolicy,
    outputs: Vec<JsonOutput<'a>>,
    archive: Option<String>,
    failures: Vec<JsonFailure<'a>>,
    cancelled: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let defaults = XlsxPackageLimits::default();
    let limits = XlsxPackageLimits {
        max_part_bytes: args.max_part_bytes.unwrap_or(defaults.max_part_bytes),
        max_total_bytes: args.max_total_bytes.unwrap_or(defaults.max_total_bytes),
    };

    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("read {}", args.input.display()))?;
    let file_name = args
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.input.to_string_lossy().into_owned());

    let mut session = SplitSession::open_with_limits(file_name.as_str(), bytes, limits)
        .with_context(|| format!("open {}", args.input.display()))?;

    if args.list {
        match args.format {
            OutputFormat::Text => {
                for name in session.sheet_names() {
                    println!("{name}");
                }
            }
            OutputFormat::Json => write_json(&JsonCatalog {
                source: &file_name,
                format: session.source().format(),
                sheets: session.catalog(),
            })?,
        }
        return Ok(());
    }

    let options = SplitOptions {
        collision: args.on_collision.into(),
        on_error: if args.continue_on_error {
            ErrorPolicy::SkipSheet
        } else {
            ErrorPolicy::AbortBatch
        },
        limits,
        sheets: (!args.sheets.is_empty()).then(|| args.sheets.clone()),
        cancel: None,
    };

    session.split_with_progress(&options, |progress| match progress.file_name {
        Some(out) => log::info!(
            "[{}/{}] {} -> {out}",
            progress.index,
            progress.total,
            progress.sheet
        ),
        None => log::info!(
            "[{}/{}] {} failed",
            progress.index,
            progress.total,
            progress.sheet
        ),
    });

    let needs_dir = (!args.no_files && !session.outputs().is_empty()) || args.archive;
    if needs_dir {
        std::fs::create_dir_all(&args.out_dir)
            .with_context(|| format!("create {}", args.out_dir.display()))?;
    }

    if !args.no_files {
        for file in session.outputs() {
            write_file(&args.out_dir, &file.file_name, &file.bytes)?;
        }
    }

    let archive_name = if args.archive {
        match session.archive().context("build archive")? {
            Some(archive) => {
                write_file(&args.out_dir, &archive.file_name, &archive.bytes)?;
                Some(archive.file_name.into_owned())
            }
            None => {
                log::warn!("no sheets were split; skipping the archive");
                None
            }
        }
    } else {
        None
    };

    let report = session.report();
    match args.format {
        OutputFormat::Text => {
            println!("Split {file_name}");
            for file in &report.outputs {
                println!(
                    "  {} <- {:?} ({} bytes)",
                    file.file_name,
                    file.sheet,
                    file.bytes.len()
                );
            }
            if let Some(name) = &archive_name {
                println!("  archive: {name}");
            }
            for failure in &report.failures {
                println!("  failed {:?}: {}", failure.sheet, failure.error);
            }
            if report.cancelled {
                println!("  cancelled");
            }
        }
        OutputFormat::Json => {
            let json_report = JsonReport {
                source: &file_name,
                format: session.source().format(),
                sheets: session.catalog(),
                collision: options.collision,
                on_error: options.on_error,
                outputs: report
                    .outputs
                    .iter()
                    .map(|file| JsonOutput {
                        file_name: &file.file_name,
                        sheet: &file.sheet,
                        bytes: file.bytes.len(),
                        mime_type: file.mime_type,
                    })
                    .collect(),
                archive: archive_name,
                failures: report
                    .failures
                    .iter()
                    .map(|failure| JsonFailure {
                        sheet: &failure.sheet,
                        error: failure.error.to_string(),
                    })
                    .collect(),
                cancelled: report.cancelled,
            };
            write_json(&json_report)?;
        }
    }

    if !report.is_complete() {
        std::process::exit(1);
    }

    Ok(())
}

fn write_file(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<()> {
    let path = dir.join(file_name);
    std::fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer(&mut handle, value)?;
    handle.write_all(b"\n")?;
    Ok(())
}
