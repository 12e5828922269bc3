// ██████╗  █████╗ ████████╗ █████╗
// ██╔══██╗██╔══██╗╚══██╔══╝██╔══██╗
// ██║  ██║███████║   ██║   ███████║
// ██║  ██║██╔══██║   ██║   ██╔══██║
// ██████╔╝██║  ██║   ██║   ██║  ██║
// ╚═════╝ ╚═╝  ╚═╝   ╚═╝   ╚═╝  ╚═╝
//
// T O O L K I T
//
// Thin command-line entry point over the library: fetch a table, clean a
// batch of files, analyze one. All the behaviour lives in the library;
// this file parses arguments, wires up logging and decides file names.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use data_toolkit::acquirer::{self, SourceDescriptor};
use data_toolkit::analyzer::{self, AnalyzerConfig};
use data_toolkit::cleaner::{Cleaner, CleanerConfig, CleaningReport};
use data_toolkit::config::Config;
use data_toolkit::io;
use data_toolkit::metrics::BatchMetrics;

#[derive(Debug, Parser)]
#[command(name = "data-toolkit", version, about = "Fetch, clean and analyze tabular data")]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    /// Customer contact lists: names, phones, yes/no flags, addresses.
    Contacts,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download one HTML table and save it as CSV or JSON.
    Fetch {
        /// Built-in source: fortune500 or countries.
        preset: Option<String>,
        /// Page to fetch instead of a preset.
        #[arg(long, conflicts_with = "preset", requires = "expect")]
        url: Option<String>,
        /// Header labels the table must contain (with --url).
        #[arg(long, num_args = 1..)]
        expect: Vec<String>,
        /// CSS selector for candidate tables.
        #[arg(long)]
        selector: Option<String>,
        /// Header keywords marking numeric columns.
        #[arg(long, num_args = 1..)]
        numeric: Vec<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Clean one or more files. Each file is an independent run.
    Clean {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// JSON rule file describing the pipeline.
        #[arg(long, conflicts_with = "preset")]
        rules: Option<PathBuf>,
        #[arg(long, value_enum)]
        preset: Option<Preset>,
        /// Fail a file when any cell could not be normalized.
        #[arg(long)]
        strict: bool,
        /// Output directory (defaults to DATA_TOOLKIT_OUTPUT_DIR).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also write each cleaning report as JSON.
        #[arg(long)]
        report_json: bool,
    },
    /// Descriptive statistics, correlations and outliers for one file.
    Analyze {
        input: PathBuf,
        /// |r| above this is reported as a strong correlation.
        #[arg(long)]
        threshold: Option<f64>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
        /// Also write the report to this file.
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn print_banner() {
    let banner = r#"
    ╔══════════════════════════════════════════════════════╗
    ║                 D A T A   T O O L K I T              ║
    ║                                                      ║
    ║   fetch    one GET, one table                        ║
    ║   clean    five passes, one ledger                   ║
    ║   analyze  stats, correlations, IQR outliers         ║
    ╚══════════════════════════════════════════════════════╝
    "#;
    eprintln!("{banner}");
}

fn init_tracing(config: &Config, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_tracing(&config, cli.json_logs);
    print_banner();

    match cli.command {
        Command::Fetch {
            preset,
            url,
            expect,
            selector,
            numeric,
            output,
        } => run_fetch(&config, preset, url, expect, selector, numeric, output),
        Command::Clean {
            inputs,
            rules,
            preset,
            strict,
            output,
            report_json,
        } => {
            let mut cleaner_config = match (rules, preset) {
                (Some(path), _) => CleanerConfig::from_json_file(&path)
                    .with_context(|| format!("loading rules from {}", path.display()))?,
                (None, Some(Preset::Contacts)) => CleanerConfig {
                    sparse_column_ratio: config.sparse_column_ratio,
                    ..CleanerConfig::customer_contacts()
                },
                (None, None) => CleanerConfig::default(),
            };
            cleaner_config.strict |= strict || config.strict;
            let out_dir = output.unwrap_or_else(|| config.output_dir.clone());
            run_clean(cleaner_config, &inputs, &out_dir, report_json)
        }
        Command::Analyze {
            input,
            threshold,
            json,
            save,
        } => {
            let mut analyzer_config = AnalyzerConfig::from(&config);
            if let Some(t) = threshold {
                analyzer_config.strong_correlation = t;
            }
            run_analyze(&analyzer_config, &input, json, save.as_deref())
        }
    }
}

fn run_fetch(
    config: &Config,
    preset: Option<String>,
    url: Option<String>,
    expect: Vec<String>,
    selector: Option<String>,
    numeric: Vec<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let (name, mut desc) = match (preset, url) {
        (Some(name), _) => {
            let desc = SourceDescriptor::preset(&name)
                .with_context(|| format!("unknown preset '{name}' (try fortune500 or countries)"))?;
            (name, desc)
        }
        (None, Some(url)) => ("table".to_string(), SourceDescriptor::new(url, expect)),
        (None, None) => bail!("give a preset name or --url with --expect"),
    };
    if let Some(selector) = selector {
        desc.table_selector = selector;
    }
    if !numeric.is_empty() {
        desc.numeric_keywords = numeric;
    }
    let desc = desc.with_config(config);

    let dataset = acquirer::fetch_blocking(&desc)
        .with_context(|| format!("fetching {}", desc.url))?;

    let path = output.unwrap_or_else(|| config.output_dir.join(format!("{name}.csv")));
    io::save(&dataset, &path).with_context(|| format!("saving {}", path.display()))?;

    println!("{}", "=".repeat(50));
    println!("SCRAPING SUMMARY");
    println!("{}", "=".repeat(50));
    println!("Rows scraped: {}", dataset.len());
    println!("Columns: {}", dataset.columns().join(", "));
    println!("Saved to: {}", path.display());
    Ok(())
}

fn file_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".into())
}

fn extension(input: &Path) -> String {
    input
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_else(|| "csv".into())
}

fn with_parent(input: &Path) -> String {
    let parent = input
        .parent()
        .and_then(Path::file_name)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".into());
    format!("{parent}_{}", file_stem(input))
}

fn with_parent_and_ext(input: &Path) -> String {
    format!("{}_{}", with_parent(input), extension(input))
}

/// One output stem per input. Inputs whose stems clash are renamed, first
/// with their parent directory, then with their extension too.
fn output_stems(inputs: &[PathBuf]) -> Result<Vec<String>> {
    let mut stems: Vec<String> = inputs.iter().map(|p| file_stem(p)).collect();
    let renames: [fn(&Path) -> String; 2] = [with_parent, with_parent_and_ext];
    for rename in renames {
        let clashing: Vec<bool> = stems
            .iter()
            .map(|s| stems.iter().filter(|o| *o == s).count() > 1)
            .collect();
        if !clashing.contains(&true) {
            return Ok(stems);
        }
        for ((stem, input), clash) in stems.iter_mut().zip(inputs).zip(clashing) {
            if clash {
                *stem = rename(input);
            }
        }
    }
    let mut seen = HashSet::new();
    for (input, stem) in inputs.iter().zip(&stems) {
        if !seen.insert(stem) {
            bail!(
                "{} would overwrite the output of another input (stem '{stem}')",
                input.display()
            );
        }
    }
    Ok(stems)
}

fn output_paths(input: &Path, stem: &str, out_dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let ext = extension(input);
    (
        out_dir.join(format!("{stem}_cleaned.{ext}")),
        out_dir.join(format!("{stem}_cleaning_report.txt")),
        out_dir.join(format!("{stem}_cleaning_report.json")),
    )
}

fn clean_one(
    cleaner: &Cleaner,
    input: &Path,
    stem: &str,
    out_dir: &Path,
    report_json: bool,
) -> Result<CleaningReport> {
    let dataset = io::load(input).with_context(|| format!("loading {}", input.display()))?;
    let (cleaned, report) = cleaner
        .clean(dataset)
        .with_context(|| format!("cleaning {}", input.display()))?;

    let (data_path, text_path, json_path) = output_paths(input, stem, out_dir);
    io::save(&cleaned, &data_path).with_context(|| format!("saving {}", data_path.display()))?;
    std::fs::write(&text_path, report.render_text())
        .with_context(|| format!("writing {}", text_path.display()))?;
    if report_json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&json_path, json)
            .with_context(|| format!("writing {}", json_path.display()))?;
    }
    info!(
        input = %input.display(),
        output = %data_path.display(),
        rows_in = report.original_rows,
        rows_out = report.final_rows,
        flagged = report.issues.len(),
        "File cleaned"
    );
    Ok(report)
}

fn run_clean(config: CleanerConfig, inputs: &[PathBuf], out_dir: &Path, report_json: bool) -> Result<()> {
    let cleaner = Cleaner::new(config).context("invalid cleaning configuration")?;
    let stems = output_stems(inputs)?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let metrics = BatchMetrics::new();
    let reports: Vec<Option<CleaningReport>> = inputs
        .par_iter()
        .zip(stems.par_iter())
        .map(|(input, stem)| {
            let started = Instant::now();
            match clean_one(&cleaner, input, stem, out_dir, report_json) {
                Ok(report) => {
                    metrics.record_report(&report, started.elapsed().as_secs_f64());
                    Some(report)
                }
                Err(e) => {
                    metrics.record_failure();
                    error!(input = %input.display(), error = %format!("{e:#}"), "File failed");
                    None
                }
            }
        })
        .collect();

    if let [Some(report)] = reports.as_slice() {
        print!("{}", report.render_text());
    }

    let snapshot = metrics.snapshot();
    info!(
        files = snapshot.files_processed,
        failed = snapshot.files_failed,
        rows_in = snapshot.rows_in,
        rows_out = snapshot.rows_out,
        cells_flagged = snapshot.cells_flagged,
        elapsed_secs = snapshot.elapsed_seconds,
        "Batch complete"
    );
    if inputs.len() > 1 {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    if snapshot.files_failed > 0 {
        bail!("{} of {} files failed", snapshot.files_failed, inputs.len());
    }
    Ok(())
}

fn run_analyze(config: &AnalyzerConfig, input: &Path, json: bool, save: Option<&Path>) -> Result<()> {
    let dataset = io::load(input).with_context(|| format!("loading {}", input.display()))?;
    if dataset.is_empty() {
        warn!(input = %input.display(), "Dataset has no rows");
    }
    let report = analyzer::analyze(&dataset, config);
    let rendered = if json {
        report.to_json()?
    } else {
        report.render_text()
    };
    println!("{rendered}");
    if let Some(path) = save {
        std::fs::write(path, &rendered).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "Analysis report saved");
    }
    Ok(())
}
