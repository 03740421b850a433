use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use tracing::{error, info};

use crate::catalog::store::MarkerCatalog;
use crate::cli::{OutputFormat, RunArgs};
use crate::parsing::fastx::is_sequence_file;
use crate::parsing::stats::StatsMethod;
use crate::pipeline::budget::CancelToken;
use crate::pipeline::orchestrator::{screen_file, RunReport};

#[derive(Args)]
pub struct ScreenArgs {
    /// Input FASTQ/FASTA files (optionally gzipped) or directories of them
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Marker catalog (CSV or JSON)
    #[arg(long, default_value = "sanket.csv")]
    pub catalog: PathBuf,

    /// Directory for the Parquet outputs
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// How run statistics are obtained
    #[arg(long, value_enum, default_value = "native")]
    pub stats: StatsMethod,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Outcome of one input file
struct FileSummary {
    input: PathBuf,
    output: PathBuf,
    result: Result<RunReport, String>,
}

/// Expand directories (one level) into the sequence files they contain
fn collect_inputs(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("Failed to read directory {}", input.display()))?
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && is_sequence_file(path))
                .collect();
            found.sort();
            if found.is_empty() {
                tracing::warn!("No sequence files in {}", input.display());
            }
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

/// `<output_dir>/<input file name>.parquet`
fn output_path(output_dir: &Path, input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map_or_else(|| "output".to_string(), |n| n.to_string_lossy().into_owned());
    output_dir.join(format!("{name}.parquet"))
}

pub fn run(args: ScreenArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let config = args.run.screen_config()?;
    let catalog = MarkerCatalog::load_from_file(&args.catalog)
        .with_context(|| format!("Failed to load catalog {}", args.catalog.display()))?;
    info!(
        "Loaded {} markers ({} serotypes) from {}",
        catalog.len(),
        catalog.serotypes().len(),
        args.catalog.display()
    );

    let inputs = collect_inputs(&args.inputs)?;
    if inputs.is_empty() {
        anyhow::bail!("No sequence files to screen");
    }
    std::fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("Failed to create output directory {}", args.output_dir.display())
    })?;

    let cancel = CancelToken::new();
    let mut summaries = Vec::with_capacity(inputs.len());
    for input in inputs {
        let output = output_path(&args.output_dir, &input);
        if verbose {
            eprintln!("Screening {} -> {}", input.display(), output.display());
        }
        let result = screen_file(&catalog, &input, &output, &config, args.stats, &cancel)
            .map_err(|e| {
                error!("{}: {}", input.display(), e);
                e.to_string()
            });
        summaries.push(FileSummary {
            input,
            output,
            result,
        });
    }

    print_summaries(&summaries, format)?;

    let failed = summaries.iter().filter(|s| s.result.is_err()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} inputs failed", failed, summaries.len());
    }
    Ok(())
}

fn print_summaries(summaries: &[FileSummary], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            for s in summaries {
                match &s.result {
                    Ok(report) => println!(
                        "{}: {} reads, {} matched, {} rows written, {} dropped -> {}",
                        s.input.display(),
                        report.records,
                        report.matched_records,
                        report.rows_written,
                        report.rows_dropped,
                        s.output.display()
                    ),
                    Err(e) => println!("{}: FAILED: {}", s.input.display(), e),
                }
            }
        }
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = summaries
                .iter()
                .map(|s| match &s.result {
                    Ok(report) => serde_json::json!({
                        "input": s.input,
                        "output": s.output,
                        "status": "ok",
                        "report": report,
                    }),
                    Err(e) => serde_json::json!({
                        "input": s.input,
                        "status": "failed",
                        "error": e,
                    }),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Tsv => {
            println!("input\toutput\tstatus\trecords\tmatched_records\trows_written\trows_dropped");
            for s in summaries {
                match &s.result {
                    Ok(report) => println!(
                        "{}\t{}\tok\t{}\t{}\t{}\t{}",
                        s.input.display(),
                        s.output.display(),
                        report.records,
                        report.matched_records,
                        report.rows_written,
                        report.rows_dropped
                    ),
                    Err(_) => println!("{}\t\tfailed\t\t\t\t", s.input.display()),
                }
            }
        }
    }
    Ok(())
}
