use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crate::cli::OutputFormat;
use crate::parsing::stats::{run_statistics, StatsMethod};

#[derive(Args)]
pub struct StatsArgs {
    /// FASTQ/FASTA file, optionally gzipped
    #[arg(required = true)]
    pub input: PathBuf,

    /// How the statistics are computed
    #[arg(long, value_enum, default_value = "native")]
    pub method: StatsMethod,
}

pub fn run(args: StatsArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    if verbose {
        eprintln!("Computing statistics of {} ({:?})", args.input.display(), args.method);
    }
    let stats = run_statistics(&args.input, args.method)
        .with_context(|| format!("Failed to compute statistics of {}", args.input.display()))?;

    match format {
        OutputFormat::Text => {
            println!("File:           {}", args.input.display());
            println!("Records:        {}", stats.total_record_count);
            println!("Mean length:    {:.2}", stats.average_read_length);
            println!("Total bases:    {:.0}", stats.total_bases());
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "file": args.input,
                "total_record_count": stats.total_record_count,
                "average_read_length": stats.average_read_length,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Tsv => {
            println!("file\ttotal_record_count\taverage_read_length");
            println!(
                "{}\t{}\t{}",
                args.input.display(),
                stats.total_record_count,
                stats.average_read_length
            );
        }
    }

    Ok(())
}
