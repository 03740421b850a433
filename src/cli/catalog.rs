use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};

use crate::catalog::store::MarkerCatalog;
use crate::cli::OutputFormat;
use crate::core::marker::MarkerRecord;
use crate::core::types::MarkerId;

#[derive(Args)]
pub struct CatalogArgs {
    #[command(subcommand)]
    pub command: CatalogCommands,
}

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// List all markers in the catalog
    List {
        /// Path to the catalog file (CSV or JSON)
        #[arg(long, default_value = "sanket.csv")]
        catalog: PathBuf,

        /// Filter by serotype (e.g., "DENV-2")
        #[arg(long)]
        serotype: Option<String>,
    },

    /// Show details of a specific marker
    Show {
        /// Marker ID
        #[arg(required = true)]
        id: String,

        /// Path to the catalog file (CSV or JSON)
        #[arg(long, default_value = "sanket.csv")]
        catalog: PathBuf,
    },

    /// Export the catalog as JSON
    Export {
        /// Output file path
        #[arg(required = true)]
        output: PathBuf,

        /// Path to the catalog file to export
        #[arg(long, default_value = "sanket.csv")]
        catalog: PathBuf,
    },
}

pub fn run(args: CatalogArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    match args.command {
        CatalogCommands::List { catalog, serotype } => {
            run_list(&catalog, serotype.as_deref(), format, verbose)
        }
        CatalogCommands::Show { id, catalog } => run_show(&id, &catalog, format),
        CatalogCommands::Export { output, catalog } => run_export(&output, &catalog),
    }
}

/// Truncate a string for column display
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn run_list(
    catalog_path: &Path,
    serotype_filter: Option<&str>,
    format: OutputFormat,
    verbose: bool,
) -> anyhow::Result<()> {
    let catalog = MarkerCatalog::load_from_file(catalog_path)?;

    if verbose {
        eprintln!(
            "Loaded catalog with {} markers across {} serotypes",
            catalog.len(),
            catalog.serotypes().len()
        );
    }

    let filtered: Vec<&MarkerRecord> = catalog
        .iter()
        .filter(|m| serotype_filter.map_or(true, |s| m.serotype.eq_ignore_ascii_case(s)))
        .collect();

    match format {
        OutputFormat::Text => {
            let id_width = filtered.iter().map(|m| m.id.0.len()).max().unwrap_or(2).max(2);
            let serotype_width = filtered
                .iter()
                .map(|m| m.serotype.len())
                .max()
                .unwrap_or(8)
                .max(8);
            let total_width = id_width + serotype_width + 8 + 32 + 3;

            println!("Marker Catalog ({} markers)\n", filtered.len());
            println!(
                "{:<id_w$} {:<sero_w$} {:>8} Sequence",
                "ID",
                "Serotype",
                "Length",
                id_w = id_width,
                sero_w = serotype_width
            );
            println!("{}", "-".repeat(total_width));

            for m in &filtered {
                println!(
                    "{:<id_w$} {:<sero_w$} {:>8} {}",
                    m.id.0,
                    m.serotype,
                    m.length,
                    truncate(&m.sequence, 32),
                    id_w = id_width,
                    sero_w = serotype_width
                );
                if verbose {
                    println!(
                        "  └─ SSRs: {} (len {}, copies {})  Palindromes: {} (len {})",
                        m.repeat_count,
                        m.repeat_mean_length,
                        m.repeat_mean_copies,
                        m.palindrome_count,
                        m.palindrome_mean_length
                    );
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&filtered)?);
        }
        OutputFormat::Tsv => {
            println!("sid\tsanket\ts_len\tserotype\tssr_count\tmlen_avg\tmrc_avg\tp_count\tplen_avg");
            for m in &filtered {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    m.id.0,
                    m.sequence,
                    m.length,
                    m.serotype,
                    m.repeat_count,
                    m.repeat_mean_length,
                    m.repeat_mean_copies,
                    m.palindrome_count,
                    m.palindrome_mean_length
                );
            }
        }
    }

    Ok(())
}

fn run_show(id: &str, catalog_path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let catalog = MarkerCatalog::load_from_file(catalog_path)?;

    let marker = catalog
        .get(&MarkerId::new(id))
        .ok_or_else(|| anyhow::anyhow!("Marker '{}' not found", id))?;

    match format {
        OutputFormat::Text => {
            println!("Marker: {}\n", marker.id);
            println!("Serotype:    {}", marker.serotype);
            println!("Length:      {}", marker.length);
            println!("Sequence:    {}", marker.sequence);
            println!("\nSimple sequence repeats");
            println!("  Count:        {}", marker.repeat_count);
            println!("  Mean length:  {}", marker.repeat_mean_length);
            println!("  Mean copies:  {}", marker.repeat_mean_copies);
            println!("\nPalindromes");
            println!("  Count:        {}", marker.palindrome_count);
            println!("  Mean length:  {}", marker.palindrome_mean_length);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(marker)?);
        }
        OutputFormat::Tsv => {
            println!("field\tvalue");
            println!("sid\t{}", marker.id);
            println!("sanket\t{}", marker.sequence);
            println!("s_len\t{}", marker.length);
            println!("serotype\t{}", marker.serotype);
            println!("ssr_count\t{}", marker.repeat_count);
            println!("mlen_avg\t{}", marker.repeat_mean_length);
            println!("mrc_avg\t{}", marker.repeat_mean_copies);
            println!("p_count\t{}", marker.palindrome_count);
            println!("plen_avg\t{}", marker.palindrome_mean_length);
        }
    }

    Ok(())
}

fn run_export(output: &Path, catalog_path: &Path) -> anyhow::Result<()> {
    let catalog = MarkerCatalog::load_from_file(catalog_path)?;

    let json = catalog.to_json()?;
    std::fs::write(output, json)?;

    println!("Exported {} markers to {}", catalog.len(), output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("ACGT", 10), "ACGT");
        assert_eq!(truncate("ACGTACGTACGT", 8), "ACGTA...");
    }
}
