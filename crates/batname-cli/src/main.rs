use std::path::{Path, PathBuf};

use batname_core::{reconcile, report, Catalog, NamingConfig, RenameOptions, TableStatus};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "batname", version, about = "Repair badly-named bat recorder files from their XML sidecars")]
struct Cli {
    /// Naming conventions as JSON (extensions, marker token, sidecar tags)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log every per-file decision
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan an untouched tree of site folders and propose a good name per recording
    Catalog {
        /// Folder holding one subfolder per site
        root: PathBuf,

        /// Where to persist the catalog
        #[arg(short, long, default_value = "catalog.csv")]
        output: PathBuf,
    },

    /// Rename badly-named recordings and sidecars to their good names
    Rename {
        /// Tree holding the badly-named files
        root: PathBuf,

        /// Catalog written by `batname catalog`
        #[arg(long)]
        catalog: PathBuf,

        /// Outcome report (default: rename_report.csv next to the catalog)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Report what would happen without renaming anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Point results tables at the good names and re-derive their date columns
    FixCsv {
        /// Results tables, or folders searched for *.csv
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Catalog written by `batname catalog`
        #[arg(long)]
        catalog: PathBuf,

        /// Per-table report (default: csv_report.csv next to the catalog)
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Re-derive date columns of tables whose filenames are already corrected
    RetrofitCsv {
        /// Results tables, or folders searched for *.csv
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Per-table report
        #[arg(long, default_value = "retrofit_report.csv")]
        report: PathBuf,
    },
}

fn report_path(explicit: Option<PathBuf>, catalog: &Path, name: &str) -> PathBuf {
    explicit.unwrap_or_else(|| catalog.with_file_name(name))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "batname=debug,batname_core=debug"
    } else {
        "batname=info,batname_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => NamingConfig::load(path)?,
        None => NamingConfig::default(),
    };

    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {msg}")?);
    let progress = |stage: &str, current: u64, total: u64, message: &str| {
        pb.set_length(total);
        pb.set_position(current + 1);
        pb.set_message(format!("{} {}", stage, message));
    };
    let t_total = std::time::Instant::now();

    match cli.command {
        Command::Catalog { root, output } => {
            let result = batname_core::build_catalog(&root, &config, &progress)?;
            pb.finish_and_clear();
            result.catalog.save(&output)?;
            eprintln!(
                "Done! {} records from {} sites ({} skipped) written to {} ({:.2}s)",
                result.catalog.len(),
                result.sites.len(),
                result.skipped_sites.len(),
                output.display(),
                t_total.elapsed().as_secs_f64()
            );
        }
        Command::Rename {
            root,
            catalog,
            report: report_file,
            dry_run,
        } => {
            let records = Catalog::load(&catalog)?;
            info!("Loaded {} catalog records", records.len());
            let options = RenameOptions { root, dry_run };
            let summary = batname_core::rename_tree(&options, &records, &config, &progress)?;
            pb.finish_and_clear();

            let report_file = report_path(report_file, &catalog, "rename_report.csv");
            report::write_rename_report(&report_file, &summary.outcomes)?;
            let tally = summary
                .tally()
                .iter()
                .map(|(outcome, count)| format!("{} {}", count, outcome))
                .collect::<Vec<_>>()
                .join(", ");
            eprintln!(
                "Done! {} files: {}. Report: {} ({:.2}s)",
                summary.outcomes.len(),
                tally,
                report_file.display(),
                t_total.elapsed().as_secs_f64()
            );
        }
        Command::FixCsv {
            paths,
            catalog,
            report: report_file,
        } => {
            let records = Catalog::load(&catalog)?;
            let tables = reconcile::collect_tables(&paths);
            let outcomes = batname_core::fix_tables(&tables, &records, &config, &progress);
            pb.finish_and_clear();

            let report_file = report_path(report_file, &catalog, "csv_report.csv");
            report::write_table_report(&report_file, &outcomes)?;
            let failed = outcomes
                .iter()
                .filter(|o| matches!(o.status, TableStatus::Failed(_)))
                .count();
            eprintln!(
                "Done! {} tables, {} failed. Report: {} ({:.2}s)",
                outcomes.len(),
                failed,
                report_file.display(),
                t_total.elapsed().as_secs_f64()
            );
        }
        Command::RetrofitCsv {
            paths,
            report: report_file,
        } => {
            let tables = reconcile::collect_tables(&paths);
            let outcomes = batname_core::retrofit_tables(&tables, &progress);
            pb.finish_and_clear();

            report::write_table_report(&report_file, &outcomes)?;
            let changed: usize = outcomes.iter().map(|o| o.changed).sum();
            eprintln!(
                "Done! {} tables, {} rows changed. Report: {} ({:.2}s)",
                outcomes.len(),
                changed,
                report_file.display(),
                t_total.elapsed().as_secs_f64()
            );
        }
    }

    Ok(())
}
