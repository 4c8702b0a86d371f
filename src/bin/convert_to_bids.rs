//! Batch-convert FGCM MEG recordings to BIDS and attach head shapes.
//!
//! ```text
//! convert_to_bids                              # every subject × task
//! convert_to_bids --subject C01 --task audio_base
//! convert_to_bids --dry-run                    # print the plan only
//! convert_to_bids --only-headshape             # after an earlier conversion
//! ```
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use megbids::{
    attach_headshapes, convert_dataset, ConversionConfig, Converter, FifBackend, FsEffects,
    ReferenceTable, SubjectId,
};

#[derive(Parser)]
#[command(name = "convert_to_bids", about = "Convert FGCM MEG data to BIDS format")]
struct Args {
    /// Convert a single subject (e.g. C01)
    #[arg(long)]
    subject: Option<String>,

    /// Convert a single task (e.g. audio_base)
    #[arg(long)]
    task: Option<String>,

    /// Show what would be converted without doing it
    #[arg(long)]
    dry_run: bool,

    /// TOML file overriding the built-in study configuration
    #[arg(long, env = "MEGBIDS_CONFIG")]
    config: Option<PathBuf>,

    /// Raw recordings root (`<root>/C01/C01-1/*.fif`)
    #[arg(long)]
    raw_root: Option<PathBuf>,

    /// BIDS output directory
    #[arg(long)]
    bids_root: Option<PathBuf>,

    /// Directory with Polhemus .pos files
    #[arg(long)]
    pos_root: Option<PathBuf>,

    /// Subject reference table (CSV or TSV)
    #[arg(long)]
    subject_table: Option<PathBuf>,

    /// Add Polhemus headshape files after conversion
    #[arg(long)]
    add_headshape: bool,

    /// Only add headshape files; skip MEG conversion
    #[arg(long)]
    only_headshape: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => ConversionConfig::load(path)?,
        None => ConversionConfig::default(),
    };
    if let Some(p) = args.raw_root { cfg.paths.raw_root = p; }
    if let Some(p) = args.bids_root { cfg.paths.bids_root = p; }
    if let Some(p) = args.pos_root { cfg.paths.pos_root = p; }
    if let Some(p) = args.subject_table { cfg.paths.subject_table = p; }
    cfg.validate()?;

    let table = ReferenceTable::load(&cfg.paths.subject_table, &cfg.id_columns)
        .with_context(|| format!("load subject table {}", cfg.paths.subject_table.display()))?;

    let subjects: Vec<String> = match args.subject {
        Some(s) => vec![s],
        None => table.subject_keys()?,
    };
    let tasks: Vec<String> = match args.task {
        Some(t) => vec![t],
        None => cfg.tasks.clone(),
    };

    let run_conversion = !args.only_headshape;
    let run_headshape = args.add_headshape || args.only_headshape;

    if run_conversion {
        println!("Subjects to convert: {}", subjects.len());
        println!("Tasks per subject: {}", tasks.len());
        println!("Total conversions: {}", subjects.len() * tasks.len());
    } else {
        println!("Skipping conversion; only adding headshape files.");
        println!("Subjects to update: {}", subjects.len());
    }
    println!("Output: {}", cfg.paths.bids_root.display());

    let backend = FifBackend::new(&cfg);

    if args.dry_run {
        if run_conversion {
            println!("\n[DRY RUN] Would convert:");
            let converter = Converter::new(&backend, &cfg, &table);
            for subj in &subjects {
                for task in &tasks {
                    let plan = SubjectId::parse(subj).and_then(|id| converter.plan(&id, task));
                    match plan {
                        Ok(p) => println!(
                            "  - {subj} / {task}: run {:02} {} → {}",
                            p.run,
                            p.source.display(),
                            p.destination.display()
                        ),
                        Err(e) => println!("  - {subj} / {task}: {e}"),
                    }
                }
            }
        }
        if run_headshape {
            println!("\n[DRY RUN] Would add headshape files:");
            let report = attach_headshapes(&subjects, &table, &cfg, FsEffects::new(true))?;
            for done in &report.success {
                println!("  - {}: {} ({})", done.subject, done.point_file, done.units);
            }
            for note in &report.failed {
                println!("  - {note} (would fail)");
            }
        }
        return Ok(());
    }

    if run_conversion {
        let results = convert_dataset(&backend, &cfg, &table, &subjects, &tasks)?;

        println!("\n{}", "=".repeat(50));
        println!("Completed: {}/{}", results.success.len(), subjects.len() * tasks.len());
        println!("Failed: {}", results.failed.len());

        if !results.failed.is_empty() {
            println!("\nFailed conversions:");
            for note in &results.failed {
                println!("  - {note}");
            }
        }
    }

    if run_headshape {
        let results = attach_headshapes(&subjects, &table, &cfg, FsEffects::new(false))?;

        println!("\n{}", "=".repeat(50));
        println!("Headshape updated: {}", results.success.len());
        println!("Headshape skipped: {}", results.skipped.len());
        println!("Headshape failed: {}", results.failed.len());

        if !results.failed.is_empty() {
            println!("\nFailed headshape updates:");
            for note in &results.failed {
                println!("  - {note}");
            }
        }
    }

    Ok(())
}
