//! Maintenance CLI for the inventory database.
//!
//! Thin wrappers over the bulk jobs in [`crate::engine::bulk`]; everything
//! interesting happens there. Reports go to stdout, logs to stderr.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{ArgAction, Parser, Subcommand};

use crate::engine::bulk;
use crate::{BulkReport, Config, Result, Store};

#[derive(Parser, Debug)]
#[command(
    name = "botgard",
    version,
    about = "Botanic garden inventory maintenance",
    infer_subcommands = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// SQLite database file.
    #[arg(long, global = true, value_name = "PATH", default_value = "botgard.db")]
    pub db: PathBuf,

    /// Configuration file (defaults are used when missing).
    #[arg(long, global = true, value_name = "PATH", default_value = "botgard.toml")]
    pub config: PathBuf,

    /// Machine-readable JSON report.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild every derived field from scratch, in dependency order.
    #[command(alias = "data-all")]
    RecalcAll,

    /// Trim whitespace and tabs out of hand-entered text columns.
    StripWhitespace,

    /// Link legacy "territory-code" departments to their territory.
    AssignTerritory,

    /// Recompute the aggregate counters of territories and departments.
    #[command(alias = "calc-outplantings")]
    RecalcOutplantings,

    /// Recompute identity strings and placement caches of individuals.
    RecalcIndividuals,

    /// Recompute only the placement caches of individuals.
    RecalcIndividualsOutplantings,
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

/// Run the CLI (used by bin).
pub fn run(cli: Cli, config: &Config) -> Result<()> {
    let started = Instant::now();
    let store = Store::open(&cli.db)?;
    let report = match cli.command {
        Commands::RecalcAll => bulk::recalc_all(&store, config)?,
        Commands::StripWhitespace => bulk::strip_whitespace(&store, config)?,
        Commands::AssignTerritory => bulk::assign_territory(&store, config)?,
        Commands::RecalcOutplantings => bulk::recalc_outplantings(&store)?,
        Commands::RecalcIndividuals => bulk::recalc_individuals(&store)?,
        Commands::RecalcIndividualsOutplantings => {
            bulk::recalc_individuals_outplantings(&store)?
        }
    };
    render_report(&report, cli.json, started.elapsed());
    Ok(())
}

fn render_report(report: &BulkReport, json: bool, elapsed: Duration) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(out) => println!("{out}"),
            Err(err) => eprintln!("report serialization failed: {err}"),
        }
        return;
    }
    for failure in &report.failures {
        println!("failed: {} {}: {}", failure.entity, failure.id, failure.error);
    }
    println!(
        "{} rows processed, {} failed in {:.2}s",
        report.processed,
        report.failed,
        elapsed.as_secs_f64()
    );
}
