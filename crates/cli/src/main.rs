//! Patient record linkage CLI.
//!
//! Usage:
//!     patientlink match --format json
//!     patientlink accept ext-3 int-17
//!     patientlink check-config --config config.json

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::AppConfig;
use patientlink_explain::{explain_breakdown, explain_match, summarize_match, Explanation};
use patientlink_io::{
    append_accepted, ensure_accepted_file, load_roster, read_outputs, write_matches, RosterSide,
};
use patientlink_linkage::select_matches;
use patientlink_model::{MatchOutput, MatchResult, MatchScore};
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patientlink")]
#[command(about = "Link patient records across an internal and an external roster")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Override the configured data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Link external patients to the internal roster and write matches.csv
    Match {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Override the configured match threshold
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Print the per-field score breakdown in text output
        #[arg(short, long)]
        breakdown: bool,
    },

    /// Record a reviewer-accepted pair in accepted.csv
    Accept {
        external_id: String,
        internal_id: String,
    },

    /// Validate the configuration and print the effective settings
    CheckConfig,
}

/// One linked pair as printed in JSON output.
#[derive(Serialize)]
struct MatchReport<'a> {
    external_id: &'a str,
    internal_id: &'a str,
    summary: String,
    score: &'a MatchScore,
    explanations: Vec<Explanation>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut app = AppConfig::load(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        app.data_dir = data_dir;
    }

    match cli.command {
        Commands::Match {
            format,
            threshold,
            breakdown,
        } => run_match(&app, &format, threshold, breakdown)?,
        Commands::Accept {
            external_id,
            internal_id,
        } => run_accept(&app, MatchOutput::new(external_id, internal_id))?,
        Commands::CheckConfig => run_check_config(&app)?,
    }

    Ok(())
}

fn run_match(
    app: &AppConfig,
    format: &str,
    threshold: Option<f64>,
    breakdown: bool,
) -> Result<()> {
    let mut match_config = app.match_config()?;
    if let Some(threshold) = threshold {
        match_config = match_config
            .with_threshold(threshold)
            .context("Invalid --threshold")?;
    }

    let internal = load_roster(app.internal_path(), RosterSide::Internal)
        .context("Failed to load internal roster")?;
    let external = load_roster(app.external_path(), RosterSide::External)
        .context("Failed to load external roster")?;

    let results = select_matches(&external, &internal, &match_config);

    let outputs: Vec<MatchOutput> = results.iter().map(MatchOutput::from).collect();
    write_matches(&app.matches_path(), &outputs)?;
    ensure_accepted_file(&app.accepted_path())?;

    if format == "json" {
        let reports: Vec<MatchReport> = results.iter().map(report).collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "\n{}. {} -> {}",
            i + 1,
            result.external.patient_id,
            result.internal.patient_id
        );
        println!(
            "   {} {} ({}) | {} {} ({})",
            result.external.first_name,
            result.external.last_name,
            result.external.dob,
            result.internal.first_name,
            result.internal.last_name,
            result.internal.dob
        );
        println!("   {}", summarize_match(&result.score));

        if breakdown {
            for item in explain_breakdown(&result.score) {
                let context = item.context.unwrap_or_default();
                println!("   {:<14} {}  {}", item.kind, item.value, context);
            }
        }

        for explanation in explain_match(result) {
            println!("   - {}: {}", explanation.summary, explanation.detail);
        }
    }

    println!("\n---");
    println!(
        "Matched {} of {} external patients (threshold {:.2})",
        results.len(),
        external.len(),
        match_config.threshold()
    );
    println!("Wrote {}", app.matches_path().display());

    Ok(())
}

fn report(result: &MatchResult) -> MatchReport<'_> {
    MatchReport {
        external_id: &result.external.patient_id,
        internal_id: &result.internal.patient_id,
        summary: summarize_match(&result.score),
        score: &result.score,
        explanations: explain_match(result),
    }
}

fn run_accept(app: &AppConfig, output: MatchOutput) -> Result<()> {
    let path = app.accepted_path();
    let accepted = read_outputs(&path)?;
    if accepted.contains(&output) {
        warn!(
            external_id = %output.external_id,
            internal_id = %output.internal_id,
            "Pair already accepted"
        );
        println!(
            "Already accepted: {} -> {}",
            output.external_id, output.internal_id
        );
        return Ok(());
    }

    append_accepted(&path, &output)?;
    println!(
        "Accepted: {} -> {} ({})",
        output.external_id,
        output.internal_id,
        path.display()
    );
    Ok(())
}

fn run_check_config(app: &AppConfig) -> Result<()> {
    let match_config = app.match_config()?;

    println!("Data directory: {}", app.data_dir.display());
    println!("  internal: {}", app.internal_path().display());
    println!("  external: {}", app.external_path().display());
    println!("  matches:  {}", app.matches_path().display());
    println!("  accepted: {}", app.accepted_path().display());

    println!("\nThreshold: {:.2}", match_config.threshold());
    println!("Fields:");
    for rule in match_config.rules() {
        println!(
            "  {:<14} {:<8} {:.2}",
            rule.field.as_str(),
            rule.field_type.as_str(),
            rule.weight
        );
    }

    println!("Calibration:");
    for (name, value) in match_config.calibration().entries() {
        println!("  {name:<24} {value:.2}");
    }

    println!("\nConfiguration OK");
    Ok(())
}
