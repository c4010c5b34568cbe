use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use sme_credibility::{
    load_snapshot, telemetry, validate_records, AppConfig, CredibilityEngine, CredibilityScore,
    ScoringPolicy, VERSION,
};

#[derive(Parser)]
#[command(name = "credibility", version = VERSION, about = "SME credibility scoring from extracted financial records")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score a record snapshot (.json records or .csv transactions)
    Score {
        file: PathBuf,
        /// Scoring policy JSON (overrides CREDIBILITY_POLICY)
        #[arg(long)]
        policy: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Check a snapshot for structural problems without scoring it
    Validate { file: PathBuf },
    /// Print the default scoring policy as JSON
    Policy,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match cli.command {
        Command::Score {
            file,
            policy,
            format,
        } => {
            let policy = match policy {
                Some(path) => ScoringPolicy::from_file(path)?,
                None => config.scoring_policy()?,
            };
            run_score(&file, policy, format)
        }
        Command::Validate { file } => run_validate(&file),
        Command::Policy => {
            println!("{}", serde_json::to_string_pretty(&ScoringPolicy::default())?);
            Ok(())
        }
    }
}

fn run_score(file: &Path, policy: ScoringPolicy, format: OutputFormat) -> Result<()> {
    let records = load_snapshot(file)?;
    validate_records(&records)?;

    let score = CredibilityEngine::new(policy).score(&records);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&score)?),
        OutputFormat::Text => print_report(&score),
    }

    Ok(())
}

fn run_validate(file: &Path) -> Result<()> {
    let records = load_snapshot(file)?;
    if let Err(e) = validate_records(&records) {
        bail!("❌ {:?}: {}", file, e);
    }
    println!("✓ {} record(s) in {:?} are valid", records.len(), file);
    Ok(())
}

fn print_report(score: &CredibilityScore) {
    println!("🏦 SME Credibility Score");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Total score:   {}/100", score.total_score);
    println!("Confidence:    {}", score.confidence_level);
    println!("Trust tier:    {}", score.trust_tier.tier);
    println!("Data points:   {}", score.data_points);

    println!("\n📊 Layers");
    println!("  Evidence quality:      {}", score.evidence_quality.score);
    println!("  Stability & growth:    {}", score.stability_growth.score);
    println!(
        "  Compliance readiness:  {} ({} risk)",
        score.compliance_readiness.score(),
        score.compliance_readiness.risk_level
    );

    println!("\n⚖️  Reconciliation: {}", score.cross_source_reconciliation.summary());
    for mismatch in &score.cross_source_reconciliation.mismatches {
        println!("  - {}", mismatch);
    }
    for note in &score.cross_source_reconciliation.notes {
        println!("  i {}", note);
    }

    if !score.anomalies.is_empty() {
        println!("\n🚨 Anomalies");
        for finding in &score.anomalies {
            println!(
                "  [{:?}] -{} {}",
                finding.severity, finding.confidence_reduction, finding.description
            );
        }
    }

    if let Some(next) = &score.trust_tier.next_tier_requirements {
        println!("\n🏅 Next tier requires");
        for requirement in next {
            println!("  - {}", requirement);
        }
    }

    if !score.improvement_actions.is_empty() {
        println!("\n✅ Improvement actions");
        for (i, action) in score.improvement_actions.iter().enumerate() {
            println!(
                "  {}. {} (+{}, {:?}, {:?} effort)",
                i + 1,
                action.title,
                action.potential_gain,
                action.priority,
                action.effort
            );
            println!("     {}", action.description);
        }
    }

    println!("\nSnapshot: {}", score.snapshot_digest);
}
