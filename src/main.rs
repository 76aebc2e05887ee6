//! evalwatch - peer evaluation anomaly detector for the 42 intranet
//!
//! Fetches the evaluations a list of logins gave, counts validations per
//! evaluated peer and reports pairs that look like grade collusion. Can also
//! score the evaluations a single login received, and build the login list
//! from a campus.
//!
//! Exit codes:
//!   0 - Success (no alerts, or no --fail-on-alerts set)
//!   1 - Runtime error (credentials, config, unreadable input, etc.)
//!   2 - Alerts raised and --fail-on-alerts set

mod analysis;
mod cli;
mod config;
mod intra;
mod models;
mod pipeline;
mod report;
mod source;

use anyhow::{Context, Result};
use chrono::{NaiveTime, TimeZone, Utc};
use cli::Args;
use config::{Config, CONFIG_FILE};
use intra::{ClientConfig, Credentials, IntraClient, IntraLevels, IntraRecords, IntraResult};
use models::{AlertReport, ReportMetadata};
use pipeline::{RunOptions, RunOutcome};
use source::{CsvRecords, RecordSource};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

use analysis::{
    Detector, LevelResolver, ReceivedDetector, RecordFilter, ScoringPolicy, StaticLevels,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    init_logging(&args, &config);

    info!("evalwatch v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_detection(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Detection failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .evalwatch.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to change the pass mark, flag rule, excluded projects and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// What a run scores.
enum Target {
    /// Evaluations given by each login of the list.
    Given(Vec<String>),
    /// Evaluations received by one login.
    Received(String),
}

impl Target {
    fn new(args: &Args, logins: impl FnOnce() -> Result<Vec<String>>) -> Result<Self> {
        match args.received {
            Some(ref login) => Ok(Target::Received(login.trim().to_string())),
            None => Ok(Target::Given(logins()?)),
        }
    }
}

/// Run the complete detection workflow. Returns exit code (0 or 2).
async fn run_detection(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    if let Some(campus_id) = args.fetch_campus {
        return handle_fetch_campus(&args, &config, campus_id).await;
    }

    let policy = ScoringPolicy::from(&config.policy);
    let filter = RecordFilter::from(&config.policy);
    let options = RunOptions {
        keep_records: args.export_records.is_some(),
        show_progress: !args.quiet,
    };

    info!("Policy: {}", policy);
    debug!("Excluded keywords: {:?}", filter.excluded_keywords());

    let (outcome, source_name, target) = if args.is_offline() {
        let records_path = args.records.as_deref().context("--records is required offline")?;
        let levels_path = args.levels.as_deref().context("--levels is required offline")?;

        println!("📂 Reading records from {}", records_path.display());
        let records = CsvRecords::load(records_path)?;
        let levels: StaticLevels = source::read_levels(levels_path)?.into_iter().collect();
        info!(
            "Loaded {} records and {} levels",
            records.len(),
            levels.len()
        );

        let target = Target::new(&args, || match args.users {
            Some(ref users) => source::read_logins(users),
            None => Ok(records.evaluators()),
        })?;

        if args.dry_run {
            return Ok(handle_dry_run(&target));
        }

        let source_name = records.describe();
        let (outcome, target) = detect(target, records, levels, policy, filter, options).await?;
        (outcome, source_name, target)
    } else {
        let target = Target::new(&args, || source::read_logins(&config.general.users))?;

        if args.dry_run {
            return Ok(handle_dry_run(&target));
        }

        let client = Arc::new(connect(&args, &config).await?);
        let handle = Handle::current();

        let records = IntraRecords::new(Arc::clone(&client), handle.clone());
        let levels = IntraLevels::new(client, handle);

        let source_name = records.describe();
        if let Target::Given(ref logins) = target {
            println!("🔬 Processing {} logins...", logins.len());
        }
        let (outcome, target) = detect(target, records, levels, policy, filter, options).await?;
        (outcome, source_name, target)
    };

    if let Some(ref path) = args.export_records {
        source::write_records(path, &outcome.records)?;
        println!(
            "💾 Exported {} records to {}",
            outcome.records.len(),
            path.display()
        );
    }

    let duration = start_time.elapsed().as_secs_f64();
    let stats = &outcome.stats;

    println!("\n📊 Detection Summary:");
    println!("   Logins processed: {}", outcome.logins_processed);
    println!(
        "   Records: {} seen | {} counted | {} skipped",
        stats.seen,
        stats.counted,
        stats.skipped()
    );
    println!("   Duration: {:.1}s", duration);

    if outcome.alerts.is_empty() {
        match target {
            Target::Given(_) => println!(
                "\n✅ No alerts. No one in the group showed suspicious evaluation patterns."
            ),
            Target::Received(ref login) => {
                println!("\n✅ No alerts. No suspicious evaluation patterns for {}.", login)
            }
        }
        return Ok(0);
    }

    let policy_label = match target {
        Target::Given(_) => policy.to_string(),
        Target::Received(ref login) => format!("{}, evaluations received by {}", policy, login),
    };

    let alert_count = outcome.alerts.len();
    let report = AlertReport {
        metadata: ReportMetadata {
            generated_at: Utc::now(),
            source: source_name,
            logins_processed: outcome.logins_processed,
            policy: policy_label,
            duration_seconds: duration,
        },
        stats: outcome.stats,
        alerts: outcome.alerts,
    };

    let output_path = config.output_path();
    report::write_report(&report, config.general.format, &output_path)?;

    println!(
        "\n🚨 {} alerts registered in {}",
        alert_count,
        output_path.display()
    );

    if args.fail_on_alerts {
        eprintln!("\n⛔ Alerts raised. Failing (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

/// Run the matching detector on a blocking thread.
async fn detect<S, R>(
    target: Target,
    mut source: S,
    resolver: R,
    policy: ScoringPolicy,
    filter: RecordFilter,
    options: RunOptions,
) -> Result<(RunOutcome, Target)>
where
    S: RecordSource + Send + 'static,
    R: LevelResolver + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let outcome = match target {
            Target::Given(ref logins) => {
                let mut detector = Detector::new(policy, filter, resolver);
                pipeline::run(logins, &mut source, &mut detector, &options)
            }
            Target::Received(ref login) => {
                let mut detector = ReceivedDetector::new(login.as_str(), policy, filter, resolver);
                pipeline::run_received(&mut source, &mut detector, &options)
            }
        };
        (outcome, target)
    })
    .await
    .context("Detection task failed")
}

/// Acquire an API token with the configured credentials.
async fn connect(args: &Args, config: &Config) -> Result<IntraClient> {
    let credentials = credentials(args)?;
    let client_config = ClientConfig::from(&config.api);

    println!("🔑 Connecting to {}", client_config.api_url);
    IntraClient::connect(client_config, &credentials)
        .await
        .context("Failed to obtain an API access token")
}

/// Handle --fetch-campus: write the campus login list, exit.
async fn handle_fetch_campus(args: &Args, config: &Config, campus_id: u64) -> Result<i32> {
    let path = &config.general.users;

    if args.dry_run {
        println!(
            "\n🔍 Dry run: would write the active users of campus {} to {}",
            campus_id,
            path.display()
        );
        return Ok(0);
    }

    let client = connect(args, config).await?;
    let created_after = Utc.from_utc_datetime(&args.created_after.and_time(NaiveTime::MIN));

    println!(
        "🏫 Listing active users of campus {} created after {}",
        campus_id, args.created_after
    );
    let logins = client
        .campus_logins(campus_id, created_after)
        .await
        .with_context(|| format!("Failed to list the users of campus {}", campus_id))?;

    source::write_logins(path, &logins)?;
    println!("\n✅ Saved {} logins to {}", logins.len(), path.display());
    Ok(0)
}

/// Credentials from --uid/--secret, falling back to the environment.
fn credentials(args: &Args) -> IntraResult<Credentials> {
    match (&args.uid, &args.secret) {
        (Some(uid), Some(secret)) => Ok(Credentials::new(uid.as_str(), secret.as_str())),
        _ => Credentials::from_env(),
    }
}

/// Handle --dry-run: print what would be processed, exit.
fn handle_dry_run(target: &Target) -> i32 {
    println!("\n🔍 Dry run: no requests will be made.\n");

    match target {
        Target::Received(login) => {
            println!("   Would score the evaluations received by 👤 {}", login);
        }
        Target::Given(logins) if logins.is_empty() => println!("   No logins to process."),
        Target::Given(logins) => {
            println!("   {} logins would be processed:\n", logins.len());
            for login in logins {
                println!("     👤 {}", login);
            }
        }
    }

    println!("\n✅ Dry run complete.");
    0
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Ignoring {}: {:#}", CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}
