//! dirpilot CLI
//!
//! Thin command surface over the submission engine: pick targets, run the
//! batch, and render the evidence summary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use dirpilot::defense::{ChallengeSolver, DefenseDetector, ManualSolver, RemoteSolver};
use dirpilot::driver::sim::{ScriptedSite, SimulatedDriver};
use dirpilot::driver::BrowserDriver;
use dirpilot::evidence::EvidenceLog;
use dirpilot::model::{BusinessRecord, DirectoryTarget, TargetCatalog};
use dirpilot::orchestrator::SubmissionOrchestrator;
use dirpilot::rate::DomainRateLimiter;
use dirpilot::{init_logging, EngineConfig};

#[derive(Parser)]
#[command(name = "dirpilot")]
#[command(about = "Adaptive directory submission engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit the business record to directory targets
    Submit {
        /// Target id from the catalog
        target: Option<String>,

        /// Submit to every automatable target
        #[arg(long, conflicts_with = "target")]
        all: bool,

        /// Submit only to easy targets without verification steps
        #[arg(long, conflicts_with_all = ["target", "all"])]
        safe_only: bool,

        /// Run the full pipeline against the simulated driver (no network)
        #[arg(long)]
        dry_run: bool,

        /// Leave browser sessions open after each attempt
        #[arg(long)]
        keep_open: bool,

        /// Target catalog path (overrides config)
        #[arg(long)]
        targets: Option<PathBuf>,

        /// Business record path (overrides config)
        #[arg(long)]
        record: Option<PathBuf>,

        /// Evidence base directory (overrides config)
        #[arg(long)]
        evidence_dir: Option<PathBuf>,
    },

    /// List the configured directory targets
    Targets {
        /// Target catalog path (overrides config)
        #[arg(long)]
        targets: Option<PathBuf>,
    },

    /// Re-render the outcome summary of a past run directory
    Summary {
        /// Evidence directory of the run
        run_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logging();
    let cli = Cli::parse();
    let config = EngineConfig::load();

    match cli.command {
        Commands::Submit {
            target,
            all,
            safe_only,
            dry_run,
            keep_open,
            targets,
            record,
            evidence_dir,
        } => {
            run_submit(
                config,
                SubmitArgs {
                    target,
                    all,
                    safe_only,
                    dry_run,
                    keep_open,
                    targets,
                    record,
                    evidence_dir,
                },
            )
            .await
        }
        Commands::Targets { targets } => {
            let path = targets.unwrap_or_else(|| PathBuf::from(&config.targets_path));
            let catalog = TargetCatalog::load(&path).map_err(anyhow::Error::msg)?;
            for target in &catalog.targets {
                println!(
                    "{:<20} {:<10} automatable={:<5} verification={:<5} {}",
                    target.id,
                    format!("{:?}", target.difficulty).to_lowercase(),
                    target.automatable,
                    target.requires_verification,
                    target.url
                );
            }
            Ok(())
        }
        Commands::Summary { run_dir } => {
            let log = EvidenceLog::open(&run_dir)
                .with_context(|| format!("cannot open evidence at {}", run_dir.display()))?;
            println!("{}", log.summary()?);
            Ok(())
        }
    }
}

struct SubmitArgs {
    target: Option<String>,
    all: bool,
    safe_only: bool,
    dry_run: bool,
    keep_open: bool,
    targets: Option<PathBuf>,
    record: Option<PathBuf>,
    evidence_dir: Option<PathBuf>,
}

async fn run_submit(config: EngineConfig, args: SubmitArgs) -> Result<()> {
    let targets_path = args
        .targets
        .unwrap_or_else(|| PathBuf::from(&config.targets_path));
    let record_path = args
        .record
        .unwrap_or_else(|| PathBuf::from(&config.record_path));

    let catalog = TargetCatalog::load(&targets_path).map_err(anyhow::Error::msg)?;
    let record = BusinessRecord::load(&record_path).map_err(anyhow::Error::msg)?;

    let selected: Vec<DirectoryTarget> = if let Some(ref id) = args.target {
        let target = catalog
            .find(id)
            .with_context(|| format!("target {:?} not found in {}", id, targets_path.display()))?;
        vec![target.clone()]
    } else if args.safe_only {
        catalog.safe_only().into_iter().cloned().collect()
    } else if args.all {
        catalog.automatable().into_iter().cloned().collect()
    } else {
        bail!("specify a target id, --all, or --safe-only");
    };

    if selected.is_empty() {
        bail!("no targets selected");
    }

    let skipped: Vec<&DirectoryTarget> = selected.iter().filter(|t| !t.automatable).collect();
    for target in &skipped {
        warn!("Target {} is not automatable; skipping", target.id);
    }
    let selected: Vec<DirectoryTarget> =
        selected.iter().filter(|t| t.automatable).cloned().collect();
    if selected.is_empty() {
        bail!("no automatable targets selected");
    }

    let base_dir = args
        .evidence_dir
        .unwrap_or_else(|| PathBuf::from(&config.evidence_dir));
    let run_dir = base_dir.join(format!(
        "run-{}-{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S"),
        &uuid::Uuid::new_v4().to_string()[..8]
    ));
    let evidence = Arc::new(EvidenceLog::open(&run_dir)?);
    info!("Evidence directory: {}", run_dir.display());

    let driver = build_driver(&config, args.dry_run, &selected)?;

    let solver: Arc<dyn ChallengeSolver> = if config.solver_api_key.is_empty() {
        Arc::new(ManualSolver)
    } else {
        Arc::new(RemoteSolver::new(&config.solver_api_key)?)
    };

    let mut orchestrator_config = config.orchestrator.clone();
    orchestrator_config.keep_session_open = args.keep_open;

    let orchestrator = SubmissionOrchestrator::new(driver, evidence.clone(), orchestrator_config)
        .with_detector(DefenseDetector::new(config.detector.clone()))
        .with_limiter(Arc::new(DomainRateLimiter::new(config.rate.clone())))
        .with_solver(solver);

    // Honor Ctrl-C between state transitions; in-flight browser operations
    // finish first so forms are never abandoned mid-keystroke.
    let cancel = orchestrator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested - finishing current operation");
            cancel.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    let summary = orchestrator.run_batch(&selected, &record).await;

    println!("{}", summary);
    println!("Evidence: {}", run_dir.display());

    if summary.errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Pick the browser driver: simulated pages for dry runs, Chromium otherwise.
fn build_driver(
    config: &EngineConfig,
    dry_run: bool,
    targets: &[DirectoryTarget],
) -> Result<Arc<dyn BrowserDriver>> {
    if dry_run {
        info!("Dry run: using the simulated driver, no network traffic");
        let driver = SimulatedDriver::new();
        for target in targets {
            driver.insert(&target.host(), ScriptedSite::generic_listing_form());
        }
        return Ok(Arc::new(driver));
    }

    chrome_driver(config)
}

#[cfg(feature = "chrome")]
fn chrome_driver(config: &EngineConfig) -> Result<Arc<dyn BrowserDriver>> {
    use dirpilot::driver::chrome::{ChromeDriver, ChromeDriverConfig};

    Ok(Arc::new(ChromeDriver::new(ChromeDriverConfig {
        chrome_path: config.chrome_path.clone(),
        headless: config.headless,
        nav_settle_timeout_secs: config.orchestrator.nav_timeout_secs,
    })))
}

#[cfg(not(feature = "chrome"))]
fn chrome_driver(_config: &EngineConfig) -> Result<Arc<dyn BrowserDriver>> {
    bail!("built without the `chrome` feature; use --dry-run or rebuild with --features chrome")
}
