use ccusage_agent::config::{CliOverrides, Config};
use ccusage_agent::logging::init_logging;
use ccusage_agent::reporter::ReportOutcome;
use ccusage_agent::scheduler::{CycleReport, Scheduler};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ccusage-agent")]
#[command(about = "Report Claude Code token usage to a CCUsage collector server")]
#[command(version)]
struct Cli {
    /// Collector server URL
    #[arg(long)]
    server: Option<String>,
    /// API key sent as a bearer token
    #[arg(long)]
    api_key: Option<String>,
    /// Minutes between reports (1-1440)
    #[arg(long, allow_negative_numbers = true)]
    interval: Option<i64>,
    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,
    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,
    /// State file path
    #[arg(long)]
    state_file: Option<PathBuf>,
    /// Claude projects directory to scan
    #[arg(long)]
    projects_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = init_logging(&config.logging);
    config.log_warnings();

    config.apply_cli_overrides(CliOverrides {
        server: cli.server,
        api_key: cli.api_key,
        interval: cli.interval,
        insecure: cli.insecure,
        projects_dir: cli.projects_dir,
        state_file: cli.state_file,
    });

    if let Err(e) = config.validate() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        return ExitCode::FAILURE;
    }

    let mut scheduler = match Scheduler::new(&config) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(listen_for_shutdown(shutdown.clone()));

    if cli.once {
        return match scheduler.run_once(&shutdown).await {
            Some(report) => {
                print_cycle(&report);
                if report.is_success() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            }
            None => ExitCode::FAILURE,
        };
    }

    print_banner(&config);
    scheduler.run_forever(&shutdown, print_cycle).await;
    ExitCode::SUCCESS
}

fn print_banner(config: &Config) {
    println!("{}", "CCUsage Agent".bold().cyan());
    println!("  Server:       {}", config.server);
    println!("  Projects dir: {}", config.projects_dir.display());
    println!("  Interval:     {} min", config.report_interval.minutes());
    if config.config_file.exists() {
        println!("  Config file:  {}", config.config_file.display());
    }
    println!();
}

fn print_cycle(report: &CycleReport) {
    let time = chrono::Local::now().format("%H:%M:%S");
    match &report.outcome {
        ReportOutcome::Success(summary) if summary.records_sent == 0 => {
            println!("{} [{}] No new records", "✓".green(), time);
        }
        ReportOutcome::Success(summary) => {
            println!(
                "{} [{}] Reported {} records ({} inserted, {} skipped)",
                "✓".green(),
                time,
                summary.records_sent,
                summary.inserted,
                summary.skipped
            );
        }
        ReportOutcome::PartialFailure {
            summary,
            pending,
            error,
        } => {
            println!(
                "{} [{}] Reported {} records, {} pending: {}",
                "✗".red(),
                time,
                summary.records_sent,
                pending,
                error.to_string().red()
            );
        }
    }
}

async fn listen_for_shutdown(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received interrupt"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Cannot listen for interrupt");
                    return;
                }
                info!("Received interrupt");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for interrupt");
            return;
        }
        info!("Received interrupt");
    }

    shutdown.cancel();
}
