use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hulud_scan::{
    checker::{load_rules, IndicatorEngine},
    config::Config,
    github::{format_reset, GitHubApi, RateLimitHandle, RateLimitedClient, WatchList},
    model::{ScanReport, TargetReport},
    output::{format_report_to_string, print_report, OutputFormat},
    scanner::{ProgressFn, ScanOptions, ScanOrchestrator, TargetSource},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const COMPROMISED: u8 = 2;
    pub const SCAN_ERRORS: u8 = 3;
}

#[derive(Parser)]
#[command(name = "hulud-scan")]
#[command(
    author,
    version,
    about = "Scan GitHub accounts for indicators of the Shai-Hulud npm worm"
)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the users listed in a file, one login per line
    ScanFile {
        /// File with one GitHub username per line
        path: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Scan every member of a GitHub organization
    ScanOrg {
        /// Organization login
        org: String,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// GitHub token
    #[arg(short, long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Number of concurrent workers
    #[arg(short, long, value_parser = parse_workers)]
    workers: Option<usize>,

    /// Output format (table, json)
    #[arg(short, long)]
    format: Option<String>,

    /// Write output to file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Indicator rule file (TOML or JSON) replacing the built-in rules
    #[arg(long)]
    rules: Option<PathBuf>,
}

fn parse_workers(value: &str) -> Result<usize, String> {
    let workers: usize = value
        .parse()
        .map_err(|_| format!("{value:?} is not a number"))?;
    if workers < 1 {
        return Err("must be at least 1".to_string());
    }
    Ok(workers)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            let error = format!("{e:#}");
            warn!(%error, "ignoring config file");
            Config::default()
        }
    };

    match cli.command {
        Commands::ScanFile { path, scan } => {
            let users = load_usernames(&path)?;
            run_scan(TargetSource::Users(users), scan, config).await
        }
        Commands::ScanOrg { org, scan } => {
            run_scan(TargetSource::Organization(org), scan, config).await
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "hulud_scan=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Reads one username per line, skipping blank lines.
fn load_usernames(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read username file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

async fn run_scan(source: TargetSource, args: ScanArgs, config: Config) -> Result<u8> {
    let format_str = args.format.unwrap_or_else(|| config.default_format.clone());
    let format = OutputFormat::from_str(&format_str).map_err(anyhow::Error::msg)?;
    let is_interactive = format == OutputFormat::Table;

    let rules_path = args.rules.or_else(|| config.rules_path.clone());
    let rules = load_rules(rules_path.as_deref()).context("failed to load indicator rules")?;

    let token = args.token.filter(|t| !t.trim().is_empty());
    if token.is_none() {
        warn!("no GitHub token given, unauthenticated requests are limited to 60 per hour");
    }
    let rate_limit = RateLimitHandle::new();
    let client = RateLimitedClient::new(config.client_options(token), rate_limit.clone())?;
    let gateway = Arc::new(GitHubApi::new(client, WatchList::from_rules(&rules)));
    let engine = Arc::new(IndicatorEngine::new(&rules));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping after in-flight requests");
                cancel.cancel();
            }
        }
    });

    let progress_bar = if is_interactive {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Resolving targets...");
        Some(pb)
    } else {
        None
    };

    let progress: Option<ProgressFn> = progress_bar.clone().map(|pb| {
        let callback: ProgressFn = Arc::new(move |report: &TargetReport| {
            pb.set_message(format!("{} ({})", report.target, report.status));
            pb.inc(1);
        });
        callback
    });

    let options = ScanOptions {
        workers: args.workers.unwrap_or(config.workers),
        ignore: config.ignore.clone(),
        cancel,
        progress,
    };
    let orchestrator = ScanOrchestrator::new(gateway, engine, options)?;

    let scanned = async {
        let resolved = orchestrator.resolve(&source).await?;
        if let Some(pb) = &progress_bar {
            pb.set_length(resolved.targets.len() as u64);
            pb.set_message("Scanning...");
        }
        orchestrator.scan(resolved).await
    }
    .await;

    if let Some(pb) = &progress_bar {
        pb.finish_and_clear();
    }
    let report = scanned?;

    let quota = rate_limit.snapshot();
    if let Some(remaining) = quota.remaining {
        info!(remaining, resets = %format_reset(quota.reset_at), "GitHub API quota");
    }

    if let Some(path) = args.output {
        let content = format_report_to_string(&report, format)?;
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        if is_interactive {
            println!("Results written to: {}", path.display());
        }
    } else {
        print_report(&report, format)?;
    }

    Ok(determine_exit_code(&report))
}

/// Compromise wins over everything; an interrupted scan is incomplete and
/// therefore an error.
fn determine_exit_code(report: &ScanReport) -> u8 {
    if report.is_compromised() {
        exit_codes::COMPROMISED
    } else if report.cancelled {
        exit_codes::ERROR
    } else if report.summary.errored > 0 {
        exit_codes::SCAN_ERRORS
    } else {
        exit_codes::SUCCESS
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        Config::default().save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'hulud-scan config --init' to create one.");
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hulud_scan::error::ScanError;
    use hulud_scan::model::{Finding, Indicator, IndicatorKind, RepositoryRef, ScanTarget};
    use std::collections::BTreeSet;

    fn target(login: &str) -> ScanTarget {
        ScanTarget::parse(login).unwrap()
    }

    fn compromised(login: &str) -> TargetReport {
        let indicator = Indicator::new(
            IndicatorKind::RepositoryMarker,
            "marker",
            None,
            "Sha1-Hulud: The Second Coming.",
        );
        TargetReport::clean(
            target(login),
            vec![Finding::evaluated(
                RepositoryRef::new(login, "x", "main"),
                BTreeSet::from([indicator]),
            )],
        )
    }

    fn failed(login: &str) -> TargetReport {
        TargetReport::failed(
            target(login),
            Vec::new(),
            &ScanError::UserNotFound(login.to_string()),
        )
    }

    #[test]
    fn test_exit_codes() {
        let clean = ScanReport::new(vec![TargetReport::clean(target("a"), Vec::new())]);
        assert_eq!(determine_exit_code(&clean), exit_codes::SUCCESS);

        let errored = ScanReport::new(vec![failed("a")]);
        assert_eq!(determine_exit_code(&errored), exit_codes::SCAN_ERRORS);

        let hit = ScanReport::new(vec![failed("a"), compromised("b")]);
        assert_eq!(determine_exit_code(&hit), exit_codes::COMPROMISED);

        let mut interrupted = ScanReport::new(Vec::new());
        interrupted.cancelled = true;
        assert_eq!(determine_exit_code(&interrupted), exit_codes::ERROR);
    }

    #[test]
    fn test_load_usernames_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.txt");
        std::fs::write(&path, "alice\n\n  bob  \n\t\ncarol").unwrap();

        assert_eq!(load_usernames(&path).unwrap(), vec!["alice", "bob", "carol"]);
        assert!(load_usernames(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_parse_workers() {
        assert_eq!(parse_workers("8"), Ok(8));
        assert!(parse_workers("0").is_err());
        assert!(parse_workers("many").is_err());
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from(["hulud-scan", "scan-org", "acme", "-w", "3", "-f", "json"])
            .unwrap();
        match cli.command {
            Commands::ScanOrg { org, scan } => {
                assert_eq!(org, "acme");
                assert_eq!(scan.workers, Some(3));
                assert_eq!(scan.format.as_deref(), Some("json"));
            }
            _ => panic!("expected scan-org"),
        }
        assert!(Cli::try_parse_from(["hulud-scan", "scan-org", "acme", "-w", "0"]).is_err());
    }
}
