//! linkgauge main entry point
//!
//! This is the command-line interface for the linkgauge link checker.

use anyhow::{Context, Result};
use clap::Parser;
use linkgauge::config::{load_config_with_hash, validate, Config, ConsoleFormat, FileOutput};
use linkgauge::crawler::{prepare, Consumer};
use linkgauge::output::print_statistics;
use linkgauge::url::seed_url;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;
use url::Url;

/// linkgauge: a concurrent link checker
///
/// linkgauge checks the seed URLs, recurses into the pages of the same
/// site and reports broken links, warnings and statistics.
#[derive(Parser, Debug)]
#[command(name = "linkgauge")]
#[command(version)]
#[command(about = "A concurrent link checker", long_about = None)]
struct Cli {
    /// URLs or local paths to check
    #[arg(value_name = "URL", required = true)]
    urls: Vec<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of worker threads (0 checks synchronously)
    #[arg(short, long, value_name = "N")]
    threads: Option<usize>,

    /// Maximum recursion depth (negative for unlimited)
    #[arg(short, long, value_name = "N", allow_negative_numbers = true)]
    recursion_level: Option<i32>,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Console output format: text, csv or none
    #[arg(short, long, value_name = "FORMAT")]
    output: Option<ConsoleFormat>,

    /// Additional result file as TYPE:PATH (repeatable)
    #[arg(short = 'F', long = "file-output", value_name = "TYPE:PATH")]
    file_output: Vec<FileOutput>,

    /// Log valid URLs as well as invalid ones
    #[arg(long)]
    verbose_results: bool,

    /// Do not log URLs only because they carry warnings
    #[arg(long)]
    no_warnings: bool,

    /// Log a progress line periodically
    #[arg(long)]
    status: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error log output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate the configuration and show what would be checked
    #[arg(long)]
    dry_run: bool,

    /// Print the statistics table after the run
    #[arg(long)]
    summary: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load configuration {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };
    apply_overrides(&mut config, &cli);
    validate(&config).context("invalid configuration")?;

    let seeds = cli
        .urls
        .iter()
        .map(|arg| seed_url(arg).with_context(|| format!("invalid seed '{}'", arg)))
        .collect::<Result<Vec<Url>>>()?;

    if cli.dry_run {
        handle_dry_run(&config, &seeds);
        return Ok(ExitCode::SUCCESS);
    }

    let consumer = prepare(Arc::new(config), &seeds).context("failed to start checking")?;
    spawn_interrupt_handler(consumer.clone());

    tracing::info!("Checking {} seed URLs", seeds.len());
    let stats = consumer.run();
    if cli.summary {
        print_statistics(&stats);
    }

    Ok(ExitCode::from(u8::try_from(stats.exit_code()).unwrap_or(2)))
}

/// Applies command-line values on top of the loaded configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(threads) = cli.threads {
        config.checking.threads = threads;
    }
    if let Some(level) = cli.recursion_level {
        config.checking.recursion_level = level;
    }
    if let Some(timeout) = cli.timeout {
        config.checking.timeout = timeout;
    }
    if let Some(console) = cli.output {
        config.output.console = console;
    }
    config.output.file.extend(cli.file_output.iter().cloned());
    if cli.verbose_results {
        config.output.verbose = true;
    }
    if cli.no_warnings {
        config.output.warnings = false;
    }
    if cli.status {
        config.checking.status = true;
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("linkgauge=info,warn"),
            1 => EnvFilter::new("linkgauge=debug,info"),
            _ => EnvFilter::new("linkgauge=trace,debug"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Watches for Ctrl-C on a helper thread and aborts the run
///
/// The blocking checkers never run inside this runtime; it only waits for
/// the signal.
fn spawn_interrupt_handler(consumer: Consumer) {
    let spawned = thread::Builder::new()
        .name("linkgauge-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!("Ctrl-C handling unavailable: {}", e);
                    return;
                }
            };
            match runtime.block_on(tokio::signal::ctrl_c()) {
                Ok(()) => {
                    tracing::warn!("Keyboard interrupt, stopping");
                    consumer.abort();
                }
                Err(e) => tracing::warn!("Failed to listen for Ctrl-C: {}", e),
            }
        });

    if let Err(e) = spawned {
        tracing::warn!("Failed to start Ctrl-C handler: {}", e);
    }
}

/// Handles the --dry-run mode: shows the effective configuration and seeds
fn handle_dry_run(config: &Config, seeds: &[Url]) {
    println!("=== linkgauge Dry Run ===\n");

    println!("Checking:");
    println!("  Threads: {}", config.checking.threads);
    match config.checking.recursion_limit() {
        Some(level) => println!("  Recursion level: {}", level),
        None => println!("  Recursion level: unlimited"),
    }
    println!("  Timeout: {}s", config.checking.timeout);
    println!("  Abort timeout: {}s", config.checking.abort_timeout);
    println!("  User agent: {}", config.checking.user_agent);
    println!("  Robots.txt: {}", config.checking.robots_txt);
    if let Some(max) = config.checking.max_num_urls {
        println!("  Max URLs: {}", max);
    }
    if let Some(seconds) = config.checking.max_run_seconds {
        println!("  Max run time: {}s", seconds);
    }
    println!("  Anchor check: {}", config.checking.anchors);
    if let Some(pattern) = &config.checking.warning_regex {
        println!(
            "  Warning regex: {} (max {} per page)",
            pattern, config.checking.warning_regex_max
        );
    }

    println!("\nFiltering:");
    println!("  Extern patterns: {}", config.filtering.extern_links.len());
    println!("  Intern patterns: {}", config.filtering.intern_links.len());
    if !config.filtering.ignore_warnings.is_empty() {
        println!(
            "  Ignored warnings: {}",
            config.filtering.ignore_warnings.join(", ")
        );
    }

    println!("\nOutput:");
    println!(
        "  Console: {}",
        if config.output.quiet {
            "none".to_string()
        } else {
            format!("{:?}", config.output.console).to_lowercase()
        }
    );
    for file in &config.output.file {
        println!("  - {} -> {}", file.kind, file.path);
    }

    println!("\nSeed URLs ({}):", seeds.len());
    for seed in seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}
