//! nsfix CLI
//!
//! Adds missing Android `namespace` declarations to Flutter plugins in the
//! pub cache. Run it before the Gradle build.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use nsfix_android::cache;
use nsfix_android::overlay;
use nsfix_android::patcher::{ensure_success, PatchOptions, PatchReport, Patcher};
use nsfix_cli::output::{format_count, format_duration, Status};
use nsfix_core::config::{expand_path, Config, DetectionMode, FailurePolicy};
use nsfix_core::error::exit_codes;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nsfix")]
#[command(about = "Add missing Android namespace declarations to cached Flutter plugins")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress summary output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CacheArgs {
    /// Package cache root (defaults to the pub.dev hosted cache)
    #[arg(long, env = "NSFIX_CACHE_ROOT")]
    cache_root: Option<PathBuf>,

    /// Treat any mention of `namespace` as a declaration, comments included
    #[arg(long)]
    substring_check: bool,

    /// Skip packages whose directory name matches this glob
    #[arg(long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert missing namespace declarations in place
    Patch {
        #[command(flatten)]
        cache: CacheArgs,
        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
        /// Record per-package I/O failures and continue
        #[arg(long)]
        keep_going: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Exit non-zero if any package still needs a namespace
    Check {
        #[command(flatten)]
        cache: CacheArgs,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate a Gradle init script instead of touching the cache
    Overlay {
        #[command(flatten)]
        cache: CacheArgs,
        /// Write the script here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the resolved package cache root
    #[command(name = "cache-path")]
    CachePath {
        /// Package cache root override
        #[arg(long, env = "NSFIX_CACHE_ROOT")]
        cache_root: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }

    init_logging(cli.verbose);

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            Status::error(&e.to_string());
            std::process::exit(exit_codes::CONFIG_ERROR);
        }
    };

    let exit_code = match cli.command {
        Commands::Patch { cache, dry_run, keep_going, json } => {
            run_patch(&config, &cache, dry_run, keep_going, json, cli.quiet)
        }
        Commands::Check { cache, json } => run_check(&config, &cache, json, cli.quiet),
        Commands::Overlay { cache, output } => {
            run_overlay(&config, &cache, output.as_deref(), cli.quiet)
        }
        Commands::CachePath { cache_root } => run_cache_path(&config, cache_root),
    };

    std::process::exit(exit_code);
}

/// Logs go to stderr; stdout is reserved for notices and reports.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "nsfix=debug,nsfix_android=debug,nsfix_core=debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn resolve_cache_root(config: &Config, flag: Option<PathBuf>) -> nsfix_core::Result<PathBuf> {
    let (root, origin) = if let Some(root) = flag {
        (expand_path(&root.to_string_lossy())?, "command line")
    } else if let Some(root) = config.cache_root()? {
        (root, "config")
    } else {
        (cache::default_cache_root()?, "default")
    };

    debug!(cache_root = %root.display(), origin, "Resolved package cache root");
    Ok(root)
}

fn build_options(config: &Config, args: &CacheArgs) -> nsfix_core::Result<PatchOptions> {
    let mut options = PatchOptions::from_config(&config.schema.patcher)?;
    if args.substring_check {
        options = options.with_detection(DetectionMode::Substring);
    }
    let patterns: Vec<&str> = args.exclude.iter().map(String::as_str).collect();
    options.exclude(&patterns)
}

fn run_patch(
    config: &Config,
    args: &CacheArgs,
    dry_run: bool,
    keep_going: bool,
    json: bool,
    quiet: bool,
) -> i32 {
    let prepared = resolve_cache_root(config, args.cache_root.clone())
        .and_then(|root| build_options(config, args).map(|options| (root, options)));
    let (cache_root, mut options) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => return report_error(&e, json),
    };

    options = options.dry_run(dry_run);
    if keep_going {
        options = options.with_failure_policy(FailurePolicy::Continue);
    }

    let started = Instant::now();
    let patcher = Patcher::new(options);
    let result = if json {
        patcher.run(&cache_root, &mut io::sink())
    } else {
        patcher.run(&cache_root, &mut io::stdout().lock())
    };

    let report = match result {
        Ok(report) => report,
        Err(e) => return report_error(&e, json),
    };

    if json {
        print_json(&report);
    } else if !quiet {
        print_summary(&report, started);
    }

    match ensure_success(&report) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            if !json {
                for failed in report.failures() {
                    Status::error(&format!("Failed to patch {}", failed.package));
                }
                Status::error(&e.to_string());
            }
            exit_codes::FAILURE
        }
    }
}

fn run_check(config: &Config, args: &CacheArgs, json: bool, quiet: bool) -> i32 {
    let report = resolve_cache_root(config, args.cache_root.clone()).and_then(|root| {
        let options = build_options(config, args)?;
        Patcher::new(options).check(&root)
    });

    let report = match report {
        Ok(report) => report,
        Err(e) => return report_error(&e, json),
    };

    let pending: Vec<_> = report.patched().collect();
    if json {
        print_json(&report);
    } else {
        for package in &pending {
            println!("Missing namespace in {}", package.package);
        }
        if !quiet {
            if pending.is_empty() {
                Status::success("All cached plugins declare a namespace");
            } else {
                Status::warning(&format!(
                    "{} missing a namespace; run `nsfix patch` or `nsfix overlay`",
                    format_count(pending.len(), "package is", "packages are")
                ));
            }
        }
    }

    if pending.is_empty() {
        exit_codes::SUCCESS
    } else {
        exit_codes::FAILURE
    }
}

fn run_overlay(config: &Config, args: &CacheArgs, output: Option<&Path>, quiet: bool) -> i32 {
    let entries = resolve_cache_root(config, args.cache_root.clone()).and_then(|root| {
        let options = build_options(config, args)?;
        overlay::collect(&root, &options)
    });

    let entries = match entries {
        Ok(entries) => entries,
        Err(e) => return report_error(&e, false),
    };

    match output {
        Some(path) => {
            if let Err(e) = overlay::write(path, &entries) {
                return report_error(&e, false);
            }
            if !quiet {
                Status::success(&format!(
                    "Wrote {} to {}",
                    format_count(entries.len(), "namespace", "namespaces"),
                    path.display()
                ));
                Status::detail("Use with", &format!("--init-script {}", path.display()));
            }
        }
        None => print!("{}", overlay::render(&entries)),
    }

    exit_codes::SUCCESS
}

fn run_cache_path(config: &Config, flag: Option<PathBuf>) -> i32 {
    match resolve_cache_root(config, flag) {
        Ok(root) => {
            println!("{}", root.display());
            exit_codes::SUCCESS
        }
        Err(e) => report_error(&e, false),
    }
}

fn print_summary(report: &PatchReport, started: Instant) {
    if !report.cache_present {
        Status::info(&format!(
            "No package cache at {}, nothing to patch",
            report.cache_root.display()
        ));
        return;
    }

    let patched = report.patched().count();
    let verb = if report.dry_run { "Would patch" } else { "Patched" };
    Status::success(&format!(
        "{} {} of {} in {}",
        verb,
        format_count(patched, "package", "packages"),
        report.packages.len(),
        format_duration(started.elapsed())
    ));
}

fn print_json(report: &PatchReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => Status::error(&format!("Failed to serialize report: {}", e)),
    }
}

fn report_error(err: &nsfix_core::Error, json: bool) -> i32 {
    if json {
        let body = serde_json::json!({ "error": err.to_report() });
        println!("{}", body);
    } else {
        Status::error(&err.to_string());
    }
    exit_codes::FAILURE
}
