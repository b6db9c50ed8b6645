//! APK Triage CLI
//!
//! Command-line interface for static security triage of Android packages.

mod commands;
mod output;

use anyhow::{Context, Result};
use apk_triage_core::ScanConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "apk-triage")]
#[command(version)]
#[command(about = "Static security triage for Android packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (only show findings)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompile and scan one or more local packages
    Scan {
        /// Package files (.apk, .xapk)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Pattern file (YAML or TOML); built-in patterns if omitted
        #[arg(short, long)]
        patterns: Option<PathBuf>,

        /// Directory for results.json and report.json
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Scan worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Post results to this webhook
        #[arg(long)]
        webhook: Option<String>,

        /// Also check for the Janus signature vulnerability
        #[arg(long)]
        janus: bool,

        /// Skip the pattern scan and check only for task hijacking
        #[arg(long, conflicts_with = "janus")]
        task_hijack_only: bool,

        /// Exit with non-zero code if any finding is reported
        #[arg(long)]
        fail_on_findings: bool,
    },

    /// Download a package from a store and analyze it
    Fetch {
        /// Package name (e.g. com.example.app)
        package: String,

        /// Specific version to download
        #[arg(long)]
        version: Option<String>,

        /// Download source understood by apkeep
        #[arg(long, default_value = "apk-pure")]
        source: String,

        /// Directory holding one sub-directory per report
        #[arg(short, long, default_value = "reports")]
        output: PathBuf,

        /// Also produce a traffic-interception build
        #[arg(long)]
        mitm: bool,

        /// Post results to this webhook
        #[arg(long)]
        webhook: Option<String>,

        /// Google Play account email
        #[arg(long, requires = "aas_token")]
        email: Option<String>,

        /// Google Play AAS token
        #[arg(long)]
        aas_token: Option<String>,
    },

    /// List the loaded detection patterns
    Patterns {
        /// Pattern file (YAML or TOML); built-in patterns if omitted
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Show each regex
        #[arg(short, long)]
        details: bool,
    },

    /// List or delete saved reports
    Reports {
        /// Directory holding one sub-directory per report
        #[arg(short, long, default_value = "reports")]
        root: PathBuf,

        #[command(subcommand)]
        action: ReportsAction,
    },

    /// Inspect or clear the decompilation cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show version and tool configuration
    Version,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the cache directory and its entries
    Path,
    /// Remove every cached decompilation
    Clear,
}

#[derive(Subcommand)]
enum ReportsAction {
    /// List saved reports, newest first
    List,
    /// Delete a saved report
    Delete {
        /// Report id (directory name)
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

fn load_config(path: Option<&Path>) -> Result<ScanConfig> {
    match path {
        Some(path) => ScanConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(ScanConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Default to warn to keep output clean
    let filter = if cli.verbose {
        "apk_triage=debug,apk_triage_core=debug"
    } else if cli.quiet {
        "apk_triage=error,apk_triage_core=error"
    } else {
        "apk_triage=warn,apk_triage_core=warn"
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .without_time()
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            paths,
            patterns,
            output,
            workers,
            format,
            webhook,
            janus,
            task_hijack_only,
            fail_on_findings,
        } => {
            let mut config = config;
            if patterns.is_some() {
                config.patterns_path = patterns;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if webhook.is_some() {
                config.webhook_url = webhook;
            }
            config.janus_scan |= janus;
            config.task_hijack_only |= task_hijack_only;

            commands::scan::run(config, paths, output, format, cli.quiet, fail_on_findings).await
        }
        Commands::Fetch {
            package,
            version,
            source,
            output,
            mitm,
            webhook,
            email,
            aas_token,
        } => {
            let args = commands::fetch::FetchArgs {
                package,
                version,
                source,
                reports_root: output,
                traffic_patch: mitm,
                webhook,
                email,
                aas_token,
            };
            commands::fetch::run(config, args).await
        }
        Commands::Patterns { file, details } => {
            commands::patterns::run(file.or(config.patterns_path), details)
        }
        Commands::Reports { root, action } => match action {
            ReportsAction::List => commands::reports::list(&root),
            ReportsAction::Delete { id } => commands::reports::delete(&root, &id),
        },
        Commands::Cache { action } => match action {
            CacheAction::Path => commands::cache::path(&config),
            CacheAction::Clear => commands::cache::clear(&config),
        },
        Commands::Version => {
            commands::version::run(&config);
            Ok(())
        }
    }
}
