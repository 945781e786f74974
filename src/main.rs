//! Binary entrypoint for the codex CLI.
//!
//! Commands:
//! - `init [--force]` - write a starter `codex.toml` with a sample repository
//! - `check` - load configuration and repositories, report anything that failed
//! - `list [namespace]` - print registered repositories, or the entries of one
//!
//! See the library crate docs for module-level details: `codex::`.
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use codex::collectable::{Codex, MemoryStorage};
use codex::config::Config;

#[derive(Parser)]
#[command(name = "codex")]
#[command(about = "Collectable repositories and per-player unlock progress")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "codex.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Load configuration and repositories and report problems
    Check,
    /// List repositories, or the entries of one namespace
    List {
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            init_logging(&None, cli.verbose);
            if !force && tokio::fs::try_exists(&cli.config).await.unwrap_or(false) {
                return Err(anyhow!(
                    "{} already exists (use --force to overwrite)",
                    cli.config
                ));
            }
            Config::create_default(&cli.config).await?;
            info!("Wrote default configuration to {}", cli.config);
            println!("Created {}", cli.config);
        }
        Commands::Check => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let (codex, bad_files) = build_codex(config).await?;
            let report = codex.load_report();

            println!(
                "{} loaded, {} disabled, {} failed",
                report.loaded.len(),
                report.skipped.len(),
                report.failed.len() + bad_files.len()
            );
            for namespace in &report.skipped {
                println!("  skipped  {}", namespace);
            }
            for (path, err) in &bad_files {
                println!("  FAILED   {}: {}", path.display(), err);
            }
            for (namespace, err) in &report.failed {
                println!("  FAILED   {}: {}", namespace, err);
            }
            if !report.is_clean() || !bad_files.is_empty() {
                std::process::exit(1);
            }
        }
        Commands::List { namespace } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let (codex, _) = build_codex(config).await?;

            match namespace {
                None => {
                    for repo in codex.registry().repositories() {
                        println!(
                            "{:<24} {:>4} entries  {}",
                            repo.namespace(),
                            repo.len(),
                            repo.plain_display_name()
                        );
                    }
                }
                Some(namespace) => {
                    let repo = codex
                        .registry()
                        .get(&namespace)
                        .ok_or_else(|| anyhow!("No repository named {}", namespace))?;
                    println!("{} ({})", repo.plain_display_name(), repo.namespace());
                    for (id, entry) in repo.entries() {
                        let mut flags = Vec::new();
                        if entry.allow_replay() {
                            flags.push("replay");
                        }
                        if !entry.show_when_locked() {
                            flags.push("hidden");
                        }
                        println!(
                            "  {:<24} {:<8} {} {}",
                            id,
                            entry.type_id().unwrap_or("-"),
                            entry.plain_display_name(),
                            if flags.is_empty() {
                                String::new()
                            } else {
                                format!("[{}]", flags.join(","))
                            }
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

/// Build the handle over in-memory storage. Repository files that failed to
/// load are returned alongside; they have already been logged.
async fn build_codex(config: Config) -> Result<(Codex, Vec<(PathBuf, anyhow::Error)>)> {
    let files = config.load_repositories_dir().await?;
    let codex = Codex::builder(config)
        .repository_configs(files.repositories)
        .storage(MemoryStorage::new())
        .build()?;
    for (namespace, err) in &codex.load_report().failed {
        warn!("Repository {} not loaded: {}", namespace, err);
    }
    Ok((codex, files.failed))
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only when someone is watching it
        let is_tty = atty::is(atty::Stream::Stdout);

        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());

            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }

            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
