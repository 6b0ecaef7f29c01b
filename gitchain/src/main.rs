//! Command-line front end for gitchain.
//!
//! Each subcommand builds one chain at `--path`, configured from the runner
//! config file, and maps the chain's outcome to a stable exit code.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use gitchain::Chain;
use gitchain::exit_codes;
use gitchain::io::config::{DEFAULT_CONFIG_FILE, RunnerConfig, load_config, write_config};
use gitchain::logging;

#[derive(Parser)]
#[command(name = "gitchain", version, about = "Fail-fast git command chains")]
struct Cli {
    /// Repository working directory.
    #[arg(long, global = true, default_value = ".")]
    path: PathBuf,

    /// Runner config (TOML). Defaults to `.gitchain.toml` in `--path`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log a record for every git step.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print `git status`.
    Status,
    /// Stage everything and commit when something is staged.
    Submit {
        #[arg(short, long)]
        message: String,
        /// Push after committing.
        #[arg(long)]
        push: bool,
    },
    /// Print the latest tag; exits 2 when there is none.
    LatestTag {
        /// Highest version tag starting with this prefix.
        #[arg(long, conflicts_with = "matching")]
        prefix: Option<String>,
        /// Highest version tag matching this glob.
        #[arg(long)]
        matching: Option<String>,
    },
    /// List working tree changes.
    Changes {
        #[arg(long)]
        json: bool,
    },
    /// List ignored paths under `--path`.
    Ignored {
        #[arg(long)]
        json: bool,
    },
    /// Write a config file with every key at its default.
    InitConfig {
        /// Replace an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// List local (or remote-tracking) branches.
    Branches {
        #[arg(long)]
        remote: bool,
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(if cli.debug { "gitchain=debug" } else { "warn" });
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let chain = || build_chain(&cli);
    match &cli.command {
        Command::InitConfig { force } => cmd_init_config(&config_path(&cli), *force),
        Command::Status => cmd_status(&chain()?),
        Command::Submit { message, push } => cmd_submit(&chain()?, message, *push),
        Command::LatestTag { prefix, matching } => {
            cmd_latest_tag(&chain()?, prefix.as_deref(), matching.as_deref())
        }
        Command::Changes { json } => cmd_changes(&chain()?, *json),
        Command::Ignored { json } => {
            let paths = chain()?.ignored_files().context("list ignored files")?;
            print_list(&paths, *json)
        }
        Command::Branches { remote, json } => {
            let chain = chain()?;
            let branches = if *remote {
                chain.list_remote_branches()
            } else {
                chain.list_branches()
            }
            .context("list branches")?;
            print_list(&branches, *json)
        }
    }
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| cli.path.join(DEFAULT_CONFIG_FILE))
}

fn build_chain(cli: &Cli) -> Result<Chain> {
    let config_path = config_path(cli);
    let cfg = load_config(&config_path)?;
    debug!(config = %config_path.display(), ?cfg, "loaded runner config");
    let runner = cfg.to_runner(&cli.path);
    Ok(Chain::with_runner(&cli.path, &runner).with_debug_mode(cli.debug || cfg.debug))
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    write_config(path, &RunnerConfig::default(), force)?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_status(chain: &Chain) -> Result<i32> {
    let output = chain.status().into_result().context("git status")?;
    print!("{}", String::from_utf8_lossy(&output));
    Ok(exit_codes::OK)
}

fn cmd_submit(chain: &Chain, message: &str, push: bool) -> Result<i32> {
    let mut committed = false;
    let done = chain.add().when_then(
        |c| c.has_staging_changes(),
        |c| {
            committed = true;
            let c = c.commit(message);
            if push { c.push() } else { c }
        },
    );
    done.into_result().context("submit")?;
    if committed {
        println!("committed{}", if push { " and pushed" } else { "" });
    } else {
        println!("nothing to commit");
    }
    Ok(exit_codes::OK)
}

fn cmd_latest_tag(chain: &Chain, prefix: Option<&str>, matching: Option<&str>) -> Result<i32> {
    let tag = match (prefix, matching) {
        (Some(prefix), _) => chain.latest_tag_has_prefix(prefix),
        (None, Some(glob)) => chain.latest_tag_matching(glob),
        (None, None) => chain.latest_tag(),
    }
    .context("find latest tag")?;
    match tag {
        Some(tag) => {
            println!("{tag}");
            Ok(exit_codes::OK)
        }
        None => {
            eprintln!("no matching tag");
            Ok(exit_codes::NOT_FOUND)
        }
    }
}

fn cmd_changes(chain: &Chain, json: bool) -> Result<i32> {
    let entries = chain.status_entries().context("read status")?;
    if json {
        print_json(&entries)?;
    } else {
        for entry in &entries {
            println!("{} {}", entry.code, entry.path);
        }
    }
    Ok(exit_codes::OK)
}

fn print_list(items: &[String], json: bool) -> Result<i32> {
    if json {
        print_json(items)?;
    } else {
        for item in items {
            println!("{item}");
        }
    }
    Ok(exit_codes::OK)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
