//! Grove CLI Binary
//!
//! Thin command-line surface over the `grove` library: argument parsing
//! and output formatting only.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use grove::logging::init_logging;
use grove::merge::ConflictMarkerMerger;
use grove::repo::{MergeOutcome, Repository};
use std::path::PathBuf;
use std::process;
use tracing::error;

/// Grove - minimal distributed version control
#[derive(Parser)]
#[command(name = "grove")]
#[command(about = "Minimal distributed version control")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Working directory root
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty repository
    Init,
    /// Stage files or directories
    Add {
        /// Files or directories to stage
        paths: Vec<PathBuf>,
    },
    /// Record the staged snapshot as a commit
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,
    },
    /// Show the current branch, HEAD, and merge state
    Status,
    /// Walk history from a commit (default: HEAD)
    Log {
        /// Branch, tag, ref, or commit id to start from
        name: Option<String>,
    },
    /// Switch to a branch or commit
    Checkout {
        /// Branch, tag, ref, or commit id
        name: String,
    },
    /// List branches, or create one
    Branch {
        /// Name of the branch to create
        name: Option<String>,
        /// Commit to start from (default: HEAD)
        start_point: Option<String>,
    },
    /// Create a tag pointing at a commit
    Tag {
        name: String,
        /// Commit to tag (default: HEAD)
        target: Option<String>,
    },
    /// Merge another commit into HEAD
    Merge {
        /// Branch, tag, ref, or commit id
        name: String,
    },
    /// Move the current branch to a commit
    Reset {
        target: String,
    },
    /// Manage named remotes
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
    /// Mirror a remote's branches into tracking refs
    Fetch {
        /// Remote name or path
        remote: String,
    },
    /// Push a ref to a remote
    Push {
        /// Remote name or path
        remote: String,
        /// Branch to push
        branch: String,
    },
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// Register a remote by name
    Add { name: String, path: PathBuf },
    /// List configured remotes
    List,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "info" } else { "off" };
    if let Err(e) = init_logging(level) {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run(&cli) {
        error!("Command failed: {e}");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if let Commands::Init = cli.command {
        let repo = Repository::init(&cli.workdir)?;
        println!(
            "Initialized empty grove repository in {}",
            repo.repo_dir().display()
        );
        return Ok(());
    }

    let repo = Repository::open(&cli.workdir)?;
    match &cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Add { paths } => {
            if paths.is_empty() {
                bail!("nothing specified, nothing staged");
            }
            let mut index = repo.load_index()?;
            repo.add(&mut index, paths)?;
        }
        Commands::Commit { message } => {
            let index = repo.load_index()?;
            let oid = repo.commit(&index, message)?;
            println!("[{}] {}", oid.short(), first_line(message));
        }
        Commands::Status => {
            let status = repo.status()?;
            match &status.branch {
                Some(branch) => println!("On branch {branch}"),
                None => println!("HEAD detached"),
            }
            match status.head {
                Some(oid) => println!("HEAD at {}", oid.short()),
                None => println!("No commits yet"),
            }
            if let Some(other) = status.merging {
                println!("Merging with {}", other.short());
            }
        }
        Commands::Log { name } => {
            let start = repo.resolve_name(name.as_deref().unwrap_or("@"))?;
            for oid in repo.log(start) {
                let oid = oid?;
                let commit = grove::graph::get_commit(repo.objects(), &oid)?;
                println!("commit {oid}");
                for line in commit.message.lines() {
                    println!("    {line}");
                }
                println!();
            }
        }
        Commands::Checkout { name } => {
            let mut index = repo.load_index()?;
            let oid = repo.checkout(&mut index, name, true)?;
            println!("HEAD is now at {} ({name})", oid.short());
        }
        Commands::Branch { name, start_point } => match name {
            None => {
                let current = repo.current_branch()?;
                for branch in repo.branch_names()? {
                    let marker = if Some(&branch) == current.as_ref() { "*" } else { " " };
                    println!("{marker} {branch}");
                }
            }
            Some(name) => {
                let start = repo.resolve_name(start_point.as_deref().unwrap_or("@"))?;
                repo.create_branch(name, start)?;
                println!("Branch {name} created at {}", start.short());
            }
        },
        Commands::Tag { name, target } => {
            let oid = repo.resolve_name(target.as_deref().unwrap_or("@"))?;
            repo.create_tag(name, oid)?;
            println!("Tag {name} created at {}", oid.short());
        }
        Commands::Merge { name } => {
            let mut index = repo.load_index()?;
            match repo.merge(&mut index, &ConflictMarkerMerger, name, true)? {
                MergeOutcome::FastForward(oid) => {
                    println!("Fast-forward merge, HEAD is now at {}", oid.short());
                }
                MergeOutcome::InProgress { .. } => {
                    println!("Merged in working tree; commit to conclude");
                }
            }
        }
        Commands::Reset { target } => {
            let oid = repo.resolve_name(target)?;
            repo.reset(oid)?;
            println!("HEAD is now at {}", oid.short());
        }
        Commands::Remote { command } => match command {
            RemoteCommands::Add { name, path } => {
                let mut repo = repo;
                repo.config_mut().set_remote(name.clone(), path.clone());
                repo.save_config()?;
                println!("Remote {name} -> {}", path.display());
            }
            RemoteCommands::List => {
                for (name, path) in &repo.config().remotes {
                    println!("{name}\t{}", path.display());
                }
            }
        },
        Commands::Fetch { remote } => {
            let remote_repo = open_remote(&repo, remote)?;
            let report = grove::sync::fetch(&repo, &remote_repo)?;
            println!(
                "Fetched {} ref(s), {} object(s)",
                report.tracking.len(),
                report.objects_transferred
            );
        }
        Commands::Push { remote, branch } => {
            let remote_repo = open_remote(&repo, remote)?;
            let refname = format!("refs/heads/{branch}");
            let report = grove::sync::push(&repo, &remote_repo, &refname)?;
            println!(
                "Pushed {} to {} ({} object(s))",
                report.oid.short(),
                branch,
                report.objects_transferred
            );
        }
    }
    Ok(())
}

/// A remote argument is a configured name or, failing that, a path.
fn open_remote(repo: &Repository, remote: &str) -> anyhow::Result<Repository> {
    let path = repo
        .config()
        .remote_path(remote)
        .cloned()
        .unwrap_or_else(|| PathBuf::from(remote));
    Repository::open(&path).with_context(|| format!("cannot open remote {remote:?}"))
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or("")
}
