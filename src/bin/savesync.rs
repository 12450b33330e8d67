//! # SaveSync CLI - Backups for your save folders
//!
//! Command-line front end for the savesync library.
//!
//! ## Usage
//! ```bash
//! # Back up a save folder under a name
//! savesync create "Hollow Knight" ~/.config/unity3d/Team\ Cherry/Hollow\ Knight
//!
//! # Bring the backup up to date (shows the plan first with --dry-run)
//! savesync update "hollow knight" --dry-run
//! savesync update "hollow knight"
//!
//! # Put the saves back
//! savesync restore "hollow knight"
//!
//! # Push to / pull from a synced cloud-drive folder
//! savesync remote --remote-dir ~/Dropbox push "hollow knight"
//! savesync remote --remote-dir ~/Dropbox pull "hollow knight"
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use savesync::remote::{LocalFolderStore, RemoteBackups};
use savesync::{
    format_bytes, BackupLedger, BatchReport, MirrorPlan, RestoreOptions, SaveSyncConfig,
    SaveSyncError, SnapshotOutcome, SnapshotPolicy, UpdateOptions,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// SaveSync CLI - back up, mirror and restore save folders
#[derive(Parser)]
#[command(name = "savesync")]
#[command(version)]
#[command(about = "Back up, mirror and restore game save folders")]
#[command(long_about = None)]
struct Cli {
    /// Root backup directory
    #[arg(short, long, global = true, env = "SAVESYNC_ROOT", default_value = "./save-backups")]
    root: PathBuf,

    /// Configuration file (takes precedence over --root)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new backup of a save folder
    Create {
        /// Backup name
        name: String,

        /// Save folder to back up
        source: PathBuf,
    },

    /// Mirror the save folder into its backup
    #[command(alias = "up")]
    Update {
        /// Backup name
        name: String,

        /// Use (and remember) a different save folder
        #[arg(long)]
        source: Option<PathBuf>,

        /// Do not ask for confirmation; a failed safety snapshot is only a warning
        #[arg(short, long)]
        yes: bool,

        /// Show what would change without touching anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Copy a backup back over its save folder
    #[command(alias = "rs")]
    Restore {
        /// Backup name
        name: String,

        /// Restore into this folder instead
        #[arg(long)]
        to: Option<PathBuf>,

        /// Do not ask for confirmation; a failed safety snapshot is only a warning
        #[arg(short, long)]
        yes: bool,
    },

    /// Update every backup
    UpdateAll,

    /// Restore every backup
    RestoreAll {
        /// Skip the typed confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Permanently delete a backup and its safety snapshots
    Delete {
        /// Backup name
        name: String,

        /// Skip the typed confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// List backups
    #[command(alias = "ls")]
    List,

    /// List safety snapshots
    Safety,

    /// Show the most recent audit log entries
    Log {
        /// Number of entries
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print a search URL for a game's save location
    Search {
        /// Game title
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },

    /// Export, import or show configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Remote backups in a folder store
    Remote {
        /// Folder acting as the remote store (e.g. a synced cloud drive)
        #[arg(long, env = "SAVESYNC_REMOTE_DIR")]
        remote_dir: PathBuf,

        #[command(subcommand)]
        command: RemoteCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write the catalog to a file
    Export { file: PathBuf },
    /// Replace the catalog with an exported file
    Import { file: PathBuf },
    /// Print the effective configuration
    Show,
}

#[derive(Subcommand)]
enum RemoteCommand {
    /// Upload the current save folder
    Push { name: String },
    /// Download and restore a remote backup
    Pull {
        name: String,
        /// Remote backup folder (defaults to the newest)
        #[arg(long)]
        folder: Option<String>,
        /// Restore into this folder instead
        #[arg(long)]
        to: Option<PathBuf>,
        #[arg(short, long)]
        yes: bool,
    },
    /// List remote backups of a name
    List { name: String },
    /// Delete one remote backup
    Delete {
        name: String,
        folder: String,
        #[arg(short, long)]
        yes: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("savesync=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        let message = match e.downcast_ref::<SaveSyncError>() {
            Some(err) => err.user_message(),
            None => format!("{:#}", e),
        };
        eprintln!("{}: {}", "Error".red().bold(), message);
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => SaveSyncConfig::load(path)?,
        None => SaveSyncConfig::new(&cli.root),
    };

    match cli.command {
        Commands::Search { title } => {
            println!("{}", config.save_search_url(&title.join(" ")));
            Ok(())
        }
        Commands::Config(ConfigCommand::Show) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        command => {
            let mut ledger = BackupLedger::open(config)?;
            dispatch(&mut ledger, command)
        }
    }
}

fn dispatch(ledger: &mut BackupLedger, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Create { name, source } => cmd_create(ledger, &name, source),
        Commands::Update {
            name,
            source,
            yes,
            dry_run,
        } => cmd_update(ledger, &name, source, yes, dry_run),
        Commands::Restore { name, to, yes } => cmd_restore(ledger, &name, to, yes),
        Commands::UpdateAll => cmd_update_all(ledger),
        Commands::RestoreAll { yes } => cmd_restore_all(ledger, yes),
        Commands::Delete { name, yes } => cmd_delete(ledger, &name, yes),
        Commands::List => cmd_list(ledger),
        Commands::Safety => cmd_safety(ledger),
        Commands::Log { limit } => cmd_log(ledger, limit),
        Commands::Config(ConfigCommand::Export { file }) => {
            let count = ledger.export_catalog(&file)?;
            println!("{} Exported {} backup(s) to {}", "✓".green().bold(), count, file.display());
            Ok(())
        }
        Commands::Config(ConfigCommand::Import { file }) => {
            let count = ledger.import_catalog(&file)?;
            println!("{} Imported {} backup(s)", "✓".green().bold(), count);
            Ok(())
        }
        Commands::Remote {
            remote_dir,
            command,
        } => {
            let container = ledger.config().remote_container.clone();
            let remote = RemoteBackups::new(LocalFolderStore::new(remote_dir), container);
            cmd_remote(ledger, &remote, command)
        }
        Commands::Search { .. } | Commands::Config(ConfigCommand::Show) => Ok(()),
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn elapsed(start: Instant) -> String {
    format_duration(Duration::from_millis(start.elapsed().as_millis() as u64)).to_string()
}

/// Ask a yes/no question; anything but `y`/`yes` declines
fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Require the user to type `phrase` exactly
fn confirm_typed(warning: &str, phrase: &str) -> anyhow::Result<bool> {
    println!("{}", warning.red().bold());
    print!("Type {} to continue: ", phrase.yellow().bold());
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim() == phrase)
}

fn cancelled() -> anyhow::Result<()> {
    println!("{}", "Cancelled.".yellow());
    Ok(())
}

fn print_snapshot(outcome: &SnapshotOutcome) {
    match outcome {
        SnapshotOutcome::Failed { .. } => println!("  {} {}", "!".yellow().bold(), outcome),
        _ => println!("  Safety: {}", outcome.to_string().cyan()),
    }
}

fn cmd_create(ledger: &mut BackupLedger, name: &str, source: PathBuf) -> anyhow::Result<()> {
    let start = Instant::now();
    let pb = spinner("Copying files...");
    let result = ledger.create(name, &source);
    pb.finish_and_clear();
    let report = result?;

    println!("{} {}", "✓".green().bold(), report);
    println!("  Backup: {}", report.record.backup_root.display().to_string().cyan());
    println!("  Size: {}", format_bytes(report.stats.bytes_copied).cyan());
    println!("  Time: {}", elapsed(start).cyan());
    for failure in &report.stats.failures {
        println!("  {} {}", "!".yellow().bold(), failure);
    }
    Ok(())
}

fn print_plan(plan: &MirrorPlan) {
    println!(
        "{} {} -> {}",
        "Plan".blue().bold(),
        plan.source.display(),
        plan.target.display()
    );
    for copy in &plan.to_copy {
        println!("  {} {} ({:?})", "+".green(), copy.path.display(), copy.reason);
    }
    for path in &plan.to_delete {
        println!("  {} {}", "-".red(), path.display());
    }
    println!(
        "  {} new, {} modified, {} to delete, {} unchanged",
        plan.new_files(),
        plan.modified_files(),
        plan.to_delete.len(),
        plan.unchanged
    );
}

fn cmd_update(
    ledger: &mut BackupLedger,
    name: &str,
    source: Option<PathBuf>,
    yes: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    if dry_run {
        let plan = ledger.plan_update(name, source.as_deref())?;
        print_plan(&plan);
        return Ok(());
    }

    let record = ledger.record(name)?;
    if !yes && !confirm(&format!("Update backup '{}'?", record.display_name))? {
        return cancelled();
    }

    let options = UpdateOptions {
        auto_confirm: yes && source.is_none(),
        source_override: source,
        snapshot_policy: if yes {
            SnapshotPolicy::BestEffort
        } else {
            SnapshotPolicy::Required
        },
    };

    let start = Instant::now();
    let pb = spinner("Mirroring files...");
    let result = ledger.update(name, &options);
    pb.finish_and_clear();
    let report = result?;

    println!("{} Backup updated for {}", "✓".green().bold(), report.record.display_name.cyan());
    println!("  {}", report.mirror);
    print_snapshot(&report.snapshot);
    println!("  Time: {}", elapsed(start).cyan());
    for failure in &report.mirror.failures {
        println!("  {} {}", "!".yellow().bold(), failure);
    }
    Ok(())
}

fn cmd_restore(
    ledger: &mut BackupLedger,
    name: &str,
    to: Option<PathBuf>,
    yes: bool,
) -> anyhow::Result<()> {
    let record = ledger.record(name)?;
    let destination = ledger.live_path(name, to.as_deref())?;
    if !yes
        && !confirm(&format!(
            "Restore '{}' into {}? Existing files there will be overwritten.",
            record.display_name,
            destination.display()
        ))?
    {
        return cancelled();
    }

    let options = RestoreOptions {
        auto_confirm: yes && to.is_none(),
        destination_override: to,
        snapshot_policy: if yes {
            SnapshotPolicy::BestEffort
        } else {
            SnapshotPolicy::Required
        },
    };

    let pb = spinner("Restoring files...");
    let result = ledger.restore(name, &options);
    pb.finish_and_clear();
    let report = result?;

    println!("{} {}", "✓".green().bold(), report);
    for failure in &report.stats.failures {
        println!("  {} {}", "!".yellow().bold(), failure);
    }
    Ok(())
}

fn print_batch(report: &BatchReport) {
    for entry in &report.entries {
        let mark = if entry.outcome.success {
            "✓".green().bold()
        } else {
            "✗".red().bold()
        };
        println!("  {} {}: {}", mark, entry.name.cyan(), entry.outcome.message);
    }
    println!("{}", report.to_string().bold());
}

fn cmd_update_all(ledger: &mut BackupLedger) -> anyhow::Result<()> {
    let pb = spinner("Updating all backups...");
    let report = ledger.update_all();
    pb.finish_and_clear();
    print_batch(&report);
    Ok(())
}

fn cmd_restore_all(ledger: &mut BackupLedger, yes: bool) -> anyhow::Result<()> {
    if !yes
        && !confirm_typed(
            "This overwrites the live save folder of EVERY backup.",
            "RESTORE ALL",
        )?
    {
        return cancelled();
    }
    let pb = spinner("Restoring all backups...");
    let report = ledger.restore_all();
    pb.finish_and_clear();
    print_batch(&report);
    Ok(())
}

fn cmd_delete(ledger: &mut BackupLedger, name: &str, yes: bool) -> anyhow::Result<()> {
    let record = ledger.record(name)?;
    if !yes
        && !confirm_typed(
            &format!(
                "Permanently delete backup '{}' and all of its safety snapshots? This cannot be undone.",
                record.display_name
            ),
            "DELETE",
        )?
    {
        return cancelled();
    }

    let report = ledger.delete(name)?;
    println!("{} {}", "✓".green().bold(), report);
    for failure in &report.snapshot_failures {
        println!("  {} {}", "!".yellow().bold(), failure);
    }
    Ok(())
}

fn cmd_list(ledger: &BackupLedger) -> anyhow::Result<()> {
    let backups = ledger.list_backups();
    if backups.is_empty() {
        println!("No backups yet. Create one with {}", "savesync create <name> <source>".yellow());
        return Ok(());
    }

    println!("{}", format!("{} backup(s)", backups.len()).bold());
    for summary in backups {
        let record = &summary.record;
        println!("{} ({})", record.display_name.cyan().bold(), record.name);
        println!("  Source: {}", record.source_path.display());
        println!("  Backup: {}", record.backup_root.display());
        let last = summary
            .metadata
            .as_ref()
            .and_then(|m| m.backup_date)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| record.last_updated_at.to_rfc3339());
        println!("  Last backup: {}", last);
    }
    Ok(())
}

fn cmd_safety(ledger: &BackupLedger) -> anyhow::Result<()> {
    let snapshots = ledger.list_safety_backups()?;
    if snapshots.is_empty() {
        println!("No safety snapshots.");
        return Ok(());
    }
    for snapshot in snapshots {
        let when = snapshot
            .created_at
            .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!("{}  {}", when.dimmed(), snapshot.name.cyan());
    }
    Ok(())
}

fn cmd_log(ledger: &BackupLedger, limit: usize) -> anyhow::Result<()> {
    let lines = ledger.view_log(limit)?;
    if lines.is_empty() {
        println!("The log is empty.");
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

fn cmd_remote(
    ledger: &BackupLedger,
    remote: &RemoteBackups<LocalFolderStore>,
    command: RemoteCommand,
) -> anyhow::Result<()> {
    match command {
        RemoteCommand::Push { name } => {
            let start = Instant::now();
            let pb = spinner("Uploading...");
            let result = remote.push(ledger, &name);
            pb.finish_and_clear();
            let report = result.with_context(|| format!("push of '{}' failed", name))?;
            println!("{} {}", "✓".green().bold(), report);
            println!("  Time: {}", elapsed(start).cyan());
        }
        RemoteCommand::Pull {
            name,
            folder,
            to,
            yes,
        } => {
            let record = ledger.record(&name)?;
            let destination = ledger.live_path(&name, to.as_deref())?;
            if !yes
                && !confirm(&format!(
                    "Restore '{}' from the remote store into {}? Existing files there will be overwritten.",
                    record.display_name,
                    destination.display()
                ))?
            {
                return cancelled();
            }
            let options = RestoreOptions {
                auto_confirm: yes && to.is_none(),
                destination_override: to,
                snapshot_policy: if yes {
                    SnapshotPolicy::BestEffort
                } else {
                    SnapshotPolicy::Required
                },
            };
            let pb = spinner("Downloading...");
            let result = remote.pull(ledger, &name, folder.as_deref(), &options);
            pb.finish_and_clear();
            let report = result?;
            println!("{} {}", "✓".green().bold(), report);
        }
        RemoteCommand::List { name } => {
            let backups = remote.list(&name)?;
            if backups.is_empty() {
                println!("No remote backups for {}.", name);
            }
            for backup in backups {
                println!("{}", backup.folder.cyan());
            }
        }
        RemoteCommand::Delete { name, folder, yes } => {
            if !yes
                && !confirm_typed(
                    &format!("Permanently delete remote backup {} of '{}'?", folder, name),
                    "DELETE",
                )?
            {
                return cancelled();
            }
            remote.delete(ledger, &name, &folder)?;
            println!("{} Deleted remote backup {}", "✓".green().bold(), folder);
        }
    }
    Ok(())
}
