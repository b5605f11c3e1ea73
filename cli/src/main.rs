use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use nsmigrate_core::CORE_NAMESPACE;
use nsmigrate_loader::{LogFormat, MigrateConfig, MigrationLoader};
use nsmigrate_sqlite::{LockOptions, Migrator};
use tracing_subscriber::EnvFilter;

const DEFAULT_DATABASE: &str = "nsmigrate.db";
const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// CLI-specific log format enum with clap argument parsing support.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => Self::Text,
            CliLogFormat::Json => Self::Json,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "nsmigrate")]
#[command(about = "Apply, revert and inspect namespaced SQL migrations", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database file (overrides the config file).
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Migrations root directory (overrides the config file).
    #[arg(long, global = true)]
    dir: Option<PathBuf>,
    /// Log filter directive, e.g. `info` or `nsmigrate_sqlite=debug`.
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Log line format.
    #[arg(long, global = true)]
    log_format: Option<CliLogFormat>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending migrations: core first, then modules.
    Up(UpArgs),
    /// Roll back the most recent migrations of one namespace.
    Down(DownArgs),
    /// Show version, pending count and dirty flag of every namespace.
    Status(StatusArgs),
    /// Print the current version of one namespace.
    Version(NamespaceArgs),
    /// Record a namespace as cleanly at a version without running scripts.
    Force(ForceArgs),
    /// Remove a lock left behind by a crashed process.
    Unlock(NamespaceArgs),
    /// Create an empty up/down migration pair.
    Create(CreateArgs),
}

#[derive(Debug, Args)]
struct UpArgs {
    /// Migrate only this namespace.
    #[arg(long, conflicts_with = "modules")]
    namespace: Option<String>,
    /// Comma-separated module namespaces to run after core (overrides the config file).
    #[arg(long)]
    modules: Option<String>,
}

#[derive(Debug, Args)]
struct DownArgs {
    /// Namespace to roll back.
    #[arg(long)]
    namespace: String,
    /// Number of versions to revert.
    #[arg(long, default_value_t = 1)]
    steps: usize,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Print status as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct NamespaceArgs {
    /// Namespace to operate on.
    #[arg(long)]
    namespace: String,
}

#[derive(Debug, Args)]
struct ForceArgs {
    /// Namespace to repair.
    #[arg(long)]
    namespace: String,
    /// Version to record; 0 clears the namespace.
    #[arg(long)]
    version: i64,
}

#[derive(Debug, Args)]
struct CreateArgs {
    /// Namespace to add the migration to.
    #[arg(long)]
    namespace: String,
    /// Short description used in the file names.
    #[arg(long)]
    name: String,
}

fn main() {
    let cli = Cli::parse();

    let result = resolve_config(&cli.global).and_then(|config| {
        init_logging(&config)?;
        match cli.command {
            Command::Up(args) => run_up(&config, args),
            Command::Down(args) => run_down(&config, args),
            Command::Status(args) => run_status(&config, args),
            Command::Version(args) => run_version(&config, args),
            Command::Force(args) => run_force(&config, args),
            Command::Unlock(args) => run_unlock(&config, args),
            Command::Create(args) => run_create(&config, args),
        }
    });

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

/// Loads the config file if given, then applies flag overrides.
fn resolve_config(global: &GlobalArgs) -> Result<MigrateConfig, String> {
    let mut config = match &global.config {
        Some(path) => MigrateConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
        None => MigrateConfig::new(DEFAULT_DATABASE, DEFAULT_MIGRATIONS_DIR),
    };

    if let Some(db) = &global.db {
        config.database = db.clone();
    }
    if let Some(dir) = &global.dir {
        config.migrations_dir = dir.clone();
    }
    if let Some(level) = &global.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = global.log_format {
        config.logging.format = format.into();
    }
    Ok(config)
}

/// Installs a stderr subscriber so log lines never mix with command output.
fn init_logging(config: &MigrateConfig) -> Result<(), String> {
    let filter = EnvFilter::try_new(&config.logging.level)
        .map_err(|e| format!("Invalid log level '{}': {e}", config.logging.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match config.logging.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| format!("Failed to install logger: {e}"))
}

fn open_migrator(config: &MigrateConfig) -> Result<Migrator, String> {
    let conn = rusqlite::Connection::open(&config.database).map_err(|e| {
        format!(
            "Failed to open database '{}': {e}",
            config.database.display()
        )
    })?;
    tracing::debug!(
        database = %config.database.display(),
        migrations_dir = %config.migrations_dir.display(),
        "opened database"
    );
    Ok(Migrator::new(conn, &config.migrations_dir)
        .with_lock_options(LockOptions::from(&config.lock)))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_up(config: &MigrateConfig, args: UpArgs) -> Result<(), String> {
    let migrator = open_migrator(config)?;

    if let Some(namespace) = args.namespace {
        let applied = migrator
            .migrate_namespace(&namespace)
            .map_err(|e| format!("Migration failed: {e}"))?;
        println!("{namespace}: applied {applied} migration(s)");
        return Ok(());
    }

    let modules = match args.modules {
        Some(list) => parse_csv_list(&list),
        None => config.modules.clone(),
    };
    let report = migrator
        .migrate_all(&modules)
        .map_err(|e| format!("Migration failed: {e}"))?;
    for (namespace, applied) in &report.namespaces {
        println!("{namespace}: applied {applied} migration(s)");
    }
    println!(
        "Migration complete. {} migration(s) applied across {} namespace(s).",
        report.total_applied(),
        report.namespaces.len()
    );
    Ok(())
}

fn run_down(config: &MigrateConfig, args: DownArgs) -> Result<(), String> {
    let migrator = open_migrator(config)?;
    let reverted = migrator
        .rollback(&args.namespace, args.steps)
        .map_err(|e| format!("Rollback failed: {e}"))?;
    let version = migrator
        .version(&args.namespace)
        .map_err(|e| format!("Failed to read version: {e}"))?;
    println!(
        "{}: rolled back {reverted} migration(s), now at version {version}",
        args.namespace
    );
    Ok(())
}

fn run_status(config: &MigrateConfig, args: StatusArgs) -> Result<(), String> {
    let migrator = open_migrator(config)?;
    let statuses = migrator
        .status()
        .map_err(|e| format!("Failed to get migration status: {e}"))?;

    if args.json {
        let json = serde_json::to_string_pretty(&statuses)
            .map_err(|e| format!("Failed to serialize status: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    if statuses.is_empty() {
        println!("No namespaces found.");
        return Ok(());
    }

    println!("{:<24} {:>8} {:>8}  STATE", "NAMESPACE", "VERSION", "PENDING");
    for status in statuses.values() {
        let state = if status.dirty {
            "dirty"
        } else if !status.is_up_to_date() {
            "pending"
        } else {
            "up to date"
        };
        let marker = if status.namespace == CORE_NAMESPACE { "*" } else { "" };
        println!(
            "{:<24} {:>8} {:>8}  {state}",
            format!("{}{marker}", status.namespace),
            status.current_version,
            status.pending_count
        );
    }
    Ok(())
}

fn run_version(config: &MigrateConfig, args: NamespaceArgs) -> Result<(), String> {
    let migrator = open_migrator(config)?;
    let (version, dirty) = migrator
        .current(&args.namespace)
        .map_err(|e| format!("Failed to read version: {e}"))?;
    if dirty {
        println!("{version} (dirty)");
    } else {
        println!("{version}");
    }
    Ok(())
}

fn run_force(config: &MigrateConfig, args: ForceArgs) -> Result<(), String> {
    if args.version < 0 {
        return Err("--version must not be negative".to_string());
    }
    let migrator = open_migrator(config)?;
    migrator
        .force(&args.namespace, args.version)
        .map_err(|e| format!("Force failed: {e}"))?;
    println!("{}: forced to version {}", args.namespace, args.version);
    Ok(())
}

fn run_unlock(config: &MigrateConfig, args: NamespaceArgs) -> Result<(), String> {
    let migrator = open_migrator(config)?;
    let released = migrator
        .release_lock(&args.namespace)
        .map_err(|e| format!("Unlock failed: {e}"))?;
    if released {
        println!("{}: lock released", args.namespace);
    } else {
        println!("{}: not locked", args.namespace);
    }
    Ok(())
}

fn run_create(config: &MigrateConfig, args: CreateArgs) -> Result<(), String> {
    let created = MigrationLoader::new(&config.migrations_dir)
        .create(&args.namespace, &args.name)
        .map_err(|e| format!("Failed to create migration: {e}"))?;
    println!("Created version {}:", created.version);
    println!("  {}", created.up_path.display());
    println!("  {}", created.down_path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Splits a comma-separated list, dropping empty entries.
fn parse_csv_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}
