//! safearchive: back up folders into (optionally encrypted) zip archives
//!
//! Commands:
//!   safearchive sources list|add|remove   -- manage configured source folders
//!   safearchive backup [FOLDER]...        -- timestamped backup of each folder
//!   safearchive save <PATH>... --name     -- labelled backup into the backup store
//!   safearchive archive <PATH>... -o      -- build an archive without storing it
//!   safearchive list                      -- stored backups
//!   safearchive fetch <NAME> -o           -- copy stored bytes out verbatim
//!   safearchive restore <NAME>            -- decrypt and extract a backup
//!   safearchive config show               -- effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

use safearchive_core::config::{expand_tilde, SafeArchiveConfig};
use safearchive_core::{StorageConvention, Warning};
use safearchive_crypto::Password;
use safearchive_engine::{BackupReceipt, Engine};
use safearchive_store::StoredBackup;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "safearchive",
    version,
    about = "Password-protected folder backups",
    long_about = "safearchive: bundle folders into zip archives, optionally encrypt them, and restore them"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(
        long,
        short = 'c',
        env = "SAFEARCHIVE_CONFIG",
        default_value = "~/.config/safearchive/config.toml"
    )]
    config: PathBuf,

    /// Backup store directory (overrides [store] backup_dir)
    #[arg(long, env = "SAFEARCHIVE_BACKUP_DIR", global = true)]
    backup_dir: Option<PathBuf>,

    /// Archive password; prompted for when needed and not given
    #[arg(long, env = "SAFEARCHIVE_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Log level (overrides [log] level)
    #[arg(long, env = "SAFEARCHIVE_LOG", global = true)]
    log: Option<String>,

    /// Log format (overrides [log] format)
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the folders offered for backup
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Timestamped backup of each folder into <destination_dir>/SafeArchive
    Backup {
        /// Folders to back up (default: all configured sources)
        folders: Vec<PathBuf>,

        /// Encrypt the backups
        #[arg(long, short = 'e')]
        encrypt: bool,
    },

    /// Labelled backup of files and folders into the backup store
    Save {
        /// Files and folders to include
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Backup label (sanitized to letters, digits, '-' and '_')
        #[arg(long, short = 'n', default_value = "backup")]
        name: String,

        /// Encrypt the backup
        #[arg(long, short = 'e')]
        encrypt: bool,
    },

    /// Build an archive and write it to a file without storing it
    Archive {
        /// Files and folders to include
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output file
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// Encrypt the archive
        #[arg(long, short = 'e')]
        encrypt: bool,
    },

    /// List stored backups
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Copy a stored backup's bytes to a file, unchanged
    Fetch {
        /// Stored backup name
        name: String,

        /// Output file
        #[arg(long, short = 'o')]
        output: PathBuf,
    },

    /// Decrypt a stored backup and extract it
    Restore {
        /// Stored backup name
        name: String,

        /// Extract into this directory (default: ./<name without suffix>)
        #[arg(long, short = 'd', conflicts_with = "output")]
        dest: Option<PathBuf>,

        /// Write the plain zip here instead of extracting
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum SourcesAction {
    /// Show configured source folders
    List,
    /// Add a source folder
    Add { path: PathBuf },
    /// Remove a source folder by its position in `sources list`
    Remove { index: usize },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let mut config = SafeArchiveConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;
    if let Some(dir) = &cli.backup_dir {
        config.store.backup_dir = dir.clone();
    }

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, format);
    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "safearchive starting"
    );

    let password = cli.password.as_deref();
    match cli.command {
        Commands::Sources { action } => cmd_sources(&mut config, &config_path, action),
        Commands::Backup { folders, encrypt } => cmd_backup(&config, folders, encrypt, password),
        Commands::Save { paths, name, encrypt } => cmd_save(&config, &paths, &name, encrypt, password),
        Commands::Archive { paths, output, encrypt } => {
            cmd_archive(&config, &paths, &output, encrypt, password)
        }
        Commands::List { json } => cmd_list(&config, json),
        Commands::Fetch { name, output } => cmd_fetch(&config, &name, &output),
        Commands::Restore { name, dest, output } => {
            cmd_restore(&config, &name, dest.as_deref(), output.as_deref(), password)
        }
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn open_engine(config: &SafeArchiveConfig) -> Result<Engine> {
    Engine::new(config).context("opening backup store")
}

// ── Password handling ─────────────────────────────────────────────────────────

/// Password for a new archive: the `--password` value, or a confirmed prompt.
fn new_password(given: Option<&str>) -> Result<Password> {
    if let Some(pw) = given {
        return Ok(Password::from(pw));
    }
    let first = Zeroizing::new(rpassword::prompt_password("Archive password: ").context("reading password")?);
    let again = Zeroizing::new(rpassword::prompt_password("Repeat password: ").context("reading password")?);
    if *first != *again {
        anyhow::bail!("passwords do not match");
    }
    if first.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    Ok(Password::new(first.as_bytes()))
}

/// Password for opening an existing backup.
fn existing_password(given: Option<&str>, name: &str) -> Result<Password> {
    if let Some(pw) = given {
        return Ok(Password::from(pw));
    }
    let pw = Zeroizing::new(
        rpassword::prompt_password(format!("Password for {name}: ")).context("reading password")?,
    );
    Ok(Password::new(pw.as_bytes()))
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")?);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    Ok(pb)
}

fn report_warnings(warnings: &[Warning]) {
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}

fn print_receipt(receipt: &BackupReceipt) {
    println!("  name:     {}", receipt.name);
    println!("  path:     {}", receipt.path.display());
    println!("  size:     {}", fmt_bytes(receipt.size));
    println!("  blake3:   {}", &receipt.blake3[..16.min(receipt.blake3.len())]);
    match receipt.backend {
        Some(backend) => println!("  cipher:   {}", backend.as_str()),
        None => println!("  cipher:   none"),
    }
    report_warnings(&receipt.warnings);
}

// ── `safearchive sources` ─────────────────────────────────────────────────────

fn cmd_sources(config: &mut SafeArchiveConfig, config_path: &Path, action: SourcesAction) -> Result<()> {
    match action {
        SourcesAction::List => {
            if config.sources.paths.is_empty() {
                println!("no source folders configured");
            }
            for (i, path) in config.sources.paths.iter().enumerate() {
                println!("{:>3}  {}", i + 1, path.display());
            }
            return Ok(());
        }
        SourcesAction::Add { path } => {
            let added = config.sources.add(&path)?;
            println!("added: {}", added.display());
        }
        SourcesAction::Remove { index } => {
            if index == 0 {
                anyhow::bail!("positions start at 1");
            }
            let removed = config.sources.remove(index - 1)?;
            println!("removed: {}", removed.display());
        }
    }
    config
        .save(config_path)
        .with_context(|| format!("writing config: {}", config_path.display()))?;
    Ok(())
}

// ── `safearchive backup` ──────────────────────────────────────────────────────

fn cmd_backup(
    config: &SafeArchiveConfig,
    folders: Vec<PathBuf>,
    encrypt: bool,
    password: Option<&str>,
) -> Result<()> {
    let folders = if folders.is_empty() {
        config.sources.paths.clone()
    } else {
        folders
    };
    if folders.is_empty() {
        anyhow::bail!("nothing to back up: pass folders or add sources with `safearchive sources add`");
    }

    let engine = open_engine(config)?;
    let password = if encrypt { Some(new_password(password)?) } else { None };

    let mut failed = 0usize;
    for folder in &folders {
        let folder = expand_tilde(folder);
        let spinner = make_spinner("backup")?;
        spinner.set_message(folder.display().to_string());
        match engine.backup_folder(&folder, password.as_ref()) {
            Ok(receipt) => {
                spinner.finish_and_clear();
                println!("{}:", folder.display());
                print_receipt(&receipt);
            }
            Err(e) => {
                spinner.finish_and_clear();
                eprintln!("{}: {e}", folder.display());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} folder backups failed", folders.len());
    }
    Ok(())
}

// ── `safearchive save` ────────────────────────────────────────────────────────

fn cmd_save(
    config: &SafeArchiveConfig,
    paths: &[PathBuf],
    name: &str,
    encrypt: bool,
    password: Option<&str>,
) -> Result<()> {
    let engine = open_engine(config)?;
    let password = if encrypt { Some(new_password(password)?) } else { None };

    let spinner = make_spinner("save")?;
    spinner.set_message(name.to_string());
    let receipt = engine.save_backup(paths, name, password.as_ref());
    spinner.finish_and_clear();

    let receipt = receipt.with_context(|| format!("saving backup {name:?}"))?;
    println!("saved:");
    print_receipt(&receipt);
    Ok(())
}

// ── `safearchive archive` ─────────────────────────────────────────────────────

fn cmd_archive(
    config: &SafeArchiveConfig,
    paths: &[PathBuf],
    output: &Path,
    encrypt: bool,
    password: Option<&str>,
) -> Result<()> {
    let engine = open_engine(config)?;
    let password = if encrypt { Some(new_password(password)?) } else { None };

    let spinner = make_spinner("archive")?;
    spinner.set_message(output.display().to_string());
    let archive = engine.create_archive(paths, password.as_ref());
    spinner.finish_and_clear();

    let archive = archive.context("building archive")?;
    std::fs::write(output, &archive.bytes)
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "wrote {} ({}, {})",
        output.display(),
        fmt_bytes(archive.bytes.len() as u64),
        archive.backend.map_or("unencrypted", |b| b.as_str())
    );
    report_warnings(&archive.warnings);
    Ok(())
}

// ── `safearchive list` ────────────────────────────────────────────────────────

fn cmd_list(config: &SafeArchiveConfig, json: bool) -> Result<()> {
    let engine = open_engine(config)?;
    let backups = engine.list().context("listing backups")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&backups).context("serializing backup list")?
        );
        return Ok(());
    }

    if backups.is_empty() {
        println!("no backups in {}", engine.store().root().display());
        return Ok(());
    }
    for backup in &backups {
        print_listing(backup);
    }
    Ok(())
}

fn print_listing(backup: &StoredBackup) {
    let kind = match backup.convention {
        StorageConvention::Plain => "plain",
        StorageConvention::RawEnvelope | StorageConvention::WrappedEnvelope => "encrypted",
    };
    println!("{:<48} {:>10}  {}", backup.name, fmt_bytes(backup.size), kind);
}

// ── `safearchive fetch` ───────────────────────────────────────────────────────

fn cmd_fetch(config: &SafeArchiveConfig, name: &str, output: &Path) -> Result<()> {
    let engine = open_engine(config)?;
    let bytes = engine.fetch(name).with_context(|| format!("fetching {name}"))?;
    std::fs::write(output, &bytes).with_context(|| format!("writing {}", output.display()))?;
    println!("wrote {} ({})", output.display(), fmt_bytes(bytes.len() as u64));
    Ok(())
}

// ── `safearchive restore` ─────────────────────────────────────────────────────

fn cmd_restore(
    config: &SafeArchiveConfig,
    name: &str,
    dest: Option<&Path>,
    output: Option<&Path>,
    password: Option<&str>,
) -> Result<()> {
    let engine = open_engine(config)?;

    // Unknown suffixes are decided by content, so ask anyway
    let needs_password = StorageConvention::detect(name).map_or(true, |c| c.is_encrypted());
    let password = if needs_password {
        Some(existing_password(password, name)?)
    } else {
        None
    };

    let spinner = make_spinner("restore")?;
    spinner.set_message(name.to_string());

    if let Some(output) = output {
        let container = engine.restore_backup(name, password.as_ref());
        spinner.finish_and_clear();
        let container = container.with_context(|| format!("restoring {name}"))?;
        std::fs::write(output, &container)
            .with_context(|| format!("writing {}", output.display()))?;
        println!("wrote {} ({})", output.display(), fmt_bytes(container.len() as u64));
        return Ok(());
    }

    let dest = dest.map(Path::to_path_buf).unwrap_or_else(|| default_dest(name));
    let summary = engine.restore_to_dir(name, password.as_ref(), &dest);
    spinner.finish_and_clear();
    let summary = summary.with_context(|| format!("restoring {name}"))?;

    println!(
        "restored {} files, {} directories ({}) into {}",
        summary.files,
        summary.directories,
        fmt_bytes(summary.bytes_out),
        dest.display()
    );
    Ok(())
}

/// `./<name>` with the storage suffix removed.
fn default_dest(name: &str) -> PathBuf {
    let stem = StorageConvention::detect(name)
        .map(|c| c.stem(name))
        .unwrap_or(name);
    PathBuf::from(stem)
}

// ── `safearchive config show` ─────────────────────────────────────────────────

fn cmd_config_show(config: &SafeArchiveConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Utilities ─────────────────────────────────────────────────────────────────

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
