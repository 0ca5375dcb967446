/*!
Prefstore CLI - inspection and maintenance of settings directories.

Reads rotation files without taking ownership, validates and reformats settings
files, shows the current instance lock owner, and can set a single value when no
other instance owns the directory.
*/

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use prefstore_core::autosave::{inspect, SlotReport, SlotStatus};
use prefstore_core::codec::{self, Style};
use prefstore_core::coordinator::read_owner;
use prefstore_core::types::AnyType;
use prefstore_core::{
    Key, PrefStoreConfig, Property, Role, Schema, SettingsContext, SettingsFile, Slot, Snapshot,
    StoreLayout, Value,
};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tabled::{Table, Tabled};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "prefstore")]
#[command(about = "Inspect and maintain Prefstore settings directories")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Base name of the rotation and marker files
    #[arg(long, global = true, env = "PREFSTORE_STEM", default_value = "settings")]
    stem: String,

    /// Print auto-save metrics before exiting
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the marker and both rotation files of a directory
    Inspect {
        /// Settings data directory
        dir: PathBuf,
    },
    /// Print the document a loader would pick
    Dump {
        dir: PathBuf,
        /// Single-line output
        #[arg(short, long)]
        compact: bool,
    },
    /// Parse a settings file and report the first error
    Check { file: PathBuf },
    /// Reformat a settings file (comments are not preserved)
    Fmt {
        file: PathBuf,
        /// Replace the file instead of printing the result
        #[arg(short, long)]
        write: bool,
    },
    /// Show the owner recorded in the instance lock file
    Lock { dir: PathBuf },
    /// Set one value, if no other instance owns the directory
    Set {
        dir: PathBuf,
        key: String,
        /// Value in settings syntax, e.g. `true`, `42`, `"text"` or `[1, 2]`
        value: String,
    },
}

#[derive(Tabled)]
struct SlotRow {
    #[tabled(rename = "Slot")]
    slot: String,
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
    #[tabled(rename = "Status")]
    status: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    let config = PrefStoreConfig {
        file_stem: cli.stem.clone(),
        ..Default::default()
    };
    config.validate()?;

    match cli.command {
        Commands::Inspect { dir } => inspect_dir(&layout(&dir, &config)),
        Commands::Dump { dir, compact } => dump(&layout(&dir, &config), compact),
        Commands::Check { file } => check(&file),
        Commands::Fmt { file, write } => fmt(&file, write),
        Commands::Lock { dir } => show_lock(&layout(&dir, &config)),
        Commands::Set { dir, key, value } => set(&layout(&dir, &config), &config, &key, &value),
    }?;

    if cli.metrics {
        print!("{}", prefstore_core::observability::gather_metrics()?);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn layout(dir: &Path, config: &PrefStoreConfig) -> StoreLayout {
    StoreLayout::new(dir, config.file_stem.as_str())
}

fn inspect_dir(layout: &StoreLayout) -> Result<(), anyhow::Error> {
    info!("Inspecting {}", layout.dir().display());
    if !layout.dir().is_dir() {
        bail!("{} is not a directory", layout.dir().display());
    }

    let report = inspect(layout);
    let rows: Vec<SlotRow> = [Slot::First, Slot::Second]
        .into_iter()
        .map(|slot| slot_row(layout, report.marker, report.slot(slot)))
        .collect();
    println!("{}", Table::new(rows));

    match report.marker {
        Some(slot) => println!("Marker: slot {slot}"),
        None => println!("Marker: missing or ambiguous"),
    }
    match report.latest_value() {
        Some((slot, value)) => {
            let entries = value.as_map().map(|m| m.len()).unwrap_or(0);
            println!("Loader would use slot {slot} ({entries} entries)");
        }
        None => println!("Loader would start from defaults"),
    }
    Ok(())
}

fn slot_row(layout: &StoreLayout, marker: Option<Slot>, report: &SlotReport) -> SlotRow {
    let path = layout.rotation_path(report.slot);
    let status = match &report.status {
        SlotStatus::Missing => "missing".to_string(),
        SlotStatus::Empty => "empty".to_string(),
        SlotStatus::Valid(value) => format!("valid ({})", value.kind()),
        SlotStatus::Invalid(error) => format!("invalid: {error}"),
    };
    let marked = if marker == Some(report.slot) { " *" } else { "" };
    SlotRow {
        slot: format!("{}{marked}", report.slot),
        file: path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string(),
        size: format_size(report.len),
        modified: std::fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map(format_time)
            .unwrap_or_else(|_| "-".to_string()),
        status,
    }
}

fn dump(layout: &StoreLayout, compact: bool) -> Result<(), anyhow::Error> {
    let report = inspect(layout);
    let (slot, value) = report
        .latest_value()
        .ok_or_else(|| anyhow!("no readable rotation file in {}", layout.dir().display()))?;
    debug!("Dumping slot {}", slot);
    let style = if compact { Style::Compact } else { Style::Indented };
    let text = codec::write(value, style);
    if compact {
        println!("{text}");
    } else {
        print!("{text}");
    }
    Ok(())
}

fn read_document(file: &Path) -> Result<Value, anyhow::Error> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    codec::parse(&text).with_context(|| format!("parsing {}", file.display()))
}

fn check(file: &Path) -> Result<(), anyhow::Error> {
    let value = read_document(file)?;
    let entries = value.as_map().map(|m| m.len());
    match entries {
        Some(entries) => println!("✓ {} is valid ({entries} entries)", file.display()),
        None => println!("✓ {} is valid ({} document)", file.display(), value.kind()),
    }
    Ok(())
}

fn fmt(file: &Path, write: bool) -> Result<(), anyhow::Error> {
    let value = read_document(file)?;
    if !write {
        print!("{}", codec::write(&value, Style::Indented));
        return Ok(());
    }
    let snapshot = Snapshot::from_value(Schema::empty(), value)
        .map_err(|e| anyhow!("only settings documents (maps) can be rewritten: {e}"))?;
    SettingsFile::new(file).with_header(None).write(&snapshot)?;
    println!("✓ Rewrote {}", file.display());
    Ok(())
}

fn show_lock(layout: &StoreLayout) -> Result<(), anyhow::Error> {
    let path = layout.lock_path();
    if !path.exists() {
        println!("No lock file at {}", path.display());
        return Ok(());
    }
    match read_owner(&path).with_context(|| format!("reading {}", path.display()))? {
        Some(record) => {
            println!("Lock file: {}", path.display());
            println!("  Handle: {}", record.handle);
            println!("  Token: {}", record.token_string());
        }
        None => println!("Lock file {} holds no complete owner record", path.display()),
    }
    Ok(())
}

fn set(layout: &StoreLayout, config: &PrefStoreConfig, key: &str, value: &str) -> Result<(), anyhow::Error> {
    let key = Key::new(key).map_err(|e| anyhow!("invalid key: {e}"))?;
    let value = codec::parse(value).context("parsing value")?;

    let property = Property::with_key(key, AnyType);
    let schema = Schema::builder().property(&property).build()?;
    let context = SettingsContext::open(layout, &Snapshot::empty(schema), config);

    match context.role() {
        Role::Primary => {}
        Role::Secondary { owner } => {
            context.close();
            bail!("directory is owned by another instance (handle {})", owner.handle);
        }
        Role::Standalone => {
            context.close();
            bail!("cannot take ownership of {}", layout.dir().display());
        }
    }

    let changed = context.persist_value(&property, &value);
    context.close();
    if changed {
        println!("✓ Set {}", property.key());
    } else {
        println!("{} already has that value", property.key());
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_time(time: SystemTime) -> String {
    let local: chrono::DateTime<chrono::Local> = time.into();
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}
