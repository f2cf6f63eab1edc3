// CFDI Catalog - command line interface
//
// Imports catalog workbooks into the SQLite store and matches CFDI invoices
// against it.

use anyhow::{Context, Result};
use cfdi_catalog::db::recent_imports;
use cfdi_catalog::{AppConfig, CatalogImporter, IngestOptions, InvoiceMatcher, Store};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// CFDI catalog ingestion and invoice matching
#[derive(Parser)]
#[command(name = "cfdi-catalog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to the SQLite catalog (overrides CFDI_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog schema
    Init,

    /// Import catalog workbooks (.xlsx files or directories of per-sheet CSVs)
    Import {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,

        /// Per-document time budget in seconds (overrides CFDI_INGEST_TIMEOUT_SECS)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Match a CFDI invoice against the supplier catalog
    Invoice {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// List the line items of one contract
    LineItems {
        contract: String,

        #[arg(long)]
        json: bool,
    },

    /// Show recent imports
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = AppConfig::from_env().with_database_path(cli.db);

    match cli.command {
        Commands::Init => run_init(&config),
        Commands::Import {
            paths,
            json,
            timeout_secs,
        } => run_import(config.with_ingest_timeout_secs(timeout_secs), &paths, json),
        Commands::Invoice { file, json } => run_invoice(&config, &file, json),
        Commands::LineItems { contract, json } => run_line_items(&config, &contract, json),
        Commands::History { limit } => run_history(&config, limit),
    }
}

fn open_store(config: &AppConfig) -> Result<Store> {
    Store::open(&config.database_path)
        .with_context(|| format!("cannot open catalog at {}", config.database_path.display()))
}

fn run_init(config: &AppConfig) -> Result<()> {
    open_store(config)?;
    println!("✓ Catalog ready at {}", config.database_path.display());
    Ok(())
}

fn run_import(config: AppConfig, paths: &[PathBuf], json: bool) -> Result<()> {
    let store = open_store(&config)?;
    let importer = CatalogImporter::new(store).with_options(IngestOptions {
        deadline: config.ingest_timeout,
    });

    let batch = importer.ingest_paths(paths);

    if json {
        println!("{}", serde_json::to_string_pretty(&batch.summaries())?);
    } else {
        println!("📂 Catalog import");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        print!("{}", batch);
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!(
            "{} document(s): {} imported, {} failed",
            batch.documents.len(),
            batch.documents.len() - batch.failed_count(),
            batch.failed_count()
        );
    }

    if batch.failed_count() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_invoice(config: &AppConfig, file: &Path, json: bool) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("cannot read {}", file.display()))?;
    let matcher = InvoiceMatcher::new(open_store(config)?);

    let matched = matcher.process_invoice(&bytes)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&matched)?);
        return Ok(());
    }

    println!("🧾 Issuer RFC: {}", matched.issuer_rfc);
    if let Some(name) = &matched.issuer.legal_name {
        println!("   Legal name: {}", name);
    }
    println!("\n📄 Candidate contracts ({}):", matched.contracts.len());
    for contract in &matched.contracts {
        println!("   • {}", contract);
    }
    Ok(())
}

fn run_line_items(config: &AppConfig, contract: &str, json: bool) -> Result<()> {
    let matcher = InvoiceMatcher::new(open_store(config)?);
    let items = matcher.line_items(contract)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    println!("📑 Line items for {}:", contract.trim());
    for item in &items {
        println!(
            "   {:<12} {}",
            item.line_item_code,
            item.short_description.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn run_history(config: &AppConfig, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let conn = store.connect()?;
    let imports = recent_imports(&conn, limit)?;

    if imports.is_empty() {
        println!("No imports recorded yet");
        return Ok(());
    }

    for record in &imports {
        println!(
            "{}  {}  {}  {}",
            record.imported_at.format("%Y-%m-%d %H:%M:%S"),
            &record.sha256[..record.sha256.len().min(12)],
            record.file_name,
            record.counts
        );
    }
    Ok(())
}
