//! # Photo Ingest - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione e override dai flag
//! - Costruzione di asset store e catalogo, avvio del comando richiesto
//!
//! ## Flusso di esecuzione (upload):
//! 1. Parsa gli argomenti CLI (input, collezione o folder, batch width, etc.)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Raccoglie i file dagli input (file e directory)
//! 4. Avvia l'ingestione; Ctrl-C ferma i batch successivi
//! 5. Stampa il riepilogo ("8 of 10 succeeded") e gli asset orfani
//!
//! ## Esempio di utilizzo:
//! ```bash
//! photo-ingest upload ~/shoots/rome --collection rome --batch-width 4
//! photo-ingest reorder rome --positions 2,0,1
//! photo-ingest collections
//! ```

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use portfolio_ingest::collections::catalog::CatalogState;
use portfolio_ingest::collections::NewCollection;
use portfolio_ingest::file_manager::FileManager;
use portfolio_ingest::json_output::JsonMessage;
use portfolio_ingest::{
    AssetStore, AssociationWriter, CatalogStore, CollectionTree, Config, IngestReport, IngestService, JsonCatalog,
    LocalAssetStore, MemoryAssetStore, ProgressSink,
};

#[derive(Parser)]
#[command(name = "photo-ingest")]
#[command(about = "Upload photos to the portfolio asset store and link them to collections")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs)]
struct GlobalArgs {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog file with collections and associations
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Directory backing the asset store
    #[arg(long, global = true)]
    assets: Option<PathBuf>,

    /// Public URL prefix for stored assets
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Root folder on the asset store
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Output progress and results as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Dry run - keep uploads in memory and never write the catalog
    #[arg(long, global = true)]
    dry_run: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Upload files or directories
    Upload {
        /// Files and directories to ingest
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Target collection (id or slug)
        #[arg(short, long, conflicts_with = "folder")]
        collection: Option<String>,

        /// Fixed destination folder, no collection link
        #[arg(short, long)]
        folder: Option<String>,

        /// Files processed concurrently in one batch
        #[arg(short, long)]
        batch_width: Option<usize>,

        /// Byte budget above which files are re-encoded
        #[arg(long)]
        max_bytes: Option<u64>,

        /// Extra upload attempts per file
        #[arg(long)]
        retries: Option<u32>,
    },

    /// Rewrite the order of a collection
    Reorder {
        /// Collection (id or slug)
        collection: String,

        /// Asset ids in the new order
        #[arg(conflicts_with = "positions")]
        assets: Vec<String>,

        /// New order as current positions, e.g. 2,0,1
        #[arg(long, value_delimiter = ',')]
        positions: Option<Vec<usize>>,
    },

    /// Remove a photo from a collection (the asset stays in the store)
    Detach {
        /// Collection (id or slug)
        collection: String,
        asset: String,
    },

    /// Show the collection tree with media totals
    Collections,

    /// Create a collection
    CreateCollection {
        title: String,

        /// Slug used in folder paths (defaults to the lowercased title)
        #[arg(long)]
        slug: Option<String>,

        /// Parent collection (id or slug)
        #[arg(long)]
        parent: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr, stdout resta libero per il JSON)
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if cli.global.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli.global, &cli.command).await?;

    if let Err(e) = run(cli.command, config.clone()).await {
        if config.json_output {
            JsonMessage::error("Command failed".to_string(), Some(format!("{:#}", e))).emit();
        }
        error!("❌ {:#}", e);
        return Err(e);
    }

    Ok(())
}

async fn load_config(global: &GlobalArgs, command: &Command) -> Result<Config> {
    let config_path = global
        .config
        .clone()
        .unwrap_or_else(|| Config::default().catalog_path.with_file_name("config.json"));
    let mut config = Config::from_file(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(catalog) = &global.catalog {
        config.catalog_path = catalog.clone();
    }
    if let Some(assets) = &global.assets {
        config.asset_root = assets.clone();
    }
    if let Some(base_url) = &global.base_url {
        config.asset_base_url = Some(base_url.clone());
    }
    if let Some(namespace) = &global.namespace {
        config.namespace = namespace.clone();
    }
    config.json_output |= global.json;
    config.dry_run |= global.dry_run;

    if let Command::Upload {
        batch_width,
        max_bytes,
        retries,
        ..
    } = command
    {
        if let Some(width) = batch_width {
            config.batch_width = *width;
        }
        if let Some(bytes) = max_bytes {
            config.byte_budget = *bytes;
        }
        if let Some(retries) = retries {
            config.upload_retries = *retries;
        }
    }

    config.validate()?;
    Ok(config)
}

async fn open_catalog(config: &Config) -> Result<Arc<JsonCatalog>> {
    if !config.dry_run {
        let catalog = JsonCatalog::open(&config.catalog_path)
            .await
            .with_context(|| format!("Failed to open catalog {}", config.catalog_path.display()))?;
        return Ok(Arc::new(catalog));
    }

    // Dry run: stato letto dal file, modifiche solo in memoria
    let state = if config.catalog_path.exists() {
        let content = tokio::fs::read_to_string(&config.catalog_path).await?;
        serde_json::from_str::<CatalogState>(&content)?
    } else {
        CatalogState::default()
    };
    Ok(Arc::new(JsonCatalog::with_state(state)))
}

async fn run(command: Command, config: Config) -> Result<()> {
    let catalog = open_catalog(&config).await?;

    match command {
        Command::Upload {
            inputs,
            collection,
            folder,
            ..
        } => upload(config, catalog, inputs, collection, folder).await,
        Command::Reorder {
            collection,
            assets,
            positions,
        } => {
            let tree = CollectionTree::build(catalog.collections().await?)?;
            let node = tree.find(&collection)?;
            let writer = AssociationWriter::from_config(catalog.clone(), &config);

            let reordered = match positions {
                Some(positions) => writer.reorder_by_positions(&node.id, &positions).await?,
                None => writer.reorder(&node.id, &assets).await?,
            };

            if config.json_output {
                println!("{}", serde_json::to_string(&reordered)?);
            } else {
                for association in &reordered {
                    println!("{:>4}  {}", association.order, association.asset_id);
                }
            }
            Ok(())
        }
        Command::Detach { collection, asset } => {
            let tree = CollectionTree::build(catalog.collections().await?)?;
            let node = tree.find(&collection)?;
            let writer = AssociationWriter::from_config(catalog.clone(), &config);
            if !writer.detach(&node.id, &asset).await? {
                warn!("⚠️ Asset {} is not linked to {}", asset, node.slug);
            }
            Ok(())
        }
        Command::Collections => show_collections(&config, catalog.as_ref()).await,
        Command::CreateCollection { title, slug, parent } => {
            let parent_id = match parent {
                Some(parent) => {
                    let tree = CollectionTree::build(catalog.collections().await?)?;
                    Some(tree.find(&parent)?.id.clone())
                }
                None => None,
            };
            let slug = slug.unwrap_or_else(|| title.trim().to_lowercase().replace(char::is_whitespace, "-"));
            let node = catalog
                .create_collection(NewCollection {
                    title,
                    slug,
                    parent_id,
                })
                .await?;

            if config.json_output {
                println!("{}", serde_json::to_string(&node)?);
            } else {
                info!("✅ Created collection {} ({})", node.slug, node.id);
            }
            Ok(())
        }
    }
}

async fn upload(
    config: Config,
    catalog: Arc<JsonCatalog>,
    inputs: Vec<PathBuf>,
    collection: Option<String>,
    folder: Option<String>,
) -> Result<()> {
    let paths = FileManager::collect_inputs(&inputs)?;
    if paths.is_empty() {
        info!("No files found to ingest");
        return Ok(());
    }
    let files = FileManager::load_all(&paths).await?;

    let store: Arc<dyn AssetStore> = if config.dry_run {
        info!("Dry run mode: uploads are kept in memory");
        Arc::new(MemoryAssetStore::new())
    } else {
        Arc::new(LocalAssetStore::new(&config.asset_root, config.asset_base_url.clone()))
    };

    // Ctrl-C: i batch già avviati terminano, i successivi non partono
    let (stop_sender, _) = broadcast::channel(1);
    let signal_sender = stop_sender.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received, finishing current batch");
            let _ = signal_sender.send(());
        }
    });

    let sink = if config.json_output {
        ProgressSink::Json
    } else {
        ProgressSink::Bar
    };
    let service = IngestService::new(&config, store, catalog.clone())
        .with_cancellation(stop_sender)
        .with_progress_sink(sink);

    let accepted = files.iter().filter(|f| f.is_image()).count();
    let skipped: Vec<String> = files.iter().filter(|f| !f.is_image()).map(|f| f.name.clone()).collect();

    let report = match (collection, folder) {
        (Some(collection), _) => {
            let tree = CollectionTree::build(catalog.collections().await?)?;
            let node = tree.find(&collection)?;
            let destination = tree.folder_path(config.namespace(), &node.id)?;
            if config.json_output {
                JsonMessage::start(destination, accepted, skipped, config.batch_width).emit();
            }
            service.ingest_into_collection(&node.id, files).await?
        }
        (None, Some(folder)) => {
            if config.json_output {
                JsonMessage::start(folder.clone(), accepted, skipped, config.batch_width).emit();
            }
            service.upload_to_folder(&folder, files).await?
        }
        (None, None) => anyhow::bail!("Either --collection or --folder is required"),
    };

    print_report(&config, &report);

    if report.succeeded() < report.total() || !report.association_failures.is_empty() {
        anyhow::bail!("{}", report.summary());
    }
    Ok(())
}

fn print_report(config: &Config, report: &IngestReport) {
    if config.json_output {
        report.emit_json();
        return;
    }

    let stats = report.stats();
    info!("=== Ingestion Complete ===");
    info!("{}", report.summary());
    info!("{}", stats.format_summary());
    if report.linked {
        info!("Associations created: {}", report.associations.len());
    }

    for failed in report.failed_files() {
        warn!("  ✗ {}", failed);
    }

    let orphaned = report.orphaned_assets();
    if !orphaned.is_empty() {
        warn!("⚠️ {} uploaded assets are not linked to any collection:", orphaned.len());
        for asset in orphaned {
            warn!("  • {} ({})", asset.id, asset.url);
        }
    }

    if report.cancelled {
        warn!("⚠️ Run was cancelled before all files were processed");
    }
}

async fn show_collections(config: &Config, catalog: &dyn CatalogStore) -> Result<()> {
    let tree = CollectionTree::build(catalog.collections().await?)?;
    let totals = tree.media_totals(&catalog.all_associations().await?);

    if config.json_output {
        let nodes: Vec<_> = tree
            .preorder()
            .into_iter()
            .map(|node| {
                serde_json::json!({
                    "id": node.id,
                    "title": node.title,
                    "slug": node.slug,
                    "parent_id": node.parent_id,
                    "depth": tree.depth(&node.id),
                    "folder": tree.folder_path(config.namespace(), &node.id).ok(),
                    "media_total": totals.get(&node.id).copied().unwrap_or(0),
                })
            })
            .collect();
        println!("{}", serde_json::to_string(&nodes)?);
        return Ok(());
    }

    if tree.is_empty() {
        println!("No collections yet");
        return Ok(());
    }

    for node in tree.preorder() {
        let indent = "  ".repeat(tree.depth(&node.id).unwrap_or(0));
        println!(
            "{}{} ({}) [{}]",
            indent,
            node.title,
            node.slug,
            totals.get(&node.id).copied().unwrap_or(0)
        );
    }
    Ok(())
}

