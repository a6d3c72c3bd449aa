use anyhow::Context;
use clap::{Parser, Subcommand};
use lore_search::{
    config::Config,
    search::{IndexOptions, SearchRequest, SearchService},
    state::create_store,
};
use serde_json::json;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lore-search", version)]
#[command(about = "Index and search taxonomy-tagged learning resources", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "LORE_SEARCH_CONFIG")]
    config: Option<String>,

    /// JSON snapshot seeding the resource store
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Index directory
    #[arg(short, long)]
    index_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop every document, reset the mapping and reindex all resources
    RecreateIndex,

    /// Index resources by id, by repository, or all of them
    Index {
        #[arg(value_name = "RESOURCE_ID")]
        ids: Vec<i64>,

        #[arg(short, long)]
        repository: Option<String>,

        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Remove a resource from the index
    Delete {
        #[arg(value_name = "RESOURCE_ID")]
        id: i64,
    },

    /// Search resources
    Search {
        #[arg(default_value = "")]
        text: String,

        #[arg(short, long)]
        repository: Option<String>,

        /// nr_views, nr_attempts, avg_grade, title or relevance; prefix with - for descending
        #[arg(long)]
        sort: Option<String>,

        /// Filter such as vocab_7_exact:70 or run_exact:_missing_
        #[arg(short, long)]
        filter: Vec<String>,

        #[arg(short, long, default_value = "1")]
        page: usize,

        #[arg(long)]
        page_length: Option<usize>,
    },

    /// Show index statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    if let Some(snapshot) = cli.snapshot {
        config.store.snapshot_path = Some(snapshot);
    }
    if let Some(index_path) = cli.index_path {
        config.search.index_path = index_path;
    }

    init_tracing(&config);
    tracing::info!("Starting lore-search v{}", env!("CARGO_PKG_VERSION"));

    let store = create_store(&config.store).context("Failed to initialize resource store")?;
    let service = SearchService::new(&config, store.clone())
        .await
        .context("Search index unavailable")?;

    match cli.command {
        Commands::RecreateIndex => {
            let report = service.rebuild_index().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Index {
            ids,
            repository,
            chunk_size,
        } => {
            let ids = match (ids.is_empty(), repository) {
                (false, _) => ids,
                (true, Some(slug)) => store.resource_ids_for_repository(&slug).await?,
                (true, None) => store.all_resource_ids().await?,
            };

            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted; finishing the current chunk");
                    let _ = cancel_tx.send(true);
                }
            });

            let options = IndexOptions {
                chunk_size,
                cancel: Some(cancel_rx),
            };
            let report = service.indexer().index_resources(ids, options).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Delete { id } => {
            service.delete_resource(id).await?;
            println!("{}", json!({ "deleted": id }));
        }
        Commands::Search {
            text,
            repository,
            sort,
            filter,
            page,
            page_length,
        } => {
            let request = SearchRequest {
                text,
                repository,
                sort_by: sort,
                filters: filter,
                page_length,
            };
            let response = service.search(&request).await?;
            let hits = response.cursor.get_page(page).await?;
            let output = json!({
                "total": response.cursor.count().await?,
                "page": page,
                "page_count": response.cursor.page_count().await?,
                "sort": response.sort,
                "hits": hits,
                "facets": response.facets,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Stats => {
            let stats = service.get_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("lore_search={}", config.observability.log_level).into());
    let json_logs = config.observability.json_logs;

    tracing_subscriber::registry()
        .with(filter)
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}
