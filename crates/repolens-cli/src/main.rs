//! RepoLens CLI
//!
//! Thin driver over the core: triggers sync passes, renders their progress
//! events, and runs queries. All indexing and ranking logic lives in
//! `repolens-search`; this binary only maps configuration and output.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use repolens_config::{ConfigLoader, RepolensConfig};
use repolens_core::{CloneProbe, StateStore};
use repolens_search::{
    EmbeddingConfig, GithubConfig, GithubProvider, HttpEmbeddingProvider, HybridQueryEngine,
    MatchedField, QdrantConfig, QdrantIndex, RepoAction, SchedulerConfig, ScoringConfig,
    SearchMode, SearchQuery, StateHandle, SyncConfig, SyncEngine, SyncEvent,
};

#[derive(Parser)]
#[command(
    name = "repolens",
    version,
    about = "Semantic index and hybrid search over your remote repositories"
)]
struct Cli {
    /// Extra config file merged over the global and local ones
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synchronize the local index with the remote provider
    Sync,
    /// Query the index
    Search {
        /// Query text
        query: String,
        /// Search mode
        #[arg(long, value_enum, default_value = "hybrid")]
        mode: ModeArg,
        /// Maximum number of results
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
    /// Show index status
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Keyword,
    Semantic,
    Hybrid,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Keyword => SearchMode::Keyword,
            ModeArg::Semantic => SearchMode::Semantic,
            ModeArg::Hybrid => SearchMode::Hybrid,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    match cli.command {
        Command::Sync => run_sync(&config).await,
        Command::Search { query, mode, limit } => {
            run_search(&config, &query, mode.into(), limit).await
        }
        Command::Status => run_status(&config),
    }
}

fn load_config(extra: Option<&std::path::Path>) -> anyhow::Result<RepolensConfig> {
    let loader = match extra {
        Some(path) => ConfigLoader::with_paths(None, Some(path.to_path_buf())),
        None => ConfigLoader::new(),
    };
    loader.load().context("Failed to load configuration")
}

fn embedding_provider(config: &RepolensConfig) -> anyhow::Result<Arc<HttpEmbeddingProvider>> {
    let settings = &config.embedding;
    let api_key = std::env::var(&settings.api_key_env).ok();

    let mut provider_config = EmbeddingConfig::new(
        settings.base_url.clone(),
        settings.model.clone(),
        settings.dimension,
    )
    .with_max_retries(settings.max_retries);
    provider_config.requests_per_second = settings.requests_per_second;
    if let Some(key) = api_key {
        provider_config = provider_config.with_api_key(key);
    }

    Ok(Arc::new(HttpEmbeddingProvider::new(provider_config)?))
}

async fn vector_index(config: &RepolensConfig) -> anyhow::Result<Arc<QdrantIndex>> {
    let mut qdrant_config =
        QdrantConfig::with_url(config.qdrant.url.clone(), config.embedding.dimension as u64);
    if let Some(env) = &config.qdrant.api_key_env {
        qdrant_config.api_key = std::env::var(env).ok();
    }

    let index = QdrantIndex::connect(qdrant_config)
        .await
        .context("Failed to connect to the vector store")?;
    Ok(Arc::new(index))
}

fn clone_probe(config: &RepolensConfig) -> CloneProbe {
    CloneProbe::new(
        config
            .github
            .repos_base_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("")),
    )
}

async fn run_sync(config: &RepolensConfig) -> anyhow::Result<()> {
    let token = std::env::var(&config.github.token_env).with_context(|| {
        format!(
            "GitHub token not found in ${} (see [github].token_env)",
            config.github.token_env
        )
    })?;

    let metadata = Arc::new(GithubProvider::new(
        GithubConfig::new(token).with_base_url(config.github.base_url.clone()),
    )?);
    let provider = embedding_provider(config)?;
    let index = vector_index(config).await?;

    let engine = SyncEngine::load(
        metadata,
        provider,
        index,
        clone_probe(config),
        StateStore::new(config.storage.state_path()),
        SyncConfig {
            scheduler: SchedulerConfig {
                batch_size: config.embedding.batch_size,
                concurrency: config.embedding.concurrency,
            },
            readme_concurrency: 8,
        },
    )
    .context("Failed to load sync state")?;

    let mut events = engine.subscribe();
    let progress = tokio::spawn(async move {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .expect("static template is valid"),
        );

        while let Some(event) = events.recv().await {
            match event {
                SyncEvent::Started => bar.set_message("Fetching repository list..."),
                SyncEvent::Repo(outcome) => {
                    let verb = match outcome.action {
                        RepoAction::Embedded => "embedded",
                        RepoAction::Reused => "reused",
                        RepoAction::MetadataOnly => "metadata only",
                        RepoAction::Removed => "removed",
                    };
                    match outcome.error {
                        Some(error) => {
                            bar.println(format!("  {} ({}): {}", outcome.repo_id, verb, error))
                        }
                        None => bar.set_message(format!("{} {}", verb, outcome.repo_id)),
                    }
                    bar.tick();
                }
                SyncEvent::Completed(_) => bar.finish_and_clear(),
            }
        }
    });

    let summary = engine.run_pass().await.context("Sync pass failed")?;
    let _ = progress.await;

    println!(
        "Synced {} repositories: {} added, {} modified, {} removed, {} unchanged",
        summary.total, summary.added, summary.modified, summary.removed, summary.unchanged
    );
    println!(
        "Embeddings: {} generated, {} reused",
        summary.embedded, summary.reused
    );
    if summary.has_failures() {
        println!("Failed ({}):", summary.failed.len());
        for repo_id in &summary.failed {
            println!("  {}", repo_id);
        }
    }

    Ok(())
}

async fn run_search(
    config: &RepolensConfig,
    query: &str,
    mode: SearchMode,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let state = StateStore::new(config.storage.state_path())
        .load()
        .context("Failed to load sync state (run `repolens sync` first)")?;

    if state.is_empty() {
        println!("The index is empty. Run `repolens sync` first.");
        return Ok(());
    }

    let provider = embedding_provider(config)?;
    let index = vector_index(config).await?;

    let engine = HybridQueryEngine::new(
        provider,
        index,
        StateHandle::new(state),
        ScoringConfig {
            semantic_weight: config.search.semantic_weight,
            keyword_weight: config.search.keyword_weight,
            semantic_threshold: config.search.semantic_threshold,
            min_semantic_len: config.search.min_semantic_len,
        },
    );

    let limit = limit.unwrap_or(config.search.limit);
    let results = engine
        .search(&SearchQuery::new(query, mode), limit)
        .await
        .context("Query failed")?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let fields: Vec<&str> = result
            .matched_fields
            .iter()
            .map(|f| match f {
                MatchedField::Name => "name",
                MatchedField::Description => "description",
                MatchedField::Topic => "topic",
            })
            .collect();

        let mut parts = Vec::new();
        if let Some(kw) = result.keyword_score {
            parts.push(format!("kw {:.2}", kw));
        }
        if let Some(sem) = result.semantic_score {
            parts.push(format!("sem {:.2}", sem));
        }
        if !fields.is_empty() {
            parts.push(format!("via {}", fields.join(",")));
        }

        println!(
            "{:>3}. {:.3}  {}  [{}]",
            rank + 1,
            result.score,
            result.repo_id,
            parts.join(", ")
        );
    }

    Ok(())
}

fn run_status(config: &RepolensConfig) -> anyhow::Result<()> {
    let state = StateStore::new(config.storage.state_path())
        .load()
        .context("Failed to load sync state")?;

    let embedded = state
        .repos
        .values()
        .filter(|entry| entry.has_fresh_embedding())
        .count();
    let local = state
        .repos
        .values()
        .filter(|entry| entry.snapshot.local_path.is_some())
        .count();

    println!("Repositories: {}", state.len());
    println!("  with fresh embedding: {}", embedded);
    println!("  with local clone:     {}", local);
    match state.last_synced_at {
        Some(at) => println!("Last synced: {}", at.to_rfc3339()),
        None => println!("Last synced: never"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_args() {
        let cli = Cli::parse_from(["repolens", "search", "distributed systems", "-n", "5"]);
        match cli.command {
            Command::Search { query, limit, .. } => {
                assert_eq!(query, "distributed systems");
                assert_eq!(limit, Some(5));
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn test_mode_arg_maps() {
        assert_eq!(SearchMode::from(ModeArg::Keyword), SearchMode::Keyword);
        assert_eq!(SearchMode::from(ModeArg::Hybrid), SearchMode::Hybrid);
    }
}
