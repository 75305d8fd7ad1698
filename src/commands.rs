use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::chat::ChatEngine;
use crate::completion::CompletionClient;
use crate::config::Config;
use crate::retrieval::store::PassageRecord;
use crate::retrieval::{EmbeddingClient, PassageStore, VectorRetriever};
use crate::session::SessionContext;
use crate::storage::open_store;
use crate::ui;

/// Start one guest chat session in the terminal.
#[inline]
pub async fn run_chat(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir)?;

    let store = open_store(&config.database)?;
    let embedder = EmbeddingClient::new(&config.embedding)?;
    let passage_store = PassageStore::new(config.vector_database_path()).await?;
    let retriever = Arc::new(VectorRetriever::new(embedder, passage_store));
    let completion = Arc::new(CompletionClient::new(&config.completion)?);

    let engine = ChatEngine::new(store, retriever, completion, &config.app, &config.retrieval);
    let mut ctx = SessionContext::new(config.retrieval.buffer_capacity);

    ui::run(&config.app, &engine, &mut ctx).await?;
    Ok(())
}

/// Index reference documents from a directory into the passage store.
#[inline]
pub async fn ingest(config_dir: &Path, data_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir)?;

    let embedder = EmbeddingClient::new(&config.embedding)?;
    embedder
        .ping()
        .context("Embedding server is not reachable")?;

    let mut store = PassageStore::new(config.vector_database_path()).await?;

    let files = collect_document_files(data_dir)?;
    if files.is_empty() {
        println!("No .txt or .md documents found in {}", data_dir.display());
        return Ok(());
    }

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .context("Invalid progress template")?,
    );

    let mut total_passages = 0;
    for file in &files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        progress.set_message(name.clone());

        let text = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read document: {}", file.display()))?;
        let passages = split_passages(&text);
        if passages.is_empty() {
            progress.inc(1);
            continue;
        }

        let embedder = embedder.clone();
        let texts = passages.clone();
        let vectors = tokio::task::spawn_blocking(move || embedder.generate_embeddings_batch(&texts))
            .await
            .context("Embedding task panicked")?
            .with_context(|| format!("Failed to embed passages from {}", file.display()))?;

        let records: Vec<PassageRecord> = passages
            .into_iter()
            .zip(vectors)
            .map(|(content, vector)| PassageRecord {
                id: Uuid::new_v4().to_string(),
                vector,
                content,
                source: name.clone(),
            })
            .collect();

        total_passages += records.len();
        store.add_passages(records).await?;
        progress.inc(1);
    }
    progress.finish_and_clear();

    info!("Ingest complete: {} passages", total_passages);
    println!(
        "Indexed {} passages from {} documents",
        total_passages,
        files.len()
    );
    Ok(())
}

/// Print a guest's persisted transcript in submission order.
#[inline]
pub async fn show_history(config_dir: &Path, guest_id: &str) -> Result<()> {
    let config = Config::load(config_dir)?;
    let store = open_store(&config.database)?;

    let history = store.history(guest_id).await?;
    if history.is_empty() {
        println!("No messages found for guest {guest_id}");
        return Ok(());
    }

    for message in history {
        println!(
            "{} {} {}",
            style(message.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            style(format!("[{}]", message.role)).bold(),
            message.content
        );
    }
    Ok(())
}

/// Print the resolved configuration with secrets masked.
#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("App:").bold().yellow());
    eprintln!("  Name: {}", style(&config.app.name).cyan());
    eprintln!("  Website: {}", style(&config.app.website).cyan());
    eprintln!("  Icon: {}", config.app.icon);

    eprintln!("{}", style("Database:").bold().yellow());
    match &config.database.url {
        Some(url) => eprintln!("  URL: {}", style(mask(url)).cyan()),
        None => {
            eprintln!("  Host: {}", style(&config.database.host).cyan());
            eprintln!("  User: {}", style(&config.database.user).cyan());
            eprintln!("  Password: {}", style("********").dim());
            eprintln!("  Name: {}", style(&config.database.name).cyan());
        }
    }

    eprintln!("{}", style("Completion:").bold().yellow());
    eprintln!("  Model: {}", style(&config.completion.model).cyan());
    eprintln!("  Base URL: {}", style(&config.completion.base_url).cyan());
    eprintln!("  API key: {}", style(mask(&config.completion.api_key)).dim());

    eprintln!("{}", style("Embedding:").bold().yellow());
    eprintln!(
        "  Server: {}://{}:{}",
        config.embedding.protocol, config.embedding.host, config.embedding.port
    );
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());

    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  Results: {}", config.retrieval.num_results);
    eprintln!("  Buffer capacity: {}", config.retrieval.buffer_capacity);

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config_dir.join("config.toml").display()).dim()
    );
    Ok(())
}

fn collect_document_files(data_dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let entries = std::fs::read_dir(data_dir)
        .with_context(|| format!("Failed to read data directory: {}", data_dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_document = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("md"));
        if path.is_file() && is_document {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Split a document into passages on blank lines.
fn split_passages(text: &str) -> Vec<String> {
    let mut passages = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                passages.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        passages.push(current.join("\n"));
    }

    passages
}

fn mask(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        let prefix: String = secret.chars().take(4).collect();
        format!("{prefix}****")
    }
}
