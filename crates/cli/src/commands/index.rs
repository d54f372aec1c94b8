//! `evidex index`: Embed chunk files into vector-store collections.

use super::IndexArgs;
use evidex_config::AppConfig;
use evidex_core::VectorStore;
use evidex_retrieval::{IndexReport, Indexer};
use std::sync::Arc;

pub async fn run(config: &AppConfig, args: IndexArgs) -> Result<(), Box<dyn std::error::Error>> {
    let files = super::chunk_files(config, &args.files, args.chunks_dir.as_ref())?;
    let mode = match args.mode {
        Some(mode) => mode,
        None => super::collection_mode(config)?,
    };
    let store: Arc<dyn VectorStore> = Arc::new(super::chroma(config)?);
    let embedder = super::embedder(config)?;

    println!("📥 Indexing {} file(s) into {}", files.len(), store.name());
    let indexer = Indexer::new(store, embedder)
        .with_batch_size(args.batch_size.unwrap_or(config.vectorization.batch_size))
        .with_prefix(
            args.prefix
                .unwrap_or_else(|| config.vectorization.prefix.clone()),
        )
        .with_embed_model(&config.services.ollama.embed_model);
    let report = indexer.index_files(&files, &mode).await?;
    print_report(&report);
    Ok(())
}

pub fn print_report(report: &IndexReport) {
    println!("─────────────────────────────────────");
    for c in &report.collections {
        let status = if c.failed == 0 { "✅" } else { "⚠️ " };
        println!(
            "  {status} {:<32} {:>6} added {:>6} failed",
            c.collection, c.added, c.failed
        );
    }
    println!();
    println!(
        "  {} file(s) · {} chunk(s) added · {} failed · {} malformed skipped",
        report.files,
        report.added(),
        report.failed(),
        report.skipped
    );
}
