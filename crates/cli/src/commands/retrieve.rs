//! `evidex retrieve`: Query collections and print the merged evidence.

use super::RetrieveArgs;
use evidex_config::AppConfig;
use evidex_core::VectorStore;
use evidex_retrieval::{DEFAULT_QUERY_TEMPLATE, RetrievalRequest, RetrievalService};
use std::sync::Arc;

pub async fn run(config: &AppConfig, args: RetrieveArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn VectorStore> = Arc::new(super::chroma(config)?);
    let collections = if args.collections.is_empty() {
        store.collections().await?
    } else {
        args.collections.clone()
    };

    let retrieval = &config.retrieval;
    let template = args
        .query_template
        .clone()
        .or_else(|| retrieval.query_template.clone())
        .unwrap_or_else(|| DEFAULT_QUERY_TEMPLATE.to_string());
    let mut request = RetrievalRequest::new(&args.root_feature, &args.domain, collections)
        .with_template(template)
        .with_limits(
            args.per_collection_limit
                .unwrap_or(retrieval.per_collection_limit),
            args.max_total_results
                .unwrap_or(retrieval.max_total_results),
        );
    for (key, value) in &args.vars {
        request = request.with_extra(key, value);
    }

    let service = RetrievalService::new(store, super::embedder(config)?);
    let result = service.retrieve(&request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("🔎 Query: {}", result.query);
    println!("   {} record(s)\n", result.len());
    print!(
        "{}",
        service.to_prompt_text(
            &result,
            args.max_total_chars.unwrap_or(retrieval.max_total_chars),
            args.max_chunk_chars.unwrap_or(retrieval.max_chunk_chars),
        )
    );
    Ok(())
}
