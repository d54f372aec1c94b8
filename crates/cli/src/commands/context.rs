//! `evidex context`: Render chunk files into a budgeted context block.

use super::ContextArgs;
use evidex_config::AppConfig;
use evidex_context::{ContextManager, load_records};
use evidex_core::BudgetConfig;
use evidex_core::error::ContextError;
use evidex_pipeline::rendered_records;
use tracing::info;

pub async fn run(config: &AppConfig, args: ContextArgs) -> Result<(), Box<dyn std::error::Error>> {
    let files = super::chunk_files(config, &args.files, args.chunks_dir.as_ref())?;
    let records = load_records(&files)?;
    if records.is_empty() {
        return Err(ContextError::EmptyCorpus { files: files.len() }.into());
    }
    let budget = budget_from(&config.context, &args)?;

    let mut manager = ContextManager::new();
    manager.add_initial_context(&records, &budget, &args.title);
    let mut all_records = records;
    for (i, path) in args.delta.iter().enumerate() {
        let delta = load_records(std::slice::from_ref(path))?;
        let title = format!("{} (delta {}, {})", args.title, i + 1, path.display());
        manager.add_delta_context(&delta, &budget, &title);
        all_records.extend(delta);
    }
    let context = manager.full_context();

    let model = args
        .model
        .unwrap_or_else(|| config.services.ollama.llm_model.clone());
    let shown = rendered_records(&all_records, manager.rendered_ids());
    let stats = super::analyzer(config).analyze(&model, &context, Some(&shown), None);

    match &args.out {
        Some(path) => {
            std::fs::write(path, &context)?;
            println!("✅ Wrote {} ({} chars)", path.display(), stats.total_chars);
            super::usage::print_stats(&path.display().to_string(), &stats);
        }
        None => {
            print!("{context}");
            info!(
                chars = stats.total_chars,
                chunks = stats.chunk_count,
                sources = stats.source_count,
                "Context rendered"
            );
        }
    }
    Ok(())
}

/// Config defaults overridden by the command line.
fn budget_from(base: &BudgetConfig, args: &ContextArgs) -> Result<BudgetConfig, ContextError> {
    Ok(BudgetConfig::try_new(
        args.max_total_chars.unwrap_or(base.max_total_chars as i64),
        args.max_chunk_chars.unwrap_or(base.max_chunk_chars as i64),
        args.max_chunks.unwrap_or(base.max_chunk_count as i64),
    )?
    .with_headers(base.include_headers && !args.no_headers)
    .with_metadata(base.include_metadata || args.metadata)
    .with_ordering(args.order.unwrap_or(base.ordering)))
}
