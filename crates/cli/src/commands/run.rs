//! `evidex run`: Run a generation pipeline and write its artifacts.

use super::{CorpusArgs, RunCommand, TaskArgs};
use crate::artifacts;
use evidex_config::AppConfig;
use evidex_core::{EventBus, RunEvent, VectorStore};
use evidex_pipeline::prompt::{
    ITERATIVE_INITIAL_TEMPLATE, ITERATIVE_TEMPLATE, RETRIEVAL_TEMPLATE, SINGLE_SHOT_TEMPLATE,
};
use evidex_pipeline::{
    EvidenceLimits, IterativePipeline, RetrievalPipeline, RunReport, SingleShotPipeline, Task,
    load_template,
};
use evidex_retrieval::{Indexer, RetrievalService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

pub async fn run(config: &AppConfig, command: RunCommand) -> Result<(), Box<dyn std::error::Error>> {
    let events = Arc::new(EventBus::default());
    spawn_event_logger(&events);

    let (report, out) = match command {
        RunCommand::SingleShot {
            task,
            corpus,
            no_widen,
        } => {
            let settings = &config.pipelines.single_shot;
            let files = files(config, &corpus)?;
            let template = load_template(
                task.prompt.as_deref().or(settings.prompt_template.as_deref()),
                SINGLE_SHOT_TEMPLATE,
            )?;
            let pipeline = SingleShotPipeline::new(
                super::generator(config, task.model.as_deref())?,
                super::analyzer(config),
            )
            .with_budget(settings.budget.clone())
            .with_widening(settings.widen_from_model && !no_widen)
            .with_temperature(task.temperature.unwrap_or(settings.temperature))
            .with_template(template)
            .with_events(events.clone());

            println!("🚀 single-shot over {} file(s)", files.len());
            (pipeline.run(&task_of(&task), &files).await?, task.out)
        }

        RunCommand::Iterative {
            task,
            corpus,
            next_prompt,
        } => {
            let settings = &config.pipelines.iterative;
            let files = files(config, &corpus)?;
            let (initial, iterative) = iterative_templates(
                task.prompt.as_deref().or(settings.prompt_template.as_deref()),
                next_prompt.as_deref(),
            )?;
            let pipeline = IterativePipeline::new(
                super::generator(config, task.model.as_deref())?,
                super::analyzer(config),
            )
            .with_budget(settings.budget.clone())
            .with_temperature(task.temperature.unwrap_or(settings.temperature))
            .with_templates(initial, iterative)
            .with_events(events.clone());

            println!("🚀 iterative over {} file(s)", files.len());
            (pipeline.run(&task_of(&task), &files).await?, task.out)
        }

        RunCommand::Rag {
            task,
            collections,
            iterative,
            next_prompt,
            store,
            index,
            corpus,
        } => {
            let retrieval = &config.retrieval;
            let store = super::store(config, store)?;
            let embedder = super::embedder(config)?;

            let collections = if index {
                let files = files(config, &corpus)?;
                let mode = super::collection_mode(config)?;
                let report = Indexer::new(store.clone(), embedder.clone())
                    .with_batch_size(config.vectorization.batch_size)
                    .with_prefix(&config.vectorization.prefix)
                    .with_embed_model(&config.services.ollama.embed_model)
                    .index_files(&files, &mode)
                    .await?;
                super::index::print_report(&report);
                if collections.is_empty() {
                    mode.collections_for(&files, &config.vectorization.prefix)
                } else {
                    collections
                }
            } else if collections.is_empty() {
                store.collections().await?
            } else {
                collections
            };

            let service = RetrievalService::new(store, embedder).with_events(events.clone());
            let mut pipeline = RetrievalPipeline::new(
                service,
                super::generator(config, task.model.as_deref())?,
                super::analyzer(config),
            )
            .with_limits(EvidenceLimits {
                per_collection_limit: retrieval.per_collection_limit,
                max_total_results: retrieval.max_total_results,
                max_total_chars: retrieval.max_total_chars,
                max_chunk_chars: retrieval.max_chunk_chars,
            })
            .with_temperature(task.temperature.unwrap_or(retrieval.temperature))
            .with_events(events.clone());
            if let Some(template) = &retrieval.query_template {
                pipeline = pipeline.with_query_template(template);
            }

            let prompt = task.prompt.as_deref().or(retrieval.prompt_template.as_deref());
            let report = if iterative {
                let (initial, later) = iterative_templates(prompt, next_prompt.as_deref())?;
                pipeline = pipeline.with_iterative_templates(initial, later);
                println!("🚀 rag (iterative) over {} collection(s)", collections.len());
                pipeline.run_iterative(&task_of(&task), &collections).await?
            } else {
                pipeline = pipeline.with_template(load_template(prompt, RETRIEVAL_TEMPLATE)?);
                println!("🚀 rag over {} collection(s)", collections.len());
                pipeline.run_single(&task_of(&task), &collections).await?
            };
            (report, task.out)
        }
    };

    let out_dir = out.unwrap_or_else(|| config.data.output_dir.clone());
    let written = artifacts::write_run(&out_dir, &report)?;
    print_summary(&report, &written, &out_dir);
    Ok(())
}

fn files(config: &AppConfig, corpus: &CorpusArgs) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    Ok(super::chunk_files(config, &corpus.files, corpus.chunks_dir.as_ref())?)
}

fn task_of(args: &TaskArgs) -> Task {
    args.vars.iter().fold(
        Task::new(&args.root_feature, &args.domain),
        |task, (key, value)| task.with_value(key, value),
    )
}

/// A single template file serves every step unless a second one is given.
fn iterative_templates(
    first: Option<&Path>,
    later: Option<&Path>,
) -> Result<(String, String), Box<dyn std::error::Error>> {
    let initial = load_template(first, ITERATIVE_INITIAL_TEMPLATE)?;
    let iterative = match (first, later) {
        (_, Some(path)) => load_template(Some(path), ITERATIVE_TEMPLATE)?,
        (Some(_), None) => initial.clone(),
        (None, None) => ITERATIVE_TEMPLATE.to_string(),
    };
    Ok((initial, iterative))
}

fn spawn_event_logger(events: &Arc<EventBus>) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    debug!(missed, "Event logger lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match event.as_ref() {
                RunEvent::ErrorOccurred { .. } | RunEvent::CollectionSkipped { .. } => {
                    warn!(?event, "Run event")
                }
                _ => debug!(?event, "Run event"),
            }
        }
    });
}

fn print_summary(report: &RunReport, written: &artifacts::Artifacts, out_dir: &Path) {
    let usage = &report.usage;
    println!();
    println!("✅ {} finished ({} ms in the model)", report.pipeline, report.llm_duration_ms);
    println!("─────────────────────────────────────");
    println!("  Model:     {}", report.model);
    println!("  Sources:   {}", report.sources.len());
    println!(
        "  Records:   {} rendered of {}",
        usage.chunk_count, report.records_total
    );
    println!(
        "  Context:   {} chars (~{} tokens)",
        usage.total_chars, usage.estimated_tokens
    );
    if usage.max_chars > 0 {
        println!("  Budget:    {:.1}% of the model window", usage.char_utilization * 100.0);
    }
    if let Some(query) = &report.query {
        println!("  Query:     {}", query.replace('\n', " "));
    }
    for it in &report.iterations {
        println!(
            "    iter {:>2}: {} new record(s) from {} ({} ms)",
            it.index, it.fresh_records, it.source, it.duration_ms
        );
    }
    println!();
    println!("  Run id:    {}", written.run_id);
    println!("  Artifacts: {} file(s) in {}", written.files.len(), out_dir.display());
    if let Some(output) = written.output_path() {
        println!("  Output:    {}", output.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_template_serves_every_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fm.txt");
        std::fs::write(&path, "{{PREVIOUS_FM_XML}} {{DELTA_CONTEXT}}").unwrap();

        let (initial, later) = iterative_templates(Some(&path), None).unwrap();
        assert_eq!(initial, later);

        let (initial, later) = iterative_templates(None, None).unwrap();
        assert_eq!(initial, ITERATIVE_INITIAL_TEMPLATE);
        assert_eq!(later, ITERATIVE_TEMPLATE);
    }

    #[test]
    fn vars_become_task_values() {
        let args = TaskArgs {
            root_feature: "Editor".into(),
            domain: "tools".into(),
            model: None,
            prompt: None,
            vars: vec![("XSD_METAMODEL".into(), "<xs/>".into())],
            temperature: None,
            out: None,
        };
        let task = task_of(&args);
        assert_eq!(task.extra.get("XSD_METAMODEL").map(String::as_str), Some("<xs/>"));
    }
}
