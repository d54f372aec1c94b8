//! `evidex doctor`: Check chunk files and service connectivity.

use evidex_config::AppConfig;
use evidex_context::{list_chunk_files, load_records};
use evidex_core::VectorStore;
use evidex_providers::OllamaGenerator;

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 evidex doctor");
    println!("================\n");

    let mut issues = 0;

    // Chunk files
    match list_chunk_files(&config.data.chunks_dir) {
        Ok(files) => match load_records(&files) {
            Ok(records) if records.is_empty() => {
                println!(
                    "  ⚠️  {} chunk file(s) but no usable records",
                    files.len()
                );
                issues += 1;
            }
            Ok(records) => println!(
                "  ✅ {} chunk file(s), {} record(s) in {}",
                files.len(),
                records.len(),
                config.data.chunks_dir.display()
            ),
            Err(e) => {
                println!("  ❌ {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    // Ollama
    let ollama = &config.services.ollama;
    match OllamaGenerator::from_config(ollama) {
        Ok(generator) => match generator.list_models().await {
            Ok(models) => {
                println!("  ✅ Ollama reachable at {}", generator.host());
                for wanted in [&ollama.llm_model, &ollama.embed_model] {
                    if models.iter().any(|m| model_matches(m, wanted)) {
                        println!("  ✅ Model available: {wanted}");
                    } else {
                        println!("  ⚠️  Model not pulled: {wanted} (run `ollama pull {wanted}`)");
                        issues += 1;
                    }
                }
            }
            Err(e) => {
                println!("  ❌ Ollama: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Ollama client: {e}");
            issues += 1;
        }
    }

    // Chroma
    match super::chroma(config) {
        Ok(store) => match store.collections().await {
            Ok(collections) => println!(
                "  ✅ Chroma reachable at {} ({} collection(s))",
                store.base_url(),
                collections.len()
            ),
            Err(e) => {
                println!("  ⚠️  Chroma: {e} (only needed for `index` and `run rag`)");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Chroma client: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

/// Ollama lists `name:tag`; a bare name means `:latest`.
fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted || (!wanted.contains(':') && installed == format!("{wanted}:latest"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_matches_latest_tag() {
        assert!(model_matches("nomic-embed-text:latest", "nomic-embed-text"));
        assert!(model_matches("llama3.1:8b", "llama3.1:8b"));
        assert!(!model_matches("llama3.1:70b", "llama3.1:8b"));
        assert!(!model_matches("llama3.1:8b", "llama3.1"));
    }
}
