//! `evidex budget`: Character budgets derived from model windows.

use evidex_config::AppConfig;

pub async fn run(
    config: &AppConfig,
    model: Option<String>,
    max_tokens: Option<usize>,
    list: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let estimator = super::estimator(config);

    if list {
        let windows = estimator.windows();
        let models = windows.models();

        println!("📐 Model Windows");
        println!("─────────────────────────────────────────────────────");
        println!("{:<32} {:>10} {:>12}", "Model", "Tokens", "Max chars");
        println!("{:<32} {:>10} {:>12}", "─────", "──────", "─────────");
        for name in &models {
            if let Some(tokens) = windows.get(name) {
                println!(
                    "{:<32} {:>10} {:>12}",
                    name,
                    tokens,
                    estimator.max_chars_for_model(name)
                );
            }
        }
        println!();
        println!(
            "  {} models · {} chars/token · safety {}",
            models.len(),
            estimator.chars_per_token(),
            estimator.safety()
        );
        return Ok(());
    }

    let model = model.unwrap_or_else(|| config.services.ollama.llm_model.clone());
    let max_chars = match max_tokens {
        Some(tokens) => estimator.max_chars_for_tokens(tokens),
        None => estimator.max_chars_for_model(&model),
    };

    println!("📐 Budget for {model}");
    println!("─────────────────────────────────────");
    match (max_tokens, estimator.windows().get(&model)) {
        (Some(tokens), _) => println!("  Window:      {tokens} tokens (explicit)"),
        (None, Some(tokens)) => println!("  Window:      {tokens} tokens"),
        (None, None) => {
            println!("  Window:      unknown");
            println!();
            println!("  Add it to evidex.toml:");
            println!();
            println!("  [budget.model_windows]");
            println!("  \"{model}\" = 8192");
            return Ok(());
        }
    }
    println!("  Max chars:   {max_chars}");
    println!("  Max chunks:  {}", estimator.max_chunk_count(max_chars));

    let single_shot = &config.pipelines.single_shot.budget;
    if let Some(fitted) = estimator.fit_to_model(&model, single_shot) {
        println!();
        println!("  Single-shot budget (widened):");
        println!("    max_total_chars: {}", fitted.max_total_chars);
        println!("    max_chunk_chars: {}", fitted.max_chunk_chars);
        println!("    max_chunk_count: {}", fitted.max_chunk_count);
    }

    Ok(())
}
