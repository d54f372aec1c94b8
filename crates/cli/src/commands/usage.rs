//! `evidex usage`: Size and budget utilization of a rendered prompt.

use evidex_config::AppConfig;
use evidex_telemetry::UsageStats;
use std::path::Path;

pub async fn run(
    config: &AppConfig,
    file: &Path,
    model: Option<String>,
    max_tokens: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("cannot read {}: {e}", file.display()))?;
    let model = model.unwrap_or_else(|| config.services.ollama.llm_model.clone());
    let stats = super::analyzer(config).analyze_prompt(&model, &text, max_tokens);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&file.display().to_string(), &stats);
    }
    Ok(())
}

pub fn print_stats(label: &str, stats: &UsageStats) {
    println!("📊 Usage: {label}");
    println!("─────────────────────────────────────");
    println!("  Model:        {}", stats.model);
    println!("  Chars:        {}", stats.total_chars);
    println!("  Est. tokens:  {}", stats.estimated_tokens);
    if stats.max_chars > 0 {
        println!(
            "  Chars used:   {:.1}% of {}",
            stats.char_utilization * 100.0,
            stats.max_chars
        );
        println!(
            "  Tokens used:  {:.1}% of {}",
            stats.token_utilization * 100.0,
            stats.max_tokens
        );
    } else {
        println!("  Budget:       unknown model window (pass --max-tokens)");
    }
    println!("  Chunks:       {}", stats.chunk_count);
    println!("  Sources:      {}", stats.source_count);
    for source in &stats.sources {
        println!("    - {source}");
    }
    if stats.char_utilization > 1.0 {
        println!();
        println!("  ⛔ Over budget by {} chars", stats.total_chars - stats.max_chars);
    }
}
