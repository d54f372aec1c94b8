//! `evidex config`: Show or validate the effective configuration.

use evidex_config::AppConfig;
use std::path::Path;

pub async fn run(
    config: &AppConfig,
    config_path: &Path,
    check: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // loading already validated; re-run so `--check` reports explicitly
    config.validate()?;

    if check {
        println!("✅ Configuration valid ({})", source_label(config_path));
        return Ok(());
    }

    let mut shown = config.clone();
    if shown.services.ollama.api_key.is_some() {
        shown.services.ollama.api_key = Some("***".into());
    }

    println!("# effective configuration ({})", source_label(config_path));
    println!("{}", toml::to_string_pretty(&shown)?);

    let mut warnings = Vec::new();
    if !config.data.chunks_dir.exists() {
        warnings.push(format!(
            "Chunks directory {} does not exist",
            config.data.chunks_dir.display()
        ));
    }
    if config.retrieval.max_total_results < config.retrieval.per_collection_limit {
        warnings.push("retrieval.max_total_results is below per_collection_limit".to_string());
    }
    for w in &warnings {
        println!("⚠️  {w}");
    }

    Ok(())
}

fn source_label(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} not found, using defaults", path.display())
    }
}
