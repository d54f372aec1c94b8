//! `evidex init`: Write a starter configuration.

use evidex_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("🧾 evidex: Setup");
    println!("=================\n");

    if config_path.exists() && !force {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or re-run with --force.\n");
        return Ok(());
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(config_path, AppConfig::default_toml())?;
    println!("✅ Wrote {}", config_path.display());

    let defaults = AppConfig::default();
    for dir in [&defaults.data.chunks_dir, &defaults.data.output_dir] {
        if dir.exists() {
            println!("  Directory exists: {}", dir.display());
        } else {
            std::fs::create_dir_all(dir)?;
            println!("✅ Created {}", dir.display());
        }
    }

    println!("\n📝 Next steps:");
    println!(
        "   1. Put your *.chunks.json files in {}",
        defaults.data.chunks_dir.display()
    );
    println!("   2. Run: evidex doctor");
    println!("   3. Run: evidex run single-shot --root-feature <name> --domain <domain>\n");

    Ok(())
}
