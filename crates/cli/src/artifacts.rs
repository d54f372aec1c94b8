//! Run artifacts: context, prompt, output and metadata files per run.

use chrono::{DateTime, Utc};
use evidex_pipeline::{RunReport, model_slug};
use std::path::{Path, PathBuf};

/// `{pipeline}_{model}_{timestamp}`, safe to use as a file stem.
pub fn run_id(pipeline: &str, model: &str, at: DateTime<Utc>) -> String {
    format!(
        "{pipeline}_{}_{}",
        model_slug(model),
        at.format("%Y-%m-%dT%H-%M-%S")
    )
}

/// Files written for one run.
#[derive(Debug)]
pub struct Artifacts {
    pub run_id: String,
    pub files: Vec<PathBuf>,
}

impl Artifacts {
    pub fn output_path(&self) -> Option<&Path> {
        self.files
            .iter()
            .find(|p| p.to_string_lossy().ends_with(&format!("{}.output.txt", self.run_id)))
            .map(PathBuf::as_path)
    }
}

/// Write every artifact of `report` under `dir`, creating it if needed.
pub fn write_run(dir: &Path, report: &RunReport) -> std::io::Result<Artifacts> {
    std::fs::create_dir_all(dir)?;
    let run_id = run_id(&report.pipeline, &report.model, report.started_at);
    let mut files = Vec::new();

    let mut write = |suffix: &str, contents: &str| -> std::io::Result<()> {
        let path = dir.join(format!("{run_id}.{suffix}"));
        std::fs::write(&path, contents)?;
        files.push(path);
        Ok(())
    };

    write("context.txt", &report.context)?;
    write("prompt.txt", &report.prompt)?;
    write("output.txt", &report.output)?;
    for it in &report.iterations {
        write(&format!("iter{:02}.delta.txt", it.index), &it.delta)?;
        write(&format!("iter{:02}.prompt.txt", it.index), &it.prompt)?;
        write(&format!("iter{:02}.output.txt", it.index), &it.output)?;
    }
    let meta = serde_json::to_string_pretty(&report.meta(&run_id))?;
    write("meta.json", &meta)?;

    Ok(Artifacts { run_id, files })
}
