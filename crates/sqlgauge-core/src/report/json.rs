use crate::model::EvaluationReport;
use anyhow::Context;
use std::path::Path;

pub fn write_json(report: &EvaluationReport, out: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(report)?;
    std::fs::write(out, body).with_context(|| format!("failed to write {}", out.display()))?;
    Ok(())
}
