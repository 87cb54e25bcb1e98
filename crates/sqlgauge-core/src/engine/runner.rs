use crate::metrics_api::Analyzer;
use crate::model::{Batch, EvaluationReport, MetricGroup, Mode};
use std::sync::Arc;
use std::time::Instant;

/// Runs the analyzers a batch qualifies for and folds their output into one
/// report.
pub struct Runner {
    pub analyzers: Vec<Arc<dyn Analyzer>>,
}

impl Runner {
    pub fn new(analyzers: Vec<Arc<dyn Analyzer>>) -> Self {
        Self { analyzers }
    }

    /// Analyzers enabled by `mode`, in run order.
    pub fn plan(&self, mode: Mode) -> Vec<Arc<dyn Analyzer>> {
        MetricGroup::ORDER
            .iter()
            .filter(|g| mode.enables(**g))
            .flat_map(|g| self.analyzers.iter().filter(move |a| a.group() == *g))
            .cloned()
            .collect()
    }

    pub async fn run_batch(&self, batch: &Batch) -> anyhow::Result<EvaluationReport> {
        let mode = batch.mode()?;
        let plan = self.plan(mode);
        tracing::info!(
            event = "batch_start",
            rows = batch.len(),
            mode = mode.describe(),
            analyzers = ?plan.iter().map(|a| a.name()).collect::<Vec<_>>()
        );

        let mut report = EvaluationReport::new(mode, batch);
        for analyzer in plan {
            let started = Instant::now();
            tracing::info!(event = "analyzer_start", analyzer = analyzer.name());

            let result = analyzer.analyze(batch).await.and_then(|out| {
                if out.rows.len() == batch.len() {
                    Ok(out)
                } else {
                    Err(anyhow::anyhow!(
                        "analyzer {} returned {} rows for a batch of {}",
                        analyzer.name(),
                        out.rows.len(),
                        batch.len()
                    ))
                }
            });

            match result {
                Ok(output) => {
                    tracing::info!(
                        event = "analyzer_done",
                        analyzer = analyzer.name(),
                        failed_rows = output.summary.failed_rows,
                        duration_ms = started.elapsed().as_millis() as u64
                    );
                    report.merge(output);
                }
                Err(e) => {
                    tracing::warn!(
                        event = "analyzer_failed",
                        analyzer = analyzer.name(),
                        error = %format!("{:#}", e)
                    );
                    report.record_group_failure(
                        analyzer.group(),
                        analyzer.failed_row_policy(),
                        &format!("{} failed: {:#}", analyzer.name(), e),
                    );
                }
            }
        }
        Ok(report)
    }
}
