use crate::profiler::Profiler;
use async_trait::async_trait;
use sqlgauge_core::database::Database;
use sqlgauge_core::metrics_api::{summarize, Analyzer};
use sqlgauge_core::model::{
    number, AnalyzerOutput, Batch, ExecutionMetrics, FailedRowPolicy, MetricGroup, RowMetrics,
};
use std::sync::Arc;

pub const COLUMNS: [&str; 5] = [
    "Execution Time (s)",
    "Peak Memory Used (MB)",
    "CPU Time Used (seconds)",
    "Disk I/O Read (MB)",
    "Disk I/O Write (MB)",
];

/// Profiles each generated query against the evaluation database, one at a
/// time. Rows with blank SQL are skipped.
pub struct PerformanceAnalyzer {
    db: Arc<dyn Database>,
    profiler: Profiler,
}

impl PerformanceAnalyzer {
    pub fn new(db: Arc<dyn Database>, profiler: Profiler) -> Self {
        Self { db, profiler }
    }
}

fn to_row(m: &ExecutionMetrics) -> RowMetrics {
    RowMetrics::new()
        .with(COLUMNS[0], number(m.execution_time_s))
        .with(COLUMNS[1], number(m.peak_memory_mb))
        .with(COLUMNS[2], number(m.cpu_time_s))
        .with(COLUMNS[3], number(m.disk_read_mb()))
        .with(COLUMNS[4], number(m.disk_write_mb()))
}

#[async_trait]
impl Analyzer for PerformanceAnalyzer {
    fn name(&self) -> &'static str {
        "performance"
    }

    fn group(&self) -> MetricGroup {
        MetricGroup::Performance
    }

    fn failed_row_policy(&self) -> FailedRowPolicy {
        FailedRowPolicy::ExcludeFailed
    }

    async fn analyze(&self, batch: &Batch) -> anyhow::Result<AnalyzerOutput> {
        let mut rows = Vec::with_capacity(batch.len());
        for row in &batch.rows {
            let sql = row.generated_sql.trim();
            if sql.is_empty() {
                rows.push(RowMetrics::new());
                continue;
            }
            match self.profiler.profile(|| self.db.execute_with_results(sql)) {
                Ok((results, metrics)) => {
                    tracing::debug!(
                        event = "query_profiled",
                        row = row.index,
                        result_rows = results.len(),
                        seconds = metrics.execution_time_s
                    );
                    rows.push(to_row(&metrics));
                }
                Err(e) => {
                    tracing::warn!(
                        event = "row_failed",
                        analyzer = self.name(),
                        row = row.index,
                        error = %format!("{:#}", e)
                    );
                    rows.push(RowMetrics::failed(format!("{:#}", e)));
                }
            }
        }

        let columns: Vec<(&str, &str)> = COLUMNS.iter().map(|c| (*c, *c)).collect();
        let summary = summarize(self.group(), self.failed_row_policy(), &rows, &columns);
        Ok(AnalyzerOutput {
            group: self.group(),
            rows,
            summary,
        })
    }
}
