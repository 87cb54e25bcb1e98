use anyhow::Context;
use async_trait::async_trait;
use sqlgauge_core::database::Database;
use sqlgauge_core::errors::OracleError;
use sqlgauge_core::metrics_api::{summarize, Analyzer};
use sqlgauge_core::model::{
    number, AnalyzerOutput, Batch, FailedRowPolicy, MetricGroup, RetrievalScores, RowMetrics,
};
use sqlgauge_core::oracle::DataComparator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub const COLUMNS: [&str; 4] = ["rows_precision", "column_precision", "rows_recall", "column_recall"];

const SUMMARY: [(&str, &str); 4] = [
    ("Average Rows Precision", "rows_precision"),
    ("Average Column Precision", "column_precision"),
    ("Average Rows Recall", "rows_recall"),
    ("Average Column Recall", "column_recall"),
];

/// Executes each generated/golden pair and scores the two result sets.
/// Pairs run concurrently up to `concurrency`; output keeps input order and
/// any failure scores the row 0.
pub struct RetrievalAnalyzer {
    db: Arc<dyn Database>,
    comparator: Arc<dyn DataComparator>,
    concurrency: usize,
    timeout: Duration,
}

impl RetrievalAnalyzer {
    pub fn new(
        db: Arc<dyn Database>,
        comparator: Arc<dyn DataComparator>,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            db,
            comparator,
            concurrency: concurrency.max(1),
            timeout,
        }
    }
}

async fn score_pair(
    db: Arc<dyn Database>,
    comparator: Arc<dyn DataComparator>,
    pair: Option<(String, String)>,
    limit: Duration,
) -> anyhow::Result<RetrievalScores> {
    let (generated, golden) = pair.context("golden_sql is missing for this row")?;
    let generated = db
        .execute_with_results(&generated)
        .context("generated query")?;
    let golden = db.execute_with_results(&golden).context("golden query")?;

    match tokio::time::timeout(limit, comparator.compare(&generated.to_text(), &golden.to_text()))
        .await
    {
        Ok(scores) => scores,
        Err(_) => Err(OracleError::Timeout(limit.as_secs()).into()),
    }
}

fn to_row(s: &RetrievalScores) -> RowMetrics {
    RowMetrics::new()
        .with("rows_precision", number(s.rows_precision))
        .with("column_precision", number(s.column_precision))
        .with("rows_recall", number(s.rows_recall))
        .with("column_recall", number(s.column_recall))
}

#[async_trait]
impl Analyzer for RetrievalAnalyzer {
    fn name(&self) -> &'static str {
        "retrieval_accuracy"
    }

    fn group(&self) -> MetricGroup {
        MetricGroup::Retrieval
    }

    fn failed_row_policy(&self) -> FailedRowPolicy {
        FailedRowPolicy::ZeroFill
    }

    async fn analyze(&self, batch: &Batch) -> anyhow::Result<AnalyzerOutput> {
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(batch.len());

        for row in &batch.rows {
            let permit = sem.clone().acquire_owned().await?;
            let db = self.db.clone();
            let comparator = self.comparator.clone();
            let pair = row
                .golden_pair()
                .map(|(g, r)| (g.to_string(), r.to_string()));
            let limit = self.timeout;
            let h = tokio::spawn(async move {
                let _permit = permit;
                score_pair(db, comparator, pair, limit).await
            });
            handles.push(h);
        }

        let mut rows = Vec::with_capacity(batch.len());
        for (row, h) in batch.rows.iter().zip(handles) {
            let result = match h.await {
                Ok(r) => r,
                Err(e) => Err(anyhow::anyhow!("join error: {}", e)),
            };
            match result {
                Ok(scores) => rows.push(to_row(&scores)),
                Err(e) => {
                    tracing::warn!(
                        event = "row_failed",
                        analyzer = self.name(),
                        row = row.index,
                        error = %format!("{:#}", e)
                    );
                    let mut m = to_row(&RetrievalScores::default());
                    m.error = Some(format!("{:#}", e));
                    rows.push(m);
                }
            }
        }

        let summary = summarize(self.group(), self.failed_row_policy(), &rows, &SUMMARY);
        Ok(AnalyzerOutput {
            group: self.group(),
            rows,
            summary,
        })
    }
}
