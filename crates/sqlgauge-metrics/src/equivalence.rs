use async_trait::async_trait;
use sqlgauge_core::metrics_api::{summarize, Analyzer};
use sqlgauge_core::model::{AnalyzerOutput, Batch, FailedRowPolicy, MetricGroup, RowMetrics};
use sqlgauge_core::oracle::EquivalenceOracle;
use std::sync::Arc;

pub const SCORE: &str = "SQL Equivalence Score";
pub const AVERAGE: &str = "Average SQL Equivalence Score";

/// Binary LLM judgement of whether the generated query means the same as the
/// golden one. Unusable answers score 0 and keep their error annotation.
pub struct EquivalenceAnalyzer {
    oracle: Arc<dyn EquivalenceOracle>,
}

impl EquivalenceAnalyzer {
    pub fn new(oracle: Arc<dyn EquivalenceOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Analyzer for EquivalenceAnalyzer {
    fn name(&self) -> &'static str {
        "sql_equivalence"
    }

    fn group(&self) -> MetricGroup {
        MetricGroup::Equivalence
    }

    fn failed_row_policy(&self) -> FailedRowPolicy {
        FailedRowPolicy::ZeroFill
    }

    async fn analyze(&self, batch: &Batch) -> anyhow::Result<AnalyzerOutput> {
        let mut rows = Vec::with_capacity(batch.len());
        for row in &batch.rows {
            let Some((generated, golden)) = row.golden_pair() else {
                rows.push(
                    RowMetrics {
                        error: Some("golden_sql is missing for this row".into()),
                        ..Default::default()
                    }
                    .with(SCORE, 0),
                );
                continue;
            };
            let schema = row.database_schema.as_deref().unwrap_or_default();

            match self.oracle.judge(golden, generated, schema).await {
                Ok(equivalent) => rows.push(RowMetrics::new().with(SCORE, u8::from(equivalent))),
                Err(e) => {
                    tracing::warn!(
                        event = "row_failed",
                        analyzer = self.name(),
                        row = row.index,
                        error = %e
                    );
                    let mut m = RowMetrics::failed(e.to_string());
                    m.push(SCORE, 0);
                    rows.push(m);
                }
            }
        }

        let summary = summarize(
            self.group(),
            self.failed_row_policy(),
            &rows,
            &[(AVERAGE, SCORE)],
        );
        Ok(AnalyzerOutput {
            group: self.group(),
            rows,
            summary,
        })
    }
}
