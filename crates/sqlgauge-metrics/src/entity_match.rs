use crate::set_match::{exact_match, score};
use async_trait::async_trait;
use sqlgauge_core::metrics_api::{summarize, Analyzer};
use sqlgauge_core::model::{
    AnalyzerOutput, Batch, EntitySet, FailedRowPolicy, MetricGroup, QueryRow, RowMetrics,
};
use sqlgauge_core::oracle::EntityOracle;
use std::sync::Arc;

pub const TABLE_MATCH: &str = "Table Match Score";
pub const COLUMN_MATCH: &str = "Column Match Score";
pub const CONDITION_MATCH: &str = "Condition Match Score";
pub const AGGREGATION_MATCH: &str = "Aggregations Match Score";

pub const SCORES: [&str; 4] = [TABLE_MATCH, COLUMN_MATCH, CONDITION_MATCH, AGGREGATION_MATCH];

/// Compares the entities an oracle extracts from the golden and generated
/// queries. Rows whose extraction fails are left out of the averages.
pub struct EntityMatchAnalyzer {
    oracle: Arc<dyn EntityOracle>,
}

impl EntityMatchAnalyzer {
    pub fn new(oracle: Arc<dyn EntityOracle>) -> Self {
        Self { oracle }
    }

    async fn score_row(&self, row: &QueryRow) -> anyhow::Result<RowMetrics> {
        let (generated_sql, golden_sql) = row
            .golden_pair()
            .ok_or_else(|| anyhow::anyhow!("golden_sql is missing for this row"))?;

        let golden = self
            .oracle
            .extract(golden_sql)
            .await
            .map_err(|e| anyhow::anyhow!("golden query: {}", e))?;
        let generated = self
            .oracle
            .extract(generated_sql)
            .await
            .map_err(|e| anyhow::anyhow!("generated query: {}", e))?;

        Ok(compare(&generated, &golden))
    }
}

/// Per-row columns for one extracted pair: both entity lists and the four
/// match scores.
pub fn compare(generated: &EntitySet, golden: &EntitySet) -> RowMetrics {
    RowMetrics::new()
        .with("Generated Tables", generated.tables.clone())
        .with("Generated Columns", generated.columns.clone())
        .with("Generated Conditions", generated.conditions.clone())
        .with("Generated Aggregate Functions", generated.aggregate_functions.clone())
        .with("Golden Tables", golden.tables.clone())
        .with("Golden Columns", golden.columns.clone())
        .with("Golden Conditions", golden.conditions.clone())
        .with("Golden Aggregate Functions", golden.aggregate_functions.clone())
        .with(TABLE_MATCH, exact_match(&generated.tables, &golden.tables))
        .with(COLUMN_MATCH, score(&generated.columns, &golden.columns).f1)
        .with(CONDITION_MATCH, score(&generated.conditions, &golden.conditions).f1)
        .with(
            AGGREGATION_MATCH,
            score(&generated.aggregate_functions, &golden.aggregate_functions).f1,
        )
}

#[async_trait]
impl Analyzer for EntityMatchAnalyzer {
    fn name(&self) -> &'static str {
        "entity_evaluation"
    }

    fn group(&self) -> MetricGroup {
        MetricGroup::Entity
    }

    fn failed_row_policy(&self) -> FailedRowPolicy {
        FailedRowPolicy::ExcludeFailed
    }

    async fn analyze(&self, batch: &Batch) -> anyhow::Result<AnalyzerOutput> {
        let mut rows = Vec::with_capacity(batch.len());
        for row in &batch.rows {
            match self.score_row(row).await {
                Ok(m) => rows.push(m),
                Err(e) => {
                    tracing::warn!(
                        event = "row_failed",
                        analyzer = self.name(),
                        row = row.index,
                        error = %e
                    );
                    rows.push(RowMetrics::failed(e.to_string()));
                }
            }
        }

        let columns: Vec<(&str, &str)> = SCORES.iter().map(|c| (*c, *c)).collect();
        let summary = summarize(self.group(), self.failed_row_policy(), &rows, &columns);
        Ok(AnalyzerOutput {
            group: self.group(),
            rows,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgauge_core::errors::{ExtractionError, OracleError};
    use std::collections::HashMap;

    struct Scripted(HashMap<&'static str, EntitySet>);

    #[async_trait]
    impl EntityOracle for Scripted {
        async fn extract(&self, sql: &str) -> Result<EntitySet, ExtractionError> {
            self.0
                .get(sql)
                .cloned()
                .ok_or_else(|| OracleError::Malformed("not json".into()).into())
        }
    }

    fn set(tables: &[&str], columns: &[&str]) -> EntitySet {
        EntitySet {
            tables: tables.iter().map(|s| s.to_string()).collect(),
            columns: columns.iter().map(|s| s.to_string()).collect(),
            conditions: vec!["NA".into()],
            aggregate_functions: vec!["NA".into()],
        }
    }

    #[tokio::test]
    async fn test_scores_and_failed_rows_excluded() {
        let oracle = Scripted(HashMap::from([
            ("G1", set(&["emp"], &["a", "b"])),
            ("Q1", set(&["emp"], &["a"])),
            ("G2", set(&["emp"], &["a"])),
        ]));
        let batch = Batch::from_rows(vec![
            QueryRow::new(0, "Q1").with_golden("G1"),
            QueryRow::new(1, "broken").with_golden("G2"),
        ]);
        let out = EntityMatchAnalyzer::new(Arc::new(oracle))
            .analyze(&batch)
            .await
            .unwrap();

        let r0 = &out.rows[0];
        assert_eq!(r0.score(TABLE_MATCH), Some(1.0));
        assert!((r0.score(COLUMN_MATCH).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(r0.score(CONDITION_MATCH), Some(1.0));
        assert_eq!(r0.get("Golden Columns").unwrap(), &serde_json::json!(["a", "b"]));

        let r1 = &out.rows[1];
        assert!(r1.is_failed());
        assert!(r1.error.as_deref().unwrap().starts_with("generated query"));

        assert_eq!(out.summary.failed_rows, 1);
        assert_eq!(out.summary.get(TABLE_MATCH), Some(1.0));
    }

    #[tokio::test]
    async fn test_all_failed_summarizes_to_zero() {
        let batch = Batch::from_rows(vec![QueryRow::new(0, "x").with_golden("y")]);
        let out = EntityMatchAnalyzer::new(Arc::new(Scripted(HashMap::new())))
            .analyze(&batch)
            .await
            .unwrap();
        for s in SCORES {
            assert_eq!(out.summary.get(s), Some(0.0));
        }
    }
}
