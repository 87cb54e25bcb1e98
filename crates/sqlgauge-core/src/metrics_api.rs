use crate::model::{AnalyzerOutput, Batch, FailedRowPolicy, GroupSummary, MetricGroup, RowMetrics};
use async_trait::async_trait;

/// One metric group. Implementations score every row of the batch and
/// return per-row columns index-aligned with `batch.rows`.
///
/// Row-level failures belong in [`RowMetrics::error`]; an `Err` from
/// `analyze` means the whole group could not run.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;

    fn group(&self) -> MetricGroup;

    fn failed_row_policy(&self) -> FailedRowPolicy;

    async fn analyze(&self, batch: &Batch) -> anyhow::Result<AnalyzerOutput>;
}

/// Mean of `column` over `rows` under `policy`. Empty input gives 0.
pub fn mean_of(rows: &[RowMetrics], column: &str, policy: FailedRowPolicy) -> f64 {
    let values: Vec<f64> = match policy {
        FailedRowPolicy::ZeroFill => rows
            .iter()
            .map(|r| r.score(column).unwrap_or(0.0))
            .collect(),
        FailedRowPolicy::ExcludeFailed | FailedRowPolicy::NotApplicable => rows
            .iter()
            .filter(|r| !r.is_failed())
            .filter_map(|r| r.score(column))
            .collect(),
    };
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Builds a summary of per-row means. `columns` pairs a summary key with the
/// row column it averages.
pub fn summarize(
    group: MetricGroup,
    policy: FailedRowPolicy,
    rows: &[RowMetrics],
    columns: &[(&str, &str)],
) -> GroupSummary {
    let mut summary = GroupSummary::new(group, policy);
    for (key, column) in columns {
        summary.insert(*key, mean_of(rows, column, policy));
    }
    summary.failed_rows = rows.iter().filter(|r| r.is_failed()).count();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<RowMetrics> {
        vec![
            RowMetrics::new().with("s", 1.0),
            RowMetrics::failed("boom"),
            RowMetrics::new().with("s", 0.5),
        ]
    }

    #[test]
    fn test_policies_differ_on_failed_rows() {
        assert_eq!(mean_of(&rows(), "s", FailedRowPolicy::ExcludeFailed), 0.75);
        assert_eq!(mean_of(&rows(), "s", FailedRowPolicy::ZeroFill), 0.5);
    }

    #[test]
    fn test_empty_and_all_failed_give_zero() {
        assert_eq!(mean_of(&[], "s", FailedRowPolicy::ZeroFill), 0.0);
        let failed = vec![RowMetrics::failed("x")];
        assert_eq!(mean_of(&failed, "s", FailedRowPolicy::ExcludeFailed), 0.0);
    }

    #[test]
    fn test_summarize_counts_failures() {
        let s = summarize(
            MetricGroup::Entity,
            FailedRowPolicy::ExcludeFailed,
            &rows(),
            &[("Mean S", "s")],
        );
        assert_eq!(s.get("Mean S"), Some(0.75));
        assert_eq!(s.failed_rows, 1);
    }
}
