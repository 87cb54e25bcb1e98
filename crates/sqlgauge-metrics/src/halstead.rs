use crate::lexer;
use async_trait::async_trait;
use sqlgauge_core::metrics_api::{summarize, Analyzer};
use sqlgauge_core::model::{
    number, AnalyzerOutput, Batch, FailedRowPolicy, MetricGroup, RowMetrics,
};
use std::collections::HashSet;

pub const COLUMNS: [&str; 6] = ["Vocabulary", "Length", "Volume", "Difficulty", "Effort", "Errors"];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HalsteadScores {
    pub vocabulary: usize,
    pub length: usize,
    pub volume: f64,
    pub difficulty: f64,
    pub effort: f64,
    pub errors: f64,
}

pub fn score(sql: &str) -> HalsteadScores {
    let p = lexer::partition(sql);
    let n1 = p.operators.iter().collect::<HashSet<_>>().len();
    let n2 = p.operands.iter().collect::<HashSet<_>>().len();
    let big_n1 = p.operators.len();
    let big_n2 = p.operands.len();

    let vocabulary = n1 + n2;
    let length = big_n1 + big_n2;
    let volume = if vocabulary > 0 {
        length as f64 * (vocabulary as f64).log2()
    } else {
        0.0
    };
    let difficulty = if n2 > 0 {
        (n1 as f64 / 2.0) * (big_n2 as f64 / n2 as f64)
    } else {
        0.0
    };
    let effort = difficulty * volume;

    HalsteadScores {
        vocabulary,
        length,
        volume,
        difficulty,
        effort,
        errors: volume / 3000.0,
    }
}

impl HalsteadScores {
    fn to_row(self) -> RowMetrics {
        RowMetrics::new()
            .with("Vocabulary", self.vocabulary)
            .with("Length", self.length)
            .with("Volume", number(self.volume))
            .with("Difficulty", number(self.difficulty))
            .with("Effort", number(self.effort))
            .with("Errors", number(self.errors))
    }
}

/// Halstead complexity of every generated query.
pub struct ComplexityAnalyzer;

#[async_trait]
impl Analyzer for ComplexityAnalyzer {
    fn name(&self) -> &'static str {
        "halstead"
    }

    fn group(&self) -> MetricGroup {
        MetricGroup::Complexity
    }

    fn failed_row_policy(&self) -> FailedRowPolicy {
        FailedRowPolicy::NotApplicable
    }

    async fn analyze(&self, batch: &Batch) -> anyhow::Result<AnalyzerOutput> {
        let rows: Vec<RowMetrics> = batch
            .rows
            .iter()
            .map(|r| score(&r.generated_sql).to_row())
            .collect();
        let columns: Vec<(&str, &str)> = COLUMNS.iter().map(|c| (*c, *c)).collect();
        let summary = summarize(self.group(), self.failed_row_policy(), &rows, &columns);
        Ok(AnalyzerOutput {
            group: self.group(),
            rows,
            summary,
        })
    }
}
