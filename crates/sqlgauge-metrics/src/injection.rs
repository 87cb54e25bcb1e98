use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use sqlgauge_core::metrics_api::Analyzer;
use sqlgauge_core::model::{
    AnalyzerOutput, Batch, FailedRowPolicy, GroupSummary, InjectionFinding, MetricGroup,
    RowMetrics,
};
use std::sync::OnceLock;

pub const FLAGGED_QUERIES: &str = "Flagged Queries";

/// Named signatures in reporting order. Matched case-insensitively against
/// the raw query text.
pub const PATTERNS: [(&str, &str); 11] = [
    ("Inline Comments", r"(--|#)"),
    ("UNION-Based Injection", r"\bUNION\b\s+SELECT\b"),
    (
        "Tautology OR 1=1",
        r"\bOR\b\s+(?:'[^']*'|\d+)\s*=\s*(?:'[^']*'|\d+)",
    ),
    ("Suspicious OR without Column", r"\bOR\b\s+['\d]"),
    ("DROP Table/Database", r"\bDROP\b\s+(TABLE|DATABASE)\b"),
    ("INSERT Injection", r"\bINSERT\b\s+INTO\b\s+\w+\s+\bVALUES\b"),
    (
        "UPDATE Injection",
        r"\bUPDATE\b\s+\w+\s+\bSET\b\s+\w+\s*=\s*.+?\bWHERE\b",
    ),
    ("DELETE Injection", r"\bDELETE\b\s+FROM\b\s+\w+\s+\bWHERE\b"),
    ("Single Quote with Comment", r"'[^']*'\s*--"),
    ("XP_CMDSHELL Execution", r"\bEXEC\b\s+XP_CMDSHELL\b"),
    ("Time Delay Injection", r"\b(SLEEP|BENCHMARK)\s*\("),
];

fn registry() -> &'static [(&'static str, Regex)] {
    static REGISTRY: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        PATTERNS
            .iter()
            .map(|(name, pattern)| {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .expect("injection pattern should compile");
                (*name, re)
            })
            .collect()
    })
}

/// Registry names that match `sql`, in registry order.
pub fn detect(sql: &str) -> InjectionFinding {
    InjectionFinding {
        patterns: registry()
            .iter()
            .filter(|(_, re)| re.is_match(sql))
            .map(|(name, _)| name.to_string())
            .collect(),
    }
}

pub struct InjectionAnalyzer;

#[async_trait]
impl Analyzer for InjectionAnalyzer {
    fn name(&self) -> &'static str {
        "sql_injection"
    }

    fn group(&self) -> MetricGroup {
        MetricGroup::Injection
    }

    fn failed_row_policy(&self) -> FailedRowPolicy {
        FailedRowPolicy::NotApplicable
    }

    async fn analyze(&self, batch: &Batch) -> anyhow::Result<AnalyzerOutput> {
        let findings: Vec<InjectionFinding> =
            batch.rows.iter().map(|r| detect(&r.generated_sql)).collect();

        // every registry name is reported, matched or not
        let mut summary = GroupSummary::new(self.group(), self.failed_row_policy());
        for (name, _) in PATTERNS {
            let hits = findings
                .iter()
                .filter(|f| f.patterns.iter().any(|p| p == name))
                .count();
            summary.insert(name, hits as f64);
        }
        let flagged = findings.iter().filter(|f| f.is_flagged()).count();
        summary.insert(FLAGGED_QUERIES, flagged as f64);

        for (row, f) in batch.rows.iter().zip(&findings) {
            if f.is_flagged() {
                tracing::warn!(
                    event = "injection_flagged",
                    row = row.index,
                    patterns = ?f.patterns
                );
            }
        }

        let rows = findings
            .into_iter()
            .map(|f| {
                RowMetrics::new()
                    .with("Status", f.status())
                    .with("Patterns", f.patterns)
            })
            .collect();

        Ok(AnalyzerOutput {
            group: self.group(),
            rows,
            summary,
        })
    }
}
