use crate::errors::InputError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const GENERATED_SQL: &str = "generated_sql";
pub const GOLDEN_SQL: &str = "golden_sql";
pub const DATABASE_SCHEMA: &str = "database_schema";

/// Sentinel the entity oracle uses when nothing is recognized for a field.
pub const NA: &str = "NA";

/// One evaluation unit of a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryRow {
    pub index: usize,
    pub generated_sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub golden_sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_schema: Option<String>,
    /// Columns the pipeline does not interpret, passed through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl QueryRow {
    pub fn new(index: usize, generated_sql: impl Into<String>) -> Self {
        Self {
            index,
            generated_sql: generated_sql.into(),
            ..Default::default()
        }
    }

    pub fn with_golden(mut self, golden_sql: impl Into<String>) -> Self {
        self.golden_sql = Some(golden_sql.into());
        self
    }

    pub fn with_schema(mut self, database_schema: impl Into<String>) -> Self {
        self.database_schema = Some(database_schema.into());
        self
    }

    /// `(generated, golden)` when the row has a golden query.
    pub fn golden_pair(&self) -> Option<(&str, &str)> {
        self.golden_sql
            .as_deref()
            .map(|golden| (self.generated_sql.as_str(), golden))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    /// Column names in first-seen order, as they appeared in the input.
    pub columns: Vec<String>,
    pub rows: Vec<QueryRow>,
}

impl Batch {
    /// Builds a batch from already-typed rows. Optional columns are
    /// considered present when at least one row populates them.
    pub fn from_rows(rows: Vec<QueryRow>) -> Self {
        let mut columns = vec![GENERATED_SQL.to_string()];
        if rows.iter().any(|r| r.golden_sql.is_some()) {
            columns.push(GOLDEN_SQL.to_string());
        }
        if rows.iter().any(|r| r.database_schema.is_some()) {
            columns.push(DATABASE_SCHEMA.to_string());
        }
        for r in &rows {
            for k in r.extra.keys() {
                if !columns.contains(k) {
                    columns.push(k.clone());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn mode(&self) -> Result<Mode, InputError> {
        if self.is_empty() {
            return Err(InputError::EmptyBatch);
        }
        Mode::detect(&self.columns)
    }
}

/// Which analyzer set a batch qualifies for, decided by its columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    GeneratedOnly,
    WithGolden,
    WithSchema,
}

impl Mode {
    pub fn detect(columns: &[String]) -> Result<Self, InputError> {
        let has = |name: &str| columns.iter().any(|c| c == name);
        if !has(GENERATED_SQL) {
            return Err(InputError::MissingColumn(GENERATED_SQL.to_string()));
        }
        Ok(match (has(GOLDEN_SQL), has(DATABASE_SCHEMA)) {
            (true, true) => Mode::WithSchema,
            (true, false) => Mode::WithGolden,
            // a schema without golden queries enables nothing extra
            (false, _) => Mode::GeneratedOnly,
        })
    }

    pub fn enables(&self, group: MetricGroup) -> bool {
        match group {
            MetricGroup::Complexity | MetricGroup::Injection | MetricGroup::Performance => true,
            MetricGroup::Entity | MetricGroup::Retrieval => {
                matches!(self, Mode::WithGolden | Mode::WithSchema)
            }
            MetricGroup::Equivalence => matches!(self, Mode::WithSchema),
        }
    }

    pub fn needs_oracle(&self) -> bool {
        !matches!(self, Mode::GeneratedOnly)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Mode::GeneratedOnly => "generated_sql only",
            Mode::WithGolden => "generated_sql + golden_sql",
            Mode::WithSchema => "generated_sql + golden_sql + database_schema",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricGroup {
    Entity,
    Complexity,
    Equivalence,
    Injection,
    Retrieval,
    Performance,
}

impl MetricGroup {
    /// Run order of the analyzer groups.
    pub const ORDER: [MetricGroup; 6] = [
        MetricGroup::Entity,
        MetricGroup::Complexity,
        MetricGroup::Equivalence,
        MetricGroup::Injection,
        MetricGroup::Retrieval,
        MetricGroup::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricGroup::Entity => "entity_evaluation",
            MetricGroup::Complexity => "halstead",
            MetricGroup::Equivalence => "sql_equivalence",
            MetricGroup::Injection => "sql_injection",
            MetricGroup::Retrieval => "retrieval_accuracy",
            MetricGroup::Performance => "performance",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            MetricGroup::Entity => "Entity Recognition",
            MetricGroup::Complexity => "Halstead Complexity",
            MetricGroup::Equivalence => "SQL Semantic Equivalence",
            MetricGroup::Injection => "SQL Injection",
            MetricGroup::Retrieval => "Data Retrieval Accuracy",
            MetricGroup::Performance => "Query Performance",
        }
    }
}

/// How rows whose computation failed contribute to a group's aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedRowPolicy {
    /// Failed rows are left out of the mean.
    ExcludeFailed,
    /// Failed rows count as 0.
    ZeroFill,
    /// The analyzer cannot fail per row.
    NotApplicable,
}

/// Metric columns one analyzer computed for one row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RowMetrics {
    #[serde(default)]
    pub values: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            values: Map::new(),
            error: Some(message.into()),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn score(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate view of one analyzer group across the batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupSummary {
    pub group: MetricGroup,
    pub values: Map<String, Value>,
    pub failed_rows: usize,
    pub failed_row_policy: FailedRowPolicy,
}

impl GroupSummary {
    pub fn new(group: MetricGroup, failed_row_policy: FailedRowPolicy) -> Self {
        Self {
            group,
            values: Map::new(),
            failed_rows: 0,
            failed_row_policy,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), number(value));
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }
}

/// Everything one analyzer produced for a batch. `rows` is index-aligned
/// with `Batch::rows`.
#[derive(Debug, Clone)]
pub struct AnalyzerOutput {
    pub group: MetricGroup,
    pub rows: Vec<RowMetrics>,
    pub summary: GroupSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowError {
    pub group: MetricGroup,
    pub message: String,
}

/// An input row augmented with every computed metric column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(flatten)]
    pub input: QueryRow,
    pub metrics: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub mode: Mode,
    pub generated_at: String,
    pub rows: Vec<ReportRow>,
    pub summaries: Vec<GroupSummary>,
}

impl EvaluationReport {
    pub fn new(mode: Mode, batch: &Batch) -> Self {
        Self {
            mode,
            generated_at: chrono::Utc::now().to_rfc3339(),
            rows: batch
                .rows
                .iter()
                .map(|r| ReportRow {
                    input: r.clone(),
                    metrics: Map::new(),
                    errors: Vec::new(),
                })
                .collect(),
            summaries: Vec::new(),
        }
    }

    /// Folds one analyzer's per-row columns and its summary into the report.
    pub fn merge(&mut self, output: AnalyzerOutput) {
        for (row, metrics) in self.rows.iter_mut().zip(output.rows) {
            for (k, v) in metrics.values {
                row.metrics.insert(k, v);
            }
            if let Some(message) = metrics.error {
                row.errors.push(RowError {
                    group: output.group,
                    message,
                });
            }
        }
        self.summaries.push(output.summary);
    }

    /// Records a whole-group failure: every row is annotated, the summary is
    /// emitted with no values.
    pub fn record_group_failure(
        &mut self,
        group: MetricGroup,
        policy: FailedRowPolicy,
        message: &str,
    ) {
        for row in &mut self.rows {
            row.errors.push(RowError {
                group,
                message: message.to_string(),
            });
        }
        let mut summary = GroupSummary::new(group, policy);
        summary.failed_rows = self.rows.len();
        self.summaries.push(summary);
    }

    pub fn summary(&self, group: MetricGroup) -> Option<&GroupSummary> {
        self.summaries.iter().find(|s| s.group == group)
    }

    /// Values of one metric column, row by row.
    pub fn column(&self, name: &str) -> Vec<Option<&Value>> {
        self.rows.iter().map(|r| r.metrics.get(name)).collect()
    }

    pub fn groups(&self) -> Vec<MetricGroup> {
        self.summaries.iter().map(|s| s.group).collect()
    }
}

/// Four named sets extracted from one SQL string.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntitySet {
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub aggregate_functions: Vec<String>,
}

impl EntitySet {
    /// Trims and collapses whitespace in every member, lowercases
    /// identifiers and replaces empty fields with the `NA` sentinel.
    pub fn normalized(self) -> Self {
        Self {
            tables: normalize_field(self.tables, true),
            columns: normalize_field(self.columns, true),
            conditions: normalize_field(self.conditions, false),
            aggregate_functions: normalize_field(self.aggregate_functions, false),
        }
    }
}

fn normalize_field(items: Vec<String>, identifier: bool) -> Vec<String> {
    let mut out: Vec<String> = items
        .into_iter()
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.eq_ignore_ascii_case(NA) {
                NA.to_string()
            } else if identifier {
                s.trim_matches(|c| c == '"' || c == '`').to_lowercase()
            } else {
                s
            }
        })
        .collect();
    if out.len() > 1 {
        out.retain(|s| s != NA);
    }
    if out.is_empty() {
        out.push(NA.to_string());
    }
    out
}

/// Resource usage of one profiled query execution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionMetrics {
    pub execution_time_s: f64,
    pub peak_memory_mb: f64,
    pub cpu_time_s: f64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    /// Set when a counter went backwards and its delta was clamped to 0.
    #[serde(default)]
    pub clamped: bool,
}

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

impl ExecutionMetrics {
    pub fn disk_read_mb(&self) -> f64 {
        self.disk_read_bytes as f64 / BYTES_PER_MB
    }

    pub fn disk_write_mb(&self) -> f64 {
        self.disk_write_bytes as f64 / BYTES_PER_MB
    }
}

/// Per-row outcome of the injection detector.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InjectionFinding {
    pub patterns: Vec<String>,
}

impl InjectionFinding {
    pub const FLAGGED: &'static str = "Potential SQL Injection Detected";
    pub const SAFE: &'static str = "Safe Query";

    pub fn is_flagged(&self) -> bool {
        !self.patterns.is_empty()
    }

    pub fn status(&self) -> &'static str {
        if self.is_flagged() {
            Self::FLAGGED
        } else {
            Self::SAFE
        }
    }
}

/// The four scores the data-comparison oracle returns for one row pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalScores {
    pub column_precision: f64,
    pub column_recall: f64,
    pub rows_precision: f64,
    pub rows_recall: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub cached: bool,
    #[serde(default)]
    pub meta: Value,
}

/// JSON number for `v`; non-finite values become 0 so aggregates never
/// carry NaN.
pub fn number(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mode_detection() {
        assert_eq!(
            Mode::detect(&cols(&["generated_sql"])).unwrap(),
            Mode::GeneratedOnly
        );
        assert_eq!(
            Mode::detect(&cols(&["golden_sql", "generated_sql", "note"])).unwrap(),
            Mode::WithGolden
        );
        assert_eq!(
            Mode::detect(&cols(&["generated_sql", "golden_sql", "database_schema"])).unwrap(),
            Mode::WithSchema
        );
        assert_eq!(
            Mode::detect(&cols(&["generated_sql", "database_schema"])).unwrap(),
            Mode::GeneratedOnly
        );

        let err = Mode::detect(&cols(&["golden_sql"])).unwrap_err();
        assert!(err.to_string().contains("generated_sql"));
    }

    #[test]
    fn test_mode_enables_groups() {
        let only = Mode::GeneratedOnly;
        assert!(only.enables(MetricGroup::Injection));
        assert!(only.enables(MetricGroup::Complexity));
        assert!(only.enables(MetricGroup::Performance));
        assert!(!only.enables(MetricGroup::Entity));
        assert!(!only.enables(MetricGroup::Retrieval));
        assert!(!only.enables(MetricGroup::Equivalence));

        assert!(Mode::WithGolden.enables(MetricGroup::Retrieval));
        assert!(!Mode::WithGolden.enables(MetricGroup::Equivalence));
        assert!(Mode::WithSchema.enables(MetricGroup::Equivalence));
    }

    #[test]
    fn test_empty_batch_is_input_error() {
        let b = Batch::from_rows(vec![]);
        assert!(matches!(b.mode(), Err(InputError::EmptyBatch)));
    }

    #[test]
    fn test_entity_normalization() {
        let e = EntitySet {
            tables: vec![" Employees ".into(), "`Dept`".into()],
            columns: vec![],
            conditions: vec!["salary  >   100".into(), "na".into()],
            aggregate_functions: vec!["NA".into()],
        }
        .normalized();

        assert_eq!(e.tables, vec!["employees", "dept"]);
        assert_eq!(e.columns, vec![NA]);
        assert_eq!(e.conditions, vec!["salary > 100"]);
        assert_eq!(e.aggregate_functions, vec![NA]);
    }

    #[test]
    fn test_report_merge_keeps_row_alignment() {
        let batch = Batch::from_rows(vec![QueryRow::new(0, "SELECT 1"), QueryRow::new(1, "x")]);
        let mut report = EvaluationReport::new(Mode::GeneratedOnly, &batch);

        let mut summary = GroupSummary::new(MetricGroup::Complexity, FailedRowPolicy::NotApplicable);
        summary.insert("Length", 1.5);
        report.merge(AnalyzerOutput {
            group: MetricGroup::Complexity,
            rows: vec![
                RowMetrics::new().with("Length", 2),
                RowMetrics::failed("boom"),
            ],
            summary,
        });

        assert_eq!(report.rows[0].metrics["Length"], 2);
        assert!(report.rows[0].errors.is_empty());
        assert_eq!(report.rows[1].errors[0].message, "boom");
        assert_eq!(
            report.summary(MetricGroup::Complexity).unwrap().get("Length"),
            Some(1.5)
        );
    }

    #[test]
    fn test_number_never_nan() {
        assert_eq!(number(f64::NAN), Value::from(0));
        assert_eq!(number(0.5).as_f64(), Some(0.5));
    }
}
