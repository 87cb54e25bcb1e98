use crate::model::{EvaluationReport, FailedRowPolicy};
use serde_json::Value;

pub fn print_summary(report: &EvaluationReport) {
    eprint!("{}", render_summary(report));
}

/// Console text: one block per metric group, then every row error inline.
pub fn render_summary(report: &EvaluationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\nEvaluated {} queries ({})\n",
        report.rows.len(),
        report.mode.describe()
    ));

    for s in &report.summaries {
        out.push_str(&format!("\n{}\n", s.group.title()));
        if s.values.is_empty() {
            out.push_str("  (no results)\n");
        }
        for (name, value) in &s.values {
            out.push_str(&format!("  {:<36} {}\n", name, format_value(value)));
        }
        if s.failed_rows > 0 {
            let how = match s.failed_row_policy {
                FailedRowPolicy::ExcludeFailed => "excluded from averages",
                FailedRowPolicy::ZeroFill => "counted as 0",
                FailedRowPolicy::NotApplicable => "no values",
            };
            out.push_str(&format!("  ⚠️  {} row(s) failed, {}\n", s.failed_rows, how));
        }
    }

    let failures: Vec<String> = report
        .rows
        .iter()
        .flat_map(|r| {
            r.errors.iter().map(move |e| {
                format!(
                    "❌ row {:<4} [{}] {}",
                    r.input.index,
                    e.group.as_str(),
                    e.message
                )
            })
        })
        .collect();

    out.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    if failures.is_empty() {
        out.push_str("All rows evaluated without errors\n");
    } else {
        out.push_str(&format!("{} row-level error(s):\n", failures.len()));
        for f in failures {
            out.push_str(&f);
            out.push('\n');
        }
    }
    out
}

fn format_value(v: &Value) -> String {
    match v {
        Value::Number(n) if n.is_f64() => format!("{:.4}", n.as_f64().unwrap_or_default()),
        other => other.to_string(),
    }
}
