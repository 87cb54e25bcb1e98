//! The evaluation database collaborator.
//!
//! Queries arrive as raw text and are executed as given; nothing here
//! restricts them to `SELECT`.

use serde::{Deserialize, Serialize};

pub mod sqlite;

pub use sqlite::SqliteDatabase;

pub trait Database: Send + Sync {
    /// Runs a statement for its side effects.
    fn execute(&self, sql: &str) -> anyhow::Result<()>;

    /// Runs a query and materializes every row.
    fn execute_with_results(&self, sql: &str) -> anyhow::Result<ResultSet>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Canonical text of a single cell. Integral reals print like integers
    /// so `1` and `1.0` compare equal.
    pub fn render(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(f) => format!("{}", f),
            SqlValue::Text(s) => escape(s),
            SqlValue::Blob(b) => format!("x'{}'", hex::encode(b)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Line-oriented text form: a tab-separated header of lowercased column
    /// names, then one tab-separated line per row in result order.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let header: Vec<String> = self
            .columns
            .iter()
            .map(|c| escape(&c.to_lowercase()))
            .collect();
        out.push_str(&header.join("\t"));
        for row in &self.rows {
            out.push('\n');
            let cells: Vec<String> = row.iter().map(SqlValue::render).collect();
            out.push_str(&cells.join("\t"));
        }
        out
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of the escaping applied by [`ResultSet::to_text`].
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
