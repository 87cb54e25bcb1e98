//! Pattern-based SQL tokenizer. Not a grammar: it only needs stable
//! operator/operand partitions for complexity scoring.

use regex::Regex;
use std::sync::OnceLock;

/// Keywords, join forms, aggregates and symbolic operators counted as
/// Halstead operators. Everything else that is not a bare number is an
/// operand.
const OPERATORS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "JOIN", "INNER JOIN", "LEFT JOIN", "RIGHT JOIN", "FULL JOIN",
    "CROSS JOIN", "LEFT OUTER JOIN", "RIGHT OUTER JOIN", "FULL OUTER JOIN", "GROUP BY",
    "ORDER BY", "HAVING", "INSERT", "UPDATE", "DELETE", "ALTER", "ON", "DISTINCT", "AS", "LIMIT",
    "OFFSET", "CASE", "WHEN", "THEN", "ELSE", "END", "AND", "OR", "NOT", "LIKE", "IN", "BETWEEN",
    "EXISTS", "OVER", "ROW_NUMBER", "RANK", "DENSE_RANK", "SUM", "AVG", "COUNT", "MIN", "MAX",
    "UNION", "UNION ALL", "ALL", "INTERSECT", "EXCEPT", "=", "<>", "!=", "<", ">", "<=", ">=",
    "+", "-", "*", "/", "%", "||",
];

/// Adjacent words folded into one token, longest first.
const COMPOUNDS: &[&[&str]] = &[
    &["LEFT", "OUTER", "JOIN"],
    &["RIGHT", "OUTER", "JOIN"],
    &["FULL", "OUTER", "JOIN"],
    &["GROUP", "BY"],
    &["ORDER", "BY"],
    &["INNER", "JOIN"],
    &["LEFT", "JOIN"],
    &["RIGHT", "JOIN"],
    &["FULL", "JOIN"],
    &["CROSS", "JOIN"],
    &["UNION", "ALL"],
];

fn token_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r#"(?s)(?P<comment>--[^\n]*|/\*.*?\*/)|'(?:[^']|'')*'|"[^"]*"|`[^`]*`|\[[^\]]*\]|\d+(?:\.\d+)?|[A-Za-z_][A-Za-z0-9_$]*(?:\.(?:[A-Za-z_][A-Za-z0-9_$]*|\*))*|<>|!=|<=|>=|\|\||[=<>+\-*/%]"#,
        )
        .expect("sql token regex should compile")
    })
}

fn numeric_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^\d+(?:\.\d+)?$").expect("numeric regex should compile"))
}

/// Uppercased tokens in source order. Comments and punctuation
/// (`( ) , ; .`) are dropped; compound keywords are folded.
pub fn tokenize(sql: &str) -> Vec<String> {
    let raw: Vec<String> = token_regex()
        .captures_iter(sql)
        .filter(|c| c.name("comment").is_none())
        .filter_map(|c| c.get(0))
        .map(|m| m.as_str().to_uppercase())
        .collect();

    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let folded = COMPOUNDS.iter().find(|words| {
            raw.len() >= i + words.len()
                && words.iter().zip(&raw[i..]).all(|(w, t)| *w == t.as_str())
        });
        match folded {
            Some(words) => {
                out.push(words.join(" "));
                i += words.len();
            }
            None => {
                out.push(raw[i].clone());
                i += 1;
            }
        }
    }
    out
}

pub fn is_operator(token: &str) -> bool {
    OPERATORS.contains(&token)
}

pub fn is_numeric(token: &str) -> bool {
    numeric_regex().is_match(token)
}

/// Operator and operand occurrences of one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub operators: Vec<String>,
    pub operands: Vec<String>,
}

pub fn partition(sql: &str) -> Partition {
    let mut p = Partition::default();
    for tok in tokenize(sql) {
        if is_operator(&tok) {
            p.operators.push(tok);
        } else if !is_numeric(&tok) {
            p.operands.push(tok);
        }
    }
    p
}
