//! External judges the pipeline treats as authoritative: entity extraction,
//! result-set comparison and semantic equivalence.

use crate::errors::{ExtractionError, OracleError};
use crate::model::{EntitySet, LlmResponse, RetrievalScores};
use crate::providers::llm::LlmClient;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub mod datacompare;
pub mod entity;
pub mod equivalence;

pub use datacompare::TabularComparator;
pub use entity::LlmEntityExtractor;
pub use equivalence::LlmEquivalenceJudge;

#[async_trait]
pub trait EntityOracle: Send + Sync {
    async fn extract(&self, sql: &str) -> Result<EntitySet, ExtractionError>;
}

#[async_trait]
pub trait EquivalenceOracle: Send + Sync {
    /// `true` when `candidate` is logically equivalent to `reference` under `schema`.
    async fn judge(&self, reference: &str, candidate: &str, schema: &str)
        -> Result<bool, OracleError>;
}

#[async_trait]
pub trait DataComparator: Send + Sync {
    /// Scores two result sets in the text form produced by
    /// [`ResultSet::to_text`](crate::database::ResultSet::to_text).
    async fn compare(&self, generated: &str, golden: &str) -> anyhow::Result<RetrievalScores>;
}

/// Runs one completion bounded by `limit`.
pub async fn complete_within(
    client: &dyn LlmClient,
    prompt: &str,
    limit: Duration,
) -> Result<LlmResponse, OracleError> {
    match tokio::time::timeout(limit, client.complete(prompt)).await {
        Ok(Ok(resp)) => Ok(resp),
        Ok(Err(e)) => Err(OracleError::Transport(format!("{:#}", e))),
        Err(_) => Err(OracleError::Timeout(limit.as_secs())),
    }
}

/// Pulls the first JSON object out of a model answer.
///
/// Tolerates code fences, leading prose and trailing text. Generation with a
/// `}` stop sequence may cut the closing brace, so one missing `}` is
/// restored before giving up.
pub fn extract_json_object(text: &str) -> Result<Value, OracleError> {
    let body = strip_fences(text.trim());
    let start = body
        .find('{')
        .ok_or_else(|| OracleError::Malformed(format!("no JSON object in '{}'", snippet(text))))?;
    let body = body[start..].trim_end();

    if let Some(v) = first_object(body) {
        return Ok(v);
    }
    if let Some(v) = first_object(&format!("{}}}", body)) {
        return Ok(v);
    }
    Err(OracleError::Malformed(format!(
        "unparseable JSON object in '{}'",
        snippet(text)
    )))
}

fn first_object(s: &str) -> Option<Value> {
    let mut stream = serde_json::Deserializer::from_str(s).into_iter::<Value>();
    match stream.next() {
        Some(Ok(v @ Value::Object(_))) => Some(v),
        _ => None,
    }
}

fn strip_fences(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // drop the info string ("json") on the opening fence
    let rest = rest.split_once('\n').map(|(_, r)| r).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest)
}

fn snippet(s: &str) -> String {
    const MAX: usize = 120;
    let s = s.trim();
    if s.chars().count() <= MAX {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(MAX).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::fake::FakeClient;
    use serde_json::json;

    #[test]
    fn test_extract_plain_and_fenced() {
        assert_eq!(
            extract_json_object(r#"{"equivalence": true}"#).unwrap(),
            json!({"equivalence": true})
        );
        assert_eq!(
            extract_json_object("```json\n{\"a\": [1]}\n```").unwrap(),
            json!({"a": [1]})
        );
        assert_eq!(
            extract_json_object("Answer:\n {\"a\": 1} trailing words").unwrap(),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_extract_restores_stop_sequence() {
        let cut = r#"{"tables": ["t"], "columns": ["a"]"#;
        assert_eq!(
            extract_json_object(cut).unwrap(),
            json!({"tables": ["t"], "columns": ["a"]})
        );
    }

    #[test]
    fn test_extract_rejects_garbage() {
        assert!(matches!(
            extract_json_object("I cannot answer that"),
            Err(OracleError::Malformed(_))
        ));
        assert!(matches!(
            extract_json_object("{ not json at all"),
            Err(OracleError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_within_maps_client_failure() {
        let client = FakeClient::new("m");
        let err = complete_within(&client, "x", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Transport(_)));
    }
}
