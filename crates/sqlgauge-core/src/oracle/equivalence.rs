use super::{complete_within, extract_json_object, EquivalenceOracle};
use crate::errors::OracleError;
use crate::providers::llm::LlmClient;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub struct LlmEquivalenceJudge {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl LlmEquivalenceJudge {
    pub fn new(client: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

pub fn prompt(reference: &str, candidate: &str, schema: &str) -> String {
    format!(
        r#"Decide whether two SQL queries return the same result on every database that follows the schema below.
Explain nothing. Answer with a JSON object holding one boolean field, "equivalence".

Example
Schema:
Table users: id INT, name VARCHAR, active BOOLEAN
Reference: SELECT id, name FROM users WHERE active = 1;
Candidate: SELECT id, name FROM users WHERE active = true;
{{"equivalence": true}}

Schema:
{schema}
Reference: {reference}
Candidate: {candidate}
"#
    )
}

/// Reads the verdict field. Accepts a JSON boolean or the strings
/// "true"/"false"; anything else is malformed.
pub fn parse_verdict(value: &Value) -> Result<bool, OracleError> {
    match value.get("equivalence") {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
        Some(other) => Err(OracleError::Malformed(format!(
            "equivalence is not a boolean: {}",
            other
        ))),
        None => Err(OracleError::Malformed(
            "answer has no 'equivalence' field".into(),
        )),
    }
}

#[async_trait]
impl EquivalenceOracle for LlmEquivalenceJudge {
    async fn judge(
        &self,
        reference: &str,
        candidate: &str,
        schema: &str,
    ) -> Result<bool, OracleError> {
        let resp = complete_within(
            self.client.as_ref(),
            &prompt(reference, candidate, schema),
            self.timeout,
        )
        .await?;
        parse_verdict(&extract_json_object(&resp.text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::fake::FakeClient;
    use serde_json::json;

    #[tokio::test]
    async fn test_judge_reads_boolean() {
        let client = Arc::new(
            FakeClient::new("m")
                .with_rule("Candidate: SELECT 2", r#"{"equivalence": false}"#)
                .with_fallback("{\"equivalence\": true"),
        );
        let judge = LlmEquivalenceJudge::new(client, Duration::from_secs(5));

        assert!(judge.judge("SELECT 1", "SELECT 1", "t(a)").await.unwrap());
        assert!(!judge.judge("SELECT 1", "SELECT 2", "t(a)").await.unwrap());
    }

    #[test]
    fn test_parse_verdict_shapes() {
        assert!(parse_verdict(&json!({"equivalence": "TRUE"})).unwrap());
        assert!(parse_verdict(&json!({"equivalence": 1})).is_err());
        assert!(parse_verdict(&json!({"equal": true})).is_err());
    }
}
