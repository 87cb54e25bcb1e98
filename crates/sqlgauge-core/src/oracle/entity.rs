use super::{complete_within, extract_json_object, EntityOracle};
use crate::errors::{ExtractionError, OracleError};
use crate::model::EntitySet;
use crate::providers::llm::LlmClient;
use async_trait::async_trait;
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Entity extraction backed by an LLM. Successful extractions are cached per
/// distinct query text, so a golden query shared by many rows costs one call.
pub struct LlmEntityExtractor {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
    cache: Option<Cache<String, EntitySet>>,
}

impl LlmEntityExtractor {
    pub fn new(client: Arc<dyn LlmClient>, timeout: Duration, cache_entries: u64) -> Self {
        let cache = (cache_entries > 0).then(|| Cache::new(cache_entries));
        Self {
            client,
            timeout,
            cache,
        }
    }

    fn cache_key(&self, sql: &str) -> String {
        let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut h = Sha256::new();
        h.update(self.client.model().as_bytes());
        h.update(b"\n");
        h.update(normalized.as_bytes());
        hex::encode(h.finalize())
    }
}

pub fn prompt(sql: &str) -> String {
    format!(
        r#"You extract entities from SQL queries.
For the query below list the table names, column names, filter or join conditions and aggregate functions it uses.
Use "NA" for any field where nothing applies. Answer with the JSON object only.

Query: SELECT region, AVG(fare_cents) FROM ferry_trips WHERE fare_cents > 500 GROUP BY region;
{{"tables": ["ferry_trips"], "columns": ["region", "fare_cents"], "conditions": ["fare_cents > 500"], "aggregate_functions": ["AVG(fare_cents)"]}}

Query: SELECT k.keeper_name FROM lighthouse_keepers k JOIN lighthouses l ON k.lighthouse_id = l.id WHERE l.lit = 1;
{{"tables": ["lighthouse_keepers", "lighthouses"], "columns": ["keeper_name", "lighthouse_id", "id", "lit"], "conditions": ["k.lighthouse_id = l.id", "l.lit = 1"], "aggregate_functions": ["NA"]}}

Query: SELECT hull_code FROM barges;
{{"tables": ["barges"], "columns": ["hull_code"], "conditions": ["NA"], "aggregate_functions": ["NA"]}}

Query: {sql}
"#
    )
}

/// Reads the four entity fields from a parsed answer. Absent fields become
/// the `NA` sentinel; anything that is not a list of strings is malformed.
pub fn parse_entities(value: serde_json::Value) -> Result<EntitySet, OracleError> {
    serde_json::from_value::<EntitySet>(value)
        .map(EntitySet::normalized)
        .map_err(|e| OracleError::Malformed(format!("entity fields: {}", e)))
}

#[async_trait]
impl EntityOracle for LlmEntityExtractor {
    async fn extract(&self, sql: &str) -> Result<EntitySet, ExtractionError> {
        let key = self.cache_key(sql);
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            tracing::debug!(event = "entity.cache_hit", key = %key);
            return Ok(hit);
        }

        let resp = complete_within(self.client.as_ref(), &prompt(sql), self.timeout).await?;
        let entities = parse_entities(extract_json_object(&resp.text)?)?;

        if let Some(cache) = &self.cache {
            cache.insert(key, entities.clone());
        }
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NA;
    use crate::providers::llm::fake::FakeClient;
    use serde_json::json;

    const ANSWER: &str = r#"{"tables": ["Employees"], "columns": ["first_name"], "conditions": ["NA"], "aggregate_functions": []}"#;

    #[tokio::test]
    async fn test_extract_parses_and_caches() {
        let client = Arc::new(FakeClient::new("m").with_rule("Query: SELECT first_name", ANSWER));
        let ex = LlmEntityExtractor::new(client.clone(), Duration::from_secs(5), 16);

        let e = ex.extract("SELECT first_name FROM employees").await.unwrap();
        assert_eq!(e.tables, vec!["employees"]);
        assert_eq!(e.conditions, vec![NA]);
        assert_eq!(e.aggregate_functions, vec![NA]);

        // whitespace differences hit the same cache entry
        ex.extract("SELECT  first_name\nFROM employees").await.unwrap();
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_answer_is_extraction_error() {
        let client = Arc::new(FakeClient::new("m").with_fallback("sorry, no idea"));
        let ex = LlmEntityExtractor::new(client.clone(), Duration::from_secs(5), 16);

        let err = ex.extract("SELECT 1").await.unwrap_err();
        assert!(matches!(err.0, OracleError::Malformed(_)));

        // failures are not cached
        ex.extract("SELECT 1").await.unwrap_err();
        assert_eq!(client.calls(), 2);
    }

    #[test]
    fn test_parse_entities_rejects_wrong_shape() {
        assert!(parse_entities(json!({"tables": "t"})).is_err());
        let e = parse_entities(json!({})).unwrap();
        assert_eq!(e.columns, vec![NA]);
    }
}
