use super::LlmClient;
use crate::model::LlmResponse;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scripted client for offline runs and tests. The first rule whose needle
/// occurs in the prompt answers; otherwise the fallback does.
pub struct FakeClient {
    model: String,
    rules: Vec<(String, String)>,
    fallback: Option<String>,
    calls: AtomicUsize,
}

impl FakeClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            rules: Vec::new(),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_rule(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), response.into()));
        self
    }

    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let text = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, r)| r.clone())
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| anyhow::anyhow!("fake client: no scripted response for prompt"))?;

        Ok(LlmResponse {
            text,
            provider: self.provider_name().to_string(),
            model: self.model.clone(),
            cached: false,
            meta: serde_json::json!({ "fake": true }),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let c = FakeClient::new("m")
            .with_rule("orders", "A")
            .with_rule("SELECT", "B")
            .with_fallback("C");

        assert_eq!(c.complete("SELECT * FROM orders").await.unwrap().text, "A");
        assert_eq!(c.complete("SELECT 1").await.unwrap().text, "B");
        assert_eq!(c.complete("hi").await.unwrap().text, "C");
        assert_eq!(c.calls(), 3);
    }

    #[tokio::test]
    async fn test_unscripted_prompt_errors() {
        let c = FakeClient::new("m");
        assert!(c.complete("anything").await.is_err());
    }
}
