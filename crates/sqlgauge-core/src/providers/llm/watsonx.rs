use super::LlmClient;
use crate::model::LlmResponse;
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

const IAM_URL: &str = "https://iam.cloud.ibm.com/identity/token";
const API_VERSION: &str = "2023-05-29";
/// Refresh the IAM token this many seconds before it expires.
const TOKEN_SKEW_SECS: i64 = 60;

struct IamToken {
    value: String,
    expires_at: i64,
}

/// watsonx.ai text generation. Exchanges the API key for an IAM bearer
/// token and reuses it until shortly before expiry.
pub struct WatsonxClient {
    pub url: String,
    pub api_key: String,
    pub project_id: String,
    pub model: String,
    pub temperature: f32,
    pub max_new_tokens: u32,
    pub stop_sequences: Vec<String>,
    client: reqwest::Client,
    token: Mutex<Option<IamToken>>,
}

impl WatsonxClient {
    pub fn new(
        url: String,
        api_key: String,
        project_id: String,
        model: String,
        temperature: f32,
        max_new_tokens: u32,
    ) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key,
            project_id,
            model,
            temperature,
            max_new_tokens,
            stop_sequences: vec!["}".to_string()],
            client: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    async fn bearer(&self) -> anyhow::Result<String> {
        let mut guard = self.token.lock().await;
        let now = chrono::Utc::now().timestamp();
        if let Some(t) = guard.as_ref() {
            if t.expires_at - TOKEN_SKEW_SECS > now {
                return Ok(t.value.clone());
            }
        }

        let resp = self
            .client
            .post(IAM_URL)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "urn:ibm:params:oauth:grant-type:apikey"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("watsonx IAM token exchange failed ({}): {}", status, error_text);
        }

        let body: serde_json::Value = resp.json().await?;
        let value = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("watsonx IAM response missing access_token"))?
            .to_string();
        let expires_at = body
            .get("expiration")
            .and_then(|v| v.as_i64())
            .unwrap_or(now + 3600);

        *guard = Some(IamToken {
            value: value.clone(),
            expires_at,
        });
        Ok(value)
    }

    fn parameters(&self) -> serde_json::Value {
        if self.temperature > 0.0 {
            json!({
                "decoding_method": "sample",
                "temperature": self.temperature,
                "top_p": 0.7,
                "max_new_tokens": self.max_new_tokens,
                "stop_sequences": self.stop_sequences,
            })
        } else {
            json!({
                "decoding_method": "greedy",
                "max_new_tokens": self.max_new_tokens,
                "stop_sequences": self.stop_sequences,
            })
        }
    }
}

#[async_trait]
impl LlmClient for WatsonxClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        let token = self.bearer().await?;
        let url = format!("{}/ml/v1/text/generation?version={}", self.url, API_VERSION);

        let body = json!({
            "model_id": self.model,
            "project_id": self.project_id,
            "input": prompt,
            "parameters": self.parameters(),
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("watsonx generation API error ({}): {}", status, error_text);
        }

        let json: serde_json::Value = resp.json().await?;
        let text = json
            .pointer("/results/0/generated_text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("watsonx response missing generated_text"))?
            .to_string();

        Ok(LlmResponse {
            text,
            provider: "watsonx".to_string(),
            model: self.model.clone(),
            cached: false,
            meta: json!({
                "stop_reason": json.pointer("/results/0/stop_reason"),
                "generated_token_count": json.pointer("/results/0/generated_token_count"),
            }),
        })
    }

    fn provider_name(&self) -> &'static str {
        "watsonx"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(temperature: f32) -> WatsonxClient {
        WatsonxClient::new(
            "https://us-south.ml.cloud.ibm.com/".into(),
            "key".into(),
            "proj".into(),
            "mistralai/mixtral-8x7b-instruct-v01".into(),
            temperature,
            250,
        )
    }

    #[test]
    fn test_greedy_when_temperature_zero() {
        let c = client(0.0);
        assert_eq!(c.url, "https://us-south.ml.cloud.ibm.com");
        let p = c.parameters();
        assert_eq!(p["decoding_method"], "greedy");
        assert_eq!(p["stop_sequences"][0], "}");
        assert!(p.get("temperature").is_none());
    }

    #[test]
    fn test_sampling_when_temperature_set() {
        let p = client(0.8).parameters();
        assert_eq!(p["decoding_method"], "sample");
        assert_eq!(p["max_new_tokens"], 250);
    }
}
