use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod path_resolver;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 100;
pub const DEFAULT_CACHE_ENTRIES: u64 = 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GaugeConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub oracle: OracleSettings,
    #[serde(default)]
    pub settings: Settings,
}

impl Default for GaugeConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            database: default_database(),
            oracle: OracleSettings::default(),
            settings: Settings::default(),
        }
    }
}

fn default_version() -> u32 {
    SUPPORTED_CONFIG_VERSION
}

fn default_database() -> PathBuf {
    PathBuf::from("t2s_sample.db")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleSettings {
    /// watsonx | openai | fake
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl OracleSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    pub fn model_or_default(&self) -> String {
        if let Some(m) = &self.model {
            return m.clone();
        }
        match self.provider.as_str() {
            "openai" => "gpt-4o-mini".to_string(),
            "watsonx" => "mistralai/mixtral-8x7b-instruct-v01".to_string(),
            other => other.to_string(),
        }
    }
}

fn default_provider() -> String {
    "watsonx".to_string()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_timeout_seconds() -> u64 {
    60
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Upper bound on in-flight data-comparison calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_entries: Option<u64>,
}

impl Settings {
    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(
            self.sample_interval_ms
                .unwrap_or(DEFAULT_SAMPLE_INTERVAL_MS)
                .max(1),
        )
    }

    pub fn cache_entries(&self) -> u64 {
        self.cache_entries.unwrap_or(DEFAULT_CACHE_ENTRIES)
    }
}

pub fn load_config(path: &Path, strict: bool) -> Result<GaugeConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw, path, strict)
}

pub fn parse_config(raw: &str, path: &Path, strict: bool) -> Result<GaugeConfig, ConfigError> {
    let mut ignored_keys = std::collections::BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);

    let mut cfg: GaugeConfig = serde_ignored::deserialize(deserializer, |p| {
        ignored_keys.insert(p.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    let meaningful_unknowns: Vec<_> = ignored_keys
        .iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();

    if !meaningful_unknowns.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "unknown fields detected in strict mode: {:?} (file: {})",
                meaningful_unknowns,
                path.display()
            )));
        }
        tracing::warn!(
            event = "config.unknown_fields",
            fields = ?meaningful_unknowns,
            file = %path.display(),
            "ignored unknown config fields"
        );
    }

    if cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(ConfigError(format!(
            "unsupported config version {} (supported: {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }

    if !matches!(cfg.oracle.provider.as_str(), "watsonx" | "openai" | "fake") {
        return Err(ConfigError(format!(
            "unknown oracle provider '{}' (expected watsonx|openai|fake)",
            cfg.oracle.provider
        )));
    }

    cfg.database = path_resolver::PathResolver::new(path).resolve(&cfg.database);
    Ok(cfg)
}

/// Credentials for the external LLM oracle, read from the environment only.
#[derive(Clone, PartialEq)]
pub enum OracleCredentials {
    Watsonx {
        url: String,
        api_key: String,
        project_id: String,
    },
    OpenAi {
        api_key: String,
    },
    None,
}

impl std::fmt::Debug for OracleCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleCredentials::Watsonx { url, project_id, .. } => f
                .debug_struct("Watsonx")
                .field("url", url)
                .field("project_id", project_id)
                .field("api_key", &"<redacted>")
                .finish(),
            OracleCredentials::OpenAi { .. } => f
                .debug_struct("OpenAi")
                .field("api_key", &"<redacted>")
                .finish(),
            OracleCredentials::None => f.write_str("None"),
        }
    }
}

pub const WATSONX_VARS: [&str; 3] = ["WATSONX_URL", "WATSONX_APIKEY", "WATSONX_PROJECT_ID"];
pub const OPENAI_VARS: [&str; 1] = ["OPENAI_API_KEY"];

impl OracleCredentials {
    pub fn from_env(provider: &str) -> Result<Self, ConfigError> {
        Self::resolve(provider, |k| std::env::var(k).ok())
    }

    pub fn resolve(
        provider: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        match provider {
            "watsonx" => {
                let missing: Vec<&str> = WATSONX_VARS
                    .iter()
                    .copied()
                    .filter(|k| get(k).is_none())
                    .collect();
                if !missing.is_empty() {
                    return Err(ConfigError(format!(
                        "watsonx oracle selected but {} not set",
                        missing.join(", ")
                    )));
                }
                Ok(OracleCredentials::Watsonx {
                    url: get("WATSONX_URL").unwrap_or_default(),
                    api_key: get("WATSONX_APIKEY").unwrap_or_default(),
                    project_id: get("WATSONX_PROJECT_ID").unwrap_or_default(),
                })
            }
            "openai" => match get("OPENAI_API_KEY") {
                Some(api_key) => Ok(OracleCredentials::OpenAi { api_key }),
                None => Err(ConfigError(
                    "openai oracle selected but OPENAI_API_KEY not set".into(),
                )),
            },
            "fake" => Ok(OracleCredentials::None),
            other => Err(ConfigError(format!("unknown oracle provider '{}'", other))),
        }
    }
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(
        path,
        r#"version: 1
database: t2s_sample.db
oracle:
  provider: watsonx            # watsonx | openai | fake
  model: mistralai/mixtral-8x7b-instruct-v01
  temperature: 0.0
  max_tokens: 500
  timeout_seconds: 60
settings:
  concurrency: 4               # in-flight result comparisons
  sample_interval_ms: 100      # profiler memory sampling
  cache_entries: 1024          # entity extraction cache
"#,
    )
    .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(raw: &str, strict: bool) -> Result<GaugeConfig, ConfigError> {
        parse_config(raw, Path::new("cfg/sqlgauge.yaml"), strict)
    }

    #[test]
    fn test_defaults_and_relative_database() {
        let cfg = parse("version: 1\ndatabase: data/t2s.db\n", true).unwrap();
        assert_eq!(cfg.database, PathBuf::from("cfg/data/t2s.db"));
        assert_eq!(cfg.oracle.provider, "watsonx");
        assert_eq!(cfg.settings.concurrency(), DEFAULT_CONCURRENCY);
        assert_eq!(cfg.settings.sample_interval(), Duration::from_millis(100));
        assert_eq!(
            cfg.oracle.model_or_default(),
            "mistralai/mixtral-8x7b-instruct-v01"
        );
    }

    #[test]
    fn test_unknown_fields_strict_vs_lenient() {
        let raw = "version: 1\nsettings:\n  paralel: 3\n";
        let err = parse(raw, true).unwrap_err();
        assert!(err.to_string().contains("settings.paralel"));

        assert!(parse(raw, false).is_ok());
        assert!(parse("version: 1\nx-anchor: 1\n", true).is_ok());
    }

    #[test]
    fn test_rejects_bad_version_and_provider() {
        assert!(parse("version: 2\n", false)
            .unwrap_err()
            .to_string()
            .contains("unsupported config version"));
        assert!(parse("oracle:\n  provider: bard\n", false)
            .unwrap_err()
            .to_string()
            .contains("unknown oracle provider"));
    }

    #[test]
    fn test_credentials_missing_is_config_error() {
        let env: HashMap<&str, &str> = [("WATSONX_URL", "https://x")].into_iter().collect();
        let err = OracleCredentials::resolve("watsonx", |k| env.get(k).map(|v| v.to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("WATSONX_APIKEY"));
        assert!(err.to_string().contains("WATSONX_PROJECT_ID"));

        let creds = OracleCredentials::resolve("fake", |_| None).unwrap();
        assert_eq!(creds, OracleCredentials::None);
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = OracleCredentials::OpenAi {
            api_key: "sk-secret".into(),
        };
        assert!(!format!("{:?}", creds).contains("sk-secret"));
    }
}
