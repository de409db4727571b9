use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::webhook::Webhook;
use crate::domain::{EventType, ModelParameters, RetryPolicy};
use crate::infrastructure::job::JobLifecycleConfig;
use crate::infrastructure::llm::{LlmInvokerConfig, DEFAULT_OPENAI_BASE_URL};
use crate::infrastructure::observability::MetricsConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub engine: EngineConfig,
    pub events: EventsConfig,
    pub metrics: MetricsConfig,
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Connection to the OpenAI-compatible LLM service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Transport-level timeout; the engine's per-call timeout applies on top
    pub timeout_ms: u64,
}

/// Engine tuning, handed to the engine by value at construction
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_model: String,
    pub default_parameters: ModelParameters,
    /// Per LLM call
    pub call_timeout_ms: u64,
    pub llm_max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_job_retries: u32,
    pub auto_resubmit: bool,
    pub worker_count: usize,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast buffer; slow subscribers past this lag lose events
    pub capacity: usize,
    /// Events handed to the webhook service at once
    pub webhook_concurrency: usize,
}

/// Definitions loaded at startup
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub workflows_dir: Option<PathBuf>,
    pub webhooks: Vec<SeedWebhook>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedWebhook {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub events: Vec<EventType>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub retry_count: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: None,
            timeout_ms: 120_000,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        let lifecycle = JobLifecycleConfig::default();
        Self {
            default_model: "gpt-4o-mini".to_string(),
            default_parameters: ModelParameters::default(),
            call_timeout_ms: 60_000,
            llm_max_attempts: retry.max_attempts,
            initial_delay_ms: retry.initial_delay_ms,
            max_delay_ms: retry.max_delay_ms,
            backoff_multiplier: retry.backoff_multiplier,
            max_job_retries: lifecycle.max_job_retries,
            auto_resubmit: lifecycle.auto_resubmit,
            worker_count: 4,
            queue_capacity: 1024,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            webhook_concurrency: 16,
        }
    }
}

impl EngineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.llm_max_attempts)
            .with_initial_delay(self.initial_delay_ms)
            .with_max_delay(self.max_delay_ms)
            .with_backoff_multiplier(self.backoff_multiplier)
    }

    pub fn invoker_config(&self) -> LlmInvokerConfig {
        LlmInvokerConfig {
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            retry: self.retry_policy(),
        }
    }

    pub fn lifecycle_config(&self) -> JobLifecycleConfig {
        JobLifecycleConfig {
            max_job_retries: self.max_job_retries,
            auto_resubmit: self.auto_resubmit,
        }
    }
}

impl SeedWebhook {
    pub fn to_webhook(&self) -> Webhook {
        let mut webhook = Webhook::new(self.id.as_str(), &self.name, &self.url).with_events(self.events.clone());
        if let Some(secret) = &self.secret {
            webhook = webhook.with_secret(secret);
        }
        for (key, value) in &self.headers {
            webhook = webhook.with_header(key, value);
        }
        if self.retry_count.is_some() || self.retry_delay_ms.is_some() {
            let count = self.retry_count.unwrap_or(webhook.retry_count);
            let delay = self.retry_delay_ms.unwrap_or(webhook.retry_delay_ms);
            webhook = webhook.with_retry_config(count, delay);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            webhook = webhook.with_timeout_ms(timeout_ms);
        }
        webhook
    }
}

impl AppConfig {
    /// Load `config/default`, `config/local`, then `APP__*` environment
    /// variables, later sources winning
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
