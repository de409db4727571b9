//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, EngineConfig, EventsConfig, LlmConfig, LogFormat, LoggingConfig, SeedConfig,
    SeedWebhook, ServerConfig,
};
