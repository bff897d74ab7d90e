//! Process-wide configuration, loaded once from the environment at startup.
//!
//! A `.env` file is honoured (loaded in `main` before this runs). Secrets are
//! never hardcoded: the Vision credential and the Gemini key must be provided.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

use crate::extractor::ParseFailurePolicy;

const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;
const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub vision: VisionConfig,
    pub gemini: GeminiConfig,
    pub on_parse_failure: ParseFailurePolicy,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub endpoint: String,
    pub auth: VisionAuth,
}

/// How requests to Cloud Vision are authenticated.
#[derive(Clone, PartialEq)]
pub enum VisionAuth {
    /// Path to a service account JSON key.
    ServiceAccount(PathBuf),
    ApiKey(String),
}

impl std::fmt::Debug for VisionAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisionAuth::ServiceAccount(path) => f.debug_tuple("ServiceAccount").field(path).finish(),
            VisionAuth::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

// Keep the key out of logs.
impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let auth = match (get("VISION_API_KEY"), get("GOOGLE_APPLICATION_CREDENTIALS")) {
            (Some(key), _) => VisionAuth::ApiKey(key),
            (None, Some(path)) => VisionAuth::ServiceAccount(PathBuf::from(path)),
            (None, None) => {
                return Err(anyhow!(
                    "GOOGLE_APPLICATION_CREDENTIALS or VISION_API_KEY must be set"
                ))
            }
        };

        let api_key = get("GEMINI_API_KEY").ok_or_else(|| anyhow!("GEMINI_API_KEY not set"))?;

        Ok(Self {
            server: ServerConfig {
                host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(get("SERVER_PORT"), "SERVER_PORT", 5000)?,
                max_body_bytes: parse_or(
                    get("MAX_BODY_BYTES"),
                    "MAX_BODY_BYTES",
                    DEFAULT_MAX_BODY_BYTES,
                )?,
            },
            vision: VisionConfig {
                endpoint: get("VISION_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_VISION_ENDPOINT.to_string()),
                auth,
            },
            gemini: GeminiConfig {
                api_key,
                endpoint: get("GEMINI_ENDPOINT")
                    .map(|e| e.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_string()),
                model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                temperature: parse_or(
                    get("GEMINI_TEMPERATURE"),
                    "GEMINI_TEMPERATURE",
                    DEFAULT_TEMPERATURE,
                )?,
                max_output_tokens: parse_or(
                    get("GEMINI_MAX_OUTPUT_TOKENS"),
                    "GEMINI_MAX_OUTPUT_TOKENS",
                    DEFAULT_MAX_OUTPUT_TOKENS,
                )?,
            },
            on_parse_failure: parse_or(
                get("ON_PARSE_FAILURE"),
                "ON_PARSE_FAILURE",
                ParseFailurePolicy::default(),
            )?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
