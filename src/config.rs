#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::{Context, Result};
use async_openai::types::chat::ReasoningEffort;
use reqwest::Client;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default model for structured-output grading.
pub const DEFAULT_MODEL: &str = "gpt-5";

/// Default model for the free-form fallback.
pub const DEFAULT_FALLBACK_MODEL: &str = "gpt-4o";

/// Default deadline for a single external call, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;

/// Parses the optional reasoning-effort environment value into the OpenAI enum,
/// defaulting to `ReasoningEffort::Medium` when unset or unrecognised.
fn parse_reasoning_effort(val: Option<String>) -> ReasoningEffort {
    match val
        .map(|s| s.to_ascii_lowercase())
        .as_deref()
        .unwrap_or("medium")
    {
        "low" => ReasoningEffort::Low,
        "high" => ReasoningEffort::High,
        _ => ReasoningEffort::Medium,
    }
}

/// OpenAI credentials and optional tuning parameters sourced from the
/// environment.
#[derive(Clone)]
pub struct OpenAiEnv {
    /// Base URL for the OpenAI-compatible API endpoint.
    api_base:         String,
    /// API key used to authenticate OpenAI requests.
    api_key:          String,
    /// Model used for structured-output grading.
    model:            String,
    /// Model used for the free-form fallback.
    fallback_model:   String,
    /// Optional temperature override, if provided.
    temperature:      Option<f32>,
    /// Optional top-p override, if provided.
    top_p:            Option<f32>,
    /// Reasoning effort hint to send with requests.
    reasoning_effort: ReasoningEffort,
}

impl OpenAiEnv {
    /// Construct an `OpenAiEnv` from environment variables; returns `None` if
    /// the API key is missing.
    fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construct an `OpenAiEnv` from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let api_key = non_empty("OPENAI_API_KEY")?;
        let api_base = non_empty("OPENAI_ENDPOINT").unwrap_or_else(|| DEFAULT_API_BASE.into());
        let model = non_empty("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());
        let fallback_model =
            non_empty("OPENAI_FALLBACK_MODEL").unwrap_or_else(|| DEFAULT_FALLBACK_MODEL.into());

        let temperature = non_empty("OPENAI_TEMPERATURE").and_then(|s| s.parse::<f32>().ok());
        let top_p = non_empty("OPENAI_TOP_P").and_then(|s| s.parse::<f32>().ok());
        let reasoning_effort = parse_reasoning_effort(non_empty("OPENAI_REASONING_EFFORT"));

        Some(Self {
            api_base,
            api_key,
            model,
            fallback_model,
            temperature,
            top_p,
            reasoning_effort,
        })
    }

    /// Returns the API base URL used for OpenAI requests.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the API key used for OpenAI requests.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the structured-output model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the fallback model identifier.
    pub fn fallback_model(&self) -> &str {
        &self.fallback_model
    }

    /// Returns the configured temperature, if any.
    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Returns the configured top_p, if any.
    pub fn top_p(&self) -> Option<f32> {
        self.top_p
    }

    /// Returns the reasoning effort level (defaults to Medium when
    /// unspecified).
    pub fn reasoning_effort(&self) -> ReasoningEffort {
        self.reasoning_effort.clone()
    }
}

/// Prompt assets embedded in the binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GradingPrompts {
    /// Grading policy sent as the system message.
    system_policy:   String,
    /// Formatting instructions appended in fallback mode. Contains a
    /// `{SCHEMA}` placeholder.
    fallback_format: String,
}

impl GradingPrompts {
    /// Load prompt templates embedded in the binary.
    pub fn load() -> Self {
        Self {
            system_policy:   include_str!("prompts/system_policy.md").to_string(),
            fallback_format: include_str!("prompts/fallback_format.md").to_string(),
        }
    }

    /// Returns the grading policy.
    pub fn system_policy(&self) -> &str {
        &self.system_policy
    }

    /// Returns the fallback formatting instructions with the schema filled in.
    pub fn fallback_format(&self, schema: &str) -> String {
        self.fallback_format.replace("{SCHEMA}", schema)
    }
}

impl Default for GradingPrompts {
    fn default() -> Self {
        Self::load()
    }
}

/// Runtime and prompt configuration shared across the crate.
pub struct ConfigState {
    /// Shared reqwest HTTP client reused by every model call.
    http_client:     Client,
    /// Embedded prompt catalog.
    prompts:         GradingPrompts,
    /// Cached OpenAI configuration, if available.
    openai:          Option<OpenAiEnv>,
    /// Deadline for one external call.
    request_timeout: Duration,
}

impl ConfigState {
    /// Construct a new configuration instance by reading environment and prompt
    /// assets.
    fn new() -> Result<Self> {
        let http_client = Client::builder()
            // Avoid macOS dynamic store lookups that fail in sandboxed environments.
            .no_proxy()
            .build()
            .context("Failed to construct shared HTTP client")?;

        Ok(Self {
            http_client,
            prompts: GradingPrompts::load(),
            openai: OpenAiEnv::from_env(),
            request_timeout: read_timeout_secs(
                "AIGRADE_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
        })
    }

    /// Returns a clone of the shared reqwest HTTP client.
    pub fn http_client(&self) -> Client {
        self.http_client.clone()
    }

    /// Returns the prompt catalog.
    pub fn prompts(&self) -> &GradingPrompts {
        &self.prompts
    }

    /// Returns the OpenAI configuration, if an API key is present.
    pub fn openai(&self) -> Option<&OpenAiEnv> {
        self.openai.as_ref()
    }

    /// Returns the deadline for one external call.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Shared configuration handle used throughout the crate.
#[derive(Clone)]
pub struct ConfigHandle(Arc<ConfigState>);

impl std::ops::Deref for ConfigHandle {
    type Target = ConfigState;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Global storage for the lazily constructed configuration state.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<ConfigState>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<ConfigState>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Ensure the global configuration has been initialized and return a handle.
pub fn ensure_initialized() -> Result<ConfigHandle> {
    let mut guard = slot()
        .lock()
        .map_err(|_| anyhow::anyhow!("config slot poisoned"))?;
    if let Some(cfg) = guard.as_ref() {
        return Ok(ConfigHandle(Arc::clone(cfg)));
    }

    let cfg = Arc::new(ConfigState::new()?);
    *guard = Some(Arc::clone(&cfg));
    Ok(ConfigHandle(cfg))
}

/// Returns the OpenAI configuration or explains which variable is missing.
pub fn openai_config() -> Result<OpenAiEnv> {
    ensure_initialized()?
        .openai()
        .cloned()
        .context("OPENAI_API_KEY must be set to grade submissions")
}

/// Returns the embedded prompt catalog.
pub fn prompts() -> Result<GradingPrompts> {
    Ok(ensure_initialized()?.prompts().clone())
}

/// Returns a clone of the shared reqwest HTTP client.
pub fn http_client() -> Result<Client> {
    Ok(ensure_initialized()?.http_client())
}

/// Returns the configured per-call deadline.
pub fn request_timeout() -> Result<Duration> {
    Ok(ensure_initialized()?.request_timeout())
}

/// Parses an environment variable into a `Duration`, falling back to
/// `default_secs` when parsing fails or the variable is missing.
fn read_timeout_secs(env: &str, default_secs: u64) -> Duration {
    std::env::var(env)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}
