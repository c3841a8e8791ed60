#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The boundary with the external model service.

use std::{future::Future, time::Duration};

use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    types::chat::{
        CreateChatCompletionRequest, CreateChatCompletionResponse, ResponseFormat,
        ResponseFormatJsonSchema,
    },
};
use tracing::debug;

use crate::{config::OpenAiEnv, error::ServiceError, request::RequestPayload};

/// What structured-output mode can hand back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredReply {
    /// The raw JSON text the model produced under the schema constraint.
    Content(String),
    /// The model's explicit refusal message.
    Refusal(String),
}

/// The two invocation modes offered by a model provider.
///
/// Both calls may be slow, rate limited or fail transiently; callers get a
/// [`ServiceError`] in that case and decide what to do about it.
pub trait ModelService: Send + Sync {
    /// Asks for a reply constrained to `payload.schema()`.
    fn structured(
        &self,
        payload: &RequestPayload,
    ) -> impl Future<Output = Result<StructuredReply, ServiceError>> + Send;

    /// Asks for an unconstrained text reply using the fallback prompt.
    fn freeform(
        &self,
        payload: &RequestPayload,
    ) -> impl Future<Output = Result<String, ServiceError>> + Send;
}

/// [`ModelService`] backed by an OpenAI-compatible chat completions API.
pub struct OpenAiService {
    /// Configured API client.
    client:  OpenAIClient<OpenAIConfig>,
    /// Models and sampling parameters.
    env:     OpenAiEnv,
    /// Deadline for each call.
    timeout: Duration,
}

impl OpenAiService {
    /// Creates a service that talks to the endpoint described by `env`.
    pub fn new(env: OpenAiEnv, http_client: reqwest::Client, timeout: Duration) -> Self {
        let client = OpenAIClient::with_config(
            OpenAIConfig::new()
                .with_api_base(env.api_base().to_owned())
                .with_api_key(env.api_key().to_owned()),
        )
        .with_http_client(http_client);

        Self {
            client,
            env,
            timeout,
        }
    }

    /// Sends `request`, enforcing the configured deadline.
    async fn send(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, ServiceError> {
        tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| ServiceError::Timeout(self.timeout))?
            .map_err(ServiceError::from)
    }
}

impl ModelService for OpenAiService {
    async fn structured(&self, payload: &RequestPayload) -> Result<StructuredReply, ServiceError> {
        let request = CreateChatCompletionRequest {
            model: self.env.model().to_owned(),
            messages: payload.messages()?,
            response_format: Some(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    name:        payload.schema_name().to_owned(),
                    description: Some("Structured grading report for one submission".into()),
                    schema:      Some(payload.schema().clone()),
                    strict:      Some(true),
                },
            }),
            temperature: self.env.temperature(),
            top_p: self.env.top_p(),
            n: Some(1),
            stream: Some(false),
            reasoning_effort: Some(self.env.reasoning_effort()),
            ..Default::default()
        };

        let response = self.send(request).await?;
        debug!(identifier = payload.identifier(), "structured response received");

        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or(ServiceError::EmptyResponse)?
            .message;

        match (message.refusal, message.content) {
            (Some(refusal), _) if !refusal.trim().is_empty() => {
                Ok(StructuredReply::Refusal(refusal))
            }
            (_, content) => Ok(StructuredReply::Content(content.unwrap_or_default())),
        }
    }

    async fn freeform(&self, payload: &RequestPayload) -> Result<String, ServiceError> {
        let request = CreateChatCompletionRequest {
            model: self.env.fallback_model().to_owned(),
            messages: payload.fallback_messages()?,
            temperature: self.env.temperature(),
            top_p: self.env.top_p(),
            n: Some(1),
            stream: Some(false),
            ..Default::default()
        };

        let response = self.send(request).await?;
        debug!(identifier = payload.identifier(), "free-form response received");

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ServiceError::EmptyResponse)
    }
}
