//! Text generation backend.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::{chat, conf};

#[derive(thiserror::Error, Debug)]
pub enum GenerationError {
    #[error("upstream rejected the API key")]
    InvalidCredential,

    #[error("upstream returned no text")]
    Empty,

    #[error("upstream error {status}: {message}")]
    Upstream { status: StatusCode, message: String },

    #[error("failed to reach upstream: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct Prompt<'a> {
    pub system: &'a str,
    pub user: &'a str,
}

#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the non-empty generated text, paid for with `api_key`.
    async fn generate(
        &self,
        api_key: &str,
        prompt: Prompt<'_>,
    ) -> Result<String, GenerationError>;
}

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct OpenAi {
    client: Client,
    base_url: String,
    model: String,
}

impl OpenAi {
    pub fn new(conf: &conf::Llm) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs_f32(conf.timeout))
            .build()?;
        Ok(Self {
            client,
            base_url: conf.base_url.trim_end_matches('/').to_string(),
            model: conf.model.clone(),
        })
    }
}

#[async_trait::async_trait]
impl TextGenerator for OpenAi {
    #[tracing::instrument(name = "generate", skip_all, fields(model = %self.model))]
    async fn generate(
        &self,
        api_key: &str,
        prompt: Prompt<'_>,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let req = chat::Req {
            model: &self.model,
            messages: vec![
                chat::Msg {
                    role: chat::Role::System,
                    content: prompt.system,
                },
                chat::Msg {
                    role: chat::Role::User,
                    content: prompt.user,
                },
            ],
        };
        tracing::debug!(?url, "Sending completion request.");
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&req)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            let resp: chat::Resp = response.json().await?;
            return resp
                .first_content()
                .map(str::to_string)
                .ok_or(GenerationError::Empty);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<chat::ErrorResp>(&body)
            .ok()
            .map(|chat::ErrorResp { error }| error);
        let code = detail.as_ref().and_then(|d| d.code.as_deref());
        tracing::warn!(%status, ?code, "Upstream refused completion.");
        if status == StatusCode::UNAUTHORIZED || code == Some("invalid_api_key") {
            return Err(GenerationError::InvalidCredential);
        }
        let message = detail.map_or(body, |d| d.message);
        Err(GenerationError::Upstream { status, message })
    }
}
