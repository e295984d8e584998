use async_trait::async_trait;
use companion_types::{GenerateContentRequest, GenerateContentResponse};
#[cfg(test)]
use mockall::automock;
use reqwest::Client;

use crate::error::ChatError;

/// Anything that can answer a `generateContent` request.
///
/// The chat session depends on this trait rather than on the HTTP client, so
/// tests drive it with `MockLlmClient`.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait LlmClient {
    async fn generate(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ChatError>;
}

/// Talks to the LLM route of the companion relay, which holds the API key.
pub struct RelayLlmClient {
    client: Client,
    endpoint: String,
}

impl RelayLlmClient {
    pub fn new(relay_url: &str) -> Self {
        Self::with_client(Client::new(), relay_url)
    }

    pub fn with_client(client: Client, relay_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/llm", relay_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl LlmClient for RelayLlmClient {
    async fn generate(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ChatError> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::debug!(error = %e, "LLM envelope did not parse");
            ChatError::InvalidEnvelope
        })
    }
}
