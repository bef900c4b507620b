//! Rig-backed generation against an OpenAI-compatible endpoint.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use tracing::debug;

use crate::config::LlmProviderConfig;
use crate::errors::GenerationError;
use crate::ports::ContentGenerationPort;

/// One agent per call: the preamble differs between grading, critique and
/// generation, and Rig agents fix theirs at build time.
pub struct RigGenerator {
    client: openai::CompletionsClient,
    model: String,
    temperature: f64,
}

impl RigGenerator {
    pub fn new(client: openai::CompletionsClient, model: &str, temperature: f64) -> Self {
        Self {
            client,
            model: model.to_string(),
            temperature,
        }
    }

    pub fn from_config(config: &LlmProviderConfig) -> anyhow::Result<Self> {
        let client = openai::CompletionsClient::builder()
            .api_key(&config.api_key)
            .base_url(&config.base_url)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build completions client: {e}"))?;
        Ok(Self::new(client, &config.model, config.temperature))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, preamble: Option<&str>, prompt: &str) -> Result<String, GenerationError> {
        let mut builder = self.client.agent(&self.model).temperature(self.temperature);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        let agent = builder.build();

        let prompt = prompt.to_string();
        debug!(model = %self.model, prompt_len = prompt.len(), "Prompting model");
        agent
            .prompt(&prompt)
            .await
            .map_err(|e| classify_failure(&e.to_string()))
    }
}

impl std::fmt::Debug for RigGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigGenerator")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ContentGenerationPort for RigGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.complete(None, prompt).await
    }

    async fn generate_with_preamble(
        &self,
        preamble: &str,
        prompt: &str,
    ) -> Result<String, GenerationError> {
        self.complete(Some(preamble), prompt).await
    }
}

/// Map a provider error message onto the retry taxonomy.
fn classify_failure(message: &str) -> GenerationError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        GenerationError::RateLimit(message.to_string())
    } else if lower.contains("401") || lower.contains("403") || lower.contains("model not found") {
        GenerationError::Configuration(message.to_string())
    } else {
        GenerationError::Transport(message.to_string())
    }
}

/// Check if an OpenAI-compatible endpoint is reachable.
pub async fn check_endpoint(url: &str) -> bool {
    let models_url = format!("{}/models", url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&models_url)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
