//! LLM scoring client.

use async_trait::async_trait;
use hookclip_models::Chunk;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{LlmProvider, ScorerConfig};
use crate::error::{ScorerError, ScorerResult};
use crate::parse::{parse_scores, NEUTRAL_SCORE};

const SYSTEM_PROMPT: &str =
    "You are a social media content scoring assistant. Always respond with valid JSON.";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f64 = 0.3;

/// Rates transcript chunks for hook potential.
#[async_trait]
pub trait ChunkScorer: Send + Sync {
    /// One score in `[0, 1]` per chunk, in order. Never fails: unrated chunks
    /// get the neutral score.
    async fn score_chunks(&self, chunks: &[Chunk], title: &str) -> Vec<f64>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

/// [`ChunkScorer`] backed by OpenAI chat completions or Anthropic messages.
#[derive(Debug, Clone)]
pub struct LlmScorer {
    config: ScorerConfig,
    client: Client,
}

impl LlmScorer {
    pub fn new(config: ScorerConfig) -> ScorerResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> ScorerResult<Self> {
        Self::new(ScorerConfig::from_env())
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Score one batch; `start_index` is the global index of its first chunk.
    pub async fn score_batch(
        &self,
        chunks: &[Chunk],
        title: &str,
        start_index: usize,
    ) -> ScorerResult<Vec<f64>> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ScorerError::Config("no API key".to_string()))?;

        let prompt = build_prompt(chunks, title, start_index);
        info!(
            "Calling {} ({}) for chunks {}-{}",
            self.config.provider,
            self.config.model(),
            start_index,
            start_index + chunks.len().saturating_sub(1)
        );

        let reply = match self.config.provider {
            LlmProvider::OpenAi => self.call_openai(api_key, &prompt).await?,
            LlmProvider::Anthropic => self.call_anthropic(api_key, &prompt).await?,
        };
        debug!("LLM reply: {}", reply);

        parse_scores(&reply, start_index, chunks.len())
    }

    async fn call_openai(&self, api_key: &str, prompt: &str) -> ScorerResult<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'));
        let request = OpenAiRequest {
            model: self.config.model(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ScorerError::Api {
                provider: "OpenAI",
                status,
                body,
            });
        }

        let data: OpenAiResponse = response.json().await?;
        data.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ScorerError::response("no choices in OpenAI response"))
    }

    async fn call_anthropic(&self, api_key: &str, prompt: &str) -> ScorerResult<String> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let request = AnthropicRequest {
            model: self.config.model(),
            max_tokens: ANTHROPIC_MAX_TOKENS,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ScorerError::Api {
                provider: "Anthropic",
                status,
                body,
            });
        }

        let data: AnthropicResponse = response.json().await?;
        data.content
            .into_iter()
            .find_map(|b| b.text)
            .ok_or_else(|| ScorerError::response("no text block in Anthropic response"))
    }
}

#[async_trait]
impl ChunkScorer for LlmScorer {
    async fn score_chunks(&self, chunks: &[Chunk], title: &str) -> Vec<f64> {
        if !self.config.is_enabled() {
            info!("No LLM API key configured, returning uniform scores");
            return vec![NEUTRAL_SCORE; chunks.len()];
        }

        let batch_size = self.config.batch_size.max(1);
        let mut scores = Vec::with_capacity(chunks.len());

        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            let start_index = batch_no * batch_size;
            match self.score_batch(batch, title, start_index).await {
                Ok(batch_scores) => {
                    metrics::counter!("hookclip_llm_batches_total", "outcome" => "ok").increment(1);
                    scores.extend(batch_scores);
                }
                Err(e) => {
                    metrics::counter!("hookclip_llm_batches_total", "outcome" => "error").increment(1);
                    warn!(
                        "LLM scoring failed for batch starting at {}: {}",
                        start_index, e
                    );
                    scores.extend(std::iter::repeat(NEUTRAL_SCORE).take(batch.len()));
                }
            }
        }
        scores
    }
}

/// Prompt asking for `{index, score}` ratings of each chunk.
pub fn build_prompt(chunks: &[Chunk], title: &str, start_index: usize) -> String {
    let segments: String = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "\nSegment {} [{:.1}s - {:.1}s]:\n\"{}\"\n",
                start_index + i,
                chunk.start,
                chunk.end,
                chunk.text
            )
        })
        .collect();

    format!(
        r#"You are an expert social media content strategist. Analyze these transcript segments from the video "{title}" and score each one on its potential as a short-form video hook/clip.

Score each segment from 0.0 to 1.0 based on:
1. Hook potential - Does it grab attention immediately?
2. Emotional engagement - Does it evoke curiosity, surprise, humor, or strong emotion?
3. Standalone clarity - Can it be understood without additional context?
4. Virality - Would someone share or engage with this clip?

{segments}

Respond with a JSON array of objects. Each object must have "index" (the segment number) and "score" (0.0 to 1.0).

Example response format:
[{{"index": 0, "score": 0.85}}, {{"index": 1, "score": 0.42}}]

Return ONLY the JSON array, no other text."#
    )
}
