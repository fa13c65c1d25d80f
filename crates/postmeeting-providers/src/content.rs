//! Follow-up email and social post generation through an OpenAI-compatible
//! chat completions endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::http;
use crate::provider::BoxFuture;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// Tone used for social posts when none is requested.
pub const DEFAULT_TONE: &str = "warm financial advisor";

/// Hashtag budget used for social posts when none is requested.
pub const DEFAULT_HASHTAG_COUNT: u32 = 3;

const EMAIL_SYSTEM_PROMPT: &str = "You are a professional financial advisor assistant. \
Generate warm, professional follow-up emails based on meeting transcripts.";

const POST_SYSTEM_PROMPT: &str = "You are a financial advisor creating engaging social media content. \
Generate posts that are professional, warm, and valuable to your audience.";

/// Style knobs for a generated social post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStyle {
    pub tone: String,
    pub hashtag_count: u32,
}

impl Default for PostStyle {
    fn default() -> Self {
        Self {
            tone: DEFAULT_TONE.to_string(),
            hashtag_count: DEFAULT_HASHTAG_COUNT,
        }
    }
}

impl PostStyle {
    /// Fills unset values with the defaults.
    pub fn from_options(tone: Option<String>, hashtag_count: Option<u32>) -> Self {
        Self {
            tone: tone
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TONE.to_string()),
            hashtag_count: hashtag_count.unwrap_or(DEFAULT_HASHTAG_COUNT),
        }
    }
}

/// Generates follow-up content from meeting transcripts.
pub trait ContentGenerator: Send + Sync {
    fn generate_email<'a>(
        &'a self,
        transcript: &'a str,
        attendees: &'a [String],
    ) -> BoxFuture<'a, ProviderResult<String>>;

    fn generate_post<'a>(
        &'a self,
        transcript: &'a str,
        style: &'a PostStyle,
    ) -> BoxFuture<'a, ProviderResult<String>>;
}

/// Configuration for [`OpenAiGenerator`].
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENAI_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn email_prompt(transcript: &str, attendees: &[String]) -> String {
    format!(
        "You are a professional financial advisor. Based on the following meeting transcript, \
generate a warm, professional follow-up email.

Meeting Transcript:
{transcript}

Attendees: {attendees}

Generate a follow-up email that:
- Thanks attendees for their time
- Summarizes key discussion points
- Includes any action items or next steps
- Maintains a warm, professional tone
- Is concise but comprehensive

Email:",
        attendees = attendees.join(", ")
    )
}

fn post_prompt(transcript: &str, style: &PostStyle) -> String {
    format!(
        "You are a financial advisor creating a social media post. Based on the following \
meeting transcript, generate a social media post.

Meeting Transcript:
{transcript}

Requirements:
- 120-180 words
- First-person perspective
- {tone} tone
- Up to {hashtags} relevant hashtags
- Engaging and professional
- Highlights key insights or takeaways

Social Media Post:",
        tone = style.tone,
        hashtags = style.hashtag_count
    )
}

/// Content generator backed by OpenAI chat completions.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    config: OpenAiConfig,
    http_client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiConfig) -> ProviderResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::configuration("openai api_key is not configured")
                .with_provider("openai"));
        }
        let http_client = http::build_client(config.timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }

    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> ProviderResult<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature,
            max_tokens,
        };

        debug!(model = %self.config.model, "requesting completion");
        let url = format!("{}/chat/completions", self.config.base_url);
        let (status, body) = http::execute(
            self.http_client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&request),
        )
        .await
        .map_err(|e| e.with_provider("openai"))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| http::snippet(&body));
            return Err(http::status_error(
                status,
                format!("completion failed ({}): {}", status, detail),
            )
            .with_provider("openai"));
        }

        let response: ChatResponse =
            http::parse_json(&body, "completion").map_err(|e| e.with_provider("openai"))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                ProviderError::invalid_response("completion returned no content")
                    .with_provider("openai")
            })
    }
}

impl ContentGenerator for OpenAiGenerator {
    fn generate_email<'a>(
        &'a self,
        transcript: &'a str,
        attendees: &'a [String],
    ) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(async move {
            let prompt = email_prompt(transcript, attendees);
            self.complete(EMAIL_SYSTEM_PROMPT, &prompt, 0.7, 1000).await
        })
    }

    fn generate_post<'a>(
        &'a self,
        transcript: &'a str,
        style: &'a PostStyle,
    ) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(async move {
            let prompt = post_prompt(transcript, style);
            self.complete(POST_SYSTEM_PROMPT, &prompt, 0.8, 300).await
        })
    }
}
