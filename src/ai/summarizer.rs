use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, SummarizerProfile};
use crate::error::{AppError, Result};
use crate::models::SummaryResult;

use super::parser::{parse_reply, parse_tags};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
const TEMPERATURE: f32 = 0.5;
const TOP_P: f32 = 1.0;
const TOP_K: u32 = 250;

/// Assistant prefill that pins the reply to the output format.
const SUMMARY_PREFILL: &str = "<output>";
const TAGS_PREFILL: &str = "<tags>";

/// Generative summarization backend.
#[async_trait]
pub trait Summarize: Send + Sync {
    /// Summary and rationale of `text`. Missing reply regions come back as the
    /// extraction-failed sentinel instead of an error.
    async fn summarize(&self, text: &str, profile: &SummarizerProfile) -> Result<SummaryResult>;

    /// Flat list of technology keywords mentioned in `text`.
    async fn extract_tags(&self, text: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message>,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: Option<String>,
}

pub fn summary_prompt(text: &str, profile: &SummarizerProfile) -> String {
    format!(
        r#"<input>{text}</input>
<persona>You are a professional {persona}.</persona>
<instruction>Explain the update described in the <input></input> tags as bullet points covering "What is new" and "Who benefits from it". Put the bullet points inside <thinking></thinking> tags; every bullet starts with "- " and ends with a newline. Then write the final summary following the <summaryRule></summaryRule> tags. Keep everything short and easy to read. Use only information found in the input. Follow the <outputFormat></outputFormat> tags exactly.</instruction>
<outputLanguage>In {language}.</outputLanguage>
<summaryRule>The final summary is 1 or 2 sentences.</summaryRule>
<outputFormat><thinking>(bullet points of the input)</thinking><summary>(final summary)</summary></outputFormat>
Follow the instruction."#,
        text = text,
        persona = profile.persona,
        language = profile.output_language,
    )
}

pub fn tags_prompt(text: &str) -> String {
    format!(
        r#"<input>{text}</input>
<instruction>List the technology products, services, languages and protocols the input is about. Output at most 10 short keywords as a JSON array of strings inside <tags></tags> tags, for example <tags>["Rust", "PostgreSQL"]</tags>. Output nothing else.</instruction>"#,
        text = text,
    )
}

/// Anthropic Messages API client.
pub struct Summarizer {
    client: Client,
    model: ModelConfig,
    api_key: String,
}

impl Summarizer {
    pub fn new(model: ModelConfig, api_key: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            client,
            model,
            api_key,
        })
    }

    pub fn model_version(&self) -> &str {
        &self.model.id
    }

    /// Sends `prompt` with the assistant turn prefilled, returning prefill +
    /// completion so the regions parse as one document.
    async fn complete(&self, prompt: String, prefill: &str) -> Result<String> {
        let request = MessageRequest {
            model: &self.model.id,
            max_tokens: MAX_TOKENS,
            messages: vec![
                Message {
                    role: "user",
                    content: prompt,
                },
                Message {
                    role: "assistant",
                    content: prefill.to_string(),
                },
            ],
            temperature: TEMPERATURE,
            top_p: TOP_P,
            top_k: TOP_K,
        };

        let response = self
            .client
            .post(&self.model.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, error_text));
        }

        let message_response: MessageResponse = response.json().await?;
        let reply = reply_text(prefill, message_response);
        tracing::debug!(model = %self.model.id, "model output: {}", reply);
        Ok(reply)
    }
}

/// Prefill followed by the completion's text blocks, read as one document.
fn reply_text(prefill: &str, response: MessageResponse) -> String {
    let completion = response
        .content
        .into_iter()
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}{}", prefill, completion)
}

fn summary_from_reply(reply: &str) -> SummaryResult {
    let parsed = parse_reply(reply);
    if parsed.summary.is_missing() || parsed.rationale.is_missing() {
        tracing::warn!("model reply is missing a region, using sentinel");
    }

    SummaryResult {
        summary: parsed.summary.or_sentinel(),
        rationale: parsed.rationale.or_sentinel(),
        tags: Vec::new(),
    }
}

fn classify_failure(status: StatusCode, body: String) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            tracing::error!(
                %status,
                "model access denied: {}. Check that the API key is valid and allowed to call the configured model",
                body
            );
            AppError::ModelAccessDenied(format!("HTTP {}: {}", status, body))
        }
        _ => AppError::ModelApi(format!("HTTP {}: {}", status, body)),
    }
}

#[async_trait]
impl Summarize for Summarizer {
    async fn summarize(&self, text: &str, profile: &SummarizerProfile) -> Result<SummaryResult> {
        let reply = self.complete(summary_prompt(text, profile), SUMMARY_PREFILL).await?;
        Ok(summary_from_reply(&reply))
    }

    async fn extract_tags(&self, text: &str) -> Result<Vec<String>> {
        let reply = self.complete(tags_prompt(text), TAGS_PREFILL).await?;
        Ok(parse_tags(&reply))
    }
}
