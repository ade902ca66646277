//! LLM narratives for analytics results.
//!
//! The advisor turns a tool's numbers into a few sentences of advice. It is
//! strictly optional: any failure is logged and the caller serves the
//! heuristic result alone.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use barback_core::analytics::{AnalyticsData, AnalyticsTool};

use crate::config::ServerConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cap on the JSON summary sent to the model.
const MAX_SUMMARY_CHARS: usize = 12_000;

const SYSTEM_PROMPT: &str = "You are an experienced bar manager and consultant. \
    You receive analytics computed from a bar's point-of-sale data as JSON. \
    Reply with three to five short, concrete recommendations in plain text. \
    Money amounts are in cents; convert them to dollars. Do not invent numbers.";

#[derive(Debug, Clone, Error)]
pub enum AdvisorError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("json error: {0}")]
    Serde(String),
    #[error("empty completion")]
    Empty,
}

impl AdvisorError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible chat client.
#[derive(Debug, Clone)]
pub struct Advisor {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl Advisor {
    /// `None` when no API key is configured.
    pub fn from_config(config: &ServerConfig) -> reqwest::Result<Option<Self>> {
        let Some(api_key) = config.openai_api_key.clone() else {
            return Ok(None);
        };

        Ok(Some(Advisor {
            http: super::http_client(REQUEST_TIMEOUT)?,
            api_key,
            model: config.openai_model.clone(),
            base_url: config.openai_base_url.clone(),
        }))
    }

    /// A narrative for `data`, or `None` if the model could not be reached.
    #[instrument(skip(self, data), fields(tool = tool.slug()))]
    pub async fn narrate(&self, tool: AnalyticsTool, window_days: i64, data: &AnalyticsData) -> Option<String> {
        let summary = match serde_json::to_string(data) {
            Ok(json) => truncate(json, MAX_SUMMARY_CHARS),
            Err(e) => {
                warn!("Could not summarize analytics for the advisor: {}", e);
                return None;
            }
        };
        let prompt = format!(
            "Tool: {}\nWindow: last {} days\nData:\n{}",
            tool.slug(),
            window_days,
            summary
        );

        match self.complete(&prompt).await {
            Ok(text) => {
                debug!(chars = text.len(), "Advisor narrative received");
                Some(text)
            }
            Err(e) => {
                warn!("Advisor unavailable, serving heuristic result: {}", e);
                None
            }
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, AdvisorError> {
        let request = ChatRequest {
            model: &self.model,
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
            temperature: 0.3,
            max_tokens: 500,
        };

        // three attempts in total
        (|| async { self.send_request(&request).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_delay(Duration::from_secs(8))
                    .with_max_times(2)
                    .with_jitter(),
            )
            .when(|e: &AdvisorError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "Advisor call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }

    async fn send_request(&self, request: &ChatRequest<'_>) -> Result<String, AdvisorError> {
        let res = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => {
                let body = res
                    .json::<ChatResponse>()
                    .await
                    .map_err(|e| AdvisorError::Serde(e.to_string()))?;
                body.choices
                    .into_iter()
                    .find_map(|c| c.message.content)
                    .map(|text| text.trim().to_string())
                    .filter(|text| !text.is_empty())
                    .ok_or(AdvisorError::Empty)
            }
            StatusCode::TOO_MANY_REQUESTS => Err(AdvisorError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(AdvisorError::Http { status, body })
            }
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> AdvisorError {
    if e.is_timeout() {
        AdvisorError::Timeout
    } else {
        AdvisorError::Transport(e.to_string())
    }
}

/// Cuts `text` to at most `max` characters on a char boundary.
fn truncate(mut text: String, max: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max) {
        text.truncate(idx);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry() {
        assert!(AdvisorError::Timeout.should_retry());
        assert!(AdvisorError::RateLimited.should_retry());
        assert!(AdvisorError::Http {
            status: 503,
            body: String::new()
        }
        .should_retry());
        assert!(!AdvisorError::Http {
            status: 401,
            body: String::new()
        }
        .should_retry());
        assert!(!AdvisorError::Empty.should_retry());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("Québec".to_string(), 3), "Qué");
        assert_eq!(truncate("gin".to_string(), 10), "gin");
    }

    #[test]
    fn test_disabled_without_key() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert!(Advisor::from_config(&config).unwrap().is_none());
    }
}
