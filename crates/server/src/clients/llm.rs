//! Language model rewrite of move feedback.
//!
//! The model only simplifies the analysis text already produced by the
//! classifier. Any failure falls back to that text unchanged, so callers
//! always get a response.

use std::time::Duration;

use coach_engine::feedback::{rewrite_prompt, REWRITE_SYSTEM_MESSAGE};
use coach_engine::{FeedbackRequest, FeedbackResponse};
use reqwest::Client;
use serde_json::{json, Value};

use super::{check_status, http_client, ClientError};
use crate::config::FeedbackMode;

const OLLAMA_MODEL: &str = "llama3.2";
const OPENAI_MODEL: &str = "gpt-4o-mini";

pub struct FeedbackClient {
    client: Client,
    mode: FeedbackMode,
}

impl FeedbackClient {
    pub fn new(mode: FeedbackMode, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(timeout)?,
            mode,
        })
    }

    pub fn mode(&self) -> &FeedbackMode {
        &self.mode
    }

    pub async fn generate(&self, request: &FeedbackRequest) -> FeedbackResponse {
        let Some(cleaned) = request
            .cleaned_analysis
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        else {
            return FeedbackResponse::rule_based(request);
        };

        let rewritten = match &self.mode {
            FeedbackMode::RuleBased => return FeedbackResponse::rule_based(request),
            FeedbackMode::Ollama { url } => self.ollama(url, cleaned).await,
            FeedbackMode::OpenAi { api_key, base_url } => {
                self.openai(base_url, api_key, cleaned).await
            }
        };

        match rewritten {
            Ok(text) if !text.trim().is_empty() => FeedbackResponse {
                feedback: text.trim().to_string(),
                category: request.category_label().to_string(),
            },
            Ok(_) => {
                tracing::warn!("Language model returned empty feedback");
                FeedbackResponse::passthrough(request)
            }
            Err(e) => {
                tracing::warn!("Feedback rewrite failed: {e}");
                FeedbackResponse::passthrough(request)
            }
        }
    }

    async fn ollama(&self, url: &str, cleaned: &str) -> Result<String, ClientError> {
        let body = json!({
            "model": OLLAMA_MODEL,
            "messages": [
                {"role": "system", "content": REWRITE_SYSTEM_MESSAGE},
                {"role": "user", "content": rewrite_prompt(cleaned)},
            ],
            "stream": false,
            "options": {"num_predict": 200, "temperature": 0.7, "top_p": 0.9},
        });
        let resp = self
            .client
            .post(format!("{}/api/chat", url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await?;
        let data: Value = check_status(resp, "Model")?.json().await?;
        data["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode("missing message.content".into()))
    }

    async fn openai(&self, base_url: &str, api_key: &str, cleaned: &str) -> Result<String, ClientError> {
        let body = json!({
            "model": OPENAI_MODEL,
            "messages": [
                {"role": "system", "content": REWRITE_SYSTEM_MESSAGE},
                {"role": "user", "content": rewrite_prompt(cleaned)},
            ],
            "temperature": 0.7,
            "max_tokens": 250,
        });
        let resp = self
            .client
            .post(format!("{}/chat/completions", base_url.trim_end_matches('/')))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        let data: Value = check_status(resp, "Model")?.json().await?;
        data["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode("missing choices[0].message.content".into()))
    }
}
