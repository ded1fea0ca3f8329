//! Client for the external vision service that reads handwritten scores.
//!
//! The service is asked for a fixed JSON document `{identity, scores, note}`.
//! Anything that does not parse to exactly that shape is a failure for the
//! paper; there are no partial successes.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::config::RecognitionSettings;

const RECOGNITION_PROMPT: &str = r#"You read handwritten exam score sheets.
The image shows one student's answer paper. Next to each question number the
teacher has written the points awarded. Read every awarded score together with
the student identity (roster number) written on the paper.

Respond with ONLY a JSON object of exactly this shape and nothing else:
{
  "identity": "<roster number written on the paper>",
  "scores": {"<question number>": <points as a number>},
  "note": "<one short sentence about what you saw or why nothing was readable>"
}

If no score is readable return an empty "scores" object and explain in "note".
Never copy the expected identity unless it is actually written on the paper."#;

pub(crate) struct RecognitionRequest<'a> {
    pub(crate) image: &'a [u8],
    pub(crate) mime_type: &'a str,
    pub(crate) expected_identity: &'a str,
    pub(crate) paper_id: &'a str,
}

/// Raw reading of one paper, before any reconciliation against the exam.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Recognition {
    pub(crate) scores: BTreeMap<String, f64>,
    pub(crate) identity: String,
    pub(crate) note: String,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub(crate) enum RecognitionFailure {
    #[error("vision service unreachable: {0}")]
    Transport(String),
    #[error("vision service returned {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("vision service returned an empty response")]
    Empty,
    #[error("vision response is not valid JSON: {0}")]
    Parse(String),
    #[error("vision response does not match the expected shape: {0}")]
    Schema(String),
}

impl RecognitionFailure {
    fn label(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Empty => "empty",
            Self::Parse(_) => "parse",
            Self::Schema(_) => "schema",
        }
    }
}

#[async_trait]
pub(crate) trait Recognizer: Send + Sync {
    /// Reads one paper. A returned failure is terminal for that paper only.
    async fn analyze(
        &self,
        request: RecognitionRequest<'_>,
    ) -> Result<Recognition, RecognitionFailure>;
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RecognitionPayload {
    identity: String,
    scores: BTreeMap<String, f64>,
    note: String,
}

/// OpenAI-compatible chat-completions client. Built once at startup and shared.
#[derive(Debug, Clone)]
pub(crate) struct VisionRecognitionService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    retry_delay: Duration,
    max_retries: u32,
}

impl VisionRecognitionService {
    pub(crate) fn from_settings(settings: &RecognitionSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            retry_delay: Duration::from_secs(settings.retry_delay_seconds),
            max_retries: settings.max_retries,
        })
    }

    fn payload(&self, request: &RecognitionRequest<'_>) -> Value {
        let image_url = format!("data:{};base64,{}", request.mime_type, STANDARD.encode(request.image));
        let instruction = format!(
            "{RECOGNITION_PROMPT}\n\nExpected identity for this paper: {}",
            request.expected_identity
        );

        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": instruction},
                        {"type": "image_url", "image_url": {"url": image_url}}
                    ]
                }
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"}
        })
    }

    async fn attempt(&self, payload: &Value) -> Result<Recognition, RecognitionFailure> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| RecognitionFailure::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RecognitionFailure::Status { status: status.as_u16(), detail });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| RecognitionFailure::Parse(format!("invalid envelope: {err}")))?;

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        parse_recognition(content)
    }
}

#[async_trait]
impl Recognizer for VisionRecognitionService {
    async fn analyze(
        &self,
        request: RecognitionRequest<'_>,
    ) -> Result<Recognition, RecognitionFailure> {
        let payload = self.payload(&request);
        let attempts = self.max_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            let timer = Instant::now();
            let outcome = self.attempt(&payload).await;
            metrics::histogram!("recognition_duration_seconds")
                .record(timer.elapsed().as_secs_f64());

            match outcome {
                Ok(recognition) => {
                    metrics::counter!("recognition_requests_total", "status" => "ok").increment(1);
                    return Ok(recognition);
                }
                Err(failure) => {
                    metrics::counter!("recognition_requests_total", "status" => failure.label())
                        .increment(1);
                    tracing::warn!(
                        paper_id = request.paper_id,
                        attempt,
                        attempts,
                        error = %failure,
                        "Vision recognition attempt failed"
                    );

                    if attempt >= attempts {
                        return Err(failure);
                    }
                }
            }

            attempt += 1;
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

/// Strips Markdown fences and parses the model output strictly.
pub(crate) fn parse_recognition(content: &str) -> Result<Recognition, RecognitionFailure> {
    let cleaned = content.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(RecognitionFailure::Empty);
    }

    let payload: RecognitionPayload = serde_json::from_str(cleaned).map_err(|err| {
        if err.is_data() {
            RecognitionFailure::Schema(err.to_string())
        } else {
            RecognitionFailure::Parse(err.to_string())
        }
    })?;

    Ok(Recognition { scores: payload.scores, identity: payload.identity, note: payload.note })
}
