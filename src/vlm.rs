//! Ollama-backed review of flagged frames.
//!
//! Each candidate image is sent to a vision model together with a fixed
//! analyst prompt. The reply is expected to be a small JSON object, often
//! wrapped in a markdown code fence, scoring the frame on a 1-5 scale.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::archive::{MAX_CONFIDENCE, MIN_CONFIDENCE};
use crate::config::VlmConfig;

pub const SYSTEM_PROMPT: &str = "You are a specialized CCTV security analyst focused on monitoring clean-room production environments. \
Your task is to detect and evaluate potential security breaches related to operator discipline. \
CRITICAL INSTRUCTION: IGNORE ALL VISUAL ANNOTATIONS\n\
- Disregard green pose estimation keypoints/dots\n\
- Ignore red and green circles around wrists\n\
- Treat annotations as non-existent for your analysis\n\n\
SPECIFIC FOCUS AREAS:\n\
1. UNZIPPING ACTIVITY: Detect if any operator is unzipping or partially opening their bunny suit\n\
2. CAMERA AWARENESS: Identify if any operator is deliberately looking at CCTV cameras\n\
3. HEADCOUNT: Count all personnel visible within yellow bounding boxes\n\n\
RESPONSE FORMAT:\n\
Respond ONLY with a JSON object containing these exact keys:\n\
- 'unzip_confidence' (1-5 scale)\n\
- 'looking_confidence' (1-5 scale) \n\
- 'headcount' (integer)\n\n\
SCORING CRITERIA:\n\
1: No suspicious activity detected\n\
2: Minimal/ambiguous activity\n\
3: Moderate suspicion\n\
4: High confidence in violation\n\
5: Clear, deliberate security breach";

pub const USER_PROMPT: &str = "Analyze this clean-room CCTV footage and evaluate:\n\
1. Unzip Confidence: Likelihood of operator unzipping bunny suit (1-5)\n\
2. Looking Confidence: Likelihood of operator monitoring CCTV cameras (1-5)\n\
3. Headcount: Number of personnel in yellow bounding areas\n\n\
Base your assessment on:\n\
- Hand position and suit integrity\n\
- Gaze direction and camera awareness\n\
- Overall operator behavior patterns";

/// Scores returned by the review model, clamped to the 1-5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlmVerdict {
    pub unzip_confidence: u8,
    pub looking_confidence: u8,
    pub headcount: u32,
}

impl VlmVerdict {
    /// Verdict applied when the model cannot be reached or replies with
    /// something unparseable. The image still gets filed, as "no potential".
    pub fn fallback() -> Self {
        Self {
            unzip_confidence: MIN_CONFIDENCE,
            looking_confidence: MIN_CONFIDENCE,
            headcount: 0,
        }
    }
}

pub fn clamp_confidence(raw: i64) -> u8 {
    raw.clamp(i64::from(MIN_CONFIDENCE), i64::from(MAX_CONFIDENCE)) as u8
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Client for an Ollama-style `/api/chat` endpoint.
pub struct VlmClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl VlmClient {
    pub fn from_config(config: &VlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }

    /// Sends one image for review. Callers map any error to
    /// [`VlmVerdict::fallback`] so a flaky model never stalls the queue.
    pub async fn verify_image(&self, image: &Path) -> Result<VlmVerdict> {
        let bytes = tokio::fs::read(image)
            .await
            .with_context(|| format!("failed to read {}", image.display()))?;
        let encoded = STANDARD.encode(&bytes);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                    images: None,
                },
                ChatMessage {
                    role: "user",
                    content: USER_PROMPT,
                    images: Some(vec![encoded]),
                },
            ],
            stream: false,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("chat request to {} failed", self.endpoint))?;
        if !response.status().is_success() {
            bail!("chat endpoint returned {}", response.status());
        }

        let reply: ChatResponse = response
            .json()
            .await
            .context("chat response body is not valid JSON")?;
        extract_verdict(&reply.message.content)
    }
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // DOTALL so fenced JSON may span lines.
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fence pattern compiles"))
}

/// Pulls the verdict out of a model reply.
///
/// Accepts the JSON either bare or inside a markdown code fence. Individual
/// fields may be missing or arrive as strings; whatever cannot be read keeps
/// its conservative default.
pub fn extract_verdict(content: &str) -> Result<VlmVerdict> {
    let json_text = match fence_regex().captures(content) {
        Some(caps) => caps[1].trim().to_string(),
        None => content.trim().to_string(),
    };

    let value: Value =
        serde_json::from_str(&json_text).context("model reply does not contain JSON")?;

    Ok(VlmVerdict {
        unzip_confidence: clamp_confidence(field_i64(&value, "unzip_confidence").unwrap_or(1)),
        looking_confidence: clamp_confidence(field_i64(&value, "looking_confidence").unwrap_or(1)),
        headcount: field_i64(&value, "headcount").unwrap_or(0).max(0) as u32,
    })
}

// Models occasionally quote numbers, so tolerate `"3"` next to `3`.
fn field_i64(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
