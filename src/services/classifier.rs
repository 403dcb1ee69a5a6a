//! Classifier boundary: structured verdicts for raw source items

use crate::error::ClassifyError;
use crate::models::Verdict;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Structured verdict for one item
#[derive(Debug, Clone)]
pub struct Classification {
    pub verdict: Verdict,
    /// In [0, 1]
    pub confidence: f64,
    pub symbol: Option<String>,
    pub rationale: String,
}

impl Classification {
    /// Fallback used when classification degrades: neutral, zero
    /// confidence, never crosses the action threshold.
    pub fn neutral(rationale: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Neutral,
            confidence: 0.0,
            symbol: None,
            rationale: rationale.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        symbol_hint: Option<&str>,
    ) -> Result<Classification, ClassifyError>;
}

/// Classifier backed by a chat-completion model.
///
/// The model is asked for a strict JSON object; the reply passes through
/// `parse_classification`, the single place free text is turned into a
/// structured verdict. Parse failure falls back to Neutral/0.0 instead of
/// erroring, so a misbehaving model cannot stall watermark advancement.
pub struct LlmClassifier {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmClassifier {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn build_prompt(text: &str, symbol_hint: Option<&str>) -> String {
        let symbol_instruction = match symbol_hint {
            Some(symbol) => format!("Focus on {}", symbol),
            None => "Identify which symbol the post refers to".to_string(),
        };
        format!(
            "Analyze this post for a market-moving signal:\n\n\
             Post: \"{}\"\n\n\
             {}\n\n\
             Determine:\n\
             1. Verdict: positive, negative, or neutral\n\
             2. Confidence level (0.0-1.0)\n\
             3. Which symbol it concerns ($ mentions or context)\n\
             4. Brief reasoning\n\n\
             Return ONLY valid JSON:\n\
             {{\"verdict\": \"positive|negative|neutral\", \"confidence\": 0.0, \
             \"symbol\": \"SYMBOL\" or null, \"rationale\": \"brief explanation\"}}",
            text, symbol_instruction
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait::async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        text: &str,
        symbol_hint: Option<&str>,
    ) -> Result<Classification, ClassifyError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": Self::build_prompt(text, symbol_hint)}],
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifyError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifyError::Request(format!(
                "classifier returned {}",
                status
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::Request(e.to_string()))?;

        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");

        Ok(parse_classification(content))
    }
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    verdict: Option<Verdict>,
    confidence: Option<f64>,
    symbol: Option<String>,
    rationale: Option<String>,
}

/// Narrow adapter from model free text to a structured verdict.
///
/// Finds the first JSON object in the reply and parses it. Any failure
/// returns the Neutral/0.0 fallback; missing fields default the same way.
pub fn parse_classification(response_text: &str) -> Classification {
    let Some(start) = response_text.find('{') else {
        warn!("classifier reply contained no JSON object");
        return Classification::neutral("unparseable classifier reply");
    };
    let Some(end) = response_text.rfind('}') else {
        warn!("classifier reply contained no JSON object");
        return Classification::neutral("unparseable classifier reply");
    };
    if end < start {
        return Classification::neutral("unparseable classifier reply");
    }

    match serde_json::from_str::<RawClassification>(&response_text[start..=end]) {
        Ok(raw) => {
            let classification = Classification {
                verdict: raw.verdict.unwrap_or(Verdict::Neutral),
                confidence: raw.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
                symbol: raw.symbol.filter(|s| !s.is_empty()),
                rationale: raw.rationale.unwrap_or_default(),
            };
            debug!(
                verdict = %classification.verdict,
                confidence = classification.confidence,
                "parsed classifier reply"
            );
            classification
        }
        Err(e) => {
            warn!(error = %e, "failed to parse classifier reply");
            Classification::neutral("unparseable classifier reply")
        }
    }
}
