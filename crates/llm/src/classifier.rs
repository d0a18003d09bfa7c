//! LLM Fault Classifier
//!
//! A `StructuredClassifier` backed by an `LlmProvider`. The model is asked for
//! a single JSON object describing the intent and the fault context. When the
//! reply cannot be parsed the classifier retries once with a repair prompt
//! before giving up with `CoreError::Classification`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use netdiag_core::{
    CoreError, CoreResult, DiagnosisContext, GuardDecision, Layer, QueryType,
    StructuredClassifier, SymptomType,
};

use crate::provider::LlmProvider;
use crate::types::{LlmResponse, Message};

/// Default budget for one provider call.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You are the intake filter of a network troubleshooting assistant.

Classify the user's message and extract the fault context. Respond with a JSON object:
{
  "queryType": "fault_diagnosis" | "simple_query" | "config_change" | "off_topic",
  "symptom": "the malfunction in the user's words",
  "symptomType": "connectivity" | "performance" | "routing" | "protocol" | "hardware" | "unknown",
  "sourceDevice": "device the problem is observed from, or null",
  "targetDevice": "device or address that is affected, or null",
  "protocolHint": "protocol named by the user, or null",
  "layerHint": "L1" | "L2" | "L3" | "L4" | null
}

Rules:
- fault_diagnosis: the user describes something broken, slow or flapping.
- simple_query: the user asks to show or look up state ("show interface status").
- config_change: the user asks to change configuration.
- off_topic: anything unrelated to network operations.
- Only fill device fields with identifiers that appear in the message.
- L1 physical/data-link, L2 network, L3 transport, L4 application.

No markdown fences, no explanatory text. Just the raw JSON object."#;

// ============================================================================
// LLM Response Schema
// ============================================================================

/// Deserialization target for the model's JSON reply. Accepts camelCase and
/// snake_case keys.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmIntentResponse {
    #[serde(alias = "query_type")]
    query_type: String,
    #[serde(default)]
    symptom: Option<String>,
    #[serde(default, alias = "symptom_type")]
    symptom_type: Option<String>,
    #[serde(default, alias = "source_device")]
    source_device: Option<String>,
    #[serde(default, alias = "target_device")]
    target_device: Option<String>,
    #[serde(default, alias = "protocol_hint")]
    protocol_hint: Option<String>,
    #[serde(default, alias = "layer_hint")]
    layer_hint: Option<String>,
}

fn parse_query_type(raw: &str) -> Result<QueryType, String> {
    let key: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    match key.as_str() {
        "faultdiagnosis" | "fault" => Ok(QueryType::FaultDiagnosis),
        "simplequery" | "query" => Ok(QueryType::SimpleQuery),
        "configchange" | "change" => Ok(QueryType::ConfigChange),
        "offtopic" => Ok(QueryType::OffTopic),
        _ => Err(format!("unknown queryType {:?}", raw)),
    }
}

fn parse_symptom_type(raw: Option<&str>) -> SymptomType {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("connectivity") => SymptomType::Connectivity,
        Some("performance") => SymptomType::Performance,
        Some("routing") => SymptomType::Routing,
        Some("protocol") => SymptomType::Protocol,
        Some("hardware") => SymptomType::Hardware,
        _ => SymptomType::Unknown,
    }
}

impl LlmIntentResponse {
    fn into_decision(self, raw_text: &str) -> Result<GuardDecision, String> {
        let query_type = parse_query_type(&self.query_type)?;
        if query_type.redirects() {
            return Ok(GuardDecision::redirect(query_type));
        }
        if query_type == QueryType::OffTopic {
            return Ok(GuardDecision::off_topic());
        }

        let symptom = self
            .symptom
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| raw_text.to_string());
        let mut context = DiagnosisContext::new(symptom)
            .with_symptom_type(parse_symptom_type(self.symptom_type.as_deref()));
        context.source_device = self.source_device;
        context.target_device = self.target_device;
        context.protocol_hint = self.protocol_hint;
        context.layer_hint = self.layer_hint.as_deref().and_then(Layer::from_tag);

        Ok(GuardDecision::fault(context.normalized()))
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Intent classifier that delegates to an LLM.
pub struct LlmFaultClassifier {
    provider: Arc<dyn LlmProvider>,
    attempt_timeout: Duration,
}

impl LlmFaultClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    async fn ask(&self, messages: Vec<Message>) -> CoreResult<String> {
        let response: LlmResponse = tokio::time::timeout(
            self.attempt_timeout,
            self.provider
                .send_message(messages, Some(CLASSIFIER_SYSTEM_PROMPT.to_string())),
        )
        .await
        .map_err(|_| {
            CoreError::classification(format!(
                "LLM classification timed out after {}s",
                self.attempt_timeout.as_secs()
            ))
        })?
        .map_err(|e| CoreError::classification(format!("LLM classification failed: {}", e)))?;

        Ok(response.text().unwrap_or("").to_string())
    }
}

#[async_trait]
impl StructuredClassifier for LlmFaultClassifier {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn classify(&self, text: &str) -> CoreResult<GuardDecision> {
        let messages = vec![Message::user(text)];
        let response_text = self.ask(messages.clone()).await?;

        let first_error = match parse_intent_response(&response_text, text) {
            Ok(decision) => return Ok(decision),
            Err(e) => e,
        };
        debug!(error = %first_error, "llm classifier: first attempt parse failed, retrying with repair prompt");

        let mut retry_messages = messages;
        retry_messages.push(Message::assistant(&response_text));
        retry_messages.push(Message::user(build_repair_prompt(&response_text, &first_error)));

        let retry_text = self.ask(retry_messages).await?;
        parse_intent_response(&retry_text, text).map_err(|second_error| {
            warn!(first = %first_error, retry = %second_error, "llm classifier: unusable reply after retry");
            CoreError::classification(format!(
                "Failed to parse classification after retry. First error: {}. Retry error: {}",
                first_error, second_error
            ))
        })
    }
}

// ============================================================================
// Prompt & Response Helpers
// ============================================================================

fn build_repair_prompt(original_response: &str, parse_error: &str) -> String {
    format!(
        "Your previous response could not be parsed as valid JSON.\n\n\
         Parse error: {}\n\n\
         Your previous response was:\n{}\n\n\
         Please respond with ONLY a valid JSON object matching the schema. \
         No markdown fences, no explanatory text. Just the raw JSON object \
         starting with {{ and ending with }}.",
        parse_error, original_response
    )
}

/// Extract a JSON object from reply text, handling markdown fences and
/// surrounding prose.
fn extract_json_object(response_text: &str) -> &str {
    let trimmed = response_text.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let content_start = after_fence.find('\n').map(|nl| nl + 1).unwrap_or(0);
        let content = &after_fence[content_start..];
        if let Some(end) = content.find("```") {
            return content[..end].trim();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start <= end {
            return &trimmed[start..=end];
        }
    }

    trimmed
}

fn parse_intent_response(response_text: &str, raw_text: &str) -> Result<GuardDecision, String> {
    if response_text.trim().is_empty() {
        return Err("LLM returned empty response".to_string());
    }
    let json_str = extract_json_object(response_text);
    let parsed: LlmIntentResponse = serde_json::from_str(json_str).map_err(|e| {
        format!(
            "Invalid JSON: {}. Content: {:?}",
            e,
            json_str.chars().take(200).collect::<String>()
        )
    })?;
    parsed.into_decision(raw_text)
}
