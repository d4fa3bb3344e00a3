use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use tagline_common::openai::{
    ChatCompletionRequest, Message, OpenAiClient, OpenAiClientError, ResponseFormat,
};

use crate::model::CharRange;
use crate::prompts;
use crate::style::Tone;

/// Minimum conformance score (1-5) that keeps the current text.
const CONFORMANCE_PASS_SCORE: f64 = 4.0;

/// Result of parsing a completion that should contain one JSON object.
///
/// A malformed reply is not an error: callers keep their previous text.
#[derive(Debug, Clone)]
pub enum JsonReply {
    Object(Map<String, Value>),
    Unusable { reason: String },
}

impl JsonReply {
    pub fn parse(content: Option<&str>) -> Self {
        let Some(content) = content else {
            return JsonReply::Unusable {
                reason: "response has no message content".to_string(),
            };
        };
        match serde_json::from_str::<Value>(strip_code_fence(content)) {
            Ok(Value::Object(map)) => JsonReply::Object(map),
            Ok(other) => JsonReply::Unusable {
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            },
            Err(e) => JsonReply::Unusable {
                reason: format!("malformed JSON: {e}"),
            },
        }
    }

    /// Non-blank string field.
    pub fn text(&self, field: &str) -> Option<&str> {
        match self {
            JsonReply::Object(map) => map
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty()),
            JsonReply::Unusable { .. } => None,
        }
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        match self {
            JsonReply::Object(map) => map.get(field).and_then(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }),
            JsonReply::Unusable { .. } => None,
        }
    }

    /// The string `field`, or `fallback` with a warning naming the stage.
    pub fn text_or(&self, stage: &'static str, field: &str, fallback: &str) -> String {
        if let Some(text) = self.text(field) {
            return text.to_string();
        }
        let reason = match self {
            JsonReply::Unusable { reason } => reason.clone(),
            JsonReply::Object(_) => format!("field {field:?} missing or empty"),
        };
        warn!(stage, field, reason = %reason, "completion reply unusable, keeping previous text");
        fallback.to_string()
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Serialize)]
struct ExamplesPayload<'a> {
    examples: &'a [String],
}

#[derive(Serialize)]
pub struct DraftPayload<'a> {
    pub name: &'a str,
    pub url: &'a str,
    pub tone: &'static str,
    pub extracted_text: &'a str,
    pub must_words: &'a [String],
    pub char_range: CharRange,
    pub must_include: MustInclude,
    pub do_not_include: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct MustInclude {
    pub name_times: u32,
    pub transport_times: u32,
    pub fields: &'static [&'static str],
}

impl Default for MustInclude {
    fn default() -> Self {
        Self {
            name_times: 2,
            transport_times: 1,
            fields: prompts::MUST_INCLUDE_FIELDS,
        }
    }
}

#[derive(Serialize)]
struct ResizePayload<'a> {
    current_text: &'a str,
    extracted_text: &'a str,
    action: &'static str,
}

#[derive(Serialize)]
struct CurrentTextPayload<'a> {
    current_text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tone: Option<&'static str>,
}

#[derive(Serialize)]
struct ConformancePayload<'a> {
    current_text: &'a str,
    examples: &'a [String],
    tone: &'static str,
    style_guide: &'a str,
    anchors: &'a str,
    banned: &'static [&'static str],
    range: CharRange,
}

#[derive(Serialize)]
struct RevisionPayload<'a> {
    current_text: &'a str,
    revision_notes: &'a [String],
    tone: &'static str,
    style: &'a str,
}

/// Stage-level wrapper around the completion service.
///
/// Every call sends a system prompt plus a JSON user payload and reads one
/// field back. Transport and status failures propagate; unusable replies fall
/// back to the caller's previous text.
#[derive(Clone)]
pub struct Completer {
    client: Arc<OpenAiClient>,
    model: String,
}

impl Completer {
    pub fn new(client: Arc<OpenAiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub async fn ask<P: Serialize>(
        &self,
        stage: &'static str,
        system: String,
        payload: &P,
        temperature: f32,
    ) -> Result<JsonReply, OpenAiClientError> {
        let user = serde_json::to_string(payload)?;
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::system(system), Message::user(user)],
            temperature: Some(temperature),
            max_tokens: None,
            response_format: Some(ResponseFormat::json_object()),
        };
        debug!(stage, model = %self.model, "calling completion service");
        let response = self.client.chat_completions(request, None).await?;
        if let Some(usage) = &response.usage {
            debug!(stage, total_tokens = ?usage.total_tokens, "completion usage");
        }
        Ok(JsonReply::parse(response.first_content()))
    }

    /// Summarize the shared style of the caller's reference examples.
    pub async fn style_anchors(&self, examples: &[String]) -> Result<String, OpenAiClientError> {
        let reply = self
            .ask(
                "style-anchors",
                prompts::anchors_system(),
                &ExamplesPayload { examples },
                0.0,
            )
            .await?;
        Ok(reply.text_or("style-anchors", "rules", ""))
    }

    pub async fn draft(
        &self,
        system: String,
        payload: &DraftPayload<'_>,
    ) -> Result<String, OpenAiClientError> {
        let reply = self.ask("draft", system, payload, 0.1).await?;
        Ok(reply.text_or("draft", "text", ""))
    }

    pub async fn resize(
        &self,
        current: &str,
        context: &str,
        tone: Tone,
        style: &str,
        range: CharRange,
        expand: bool,
    ) -> Result<String, OpenAiClientError> {
        let payload = ResizePayload {
            current_text: current,
            extracted_text: context,
            action: if expand { "expand" } else { "condense" },
        };
        let reply = self
            .ask(
                "resize",
                prompts::resize_system(tone, style, range, expand),
                &payload,
                0.1,
            )
            .await?;
        Ok(reply.text_or("resize", "text", current))
    }

    pub async fn polish(
        &self,
        current: &str,
        tone: Tone,
        style: &str,
    ) -> Result<String, OpenAiClientError> {
        let payload = CurrentTextPayload {
            current_text: current,
            tone: None,
        };
        let reply = self
            .ask("polish", prompts::polish_system(tone, style), &payload, 0.0)
            .await?;
        Ok(reply.text_or("polish", "text", current))
    }

    pub async fn beautify(&self, current: &str, tone: Tone) -> Result<String, OpenAiClientError> {
        let payload = CurrentTextPayload {
            current_text: current,
            tone: Some(tone.label()),
        };
        let reply = self
            .ask("beautify", prompts::beautify_system(tone), &payload, 0.3)
            .await?;
        Ok(reply.text_or("beautify", "text", current))
    }

    /// Score the text against the reference examples. Returns a rewrite only
    /// when the score is below the pass mark and a rewrite was supplied.
    pub async fn conformance(
        &self,
        current: &str,
        examples: &[String],
        tone: Tone,
        style: &str,
        anchors: &str,
        range: CharRange,
    ) -> Result<Option<String>, OpenAiClientError> {
        let payload = ConformancePayload {
            current_text: current,
            examples,
            tone: tone.label(),
            style_guide: style,
            anchors,
            banned: crate::compliance::BANNED_TERMS,
            range,
        };
        let reply = self
            .ask("conformance", prompts::conformance_system(), &payload, 0.0)
            .await?;
        let Some(score) = reply.number("score") else {
            warn!(stage = "conformance", "reply has no usable score, keeping text");
            return Ok(None);
        };
        debug!(score, "conformance score");
        if score >= CONFORMANCE_PASS_SCORE {
            return Ok(None);
        }
        Ok(reply.text("rewrite").map(str::to_string))
    }

    pub async fn apply_revisions(
        &self,
        current: &str,
        notes: &[String],
        tone: Tone,
        style: &str,
    ) -> Result<String, OpenAiClientError> {
        let payload = RevisionPayload {
            current_text: current,
            revision_notes: notes,
            tone: tone.label(),
            style,
        };
        let reply = self
            .ask("revision", prompts::revision_system(), &payload, 0.2)
            .await?;
        Ok(reply.text_or("revision", "text", current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockCompletion, MockReply};

    #[test]
    fn parse_accepts_fenced_json() {
        let reply = JsonReply::parse(Some("```json\n{\"text\": \"本文\"}\n```"));
        assert_eq!(reply.text("text"), Some("本文"));
    }

    #[test]
    fn malformed_reply_falls_back() {
        let reply = JsonReply::parse(Some("not json"));
        assert!(matches!(reply, JsonReply::Unusable { .. }));
        assert_eq!(reply.text_or("test", "text", "previous"), "previous");

        let reply = JsonReply::parse(Some("[1, 2]"));
        assert_eq!(reply.text_or("test", "text", "previous"), "previous");

        let reply = JsonReply::parse(None);
        assert_eq!(reply.text_or("test", "text", "previous"), "previous");
    }

    #[test]
    fn blank_field_falls_back() {
        let reply = JsonReply::parse(Some("{\"text\": \"   \"}"));
        assert_eq!(reply.text_or("test", "text", "previous"), "previous");
    }

    #[test]
    fn score_accepts_numeric_strings() {
        let reply = JsonReply::parse(Some("{\"score\": \"3.5\"}"));
        assert_eq!(reply.number("score"), Some(3.5));
    }

    #[tokio::test]
    async fn request_carries_system_prompt_and_json_payload() {
        let mock = MockCompletion::start(vec![MockReply::text("整えた本文")]).await;
        let completer = mock.completer();
        let out = completer.polish("元の本文", Tone::General, "STYLE").await.unwrap();
        assert_eq!(out, "整えた本文");

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        let body = &requests[0];
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][0]["content"].as_str().unwrap().contains("STYLE"));
        let user: Value =
            serde_json::from_str(body["messages"][1]["content"].as_str().unwrap()).unwrap();
        assert_eq!(user["current_text"], "元の本文");
    }

    #[tokio::test]
    async fn conformance_rewrites_only_below_pass_mark() {
        let mock = MockCompletion::start(vec![
            MockReply::json(serde_json::json!({"score": 2, "rewrite": "書き直し"})),
            MockReply::json(serde_json::json!({"score": 4.5, "rewrite": "不要"})),
            MockReply::raw("garbage"),
        ])
        .await;
        let completer = mock.completer();
        let range = CharRange { min: 1, max: 100 };
        let examples = vec!["例文".to_string()];

        let low = completer
            .conformance("本文", &examples, Tone::Elegant, "s", "", range)
            .await
            .unwrap();
        assert_eq!(low.as_deref(), Some("書き直し"));

        let high = completer
            .conformance("本文", &examples, Tone::Elegant, "s", "", range)
            .await
            .unwrap();
        assert_eq!(high, None);

        let garbage = completer
            .conformance("本文", &examples, Tone::Elegant, "s", "", range)
            .await
            .unwrap();
        assert_eq!(garbage, None);
    }

    #[tokio::test]
    async fn service_errors_propagate() {
        let mock = MockCompletion::start(vec![MockReply::status(503, "overloaded")]).await;
        let err = mock
            .completer()
            .beautify("本文", Tone::Friendly)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"), "{err}");
    }
}
