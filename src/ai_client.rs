//! OpenRouter chat-completions client
//!
//! Builds the system prompt from the selected analysis mode and the compiled
//! knowledge base, sends the trimmed conversation, and maps API failures to
//! messages a user can act on.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::conversations::ChatMessage;
use crate::modes::AnalysisMode;
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("Invalid API key — check your OpenRouter key.")]
    InvalidKey,
    #[error("Rate limit reached. Wait a moment and retry.")]
    RateLimited,
    #[error("OpenRouter free quota exhausted. Add credits at openrouter.ai.")]
    QuotaExhausted,
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Network error — check your connection: {0}")]
    Network(String),
    #[error("Request timed out. The model may be busy — try again.")]
    Timeout,
    #[error("Invalid JSON from API: {0}")]
    InvalidJson(String),
    /// Error body delivered with a 200, or no choices at all
    #[error("{0}")]
    Upstream(String),
    #[error("Model returned an empty reply — please retry.")]
    EmptyReply,
    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

/// Chat-completions request format
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

/// Chat-completions response format (OpenRouter sometimes sends `error` with a 200)
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Option<Vec<Choice>>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

const KB_BANNER: &str = "═══════════════════════════════════════════";

/// Assemble the system prompt: persona, response guidelines, mode, knowledge base
pub fn build_system_prompt(knowledge_base: &str, mode: AnalysisMode) -> String {
    let kb_section = if knowledge_base.trim().is_empty() {
        "\n\n[No documents ingested. Advise the user to upload and ingest documents. \
         You can still answer general questions from your training knowledge.]"
            .to_string()
    } else {
        format!(
            "\n\n{banner}\nKNOWLEDGE BASE (ingested documents)\n{banner}\n{kb}",
            banner = KB_BANNER,
            kb = knowledge_base
        )
    };

    format!(
        "You are Nexus, an elite Enterprise Knowledge & Contract Intelligence AI.\n\
         You analyze corporate documents, contracts, HR policies, and financial \
         filings with surgical precision and structured clarity.\n\n\
         RESPONSE GUIDELINES:\n\
         - Be precise, professional, and well-structured.\n\
         - Use clear headings (##) when organizing multi-part answers.\n\
         - Quote specific clauses or document text verbatim when relevant.\n\
         - Use these inline markers for important items:\n    \
         ✅  Compliant / positive finding\n    \
         ⚠️  Warning / needs attention\n    \
         ❌  Risk / non-compliant item\n\
         - Always reference the document name when citing information.\n\
         - For risk mode, use 🔴 HIGH / 🟡 MEDIUM / 🟢 LOW risk tags.\n\
         {instruction}{kb_section}",
        instruction = mode.instruction(),
        kb_section = kb_section,
    )
}

/// Keep only the most recent `limit` exchanges (two messages each)
pub fn trim_history(history: &[ChatMessage], limit: usize) -> &[ChatMessage] {
    let keep = limit.saturating_mul(2);
    &history[history.len().saturating_sub(keep)..]
}

pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    site_url: String,
    site_name: String,
    history_limit: usize,
}

impl ChatClient {
    pub fn new(settings: &Settings) -> Result<Self, ChatError> {
        Self::with_timeout(settings, settings.request_timeout())
    }

    pub fn with_timeout(settings: &Settings, timeout: Duration) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nexus/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChatError::Client(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: settings.api_base_url.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            site_url: settings.site_url.clone(),
            site_name: settings.site_name.clone(),
            history_limit: settings.history_limit,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send the conversation and return the assistant's reply text.
    ///
    /// `history` should already end with the user's new message.
    pub async fn chat(
        &self,
        api_key: &str,
        history: &[ChatMessage],
        mode: AnalysisMode,
        knowledge_base: &str,
    ) -> Result<String, ChatError> {
        let mut messages = Vec::with_capacity(self.history_limit * 2 + 1);
        messages.push(ChatMessage::system(build_system_prompt(knowledge_base, mode)));
        messages.extend_from_slice(trim_history(history, self.history_limit));

        let request = CompletionRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("HTTP-Referer", &self.site_url)
            .header("X-Title", &self.site_name)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_transport_error)?;

        if !(200..300).contains(&status) {
            return Err(error_for_status(status, &body));
        }

        parse_completion(&body)
    }
}

fn map_transport_error(e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::Timeout
    } else {
        ChatError::Network(e.to_string())
    }
}

/// Map a non-2xx response to a user-facing error
fn error_for_status(status: u16, body: &str) -> ChatError {
    match status {
        401 => ChatError::InvalidKey,
        402 => ChatError::QuotaExhausted,
        429 => ChatError::RateLimited,
        _ => {
            let message = serde_json::from_str::<ErrorEnvelope>(body)
                .ok()
                .and_then(|env| env.error)
                .and_then(|err| err.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| {
                    let reason = reqwest::StatusCode::from_u16(status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or("Unknown");
                    format!("HTTP Error {}: {}", status, reason)
                });
            ChatError::Api { status, message }
        }
    }
}

/// Pull the reply text out of a successful response body
fn parse_completion(body: &str) -> Result<String, ChatError> {
    let data: CompletionResponse =
        serde_json::from_str(body).map_err(|e| ChatError::InvalidJson(e.to_string()))?;

    let choices = data.choices.unwrap_or_default();
    let Some(first) = choices.into_iter().next() else {
        let message = data
            .error
            .and_then(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Empty response from model.".to_string());
        return Err(ChatError::Upstream(message));
    };

    let text = first
        .message
        .and_then(|m| m.content)
        .unwrap_or_default()
        .trim()
        .to_string();
    if text.is_empty() {
        return Err(ChatError::EmptyReply);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{completion, stub_llm};

    #[test]
    fn test_system_prompt_includes_mode_and_kb() {
        let prompt = build_system_prompt("DOCUMENT : nda.txt\nSecret stuff", AnalysisMode::Legal);
        assert!(prompt.starts_with("You are Nexus"));
        assert!(prompt.contains("MODE: Legal Contract Analyzer."));
        assert!(prompt.contains("KNOWLEDGE BASE (ingested documents)"));
        assert!(prompt.ends_with("DOCUMENT : nda.txt\nSecret stuff"));
        assert!(!prompt.contains("No documents ingested"));
    }

    #[test]
    fn test_system_prompt_without_kb() {
        let prompt = build_system_prompt("  \n", AnalysisMode::General);
        assert!(prompt.contains("MODE: General Knowledge Assistant."));
        assert!(prompt.contains("[No documents ingested."));
        assert!(!prompt.contains("KNOWLEDGE BASE"));
    }

    #[test]
    fn test_trim_history_keeps_latest_pairs() {
        let history: Vec<ChatMessage> = (0..30).map(|i| ChatMessage::user(i.to_string())).collect();
        let trimmed = trim_history(&history, 10);
        assert_eq!(trimmed.len(), 20);
        assert_eq!(trimmed[0].content, "10");
        assert_eq!(trim_history(&history[..3], 10).len(), 3);
    }

    #[test]
    fn test_error_for_status() {
        assert_eq!(error_for_status(401, ""), ChatError::InvalidKey);
        assert_eq!(error_for_status(402, ""), ChatError::QuotaExhausted);
        assert_eq!(error_for_status(429, ""), ChatError::RateLimited);
        assert_eq!(
            error_for_status(400, r#"{"error":{"message":"model not found"}}"#).to_string(),
            "API error 400: model not found"
        );
        assert_eq!(
            error_for_status(503, "<html>down</html>").to_string(),
            "API error 503: HTTP Error 503: Service Unavailable"
        );
    }

    #[test]
    fn test_error_messages_keep_wording() {
        assert_eq!(ChatError::InvalidKey.to_string(), "Invalid API key — check your OpenRouter key.");
        assert_eq!(
            ChatError::Network("refused".into()).to_string(),
            "Network error — check your connection: refused"
        );
        assert_eq!(ChatError::Timeout.to_string(), "Request timed out. The model may be busy — try again.");
        assert_eq!(ChatError::EmptyReply.to_string(), "Model returned an empty reply — please retry.");
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  The notice period is 30 days. "}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "The notice period is 30 days.");
    }

    #[test]
    fn test_parse_completion_failures() {
        assert!(matches!(parse_completion("nope"), Err(ChatError::InvalidJson(_))));
        assert_eq!(
            parse_completion(r#"{"error":{"message":"Provider returned error"}}"#),
            Err(ChatError::Upstream("Provider returned error".into()))
        );
        assert_eq!(
            parse_completion(r#"{"choices":[]}"#).unwrap_err().to_string(),
            "Empty response from model."
        );
        assert_eq!(
            parse_completion(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(ChatError::EmptyReply)
        );
    }

    fn client_for(endpoint: String, history_limit: usize) -> ChatClient {
        let settings = Settings {
            api_base_url: endpoint,
            history_limit,
            ..Settings::default()
        };
        ChatClient::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn test_chat_sends_system_prompt_and_headers() {
        let (endpoint, captured) = stub_llm(200, completion("Thirty days.")).await;
        let client = client_for(endpoint, 1);

        let history = vec![
            ChatMessage::user("old question"),
            ChatMessage::assistant("old answer"),
            ChatMessage::user("What is the notice period?"),
        ];
        let text = client
            .chat("sk-or-v1-test", &history, AnalysisMode::Legal, "KB TEXT")
            .await
            .unwrap();
        assert_eq!(text, "Thirty days.");

        let (headers, body) = captured.lock().unwrap().pop().unwrap();
        assert_eq!(headers["authorization"], "Bearer sk-or-v1-test");
        assert_eq!(headers["x-title"], "Nexus Enterprise Bot");
        assert_eq!(body["model"], "nvidia/nemotron-nano-12b-v2-vl:free");
        assert_eq!(body["max_tokens"], 2048);

        let messages = body["messages"].as_array().unwrap();
        // system + last exchange only (limit 1 => 2 messages)
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert!(messages[0]["content"].as_str().unwrap().contains("KB TEXT"));
        assert_eq!(messages[1]["content"], "old answer");
        assert_eq!(messages[2]["content"], "What is the notice period?");
    }

    #[tokio::test]
    async fn test_chat_maps_unauthorized() {
        let (endpoint, _) = stub_llm(401, serde_json::json!({"error":{"message":"No auth"}})).await;
        let client = client_for(endpoint, 10);
        let err = client
            .chat("bad", &[ChatMessage::user("hi")], AnalysisMode::General, "")
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::InvalidKey);
    }

    #[tokio::test]
    async fn test_chat_unreachable_is_network_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let client = client_for("http://127.0.0.1:9/chat/completions".into(), 10);
        let err = client
            .chat("k", &[ChatMessage::user("hi")], AnalysisMode::General, "")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Network(_)), "got {:?}", err);
    }
}
