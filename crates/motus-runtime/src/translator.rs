//! [`PlanTranslator`] – natural language to plan steps.
//!
//! [`LlmTranslator`] talks to any OpenAI-compatible `/v1/chat/completions`
//! endpoint (OpenAI itself, or a local server such as Ollama at
//! `http://localhost:11434`).  The plan JSON Schema is embedded in the system
//! prompt and the reply is parsed with [`parse_plan`].
//!
//! [`OfflineTranslator`] always reports [`TranslateError::Unavailable`], which
//! sends every utterance down the preset fallback path.
//!
//! # Example
//!
//! ```rust,no_run
//! use motus_runtime::translator::{LlmTranslator, PlanTranslator, TranslatorConfig};
//!
//! # async fn demo() {
//! let translator = LlmTranslator::new(TranslatorConfig::default());
//! // Requires a reachable model server.
//! let steps = translator.translate("lift the arm, then close the gripper").await;
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::plan::{PlanError, StepDescription, parse_plan, plan_schema};

/// Default endpoint base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
/// Default model name.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "\
You plan motions for a UR10e robot arm with a three-finger gripper on a \
differential-drive mobile base. Turn the user's instruction (Korean or \
English) into a JSON array of steps and output ONLY that array, with no \
prose.
Each step has an \"action\" and a \"params\" object. Actions:
- move_arm: params.targets is a map of joint name to angle in radians, or a \
list of {\"joint\": ..., \"angle\": ...}. Joints: shoulder_pan_joint, \
shoulder_lift_joint, elbow_joint, wrist_1_joint, wrist_2_joint, wrist_3_joint.
- move_robot: params.direction is forward, backward, left or right; \
params.speed and params.duration (seconds) are optional.
- control_gripper: params.action is open or close.
- wait: params.seconds.
Example:
[{\"action\": \"move_arm\", \"params\": {\"targets\": {\"shoulder_lift_joint\": -1.0, \"elbow_joint\": 1.5}, \"speed\": 1.0}},
 {\"action\": \"control_gripper\", \"params\": {\"action\": \"close\"}},
 {\"action\": \"wait\", \"params\": {\"seconds\": 0.5}}]";

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Why translation produced no plan.  Every variant is recoverable.
#[derive(Error, Debug)]
pub enum TranslateError {
    /// The HTTP request failed or timed out.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with something that is not a chat completion.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
    /// The completion could not be read as a plan.
    #[error("Unusable plan: {0}")]
    Plan(#[from] PlanError),
    /// No translator is configured.
    #[error("translator unavailable")]
    Unavailable,
}

/// Anything that turns an utterance into plan steps.
#[async_trait]
pub trait PlanTranslator: Send + Sync {
    /// Translate `utterance`.  Must not be called from the simulation
    /// thread.
    async fn translate(&self, utterance: &str) -> Result<Vec<StepDescription>, TranslateError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Connection settings for [`LlmTranslator`].
#[derive(Clone)]
pub struct TranslatorConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(20),
            temperature: 0.2,
            max_tokens: 400,
        }
    }
}

impl std::fmt::Debug for TranslatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatorConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TranslatorConfig {
    /// A hosted endpoint needs a key; a self-hosted one may not.
    pub fn is_usable(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
            || !self.base_url.contains("api.openai.com")
    }
}

/// [`LlmTranslator`] when `config` is usable, [`OfflineTranslator`]
/// otherwise.
pub fn translator_from_config(config: TranslatorConfig) -> Arc<dyn PlanTranslator> {
    if config.is_usable() {
        info!(model = %config.model, base_url = %config.base_url, "plan translator ready");
        Arc::new(LlmTranslator::new(config))
    } else {
        info!("no API key configured; using preset fallback only");
        Arc::new(OfflineTranslator)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    /// Role of every reply; only ever deserialized.
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmTranslator
// ─────────────────────────────────────────────────────────────────────────────

/// Chat-completions client.  Construct once and share.
pub struct LlmTranslator {
    config: TranslatorConfig,
    client: reqwest::Client,
    system_prompt: String,
}

impl LlmTranslator {
    pub fn new(config: TranslatorConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            client,
            system_prompt: system_prompt(),
        }
    }

    fn messages(&self, utterance: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: Role::System,
                content: self.system_prompt.clone(),
            },
            ChatMessage {
                role: Role::User,
                content: utterance.to_string(),
            },
        ]
    }

    /// Raw completion text for `utterance`.
    ///
    /// # Errors
    ///
    /// [`TranslateError::Http`] on transport failure or a non-2xx status,
    /// [`TranslateError::BadResponse`] if the reply has no choices.
    pub async fn complete(&self, utterance: &str) -> Result<String, TranslateError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'));
        let messages = self.messages(utterance);
        let body = ChatRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }

        let response: ChatResponse = request.send().await?.error_for_status()?.json().await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| TranslateError::BadResponse("empty choices array".into()))
    }
}

#[async_trait]
impl PlanTranslator for LlmTranslator {
    async fn translate(&self, utterance: &str) -> Result<Vec<StepDescription>, TranslateError> {
        let reply = self.complete(utterance).await?;
        debug!(reply = %reply, "translator reply");
        Ok(parse_plan(&reply)?)
    }
}

/// System prompt with the plan schema appended.
pub fn system_prompt() -> String {
    format!("{SYSTEM_PROMPT}\n\nJSON Schema of the reply:\n{}", plan_schema())
}

/// Translator used when no model is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTranslator;

#[async_trait]
impl PlanTranslator for OfflineTranslator {
    async fn translate(&self, _utterance: &str) -> Result<Vec<StepDescription>, TranslateError> {
        Err(TranslateError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let msg = ChatMessage {
            role: Role::System,
            content: "hi".into(),
        };
        assert!(serde_json::to_string(&msg).unwrap().contains("\"system\""));
    }

    #[test]
    fn chat_response_accepts_assistant_reply() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"[]"}}]}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices[0].message.role, Role::Assistant);
        assert_eq!(response.choices[0].message.content, "[]");
    }

    #[test]
    fn system_prompt_embeds_schema() {
        let prompt = system_prompt();
        assert!(prompt.contains("JSON Schema"));
        assert!(prompt.contains("control_gripper"));
        assert!(prompt.contains("seconds"));
    }

    #[test]
    fn messages_are_system_then_user() {
        let t = LlmTranslator::new(TranslatorConfig::default());
        let msgs = t.messages("lift the arm");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[1].role, Role::User);
        assert_eq!(msgs[1].content, "lift the arm");
    }

    #[test]
    fn config_usability() {
        let mut cfg = TranslatorConfig::default();
        assert!(!cfg.is_usable());
        cfg.api_key = Some(String::new());
        assert!(!cfg.is_usable());
        cfg.api_key = Some("sk-test".into());
        assert!(cfg.is_usable());
        let local = TranslatorConfig {
            base_url: "http://localhost:11434".into(),
            ..TranslatorConfig::default()
        };
        assert!(local.is_usable());
    }

    #[test]
    fn debug_redacts_api_key() {
        let cfg = TranslatorConfig {
            api_key: Some("sk-secret".into()),
            ..TranslatorConfig::default()
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("REDACTED"));
    }

    #[tokio::test]
    async fn offline_translator_is_unavailable() {
        let result = OfflineTranslator.translate("lift").await;
        assert!(matches!(result, Err(TranslateError::Unavailable)));
    }

    #[tokio::test]
    async fn unreachable_server_is_an_http_error() {
        let t = LlmTranslator::new(TranslatorConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_millis(500),
            ..TranslatorConfig::default()
        });
        assert!(matches!(t.translate("lift").await, Err(TranslateError::Http(_))));
    }
}
