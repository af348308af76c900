use std::time::Duration;

use async_trait::async_trait;
use cartwright_core_types::{CandidateProduct, Item};
use item_parser::{InterpretError, ItemInterpreter};
use product_selector::{JudgeError, ProductJudge};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::utils::extract_json_array;
use super::LlmError;
use crate::config::LlmSettings;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub item_max_tokens: u32,
    pub judge_max_tokens: u32,
    pub timeout: Duration,
}

impl ClaudeConfig {
    /// `None` when no key is configured, which leaves both the interpreter
    /// and the judge switched off.
    pub fn from_settings(settings: &LlmSettings) -> Option<Self> {
        let api_key = settings.api_key()?.to_string();
        Some(Self {
            api_key,
            model: settings.model.clone(),
            api_base: settings.api_base.clone(),
            temperature: 0.0,
            item_max_tokens: settings.item_max_tokens,
            judge_max_tokens: settings.judge_max_tokens,
            timeout: Duration::from_millis(settings.timeout_ms),
        })
    }
}

pub struct AnthropicClient {
    client: Client,
    config: ClaudeConfig,
    site: String,
}

impl AnthropicClient {
    pub fn new(config: ClaudeConfig, site: impl Into<String>) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::MissingKey);
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| LlmError::Client(err.to_string()))?;
        Ok(Self {
            client,
            config,
            site: site.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Sends one user turn and returns the joined text blocks of the reply.
    pub async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        let body = ClaudeRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens,
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: vec![ClaudeContent {
                    _type: "text".to_string(),
                    text: prompt.to_string(),
                }],
            }],
        };

        let url = format!("{}/messages", self.config.api_base.trim_end_matches('/'));

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(LlmError::Status { status, body });
        }

        let response: ClaudeResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Response(err.to_string()))?;

        let content = response
            .content
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        if content.trim().is_empty() {
            return Err(LlmError::Response("reply has no text".into()));
        }
        debug!(target: "llm", model = %self.config.model, chars = content.len(), "completion received");
        Ok(content)
    }
}

fn item_prompt(lines: &[String], site: &str) -> String {
    let listing = serde_json::to_string(lines).unwrap_or_else(|_| "[]".into());
    format!(
        "Parse these grocery shopping items into structured data.\n\
         Return ONLY a JSON array, no explanation and no markdown.\n\n\
         Items to parse: {listing}\n\n\
         For each item, output an object with:\n  \
         \"name\": concise product name good for searching on {site} (string)\n  \
         \"qty\": integer quantity. Convert language: \"a dozen\"=12, \"half dozen\"=6, \"a\"=1, \
         \"a pack\"=1, \"a bag\"=1, \"a couple\"=2, \"a few\"=3; default=1\n  \
         \"brand\": brand name if explicitly stated, otherwise null\n  \
         \"max_price\": numeric price cap if stated (e.g. \"max $5\" is 5.0), otherwise null\n\n\
         Only include items that appear in the input. Do not add extras.\n\
         Example input: [\"3 packs indomie chicken\", \"a dozen eggs\", \"2L milk max $5\"]\n\
         Example output: [{{\"name\":\"indomie chicken noodles\",\"qty\":3,\"brand\":\"Indomie\",\"max_price\":null}},\
         {{\"name\":\"eggs\",\"qty\":12,\"brand\":null,\"max_price\":null}},\
         {{\"name\":\"milk 2L\",\"qty\":1,\"brand\":null,\"max_price\":5.0}}]\n\n\
         Now parse:"
    )
}

#[derive(Debug, Deserialize)]
struct ParsedItem {
    #[serde(default)]
    name: String,
    #[serde(default, alias = "qty")]
    quantity: Option<f64>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    max_price: Option<f64>,
}

impl ParsedItem {
    fn into_item(self) -> Item {
        let quantity = self.quantity.map(|q| q.floor() as i64).unwrap_or(1);
        let mut item = Item::new(self.name.trim(), quantity);
        if let Some(brand) = self.brand.filter(|b| !b.trim().is_empty()) {
            item = item.with_brand(brand.trim());
        }
        if let Some(price) = self.max_price.filter(|p| p.is_finite() && *p >= 0.0) {
            item = item.with_max_price(price);
        }
        item
    }
}

fn parse_item_reply(reply: &str) -> Result<Vec<Item>, InterpretError> {
    let json = extract_json_array(reply)
        .ok_or_else(|| InterpretError::Malformed("reply holds no JSON array".into()))?;
    let parsed: Vec<ParsedItem> =
        serde_json::from_str(&json).map_err(|err| InterpretError::Malformed(err.to_string()))?;
    Ok(parsed
        .into_iter()
        .filter(|item| !item.name.trim().is_empty())
        .map(ParsedItem::into_item)
        .collect())
}

#[async_trait]
impl ItemInterpreter for AnthropicClient {
    async fn interpret(&self, lines: &[String]) -> Result<Vec<Item>, InterpretError> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        let reply = self
            .complete(&item_prompt(lines, &self.site), self.config.item_max_tokens)
            .await
            .map_err(|err| match err {
                LlmError::MissingKey | LlmError::Client(_) => {
                    InterpretError::Unavailable(err.to_string())
                }
                LlmError::Response(_) => InterpretError::Malformed(err.to_string()),
                _ => InterpretError::Upstream(err.to_string()),
            })?;
        parse_item_reply(&reply)
    }
}

#[async_trait]
impl ProductJudge for AnthropicClient {
    async fn judge(
        &self,
        candidates: &[CandidateProduct],
        item: &Item,
    ) -> Result<Option<usize>, JudgeError> {
        let prompt = product_selector::build_prompt(candidates, item, &self.site);
        let reply = self
            .complete(&prompt, self.config.judge_max_tokens)
            .await
            .map_err(|err| match err {
                LlmError::MissingKey | LlmError::Client(_) => {
                    JudgeError::Unavailable(err.to_string())
                }
                LlmError::Response(_) => JudgeError::BadReply(err.to_string()),
                _ => JudgeError::Upstream(err.to_string()),
            })?;
        product_selector::parse_reply(&reply, candidates.len())
            .ok_or_else(|| JudgeError::BadReply(reply.trim().chars().take(40).collect()))
    }
}

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: String,
    content: Vec<ClaudeContent>,
}

#[derive(Debug, Serialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    _type: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponseContent {
    #[serde(rename = "type")]
    _type: String,
    #[serde(default)]
    text: Option<String>,
}
