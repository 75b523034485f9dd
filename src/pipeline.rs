use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::model::{AskResponse, Fragment};
use crate::retrieval::HybridRetriever;

/// Exact sentence returned when the corpus does not support an answer. The
/// evaluator classifies answers by comparing against this text.
pub const REFUSAL: &str = "This information is not available in the provided document(s).";

pub const DEFAULT_GENERATION_MODEL: &str = "claude-3-haiku-20240307";
pub const DEFAULT_MAX_TOKENS: u32 = 300;
pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Answered,
    Refused,
}

impl AnswerKind {
    pub fn classify(answer: &str) -> Self {
        if is_refusal(answer) {
            Self::Refused
        } else {
            Self::Answered
        }
    }
}

pub fn is_refusal(answer: &str) -> bool {
    answer.trim() == REFUSAL.trim()
}

pub trait Generator {
    fn generate(&self, context: &str, question: &str) -> Result<String>;
}

pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer ONLY using provided context.\nIf not found return EXACT:\n{REFUSAL}\n\nContext:\n{context}\n\nQuestion:\n{question}\n"
    )
}

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub endpoint: String,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_GENERATION_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            endpoint: ANTHROPIC_MESSAGES_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<MessageParam<'a>>,
}

#[derive(Serialize)]
struct MessageParam<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

pub struct AnthropicGenerator {
    config: AnthropicConfig,
    client: reqwest::blocking::Client,
}

impl AnthropicGenerator {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!("ANTHROPIC_API_KEY is not set; pass --api-key or export the variable");
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build generation http client")?;
        Ok(Self { config, client })
    }
}

impl Generator for AnthropicGenerator {
    fn generate(&self, context: &str, question: &str) -> Result<String> {
        if context.trim().is_empty() {
            return Ok(REFUSAL.to_string());
        }

        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: vec![MessageParam {
                role: "user",
                content: build_prompt(context, question),
            }],
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .context("messages request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!(
                "messages request returned HTTP {}: {}",
                status.as_u16(),
                body.trim()
            );
        }

        let body: MessagesResponse = response
            .json()
            .context("failed to decode messages response")?;
        Ok(first_text_block(&body.content))
    }
}

fn first_text_block(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .find(|block| block.block_type == "text")
        .map(|block| block.text.clone())
        .unwrap_or_default()
}

pub struct AnswerPipeline {
    retriever: HybridRetriever,
    generator: Box<dyn Generator>,
    top_k: usize,
}

impl AnswerPipeline {
    pub fn new(retriever: HybridRetriever, generator: Box<dyn Generator>, top_k: usize) -> Self {
        Self {
            retriever,
            generator,
            top_k: top_k.max(1),
        }
    }

    pub fn ask_question(&self, question: &str, debug: bool) -> Result<AskResponse, PipelineError> {
        let fragments = self.retriever.retrieve(question, self.top_k)?;
        let context = build_context(&fragments);

        let answer = if context.trim().is_empty() {
            debug!("no supporting context; refusing without generation");
            REFUSAL.to_string()
        } else {
            self.generator
                .generate(&context, question)
                .map_err(|err| PipelineError::Generation(format!("{err:#}")))?
        };
        let answer = if answer.is_empty() {
            REFUSAL.to_string()
        } else {
            answer
        };

        info!(
            fragments = fragments.len(),
            kind = ?AnswerKind::classify(&answer),
            "question answered"
        );

        Ok(AskResponse {
            answer,
            citations: citations(&fragments),
            fragments: if debug { fragments } else { Vec::new() },
        })
    }
}

pub fn build_context(fragments: &[Fragment]) -> String {
    fragments
        .iter()
        .map(|fragment| fragment.text.as_str())
        .collect::<Vec<&str>>()
        .join("\n")
}

pub fn citations(fragments: &[Fragment]) -> Vec<String> {
    fragments.iter().map(Fragment::citation).collect()
}
