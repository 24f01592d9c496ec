use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::retriever::RankedArticle;
use crate::core::shared::error::{PipelineStage, TriageError};
use crate::llm::LLMProvider;

const EXCERPT_CHARS: usize = 100;
const WORDS_PER_SENTENCE_TARGET: f64 = 25.0;

const GREETING: &str = "Thank you for contacting our support team. Based on your inquiry, \
                        I've found some relevant information that might help:";
const SIGN_OFF: &str = "If you need further assistance, please don't hesitate to reach out.\n\n\
                        Best regards,\nSmart Helpdesk AI";

static SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").expect("valid regex"));
static WORD_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub draft_reply: String,
    pub citations: Vec<String>,
}

#[async_trait]
pub trait Drafter: Send + Sync {
    async fn draft(&self, text: &str, articles: &[RankedArticle]) -> Result<Draft, TriageError>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

/// Numbered citations in rank order, `"[1] <title>"`.
pub fn citations(articles: &[RankedArticle]) -> Vec<String> {
    articles
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}", i + 1, r.article.title))
        .collect()
}

/// Words per sentence against a 25-word target, capped at 1.0.
pub fn readability_score(text: &str) -> f64 {
    let sentences = SENTENCE_SPLIT.split(text).count();
    let words = WORD_SPLIT.split(text).count();
    if sentences == 0 {
        return 0.0;
    }
    (words as f64 / sentences as f64 / WORDS_PER_SENTENCE_TARGET).min(1.0)
}

/// Fixed reply template listing each article with a short excerpt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateDrafter;

impl TemplateDrafter {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, articles: &[RankedArticle]) -> Draft {
        let items: Vec<String> = articles
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let excerpt: String = r.article.body.chars().take(EXCERPT_CHARS).collect();
                format!("{}. {} - {}...", i + 1, r.article.title, excerpt)
            })
            .collect();

        Draft {
            draft_reply: format!("{GREETING}\n\n{}\n\n{SIGN_OFF}", items.join("\n\n")),
            citations: citations(articles),
        }
    }
}

#[async_trait]
impl Drafter for TemplateDrafter {
    async fn draft(&self, _text: &str, articles: &[RankedArticle]) -> Result<Draft, TriageError> {
        Ok(self.render(articles))
    }

    fn provider_name(&self) -> &str {
        "stub"
    }

    fn model_name(&self) -> &str {
        "deterministic-v1"
    }
}

pub struct LlmDrafter {
    provider: Option<Arc<dyn LLMProvider>>,
}

impl LlmDrafter {
    pub fn new(provider: Option<Arc<dyn LLMProvider>>) -> Self {
        Self { provider }
    }

    fn prompt(text: &str, articles: &[RankedArticle]) -> String {
        let context: Vec<String> = articles
            .iter()
            .enumerate()
            .map(|(i, r)| format!("[{}] {}\n{}", i + 1, r.article.title, r.article.body))
            .collect();
        format!(
            "You are a helpdesk assistant. Write a short, polite reply to the customer ticket \
             below. Use only the numbered knowledge base articles and cite them as [n].\n\n\
             Articles:\n{}\n\nTicket:\n{text}",
            context.join("\n\n")
        )
    }
}

#[async_trait]
impl Drafter for LlmDrafter {
    async fn draft(&self, text: &str, articles: &[RankedArticle]) -> Result<Draft, TriageError> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            TriageError::NotImplemented("LLM drafter has no provider configured".to_string())
        })?;

        let reply = provider
            .generate(
                &Self::prompt(text, articles),
                &serde_json::json!({ "max_tokens": 600, "temperature": 0.2 }),
            )
            .await
            .map_err(|e| TriageError::upstream(PipelineStage::Drafting, e))?;

        let draft_reply = reply.trim().to_string();
        if draft_reply.is_empty() {
            return Err(TriageError::upstream(
                PipelineStage::Drafting,
                "model returned an empty reply",
            ));
        }

        Ok(Draft {
            draft_reply,
            citations: citations(articles),
        })
    }

    fn provider_name(&self) -> &str {
        self.provider
            .as_ref()
            .map(|p| p.provider_name())
            .unwrap_or("none")
    }

    fn model_name(&self) -> &str {
        self.provider
            .as_ref()
            .map(|p| p.model_name())
            .unwrap_or("none")
    }
}
