use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::round_score;
use crate::core::shared::error::{PipelineStage, TriageError};
use crate::llm::{extract_json_object, LLMProvider};
use crate::tickets::TicketCategory;

const BASE_CONFIDENCE: f64 = 0.3;
const CONFIDENCE_PER_MATCH: f64 = 0.2;
const MAX_CONFIDENCE: f64 = 0.95;

/// Checked in this order; a later category only wins with strictly more hits.
const CATEGORY_KEYWORDS: [(TicketCategory, &[&str]); 3] = [
    (
        TicketCategory::Billing,
        &["refund", "invoice", "payment", "billing", "charge", "subscription"],
    ),
    (
        TicketCategory::Tech,
        &["error", "bug", "crash", "login", "password", "not working", "broken"],
    ),
    (
        TicketCategory::Shipping,
        &["delivery", "shipment", "shipping", "package", "tracking", "arrived"],
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub predicted_category: TicketCategory,
    pub confidence: f64,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, TriageError>;
}

/// Deterministic keyword matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_text(&self, text: &str) -> Classification {
        let lower = text.to_lowercase();

        let mut category = TicketCategory::Other;
        let mut matches = 0usize;
        for (candidate, keywords) in CATEGORY_KEYWORDS {
            let hits = keywords.iter().filter(|kw| lower.contains(*kw)).count();
            if hits > matches {
                category = candidate;
                matches = hits;
            }
        }

        let confidence =
            round_score((BASE_CONFIDENCE + CONFIDENCE_PER_MATCH * matches as f64).min(MAX_CONFIDENCE));
        debug!("Keyword classification: {} ({} matches)", category, matches);

        Classification {
            predicted_category: category,
            confidence,
        }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, TriageError> {
        Ok(self.classify_text(text))
    }
}

/// Classifier backed by an [`LLMProvider`]. Without a provider every call fails
/// with `NotImplemented`.
pub struct LlmClassifier {
    provider: Option<Arc<dyn LLMProvider>>,
}

impl LlmClassifier {
    pub fn new(provider: Option<Arc<dyn LLMProvider>>) -> Self {
        Self { provider }
    }

    fn prompt(text: &str) -> String {
        format!(
            "Classify the following helpdesk ticket into exactly one category: \
             billing, tech, shipping or other.\n\
             Answer with a JSON object {{\"category\": <category>, \"confidence\": <0..1>}}.\n\n\
             Ticket:\n{text}"
        )
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, TriageError> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            TriageError::NotImplemented("LLM classifier has no provider configured".to_string())
        })?;

        let reply = provider
            .generate(&Self::prompt(text), &serde_json::json!({ "max_tokens": 100 }))
            .await
            .map_err(|e| TriageError::upstream(PipelineStage::Classification, e))?;

        let parsed = extract_json_object(&reply).ok_or_else(|| {
            TriageError::upstream(PipelineStage::Classification, "reply is not a JSON object")
        })?;
        let predicted_category = parsed["category"]
            .as_str()
            .unwrap_or_default()
            .parse::<TicketCategory>()
            .map_err(|e| TriageError::upstream(PipelineStage::Classification, e))?;
        let confidence = parsed["confidence"].as_f64().unwrap_or(0.0);
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(Classification {
            predicted_category,
            confidence,
        })
    }
}
