use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::classifier::Classification;
use crate::core::shared::error::StoreError;
use crate::kb::{Article, ArticleStatus, ArticleStore};
use crate::tickets::{Ticket, TicketCategory};

pub const MAX_ARTICLES: usize = 3;

const TAG_MATCH_SCORE: f64 = 0.3;
const TITLE_WORD_SCORE: f64 = 0.2;
const CATEGORY_TAG_SCORE: f64 = 0.5;
const MIN_TITLE_WORD_CHARS: usize = 4;
const GENERAL_TAG: &str = "general";

/// Which candidate query produced the articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    TextSearch,
    CategoryFallback,
    RecentFallback,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedArticle {
    pub article: Article,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub articles: Vec<RankedArticle>,
    pub strategy: RetrievalStrategy,
}

impl Retrieval {
    pub fn article_ids(&self) -> Vec<uuid::Uuid> {
        self.articles.iter().map(|r| r.article.id).collect()
    }

    pub fn average_score(&self) -> f64 {
        if self.articles.is_empty() {
            return 0.0;
        }
        let total: f64 = self.articles.iter().map(|r| r.relevance_score).sum();
        total / self.articles.len() as f64
    }
}

pub struct Retriever {
    articles: Arc<dyn ArticleStore>,
}

impl Retriever {
    pub fn new(articles: Arc<dyn ArticleStore>) -> Self {
        Self { articles }
    }

    pub async fn retrieve(
        &self,
        ticket: &Ticket,
        classification: &Classification,
    ) -> Result<Retrieval, StoreError> {
        let (candidates, strategy) = self
            .candidates(ticket, classification.predicted_category)
            .await?;
        debug!(
            "Retrieved {} candidate articles for ticket {} via {:?}",
            candidates.len(),
            ticket.id,
            strategy
        );

        Ok(Retrieval {
            articles: score_articles(candidates, ticket, classification.predicted_category),
            strategy,
        })
    }

    async fn candidates(
        &self,
        ticket: &Ticket,
        category: TicketCategory,
    ) -> Result<(Vec<Article>, RetrievalStrategy), StoreError> {
        let found = self
            .articles
            .search_full_text(&ticket.triage_text(), ArticleStatus::Published, MAX_ARTICLES)
            .await?;
        if !found.is_empty() {
            return Ok((found, RetrievalStrategy::TextSearch));
        }

        let tags = [category.as_str().to_string(), GENERAL_TAG.to_string()];
        let found = self
            .articles
            .find_by_tags(&tags, ArticleStatus::Published, MAX_ARTICLES)
            .await?;
        if !found.is_empty() {
            return Ok((found, RetrievalStrategy::CategoryFallback));
        }

        let found = self
            .articles
            .find_recent(ArticleStatus::Published, MAX_ARTICLES)
            .await?;
        if !found.is_empty() {
            return Ok((found, RetrievalStrategy::RecentFallback));
        }

        Ok((Vec::new(), RetrievalStrategy::None))
    }
}

/// Re-ranks candidates against the ticket. The sort is stable, so equal scores
/// keep the store's order.
pub fn score_articles(
    articles: Vec<Article>,
    ticket: &Ticket,
    category: TicketCategory,
) -> Vec<RankedArticle> {
    let mut ranked: Vec<RankedArticle> = articles
        .into_iter()
        .take(MAX_ARTICLES)
        .map(|article| {
            let relevance_score = relevance_score(&article, ticket, category);
            RankedArticle {
                article,
                relevance_score,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    ranked
}

fn relevance_score(article: &Article, ticket: &Ticket, category: TicketCategory) -> f64 {
    let title = ticket.title.to_lowercase();
    let description = ticket.description.to_lowercase();
    let ticket_text = format!("{title} {description}");
    let ticket_tokens: Vec<&str> = ticket_text.split_whitespace().collect();

    let mut score = 0.0;

    // Tags match as stored against the lower-cased ticket text.
    for tag in &article.tags {
        let tag = tag.as_str();
        if title.contains(tag) || description.contains(tag) || tag == category.as_str() {
            score += TAG_MATCH_SCORE;
        }
    }

    let article_title = article.title.to_lowercase();
    let title_hits = article_title
        .split_whitespace()
        .filter(|word| word.chars().count() >= MIN_TITLE_WORD_CHARS)
        .filter(|word| ticket_tokens.contains(word))
        .count();
    score += TITLE_WORD_SCORE * title_hits as f64;

    if article.tags.iter().any(|t| t == category.as_str()) {
        score += CATEGORY_TAG_SCORE;
    }

    super::round_score(score.min(1.0))
}
