use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Article, ArticlePatch, ArticleStatus};
use crate::core::shared::error::StoreError;

const MIN_TOKEN_LEN: usize = 3;
const TITLE_WEIGHT: usize = 2;

const STOP_WORDS: &[&str] = &[
    "and", "are", "but", "can", "did", "does", "for", "from", "had", "has", "have", "her",
    "him", "his", "how", "its", "not", "our", "out", "please", "she", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "was", "were", "what", "when", "where",
    "which", "who", "why", "will", "with", "you", "your",
];

/// Knowledge base storage. Triage only reads; the admin API writes.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn insert(&self, article: Article) -> Result<Article, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Article>, StoreError>;

    /// `None` when no article has `id`.
    async fn update(
        &self,
        id: Uuid,
        patch: ArticlePatch,
    ) -> Result<Option<Article>, StoreError>;

    /// Returns the removed article, `None` when it did not exist.
    async fn delete(&self, id: Uuid) -> Result<Option<Article>, StoreError>;

    /// Articles matching `query`, best text relevance first.
    async fn search_full_text(
        &self,
        query: &str,
        status: ArticleStatus,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError>;

    /// Articles carrying any of `tags`, in store order.
    async fn find_by_tags(
        &self,
        tags: &[String],
        status: ArticleStatus,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError>;

    /// Newest articles first.
    async fn find_recent(
        &self,
        status: ArticleStatus,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError>;
}

pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

fn text_score(article: &Article, terms: &HashSet<String>) -> usize {
    let title = tokenize(&article.title);
    let body = tokenize(&article.body);
    terms
        .iter()
        .map(|term| {
            let in_title = title.iter().filter(|t| *t == term).count();
            let in_body = body.iter().filter(|t| *t == term).count();
            in_title * TITLE_WEIGHT + in_body
        })
        .sum()
}

/// Insertion-ordered article collection.
#[derive(Default)]
pub struct InMemoryArticleStore {
    articles: RwLock<Vec<Article>>,
}

impl InMemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.articles.read().await.len()
    }

    pub async fn contains_title(&self, title: &str) -> bool {
        self.articles.read().await.iter().any(|a| a.title == title)
    }
}

#[async_trait]
impl ArticleStore for InMemoryArticleStore {
    async fn insert(&self, article: Article) -> Result<Article, StoreError> {
        self.articles.write().await.push(article.clone());
        Ok(article)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Article>, StoreError> {
        Ok(self.articles.read().await.iter().find(|a| a.id == id).cloned())
    }

    async fn update(
        &self,
        id: Uuid,
        patch: ArticlePatch,
    ) -> Result<Option<Article>, StoreError> {
        let mut articles = self.articles.write().await;
        Ok(articles.iter_mut().find(|a| a.id == id).map(|article| {
            patch.apply(article);
            article.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Article>, StoreError> {
        let mut articles = self.articles.write().await;
        Ok(articles
            .iter()
            .position(|a| a.id == id)
            .map(|index| articles.remove(index)))
    }

    async fn search_full_text(
        &self,
        query: &str,
        status: ArticleStatus,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError> {
        let terms: HashSet<String> = tokenize(query).into_iter().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let articles = self.articles.read().await;
        let mut scored: Vec<(usize, &Article)> = articles
            .iter()
            .filter(|a| a.status == status)
            .map(|a| (text_score(a, &terms), a))
            .filter(|(score, _)| *score > 0)
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then(b.created_at.cmp(&a.created_at)));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, a)| a.clone())
            .collect())
    }

    async fn find_by_tags(
        &self,
        tags: &[String],
        status: ArticleStatus,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError> {
        let articles = self.articles.read().await;
        Ok(articles
            .iter()
            .filter(|a| a.status == status && a.tags.iter().any(|t| tags.contains(t)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_recent(
        &self,
        status: ArticleStatus,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError> {
        let articles = self.articles.read().await;
        let mut matching: Vec<&Article> = articles.iter().filter(|a| a.status == status).collect();
        // Later inserts win ties on identical timestamps.
        matching.reverse();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching.into_iter().take(limit).cloned().collect())
    }
}
