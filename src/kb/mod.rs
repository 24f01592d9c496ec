pub mod seed;
pub mod store;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::error::TriageError;
use crate::core::shared::state::AppState;

pub use store::{ArticleStore, InMemoryArticleStore};

const LIST_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    #[default]
    Draft,
    Published,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub status: ArticleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        tags: Vec<String>,
        status: ArticleStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            body: body.into(),
            tags,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn published(title: impl Into<String>, body: impl Into<String>, tags: &[&str]) -> Self {
        Self::new(
            title,
            body,
            tags.iter().map(|t| t.to_string()).collect(),
            ArticleStatus::Published,
        )
    }
}

/// Admin edit; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticlePatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<ArticleStatus>,
}

impl ArticlePatch {
    pub(crate) fn apply(self, article: &mut Article) {
        if let Some(title) = self.title {
            article.title = title;
        }
        if let Some(body) = self.body {
            article.body = body;
        }
        if let Some(tags) = self.tags {
            article.tags = tags;
        }
        if let Some(status) = self.status {
            article.status = status;
        }
        article.updated_at = Utc::now();
    }

    fn validate(&self) -> Result<(), TriageError> {
        let blank = |field: &Option<String>| field.as_deref().is_some_and(|v| v.trim().is_empty());
        if blank(&self.title) || blank(&self.body) {
            return Err(TriageError::Validation(
                "title and body cannot be blank".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ArticleQuery {
    pub query: Option<String>,
    pub status: Option<ArticleStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CreateArticleRequest {
    pub title: String,
    pub body: String,
    pub tags: Option<Vec<String>>,
    pub status: Option<ArticleStatus>,
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArticleQuery>,
) -> Result<Json<Vec<Article>>, TriageError> {
    let status = query.status.unwrap_or(ArticleStatus::Published);
    let articles = match query.query.filter(|q| !q.trim().is_empty()) {
        Some(q) => {
            state
                .stores
                .articles
                .search_full_text(&q, status, LIST_LIMIT)
                .await?
        }
        None => state.stores.articles.find_recent(status, LIST_LIMIT).await?,
    };
    Ok(Json(articles))
}

pub async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Article>, TriageError> {
    state
        .stores
        .articles
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| TriageError::NotFound(format!("article {id}")))
}

pub async fn create_article(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateArticleRequest>,
) -> Result<(StatusCode, Json<Article>), TriageError> {
    if req.title.trim().is_empty() || req.body.trim().is_empty() {
        return Err(TriageError::Validation(
            "title and body are required".to_string(),
        ));
    }
    let article = Article::new(
        req.title,
        req.body,
        req.tags.unwrap_or_default(),
        req.status.unwrap_or_default(),
    );
    let article = state.stores.articles.insert(article).await?;
    Ok((StatusCode::CREATED, Json(article)))
}

pub async fn update_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ArticlePatch>,
) -> Result<Json<Article>, TriageError> {
    patch.validate()?;
    let article = state
        .stores
        .articles
        .update(id, patch)
        .await?
        .ok_or_else(|| TriageError::NotFound(format!("article {id}")))?;
    info!("Updated article {}", article.id);
    Ok(Json(article))
}

pub async fn delete_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, TriageError> {
    state
        .stores
        .articles
        .delete(id)
        .await?
        .ok_or_else(|| TriageError::NotFound(format!("article {id}")))?;
    info!("Deleted article {}", id);
    Ok(Json(serde_json::json!({ "deleted": id })))
}

pub fn configure_kb_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/kb", get(list_articles).post(create_article))
        .route(
            "/api/kb/:id",
            get(get_article).put(update_article).delete(delete_article),
        )
}
