//! Starter knowledge base loaded when `SEED_KB` is enabled.

use log::info;

use super::store::InMemoryArticleStore;
use super::{Article, ArticleStore};
use crate::core::shared::error::StoreError;

pub fn sample_articles() -> Vec<Article> {
    vec![
        Article::published(
            "How to Request a Refund",
            "To request a refund, log into your account dashboard and open the Order History \
             section. Find the order you want refunded, click Request Refund and pick a reason. \
             Refunds are typically processed within 5-7 business days and you will receive an \
             email confirmation once the refund has been initiated.",
            &["billing", "refund", "orders", "payment"],
        ),
        Article::published(
            "Troubleshooting Login Issues",
            "If you cannot log into your account, clear your browser cache and cookies, try a \
             private window, check the spelling of your email address, and use the Forgot \
             Password link if needed. Disabling extensions or trying another browser also helps. \
             Contact technical support if none of these work.",
            &["tech", "login", "authentication", "troubleshooting"],
        ),
        Article::published(
            "Shipping and Delivery Information",
            "Standard shipping takes 5-7 business days and is free on orders over $50. Express \
             shipping takes 2-3 business days, overnight shipping arrives the next business day. \
             You receive a tracking number by email once your order ships. Delivery times may \
             vary during peak seasons.",
            &["shipping", "delivery", "tracking", "orders"],
        ),
        Article::published(
            "Account Security Best Practices",
            "Use a unique, strong password and change it regularly. Enable two-factor \
             authentication in your account settings and keep backup codes somewhere safe. \
             Review account activity regularly and report suspicious activity immediately.",
            &["security", "account", "password", "two-factor"],
        ),
        Article::published(
            "Product Return Policy",
            "Items can be returned within 30 days of delivery in their original condition and \
             packaging. Start the return in your account, print the prepaid label and drop the \
             package at any authorized location. Refunds are processed within 3-5 business days \
             after we receive the item. Personalized or custom items cannot be returned.",
            &["returns", "policy", "refund", "shipping"],
        ),
    ]
}

/// Inserts every sample article whose title is not already present.
pub async fn seed_knowledge_base(store: &InMemoryArticleStore) -> Result<usize, StoreError> {
    let mut inserted = 0;
    for article in sample_articles() {
        if store.contains_title(&article.title).await {
            continue;
        }
        store.insert(article).await?;
        inserted += 1;
    }
    info!("Seeded {} knowledge base articles", inserted);
    Ok(inserted)
}
