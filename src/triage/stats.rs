use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::suggestion::Suggestion;
use crate::tickets::TicketCategory;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageStats {
    pub total_suggestions: usize,
    pub auto_closed_count: usize,
    pub average_confidence: f64,
    pub average_latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: TicketCategory,
    pub count: usize,
    pub average_confidence: f64,
    pub auto_close_rate: f64,
}

pub fn triage_stats(suggestions: &[Suggestion]) -> TriageStats {
    if suggestions.is_empty() {
        return TriageStats::default();
    }

    let total = suggestions.len() as f64;
    TriageStats {
        total_suggestions: suggestions.len(),
        auto_closed_count: suggestions.iter().filter(|s| s.auto_closed).count(),
        average_confidence: suggestions.iter().map(|s| s.confidence).sum::<f64>() / total,
        average_latency_ms: suggestions
            .iter()
            .map(|s| s.model_info.latency_ms as f64)
            .sum::<f64>()
            / total,
    }
}

/// Per predicted category, most frequent first. Equal counts are ordered by
/// category name.
pub fn category_stats(suggestions: &[Suggestion]) -> Vec<CategoryStats> {
    let mut groups: HashMap<TicketCategory, Vec<&Suggestion>> = HashMap::new();
    for suggestion in suggestions {
        groups
            .entry(suggestion.predicted_category)
            .or_default()
            .push(suggestion);
    }

    let mut stats: Vec<CategoryStats> = groups
        .into_iter()
        .map(|(category, group)| {
            let count = group.len();
            let auto_closed = group.iter().filter(|s| s.auto_closed).count();
            CategoryStats {
                category,
                count,
                average_confidence: group.iter().map(|s| s.confidence).sum::<f64>()
                    / count as f64,
                auto_close_rate: auto_closed as f64 / count as f64,
            }
        })
        .collect();

    stats.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.category.as_str().cmp(b.category.as_str()))
    });
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::suggestion::ModelInfo;
    use uuid::Uuid;

    fn suggestion(category: TicketCategory, confidence: f64, auto_closed: bool) -> Suggestion {
        let mut s = Suggestion::new(
            Uuid::new_v4(),
            category,
            Vec::new(),
            String::new(),
            confidence,
            ModelInfo {
                provider: "stub".to_string(),
                model: "deterministic-v1".to_string(),
                prompt_version: "1.0".to_string(),
                latency_ms: 10,
            },
        );
        s.auto_closed = auto_closed;
        s
    }

    #[test]
    fn test_empty_stats_are_zero() {
        assert_eq!(triage_stats(&[]), TriageStats::default());
        assert!(category_stats(&[]).is_empty());
    }

    #[test]
    fn test_totals_and_averages() {
        let all = [
            suggestion(TicketCategory::Billing, 0.5, false),
            suggestion(TicketCategory::Billing, 1.0, true),
            suggestion(TicketCategory::Tech, 0.75, false),
        ];

        let stats = triage_stats(&all);
        assert_eq!(stats.total_suggestions, 3);
        assert_eq!(stats.auto_closed_count, 1);
        assert_eq!(stats.average_confidence, 0.75);
        assert_eq!(stats.average_latency_ms, 10.0);

        let by_category = category_stats(&all);
        assert_eq!(by_category[0].category, TicketCategory::Billing);
        assert_eq!(by_category[0].count, 2);
        assert_eq!(by_category[0].auto_close_rate, 0.5);
        assert_eq!(by_category[1].category, TicketCategory::Tech);
    }
}
