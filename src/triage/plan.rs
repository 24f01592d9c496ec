use serde::{Deserialize, Serialize};

use crate::tickets::Ticket;

pub const PLANNER_STEPS: [&str; 5] = [
    "PLAN_EXECUTION",
    "CLASSIFY_TICKET",
    "RETRIEVE_KB_ARTICLES",
    "DRAFT_REPLY",
    "MAKE_DECISION",
];

const MEDIUM_DESCRIPTION_CHARS: usize = 500;
const HIGH_DESCRIPTION_CHARS: usize = 1000;
const COMPLEX_KEYWORDS: [&str; 5] = ["integration", "api", "database", "custom", "enterprise"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Audit-only description of a triage run. Nothing in the pipeline branches on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub requires_classification: bool,
    pub requires_kb_retrieval: bool,
    pub requires_draft_generation: bool,
    pub requires_decision: bool,
    pub estimated_steps: usize,
    pub complexity: Complexity,
}

impl ExecutionPlan {
    pub fn for_ticket(ticket: &Ticket) -> Self {
        Self {
            requires_classification: true,
            requires_kb_retrieval: true,
            requires_draft_generation: true,
            requires_decision: true,
            estimated_steps: PLANNER_STEPS.len(),
            complexity: assess_complexity(ticket),
        }
    }
}

pub fn planner_steps() -> Vec<String> {
    PLANNER_STEPS.iter().map(|s| s.to_string()).collect()
}

pub fn assess_complexity(ticket: &Ticket) -> Complexity {
    let description_len = ticket.description.chars().count();
    let title = ticket.title.to_lowercase();
    let description = ticket.description.to_lowercase();

    let has_complex_keyword = COMPLEX_KEYWORDS
        .iter()
        .any(|kw| title.contains(kw) || description.contains(kw));

    if description_len > HIGH_DESCRIPTION_CHARS
        || !ticket.attachment_urls.is_empty()
        || has_complex_keyword
    {
        Complexity::High
    } else if description_len > MEDIUM_DESCRIPTION_CHARS {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}
