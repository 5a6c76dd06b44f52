//! Structured query plans produced from natural-language questions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::llm::LlmError;
use crate::ticket::{GroupField, StoreError, TicketQuery, TimeGroup};

/// Error type for chat operations.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Reply contained no JSON object: {0}")]
    NoJson(String),

    #[error("Invalid query plan: {0}")]
    InvalidPlan(String),

    #[error("Missing action")]
    MissingAction,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Ticket {0} not found")]
    TicketNotFound(i64),
}

const ACTIONS: &[&str] = &[
    "count_tickets",
    "search_tickets",
    "aggregate_tickets",
    "aggregate_time",
    "analyze_common_issues",
    "ticket_details",
];

/// What to run against the store to answer a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum QueryPlan {
    CountTickets {
        #[serde(default)]
        params: TicketQuery,
    },
    SearchTickets {
        #[serde(default)]
        params: TicketQuery,
    },
    AggregateTickets {
        group_by: GroupField,
        #[serde(default)]
        params: TicketQuery,
    },
    AggregateTime {
        #[serde(default)]
        group_by: TimeGroup,
        #[serde(default = "default_time_limit")]
        limit: usize,
        #[serde(default)]
        params: TicketQuery,
    },
    AnalyzeCommonIssues {
        #[serde(default)]
        params: TicketQuery,
    },
    TicketDetails {
        ticket_id: i64,
        #[serde(default)]
        params: TicketQuery,
    },
}

fn default_time_limit() -> usize {
    10
}

impl QueryPlan {
    /// Decode a plan, telling a missing or unknown `action` apart from a
    /// malformed one.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ChatError> {
        let action = match value.get("action").and_then(|a| a.as_str()) {
            Some(action) if !action.is_empty() => action.to_string(),
            _ => return Err(ChatError::MissingAction),
        };
        if !ACTIONS.contains(&action.as_str()) {
            return Err(ChatError::UnknownAction(action));
        }
        serde_json::from_value(value).map_err(|e| ChatError::InvalidPlan(e.to_string()))
    }

    pub fn action(&self) -> &'static str {
        match self {
            QueryPlan::CountTickets { .. } => "count_tickets",
            QueryPlan::SearchTickets { .. } => "search_tickets",
            QueryPlan::AggregateTickets { .. } => "aggregate_tickets",
            QueryPlan::AggregateTime { .. } => "aggregate_time",
            QueryPlan::AnalyzeCommonIssues { .. } => "analyze_common_issues",
            QueryPlan::TicketDetails { .. } => "ticket_details",
        }
    }

    pub fn params(&self) -> &TicketQuery {
        match self {
            QueryPlan::CountTickets { params }
            | QueryPlan::SearchTickets { params }
            | QueryPlan::AggregateTickets { params, .. }
            | QueryPlan::AggregateTime { params, .. }
            | QueryPlan::AnalyzeCommonIssues { params }
            | QueryPlan::TicketDetails { params, .. } => params,
        }
    }
}

/// Short human description of the filters, e.g. `" (open, priority=High)"`.
/// Empty when nothing is filtered.
pub fn describe_filters(query: &TicketQuery) -> String {
    use super::labels::{priority_name, status_name};

    let mut filters = Vec::new();
    if let Some(number) = &query.ticket_number {
        filters.push(format!("ticket {}", number));
    }
    if let Some(company_id) = query.company_id {
        filters.push(format!("company_id={}", company_id));
    }
    if let Some(is_open) = query.is_open {
        filters.push(if is_open { "open" } else { "closed" }.to_string());
    } else if let Some(status) = query.status {
        filters.push(format!("status={}", status_name(status)));
    }
    if let Some(priority) = query.priority {
        filters.push(format!("priority={}", priority_name(priority)));
    }
    if let Some(resource) = query.assigned_resource_id {
        filters.push(format!("assigned to {}", resource));
    }
    if let Some(contact) = query.contact_id {
        filters.push(format!("contact {}", contact));
    }
    match (&query.start_date, &query.end_date) {
        (Some(start), Some(end)) => filters.push(format!("{} to {}", start, end)),
        (Some(start), None) => filters.push(format!("since {}", start)),
        (None, Some(end)) => filters.push(format!("until {}", end)),
        (None, None) => {}
    }
    if let Some(text) = &query.text {
        filters.push(format!("matching '{}'", text));
    }
    if let Some(has_resolution) = query.has_resolution {
        filters.push(if has_resolution { "resolved" } else { "unresolved" }.to_string());
    }

    if filters.is_empty() {
        String::new()
    } else {
        format!(" ({})", filters.join(", "))
    }
}
