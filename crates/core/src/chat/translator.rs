//! Turns a user's question into a [`QueryPlan`] with an LLM.

use std::sync::Arc;

use tracing::{debug, warn};

use super::labels::{priority_table, status_table};
use super::llm::{ChatMessage, CompletionRequest, LlmClient};
use super::plan::{ChatError, QueryPlan};

/// Asks the LLM for a JSON query plan and decodes it.
pub struct QueryTranslator {
    client: Arc<dyn LlmClient>,
    max_tokens: u32,
}

impl QueryTranslator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            max_tokens: 1024,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub async fn translate(
        &self,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<QueryPlan, ChatError> {
        let request = CompletionRequest::new(format!("JSON: {}", message))
            .with_system(system_prompt())
            .with_history(history.iter().cloned())
            .with_max_tokens(self.max_tokens)
            .with_temperature(0.3)
            .with_json_mode();

        let response = self.client.complete(request).await?;
        debug!(reply = %response.text, "Query plan reply");

        let json = extract_json(&response.text)
            .ok_or_else(|| ChatError::NoJson(truncate(&response.text, 200)))?;
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
            warn!(error = %e, "Query plan reply is not valid JSON");
            ChatError::InvalidPlan(e.to_string())
        })?;

        QueryPlan::from_value(value)
    }
}

/// Slice from the first `{` to the last `}`, skipping code fences or prose
/// around the object.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Instructions for the translating model.
pub fn system_prompt() -> String {
    format!(
        r#"You translate questions about helpdesk tickets into database queries.

DATABASE SCHEMA:
- tickets: id, ticket_number, title, description, status, priority, ticket_type,
  ticket_category, queue_id, company_id, contact_id, assigned_resource_id,
  create_date, due_date_time, completed_date, resolved_date_time, last_activity_date
- ticket_notes: id, ticket_id, title, description, note_type, create_date_time
- time_entries: id, ticket_id, resource_id, date_worked, hours_worked, summary_notes

OPEN vs CLOSED:
- A ticket is CLOSED only when status = 5 (Complete). Every other status is OPEN.
- "open tickets" → "is_open": true. "closed"/"completed" tickets → "is_open": false.

STATUSES: {statuses}

PRIORITIES: {priorities}

FILTER PARAMS (all optional):
company_id, status, is_open, priority, queue_id, assigned_resource_id, contact_id,
start_date (YYYY-MM-DD), end_date (YYYY-MM-DD), text (words in title or description)

ACTIONS:
- count_tickets: "how many ..." questions.
- search_tickets: list matching tickets.
- aggregate_tickets: counts per group. Requires "group_by", one of
  status, priority, company_id, assigned_resource_id, contact_id, queue_id, ticket_type.
- aggregate_time: hours logged. "group_by" is ticket_id (default) or resource_id;
  optional "limit" (default 10).
- analyze_common_issues: summaries, trends, "what's going on with ..." questions.
- ticket_details: one ticket with its notes and time entries. Requires "ticket_id".

EXAMPLES:
"How many open critical tickets?" → {{"action": "count_tickets", "params": {{"is_open": true, "priority": 4}}}}
"Which ticket took most time?" → {{"action": "aggregate_time", "group_by": "ticket_id"}}
"Tickets by status" → {{"action": "aggregate_tickets", "group_by": "status", "params": {{}}}}
"Printer problems this month" → {{"action": "search_tickets", "params": {{"text": "printer", "start_date": "2024-05-01"}}}}

Respond with a single JSON object:
{{"action": "<action>", "params": {{...}}, ...action fields}}"#,
        statuses = status_table(),
        priorities = priority_table(),
    )
}
