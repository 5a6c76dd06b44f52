//! Answers natural-language questions from the local ticket store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::labels::{is_open_status, priority_name, status_name};
use super::llm::{ChatMessage, CompletionRequest, LlmClient};
use super::plan::{describe_filters, ChatError, QueryPlan};
use super::translator::QueryTranslator;
use crate::ticket::{GroupField, Ticket, TicketQuery, TicketStore, TimeGroup};

/// Searches matching more tickets than this are refused.
pub const MAX_DISPLAY: i64 = 1000;
/// Tickets returned by a search.
pub const DEFAULT_LIMIT: usize = 100;
/// Groups listed in an aggregation answer.
pub const TOP_COUNT: usize = 5;
/// Tickets sent to the model for an issue analysis.
pub const MAX_ISSUES_ANALYSIS: usize = 500;
/// Tickets returned alongside an issue analysis.
const ANALYSIS_TICKETS_RETURNED: usize = 20;
/// Tickets shown to the model when summarizing a search.
const SUMMARY_SAMPLE: usize = 3;

/// A question, with the conversation so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_history: Vec::new(),
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    pub tickets: Vec<Ticket>,
    pub ticket_count: i64,
    /// Action-specific structured results (groups, hour totals, details).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    fn answer(answer: impl Into<String>, ticket_count: i64) -> Self {
        Self {
            answer: answer.into(),
            ticket_count,
            ..Self::default()
        }
    }

    fn failed(error: &ChatError) -> Self {
        Self {
            answer: "Error processing request.".to_string(),
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Translates questions into query plans and executes them.
pub struct ChatService {
    translator: QueryTranslator,
    /// Model for issue analysis.
    analyst: Arc<dyn LlmClient>,
    /// Cheaper model for short search summaries.
    summarizer: Arc<dyn LlmClient>,
    store: Arc<dyn TicketStore>,
}

impl ChatService {
    pub fn new(
        analyst: Arc<dyn LlmClient>,
        summarizer: Arc<dyn LlmClient>,
        store: Arc<dyn TicketStore>,
    ) -> Self {
        Self {
            translator: QueryTranslator::new(Arc::clone(&analyst)),
            analyst,
            summarizer,
            store,
        }
    }

    /// Token cap for the query-plan reply.
    pub fn with_translation_max_tokens(mut self, max_tokens: u32) -> Self {
        self.translator = self.translator.with_max_tokens(max_tokens);
        self
    }

    /// Answer a question. Failures are reported in the response rather
    /// than returned.
    pub async fn chat(&self, request: &ChatRequest) -> ChatResponse {
        match self.try_chat(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, session_id = ?request.session_id, "Chat request failed");
                ChatResponse::failed(&e)
            }
        }
    }

    async fn try_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ChatError> {
        let plan = self
            .translator
            .translate(&request.message, &request.conversation_history)
            .await?;
        info!(action = plan.action(), params = ?plan.params(), "Executing query plan");
        self.execute(&plan).await
    }

    pub async fn execute(&self, plan: &QueryPlan) -> Result<ChatResponse, ChatError> {
        match plan {
            QueryPlan::CountTickets { params } => self.count(params),
            QueryPlan::SearchTickets { params } => self.search(params).await,
            QueryPlan::AggregateTickets { group_by, params } => {
                self.aggregate_tickets(*group_by, params)
            }
            QueryPlan::AggregateTime {
                group_by, limit, ..
            } => self.aggregate_time(*group_by, *limit),
            QueryPlan::AnalyzeCommonIssues { params } => self.analyze_common_issues(params).await,
            QueryPlan::TicketDetails { ticket_id, .. } => self.ticket_details(*ticket_id),
        }
    }

    fn count(&self, params: &TicketQuery) -> Result<ChatResponse, ChatError> {
        let count = self.store.count(params)?;
        let mut response = ChatResponse::answer(
            format!("Found {} tickets{}.", format_count(count), describe_filters(params)),
            count,
        );
        response.results = Some(json!({ "filters": params }));
        Ok(response)
    }

    async fn search(&self, params: &TicketQuery) -> Result<ChatResponse, ChatError> {
        let count = self.store.count(params)?;
        let desc = describe_filters(params);

        if count > MAX_DISPLAY {
            let mut response = ChatResponse::answer(
                format!(
                    "Found {} tickets{}. Too many! Add more filters.",
                    format_count(count),
                    desc
                ),
                count,
            );
            response.warning = Some("too_many_results".to_string());
            return Ok(response);
        }

        let limit = (count.max(0) as usize).min(DEFAULT_LIMIT);
        let tickets = self.store.search(params, limit)?;
        let context = format!(
            "Showing {} of {} tickets{}",
            tickets.len(),
            format_count(count),
            desc
        );
        let answer = self.summarize(&tickets, context).await;

        Ok(ChatResponse {
            answer,
            tickets,
            ticket_count: count,
            ..ChatResponse::default()
        })
    }

    /// Two or three sentences about a sample of `tickets`, or `context`
    /// alone when there is nothing to summarize or the model fails.
    async fn summarize(&self, tickets: &[Ticket], context: String) -> String {
        if tickets.is_empty() {
            return context;
        }

        let sample: Vec<Value> = tickets
            .iter()
            .take(SUMMARY_SAMPLE)
            .map(|t| {
                json!({
                    "ticket_number": t.ticket_number,
                    "title": t.title,
                    "status": status_name(t.status.unwrap_or(0)),
                    "priority": priority_name(t.priority.unwrap_or(0)),
                    "company_id": t.company_id,
                    "assigned_to": t.assigned_resource_id,
                    "created": t.create_date,
                })
            })
            .collect();
        let sample = serde_json::to_string_pretty(&sample).unwrap_or_default();

        let request = CompletionRequest::new(format!(
            "{}\n\nSample:\n{}\n\nBrief summary (2-3 sentences):",
            context, sample
        ))
        .with_system("Summarize ticket data concisely and helpfully.")
        .with_temperature(0.5)
        .with_max_tokens(300);

        match self.summarizer.complete(request).await {
            Ok(response) if !response.text.trim().is_empty() => response.text.trim().to_string(),
            Ok(_) => context,
            Err(e) => {
                warn!(error = %e, "Summary failed, answering with context only");
                context
            }
        }
    }

    fn aggregate_tickets(
        &self,
        group_by: GroupField,
        params: &TicketQuery,
    ) -> Result<ChatResponse, ChatError> {
        let groups = self.store.aggregate_tickets(params, group_by)?;
        if groups.is_empty() {
            return Ok(ChatResponse::answer("No tickets found.", 0));
        }

        let total: i64 = groups.iter().map(|g| g.count).sum();
        let column = group_by.column();
        let mut lines = vec![format!(
            "Total: {} tickets across {} groups.",
            format_count(total),
            groups.len()
        )];

        match group_by {
            GroupField::Status => {
                lines.push("\nBy status:".to_string());
                for g in groups.iter().take(TOP_COUNT) {
                    let (name, tag) = match g.key {
                        Some(code) => (
                            status_name(code as i32),
                            if is_open_status(code as i32) { " (open)" } else { " (closed)" },
                        ),
                        None => ("No status".to_string(), ""),
                    };
                    lines.push(format!("• {}{}: {}", name, tag, format_count(g.count)));
                }
            }
            GroupField::Priority => {
                lines.push("\nBy priority:".to_string());
                for g in groups.iter().take(TOP_COUNT) {
                    let name = g
                        .key
                        .map(|code| priority_name(code as i32))
                        .unwrap_or_else(|| "No priority".to_string());
                    lines.push(format!("• {}: {}", name, format_count(g.count)));
                }
            }
            _ => {
                lines.push(format!("\nTop {}:", column));
                for (i, g) in groups.iter().take(TOP_COUNT).enumerate() {
                    let key = g
                        .key
                        .map(|k| k.to_string())
                        .unwrap_or_else(|| "Unassigned".to_string());
                    lines.push(format!("{}. {}: {}", i + 1, key, format_count(g.count)));
                }
            }
        }

        let results: Vec<Value> = groups
            .iter()
            .map(|g| {
                let mut row = json!({ column: g.key, "count": g.count });
                if let (Some(code), Some(obj)) = (g.key, row.as_object_mut()) {
                    match group_by {
                        GroupField::Status => {
                            obj.insert("status_name".into(), status_name(code as i32).into());
                            obj.insert("is_open".into(), is_open_status(code as i32).into());
                        }
                        GroupField::Priority => {
                            obj.insert("priority_name".into(), priority_name(code as i32).into());
                        }
                        _ => {}
                    }
                }
                row
            })
            .collect();

        let mut response = ChatResponse::answer(lines.join("\n"), groups.len() as i64);
        response.results = Some(json!({
            "grouped_by": column,
            "total_tickets": total,
            "groups": results,
        }));
        Ok(response)
    }

    fn aggregate_time(&self, group_by: TimeGroup, limit: usize) -> Result<ChatResponse, ChatError> {
        let totals = self.store.aggregate_time(group_by, limit)?;
        if totals.is_empty() {
            return Ok(ChatResponse::answer("No time entries found", 0));
        }

        let mut lines = vec![format!("Top {} by total hours:\n", totals.len())];
        let mut results = Vec::with_capacity(totals.len());

        for (i, total) in totals.iter().enumerate() {
            let mut row = json!({
                group_by.column(): total.key,
                "total_hours": total.total_hours,
                "entry_count": total.entry_count,
            });

            match (group_by, total.key) {
                (TimeGroup::TicketId, Some(ticket_id)) => {
                    let ticket = self.store.get_ticket(ticket_id)?;
                    let number = ticket
                        .as_ref()
                        .and_then(|t| t.ticket_number.clone())
                        .unwrap_or_else(|| "Unknown".to_string());
                    let title = ticket
                        .as_ref()
                        .and_then(|t| t.title.clone())
                        .unwrap_or_else(|| "No title".to_string());
                    lines.push(format!(
                        "{}. Ticket #{}: {:.1} hours - {}",
                        i + 1,
                        number,
                        total.total_hours,
                        title.chars().take(50).collect::<String>()
                    ));
                    if let Some(obj) = row.as_object_mut() {
                        obj.insert("ticket_number".into(), number.into());
                        obj.insert("title".into(), title.into());
                    }
                }
                (_, key) => {
                    let key = key
                        .map(|k| k.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    lines.push(format!("{}. ID {}: {:.1} hours", i + 1, key, total.total_hours));
                }
            }
            results.push(row);
        }

        let mut response = ChatResponse::answer(lines.join("\n"), totals.len() as i64);
        response.results = Some(Value::Array(results));
        Ok(response)
    }

    async fn analyze_common_issues(&self, params: &TicketQuery) -> Result<ChatResponse, ChatError> {
        let desc = describe_filters(params);
        let total = self.store.count(params)?;
        if total == 0 {
            return Ok(ChatResponse::answer(format!("No tickets found{}.", desc), 0));
        }

        let limit = (total as usize).min(MAX_ISSUES_ANALYSIS);
        let mut tickets = self.store.search(params, limit)?;
        if tickets.is_empty() {
            return Ok(ChatResponse::answer("No tickets found to analyze.", 0));
        }

        let summaries: Vec<Value> = tickets
            .iter()
            .map(|t| {
                json!({
                    "ticket_number": t.ticket_number.as_deref().unwrap_or("Unknown"),
                    "title": text_or(t.title.as_deref(), "No title", 200),
                    "description": text_or(t.description.as_deref(), "No description", 500),
                    "status": status_name(t.status.unwrap_or(0)),
                    "priority": priority_name(t.priority.unwrap_or(0)),
                    "company_id": t.company_id,
                    "assigned_to": t.assigned_resource_id,
                    "created": t.create_date.map(|d| d.format("%Y-%m-%d").to_string()),
                })
            })
            .collect();

        let prompt = format!(
            "You are a senior technical support analyst.\n\
             Analyze these {} support tickets{} and identify the most common real-world issues customers are facing.\n\n\
             Tickets:\n{}\n\n\
             Provide a clear, actionable report with:\n\
             1. Top 5 most frequent issues (based on titles & descriptions)\n\
             2. Any patterns (e.g. specific software, hardware, user error, network, etc.)\n\
             3. Affected companies or queues (if any stand out)\n\
             4. Recommendations to reduce these tickets\n\n\
             Be specific, practical, and focus on root causes.",
            tickets.len(),
            desc,
            serde_json::to_string_pretty(&summaries).unwrap_or_default()
        );

        let response = self
            .analyst
            .complete(
                CompletionRequest::new(prompt)
                    .with_system("You are an expert support analyst who finds patterns in ticket data.")
                    .with_temperature(0.4)
                    .with_max_tokens(2000),
            )
            .await?;

        let mut answer = response.text.trim().to_string();
        answer.push_str(&format!(
            "\n\n---\nAnalysis based on {} recent ticket(s)",
            format_count(tickets.len() as i64)
        ));
        if (tickets.len() as i64) < total {
            answer.push_str(&format!(
                " sampled from {} total matching tickets",
                format_count(total)
            ));
        }
        answer.push_str(&desc);

        let analyzed = tickets.len();
        tickets.truncate(ANALYSIS_TICKETS_RETURNED);
        Ok(ChatResponse {
            answer,
            tickets,
            ticket_count: total,
            results: Some(json!({ "analyzed": analyzed })),
            ..ChatResponse::default()
        })
    }

    fn ticket_details(&self, ticket_id: i64) -> Result<ChatResponse, ChatError> {
        let ticket = self
            .store
            .get_ticket(ticket_id)?
            .ok_or(ChatError::TicketNotFound(ticket_id))?;
        let notes = self.store.notes_for(ticket_id)?;
        let time_entries = self.store.time_entries_for(ticket_id)?;
        let hours: f64 = time_entries.iter().filter_map(|e| e.hours_worked).sum();

        let answer = format!(
            "Ticket #{}: {}\nStatus: {}, Priority: {}\n{} notes, {} time entries ({:.1} hours logged).",
            ticket.ticket_number.as_deref().unwrap_or("Unknown"),
            ticket.title.as_deref().unwrap_or("No title"),
            ticket.status.map(status_name).unwrap_or_else(|| "Unknown".to_string()),
            ticket.priority.map(priority_name).unwrap_or_else(|| "Unknown".to_string()),
            notes.len(),
            time_entries.len(),
            hours,
        );

        Ok(ChatResponse {
            answer,
            tickets: vec![ticket],
            ticket_count: 1,
            results: Some(json!({ "notes": notes, "time_entries": time_entries })),
            ..ChatResponse::default()
        })
    }
}

/// `1234567` → `"1,234,567"`.
pub fn format_count(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub(crate) fn text_or(text: Option<&str>, fallback: &str, max: usize) -> String {
    let text = text.map(str::trim).filter(|t| !t.is_empty() && *t != "null");
    text.unwrap_or(fallback).chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::LlmError;
    use crate::testing::{fixtures, MockLlmClient};
    use crate::ticket::SqliteTicketStore;

    struct Harness {
        llm: Arc<MockLlmClient>,
        summarizer: Arc<MockLlmClient>,
        store: Arc<SqliteTicketStore>,
        service: ChatService,
    }

    fn harness() -> Harness {
        let llm = Arc::new(MockLlmClient::new());
        let summarizer = Arc::new(MockLlmClient::new());
        let store = Arc::new(SqliteTicketStore::in_memory().unwrap());
        let service = ChatService::new(llm.clone(), summarizer.clone(), store.clone());
        Harness {
            llm,
            summarizer,
            store,
            service,
        }
    }

    fn seed(store: &SqliteTicketStore, count: i64) {
        for id in 1..=count {
            let mut ticket = fixtures::ticket(id);
            ticket.status = Some(if id % 4 == 0 { 5 } else { 1 });
            store.upsert_ticket(&ticket).unwrap();
        }
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1234567), "1,234,567");
        assert_eq!(format_count(-4200), "-4,200");
    }

    #[test]
    fn test_text_or() {
        assert_eq!(text_or(None, "No title", 10), "No title");
        assert_eq!(text_or(Some("  "), "No title", 10), "No title");
        assert_eq!(text_or(Some("null"), "x", 10), "x");
        assert_eq!(text_or(Some(" abcdef "), "x", 3), "abc");
    }

    #[tokio::test]
    async fn test_count_open_tickets() {
        let h = harness();
        seed(&h.store, 8);
        h.llm
            .push_response(r#"{"action": "count_tickets", "params": {"is_open": true}}"#);

        let response = h.service.chat(&ChatRequest::new("how many open tickets")).await;

        assert_eq!(response.answer, "Found 6 tickets (open).");
        assert_eq!(response.ticket_count, 6);
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_search_summarizes_sample() {
        let h = harness();
        seed(&h.store, 5);
        h.llm.push_response(r#"{"action": "search_tickets"}"#);
        h.summarizer.push_response("Five new printer tickets.");

        let response = h.service.chat(&ChatRequest::new("show tickets")).await;

        assert_eq!(response.answer, "Five new printer tickets.");
        assert_eq!(response.tickets.len(), 5);
        assert_eq!(response.ticket_count, 5);
        let prompt = &h.summarizer.requests()[0].messages[0].content;
        assert!(prompt.starts_with("Showing 5 of 5 tickets"));
    }

    #[tokio::test]
    async fn test_search_summary_falls_back_to_context() {
        let h = harness();
        seed(&h.store, 2);
        h.llm.push_response(r#"{"action": "search_tickets"}"#);
        h.summarizer.push_error(LlmError::Timeout(std::time::Duration::from_secs(60)));

        let response = h.service.chat(&ChatRequest::new("show tickets")).await;

        assert_eq!(response.answer, "Showing 2 of 2 tickets");
        assert_eq!(response.tickets.len(), 2);
    }

    #[tokio::test]
    async fn test_search_refuses_too_many() {
        let h = harness();
        seed(&h.store, MAX_DISPLAY + 1);
        h.llm.push_response(r#"{"action": "search_tickets"}"#);

        let response = h.service.chat(&ChatRequest::new("all tickets")).await;

        assert_eq!(response.answer, "Found 1,001 tickets. Too many! Add more filters.");
        assert!(response.tickets.is_empty());
        assert_eq!(response.warning.as_deref(), Some("too_many_results"));
        assert!(h.summarizer.requests().is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_by_status() {
        let h = harness();
        seed(&h.store, 8);
        h.llm
            .push_response(r#"{"action": "aggregate_tickets", "group_by": "status"}"#);

        let response = h.service.chat(&ChatRequest::new("tickets by status")).await;

        assert_eq!(
            response.answer,
            "Total: 8 tickets across 2 groups.\n\nBy status:\n• New (open): 6\n• Complete (closed): 2"
        );
        let results = response.results.unwrap();
        assert_eq!(results["groups"][0]["status_name"], "New");
        assert_eq!(results["total_tickets"], 8);
    }

    #[tokio::test]
    async fn test_aggregate_time_by_ticket() {
        let h = harness();
        seed(&h.store, 2);
        h.store
            .upsert_time_entries(&[
                fixtures::time_entry(1, 1, 1.0),
                fixtures::time_entry(2, 2, 2.5),
                fixtures::time_entry(3, 2, 1.0),
            ])
            .unwrap();
        h.llm.push_response(r#"{"action": "aggregate_time"}"#);

        let response = h.service.chat(&ChatRequest::new("which ticket took most time")).await;

        let lines: Vec<&str> = response.answer.lines().collect();
        assert_eq!(lines[0], "Top 2 by total hours:");
        assert!(lines[2].starts_with("1. Ticket #T20240002: 3.5 hours"));
        assert_eq!(response.results.unwrap()[0]["ticket_id"], 2);
    }

    #[tokio::test]
    async fn test_analyze_common_issues() {
        let h = harness();
        seed(&h.store, 30);
        h.llm
            .push_response(r#"{"action": "analyze_common_issues", "params": {"is_open": true}}"#);
        h.llm.push_response("1. Printers keep failing.");

        let response = h.service.chat(&ChatRequest::new("what's going on")).await;

        assert!(response.answer.starts_with("1. Printers keep failing."));
        assert!(response
            .answer
            .ends_with("Analysis based on 23 recent ticket(s) (open)"));
        assert_eq!(response.ticket_count, 23);
        assert_eq!(response.tickets.len(), 20);

        let analysis = &h.llm.requests()[1];
        assert_eq!(analysis.max_tokens, 2000);
        assert!(analysis.messages[0].content.contains("Analyze these 23 support tickets (open)"));
    }

    #[tokio::test]
    async fn test_analyze_with_no_tickets() {
        let h = harness();
        h.llm
            .push_response(r#"{"action": "analyze_common_issues", "params": {"company_id": 9}}"#);

        let response = h.service.chat(&ChatRequest::new("acme issues")).await;

        assert_eq!(response.answer, "No tickets found (company_id=9).");
        assert_eq!(h.llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_ticket_details() {
        let h = harness();
        seed(&h.store, 1);
        h.store.upsert_notes(&[fixtures::note(10, 1)]).unwrap();
        h.store
            .upsert_time_entries(&[fixtures::time_entry(20, 1, 1.5)])
            .unwrap();
        h.llm
            .push_response(r#"{"action": "ticket_details", "ticket_id": 1}"#);

        let response = h.service.chat(&ChatRequest::new("details of ticket 1")).await;

        assert!(response.answer.contains("1 notes, 1 time entries (1.5 hours logged)"));
        assert_eq!(response.tickets[0].id, 1);
        assert_eq!(response.results.unwrap()["notes"][0]["id"], 10);
    }

    #[tokio::test]
    async fn test_failures_become_error_answers() {
        let h = harness();
        h.llm.push_response(r#"{"action": "ticket_details", "ticket_id": 77}"#);
        h.llm.push_response(r#"{"action": "semantic_search"}"#);

        let missing = h.service.chat(&ChatRequest::new("ticket 77")).await;
        assert_eq!(missing.answer, "Error processing request.");
        assert_eq!(missing.error.as_deref(), Some("Ticket 77 not found"));

        let unknown = h.service.chat(&ChatRequest::new("find similar")).await;
        assert_eq!(unknown.answer, "Error processing request.");
        assert_eq!(unknown.error.as_deref(), Some("Unknown action: semantic_search"));
    }

    #[test]
    fn test_chat_request_defaults() {
        let request: ChatRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert!(request.conversation_history.is_empty());
        assert!(request.session_id.is_none());
    }
}
