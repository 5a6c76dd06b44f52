//! Per-ticket summaries written by the model and cached in the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::llm::{CompletionRequest, LlmClient};
use super::service::text_or;
use super::solutions::InsightError;
use crate::ticket::{Note, StoreError, SummaryRow, Ticket, TicketStore, TimeEntry};

/// Tickets listed unless asked otherwise.
pub const DEFAULT_SUMMARY_LIMIT: usize = 200;
/// Largest accepted summary list.
pub const MAX_SUMMARY_LIMIT: usize = 500;

/// Options for listing summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryListParams {
    #[serde(default = "default_summary_limit")]
    pub limit: usize,
    /// Regenerate every listed summary, even cached ones.
    #[serde(default)]
    pub force_regenerate: bool,
    /// List only tickets that already have a summary. Nothing is generated.
    #[serde(default)]
    pub with_summary_only: bool,
}

fn default_summary_limit() -> usize {
    DEFAULT_SUMMARY_LIMIT
}

impl Default for SummaryListParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SUMMARY_LIMIT,
            force_regenerate: false,
            with_summary_only: false,
        }
    }
}

/// One listed ticket with its summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketSummary {
    pub id: i64,
    pub ticket_number: Option<String>,
    pub title: Option<String>,
    pub status: Option<i32>,
    pub is_closed: bool,
    /// "Open" or "Closed".
    pub status_text: String,
    pub priority: Option<i32>,
    pub create_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    /// Only set for closed tickets.
    pub resolution: Option<String>,
    pub summary: Option<String>,
    pub notes_count: i64,
    pub time_entries_count: i64,
    pub total_hours: f64,
    pub company_id: Option<i64>,
    pub assigned_resource_id: Option<i64>,
    /// e.g. `"2d 3h 15m"`, for closed tickets with both dates.
    pub time_to_resolution: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryList {
    pub summaries: Vec<TicketSummary>,
    pub total_count: usize,
    pub generated_count: usize,
    pub cached_count: usize,
}

/// Writes ticket summaries from notes and time entries.
pub struct SummaryService {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn TicketStore>,
}

impl SummaryService {
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<dyn TicketStore>) -> Self {
        Self { llm, store }
    }

    /// Newest tickets with their summaries, generating the missing ones.
    ///
    /// A generated summary that cannot be saved is still returned.
    pub async fn list(&self, params: &SummaryListParams) -> Result<SummaryList, InsightError> {
        if !(1..=MAX_SUMMARY_LIMIT).contains(&params.limit) {
            return Err(InsightError::InvalidRequest(format!(
                "limit must be between 1 and {}",
                MAX_SUMMARY_LIMIT
            )));
        }

        let rows = self
            .store
            .summary_rows(params.limit, params.with_summary_only)?;
        let mut summaries = Vec::with_capacity(rows.len());
        let mut generated_count = 0;
        let mut cached_count = 0;

        for mut row in rows {
            if row.summary.is_some() && !params.force_regenerate {
                cached_count += 1;
            } else {
                let summary = self.generate(&row.ticket).await?;
                if let Err(e) = self.store.save_summary(row.ticket.id, &summary) {
                    warn!(ticket_id = row.ticket.id, error = %e, "Failed to save summary");
                }
                row.summary = Some(summary);
                generated_count += 1;
            }
            summaries.push(to_summary(row));
        }

        info!(
            total = summaries.len(),
            cached = cached_count,
            generated = generated_count,
            "Listed ticket summaries"
        );
        Ok(SummaryList {
            total_count: summaries.len(),
            summaries,
            generated_count,
            cached_count,
        })
    }

    /// Generate and save a fresh summary for one ticket.
    pub async fn regenerate(&self, ticket_id: i64) -> Result<String, InsightError> {
        let ticket = self
            .store
            .get_ticket(ticket_id)?
            .ok_or_else(|| InsightError::NotFound(format!("Ticket {} not found", ticket_id)))?;
        let summary = self.generate(&ticket).await?;
        self.store.save_summary(ticket_id, &summary)?;
        Ok(summary)
    }

    /// Summary of `ticket` from its notes and time entries. When the model
    /// fails a plain summary of the counts stands in.
    async fn generate(&self, ticket: &Ticket) -> Result<String, StoreError> {
        let notes = self.store.notes_for(ticket.id)?;
        let entries = self.store.time_entries_for(ticket.id)?;
        let total_hours: f64 = entries.iter().filter_map(|e| e.hours_worked).sum();
        let is_closed = !ticket.is_open();
        let status_text = if is_closed { "CLOSED" } else { "OPEN" };

        let prompt = format!(
            "Create a summary for this ticket:\n\n\
             Ticket: {number}\n\
             Title: {title}\n\
             Status: {status}\n\
             Priority: {priority}\n\
             Created: {created}\n\
             Description: {description}\n\n\
             NOTES:\n{notes}\n\n\
             TIME ENTRIES (Total: {hours}h):\n{entries}\n\n\
             RESOLUTION (if closed):\n{resolution}\n\n\
             Generate a concise summary of this ticket.",
            number = ticket.ticket_number.as_deref().unwrap_or("N/A"),
            title = text_or(ticket.title.as_deref(), "No title", 500),
            status = status_text,
            priority = ticket
                .priority
                .map(|p| p.to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            created = ticket
                .create_date
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| "N/A".to_string()),
            description = text_or(ticket.description.as_deref(), "No description", 4000),
            notes = notes_text(&notes),
            hours = total_hours,
            entries = entries_text(&entries),
            resolution = if is_closed {
                text_or(ticket.resolution.as_deref(), "No resolution recorded", 4000)
            } else {
                "Ticket is still open".to_string()
            },
        );

        let request = CompletionRequest::new(prompt)
            .with_system(SUMMARY_PROMPT)
            .with_temperature(0.5)
            .with_max_tokens(800);

        match self.llm.complete(request).await {
            Ok(response) if !response.text.trim().is_empty() => Ok(response.text.trim().to_string()),
            Ok(_) => Ok(fallback_summary(status_text, notes.len(), &entries, total_hours)),
            Err(e) => {
                warn!(ticket_id = ticket.id, error = %e, "Summary generation failed");
                Ok(fallback_summary(status_text, notes.len(), &entries, total_hours))
            }
        }
    }
}

fn to_summary(row: SummaryRow) -> TicketSummary {
    let SummaryRow {
        ticket,
        summary,
        notes_count,
        time_entries_count,
        total_hours,
    } = row;
    let is_closed = !ticket.is_open();
    let time_to_resolution = match (is_closed, ticket.create_date, ticket.completed_date) {
        (true, Some(created), Some(completed)) => Some(time_to_resolution(created, completed)),
        _ => None,
    };

    TicketSummary {
        id: ticket.id,
        ticket_number: ticket.ticket_number,
        title: ticket.title,
        status: ticket.status,
        is_closed,
        status_text: if is_closed { "Closed" } else { "Open" }.to_string(),
        priority: ticket.priority,
        create_date: ticket.create_date,
        completed_date: ticket.completed_date,
        resolution: if is_closed { ticket.resolution } else { None },
        summary,
        notes_count,
        time_entries_count,
        total_hours: (total_hours * 100.0).round() / 100.0,
        company_id: ticket.company_id,
        assigned_resource_id: ticket.assigned_resource_id,
        time_to_resolution,
    }
}

/// Compact duration between creation and completion, e.g. `"1d 4h"`.
///
/// Zero components are dropped, except minutes when under an hour. A
/// completion before the creation yields `"N/A"`.
pub fn time_to_resolution(created: DateTime<Utc>, completed: DateTime<Utc>) -> String {
    let diff = completed - created;
    if diff < chrono::Duration::zero() {
        return "N/A".to_string();
    }

    let days = diff.num_days();
    let hours = diff.num_hours() % 24;
    let minutes = diff.num_minutes() % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 || (days == 0 && hours == 0) {
        parts.push(format!("{}m", minutes));
    }
    parts.join(" ")
}

fn notes_text(notes: &[Note]) -> String {
    if notes.is_empty() {
        return "No notes available".to_string();
    }
    notes
        .iter()
        .map(|n| {
            format!(
                "[{}] {}: {}",
                n.create_date_time.map(|d| d.to_rfc3339()).unwrap_or_default(),
                n.title.as_deref().unwrap_or_default(),
                n.description.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn entries_text(entries: &[TimeEntry]) -> String {
    if entries.is_empty() {
        return "No time entries recorded".to_string();
    }
    entries
        .iter()
        .map(|e| {
            format!(
                "[{}] {}h - {}",
                e.date_worked.map(|d| d.to_rfc3339()).unwrap_or_default(),
                e.hours_worked.unwrap_or(0.0),
                e.summary_notes.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fallback_summary(status: &str, notes: usize, entries: &[TimeEntry], hours: f64) -> String {
    format!(
        "STATUS: {}\n\nNOTES: {} notes available\nWORK DONE: {}h across {} time entries\n\
         OUTCOME: Summary generation failed - view ticket details for full information",
        status,
        notes,
        hours,
        entries.len()
    )
}

const SUMMARY_PROMPT: &str = r#"You are an IT support analyst creating concise ticket summaries.

Your summary should include:
1. STATUS: clearly state if the ticket is OPEN or CLOSED
2. NOTES SUMMARY: what was discussed or reported, from the ticket notes
3. WORK DONE: the work performed, from the time entries
4. RESOLUTION: the final resolution, only if closed
5. OUTCOME: a brief conclusion

Keep it concise but informative. Focus on what happened and what was done."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::LlmError;
    use crate::testing::{fixtures, MockLlmClient};
    use crate::ticket::{parse_timestamp, SqliteTicketStore, COMPLETE_STATUS};

    struct Harness {
        llm: Arc<MockLlmClient>,
        store: Arc<SqliteTicketStore>,
        service: SummaryService,
    }

    fn harness() -> Harness {
        let llm = Arc::new(MockLlmClient::new());
        let store = Arc::new(SqliteTicketStore::in_memory().unwrap());
        let service = SummaryService::new(llm.clone(), store.clone());
        Harness {
            llm,
            store,
            service,
        }
    }

    fn ts(value: &str) -> DateTime<Utc> {
        parse_timestamp(value).unwrap()
    }

    #[test]
    fn test_time_to_resolution_formats() {
        let created = ts("2024-05-01T08:00:00Z");
        assert_eq!(time_to_resolution(created, ts("2024-05-01T08:00:00Z")), "0m");
        assert_eq!(time_to_resolution(created, ts("2024-05-01T08:45:00Z")), "45m");
        assert_eq!(time_to_resolution(created, ts("2024-05-01T11:00:00Z")), "3h");
        assert_eq!(
            time_to_resolution(created, ts("2024-05-03T12:15:00Z")),
            "2d 4h 15m"
        );
        assert_eq!(time_to_resolution(created, ts("2024-05-02T08:00:00Z")), "1d");
        assert_eq!(time_to_resolution(created, ts("2024-04-30T08:00:00Z")), "N/A");
    }

    #[tokio::test]
    async fn test_list_generates_missing_and_reuses_cached() {
        let h = harness();
        h.store.upsert_ticket(&fixtures::ticket(1)).unwrap();
        h.store.upsert_ticket(&fixtures::ticket(2)).unwrap();
        h.store.save_summary(1, "Already summarized").unwrap();
        h.llm.push_response("STATUS: OPEN\nPrinter still offline.");

        let list = h.service.list(&SummaryListParams::default()).await.unwrap();

        assert_eq!(list.total_count, 2);
        assert_eq!(list.generated_count, 1);
        assert_eq!(list.cached_count, 1);
        assert_eq!(list.summaries[0].id, 2);
        assert_eq!(
            list.summaries[0].summary.as_deref(),
            Some("STATUS: OPEN\nPrinter still offline.")
        );
        assert_eq!(list.summaries[1].summary.as_deref(), Some("Already summarized"));
        assert_eq!(h.llm.requests().len(), 1);

        // The generated summary was saved
        let again = h.service.list(&SummaryListParams::default()).await.unwrap();
        assert_eq!(again.cached_count, 2);
        assert_eq!(h.llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_with_summary_only_generates_nothing() {
        let h = harness();
        h.store.upsert_ticket(&fixtures::ticket(1)).unwrap();
        h.store.upsert_ticket(&fixtures::ticket(2)).unwrap();
        h.store.save_summary(2, "cached").unwrap();

        let list = h
            .service
            .list(&SummaryListParams {
                with_summary_only: true,
                ..SummaryListParams::default()
            })
            .await
            .unwrap();

        assert_eq!(list.total_count, 1);
        assert_eq!(list.generated_count, 0);
        assert!(h.llm.requests().is_empty());
    }

    #[tokio::test]
    async fn test_force_regenerate_replaces_cached() {
        let h = harness();
        h.store.upsert_ticket(&fixtures::ticket(1)).unwrap();
        h.store.save_summary(1, "stale").unwrap();
        h.llm.push_response("fresh");

        let list = h
            .service
            .list(&SummaryListParams {
                force_regenerate: true,
                ..SummaryListParams::default()
            })
            .await
            .unwrap();

        assert_eq!(list.generated_count, 1);
        assert_eq!(list.summaries[0].summary.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_closed_ticket_fields() {
        let h = harness();
        let mut ticket = fixtures::ticket(1);
        ticket.status = Some(COMPLETE_STATUS);
        ticket.resolution = Some("Replaced fuser".to_string());
        ticket.completed_date = Some(ts("2024-05-02T10:31:00Z"));
        h.store.upsert_ticket(&ticket).unwrap();
        h.store
            .upsert_notes(&[fixtures::note(10, 1), fixtures::note(11, 1)])
            .unwrap();
        h.store
            .upsert_time_entries(&[
                fixtures::time_entry(1, 1, 1.333),
                fixtures::time_entry(2, 1, 0.5),
            ])
            .unwrap();
        h.store.save_summary(1, "done").unwrap();

        let list = h.service.list(&SummaryListParams::default()).await.unwrap();
        let summary = &list.summaries[0];

        assert!(summary.is_closed);
        assert_eq!(summary.status_text, "Closed");
        assert_eq!(summary.resolution.as_deref(), Some("Replaced fuser"));
        assert_eq!(summary.notes_count, 2);
        assert_eq!(summary.time_entries_count, 2);
        assert_eq!(summary.total_hours, 1.83);
        // created 2024-05-01 08:01
        assert_eq!(summary.time_to_resolution.as_deref(), Some("1d 2h 30m"));
    }

    #[tokio::test]
    async fn test_open_ticket_hides_resolution() {
        let h = harness();
        let mut ticket = fixtures::ticket(1);
        ticket.resolution = Some("draft".to_string());
        ticket.completed_date = Some(ts("2024-05-02T10:31:00Z"));
        h.store.upsert_ticket(&ticket).unwrap();
        h.store.save_summary(1, "open").unwrap();

        let list = h.service.list(&SummaryListParams::default()).await.unwrap();
        let summary = &list.summaries[0];
        assert_eq!(summary.status_text, "Open");
        assert!(summary.resolution.is_none());
        assert!(summary.time_to_resolution.is_none());
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_counts() {
        let h = harness();
        h.store.upsert_ticket(&fixtures::ticket(1)).unwrap();
        h.store.upsert_notes(&[fixtures::note(10, 1)]).unwrap();
        h.llm.push_error(LlmError::Http("timeout".to_string()));

        let summary = h.service.regenerate(1).await.unwrap();

        assert!(summary.starts_with("STATUS: OPEN"));
        assert!(summary.contains("1 notes available"));
        let rows = h.store.summary_rows(10, true).unwrap();
        assert_eq!(rows[0].summary.as_deref(), Some(summary.as_str()));
    }

    #[tokio::test]
    async fn test_regenerate_prompt_and_missing_ticket() {
        let h = harness();
        h.store.upsert_ticket(&fixtures::ticket(3)).unwrap();
        h.store
            .upsert_time_entries(&[fixtures::time_entry(1, 3, 2.0)])
            .unwrap();
        h.llm.push_response("new summary");

        assert_eq!(h.service.regenerate(3).await.unwrap(), "new summary");
        let prompt = &h.llm.requests()[0].messages[0].content;
        assert!(prompt.contains("Ticket: T20240003"));
        assert!(prompt.contains("TIME ENTRIES (Total: 2h)"));
        assert!(prompt.contains("No notes available"));
        assert!(prompt.contains("Ticket is still open"));

        assert!(matches!(
            h.service.regenerate(99).await,
            Err(InsightError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_limit_is_validated() {
        let h = harness();
        for limit in [0, MAX_SUMMARY_LIMIT + 1] {
            let result = h
                .service
                .list(&SummaryListParams {
                    limit,
                    ..SummaryListParams::default()
                })
                .await;
            assert!(matches!(result, Err(InsightError::InvalidRequest(_))));
        }
    }
}
