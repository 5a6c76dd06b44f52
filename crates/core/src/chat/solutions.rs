//! Recorded ticket resolutions and LLM-written solution guides.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::llm::{CompletionRequest, LlmClient, LlmError};
use super::service::text_or;
use super::translator::extract_json;
use crate::ticket::{StoreError, Ticket, TicketQuery, TicketStore};

/// Results returned by a solution search unless asked otherwise.
pub const DEFAULT_SOLUTION_LIMIT: usize = 50;
/// Largest accepted solution search limit.
pub const MAX_SOLUTION_LIMIT: usize = 500;
/// How long generated suggestions are served from memory.
pub const SUGGESTION_TTL: Duration = Duration::from_secs(3600);
/// Open tickets read for a suggestion run.
const SUGGESTION_SAMPLE: usize = 200;
/// Fewer open tickets than this and no suggestions are generated.
const MIN_OPEN_TICKETS: usize = 3;
/// Open tickets echoed back with the suggestions.
const SAMPLE_TICKETS_RETURNED: usize = 10;
const DESCRIPTION_CHARS: usize = 250;
/// Raw model output kept when the reply held no suggestions.
const RAW_RESPONSE_CHARS: usize = 200;

/// Error type for the solution and summary services.
#[derive(Debug, Error)]
pub enum InsightError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("LLM not configured")]
    LlmUnavailable,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Filters for a solution search. Every filter is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionSearch {
    #[serde(default)]
    pub ticket_number: Option<String>,
    #[serde(default)]
    pub ticket_id: Option<i64>,
    #[serde(default)]
    pub company_id: Option<i64>,
    /// Keep only tickets with a recorded resolution.
    #[serde(default = "default_has_resolution")]
    pub has_resolution: bool,
    #[serde(default = "default_solution_limit")]
    pub limit: usize,
}

fn default_has_resolution() -> bool {
    true
}

fn default_solution_limit() -> usize {
    DEFAULT_SOLUTION_LIMIT
}

impl Default for SolutionSearch {
    fn default() -> Self {
        Self {
            ticket_number: None,
            ticket_id: None,
            company_id: None,
            has_resolution: true,
            limit: DEFAULT_SOLUTION_LIMIT,
        }
    }
}

impl SolutionSearch {
    pub fn validate(&self) -> Result<(), InsightError> {
        if !(1..=MAX_SOLUTION_LIMIT).contains(&self.limit) {
            return Err(InsightError::InvalidRequest(format!(
                "limit must be between 1 and {}",
                MAX_SOLUTION_LIMIT
            )));
        }
        Ok(())
    }

    fn query(&self) -> TicketQuery {
        TicketQuery {
            ticket_id: self.ticket_id,
            ticket_number: self
                .ticket_number
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            company_id: self.company_id,
            has_resolution: self.has_resolution.then_some(true),
            ..TicketQuery::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionList {
    pub solutions: Vec<Ticket>,
    pub total_count: usize,
    pub has_resolution_count: usize,
}

/// A solution guide written by the model for one ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionAnswer {
    pub ticket_number: Option<String>,
    pub title: Option<String>,
    pub answer: String,
    pub has_resolution: bool,
    pub ticket: Ticket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionStats {
    pub total_tickets: i64,
    pub tickets_with_solutions: i64,
    pub tickets_without_solutions: i64,
    /// Share of tickets with a resolution, in percent, two decimals.
    pub resolution_rate_percentage: f64,
}

/// One recurring problem among the open tickets, with a suggested fix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Suggestion {
    pub title: String,
    pub problem: String,
    pub solution: String,
    pub usefulness: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionReport {
    pub suggestions: Vec<Suggestion>,
    pub analyzed_tickets: usize,
    pub sample_tickets: Vec<Ticket>,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_age_seconds: Option<u64>,
    /// Why nothing was generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Start of the model's reply when no suggestion could be read from it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

struct CachedSuggestions {
    report: SuggestionReport,
    generated_at: Instant,
}

/// Searches recorded resolutions and asks the model for solution guides
/// and suggestions.
///
/// Searching and statistics only need the store. The model is optional;
/// without it the generating operations fail with
/// [`InsightError::LlmUnavailable`].
pub struct SolutionService {
    store: Arc<dyn TicketStore>,
    llm: Option<Arc<dyn LlmClient>>,
    cache: Mutex<Option<CachedSuggestions>>,
    cache_ttl: Duration,
}

impl SolutionService {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self {
            store,
            llm: None,
            cache: Mutex::new(None),
            cache_ttl: SUGGESTION_TTL,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    fn llm(&self) -> Result<&Arc<dyn LlmClient>, InsightError> {
        self.llm.as_ref().ok_or(InsightError::LlmUnavailable)
    }

    fn cache(&self) -> MutexGuard<'_, Option<CachedSuggestions>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Tickets matching `search`, most recently resolved first.
    pub fn search(&self, search: &SolutionSearch) -> Result<SolutionList, InsightError> {
        search.validate()?;
        let solutions = self.store.search_resolved(&search.query(), search.limit)?;
        let has_resolution_count = solutions.iter().filter(|t| has_resolution(t)).count();
        debug!(
            found = solutions.len(),
            has_resolution_count, "Solution search finished"
        );
        Ok(SolutionList {
            total_count: solutions.len(),
            has_resolution_count,
            solutions,
        })
    }

    pub fn stats(&self) -> Result<SolutionStats, InsightError> {
        let total = self.store.count(&TicketQuery::new())?;
        let with_solutions = self.store.count(&TicketQuery::new().with_resolution(true))?;
        let rate = if total > 0 {
            (with_solutions as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        Ok(SolutionStats {
            total_tickets: total,
            tickets_with_solutions: with_solutions,
            tickets_without_solutions: total - with_solutions,
            resolution_rate_percentage: rate,
        })
    }

    /// Step-by-step guide for the ticket with this number.
    ///
    /// A recorded resolution is reformatted into steps. Without one the
    /// model proposes troubleshooting steps from the description.
    pub async fn solution_for(&self, ticket_number: &str) -> Result<SolutionAnswer, InsightError> {
        let ticket = self.store.find_by_number(ticket_number)?.ok_or_else(|| {
            InsightError::NotFound(format!("Ticket {} not found in database", ticket_number))
        })?;
        let llm = self.llm()?;

        let ticket_info = format!(
            "Ticket Number: {}\nTitle: {}\nDescription: {}\nResolution/Solution: {}\n\
             Status: {}\nPriority: {}\nCreated Date: {}\nCompleted Date: {}\nCompany ID: {}",
            ticket.ticket_number.as_deref().unwrap_or("N/A"),
            text_or(ticket.title.as_deref(), "No title", 500),
            text_or(ticket.description.as_deref(), "No description available", 4000),
            text_or(ticket.resolution.as_deref(), "No resolution recorded yet", 4000),
            display_or(ticket.status, "Unknown"),
            display_or(ticket.priority, "Unknown"),
            display_or(ticket.create_date, "N/A"),
            display_or(ticket.completed_date, "Not completed"),
            display_or(ticket.company_id, "N/A"),
        );

        let request = CompletionRequest::new(format!(
            "Analyze this support ticket and provide a comprehensive step-by-step solution:\n\n\
             {}\n\n\
             Generate a clear, actionable solution with step-by-step instructions to resolve this issue. \
             If a resolution is provided, format it properly. If not, use the problem description \
             to suggest troubleshooting steps.",
            ticket_info
        ))
        .with_system(SOLUTION_PROMPT)
        .with_temperature(0.5)
        .with_max_tokens(1500);

        let response = llm.complete(request).await?;
        info!(ticket_number, "Solution guide generated");

        Ok(SolutionAnswer {
            ticket_number: ticket.ticket_number.clone(),
            title: ticket.title.clone(),
            answer: response.text.trim().to_string(),
            has_resolution: has_resolution(&ticket),
            ticket,
        })
    }

    /// Suggested fixes for recurring problems among the newest open tickets.
    ///
    /// A generated report is served from memory until the cache TTL passes,
    /// unless `force_refresh` is set.
    pub async fn suggestions(&self, force_refresh: bool) -> Result<SuggestionReport, InsightError> {
        let fresh = if force_refresh {
            None
        } else {
            self.cache()
                .as_ref()
                .map(|c| (c.generated_at.elapsed(), c.report.clone()))
                .filter(|(age, _)| *age < self.cache_ttl)
        };
        if let Some((age, report)) = fresh {
            debug!(age_secs = age.as_secs(), "Returning cached suggestions");
            return Ok(SuggestionReport {
                cached: true,
                cache_age_seconds: Some(age.as_secs()),
                raw_response: None,
                ..report
            });
        }

        let tickets = self
            .store
            .search(&TicketQuery::new().with_open(true), SUGGESTION_SAMPLE)?;
        if tickets.len() < MIN_OPEN_TICKETS {
            return Ok(SuggestionReport {
                analyzed_tickets: tickets.len(),
                message: Some(format!(
                    "Not enough open tickets found (need at least {}, found {})",
                    MIN_OPEN_TICKETS,
                    tickets.len()
                )),
                ..SuggestionReport::default()
            });
        }
        let llm = self.llm()?;

        let sample: Vec<Value> = tickets
            .iter()
            .map(|t| {
                json!({
                    "ticket_number": t.ticket_number,
                    "title": text_or(t.title.as_deref(), "No Title", 200),
                    "description": text_or(t.description.as_deref(), "", DESCRIPTION_CHARS),
                    "priority": t.priority,
                    "status": t.status,
                })
            })
            .collect();

        let request = CompletionRequest::new(format!(
            "Analyze these OPEN support tickets that currently have NO resolution:\n\n{}\n\n\
             Generate 5-8 smart solution suggestions that would help resolve these common open issues.",
            serde_json::to_string(&sample).unwrap_or_default()
        ))
        .with_system(SUGGESTIONS_PROMPT)
        .with_temperature(0.7)
        .with_max_tokens(2000)
        .with_json_mode();

        let response = llm.complete(request).await?;
        let suggestions = parse_suggestions(&response.text);
        info!(
            analyzed = tickets.len(),
            suggestions = suggestions.len(),
            "Generated suggestions"
        );
        if suggestions.is_empty() {
            warn!("Model reply held no suggestions");
        }

        let report = SuggestionReport {
            raw_response: suggestions
                .is_empty()
                .then(|| response.text.chars().take(RAW_RESPONSE_CHARS).collect()),
            suggestions,
            analyzed_tickets: tickets.len(),
            sample_tickets: tickets.into_iter().take(SAMPLE_TICKETS_RETURNED).collect(),
            cached: false,
            cache_age_seconds: None,
            message: None,
        };

        *self.cache() = Some(CachedSuggestions {
            report: report.clone(),
            generated_at: Instant::now(),
        });
        Ok(report)
    }
}

fn has_resolution(ticket: &Ticket) -> bool {
    ticket
        .resolution
        .as_deref()
        .is_some_and(|r| !r.trim().is_empty())
}

fn display_or<T: std::fmt::Display>(value: Option<T>, fallback: &str) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

/// Read suggestions from a model reply.
///
/// Accepts `{"suggestions": [...]}`, a bare array, a single suggestion
/// object, or the list under `recommendations` or `items`. Anything else
/// yields no suggestions.
pub fn parse_suggestions(text: &str) -> Vec<Suggestion> {
    let value = serde_json::from_str::<Value>(text.trim())
        .ok()
        .or_else(|| extract_json(text).and_then(|json| serde_json::from_str(json).ok()));

    let items = match value {
        Some(Value::Array(items)) => items,
        Some(Value::Object(mut obj)) => {
            if let Some(Value::Array(items)) = obj.remove("suggestions") {
                items
            } else if obj.contains_key("title") && obj.contains_key("problem") {
                vec![Value::Object(obj)]
            } else {
                ["recommendations", "items"]
                    .iter()
                    .find_map(|key| match obj.remove(*key) {
                        Some(Value::Array(items)) => Some(items),
                        _ => None,
                    })
                    .unwrap_or_default()
            }
        }
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

const SOLUTION_PROMPT: &str = r#"You are an expert IT support assistant that provides step-by-step solutions for technical problems.

When given a ticket, you should:
1. Display the ticket number and title prominently
2. Summarize the problem clearly
3. Provide a detailed STEP-BY-STEP solution:
   - If a resolution is provided in the ticket, format it as numbered steps
   - If NO resolution is provided, analyze the problem description and generate practical troubleshooting steps
4. Include any relevant metadata (status, priority, dates)

Always provide actionable, step-by-step solutions.

Format your response with clear markdown:
- Use **bold** for important points
- Use numbered lists for step-by-step instructions
- Use bullet points for additional tips"#;

const SUGGESTIONS_PROMPT: &str = r#"You are an IT support expert analyzing OPEN support tickets that need solutions.

Identify common problems that appear across multiple tickets and generate 5-8 actionable solution suggestions.

For each suggestion, provide:
- title: a clear, concise name for the problem type
- problem: the common issue you identified
- solution: a recommended fix that would resolve this type of ticket
- usefulness: why implementing it would be impactful

Respond with JSON only:
{"suggestions": [{"title": "...", "problem": "...", "solution": "...", "usefulness": "..."}]}"#;
