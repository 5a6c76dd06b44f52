//! Natural-language questions about synced tickets.
//!
//! A question is translated by an LLM into a [`QueryPlan`], which is then
//! executed against the local [`TicketStore`](crate::ticket::TicketStore).
//! Search results and issue analyses are summarized by the LLM as well.
//!
//! The same LLM seam also writes solution guides and per-ticket summaries.

mod labels;
mod llm;
mod plan;
mod service;
mod solutions;
mod summaries;
mod translator;

pub use labels::{is_open_status, priority_name, status_name};
pub use llm::{
    create_llm_client, AnthropicClient, ChatMessage, CompletionRequest, CompletionResponse,
    LlmClient, LlmError, LlmUsage, OpenAiClient,
};
pub use plan::{describe_filters, ChatError, QueryPlan};
pub use service::{
    format_count, ChatRequest, ChatResponse, ChatService, DEFAULT_LIMIT, MAX_DISPLAY,
    MAX_ISSUES_ANALYSIS, TOP_COUNT,
};
pub use solutions::{
    parse_suggestions, InsightError, SolutionAnswer, SolutionList, SolutionSearch,
    SolutionService, SolutionStats, Suggestion, SuggestionReport, DEFAULT_SOLUTION_LIMIT,
    MAX_SOLUTION_LIMIT, SUGGESTION_TTL,
};
pub use summaries::{
    time_to_resolution, SummaryList, SummaryListParams, SummaryService, TicketSummary,
    DEFAULT_SUMMARY_LIMIT, MAX_SUMMARY_LIMIT,
};
pub use translator::{extract_json, system_prompt, QueryTranslator};
