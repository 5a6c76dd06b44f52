pub mod chat;
pub mod config;
pub mod metrics;
pub mod sync;
pub mod testing;
pub mod ticket;
pub mod upstream;

pub use chat::{
    ChatError, ChatRequest, ChatResponse, ChatService, InsightError, LlmClient, LlmError,
    SolutionService, SummaryService,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use sync::{DateRange, FetchRequest, SyncError, SyncReport, SyncService, TicketFetcher};
pub use ticket::{SqliteTicketStore, StoreError, Ticket, TicketQuery, TicketStore};
pub use upstream::{TicketApi, UpstreamClient, UpstreamError};
