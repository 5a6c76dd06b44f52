use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use helpdesk_core::{
    ChatService, Config, LlmClient, SanitizedConfig, SolutionService, SummaryService, SyncService,
    TicketStore,
};

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<dyn TicketStore>,
    sync: Arc<SyncService>,
    chat: Option<Arc<ChatService>>,
    solutions: Arc<SolutionService>,
    summaries: Option<Arc<SummaryService>>,
    /// Held for the duration of a sync run.
    sync_lock: Mutex<()>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn TicketStore>,
        sync: Arc<SyncService>,
        chat: Option<Arc<ChatService>>,
    ) -> Self {
        Self {
            solutions: Arc::new(SolutionService::new(Arc::clone(&store))),
            summaries: None,
            config,
            store,
            sync,
            chat,
            sync_lock: Mutex::new(()),
            started_at: Utc::now(),
        }
    }

    /// Let the solution and summary endpoints use `llm`.
    pub fn with_insights(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.solutions = Arc::new(
            SolutionService::new(Arc::clone(&self.store)).with_llm(Arc::clone(&llm)),
        );
        self.summaries = Some(Arc::new(SummaryService::new(llm, Arc::clone(&self.store))));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    pub fn sync(&self) -> &SyncService {
        self.sync.as_ref()
    }

    pub fn chat(&self) -> Option<&ChatService> {
        self.chat.as_deref()
    }

    pub fn solutions(&self) -> &SolutionService {
        self.solutions.as_ref()
    }

    pub fn summaries(&self) -> Option<&SummaryService> {
        self.summaries.as_deref()
    }

    /// Claim the sync slot, or `None` when a sync is already running.
    pub fn try_begin_sync(&self) -> Option<MutexGuard<'_, ()>> {
        self.sync_lock.try_lock().ok()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
