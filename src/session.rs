//! Inbox session — the working email set, its search filters and the
//! enrichment overlay, with broadcast to display subscribers.
//!
//! Every search is tagged with a generation number. A search response is
//! installed only if no newer search was issued while it was in flight,
//! and an enrichment pass is installed only if the list it ran over is
//! still the one on display. The raw search result and the enrichment
//! overlay are kept apart; the displayed list is their merge.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::MailApi;
use crate::enrichment::Enricher;
use crate::error::ApiError;
use crate::model::{Email, Enrichment, FilterField, SearchFilters};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// Change notifications for display subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A search result replaced the working set.
    EmailsLoaded { generation: u64, count: usize },
    /// The newest search failed; the previous list is still shown.
    SearchFailed { generation: u64, error: String },
    /// Category/reply were attached to `enriched` emails of the working set.
    EnrichmentApplied { generation: u64, enriched: usize },
}

/// What a search did to the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The response replaced the working set.
    Loaded { generation: u64, count: usize },
    /// A newer search was issued before this one resolved; result dropped.
    Stale { generation: u64 },
    /// The filter update did not change anything, so no search was issued.
    Unchanged,
}

/// What an enrichment pass did to the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichOutcome {
    Applied { generation: u64, enriched: usize },
    /// Every email on display already carries enrichment.
    NothingToDo,
    /// The working set was replaced while the pass ran; result dropped.
    Stale { generation: u64 },
}

/// Point-in-time copy of the session for rendering.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// Generation of the search that produced `emails` (0 before the first load).
    pub generation: u64,
    pub filters: SearchFilters,
    pub emails: Vec<Email>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct SessionState {
    filters: SearchFilters,
    raw: Arc<Vec<Email>>,
    loaded_generation: u64,
    overlay: HashMap<usize, Enrichment>,
    last_error: Option<String>,
}

impl SessionState {
    fn merged(&self) -> Vec<Email> {
        self.raw
            .iter()
            .enumerate()
            .map(|(idx, email)| match self.overlay.get(&idx) {
                Some(enrichment) => email.with_enrichment(enrichment.clone()),
                None => email.clone(),
            })
            .collect()
    }
}

/// Query controller plus working set.
pub struct InboxSession {
    api: Arc<dyn MailApi>,
    enricher: Enricher,
    state: RwLock<SessionState>,
    issued: AtomicU64,
    tx: broadcast::Sender<SessionEvent>,
}

impl InboxSession {
    /// Create a session with empty filters and an empty working set.
    pub fn new(api: Arc<dyn MailApi>, enrich_concurrency: usize) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            enricher: Enricher::new(Arc::clone(&api), enrich_concurrency),
            api,
            state: RwLock::new(SessionState::default()),
            issued: AtomicU64::new(0),
            tx,
        })
    }

    /// Subscribe to session change events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Current filters.
    pub async fn filters(&self) -> SearchFilters {
        self.state.read().await.filters.clone()
    }

    /// The working set with enrichment merged in.
    pub async fn emails(&self) -> Vec<Email> {
        self.state.read().await.merged()
    }

    /// Error from the most recent search, if it failed.
    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            generation: state.loaded_generation,
            filters: state.filters.clone(),
            emails: state.merged(),
            last_error: state.last_error.clone(),
        }
    }

    /// Set one filter field without searching. Returns `true` if it changed.
    pub async fn set_filter(&self, field: FilterField, value: impl Into<String>) -> bool {
        self.state.write().await.filters.set(field, value)
    }

    /// Replace all filters without searching. Returns `true` if any changed.
    pub async fn set_filters(&self, filters: SearchFilters) -> bool {
        let mut state = self.state.write().await;
        if state.filters == filters {
            return false;
        }
        state.filters = filters;
        true
    }

    /// Set one filter field and, if it changed, search and enrich.
    pub async fn update_filter(
        self: &Arc<Self>,
        field: FilterField,
        value: impl Into<String>,
    ) -> Result<LoadOutcome, ApiError> {
        if !self.set_filter(field, value).await {
            return Ok(LoadOutcome::Unchanged);
        }
        self.reload().await
    }

    /// Replace all filters and, if any changed, search and enrich.
    pub async fn update_filters(
        self: &Arc<Self>,
        filters: SearchFilters,
    ) -> Result<LoadOutcome, ApiError> {
        if !self.set_filters(filters).await {
            return Ok(LoadOutcome::Unchanged);
        }
        self.reload().await
    }

    /// Search with the current filters, then enrich the new list in the
    /// background if it is non-empty.
    pub async fn reload(self: &Arc<Self>) -> Result<LoadOutcome, ApiError> {
        let outcome = self.refresh().await?;
        if let LoadOutcome::Loaded { generation, count } = outcome
            && count > 0
        {
            let _handle = spawn_enrichment(Arc::clone(self), generation);
        }
        Ok(outcome)
    }

    /// Search with the current filters and install the result.
    ///
    /// On failure the previous working set is kept and the error recorded
    /// as `last_error` before being returned.
    pub async fn refresh(&self) -> Result<LoadOutcome, ApiError> {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let filters = self.filters().await;

        debug!(generation, ?filters, "Issuing search");
        let result = self.api.search(&filters).await;

        let mut state = self.state.write().await;
        let newest = self.issued.load(Ordering::SeqCst);
        if generation != newest {
            debug!(generation, newest, "Dropping stale search response");
            return Ok(LoadOutcome::Stale { generation });
        }

        match result {
            Ok(emails) => {
                let count = emails.len();
                state.raw = Arc::new(emails);
                state.loaded_generation = generation;
                state.overlay.clear();
                state.last_error = None;
                drop(state);

                info!(generation, count, "Loaded emails");
                let _ = self.tx.send(SessionEvent::EmailsLoaded { generation, count });
                Ok(LoadOutcome::Loaded { generation, count })
            }
            Err(e) => {
                state.last_error = Some(e.to_string());
                drop(state);

                warn!(generation, error = %e, "Search failed; keeping previous list");
                let _ = self.tx.send(SessionEvent::SearchFailed {
                    generation,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Enrich the emails of search `generation` that lack category/reply.
    pub async fn enrich(&self, generation: u64) -> EnrichOutcome {
        let emails = {
            let state = self.state.read().await;
            if state.loaded_generation != generation {
                return EnrichOutcome::Stale { generation };
            }
            state.merged()
        };

        if emails.iter().all(Email::is_enriched) {
            return EnrichOutcome::NothingToDo;
        }

        let results = self.enricher.enrich(&emails).await;

        let mut state = self.state.write().await;
        if state.loaded_generation != generation {
            debug!(
                generation,
                current = state.loaded_generation,
                "Dropping enrichment for replaced list"
            );
            return EnrichOutcome::Stale { generation };
        }

        let enriched = results.len();
        for (idx, enrichment) in results {
            state.overlay.entry(idx).or_insert(enrichment);
        }
        drop(state);

        info!(generation, enriched, "Applied enrichment");
        let _ = self
            .tx
            .send(SessionEvent::EnrichmentApplied { generation, enriched });
        EnrichOutcome::Applied {
            generation,
            enriched,
        }
    }
}

/// Run an enrichment pass for `generation` on a background task.
pub fn spawn_enrichment(session: Arc<InboxSession>, generation: u64) -> JoinHandle<EnrichOutcome> {
    tokio::spawn(async move { session.enrich(generation).await })
}
