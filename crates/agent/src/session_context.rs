//! Session Context Manager
//!
//! Caches a per-session conversation context derived from stored history.
//! Long histories are condensed by recursive summarization so the context
//! handed to the response generator stays within `max_context_length`.
//!
//! Entry lifecycle: unloaded -> loaded (verbatim or summarized) -> evicted
//! after `session_timeout_secs` of inactivity. Eviction never touches the
//! stored history.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex as SyncMutex;
use ragchat_config::SessionConfig;
use ragchat_core::{ChatMessage, ChatStore, LanguageModel, Result};
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::{complete, record_fallback};

/// Cached context for one session
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub session_id: String,
    pub user_id: String,
    pub context: String,
    pub last_access: Instant,
    pub message_count: usize,
}

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// Exclusive hold on one session.
///
/// Releasing the last hold removes the session's entry from the lock table.
struct SessionGuard<'a> {
    locks: &'a LockTable,
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone, so a count of 1 means nobody else wants it
        self.locks
            .remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Process-wide session context cache
pub struct SessionContextManager {
    store: Arc<dyn ChatStore>,
    summarizer: Option<Arc<dyn LanguageModel>>,
    config: SessionConfig,
    cache: DashMap<String, CacheEntry>,
    /// Serializes load, update, summarize and evict per session; only
    /// sessions with a live holder or waiter have an entry
    locks: LockTable,
    last_cleanup: SyncMutex<Instant>,
}

impl SessionContextManager {
    pub fn new(
        store: Arc<dyn ChatStore>,
        summarizer: Option<Arc<dyn LanguageModel>>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            summarizer,
            config,
            cache: DashMap::new(),
            locks: DashMap::new(),
            last_cleanup: SyncMutex::new(Instant::now()),
        }
    }

    fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.config.session_timeout_secs)
    }

    fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.config.cleanup_interval_secs)
    }

    async fn lock_session(&self, session_id: &str) -> SessionGuard<'_> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        SessionGuard {
            locks: &self.locks,
            session_id: session_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of sessions currently locked or waited on
    pub fn locked_sessions(&self) -> usize {
        self.locks.len()
    }

    /// Number of cached sessions
    pub fn active_sessions(&self) -> usize {
        self.cache.len()
    }

    /// Snapshot of a cached entry
    pub fn cached(&self, session_id: &str) -> Option<CacheEntry> {
        self.cache.get(session_id).map(|entry| entry.clone())
    }

    /// Context for a session, loading it from history on a cache miss.
    ///
    /// A store failure yields an empty context and nothing is cached, so the
    /// next turn retries the load.
    pub async fn get_context(&self, session_id: &str, user_id: &str) -> String {
        let _guard = self.lock_session(session_id).await;

        if let Some(mut entry) = self.cache.get_mut(session_id) {
            entry.last_access = Instant::now();
            return entry.context.clone();
        }

        match self.load_context(session_id).await {
            Ok((context, message_count)) => {
                self.cache.insert(
                    session_id.to_string(),
                    CacheEntry {
                        session_id: session_id.to_string(),
                        user_id: user_id.to_string(),
                        context: context.clone(),
                        last_access: Instant::now(),
                        message_count,
                    },
                );
                tracing::debug!(
                    session_id = %session_id,
                    messages = message_count,
                    context_len = context.len(),
                    "Session context loaded"
                );
                context
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to load session history");
                metrics::counter!("ragchat_store_failures_total").increment(1);
                String::new()
            }
        }
    }

    /// Append a completed turn to the cached context.
    ///
    /// Sessions that are not cached are left alone; their next load reads
    /// the turn from history. If appending would exceed
    /// `max_context_length`, the context is rebuilt from stored history.
    pub async fn update(&self, session_id: &str, user_id: &str, query: &str, response: &str) {
        let _guard = self.lock_session(session_id).await;

        let turn = format!("User: {}\nAssistant: {}", query, response);
        let needs_rebuild = match self.cache.get_mut(session_id) {
            None => return,
            Some(mut entry) => {
                let separator = usize::from(!entry.context.is_empty());
                if entry.context.len() + separator + turn.len() > self.config.max_context_length {
                    true
                } else {
                    if separator == 1 {
                        entry.context.push('\n');
                    }
                    entry.context.push_str(&turn);
                    entry.message_count += 1;
                    entry.last_access = Instant::now();
                    false
                }
            }
        };

        if !needs_rebuild {
            return;
        }

        tracing::debug!(session_id = %session_id, "Context over limit, rebuilding from history");
        match self.load_context(session_id).await {
            Ok((context, message_count)) => {
                self.cache.insert(
                    session_id.to_string(),
                    CacheEntry {
                        session_id: session_id.to_string(),
                        user_id: user_id.to_string(),
                        context,
                        last_access: Instant::now(),
                        message_count,
                    },
                );
            }
            Err(e) => {
                // Keep the old context rather than exceeding the limit
                tracing::warn!(session_id = %session_id, error = %e, "Failed to rebuild session context");
                metrics::counter!("ragchat_store_failures_total").increment(1);
                if let Some(mut entry) = self.cache.get_mut(session_id) {
                    entry.last_access = Instant::now();
                }
            }
        }
    }

    /// One-shot summary of a session's stored history.
    ///
    /// Returns `None` when the session has no history.
    pub async fn summarize_session(&self, session_id: &str) -> Result<Option<String>> {
        let _guard = self.lock_session(session_id).await;

        let history = self
            .store
            .read_history(session_id, self.config.history_limit)
            .await?;
        if history.is_empty() {
            return Ok(None);
        }

        Ok(Some(self.summarize_text(&format_history(&history)).await))
    }

    /// Drop a session from the cache.
    ///
    /// Waits for any in-flight load or update of the session, so a load
    /// cannot re-insert the entry afterwards.
    pub async fn evict(&self, session_id: &str) -> bool {
        let _guard = self.lock_session(session_id).await;
        self.cache.remove(session_id).is_some()
    }

    /// Whether a cleanup pass is due
    pub fn should_cleanup(&self) -> bool {
        self.last_cleanup.lock().elapsed() > self.cleanup_interval()
    }

    /// Evict entries idle beyond the session timeout and mark them inactive
    /// in the store. Returns the number of evicted sessions.
    pub async fn cleanup_memory(&self) -> usize {
        let timeout = self.session_timeout();
        let now = Instant::now();
        let is_expired = |entry: &CacheEntry| now.duration_since(entry.last_access) > timeout;

        let candidates: Vec<String> = self
            .cache
            .iter()
            .filter(|entry| is_expired(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = Vec::with_capacity(candidates.len());
        for session_id in candidates {
            // Re-check: the entry may have been touched since the scan
            if self
                .cache
                .remove_if(&session_id, |_, entry| is_expired(entry))
                .is_some()
            {
                evicted.push(session_id);
            }
        }

        if !evicted.is_empty() {
            if let Err(e) = self.store.mark_inactive(&evicted).await {
                tracing::warn!(error = %e, "Failed to mark evicted sessions inactive");
                metrics::counter!("ragchat_store_failures_total").increment(1);
            }
            metrics::counter!("ragchat_sessions_evicted_total").increment(evicted.len() as u64);
            tracing::info!(
                evicted = evicted.len(),
                remaining = self.cache.len(),
                "Session cleanup completed"
            );
        }

        *self.last_cleanup.lock() = Instant::now();
        evicted.len()
    }

    /// Start a background task that runs `cleanup_memory` every
    /// `cleanup_interval_secs`.
    ///
    /// Returns a shutdown sender; send `true` to stop the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval();

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick completes immediately
            interval_timer.tick().await;

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        manager.cleanup_memory().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    async fn load_context(&self, session_id: &str) -> Result<(String, usize)> {
        let history = self
            .store
            .read_history(session_id, self.config.history_limit)
            .await?;
        let context = self.build_context(&history).await;
        Ok((context, history.len()))
    }

    /// Verbatim history when short enough, recursive summary otherwise
    async fn build_context(&self, history: &[ChatMessage]) -> String {
        let verbatim = format_history(history);
        if verbatim.len() <= self.config.summarization_threshold {
            return verbatim;
        }

        let turns: Vec<String> = history.iter().map(ChatMessage::format_turn).collect();
        self.summarize_history(&turns).await
    }

    /// Iteratively condense turns until the text fits the threshold or the
    /// depth cap is reached.
    ///
    /// Pass one summarizes, concurrently, each chunk of `summary_chunk_size`
    /// turns that is over the threshold; later passes summarize the joined
    /// text as a whole. The result never exceeds `max_context_length`.
    pub async fn summarize_history(&self, turns: &[String]) -> String {
        let threshold = self.config.summarization_threshold;
        let chunk_size = self.config.summary_chunk_size.max(1);

        let parts = join_all(turns.chunks(chunk_size).map(|chunk| async move {
            let text = chunk.join("\n");
            if text.len() <= threshold {
                text
            } else {
                self.summarize_text(&text).await
            }
        }))
        .await;

        let mut text = parts.join("\n\n");
        let mut depth = 1;
        while text.len() > threshold && depth < self.config.max_summary_depth {
            text = self.summarize_text(&text).await;
            depth += 1;
        }

        if text.len() > self.config.max_context_length {
            tracing::debug!(
                len = text.len(),
                depth,
                "Summary still over limit after depth cap, truncating"
            );
            text = tail(&text, self.config.max_context_length).to_string();
        }

        text
    }

    /// One summarization call; falls back to the tail of the text
    async fn summarize_text(&self, text: &str) -> String {
        let fallback = || tail(text, self.config.summarization_threshold).to_string();

        let llm = match &self.summarizer {
            Some(llm) => llm,
            None => return fallback(),
        };

        let prompt = format!(
            "The following is a long chat history between a user and an assistant. \
             Summarize the conversation so far, keeping all important context for future questions.\n\n\
             Chat History:\n{}\n\nSummarized Context:",
            text
        );

        match complete(llm, prompt).await {
            Ok(summary) if !summary.is_empty() => summary,
            Ok(_) => {
                record_fallback("summarization");
                fallback()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Summarization failed, keeping most recent text");
                record_fallback("summarization");
                fallback()
            }
        }
    }
}

/// Turns formatted as `User: q\nAssistant: r`, joined by newlines
fn format_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(ChatMessage::format_turn)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Last `max_len` bytes of `text`, moved forward to a char boundary
fn tail(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut start = text.len() - max_len;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
