//! Sync engine state machine.

use crate::config::SyncConfig;
use crate::endpoint::SyncEndpoint;
use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use recall_core::{Database, Event, EventId, EventPayload, EventQuery};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is pulling remote events.
    Pulling,
    /// Engine is pushing local events.
    Pushing,
    /// Engine has completed a sync pass.
    Synced,
    /// Engine encountered an error.
    Error,
    /// Engine is waiting before retrying.
    RetryWait,
}

impl SyncState {
    /// Returns true if the engine is mid-pass.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Pulling | SyncState::Pushing)
    }

    /// Returns true if a new pass can start.
    #[must_use]
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Synced | SyncState::Error)
    }
}

/// Cumulative statistics across sync passes.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed full passes.
    pub passes_completed: u64,
    /// Total events pulled and applied locally.
    pub events_pulled: u64,
    /// Total events pushed to the remote.
    pub events_pushed: u64,
    /// Attachment payloads transferred in either direction.
    pub attachments_transferred: u64,
    /// Retries taken by [`SyncEngine::sync_with_retry`].
    pub retries: u64,
    /// Last error message, cleared on success.
    pub last_error: Option<String>,
}

/// Result of one full bidirectional pass.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    /// Remote events applied locally (new ones only).
    pub pulled: u64,
    /// Local events delivered to the remote.
    pub pushed: u64,
    /// Attachment payloads transferred.
    pub attachments: u64,
    /// Wall-clock duration of the pass.
    pub duration: Duration,
}

/// Drives convergence between a local [`Database`] and a remote
/// [`SyncEndpoint`].
///
/// A pass is pull-then-push: remote events are applied locally first, then
/// local events the remote has not seen are delivered. Per-direction
/// checkpoints (the last fully transferred event ID) are persisted in the
/// local store's metadata, so an interrupted pass resumes where it stopped,
/// and redelivery is harmless because ingestion is idempotent. Both sides
/// converge once they hold the same event set: snapshots are pure folds in
/// event-ID order, regardless of arrival order.
pub struct SyncEngine<E: SyncEndpoint> {
    local: Arc<Database>,
    remote: E,
    config: SyncConfig,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<E: SyncEndpoint> SyncEngine<E> {
    /// Creates an engine over a local store and a remote endpoint.
    pub fn new(local: Arc<Database>, remote: E, config: SyncConfig) -> Self {
        Self {
            local,
            remote,
            config,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets a snapshot of the cumulative stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn checkpoint_key(&self, direction: &str) -> String {
        format!("sync.{}.{direction}", self.config.peer)
    }

    fn read_checkpoint(&self, direction: &str) -> SyncResult<Option<EventId>> {
        match self.local.get_metadata(&self.checkpoint_key(direction))? {
            None => Ok(None),
            Some(value) => Ok(Some(EventId::parse(value)?)),
        }
    }

    fn write_checkpoint(&self, direction: &str, id: &EventId) -> SyncResult<()> {
        self.local
            .set_metadata(&self.checkpoint_key(direction), id.as_str())?;
        Ok(())
    }

    /// Performs one full bidirectional pass.
    pub fn sync(&self) -> SyncResult<SyncSummary> {
        let start = Instant::now();

        if !self.state().can_start_sync() {
            return Err(SyncError::Protocol(format!(
                "cannot start a pass from state {:?}",
                self.state()
            )));
        }

        self.set_state(SyncState::Pulling);
        let (pulled, pulled_attachments) = match self.pull_all() {
            Ok(counts) => counts,
            Err(e) => return Err(self.fail(e)),
        };

        self.set_state(SyncState::Pushing);
        let (pushed, pushed_attachments) = match self.push_all() {
            Ok(counts) => counts,
            Err(e) => return Err(self.fail(e)),
        };

        let summary = SyncSummary {
            pulled,
            pushed,
            attachments: pulled_attachments + pushed_attachments,
            duration: start.elapsed(),
        };

        self.set_state(SyncState::Synced);
        {
            let mut stats = self.stats.write();
            stats.passes_completed += 1;
            stats.events_pulled += summary.pulled;
            stats.events_pushed += summary.pushed;
            stats.attachments_transferred += summary.attachments;
            stats.last_error = None;
        }
        tracing::info!(
            peer = %self.config.peer,
            pulled = summary.pulled,
            pushed = summary.pushed,
            attachments = summary.attachments,
            "sync pass complete"
        );
        Ok(summary)
    }

    /// Performs a pass, retrying the whole pass on transient errors.
    ///
    /// Safe because every step is idempotent and resumes from the persisted
    /// checkpoints.
    pub fn sync_with_retry(&self) -> SyncResult<SyncSummary> {
        let retry = self.config.retry.clone();
        let mut last_error = None;

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                self.set_state(SyncState::RetryWait);
                std::thread::sleep(retry.delay_for_attempt(attempt));
                self.stats.write().retries += 1;
            }

            match self.sync() {
                Ok(summary) => return Ok(summary),
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    tracing::warn!(attempt, error = %e, "sync pass failed, retrying");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| SyncError::Protocol("no sync attempts made".into())))
    }

    fn fail(&self, error: SyncError) -> SyncError {
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(error.to_string());
        error
    }

    /// Pulls remote events until the remote has nothing new, applying each
    /// batch locally and backfilling attachment payloads for the references
    /// the batch carries.
    fn pull_all(&self) -> SyncResult<(u64, u64)> {
        let mut pulled = 0u64;
        let mut attachments = 0u64;

        loop {
            let cursor = self.read_checkpoint("received")?;
            let batch = self
                .remote
                .list_events(cursor.as_ref(), self.config.receive_batch_size)?;
            let Some(last_id) = batch.events.last().map(|e| e.id.clone()) else {
                break;
            };

            // Backfill keys off the batch, not the newly-applied subset: a
            // pass interrupted between apply and backfill re-pulls the batch
            // with every event deduplicated, and the payloads still have to
            // land before the checkpoint moves past their references.
            let references: Vec<_> = batch
                .events
                .iter()
                .filter(|e| matches!(e.payload, EventPayload::AttachmentIngest { .. }))
                .map(|e| e.entity_id.clone())
                .collect();

            let applied = self.local.put_events(batch.events)?;
            pulled += applied.len() as u64;

            for id in &references {
                if !self.local.has_attachment(id)? {
                    if let Some((mime_type, bytes)) = self.remote.get_attachment(id)? {
                        self.local.put_attachment(id, mime_type, &bytes)?;
                        attachments += 1;
                    }
                }
            }

            // The checkpoint advances past duplicates too; only events the
            // remote listed before `last_id` can precede it there.
            self.write_checkpoint("received", &last_id)?;
            tracing::debug!(applied = applied.len(), cursor = %last_id, "pulled batch");

            if !batch.has_more {
                break;
            }
        }

        Ok((pulled, attachments))
    }

    /// Pushes local events the remote has not confirmed, moving attachment
    /// payloads for outgoing references first so the remote never holds a
    /// dangling reference.
    fn push_all(&self) -> SyncResult<(u64, u64)> {
        let mut pushed = 0u64;
        let mut attachments = 0u64;

        loop {
            let cursor = self.read_checkpoint("sent")?;
            let batch: Vec<Event> = self.local.list_events(&EventQuery {
                limit: self.config.send_batch_size,
                after_id: cursor,
                entity_id: None,
            })?;
            let Some(last_id) = batch.last().map(|e| e.id.clone()) else {
                break;
            };
            let full_batch = batch.len() == self.config.send_batch_size;

            for event in &batch {
                if let EventPayload::AttachmentIngest { .. } = event.payload {
                    let id = &event.entity_id;
                    if !self.remote.has_attachment(id)? {
                        if let Some((mime_type, bytes)) = self.local.get_attachment(id)? {
                            self.remote.put_attachment(id, mime_type, &bytes)?;
                            attachments += 1;
                        }
                    }
                }
            }

            pushed += batch.len() as u64;
            self.remote.put_events(batch)?;
            self.write_checkpoint("sent", &last_id)?;
            tracing::debug!(pushed, cursor = %last_id, "pushed batch");

            if !full_batch {
                break;
            }
        }

        Ok((pushed, attachments))
    }
}
