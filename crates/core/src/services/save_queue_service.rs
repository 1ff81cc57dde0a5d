use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::api::traits::PortfolioSaveApi;
use crate::errors::CoreError;
use crate::models::pending_save::PendingPortfolioSave;
use crate::storage::snapshot::{self, PENDING_SAVES_KEY};
use crate::storage::traits::KeyValueStorage;

/// Durable FIFO of portfolio saves requested while the user was anonymous.
///
/// The queue is persisted as a whole-array snapshot, oldest first, and is
/// bounded: enqueueing past `max_size` evicts from the head. Entries leave
/// the queue only when the backend has committed them.
///
/// Flushing is single-flight. A flush requested while another is running
/// only records the newer token and asks the running flush to do one more
/// pass once its current pass succeeds.
pub struct SaveQueue {
    storage: Arc<dyn KeyValueStorage>,
    api: Arc<dyn PortfolioSaveApi>,
    max_size: usize,
    // Held for each read-modify-write of the snapshot, never across an await.
    snapshot_lock: Mutex<()>,
    flush_state: Mutex<FlushState>,
}

#[derive(Debug, Default)]
struct FlushState {
    in_progress: bool,
    rerun_requested: bool,
    last_known_token: Option<String>,
}

/// Releases the flush guard if the running flush returns early (error or
/// cancellation). A failed flush also drops any pending rerun request.
struct FlushGuard<'a> {
    state: &'a Mutex<FlushState>,
    armed: bool,
}

impl FlushGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.in_progress = false;
            state.rerun_requested = false;
        }
    }
}

impl SaveQueue {
    /// `max_size` is clamped to at least 1.
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        api: Arc<dyn PortfolioSaveApi>,
        max_size: usize,
    ) -> Self {
        Self {
            storage,
            api,
            max_size: max_size.max(1),
            snapshot_lock: Mutex::new(()),
            flush_state: Mutex::new(FlushState::default()),
        }
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Current persisted queue, oldest first, with invalid entries skipped.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingPortfolioSave> {
        self.read_queue()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_queue().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a flush is currently running.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.lock_flush_state().in_progress
    }

    /// Append a pending save. Invalid input (non-numeric session id, blank
    /// name) is dropped without error. If the queue overflows, the oldest
    /// entries are evicted.
    pub fn enqueue(&self, entry: PendingPortfolioSave) {
        let Some(entry) = entry.normalized() else {
            tracing::debug!("dropping invalid pending portfolio save");
            return;
        };

        let _guard = self.lock_snapshot();
        let mut queue = self.read_queue();
        queue.push(entry);
        if queue.len() > self.max_size {
            let overflow = queue.len() - self.max_size;
            queue.drain(..overflow);
        }
        self.write_queue(&queue);
    }

    /// Drop every pending save.
    pub fn clear(&self) {
        let _guard = self.lock_snapshot();
        snapshot::remove(self.storage.as_ref(), PENDING_SAVES_KEY);
    }

    /// Commit queued saves to the backend with `access_token`.
    ///
    /// Returns how many entries were committed by this call, across every
    /// coalesced pass. Without a token this is a no-op returning 0. A call
    /// made while another flush is running also returns 0 immediately; its
    /// token is used for the extra pass the running flush will make.
    ///
    /// On a commit failure the failed entry goes back to the head of the
    /// queue, later entries are left untouched, pending reruns are dropped,
    /// and the error is returned. Retrying is up to the caller.
    pub async fn flush(&self, access_token: Option<&str>) -> Result<usize, CoreError> {
        let Some(token) = access_token.filter(|t| !t.is_empty()) else {
            return Ok(0);
        };

        {
            let mut state = self.lock_flush_state();
            state.last_known_token = Some(token.to_string());
            if state.in_progress {
                state.rerun_requested = true;
                tracing::debug!("flush already running; queued a rerun");
                return Ok(0);
            }
            state.in_progress = true;
        }

        let mut guard = FlushGuard {
            state: &self.flush_state,
            armed: true,
        };

        let mut next_token = token.to_string();
        let mut processed_total = 0;
        loop {
            processed_total += self.run_cycle(&next_token).await?;
            match self.take_rerun(&next_token) {
                Some(latest) => next_token = latest,
                None => break,
            }
        }
        guard.disarm();

        if processed_total > 0 {
            tracing::info!(processed = processed_total, "pending portfolio saves flushed");
        }
        Ok(processed_total)
    }

    /// Pop entries one at a time and commit them until the queue is empty.
    async fn run_cycle(&self, token: &str) -> Result<usize, CoreError> {
        let mut processed = 0;
        while let Some(entry) = self.shift() {
            match self
                .api
                .save_portfolio(token, &entry.session_user_id, &entry.portfolio_name)
                .await
            {
                Ok(confirmation) => {
                    processed += 1;
                    tracing::debug!(
                        portfolio_id = confirmation.portfolio_id,
                        "pending portfolio save committed"
                    );
                }
                Err(e) => {
                    self.prepend(entry);
                    return Err(e);
                }
            }
        }
        Ok(processed)
    }

    /// End-of-pass bookkeeping. Returns the token for another pass if one was
    /// requested, otherwise releases the in-progress flag.
    fn take_rerun(&self, current_token: &str) -> Option<String> {
        let mut state = self.lock_flush_state();
        if state.rerun_requested {
            state.rerun_requested = false;
            Some(
                state
                    .last_known_token
                    .clone()
                    .unwrap_or_else(|| current_token.to_string()),
            )
        } else {
            state.in_progress = false;
            None
        }
    }

    fn shift(&self) -> Option<PendingPortfolioSave> {
        let _guard = self.lock_snapshot();
        let mut queue = self.read_queue();
        if queue.is_empty() {
            return None;
        }
        let entry = queue.remove(0);
        self.write_queue(&queue);
        Some(entry)
    }

    fn prepend(&self, entry: PendingPortfolioSave) {
        let _guard = self.lock_snapshot();
        let mut queue = self.read_queue();
        queue.insert(0, entry);
        queue.truncate(self.max_size);
        self.write_queue(&queue);
    }

    /// Entries are decoded one by one so a single bad element doesn't
    /// discard the rest of the queue.
    fn read_queue(&self) -> Vec<PendingPortfolioSave> {
        let Some(values) =
            snapshot::read_json::<Vec<serde_json::Value>>(self.storage.as_ref(), PENDING_SAVES_KEY)
        else {
            return Vec::new();
        };

        values
            .into_iter()
            .filter_map(|value| serde_json::from_value::<PendingPortfolioSave>(value).ok())
            .filter_map(PendingPortfolioSave::normalized)
            .collect()
    }

    fn write_queue(&self, queue: &[PendingPortfolioSave]) {
        if queue.is_empty() {
            snapshot::remove(self.storage.as_ref(), PENDING_SAVES_KEY);
        } else {
            snapshot::write_json(self.storage.as_ref(), PENDING_SAVES_KEY, queue);
        }
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, ()> {
        self.snapshot_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_flush_state(&self) -> MutexGuard<'_, FlushState> {
        self.flush_state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
