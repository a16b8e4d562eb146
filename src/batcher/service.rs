use super::{Batch, BatchCompletion, BatchOutcome, BatcherMetrics, FlushTrigger};
use crate::{
    capacity::{Admission, CapacityGate},
    chain::ChainClient,
    config::RelayConfig,
    error::BatchError,
    events::{EventInterpreter, TypedOutcome},
    nonce::{NonceAllocator, NonceLease},
    store::CoordinationStore,
    types::{Category, ExtrinsicCall},
};
use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

/// Per-category batching service.
///
/// Cheap to clone; all state is shared. Appends and the flush swap for one
/// category are serialized under that category's lock, so category handlers
/// may genuinely run concurrently.
#[derive(Debug)]
pub struct Batcher<C: ?Sized> {
    inner: Arc<BatcherInner<C>>,
}

impl<C: ?Sized> Clone for Batcher<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

#[derive(Debug)]
struct BatcherInner<C: ?Sized> {
    chain: Arc<C>,
    gate: CapacityGate<C>,
    allocator: NonceAllocator<C>,
    interpreter: EventInterpreter<C>,
    config: RelayConfig,
    /// One live batch per category, each behind its own lock.
    batches: DashMap<Category, Arc<Mutex<Batch>>>,
    /// Age-timer guard: at most one recurring timer per category.
    timers: DashMap<Category, JoinHandle<()>>,
    completions: mpsc::UnboundedSender<BatchCompletion>,
    metrics: BatcherMetrics,
}

impl<C: ?Sized> Drop for BatcherInner<C> {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            entry.value().abort();
        }
    }
}

impl<C: ChainClient + ?Sized + 'static> Batcher<C> {
    /// Creates a new [`Batcher`] and the receiving end of its completion
    /// signals.
    pub fn new(
        chain: Arc<C>,
        store: CoordinationStore,
        config: RelayConfig,
    ) -> (Self, mpsc::UnboundedReceiver<BatchCompletion>) {
        let (completions, completions_rx) = mpsc::unbounded_channel();

        let gate = CapacityGate::new(Arc::clone(&chain), config.chain.provider_id);
        let allocator = NonceAllocator::new(
            Arc::clone(&chain),
            store,
            config.chain.account.clone(),
            config.nonce.window,
            config.nonce.lease_ttl,
        );
        let interpreter = EventInterpreter::new(Arc::clone(&chain), config.chain.provider_id);

        let this = Self {
            inner: Arc::new(BatcherInner {
                chain,
                gate,
                allocator,
                interpreter,
                config,
                batches: DashMap::new(),
                timers: DashMap::new(),
                completions,
                metrics: BatcherMetrics::default(),
            }),
        };

        (this, completions_rx)
    }

    /// Appends an announcement to its category's live batch.
    ///
    /// Returns once the item is appended, not once it is flushed. Reaching the
    /// configured max size swaps the batch out right here, under the category
    /// lock, so later appends land in a fresh batch and a flushed batch never
    /// exceeds the max; only the submission pipeline runs in the background.
    pub async fn process(&self, announcement: crate::types::Announcement) {
        let category = announcement.category;
        let cell = self.batch_cell(category);

        let full = {
            let mut batch = cell.lock().await;
            batch.push(announcement);
            self.inner.metrics.appended.increment(1);
            (batch.len() >= self.inner.config.batch.max_size)
                .then(|| std::mem::replace(&mut *batch, Batch::new(category)))
        };

        if let Some(batch) = full {
            debug!(%category, "live batch reached max size");
            let this = self.clone();
            tokio::spawn(async move {
                this.dispatch(batch, FlushTrigger::Size).await;
            });
        }
    }

    /// Arms the recurring age timer for `category`.
    ///
    /// Idempotent: a second call for the same category is a no-op. Invoked
    /// once per category during process start.
    pub fn arm_batch_timer(&self, category: Category) {
        match self.inner.timers.entry(category) {
            Entry::Occupied(_) => {}
            Entry::Vacant(entry) => {
                // The task holds the service weakly so dropping the last
                // strong handle tears the timers down with it.
                let weak = Arc::downgrade(&self.inner);
                let max_age = self.inner.config.batch.max_age;
                entry.insert(tokio::spawn(async move {
                    let mut interval = tokio::time::interval(max_age);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    // The first tick completes immediately.
                    interval.tick().await;
                    loop {
                        interval.tick().await;
                        let Some(inner) = weak.upgrade() else { return };
                        Batcher { inner }.flush(category, FlushTrigger::Timer).await;
                    }
                }));
                debug!(%category, ?max_age, "armed batch age timer");
            }
        }
    }

    /// Flushes the live batch of `category`.
    ///
    /// The swap is exactly-once: concurrent triggers race for the lock, and
    /// whichever loses observes an already-empty batch and no-ops. An empty
    /// batch at timer fire is a no-op as well.
    pub async fn flush(&self, category: Category, trigger: FlushTrigger) {
        let batch = {
            let cell = self.batch_cell(category);
            let mut live = cell.lock().await;
            if live.is_empty() {
                return;
            }
            std::mem::replace(&mut *live, Batch::new(category))
        };

        self.dispatch(batch, trigger).await;
    }

    /// Drives one swapped-out batch through the submission pipeline and emits
    /// its completion.
    async fn dispatch(&self, batch: Batch, trigger: FlushTrigger) {
        let category = batch.category();
        match trigger {
            FlushTrigger::Size => self.inner.metrics.size_triggered.increment(1),
            FlushTrigger::Timer => self.inner.metrics.time_triggered.increment(1),
            FlushTrigger::Shutdown => self.inner.metrics.shutdown_triggered.increment(1),
        }
        info!(%category, items = batch.len(), ?trigger, "flushing batch");

        let started = Instant::now();
        let completion = match self.submit(&batch).await {
            Ok(outcomes) => {
                self.inner.metrics.flushed.increment(1);
                self.inner.metrics.flushed_items.increment(batch.len() as u64);
                self.inner.metrics.flush_time.record(started.elapsed().as_millis() as f64);
                BatchCompletion {
                    category,
                    item_count: batch.len(),
                    outcome: BatchOutcome::Success { outcomes },
                }
            }
            Err(err) => {
                self.inner.metrics.failed.increment(1);
                warn!(%category, items = batch.len(), %err, "batch failed terminally");
                BatchCompletion {
                    category,
                    item_count: batch.len(),
                    outcome: BatchOutcome::Failure {
                        reason: err.to_string(),
                        items: batch.items().to_vec(),
                    },
                }
            }
        };

        let _ = self.inner.completions.send(completion);
    }

    /// Runs the submission pipeline for one swapped-out batch: capacity
    /// admission, nonce lease, combined extrinsic, inclusion, interpretation.
    async fn submit(&self, batch: &Batch) -> Result<Vec<TypedOutcome>, BatchError> {
        let cost = batch.len() as u128 * self.inner.config.capacity.cost_per_item;

        // Admission comes first so a rejected flush never consumes a lease.
        self.admit(batch.category(), cost).await?;
        let lease = self.lease_with_retry().await?;

        let call = ExtrinsicCall::publish_batch(batch.category(), batch.items());
        let nonce = lease.value();

        let tx_hash = match self.inner.chain.submit_extrinsic(&call, nonce).await {
            Ok(hash) => hash,
            Err(err) if err.is_transient() => {
                // The extrinsic may still be in flight; the lease TTL is the
                // safety net for the slot.
                return Err(err.into());
            }
            Err(err) => {
                // Definitive ledger rejection frees the slot immediately.
                self.release_lease(lease).await;
                return Err(err.into());
            }
        };

        let included = self.inner.chain.wait_for_inclusion(&tx_hash).await?;
        info!(
            category = %batch.category(),
            tx = %tx_hash,
            block = included.number,
            nonce,
            "batch included"
        );

        // Inclusion advanced the chain nonce; the slot can reopen early.
        self.release_lease(lease).await;

        let records = match self.inner.chain.events_for_block(&included.hash).await {
            Ok(records) => records,
            Err(err) => {
                // Partial confirmation is still actionable.
                warn!(tx = %tx_hash, %err, "could not fetch inclusion events");
                Vec::new()
            }
        };

        Ok(self.inner.interpreter.interpret(&records))
    }

    /// Checks capacity admission, retrying rejections and transient chain
    /// errors with exponential backoff until the retry budget is exhausted.
    async fn admit(&self, category: Category, cost: u128) -> Result<(), BatchError> {
        let settings = &self.inner.config.capacity;
        let mut attempt = 0u32;

        loop {
            match self.inner.gate.check(cost).await {
                Ok(Admission::Admitted { .. }) => return Ok(()),
                Ok(Admission::Rejected { required, remaining, next_epoch_start }) => {
                    if attempt >= settings.retry_limit {
                        return Err(BatchError::CapacityExhausted {
                            category,
                            reason: format!(
                                "required {required}, remaining {remaining}, \
                                 replenishes at block {next_epoch_start}"
                            ),
                        });
                    }
                    warn!(
                        %category,
                        required,
                        remaining,
                        next_epoch_start,
                        attempt,
                        "capacity rejected, backing off"
                    );
                }
                Err(err) if err.is_transient() => {
                    if attempt >= settings.retry_limit {
                        return Err(err.into());
                    }
                    warn!(%category, %err, attempt, "capacity check failed, backing off");
                }
                Err(err) => return Err(err.into()),
            }

            attempt += 1;
            tokio::time::sleep(backoff_delay(settings.retry_backoff, attempt)).await;
        }
    }

    /// Leases a nonce, retrying transient failures (exhausted window, store
    /// hiccups) with a short delay.
    async fn lease_with_retry(&self) -> Result<NonceLease, BatchError> {
        let settings = &self.inner.config.nonce;
        let mut attempt = 0u32;

        loop {
            match self.inner.allocator.lease().await {
                Ok(lease) => return Ok(lease),
                Err(err) if err.is_transient() && attempt < settings.retry_limit => {
                    attempt += 1;
                    debug!(%err, attempt, "lease unavailable, backing off");
                    tokio::time::sleep(settings.retry_backoff).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn release_lease(&self, lease: NonceLease) {
        let nonce = lease.value();
        if let Err(err) = lease.release().await {
            // The TTL will reopen the slot.
            warn!(nonce, %err, "failed to release nonce lease");
        } else {
            self.inner.allocator.note_released();
        }
    }

    fn batch_cell(&self, category: Category) -> Arc<Mutex<Batch>> {
        self.inner
            .batches
            .entry(category)
            .or_insert_with(|| Arc::new(Mutex::new(Batch::new(category))))
            .clone()
    }

}

/// Exponential backoff with up to 10% jitter.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1).min(6)));
    let jitter_ceiling = (exp.as_millis() as u64 / 10).max(1);
    exp + Duration::from_millis(rand::rng().random_range(0..jitter_ceiling))
}

#[cfg(test)]
mod tests {
    use super::backoff_delay;
    use std::time::Duration;

    #[test]
    fn backoff_grows_and_stays_bounded() {
        let base = Duration::from_secs(1);
        let first = backoff_delay(base, 1);
        let third = backoff_delay(base, 3);

        assert!(first >= base);
        assert!(first < base * 2);
        assert!(third >= base * 4);

        // The exponent saturates rather than overflowing.
        let huge = backoff_delay(base, u32::MAX);
        assert!(huge >= base * 64);
    }
}
