//! Shared state of a content manager and the transfer completion path.
//!
//! The engine wires the registry, the scheduler and the state machine
//! together. Backend results are applied under the owning item's lock; the
//! side effects touching the scheduler, the backend or the delegate are
//! collected while the lock is held and carried out once it is released.

use super::config::ManagerConfig;
use crate::backend::{Delivery, TransferBackend, TransferError, TransferEvent, TransferHandle};
use crate::error::{Error, Result};
use crate::events::{EventNotifier, Notice};
use crate::item::registry::{ItemEntry, ItemRegistry};
use crate::item::ItemState;
use crate::lifecycle::StateMachine;
use crate::playback::PlaybackResolver;
use crate::resolver::TrackResolver;
use crate::scheduler::{Claim, RetryPolicy, Scheduler};
use crate::store::Store;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Work left over once an item lock is released.
#[derive(Default)]
pub(crate) struct Effects {
    pub(crate) notices: Vec<Notice>,
    pub(crate) cancel: Vec<TransferHandle>,
    pub(crate) admit: Option<String>,
    pub(crate) wake_after: Option<Duration>,
}

pub(crate) struct Engine {
    pub(crate) config: ManagerConfig,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) backend: Arc<dyn TransferBackend>,
    pub(crate) resolver: Arc<dyn TrackResolver>,
    pub(crate) playback: Arc<dyn PlaybackResolver>,
    pub(crate) registry: ItemRegistry,
    pub(crate) scheduler: Scheduler,
    pub(crate) machine: StateMachine,
    pub(crate) notifier: EventNotifier,
    pub(crate) retry: RetryPolicy,
    running: AtomicBool,
    runtime: Mutex<Option<runtime::Handle>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    // Deadline of the earliest pending wake-up.
    wake: Mutex<Option<Instant>>,
}

impl Engine {
    pub(crate) fn new(
        config: ManagerConfig,
        store: Arc<dyn Store>,
        backend: Arc<dyn TransferBackend>,
        resolver: Arc<dyn TrackResolver>,
        playback: Arc<dyn PlaybackResolver>,
        notifier: EventNotifier,
    ) -> Self {
        Self {
            retry: config.retry_policy(),
            scheduler: Scheduler::new(config.max_concurrent_downloads),
            registry: ItemRegistry::new(Arc::clone(&store)),
            machine: StateMachine::new(Arc::clone(&store)),
            config,
            store,
            backend,
            resolver,
            playback,
            notifier,
            running: AtomicBool::new(false),
            runtime: Mutex::new(None),
            listener: Mutex::new(None),
            wake: Mutex::new(None),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn require_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::NotStarted)
        }
    }

    /// Start consuming backend results from `events`.
    pub(crate) fn listen(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<TransferEvent>) {
        let runtime = runtime::Handle::current();
        let engine = Arc::downgrade(self);
        let listener = runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.apply_event(event);
                engine.pump();
            }
            debug!("Transfer event channel closed");
        });

        *self.runtime.lock() = Some(runtime);
        if let Some(previous) = self.listener.lock().replace(listener) {
            previous.abort();
        }
        self.running.store(true, Ordering::SeqCst);
    }

    /// Stop dispatching and stop consuming backend results.
    pub(crate) fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        self.runtime.lock().take();
        self.wake.lock().take();
        self.scheduler.clear();
    }

    /// Hand eligible chunks to the backend until every slot is taken or
    /// nothing is left to dispatch.
    ///
    /// When only chunks waiting out a backoff are left, a wake-up is armed
    /// for the earliest of them.
    pub(crate) fn pump(self: &Arc<Self>) {
        // Backends spawn onto the runtime; callers may sit outside of it.
        let runtime = self.runtime.lock().clone();
        let _guard = runtime.as_ref().map(runtime::Handle::enter);

        while self.is_running() {
            match self.scheduler.claim(
                &self.registry,
                self.store.as_ref(),
                &self.config.storage_path,
            ) {
                Claim::Dispatch(request) => {
                    let handle = request.handle.clone();
                    debug!("Dispatching {} from {}", handle, request.url);
                    if let Err(e) = self.backend.enqueue(request) {
                        warn!("Backend rejected {}: {}", handle, e);
                        self.apply_event(TransferEvent::failed(handle, e));
                    }
                }
                Claim::Stalled { id, error } => {
                    warn!("Cannot dispatch chunks of item {}: {}", id, error);
                    self.notifier.emit(Notice::error(&id, error));
                }
                Claim::Backoff(at) => {
                    self.wake_at(at);
                    break;
                }
                Claim::Idle => break,
            }
        }
    }

    /// Apply one backend result.
    ///
    /// Results for removed items, or for attempts that are no longer the
    /// current one of their chunk, are discarded.
    pub(crate) fn apply_event(self: &Arc<Self>, event: TransferEvent) {
        let TransferEvent { handle, outcome } = event;
        let Some(shared) = self.registry.entry(&handle.item_id) else {
            self.scheduler.release(&handle);
            debug!("Discarding result of {}: unknown item", handle);
            return;
        };

        let mut effects = Effects::default();
        {
            let mut entry = shared.lock();
            if entry.is_removed() || !entry.ledger.is_current(&handle) {
                drop(entry);
                self.scheduler.release(&handle);
                debug!("Discarding stale result of {}", handle);
                return;
            }
            match outcome {
                Ok(delivery) => self.on_delivered(&mut entry, &handle, delivery, &mut effects),
                Err(error) => self.on_failed(&mut entry, &handle, error, &mut effects),
            }
        }

        self.scheduler.release(&handle);
        self.settle(effects);
    }

    fn on_delivered(
        &self,
        entry: &mut ItemEntry,
        handle: &TransferHandle,
        delivery: Delivery,
        effects: &mut Effects,
    ) {
        let id = entry.item.id.clone();
        let index = handle.sequence_index;

        let bytes = match entry.ledger.mark_done(self.store.as_ref(), index, delivery) {
            Ok(bytes) => bytes,
            Err(e) => {
                // The file is on disk but not recorded; download it again.
                warn!("Cannot record chunk {}: {}", handle, e);
                entry.ledger.revert_volatile(index);
                effects.notices.push(Notice::error(&id, e));
                if entry.item.state == ItemState::InProgress {
                    effects.admit = Some(id);
                }
                return;
            }
        };
        debug!("Chunk {} done ({} bytes)", handle, bytes);

        if let Err(e) = self.registry.update_counters(entry, bytes) {
            warn!("Cannot persist counters of item {}: {}", id, e);
            effects.notices.push(Notice::error(&id, e));
        }
        effects.notices.push(Notice::Progress {
            id: id.clone(),
            downloaded: entry.item.downloaded_size,
            estimated: entry.item.estimated_size,
        });

        match self.machine.check_completion(entry) {
            Ok(Some(notice)) => effects.notices.push(notice),
            Ok(None) => {}
            Err(e) => {
                warn!("Cannot complete item {}: {}", id, e);
                effects.notices.push(Notice::error(&id, e));
            }
        }
    }

    fn on_failed(
        &self,
        entry: &mut ItemEntry,
        handle: &TransferHandle,
        error: TransferError,
        effects: &mut Effects,
    ) {
        let id = entry.item.id.clone();
        let index = handle.sequence_index;
        let failures = entry.ledger.get(index).map_or(1, |c| c.failures + 1);

        if self.retry.should_retry(failures) {
            let delay = self.retry.delay(failures);
            debug!(
                "Chunk {} failed ({}), retry {}/{} in {:?}",
                handle, error, failures, self.retry.max_retries, delay
            );
            let retry_at = Instant::now() + delay;
            if let Err(e) =
                entry
                    .ledger
                    .schedule_retry(self.store.as_ref(), index, failures, retry_at)
            {
                warn!("Cannot record retry of {}: {}", handle, e);
                entry.ledger.revert_volatile(index);
                effects.notices.push(Notice::error(&id, e));
            }
            if entry.item.state == ItemState::InProgress {
                effects.admit = Some(id);
                effects.wake_after = Some(delay);
            }
            return;
        }

        warn!("Chunk {} exhausted its retries: {}", handle, error);
        if let Err(e) = entry.ledger.mark_failed(self.store.as_ref(), index, failures) {
            warn!("Cannot record failure of {}: {}", handle, e);
            entry.ledger.revert_volatile(index);
            effects.notices.push(Notice::error(&id, e));
            if entry.item.state == ItemState::InProgress {
                effects.admit = Some(id);
            }
            return;
        }

        // Siblings still in flight go back to the queue for a later restart.
        let siblings = entry.ledger.active_handles();
        for sibling in &siblings {
            let sibling_index = sibling.sequence_index;
            if let Err(e) = entry
                .ledger
                .reset_to_pending(self.store.as_ref(), sibling_index)
            {
                warn!("Cannot reset {}: {}", sibling, e);
                entry.ledger.revert_volatile(sibling_index);
            }
        }
        effects.cancel = siblings;

        effects.notices.push(Notice::error(
            &id,
            Error::TransferFailed {
                id: id.clone(),
                index,
                source: error,
            },
        ));
        match self.machine.transition(entry, ItemState::Failed, "fail") {
            Ok(notice) => effects.notices.push(notice),
            Err(e) => {
                warn!("Cannot fail item {}: {}", id, e);
                effects.notices.push(Notice::error(&id, e));
            }
        }
    }

    /// Carry out the effects collected under an item lock.
    pub(crate) fn settle(self: &Arc<Self>, effects: Effects) {
        for handle in &effects.cancel {
            self.backend.cancel(handle);
            self.scheduler.release(handle);
        }
        if let Some(id) = effects.admit {
            self.scheduler.admit(&id);
        }
        if let Some(delay) = effects.wake_after.filter(|delay| !delay.is_zero()) {
            self.wake_at(Instant::now() + delay);
        }
        self.notifier.emit_all(effects.notices);
    }

    /// Pump again at `deadline`.
    ///
    /// Only the earliest deadline holds a timer. The pump it triggers arms
    /// the next one if chunks are still waiting.
    fn wake_at(self: &Arc<Self>, deadline: Instant) {
        let Some(runtime) = self.runtime.lock().clone() else {
            return;
        };
        {
            let mut wake = self.wake.lock();
            if wake.is_some_and(|armed| armed <= deadline) {
                return;
            }
            *wake = Some(deadline);
        }

        let engine: Weak<Self> = Arc::downgrade(self);
        runtime.spawn(async move {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            if let Some(engine) = engine.upgrade() {
                {
                    let mut wake = engine.wake.lock();
                    if *wake == Some(deadline) {
                        wake.take();
                    }
                }
                engine.pump();
            }
        });
    }
}
