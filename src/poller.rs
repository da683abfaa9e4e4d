// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Chain-State Poller
//!
//! Background tasks that keep a [`ClientChainView`] approximately fresh.
//!
//! ## Strategy
//!
//! One [`PollTask`] per data kind (blocks, mempool, balance), each on its own
//! interval with no ordering between kinds. On every tick a task:
//! 1. Skips the tick if the previous fetch of its kind is still in flight.
//! 2. Otherwise spawns the fetch, racing it against cancellation.
//! 3. Applies the result under the view's write lock, replacing the slice,
//!    or records the error and waits for the next tick.
//!
//! ## Shutdown
//!
//! All tasks share one `CancellationToken`. [`PollerHandle::stop`] cancels
//! it, waits for the tick loops to exit and then takes the view's write lock
//! once, so no fetch that raced the cancellation can still be applying its
//! result when `stop` returns. Dropping the handle cancels as well.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blockchain::client::{NodeClient, RpcError};
use crate::blockchain::types::{Block, MempoolEntry};
use crate::chain_view::{ChainEvent, ClientChainView, DataKind};

/// Default interval between block fetches.
pub const DEFAULT_BLOCKS_INTERVAL: Duration = Duration::from_secs(20);

/// Default interval between mempool fetches.
pub const DEFAULT_MEMPOOL_INTERVAL: Duration = Duration::from_secs(2);

/// Default interval between balance fetches.
pub const DEFAULT_BALANCE_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest interval a task will tick at.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Buffered chain events per subscriber before the oldest are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Read side of the node, as the poller needs it.
pub trait ChainSource: Send + Sync + 'static {
    fn fetch_blocks(&self) -> impl Future<Output = Result<Vec<Block>, RpcError>> + Send;

    fn fetch_mempool(&self) -> impl Future<Output = Result<Vec<MempoolEntry>, RpcError>> + Send;

    fn fetch_balance(&self, address: &str)
        -> impl Future<Output = Result<u64, RpcError>> + Send;
}

impl ChainSource for NodeClient {
    async fn fetch_blocks(&self) -> Result<Vec<Block>, RpcError> {
        self.get_blocks().await
    }

    async fn fetch_mempool(&self) -> Result<Vec<MempoolEntry>, RpcError> {
        self.get_mempool().await
    }

    async fn fetch_balance(&self, address: &str) -> Result<u64, RpcError> {
        self.get_balance(address).await
    }
}

/// Per-kind tick intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub blocks: Duration,
    pub mempool: Duration,
    pub balance: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            blocks: DEFAULT_BLOCKS_INTERVAL,
            mempool: DEFAULT_MEMPOOL_INTERVAL,
            balance: DEFAULT_BALANCE_INTERVAL,
        }
    }
}

// =============================================================================
// PollTask
// =============================================================================

/// A recurring fetch of one data kind with at most one fetch in flight.
#[derive(Debug)]
pub struct PollTask {
    kind: DataKind,
    interval: Duration,
    in_flight: Arc<AtomicBool>,
    token: CancellationToken,
}

/// Marks a fetch as in flight until dropped.
#[derive(Debug)]
pub struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PollTask {
    pub fn new(kind: DataKind, interval: Duration, token: CancellationToken) -> Self {
        Self {
            kind,
            interval: interval.max(MIN_POLL_INTERVAL),
            in_flight: Arc::new(AtomicBool::new(false)),
            token,
        }
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    /// Claim the in-flight slot, or `None` if a fetch already holds it.
    pub fn try_begin(&self) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(self.in_flight.clone()))
    }

    /// Tick until cancelled. `fetch` builds the work for one tick; it is
    /// dropped unfinished if cancellation wins the race.
    pub async fn run<F, Fut>(self, mut fetch: F)
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = ()> + Send + 'static,
    {
        info!(
            kind = %self.kind,
            interval_ms = self.interval.as_millis() as u64,
            "Poll task starting"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(guard) = self.try_begin() else {
                debug!(kind = %self.kind, "Previous fetch still in flight, skipping tick");
                continue;
            };

            let work = fetch();
            let token = self.token.clone();
            tokio::spawn(async move {
                let _guard = guard;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {}
                    _ = work => {}
                }
            });
        }

        info!(kind = %self.kind, "Poll task stopped");
    }
}

// =============================================================================
// ChainPoller
// =============================================================================

/// Wires a [`ChainSource`] to a shared [`ClientChainView`].
pub struct ChainPoller<S: ChainSource> {
    source: Arc<S>,
    view: Arc<RwLock<ClientChainView>>,
    intervals: PollIntervals,
    balance_target: Option<watch::Receiver<Option<String>>>,
    events: broadcast::Sender<ChainEvent>,
}

impl<S: ChainSource> ChainPoller<S> {
    pub fn new(source: Arc<S>, view: Arc<RwLock<ClientChainView>>, intervals: PollIntervals) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            source,
            view,
            intervals,
            balance_target: None,
            events,
        }
    }

    /// Also poll the balance of whichever address `target` currently holds.
    pub fn with_balance_target(mut self, target: watch::Receiver<Option<String>>) -> Self {
        self.balance_target = Some(target);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    /// Spawn the tick loops. Must be called inside a Tokio runtime.
    pub fn start(self) -> PollerHandle {
        let token = CancellationToken::new();
        let mut tasks = Vec::with_capacity(3);

        {
            let source = self.source.clone();
            let view = self.view.clone();
            let events = self.events.clone();
            let apply_token = token.clone();
            let task = PollTask::new(DataKind::Blocks, self.intervals.blocks, token.clone());
            tasks.push(tokio::spawn(task.run(move || {
                let (source, view, events, token) =
                    (source.clone(), view.clone(), events.clone(), apply_token.clone());
                async move {
                    let result = source.fetch_blocks().await;
                    settle(&view, &token, DataKind::Blocks, result, |view, blocks| {
                        if let Some(event) = view.replace_blocks(blocks) {
                            announce(&events, event);
                        }
                    })
                    .await;
                }
            })));
        }

        {
            let source = self.source.clone();
            let view = self.view.clone();
            let apply_token = token.clone();
            let task = PollTask::new(DataKind::Mempool, self.intervals.mempool, token.clone());
            tasks.push(tokio::spawn(task.run(move || {
                let (source, view, token) = (source.clone(), view.clone(), apply_token.clone());
                async move {
                    let result = source.fetch_mempool().await;
                    settle(&view, &token, DataKind::Mempool, result, |view, entries| {
                        view.replace_mempool(entries)
                    })
                    .await;
                }
            })));
        }

        if let Some(target) = self.balance_target {
            let source = self.source.clone();
            let view = self.view.clone();
            let apply_token = token.clone();
            let task = PollTask::new(DataKind::Balance, self.intervals.balance, token.clone());
            tasks.push(tokio::spawn(task.run(move || {
                let address = target.borrow().clone();
                let (source, view, token) = (source.clone(), view.clone(), apply_token.clone());
                async move {
                    let Some(address) = address else {
                        return;
                    };
                    let result = source.fetch_balance(&address).await;
                    settle(&view, &token, DataKind::Balance, result, |view, balance| {
                        view.set_balance(&address, balance)
                    })
                    .await;
                }
            })));
        }

        info!(tasks = tasks.len(), "Chain poller started");

        PollerHandle {
            token,
            tasks,
            view: self.view,
            events: self.events,
        }
    }
}

/// Apply a fetch outcome unless the poller was cancelled meanwhile.
async fn settle<T>(
    view: &RwLock<ClientChainView>,
    token: &CancellationToken,
    kind: DataKind,
    result: Result<T, RpcError>,
    apply: impl FnOnce(&mut ClientChainView, T),
) {
    let mut view = view.write().await;
    if token.is_cancelled() {
        debug!(kind = %kind, "Discarding fetch result after cancellation");
        return;
    }
    match result {
        Ok(value) => apply(&mut view, value),
        Err(e) => {
            warn!(kind = %kind, error = %e, "Poll fetch failed");
            view.record_error(kind, e.to_string());
        }
    }
}

fn announce(events: &broadcast::Sender<ChainEvent>, event: ChainEvent) {
    let ChainEvent::NewBlock {
        previous_count,
        current_count,
    } = event;
    info!(previous_count, current_count, "New block observed");
    // No subscribers is fine.
    let _ = events.send(event);
}

// =============================================================================
// PollerHandle
// =============================================================================

/// Owns a running poller. Dropping it cancels every task.
#[derive(Debug)]
pub struct PollerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    view: Arc<RwLock<ClientChainView>>,
    events: broadcast::Sender<ChainEvent>,
}

impl PollerHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Cancel all tasks and wait until no fetch can mutate the view.
    pub async fn stop(mut self) {
        self.token.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Poll task ended abnormally");
            }
        }
        // Any fetch that checked the token before cancellation finishes
        // applying before this lock is granted.
        drop(self.view.write().await);
        info!("Chain poller stopped");
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
