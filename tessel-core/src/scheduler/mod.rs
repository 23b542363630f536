//! Chore Scheduler
//!
//! The scheduler is the single coordination point for side-effecting work in
//! a container. Invalidated subscribers hand it chores; a drain executes them
//! until nothing is left.
//!
//! # Algorithm
//!
//! 1. `schedule` keys each chore by `(kind, target)`. A key that is already
//!    pending is coalesced. A key that is currently running is marked for one
//!    follow-up run once the current run completes.
//! 2. Pending chores are ordered by `(tier value, insertion sequence)`, so
//!    within a tier chores run in the order they were first requested.
//! 3. `drain` pops the next chore and hands it to a [`ChoreRunner`]. A chore
//!    that suspends keeps its key running while the drain moves on to other
//!    keys; suspended chores are awaited once nothing else is runnable.
//! 4. A failed chore is handed back to the runner, which may route the error
//!    to a boundary. Unhandled errors are returned after the drain has run
//!    every independent chore.
//! 5. A drain that stops on an integrity error drops its suspended chores
//!    together with their follow-ups and counts them as cancelled.
//!
//! Drains do not nest: a drain started while another is active waits for it,
//! and a drain started from inside a chore is a [`CoreError::RecursiveDrain`].

mod chore;

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::config::{ContainerConfig, PriorityTable};
use crate::error::{CoreError, Result};
use crate::vnode::NodeId;

pub use chore::{Chore, ChoreKey, ChoreKind, ChoreOutcome, ChoreTarget, Priority};

thread_local! {
    static IN_CHORE: Cell<bool> = const { Cell::new(false) };
}

/// Executes chores on behalf of the scheduler.
pub trait ChoreRunner: Send + Sync {
    /// Start a chore.
    fn run(&self, chore: &Chore) -> ChoreOutcome;

    /// Handle a failed chore. `Ok` means the error was contained.
    fn handle_error(&self, chore: &Chore, error: CoreError) -> Result<()>;

    /// Whether `host` is still part of the tree.
    fn is_live(&self, host: NodeId) -> bool;
}

/// Counters for one drain, or cumulative over the scheduler's life.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    /// Chores started.
    pub runs: usize,
    pub completed: usize,
    pub failed: usize,
    /// Chores that returned a future.
    pub suspended: usize,
    /// Chores skipped or discarded because their host was removed.
    pub cancelled: usize,
}

impl DrainStats {
    fn absorb(&mut self, other: &DrainStats) {
        self.runs += other.runs;
        self.completed += other.completed;
        self.failed += other.failed;
        self.suspended += other.suspended;
        self.cancelled += other.cancelled;
    }
}

#[derive(Default)]
struct QueueState {
    order: BTreeMap<(u8, u64), ChoreKey>,
    pending: HashMap<ChoreKey, Chore>,
    running: HashMap<ChoreKey, Chore>,
    rerun: HashMap<ChoreKey, Chore>,
    seq: u64,
    coalesced: usize,
    violations: Vec<String>,
    draining: bool,
    totals: DrainStats,
}

/// The per-container work queue.
pub struct Scheduler {
    priorities: PriorityTable,
    max_runs: usize,
    state: Mutex<QueueState>,
    idle: Notify,
}

impl Scheduler {
    pub fn new(config: &ContainerConfig) -> Arc<Self> {
        Arc::new(Self {
            priorities: config.priorities,
            max_runs: config.max_runs_per_drain,
            state: Mutex::new(QueueState::default()),
            idle: Notify::new(),
        })
    }

    /// Queue a chore, coalescing with an existing one for the same key.
    pub fn schedule(&self, chore: Chore) {
        let mut state = self.state.lock();
        let existing = state
            .pending
            .get(&chore.key)
            .or_else(|| state.running.get(&chore.key))
            .map(|existing| existing.runnable.clone());
        if let Some(runnable) = existing {
            if let (Some(current), Some(requested)) = (&runnable, &chore.runnable) {
                if current != requested {
                    let violation = format!(
                        "{} scheduled with `{requested}` while `{current}` is queued",
                        chore.key
                    );
                    tracing::error!(%violation, "conflicting chore payloads");
                    state.violations.push(violation);
                    return;
                }
            }
            state.coalesced += 1;
            if state.running.contains_key(&chore.key) {
                tracing::trace!(key = %chore.key, "chore running, follow-up run queued");
                state.rerun.insert(chore.key.clone(), chore);
            } else {
                tracing::trace!(key = %chore.key, "chore already pending");
            }
            return;
        }
        self.enqueue(&mut state, chore);
    }

    fn enqueue(&self, state: &mut QueueState, mut chore: Chore) {
        state.seq += 1;
        chore.seq = state.seq;
        let value = self.priorities.value(chore.priority());
        state.order.insert((value, chore.seq), chore.key.clone());
        tracing::trace!(key = %chore.key, seq = chore.seq, "chore queued");
        state.pending.insert(chore.key.clone(), chore);
    }

    /// Drop pending chores (and queued follow-ups) hosted by `hosts`.
    pub fn cancel_hosts(&self, hosts: &HashSet<NodeId>) -> usize {
        if hosts.is_empty() {
            return 0;
        }
        let mut state = self.state.lock();
        let doomed: Vec<ChoreKey> = state
            .pending
            .values()
            .filter(|chore| chore.host.is_some_and(|host| hosts.contains(&host)))
            .map(|chore| chore.key.clone())
            .collect();
        for key in &doomed {
            if let Some(chore) = state.pending.remove(key) {
                let value = self.priorities.value(chore.priority());
                state.order.remove(&(value, chore.seq));
            }
        }
        state
            .rerun
            .retain(|_, chore| !chore.host.is_some_and(|host| hosts.contains(&host)));
        state.totals.cancelled += doomed.len();
        if !doomed.is_empty() {
            tracing::debug!(cancelled = doomed.len(), "pruned chores of removed hosts");
        }
        doomed.len()
    }

    /// Pending chores in drain order.
    pub fn pending_chores(&self) -> Vec<Chore> {
        let state = self.state.lock();
        state
            .order
            .values()
            .filter_map(|key| state.pending.get(key).cloned())
            .collect()
    }

    /// Chores that are running or suspended.
    pub fn running_chores(&self) -> Vec<Chore> {
        self.state.lock().running.values().cloned().collect()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.pending.is_empty() && state.running.is_empty()
    }

    /// Number of schedule requests absorbed by an existing chore.
    pub fn coalesced_count(&self) -> usize {
        self.state.lock().coalesced
    }

    /// Counters accumulated over every drain.
    pub fn totals(&self) -> DrainStats {
        self.state.lock().totals
    }

    /// Run chores until the queue and the in-flight set are empty.
    pub async fn drain(&self, runner: &dyn ChoreRunner) -> Result<DrainStats> {
        self.drain_inner(runner, None).await
    }

    /// Run chores of tier `priority` or lower, leaving later tiers queued.
    pub async fn drain_until(&self, priority: Priority, runner: &dyn ChoreRunner) -> Result<DrainStats> {
        let limit = self.priorities.value(priority);
        self.drain_inner(runner, Some(limit)).await
    }

    async fn drain_inner(&self, runner: &dyn ChoreRunner, limit: Option<u8>) -> Result<DrainStats> {
        if IN_CHORE.with(Cell::get) {
            return Err(CoreError::RecursiveDrain);
        }
        self.acquire().await;
        let _slot = DrainSlot(self);

        tracing::debug!(pending = self.state.lock().pending.len(), "drain started");
        let mut stats = DrainStats::default();
        let mut errors = Vec::new();
        let mut in_flight = FuturesUnordered::new();

        let result = loop {
            if let Some(violation) = self.take_violations() {
                break Err(CoreError::SchedulerIntegrity(violation));
            }
            if let Some(chore) = self.pop_next(limit) {
                if chore.host.is_some_and(|host| !runner.is_live(host)) {
                    tracing::trace!(key = %chore.key, "skipping chore of removed host");
                    stats.cancelled += 1;
                    continue;
                }
                stats.runs += 1;
                if stats.runs > self.max_runs {
                    self.state.lock().pending.insert(chore.key.clone(), chore);
                    tracing::error!(limit = self.max_runs, "chore loop detected");
                    break Err(CoreError::SchedulerIntegrity(format!(
                        "more than {} chore runs in one drain",
                        self.max_runs
                    )));
                }
                self.state
                    .lock()
                    .running
                    .insert(chore.key.clone(), chore.clone());

                let outcome = {
                    let span = tracing::debug_span!("chore", kind = ?chore.kind(), key = %chore.key);
                    let _enter = span.enter();
                    let _guard = InChoreGuard::enter();
                    runner.run(&chore)
                };
                match outcome {
                    ChoreOutcome::Done(result) => {
                        self.finish(chore, result, runner, &mut stats, &mut errors);
                    }
                    ChoreOutcome::Pending(future) => {
                        tracing::trace!(key = %chore.key, "chore suspended");
                        stats.suspended += 1;
                        in_flight.push(InFlight { chore, future });
                    }
                }
                continue;
            }
            match in_flight.next().await {
                Some((chore, result)) => self.finish(chore, result, runner, &mut stats, &mut errors),
                None => break Ok(()),
            }
        };

        if result.is_err() {
            let mut state = self.state.lock();
            for suspended in in_flight.iter() {
                state.running.remove(&suspended.chore.key);
                state.rerun.remove(&suspended.chore.key);
                stats.cancelled += 1;
                tracing::debug!(key = %suspended.chore.key, "suspended chore dropped with the drain");
            }
        }
        // The pending entry of a looping chore was re-inserted above without
        // an order slot; give it one.
        self.reindex();
        self.state.lock().totals.absorb(&stats);

        tracing::debug!(
            runs = stats.runs,
            completed = stats.completed,
            failed = stats.failed,
            suspended = stats.suspended,
            cancelled = stats.cancelled,
            "drain finished"
        );
        result?;
        let mut errors = errors.into_iter();
        match errors.next() {
            Some(first) => {
                for other in errors {
                    tracing::warn!(error = %other, "additional unhandled chore error");
                }
                Err(first)
            }
            None => Ok(stats),
        }
    }

    async fn acquire(&self) {
        loop {
            let mut notified = std::pin::pin!(self.idle.notified());
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if !state.draining {
                    state.draining = true;
                    return;
                }
            }
            tracing::trace!("waiting for active drain");
            notified.await;
        }
    }

    fn pop_next(&self, limit: Option<u8>) -> Option<Chore> {
        let mut state = self.state.lock();
        let (&(value, seq), _) = state.order.iter().next()?;
        if limit.is_some_and(|limit| value > limit) {
            return None;
        }
        let key = state.order.remove(&(value, seq))?;
        state.pending.remove(&key)
    }

    fn take_violations(&self) -> Option<String> {
        let mut state = self.state.lock();
        if state.violations.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut state.violations).join("; "))
    }

    fn reindex(&self) {
        let mut state = self.state.lock();
        let indexed: HashSet<ChoreKey> = state.order.values().cloned().collect();
        let orphans: Vec<Chore> = state
            .pending
            .values()
            .filter(|chore| !indexed.contains(&chore.key))
            .cloned()
            .collect();
        for chore in orphans {
            state.pending.remove(&chore.key);
            self.enqueue(&mut state, chore);
        }
    }

    fn finish(
        &self,
        chore: Chore,
        result: Result<()>,
        runner: &dyn ChoreRunner,
        stats: &mut DrainStats,
        errors: &mut Vec<CoreError>,
    ) {
        let follow_up = {
            let mut state = self.state.lock();
            state.running.remove(&chore.key);
            state.rerun.remove(&chore.key)
        };
        if chore.host.is_some_and(|host| !runner.is_live(host)) {
            tracing::warn!(key = %chore.key, "completion for removed host ignored");
            stats.cancelled += 1;
            return;
        }
        match result {
            Ok(()) => stats.completed += 1,
            Err(error) => {
                stats.failed += 1;
                tracing::warn!(key = %chore.key, %error, "chore failed");
                if let Err(error) = runner.handle_error(&chore, error) {
                    errors.push(error);
                }
            }
        }
        if let Some(next) = follow_up {
            self.schedule(next);
        }
    }
}

/// Releases the drain slot, including when the drain future is dropped.
struct DrainSlot<'a>(&'a Scheduler);

impl Drop for DrainSlot<'_> {
    fn drop(&mut self) {
        self.0.state.lock().draining = false;
        self.0.idle.notify_waiters();
    }
}

struct InChoreGuard {
    previous: bool,
}

impl InChoreGuard {
    fn enter() -> Self {
        let previous = IN_CHORE.with(|flag| flag.replace(true));
        Self { previous }
    }
}

impl Drop for InChoreGuard {
    fn drop(&mut self) {
        IN_CHORE.with(|flag| flag.set(self.previous));
    }
}

/// A suspended chore. Polling it counts as running inside the chore.
struct InFlight {
    chore: Chore,
    future: BoxFuture<'static, Result<()>>,
}

impl Future for InFlight {
    type Output = (Chore, Result<()>);

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let _guard = InChoreGuard::enter();
        let this = &mut *self;
        match this.future.as_mut().poll(cx) {
            Poll::Ready(result) => Poll::Ready((this.chore.clone(), result)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::TaskId;

    type Behavior = Box<dyn Fn(&Chore) -> ChoreOutcome + Send + Sync>;

    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
        behavior: Behavior,
        dead: Mutex<HashSet<NodeId>>,
        contain_errors: bool,
    }

    impl Recorder {
        fn new(behavior: impl Fn(&Chore) -> ChoreOutcome + Send + Sync + 'static) -> Self {
            Self {
                log: Arc::new(Mutex::new(Vec::new())),
                behavior: Box::new(behavior),
                dead: Mutex::new(HashSet::new()),
                contain_errors: false,
            }
        }

        fn ok() -> Self {
            Self::new(|_| ChoreOutcome::Done(Ok(())))
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().clone()
        }
    }

    impl ChoreRunner for Recorder {
        fn run(&self, chore: &Chore) -> ChoreOutcome {
            self.log.lock().push(label(chore));
            (self.behavior)(chore)
        }

        fn handle_error(&self, _chore: &Chore, error: CoreError) -> Result<()> {
            if self.contain_errors {
                Ok(())
            } else {
                Err(error)
            }
        }

        fn is_live(&self, host: NodeId) -> bool {
            !self.dead.lock().contains(&host)
        }
    }

    fn label(chore: &Chore) -> String {
        chore.runnable.as_deref().unwrap_or("?").to_string()
    }

    fn task_chore(kind: ChoreKind, id: TaskId, name: &str) -> Chore {
        Chore::new(kind, ChoreTarget::Task(id)).with_runnable(name)
    }

    fn node_ids(n: usize) -> Vec<NodeId> {
        let mut arena: slotmap::SlotMap<NodeId, ()> = slotmap::SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    fn scheduler() -> Arc<Scheduler> {
        Scheduler::new(&ContainerConfig::default())
    }

    #[tokio::test]
    async fn drains_by_tier_then_insertion() {
        let s = scheduler();
        s.schedule(task_chore(ChoreKind::VisibleTask, TaskId::new(), "visible"));
        s.schedule(task_chore(ChoreKind::Component, TaskId::new(), "render-1"));
        s.schedule(task_chore(ChoreKind::Task, TaskId::new(), "task"));
        s.schedule(task_chore(ChoreKind::Component, TaskId::new(), "render-2"));
        s.schedule(task_chore(ChoreKind::Cleanup, TaskId::new(), "cleanup"));

        let runner = Recorder::ok();
        let stats = s.drain(&runner).await.unwrap();
        assert_eq!(
            runner.log(),
            vec!["task", "render-1", "render-2", "visible", "cleanup"]
        );
        assert_eq!(stats.runs, 5);
        assert!(s.is_idle());
    }

    #[tokio::test]
    async fn pending_key_is_coalesced() {
        let s = scheduler();
        let id = TaskId::new();
        for _ in 0..5 {
            s.schedule(task_chore(ChoreKind::Task, id, "task"));
        }
        assert_eq!(s.pending_chores().len(), 1);
        assert_eq!(s.coalesced_count(), 4);

        let runner = Recorder::ok();
        s.drain(&runner).await.unwrap();
        assert_eq!(runner.log(), vec!["task"]);
    }

    #[tokio::test]
    async fn invalidation_while_running_queues_one_follow_up() {
        let s = scheduler();
        let id = TaskId::new();
        let reschedule = s.clone();
        let runs = Arc::new(Mutex::new(0));
        let runs_clone = runs.clone();
        let runner = Recorder::new(move |chore| {
            let mut runs = runs_clone.lock();
            *runs += 1;
            if *runs == 1 {
                reschedule.schedule(chore.clone());
                reschedule.schedule(chore.clone());
            }
            ChoreOutcome::Done(Ok(()))
        });

        s.schedule(task_chore(ChoreKind::Task, id, "task"));
        let stats = s.drain(&runner).await.unwrap();
        assert_eq!(*runs.lock(), 2);
        assert_eq!(stats.runs, 2);
    }

    #[tokio::test]
    async fn conflicting_payload_is_an_integrity_error() {
        let s = scheduler();
        let id = TaskId::new();
        s.schedule(task_chore(ChoreKind::Task, id, "first"));
        s.schedule(task_chore(ChoreKind::Task, id, "second"));

        let err = s.drain(&Recorder::ok()).await.unwrap_err();
        assert!(matches!(err, CoreError::SchedulerIntegrity(_)));
    }

    #[tokio::test]
    async fn suspended_chore_does_not_block_others() {
        let s = scheduler();
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let mut runner = Recorder::new(move |chore| {
            if label(chore) == "slow" {
                let log = log_clone.clone();
                ChoreOutcome::Pending(Box::pin(async move {
                    tokio::task::yield_now().await;
                    log.lock().push("slow done".to_string());
                    Ok(())
                }))
            } else {
                ChoreOutcome::Done(Ok(()))
            }
        });
        runner.log = log.clone();

        s.schedule(task_chore(ChoreKind::Task, TaskId::new(), "slow"));
        s.schedule(task_chore(ChoreKind::Task, TaskId::new(), "fast"));
        let stats = s.drain(&runner).await.unwrap();

        assert_eq!(*log.lock(), vec!["slow", "fast", "slow done"]);
        assert_eq!(stats.suspended, 1);
        assert_eq!(stats.completed, 2);
    }

    #[tokio::test]
    async fn drain_from_inside_a_chore_is_rejected() {
        let s = scheduler();
        let inner = s.clone();
        let outcome = Arc::new(Mutex::new(None));
        let outcome_clone = outcome.clone();
        let runner = Recorder::new(move |_| {
            let inner = inner.clone();
            let outcome = outcome_clone.clone();
            ChoreOutcome::Pending(Box::pin(async move {
                let result = inner.drain(&Recorder::ok()).await;
                *outcome.lock() = Some(result.map(|_| ()));
                Ok(())
            }))
        });

        s.schedule(task_chore(ChoreKind::Task, TaskId::new(), "outer"));
        s.drain(&runner).await.unwrap();
        assert_eq!(*outcome.lock(), Some(Err(CoreError::RecursiveDrain)));
    }

    #[tokio::test]
    async fn self_invalidating_chore_hits_the_loop_guard() {
        let config = ContainerConfig {
            max_runs_per_drain: 10,
            ..ContainerConfig::default()
        };
        let s = Scheduler::new(&config);
        let again = s.clone();
        let runner = Recorder::new(move |chore| {
            again.schedule(chore.clone());
            ChoreOutcome::Done(Ok(()))
        });

        s.schedule(task_chore(ChoreKind::Task, TaskId::new(), "loop"));
        let err = s.drain(&runner).await.unwrap_err();
        assert!(matches!(err, CoreError::SchedulerIntegrity(_)));
        assert_eq!(runner.log().len(), 10);
    }

    #[tokio::test]
    async fn aborted_drain_forgets_suspended_follow_ups() {
        let s = scheduler();
        let slow = TaskId::new();
        let other = TaskId::new();
        let again = s.clone();
        let runner = Recorder::new(move |chore| {
            again.schedule(chore.clone());
            again.schedule(task_chore(ChoreKind::Task, other, "first"));
            again.schedule(task_chore(ChoreKind::Task, other, "second"));
            ChoreOutcome::Pending(Box::pin(futures_util::future::pending::<Result<()>>()))
        });

        s.schedule(task_chore(ChoreKind::Task, slow, "slow"));
        let err = s.drain(&runner).await.unwrap_err();
        assert!(matches!(err, CoreError::SchedulerIntegrity(_)));
        assert!(s.running_chores().is_empty());
        assert_eq!(s.totals().cancelled, 1);

        s.schedule(task_chore(ChoreKind::Task, slow, "slow"));
        let runner = Recorder::ok();
        s.drain(&runner).await.unwrap();
        assert_eq!(runner.log(), vec!["first", "slow"]);
    }

    #[tokio::test]
    async fn failures_do_not_block_independent_chores() {
        let s = scheduler();
        let runner = Recorder::new(|chore| {
            if label(chore) == "bad" {
                ChoreOutcome::Done(Err(CoreError::msg("boom")))
            } else {
                ChoreOutcome::Done(Ok(()))
            }
        });

        s.schedule(task_chore(ChoreKind::Task, TaskId::new(), "bad"));
        s.schedule(task_chore(ChoreKind::Task, TaskId::new(), "good"));
        let err = s.drain(&runner).await.unwrap_err();
        assert_eq!(err, CoreError::msg("boom"));
        assert_eq!(runner.log(), vec!["bad", "good"]);
        assert_eq!(s.totals().failed, 1);
    }

    #[tokio::test]
    async fn contained_errors_do_not_fail_the_drain() {
        let s = scheduler();
        let mut runner = Recorder::new(|_| ChoreOutcome::Done(Err(CoreError::msg("boom"))));
        runner.contain_errors = true;
        s.schedule(task_chore(ChoreKind::Task, TaskId::new(), "bad"));
        let stats = s.drain(&runner).await.unwrap();
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn cancelled_hosts_are_pruned_and_skipped() {
        let s = scheduler();
        let nodes = node_ids(3);
        s.schedule(Chore::component(nodes[0], "a"));
        s.schedule(Chore::component(nodes[1], "b"));
        s.schedule(Chore::component(nodes[2], "c"));

        let removed: HashSet<NodeId> = [nodes[0]].into_iter().collect();
        assert_eq!(s.cancel_hosts(&removed), 1);

        let runner = Recorder::ok();
        runner.dead.lock().insert(nodes[1]);
        let stats = s.drain(&runner).await.unwrap();
        assert_eq!(runner.log(), vec!["c"]);
        assert_eq!(stats.cancelled, 1);
    }

    #[tokio::test]
    async fn partial_flush_leaves_later_tiers_queued() {
        let s = scheduler();
        s.schedule(task_chore(ChoreKind::VisibleTask, TaskId::new(), "visible"));
        s.schedule(task_chore(ChoreKind::Component, TaskId::new(), "render"));

        let runner = Recorder::ok();
        s.drain_until(Priority::Render, &runner).await.unwrap();
        assert_eq!(runner.log(), vec!["render"]);
        assert_eq!(s.pending_chores().len(), 1);

        s.drain(&runner).await.unwrap();
        assert_eq!(runner.log(), vec!["render", "visible"]);
    }

    #[tokio::test]
    async fn concurrent_drains_serialize() {
        let s = scheduler();
        s.schedule(task_chore(ChoreKind::Task, TaskId::new(), "one"));
        s.schedule(task_chore(ChoreKind::Task, TaskId::new(), "two"));

        let runner = Recorder::ok();
        let (a, b) = tokio::join!(s.drain(&runner), s.drain(&runner));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(runner.log(), vec!["one", "two"]);
    }
}
