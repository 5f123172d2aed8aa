//! Materializes side-effect containers: runs one-shots, pumps
//! subscriptions, and routes follow-up actions back into the store.
//!
//! Reduction declares; this module executes. The contract:
//!
//! 1. every one-shot is started concurrently, in declaration order, with no
//!    ordering guarantee between completions;
//! 2. a completed one-shot delivers exactly one follow-up action (or zero,
//!    if its transform yielded none);
//! 3. each subscription identity gets an independent pump task that
//!    delivers one action per emitted value until the stream ends or the
//!    identity is cancelled;
//! 4. cancellation stops delivery promptly and never affects unrelated
//!    identities;
//! 5. at most one pump is active per identity — starting under a live
//!    identity cancels the old pump before the new one is registered.
//!
//! Delivery goes through a single callback that feeds the store's
//! serialized action channel, so effect results interleave with external
//! sends rather than with a reduce call in progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::effect::{SideEffects, SubscriptionId, SubscriptionOp};

/// Delivery callback; returns `false` once the store is gone so pumps can
/// stop instead of emitting into the void.
type Deliver<A> = Arc<dyn Fn(A) -> bool + Send + Sync>;

/// A live subscription pump: a cancellation flag shared with the task, and
/// the task handle for prompt teardown.
struct SubscriptionHandle {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Signal cancellation synchronously, then abort the pump.
    ///
    /// The flag is set before the abort so a pump mid-delivery observes it;
    /// after this returns, no further values are delivered for the old
    /// identity.
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

/// Executes [`SideEffects`] containers against a delivery callback.
///
/// Cloning is cheap; clones share the live-subscription registry, which is
/// how a store handle can observe and cancel subscriptions started by the
/// worker.
pub struct EffectRuntime<A> {
    deliver: Deliver<A>,
    subscriptions: Arc<DashMap<SubscriptionId, SubscriptionHandle>>,
}

impl<A> Clone for EffectRuntime<A> {
    fn clone(&self) -> Self {
        Self {
            deliver: Arc::clone(&self.deliver),
            subscriptions: Arc::clone(&self.subscriptions),
        }
    }
}

impl<A: Send + 'static> EffectRuntime<A> {
    /// Create a runtime delivering follow-up actions through `deliver`.
    ///
    /// `deliver` must return `false` when the receiving side is gone.
    pub fn new(deliver: impl Fn(A) -> bool + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
            subscriptions: Arc::new(DashMap::new()),
        }
    }

    /// Execute every descriptor in the container.
    ///
    /// One-shots are spawned first, in declaration order; subscription ops
    /// (starts and cancels) are applied next, also in declaration order.
    pub fn materialize(&self, fx: SideEffects<A>) {
        for fut in fx.one_shots {
            let deliver = Arc::clone(&self.deliver);
            tokio::spawn(async move {
                if let Some(action) = fut.await {
                    let _ = deliver(action);
                }
            });
        }
        for (id, op) in fx.subscriptions {
            match op {
                SubscriptionOp::Start(stream) => self.start(id, stream),
                SubscriptionOp::Cancel => self.cancel(&id),
                SubscriptionOp::CancelScope => self.cancel_scope(&id),
            }
        }
    }

    /// Cancel the pump under `id`, if one is live.
    pub fn cancel(&self, id: &SubscriptionId) {
        if let Some((_, handle)) = self.subscriptions.remove(id) {
            handle.cancel();
            debug!(id = ?id, "subscription cancelled");
        }
    }

    /// Cancel every live pump whose identity starts with `prefix`.
    ///
    /// This is the removed-child guarantee: a parent that drops a child
    /// cancels the child's whole identity scope in one call.
    pub fn cancel_scope(&self, prefix: &SubscriptionId) {
        self.subscriptions.retain(|id, handle| {
            if id.starts_with(prefix) {
                handle.cancel();
                debug!(id = ?id, prefix = ?prefix, "subscription cancelled by scope");
                false
            } else {
                true
            }
        });
    }

    /// Cancel every live pump. Called on store shutdown.
    pub fn cancel_all(&self) {
        self.subscriptions.retain(|_, handle| {
            handle.cancel();
            false
        });
    }

    /// Whether a pump is live under `id`.
    pub fn is_active(&self, id: &SubscriptionId) -> bool {
        self.subscriptions.contains_key(id)
    }

    /// Number of live pumps (for debugging and tests).
    pub fn active_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn start(&self, id: SubscriptionId, mut stream: futures::stream::BoxStream<'static, A>) {
        // Replace-and-cancel: the old pump must be dead before the new one
        // is registered, so at most one pump is ever active per identity.
        if let Some((_, old)) = self.subscriptions.remove(&id) {
            old.cancel();
            debug!(id = ?id, "subscription replaced; prior pump cancelled");
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let deliver = Arc::clone(&self.deliver);
        let pump_id = id.clone();
        let task = tokio::spawn(async move {
            while let Some(action) = stream.next().await {
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                if !deliver(action) {
                    break;
                }
            }
            trace!(id = ?pump_id, "subscription pump ended");
        });

        self.subscriptions
            .insert(id, SubscriptionHandle { cancelled, task });
    }
}

impl<A> std::fmt::Debug for EffectRuntime<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRuntime")
            .field("active_subscriptions", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::IdSegment;
    use futures::stream;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn runtime_with_channel() -> (EffectRuntime<u32>, mpsc::UnboundedReceiver<u32>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = EffectRuntime::new(move |action| tx.send(action).is_ok());
        (runtime, rx)
    }

    /// A stream that yields `base`, `base + 1`, ... forever, one per poll
    /// gap, so tests can observe pumps that never end on their own.
    fn counting_stream(base: u32) -> impl futures::Stream<Item = u32> + Send {
        stream::unfold(base, |n| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Some((n, n + 1))
        })
    }

    #[tokio::test]
    async fn one_shots_deliver_their_actions() {
        let (runtime, mut rx) = runtime_with_channel();

        let mut fx = SideEffects::none();
        fx.run(async { 1u32 }, Some);
        fx.run(async { 2u32 }, Some);
        runtime.materialize(fx);

        let mut got = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        got.sort_unstable();
        assert_eq!(got, vec![1, 2]);
    }

    #[tokio::test]
    async fn one_shot_yielding_none_delivers_nothing() {
        let (runtime, mut rx) = runtime_with_channel();

        let mut fx = SideEffects::none();
        fx.run(async { 1u32 }, |_| None);
        runtime.materialize(fx);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscription_pumps_until_stream_ends() {
        let (runtime, mut rx) = runtime_with_channel();

        let mut fx = SideEffects::none();
        fx.subscribe(
            SubscriptionId::named("finite"),
            stream::iter([10u32, 11, 12]),
            |v| v,
        );
        runtime.materialize(fx);

        assert_eq!(rx.recv().await, Some(10));
        assert_eq!(rx.recv().await, Some(11));
        assert_eq!(rx.recv().await, Some(12));

        // Finished pump stays registered until cancelled or replaced; the
        // registry tracks identities, not liveness of the underlying task.
        assert!(runtime.is_active(&SubscriptionId::named("finite")));
    }

    #[tokio::test]
    async fn cancel_stops_delivery_promptly() {
        let (runtime, mut rx) = runtime_with_channel();
        let id = SubscriptionId::named("ticker");

        let mut fx = SideEffects::none();
        fx.subscribe(id.clone(), counting_stream(0), |v| v);
        runtime.materialize(fx);

        // Let a few values through, then cancel.
        let first = rx.recv().await.unwrap();
        runtime.cancel(&id);
        assert!(!runtime.is_active(&id));

        // Drain anything already in flight, then confirm silence.
        tokio::time::sleep(Duration::from_millis(30)).await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err(), "cancelled pump kept delivering");
        assert!(first < 10);
    }

    #[tokio::test]
    async fn replacing_an_identity_cancels_the_prior_pump() {
        let (runtime, mut rx) = runtime_with_channel();
        let id = SubscriptionId::named("feed");

        let mut fx = SideEffects::none();
        fx.subscribe(id.clone(), counting_stream(0), |v| v);
        runtime.materialize(fx);
        let _ = rx.recv().await.unwrap();

        // Replace with a pump emitting from a distant base.
        let mut fx = SideEffects::none();
        fx.subscribe(id.clone(), counting_stream(1_000), |v| v);
        runtime.materialize(fx);
        assert_eq!(runtime.active_count(), 1);

        // After the swap settles, only the new pump's values arrive.
        tokio::time::sleep(Duration::from_millis(30)).await;
        while let Ok(v) = rx.try_recv() {
            let _ = v; // drain the transition window
        }
        let settled = rx.recv().await.unwrap();
        assert!(settled >= 1_000, "old pump delivered after replacement: {settled}");
    }

    #[tokio::test]
    async fn cancel_scope_only_touches_the_prefix() {
        let (runtime, mut rx) = runtime_with_channel();

        let row0 = SubscriptionId::named("watch").prefixed(IdSegment::Index(0));
        let row1 = SubscriptionId::named("watch").prefixed(IdSegment::Index(1));

        let mut fx = SideEffects::none();
        fx.subscribe(row0.clone(), counting_stream(0), |v| v);
        fx.subscribe(row1.clone(), counting_stream(5_000), |v| v);
        runtime.materialize(fx);
        let _ = rx.recv().await.unwrap();

        let prefix = SubscriptionId::default().prefixed(IdSegment::Index(0));
        runtime.cancel_scope(&prefix);

        assert!(!runtime.is_active(&row0));
        assert!(runtime.is_active(&row1));

        // Only the surviving row keeps delivering.
        tokio::time::sleep(Duration::from_millis(30)).await;
        while rx.try_recv().is_ok() {}
        let v = rx.recv().await.unwrap();
        assert!(v >= 5_000);
    }

    #[tokio::test]
    async fn cancel_all_empties_the_registry() {
        let (runtime, _rx) = runtime_with_channel();

        let mut fx = SideEffects::none();
        fx.subscribe(SubscriptionId::named("a"), counting_stream(0), |v| v);
        fx.subscribe(SubscriptionId::named("b"), counting_stream(0), |v| v);
        runtime.materialize(fx);
        assert_eq!(runtime.active_count(), 2);

        runtime.cancel_all();
        assert_eq!(runtime.active_count(), 0);
    }

    #[tokio::test]
    async fn container_level_cancel_op_reaches_the_registry() {
        let (runtime, mut rx) = runtime_with_channel();
        let id = SubscriptionId::named("ticker");

        let mut fx = SideEffects::none();
        fx.subscribe(id.clone(), counting_stream(0), |v| v);
        runtime.materialize(fx);
        let _ = rx.recv().await.unwrap();

        // A later reduce pass declares the cancellation.
        let mut fx = SideEffects::<u32>::none();
        fx.cancel(id.clone());
        runtime.materialize(fx);

        assert!(!runtime.is_active(&id));
    }
}
