//! The store: one serialized reduce loop, a state publisher, and the glue
//! to the effect runtime.
//!
//! A [`Store`] owns the state, the root reducer, and the effects bundle.
//! [`Store::start`] spawns the single reduction worker: an unbounded
//! channel drained one message at a time, which reproduces the "exactly one
//! reduce in flight" guarantee without relying on thread affinity. External
//! callers and effect-result deliveries push into the same channel, so a
//! result can never interleave with a reduce call in progress.
//!
//! # Usage
//!
//! ```ignore
//! let store = Store::new(AppState::default(), app_reducer, effects_bundle);
//! let handle = store.start();
//!
//! let _watch = handle.subscribe(|state: &AppState| {
//!     println!("count = {}", state.count);
//! });
//!
//! handle.send(AppAction::Increment);
//! let count = handle.with_state(|s| s.count).await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, trace};
use uuid::Uuid;

use crate::error::StoreError;
use crate::reducer::Reducer;
use crate::runtime::EffectRuntime;

/// Messages drained by the reduction worker, one at a time.
pub(crate) enum StoreMessage<S, A> {
    /// An action to reduce — from an external caller or an effect result.
    Action(A),
    /// A read-only visit of the current state, serialized with reduction.
    Query(Box<dyn FnOnce(&S) + Send>),
}

// =============================================================================
// State publisher
// =============================================================================

struct Subscriber<S> {
    id: Uuid,
    alive: Arc<AtomicBool>,
    on_change: Box<dyn Fn(&S) + Send>,
}

/// Guard for a state subscription.
///
/// Dropping the guard invalidates the subscriber entry; the publisher skips
/// and compacts invalidated entries on the next publish, so no explicit
/// unsubscription call is needed.
pub struct StateSubscription {
    id: Uuid,
    alive: Arc<AtomicBool>,
}

impl StateSubscription {
    /// Token identifying this subscriber (for debugging).
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for StateSubscription {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// Registry of state-change subscribers.
///
/// Entries are held by non-owning liveness flags shared with
/// [`StateSubscription`] guards; dead entries are compacted on publish.
struct Publisher<S> {
    subscribers: Arc<Mutex<Vec<Subscriber<S>>>>,
}

impl<S> Clone for Publisher<S> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<S> Publisher<S> {
    fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber<S>>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            // A subscriber callback panicked mid-publish; the registry
            // itself is still structurally sound.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn subscribe(&self, on_change: impl Fn(&S) + Send + 'static) -> StateSubscription {
        let id = Uuid::new_v4();
        let alive = Arc::new(AtomicBool::new(true));
        self.lock().push(Subscriber {
            id,
            alive: Arc::clone(&alive),
            on_change: Box::new(on_change),
        });
        StateSubscription { id, alive }
    }

    /// Notify live subscribers and compact dead ones.
    fn publish(&self, state: &S) {
        let mut subscribers = self.lock();
        subscribers.retain(|s| s.alive.load(Ordering::SeqCst));
        for subscriber in subscribers.iter() {
            (subscriber.on_change)(state);
        }
    }

    fn len(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|s| s.alive.load(Ordering::SeqCst));
        subscribers.len()
    }
}

// =============================================================================
// Store
// =============================================================================

/// Owns initial state, root reducer, and effects bundle until started.
///
/// The root reducer must close the loop: its `Output` equals its `Action`,
/// so follow-up actions produced by effects feed back into the same reduce
/// loop.
pub struct Store<R: Reducer> {
    state: R::State,
    reducer: R,
    effects_bundle: R::Effects,
}

impl<S, A, E, R> Store<R>
where
    R: Reducer<State = S, Action = A, Effects = E, Output = A> + 'static,
    S: Send + 'static,
    A: Send + 'static,
    E: Send + 'static,
{
    /// Create a store. Nothing runs until [`Store::start`].
    pub fn new(state: S, reducer: R, effects_bundle: E) -> Self {
        Self {
            state,
            reducer,
            effects_bundle,
        }
    }

    /// Spawn the reduction worker and return the handle for talking to it.
    pub fn start(self) -> StoreHandle<S, A> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<StoreMessage<S, A>>();

        let feedback = sender.clone();
        let effects = EffectRuntime::new(move |action| {
            feedback.send(StoreMessage::Action(action)).is_ok()
        });

        let publisher = Publisher::new();

        let worker_effects = effects.clone();
        let worker_publisher = publisher.clone();
        let Store {
            mut state,
            reducer,
            effects_bundle,
        } = self;

        let worker = tokio::spawn(async move {
            info!("store worker starting");
            while let Some(message) = receiver.recv().await {
                match message {
                    StoreMessage::Action(action) => {
                        let fx = reducer.reduce(&mut state, action, &effects_bundle);
                        worker_publisher.publish(&state);
                        if !fx.is_empty() {
                            trace!(
                                one_shots = fx.one_shot_count(),
                                "materializing declared effects"
                            );
                            worker_effects.materialize(fx);
                        }
                    }
                    StoreMessage::Query(visit) => visit(&state),
                }
            }
            trace!("store worker stopped; channel closed");
        });

        StoreHandle {
            sender,
            worker,
            effects,
            publisher,
        }
    }
}

/// Handle to a running store.
///
/// `send` is fire-and-forget with no backpressure; `with_state` rides the
/// same serialized channel, so a query observes the state exactly between
/// two reduce calls.
pub struct StoreHandle<S, A> {
    sender: mpsc::UnboundedSender<StoreMessage<S, A>>,
    worker: JoinHandle<()>,
    effects: EffectRuntime<A>,
    publisher: Publisher<S>,
}

impl<S, A> StoreHandle<S, A>
where
    S: Send + 'static,
    A: Send + 'static,
{
    /// Enqueue an action into the serialized reduction channel.
    ///
    /// Fire-and-forget: an action sent after shutdown is silently dropped,
    /// matching the stale-action policy everywhere else in the core.
    pub fn send(&self, action: A) {
        let _ = self.sender.send(StoreMessage::Action(action));
    }

    /// Visit the current state on the worker, returning a mapped value.
    pub async fn with_state<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StoreMessage::Query(Box::new(move |state| {
                let _ = tx.send(f(state));
            })))
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    /// Register a state-change callback.
    ///
    /// The callback runs on the worker after every committed reduce call.
    /// Dropping the returned guard unsubscribes; no explicit call needed.
    #[must_use = "dropping the subscription guard unsubscribes immediately"]
    pub fn subscribe(&self, on_change: impl Fn(&S) + Send + 'static) -> StateSubscription {
        self.publisher.subscribe(on_change)
    }

    /// Number of live state subscribers (compacting as a side effect).
    pub fn subscriber_count(&self) -> usize {
        self.publisher.len()
    }

    /// The effect runtime shared with the worker, for observing and
    /// cancelling live subscriptions out of band.
    pub fn effects(&self) -> &EffectRuntime<A> {
        &self.effects
    }

    /// Stop the worker and cancel every live effect subscription.
    ///
    /// In-flight one-shots may still complete, but their results have
    /// nowhere to land once the channel closes.
    pub fn abort(&self) {
        self.effects.cancel_all();
        self.worker.abort();
    }
}

impl<S, A> std::fmt::Debug for StoreHandle<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("effects", &self.effects)
            .finish_non_exhaustive()
    }
}
