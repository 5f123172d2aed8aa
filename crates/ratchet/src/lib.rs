//! # Ratchet
//!
//! A unidirectional state-management core where reducers decide, effects
//! execute, and one serialized loop defines ordering.
//!
//! ## Core Concepts
//!
//! Ratchet separates **deciding** from **doing**:
//! - [`Reducer`] = Decisions (pure state mutation, declared effects)
//! - [`SideEffects`] = Intent (async work described, never executed inline)
//! - [`EffectRuntime`] = Execution (materializes descriptors, feeds results
//!   back as actions)
//!
//! The key principle: **one action, one reduce call, one committed state**.
//! Everything async happens after the commit and re-enters the loop as a
//! plain action.
//!
//! ## Architecture
//!
//! ```text
//! Caller                          Effect tasks
//!     │ send(action)                   │ deliver(action)
//!     ▼                                ▼
//! ┌─────────────── one mpsc channel ────────────────┐
//! └──────────────────────┬──────────────────────────┘
//!                        ▼ recv() one at a time
//!              Store worker
//!                        │
//!                        ├─► Reducer.reduce(&mut state, action, effects)
//!                        │        │
//!                        │        └─► SideEffects (descriptors)
//!                        │
//!                        ├─► Publisher.publish(&state)   (subscribers)
//!                        │
//!                        └─► EffectRuntime.materialize()
//!                                 │
//!                                 ├─► one-shots: spawn, map, deliver once
//!                                 └─► subscriptions: pump stream by id
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Reduction is pure** - no IO, no await, no failure path
//! 2. **Exactly one reduce in flight** - one worker drains one channel
//! 3. **Effects are descriptors** - declared during reduce, run after commit
//! 4. **Routing misses are no-ops** - stale indexes, keys, and absent slots
//!    vanish silently
//! 5. **Subscription identities are paths** - each composition layer
//!    prefixes a segment, so collection elements never collide
//! 6. **At-most-once follow-up** - a one-shot's transform runs exactly once
//!
//! ## Example
//!
//! ```ignore
//! use ratchet::{Reducer, SideEffects, Store, SubscriptionId};
//!
//! #[derive(Clone)]
//! enum CounterAction {
//!     Increment,
//!     Tick,
//!     StartTicking,
//! }
//!
//! struct CounterEffects {
//!     clock: std::sync::Arc<Clock>,
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = u64;
//!     type Action = CounterAction;
//!     type Effects = CounterEffects;
//!     type Output = CounterAction;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut u64,
//!         action: CounterAction,
//!         effects: &CounterEffects,
//!     ) -> SideEffects<CounterAction> {
//!         let mut fx = SideEffects::none();
//!         match action {
//!             CounterAction::Increment | CounterAction::Tick => *state += 1,
//!             CounterAction::StartTicking => fx.subscribe(
//!                 SubscriptionId::named("ticks"),
//!                 effects.clock.every_second(),
//!                 |_| CounterAction::Tick,
//!             ),
//!         }
//!         fx
//!     }
//! }
//!
//! let handle = Store::new(0u64, CounterReducer, counter_effects).start();
//! handle.send(CounterAction::StartTicking);
//! ```
//!
//! ## What This Is Not
//!
//! Ratchet is **not**:
//! - A UI framework (no views, no rendering)
//! - An event-sourcing engine (state is in memory, not a log)
//! - An actor framework (one loop, one state, no mailbox per entity)
//!
//! Ratchet **is**:
//! > A unidirectional state-management core where reducers decide, effects
//! > execute, and one serialized loop defines ordering.

// Core modules
mod binding;
mod compose;
mod effect;
mod error;
mod reducer;
mod runtime;
mod scope;
mod store;

// Synchronous test harness, also exported for downstream crates' tests
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export dependency scope types
pub use scope::{Capability, DependencyScope};

// Re-export action binding types
pub use binding::{ActionBinding, KeyedActionBinding};

// Re-export effect descriptor types
pub use effect::{key_hash, IdSegment, SideEffects, SubscriptionId};

// Re-export the reduction contract and chaining
pub use reducer::{CombineReducers, Reducer};

// Re-export the composition family
pub use compose::{
    Identified, IdentityReducer, IndexedReducer, KeyedReducer, LiftedReducer, OptionalReducer,
    ScopedReducer,
};

// Re-export the effect runtime
pub use runtime::EffectRuntime;

// Re-export store types (primary entry point)
pub use store::{StateSubscription, Store, StoreHandle};

// Re-export error types
pub use error::StoreError;
