//! Synchronous test harness for reducers.
//!
//! [`TestStore`] drives a reducer without a running worker or effect
//! runtime: `send` reduces in place and records the produced container,
//! `drain_effects` runs recorded one-shots to completion on the current
//! task and collects their follow-up actions. Subscription descriptors
//! are exposed as identities for assertion rather than executed, keeping
//! reducer tests deterministic.
//!
//! ```ignore
//! let mut store = TestStore::new(AppState::default(), app_reducer, bundle);
//! store.send(AppAction::Refresh);
//! assert_eq!(store.state().status, Status::Loading);
//!
//! let follow_ups = store.drain_effects().await;
//! assert_eq!(follow_ups, vec![AppAction::Refreshed(data)]);
//! ```

use crate::effect::{SideEffects, SubscriptionId, SubscriptionOp};
use crate::reducer::Reducer;

/// Drives a reducer synchronously, recording declared effects instead of
/// materializing them.
pub struct TestStore<R: Reducer> {
    state: R::State,
    reducer: R,
    effects_bundle: R::Effects,
    recorded: SideEffects<R::Output>,
}

impl<R: Reducer> TestStore<R> {
    pub fn new(state: R::State, reducer: R, effects_bundle: R::Effects) -> Self {
        Self {
            state,
            reducer,
            effects_bundle,
            recorded: SideEffects::none(),
        }
    }

    /// Reduce one action in place, accumulating its declared effects.
    pub fn send(&mut self, action: R::Action) {
        let fx = self
            .reducer
            .reduce(&mut self.state, action, &self.effects_bundle);
        self.recorded.merge(fx);
    }

    /// The current state.
    pub fn state(&self) -> &R::State {
        &self.state
    }

    /// Number of recorded one-shots not yet drained.
    pub fn pending_one_shots(&self) -> usize {
        self.recorded.one_shot_count()
    }

    /// Identities of subscriptions the recorded containers would start.
    pub fn subscription_starts(&self) -> Vec<SubscriptionId> {
        self.recorded.subscription_starts()
    }

    /// Identities the recorded containers would cancel (exact, not scoped).
    pub fn subscription_cancels(&self) -> Vec<SubscriptionId> {
        self.recorded
            .subscriptions
            .iter()
            .filter(|(_, op)| matches!(op, SubscriptionOp::Cancel))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Run every recorded one-shot to completion on the current task and
    /// return the follow-up actions in declaration order.
    ///
    /// Follow-ups are returned, not re-reduced; feed them back with `send`
    /// when a test wants to walk the full loop step by step.
    pub async fn drain_effects(&mut self) -> Vec<R::Output> {
        let one_shots = std::mem::take(&mut self.recorded.one_shots);
        let mut follow_ups = Vec::with_capacity(one_shots.len());
        for one_shot in one_shots {
            if let Some(action) = one_shot.await {
                follow_ups.push(action);
            }
        }
        follow_ups
    }

    /// Discard recorded subscription operations, keeping one-shots.
    pub fn clear_subscription_ops(&mut self) {
        self.recorded.subscriptions.clear();
    }
}
