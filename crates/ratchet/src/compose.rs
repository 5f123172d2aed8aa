//! The composition family: lifting a child reducer into a parent shape.
//!
//! All variants share one skeleton — *extract → delegate → reinject*:
//!
//! 1. extract the child action from the parent action via a binding; a miss
//!    means the action was addressed elsewhere and the reducer no-ops;
//! 2. project the parent state and effects bundle down to the child's
//!    shapes and delegate to the child reducer;
//! 3. remap the child's side-effect container back into the parent's action
//!    type (and, for collections, scope subscription identities under the
//!    element's key).
//!
//! Routing misses — an action whose binding does not match, an index out of
//! bounds, a missing key, an absent optional slot — are always silent
//! no-ops, never errors. They arise naturally from concurrent removal and
//! stale in-flight actions, and letting them vanish is what allows many
//! sibling compositions to be chained without a dispatch table.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tracing::trace;

use crate::binding::{ActionBinding, KeyedActionBinding};
use crate::effect::{key_hash, IdSegment, SideEffects};
use crate::reducer::Reducer;

type StateLens<P, C> = dyn for<'a> Fn(&'a mut P) -> &'a mut C + Send + Sync;
type OptionLens<P, C> = dyn for<'a> Fn(&'a mut P) -> Option<&'a mut C> + Send + Sync;
type EffectsLens<P, C> = dyn Fn(&P) -> C + Send + Sync;

/// An element that carries its own identity, for [`IdentityReducer`].
pub trait Identified {
    /// The identity type, stable for the element's lifetime.
    type Id: Hash + Eq + Clone + Send + Sync + 'static;

    /// This element's identity.
    fn id(&self) -> Self::Id;
}

// =============================================================================
// Property (single child, always present)
// =============================================================================

/// Runs a child reducer against a fixed field of the parent state.
pub struct ScopedReducer<R: Reducer, PState, PAction, PEffects> {
    child: R,
    state_lens: Arc<StateLens<PState, R::State>>,
    effects_lens: Arc<EffectsLens<PEffects, R::Effects>>,
    binding: ActionBinding<PAction, R::Action>,
}

impl<R: Reducer, PState, PAction, PEffects> ScopedReducer<R, PState, PAction, PEffects> {
    pub fn new(
        child: R,
        state_lens: impl for<'a> Fn(&'a mut PState) -> &'a mut R::State + Send + Sync + 'static,
        effects_lens: impl Fn(&PEffects) -> R::Effects + Send + Sync + 'static,
        binding: ActionBinding<PAction, R::Action>,
    ) -> Self {
        Self {
            child,
            state_lens: Arc::new(state_lens),
            effects_lens: Arc::new(effects_lens),
            binding,
        }
    }
}

impl<CA, R, PState, PAction, PEffects> Reducer for ScopedReducer<R, PState, PAction, PEffects>
where
    R: Reducer<Action = CA, Output = CA>,
    CA: Send + 'static,
    PState: Send + 'static,
    PAction: Send + 'static,
    PEffects: Send + Sync,
{
    type State = PState;
    type Action = PAction;
    type Effects = PEffects;
    type Output = PAction;

    fn reduce(&self, state: &mut PState, action: PAction, effects: &PEffects) -> SideEffects<PAction> {
        let Some(child_action) = self.binding.extract(action) else {
            return SideEffects::none();
        };
        let child_effects = (self.effects_lens)(effects);
        let child_state = (self.state_lens)(state);
        let fx = self.child.reduce(child_state, child_action, &child_effects);
        let embed = self.binding.embed_fn();
        fx.map(move |a| embed(a))
    }
}

// =============================================================================
// Optional (child slot may be absent)
// =============================================================================

/// Like [`ScopedReducer`], but the child state slot may be absent.
///
/// An action addressed to an absent child is dropped: stale actions
/// referencing a since-cleared child arrive routinely and are never errors.
pub struct OptionalReducer<R: Reducer, PState, PAction, PEffects> {
    child: R,
    state_lens: Arc<OptionLens<PState, R::State>>,
    effects_lens: Arc<EffectsLens<PEffects, R::Effects>>,
    binding: ActionBinding<PAction, R::Action>,
}

impl<R: Reducer, PState, PAction, PEffects> OptionalReducer<R, PState, PAction, PEffects> {
    pub fn new(
        child: R,
        state_lens: impl for<'a> Fn(&'a mut PState) -> Option<&'a mut R::State> + Send + Sync + 'static,
        effects_lens: impl Fn(&PEffects) -> R::Effects + Send + Sync + 'static,
        binding: ActionBinding<PAction, R::Action>,
    ) -> Self {
        Self {
            child,
            state_lens: Arc::new(state_lens),
            effects_lens: Arc::new(effects_lens),
            binding,
        }
    }
}

impl<CA, R, PState, PAction, PEffects> Reducer for OptionalReducer<R, PState, PAction, PEffects>
where
    R: Reducer<Action = CA, Output = CA>,
    CA: Send + 'static,
    PState: Send + 'static,
    PAction: Send + 'static,
    PEffects: Send + Sync,
{
    type State = PState;
    type Action = PAction;
    type Effects = PEffects;
    type Output = PAction;

    fn reduce(&self, state: &mut PState, action: PAction, effects: &PEffects) -> SideEffects<PAction> {
        let Some(child_action) = self.binding.extract(action) else {
            return SideEffects::none();
        };
        let child_effects = (self.effects_lens)(effects);
        let Some(child_state) = (self.state_lens)(state) else {
            trace!("action addressed to absent optional child; dropped");
            return SideEffects::none();
        };
        let fx = self.child.reduce(child_state, child_action, &child_effects);
        let embed = self.binding.embed_fn();
        fx.map(move |a| embed(a))
    }
}

// =============================================================================
// Indexed collection
// =============================================================================

/// Runs a child reducer against one element of a `Vec`, addressed by index.
///
/// An out-of-bounds index is a no-op — the index may be stale because the
/// element was removed while the action was in flight. Follow-up actions are
/// re-embedded with the same index so replies route back to the same
/// element, and child subscription identities are scoped by that index.
pub struct IndexedReducer<R: Reducer, PState, PAction, PEffects> {
    child: R,
    state_lens: Arc<StateLens<PState, Vec<R::State>>>,
    effects_lens: Arc<EffectsLens<PEffects, R::Effects>>,
    binding: KeyedActionBinding<PAction, usize, R::Action>,
}

impl<R: Reducer, PState, PAction, PEffects> IndexedReducer<R, PState, PAction, PEffects> {
    pub fn new(
        child: R,
        state_lens: impl for<'a> Fn(&'a mut PState) -> &'a mut Vec<R::State> + Send + Sync + 'static,
        effects_lens: impl Fn(&PEffects) -> R::Effects + Send + Sync + 'static,
        binding: KeyedActionBinding<PAction, usize, R::Action>,
    ) -> Self {
        Self {
            child,
            state_lens: Arc::new(state_lens),
            effects_lens: Arc::new(effects_lens),
            binding,
        }
    }
}

impl<CA, R, PState, PAction, PEffects> Reducer for IndexedReducer<R, PState, PAction, PEffects>
where
    R: Reducer<Action = CA, Output = CA>,
    CA: Send + 'static,
    PState: Send + 'static,
    PAction: Send + 'static,
    PEffects: Send + Sync,
{
    type State = PState;
    type Action = PAction;
    type Effects = PEffects;
    type Output = PAction;

    fn reduce(&self, state: &mut PState, action: PAction, effects: &PEffects) -> SideEffects<PAction> {
        let Some((index, child_action)) = self.binding.extract(action) else {
            return SideEffects::none();
        };
        let child_effects = (self.effects_lens)(effects);
        let elements = (self.state_lens)(state);
        let Some(element) = elements.get_mut(index) else {
            trace!(index, len = elements.len(), "stale index; action dropped");
            return SideEffects::none();
        };
        let fx = self.child.reduce(element, child_action, &child_effects);
        let embed = self.binding.embed_fn();
        fx.scoped(IdSegment::Index(index), move |a| embed(index, a))
    }
}

// =============================================================================
// Keyed collection
// =============================================================================

/// Runs a child reducer against one entry of a `HashMap`, addressed by key.
///
/// A missing key is a no-op, for the same staleness reasons as
/// [`IndexedReducer`]. Child subscription identities are scoped by a hash
/// of the key.
pub struct KeyedReducer<R: Reducer, K, PState, PAction, PEffects> {
    child: R,
    state_lens: Arc<StateLens<PState, HashMap<K, R::State>>>,
    effects_lens: Arc<EffectsLens<PEffects, R::Effects>>,
    binding: KeyedActionBinding<PAction, K, R::Action>,
}

impl<R: Reducer, K, PState, PAction, PEffects> KeyedReducer<R, K, PState, PAction, PEffects> {
    pub fn new(
        child: R,
        state_lens: impl for<'a> Fn(&'a mut PState) -> &'a mut HashMap<K, R::State>
            + Send
            + Sync
            + 'static,
        effects_lens: impl Fn(&PEffects) -> R::Effects + Send + Sync + 'static,
        binding: KeyedActionBinding<PAction, K, R::Action>,
    ) -> Self {
        Self {
            child,
            state_lens: Arc::new(state_lens),
            effects_lens: Arc::new(effects_lens),
            binding,
        }
    }
}

impl<CA, R, K, PState, PAction, PEffects> Reducer for KeyedReducer<R, K, PState, PAction, PEffects>
where
    R: Reducer<Action = CA, Output = CA>,
    CA: Send + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
    PState: Send + 'static,
    PAction: Send + 'static,
    PEffects: Send + Sync,
{
    type State = PState;
    type Action = PAction;
    type Effects = PEffects;
    type Output = PAction;

    fn reduce(&self, state: &mut PState, action: PAction, effects: &PEffects) -> SideEffects<PAction> {
        let Some((key, child_action)) = self.binding.extract(action) else {
            return SideEffects::none();
        };
        let child_effects = (self.effects_lens)(effects);
        let entries = (self.state_lens)(state);
        let Some(entry) = entries.get_mut(&key) else {
            trace!("stale key; action dropped");
            return SideEffects::none();
        };
        let fx = self.child.reduce(entry, child_action, &child_effects);
        let embed = self.binding.embed_fn();
        let segment = IdSegment::Key(key_hash(&key));
        fx.scoped(segment, move |a| embed(key.clone(), a))
    }
}

// =============================================================================
// Identity-keyed collection
// =============================================================================

/// Runs a child reducer against the element of an ordered `Vec` whose own
/// identity matches the action's key.
///
/// The collection preserves insertion order across mutation; lookup is a
/// linear scan on [`Identified::id`]. A key matching no live element is a
/// no-op.
pub struct IdentityReducer<R, PState, PAction, PEffects>
where
    R: Reducer,
    R::State: Identified,
{
    child: R,
    state_lens: Arc<StateLens<PState, Vec<R::State>>>,
    effects_lens: Arc<EffectsLens<PEffects, R::Effects>>,
    binding: KeyedActionBinding<PAction, <R::State as Identified>::Id, R::Action>,
}

impl<R, PState, PAction, PEffects> IdentityReducer<R, PState, PAction, PEffects>
where
    R: Reducer,
    R::State: Identified,
{
    pub fn new(
        child: R,
        state_lens: impl for<'a> Fn(&'a mut PState) -> &'a mut Vec<R::State> + Send + Sync + 'static,
        effects_lens: impl Fn(&PEffects) -> R::Effects + Send + Sync + 'static,
        binding: KeyedActionBinding<PAction, <R::State as Identified>::Id, R::Action>,
    ) -> Self {
        Self {
            child,
            state_lens: Arc::new(state_lens),
            effects_lens: Arc::new(effects_lens),
            binding,
        }
    }
}

impl<CA, R, PState, PAction, PEffects> Reducer for IdentityReducer<R, PState, PAction, PEffects>
where
    R: Reducer<Action = CA, Output = CA>,
    R::State: Identified,
    CA: Send + 'static,
    PState: Send + 'static,
    PAction: Send + 'static,
    PEffects: Send + Sync,
{
    type State = PState;
    type Action = PAction;
    type Effects = PEffects;
    type Output = PAction;

    fn reduce(&self, state: &mut PState, action: PAction, effects: &PEffects) -> SideEffects<PAction> {
        let Some((id, child_action)) = self.binding.extract(action) else {
            return SideEffects::none();
        };
        let child_effects = (self.effects_lens)(effects);
        let elements = (self.state_lens)(state);
        let Some(element) = elements.iter_mut().find(|e| e.id() == id) else {
            trace!("no element with this identity; action dropped");
            return SideEffects::none();
        };
        let fx = self.child.reduce(element, child_action, &child_effects);
        let embed = self.binding.embed_fn();
        let segment = IdSegment::Key(key_hash(&id));
        fx.scoped(segment, move |a| embed(id.clone(), a))
    }
}

// =============================================================================
// Lift (action-only embedding, shared state)
// =============================================================================

/// Narrows the action vocabulary and effects bundle of a child reducer that
/// operates on the *same* state as its parent.
///
/// Useful for layering independent action vocabularies over one state
/// without inventing a state projection.
pub struct LiftedReducer<R: Reducer, PAction, PEffects> {
    child: R,
    effects_lens: Arc<EffectsLens<PEffects, R::Effects>>,
    binding: ActionBinding<PAction, R::Action>,
}

impl<R: Reducer, PAction, PEffects> LiftedReducer<R, PAction, PEffects> {
    pub fn new(
        child: R,
        effects_lens: impl Fn(&PEffects) -> R::Effects + Send + Sync + 'static,
        binding: ActionBinding<PAction, R::Action>,
    ) -> Self {
        Self {
            child,
            effects_lens: Arc::new(effects_lens),
            binding,
        }
    }
}

impl<CA, R, PAction, PEffects> Reducer for LiftedReducer<R, PAction, PEffects>
where
    R: Reducer<Action = CA, Output = CA>,
    CA: Send + 'static,
    PAction: Send + 'static,
    PEffects: Send + Sync,
{
    type State = R::State;
    type Action = PAction;
    type Effects = PEffects;
    type Output = PAction;

    fn reduce(
        &self,
        state: &mut R::State,
        action: PAction,
        effects: &PEffects,
    ) -> SideEffects<PAction> {
        let Some(child_action) = self.binding.extract(action) else {
            return SideEffects::none();
        };
        let child_effects = (self.effects_lens)(effects);
        let fx = self.child.reduce(state, child_action, &child_effects);
        let embed = self.binding.embed_fn();
        fx.map(move |a| embed(a))
    }
}
