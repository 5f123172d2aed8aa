//! The core reduction contract and the chaining combinator.
//!
//! A [`Reducer`] maps `(state, action, effects bundle)` to a mutated state
//! plus a [`SideEffects`] container describing the async work to run.
//! Reduction is synchronous, total, and deterministic given the state, the
//! action, and the identity of the effects bundle: it never blocks, never
//! suspends, and never fails for control flow.

use crate::effect::SideEffects;

/// A deterministic function from state and action to mutated state plus
/// declared side effects.
///
/// - `State` is owned by the store; reducers receive it by exclusive
///   reference for the duration of one call and must not retain it.
/// - `Action` is the event vocabulary this reducer understands.
/// - `Effects` is the bundle of capability handles its effect code invokes;
///   a parent's bundle is a superset from which a child's is projected.
/// - `Output` is the action type forwarded upward past this reducer: the
///   follow-up actions its declared effects will produce. At the store root
///   `Output = Action`, so effect results feed back into the same loop.
pub trait Reducer: Send + Sync {
    /// State this reducer owns for the duration of one call.
    type State: Send + 'static;
    /// Incoming action vocabulary.
    type Action: Send + 'static;
    /// Capability bundle projected for this reducer.
    type Effects;
    /// Follow-up action type produced by declared effects.
    type Output: Send + 'static;

    /// Apply one action to the state, returning the declared side effects.
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        effects: &Self::Effects,
    ) -> SideEffects<Self::Output>;
}

type DynReducer<S, A, E, O> =
    Box<dyn Reducer<State = S, Action = A, Effects = E, Output = O>>;

/// Chains same-shaped reducers, merging their side-effect containers.
///
/// Each member sees every action; members whose binding does not match
/// simply no-op, so independent sub-domains can be layered over one state
/// without a dispatch table. Members run in registration order, and their
/// declared effects keep that order in the merged container.
pub struct CombineReducers<S, A, E, O> {
    reducers: Vec<DynReducer<S, A, E, O>>,
}

impl<S, A, E, O> CombineReducers<S, A, E, O> {
    /// An empty chain. Reduces every action to a no-op until members are
    /// added.
    pub fn new() -> Self {
        Self {
            reducers: Vec::new(),
        }
    }

    /// Append a reducer to the chain.
    pub fn with(
        mut self,
        reducer: impl Reducer<State = S, Action = A, Effects = E, Output = O> + 'static,
    ) -> Self {
        self.reducers.push(Box::new(reducer));
        self
    }

    /// Number of chained reducers.
    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    /// Whether the chain has no members.
    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }
}

impl<S, A, E, O> Default for CombineReducers<S, A, E, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, A, E, O> Reducer for CombineReducers<S, A, E, O>
where
    S: Send + 'static,
    A: Clone + Send + 'static,
    E: Send + Sync,
    O: Send + 'static,
{
    type State = S;
    type Action = A;
    type Effects = E;
    type Output = O;

    fn reduce(&self, state: &mut S, action: A, effects: &E) -> SideEffects<O> {
        let mut merged = SideEffects::none();
        for reducer in &self.reducers {
            merged.merge(reducer.reduce(state, action.clone(), effects));
        }
        merged
    }
}
