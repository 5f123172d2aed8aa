//! Bidirectional embedding of a child action inside a parent action.
//!
//! Every composition reducer routes through a binding: `embed` wraps a child
//! action in the parent's sum type, `extract` pattern-matches it back out.
//! Extraction failing is not an error; it means the action was addressed to
//! a sibling and the reducer should no-op.
//!
//! # Law
//!
//! `extract(embed(c)) == Some(c)` for every child action `c`. Parent actions
//! not produced by `embed` must extract to `None`.
//!
//! # Example
//!
//! ```ignore
//! enum AppAction {
//!     Counter(CounterAction),
//!     Settings(SettingsAction),
//! }
//!
//! let binding = ActionBinding::new(AppAction::Counter, |parent| match parent {
//!     AppAction::Counter(child) => Some(child),
//!     _ => None,
//! });
//! ```

use std::sync::Arc;

type EmbedFn<Parent, Child> = Arc<dyn Fn(Child) -> Parent + Send + Sync>;
type ExtractFn<Parent, Child> = Arc<dyn Fn(Parent) -> Option<Child> + Send + Sync>;

type KeyedEmbedFn<Parent, Key, Child> = Arc<dyn Fn(Key, Child) -> Parent + Send + Sync>;
type KeyedExtractFn<Parent, Key, Child> = Arc<dyn Fn(Parent) -> Option<(Key, Child)> + Send + Sync>;

/// An embed/extract pair between a parent action type and a child action
/// embedded in one of its cases.
///
/// Bindings are cheap to clone; the closures are shared behind `Arc` because
/// effect remapping calls `embed` from spawned tasks long after the reduce
/// call that produced them.
pub struct ActionBinding<Parent, Child> {
    embed: EmbedFn<Parent, Child>,
    extract: ExtractFn<Parent, Child>,
}

impl<Parent, Child> ActionBinding<Parent, Child> {
    /// Build a binding from a case constructor and its inverse matcher.
    pub fn new(
        embed: impl Fn(Child) -> Parent + Send + Sync + 'static,
        extract: impl Fn(Parent) -> Option<Child> + Send + Sync + 'static,
    ) -> Self {
        Self {
            embed: Arc::new(embed),
            extract: Arc::new(extract),
        }
    }

    /// Wrap a child action in the parent case.
    pub fn embed(&self, child: Child) -> Parent {
        (self.embed)(child)
    }

    /// Match the parent action back out, or `None` if it is another case.
    pub fn extract(&self, parent: Parent) -> Option<Child> {
        (self.extract)(parent)
    }

    /// Shared handle to the embed closure, for remapping effect actions.
    pub(crate) fn embed_fn(&self) -> EmbedFn<Parent, Child> {
        Arc::clone(&self.embed)
    }
}

impl<Parent, Child> Clone for ActionBinding<Parent, Child> {
    fn clone(&self) -> Self {
        Self {
            embed: Arc::clone(&self.embed),
            extract: Arc::clone(&self.extract),
        }
    }
}

/// An embed/extract pair that also carries the key identifying which element
/// of a collection the child action targets.
///
/// Used by the indexed, keyed, and identity-keyed composition reducers.
/// Extraction yields `(key, child_action)` or `None` when the parent action
/// does not match the case.
pub struct KeyedActionBinding<Parent, Key, Child> {
    embed: KeyedEmbedFn<Parent, Key, Child>,
    extract: KeyedExtractFn<Parent, Key, Child>,
}

impl<Parent, Key, Child> KeyedActionBinding<Parent, Key, Child> {
    /// Build a keyed binding from a case constructor and its inverse matcher.
    pub fn new(
        embed: impl Fn(Key, Child) -> Parent + Send + Sync + 'static,
        extract: impl Fn(Parent) -> Option<(Key, Child)> + Send + Sync + 'static,
    ) -> Self {
        Self {
            embed: Arc::new(embed),
            extract: Arc::new(extract),
        }
    }

    /// Wrap a child action and its element key in the parent case.
    pub fn embed(&self, key: Key, child: Child) -> Parent {
        (self.embed)(key, child)
    }

    /// Match the parent action back out into `(key, child_action)`.
    pub fn extract(&self, parent: Parent) -> Option<(Key, Child)> {
        (self.extract)(parent)
    }

    /// Shared handle to the embed closure, for remapping effect actions.
    pub(crate) fn embed_fn(&self) -> KeyedEmbedFn<Parent, Key, Child> {
        Arc::clone(&self.embed)
    }
}

impl<Parent, Key, Child> Clone for KeyedActionBinding<Parent, Key, Child> {
    fn clone(&self) -> Self {
        Self {
            embed: Arc::clone(&self.embed),
            extract: Arc::clone(&self.extract),
        }
    }
}
