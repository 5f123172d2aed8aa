//! Declarative side-effect descriptors and the container that accumulates
//! them during a reduce call.
//!
//! Reducers never execute IO. They *declare* it here and return the
//! container; the effect runtime materializes it afterwards. Two kinds of
//! descriptor exist:
//!
//! - **One-shot**: a unit of async work whose result is transformed into at
//!   most one follow-up action. The transform is baked into the stored
//!   future, so it runs exactly once on completion.
//! - **Subscription**: a possibly-infinite stream of values, each mapped to
//!   a follow-up action, registered under a stable [`SubscriptionId`].
//!
//! Composition reducers translate a child's container into the parent's
//! shape with [`SideEffects::map`] (rewrite follow-up actions) and
//! [`SideEffects::scoped`] (rewrite actions *and* prefix subscription
//! identities so a child identity stays unique within the parent).
//!
//! # Failure policy
//!
//! A one-shot whose work fails produces no action unless the reducer
//! supplied an error mapping ([`SideEffects::try_run_or`]). Unmapped
//! failures are logged and swallowed at this boundary; reduction itself
//! never fails.

use std::borrow::Cow;
use std::hash::{Hash, Hasher};

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{Future, FutureExt, Stream, StreamExt};
use smallvec::SmallVec;
use tracing::warn;

// =============================================================================
// Subscription identity
// =============================================================================

/// One segment of a subscription identity path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdSegment {
    /// A caller-chosen name, e.g. `"timer"`.
    Name(Cow<'static, str>),
    /// A collection index, prepended by the indexed composition reducer.
    Index(usize),
    /// A 64-bit hash of an arbitrary element key, prepended by the keyed
    /// and identity-keyed composition reducers.
    Key(u64),
}

/// Stable identity of a long-lived subscription.
///
/// An identity is an ordered path of segments. A leaf reducer names its
/// subscription (`SubscriptionId::named("timer")`); each composition layer
/// it passes through prepends a segment, so the same leaf identity used by
/// two collection elements becomes two distinct identities in the parent.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct SubscriptionId {
    path: SmallVec<[IdSegment; 4]>,
}

impl SubscriptionId {
    /// A single-segment identity with the given name.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            path: SmallVec::from_iter([IdSegment::Name(name.into())]),
        }
    }

    /// Prepend a segment, scoping this identity under a parent.
    pub fn prefixed(mut self, segment: IdSegment) -> Self {
        self.path.insert(0, segment);
        self
    }

    /// Whether this identity sits at or below `prefix` in the scope tree.
    pub fn starts_with(&self, prefix: &SubscriptionId) -> bool {
        self.path.starts_with(&prefix.path)
    }

    /// The path segments, outermost scope first.
    pub fn segments(&self) -> &[IdSegment] {
        &self.path
    }
}

impl std::fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for segment in &self.path {
            if !first {
                write!(f, "/")?;
            }
            first = false;
            match segment {
                IdSegment::Name(name) => write!(f, "{name}")?,
                IdSegment::Index(i) => write!(f, "#{i}")?,
                IdSegment::Key(h) => write!(f, "@{h:x}")?,
            }
        }
        Ok(())
    }
}

/// Hash an arbitrary element key into an [`IdSegment::Key`] value.
///
/// Stable within a process, which is the lifetime of any live subscription.
pub fn key_hash<K: Hash>(key: &K) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

// =============================================================================
// Container
// =============================================================================

/// A pending operation on the subscription registry.
pub(crate) enum SubscriptionOp<A> {
    /// Start (or replace) a pump under this identity.
    Start(BoxStream<'static, A>),
    /// Cancel the pump under this identity, if live.
    Cancel,
    /// Cancel every live pump whose identity starts with this prefix.
    CancelScope,
}

/// Accumulates side-effect descriptors produced during a single reduce call.
///
/// One-shots are kept in declaration order; the runtime starts them in that
/// order (completion order between distinct effects is unspecified).
/// A subscription identity is unique within its container: registering a
/// `Start` under an identity already present replaces the earlier
/// descriptor.
#[must_use = "side effects do nothing until handed to the effect runtime"]
pub struct SideEffects<A> {
    pub(crate) one_shots: Vec<BoxFuture<'static, Option<A>>>,
    pub(crate) subscriptions: Vec<(SubscriptionId, SubscriptionOp<A>)>,
}

impl<A: Send + 'static> SideEffects<A> {
    /// An empty container. The result of every routing miss.
    pub fn none() -> Self {
        Self {
            one_shots: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Whether no descriptors were declared.
    pub fn is_empty(&self) -> bool {
        self.one_shots.is_empty() && self.subscriptions.is_empty()
    }

    /// Number of declared one-shots (for assertions and debugging).
    pub fn one_shot_count(&self) -> usize {
        self.one_shots.len()
    }

    /// Identities of subscriptions this container would start.
    pub fn subscription_starts(&self) -> Vec<SubscriptionId> {
        self.subscriptions
            .iter()
            .filter(|(_, op)| matches!(op, SubscriptionOp::Start(_)))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Declare a one-shot unit of work.
    ///
    /// `to_action` runs exactly once, on completion, and yields zero or one
    /// follow-up action.
    pub fn run<T, F, M>(&mut self, work: F, to_action: M)
    where
        F: Future<Output = T> + Send + 'static,
        M: FnOnce(T) -> Option<A> + Send + 'static,
    {
        self.one_shots.push(work.map(to_action).boxed());
    }

    /// Declare a fallible one-shot whose failure is swallowed.
    ///
    /// On `Err` the failure is logged at this boundary and no action is
    /// produced; the causing action vanishes with no follow-up. Callers that
    /// need reliability use [`SideEffects::try_run_or`] instead.
    pub fn try_run<T, F, M>(&mut self, work: F, on_ok: M)
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        M: FnOnce(T) -> Option<A> + Send + 'static,
    {
        self.one_shots.push(
            async move {
                match work.await {
                    Ok(value) => on_ok(value),
                    Err(error) => {
                        warn!(%error, "one-shot effect failed with no error mapping; dropped");
                        None
                    }
                }
            }
            .boxed(),
        );
    }

    /// Declare a fallible one-shot with an explicit error-to-action mapping.
    pub fn try_run_or<T, F, M, E>(&mut self, work: F, on_ok: M, on_err: E)
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        M: FnOnce(T) -> Option<A> + Send + 'static,
        E: FnOnce(anyhow::Error) -> Option<A> + Send + 'static,
    {
        self.one_shots.push(
            async move {
                match work.await {
                    Ok(value) => on_ok(value),
                    Err(error) => on_err(error),
                }
            }
            .boxed(),
        );
    }

    /// Register a subscription: a stream of values, each mapped to one
    /// follow-up action, running until the stream ends or the identity is
    /// cancelled.
    ///
    /// Registering under an identity already present in this container
    /// replaces the earlier descriptor; at the runtime, starting under a
    /// live identity cancels the old pump first.
    pub fn subscribe<V, S, M>(&mut self, id: SubscriptionId, values: S, to_action: M)
    where
        S: Stream<Item = V> + Send + 'static,
        M: FnMut(V) -> A + Send + 'static,
    {
        self.push_op(id, SubscriptionOp::Start(values.map(to_action).boxed()));
    }

    /// Cancel the subscription under `id`, if one is live.
    pub fn cancel(&mut self, id: SubscriptionId) {
        self.push_op(id, SubscriptionOp::Cancel);
    }

    /// Cancel every live subscription whose identity starts with `prefix`.
    ///
    /// This is how a parent cancels everything a removed child left running:
    /// composition scopes child identities under the child's key, so the
    /// key's prefix names exactly that child's subscriptions.
    pub fn cancel_scope(&mut self, prefix: SubscriptionId) {
        self.push_op(prefix, SubscriptionOp::CancelScope);
    }

    /// Merge another container into this one, preserving declaration order.
    ///
    /// Later `Start` descriptors replace earlier ones under the same
    /// identity, keeping the per-container uniqueness invariant.
    pub fn merge(&mut self, other: SideEffects<A>) {
        self.one_shots.extend(other.one_shots);
        for (id, op) in other.subscriptions {
            self.push_op(id, op);
        }
    }

    /// Remap every follow-up action into a parent action type.
    pub fn map<B, F>(self, embed: F) -> SideEffects<B>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Clone + Send + 'static,
    {
        let one_shots = self
            .one_shots
            .into_iter()
            .map(|fut| {
                let embed = embed.clone();
                fut.map(move |opt| opt.map(embed)).boxed()
            })
            .collect();
        let subscriptions = self
            .subscriptions
            .into_iter()
            .map(|(id, op)| {
                let op = match op {
                    SubscriptionOp::Start(stream) => {
                        SubscriptionOp::Start(stream.map(embed.clone()).boxed())
                    }
                    SubscriptionOp::Cancel => SubscriptionOp::Cancel,
                    SubscriptionOp::CancelScope => SubscriptionOp::CancelScope,
                };
                (id, op)
            })
            .collect();
        SideEffects {
            one_shots,
            subscriptions,
        }
    }

    /// Remap follow-up actions *and* prefix every subscription identity,
    /// scoping a child's container under its place in the parent.
    pub fn scoped<B, F>(self, segment: IdSegment, embed: F) -> SideEffects<B>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Clone + Send + 'static,
    {
        let mut mapped = self.map(embed);
        for (id, _) in mapped.subscriptions.iter_mut() {
            *id = std::mem::take(id).prefixed(segment.clone());
        }
        mapped
    }

    fn push_op(&mut self, id: SubscriptionId, op: SubscriptionOp<A>) {
        if matches!(op, SubscriptionOp::Start(_)) {
            self.subscriptions
                .retain(|(existing, existing_op)| {
                    !(*existing == id && matches!(existing_op, SubscriptionOp::Start(_)))
                });
        }
        self.subscriptions.push((id, op));
    }
}

impl<A: Send + 'static> Default for SideEffects<A> {
    fn default() -> Self {
        Self::none()
    }
}

impl<A> std::fmt::Debug for SideEffects<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideEffects")
            .field("one_shots", &self.one_shots.len())
            .field("subscription_ops", &self.subscriptions.len())
            .finish()
    }
}
