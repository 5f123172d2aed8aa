//! A small end-to-end walkthrough: a counter with a ticking subscription,
//! a one-shot "auto save", and a state subscriber printing commits.
//!
//! Run with `RUST_LOG=debug cargo run -p counter-demo` to see the effect
//! runtime's own tracing alongside the demo output.

use std::sync::Arc;
use std::time::Duration;

use futures::stream;
use ratchet::{
    Capability, DependencyScope, Reducer, SideEffects, Store, SubscriptionId,
};
use tokio::time::sleep;
use tracing::info;

// =============================================================================
// Capabilities
// =============================================================================

/// Produces tick streams. Swappable through the scope for tests.
struct Clock {
    period: Duration,
}

impl Capability for Clock {
    fn make_default(_scope: &mut DependencyScope) -> Self {
        Clock {
            period: Duration::from_millis(500),
        }
    }
}

impl Clock {
    fn ticks(&self) -> impl futures::Stream<Item = ()> + Send {
        let period = self.period;
        stream::unfold((), move |()| async move {
            sleep(period).await;
            Some(((), ()))
        })
    }
}

/// Pretend persistence. Resolved through the scope like any other handle.
struct Saver;

impl Capability for Saver {
    fn make_default(_scope: &mut DependencyScope) -> Self {
        Saver
    }
}

impl Saver {
    async fn persist(&self, count: u64) -> u64 {
        sleep(Duration::from_millis(120)).await;
        count
    }
}

// =============================================================================
// Counter domain
// =============================================================================

#[derive(Debug, Clone, Default)]
struct CounterState {
    count: u64,
    last_saved: Option<u64>,
}

#[derive(Debug, Clone)]
enum CounterAction {
    StartTicking,
    StopTicking,
    Tick,
    Save,
    Saved(u64),
}

struct CounterEffects {
    clock: Arc<Clock>,
    saver: Arc<Saver>,
}

struct CounterReducer;

impl Reducer for CounterReducer {
    type State = CounterState;
    type Action = CounterAction;
    type Effects = CounterEffects;
    type Output = CounterAction;

    fn reduce(
        &self,
        state: &mut CounterState,
        action: CounterAction,
        effects: &CounterEffects,
    ) -> SideEffects<CounterAction> {
        let mut fx = SideEffects::none();
        match action {
            CounterAction::StartTicking => {
                fx.subscribe(SubscriptionId::named("ticks"), effects.clock.ticks(), |_| {
                    CounterAction::Tick
                });
            }
            CounterAction::StopTicking => fx.cancel(SubscriptionId::named("ticks")),
            CounterAction::Tick => {
                state.count += 1;
                // Autosave every fifth tick.
                if state.count % 5 == 0 {
                    fx.merge(self.reduce(state, CounterAction::Save, effects));
                }
            }
            CounterAction::Save => {
                let saver = Arc::clone(&effects.saver);
                let count = state.count;
                fx.run(async move { saver.persist(count).await }, |saved| {
                    Some(CounterAction::Saved(saved))
                });
            }
            CounterAction::Saved(count) => state.last_saved = Some(count),
        }
        fx
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut scope = DependencyScope::new();
    let effects = CounterEffects {
        clock: scope.resolve::<Clock>(),
        saver: scope.resolve::<Saver>(),
    };

    let handle = Store::new(CounterState::default(), CounterReducer, effects).start();

    let _watch = handle.subscribe(|state: &CounterState| {
        info!(count = state.count, last_saved = ?state.last_saved, "committed");
    });

    handle.send(CounterAction::StartTicking);
    sleep(Duration::from_secs(4)).await;

    handle.send(CounterAction::StopTicking);
    sleep(Duration::from_millis(300)).await;

    if let Ok((count, last_saved)) = handle.with_state(|s| (s.count, s.last_saved)).await {
        info!(count, ?last_saved, "final state");
    }
    handle.abort();
}
