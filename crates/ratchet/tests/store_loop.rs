//! End-to-end tests driving composed reducers through a running store:
//! collection routing, subscription lifecycle across element removal, and
//! ordering under concurrent senders.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream;
use ratchet::{
    ActionBinding, Capability, CombineReducers, DependencyScope, IdSegment, IndexedReducer,
    KeyedActionBinding, Reducer, SideEffects, Store, SubscriptionId,
};
use tokio::time::sleep;

// =============================================================================
// A document-saving capability resolved through the dependency scope
// =============================================================================

struct Saver {
    saves: AtomicU64,
}

impl Capability for Saver {
    fn make_default(_scope: &mut DependencyScope) -> Self {
        Saver {
            saves: AtomicU64::new(0),
        }
    }
}

impl Saver {
    async fn save(&self, text: String) -> String {
        sleep(Duration::from_millis(5)).await;
        self.saves.fetch_add(1, Ordering::SeqCst);
        text
    }
}

// =============================================================================
// Row domain (child)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct RowState {
    text: String,
    saving: bool,
    ticks: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RowAction {
    Save(String),
    Saved(String),
    Watch,
    Tick,
}

#[derive(Clone)]
struct RowEffects {
    saver: Arc<Saver>,
}

struct RowReducer;

impl Reducer for RowReducer {
    type State = RowState;
    type Action = RowAction;
    type Effects = RowEffects;
    type Output = RowAction;

    fn reduce(
        &self,
        state: &mut RowState,
        action: RowAction,
        effects: &RowEffects,
    ) -> SideEffects<RowAction> {
        let mut fx = SideEffects::none();
        match action {
            RowAction::Save(text) => {
                state.saving = true;
                let saver = Arc::clone(&effects.saver);
                fx.run(
                    async move { saver.save(text).await },
                    |saved| Some(RowAction::Saved(saved)),
                );
            }
            RowAction::Saved(text) => {
                state.saving = false;
                state.text = text;
            }
            RowAction::Watch => {
                let ticks = stream::unfold((), |()| async {
                    sleep(Duration::from_millis(10)).await;
                    Some(((), ()))
                });
                fx.subscribe(SubscriptionId::named("watch"), ticks, |_| RowAction::Tick);
            }
            RowAction::Tick => state.ticks += 1,
        }
        fx
    }
}

// =============================================================================
// App domain (parent)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct AppState {
    rows: Vec<RowState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AppAction {
    Push(String),
    Remove(usize),
    Row { index: usize, action: RowAction },
}

#[derive(Clone)]
struct AppEffects {
    saver: Arc<Saver>,
}

struct RowsAdmin;

impl Reducer for RowsAdmin {
    type State = AppState;
    type Action = AppAction;
    type Effects = AppEffects;
    type Output = AppAction;

    fn reduce(
        &self,
        state: &mut AppState,
        action: AppAction,
        _effects: &AppEffects,
    ) -> SideEffects<AppAction> {
        let mut fx = SideEffects::none();
        match action {
            AppAction::Push(text) => state.rows.push(RowState {
                text,
                ..Default::default()
            }),
            AppAction::Remove(index) => {
                if index < state.rows.len() {
                    state.rows.remove(index);
                    // Everything the removed row left running lives under
                    // its index prefix.
                    fx.cancel_scope(
                        SubscriptionId::default().prefixed(IdSegment::Index(index)),
                    );
                }
            }
            AppAction::Row { .. } => {}
        }
        fx
    }
}

fn row_binding() -> KeyedActionBinding<AppAction, usize, RowAction> {
    KeyedActionBinding::new(
        |index, action| AppAction::Row { index, action },
        |a| match a {
            AppAction::Row { index, action } => Some((index, action)),
            _ => None,
        },
    )
}

fn app_reducer() -> impl Reducer<State = AppState, Action = AppAction, Effects = AppEffects, Output = AppAction>
{
    CombineReducers::new().with(RowsAdmin).with(IndexedReducer::new(
        RowReducer,
        |s: &mut AppState| &mut s.rows,
        |e: &AppEffects| RowEffects {
            saver: Arc::clone(&e.saver),
        },
        row_binding(),
    ))
}

fn app_effects() -> AppEffects {
    let mut scope = DependencyScope::new();
    AppEffects {
        saver: scope.resolve::<Saver>(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn indexed_save_round_trips_through_the_loop() {
    let effects = app_effects();
    let saver = Arc::clone(&effects.saver);
    let handle = Store::new(AppState::default(), app_reducer(), effects).start();

    for text in ["idle1", "idle2", "idle3"] {
        handle.send(AppAction::Push(text.into()));
    }
    handle.send(AppAction::Row {
        index: 1,
        action: RowAction::Save("thing".into()),
    });

    // The save is in flight: saving flag set, text unchanged.
    let mid = handle.with_state(|s| s.rows.clone()).await.unwrap();
    assert!(mid[1].saving);
    assert_eq!(mid[1].text, "idle2");

    sleep(Duration::from_millis(40)).await;
    let rows = handle.with_state(|s| s.rows.clone()).await.unwrap();
    let texts: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["idle1", "thing", "idle3"]);
    assert!(!rows[1].saving);
    assert_eq!(saver.saves.load(Ordering::SeqCst), 1);

    handle.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn removing_a_row_cancels_its_subscriptions() {
    let handle = Store::new(AppState::default(), app_reducer(), app_effects()).start();

    handle.send(AppAction::Push("a".into()));
    handle.send(AppAction::Push("b".into()));
    handle.send(AppAction::Row {
        index: 0,
        action: RowAction::Watch,
    });

    sleep(Duration::from_millis(45)).await;
    let watch_id = SubscriptionId::named("watch").prefixed(IdSegment::Index(0));
    assert!(handle.effects().is_active(&watch_id));
    let ticks = handle.with_state(|s| s.rows[0].ticks).await.unwrap();
    assert!(ticks >= 2, "expected ticks to accumulate, got {ticks}");

    handle.send(AppAction::Remove(0));
    sleep(Duration::from_millis(15)).await;
    assert!(!handle.effects().is_active(&watch_id));
    assert_eq!(handle.effects().active_count(), 0);

    // Index 0 now addresses the old row "b"; its text is unaffected by the
    // removal and the cancel.
    let remaining = handle.with_state(|s| s.rows.clone()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].text, "b");

    handle.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn restarting_a_watch_replaces_the_old_pump() {
    let handle = Store::new(AppState::default(), app_reducer(), app_effects()).start();

    handle.send(AppAction::Push("a".into()));
    handle.send(AppAction::Row {
        index: 0,
        action: RowAction::Watch,
    });
    sleep(Duration::from_millis(25)).await;

    // Second watch under the same identity: one live pump, not two.
    handle.send(AppAction::Row {
        index: 0,
        action: RowAction::Watch,
    });
    sleep(Duration::from_millis(25)).await;
    assert_eq!(handle.effects().active_count(), 1);

    handle.abort();
}

// =============================================================================
// Ordering under concurrent senders
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum TallyAction {
    Add(u64),
}

struct NoEffects;

struct TallyReducer;

impl Reducer for TallyReducer {
    type State = u64;
    type Action = TallyAction;
    type Effects = NoEffects;
    type Output = TallyAction;

    fn reduce(
        &self,
        state: &mut u64,
        action: TallyAction,
        _effects: &NoEffects,
    ) -> SideEffects<TallyAction> {
        let TallyAction::Add(n) = action;
        *state += n;
        SideEffects::none()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_senders_reduce_serially() {
    let handle = Arc::new(Store::new(0u64, TallyReducer, NoEffects).start());

    let observed = Arc::new(Mutex::new(Vec::new()));
    let observed2 = Arc::clone(&observed);
    let _watch = handle.subscribe(move |state: &u64| {
        observed2.lock().unwrap().push(*state);
    });

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let handle = Arc::clone(&handle);
        tasks.push(tokio::spawn(async move {
            for _ in 0..50 {
                if fastrand::bool() {
                    tokio::task::yield_now().await;
                }
                handle.send(TallyAction::Add(1));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let total = handle.with_state(|s| *s).await.unwrap();
    assert_eq!(total, 400);

    // Every commit was observed from a fully reduced state: strictly
    // increasing by one, no torn or repeated values.
    let observed = observed.lock().unwrap();
    assert_eq!(observed.len(), 400);
    assert!(observed.windows(2).all(|w| w[1] == w[0] + 1));

    handle.abort();
}

// LiftedReducer over shared state, end to end through the store.

#[derive(Debug, Clone, PartialEq, Eq)]
enum OuterAction {
    Tally(TallyAction),
}

#[tokio::test(flavor = "multi_thread")]
async fn lifted_vocabulary_feeds_the_same_state() {
    let lifted = ratchet::LiftedReducer::new(
        TallyReducer,
        |_: &NoEffects| NoEffects,
        ActionBinding::new(OuterAction::Tally, |a| match a {
            OuterAction::Tally(t) => Some(t),
        }),
    );
    let handle = Store::new(0u64, lifted, NoEffects).start();

    handle.send(OuterAction::Tally(TallyAction::Add(3)));
    handle.send(OuterAction::Tally(TallyAction::Add(4)));
    let total = handle.with_state(|s| *s).await.unwrap();
    assert_eq!(total, 7);

    handle.abort();
}
