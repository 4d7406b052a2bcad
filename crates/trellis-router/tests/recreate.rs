//! Teardown/recreate and process-death scenarios: retained instances,
//! saved-state round trips and lazy rematerialization.

mod common;

use std::rc::Rc;

use common::{screen_factory, Config, Screen, Ticker, TickerStats};
use trellis_core::context::ComponentContext;
use trellis_core::lifecycle::LifecycleState::*;
use trellis_router::{ChildRouterExt, Router};
use trellis_testing::{stack_of, RecreateHost, StateLog};

type Host = RecreateHost<Router<Config, Screen>>;

fn host_with(log: StateLog, stats: TickerStats) -> Host {
    let host = RecreateHost::new(move |context| {
        context
            .router(
                "nav",
                || vec![Config::Home],
                screen_factory(log.clone(), stats.clone()),
            )
            .unwrap()
    });
    host.resume().unwrap();
    host
}

fn active_note(host: &Host) -> Option<String> {
    host.component()
        .with_active(|_, screen| screen.restored_note.clone())
        .flatten()
}

fn active_ticker(host: &Host) -> *const Ticker {
    host.component()
        .with_active(|_, screen| Rc::as_ptr(&screen.ticker))
        .unwrap()
}

#[test]
fn recreate_preserves_retained_instances() {
    let stats = TickerStats::default();
    let mut host = host_with(StateLog::new(), stats.clone());
    host.component().push(Config::Details { id: 1 }).unwrap();
    assert_eq!(stats.created.get(), 2);
    let ticker_before = active_ticker(&host);

    host.recreate().unwrap();
    // The components were rebuilt, the retained instances were not.
    assert_eq!(stats.created.get(), 2);
    assert_eq!(stats.disposed.get(), 0);
    assert_eq!(active_ticker(&host), ticker_before);

    host.component().pop().unwrap();
    assert_eq!(stats.disposed.get(), 1);
}

#[test]
fn recreate_round_trips_saved_state() {
    let mut host = host_with(StateLog::new(), TickerStats::default());
    host.component().push(Config::Details { id: 1 }).unwrap();
    assert_eq!(active_note(&host), None);

    host.recreate().unwrap();
    assert_eq!(active_note(&host), Some("note-from-details-1".to_owned()));
}

#[test]
fn recreate_restores_only_the_active_entry() {
    let mut host = host_with(StateLog::new(), TickerStats::default());
    host.component().push(Config::Details { id: 1 }).unwrap();

    host.recreate().unwrap();
    let router = host.component();
    assert_eq!(router.len(), 2);
    assert!(router.lifecycle_at(0).is_none());
    assert_eq!(router.lifecycle_at(1).unwrap().state(), Resumed);
}

#[test]
fn pop_rematerializes_an_evicted_entry_from_its_snapshot() {
    let stats = TickerStats::default();
    let mut host = host_with(StateLog::new(), stats.clone());
    host.component().push(Config::Details { id: 1 }).unwrap();
    assert!(host.component().lifecycle_at(0).is_some());
    assert_eq!(stats.created.get(), 2);

    host.recreate().unwrap();
    host.component().pop().unwrap();
    let router = host.component();
    assert_eq!(stack_of(&router.state()), vec![Config::Home]);
    assert_eq!(router.lifecycle_at(0).unwrap().state(), Resumed);
    // The snapshot taken at teardown time carried home's note, and its
    // retained ticker came back from the parked keeper.
    assert_eq!(active_note(&host), Some("note-from-home".to_owned()));
    assert_eq!(stats.created.get(), 2);
}

#[test]
fn recreate_while_stopped_restarts_at_created() {
    let mut host = host_with(StateLog::new(), TickerStats::default());
    host.stop().unwrap();

    // A fresh tree cannot reach the stop phase without having started, so
    // the restarted root settles at the matching level instead.
    host.recreate().unwrap();
    assert_eq!(host.root_state(), Created);
    assert_eq!(host.component().lifecycle_at(0).unwrap().state(), Created);
}

#[test]
fn process_death_keeps_state_but_loses_retained_instances() {
    let stats = TickerStats::default();
    let mut host = host_with(StateLog::new(), stats.clone());
    host.component().push(Config::Details { id: 1 }).unwrap();
    assert_eq!(stats.created.get(), 2);

    host.process_death().unwrap();
    let router = host.component();
    assert_eq!(
        stack_of(&router.state()),
        vec![Config::Home, Config::Details { id: 1 }]
    );
    assert!(router.lifecycle_at(0).is_none());
    assert_eq!(router.lifecycle_at(1).unwrap().state(), Resumed);
    // Serialized state survived the byte round trip; the ticker did not.
    assert_eq!(active_note(&host), Some("note-from-details-1".to_owned()));
    assert_eq!(stats.created.get(), 3);

    host.component().pop().unwrap();
    assert_eq!(active_note(&host), Some("note-from-home".to_owned()));
}

#[test]
fn equal_configurations_pushed_twice_keep_distinct_retained_instances() {
    let stats = TickerStats::default();
    let host = host_with(StateLog::new(), stats.clone());
    let first = active_ticker(&host);

    // A second entry with a structurally equal configuration occupies a new
    // slot, so it gets its own parked keeper and its own ticker.
    host.component().push(Config::Home).unwrap();
    assert_eq!(stats.created.get(), 2);
    let second = active_ticker(&host);
    assert_ne!(first, second);

    // Popping disposes only the popped slot's instance.
    host.component().pop().unwrap();
    assert_eq!(stats.disposed.get(), 1);
    assert_eq!(active_ticker(&host), first);
}

#[test]
fn destroy_disposes_every_retained_instance() {
    let stats = TickerStats::default();
    let host = host_with(StateLog::new(), stats.clone());
    host.component().push(Config::Details { id: 1 }).unwrap();

    host.destroy().unwrap();
    assert_eq!(stats.disposed.get(), 2);
}

/// A screen hosting its own child router, for nesting scenarios.
struct Tabs {
    inner: Router<Config, Screen>,
}

fn tabs_factory(
    log: StateLog,
    stats: TickerStats,
) -> impl Fn(Config, ComponentContext) -> Tabs {
    move |_, context| Tabs {
        inner: context
            .router(
                "inner",
                || vec![Config::Home],
                screen_factory(log.clone(), stats.clone()),
            )
            .unwrap(),
    }
}

#[test]
fn nested_router_stack_survives_recreate() {
    let stats = TickerStats::default();
    let mut host = RecreateHost::new({
        let stats = stats.clone();
        move |context| {
            context
                .router(
                    "tabs",
                    || vec![Config::Home],
                    tabs_factory(StateLog::new(), stats.clone()),
                )
                .unwrap()
        }
    });
    host.resume().unwrap();
    host.component()
        .with_active(|_, tabs| {
            tabs.inner.push(Config::Details { id: 1 }).unwrap();
            tabs.inner.push(Config::Details { id: 2 }).unwrap();
        })
        .unwrap();
    assert_eq!(stats.created.get(), 3);

    host.recreate().unwrap();
    let shape = host
        .component()
        .with_active(|_, tabs| stack_of(&tabs.inner.state()))
        .unwrap();
    assert_eq!(
        shape,
        vec![
            Config::Home,
            Config::Details { id: 1 },
            Config::Details { id: 2 },
        ]
    );
    // The inner router's retained instances rode along with the outer slot.
    assert_eq!(stats.created.get(), 3);
    let inner_state = host
        .component()
        .with_active(|_, tabs| tabs.inner.lifecycle_at(2).unwrap().state())
        .unwrap();
    assert_eq!(inner_state, Resumed);
}
