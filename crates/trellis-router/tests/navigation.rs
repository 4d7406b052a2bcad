//! Navigation scenarios: operation semantics, lifecycle propagation and
//! observable-state ordering.

mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use common::{screen_factory, Config, Screen, TickerStats};
use trellis_core::context::Root;
use trellis_core::error::TrellisError;
use trellis_core::lifecycle::LifecycleState::*;
use trellis_router::{ChildRouterExt, Router, RouterState};
use trellis_testing::{stack_of, StateLog};

fn resumed_root() -> Root {
    let root = Root::new();
    root.registry().drive_to(Resumed).unwrap();
    root
}

fn router_under(root: &Root) -> (Router<Config, Screen>, StateLog, TickerStats) {
    let log = StateLog::new();
    let stats = TickerStats::default();
    let router = root
        .context()
        .router(
            "nav",
            || vec![Config::Home],
            screen_factory(log.clone(), stats.clone()),
        )
        .unwrap();
    (router, log, stats)
}

#[test]
fn initial_entry_reaches_the_parents_level() {
    let root = resumed_root();
    let (router, log, _) = router_under(&root);
    assert_eq!(router.lifecycle_at(0).unwrap().state(), Resumed);
    assert_eq!(
        log.take(),
        vec!["home:Created", "home:Started", "home:Resumed"]
    );
}

#[test]
fn push_stops_covered_entry_and_resumes_new_one() {
    let root = resumed_root();
    let (router, log, _) = router_under(&root);
    log.take();

    router.push(Config::Details { id: 1 }).unwrap();
    assert_eq!(router.state().len(), 2);
    assert_eq!(router.lifecycle_at(0).unwrap().state(), Stopped);
    assert_eq!(router.lifecycle_at(1).unwrap().state(), Resumed);
    assert_eq!(
        log.take(),
        vec![
            "home:Paused",
            "home:Stopped",
            "details-1:Created",
            "details-1:Started",
            "details-1:Resumed",
        ]
    );
}

#[test]
fn pop_destroys_active_and_promotes_previous() {
    let root = resumed_root();
    let (router, log, stats) = router_under(&root);
    router.push(Config::Details { id: 1 }).unwrap();
    log.take();
    assert_eq!(stats.created.get(), 2);

    router.pop().unwrap();
    assert_eq!(router.state().len(), 1);
    assert_eq!(router.lifecycle_at(0).unwrap().state(), Resumed);
    // The popped entry's instance keeper disposed exactly once.
    assert_eq!(stats.disposed.get(), 1);
    assert_eq!(
        log.take(),
        vec![
            "details-1:Paused",
            "details-1:Stopped",
            "details-1:Destroyed",
            "home:Started",
            "home:Resumed",
        ]
    );
}

#[test]
fn push_pop_round_trips_router_state() {
    let root = resumed_root();
    let (router, _, _) = router_under(&root);
    let before = router.state();
    router.push(Config::Details { id: 7 }).unwrap();
    router.pop().unwrap();
    assert_eq!(router.state(), before);
}

#[test]
fn pop_on_single_entry_reports_empty_back_stack_and_changes_nothing() {
    let root = resumed_root();
    let (router, log, _) = router_under(&root);
    log.take();
    let before = router.state();

    assert!(matches!(router.pop(), Err(TrellisError::EmptyBackStack)));
    assert_eq!(router.state(), before);
    assert!(log.is_empty());
}

#[test]
fn stack_length_tracks_pushes_minus_pops() {
    let root = resumed_root();
    let (router, _, _) = router_under(&root);
    for id in 0..4 {
        router.push(Config::Details { id }).unwrap();
    }
    assert_eq!(router.state().len(), 5);
    router.pop().unwrap();
    router.pop().unwrap();
    assert_eq!(router.state().len(), 3);
}

#[test]
fn parent_moving_down_caps_every_materialized_child() {
    let root = resumed_root();
    let (router, _, _) = router_under(&root);
    router.push(Config::Details { id: 1 }).unwrap();
    router.push(Config::Details { id: 2 }).unwrap();

    root.registry().drive_to(Stopped).unwrap();
    for index in 0..3 {
        let lifecycle = router.lifecycle_at(index).unwrap();
        assert!(lifecycle.state().level() <= Stopped.level());
        assert!(!lifecycle.is_destroyed());
    }
}

#[test]
fn parent_moving_up_raises_only_the_active_child() {
    let root = resumed_root();
    let (router, _, _) = router_under(&root);
    router.push(Config::Details { id: 1 }).unwrap();
    root.registry().drive_to(Stopped).unwrap();

    root.registry().drive_to(Resumed).unwrap();
    assert_eq!(router.lifecycle_at(1).unwrap().state(), Resumed);
    assert_eq!(router.lifecycle_at(0).unwrap().state(), Stopped);
}

#[test]
fn replace_all_preserves_remaining_entries_and_destroys_the_rest() {
    let root = resumed_root();
    let (router, _, stats) = router_under(&root);
    router.push(Config::Details { id: 1 }).unwrap();
    router.push(Config::Details { id: 2 }).unwrap();
    assert_eq!(stats.created.get(), 3);

    router
        .replace_all(vec![Config::Home, Config::Details { id: 3 }])
        .unwrap();
    assert_eq!(
        stack_of(&router.state()),
        vec![Config::Home, Config::Details { id: 3 }]
    );
    // Home survived with its component; details-1 and details-2 were
    // destroyed; details-3 is new.
    assert_eq!(stats.created.get(), 4);
    assert_eq!(stats.disposed.get(), 2);
    assert_eq!(router.lifecycle_at(1).unwrap().state(), Resumed);
}

#[test]
fn replace_all_with_empty_target_is_rejected() {
    let root = resumed_root();
    let (router, _, _) = router_under(&root);
    assert!(matches!(
        router.replace_all(Vec::new()),
        Err(TrellisError::EmptyBackStack)
    ));
    assert_eq!(router.state().len(), 1);
}

#[test]
fn bring_to_front_moves_existing_entry_without_destroying_others() {
    let root = resumed_root();
    let (router, _, stats) = router_under(&root);
    router.push(Config::Details { id: 1 }).unwrap();
    router.push(Config::Details { id: 2 }).unwrap();
    let created = stats.created.get();

    router.bring_to_front(Config::Home).unwrap();
    assert_eq!(
        stack_of(&router.state()),
        vec![
            Config::Details { id: 1 },
            Config::Details { id: 2 },
            Config::Home,
        ]
    );
    // Nothing was destroyed or re-created.
    assert_eq!(stats.created.get(), created);
    assert_eq!(stats.disposed.get(), 0);
    assert_eq!(router.lifecycle_at(2).unwrap().state(), Resumed);
}

#[test]
fn bring_to_front_falls_back_to_push_when_absent() {
    let root = resumed_root();
    let (router, _, _) = router_under(&root);
    router.bring_to_front(Config::Details { id: 9 }).unwrap();
    assert_eq!(
        stack_of(&router.state()),
        vec![Config::Home, Config::Details { id: 9 }]
    );
}

#[test]
fn bring_to_front_of_the_active_entry_emits_an_unchanged_state() {
    let root = resumed_root();
    let (router, _, _) = router_under(&root);
    router.push(Config::Details { id: 1 }).unwrap();
    let emissions = Rc::new(Cell::new(0));
    let sink = emissions.clone();
    let _sub = router
        .state_cell()
        .subscribe(move |_| sink.set(sink.get() + 1));
    assert_eq!(emissions.get(), 1);
    let before = router.state();

    router.bring_to_front(Config::Details { id: 1 }).unwrap();
    assert_eq!(emissions.get(), 2);
    assert_eq!(router.state(), before);
}

#[test]
fn pop_while_stops_at_the_first_non_match() {
    let root = resumed_root();
    let (router, _, _) = router_under(&root);
    for id in 1..=3 {
        router.push(Config::Details { id }).unwrap();
    }
    router
        .pop_while(|config| matches!(config, Config::Details { .. }))
        .unwrap();
    assert_eq!(stack_of(&router.state()), vec![Config::Home]);
}

#[test]
fn pop_to_first_keeps_only_the_root_entry() {
    let root = resumed_root();
    let (router, _, _) = router_under(&root);
    for id in 1..=3 {
        router.push(Config::Details { id }).unwrap();
    }
    router.pop_to_first().unwrap();
    assert_eq!(stack_of(&router.state()), vec![Config::Home]);
    assert_eq!(router.lifecycle_at(0).unwrap().state(), Resumed);
}

#[test]
fn each_operation_emits_exactly_one_state() {
    let root = resumed_root();
    let (router, _, _) = router_under(&root);
    let emissions: Rc<RefCell<Vec<RouterState<Config>>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = emissions.clone();
    let _sub = router
        .state_cell()
        .subscribe(move |state| sink.borrow_mut().push(state.clone()));
    // Immediate replay of the current state.
    assert_eq!(emissions.borrow().len(), 1);

    router.push(Config::Details { id: 1 }).unwrap();
    router.push(Config::Details { id: 2 }).unwrap();
    router.pop().unwrap();
    assert_eq!(emissions.borrow().len(), 4);
    let lengths: Vec<usize> = emissions.borrow().iter().map(RouterState::len).collect();
    assert_eq!(lengths, vec![1, 2, 3, 2]);
}

#[test]
fn operations_after_owner_destroy_are_rejected() {
    let root = resumed_root();
    let (router, _, _) = router_under(&root);
    root.destroy().unwrap();
    assert!(matches!(
        router.push(Config::Details { id: 1 }),
        Err(TrellisError::RouterDestroyed)
    ));
}

#[test]
fn owner_destroy_ends_child_lifecycles() {
    let root = resumed_root();
    let (router, log, stats) = router_under(&root);
    router.push(Config::Details { id: 1 }).unwrap();
    log.take();

    root.destroy().unwrap();
    let events = log.take();
    assert!(events.contains(&"details-1:Destroyed".to_owned()));
    assert!(events.contains(&"home:Destroyed".to_owned()));
    // Genuine destruction cascades into every retained instance.
    assert_eq!(stats.disposed.get(), 2);
}
