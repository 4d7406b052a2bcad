//! The back-stack manager.
//!
//! A [`Router`] owns an ordered sequence of slots, each pairing a
//! configuration with an optionally materialized child component, and keeps
//! three things in lockstep: the observable [`RouterState`], every child's
//! lifecycle relative to the parent's, and the retention machinery that
//! lets the whole stack survive a forced teardown of the owning component.
//!
//! Materialization policy: entries pushed past stay materialized at
//! `Stopped`; a stack restored from persisted data materializes only the
//! active entry; `pop` and `bring_to_front` lazily rematerialize an evicted
//! entry from its configuration and saved snapshot. Only the observable
//! behavior (content identical after rematerialization) is contractual.
//!
//! Retention wiring: the router registers a state supplier under its key in
//! the parent's state keeper (producing the [`PersistedStack`] layout) and
//! parks each slot's child [`InstanceKeeper`] in a retained store inside
//! the parent's instance keeper. A forced destroy therefore drops every
//! live component but keeps the store alive; a navigational pop disposes
//! the popped slot's keeper immediately. Router keys must be unique within
//! one context: the key namespaces both mechanisms.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use trellis_core::codec::{ConfigurationCodec, JsonCodec};
use trellis_core::context::ComponentContext;
use trellis_core::error::TrellisError;
use trellis_core::instance_keeper::{InstanceKeeper, RetainedInstance};
use trellis_core::lifecycle::{Lifecycle, LifecycleRegistry, LifecycleState};
use trellis_core::state_keeper::{SavedState, StateKeeper};
use trellis_core::value_cell::{MutableValueCell, Subscription, ValueCell};

use crate::stack::{BackStackEntry, Configuration, PersistedEntry, PersistedStack, RouterState};

/// A materialized child: the component instance plus the handles the
/// router needs to drive and snapshot it.
struct LiveChild<T> {
    component: T,
    registry: LifecycleRegistry,
    state_keeper: StateKeeper,
    instance_keeper: InstanceKeeper,
}

/// One back-stack slot. `saved_state` holds the snapshot of an evicted
/// incarnation until the slot is next materialized, which consumes it.
struct Slot<C, T> {
    id: u64,
    configuration: C,
    saved_state: Option<SavedState>,
    live: Option<LiveChild<T>>,
}

/// Child instance keepers parked in the parent's instance keeper, keyed by
/// slot id. Survives a forced recreate with the parent; its own disposal,
/// which only happens when the parent is truly abandoned, cascades into
/// every child keeper.
#[derive(Default)]
struct RetainedStore {
    keepers: RefCell<IndexMap<u64, InstanceKeeper>>,
}

impl RetainedStore {
    fn keeper_for(&self, slot: u64) -> InstanceKeeper {
        self.keepers
            .borrow_mut()
            .entry(slot)
            .or_insert_with(InstanceKeeper::new)
            .clone()
    }

    fn remove(&self, slot: u64) -> Option<InstanceKeeper> {
        self.keepers.borrow_mut().shift_remove(&slot)
    }
}

impl RetainedInstance for RetainedStore {
    fn on_destroy(&self) {
        for (slot, keeper) in self.keepers.take() {
            if let Err(err) = keeper.dispose() {
                log::warn!("slot {slot}: child instance keeper disposal failed: {err}");
            }
        }
    }
}

struct RouterInner<C: Configuration, T: 'static> {
    key: String,
    parent: ComponentContext,
    factory: Box<dyn Fn(C, ComponentContext) -> T>,
    codec: Rc<dyn ConfigurationCodec<C>>,
    slots: RefCell<Vec<Slot<C, T>>>,
    next_slot: Cell<u64>,
    retained: Rc<RetainedStore>,
    cell: MutableValueCell<RouterState<C>>,
    destroyed: Cell<bool>,
    parent_subscription: RefCell<Option<Subscription>>,
}

impl<C: Configuration, T: 'static> RouterInner<C, T> {
    fn guard(&self) -> Result<(), TrellisError> {
        if self.destroyed.get() {
            Err(TrellisError::RouterDestroyed)
        } else {
            Ok(())
        }
    }

    fn parent_state(&self) -> LifecycleState {
        self.parent.lifecycle().state()
    }

    fn new_slot(&self, configuration: C) -> Slot<C, T> {
        let id = self.next_slot.get();
        self.next_slot.set(id + 1);
        Slot {
            id,
            configuration,
            saved_state: None,
            live: None,
        }
    }

    /// Builds the child context and constructs the component. The child's
    /// lifecycle stays `Initialized`; callers drive it afterwards.
    fn instantiate(&self, slot: &mut Slot<C, T>) {
        log::trace!("router `{}`: materializing slot {}", self.key, slot.id);
        let registry = LifecycleRegistry::new();
        let state_keeper = match slot.saved_state.take() {
            Some(saved) => StateKeeper::from_saved(saved),
            None => StateKeeper::new(),
        };
        let instance_keeper = self.retained.keeper_for(slot.id);
        let context = ComponentContext::new(
            registry.lifecycle(),
            state_keeper.clone(),
            instance_keeper.clone(),
        );
        let component = (self.factory)(slot.configuration.clone(), context);
        slot.live = Some(LiveChild {
            component,
            registry,
            state_keeper,
            instance_keeper,
        });
    }

    /// Raises or lowers a live child to `target`, adjusting its ceiling
    /// first so the walk is permitted.
    fn drive_live(&self, registry: &LifecycleRegistry, target: LifecycleState) -> Result<(), TrellisError> {
        registry.set_ceiling(target);
        registry.drive_to(target)
    }

    /// Caps a covered child at `Stopped`. Children that never got past
    /// `Created` (or are still `Initialized`) are left where they are.
    fn demote(&self, registry: &LifecycleRegistry) -> Result<(), TrellisError> {
        registry.set_ceiling(LifecycleState::Stopped);
        if registry.state().level() > LifecycleState::Stopped.level() {
            registry.drive_to(LifecycleState::Stopped)?;
        }
        Ok(())
    }

    fn active_registry(&self) -> Option<LifecycleRegistry> {
        self.slots
            .borrow()
            .last()
            .and_then(|slot| slot.live.as_ref())
            .map(|live| live.registry.clone())
    }

    /// Destroys a slot for a navigational reason: the component will not be
    /// reconstructed from this path, so suppliers are not run and the
    /// retained instances are disposed.
    fn destroy_slot(&self, slot: Slot<C, T>) {
        log::debug!("router `{}`: destroying slot {}", self.key, slot.id);
        if let Some(live) = slot.live {
            if let Err(err) = live.registry.drive_to(LifecycleState::Destroyed) {
                log::error!("slot {}: destroy transition failed: {err}", slot.id);
            }
            live.state_keeper.destroy();
            drop(live.component);
        }
        if let Some(keeper) = self.retained.remove(slot.id) {
            if let Err(err) = keeper.dispose() {
                log::warn!("slot {}: instance keeper disposal failed: {err}", slot.id);
            }
        }
    }

    /// Forced teardown, entered when the parent's lifecycle reaches
    /// `Destroyed`: children's lifecycles end and live components drop, but
    /// retained keepers stay in the store for a possible recreate.
    fn tear_down(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        log::debug!("router `{}`: tearing down", self.key);
        for slot in self.slots.take() {
            if let Some(live) = slot.live {
                if let Err(err) = live.registry.drive_to(LifecycleState::Destroyed) {
                    log::error!("slot {}: destroy transition failed: {err}", slot.id);
                }
                live.state_keeper.destroy();
            }
        }
        self.parent_subscription.borrow_mut().take();
    }

    /// Synchronizes materialized children with a parent state change:
    /// covered children are capped at `Stopped`, the active child mirrors
    /// the parent exactly.
    fn on_parent_state(&self, state: LifecycleState) {
        if state.is_destroyed() {
            self.tear_down();
            return;
        }
        let (covered, active): (Vec<LifecycleRegistry>, Option<LifecycleRegistry>) = {
            let slots = self.slots.borrow();
            let count = slots.len();
            let covered = slots
                .iter()
                .take(count.saturating_sub(1))
                .filter_map(|slot| slot.live.as_ref())
                .map(|live| live.registry.clone())
                .collect();
            let active = slots
                .last()
                .and_then(|slot| slot.live.as_ref())
                .map(|live| live.registry.clone());
            (covered, active)
        };
        for registry in covered {
            if let Err(err) = self.demote(&registry) {
                log::error!("router `{}`: capping covered child failed: {err}", self.key);
            }
        }
        if let Some(registry) = active {
            if let Err(err) = self.drive_live(&registry, state) {
                log::error!("router `{}`: syncing active child failed: {err}", self.key);
            }
        }
    }

    /// Emits the current stack through the observable cell. A torn-down
    /// router has no entries and emits nothing further.
    fn publish(&self) {
        let state = {
            let slots = self.slots.borrow();
            let mut entries: Vec<BackStackEntry<C>> = slots
                .iter()
                .map(|slot| BackStackEntry {
                    configuration: slot.configuration.clone(),
                    saved_state: slot.saved_state.clone(),
                })
                .collect();
            entries.pop().map(|active| RouterState {
                active,
                back_stack: entries,
            })
        };
        if let Some(state) = state {
            self.cell.set(state);
        }
    }

    /// Replaces the stack with `target`, diffing by structural equality:
    /// slots whose configuration remains keep their live component and
    /// keepers (greedy first-match pairing), disappeared slots are
    /// destroyed navigationally, new configurations enter unmaterialized
    /// unless they end up active.
    fn apply_target(&self, target: Vec<C>) -> Result<(), TrellisError> {
        if target.is_empty() {
            return Err(TrellisError::EmptyBackStack);
        }
        let mut remaining: Vec<Option<Slot<C, T>>> =
            self.slots.take().into_iter().map(Some).collect();
        let mut next: Vec<Slot<C, T>> = Vec::with_capacity(target.len());
        for configuration in target {
            let position = remaining.iter().position(|candidate| {
                candidate
                    .as_ref()
                    .map_or(false, |slot| slot.configuration == configuration)
            });
            match position.and_then(|index| remaining[index].take()) {
                Some(slot) => next.push(slot),
                None => next.push(self.new_slot(configuration)),
            }
        }
        for slot in remaining.into_iter().flatten() {
            self.destroy_slot(slot);
        }

        // Install the new sequence before any lifecycle work so a failed
        // transition cannot lose entries.
        *self.slots.borrow_mut() = next;
        let covered: Vec<LifecycleRegistry> = {
            let slots = self.slots.borrow();
            let count = slots.len();
            slots
                .iter()
                .take(count - 1)
                .filter_map(|slot| slot.live.as_ref())
                .map(|live| live.registry.clone())
                .collect()
        };
        for registry in covered {
            self.demote(&registry)?;
        }
        self.activate_top()?;
        self.publish();
        Ok(())
    }

    /// Materializes the top slot if needed and raises it to the parent's
    /// current level.
    fn activate_top(&self) -> Result<(), TrellisError> {
        let evicted = self
            .slots
            .borrow()
            .last()
            .map_or(false, |slot| slot.live.is_none());
        if evicted {
            let taken = self.slots.borrow_mut().pop();
            if let Some(mut slot) = taken {
                self.instantiate(&mut slot);
                self.slots.borrow_mut().push(slot);
            }
        }
        if let Some(registry) = self.active_registry() {
            self.drive_live(&registry, self.parent_state())?;
        }
        Ok(())
    }
}

/// Back-stack navigation manager for one level of the component tree.
///
/// Cloning the handle shares the underlying router.
pub struct Router<C: Configuration, T: 'static> {
    inner: Rc<RouterInner<C, T>>,
}

impl<C: Configuration, T: 'static> Clone for Router<C, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: Configuration, T: 'static> Router<C, T> {
    /// Creates a router under `parent` with the default JSON codec. See
    /// [`with_codec`] for the full contract.
    ///
    /// [`with_codec`]: Router::with_codec
    pub fn new(
        parent: &ComponentContext,
        key: impl Into<String>,
        initial: impl FnOnce() -> Vec<C>,
        factory: impl Fn(C, ComponentContext) -> T + 'static,
    ) -> Result<Self, TrellisError> {
        Self::with_codec(parent, key, Rc::new(JsonCodec), initial, factory)
    }

    /// Creates a router under `parent`, restoring a previously persisted
    /// stack if the parent's state keeper holds one under `key`, otherwise
    /// starting from `initial()` (which must be non-empty). Only the active
    /// entry is materialized from a restored stack. `factory` must be a
    /// pure mapping from configuration and context to a component.
    pub fn with_codec(
        parent: &ComponentContext,
        key: impl Into<String>,
        codec: Rc<dyn ConfigurationCodec<C>>,
        initial: impl FnOnce() -> Vec<C>,
        factory: impl Fn(C, ComponentContext) -> T + 'static,
    ) -> Result<Self, TrellisError> {
        let key = key.into();
        if parent.lifecycle().is_destroyed() {
            return Err(TrellisError::RouterDestroyed);
        }

        let persisted: Option<PersistedStack> = match parent.state_keeper().consume(&key)? {
            Some(bytes) => Some(serde_json::from_slice(&bytes).map_err(TrellisError::codec)?),
            None => None,
        };

        let retained = parent
            .instance_keeper()
            .get_or_create(&key, RetainedStore::default)?;

        let next_slot = Cell::new(0);
        let mut slots: Vec<Slot<C, T>> = Vec::new();
        match persisted.filter(|stack| !stack.entries.is_empty()) {
            Some(stack) => {
                next_slot.set(stack.next_slot);
                for entry in stack.entries {
                    slots.push(Slot {
                        id: entry.slot,
                        configuration: codec.decode(&entry.configuration)?,
                        saved_state: entry.saved_state,
                        live: None,
                    });
                }
                log::debug!("router `{key}`: restored {} entries", slots.len());
            }
            None => {
                for configuration in initial() {
                    let id = next_slot.get();
                    next_slot.set(id + 1);
                    slots.push(Slot {
                        id,
                        configuration,
                        saved_state: None,
                        live: None,
                    });
                }
            }
        }
        if slots.is_empty() {
            return Err(TrellisError::EmptyBackStack);
        }

        let initial_state = {
            let mut entries: Vec<BackStackEntry<C>> = slots
                .iter()
                .map(|slot| BackStackEntry {
                    configuration: slot.configuration.clone(),
                    saved_state: slot.saved_state.clone(),
                })
                .collect();
            let active = entries.pop().ok_or(TrellisError::EmptyBackStack)?;
            RouterState {
                active,
                back_stack: entries,
            }
        };

        let inner = Rc::new(RouterInner {
            key,
            parent: parent.clone(),
            factory: Box::new(factory),
            codec,
            slots: RefCell::new(slots),
            next_slot,
            retained,
            cell: MutableValueCell::new(initial_state),
            destroyed: Cell::new(false),
            parent_subscription: RefCell::new(None),
        });

        // Materialize the active entry at the parent's current level.
        inner.activate_top()?;
        inner.publish();

        // Snapshot supplier for forced teardown and process persistence.
        let weak = Rc::downgrade(&inner);
        parent
            .state_keeper()
            .register(inner.key.clone(), move || persist(&weak))?;

        // Keep children in lockstep with the parent's lifecycle.
        let weak = Rc::downgrade(&inner);
        let subscription = parent.lifecycle().subscribe(move |state| {
            if let Some(inner) = weak.upgrade() {
                inner.on_parent_state(state);
            }
        });
        *inner.parent_subscription.borrow_mut() = Some(subscription);

        Ok(Self { inner })
    }

    /// The current stack snapshot.
    pub fn state(&self) -> RouterState<C> {
        self.inner.cell.value()
    }

    /// Read-only observable over the stack. A single operation fully
    /// completes before the one resulting value is emitted.
    pub fn state_cell(&self) -> ValueCell<RouterState<C>> {
        self.inner.cell.as_cell()
    }

    /// Number of entries, active included.
    pub fn len(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    /// Always `false`; the stack is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Appends `configuration` as the new active entry. The previously
    /// active child holds at `Stopped`; the new child is raised to the
    /// parent's current level.
    pub fn push(&self, configuration: C) -> Result<(), TrellisError> {
        let inner = &self.inner;
        inner.guard()?;
        log::debug!("router `{}`: push {:?}", inner.key, configuration);
        let mut slot = inner.new_slot(configuration);
        inner.instantiate(&mut slot);
        if let Some(registry) = inner.active_registry() {
            inner.demote(&registry)?;
        }
        inner.slots.borrow_mut().push(slot);
        inner.activate_top()?;
        inner.publish();
        Ok(())
    }

    /// Removes the active entry, destroying its component and disposing its
    /// instance keeper, and promotes the previous entry back to the
    /// parent's level (rematerializing it if it had been evicted). Fails
    /// with `EmptyBackStack`, changing nothing, when only one entry
    /// remains.
    pub fn pop(&self) -> Result<(), TrellisError> {
        let inner = &self.inner;
        inner.guard()?;
        if inner.slots.borrow().len() <= 1 {
            return Err(TrellisError::EmptyBackStack);
        }
        let popped = inner.slots.borrow_mut().pop();
        if let Some(slot) = popped {
            log::debug!("router `{}`: pop {:?}", inner.key, slot.configuration);
            inner.destroy_slot(slot);
        }
        inner.activate_top()?;
        inner.publish();
        Ok(())
    }

    /// Replaces the whole stack with `configurations` (the last becomes
    /// active). Slots whose configuration remains keep their live component
    /// and retained instances; disappeared slots are destroyed.
    pub fn replace_all(
        &self,
        configurations: impl IntoIterator<Item = C>,
    ) -> Result<(), TrellisError> {
        self.inner.guard()?;
        self.inner
            .apply_target(configurations.into_iter().collect())
    }

    /// Computes a new stack from the current configurations and applies it
    /// with [`replace_all`] semantics.
    ///
    /// [`replace_all`]: Router::replace_all
    pub fn navigate(&self, transform: impl FnOnce(Vec<C>) -> Vec<C>) -> Result<(), TrellisError> {
        let inner = &self.inner;
        inner.guard()?;
        let current: Vec<C> = inner
            .slots
            .borrow()
            .iter()
            .map(|slot| slot.configuration.clone())
            .collect();
        inner.apply_target(transform(current))
    }

    /// Pops entries while the active configuration matches `predicate`,
    /// never below one entry.
    pub fn pop_while(&self, predicate: impl Fn(&C) -> bool) -> Result<(), TrellisError> {
        self.navigate(|mut configurations| {
            while configurations.len() > 1
                && configurations.last().map_or(false, &predicate)
            {
                configurations.pop();
            }
            configurations
        })
    }

    /// Pops everything above the first entry.
    pub fn pop_to_first(&self) -> Result<(), TrellisError> {
        self.navigate(|mut configurations| {
            configurations.truncate(1);
            configurations
        })
    }

    /// Makes the entry structurally equal to `configuration` active,
    /// searching from the active end and moving the match (live component
    /// and keepers included) to the front without disturbing other entries.
    /// Behaves like [`push`] when no entry matches.
    ///
    /// [`push`]: Router::push
    pub fn bring_to_front(&self, configuration: C) -> Result<(), TrellisError> {
        let inner = &self.inner;
        inner.guard()?;
        let position = inner
            .slots
            .borrow()
            .iter()
            .rposition(|slot| slot.configuration == configuration);
        let Some(position) = position else {
            return self.push(configuration);
        };
        if position + 1 == inner.slots.borrow().len() {
            // Already active: the stack is unchanged but the operation still
            // emits its one state.
            inner.publish();
            return Ok(());
        }
        let slot = inner.slots.borrow_mut().remove(position);
        if let Some(registry) = inner.active_registry() {
            inner.demote(&registry)?;
        }
        inner.slots.borrow_mut().push(slot);
        inner.activate_top()?;
        inner.publish();
        Ok(())
    }

    /// Borrows the active configuration and component, if materialized.
    /// Router operations must not be reentered from `f`.
    pub fn with_active<R>(&self, f: impl FnOnce(&C, &T) -> R) -> Option<R> {
        let slots = self.inner.slots.borrow();
        let slot = slots.last()?;
        let live = slot.live.as_ref()?;
        Some(f(&slot.configuration, &live.component))
    }

    /// The lifecycle of the child at `index` (creation order), if that
    /// entry is materialized.
    pub fn lifecycle_at(&self, index: usize) -> Option<Lifecycle> {
        self.inner
            .slots
            .borrow()
            .get(index)
            .and_then(|slot| slot.live.as_ref())
            .map(|live| live.registry.lifecycle())
    }
}

impl<C: Configuration, T: 'static> fmt::Debug for Router<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("key", &self.inner.key)
            .field("len", &self.len())
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}

/// Supplier body: serializes the current stack, snapshotting every live
/// child's state keeper. A router that is already gone persists an empty
/// stack, which restores as a cold start.
fn persist<C: Configuration, T: 'static>(
    weak: &Weak<RouterInner<C, T>>,
) -> Result<Vec<u8>, TrellisError> {
    let stack = match weak.upgrade() {
        Some(inner) => {
            let slots = inner.slots.borrow();
            let mut entries = Vec::with_capacity(slots.len());
            for slot in slots.iter() {
                let saved_state = match slot.live.as_ref() {
                    Some(live) => Some(live.state_keeper.save()?),
                    None => slot.saved_state.clone(),
                };
                entries.push(PersistedEntry {
                    configuration: inner.codec.encode(&slot.configuration)?,
                    saved_state,
                    slot: slot.id,
                });
            }
            PersistedStack {
                entries,
                next_slot: inner.next_slot.get(),
            }
        }
        None => PersistedStack::default(),
    };
    serde_json::to_vec(&stack).map_err(TrellisError::codec)
}
