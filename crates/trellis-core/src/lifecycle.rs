//! Per-component lifecycle state machine.
//!
//! A component's lifecycle is owned by whoever created the component (the
//! host for the root, a router for children) through a
//! [`LifecycleRegistry`]. The component itself only sees the read-side
//! [`Lifecycle`] handle: current state plus observer registration.
//!
//! States form a strict path up (`Initialized → Created → Started →
//! Resumed`) and down (`Resumed → Paused → Stopped → Destroyed`), with
//! `Stopped → Started` re-entry. `Destroyed` is terminal. Each state maps to
//! a numeric level so that "same activity, different direction" pairs
//! (`Created`/`Stopped`, `Started`/`Paused`) compare equal.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::TrellisError;
use crate::value_cell::Subscription;

/// The state of a component's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Initialized,
    Created,
    Started,
    Resumed,
    Paused,
    Stopped,
    Destroyed,
}

impl LifecycleState {
    /// Activity level: `Destroyed`/`Initialized` = 0, `Created` = `Stopped`
    /// = 1, `Started` = `Paused` = 2, `Resumed` = 3.
    pub fn level(self) -> u8 {
        match self {
            Self::Initialized | Self::Destroyed => 0,
            Self::Created | Self::Stopped => 1,
            Self::Started | Self::Paused => 2,
            Self::Resumed => 3,
        }
    }

    pub fn is_destroyed(self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// The next state on the path up, if any.
    fn step_up(self) -> Option<Self> {
        match self {
            Self::Initialized => Some(Self::Created),
            Self::Created | Self::Stopped => Some(Self::Started),
            Self::Started | Self::Paused => Some(Self::Resumed),
            Self::Resumed | Self::Destroyed => None,
        }
    }

    /// The next state on the path down, if any.
    fn step_down(self) -> Option<Self> {
        match self {
            Self::Resumed => Some(Self::Paused),
            Self::Started | Self::Paused => Some(Self::Stopped),
            Self::Created | Self::Stopped | Self::Initialized => Some(Self::Destroyed),
            Self::Destroyed => None,
        }
    }

    /// Whether `self -> to` is a legal single-step transition.
    fn allows(self, to: Self) -> bool {
        match self {
            Self::Initialized => matches!(to, Self::Created | Self::Destroyed),
            Self::Created => matches!(to, Self::Started | Self::Destroyed),
            Self::Started => matches!(to, Self::Resumed | Self::Stopped),
            Self::Resumed => matches!(to, Self::Paused),
            Self::Paused => matches!(to, Self::Resumed | Self::Stopped),
            Self::Stopped => matches!(to, Self::Started | Self::Destroyed),
            Self::Destroyed => false,
        }
    }
}

type Observer = Rc<RefCell<dyn FnMut(LifecycleState)>>;

struct LifecycleInner {
    state: Cell<LifecycleState>,
    // Highest level the owner currently permits. Transitions above it fail.
    ceiling: Cell<u8>,
    observers: RefCell<Vec<(u64, Observer)>>,
    next_id: Cell<u64>,
}

impl LifecycleInner {
    fn new() -> Self {
        Self {
            state: Cell::new(LifecycleState::Initialized),
            ceiling: Cell::new(LifecycleState::Resumed.level()),
            observers: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    fn notify(&self, state: LifecycleState) {
        // Snapshot so observers may subscribe during dispatch.
        let observers: Vec<Observer> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer.borrow_mut()(state);
        }
    }
}

/// Read-side lifecycle handle exposed to the component through its context.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Rc<LifecycleInner>,
}

impl Lifecycle {
    /// The current state.
    pub fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state().is_destroyed()
    }

    /// Registers `observer`, invoked synchronously and in subscription order
    /// once per state change. There is no replay of the current state; read
    /// it through [`state`] first.
    ///
    /// [`state`]: Lifecycle::state
    pub fn subscribe(&self, observer: impl FnMut(LifecycleState) + 'static) -> Subscription {
        let inner = &self.inner;
        let id = inner.next_id.get();
        inner.next_id.set(id + 1);
        let observer: Observer = Rc::new(RefCell::new(observer));
        inner.observers.borrow_mut().push((id, observer));

        let weak = Rc::downgrade(inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .observers
                    .borrow_mut()
                    .retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &self.state())
            .finish()
    }
}

/// Owner side of a lifecycle: the only way to drive transitions.
///
/// Held by the host for the root component and by the router for children;
/// never handed to the component it governs.
#[derive(Clone)]
pub struct LifecycleRegistry {
    inner: Rc<LifecycleInner>,
}

impl Default for LifecycleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleRegistry {
    /// A fresh registry in `Initialized`.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(LifecycleInner::new()),
        }
    }

    /// The read-side handle for the governed component.
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle {
            inner: Rc::clone(&self.inner),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    /// Caps the registry at `ceiling`'s level. Transitions to a state above
    /// the cap fail with `InvalidTransition`. Used by routers to keep a
    /// child from outrunning its parent.
    pub fn set_ceiling(&self, ceiling: LifecycleState) {
        self.inner.ceiling.set(ceiling.level());
    }

    /// Performs a single legal transition, notifying observers after the
    /// state is updated.
    pub fn transition(&self, to: LifecycleState) -> Result<(), TrellisError> {
        let from = self.inner.state.get();
        let capped = to.level() > from.level() && to.level() > self.inner.ceiling.get();
        if !from.allows(to) || capped {
            return Err(TrellisError::InvalidTransition { from, to });
        }
        self.inner.state.set(to);
        self.inner.notify(to);
        Ok(())
    }

    /// Walks the legal path towards `target`, emitting one observer round
    /// per intermediate state. Driving towards a state on the opposite phase
    /// of the same level (e.g. `Paused` while at `Started`) stops once the
    /// levels match; `Destroyed` always reaches the exact state.
    pub fn drive_to(&self, target: LifecycleState) -> Result<(), TrellisError> {
        let current = self.inner.state.get();
        if current == target {
            return Ok(());
        }
        if current.is_destroyed() {
            return Err(TrellisError::InvalidTransition {
                from: current,
                to: target,
            });
        }
        loop {
            let current = self.inner.state.get();
            if current == target {
                break;
            }
            let next = if target.is_destroyed() {
                current.step_down()
            } else if current.level() < target.level() {
                current.step_up()
            } else if current.level() > target.level() {
                current.step_down()
            } else {
                // Same level, opposite phase: nothing further to do.
                break;
            };
            match next {
                Some(next) => self.transition(next)?,
                None => break,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleRegistry")
            .field("state", &self.state())
            .field("ceiling", &self.inner.ceiling.get())
            .finish()
    }
}
