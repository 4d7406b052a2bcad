//! Test harness for Trellis component trees.
//!
//! [`RecreateHost`] stands in for a hosting environment: it owns a root,
//! builds the application's component tree, and can simulate both a forced
//! teardown/recreate cycle (retained instances survive) and a full process
//! death (only serialized state survives). [`StateLog`] is a small shared
//! recorder for asserting event ordering across lifecycles and routers.

use std::cell::RefCell;
use std::rc::Rc;

use trellis_core::context::{ComponentContext, Root};
use trellis_core::error::TrellisError;
use trellis_core::instance_keeper::InstanceKeeper;
use trellis_core::lifecycle::LifecycleState;
use trellis_core::state_keeper::SavedState;
use trellis_router::RouterState;

/// Host-environment stand-in driving a component tree through lifecycle
/// changes and teardown/recreate cycles.
pub struct RecreateHost<T> {
    root: Root,
    component: Option<T>,
    build: Rc<dyn Fn(ComponentContext) -> T>,
}

impl<T> RecreateHost<T> {
    /// Cold-starts a tree. `build` is invoked again on every recreation.
    pub fn new(build: impl Fn(ComponentContext) -> T + 'static) -> Self {
        let build: Rc<dyn Fn(ComponentContext) -> T> = Rc::new(build);
        let root = Root::new();
        let component = (build)(root.context());
        Self {
            root,
            component: Some(component),
            build,
        }
    }

    /// The current root component. Panics after [`destroy`].
    ///
    /// [`destroy`]: RecreateHost::destroy
    pub fn component(&self) -> &T {
        self.component.as_ref().expect("tree was destroyed")
    }

    /// Drives the root lifecycle to `target`, walking every intermediate
    /// state.
    pub fn drive_to(&self, target: LifecycleState) -> Result<(), TrellisError> {
        self.root.registry().drive_to(target)
    }

    pub fn resume(&self) -> Result<(), TrellisError> {
        self.drive_to(LifecycleState::Resumed)
    }

    pub fn stop(&self) -> Result<(), TrellisError> {
        self.drive_to(LifecycleState::Stopped)
    }

    pub fn root_state(&self) -> LifecycleState {
        self.root.registry().state()
    }

    /// Forced teardown and immediate recreation: saved state and retained
    /// instances both survive, mirroring a host-environment
    /// reconfiguration.
    pub fn recreate(&mut self) -> Result<(), TrellisError> {
        let state = self.root_state();
        let root = std::mem::take(&mut self.root);
        let (saved, retained) = root.tear_down_for_recreate()?;
        self.component = None;
        self.restart(saved, retained, state)
    }

    /// Full process death: the saved state round-trips through bytes, the
    /// retained instances are lost.
    pub fn process_death(&mut self) -> Result<(), TrellisError> {
        let state = self.root_state();
        let root = std::mem::take(&mut self.root);
        let (saved, retained) = root.tear_down_for_recreate()?;
        self.component = None;
        drop(retained);
        let bytes = serde_json::to_vec(&saved).map_err(TrellisError::codec)?;
        let saved: SavedState = serde_json::from_slice(&bytes).map_err(TrellisError::codec)?;
        self.restart(saved, InstanceKeeper::new(), state)
    }

    fn restart(
        &mut self,
        saved: SavedState,
        retained: InstanceKeeper,
        state: LifecycleState,
    ) -> Result<(), TrellisError> {
        let root = Root::restored(saved, retained);
        let component = (self.build)(root.context());
        self.root = root;
        self.component = Some(component);
        if !matches!(state, LifecycleState::Initialized) {
            self.drive_to(state)?;
        }
        Ok(())
    }

    /// Genuine destruction: disposes every retained instance in the tree.
    pub fn destroy(mut self) -> Result<(), TrellisError> {
        self.component = None;
        std::mem::take(&mut self.root).destroy()
    }
}

/// Shared, cloneable event recorder.
#[derive(Clone, Default)]
pub struct StateLog {
    events: Rc<RefCell<Vec<String>>>,
}

impl StateLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }

    /// Drains and returns everything recorded so far.
    pub fn take(&self) -> Vec<String> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

/// Configurations of a router state in creation order, active last.
/// Convenience for stack-shape assertions.
pub fn stack_of<C: Clone>(state: &RouterState<C>) -> Vec<C> {
    state.configurations()
}
