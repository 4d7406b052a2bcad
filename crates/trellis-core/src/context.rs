//! Component context composition and the root host protocol.
//!
//! Every component receives exactly one [`ComponentContext`]: its own
//! [`Lifecycle`] handle plus its [`StateKeeper`] and [`InstanceKeeper`].
//! The context is a plain aggregate of shared handles, cheap to clone,
//! passed to the component's constructor and threaded down the tree by
//! routers. This is the sole mechanism by which lifecycle, saved state and
//! retained instances propagate.
//!
//! [`Root`] is the host-facing owner bundle for the top of a tree. It pairs
//! the root context with its [`LifecycleRegistry`] and implements the
//! forced-teardown protocol: snapshot state, detach the instance keeper,
//! destroy, then rebuild the tree from both.

use std::fmt;

use crate::error::TrellisError;
use crate::instance_keeper::InstanceKeeper;
use crate::lifecycle::{Lifecycle, LifecycleRegistry, LifecycleState};
use crate::state_keeper::{SavedState, StateKeeper};

/// The per-component aggregate of lifecycle and retention capabilities.
#[derive(Clone)]
pub struct ComponentContext {
    lifecycle: Lifecycle,
    state_keeper: StateKeeper,
    instance_keeper: InstanceKeeper,
}

impl ComponentContext {
    /// Assembles a context from its parts. Normally called by a router when
    /// materializing a child, or by [`Root`] for the top of the tree.
    pub fn new(
        lifecycle: Lifecycle,
        state_keeper: StateKeeper,
        instance_keeper: InstanceKeeper,
    ) -> Self {
        Self {
            lifecycle,
            state_keeper,
            instance_keeper,
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn state_keeper(&self) -> &StateKeeper {
        &self.state_keeper
    }

    pub fn instance_keeper(&self) -> &InstanceKeeper {
        &self.instance_keeper
    }
}

impl fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentContext")
            .field("lifecycle", &self.lifecycle)
            .field("state_keeper", &self.state_keeper)
            .field("instance_keeper", &self.instance_keeper)
            .finish()
    }
}

/// Host-side owner of a component tree's root.
pub struct Root {
    registry: LifecycleRegistry,
    context: ComponentContext,
    released: std::cell::Cell<bool>,
}

impl Default for Root {
    fn default() -> Self {
        Self::new()
    }
}

impl Root {
    /// A cold start: fresh lifecycle in `Initialized`, empty keepers.
    pub fn new() -> Self {
        Self::assemble(StateKeeper::new(), InstanceKeeper::new())
    }

    /// Reconstruction after a forced teardown: the state keeper is seeded
    /// from the snapshot and the retained instance keeper is re-attached,
    /// keeping every retained instance alive across the cycle.
    pub fn restored(saved: SavedState, retained: InstanceKeeper) -> Self {
        Self::assemble(StateKeeper::from_saved(saved), retained)
    }

    fn assemble(state_keeper: StateKeeper, instance_keeper: InstanceKeeper) -> Self {
        let registry = LifecycleRegistry::new();
        let context = ComponentContext::new(
            registry.lifecycle(),
            state_keeper,
            instance_keeper,
        );
        Self {
            registry,
            context,
            released: std::cell::Cell::new(false),
        }
    }

    /// The root component's context; pass a clone to its constructor.
    pub fn context(&self) -> ComponentContext {
        self.context.clone()
    }

    /// Owner-side lifecycle driver for the root.
    pub fn registry(&self) -> &LifecycleRegistry {
        &self.registry
    }

    /// Snapshots every registered state supplier in the tree without
    /// tearing anything down; used for process-level persistence.
    pub fn save_state(&self) -> Result<SavedState, TrellisError> {
        self.context.state_keeper().save()
    }

    /// Forced-teardown protocol: snapshot state, detach the instance keeper
    /// so [`destroy`] will not dispose it, destroy the tree, and hand both
    /// back for [`Root::restored`].
    ///
    /// [`destroy`]: Root::destroy
    pub fn tear_down_for_recreate(self) -> Result<(SavedState, InstanceKeeper), TrellisError> {
        let saved = self.context.state_keeper().save()?;
        self.released.set(true);
        let retained = self.context.instance_keeper().clone();
        self.destroy()?;
        Ok((saved, retained))
    }

    /// Genuine destruction of the whole tree: drives the root lifecycle to
    /// `Destroyed`, destroys the state keeper and, unless the keeper was
    /// detached by [`Root::tear_down_for_recreate`], disposes every
    /// retained instance, cascading down the tree.
    pub fn destroy(self) -> Result<(), TrellisError> {
        self.registry.drive_to(LifecycleState::Destroyed)?;
        self.context.state_keeper().destroy();
        if !self.released.get() {
            self.context.instance_keeper().dispose()?;
        }
        Ok(())
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("state", &self.registry.state())
            .field("released", &self.released.get())
            .finish()
    }
}
