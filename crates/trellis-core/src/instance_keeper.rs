//! Opaque-instance retention.
//!
//! An [`InstanceKeeper`] stores live, in-memory instances that must survive
//! a forced destroy/recreate cycle of their owning component. Unlike saved
//! state, retained instances are never serialized; they are simply kept
//! alive across the recreate and handed back by key. Disposal happens
//! exactly once, when the owner is discarded for a reason other than an
//! imminent recreate: a navigational pop, a replace-removal, or the
//! parent's own keeper being disposed.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::TrellisError;

/// A retainable instance. [`on_destroy`] is the no-argument disposal hook,
/// invoked exactly once when the instance is truly abandoned.
///
/// [`on_destroy`]: RetainedInstance::on_destroy
pub trait RetainedInstance: Any {
    fn on_destroy(&self) {}
}

struct Slot {
    instance: Rc<dyn Any>,
    dispose: Box<dyn Fn()>,
}

struct InstanceKeeperInner {
    slots: RefCell<IndexMap<String, Slot>>,
    destroyed: Cell<bool>,
    disposing: Cell<bool>,
}

/// Per-component key → retained-instance registry.
#[derive(Clone)]
pub struct InstanceKeeper {
    inner: Rc<InstanceKeeperInner>,
}

impl Default for InstanceKeeper {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceKeeper {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(InstanceKeeperInner {
                slots: RefCell::new(IndexMap::new()),
                destroyed: Cell::new(false),
                disposing: Cell::new(false),
            }),
        }
    }

    /// Returns the instance retained under `key`, creating it with
    /// `factory` on the first call. Later calls return the stored instance
    /// and never invoke the new factory (first registration wins). A later
    /// call with a different `I` fails with `RetainedTypeMismatch`.
    pub fn get_or_create<I, F>(&self, key: &str, factory: F) -> Result<Rc<I>, TrellisError>
    where
        I: RetainedInstance,
        F: FnOnce() -> I,
    {
        if self.inner.destroyed.get() {
            return Err(TrellisError::KeeperDestroyed);
        }
        if let Some(slot) = self.inner.slots.borrow().get(key) {
            return Rc::clone(&slot.instance)
                .downcast::<I>()
                .map_err(|_| TrellisError::RetainedTypeMismatch {
                    key: key.to_owned(),
                });
        }
        let instance = Rc::new(factory());
        let hook = Rc::clone(&instance);
        self.inner.slots.borrow_mut().insert(
            key.to_owned(),
            Slot {
                instance: instance.clone() as Rc<dyn Any>,
                dispose: Box::new(move || hook.on_destroy()),
            },
        );
        Ok(instance)
    }

    /// Whether an instance is currently retained under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.slots.borrow().contains_key(key)
    }

    /// Runs every retained instance's disposal hook exactly once, in
    /// insertion order, and marks the keeper destroyed. A second attempt,
    /// including one triggered from inside a hook, is reported as
    /// `ReentrantDisposal` and performs nothing.
    pub fn dispose(&self) -> Result<(), TrellisError> {
        if self.inner.disposing.get() || self.inner.destroyed.get() {
            log::warn!("instance keeper disposal re-entered; ignoring");
            return Err(TrellisError::ReentrantDisposal);
        }
        self.inner.disposing.set(true);
        let slots: IndexMap<String, Slot> = self.inner.slots.take();
        for (key, slot) in slots {
            log::trace!("disposing retained instance `{key}`");
            (slot.dispose)();
        }
        self.inner.destroyed.set(true);
        self.inner.disposing.set(false);
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }
}

impl fmt::Debug for InstanceKeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceKeeper")
            .field("retained", &self.inner.slots.borrow().len())
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}
