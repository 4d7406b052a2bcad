//! Saved-state snapshotting.
//!
//! A [`StateKeeper`] is the per-component registry of key → supplier pairs.
//! Suppliers are invoked, at most once per [`save`], exactly when a forced
//! destroy of the owning component is imminent; a genuine navigational pop
//! never runs them, because nothing will be reconstructed from that path.
//! The resulting [`SavedState`] travels with the back-stack entry (or with
//! host-level persisted storage for the root) and is handed back, key by
//! key and each at most once, through [`consume`] on the next construction
//! of the logically same component.
//!
//! [`save`]: StateKeeper::save
//! [`consume`]: StateKeeper::consume

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::TrellisError;

/// Snapshot of a component's registered state, key → opaque blob.
///
/// Ordered by registration order so that repeated saves of the same
/// component serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedState {
    entries: IndexMap<String, Vec<u8>>,
}

impl SavedState {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn insert(&mut self, key: impl Into<String>, blob: Vec<u8>) {
        self.entries.insert(key.into(), blob);
    }
}

type Supplier = Rc<dyn Fn() -> Result<Vec<u8>, TrellisError>>;

struct StateKeeperInner {
    suppliers: RefCell<IndexMap<String, Supplier>>,
    // Blobs from the previous incarnation, pending consumption.
    pending: RefCell<IndexMap<String, Vec<u8>>>,
    destroyed: Cell<bool>,
}

/// Per-component key → supplier registry for state snapshotting.
#[derive(Clone)]
pub struct StateKeeper {
    inner: Rc<StateKeeperInner>,
}

impl Default for StateKeeper {
    fn default() -> Self {
        Self::new()
    }
}

impl StateKeeper {
    /// A keeper for a first-ever construction: nothing to consume.
    pub fn new() -> Self {
        Self::from_saved(SavedState::default())
    }

    /// A keeper seeded with a previous incarnation's snapshot.
    pub fn from_saved(saved: SavedState) -> Self {
        Self {
            inner: Rc::new(StateKeeperInner {
                suppliers: RefCell::new(IndexMap::new()),
                pending: RefCell::new(saved.entries),
                destroyed: Cell::new(false),
            }),
        }
    }

    /// Installs `supplier` for `key`. Re-registering a key before it is
    /// saved overwrites the previous supplier; the last write wins.
    pub fn register(
        &self,
        key: impl Into<String>,
        supplier: impl Fn() -> Result<Vec<u8>, TrellisError> + 'static,
    ) -> Result<(), TrellisError> {
        if self.inner.destroyed.get() {
            return Err(TrellisError::KeeperDestroyed);
        }
        self.inner
            .suppliers
            .borrow_mut()
            .insert(key.into(), Rc::new(supplier));
        Ok(())
    }

    /// Serde convenience over [`register`]: the supplier's value is encoded
    /// with the persisted-layout codec (JSON).
    ///
    /// [`register`]: StateKeeper::register
    pub fn register_value<T: Serialize, F: Fn() -> T + 'static>(
        &self,
        key: impl Into<String>,
        supplier: F,
    ) -> Result<(), TrellisError> {
        self.register(key, move || {
            serde_json::to_vec(&supplier()).map_err(TrellisError::codec)
        })
    }

    /// Removes the supplier for `key`, if any.
    pub fn unregister(&self, key: &str) {
        self.inner.suppliers.borrow_mut().shift_remove(key);
    }

    /// Hands back the blob saved under `key` by the previous incarnation, at
    /// most once; `None` on a first-ever construction or a repeated call.
    pub fn consume(&self, key: &str) -> Result<Option<Vec<u8>>, TrellisError> {
        if self.inner.destroyed.get() {
            return Err(TrellisError::KeeperDestroyed);
        }
        Ok(self.inner.pending.borrow_mut().shift_remove(key))
    }

    /// Serde convenience over [`consume`].
    ///
    /// [`consume`]: StateKeeper::consume
    pub fn consume_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, TrellisError> {
        match self.consume(key)? {
            Some(blob) => serde_json::from_slice(&blob)
                .map(Some)
                .map_err(TrellisError::codec),
            None => Ok(None),
        }
    }

    /// Runs every registered supplier once and collects the snapshot.
    /// Unconsumed blobs from the previous incarnation are carried forward
    /// unless a fresh supplier shadows their key.
    ///
    /// Owner-side: invoked by the router (or root host) when a forced
    /// destroy is imminent.
    pub fn save(&self) -> Result<SavedState, TrellisError> {
        if self.inner.destroyed.get() {
            return Err(TrellisError::KeeperDestroyed);
        }
        // Snapshot the suppliers before invoking any of them, so a supplier
        // may register or unregister on its own keeper; such changes take
        // effect from the next save.
        let suppliers: Vec<(String, Supplier)> = self
            .inner
            .suppliers
            .borrow()
            .iter()
            .map(|(key, supplier)| (key.clone(), Rc::clone(supplier)))
            .collect();
        let mut entries: IndexMap<String, Vec<u8>> = self.inner.pending.borrow().clone();
        for (key, supplier) in suppliers {
            entries.insert(key, supplier()?);
        }
        Ok(SavedState { entries })
    }

    /// Owner-side: marks the keeper destroyed and drops all suppliers and
    /// pending blobs. Subsequent `register`/`consume`/`save` calls fail with
    /// `KeeperDestroyed`.
    pub fn destroy(&self) {
        self.inner.destroyed.set(true);
        self.inner.suppliers.borrow_mut().clear();
        self.inner.pending.borrow_mut().clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }
}

impl fmt::Debug for StateKeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateKeeper")
            .field("suppliers", &self.inner.suppliers.borrow().len())
            .field("pending", &self.inner.pending.borrow().len())
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}
