//! Back-stack data model.
//!
//! A router's observable state is a non-empty ordered sequence of
//! [`BackStackEntry`] values in creation order; the last entry is active.
//! [`PersistedStack`] is the serialized layout a host stores across a full
//! process teardown: encoded configurations plus optional saved-state
//! blobs, restored lazily (only the active entry is eagerly reconstructed).

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use trellis_core::SavedState;

/// Marker for navigable-destination keys: immutable values, structurally
/// comparable, serializable. Two configurations address the same slot iff
/// they compare equal. Applications typically model this as a closed enum
/// with one variant per destination, each carrying its parameters.
pub trait Configuration:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + 'static
{
}

impl<C> Configuration for C where
    C: Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + 'static
{
}

/// One slot of the back stack: the configuration plus the last captured
/// state snapshot, if the slot is not currently materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct BackStackEntry<C> {
    pub configuration: C,
    pub saved_state: Option<SavedState>,
}

/// The router's observable state. `back_stack` holds every entry below the
/// active one, in creation order; it is empty when the stack has a single
/// entry. The sequence `back_stack + [active]` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterState<C> {
    pub active: BackStackEntry<C>,
    pub back_stack: Vec<BackStackEntry<C>>,
}

impl<C: Clone> RouterState<C> {
    /// Total number of entries, active included. Never zero.
    pub fn len(&self) -> usize {
        self.back_stack.len() + 1
    }

    /// The stack never being empty, this is always `false`; provided for
    /// the conventional pairing with [`len`].
    ///
    /// [`len`]: RouterState::len
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Configurations in creation order, active last.
    pub fn configurations(&self) -> Vec<C> {
        let mut configurations: Vec<C> = self
            .back_stack
            .iter()
            .map(|entry| entry.configuration.clone())
            .collect();
        configurations.push(self.active.configuration.clone());
        configurations
    }
}

/// Serialized form of one back-stack entry. `slot` is the router-assigned
/// slot id, kept stable across recreation so retained instances find their
/// way back to the right entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub configuration: Vec<u8>,
    pub saved_state: Option<SavedState>,
    pub slot: u64,
}

/// Serialized form of a whole back stack, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedStack {
    pub entries: Vec<PersistedEntry>,
    pub next_slot: u64,
}
