//! Core runtime pieces for Trellis: a tree of logic-holding components
//! decoupled from any rendering technology.
//!
//! Each component gets a managed [`Lifecycle`], a [`StateKeeper`] for
//! serializable snapshots, an [`InstanceKeeper`] for live in-memory
//! retention, and a [`ComponentContext`] aggregating the three. The
//! back-stack router that drives child components lives in the
//! `trellis-router` crate.
//!
//! The core assumes a single logical thread of control per component tree:
//! everything is synchronous, nothing suspends, and handles are `Rc`-shared
//! rather than `Send`.

pub mod codec;
pub mod context;
pub mod error;
pub mod instance_keeper;
pub mod lifecycle;
pub mod state_keeper;
pub mod value_cell;

pub use codec::{ConfigurationCodec, JsonCodec};
pub use context::{ComponentContext, Root};
pub use error::{Result, TrellisError};
pub use instance_keeper::{InstanceKeeper, RetainedInstance};
pub use lifecycle::{Lifecycle, LifecycleRegistry, LifecycleState};
pub use state_keeper::{SavedState, StateKeeper};
pub use value_cell::{MutableValueCell, Subscription, ValueCell};
