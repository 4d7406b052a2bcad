//! Back-stack navigation for Trellis component trees.
//!
//! A [`Router`] owns an ordered, never-empty sequence of configuration
//! slots, materializes child components against them, and drives each
//! child's lifecycle relative to the owning component's. Push, pop,
//! replace and bring-to-front are synchronous and emit exactly one new
//! [`RouterState`] each; retention across a forced host teardown is wired
//! through the parent context's state and instance keepers.

pub mod router;
pub mod stack;

pub use router::Router;
pub use stack::{BackStackEntry, Configuration, PersistedEntry, PersistedStack, RouterState};

use std::rc::Rc;

use trellis_core::codec::ConfigurationCodec;
use trellis_core::context::ComponentContext;
use trellis_core::error::TrellisError;

/// Child-router factory on [`ComponentContext`], the composition contract's
/// fourth capability.
pub trait ChildRouterExt {
    /// Creates a router scoped under `key` in this context's keepers. Keys
    /// must be unique within one context.
    fn router<C, T>(
        &self,
        key: &str,
        initial: impl FnOnce() -> Vec<C>,
        factory: impl Fn(C, ComponentContext) -> T + 'static,
    ) -> Result<Router<C, T>, TrellisError>
    where
        C: Configuration,
        T: 'static;

    /// Same as [`router`], with an explicit configuration codec.
    ///
    /// [`router`]: ChildRouterExt::router
    fn router_with_codec<C, T>(
        &self,
        key: &str,
        codec: Rc<dyn ConfigurationCodec<C>>,
        initial: impl FnOnce() -> Vec<C>,
        factory: impl Fn(C, ComponentContext) -> T + 'static,
    ) -> Result<Router<C, T>, TrellisError>
    where
        C: Configuration,
        T: 'static;
}

impl ChildRouterExt for ComponentContext {
    fn router<C, T>(
        &self,
        key: &str,
        initial: impl FnOnce() -> Vec<C>,
        factory: impl Fn(C, ComponentContext) -> T + 'static,
    ) -> Result<Router<C, T>, TrellisError>
    where
        C: Configuration,
        T: 'static,
    {
        Router::new(self, key, initial, factory)
    }

    fn router_with_codec<C, T>(
        &self,
        key: &str,
        codec: Rc<dyn ConfigurationCodec<C>>,
        initial: impl FnOnce() -> Vec<C>,
        factory: impl Fn(C, ComponentContext) -> T + 'static,
    ) -> Result<Router<C, T>, TrellisError>
    where
        C: Configuration,
        T: 'static,
    {
        Router::with_codec(self, key, codec, initial, factory)
    }
}
