//! Dispatch policy consulted at execution time.
//!
//! The policy is read when a call is dispatched, never when it is proposed, so
//! toggling it only affects executions that start afterwards.

#![warn(missing_docs, clippy::pedantic)]

mod policy;
mod store;

pub use policy::{DispatchMode, Policy, PolicyUpdate};
pub use store::PolicyStore;
