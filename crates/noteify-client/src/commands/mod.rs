//! Sync services, one per domain.
//!
//! Every service holds its backend as an injected `Arc<B>` and talks to it
//! only through the [`noteify_shared::Backend`] contract.

pub mod auth;
pub mod conversations;
pub mod notes;
pub mod profile;
pub mod social;
