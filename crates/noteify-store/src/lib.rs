//! # noteify-store
//!
//! SQLite implementation of the Noteify data service.
//!
//! [`Database`] wraps a `rusqlite::Connection`, runs migrations on open and
//! offers generic row access over the schema in [`schema`], plus auth users,
//! sessions and stored objects. [`LocalBackend`] puts a database behind the
//! [`noteify_shared::Backend`] contract and publishes every committed change
//! on an in-process realtime hub.

pub mod auth;
pub mod backend;
pub mod database;
pub mod migrations;
pub mod objects;
pub mod realtime;
pub mod rows;
pub mod schema;

mod error;

pub use backend::LocalBackend;
pub use database::Database;
pub use error::StoreError;
pub use realtime::ChangeHub;
