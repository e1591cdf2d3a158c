//! # noteify-shared
//!
//! Types shared by every Noteify crate: domain models and identifiers, the
//! query/filter model, realtime change events, input validation, runtime
//! configuration and the [`Backend`] contract every data service implements.

pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod query;
pub mod realtime;
pub mod types;
pub mod validation;

pub use backend::{decode_row, decode_rows, Backend, Table};
pub use error::{BackendError, ConfigError, ValidationError};
pub use query::{Direction, Filter, Order, Query};
pub use realtime::{ChangeEvent, ChangeKind, Subscription};
