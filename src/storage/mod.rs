//! Persistent state: destination subscriptions and delivery records.
//!
//! The delivery pipeline only sees the [`Store`] trait; [`Database`] is the
//! SQLite implementation used by the binary and by tests.

mod deliveries;
mod destinations;
mod schema;
mod store;
mod types;

pub use deliveries::DEFAULT_RETENTION;
pub use schema::Database;
pub use store::Store;
pub use types::{DatabaseError, StoreError, StoreResult};
