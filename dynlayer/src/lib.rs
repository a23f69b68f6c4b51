//! Main dynlayer crate: dynamic values over document database drivers.
//!
//! This crate is the primary entry point for users of dynlayer. It re-exports the core types
//! from the sub-crates and gives access to the available drivers.
//!
//! Applications work with [`DynamicValue`](value::DynamicValue)s: objects, arrays, strings,
//! numbers, dates, regular expressions and document identifiers. The layer converts them to
//! the store's native BSON model on the way in and back on the way out, interning document
//! identifiers so that repeated reads hand out the same [`Identifier`](identity::Identifier).
//!
//! # Features
//!
//! - **Dynamic values** - Work with loosely structured data without declaring types
//! - **Identity cache** - A bounded cache interning document identifiers per connection
//! - **Lazy cursors** - Compose `limit`, `skip`, `sort`, `hint` and `projection` before the
//!   first pull
//! - **Multiple drivers** - An in-memory driver and a MongoDB driver behind the same trait
//!
//! # Quick Start
//!
//! ```ignore
//! use dynlayer::{prelude::*, memory::MemoryDriver};
//! use serde_json::json;
//!
//! fn main() -> LayerResult<()> {
//!     let connection = Connection::new(MemoryDriver::new());
//!     let users = connection.database("app").collection("users");
//!
//!     let id = users.insert(&json!({ "name": "Alice", "age": 31 }).into())?;
//!     users.insert(&json!({ "name": "Bob", "age": 27 }).into())?;
//!
//!     // Modifiers return new cursors; nothing is sent until the first pull.
//!     let names = users
//!         .find(&json!({ "age": { "$gt": 18 } }).into())?
//!         .sort(&json!({ "age": -1 }).into())?
//!         .limit(10)?
//!         .map(|user| Ok::<_, LayerError>(user.get("name").cloned()))?;
//!
//!     println!("{names:?}");
//!
//!     // Identifiers come back interned.
//!     let alice = users.find_one(&json!({ "name": "Alice" }).into())?;
//!     assert_eq!(alice.and_then(|user| user.get("_id").cloned()), Some(id));
//!
//!     connection.shutdown()
//! }
//! ```
//!
//! # Commands
//!
//! Database commands take a dynamic value; a bare string `"x"` is sent as `{ x: 1 }`:
//!
//! ```ignore
//! let reply = connection.database("app").run_command(&"ping".into())?;
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - Fast in-memory driver for development and testing
//! - [`mongodb`] - MongoDB driver (requires `mongodb` feature)

pub mod prelude;

pub use dynlayer_core::{collection, connection, cursor, driver, error, identity, marshal, query, value};

// Re-export BSON types for convenience
pub use bson;

/// In-memory driver implementations.
pub mod memory {
    pub use dynlayer_memory::{MemoryDriver, MemoryDriverBuilder};
}

/// MongoDB driver implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use dynlayer_mongodb::{MongoDbDriver, MongoDbDriverBuilder};
}
