//! In-memory document store driver for dynlayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `Driver` trait. It keeps
//! every database behind one `parking_lot` read-write lock and is ideal for development,
//! testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes through a shared read-write lock
//! - **Query documents** - `$and $or $nor`, comparison operators, `$in $nin $exists $not`,
//!   dotted paths and array element matching
//! - **Cursor modifiers** - Multi-key sort, skip, limit, projections and index hints
//! - **Updates** - Replacement documents and `$set $unset $inc`, with upsert and multi
//! - **Indexes** - Unique index enforcement, including the implicit `_id_` index
//! - **Commands** - `ping`, `count`, `findandmodify`, `getlasterror`, `getpreverror`,
//!   `reseterror`, `create`, `drop`, `dropDatabase`
//!
//! # Quick Start
//!
//! ```ignore
//! use dynlayer::{connection::Connection, memory::MemoryDriver};
//! use serde_json::json;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Connection::new(MemoryDriver::new());
//!     let users = connection.database("app").collection("users");
//!
//!     users.insert(&json!({ "name": "Alice" }).into())?;
//!     assert_eq!(users.count(&json!({}).into())?, 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as dynlayer_memory;

pub mod store;
mod evaluator;
mod update;

pub use store::{MemoryDriver, MemoryDriverBuilder};
