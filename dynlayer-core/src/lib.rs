//! A dynamic-value adapter over document database drivers.
//!
//! This crate is the core of the dynlayer project and provides:
//!
//! - **Dynamic values** ([`value`]) - The closed set of value kinds an application works with
//! - **Identity cache** ([`identity`]) - Document identifiers and their bounded interning cache
//! - **Type marshaller** ([`marshal`]) - Recursive conversion between dynamic values and BSON
//! - **Cursors** ([`cursor`]) - Lazy, modifier-composable iteration over query results
//! - **Driver abstraction** ([`driver`]) - The trait a document store driver implements
//! - **Query types** ([`query`]) - Native find, count, update and index descriptions
//! - **Handles** ([`connection`], [`collection`]) - Thin connection, database and collection handles
//! - **Error handling** ([`error`]) - Error types and result types for every layer
//!
//! # Example
//!
//! ```ignore
//! use dynlayer_core::{connection::Connection, value::DynamicValue};
//! use serde_json::json;
//!
//! let connection = Connection::new(driver);
//! let users = connection.database("app").collection("users");
//!
//! users.insert(&json!({ "name": "Alice", "tags": ["admin"] }).into())?;
//!
//! let names = users
//!     .find(&DynamicValue::Null)?
//!     .sort(&json!({ "name": 1 }).into())?
//!     .map(|user| Ok::<_, dynlayer_core::error::LayerError>(user.get("name").cloned()))?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as dynlayer_core;

pub mod collection;
pub mod connection;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod identity;
pub mod marshal;
pub mod query;
pub mod value;
