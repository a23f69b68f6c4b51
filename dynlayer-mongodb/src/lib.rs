//! MongoDB driver implementation for dynlayer.
//!
//! This crate provides a MongoDB-based implementation of the `Driver` trait on top of the
//! official driver's blocking client. Queries, updates, indexes and commands are handed to the
//! server as they are; every server or network error comes back as a `DriverError` carrying
//! the original error as its source.
//!
//! To use this driver, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! dynlayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! Connection pooling, authentication and topology discovery belong to the official driver
//! and are configured through the connection string given to the builder.
//!
//! # Example
//!
//! ```ignore
//! use dynlayer::{connection::Connection, mongodb::MongoDbDriverBuilder};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Connection::connect(MongoDbDriverBuilder::new("mongodb://localhost:27017"))?;
//!     let names = connection.database("app").collection_names()?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as dynlayer_mongodb;

pub mod store;

pub use store::{MongoDbDriver, MongoDbDriverBuilder};
