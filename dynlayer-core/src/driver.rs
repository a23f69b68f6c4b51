//! The seam between the adapter and the underlying document store driver.
//!
//! Everything that talks to a store goes through [`Driver`]. The adapter hands it native
//! documents and native query descriptions and gets native documents back; it never looks at
//! the wire. Driver failures travel back up as [`DriverError`](crate::error::DriverError)
//! untouched.
//!
//! # Traits
//!
//! - [`Driver`]: the operations the handles and the cursor need
//! - [`DocumentStream`]: a pull-based stream of result documents
//! - [`DriverBuilder`]: factory trait for creating driver instances
//!
//! # Examples
//!
//! ```ignore
//! use dynlayer::driver::{Driver, Namespace};
//! use dynlayer::query::FindQuery;
//! use bson::doc;
//!
//! let driver = MyDriverImpl::new();
//! let ns = Namespace::new("app", "users");
//!
//! driver.insert(&ns, vec![doc! { "name": "Alice", "age": 30 }])?;
//! let mut stream = driver.find(&ns, &FindQuery::new(doc! { "age": { "$gt": 18 } }))?;
//! while let Some(document) = stream.next_document()? {
//!     println!("{document}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use bson::Document;
use std::{fmt, fmt::Debug, sync::Arc};

use crate::{
    error::DriverResult,
    query::{CountQuery, FindQuery, IndexOptions, UpdateOptions},
};

/// A `database.collection` pair addressing one collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Namespace { database: database.into(), collection: collection.into() }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// A stream of result documents, pulled one at a time.
///
/// `Ok(None)` marks the end of the stream; pulling again keeps returning `Ok(None)`.
pub trait DocumentStream: Send {
    fn next_document(&mut self) -> DriverResult<Option<Document>>;
}

impl<S: DocumentStream + ?Sized> DocumentStream for Box<S> {
    fn next_document(&mut self) -> DriverResult<Option<Document>> {
        (**self).next_document()
    }
}

/// Abstract interface for document store drivers.
///
/// All calls block until the store answers.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: one driver is shared by every handle of a
/// connection, and cursors may be moved across threads.
///
/// # Error Handling
///
/// Every failure is a [`DriverError`](crate::error::DriverError). Implementations wrap their
/// own errors with [`DriverError::from_source`](crate::error::DriverError::from_source) and
/// must not retry on the caller's behalf.
pub trait Driver: Send + Sync + Debug {
    /// Starts a query and returns its result stream.
    ///
    /// # Arguments
    ///
    /// * `namespace` - The collection to query
    /// * `query` - Filter and modifiers, already in native form
    fn find(&self, namespace: &Namespace, query: &FindQuery) -> DriverResult<Box<dyn DocumentStream>>;

    /// Counts documents matching a filter.
    fn count(&self, namespace: &Namespace, query: &CountQuery) -> DriverResult<u64>;

    /// Inserts documents into a collection, creating it if needed.
    fn insert(&self, namespace: &Namespace, documents: Vec<Document>) -> DriverResult<()>;

    /// Updates documents matching `filter`.
    ///
    /// `update` is either a replacement document or a document of update operators.
    fn update(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DriverResult<()>;

    /// Removes every document matching `filter`.
    fn remove(&self, namespace: &Namespace, filter: Document) -> DriverResult<()>;

    /// Runs a database command and returns the store's reply.
    fn run_command(&self, database: &str, command: Document) -> DriverResult<Document>;

    fn database_names(&self) -> DriverResult<Vec<String>>;

    fn collection_names(&self, database: &str) -> DriverResult<Vec<String>>;

    /// Creates a collection explicitly.
    ///
    /// # Arguments
    ///
    /// * `namespace` - The collection to create
    /// * `options` - Store-specific creation options such as `{ capped: true, size: 4096 }`
    fn create_collection(&self, namespace: &Namespace, options: Document) -> DriverResult<()>;

    fn drop_collection(&self, namespace: &Namespace) -> DriverResult<()>;

    fn drop_database(&self, database: &str) -> DriverResult<()>;

    /// Creates an index on `keys` unless an equivalent one exists.
    fn create_index(&self, namespace: &Namespace, keys: Document, options: IndexOptions) -> DriverResult<()>;

    /// Drops every index except the one on `_id`.
    fn drop_indexes(&self, namespace: &Namespace) -> DriverResult<()>;

    /// Releases driver resources.
    ///
    /// The default implementation is a no-op, but drivers with external connections should
    /// override this.
    fn shutdown(&self) -> DriverResult<()> {
        Ok(())
    }
}

impl<D> Driver for &D
where
    D: Driver + ?Sized,
{
    fn find(&self, namespace: &Namespace, query: &FindQuery) -> DriverResult<Box<dyn DocumentStream>> {
        (**self).find(namespace, query)
    }

    fn count(&self, namespace: &Namespace, query: &CountQuery) -> DriverResult<u64> {
        (**self).count(namespace, query)
    }

    fn insert(&self, namespace: &Namespace, documents: Vec<Document>) -> DriverResult<()> {
        (**self).insert(namespace, documents)
    }

    fn update(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DriverResult<()> {
        (**self).update(namespace, filter, update, options)
    }

    fn remove(&self, namespace: &Namespace, filter: Document) -> DriverResult<()> {
        (**self).remove(namespace, filter)
    }

    fn run_command(&self, database: &str, command: Document) -> DriverResult<Document> {
        (**self).run_command(database, command)
    }

    fn database_names(&self) -> DriverResult<Vec<String>> {
        (**self).database_names()
    }

    fn collection_names(&self, database: &str) -> DriverResult<Vec<String>> {
        (**self).collection_names(database)
    }

    fn create_collection(&self, namespace: &Namespace, options: Document) -> DriverResult<()> {
        (**self).create_collection(namespace, options)
    }

    fn drop_collection(&self, namespace: &Namespace) -> DriverResult<()> {
        (**self).drop_collection(namespace)
    }

    fn drop_database(&self, database: &str) -> DriverResult<()> {
        (**self).drop_database(database)
    }

    fn create_index(&self, namespace: &Namespace, keys: Document, options: IndexOptions) -> DriverResult<()> {
        (**self).create_index(namespace, keys, options)
    }

    fn drop_indexes(&self, namespace: &Namespace) -> DriverResult<()> {
        (**self).drop_indexes(namespace)
    }

    fn shutdown(&self) -> DriverResult<()> {
        (**self).shutdown()
    }
}

impl<D> Driver for Arc<D>
where
    D: Driver + ?Sized,
{
    fn find(&self, namespace: &Namespace, query: &FindQuery) -> DriverResult<Box<dyn DocumentStream>> {
        (**self).find(namespace, query)
    }

    fn count(&self, namespace: &Namespace, query: &CountQuery) -> DriverResult<u64> {
        (**self).count(namespace, query)
    }

    fn insert(&self, namespace: &Namespace, documents: Vec<Document>) -> DriverResult<()> {
        (**self).insert(namespace, documents)
    }

    fn update(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DriverResult<()> {
        (**self).update(namespace, filter, update, options)
    }

    fn remove(&self, namespace: &Namespace, filter: Document) -> DriverResult<()> {
        (**self).remove(namespace, filter)
    }

    fn run_command(&self, database: &str, command: Document) -> DriverResult<Document> {
        (**self).run_command(database, command)
    }

    fn database_names(&self) -> DriverResult<Vec<String>> {
        (**self).database_names()
    }

    fn collection_names(&self, database: &str) -> DriverResult<Vec<String>> {
        (**self).collection_names(database)
    }

    fn create_collection(&self, namespace: &Namespace, options: Document) -> DriverResult<()> {
        (**self).create_collection(namespace, options)
    }

    fn drop_collection(&self, namespace: &Namespace) -> DriverResult<()> {
        (**self).drop_collection(namespace)
    }

    fn drop_database(&self, database: &str) -> DriverResult<()> {
        (**self).drop_database(database)
    }

    fn create_index(&self, namespace: &Namespace, keys: Document, options: IndexOptions) -> DriverResult<()> {
        (**self).create_index(namespace, keys, options)
    }

    fn drop_indexes(&self, namespace: &Namespace) -> DriverResult<()> {
        (**self).drop_indexes(namespace)
    }

    fn shutdown(&self) -> DriverResult<()> {
        (**self).shutdown()
    }
}

/// Factory trait for creating driver instances.
pub trait DriverBuilder {
    type Driver: Driver + 'static;

    fn build(self) -> DriverResult<Self::Driver>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_renders_dotted() {
        assert_eq!(Namespace::new("app", "users").to_string(), "app.users");
    }
}
