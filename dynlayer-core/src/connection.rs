//! Connection and database handles.
//!
//! A [`Connection`] owns the driver, the identity cache and the marshaller built on it. Every
//! handle derived from it ([`Database`], [`Collection`]) shares those three; handles are cheap
//! to clone and carry no state of their own.
//!
//! # Example
//!
//! ```ignore
//! use dynlayer::prelude::*;
//!
//! let connection = Connection::builder(MemoryDriver::new())
//!     .cache_capacity(1024)
//!     .build();
//! let users = connection.database("app").collection("users");
//! let id = users.insert(&json!({ "name": "Alice" }).into())?;
//! ```

use bson::{Bson, Document, doc};
use std::sync::Arc;
use tracing::debug;

use crate::{
    collection::Collection,
    driver::{Driver, DriverBuilder, Namespace},
    error::LayerResult,
    identity::{IdentityCache, IdentityCacheConfig},
    marshal::{MarshalOptions, Marshaller},
    value::{Code, DynamicValue},
};

/// Entry point: a driver plus the identity cache and marshaller shared by all handles.
#[derive(Debug, Clone)]
pub struct Connection {
    driver: Arc<dyn Driver>,
    marshaller: Marshaller,
}

impl Connection {
    /// Creates a connection with default cache and marshalling settings.
    pub fn new(driver: impl Driver + 'static) -> Self {
        Self::builder(driver).build()
    }

    pub fn builder(driver: impl Driver + 'static) -> ConnectionBuilder {
        ConnectionBuilder::new(Arc::new(driver))
    }

    /// Builds a driver and wraps it in a connection.
    ///
    /// # Errors
    ///
    /// Whatever the driver builder reports, as [`LayerError::Driver`](crate::error::LayerError::Driver).
    pub fn connect<B: DriverBuilder>(builder: B) -> LayerResult<Self> {
        Ok(Self::new(builder.build()?))
    }

    pub fn database(&self, name: impl Into<String>) -> Database {
        Database { connection: self.clone(), name: name.into() }
    }

    pub fn database_names(&self) -> LayerResult<Vec<String>> {
        Ok(self.driver.database_names()?)
    }

    pub fn marshaller(&self) -> &Marshaller {
        &self.marshaller
    }

    pub fn identity_cache(&self) -> &Arc<IdentityCache> {
        self.marshaller.cache()
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Shuts the driver down. Handles still alive afterwards fail with driver errors.
    pub fn shutdown(&self) -> LayerResult<()> {
        debug!("shutting down connection");
        Ok(self.driver.shutdown()?)
    }
}

/// Builder for a [`Connection`].
#[derive(Debug)]
pub struct ConnectionBuilder {
    driver: Arc<dyn Driver>,
    cache: IdentityCacheConfig,
    marshal: MarshalOptions,
}

impl ConnectionBuilder {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            cache: IdentityCacheConfig::default(),
            marshal: MarshalOptions::default(),
        }
    }

    /// Maximum number of interned identifiers. Zero disables the cache.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = self.cache.with_capacity(capacity);
        self
    }

    /// Deepest value nesting accepted by the marshaller.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.marshal = self.marshal.with_max_depth(max_depth);
        self
    }

    pub fn build(self) -> Connection {
        let cache = Arc::new(IdentityCache::new(self.cache));

        Connection {
            driver: self.driver,
            marshaller: Marshaller::with_options(cache, self.marshal),
        }
    }
}

/// A named database on a connection.
#[derive(Debug, Clone)]
pub struct Database {
    connection: Connection,
    name: String,
}

impl Database {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Another database on the same connection.
    pub fn sister(&self, name: impl Into<String>) -> Database {
        self.connection.database(name)
    }

    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection::new(self.clone(), name.into())
    }

    pub(crate) fn namespace(&self, collection: &str) -> Namespace {
        Namespace::new(self.name.as_str(), collection)
    }

    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.connection.driver
    }

    pub(crate) fn marshaller(&self) -> &Marshaller {
        &self.connection.marshaller
    }

    /// Runs a database command.
    ///
    /// A string command `"ping"` is shorthand for `{ ping: 1 }`. The reply is returned as is;
    /// a reply with `ok: 0` is not turned into an error here.
    pub fn run_command(&self, command: &DynamicValue) -> LayerResult<DynamicValue> {
        let command = match command {
            DynamicValue::String(name) => {
                let mut command = Document::new();
                command.insert(name.as_str(), 1);
                command
            },
            other => self.marshaller().to_native_document(other)?,
        };

        self.run_native_command(command)
    }

    pub(crate) fn run_native_command(&self, command: Document) -> LayerResult<DynamicValue> {
        debug!(database = %self.name, command = %command, "running command");

        let reply = self.driver().run_command(&self.name, command)?;
        Ok(self.marshaller().document_to_dynamic(&reply)?)
    }

    /// Creates a collection with store-specific `options` (`Undefined` or `Null` for none).
    pub fn create_collection(&self, name: impl Into<String>, options: &DynamicValue) -> LayerResult<Collection> {
        let name = name.into();
        let options = self.marshaller().filter_document(options)?;

        self.driver().create_collection(&self.namespace(&name), options)?;
        Ok(self.collection(name))
    }

    /// Drops this database.
    pub fn drop(&self) -> LayerResult<()> {
        Ok(self.driver().drop_database(&self.name)?)
    }

    pub fn collection_names(&self) -> LayerResult<Vec<String>> {
        Ok(self.driver().collection_names(&self.name)?)
    }

    /// Evaluates `code` on the server with `args`.
    pub fn eval(&self, code: &Code, args: &[DynamicValue]) -> LayerResult<DynamicValue> {
        let args = args
            .iter()
            .map(|arg| self.marshaller().to_native(arg))
            .collect::<Result<Vec<_>, _>>()?;

        self.run_native_command(doc! {
            "$eval": Bson::JavaScriptCode(code.source().to_string()),
            "args": args,
        })
    }

    pub fn last_error(&self) -> LayerResult<DynamicValue> {
        self.run_native_command(doc! { "getlasterror": 1 })
    }

    pub fn prev_error(&self) -> LayerResult<DynamicValue> {
        self.run_native_command(doc! { "getpreverror": 1 })
    }

    pub fn reset_error(&self) -> LayerResult<()> {
        self.run_native_command(doc! { "reseterror": 1 })?;
        Ok(())
    }
}
