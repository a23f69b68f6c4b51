//! Collection handles.
//!
//! A [`Collection`] turns dynamic arguments into native documents, calls the driver and hands
//! results back through the marshaller or a [`Cursor`]. It holds no state beyond its name.
//!
//! # Example
//!
//! ```ignore
//! let users = connection.database("app").collection("users");
//!
//! let id = users.insert(&json!({ "name": "Alice", "age": 30 }).into())?;
//! let alice = users.find_one(&json!({ "name": "Alice" }).into())?;
//! users.update(
//!     &json!({ "name": "Alice" }).into(),
//!     &json!({ "$inc": { "age": 1 } }).into(),
//!     UpdateOptions::default(),
//! )?;
//! ```

use bson::{Bson, Document, doc};

use crate::{
    connection::Database,
    cursor::Cursor,
    driver::Namespace,
    error::LayerResult,
    query::{CountQuery, FindQuery, IndexOptions, UpdateOptions},
    value::{Code, DynamicValue},
};

/// A named collection within a [`Database`].
#[derive(Debug, Clone)]
pub struct Collection {
    database: Database,
    name: String,
}

impl Collection {
    pub(crate) fn new(database: Database, name: String) -> Self {
        Self { database, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `database.collection`.
    pub fn full_name(&self) -> String {
        self.namespace().to_string()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn namespace(&self) -> Namespace {
        self.database.namespace(&self.name)
    }

    /// Returns an unstarted cursor over documents matching `query`.
    ///
    /// `Undefined` and `Null` match every document.
    pub fn find(&self, query: &DynamicValue) -> LayerResult<Cursor> {
        let filter = self.database.marshaller().filter_document(query)?;
        Ok(self.cursor(FindQuery::new(filter)))
    }

    /// Like [`find`](Self::find), returning only the fields selected by `fields`.
    pub fn find_projected(&self, query: &DynamicValue, fields: &DynamicValue) -> LayerResult<Cursor> {
        self.find(query)?.projection(fields)
    }

    /// First document matching `query`, if any.
    pub fn find_one(&self, query: &DynamicValue) -> LayerResult<Option<DynamicValue>> {
        self.find(query)?.limit(1)?.next_value()
    }

    pub fn find_one_projected(
        &self,
        query: &DynamicValue,
        fields: &DynamicValue,
    ) -> LayerResult<Option<DynamicValue>> {
        self.find_projected(query, fields)?.limit(1)?.next_value()
    }

    fn cursor(&self, query: FindQuery) -> Cursor {
        Cursor::new(
            self.database.driver().clone(),
            self.database.marshaller().clone(),
            self.namespace(),
            query,
        )
    }

    /// Number of documents matching `query`.
    pub fn count(&self, query: &DynamicValue) -> LayerResult<u64> {
        let filter = self.database.marshaller().filter_document(query)?;
        Ok(self.database.driver().count(&self.namespace(), &CountQuery::new(filter))?)
    }

    /// Inserts `obj` and returns its `_id`, generating one first when `obj` has none.
    pub fn insert(&self, obj: &DynamicValue) -> LayerResult<DynamicValue> {
        let document = self.with_id(self.database.marshaller().to_native_document(obj)?);
        let id = document.get("_id").cloned().unwrap_or(Bson::Null);

        self.database.driver().insert(&self.namespace(), vec![document])?;
        Ok(self.database.marshaller().to_dynamic(&id)?)
    }

    fn with_id(&self, document: Document) -> Document {
        if document.contains_key("_id") {
            return document;
        }

        let id = self.database.marshaller().cache().create();
        let mut with_id = doc! { "_id": id.object_id() };
        with_id.extend(document);
        with_id
    }

    /// Updates documents matching `query` with `obj`, a replacement document or a document
    /// of update operators.
    pub fn update(&self, query: &DynamicValue, obj: &DynamicValue, options: UpdateOptions) -> LayerResult<()> {
        let marshaller = self.database.marshaller();
        let filter = marshaller.filter_document(query)?;
        let update = marshaller.to_native_document(obj)?;

        Ok(self.database.driver().update(&self.namespace(), filter, update, options)?)
    }

    /// Inserts `obj`, or replaces the stored document with the same `_id`. Returns the `_id`.
    pub fn save(&self, obj: &DynamicValue) -> LayerResult<DynamicValue> {
        let document = self.database.marshaller().to_native_document(obj)?;

        let Some(id) = document.get("_id").cloned() else {
            return self.insert(obj);
        };

        self.database.driver().update(
            &self.namespace(),
            doc! { "_id": id.clone() },
            document,
            UpdateOptions::upsert(),
        )?;
        Ok(self.database.marshaller().to_dynamic(&id)?)
    }

    /// Removes every document matching `query`. `Undefined` or `Null` removes everything.
    pub fn remove(&self, query: &DynamicValue) -> LayerResult<()> {
        let filter = self.database.marshaller().filter_document(query)?;
        Ok(self.database.driver().remove(&self.namespace(), filter)?)
    }

    /// Creates an index on `keys`, e.g. `{ age: 1 }`, unless it already exists.
    pub fn ensure_index(&self, keys: &DynamicValue, options: IndexOptions) -> LayerResult<()> {
        let keys = self.database.marshaller().to_native_document(keys)?;
        Ok(self.database.driver().create_index(&self.namespace(), keys, options)?)
    }

    pub fn drop_indexes(&self) -> LayerResult<()> {
        Ok(self.database.driver().drop_indexes(&self.namespace())?)
    }

    pub fn drop(&self) -> LayerResult<()> {
        Ok(self.database.driver().drop_collection(&self.namespace())?)
    }

    /// Runs `findandmodify` with `options` (`query`, `sort`, `update`, `remove`, `new`,
    /// `upsert`) and returns the affected document, or `Null`/`Undefined` when none matched.
    pub fn find_and_modify(&self, options: &DynamicValue) -> LayerResult<DynamicValue> {
        let mut command = doc! { "findandmodify": self.name.as_str() };
        command.extend(self.database.marshaller().filter_document(options)?);

        let reply = self.database.run_native_command(command)?;
        Ok(reply.get("value").cloned().unwrap_or_default())
    }

    /// Runs `mapreduce` over this collection and returns the command reply.
    pub fn map_reduce(&self, map: &Code, reduce: &Code, options: &DynamicValue) -> LayerResult<DynamicValue> {
        let mut command = doc! {
            "mapreduce": self.name.as_str(),
            "map": Bson::JavaScriptCode(map.source().to_string()),
            "reduce": Bson::JavaScriptCode(reduce.source().to_string()),
        };
        command.extend(self.database.marshaller().filter_document(options)?);

        self.database.run_native_command(command)
    }
}
