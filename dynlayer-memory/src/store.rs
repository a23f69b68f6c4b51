//! In-memory driver implementation.
//!
//! This module provides a simple but complete in-memory [`Driver`]: databases hold
//! collections, collections hold insertion-ordered BSON documents and their indexes, all behind
//! a single read-write lock.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Arc,
};
use bson::{Bson, Document, doc};
use parking_lot::RwLock;
use tracing::{debug, trace};

use dynlayer_core::{
    driver::{DocumentStream, Driver, DriverBuilder, Namespace},
    error::{DriverError, DriverResult},
    query::{CountQuery, FindQuery, IndexHint, IndexOptions, SortDirection, UpdateOptions, index_name},
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, compare_documents, lookup, project, sort_documents, truthy},
    update::{apply_update, is_operator_update, upsert_document, with_generated_id},
};

/// Name of the index every collection has on `_id`.
pub const ID_INDEX_NAME: &str = "_id_";

#[derive(Debug, Clone)]
struct IndexSpec {
    name: String,
    keys: Document,
    unique: bool,
}

impl IndexSpec {
    fn id_index() -> Self {
        Self {
            name: ID_INDEX_NAME.to_string(),
            keys: doc! { "_id": 1 },
            unique: true,
        }
    }

    /// Whether `keys` names the same fields in the same order and directions.
    fn has_keys(&self, keys: &Document) -> bool {
        self.keys.len() == keys.len()
            && self.keys.iter().zip(keys.iter()).all(|((a, da), (b, db))| {
                a == b && SortDirection::from_bson(da) == SortDirection::from_bson(db)
            })
    }

    fn key_of<'a>(&self, document: &'a Document) -> Vec<Comparable<'a>> {
        self.keys
            .keys()
            .map(|field| {
                lookup(document, field)
                    .first()
                    .map(|value| Comparable::from(*value))
                    .unwrap_or(Comparable::Null)
            })
            .collect()
    }
}

#[derive(Debug)]
struct CollectionData {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl Default for CollectionData {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![IndexSpec::id_index()],
        }
    }
}

impl CollectionData {
    fn matching(&self, filter: &Document) -> DriverResult<Vec<usize>> {
        let mut positions = Vec::new();

        for (position, document) in self.documents.iter().enumerate() {
            if DocumentEvaluator::new(document).evaluate(filter)? {
                positions.push(position);
            }
        }

        Ok(positions)
    }

    fn check_hint(&self, hint: Option<&IndexHint>) -> DriverResult<()> {
        let Some(hint) = hint else {
            return Ok(());
        };

        let found = self.indexes.iter().any(|index| match hint {
            IndexHint::Name(name) => &index.name == name,
            IndexHint::Keys(keys) => index.has_keys(keys),
        });

        if found {
            Ok(())
        } else {
            Err(DriverError::new(format!(
                "hint provided does not correspond to an existing index: {}",
                hint.index_name()
            )))
        }
    }

    /// Rejects `candidate` if it collides with another document on a unique index.
    fn check_unique(&self, candidate: &Document, replacing: Option<usize>) -> DriverResult<()> {
        for index in self.indexes.iter().filter(|index| index.unique) {
            let key = index.key_of(candidate);

            let duplicate = self
                .documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != replacing)
                .any(|(_, existing)| index.key_of(existing) == key);

            if duplicate {
                return Err(DriverError::new(format!(
                    "E11000 duplicate key error index: {}",
                    index.name
                )));
            }
        }

        Ok(())
    }

    fn insert(&mut self, document: Document) -> DriverResult<()> {
        let document = with_generated_id(document);
        self.check_unique(&document, None)?;
        self.documents.push(document);
        Ok(())
    }

    fn replace_at(&mut self, position: usize, document: Document) -> DriverResult<()> {
        self.check_unique(&document, Some(position))?;
        self.documents[position] = document;
        Ok(())
    }

    fn select(&self, query: &FindQuery) -> DriverResult<Vec<Document>> {
        self.check_hint(query.hint.as_ref())?;

        let mut documents = DocumentEvaluator::filter_documents(&self.documents, &query.filter)?;

        if let Some(sort) = &query.sort {
            sort_documents(&mut documents, sort);
        }

        let documents = documents
            .into_iter()
            .skip(saturating_usize(query.skip.unwrap_or(0)))
            .take(query.limit.map_or(usize::MAX, saturating_usize));

        match &query.projection {
            Some(projection) => documents
                .map(|document| project(&document, projection))
                .collect(),
            None => Ok(documents.collect()),
        }
    }
}

fn integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) => Some(*n as i64),
        _ => None,
    }
}

fn saturating_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

type DatabaseMap = BTreeMap<String, CollectionData>;

#[derive(Debug, Default)]
struct ErrorLog {
    last: Option<String>,
    previous: Option<String>,
}

#[derive(Debug, Default)]
struct StoreState {
    databases: BTreeMap<String, DatabaseMap>,
    errors: HashMap<String, ErrorLog>,
}

impl StoreState {
    fn collection(&self, namespace: &Namespace) -> Option<&CollectionData> {
        self.databases
            .get(&namespace.database)?
            .get(&namespace.collection)
    }

    fn collection_mut(&mut self, namespace: &Namespace) -> &mut CollectionData {
        self.databases
            .entry(namespace.database.clone())
            .or_default()
            .entry(namespace.collection.clone())
            .or_default()
    }

    /// Remembers the outcome of a write for `getlasterror` and `getpreverror`.
    fn record<T>(&mut self, database: &str, result: DriverResult<T>) -> DriverResult<T> {
        let log = self.errors.entry(database.to_string()).or_default();

        match &result {
            Ok(_) => log.last = None,
            Err(err) => {
                log.last = Some(err.message().to_string());
                log.previous = Some(err.message().to_string());
            },
        }

        result
    }
}

/// Thread-safe in-memory document store driver.
///
/// Clones share the same underlying data.
///
/// # Performance
///
/// Queries scan every document in a collection; indexes only enforce uniqueness and
/// validate hints. For small to medium datasets this is typically acceptable.
///
/// # Example
///
/// ```ignore
/// use dynlayer_memory::MemoryDriver;
/// use dynlayer::driver::{Driver, Namespace};
/// use bson::doc;
///
/// let driver = MemoryDriver::new();
/// let ns = Namespace::new("app", "users");
/// driver.insert(&ns, vec![doc! { "name": "Alice", "age": 30 }])?;
/// assert_eq!(driver.collection_names("app")?, vec!["users".to_string()]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemoryDriver {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryDriver {
    /// Creates a new empty in-memory driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing a `MemoryDriver`.
    pub fn builder() -> MemoryDriverBuilder {
        MemoryDriverBuilder::default()
    }

    fn update_in(
        collection: &mut CollectionData,
        filter: &Document,
        update: &Document,
        options: UpdateOptions,
    ) -> DriverResult<()> {
        if options.multi && !is_operator_update(update) {
            return Err(DriverError::new("multi update only works with $ operators"));
        }

        let mut positions = collection.matching(filter)?;
        if !options.multi {
            positions.truncate(1);
        }

        if positions.is_empty() {
            if options.upsert {
                collection.insert(upsert_document(filter, update)?)?;
            }
            return Ok(());
        }

        for position in positions {
            let updated = apply_update(&collection.documents[position], update)?;
            collection.replace_at(position, updated)?;
        }

        Ok(())
    }

    fn find_and_modify(&self, database: &str, command: &Document) -> DriverResult<Document> {
        let name = command
            .get_str("findandmodify")
            .or_else(|_| command.get_str("findAndModify"))
            .map_err(|_| DriverError::new("findandmodify needs a collection name"))?;
        let namespace = Namespace::new(database, name);

        let filter = command.get_document("query").cloned().unwrap_or_default();
        let update = command.get_document("update").ok().cloned();
        let remove = command.get("remove").is_some_and(truthy);
        let return_new = command.get("new").is_some_and(truthy);
        let upsert = command.get("upsert").is_some_and(truthy);

        if remove == update.is_some() {
            return Err(DriverError::new("findandmodify needs exactly one of remove or update"));
        }

        let mut state = self.state.write();
        let collection = state.collection_mut(&namespace);

        let mut positions = collection.matching(&filter)?;
        if let Ok(sort) = command.get_document("sort") {
            positions.sort_by(|a, b| {
                compare_documents(&collection.documents[*a], &collection.documents[*b], sort)
            });
        }

        let value = match (positions.first().copied(), update) {
            (Some(position), None) => Bson::Document(collection.documents.remove(position)),
            (Some(position), Some(update)) => {
                let before = collection.documents[position].clone();
                let after = apply_update(&before, &update)?;
                collection.replace_at(position, after.clone())?;
                Bson::Document(if return_new { after } else { before })
            },
            (None, Some(update)) if upsert => {
                let inserted = upsert_document(&filter, &update)?;
                collection.insert(inserted.clone())?;
                if return_new { Bson::Document(inserted) } else { Bson::Null }
            },
            (None, _) => Bson::Null,
        };

        let value = match (value, command.get_document("fields")) {
            (Bson::Document(document), Ok(fields)) => Bson::Document(project(&document, fields)?),
            (value, _) => value,
        };

        Ok(doc! { "value": value, "ok": 1.0 })
    }
}

/// Snapshot of a query's results, taken when the query was issued.
struct SnapshotStream {
    documents: VecDeque<Document>,
}

impl DocumentStream for SnapshotStream {
    fn next_document(&mut self) -> DriverResult<Option<Document>> {
        Ok(self.documents.pop_front())
    }
}

impl Driver for MemoryDriver {
    fn find(&self, namespace: &Namespace, query: &FindQuery) -> DriverResult<Box<dyn DocumentStream>> {
        let state = self.state.read();

        let documents = match state.collection(namespace) {
            Some(collection) => collection.select(query)?,
            None => Vec::new(),
        };
        trace!(%namespace, matched = documents.len(), "find");

        Ok(Box::new(SnapshotStream { documents: documents.into() }))
    }

    fn count(&self, namespace: &Namespace, query: &CountQuery) -> DriverResult<u64> {
        let state = self.state.read();

        let Some(collection) = state.collection(namespace) else {
            return Ok(0);
        };
        collection.check_hint(query.hint.as_ref())?;

        let matched = collection.matching(&query.filter)?.len() as u64;
        let skipped = matched.saturating_sub(query.skip.unwrap_or(0));

        Ok(query.limit.map_or(skipped, |limit| skipped.min(limit)))
    }

    fn insert(&self, namespace: &Namespace, documents: Vec<Document>) -> DriverResult<()> {
        let mut state = self.state.write();

        let collection = state.collection_mut(namespace);
        let result = documents
            .into_iter()
            .try_for_each(|document| collection.insert(document));

        state.record(&namespace.database, result)
    }

    fn update(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DriverResult<()> {
        let mut state = self.state.write();

        let result = if options.upsert {
            Self::update_in(state.collection_mut(namespace), &filter, &update, options)
        } else {
            match state
                .databases
                .get_mut(&namespace.database)
                .and_then(|collections| collections.get_mut(&namespace.collection))
            {
                Some(collection) => Self::update_in(collection, &filter, &update, options),
                None => Ok(()),
            }
        };

        state.record(&namespace.database, result)
    }

    fn remove(&self, namespace: &Namespace, filter: Document) -> DriverResult<()> {
        let mut state = self.state.write();

        let result = match state
            .databases
            .get_mut(&namespace.database)
            .and_then(|collections| collections.get_mut(&namespace.collection))
        {
            Some(collection) => collection.matching(&filter).map(|positions| {
                for position in positions.into_iter().rev() {
                    collection.documents.remove(position);
                }
            }),
            None => Ok(()),
        };

        state.record(&namespace.database, result)
    }

    fn run_command(&self, database: &str, command: Document) -> DriverResult<Document> {
        let name = command
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| DriverError::new("empty command"))?;
        debug!(database, command = %name, "memory command");

        match name.to_ascii_lowercase().as_str() {
            "ping" => Ok(doc! { "ok": 1.0 }),
            "count" => {
                let collection = command
                    .get_str(&name)
                    .map_err(|_| DriverError::new("count needs a collection name"))?;
                let query = CountQuery {
                    filter: command.get_document("query").cloned().unwrap_or_default(),
                    skip: command.get("skip").and_then(integer).map(|n| n.max(0) as u64),
                    limit: command.get("limit").and_then(integer).filter(|n| *n > 0).map(|n| n as u64),
                    hint: None,
                };
                let n = self.count(&Namespace::new(database, collection), &query)?;
                Ok(doc! { "n": n as i64, "ok": 1.0 })
            },
            "findandmodify" => {
                let result = self.find_and_modify(database, &command);
                self.state.write().record(database, result)
            },
            "getlasterror" => {
                let state = self.state.read();
                let last = state.errors.get(database).and_then(|log| log.last.clone());
                Ok(doc! { "err": last.map_or(Bson::Null, Bson::String), "n": 0, "ok": 1.0 })
            },
            "getpreverror" => {
                let state = self.state.read();
                let previous = state.errors.get(database).and_then(|log| log.previous.clone());
                let n_prev = if previous.is_some() { 1 } else { -1 };
                Ok(doc! {
                    "err": previous.map_or(Bson::Null, Bson::String),
                    "nPrev": n_prev,
                    "ok": 1.0,
                })
            },
            "reseterror" => {
                self.state.write().errors.remove(database);
                Ok(doc! { "ok": 1.0 })
            },
            "create" => {
                let collection = command
                    .get_str(&name)
                    .map_err(|_| DriverError::new("create needs a collection name"))?;
                self.create_collection(&Namespace::new(database, collection), Document::new())?;
                Ok(doc! { "ok": 1.0 })
            },
            "drop" => {
                let collection = command
                    .get_str(&name)
                    .map_err(|_| DriverError::new("drop needs a collection name"))?;
                let namespace = Namespace::new(database, collection);
                if self.state.read().collection(&namespace).is_none() {
                    return Err(DriverError::new("ns not found"));
                }
                self.drop_collection(&namespace)?;
                Ok(doc! { "ns": namespace.to_string(), "ok": 1.0 })
            },
            "dropdatabase" => {
                self.drop_database(database)?;
                Ok(doc! { "dropped": database, "ok": 1.0 })
            },
            _ => Err(DriverError::new(format!("no such command: '{name}'"))),
        }
    }

    fn database_names(&self) -> DriverResult<Vec<String>> {
        Ok(self.state.read().databases.keys().cloned().collect())
    }

    fn collection_names(&self, database: &str) -> DriverResult<Vec<String>> {
        Ok(
            self.state
                .read()
                .databases
                .get(database)
                .map(|collections| collections.keys().cloned().collect())
                .unwrap_or_default()
        )
    }

    fn create_collection(&self, namespace: &Namespace, options: Document) -> DriverResult<()> {
        let mut state = self.state.write();

        if state.collection(namespace).is_some() {
            return Err(DriverError::new(format!("collection already exists: {namespace}")));
        }

        debug!(%namespace, %options, "creating collection");
        state.collection_mut(namespace);

        Ok(())
    }

    fn drop_collection(&self, namespace: &Namespace) -> DriverResult<()> {
        let mut state = self.state.write();

        if let Some(collections) = state.databases.get_mut(&namespace.database) {
            if collections.remove(&namespace.collection).is_some() {
                debug!(%namespace, "dropped collection");
            }
        }

        Ok(())
    }

    fn drop_database(&self, database: &str) -> DriverResult<()> {
        let mut state = self.state.write();

        state.databases.remove(database);
        state.errors.remove(database);

        Ok(())
    }

    fn create_index(&self, namespace: &Namespace, keys: Document, options: IndexOptions) -> DriverResult<()> {
        if keys.is_empty() {
            return Err(DriverError::new("index keys cannot be empty"));
        }

        let mut state = self.state.write();
        let collection = state.collection_mut(namespace);
        let name = options.name.unwrap_or_else(|| index_name(&keys));

        if let Some(existing) = collection.indexes.iter().find(|index| index.name == name) {
            return if existing.has_keys(&keys) {
                Ok(())
            } else {
                Err(DriverError::new(format!("index {name} already exists with different keys")))
            };
        }

        let index = IndexSpec { name, keys, unique: options.unique };

        if index.unique {
            let mut seen: Vec<Vec<Comparable<'_>>> = Vec::new();
            for document in &collection.documents {
                let key = index.key_of(document);
                if seen.contains(&key) {
                    return Err(DriverError::new(format!(
                        "E11000 duplicate key error index: {}",
                        index.name
                    )));
                }
                seen.push(key);
            }
        }

        debug!(%namespace, index = %index.name, unique = index.unique, "creating index");
        collection.indexes.push(index);

        Ok(())
    }

    fn drop_indexes(&self, namespace: &Namespace) -> DriverResult<()> {
        let mut state = self.state.write();

        if let Some(collection) = state
            .databases
            .get_mut(&namespace.database)
            .and_then(|collections| collections.get_mut(&namespace.collection))
        {
            collection.indexes.retain(|index| index.name == ID_INDEX_NAME);
        }

        Ok(())
    }
}

/// Builder for constructing [`MemoryDriver`] instances.
#[derive(Debug, Default)]
pub struct MemoryDriverBuilder;

impl DriverBuilder for MemoryDriverBuilder {
    type Driver = MemoryDriver;

    /// Builds and returns a new [`MemoryDriver`] instance.
    ///
    /// This always succeeds and returns a freshly initialized driver.
    fn build(self) -> DriverResult<Self::Driver> {
        Ok(MemoryDriver::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> Namespace {
        Namespace::new("test", "items")
    }

    fn drain(mut stream: Box<dyn DocumentStream>) -> Vec<Document> {
        let mut documents = Vec::new();
        while let Some(document) = stream.next_document().unwrap() {
            documents.push(document);
        }
        documents
    }

    fn seeded() -> MemoryDriver {
        let driver = MemoryDriver::new();
        driver
            .insert(&ns(), (0..10).map(|n| doc! { "_id": n, "n": n, "odd": n % 2 == 1 }).collect())
            .unwrap();
        driver
    }

    #[test]
    fn find_applies_every_modifier() {
        let driver = seeded();
        let query = FindQuery::builder()
            .filter(doc! { "odd": true })
            .sort_by("n", SortDirection::Desc)
            .skip(1)
            .limit(2)
            .projection(doc! { "n": 1, "_id": 0 })
            .build();

        let documents = drain(driver.find(&ns(), &query).unwrap());
        assert_eq!(documents, vec![doc! { "n": 7 }, doc! { "n": 5 }]);
    }

    #[test]
    fn count_honours_skip_and_limit() {
        let driver = seeded();
        let query = CountQuery { skip: Some(8), limit: Some(5), ..CountQuery::new(Document::new()) };

        assert_eq!(driver.count(&ns(), &CountQuery::new(Document::new())).unwrap(), 10);
        assert_eq!(driver.count(&ns(), &query).unwrap(), 2);
    }

    #[test]
    fn duplicate_ids_are_rejected_and_recorded() {
        let driver = seeded();

        assert!(driver.insert(&ns(), vec![doc! { "_id": 3 }]).is_err());
        let reply = driver.run_command("test", doc! { "getlasterror": 1 }).unwrap();
        assert!(reply.get_str("err").unwrap().starts_with("E11000"));

        driver.insert(&ns(), vec![doc! { "_id": 30 }]).unwrap();
        let reply = driver.run_command("test", doc! { "getlasterror": 1 }).unwrap();
        assert_eq!(reply.get("err"), Some(&Bson::Null));

        let reply = driver.run_command("test", doc! { "getpreverror": 1 }).unwrap();
        assert!(reply.get_str("err").is_ok());

        driver.run_command("test", doc! { "reseterror": 1 }).unwrap();
        let reply = driver.run_command("test", doc! { "getpreverror": 1 }).unwrap();
        assert_eq!(reply.get("err"), Some(&Bson::Null));
    }

    #[test]
    fn unique_indexes_are_enforced() {
        let driver = seeded();

        assert!(driver.create_index(&ns(), doc! { "odd": 1 }, IndexOptions::unique()).is_err());
        driver.create_index(&ns(), doc! { "n": 1 }, IndexOptions::unique()).unwrap();
        assert!(driver.insert(&ns(), vec![doc! { "n": 4 }]).is_err());

        driver.drop_indexes(&ns()).unwrap();
        driver.insert(&ns(), vec![doc! { "n": 4 }]).unwrap();
    }

    #[test]
    fn hints_must_name_an_index() {
        let driver = seeded();
        let by_name = FindQuery::builder().hint(IndexHint::Name("n_1".into())).build();
        let by_id = FindQuery::builder().hint(IndexHint::Keys(doc! { "_id": 1.0 })).build();

        assert!(driver.find(&ns(), &by_name).is_err());
        assert!(driver.find(&ns(), &by_id).is_ok());

        driver.create_index(&ns(), doc! { "n": 1 }, IndexOptions::default()).unwrap();
        assert!(driver.find(&ns(), &by_name).is_ok());
    }

    #[test]
    fn updates_single_multi_and_upsert() {
        let driver = seeded();

        driver
            .update(&ns(), doc! { "odd": true }, doc! { "$inc": { "n": 100 } }, UpdateOptions::default())
            .unwrap();
        assert_eq!(driver.count(&ns(), &CountQuery::new(doc! { "n": { "$gte": 100 } })).unwrap(), 1);

        driver
            .update(&ns(), doc! { "odd": true }, doc! { "$set": { "tag": "x" } }, UpdateOptions::multi())
            .unwrap();
        assert_eq!(driver.count(&ns(), &CountQuery::new(doc! { "tag": "x" })).unwrap(), 5);

        let multi_replace = UpdateOptions { upsert: false, multi: true };
        assert!(driver.update(&ns(), doc! {}, doc! { "a": 1 }, multi_replace).is_err());

        driver
            .update(&ns(), doc! { "_id": 99 }, doc! { "v": 1 }, UpdateOptions::upsert())
            .unwrap();
        let found = drain(driver.find(&ns(), &FindQuery::new(doc! { "_id": 99 })).unwrap());
        assert_eq!(found, vec![doc! { "_id": 99, "v": 1 }]);
    }

    #[test]
    fn remove_deletes_matches() {
        let driver = seeded();

        driver.remove(&ns(), doc! { "odd": false }).unwrap();
        assert_eq!(driver.count(&ns(), &CountQuery::new(Document::new())).unwrap(), 5);
    }

    #[test]
    fn find_and_modify_returns_old_or_new() {
        let driver = seeded();

        let reply = driver
            .run_command("test", doc! {
                "findandmodify": "items",
                "query": { "odd": true },
                "sort": { "n": -1 },
                "update": { "$set": { "picked": true } },
            })
            .unwrap();
        assert_eq!(reply.get_document("value").unwrap(), &doc! { "_id": 9, "n": 9, "odd": true });

        let reply = driver
            .run_command("test", doc! {
                "findandmodify": "items",
                "query": { "n": 2 },
                "update": { "$inc": { "n": 1 } },
                "new": true,
            })
            .unwrap();
        assert_eq!(reply.get_document("value").unwrap().get_i32("n").unwrap(), 3);

        let reply = driver
            .run_command("test", doc! { "findandmodify": "items", "query": { "n": 0 }, "remove": true })
            .unwrap();
        assert!(reply.get_document("value").is_ok());
        assert_eq!(driver.count(&ns(), &CountQuery::new(doc! { "n": 0 })).unwrap(), 0);
    }

    #[test]
    fn commands_and_catalog() {
        let driver = seeded();

        assert_eq!(driver.run_command("test", doc! { "ping": 1 }).unwrap(), doc! { "ok": 1.0 });
        assert!(driver.run_command("test", doc! { "frobnicate": 1 }).is_err());

        let reply = driver.run_command("test", doc! { "count": "items", "query": { "odd": true } }).unwrap();
        assert_eq!(reply.get_i64("n").unwrap(), 5);

        driver.run_command("test", doc! { "create": "other" }).unwrap();
        assert!(driver.run_command("test", doc! { "create": "other" }).is_err());
        assert_eq!(driver.collection_names("test").unwrap(), vec!["items", "other"]);

        driver.run_command("test", doc! { "drop": "other" }).unwrap();
        assert!(driver.run_command("test", doc! { "drop": "other" }).is_err());

        assert_eq!(driver.database_names().unwrap(), vec!["test"]);
        driver.drop_database("test").unwrap();
        assert!(driver.database_names().unwrap().is_empty());
    }
}
