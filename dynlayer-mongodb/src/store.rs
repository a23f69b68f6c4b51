use bson::{Document, doc};
use mongodb::{
    IndexModel,
    error::Error as MongoError,
    options::{CountOptions, FindOptions, Hint, IndexOptions as MongoIndexOptions},
    sync::{Client, Collection as MongoCollection, Cursor as MongoCursor},
};
use tracing::debug;

use dynlayer_core::{
    driver::{DocumentStream, Driver, DriverBuilder, Namespace},
    error::{DriverError, DriverResult},
    query::{CountQuery, FindQuery, IndexHint, IndexOptions, UpdateOptions},
};

/// A [`Driver`] backed by a MongoDB deployment through the blocking client.
#[derive(Debug, Clone)]
pub struct MongoDbDriver {
    client: Client,
}

impl MongoDbDriver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn builder(uri: &str) -> MongoDbDriverBuilder {
        MongoDbDriverBuilder::new(uri)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn get_collection(&self, namespace: &Namespace) -> MongoCollection<Document> {
        self.client
            .database(&namespace.database)
            .collection(&namespace.collection)
    }
}

fn driver_error(error: MongoError) -> DriverError {
    DriverError::from_source(error)
}

fn native_hint(hint: &IndexHint) -> Hint {
    match hint {
        IndexHint::Name(name) => Hint::Name(name.clone()),
        IndexHint::Keys(keys) => Hint::Keys(keys.clone()),
    }
}

fn is_operator_update(update: &Document) -> bool {
    update.keys().next().is_some_and(|key| key.starts_with('$'))
}

struct MongoStream {
    cursor: MongoCursor<Document>,
}

impl DocumentStream for MongoStream {
    fn next_document(&mut self) -> DriverResult<Option<Document>> {
        self.cursor.next().transpose().map_err(driver_error)
    }
}

impl Driver for MongoDbDriver {
    fn find(&self, namespace: &Namespace, query: &FindQuery) -> DriverResult<Box<dyn DocumentStream>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(skip) = query.skip {
            options.skip = Some(skip);
        }
        options.sort = query.sort.clone();
        options.projection = query.projection.clone();
        options.hint = query.hint.as_ref().map(native_hint);

        debug!(%namespace, filter = %query.filter, "find");

        let cursor = self
            .get_collection(namespace)
            .find(query.filter.clone())
            .with_options(options)
            .run()
            .map_err(driver_error)?;

        Ok(Box::new(MongoStream { cursor }))
    }

    fn count(&self, namespace: &Namespace, query: &CountQuery) -> DriverResult<u64> {
        let mut options = CountOptions::default();

        options.skip = query.skip;
        options.limit = query.limit;
        options.hint = query.hint.as_ref().map(native_hint);

        self.get_collection(namespace)
            .count_documents(query.filter.clone())
            .with_options(options)
            .run()
            .map_err(driver_error)
    }

    fn insert(&self, namespace: &Namespace, documents: Vec<Document>) -> DriverResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        self.get_collection(namespace)
            .insert_many(documents)
            .run()
            .map_err(driver_error)?;

        Ok(())
    }

    fn update(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> DriverResult<()> {
        let collection = self.get_collection(namespace);

        if !is_operator_update(&update) {
            if options.multi {
                return Err(DriverError::new("multi update only works with $ operators"));
            }

            collection
                .replace_one(filter, update)
                .upsert(options.upsert)
                .run()
                .map_err(driver_error)?;
        } else if options.multi {
            collection
                .update_many(filter, update)
                .upsert(options.upsert)
                .run()
                .map_err(driver_error)?;
        } else {
            collection
                .update_one(filter, update)
                .upsert(options.upsert)
                .run()
                .map_err(driver_error)?;
        }

        Ok(())
    }

    fn remove(&self, namespace: &Namespace, filter: Document) -> DriverResult<()> {
        self.get_collection(namespace)
            .delete_many(filter)
            .run()
            .map_err(driver_error)?;

        Ok(())
    }

    fn run_command(&self, database: &str, command: Document) -> DriverResult<Document> {
        debug!(database, %command, "command");

        self.client
            .database(database)
            .run_command(command)
            .run()
            .map_err(driver_error)
    }

    fn database_names(&self) -> DriverResult<Vec<String>> {
        self.client
            .list_database_names()
            .run()
            .map_err(driver_error)
    }

    fn collection_names(&self, database: &str) -> DriverResult<Vec<String>> {
        self.client
            .database(database)
            .list_collection_names()
            .run()
            .map_err(driver_error)
    }

    fn create_collection(&self, namespace: &Namespace, options: Document) -> DriverResult<()> {
        let mut command = doc! { "create": namespace.collection.as_str() };
        command.extend(options);

        self.run_command(&namespace.database, command)?;

        Ok(())
    }

    fn drop_collection(&self, namespace: &Namespace) -> DriverResult<()> {
        self.get_collection(namespace)
            .drop()
            .run()
            .map_err(driver_error)
    }

    fn drop_database(&self, database: &str) -> DriverResult<()> {
        self.client
            .database(database)
            .drop()
            .run()
            .map_err(driver_error)
    }

    fn create_index(&self, namespace: &Namespace, keys: Document, options: IndexOptions) -> DriverResult<()> {
        self.get_collection(namespace)
            .create_index(
                IndexModel::builder()
                    .keys(keys)
                    .options(
                        MongoIndexOptions::builder()
                            .name(options.name)
                            .unique(options.unique)
                            .build()
                    )
                    .build()
            )
            .run()
            .map_err(driver_error)?;

        Ok(())
    }

    fn drop_indexes(&self, namespace: &Namespace) -> DriverResult<()> {
        self.get_collection(namespace)
            .drop_indexes()
            .run()
            .map_err(driver_error)
    }

    fn shutdown(&self) -> DriverResult<()> {
        self.client.clone().shutdown().run();

        Ok(())
    }
}

/// Builds a [`MongoDbDriver`] from a connection string.
#[derive(Debug, Clone)]
pub struct MongoDbDriverBuilder {
    uri: String,
}

impl MongoDbDriverBuilder {
    pub fn new(uri: &str) -> Self {
        Self { uri: uri.to_string() }
    }
}

impl DriverBuilder for MongoDbDriverBuilder {
    type Driver = MongoDbDriver;

    fn build(self) -> DriverResult<Self::Driver> {
        Ok(MongoDbDriver::new(
            Client::with_uri_str(&self.uri).map_err(driver_error)?,
        ))
    }
}
