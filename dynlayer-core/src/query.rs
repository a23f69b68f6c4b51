//! Native query descriptions handed to a [`Driver`](crate::driver::Driver).
//!
//! Everything here is already in the store's native form: filters, projections and sort
//! specifications are BSON documents produced by the [`Marshaller`](crate::marshal::Marshaller).
//! The cursor accumulates its modifiers into a [`FindQuery`] and only hands it to the driver
//! on the first pull.
//!
//! # Query Building
//!
//! ```ignore
//! use bson::doc;
//! use dynlayer::query::{FindQuery, SortDirection};
//!
//! let query = FindQuery::builder()
//!     .filter(doc! { "status": "active" })
//!     .limit(10)
//!     .skip(20)
//!     .sort_by("created_at", SortDirection::Desc)
//!     .build();
//! ```

use bson::{Bson, Document};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The store's numeric encoding: `1` or `-1`.
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }

    /// Reads a direction from a sort or index key value. Negative numbers sort descending,
    /// anything else ascending.
    pub fn from_bson(value: &Bson) -> Self {
        let descending = match value {
            Bson::Int32(n) => *n < 0,
            Bson::Int64(n) => *n < 0,
            Bson::Double(n) => *n < 0.0,
            _ => false,
        };

        if descending { SortDirection::Desc } else { SortDirection::Asc }
    }
}

/// Which index the store should use to answer a query.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexHint {
    /// An index addressed by name, e.g. `"age_1"`.
    Name(String),
    /// An index addressed by its key specification, e.g. `{ age: 1 }`.
    Keys(Document),
}

impl IndexHint {
    /// Index name this hint refers to.
    pub fn index_name(&self) -> String {
        match self {
            IndexHint::Name(name) => name.clone(),
            IndexHint::Keys(keys) => index_name(keys),
        }
    }
}

/// A find request: filter plus every cursor modifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    /// Match criteria. Empty matches every document.
    pub filter: Document,
    /// Fields to include or exclude.
    pub projection: Option<Document>,
    /// Maximum number of documents to return. `None` means no limit.
    pub limit: Option<u64>,
    /// Number of matching documents to skip.
    pub skip: Option<u64>,
    /// Sort specification, e.g. `{ age: -1, name: 1 }`.
    pub sort: Option<Document>,
    /// Index hint.
    pub hint: Option<IndexHint>,
}

impl FindQuery {
    pub fn new(filter: Document) -> Self {
        FindQuery { filter, ..Default::default() }
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> FindQueryBuilder {
        FindQueryBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindQueryBuilder {
    query: FindQuery,
}

impl FindQueryBuilder {
    pub fn new() -> Self {
        FindQueryBuilder { query: FindQuery::default() }
    }

    pub fn filter(mut self, filter: Document) -> Self {
        self.query.filter = filter;
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.query.projection = Some(projection);
        self
    }

    /// Sets the maximum number of documents to return. Zero means no limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = (limit > 0).then_some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.query.skip = Some(skip);
        self
    }

    /// Replaces the sort specification.
    pub fn sort(mut self, sort: Document) -> Self {
        self.query.sort = Some(sort);
        self
    }

    /// Appends one key to the sort specification.
    ///
    /// # Arguments
    ///
    /// * `field` - The field name to sort by
    /// * `direction` - The sort direction (ascending or descending)
    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query
            .sort
            .get_or_insert_with(Document::new)
            .insert(field.into(), direction.as_i32());
        self
    }

    pub fn hint(mut self, hint: IndexHint) -> Self {
        self.query.hint = Some(hint);
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> FindQuery {
        self.query
    }
}

/// A count request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountQuery {
    pub filter: Document,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub hint: Option<IndexHint>,
}

impl CountQuery {
    pub fn new(filter: Document) -> Self {
        CountQuery { filter, ..Default::default() }
    }

    /// Derives a count from a find request. With `apply_skip_limit` unset the count covers
    /// every document matching the filter.
    pub fn from_find(query: &FindQuery, apply_skip_limit: bool) -> Self {
        CountQuery {
            filter: query.filter.clone(),
            skip: query.skip.filter(|_| apply_skip_limit),
            limit: query.limit.filter(|_| apply_skip_limit),
            hint: query.hint.clone(),
        }
    }
}

/// Options for [`Driver::update`](crate::driver::Driver::update).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a document when nothing matches.
    pub upsert: bool,
    /// Update every matching document instead of the first one.
    pub multi: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        UpdateOptions { upsert: true, multi: false }
    }

    pub fn multi() -> Self {
        UpdateOptions { upsert: false, multi: true }
    }
}

/// Options for [`Driver::create_index`](crate::driver::Driver::create_index).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Explicit index name. Defaults to [`index_name`] of the keys.
    pub name: Option<String>,
    /// Reject documents that duplicate an existing key.
    pub unique: bool,
}

impl IndexOptions {
    pub fn unique() -> Self {
        IndexOptions { name: None, unique: true }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// The store's default index name for a key specification, e.g. `age_1_name_-1`.
pub fn index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, value)| {
            let direction = match value {
                Bson::Int32(n) => n.to_string(),
                Bson::Int64(n) => n.to_string(),
                Bson::Double(n) => (*n as i64).to_string(),
                Bson::String(kind) => kind.clone(),
                other => other.to_string(),
            };
            format!("{field}_{direction}")
        })
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn builder_accumulates_sort_keys() {
        let query = FindQuery::builder()
            .filter(doc! { "a": 1 })
            .sort_by("age", SortDirection::Desc)
            .sort_by("name", SortDirection::Asc)
            .limit(0)
            .skip(3)
            .build();

        assert_eq!(query.sort, Some(doc! { "age": -1, "name": 1 }));
        assert_eq!(query.limit, None);
        assert_eq!(query.skip, Some(3));
    }

    #[test]
    fn count_drops_skip_and_limit_unless_asked() {
        let query = FindQuery::builder().limit(5).skip(2).build();

        let full = CountQuery::from_find(&query, false);
        assert_eq!((full.skip, full.limit), (None, None));

        let sized = CountQuery::from_find(&query, true);
        assert_eq!((sized.skip, sized.limit), (Some(2), Some(5)));
    }

    #[test]
    fn index_names_follow_store_convention() {
        assert_eq!(index_name(&doc! { "age": 1, "name": -1 }), "age_1_name_-1");
        assert_eq!(index_name(&doc! { "body": "text" }), "body_text");
        assert_eq!(IndexHint::Keys(doc! { "_id": 1 }).index_name(), "_id_1");
    }

    #[test]
    fn direction_reads_numeric_keys() {
        assert_eq!(SortDirection::from_bson(&Bson::Int32(-1)), SortDirection::Desc);
        assert_eq!(SortDirection::from_bson(&Bson::Double(1.0)), SortDirection::Asc);
    }
}
