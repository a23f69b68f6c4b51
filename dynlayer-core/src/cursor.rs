//! Lazy, modifier-composable iteration over query results.
//!
//! A [`Cursor`] starts out [`Unstarted`](CursorStatus::Unstarted). While unstarted, the
//! modifiers ([`limit`](Cursor::limit), [`skip`](Cursor::skip), [`sort`](Cursor::sort),
//! [`hint`](Cursor::hint), [`projection`](Cursor::projection)) each return a new cursor whose
//! query carries the modifier, leaving the receiver untouched. The query reaches the driver on
//! the first pull; from then on the cursor is [`Iterating`](CursorStatus::Iterating) and
//! modifiers fail with [`CursorStateError`]. Once the stream runs dry the cursor is
//! [`Exhausted`](CursorStatus::Exhausted) for good. [`copy`](Cursor::copy) gives an
//! independent unstarted cursor over the same query at any point.
//!
//! # Example
//!
//! ```ignore
//! let adults = users
//!     .find(&json!({ "age": { "$gte": 18 } }).into())?
//!     .sort(&json!({ "age": -1 }).into())?
//!     .limit(10)?;
//!
//! adults.copy().for_each(|user| -> LayerResult<()> {
//!     println!("{}", user.to_json());
//!     Ok(())
//! })?;
//! let total = adults.count()?;
//! ```

use bson::Document;
use std::{fmt, sync::Arc};
use tracing::{debug, trace};

use crate::{
    driver::{DocumentStream, Driver, Namespace},
    error::{CursorStateError, LayerError, LayerResult},
    marshal::Marshaller,
    query::{CountQuery, FindQuery, IndexHint, SortDirection},
    value::DynamicValue,
};

/// Public view of a cursor's position in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStatus {
    /// No document has been pulled; modifiers are allowed.
    Unstarted,
    /// At least one pull happened.
    Iterating,
    /// The stream reported its end.
    Exhausted,
}

impl fmt::Display for CursorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CursorStatus::Unstarted => "unstarted",
            CursorStatus::Iterating => "iterating",
            CursorStatus::Exhausted => "exhausted",
        })
    }
}

enum CursorState {
    Unstarted,
    Iterating {
        stream: Box<dyn DocumentStream>,
        peeked: Option<Document>,
    },
    Exhausted,
}

impl CursorState {
    fn status(&self) -> CursorStatus {
        match self {
            CursorState::Unstarted => CursorStatus::Unstarted,
            CursorState::Iterating { .. } => CursorStatus::Iterating,
            CursorState::Exhausted => CursorStatus::Exhausted,
        }
    }
}

impl fmt::Debug for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorState::Iterating { peeked, .. } => f
                .debug_struct("Iterating")
                .field("peeked", &peeked.is_some())
                .finish_non_exhaustive(),
            other => write!(f, "{:?}", other.status()),
        }
    }
}

/// A forward-only cursor over the results of a find.
///
/// A cursor is `Send` but is not meant to be iterated from several threads; use
/// [`copy`](Cursor::copy) for independent passes.
#[derive(Debug)]
pub struct Cursor {
    driver: Arc<dyn Driver>,
    marshaller: Marshaller,
    namespace: Namespace,
    query: FindQuery,
    state: CursorState,
    pulled: u64,
}

impl Cursor {
    /// Creates an unstarted cursor. Nothing is sent to the driver until the first pull.
    pub fn new(
        driver: Arc<dyn Driver>,
        marshaller: Marshaller,
        namespace: Namespace,
        query: FindQuery,
    ) -> Self {
        Self {
            driver,
            marshaller,
            namespace,
            query,
            state: CursorState::Unstarted,
            pulled: 0,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The query this cursor will issue, modifiers included.
    pub fn query(&self) -> &FindQuery {
        &self.query
    }

    pub fn status(&self) -> CursorStatus {
        self.state.status()
    }

    pub fn is_started(&self) -> bool {
        self.status() != CursorStatus::Unstarted
    }

    /// Returns a cursor that yields at most `limit` documents. Zero means no limit.
    ///
    /// # Errors
    ///
    /// [`CursorStateError`] if this cursor has started iterating.
    pub fn limit(&self, limit: u64) -> LayerResult<Cursor> {
        self.modified("limit", |query| {
            query.limit = (limit > 0).then_some(limit);
            Ok(())
        })
    }

    /// Returns a cursor that skips the first `skip` matching documents.
    pub fn skip(&self, skip: u64) -> LayerResult<Cursor> {
        self.modified("skip", |query| {
            query.skip = Some(skip);
            Ok(())
        })
    }

    /// Returns a cursor sorted by `spec`, an object such as `{ age: -1, name: 1 }`.
    pub fn sort(&self, spec: &DynamicValue) -> LayerResult<Cursor> {
        self.ensure_unstarted("sort")?;
        let sort = self.marshaller.to_native_document(spec)?;
        self.modified("sort", |query| {
            query.sort = Some(sort);
            Ok(())
        })
    }

    /// Returns a cursor with one more sort key appended.
    pub fn sort_by(&self, field: impl Into<String>, direction: SortDirection) -> LayerResult<Cursor> {
        let field = field.into();
        self.modified("sort", |query| {
            query
                .sort
                .get_or_insert_with(Document::new)
                .insert(field, direction.as_i32());
            Ok(())
        })
    }

    /// Returns a cursor hinted to use an index, given by name (a string) or by key object.
    pub fn hint(&self, index: &DynamicValue) -> LayerResult<Cursor> {
        self.ensure_unstarted("hint")?;
        let hint = match index {
            DynamicValue::String(name) => IndexHint::Name(name.clone()),
            keys => IndexHint::Keys(self.marshaller.to_native_document(keys)?),
        };
        self.modified("hint", |query| {
            query.hint = Some(hint);
            Ok(())
        })
    }

    /// Returns a cursor that only returns the selected fields. `Null` or `Undefined` clears it.
    pub fn projection(&self, fields: &DynamicValue) -> LayerResult<Cursor> {
        self.ensure_unstarted("projection")?;
        let projection = self.marshaller.filter_document(fields)?;
        self.modified("projection", |query| {
            query.projection = (!projection.is_empty()).then_some(projection);
            Ok(())
        })
    }

    fn modified(
        &self,
        modifier: &'static str,
        apply: impl FnOnce(&mut FindQuery) -> LayerResult<()>,
    ) -> LayerResult<Cursor> {
        self.ensure_unstarted(modifier)?;

        let mut query = self.query.clone();
        apply(&mut query)?;

        Ok(Cursor::new(
            self.driver.clone(),
            self.marshaller.clone(),
            self.namespace.clone(),
            query,
        ))
    }

    /// Modifiers are only accepted before the first pull, whatever their argument.
    fn ensure_unstarted(&self, modifier: &'static str) -> LayerResult<()> {
        if self.is_started() {
            return Err(CursorStateError { modifier, status: self.status() }.into());
        }

        Ok(())
    }

    /// Returns a new unstarted cursor with the same query and modifiers, whatever state this
    /// one is in.
    pub fn copy(&self) -> Cursor {
        Cursor::new(
            self.driver.clone(),
            self.marshaller.clone(),
            self.namespace.clone(),
            self.query.clone(),
        )
    }

    /// Number of documents matching the filter, ignoring `limit` and `skip`.
    ///
    /// Does not touch this cursor's stream.
    pub fn count(&self) -> LayerResult<u64> {
        Ok(self.driver.count(&self.namespace, &CountQuery::from_find(&self.query, false))?)
    }

    /// Number of documents this cursor would yield, with `limit` and `skip` applied.
    pub fn size(&self) -> LayerResult<u64> {
        Ok(self.driver.count(&self.namespace, &CountQuery::from_find(&self.query, true))?)
    }

    fn start(&mut self) -> LayerResult<()> {
        debug!(namespace = %self.namespace, filter = %self.query.filter, "issuing query");

        let stream = self.driver.find(&self.namespace, &self.query)?;
        self.state = CursorState::Iterating { stream, peeked: None };

        Ok(())
    }

    fn fetch(&mut self) -> LayerResult<Option<Document>> {
        if let CursorState::Unstarted = self.state {
            self.start()?;
        }

        let CursorState::Iterating { stream, peeked } = &mut self.state else {
            return Ok(None);
        };

        if let Some(document) = peeked.take() {
            return Ok(Some(document));
        }

        let reached_limit = self.query.limit.is_some_and(|limit| self.pulled >= limit);
        let next = if reached_limit { None } else { stream.next_document()? };

        match next {
            Some(document) => {
                self.pulled += 1;
                trace!(namespace = %self.namespace, pulled = self.pulled, "pulled document");
                Ok(Some(document))
            },
            None => {
                self.state = CursorState::Exhausted;
                debug!(namespace = %self.namespace, pulled = self.pulled, "cursor exhausted");
                Ok(None)
            },
        }
    }

    /// Pulls the next document and converts it. `None` once exhausted.
    pub fn next_value(&mut self) -> LayerResult<Option<DynamicValue>> {
        match self.fetch()? {
            Some(document) => Ok(Some(self.marshaller.document_to_dynamic(&document)?)),
            None => Ok(None),
        }
    }

    /// Whether another document is available. Starts the cursor if it was unstarted.
    pub fn has_next(&mut self) -> LayerResult<bool> {
        match self.fetch()? {
            Some(document) => {
                if let CursorState::Iterating { peeked, .. } = &mut self.state {
                    *peeked = Some(document);
                }
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Invokes `callback` with every remaining document, in order.
    ///
    /// The first error, from the cursor or from the callback, stops the iteration and is
    /// returned; documents after it are never pulled.
    pub fn for_each<F, E>(&mut self, mut callback: F) -> Result<(), E>
    where
        F: FnMut(DynamicValue) -> Result<(), E>,
        E: From<LayerError>,
    {
        while let Some(value) = self.next_value()? {
            callback(value)?;
        }

        Ok(())
    }

    /// Collects `callback`'s result for every remaining document.
    pub fn map<T, F, E>(&mut self, mut callback: F) -> Result<Vec<T>, E>
    where
        F: FnMut(DynamicValue) -> Result<T, E>,
        E: From<LayerError>,
    {
        let mut mapped = Vec::new();
        self.for_each(|value| -> Result<(), E> {
            mapped.push(callback(value)?);
            Ok(())
        })?;

        Ok(mapped)
    }

    /// Collects every remaining document.
    pub fn to_array(&mut self) -> LayerResult<Vec<DynamicValue>> {
        self.map(Ok)
    }

    /// Borrowing iterator over the remaining documents.
    pub fn values(&mut self) -> Values<'_> {
        Values { cursor: self }
    }
}

/// Iterator returned by [`Cursor::values`].
#[derive(Debug)]
pub struct Values<'a> {
    cursor: &'a mut Cursor,
}

impl Iterator for Values<'_> {
    type Item = LayerResult<DynamicValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_value().transpose()
    }
}

/// Owning iterator over a cursor's documents.
#[derive(Debug)]
pub struct IntoValues {
    cursor: Cursor,
}

impl Iterator for IntoValues {
    type Item = LayerResult<DynamicValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_value().transpose()
    }
}

impl IntoIterator for Cursor {
    type Item = LayerResult<DynamicValue>;
    type IntoIter = IntoValues;

    fn into_iter(self) -> Self::IntoIter {
        IntoValues { cursor: self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{DriverError, DriverResult},
        identity::IdentityCache,
        query::{IndexOptions, UpdateOptions},
        value::DynamicMap,
    };
    use bson::doc;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Serves a fixed document list, ignoring every modifier, and records each find.
    #[derive(Debug, Default)]
    struct RecordingDriver {
        documents: Vec<Document>,
        finds: Mutex<Vec<FindQuery>>,
        fail_after: Option<usize>,
    }

    struct ListStream {
        documents: VecDeque<Document>,
        fail_after: Option<usize>,
        served: usize,
    }

    impl DocumentStream for ListStream {
        fn next_document(&mut self) -> DriverResult<Option<Document>> {
            if self.fail_after == Some(self.served) {
                return Err(DriverError::new("connection reset"));
            }
            self.served += 1;
            Ok(self.documents.pop_front())
        }
    }

    impl Driver for RecordingDriver {
        fn find(&self, _: &Namespace, query: &FindQuery) -> DriverResult<Box<dyn DocumentStream>> {
            self.finds.lock().push(query.clone());
            Ok(Box::new(ListStream {
                documents: self.documents.iter().cloned().collect(),
                fail_after: self.fail_after,
                served: 0,
            }))
        }

        fn count(&self, _: &Namespace, query: &CountQuery) -> DriverResult<u64> {
            let total = self.documents.len() as u64;
            let skipped = total.saturating_sub(query.skip.unwrap_or(0));
            Ok(query.limit.map_or(skipped, |limit| skipped.min(limit)))
        }

        fn insert(&self, _: &Namespace, _: Vec<Document>) -> DriverResult<()> {
            Err(DriverError::new("read only"))
        }

        fn update(&self, _: &Namespace, _: Document, _: Document, _: UpdateOptions) -> DriverResult<()> {
            Err(DriverError::new("read only"))
        }

        fn remove(&self, _: &Namespace, _: Document) -> DriverResult<()> {
            Err(DriverError::new("read only"))
        }

        fn run_command(&self, _: &str, _: Document) -> DriverResult<Document> {
            Ok(doc! { "ok": 1.0 })
        }

        fn database_names(&self) -> DriverResult<Vec<String>> {
            Ok(vec![])
        }

        fn collection_names(&self, _: &str) -> DriverResult<Vec<String>> {
            Ok(vec![])
        }

        fn create_collection(&self, _: &Namespace, _: Document) -> DriverResult<()> {
            Ok(())
        }

        fn drop_collection(&self, _: &Namespace) -> DriverResult<()> {
            Ok(())
        }

        fn drop_database(&self, _: &str) -> DriverResult<()> {
            Ok(())
        }

        fn create_index(&self, _: &Namespace, _: Document, _: IndexOptions) -> DriverResult<()> {
            Ok(())
        }

        fn drop_indexes(&self, _: &Namespace) -> DriverResult<()> {
            Ok(())
        }
    }

    fn documents(n: i32) -> Vec<Document> {
        (0..n).map(|i| doc! { "n": i }).collect()
    }

    fn cursor_over(driver: &Arc<RecordingDriver>) -> Cursor {
        Cursor::new(
            driver.clone(),
            Marshaller::new(Arc::new(IdentityCache::default())),
            Namespace::new("test", "items"),
            FindQuery::default(),
        )
    }

    #[test]
    fn nothing_is_issued_before_the_first_pull() {
        let driver = Arc::new(RecordingDriver { documents: documents(3), ..Default::default() });
        let cursor = cursor_over(&driver).limit(2).unwrap().skip(1).unwrap();

        assert!(driver.finds.lock().is_empty());
        assert_eq!(cursor.status(), CursorStatus::Unstarted);
        assert_eq!(cursor.query().limit, Some(2));
        assert_eq!(cursor.query().skip, Some(1));
    }

    #[test]
    fn modifiers_leave_the_receiver_untouched() {
        let driver = Arc::new(RecordingDriver { documents: documents(3), ..Default::default() });
        let base = cursor_over(&driver);
        let limited = base.limit(1).unwrap();

        assert_eq!(base.query().limit, None);
        assert_eq!(limited.query().limit, Some(1));
    }

    #[test]
    fn limit_is_enforced_even_if_the_driver_over_delivers() {
        let driver = Arc::new(RecordingDriver { documents: documents(10), ..Default::default() });
        let mut cursor = cursor_over(&driver).limit(5).unwrap();

        assert_eq!(cursor.to_array().unwrap().len(), 5);
        assert_eq!(cursor.status(), CursorStatus::Exhausted);
    }

    #[test]
    fn modifiers_fail_once_iterating() {
        let driver = Arc::new(RecordingDriver { documents: documents(3), ..Default::default() });
        let mut cursor = cursor_over(&driver);
        cursor.next_value().unwrap();

        let err = cursor.sort(&DynamicValue::Object(Default::default())).unwrap_err();
        match err {
            LayerError::CursorState(err) => {
                assert_eq!(err.modifier, "sort");
                assert_eq!(err.status, CursorStatus::Iterating);
            },
            other => panic!("expected a cursor state error, got {other:?}"),
        }
        assert!(cursor.limit(1).is_err());
    }

    #[test]
    fn state_is_checked_before_the_argument() {
        let driver = Arc::new(RecordingDriver { documents: documents(3), ..Default::default() });
        let mut cursor = cursor_over(&driver);
        cursor.next_value().unwrap();

        let bad = DynamicValue::from("bad");
        for (modifier, result) in [
            ("sort", cursor.sort(&bad)),
            ("hint", cursor.hint(&DynamicValue::from(7))),
            ("projection", cursor.projection(&bad)),
        ] {
            match result {
                Err(LayerError::CursorState(err)) => {
                    assert_eq!(err.modifier, modifier);
                    assert_eq!(err.status, CursorStatus::Iterating);
                },
                other => panic!("{modifier}: expected a cursor state error, got {other:?}"),
            }
        }

        assert!(matches!(cursor_over(&driver).sort(&bad), Err(LayerError::Marshal(_))));
    }

    #[test]
    fn copy_accepts_modifiers_again() {
        let driver = Arc::new(RecordingDriver { documents: documents(4), ..Default::default() });
        let mut cursor = cursor_over(&driver);
        cursor.next_value().unwrap();

        let mut sorted = cursor.copy().sort(&DynamicMap::new().with("n", -1).into()).unwrap();
        assert_eq!(sorted.status(), CursorStatus::Unstarted);
        assert_eq!(sorted.query().sort, Some(doc! { "n": -1.0 }));
        assert_eq!(sorted.to_array().unwrap().len(), 4);
        assert_eq!(driver.finds.lock().last().and_then(|find| find.sort.clone()), Some(doc! { "n": -1.0 }));
    }

    #[test]
    fn copy_after_partial_iteration_starts_over() {
        let driver = Arc::new(RecordingDriver { documents: documents(4), ..Default::default() });
        let mut cursor = cursor_over(&driver).skip(0).unwrap();
        cursor.next_value().unwrap();
        cursor.next_value().unwrap();

        let mut copy = cursor.copy();
        assert_eq!(copy.status(), CursorStatus::Unstarted);
        assert_eq!(copy.query(), cursor.query());
        assert_eq!(copy.to_array().unwrap().len(), 4);
        assert_eq!(cursor.to_array().unwrap().len(), 2);
        assert_eq!(driver.finds.lock().len(), 2);
    }

    #[test]
    fn callback_error_aborts_iteration() {
        let driver = Arc::new(RecordingDriver { documents: documents(5), ..Default::default() });
        let mut cursor = cursor_over(&driver);
        let mut seen = 0;

        let result: Result<(), LayerError> = cursor.for_each(|_| {
            seen += 1;
            if seen == 2 {
                return Err(DriverError::new("stop").into());
            }
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(seen, 2);
        assert_eq!(cursor.status(), CursorStatus::Iterating);
    }

    #[test]
    fn driver_errors_propagate_mid_stream() {
        let driver = Arc::new(RecordingDriver {
            documents: documents(5),
            fail_after: Some(2),
            ..Default::default()
        });
        let mut cursor = cursor_over(&driver);

        let err = cursor.to_array().unwrap_err();
        assert!(matches!(err, LayerError::Driver(_)));
    }

    #[test]
    fn has_next_does_not_consume() {
        let driver = Arc::new(RecordingDriver { documents: documents(1), ..Default::default() });
        let mut cursor = cursor_over(&driver);

        assert!(cursor.has_next().unwrap());
        assert!(cursor.has_next().unwrap());
        assert_eq!(cursor.next_value().unwrap().unwrap().get("n"), Some(&DynamicValue::Number(0.0)));
        assert!(!cursor.has_next().unwrap());
        assert_eq!(cursor.status(), CursorStatus::Exhausted);
    }

    #[test]
    fn count_ignores_limit_and_size_honours_it() {
        let driver = Arc::new(RecordingDriver { documents: documents(10), ..Default::default() });
        let cursor = cursor_over(&driver).skip(2).unwrap().limit(5).unwrap();

        assert_eq!(cursor.count().unwrap(), 10);
        assert_eq!(cursor.size().unwrap(), 5);
    }

    #[test]
    fn hint_accepts_names_and_keys() {
        let driver = Arc::new(RecordingDriver::default());
        let base = cursor_over(&driver);

        let by_name = base.hint(&DynamicValue::from("age_1")).unwrap();
        assert_eq!(by_name.query().hint, Some(IndexHint::Name("age_1".into())));

        let keys = DynamicValue::Object(crate::value::DynamicMap::new().with("age", 1));
        let by_keys = base.hint(&keys).unwrap();
        assert_eq!(by_keys.query().hint, Some(IndexHint::Keys(doc! { "age": 1.0 })));
    }

    #[test]
    fn values_iterates_remaining_documents() {
        let driver = Arc::new(RecordingDriver { documents: documents(3), ..Default::default() });
        let mut cursor = cursor_over(&driver);
        cursor.next_value().unwrap();

        let rest = cursor.values().collect::<LayerResult<Vec<_>>>().unwrap();
        assert_eq!(rest.len(), 2);

        let all = cursor_over(&driver).into_iter().count();
        assert_eq!(all, 3);
    }
}
