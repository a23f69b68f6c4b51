//! Filter evaluation, sorting and projection for in-memory documents.
//!
//! Filters use the store's query document syntax: `{ field: value }` for equality,
//! `{ field: { $op: operand } }` for operators and `$and`/`$or`/`$nor` at the top level.
//! Dotted paths descend into sub-documents and through arrays of sub-documents.

use std::cmp::Ordering;
use bson::{Bson, Document};

use dynlayer_core::{
    error::{DriverError, DriverResult},
    query::SortDirection,
};

/// Totally ordered view of a BSON value.
///
/// Values of different kinds order by kind first, in the store's canonical order: null,
/// numbers, strings, objects, arrays, binary data, identifiers, booleans, dates, timestamps,
/// regular expressions. Numbers compare across integer and floating point types.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    String(&'a str),
    Map(Vec<(&'a str, Comparable<'a>)>),
    Array(Vec<Comparable<'a>>),
    ObjectId([u8; 12]),
    Bool(bool),
    /// Milliseconds since the epoch
    DateTime(i64),
    Regex(&'a str, &'a str),
    /// Anything else, compared by value within its own kind.
    Other(&'a Bson),
}

impl Comparable<'_> {
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
            Comparable::Regex(..) => 11,
            Comparable::Other(value) => match value {
                Bson::MinKey => 0,
                Bson::Binary(_) => 6,
                Bson::Timestamp(_) => 10,
                Bson::MaxKey => 13,
                _ => 12,
            },
        }
    }
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(value.timestamp_millis()),
            Bson::String(value) => Comparable::String(value),
            Bson::Symbol(value) => Comparable::String(value),
            Bson::ObjectId(oid) => Comparable::ObjectId(oid.bytes()),
            Bson::RegularExpression(regex) => {
                Comparable::Regex(regex.pattern.as_str(), regex.options.as_str())
            },
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<Vec<_>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl Ord for Comparable<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_rank = self.rank().cmp(&other.rank());
        if by_rank != Ordering::Equal {
            return by_rank;
        }

        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => compare_numbers(*a, *b),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::Map(a), Comparable::Map(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let ordering = ka.cmp(kb).then_with(|| va.cmp(vb));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            },
            (Comparable::Array(a), Comparable::Array(b)) => a.cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.cmp(b),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::Regex(pa, oa), Comparable::Regex(pb, ob)) => (pa, oa).cmp(&(pb, ob)),
            (Comparable::Other(a), Comparable::Other(b)) => {
                if a == b {
                    Ordering::Equal
                } else {
                    a.to_string().cmp(&b.to_string())
                }
            },
            _ => Ordering::Equal,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Comparable<'_> {}

/// Every value reachable at a dotted `path`.
///
/// Numeric segments index into arrays; other segments applied to an array descend into each
/// of its sub-documents.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let parts = path.split('.').collect::<Vec<_>>();
    let mut found = Vec::new();
    resolve_in_document(document, &parts, &mut found);
    found
}

fn resolve_in_document<'a>(document: &'a Document, parts: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = parts.split_first() else {
        return;
    };

    if let Some(value) = document.get(*head) {
        resolve(value, rest, found);
    }
}

fn resolve<'a>(value: &'a Bson, parts: &[&str], found: &mut Vec<&'a Bson>) {
    let Some(head) = parts.first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(inner) => resolve_in_document(inner, parts, found),
        Bson::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                if let Some(item) = items.get(index) {
                    resolve(item, &parts[1..], found);
                }
            },
            Err(_) => {
                for item in items {
                    if let Bson::Document(inner) = item {
                        resolve_in_document(inner, parts, found);
                    }
                }
            },
        },
        _ => {},
    }
}

/// True when the first key of `document` is an operator such as `$gt`.
pub(crate) fn is_operator_document(document: &Document) -> bool {
    document
        .keys()
        .next()
        .is_some_and(|key| key.starts_with('$'))
}

/// Truthiness of a flag value: `false`, zero, null and undefined are false.
pub(crate) fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(value) => *value,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Whether the document satisfies every clause of `filter`.
    pub fn evaluate(&self, filter: &Document) -> DriverResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => {
                    let mut all = true;
                    for clause in clauses(key, condition)? {
                        if !self.evaluate(clause)? {
                            all = false;
                            break;
                        }
                    }
                    all
                },
                "$or" => self.any(clauses(key, condition)?)?,
                "$nor" => !self.any(clauses(key, condition)?)?,
                op if op.starts_with('$') => {
                    return Err(DriverError::new(format!("unknown top level operator: {op}")));
                },
                path => self.field_matches(path, condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn any(&self, clauses: Vec<&Document>) -> DriverResult<bool> {
        for clause in clauses {
            if self.evaluate(clause)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn field_matches(&self, path: &str, condition: &Bson) -> DriverResult<bool> {
        let values = lookup(self.document, path);

        match condition {
            Bson::Document(operators) if is_operator_document(operators) => {
                operators_match(&values, operators)
            },
            target => Ok(equals_any(&values, target)),
        }
    }

    /// Clones every document in `documents` that matches `filter`.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        filter: &Document,
    ) -> DriverResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document).evaluate(filter)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }
}

fn clauses<'f>(op: &str, condition: &'f Bson) -> DriverResult<Vec<&'f Document>> {
    match condition {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| {
                item.as_document()
                    .ok_or_else(|| DriverError::new(format!("{op} entries must be objects")))
            })
            .collect(),
        _ => Err(DriverError::new(format!("{op} must be a nonempty array"))),
    }
}

/// The value itself, followed by its elements when it is an array.
fn candidates<'a>(value: &'a Bson) -> Vec<&'a Bson> {
    match value {
        Bson::Array(items) => std::iter::once(value).chain(items.iter()).collect(),
        _ => vec![value],
    }
}

fn equals_any(values: &[&Bson], target: &Bson) -> bool {
    let target = Comparable::from(target);

    if values.is_empty() {
        return target == Comparable::Null;
    }

    values
        .iter()
        .flat_map(|value| candidates(value))
        .any(|candidate| Comparable::from(candidate) == target)
}

fn compare_any(values: &[&Bson], operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let operand = Comparable::from(operand);

    values
        .iter()
        .flat_map(|value| candidates(value))
        .map(Comparable::from)
        .any(|candidate| candidate.rank() == operand.rank() && accept(candidate.cmp(&operand)))
}

fn in_list(values: &[&Bson], op: &str, operand: &Bson) -> DriverResult<bool> {
    match operand {
        Bson::Array(targets) => Ok(targets.iter().any(|target| equals_any(values, target))),
        _ => Err(DriverError::new(format!("{op} needs an array"))),
    }
}

fn operators_match(values: &[&Bson], operators: &Document) -> DriverResult<bool> {
    for (op, operand) in operators {
        let matched = match op.as_str() {
            "$eq" => equals_any(values, operand),
            "$ne" => !equals_any(values, operand),
            "$gt" => compare_any(values, operand, |o| o == Ordering::Greater),
            "$gte" => compare_any(values, operand, |o| o != Ordering::Less),
            "$lt" => compare_any(values, operand, |o| o == Ordering::Less),
            "$lte" => compare_any(values, operand, |o| o != Ordering::Greater),
            "$in" => in_list(values, op, operand)?,
            "$nin" => !in_list(values, op, operand)?,
            "$exists" => values.is_empty() != truthy(operand),
            "$not" => match operand {
                Bson::Document(inner) if is_operator_document(inner) => {
                    !operators_match(values, inner)?
                },
                _ => return Err(DriverError::new("$not needs an operator object")),
            },
            other => return Err(DriverError::new(format!("unknown operator: {other}"))),
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn sort_key<'a>(document: &'a Document, field: &str) -> Comparable<'a> {
    lookup(document, field)
        .first()
        .map(|value| Comparable::from(*value))
        .unwrap_or(Comparable::Null)
}

/// Orders two documents by a sort specification such as `{ age: -1, name: 1 }`.
pub(crate) fn compare_documents(a: &Document, b: &Document, spec: &Document) -> Ordering {
    for (field, direction) in spec {
        let ordering = sort_key(a, field).cmp(&sort_key(b, field));
        let ordering = match SortDirection::from_bson(direction) {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Stable multi-key sort. Missing fields sort as null.
pub(crate) fn sort_documents(documents: &mut [Document], spec: &Document) {
    documents.sort_by(|a, b| compare_documents(a, b, spec));
}

/// Applies an inclusion or exclusion projection to top-level fields.
///
/// `_id` is kept unless the projection sets it to a false value.
pub(crate) fn project(document: &Document, projection: &Document) -> DriverResult<Document> {
    let keep_id = projection.get("_id").is_none_or(truthy);
    let fields = projection
        .iter()
        .filter(|(field, _)| field.as_str() != "_id")
        .map(|(field, flag)| (field.as_str(), truthy(flag)))
        .collect::<Vec<_>>();

    let inclusive = fields.first().map(|(_, include)| *include);
    if fields.iter().any(|(_, include)| Some(*include) != inclusive) {
        return Err(DriverError::new("cannot mix inclusion and exclusion in a projection"));
    }

    let listed = |key: &str| fields.iter().any(|(field, _)| *field == key);
    let mut projected = Document::new();

    for (key, value) in document {
        let keep = if key == "_id" {
            keep_id
        } else if inclusive == Some(true) {
            listed(key)
        } else {
            !listed(key)
        };

        if keep {
            projected.insert(key.clone(), value.clone());
        }
    }

    Ok(projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    fn matches(document: &Document, filter: Document) -> bool {
        DocumentEvaluator::new(document).evaluate(&filter).unwrap()
    }

    #[test]
    fn equality_reaches_into_arrays_and_paths() {
        let document = doc! {
            "name": "Alice",
            "tags": ["admin", "ops"],
            "address": { "city": "Paris" },
            "pets": [{ "kind": "cat" }, { "kind": "dog" }],
        };

        assert!(matches(&document, doc! { "name": "Alice" }));
        assert!(matches(&document, doc! { "tags": "ops" }));
        assert!(matches(&document, doc! { "address.city": "Paris" }));
        assert!(matches(&document, doc! { "pets.kind": "dog" }));
        assert!(matches(&document, doc! { "tags.1": "ops" }));
        assert!(matches(&document, doc! { "missing": Bson::Null }));
        assert!(!matches(&document, doc! { "name": "Bob" }));
    }

    #[test]
    fn numbers_compare_across_types() {
        let document = doc! { "age": 30_i32 };

        assert!(matches(&document, doc! { "age": 30.0 }));
        assert!(matches(&document, doc! { "age": { "$gt": 29_i64, "$lte": 30.0 } }));
        assert!(!matches(&document, doc! { "age": { "$gt": "a" } }));
    }

    #[test]
    fn logical_operators() {
        let document = doc! { "a": 1, "b": 2 };

        assert!(matches(&document, doc! { "$or": [{ "a": 5 }, { "b": 2 }] }));
        assert!(matches(&document, doc! { "$and": [{ "a": 1 }, { "b": { "$in": [2, 3] } }] }));
        assert!(matches(&document, doc! { "$nor": [{ "a": 5 }] }));
        assert!(matches(&document, doc! { "a": { "$not": { "$gt": 3 } } }));
        assert!(matches(&document, doc! { "c": { "$exists": false }, "b": { "$nin": [1] } }));
    }

    #[test]
    fn malformed_filters_are_errors() {
        let document = doc! { "a": 1 };

        assert!(DocumentEvaluator::new(&document).evaluate(&doc! { "$where": "x" }).is_err());
        assert!(DocumentEvaluator::new(&document).evaluate(&doc! { "a": { "$near": 1 } }).is_err());
        assert!(DocumentEvaluator::new(&document).evaluate(&doc! { "$or": [] }).is_err());
    }

    #[test]
    fn cross_kind_ordering_is_total() {
        let oid = Bson::ObjectId(ObjectId::new());
        let mut values = vec![
            Bson::Boolean(true),
            oid,
            Bson::String("a".into()),
            Bson::Double(1.5),
            Bson::Null,
        ];
        values.sort_by(|a, b| Comparable::from(a).cmp(&Comparable::from(b)));

        assert_eq!(values[0], Bson::Null);
        assert_eq!(values[1], Bson::Double(1.5));
        assert_eq!(values[2], Bson::String("a".into()));
        assert_eq!(values[4], Bson::Boolean(true));
    }

    #[test]
    fn sort_uses_every_key() {
        let mut documents = vec![
            doc! { "a": 1, "b": 1 },
            doc! { "a": 2, "b": 0 },
            doc! { "a": 1, "b": 2 },
        ];
        sort_documents(&mut documents, &doc! { "a": 1, "b": -1 });

        assert_eq!(documents[0], doc! { "a": 1, "b": 2 });
        assert_eq!(documents[1], doc! { "a": 1, "b": 1 });
        assert_eq!(documents[2], doc! { "a": 2, "b": 0 });
    }

    #[test]
    fn projection_modes() {
        let document = doc! { "_id": 1, "a": 1, "b": 2, "c": 3 };

        assert_eq!(project(&document, &doc! { "a": 1 }).unwrap(), doc! { "_id": 1, "a": 1 });
        assert_eq!(project(&document, &doc! { "a": 1, "_id": 0 }).unwrap(), doc! { "a": 1 });
        assert_eq!(project(&document, &doc! { "b": 0 }).unwrap(), doc! { "_id": 1, "a": 1, "c": 3 });
        assert!(project(&document, &doc! { "a": 1, "b": 0 }).is_err());
    }
}
