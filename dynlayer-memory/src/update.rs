//! Update documents: replacements and the `$set`, `$unset` and `$inc` operators.

use bson::{Bson, Document, oid::ObjectId};

use dynlayer_core::error::{DriverError, DriverResult};

use crate::evaluator::{is_operator_document, lookup};

/// True when `update` is made of operators rather than being a replacement document.
pub(crate) fn is_operator_update(update: &Document) -> bool {
    is_operator_document(update)
}

/// Returns `document` with `update` applied.
pub(crate) fn apply_update(document: &Document, update: &Document) -> DriverResult<Document> {
    if !is_operator_update(update) {
        return replace(document, update);
    }

    let mut updated = document.clone();

    for (op, fields) in update {
        let fields = fields
            .as_document()
            .ok_or_else(|| DriverError::new(format!("modifier {op} expects an object")))?;

        for (path, value) in fields {
            if path == "_id" || path.starts_with("_id.") {
                return Err(DriverError::new("the _id field cannot be modified"));
            }

            match op.as_str() {
                "$set" => set_path(&mut updated, path, value.clone())?,
                "$unset" => unset_path(&mut updated, path),
                "$inc" => increment(&mut updated, path, value)?,
                other => return Err(DriverError::new(format!("unknown modifier: {other}"))),
            }
        }
    }

    Ok(updated)
}

/// The document an upsert inserts when nothing matched `filter`.
///
/// Equality clauses of the filter seed the document before operators apply; a replacement is
/// used as is. An `_id` is generated when neither provides one.
pub(crate) fn upsert_document(filter: &Document, update: &Document) -> DriverResult<Document> {
    let mut seed = Document::new();

    for (key, value) in filter {
        if key.starts_with('$') {
            continue;
        }

        match value {
            Bson::Document(condition) if is_operator_document(condition) => {
                if let Some(target) = condition.get("$eq") {
                    set_path(&mut seed, key, target.clone())?;
                }
            },
            value => set_path(&mut seed, key, value.clone())?,
        }
    }

    let document = if is_operator_update(update) {
        apply_update(&seed, update)?
    } else {
        let mut base = Document::new();
        if let Some(id) = seed.get("_id") {
            base.insert("_id", id.clone());
        }
        replace(&base, update)?
    };

    Ok(with_generated_id(document))
}

/// Puts a fresh `_id` first when `document` has none.
pub(crate) fn with_generated_id(document: Document) -> Document {
    if document.contains_key("_id") {
        return document;
    }

    let mut with_id = Document::new();
    with_id.insert("_id", ObjectId::new());
    with_id.extend(document);
    with_id
}

fn replace(document: &Document, replacement: &Document) -> DriverResult<Document> {
    let mut replaced = Document::new();

    match (document.get("_id"), replacement.get("_id")) {
        (Some(old), Some(new)) if old != new => {
            return Err(DriverError::new("the _id field cannot be changed"));
        },
        (Some(id), _) | (None, Some(id)) => {
            replaced.insert("_id", id.clone());
        },
        (None, None) => {},
    }

    for (key, value) in replacement {
        if key != "_id" {
            replaced.insert(key.clone(), value.clone());
        }
    }

    Ok(replaced)
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> DriverResult<()> {
    let Some((head, rest)) = path.split_once('.') else {
        document.insert(path, value);
        return Ok(());
    };

    if !document.contains_key(head) {
        document.insert(head, Document::new());
    }

    match document.get_mut(head) {
        Some(Bson::Document(inner)) => set_path(inner, rest, value),
        _ => Err(DriverError::new(format!("cannot create field '{rest}' in element '{head}'"))),
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        },
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        },
    }
}

fn increment(document: &mut Document, path: &str, amount: &Bson) -> DriverResult<()> {
    if !is_number(amount) {
        return Err(DriverError::new(format!("cannot increment {path} by a non-numeric value")));
    }

    let next = match lookup(document, path).first() {
        Some(current) => add(current, amount)
            .ok_or_else(|| DriverError::new(format!("cannot apply $inc to non-numeric field {path}")))?,
        None => amount.clone(),
    };

    set_path(document, path, next)
}

fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

fn add(a: &Bson, b: &Bson) -> Option<Bson> {
    Some(match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => match x.checked_add(*y) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*x) + i64::from(*y)),
        },
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            Bson::Int64(as_i64(a)?.checked_add(as_i64(b)?)?)
        },
        (Bson::Double(x), other) | (other, Bson::Double(x)) => Bson::Double(x + as_f64(other)?),
        _ => return None,
    })
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}
