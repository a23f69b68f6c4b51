//! The dynamic value model callers work with.
//!
//! [`DynamicValue`] is a closed enumeration of the kinds a dynamic-language caller can hand
//! to the adapter: null and undefined, booleans, numbers, strings, dates, regular expressions,
//! identifiers, sequences, mappings and functions. A [`DynamicValue::Native`] variant carries
//! values that already live in the store's native model so they can flow through untouched.
//!
//! Traversal goes through [`ValueVisitor`], whose [`visit_value`](ValueVisitor::visit_value)
//! dispatch is an exhaustive match: adding a kind without teaching every visitor about it is a
//! compile error.
//!
//! # Example
//!
//! ```ignore
//! use dynlayer::value::{DynamicValue, DynamicMap};
//! use serde_json::json;
//!
//! let user = DynamicValue::from(json!({ "name": "Alice", "tags": ["admin"] }));
//! assert_eq!(user.get("name"), Some(&DynamicValue::from("Alice")));
//! ```

use bson::Bson;
use chrono::{DateTime, SecondsFormat, Utc};
use std::{fmt, str::FromStr};

use crate::{error::MarshalError, identity::Identifier};

/// The kind of a [`DynamicValue`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// See [`DynamicValue::Undefined`].
    Undefined,
    /// See [`DynamicValue::Null`].
    Null,
    /// See [`DynamicValue::Boolean`].
    Boolean,
    /// See [`DynamicValue::Number`].
    Number,
    /// See [`DynamicValue::String`].
    String,
    /// See [`DynamicValue::Date`].
    Date,
    /// See [`DynamicValue::RegExp`].
    RegExp,
    /// See [`DynamicValue::Identifier`].
    Identifier,
    /// See [`DynamicValue::Array`].
    Array,
    /// See [`DynamicValue::Object`].
    Object,
    /// See [`DynamicValue::Function`].
    Function,
    /// See [`DynamicValue::Native`].
    Native,
}

impl ValueKind {
    /// Every kind, in declaration order.
    pub const ALL: [ValueKind; 12] = [
        ValueKind::Undefined,
        ValueKind::Null,
        ValueKind::Boolean,
        ValueKind::Number,
        ValueKind::String,
        ValueKind::Date,
        ValueKind::RegExp,
        ValueKind::Identifier,
        ValueKind::Array,
        ValueKind::Object,
        ValueKind::Function,
        ValueKind::Native,
    ];

    /// Lowercase name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Undefined => "undefined",
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Date => "date",
            ValueKind::RegExp => "regexp",
            ValueKind::Identifier => "identifier",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::Function => "function",
            ValueKind::Native => "native",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A recursive value as seen by the caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DynamicValue {
    /// Absent value. Omitted from documents when marshalled.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Double precision number. Integers beyond 2^53 do not survive a round trip.
    Number(f64),
    /// UTF-8 string.
    String(String),
    /// Instant in time with millisecond resolution.
    Date(DateTime<Utc>),
    /// Regular expression.
    RegExp(RegExp),
    /// Document identifier.
    Identifier(Identifier),
    /// Ordered sequence.
    Array(Vec<DynamicValue>),
    /// Ordered string-keyed mapping.
    Object(DynamicMap),
    /// Function, captured as source text only.
    Function(Code),
    /// A value already in the store's native model.
    Native(Bson),
}

impl DynamicValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            DynamicValue::Undefined => ValueKind::Undefined,
            DynamicValue::Null => ValueKind::Null,
            DynamicValue::Boolean(_) => ValueKind::Boolean,
            DynamicValue::Number(_) => ValueKind::Number,
            DynamicValue::String(_) => ValueKind::String,
            DynamicValue::Date(_) => ValueKind::Date,
            DynamicValue::RegExp(_) => ValueKind::RegExp,
            DynamicValue::Identifier(_) => ValueKind::Identifier,
            DynamicValue::Array(_) => ValueKind::Array,
            DynamicValue::Object(_) => ValueKind::Object,
            DynamicValue::Function(_) => ValueKind::Function,
            DynamicValue::Native(_) => ValueKind::Native,
        }
    }

    /// Creates an empty object.
    pub fn object() -> Self {
        DynamicValue::Object(DynamicMap::new())
    }

    /// True for [`DynamicValue::Undefined`].
    pub fn is_undefined(&self) -> bool {
        matches!(self, DynamicValue::Undefined)
    }

    /// True for [`DynamicValue::Undefined`] and [`DynamicValue::Null`].
    pub fn is_nullish(&self) -> bool {
        matches!(self, DynamicValue::Undefined | DynamicValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynamicValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DynamicValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynamicValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_identifier(&self) -> Option<&Identifier> {
        match self {
            DynamicValue::Identifier(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[DynamicValue]> {
        match self {
            DynamicValue::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&DynamicMap> {
        match self {
            DynamicValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut DynamicMap> {
        match self {
            DynamicValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a key when this value is an object.
    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Renders this value the way a dynamic runtime's JSON stringifier would.
    ///
    /// Identifiers become hex strings, dates RFC 3339 strings with milliseconds and regular
    /// expressions `/source/flags`. Undefined values and functions are dropped from objects
    /// and become `null` inside arrays.
    pub fn to_json(&self) -> serde_json::Value {
        JsonRenderer.visit_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// An insertion-ordered mapping of string keys to dynamic values.
///
/// Key order is kept so documents round-trip faithfully, but equality ignores it: two maps are
/// equal when they hold the same keys with equal values.
#[derive(Debug, Clone, Default)]
pub struct DynamicMap {
    entries: Vec<(String, DynamicValue)>,
}

impl DynamicMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Inserts a value, replacing an existing entry in place.
    ///
    /// Returns the previous value for the key, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<DynamicValue>) -> Option<DynamicValue> {
        let key = key.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<DynamicValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut DynamicValue> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Removes a key, keeping the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<DynamicValue> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DynamicValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl PartialEq for DynamicMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K: Into<String>, V: Into<DynamicValue>> FromIterator<(K, V)> for DynamicMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = DynamicMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl IntoIterator for DynamicMap {
    type Item = (String, DynamicValue);
    type IntoIter = std::vec::IntoIter<(String, DynamicValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Flags of a dynamic-language regular expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegexFlags {
    /// `g`
    pub global: bool,
    /// `i`
    pub ignore_case: bool,
    /// `m`
    pub multiline: bool,
    /// `s`
    pub dot_all: bool,
    /// `u`
    pub unicode: bool,
    /// `y`
    pub sticky: bool,
}

impl RegexFlags {
    /// Renders the flags in canonical `gimsuy` order.
    pub fn as_flag_string(&self) -> String {
        [
            (self.global, 'g'),
            (self.ignore_case, 'i'),
            (self.multiline, 'm'),
            (self.dot_all, 's'),
            (self.unicode, 'u'),
            (self.sticky, 'y'),
        ]
        .into_iter()
        .filter_map(|(set, flag)| set.then_some(flag))
        .collect()
    }
}

impl FromStr for RegexFlags {
    type Err = MarshalError;

    fn from_str(flags: &str) -> Result<Self, Self::Err> {
        let mut parsed = RegexFlags::default();

        for flag in flags.chars() {
            let slot = match flag {
                'g' => &mut parsed.global,
                'i' => &mut parsed.ignore_case,
                'm' => &mut parsed.multiline,
                's' => &mut parsed.dot_all,
                'u' => &mut parsed.unicode,
                'y' => &mut parsed.sticky,
                other => return Err(MarshalError::InvalidRegexFlag(other)),
            };
            *slot = true;
        }

        Ok(parsed)
    }
}

impl fmt::Display for RegexFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_flag_string())
    }
}

/// A regular expression: source pattern plus flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegExp {
    /// Source pattern, without delimiters.
    pub source: String,
    /// Flag set.
    pub flags: RegexFlags,
}

impl RegExp {
    /// Creates a regular expression from a pattern and a flag string such as `"gi"`.
    ///
    /// # Errors
    ///
    /// Returns [`MarshalError::InvalidRegexFlag`] for a flag outside `gimsuy`.
    pub fn new(source: impl Into<String>, flags: &str) -> Result<Self, MarshalError> {
        Ok(Self {
            source: source.into(),
            flags: flags.parse()?,
        })
    }

    pub fn with_flags(source: impl Into<String>, flags: RegexFlags) -> Self {
        Self { source: source.into(), flags }
    }
}

impl fmt::Display for RegExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

/// Function source text. No closure environment is captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code(pub String);

impl Code {
    pub fn new(source: impl Into<String>) -> Self {
        Code(source.into())
    }

    pub fn source(&self) -> &str {
        &self.0
    }
}

/// Visitor over the closed set of [`DynamicValue`] kinds.
///
/// Implementors provide one method per kind; [`visit_value`](Self::visit_value) performs the
/// dispatch.
pub trait ValueVisitor {
    type Output;
    type Error;

    fn visit_undefined(&mut self) -> Result<Self::Output, Self::Error>;
    fn visit_null(&mut self) -> Result<Self::Output, Self::Error>;
    fn visit_boolean(&mut self, value: bool) -> Result<Self::Output, Self::Error>;
    fn visit_number(&mut self, value: f64) -> Result<Self::Output, Self::Error>;
    fn visit_string(&mut self, value: &str) -> Result<Self::Output, Self::Error>;
    fn visit_date(&mut self, value: &DateTime<Utc>) -> Result<Self::Output, Self::Error>;
    fn visit_regexp(&mut self, value: &RegExp) -> Result<Self::Output, Self::Error>;
    fn visit_identifier(&mut self, value: &Identifier) -> Result<Self::Output, Self::Error>;
    fn visit_array(&mut self, values: &[DynamicValue]) -> Result<Self::Output, Self::Error>;
    fn visit_object(&mut self, map: &DynamicMap) -> Result<Self::Output, Self::Error>;
    fn visit_function(&mut self, code: &Code) -> Result<Self::Output, Self::Error>;
    fn visit_native(&mut self, value: &Bson) -> Result<Self::Output, Self::Error>;

    fn visit_value(&mut self, value: &DynamicValue) -> Result<Self::Output, Self::Error> {
        match value {
            DynamicValue::Undefined => self.visit_undefined(),
            DynamicValue::Null => self.visit_null(),
            DynamicValue::Boolean(value) => self.visit_boolean(*value),
            DynamicValue::Number(value) => self.visit_number(*value),
            DynamicValue::String(value) => self.visit_string(value),
            DynamicValue::Date(value) => self.visit_date(value),
            DynamicValue::RegExp(value) => self.visit_regexp(value),
            DynamicValue::Identifier(value) => self.visit_identifier(value),
            DynamicValue::Array(values) => self.visit_array(values),
            DynamicValue::Object(map) => self.visit_object(map),
            DynamicValue::Function(code) => self.visit_function(code),
            DynamicValue::Native(value) => self.visit_native(value),
        }
    }
}

/// Renders dynamic values as JSON. Returns `None` for values a JSON stringifier skips.
struct JsonRenderer;

impl ValueVisitor for JsonRenderer {
    type Output = serde_json::Value;
    type Error = ();

    fn visit_undefined(&mut self) -> Result<Self::Output, Self::Error> {
        Err(())
    }

    fn visit_null(&mut self) -> Result<Self::Output, Self::Error> {
        Ok(serde_json::Value::Null)
    }

    fn visit_boolean(&mut self, value: bool) -> Result<Self::Output, Self::Error> {
        Ok(serde_json::Value::Bool(value))
    }

    fn visit_number(&mut self, value: f64) -> Result<Self::Output, Self::Error> {
        // Non-finite numbers have no JSON form and render as null.
        Ok(serde_json::Number::from_f64(value)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null))
    }

    fn visit_string(&mut self, value: &str) -> Result<Self::Output, Self::Error> {
        Ok(serde_json::Value::String(value.to_string()))
    }

    fn visit_date(&mut self, value: &DateTime<Utc>) -> Result<Self::Output, Self::Error> {
        Ok(serde_json::Value::String(value.to_rfc3339_opts(SecondsFormat::Millis, true)))
    }

    fn visit_regexp(&mut self, value: &RegExp) -> Result<Self::Output, Self::Error> {
        Ok(serde_json::Value::String(value.to_string()))
    }

    fn visit_identifier(&mut self, value: &Identifier) -> Result<Self::Output, Self::Error> {
        Ok(serde_json::Value::String(value.to_hex()))
    }

    fn visit_array(&mut self, values: &[DynamicValue]) -> Result<Self::Output, Self::Error> {
        Ok(serde_json::Value::Array(
            values
                .iter()
                .map(|value| self.visit_value(value).unwrap_or(serde_json::Value::Null))
                .collect(),
        ))
    }

    fn visit_object(&mut self, map: &DynamicMap) -> Result<Self::Output, Self::Error> {
        Ok(serde_json::Value::Object(
            map.iter()
                .filter_map(|(key, value)| {
                    self.visit_value(value)
                        .ok()
                        .map(|json| (key.to_string(), json))
                })
                .collect(),
        ))
    }

    fn visit_function(&mut self, _code: &Code) -> Result<Self::Output, Self::Error> {
        Err(())
    }

    fn visit_native(&mut self, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(serde_json::Value::String(value.to_string()))
    }
}

impl From<bool> for DynamicValue {
    fn from(value: bool) -> Self {
        DynamicValue::Boolean(value)
    }
}

macro_rules! number_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for DynamicValue {
                fn from(value: $ty) -> Self {
                    DynamicValue::Number(value as f64)
                }
            }
        )*
    };
}

number_from!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, usize, isize);

impl From<&str> for DynamicValue {
    fn from(value: &str) -> Self {
        DynamicValue::String(value.to_string())
    }
}

impl From<String> for DynamicValue {
    fn from(value: String) -> Self {
        DynamicValue::String(value)
    }
}

impl From<DateTime<Utc>> for DynamicValue {
    fn from(value: DateTime<Utc>) -> Self {
        DynamicValue::Date(value)
    }
}

impl From<RegExp> for DynamicValue {
    fn from(value: RegExp) -> Self {
        DynamicValue::RegExp(value)
    }
}

impl From<Identifier> for DynamicValue {
    fn from(value: Identifier) -> Self {
        DynamicValue::Identifier(value)
    }
}

impl From<Code> for DynamicValue {
    fn from(value: Code) -> Self {
        DynamicValue::Function(value)
    }
}

impl From<Vec<DynamicValue>> for DynamicValue {
    fn from(values: Vec<DynamicValue>) -> Self {
        DynamicValue::Array(values)
    }
}

impl From<DynamicMap> for DynamicValue {
    fn from(map: DynamicMap) -> Self {
        DynamicValue::Object(map)
    }
}

impl From<Bson> for DynamicValue {
    fn from(value: Bson) -> Self {
        DynamicValue::Native(value)
    }
}

impl<T: Into<DynamicValue>> From<Option<T>> for DynamicValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(DynamicValue::Null)
    }
}

impl From<serde_json::Value> for DynamicValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DynamicValue::Null,
            serde_json::Value::Bool(value) => DynamicValue::Boolean(value),
            serde_json::Value::Number(number) => DynamicValue::Number(number.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(value) => DynamicValue::String(value),
            serde_json::Value::Array(values) => DynamicValue::Array(
                values
                    .into_iter()
                    .map(DynamicValue::from)
                    .collect(),
            ),
            serde_json::Value::Object(map) => DynamicValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, DynamicValue::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn map_equality_ignores_order() {
        let left = DynamicMap::new().with("a", 1).with("b", "x");
        let right = DynamicMap::new().with("b", "x").with("a", 1);

        assert_eq!(left, right);
        assert_eq!(left.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn map_insert_replaces_in_place() {
        let mut map = DynamicMap::new().with("a", 1).with("b", 2);
        let previous = map.insert("a", 3);

        assert_eq!(previous, Some(DynamicValue::Number(1.0)));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(&DynamicValue::Number(3.0)));
    }

    #[test]
    fn regex_flags_parse_and_render() {
        let flags: RegexFlags = "ymg".parse().unwrap();
        assert!(flags.global && flags.multiline && flags.sticky);
        assert!(!flags.ignore_case);
        assert_eq!(flags.to_string(), "gmy");

        assert_eq!("gq".parse::<RegexFlags>(), Err(MarshalError::InvalidRegexFlag('q')));
    }

    #[test]
    fn from_json_builds_objects() {
        let value = DynamicValue::from(json!({ "name": "Alice", "age": 30, "tags": ["a", null] }));

        assert_eq!(value.kind(), ValueKind::Object);
        assert_eq!(value.get("age"), Some(&DynamicValue::Number(30.0)));
        assert_eq!(
            value.get("tags"),
            Some(&DynamicValue::Array(vec!["a".into(), DynamicValue::Null]))
        );
    }

    #[test]
    fn from_json_keeps_key_order() {
        let value = DynamicValue::from(json!({ "b": 1, "a": 1, "c": { "z": 0, "y": 0 } }));
        let map = value.as_object().unwrap();

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
        assert_eq!(map.get("c").and_then(DynamicValue::as_object).unwrap().keys().collect::<Vec<_>>(), vec!["z", "y"]);
    }

    #[test]
    fn to_json_skips_undefined_and_functions() {
        let value = DynamicValue::Object(
            DynamicMap::new()
                .with("a", 1)
                .with("gone", DynamicValue::Undefined)
                .with("f", Code::new("function () {}"))
                .with("list", vec![DynamicValue::Undefined, DynamicValue::from(true)]),
        );

        assert_eq!(value.to_json(), json!({ "a": 1.0, "list": [null, true] }));
    }

    #[test]
    fn to_json_renders_special_kinds_as_strings() {
        let date = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
        let regex = RegExp::new("^a+", "gi").unwrap();

        assert_eq!(DynamicValue::from(date).to_json(), json!("2023-11-14T22:13:20.123Z"));
        assert_eq!(DynamicValue::from(regex).to_json(), json!("/^a+/gi"));
    }

    #[test]
    fn every_kind_has_a_distinct_name() {
        let names: std::collections::HashSet<_> = ValueKind::ALL.iter().map(ValueKind::name).collect();
        assert_eq!(names.len(), ValueKind::ALL.len());
    }
}
