//! Conversion between dynamic values and the store's native BSON model.
//!
//! The [`Marshaller`] walks a value tree in one direction or the other. Going native, the
//! dispatch is an exhaustive [`ValueVisitor`]: adding a [`DynamicValue`] variant is a compile
//! error here until its encoding is defined. Going dynamic, identifiers are resolved through
//! the connection's [`IdentityCache`].
//!
//! Round trips are exact for objects, arrays, strings, booleans, null, finite numbers that fit
//! in 53 bits, identifiers, millisecond dates, `g`/`i`/`m` regular expressions and function
//! source. `Undefined` map entries disappear on the way out and integer types collapse into
//! [`DynamicValue::Number`] on the way back.

use bson::{Bson, Document, Regex, raw::CString};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    error::{MarshalError, MarshalResult},
    identity::{IdentityCache, Identifier},
    value::{Code, DynamicMap, DynamicValue, RegExp, RegexFlags, ValueVisitor},
};

/// Tuning for the marshaller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarshalOptions {
    /// Deepest nesting of arrays and objects accepted in either direction.
    pub max_depth: usize,
}

impl MarshalOptions {
    pub const DEFAULT_MAX_DEPTH: usize = 100;

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for MarshalOptions {
    fn default() -> Self {
        Self { max_depth: Self::DEFAULT_MAX_DEPTH }
    }
}

/// Bidirectional converter between [`DynamicValue`] and [`Bson`].
#[derive(Debug, Clone)]
pub struct Marshaller {
    cache: Arc<IdentityCache>,
    options: MarshalOptions,
}

impl Marshaller {
    pub fn new(cache: Arc<IdentityCache>) -> Self {
        Self::with_options(cache, MarshalOptions::default())
    }

    pub fn with_options(cache: Arc<IdentityCache>, options: MarshalOptions) -> Self {
        Self { cache, options }
    }

    pub fn cache(&self) -> &Arc<IdentityCache> {
        &self.cache
    }

    pub fn options(&self) -> &MarshalOptions {
        &self.options
    }

    /// Converts a dynamic value into its native form.
    ///
    /// # Errors
    ///
    /// Fails with [`MarshalError::DepthExceeded`] when the tree nests deeper than
    /// [`MarshalOptions::max_depth`], [`MarshalError::InvalidKey`] for keys containing NUL and
    /// [`MarshalError::InvalidRegex`] for patterns BSON cannot carry.
    pub fn to_native(&self, value: &DynamicValue) -> MarshalResult<Bson> {
        NativeEncoder::new(self.options.max_depth).visit_value(value)
    }

    /// Converts a dynamic object into a native document.
    ///
    /// A [`DynamicValue::Native`] holding a document is accepted as well. Any other kind
    /// fails with [`MarshalError::NotADocument`].
    pub fn to_native_document(&self, value: &DynamicValue) -> MarshalResult<Document> {
        match value {
            DynamicValue::Object(_) | DynamicValue::Native(Bson::Document(_)) => {
                match self.to_native(value)? {
                    Bson::Document(document) => Ok(document),
                    _ => Err(MarshalError::NotADocument(value.kind())),
                }
            },
            other => Err(MarshalError::NotADocument(other.kind())),
        }
    }

    /// Like [`to_native_document`](Self::to_native_document), but an absent query
    /// (`Undefined` or `Null`) selects everything.
    pub fn filter_document(&self, value: &DynamicValue) -> MarshalResult<Document> {
        if value.is_nullish() {
            return Ok(Document::new());
        }

        self.to_native_document(value)
    }

    /// Converts a native value into its dynamic form.
    ///
    /// Numeric types collapse into [`DynamicValue::Number`]; 64-bit integers beyond 2^53 lose
    /// precision. Native kinds without a dynamic counterpart are wrapped in
    /// [`DynamicValue::Native`] unchanged.
    pub fn to_dynamic(&self, value: &Bson) -> MarshalResult<DynamicValue> {
        self.decode(value, 0)
    }

    pub fn document_to_dynamic(&self, document: &Document) -> MarshalResult<DynamicValue> {
        self.decode_document(document, 0)
    }

    fn decode(&self, value: &Bson, depth: usize) -> MarshalResult<DynamicValue> {
        Ok(match value {
            Bson::Null => DynamicValue::Null,
            Bson::Undefined => DynamicValue::Undefined,
            Bson::Boolean(value) => DynamicValue::Boolean(*value),
            Bson::Double(value) => DynamicValue::Number(*value),
            Bson::Int32(value) => DynamicValue::Number(f64::from(*value)),
            Bson::Int64(value) => DynamicValue::Number(*value as f64),
            Bson::String(value) => DynamicValue::String(value.clone()),
            Bson::ObjectId(oid) => DynamicValue::Identifier(self.resolve_identifier(oid)?),
            Bson::DateTime(value) => {
                match DateTime::<Utc>::from_timestamp_millis(value.timestamp_millis()) {
                    Some(date) => DynamicValue::Date(date),
                    None => DynamicValue::Native(Bson::DateTime(*value)),
                }
            },
            Bson::RegularExpression(regex) => DynamicValue::RegExp(RegExp::with_flags(
                regex.pattern.as_str(),
                native_to_flags(regex.options.as_str()),
            )),
            Bson::JavaScriptCode(source) => DynamicValue::Function(Code::new(source.as_str())),
            Bson::Array(values) => {
                let depth = self.descend(depth)?;
                DynamicValue::Array(
                    values
                        .iter()
                        .map(|value| self.decode(value, depth))
                        .collect::<MarshalResult<Vec<_>>>()?,
                )
            },
            Bson::Document(document) => self.decode_document(document, depth)?,
            other => DynamicValue::Native(other.clone()),
        })
    }

    fn decode_document(&self, document: &Document, depth: usize) -> MarshalResult<DynamicValue> {
        let depth = self.descend(depth)?;
        let mut map = DynamicMap::new();

        for (key, value) in document {
            map.insert(key.as_str(), self.decode(value, depth)?);
        }

        Ok(DynamicValue::Object(map))
    }

    fn resolve_identifier(&self, oid: &bson::oid::ObjectId) -> MarshalResult<Identifier> {
        Ok(self.cache.get_or_create(&oid.to_hex())?)
    }

    fn descend(&self, depth: usize) -> MarshalResult<usize> {
        let depth = depth + 1;
        if depth > self.options.max_depth {
            return Err(MarshalError::DepthExceeded { limit: self.options.max_depth });
        }

        Ok(depth)
    }
}

/// Native flag string for the subset of dynamic flags BSON understands.
fn flags_to_native(flags: &RegexFlags) -> String {
    let mut native = String::new();

    if flags.global {
        native.push('g');
    }
    if flags.ignore_case {
        native.push('i');
    }
    if flags.multiline {
        native.push('m');
    }

    native
}

fn native_to_flags(options: &str) -> RegexFlags {
    let mut flags = RegexFlags::default();

    for flag in options.chars() {
        match flag {
            'g' => flags.global = true,
            'i' => flags.ignore_case = true,
            'm' => flags.multiline = true,
            _ => {},
        }
    }

    flags
}

fn check_key(key: &str) -> MarshalResult<()> {
    if key.contains('\0') {
        return Err(MarshalError::InvalidKey(key.to_string()));
    }

    Ok(())
}

/// Encodes a dynamic value tree into BSON.
struct NativeEncoder {
    depth: usize,
    max_depth: usize,
}

impl NativeEncoder {
    fn new(max_depth: usize) -> Self {
        Self { depth: 0, max_depth }
    }

    fn enter(&mut self) -> MarshalResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(MarshalError::DepthExceeded { limit: self.max_depth });
        }

        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn encode_array(&mut self, values: &[DynamicValue]) -> MarshalResult<Bson> {
        values
            .iter()
            .map(|value| match value {
                DynamicValue::Undefined => Ok(Bson::Null),
                value => self.visit_value(value),
            })
            .collect::<MarshalResult<Vec<_>>>()
            .map(Bson::Array)
    }

    fn encode_object(&mut self, map: &DynamicMap) -> MarshalResult<Bson> {
        let mut document = Document::new();

        for (key, value) in map.iter() {
            check_key(key)?;
            if value.is_undefined() {
                continue;
            }
            document.insert(key, self.visit_value(value)?);
        }

        Ok(Bson::Document(document))
    }
}

impl ValueVisitor for NativeEncoder {
    type Output = Bson;
    type Error = MarshalError;

    fn visit_undefined(&mut self) -> Result<Self::Output, Self::Error> {
        Ok(Bson::Null)
    }

    fn visit_null(&mut self) -> Result<Self::Output, Self::Error> {
        Ok(Bson::Null)
    }

    fn visit_boolean(&mut self, value: bool) -> Result<Self::Output, Self::Error> {
        Ok(Bson::Boolean(value))
    }

    fn visit_number(&mut self, value: f64) -> Result<Self::Output, Self::Error> {
        Ok(Bson::Double(value))
    }

    fn visit_string(&mut self, value: &str) -> Result<Self::Output, Self::Error> {
        Ok(Bson::String(value.to_string()))
    }

    fn visit_date(&mut self, value: &DateTime<Utc>) -> Result<Self::Output, Self::Error> {
        Ok(Bson::DateTime(bson::DateTime::from_millis(value.timestamp_millis())))
    }

    fn visit_regexp(&mut self, value: &RegExp) -> Result<Self::Output, Self::Error> {
        let pattern = CString::try_from(value.source.clone())
            .map_err(|e| MarshalError::InvalidRegex(e.to_string()))?;
        let options = CString::try_from(flags_to_native(&value.flags))
            .map_err(|e| MarshalError::InvalidRegex(e.to_string()))?;

        Ok(Bson::RegularExpression(Regex { pattern, options }))
    }

    fn visit_identifier(&mut self, value: &Identifier) -> Result<Self::Output, Self::Error> {
        Ok(Bson::ObjectId(value.object_id()))
    }

    fn visit_array(&mut self, values: &[DynamicValue]) -> Result<Self::Output, Self::Error> {
        self.enter()?;
        let encoded = self.encode_array(values);
        self.leave();
        encoded
    }

    fn visit_object(&mut self, map: &DynamicMap) -> Result<Self::Output, Self::Error> {
        self.enter()?;
        let encoded = self.encode_object(map);
        self.leave();
        encoded
    }

    fn visit_function(&mut self, code: &Code) -> Result<Self::Output, Self::Error> {
        Ok(Bson::JavaScriptCode(code.source().to_string()))
    }

    fn visit_native(&mut self, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(value.clone())
    }
}
