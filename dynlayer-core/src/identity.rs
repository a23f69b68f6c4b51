//! Document identifiers and the identity cache.
//!
//! An [`Identifier`] wraps the store's 12-byte [`ObjectId`]. Identifiers compare by value:
//! two identifiers are equal iff their bytes are equal, regardless of whether they are the same
//! instance. [`equals`] extends that comparison to hex strings and native object ids.
//!
//! The [`IdentityCache`] interns identifiers by canonical hex text so repeated conversions of
//! the same identifier share one allocation. It is bounded and may evict entries at any time,
//! including while another thread is looking one up. Nothing in this crate relies on getting
//! the same instance back; equality is always computed from the bytes.

use bson::oid::ObjectId;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{collections::{BTreeMap, HashMap}, fmt, hash::{Hash, Hasher}, str::FromStr, sync::Arc};
use tracing::{debug, trace};

use crate::error::IdentityError;

/// Length of the canonical hex form.
pub const IDENTIFIER_HEX_LEN: usize = 24;

/// A 12-byte document identifier.
///
/// Cloning is cheap and shares the underlying allocation.
#[derive(Clone)]
pub struct Identifier {
    oid: Arc<ObjectId>,
}

impl Identifier {
    /// Generates a new unique identifier.
    pub fn new() -> Self {
        Self::from_object_id(ObjectId::new())
    }

    /// Parses a 24-character hex string. Upper-case digits are accepted.
    ///
    /// The result is not cached; use [`IdentityCache::get_or_create`] to intern it.
    pub fn parse(text: &str) -> Result<Self, IdentityError> {
        Ok(Self::from_object_id(parse_object_id(text)?))
    }

    pub fn from_object_id(oid: ObjectId) -> Self {
        Self { oid: Arc::new(oid) }
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self::from_object_id(ObjectId::from_bytes(bytes))
    }

    /// Returns the native identifier.
    pub fn object_id(&self) -> ObjectId {
        *self.oid
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.oid.bytes()
    }

    /// Canonical lowercase hex text.
    pub fn to_hex(&self) -> String {
        self.oid.to_hex()
    }

    /// Value comparison against any identifier operand.
    ///
    /// This is the only correct way to compare identities: the cache may hand out different
    /// instances for the same identifier at any time.
    pub fn equals(&self, other: &(impl IdentifierOperand + ?Sized)) -> bool {
        equals(self, other)
    }

    /// True when both handles share one allocation. Diagnostic only, never a substitute for
    /// [`equals`](Self::equals).
    pub fn same_instance(a: &Identifier, b: &Identifier) -> bool {
        Arc::ptr_eq(&a.oid, &b.oid)
    }
}

impl Default for Identifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.bytes() == other.bytes()
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes().hash(state);
    }
}

impl PartialEq<ObjectId> for Identifier {
    fn eq(&self, other: &ObjectId) -> bool {
        *self.oid == *other
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        equals(self, other)
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        equals(self, *other)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({:?})", self.to_hex())
    }
}

impl FromStr for Identifier {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::parse(s)
    }
}

impl From<ObjectId> for Identifier {
    fn from(oid: ObjectId) -> Self {
        Identifier::from_object_id(oid)
    }
}

impl From<Identifier> for ObjectId {
    fn from(id: Identifier) -> Self {
        id.object_id()
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Identifier::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Anything that can stand on either side of an identifier comparison.
pub trait IdentifierOperand {
    /// The native identifier, or `None` when the operand does not denote a valid one.
    fn to_object_id(&self) -> Option<ObjectId>;
}

impl IdentifierOperand for Identifier {
    fn to_object_id(&self) -> Option<ObjectId> {
        Some(self.object_id())
    }
}

impl IdentifierOperand for ObjectId {
    fn to_object_id(&self) -> Option<ObjectId> {
        Some(*self)
    }
}

impl IdentifierOperand for str {
    fn to_object_id(&self) -> Option<ObjectId> {
        parse_object_id(self).ok()
    }
}

impl IdentifierOperand for String {
    fn to_object_id(&self) -> Option<ObjectId> {
        self.as_str().to_object_id()
    }
}

impl<T: IdentifierOperand + ?Sized> IdentifierOperand for &T {
    fn to_object_id(&self) -> Option<ObjectId> {
        (**self).to_object_id()
    }
}

/// Compares two identifier operands by their underlying bytes.
///
/// An operand that does not denote a valid identifier (for example a malformed string) is
/// never equal to anything.
pub fn equals<A, B>(a: &A, b: &B) -> bool
where
    A: IdentifierOperand + ?Sized,
    B: IdentifierOperand + ?Sized,
{
    match (a.to_object_id(), b.to_object_id()) {
        (Some(a), Some(b)) => a.bytes() == b.bytes(),
        _ => false,
    }
}

fn parse_object_id(text: &str) -> Result<ObjectId, IdentityError> {
    let len = text.chars().count();
    if len != IDENTIFIER_HEX_LEN {
        return Err(IdentityError::InvalidLength { text: text.to_string(), len });
    }

    let digits = text.as_bytes();
    let mut bytes = [0u8; 12];
    for (i, byte) in bytes.iter_mut().enumerate() {
        let hi = hex_value(digits[2 * i]);
        let lo = hex_value(digits[2 * i + 1]);
        match (hi, lo) {
            (Some(hi), Some(lo)) => *byte = (hi << 4) | lo,
            _ => return Err(IdentityError::InvalidHex { text: text.to_string() }),
        }
    }

    Ok(ObjectId::from_bytes(bytes))
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Configuration for an [`IdentityCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCacheConfig {
    /// Maximum number of interned identifiers. Zero disables caching.
    pub capacity: usize,
}

impl IdentityCacheConfig {
    /// Default number of interned identifiers.
    pub const DEFAULT_CAPACITY: usize = 4096;

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

impl Default for IdentityCacheConfig {
    fn default() -> Self {
        Self { capacity: Self::DEFAULT_CAPACITY }
    }
}

/// Counters describing cache behaviour since creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Identifiers currently interned.
    pub entries: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that created a new entry.
    pub misses: u64,
    /// Entries removed to stay within capacity or by a purge.
    pub evictions: u64,
}

#[derive(Debug)]
struct CacheEntry {
    identifier: Identifier,
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Keys ordered by last use, oldest first. Ticks are unique.
    recency: BTreeMap<u64, String>,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, key: &str, now: u64) -> Option<Identifier> {
        let entry = self.entries.get_mut(key)?;
        let previous = std::mem::replace(&mut entry.last_used, now);
        let identifier = entry.identifier.clone();

        if let Some(key) = self.recency.remove(&previous) {
            self.recency.insert(now, key);
        }

        Some(identifier)
    }

    fn insert(&mut self, key: String, identifier: Identifier, now: u64) {
        self.recency.insert(now, key.clone());
        self.entries.insert(key, CacheEntry { identifier, last_used: now });
    }

    /// Evicts one entry, preferring the least recently used entry nobody else holds.
    fn evict_one(&mut self) {
        let victim = self
            .recency
            .iter()
            .find(|(_, key)| {
                self.entries
                    .get(*key)
                    .is_some_and(|entry| Arc::strong_count(&entry.identifier.oid) == 1)
            })
            .or_else(|| self.recency.iter().next())
            .map(|(tick, key)| (*tick, key.clone()));

        if let Some((tick, key)) = victim {
            debug!(identifier = %key, "evicting identifier from cache");
            self.recency.remove(&tick);
            self.entries.remove(&key);
            self.evictions += 1;
        }
    }

    fn retain(&mut self, mut keep: impl FnMut(&CacheEntry) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| keep(entry));

        let entries = &self.entries;
        self.recency.retain(|_, key| entries.contains_key(key));

        before - self.entries.len()
    }
}

/// Bounded, thread-safe interning cache for identifiers.
///
/// Owned by a [`Connection`](crate::connection::Connection) and shared with its marshaller.
/// When the cache grows past its capacity it evicts deterministically: entries referenced
/// only by the cache go first, least recently used first.
#[derive(Debug)]
pub struct IdentityCache {
    config: IdentityCacheConfig,
    state: Mutex<CacheState>,
}

impl IdentityCache {
    pub fn new(config: IdentityCacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn config(&self) -> &IdentityCacheConfig {
        &self.config
    }

    /// Returns the interned identifier for `text`, creating and storing it on a miss.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] if `text` is not 24 hex characters.
    pub fn get_or_create(&self, text: &str) -> Result<Identifier, IdentityError> {
        let oid = parse_object_id(text)?;
        Ok(self.intern(oid))
    }

    /// Generates a new identifier and interns it.
    pub fn create(&self) -> Identifier {
        self.intern(ObjectId::new())
    }

    /// Interns a native identifier.
    pub fn intern(&self, oid: ObjectId) -> Identifier {
        if self.config.capacity == 0 {
            return Identifier::from_object_id(oid);
        }

        let key = oid.to_hex();
        let mut state = self.state.lock();
        let now = state.tick();

        if let Some(identifier) = state.touch(&key, now) {
            state.hits += 1;
            trace!(identifier = %key, "identity cache hit");
            return identifier;
        }

        state.misses += 1;
        trace!(identifier = %key, "identity cache miss");

        while state.entries.len() >= self.config.capacity {
            state.evict_one();
        }

        let identifier = Identifier::from_object_id(oid);
        state.insert(key, identifier.clone(), now);

        identifier
    }

    /// Drops every entry that only the cache references. Returns how many were removed.
    pub fn purge_unreferenced(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.retain(|entry| Arc::strong_count(&entry.identifier.oid) > 1);
        state.evictions += removed as u64;

        if removed > 0 {
            debug!(removed, "purged unreferenced identifiers");
        }

        removed
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.recency.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new(IdentityCacheConfig::default())
    }
}
