//! Convenient re-exports of commonly used types from dynlayer.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use dynlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - Dynamic values and identifiers
//! - Connection, database and collection handles
//! - Cursors and query options
//! - The driver traits
//! - Error types

pub use dynlayer_core::{
    collection::Collection,
    connection::{Connection, ConnectionBuilder, Database},
    cursor::{Cursor, CursorStatus},
    driver::{DocumentStream, Driver, DriverBuilder, Namespace},
    error::{CursorStateError, DriverError, DriverResult, IdentityError, LayerError, LayerResult, MarshalError},
    identity::{Identifier, IdentityCache, IdentityCacheConfig},
    marshal::{MarshalOptions, Marshaller},
    query::{FindQuery, IndexHint, IndexOptions, SortDirection, UpdateOptions},
    value::{Code, DynamicMap, DynamicValue, RegExp, RegexFlags, ValueKind},
};
