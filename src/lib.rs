// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of objfield

//! Opaque serialised object columns for Diesel's SQLite backend.
//!
//! A column declared through this crate accepts *any* serialisable Rust
//! value and stores it as base64 text, optionally zlib-compressed. The
//! value is reconstructed transparently on read. Schema definition,
//! query construction, connections and migrations all stay with Diesel;
//! this crate only defines how one column's value moves between the
//! in-memory shape and the stored text scalar.
//!
//! Two layers:
//!
//! - [`sql::Stored`] and [`sql::Compressed`] are Diesel-ready generic
//!   wrappers for use in `Queryable`/`Insertable` structs against TEXT
//!   columns.
//! - [`column::ObjectColumn`] is the underlying column behaviour (the
//!   encode/decode hooks, default resolution, lookup preparation and
//!   the `exact`/`in`/`isnull` lookup allow-list) for hosts that
//!   integrate at that level.
//!
//! Values are copied into a canonical form before encoding (unless the
//! column opts out), so equal values always store byte-identical text
//! and equality filters match the rows they should. `None` passes
//! through both directions untouched, which keeps null-checks working.
//! Text that was never encoded is returned verbatim on read, so columns
//! migrated from plain text stay readable.
//!
//! ```
//! use objfield::ObjectColumn;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let column = ObjectColumn::new();
//!
//! let stored = column.on_write(Some(&json!({"foo": "bar"})))?;
//! let value = column.on_read(stored)?;
//! assert_eq!(value, Some(json!({"foo": "bar"})));
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod column;
pub mod config;
pub mod errors;
pub mod sql;

pub use codec::{Staged, StoredText};
pub use column::{LookupKind, ObjectColumn};
pub use config::{
    ColumnDefault, ConfigWarning, DEFAULT_PROTOCOL, MUTABLE_DEFAULT_WARNING, Protocol,
    default_protocol, set_default_protocol,
};
pub use errors::{ConfigError, DecodeError, EncodeError, UnsupportedLookup};
pub use sql::{Compressed, Stored};
