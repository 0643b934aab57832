// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of objfield

//! One declared object column and the hooks a host ORM drives it
//! through.
//!
//! [`ObjectColumn`] carries the behaviour fixed at declaration time
//! (compression, stream-layout version, defensive copy, default) and is
//! immutable and freely shareable afterwards. Every hook is a pure,
//! synchronous transformation of its explicit arguments; the only
//! caller-visible side effects are those of a declared factory default.
//!
//! The read hook tolerates text that was never encoded: decode failures
//! on untagged input hand the raw text back, which keeps columns
//! migrated from plain text (and hand-inserted rows) readable. Decode
//! failures on input tagged as known codec output are genuine
//! corruption and propagate.

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::{
    codec::{self, Staged, StoredText},
    config::{ColumnDefault, ConfigWarning, MUTABLE_DEFAULT_WARNING, Protocol, default_protocol},
    errors::{DecodeError, EncodeError, UnsupportedLookup},
};

/// Comparison kinds that are meaningful against an opaque encoded
/// column.
///
/// Ordering, substring and range comparisons over the encoded text
/// would silently never match anything sensible, so they are rejected
/// up front rather than allowed to produce misleading queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Exact,
    In,
    IsNull,
}

impl LookupKind {
    pub fn name(self) -> &'static str {
        match self {
            LookupKind::Exact => "exact",
            LookupKind::In => "in",
            LookupKind::IsNull => "isnull",
        }
    }
}

/// One declared column: behaviour fixed at declaration time, shared
/// read-only by every row of the column.
#[derive(Debug, Clone)]
pub struct ObjectColumn {
    /// Zlib-compress the serialised bytes before text-armouring.
    pub compress: bool,
    /// Stream-layout version, fixed for the lifetime of the column.
    pub protocol: Protocol,
    /// Copy values into canonical form before encoding, so equal values
    /// encode to byte-identical text. Required for equality lookups.
    pub copy: bool,
    default: Option<ColumnDefault>,
}

impl Default for ObjectColumn {
    fn default() -> Self {
        ObjectColumn::new()
    }
}

impl ObjectColumn {
    /// Declares a column with the stock behaviour: no compression,
    /// defensive copy on, no default, the process default protocol.
    ///
    /// The process-wide protocol default is read here, once, never
    /// again at encode time.
    pub fn new() -> Self {
        ObjectColumn {
            compress: false,
            protocol: default_protocol(),
            copy: true,
            default: None,
        }
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Disabling the copy step skips canonicalisation on write. Cheaper
    /// for large values, but equality lookups against the column are no
    /// longer reliable.
    pub fn with_copy(mut self, copy: bool) -> Self {
        self.copy = copy;
        self
    }

    pub fn with_default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Resolves the declared default for a new row.
    ///
    /// Factories run fresh on every call and are never memoised; fixed
    /// values come back as declared. The result is not encoded here;
    /// it is encoded if and when it is actually written.
    pub fn resolve_default(&self) -> Option<Value> {
        match &self.default {
            None => None,
            Some(ColumnDefault::Fixed(tree)) => Some(tree.clone()),
            Some(ColumnDefault::Factory(factory)) => Some(factory()),
        }
    }

    /// Read hook. `None` (SQL NULL) passes through untouched, so
    /// null-checks keep working without the codec seeing them.
    pub fn on_read(&self, stored: Option<StoredText>) -> Result<Option<Value>, DecodeError> {
        stored.map(|text| self.decode_stored(text)).transpose()
    }

    /// Decodes one non-null stored text.
    ///
    /// Failures on [`StoredText::Blob`] input propagate; failures on
    /// [`StoredText::Plain`] input mean the text was never encoded, so
    /// the raw text comes back unchanged.
    pub fn decode_stored(&self, stored: StoredText) -> Result<Value, DecodeError> {
        match codec::decode(stored.as_str(), self.compress) {
            Ok(tree) => Ok(tree),
            Err(err) => match stored {
                StoredText::Blob(_) => Err(err),
                StoredText::Plain(text) => {
                    debug!("stored text is not an encoded object ({err}); returning it verbatim");
                    Ok(Value::String(text))
                }
            },
        }
    }

    /// Write hook. `None` passes through so NULL columns stay NULL.
    pub fn on_write<T>(&self, value: Option<&T>) -> Result<Option<StoredText>, EncodeError>
    where
        T: Serialize + ?Sized,
    {
        value
            .map(|value| codec::encode(value, self.compress, self.protocol, self.copy))
            .transpose()
    }

    /// Write hook for text that may already be encoded: known blobs
    /// pass through unchanged, anything else is treated as an ordinary
    /// string value.
    pub fn on_write_stored(
        &self,
        value: Option<StoredText>,
    ) -> Result<Option<StoredText>, EncodeError> {
        match value {
            None => Ok(None),
            Some(StoredText::Blob(text)) => Ok(Some(StoredText::Blob(text))),
            Some(StoredText::Plain(text)) => self.on_write(Some(&text)),
        }
    }

    /// Write hook for a value staged by
    /// [`Self::prepare_lookup_value`]. The value is not staged again.
    pub fn on_write_staged(
        &self,
        staged: Option<Staged>,
    ) -> Result<Option<StoredText>, EncodeError> {
        staged
            .map(|staged| codec::encode_staged(staged, self.compress, self.protocol))
            .transpose()
    }

    /// Prepares a right-hand-side comparison value.
    ///
    /// Applies the same staging rule as the write path but does not
    /// encode; routing the result through [`Self::on_write_staged`]
    /// yields exactly the bytes an assignment of the same value would
    /// have produced, so both sides of the comparison come from a
    /// single encode.
    pub fn prepare_lookup_value<T>(&self, value: &T) -> Result<Staged, EncodeError>
    where
        T: Serialize + ?Sized,
    {
        let tree = serde_json::to_value(value).map_err(EncodeError::Copy)?;
        Ok(codec::stage(tree))
    }

    /// Encoded text for interchange dumps. Already a plain string, so a
    /// generic serialiser needs no special-casing for this column.
    pub fn to_text<T>(&self, value: Option<&T>) -> Result<Option<String>, EncodeError>
    where
        T: Serialize + ?Sized,
    {
        Ok(self.on_write(value)?.map(StoredText::into_string))
    }

    /// The storage kind this column maps to.
    pub const fn storage_type(&self) -> &'static str {
        "TEXT"
    }

    /// Resolves a requested comparison kind against the allow-list.
    pub fn get_lookup(&self, name: &str) -> Result<LookupKind, UnsupportedLookup> {
        match name {
            "exact" => Ok(LookupKind::Exact),
            "in" => Ok(LookupKind::In),
            "isnull" => Ok(LookupKind::IsNull),
            other => Err(UnsupportedLookup {
                kind: other.to_owned(),
            }),
        }
    }

    /// Declaration-time diagnostics.
    ///
    /// A mutable literal default (array or object) is shared by every
    /// row that lacks an explicit value; a factory builds a fresh one
    /// per row.
    pub fn check(&self) -> Vec<ConfigWarning> {
        match &self.default {
            Some(ColumnDefault::Fixed(tree @ (Value::Array(_) | Value::Object(_)))) => {
                vec![ConfigWarning {
                    id: MUTABLE_DEFAULT_WARNING,
                    message: "column default is a mutable literal shared by every row lacking \
                              an explicit value; declare a factory instead"
                        .to_owned(),
                    hint: format!(
                        "use ColumnDefault::factory(|| json!({tree})) so each row gets a fresh \
                         value"
                    ),
                }]
            }
            _ => Vec::new(),
        }
    }
}
