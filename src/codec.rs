// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of objfield

//! The encode/decode pair behind every object column.
//!
//! Stored form is `base64( zlib?( canonical JSON ) )`. Base64 keeps the
//! scalar safe through any character-set transcoding the storage layer
//! performs; compression is optional per column.
//!
//! Two tagged unions carry the provenance distinctions the read and
//! write paths depend on:
//!
//! - [`StoredText`] separates text known to be codec output from text
//!   that merely looks like it (hand-inserted rows, legacy plain-text
//!   columns).
//! - [`Staged`] marks values whose serialised shape would read back as
//!   the codec's own wrapper object, so they are shielded exactly once
//!   before serialisation.
//!
//! Equality lookups against an encoded column only work if equal values
//! encode to byte-identical text. Serialising a `HashMap` directly
//! emits entries in iteration order, which differs between equal maps
//! built in different orders; the `copy` step routes the value through
//! the canonical tree form (ordered maps) first, collapsing those
//! differences. Callers that never perform equality lookups can skip
//! the copy and take the cheaper direct path.

use std::io::Read;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use flate2::{
    Compression,
    read::{ZlibDecoder, ZlibEncoder},
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    config::Protocol,
    errors::{DecodeError, EncodeError},
};

/// Reserved top-level key marking a wrapper object in the encoded
/// stream.
pub(crate) const WRAPPER_KEY: &str = "__objfield__";

/// Text on its way into or out of a column, tagged with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredText {
    /// Known output of [`encode`].
    Blob(String),
    /// Text of unknown origin: raw database reads, hand-inserted rows,
    /// values left over from a plain-text column.
    Plain(String),
}

impl StoredText {
    pub fn as_str(&self) -> &str {
        match self {
            StoredText::Blob(text) | StoredText::Plain(text) => text,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            StoredText::Blob(text) | StoredText::Plain(text) => text,
        }
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, StoredText::Blob(_))
    }
}

/// A value between write-time observation and the codec.
///
/// Never persisted itself; only its encoded form is. `Wrapped` shields
/// trees whose bare shape would read back as the codec's wrapper
/// object. Staging consumes the tree into a tagged union, so a staged
/// value cannot be staged again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staged {
    Plain(Value),
    Wrapped(Value),
}

/// Applies the wrapping rule once.
pub fn stage(tree: Value) -> Staged {
    if looks_like_wrapper(&tree) {
        Staged::Wrapped(tree)
    } else {
        Staged::Plain(tree)
    }
}

fn looks_like_wrapper(tree: &Value) -> bool {
    tree.as_object()
        .is_some_and(|map| map.len() == 1 && map.contains_key(WRAPPER_KEY))
}

// Conservative collision check for the direct (no-copy) path: the
// serialised text opens with the wrapper key. May over-match an object
// whose first emitted entry is the marker; over-wrapping is harmless
// because decode unwraps exactly once.
fn direct_output_collides(text: &str) -> bool {
    text.strip_prefix("{\"")
        .and_then(|rest| rest.strip_prefix(WRAPPER_KEY))
        .is_some_and(|rest| rest.starts_with('"'))
}

/// Encodes a value for storage in a text column.
///
/// With `copy` set, the value is first copied into the canonical tree
/// form so equal values always produce byte-identical output. Without
/// it the value is serialised directly; cheaper, but output equality
/// for equal inputs is not guaranteed.
pub fn encode<T>(
    value: &T,
    compress: bool,
    protocol: Protocol,
    copy: bool,
) -> Result<StoredText, EncodeError>
where
    T: Serialize + ?Sized,
{
    let payload = if copy {
        let tree = serde_json::to_value(value).map_err(EncodeError::Copy)?;
        staged_payload(stage(tree), protocol)?
    } else {
        let text = serde_json::to_string(value).map_err(EncodeError::Serialize)?;
        if direct_output_collides(&text) {
            if !protocol.supports_wrapper() {
                return Err(EncodeError::WrapperNotSupported(protocol.version()));
            }
            format!("{{\"{WRAPPER_KEY}\":{text}}}")
        } else {
            text
        }
    };
    seal(payload.into_bytes(), compress)
}

/// Encodes a value staged earlier, without re-staging it.
///
/// This is the write path for lookup values: staging happened when the
/// comparison value was prepared, and encoding it here produces exactly
/// the bytes an assignment of the same value would have.
pub fn encode_staged(
    staged: Staged,
    compress: bool,
    protocol: Protocol,
) -> Result<StoredText, EncodeError> {
    let payload = staged_payload(staged, protocol)?;
    seal(payload.into_bytes(), compress)
}

fn staged_payload(staged: Staged, protocol: Protocol) -> Result<String, EncodeError> {
    match staged {
        Staged::Plain(tree) => serde_json::to_string(&tree).map_err(EncodeError::Serialize),
        Staged::Wrapped(tree) => {
            if !protocol.supports_wrapper() {
                return Err(EncodeError::WrapperNotSupported(protocol.version()));
            }
            let mut wrapper = Map::with_capacity(1);
            wrapper.insert(WRAPPER_KEY.to_owned(), tree);
            serde_json::to_string(&Value::Object(wrapper)).map_err(EncodeError::Serialize)
        }
    }
}

fn seal(bytes: Vec<u8>, compress: bool) -> Result<StoredText, EncodeError> {
    let bytes = if compress {
        let mut encoder = ZlibEncoder::new(&bytes[..], Compression::default());
        let mut compressed = Vec::new();
        encoder
            .read_to_end(&mut compressed)
            .map_err(EncodeError::Compress)?;
        compressed
    } else {
        bytes
    };
    Ok(StoredText::Blob(STANDARD.encode(bytes)))
}

/// Decodes stored text back into the canonical tree, reversing
/// [`encode`] stage by stage.
///
/// Fails with [`DecodeError`] if any stage fails. Callers decide what a
/// failure means from the input's provenance tag; this function has no
/// fallback of its own.
pub fn decode(text: &str, compress: bool) -> Result<Value, DecodeError> {
    let bytes = STANDARD.decode(text)?;
    let bytes = if compress {
        let mut decoder = ZlibDecoder::new(&bytes[..]);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(DecodeError::Decompress)?;
        decompressed
    } else {
        bytes
    };
    let tree: Value = serde_json::from_slice(&bytes)?;
    Ok(unwrap_tree(tree))
}

// Reverses the wrapper convention, exactly once.
fn unwrap_tree(tree: Value) -> Value {
    match tree {
        Value::Object(mut map) if map.len() == 1 && map.contains_key(WRAPPER_KEY) => {
            map.remove(WRAPPER_KEY).unwrap_or(Value::Null)
        }
        other => other,
    }
}
