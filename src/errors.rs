// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of objfield

use thiserror::Error;

/// Errors raised while encoding a value for storage.
///
/// All of these indicate a programming-level misuse (a value that
/// cannot be represented, or a failing `Serialize` impl) and propagate
/// immediately; none are swallowed.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The value could not be copied into the canonical tree form.
    #[error("value cannot be copied into canonical form: {0}")]
    Copy(#[source] serde_json::Error),
    /// Direct serialisation of the value failed.
    #[error("failed to serialise value: {0}")]
    Serialize(#[source] serde_json::Error),
    /// Compressing the serialised bytes failed.
    #[error("failed to compress encoded value: {0}")]
    Compress(#[source] std::io::Error),
    /// The configured stream layout predates the wrapper convention and
    /// cannot carry a wrapper-shaped value.
    #[error("storage format v{0} cannot represent wrapper-shaped values")]
    WrapperNotSupported(u8),
}

/// Errors raised while decoding stored text.
///
/// Whether a decode failure surfaces depends on the input's provenance
/// tag: failures on known blobs are genuine corruption and propagate,
/// failures on untagged text mean "this was never encoded" and the
/// caller falls back to the raw text.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The stored text is not valid base64.
    #[error("stored text is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The stored bytes could not be decompressed.
    #[error("failed to decompress stored bytes: {0}")]
    Decompress(#[source] std::io::Error),
    /// The decoded bytes are not a serialised value tree.
    #[error("malformed serialised structure: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A comparison kind outside the `exact`/`in`/`isnull` allow-list was
/// requested against an encoded column.
#[derive(Debug, Error)]
#[error("lookup type {kind} is not supported")]
pub struct UnsupportedLookup {
    /// The requested lookup kind, as named by the caller.
    pub kind: String,
}

/// Declaration-time configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The requested stream-layout version is not one this crate knows
    /// how to produce.
    #[error("unknown storage format version {0}")]
    UnknownProtocol(u8),
    /// The process-wide default protocol may only be installed once.
    #[error("process-wide default storage format version is already set")]
    DefaultProtocolAlreadySet,
}
