// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of objfield

//! Column declaration knobs: the stream-layout version, the process-wide
//! default for it, and declared column defaults.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ConfigError, EncodeError};

/// Stream-layout version for encoded column values.
///
/// The version a column encodes with is fixed at declaration time and
/// never "latest": an auto-upgrading layout would silently change the
/// stored byte stream over time and break equality lookups against rows
/// written earlier.
///
/// Plain values encode identically under every known version; the
/// versions differ only in whether the wrapper convention for
/// marker-shaped values is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Protocol(u8);

impl Protocol {
    /// Bare canonical JSON. Cannot carry wrapper-shaped values.
    pub const V1: Protocol = Protocol(1);
    /// Current layout, with the wrapper convention.
    pub const V2: Protocol = Protocol(2);

    /// Validates a version number into a [`Protocol`].
    pub fn new(version: u8) -> Result<Protocol, ConfigError> {
        match version {
            1 => Ok(Protocol::V1),
            2 => Ok(Protocol::V2),
            other => Err(ConfigError::UnknownProtocol(other)),
        }
    }

    /// The raw version number.
    pub fn version(self) -> u8 {
        self.0
    }

    pub(crate) fn supports_wrapper(self) -> bool {
        self >= Protocol::V2
    }
}

impl TryFrom<u8> for Protocol {
    type Error = ConfigError;

    fn try_from(version: u8) -> Result<Protocol, ConfigError> {
        Protocol::new(version)
    }
}

impl From<Protocol> for u8 {
    fn from(protocol: Protocol) -> u8 {
        protocol.0
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The version columns encode with unless declared otherwise.
pub const DEFAULT_PROTOCOL: Protocol = Protocol::V2;

static PROCESS_DEFAULT_PROTOCOL: OnceLock<Protocol> = OnceLock::new();

/// Installs a process-wide default protocol for columns that do not
/// declare one explicitly.
///
/// May be called at most once, before the first column is declared;
/// later calls fail with [`ConfigError::DefaultProtocolAlreadySet`].
pub fn set_default_protocol(protocol: Protocol) -> Result<(), ConfigError> {
    PROCESS_DEFAULT_PROTOCOL
        .set(protocol)
        .map_err(|_| ConfigError::DefaultProtocolAlreadySet)?;
    debug!("process default storage format set to {protocol}");
    Ok(())
}

/// The protocol new column declarations pick up.
///
/// Consulted once per declaration, never at encode time.
pub fn default_protocol() -> Protocol {
    PROCESS_DEFAULT_PROTOCOL
        .get()
        .copied()
        .unwrap_or(DEFAULT_PROTOCOL)
}

/// The declared initial value of a column.
#[derive(Clone)]
pub enum ColumnDefault {
    /// A fixed tree, handed back as declared for every row that needs
    /// it.
    Fixed(Value),
    /// Invoked fresh for every row that needs a default; the result is
    /// never memoised.
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl ColumnDefault {
    /// Declares a fixed default, canonicalised once up front.
    pub fn fixed<T: Serialize>(value: T) -> Result<ColumnDefault, EncodeError> {
        serde_json::to_value(value)
            .map(ColumnDefault::Fixed)
            .map_err(EncodeError::Copy)
    }

    /// Declares a factory default that builds a fresh value per row.
    pub fn factory<F>(factory: F) -> ColumnDefault
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        ColumnDefault::Factory(Arc::new(factory))
    }
}

impl fmt::Debug for ColumnDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnDefault::Fixed(tree) => f.debug_tuple("Fixed").field(tree).finish(),
            ColumnDefault::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Diagnostic id for a mutable literal declared as a column default.
pub const MUTABLE_DEFAULT_WARNING: &str = "objfield.W001";

/// A declaration-time diagnostic surfaced to the host. Reported, never
/// raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// Stable diagnostic id, e.g. `objfield.W001`.
    pub id: &'static str,
    pub message: String,
    pub hint: String,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn protocol_versions_validate() {
        assert_eq!(Protocol::new(1).unwrap(), Protocol::V1);
        assert_eq!(Protocol::new(2).unwrap(), Protocol::V2);

        let err = Protocol::new(3).unwrap_err();
        assert_matches!(err, ConfigError::UnknownProtocol(3));
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn protocol_serialises_as_bare_number() {
        assert_eq!(serde_json::to_string(&Protocol::V2).unwrap(), "2");

        let parsed: Protocol = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, Protocol::V1);
        assert!(serde_json::from_str::<Protocol>("9").is_err());
    }

    #[test]
    fn process_default_is_set_once() {
        // The override mechanism is process-global; installing the
        // stock version keeps every other test's declarations
        // unaffected regardless of execution order.
        assert_eq!(default_protocol(), DEFAULT_PROTOCOL);
        set_default_protocol(Protocol::V2).unwrap();
        assert_eq!(default_protocol(), Protocol::V2);

        assert_matches!(
            set_default_protocol(Protocol::V1),
            Err(ConfigError::DefaultProtocolAlreadySet)
        );
        assert_eq!(default_protocol(), Protocol::V2);
    }

    #[test]
    fn fixed_default_canonicalises_up_front() {
        assert_matches!(
            ColumnDefault::fixed((1, 2)).unwrap(),
            ColumnDefault::Fixed(tree) if tree == json!([1, 2])
        );
    }
}
