// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Error taxonomy for SDDS operations.
//!
//! Wire-level errors are always recovered locally (the offending message is
//! dropped and a warning is logged); QoS and precondition errors surface as
//! the result of the caller's operation; security failures abort the
//! offending match but never the participant.

use crate::qos::PolicyId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by SDDS operations.
#[derive(Debug)]
pub enum Error {
    /// Caller passed a malformed locator, negative sequence number, or an
    /// unknown QoS combination.
    InvalidArgument(String),
    /// Operation requires a state the entity is not in (e.g. deleting a
    /// publisher that still owns writers).
    PreconditionNotMet(String),
    /// Attempted to change a QoS policy that is immutable once the entity
    /// has been enabled.
    ImmutablePolicy(PolicyId),
    /// QoS policies are internally inconsistent (e.g. KEEP_ALL history with
    /// a bounded depth of zero).
    InconsistentPolicy(String),
    /// Entity has not been enabled yet.
    NotEnabled,
    /// Entity is already enabled.
    AlreadyEnabled,
    /// A blocking operation exceeded its deadline.
    Timeout,
    /// History full, pool exhausted, or sequence-number space exhausted.
    OutOfResources(String),
    /// Received a malformed RTPS message; dropped with a warning.
    WireFormat(String),
    /// Authentication/access/crypto failure reported by a security plugin.
    /// Never recovered locally.
    Security(String),
    /// Listening endpoint could not be bound because the address is in use.
    AddressInUse,
    /// The locator kind or operation is not supported by this transport.
    Unsupported(&'static str),
    /// Underlying I/O failure.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::PreconditionNotMet(msg) => write!(f, "precondition not met: {}", msg),
            Error::ImmutablePolicy(id) => write!(f, "immutable policy: {:?}", id),
            Error::InconsistentPolicy(msg) => write!(f, "inconsistent policy: {}", msg),
            Error::NotEnabled => write!(f, "entity not enabled"),
            Error::AlreadyEnabled => write!(f, "entity already enabled"),
            Error::Timeout => write!(f, "operation timed out"),
            Error::OutOfResources(msg) => write!(f, "out of resources: {}", msg),
            Error::WireFormat(msg) => write!(f, "malformed RTPS message: {}", msg),
            Error::Security(msg) => write!(f, "security failure: {}", msg),
            Error::AddressInUse => write!(f, "address in use"),
            Error::Unsupported(what) => write!(f, "unsupported: {}", what),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            Error::AddressInUse
        } else {
            Error::Io(e)
        }
    }
}
