// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Security plugin hooks.
//!
//! The core never parses certificates or runs crypto; a plugin may
//! authenticate peers, authorize topic access, and transform submessages.
//! Plugins see handles and opaque payloads only; plugin state stays out of
//! the endpoint layer. Any failure surfaces as `Error::Security`, aborts
//! the offending match, and never takes the participant down.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::types::{Guid, GuidPrefix};

/// Opaque handle to an authenticated remote identity.
pub type IdentityHandle = u64;

/// Security plugin surface consumed by the discovery and message
/// pipelines.
pub trait SecurityPlugin: Send + Sync {
    /// Authenticate a remote participant from its identity token.
    /// Success yields a handle used by later authorization calls.
    fn authenticate_remote(
        &self,
        local_guid: &Guid,
        remote_guid: &Guid,
        identity_token: &[u8],
    ) -> Result<IdentityHandle>;

    /// Authorize a discovered match against a topic. `writing` is true
    /// when the remote intends to publish.
    fn authorize_match(
        &self,
        remote: IdentityHandle,
        topic_name: &str,
        writing: bool,
    ) -> Result<()>;

    /// Protect an outbound writer submessage for the given receivers.
    fn encode_datawriter_submessage(
        &self,
        plain: &[u8],
        receiving_participants: &[GuidPrefix],
    ) -> Result<Vec<u8>>;

    /// Unprotect an inbound submessage destined for a local reader.
    fn decode_datareader_submessage(
        &self,
        protected: &[u8],
        source_participant: &GuidPrefix,
    ) -> Result<Vec<u8>>;
}

/// Pass-through plugin used when no security is configured: everything is
/// authenticated and authorized, payloads flow untouched.
#[derive(Default)]
pub struct PermissiveSecurity;

impl SecurityPlugin for PermissiveSecurity {
    fn authenticate_remote(
        &self,
        _local_guid: &Guid,
        _remote_guid: &Guid,
        _identity_token: &[u8],
    ) -> Result<IdentityHandle> {
        Ok(0)
    }

    fn authorize_match(&self, _remote: IdentityHandle, _topic: &str, _writing: bool) -> Result<()> {
        Ok(())
    }

    fn encode_datawriter_submessage(
        &self,
        plain: &[u8],
        _receiving_participants: &[GuidPrefix],
    ) -> Result<Vec<u8>> {
        Ok(plain.to_vec())
    }

    fn decode_datareader_submessage(
        &self,
        protected: &[u8],
        _source_participant: &GuidPrefix,
    ) -> Result<Vec<u8>> {
        Ok(protected.to_vec())
    }
}

/// Deny-everything plugin for tests exercising the rejection paths.
pub struct DenyAllSecurity;

impl SecurityPlugin for DenyAllSecurity {
    fn authenticate_remote(
        &self,
        _local_guid: &Guid,
        remote_guid: &Guid,
        _identity_token: &[u8],
    ) -> Result<IdentityHandle> {
        Err(Error::Security(format!(
            "authentication rejected for {}",
            remote_guid
        )))
    }

    fn authorize_match(&self, _remote: IdentityHandle, topic: &str, _writing: bool) -> Result<()> {
        Err(Error::Security(format!("access to '{}' denied", topic)))
    }

    fn encode_datawriter_submessage(
        &self,
        _plain: &[u8],
        _receiving_participants: &[GuidPrefix],
    ) -> Result<Vec<u8>> {
        Err(Error::Security("encode rejected".into()))
    }

    fn decode_datareader_submessage(
        &self,
        _protected: &[u8],
        _source_participant: &GuidPrefix,
    ) -> Result<Vec<u8>> {
        Err(Error::Security("decode rejected".into()))
    }
}

/// Default plugin instance.
#[must_use]
pub fn permissive() -> Arc<dyn SecurityPlugin> {
    Arc::new(PermissiveSecurity)
}
