// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key value object and payload obfuscation.

use std::fmt;

/// Repeating pad XOR-ed over key payloads. Applying it twice is the identity.
const OBFUSCATION_PAD: &[u8] = b"*305=Ljt0*!@$Hnm(*-9-w;:";

/// Key types accepted when a keyring is loaded.
pub const VALID_KEY_TYPES: [&str; 4] = ["AES", "RSA", "DSA", "SECRET"];

/// Obfuscate (or deobfuscate) a payload.
pub fn obfuscate(data: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(OBFUSCATION_PAD.iter().cycle())
        .map(|(byte, pad)| byte ^ pad)
        .collect()
}

/// Mutation carried alongside a snapshot when serializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOperation {
    Store,
    Remove,
}

/// A named secret.
///
/// Keys are identified by their signature (`id` followed by `owner`). The
/// payload is opaque; system keys carry obfuscated material.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Key {
    id: String,
    kind: String,
    owner: String,
    payload: Vec<u8>,
}

impl Key {
    /// Create a key without an owner.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            owner: String::new(),
            payload: payload.into(),
        }
    }

    /// Create a lookup template carrying only an id.
    pub fn template(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the owner.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Replace the id, keeping everything else.
    pub(crate) fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub(crate) fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Owner of the key; empty for system keys.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Unique lookup key: id followed by owner.
    pub fn signature(&self) -> String {
        let mut signature = String::with_capacity(self.id.len() + self.owner.len());
        signature.push_str(&self.id);
        signature.push_str(&self.owner);
        signature
    }

    /// Whether the key may appear in a loaded keyring.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && VALID_KEY_TYPES.contains(&self.kind.as_str())
    }

    /// Return a copy with the payload passed through [`obfuscate`].
    pub fn obfuscated(mut self) -> Self {
        self.payload = obfuscate(&self.payload);
        self
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material never reaches logs.
        f.debug_struct("Key")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
