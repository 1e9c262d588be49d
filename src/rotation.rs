// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! System key rotation.
//!
//! Server-wide encryption keys (binary log, redo log) are stored as system
//! keys named `<family>[-<key_id>]-<server_uuid>`. Rotating one stores fresh
//! random material under the bare name, which the container turns into the
//! next version.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{KeyringError, KeyringResult};
use crate::keyring::{Key, KeysContainer};

/// Key type stored for generated system keys.
pub const SYSTEM_KEY_KIND: &str = "AES";

/// Rotatable system key families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemKeyKind {
    Binlog,
    Redo,
}

impl SystemKeyKind {
    /// Keyring name prefix of the family.
    pub fn name(self) -> &'static str {
        match self {
            SystemKeyKind::Binlog => "percona_binlog",
            SystemKeyKind::Redo => "percona_redo",
        }
    }

    /// Length of generated key material in bytes.
    pub fn key_len(self) -> usize {
        match self {
            SystemKeyKind::Binlog => 16,
            SystemKeyKind::Redo => 32,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "binlog" => Some(SystemKeyKind::Binlog),
            "redo" => Some(SystemKeyKind::Redo),
            _ => None,
        }
    }
}

impl fmt::Display for SystemKeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Request to rotate one system key of this server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotateSystemKey {
    pub kind: SystemKeyKind,
    pub key_id: Option<u32>,
    pub server_uuid: Uuid,
}

impl RotateSystemKey {
    pub fn new(kind: SystemKeyKind, server_uuid: Uuid) -> Self {
        Self {
            kind,
            key_id: None,
            server_uuid,
        }
    }

    pub fn with_key_id(mut self, key_id: u32) -> Self {
        self.key_id = Some(key_id);
        self
    }

    /// Bare keyring id of the key.
    pub fn key_name(&self) -> String {
        match self.key_id {
            Some(key_id) => format!("{}-{}-{}", self.kind.name(), key_id, self.server_uuid),
            None => format!("{}-{}", self.kind.name(), self.server_uuid),
        }
    }

    /// Store a new version of an existing system key.
    pub fn rotate(&self, container: &mut KeysContainer) -> KeyringResult<()> {
        let name = self.key_name();
        if container.fetch_key(&Key::template(&name)).is_none() {
            tracing::warn!(key = %name, "Cannot rotate a system key that does not exist");
            return Err(KeyringError::RotationKeyDoesNotExist(name));
        }

        self.generate(container, &name)?;
        tracing::info!(key = %name, "System key rotated");
        Ok(())
    }

    /// Store the first version of the key unless one exists.
    ///
    /// Returns whether a key was created.
    pub fn create_if_missing(&self, container: &mut KeysContainer) -> KeyringResult<bool> {
        let name = self.key_name();
        if container.fetch_key(&Key::template(&name)).is_some() {
            return Ok(false);
        }
        self.generate(container, &name)?;
        tracing::info!(key = %name, "System key created");
        Ok(true)
    }

    fn generate(&self, container: &mut KeysContainer, name: &str) -> KeyringResult<()> {
        container
            .generate_key(name, SYSTEM_KEY_KIND, "", self.kind.key_len())
            .map_err(|e| KeyringError::RotationCannotGenerate {
                key: name.to_string(),
                source: Box::new(e),
            })
    }
}
