// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The keys container: in-memory key registry backed by a [`KeyringIo`].
//!
//! Every mutation is written twice. The snapshot before the change goes to
//! the backup, then the snapshot after the change replaces the keyring
//! file. A failed write leaves the in-memory registry as it was.

use std::path::Path;

use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;

use super::io::{KeyringIo, StoreError};
use super::system_keys::{SystemKeyId, SystemKeyVersioning, VersionLedger};
use super::{obfuscate, Key, KeyMap, KeyOperation};
use crate::error::{KeyringError, KeyringResult};

pub const MSG_BACKUP_FLUSH_FAILED: &str = "Could not flush keys to keyring's backup";
pub const MSG_FLUSH_FAILED: &str = "Could not flush keys to keyring";
pub const MSG_LOAD_FAILED: &str =
    "Error while loading keyring content. The keyring might be malformed";

/// Key metadata without the key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyInfo {
    pub id: String,
    pub kind: String,
    pub owner: String,
    pub payload_len: usize,
    pub system: bool,
}

pub struct KeysContainer {
    io: Option<Box<dyn KeyringIo>>,
    system_keys: Box<dyn SystemKeyVersioning>,
    keys: KeyMap,
}

impl Default for KeysContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl KeysContainer {
    /// Create an uninitialized container with the default version ledger.
    pub fn new() -> Self {
        Self::with_system_keys(Box::new(VersionLedger::new()))
    }

    pub fn with_system_keys(system_keys: Box<dyn SystemKeyVersioning>) -> Self {
        Self {
            io: None,
            system_keys,
            keys: KeyMap::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.io.is_some()
    }

    /// Open the keyring at `keyring_path` and load its keys.
    ///
    /// On failure the container is left empty and refuses mutations until
    /// it is initialized again.
    pub fn init(&mut self, mut io: Box<dyn KeyringIo>, keyring_path: &Path) -> KeyringResult<()> {
        self.io = None;
        self.keys.clear();
        self.system_keys.clear();

        let keys = match load_keys(io.as_mut(), keyring_path) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(
                    path = %keyring_path.display(),
                    error = %e,
                    "{}",
                    MSG_LOAD_FAILED
                );
                return Err(KeyringError::MalformedStore(e.to_string()));
            }
        };

        for key in keys.values() {
            self.system_keys.record_versioned(key);
        }
        tracing::info!(
            path = %keyring_path.display(),
            keys = keys.len(),
            "Keyring loaded"
        );
        self.keys = keys;
        self.io = Some(io);
        Ok(())
    }

    /// Persist a new key.
    ///
    /// A system key given by its bare base name is stored as the next
    /// version of that base.
    pub fn store_key(&mut self, key: Key) -> KeyringResult<()> {
        let Self {
            io,
            system_keys,
            keys,
        } = self;
        let io = io.as_deref_mut().ok_or(KeyringError::NotInitialized)?;

        if key.id().is_empty() {
            return Err(KeyringError::InvalidKey(format!(
                "key of type {:?} has an empty id",
                key.kind()
            )));
        }
        let key = system_keys.rotate_id_if_unversioned(key)?;
        let signature = key.signature();
        if keys.contains_key(&signature) {
            return Err(KeyringError::DuplicateKey(key.id().to_string()));
        }

        flush_to_backup(io, keys)?;
        flush_to_storage(io, keys, Some((&key, KeyOperation::Store)))?;
        system_keys.record_versioned(&key);
        tracing::debug!(id = key.id(), kind = key.kind(), "Key stored");
        keys.insert(signature, key);
        Ok(())
    }

    /// Look up a key by the id and owner of `template`.
    ///
    /// A bare system key base resolves to its newest version. The returned
    /// key keeps the bare id and its payload is prefixed with `"<version>:"`
    /// under the obfuscation.
    pub fn fetch_key(&self, template: &Key) -> Option<Key> {
        let signature = resolve_signature(&*self.system_keys, template);
        let stored = self.keys.get(&signature)?;
        match SystemKeyId::parse(template.id(), template.owner()) {
            Some(SystemKeyId::Base(base)) if signature != template.signature() => {
                let (_, version) = signature.rsplit_once(':')?;
                Some(version_stamped(base, version, stored))
            }
            _ => Some(stored.clone()),
        }
    }

    /// Remove the key matching the id and owner of `template`.
    ///
    /// System keys can only be rotated, never removed.
    pub fn remove_key(&mut self, template: &Key) -> KeyringResult<()> {
        let Self {
            io,
            system_keys,
            keys,
        } = self;
        let io = io.as_deref_mut().ok_or(KeyringError::NotInitialized)?;

        let signature = resolve_signature(&**system_keys, template);
        let Some(existing) = keys.get(&signature) else {
            return Err(KeyringError::NotFound(template.id().to_string()));
        };
        if system_keys.is_system_key(existing) {
            return Err(KeyringError::SystemKeyImmutable(existing.id().to_string()));
        }

        flush_to_backup(io, keys)?;

        let Some(removed) = keys.remove(&signature) else {
            return Err(KeyringError::NotFound(template.id().to_string()));
        };
        if let Err(e) = flush_to_storage(io, keys, Some((&removed, KeyOperation::Remove))) {
            keys.insert(signature, removed);
            return Err(e);
        }
        tracing::debug!(id = removed.id(), "Key removed");
        Ok(())
    }

    /// Number of keys, every version of a system key counted separately.
    pub fn count(&self) -> usize {
        self.keys.len()
    }

    /// Generate `len` random bytes and store them as a new key.
    ///
    /// The material is stored obfuscated.
    pub fn generate_key(
        &mut self,
        id: &str,
        kind: &str,
        owner: &str,
        len: usize,
    ) -> KeyringResult<()> {
        if len == 0 {
            return Err(KeyringError::InvalidKey(format!(
                "key {id} must have a non-zero length"
            )));
        }
        let mut material = vec![0u8; len];
        SystemRandom::new()
            .fill(&mut material)
            .map_err(|e| KeyringError::KeyGeneration(format!("rng: {e:?}")))?;

        let key = Key::new(id, kind, material).with_owner(owner).obfuscated();
        self.store_key(key)
    }

    /// Metadata of every stored key, ordered by signature.
    pub fn key_infos(&self) -> Vec<KeyInfo> {
        self.keys
            .values()
            .map(|key| KeyInfo {
                id: key.id().to_string(),
                kind: key.kind().to_string(),
                owner: key.owner().to_string(),
                payload_len: key.payload().len(),
                system: self.system_keys.is_system_key(key),
            })
            .collect()
    }
}

/// Signature of the key a template refers to. A bare system key base
/// refers to its newest version.
fn resolve_signature(system_keys: &dyn SystemKeyVersioning, template: &Key) -> String {
    if let Some(SystemKeyId::Base(base)) = SystemKeyId::parse(template.id(), template.owner()) {
        if let Some(latest) = system_keys.latest_for_base(base) {
            return latest;
        }
    }
    template.signature()
}

fn load_keys(io: &mut dyn KeyringIo, keyring_path: &Path) -> Result<KeyMap, StoreError> {
    io.init(keyring_path)?;
    let buffer = io.load()?;

    let mut keys = KeyMap::new();
    for key in io.serializer().deserialize(buffer) {
        let key = key?;
        let signature = key.signature();
        if keys.contains_key(&signature) {
            return Err(StoreError::Malformed(format!("duplicate key {}", key.id())));
        }
        keys.insert(signature, key);
    }
    Ok(keys)
}

fn flush_to_backup(io: &mut dyn KeyringIo, keys: &KeyMap) -> KeyringResult<()> {
    let result = io
        .serializer()
        .serialize(keys, None)
        .map_err(StoreError::from)
        .and_then(|buffer| io.flush_to_backup(&buffer));

    result.map_err(|e| {
        tracing::error!(error = %e, "{}", MSG_BACKUP_FLUSH_FAILED);
        match e {
            StoreError::ExternalTamper => KeyringError::ExternalTamper,
            e => KeyringError::BackupWriteFailed(e),
        }
    })
}

fn flush_to_storage(
    io: &mut dyn KeyringIo,
    keys: &KeyMap,
    change: Option<(&Key, KeyOperation)>,
) -> KeyringResult<()> {
    let result = io
        .serializer()
        .serialize(keys, change)
        .map_err(StoreError::from)
        .and_then(|buffer| io.flush_to_storage(&buffer));

    result.map_err(|e| {
        tracing::error!(error = %e, "{}", MSG_FLUSH_FAILED);
        KeyringError::PrimaryWriteFailed(e)
    })
}

/// Present the newest version of a system key under its bare base id.
fn version_stamped(base: &str, version: &str, stored: &Key) -> Key {
    let mut plain = format!("{version}:").into_bytes();
    plain.extend_from_slice(&obfuscate(stored.payload()));
    stored.clone().with_id(base).with_payload(obfuscate(&plain))
}
