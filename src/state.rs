// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::KeyringConfig;
use crate::error::KeyringResult;
use crate::keyring::{BufferedFileIo, Key, KeyInfo, KeysContainer};
use crate::rotation::RotateSystemKey;

/// Shared keyring handle. Writers hold the lock for the whole operation.
#[derive(Clone)]
pub struct KeyringState {
    pub container: Arc<RwLock<KeysContainer>>,
}

impl KeyringState {
    pub fn new(container: KeysContainer) -> Self {
        Self {
            container: Arc::new(RwLock::new(container)),
        }
    }

    /// Open the file-backed keyring described by `config`.
    pub fn open(config: &KeyringConfig) -> KeyringResult<Self> {
        let io = BufferedFileIo::new().keep_backup(config.keep_backup);
        let mut container = KeysContainer::new();
        container.init(Box::new(io), &config.keyring_file)?;
        Ok(Self::new(container))
    }

    pub async fn store_key(&self, key: Key) -> KeyringResult<()> {
        self.container.write().await.store_key(key)
    }

    pub async fn fetch_key(&self, template: &Key) -> Option<Key> {
        self.container.read().await.fetch_key(template)
    }

    pub async fn remove_key(&self, template: &Key) -> KeyringResult<()> {
        self.container.write().await.remove_key(template)
    }

    pub async fn generate_key(
        &self,
        id: &str,
        kind: &str,
        owner: &str,
        len: usize,
    ) -> KeyringResult<()> {
        self.container
            .write()
            .await
            .generate_key(id, kind, owner, len)
    }

    pub async fn rotate(&self, request: &RotateSystemKey) -> KeyringResult<()> {
        request.rotate(&mut *self.container.write().await)
    }

    pub async fn count(&self) -> usize {
        self.container.read().await.count()
    }

    pub async fn key_infos(&self) -> Vec<KeyInfo> {
        self.container.read().await.key_infos()
    }
}

impl Default for KeyringState {
    fn default() -> Self {
        Self::new(KeysContainer::new())
    }
}
