// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory keyring storage.
//!
//! Follows the same envelope, recovery, backup and tamper rules as
//! [`BufferedFileIo`](super::BufferedFileIo) without touching the disk. The
//! two "files" live behind a shared [`MemoryFiles`] handle so a test can
//! inspect them, corrupt them or make the next write fail while a container
//! owns the store.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::io::{
    fingerprint, unwrap_envelope, wrap_envelope, Fingerprint, KeyringIo, StoreError, StoreResult,
    MSG_CHANGED_OUTSIDE, MSG_MALFORMED_BACKUP,
};
use super::{Serializer, SnapshotSerializer};

/// Contents of the in-memory keyring and backup "files".
///
/// `None` means the file does not exist.
#[derive(Debug, Default, Clone)]
pub struct MemoryFiles {
    pub keyring: Option<Vec<u8>>,
    pub backup: Option<Vec<u8>>,
    /// Make every backup write fail.
    pub fail_backup: bool,
    /// Make every keyring write fail.
    pub fail_storage: bool,
}

/// Shared handle to [`MemoryFiles`].
#[derive(Debug, Default, Clone)]
pub struct MemoryHandle(Arc<Mutex<MemoryFiles>>);

impl MemoryHandle {
    pub fn new(files: MemoryFiles) -> Self {
        Self(Arc::new(Mutex::new(files)))
    }

    pub fn lock(&self) -> MutexGuard<'_, MemoryFiles> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current contents.
    pub fn files(&self) -> MemoryFiles {
        self.lock().clone()
    }
}

/// Keyring storage held in memory.
pub struct MemoryIo {
    files: MemoryHandle,
    digest: Option<Fingerprint>,
    loaded: Option<Vec<u8>>,
    initialized: bool,
    keep_backup: bool,
    serializer: Box<dyn Serializer>,
}

impl Default for MemoryIo {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIo {
    pub fn new() -> Self {
        Self::with_files(MemoryHandle::default())
    }

    /// Create a store over existing (possibly shared) contents.
    pub fn with_files(files: MemoryHandle) -> Self {
        Self {
            files,
            digest: None,
            loaded: None,
            initialized: false,
            keep_backup: false,
            serializer: Box::new(SnapshotSerializer::new()),
        }
    }

    pub fn with_serializer(mut self, serializer: Box<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn keep_backup(mut self, keep: bool) -> Self {
        self.keep_backup = keep;
        self
    }

    /// Handle to the contents of this store.
    pub fn handle(&self) -> MemoryHandle {
        self.files.clone()
    }

    fn ensure_initialized(&self) -> StoreResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    fn verify_keyring(&self, files: &MemoryFiles) -> StoreResult<()> {
        let content = files.keyring.as_ref().ok_or(StoreError::MissingKeyringFile)?;
        if self.digest != Some(fingerprint(content)) {
            tracing::error!("{}", MSG_CHANGED_OUTSIDE);
            return Err(StoreError::ExternalTamper);
        }
        Ok(())
    }
}

impl KeyringIo for MemoryIo {
    fn init(&mut self, _keyring_path: &Path) -> StoreResult<()> {
        self.initialized = false;
        self.digest = None;
        self.loaded = None;

        let mut files = self.files.lock();
        let backup = match files.backup.take() {
            Some(backup) if backup.is_empty() => None,
            Some(backup) if unwrap_envelope(&backup).is_err() => {
                tracing::warn!("{}", MSG_MALFORMED_BACKUP);
                None
            }
            backup => backup,
        };

        let keyring = files.keyring.clone();
        let checked = keyring
            .as_deref()
            .map(|content| unwrap_envelope(content).map(|_| ()));
        let content = match (keyring, checked, backup) {
            (Some(content), Some(Ok(())), backup) => {
                if self.keep_backup {
                    files.backup = backup;
                }
                content
            }
            (_, _, Some(backup)) => {
                files.keyring = Some(backup.clone());
                backup
            }
            (_, Some(Err(e)), None) => return Err(e),
            (_, _, None) => {
                files.keyring = Some(Vec::new());
                Vec::new()
            }
        };
        drop(files);

        let stream = unwrap_envelope(&content)?.to_vec();
        self.digest = Some(fingerprint(&content));
        self.loaded = Some(stream);
        self.initialized = true;
        Ok(())
    }

    fn load(&mut self) -> StoreResult<Vec<u8>> {
        self.ensure_initialized()?;
        Ok(self.loaded.take().unwrap_or_default())
    }

    fn flush_to_backup(&mut self, stream: &[u8]) -> StoreResult<()> {
        self.ensure_initialized()?;
        let mut files = self.files.lock();
        if let Err(e) = self.verify_keyring(&files) {
            files.backup = None;
            return Err(e);
        }
        if files.fail_backup {
            files.backup = None;
            return Err(StoreError::InjectedFailure("backup write"));
        }
        files.backup = Some(wrap_envelope(stream));
        Ok(())
    }

    fn flush_to_storage(&mut self, stream: &[u8]) -> StoreResult<()> {
        self.ensure_initialized()?;
        let mut files = self.files.lock();
        self.verify_keyring(&files)?;
        if files.fail_storage {
            return Err(StoreError::InjectedFailure("keyring write"));
        }

        let content = wrap_envelope(stream);
        self.digest = Some(fingerprint(&content));
        files.keyring = Some(content);
        if !self.keep_backup {
            files.backup = None;
        }
        Ok(())
    }

    fn serializer(&self) -> &dyn Serializer {
        self.serializer.as_ref()
    }
}
