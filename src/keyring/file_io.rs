// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! File-backed keyring storage.
//!
//! ## Write Protocol
//!
//! 1. The keyring file is re-read and compared with the fingerprint taken
//!    when it was last loaded or written. A mismatch means somebody else
//!    changed it and the write is refused.
//! 2. The pre-image is written to `<keyring>.backup`.
//! 3. The post-image replaces the keyring file (temp file + rename).
//! 4. The backup is deleted unless configured to be kept.
//!
//! At start-up a well-formed keyring file is loaded as is and a leftover
//! backup is dropped (kept when backups are retained). Only when the
//! keyring file is missing or malformed does a well-formed backup replace
//! it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use super::io::{
    fingerprint, unwrap_envelope, wrap_envelope, Fingerprint, KeyringIo, StoreError, StoreResult,
    MSG_BACKUP_NOT_REMOVED, MSG_CHANGED_OUTSIDE, MSG_MALFORMED_BACKUP,
};
use super::{KeyringPaths, Serializer, SnapshotSerializer};

/// Keyring storage on the local filesystem.
pub struct BufferedFileIo {
    paths: Option<KeyringPaths>,
    digest: Option<Fingerprint>,
    loaded: Option<Vec<u8>>,
    keep_backup: bool,
    serializer: Box<dyn Serializer>,
}

impl Default for BufferedFileIo {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferedFileIo {
    /// Create an uninitialized store using the snapshot serializer.
    pub fn new() -> Self {
        Self::with_serializer(Box::new(SnapshotSerializer::new()))
    }

    pub fn with_serializer(serializer: Box<dyn Serializer>) -> Self {
        Self {
            paths: None,
            digest: None,
            loaded: None,
            keep_backup: false,
            serializer,
        }
    }

    /// Keep the backup file after successful writes.
    pub fn keep_backup(mut self, keep: bool) -> Self {
        self.keep_backup = keep;
        self
    }

    /// Paths of the open keyring.
    pub fn paths(&self) -> Option<&KeyringPaths> {
        self.paths.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.paths.is_some()
    }

    fn initialized_paths(&self) -> StoreResult<KeyringPaths> {
        self.paths.clone().ok_or(StoreError::NotInitialized)
    }

    /// Content of a well-formed backup. Empty and malformed backups are
    /// deleted.
    fn valid_backup(paths: &KeyringPaths) -> StoreResult<Option<Vec<u8>>> {
        let backup_path = paths.backup();
        let Some(backup) = read_optional(&backup_path)? else {
            return Ok(None);
        };

        if backup.is_empty() {
            fs::remove_file(&backup_path)?;
            return Ok(None);
        }
        if unwrap_envelope(&backup).is_err() {
            tracing::warn!(path = %backup_path.display(), "{}", MSG_MALFORMED_BACKUP);
            fs::remove_file(&backup_path)?;
            return Ok(None);
        }
        Ok(Some(backup))
    }

    /// Read the keyring file, falling back to the backup when the file is
    /// missing or malformed. A missing file with no backup becomes an empty
    /// keyring.
    fn open_keyring(&self, paths: &KeyringPaths) -> StoreResult<Vec<u8>> {
        let keyring_error = match read_optional(paths.keyring())? {
            Some(content) => match unwrap_envelope(&content) {
                Ok(_) => {
                    if Self::valid_backup(paths)?.is_some() && !self.keep_backup {
                        Self::remove_backup(paths)?;
                    }
                    return Ok(content);
                }
                Err(e) => Some(e),
            },
            None => None,
        };

        if let Some(backup) = Self::valid_backup(paths)? {
            tracing::info!(
                path = %paths.keyring().display(),
                "Restoring keyring from backup left by an unfinished write"
            );
            write_atomic(paths.keyring(), &backup)?;
            fs::remove_file(paths.backup())?;
            return Ok(backup);
        }

        match keyring_error {
            Some(e) => Err(e),
            None => {
                create_empty(paths.keyring())?;
                Ok(Vec::new())
            }
        }
    }

    /// Check that the keyring file is still what the server last saw.
    fn verify_keyring_file(&self, paths: &KeyringPaths) -> StoreResult<()> {
        let content = match fs::read(paths.keyring()) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::MissingKeyringFile)
            }
            Err(e) => return Err(e.into()),
        };
        if self.digest != Some(fingerprint(&content)) {
            tracing::error!(path = %paths.keyring().display(), "{}", MSG_CHANGED_OUTSIDE);
            return Err(StoreError::ExternalTamper);
        }
        Ok(())
    }

    fn remove_backup(paths: &KeyringPaths) -> StoreResult<()> {
        match fs::remove_file(paths.backup()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn create_empty(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    Ok(())
}

/// Write a file via temp file + rename so readers never see a partial write.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp_path = KeyringPaths::temp_for(path);
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)
}

impl KeyringIo for BufferedFileIo {
    fn init(&mut self, keyring_path: &Path) -> StoreResult<()> {
        self.paths = None;
        self.digest = None;
        self.loaded = None;

        let paths = KeyringPaths::new(keyring_path);
        let content = self.open_keyring(&paths)?;
        let stream = unwrap_envelope(&content)?.to_vec();

        tracing::debug!(
            path = %paths.keyring().display(),
            bytes = content.len(),
            "Keyring file opened"
        );
        self.digest = Some(fingerprint(&content));
        self.loaded = Some(stream);
        self.paths = Some(paths);
        Ok(())
    }

    fn load(&mut self) -> StoreResult<Vec<u8>> {
        if !self.is_initialized() {
            return Err(StoreError::NotInitialized);
        }
        Ok(self.loaded.take().unwrap_or_default())
    }

    fn flush_to_backup(&mut self, stream: &[u8]) -> StoreResult<()> {
        let paths = self.initialized_paths()?;
        let result = self
            .verify_keyring_file(&paths)
            .and_then(|()| Ok(write_atomic(&paths.backup(), &wrap_envelope(stream))?));
        if result.is_err() {
            if let Err(e) = Self::remove_backup(&paths) {
                tracing::warn!(
                    path = %paths.backup().display(),
                    error = %e,
                    "{}",
                    MSG_BACKUP_NOT_REMOVED
                );
            }
        }
        result
    }

    fn flush_to_storage(&mut self, stream: &[u8]) -> StoreResult<()> {
        let paths = self.initialized_paths()?;
        self.verify_keyring_file(&paths)?;

        let content = wrap_envelope(stream);
        write_atomic(paths.keyring(), &content)?;
        self.digest = Some(fingerprint(&content));

        // The keyring is committed; a leftover backup is dropped on next start.
        if !self.keep_backup {
            if let Err(e) = Self::remove_backup(&paths) {
                tracing::warn!(
                    path = %paths.backup().display(),
                    error = %e,
                    "{}",
                    MSG_BACKUP_NOT_REMOVED
                );
            }
        }
        Ok(())
    }

    fn serializer(&self) -> &dyn Serializer {
        self.serializer.as_ref()
    }
}
