// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path utilities for the keyring file and its companions.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Default location of the keyring file.
pub const DEFAULT_KEYRING_FILE: &str = "/data/keyring";

/// Suffix of the backup written before every keyring update.
pub const BACKUP_SUFFIX: &str = ".backup";

/// Suffix of the scratch file renamed over its target.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Paths derived from the keyring file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringPaths {
    keyring: PathBuf,
}

impl Default for KeyringPaths {
    fn default() -> Self {
        Self::new(DEFAULT_KEYRING_FILE)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl KeyringPaths {
    /// Create paths for a keyring file (useful for testing).
    pub fn new(keyring: impl AsRef<Path>) -> Self {
        Self {
            keyring: keyring.as_ref().to_path_buf(),
        }
    }

    /// The keyring file.
    pub fn keyring(&self) -> &Path {
        &self.keyring
    }

    /// The backup file, `<keyring>.backup`.
    pub fn backup(&self) -> PathBuf {
        with_suffix(&self.keyring, BACKUP_SUFFIX)
    }

    /// Scratch file used to replace `target` atomically.
    pub fn temp_for(target: &Path) -> PathBuf {
        with_suffix(target, TEMP_SUFFIX)
    }
}
