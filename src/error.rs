// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Errors reported by keyring operations.
//!
//! Every mutating failure leaves the in-memory keyring as it was before the
//! call. Only [`KeyringError::MalformedStore`] during initialization leaves
//! the container unusable until it is initialized again.

use crate::keyring::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum KeyringError {
    #[error("key already exists: {0}")]
    DuplicateKey(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("system key cannot be removed: {0}")]
    SystemKeyImmutable(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("keyring is malformed: {0}")]
    MalformedStore(String),

    #[error("could not write keyring backup: {0}")]
    BackupWriteFailed(#[source] StoreError),

    #[error("could not write keyring: {0}")]
    PrimaryWriteFailed(#[source] StoreError),

    #[error("keyring file has been changed outside the server")]
    ExternalTamper,

    #[error("keyring is not initialized")]
    NotInitialized,

    #[error("no further version available for system key {0}")]
    VersionOverflow(String),

    #[error("system key {0} does not exist and cannot be rotated")]
    RotationKeyDoesNotExist(String),

    #[error("cannot generate new version of system key {key}: {source}")]
    RotationCannotGenerate {
        key: String,
        #[source]
        source: Box<KeyringError>,
    },

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl KeyringError {
    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            KeyringError::DuplicateKey(_) => "duplicate_key",
            KeyringError::NotFound(_) => "not_found",
            KeyringError::SystemKeyImmutable(_) => "system_key_immutable",
            KeyringError::InvalidKey(_) => "invalid_key",
            KeyringError::MalformedStore(_) => "malformed_store",
            KeyringError::BackupWriteFailed(_) => "backup_write_failed",
            KeyringError::PrimaryWriteFailed(_) => "primary_write_failed",
            KeyringError::ExternalTamper => "external_tamper",
            KeyringError::NotInitialized => "not_initialized",
            KeyringError::VersionOverflow(_) => "version_overflow",
            KeyringError::RotationKeyDoesNotExist(_) => "rotation_key_does_not_exist",
            KeyringError::RotationCannotGenerate { .. } => "rotation_cannot_generate",
            KeyringError::KeyGeneration(_) => "key_generation",
            KeyringError::Config(_) => "config",
        }
    }
}

pub type KeyringResult<T> = Result<T, KeyringError>;
