// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable storage contract and the keyring file envelope.
//!
//! ## Envelope
//!
//! ```text
//! "Keyring file version:1.0" <serialized key stream> "EOF"
//! ```
//!
//! A zero-length file is an empty keyring. Anything else without both the
//! header and the trailing `EOF` tag is malformed and is never upgraded.

use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::{CodecError, Serializer};

/// Keyring file format version written and accepted by this build.
pub const FILE_VERSION: &str = "1.0";

/// Header prefix preceding the version.
pub const FILE_HEADER_PREFIX: &str = "Keyring file version:";

/// Trailer closing every non-empty keyring file.
pub const EOF_TAG: &[u8] = b"EOF";

pub const MSG_INCORRECT_VERSION: &str = "Incorrect Keyring file version";
pub const MSG_CHANGED_OUTSIDE: &str = "Keyring file has been changed outside the server.";
pub const MSG_MALFORMED_BACKUP: &str = "Found malformed keyring backup file - removing it";
pub const MSG_BACKUP_NOT_REMOVED: &str = "Could not remove keyring backup file";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed keyring content: {0}")]
    Malformed(String),

    #[error("incorrect keyring file version")]
    IncorrectVersion,

    #[error("keyring file does not exist")]
    MissingKeyringFile,

    #[error("keyring file has been changed outside the server")]
    ExternalTamper,

    #[error("could not serialize keys: {0}")]
    Codec(#[from] CodecError),

    #[error("injected failure: {0}")]
    InjectedFailure(&'static str),

    #[error("keyring storage is not initialized")]
    NotInitialized,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// SHA-256 of a keyring file as last read or written by the server.
pub type Fingerprint = [u8; 32];

pub fn fingerprint(content: &[u8]) -> Fingerprint {
    Sha256::digest(content).into()
}

/// The expected header, version included.
pub fn file_header() -> String {
    format!("{FILE_HEADER_PREFIX}{FILE_VERSION}")
}

/// Wrap a key stream in the file envelope.
pub fn wrap_envelope(stream: &[u8]) -> Vec<u8> {
    let header = file_header();
    let mut content = Vec::with_capacity(header.len() + stream.len() + EOF_TAG.len());
    content.extend_from_slice(header.as_bytes());
    content.extend_from_slice(stream);
    content.extend_from_slice(EOF_TAG);
    content
}

/// Strip the envelope, returning the key stream.
pub fn unwrap_envelope(content: &[u8]) -> StoreResult<&[u8]> {
    if content.is_empty() {
        return Ok(content);
    }
    let header = file_header();
    if content.len() < header.len() + EOF_TAG.len() || !content.ends_with(EOF_TAG) {
        return Err(StoreError::Malformed("missing EOF tag".to_string()));
    }
    if !content.starts_with(header.as_bytes()) {
        if content.starts_with(FILE_HEADER_PREFIX.as_bytes()) {
            tracing::error!("{}", MSG_INCORRECT_VERSION);
            return Err(StoreError::IncorrectVersion);
        }
        return Err(StoreError::Malformed("missing keyring file header".to_string()));
    }
    Ok(&content[header.len()..content.len() - EOF_TAG.len()])
}

/// Durable backing of a keys container.
///
/// Writes follow the backup-first protocol: the container flushes the
/// pre-image with [`flush_to_backup`](KeyringIo::flush_to_backup) and only
/// then the post-image with [`flush_to_storage`](KeyringIo::flush_to_storage).
pub trait KeyringIo: Send + Sync {
    /// Open the keyring at `keyring_path`, recovering from a backup if one
    /// survived, and remember its fingerprint.
    fn init(&mut self, keyring_path: &Path) -> StoreResult<()>;

    /// Hand over the key stream read by [`init`](KeyringIo::init).
    fn load(&mut self) -> StoreResult<Vec<u8>>;

    /// Write the pre-image snapshot to the backup.
    fn flush_to_backup(&mut self, stream: &[u8]) -> StoreResult<()>;

    /// Replace the keyring with the post-image snapshot.
    fn flush_to_storage(&mut self, stream: &[u8]) -> StoreResult<()>;

    fn serializer(&self) -> &dyn Serializer;
}
