// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Snapshot codec for the key set.
//!
//! ## Record Layout
//!
//! Each key is one `bincode` record (fixed-width little-endian integers):
//!
//! ```text
//! [id_len u64][id][kind_len u64][kind][owner_len u64][owner][payload_len u64][payload]
//! ```
//!
//! A buffer is the concatenation of records with nothing in between.
//! Decoding is bounded by the bytes left in the buffer, so a corrupt length
//! never allocates more than the buffer holds.

use std::collections::BTreeMap;

use bincode::Options;
use serde::{Deserialize, Serialize};

use super::{Key, KeyOperation};

/// Signature → key map kept by the container.
pub type KeyMap = BTreeMap<String, Key>;

const LEN_PREFIX: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("record at offset {offset} cannot be decoded: {reason}")]
    Decode { offset: usize, reason: String },

    #[error("record at offset {offset} holds an invalid key")]
    InvalidKey { offset: usize },

    #[error("key cannot be serialized: {0}")]
    Unrepresentable(String),
}

/// Lazily decoded keys.
pub type KeyStream = Box<dyn Iterator<Item = Result<Key, CodecError>> + Send>;

/// Turns the key set into bytes and back.
pub trait Serializer: Send + Sync {
    /// Snapshot `keys` as they will be after applying `change`.
    ///
    /// `Store` includes the key even when it is not in `keys` yet, `Remove`
    /// omits it even when it still is. `None` snapshots `keys` unchanged.
    fn serialize(
        &self,
        keys: &KeyMap,
        change: Option<(&Key, KeyOperation)>,
    ) -> Result<Vec<u8>, CodecError>;

    /// Decode a buffer produced by [`serialize`](Serializer::serialize).
    fn deserialize(&self, buffer: Vec<u8>) -> KeyStream;
}

/// On-disk form of a key.
#[derive(Serialize)]
struct KeyRecordRef<'a> {
    id: &'a str,
    kind: &'a str,
    owner: &'a str,
    payload: &'a [u8],
}

#[derive(Deserialize)]
struct KeyRecord {
    id: String,
    kind: String,
    owner: String,
    payload: Vec<u8>,
}

impl<'a> From<&'a Key> for KeyRecordRef<'a> {
    fn from(key: &'a Key) -> Self {
        Self {
            id: key.id(),
            kind: key.kind(),
            owner: key.owner(),
            payload: key.payload(),
        }
    }
}

impl From<KeyRecord> for Key {
    fn from(record: KeyRecord) -> Self {
        Key::new(record.id, record.kind, record.payload).with_owner(record.owner)
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

/// Full-snapshot serializer writing every key on each flush.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotSerializer;

impl SnapshotSerializer {
    pub fn new() -> Self {
        Self
    }
}

/// Size of the record for `key`.
pub fn record_len(key: &Key) -> usize {
    4 * LEN_PREFIX + key.id().len() + key.kind().len() + key.owner().len() + key.payload().len()
}

fn encode_key(key: &Key, out: &mut Vec<u8>) -> Result<(), CodecError> {
    if key.id().is_empty() {
        return Err(CodecError::Unrepresentable(format!(
            "empty id for key of type {:?}",
            key.kind()
        )));
    }
    codec()
        .serialize_into(&mut *out, &KeyRecordRef::from(key))
        .map_err(|e| CodecError::Unrepresentable(e.to_string()))
}

impl Serializer for SnapshotSerializer {
    fn serialize(
        &self,
        keys: &KeyMap,
        change: Option<(&Key, KeyOperation)>,
    ) -> Result<Vec<u8>, CodecError> {
        let changed_signature = change.map(|(key, _)| key.signature());
        let removed = match change {
            Some((_, KeyOperation::Remove)) => changed_signature.as_deref(),
            _ => None,
        };

        let mut buffer = Vec::with_capacity(keys.values().map(record_len).sum());
        for (signature, key) in keys {
            if Some(signature.as_str()) == removed {
                continue;
            }
            encode_key(key, &mut buffer)?;
        }
        if let Some((key, KeyOperation::Store)) = change {
            if !keys.contains_key(&key.signature()) {
                encode_key(key, &mut buffer)?;
            }
        }
        Ok(buffer)
    }

    fn deserialize(&self, buffer: Vec<u8>) -> KeyStream {
        Box::new(RecordReader::new(buffer))
    }
}

/// Iterator over the records of a buffer. Stops after the first error.
pub struct RecordReader {
    buffer: Vec<u8>,
    position: usize,
    failed: bool,
}

impl RecordReader {
    pub fn new(buffer: Vec<u8>) -> Self {
        Self {
            buffer,
            position: 0,
            failed: false,
        }
    }

    fn decode_next(&mut self) -> Result<Key, CodecError> {
        let offset = self.position;
        let mut rest = &self.buffer[offset..];
        let remaining = rest.len();

        let record: KeyRecord = codec()
            .with_limit(remaining as u64)
            .deserialize_from(&mut rest)
            .map_err(|e| CodecError::Decode {
                offset,
                reason: e.to_string(),
            })?;
        let consumed = remaining - rest.len();

        let key = Key::from(record);
        if !key.is_valid() {
            return Err(CodecError::InvalidKey { offset });
        }
        self.position = offset + consumed;
        Ok(key)
    }
}

impl Iterator for RecordReader {
    type Item = Result<Key, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.buffer.len() {
            return None;
        }
        match self.decode_next() {
            Ok(key) => Some(Ok(key)),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
