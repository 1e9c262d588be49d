// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Keyring Module
//!
//! Crash-safe store for encryption keys kept outside the main data files:
//! tablespace keys, binary log master keys and generic secrets.
//!
//! ## Durability Model
//!
//! - Every mutation writes the previous key set to `<keyring>.backup` first
//! - The new key set then replaces the keyring file atomically
//! - A backup found at start-up is an unfinished write and is restored
//! - The keyring file is fingerprinted; changes made behind the server's
//!   back are refused
//!
//! ## File Layout
//!
//! ```text
//! /data/
//!   keyring          # "Keyring file version:1.0" <records> "EOF"
//!   keyring.backup   # Present only while a write is in flight
//! ```
//!
//! ## System Keys
//!
//! Keys without an owner whose id starts with `percona_` are rotate-only.
//! See [`system_keys`] for the id grammar.

pub mod container;
pub mod file_io;
pub mod io;
pub mod key;
pub mod memory_io;
pub mod paths;
pub mod serializer;
pub mod system_keys;

pub use container::{KeyInfo, KeysContainer};
pub use file_io::BufferedFileIo;
pub use io::{KeyringIo, StoreError, StoreResult};
pub use key::{obfuscate, Key, KeyOperation};
pub use memory_io::{MemoryFiles, MemoryHandle, MemoryIo};
pub use paths::KeyringPaths;
pub use serializer::{CodecError, KeyMap, KeyStream, Serializer, SnapshotSerializer};
pub use system_keys::{SystemKeyVersioning, VersionLedger};
