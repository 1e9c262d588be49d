// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keyring Store - Crash-safe versioned secret store
//!
//! This crate persists encryption keys (tablespace keys, binary log master
//! keys, generic secrets) in a keyring file kept outside the main data files.
//!
//! ## Modules
//!
//! - `keyring` - Key registry, codec and durable file storage
//! - `rotation` - System key rotation and generation
//! - `state` - Shared async handle to the registry
//! - `config` - Environment configuration
//! - `logging` - Tracing subscriber setup

pub mod config;
pub mod error;
pub mod keyring;
pub mod logging;
pub mod rotation;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;
