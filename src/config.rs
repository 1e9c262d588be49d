// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names and default values used
//! by the keyring. Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `KEYRING_FILE` | Path of the keyring file | `/data/keyring` |
//! | `KEYRING_KEEP_BACKUP` | Keep `<keyring>.backup` after each write (`true`/`false`) | `false` |
//! | `KEYRING_SERVER_UUID` | Server UUID used in system key names | Required for `rotate` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::env;
use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{KeyringError, KeyringResult};
use crate::keyring::paths::DEFAULT_KEYRING_FILE;

/// Environment variable name for the keyring file path.
///
/// The backup lives next to it as `<path>.backup`.
///
/// # Default
/// `/data/keyring`
pub const KEYRING_FILE_ENV: &str = "KEYRING_FILE";

/// Environment variable name for backup retention.
pub const KEYRING_KEEP_BACKUP_ENV: &str = "KEYRING_KEEP_BACKUP";

/// Environment variable name for the server UUID.
pub const KEYRING_SERVER_UUID_ENV: &str = "KEYRING_SERVER_UUID";

/// Environment variable name for the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Keyring settings resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyringConfig {
    pub keyring_file: PathBuf,
    pub keep_backup: bool,
    pub server_uuid: Option<Uuid>,
    pub log_format: LogFormat,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            keyring_file: PathBuf::from(DEFAULT_KEYRING_FILE),
            keep_backup: false,
            server_uuid: None,
            log_format: LogFormat::default(),
        }
    }
}

impl KeyringConfig {
    pub fn from_env() -> KeyringResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve settings through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> KeyringResult<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup(KEYRING_FILE_ENV).filter(|v| !v.is_empty()) {
            config.keyring_file = PathBuf::from(path);
        }
        if let Some(value) = lookup(KEYRING_KEEP_BACKUP_ENV) {
            config.keep_backup = parse_bool(KEYRING_KEEP_BACKUP_ENV, &value)?;
        }
        if let Some(value) = lookup(KEYRING_SERVER_UUID_ENV) {
            let uuid = Uuid::parse_str(value.trim()).map_err(|e| {
                KeyringError::Config(format!("{KEYRING_SERVER_UUID_ENV}: {e}"))
            })?;
            config.server_uuid = Some(uuid);
        }
        config.log_format = match lookup(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        Ok(config)
    }

    /// Server UUID, required by system key rotation.
    pub fn require_server_uuid(&self) -> KeyringResult<Uuid> {
        self.server_uuid
            .ok_or_else(|| KeyringError::Config(format!("{KEYRING_SERVER_UUID_ENV} is not set")))
    }
}

fn parse_bool(name: &str, value: &str) -> KeyringResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(KeyringError::Config(format!(
            "{name}: expected a boolean, got {other:?}"
        ))),
    }
}
