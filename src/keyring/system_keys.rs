// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Versioning of rotate-only system keys.
//!
//! A system key has no owner and an id that is either a bare base name
//! (`percona_binlog`) or a versioned id (`percona_binlog:3`). Storing a bare
//! base mints the next version; fetching a bare base resolves the newest one.
//!
//! Base grammar:
//!
//! | Form | Example |
//! |------|---------|
//! | binlog master key | `percona_binlog` |
//! | tablespace key | `percona_innodb12_0_7:0` |
//! | generic system key | `percona_redo`, `percona_sk` |
//!
//! The `:<N>` of a tablespace key is the tablespace key id, so
//! `percona_innodb12_0_7:0:1` is version 1 of base `percona_innodb12_0_7:0`.

use std::collections::HashMap;

use super::Key;
use crate::error::{KeyringError, KeyringResult};

/// Prefix shared by every system key base.
pub const SYSTEM_KEY_PREFIX: &str = "percona_";

/// Binary log master key base.
pub const BINLOG_KEY_BASE: &str = "percona_binlog";

const INNODB_KEY_PREFIX: &str = "percona_innodb";

/// A parsed system key id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemKeyId<'a> {
    /// Bare base name without a version.
    Base(&'a str),
    /// `base:version`.
    Versioned { base: &'a str, version: u32 },
}

impl<'a> SystemKeyId<'a> {
    /// Parse an `(id, owner)` pair; `None` when it is not a system key or
    /// its version does not fit a `u32`.
    pub fn parse(id: &'a str, owner: &str) -> Option<Self> {
        if !owner.is_empty() {
            return None;
        }
        if is_system_key_base(id) {
            return Some(Self::Base(id));
        }
        let (base, version) = split_versioned(id)?;
        let version = version.parse().ok()?;
        Some(Self::Versioned { base, version })
    }

    pub fn base(&self) -> &'a str {
        match self {
            Self::Base(base) | Self::Versioned { base, .. } => base,
        }
    }
}

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_tablespace_key_base(id: &str) -> bool {
    let Some(rest) = id.strip_prefix(INNODB_KEY_PREFIX) else {
        return false;
    };
    let Some((tablespace, key_id)) = rest.split_once(':') else {
        return false;
    };
    let parts: Vec<&str> = tablespace.split('_').collect();
    parts.len() == 3 && parts.iter().all(|part| is_decimal(part)) && is_decimal(key_id)
}

/// Whether `id` is a bare system key base.
pub fn is_system_key_base(id: &str) -> bool {
    if id == BINLOG_KEY_BASE || is_tablespace_key_base(id) {
        return true;
    }
    match id.strip_prefix(SYSTEM_KEY_PREFIX) {
        Some(name) => !name.is_empty() && !name.contains(':'),
        None => false,
    }
}

/// Split `base:N` by grammar, whatever the size of `N`.
fn split_versioned(id: &str) -> Option<(&str, &str)> {
    let (base, version) = id.rsplit_once(':')?;
    (is_decimal(version) && is_system_key_base(base)).then_some((base, version))
}

/// Whether an `(id, owner)` pair belongs to the system key family.
pub fn is_system_key_id(id: &str, owner: &str) -> bool {
    owner.is_empty() && (is_system_key_base(id) || split_versioned(id).is_some())
}

/// Build the versioned id for `base`.
pub fn versioned_id(base: &str, version: u32) -> String {
    format!("{base}:{version}")
}

/// Version bookkeeping consulted by the keys container.
pub trait SystemKeyVersioning: Send + Sync {
    /// Whether the key belongs to the system key family.
    fn is_system_key(&self, key: &Key) -> bool;

    /// Rewrite a bare base id to the next version. Other keys pass through,
    /// except a versioned id whose version is out of range.
    ///
    /// The ledger is not touched; call [`record_versioned`] once the key
    /// has been persisted.
    ///
    /// [`record_versioned`]: SystemKeyVersioning::record_versioned
    fn rotate_id_if_unversioned(&self, key: Key) -> KeyringResult<Key>;

    /// Raise the ledger entry of a versioned system key to its version.
    fn record_versioned(&mut self, key: &Key);

    /// Newest versioned id recorded for `base`.
    fn latest_for_base(&self, base: &str) -> Option<String>;

    /// Forget every recorded version.
    fn clear(&mut self);
}

/// Highest version seen per system key base.
#[derive(Debug, Default, Clone)]
pub struct VersionLedger {
    latest: HashMap<String, u32>,
}

impl VersionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest version recorded for `base`.
    pub fn version_of(&self, base: &str) -> Option<u32> {
        self.latest.get(base).copied()
    }
}

impl SystemKeyVersioning for VersionLedger {
    fn is_system_key(&self, key: &Key) -> bool {
        is_system_key_id(key.id(), key.owner())
    }

    fn rotate_id_if_unversioned(&self, key: Key) -> KeyringResult<Key> {
        if !self.is_system_key(&key) {
            return Ok(key);
        }
        let base = match SystemKeyId::parse(key.id(), key.owner()) {
            Some(SystemKeyId::Base(base)) => base,
            Some(SystemKeyId::Versioned { .. }) => return Ok(key),
            None => return Err(KeyringError::VersionOverflow(key.id().to_string())),
        };
        let next = self
            .version_of(base)
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| KeyringError::VersionOverflow(base.to_string()))?;
        let id = versioned_id(base, next);
        Ok(key.with_id(id))
    }

    fn record_versioned(&mut self, key: &Key) {
        if let Some(SystemKeyId::Versioned { base, version }) =
            SystemKeyId::parse(key.id(), key.owner())
        {
            let entry = self.latest.entry(base.to_string()).or_insert(version);
            *entry = (*entry).max(version);
        }
    }

    fn latest_for_base(&self, base: &str) -> Option<String> {
        self.version_of(base).map(|version| versioned_id(base, version))
    }

    fn clear(&mut self) {
        self.latest.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_key(id: &str) -> Key {
        Key::new(id, "AES", b"data".to_vec())
    }

    #[test]
    fn parses_bases_and_versions() {
        assert_eq!(
            SystemKeyId::parse("percona_binlog", ""),
            Some(SystemKeyId::Base("percona_binlog"))
        );
        assert_eq!(
            SystemKeyId::parse("percona_binlog:12", ""),
            Some(SystemKeyId::Versioned {
                base: "percona_binlog",
                version: 12
            })
        );
        assert_eq!(
            SystemKeyId::parse("percona_sk:0", ""),
            Some(SystemKeyId::Versioned {
                base: "percona_sk",
                version: 0
            })
        );
    }

    #[test]
    fn tablespace_key_id_is_part_of_the_base() {
        assert_eq!(
            SystemKeyId::parse("percona_innodb1_2_3:0", ""),
            Some(SystemKeyId::Base("percona_innodb1_2_3:0"))
        );
        assert_eq!(
            SystemKeyId::parse("percona_innodb1_2_3:0:1", ""),
            Some(SystemKeyId::Versioned {
                base: "percona_innodb1_2_3:0",
                version: 1
            })
        );
    }

    #[test]
    fn owned_and_foreign_keys_are_not_system_keys() {
        assert_eq!(SystemKeyId::parse("percona_binlog", "Robert"), None);
        assert_eq!(SystemKeyId::parse("Roberts_key", ""), None);
        assert_eq!(SystemKeyId::parse("percona_", ""), None);
        assert_eq!(SystemKeyId::parse("percona_binlog:", ""), None);
        assert_eq!(SystemKeyId::parse("percona_binlog:x1", ""), None);
        assert_eq!(SystemKeyId::parse("percona_binlog:99999999999", ""), None);
    }

    #[test]
    fn first_bare_store_gets_version_one() {
        let ledger = VersionLedger::new();
        let rotated = ledger
            .rotate_id_if_unversioned(system_key("percona_binlog"))
            .unwrap();
        assert_eq!(rotated.id(), "percona_binlog:1");
        assert_eq!(ledger.version_of("percona_binlog"), None);
    }

    #[test]
    fn rotation_follows_the_ledger() {
        let mut ledger = VersionLedger::new();
        ledger.record_versioned(&system_key("percona_binlog:0"));
        let first = ledger
            .rotate_id_if_unversioned(system_key("percona_binlog"))
            .unwrap();
        assert_eq!(first.id(), "percona_binlog:1");
        ledger.record_versioned(&first);
        let second = ledger
            .rotate_id_if_unversioned(system_key("percona_binlog"))
            .unwrap();
        assert_eq!(second.id(), "percona_binlog:2");
    }

    #[test]
    fn versioned_and_regular_keys_are_not_rewritten() {
        let ledger = VersionLedger::new();
        let versioned = ledger
            .rotate_id_if_unversioned(system_key("percona_binlog:7"))
            .unwrap();
        assert_eq!(versioned.id(), "percona_binlog:7");

        let regular = ledger
            .rotate_id_if_unversioned(Key::new("percona_binlog", "AES", Vec::new()).with_owner("u"))
            .unwrap();
        assert_eq!(regular.id(), "percona_binlog");
    }

    #[test]
    fn ledger_keeps_the_highest_version() {
        let mut ledger = VersionLedger::new();
        ledger.record_versioned(&system_key("percona_binlog:2"));
        ledger.record_versioned(&system_key("percona_binlog:0"));
        ledger.record_versioned(&system_key("percona_binlog"));
        assert_eq!(
            ledger.latest_for_base("percona_binlog").as_deref(),
            Some("percona_binlog:2")
        );
        assert_eq!(ledger.latest_for_base("percona_sk"), None);
    }

    #[test]
    fn rotation_overflow_is_an_error() {
        let mut ledger = VersionLedger::new();
        ledger.record_versioned(&system_key(&versioned_id("percona_binlog", u32::MAX)));
        let result = ledger.rotate_id_if_unversioned(system_key("percona_binlog"));
        assert!(matches!(result, Err(KeyringError::VersionOverflow(_))));
    }

    #[test]
    fn out_of_range_version_is_still_a_system_key() {
        let ledger = VersionLedger::new();
        let key = system_key("percona_binlog:99999999999");
        assert!(ledger.is_system_key(&key));
        assert!(is_system_key_id("percona_innodb1_2_3:0:99999999999", ""));
        assert!(!is_system_key_id("percona_binlog:99999999999", "Robert"));

        let result = ledger.rotate_id_if_unversioned(key);
        assert!(matches!(result, Err(KeyringError::VersionOverflow(id)) if id == "percona_binlog:99999999999"));
    }

    #[test]
    fn clear_forgets_versions() {
        let mut ledger = VersionLedger::new();
        ledger.record_versioned(&system_key("percona_binlog:4"));
        ledger.clear();
        assert_eq!(ledger.latest_for_base("percona_binlog"), None);
    }
}
