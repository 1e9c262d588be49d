// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `keyring-admin`: inspect and rotate a keyring file.

use std::process::ExitCode;

use base64ct::{Base64, Encoding};
use clap::{Parser, Subcommand};
use serde::Serialize;

use keyring_store::config::KeyringConfig;
use keyring_store::error::KeyringError;
use keyring_store::keyring::Key;
use keyring_store::logging::init_tracing;
use keyring_store::rotation::{RotateSystemKey, SystemKeyKind};
use keyring_store::state::KeyringState;

#[derive(Parser, Debug)]
#[command(name = "keyring-admin", version, about = "Inspect and rotate a keyring file")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// List key metadata as JSON
    List,
    /// Print the number of keys
    Count,
    /// Print a key with its base64 payload
    Fetch {
        id: String,
        #[arg(default_value = "")]
        owner: String,
    },
    /// Store a new version of a system key
    Rotate {
        #[arg(value_parser = parse_family)]
        kind: SystemKeyKind,
        key_id: Option<u32>,
    },
    /// Store a new random key
    Generate {
        id: String,
        kind: String,
        len: usize,
        #[arg(default_value = "")]
        owner: String,
    },
    /// Remove a key
    Remove {
        id: String,
        #[arg(default_value = "")]
        owner: String,
    },
    /// Print the resolved configuration
    Config,
}

fn parse_family(s: &str) -> Result<SystemKeyKind, String> {
    SystemKeyKind::parse(s).ok_or_else(|| format!("unknown system key family {s:?}"))
}

#[derive(Debug, thiserror::Error)]
enum AdminError {
    #[error(transparent)]
    Keyring(#[from] KeyringError),

    #[error("could not encode output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct FetchedKey<'a> {
    id: &'a str,
    kind: &'a str,
    owner: &'a str,
    payload: String,
}

async fn run(config: &KeyringConfig, command: Command) -> Result<String, AdminError> {
    let open = || KeyringState::open(config);

    let output = match command {
        Command::Config => serde_json::to_string_pretty(config)?,
        Command::List => serde_json::to_string_pretty(&open()?.key_infos().await)?,
        Command::Count => open()?.count().await.to_string(),
        Command::Fetch { id, owner } => {
            let template = Key::template(&id).with_owner(owner);
            let key = open()?
                .fetch_key(&template)
                .await
                .ok_or(KeyringError::NotFound(id))?;
            serde_json::to_string_pretty(&FetchedKey {
                id: key.id(),
                kind: key.kind(),
                owner: key.owner(),
                payload: Base64::encode_string(key.payload()),
            })?
        }
        Command::Rotate { kind, key_id } => {
            let mut request = RotateSystemKey::new(kind, config.require_server_uuid()?);
            if let Some(key_id) = key_id {
                request = request.with_key_id(key_id);
            }
            open()?.rotate(&request).await?;
            request.key_name()
        }
        Command::Generate {
            id,
            kind,
            len,
            owner,
        } => {
            open()?.generate_key(&id, &kind, &owner, len).await?;
            id
        }
        Command::Remove { id, owner } => {
            open()?
                .remove_key(&Key::template(&id).with_owner(owner))
                .await?;
            id
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match KeyringConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_format);

    match run(&config, cli.command).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(AdminError::Keyring(e)) => {
            tracing::error!(code = e.error_code(), "{e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
