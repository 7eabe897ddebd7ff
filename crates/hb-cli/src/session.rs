//! Recorded host sessions.
//!
//! A session file carries the host tables the scripts see and the ordered
//! list of engine calls to replay:
//!
//! ```json
//! {
//!   "schemaVersion": "hb-session.v1",
//!   "tables": { "meansOfDeath": ["MOD_UNKNOWN"], "clients": 1 },
//!   "steps": [
//!     { "kind": "command", "client_num": 0, "name": "say", "args": "/help" },
//!     { "kind": "frame", "elapsed_ms": 50 }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;

use hb_core::{ClientCommand, DamageArgs, EntityNum, KilledArgs, VmValue, SYMBOL_LIMIT};
use hb_runtime::HostTables;
use serde::{Deserialize, Serialize};

use crate::{map_cli_session_invalid, map_cli_session_read, CliError};

pub(crate) const SESSION_SCHEMA: &str = "hb-session.v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Session {
    pub(crate) schema_version: String,
    #[serde(default)]
    pub(crate) tables: HostTables,
    #[serde(default)]
    pub(crate) steps: Vec<SessionStep>,
}

fn default_free_scripts() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum SessionStep {
    Damage(DamageArgs),
    Killed(KilledArgs),
    Command(ClientCommand),
    /// Script notification; without `client` it goes to the level.
    Notify {
        name: String,
        #[serde(default)]
        client: Option<EntityNum>,
        #[serde(default)]
        arguments: Vec<VmValue>,
    },
    Frame {
        elapsed_ms: u64,
    },
    Shutdown {
        #[serde(default = "default_free_scripts")]
        free_scripts: i32,
    },
}

impl SessionStep {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Damage(_) => "damage",
            Self::Killed(_) => "killed",
            Self::Command(_) => "command",
            Self::Notify { .. } => "notify",
            Self::Frame { .. } => "frame",
            Self::Shutdown { .. } => "shutdown",
        }
    }
}

pub(crate) fn load_session(path: &Path) -> Result<Session, CliError> {
    if !path.exists() {
        return Err(CliError::new(
            "CLI_SESSION_NOT_FOUND",
            format!("Session file does not exist: {}", path.display()),
        ));
    }

    let raw = fs::read_to_string(path).map_err(map_cli_session_read)?;
    let session: Session = serde_json::from_str(&raw).map_err(map_cli_session_invalid)?;

    if session.schema_version != SESSION_SCHEMA {
        return Err(CliError::new(
            "CLI_SESSION_SCHEMA",
            format!("Unsupported session schema: {}", session.schema_version),
        ));
    }

    let invalid_symbol = session
        .tables
        .symbols
        .iter()
        .find(|(_, id)| **id == 0 || **id >= SYMBOL_LIMIT);
    if let Some((name, id)) = invalid_symbol {
        return Err(CliError::new(
            "CLI_SESSION_INVALID",
            format!(
                "Symbol {} has id {}; ids must be in 1..{:#x}",
                name, id, SYMBOL_LIMIT
            ),
        ));
    }

    Ok(session)
}
