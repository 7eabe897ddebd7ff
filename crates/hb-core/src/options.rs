use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

pub const DEFAULT_ENTRY_FILE: &str = "__init__.rhai";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeOptions {
    /// Directories whose immediate subfolders are script runtimes.
    pub script_roots: Vec<PathBuf>,
    pub entry_file: String,
    /// Leading character that keeps a chat message from reaching the engine.
    pub hidden_marker: char,
    pub chat_commands: Vec<String>,
    /// Rhai operation budget per call; 0 disables the limit.
    pub max_operations: u64,
    pub max_call_depth: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            script_roots: Vec::new(),
            entry_file: DEFAULT_ENTRY_FILE.to_string(),
            hidden_marker: '/',
            chat_commands: vec!["say".to_string(), "say_team".to_string()],
            max_operations: 0,
            max_call_depth: 64,
        }
    }
}

impl BridgeOptions {
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.entry_file.trim().is_empty() {
            return Err(BridgeError::InvalidOptions(
                "entryFile must not be empty".to_string(),
            ));
        }
        if self.max_call_depth == 0 {
            return Err(BridgeError::InvalidOptions(
                "maxCallDepth must be positive".to_string(),
            ));
        }
        if self.hidden_marker.is_whitespace() {
            return Err(BridgeError::InvalidOptions(
                "hiddenMarker must be a visible character".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_chat_command(&self, name: &str) -> bool {
        self.chat_commands.iter().any(|command| command == name)
    }
}
