use std::fmt::Display;

use hb_core::BridgeError;

/// Error reported on stdout as `RESULT:ERROR` with a stable code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliError {
    pub(crate) code: String,
    pub(crate) message: String,
}

impl CliError {
    pub(crate) fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<BridgeError> for CliError {
    fn from(error: BridgeError) -> Self {
        Self::new(error.code(), error.to_string())
    }
}

fn map_error(code: &'static str, error: impl Display) -> CliError {
    CliError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: CliError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!(
        "ERROR_MSG_JSON:{}",
        serde_json::to_string(&error.message)
            .unwrap_or_else(|_| "\"Unknown error\"".to_string())
    );
    1
}

pub(crate) fn map_cli_source_path(error: std::io::Error) -> CliError {
    map_error("CLI_SOURCE_PATH", error)
}

pub(crate) fn map_cli_options_read(error: std::io::Error) -> CliError {
    map_error("CLI_OPTIONS_READ", error)
}

pub(crate) fn map_cli_options_invalid(error: serde_json::Error) -> CliError {
    map_error("CLI_OPTIONS_INVALID", error)
}

pub(crate) fn map_cli_session_read(error: std::io::Error) -> CliError {
    map_error("CLI_SESSION_READ", error)
}

pub(crate) fn map_cli_session_invalid(error: serde_json::Error) -> CliError {
    map_error("CLI_SESSION_INVALID", error)
}
