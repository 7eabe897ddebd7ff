use std::path::PathBuf;

use thiserror::Error;

use crate::value::CodePos;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Value of type \"{type_name}\" has no {target} representation.")]
    ConversionUnsupported {
        type_name: String,
        target: &'static str,
    },
    #[error("Callback failed: {message}")]
    CallbackFault { message: String },
    #[error("No hook is registered at code position {0}.")]
    RegistryMiss(CodePos),
    #[error("Handle {0} does not refer to a registered listener or task.")]
    StaleHandle(u64),
    #[error("Failed to load script {path}: {message}")]
    ScriptLoad { path: PathBuf, message: String },
    #[error("Script runtime owning this callback has been torn down.")]
    RuntimeGone,
    #[error("I/O failure on {path}: {message}")]
    Io { path: PathBuf, message: String },
    #[error("Invalid bridge options: {0}")]
    InvalidOptions(String),
}

impl BridgeError {
    pub fn callback_fault(message: impl Into<String>) -> Self {
        Self::CallbackFault {
            message: message.into(),
        }
    }

    pub fn script_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ScriptLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: error.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::ConversionUnsupported { .. } => "BRIDGE_CONVERSION_UNSUPPORTED",
            Self::CallbackFault { .. } => "BRIDGE_CALLBACK_FAULT",
            Self::RegistryMiss(_) => "BRIDGE_REGISTRY_MISS",
            Self::StaleHandle(_) => "BRIDGE_STALE_HANDLE",
            Self::ScriptLoad { .. } => "BRIDGE_SCRIPT_LOAD",
            Self::RuntimeGone => "BRIDGE_RUNTIME_GONE",
            Self::Io { .. } => "BRIDGE_IO",
            Self::InvalidOptions(_) => "BRIDGE_INVALID_OPTIONS",
        }
    }
}
