use std::fs;
use std::path::{Path, PathBuf};

use hb_core::BridgeOptions;

use crate::{map_cli_options_invalid, map_cli_options_read, map_cli_source_path, CliError};

pub(crate) fn resolve_scripts_dir(scripts_dir: &str) -> Result<PathBuf, CliError> {
    let path = PathBuf::from(scripts_dir);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(map_cli_source_path)?
            .join(path)
    };

    if !absolute.exists() {
        return Err(CliError::new(
            "CLI_SOURCE_NOT_FOUND",
            format!("scripts-dir does not exist: {}", absolute.display()),
        ));
    }

    if !absolute.is_dir() {
        return Err(CliError::new(
            "CLI_SOURCE_NOT_DIR",
            format!("scripts-dir is not a directory: {}", absolute.display()),
        ));
    }

    Ok(absolute)
}

/// Reads bridge options from `options_path` (defaults when absent) and points
/// them at `scripts_root`.
pub(crate) fn load_options(
    options_path: Option<&str>,
    scripts_root: &Path,
) -> Result<BridgeOptions, CliError> {
    let mut options = match options_path {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(map_cli_options_read)?;
            serde_json::from_str::<BridgeOptions>(&raw).map_err(map_cli_options_invalid)?
        }
        None => BridgeOptions::default(),
    };
    options.script_roots = vec![scripts_root.to_path_buf()];
    options.validate()?;
    Ok(options)
}
