use std::ffi::OsString;

use clap::Parser;

mod cli_args;
mod error_map;
mod replay;
mod session;
mod source_loader;

pub(crate) use cli_args::{CheckArgs, Cli, Mode, ReplayArgs};
pub(crate) use error_map::{
    emit_error, map_cli_options_invalid, map_cli_options_read, map_cli_session_invalid,
    map_cli_session_read, map_cli_source_path, CliError,
};
pub(crate) use replay::{run_check, run_replay};
pub(crate) use session::{load_session, SessionStep};
pub(crate) use source_loader::{load_options, resolve_scripts_dir};

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    init_logging();
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("warn");
    let _ = env_logger::Builder::from_env(env).try_init();
}

fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Mode::Check(args) => run_check(args),
        Mode::Replay(args) => run_replay(args),
    }
}
