use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "hb-cli")]
#[command(about = "Load script folders and replay host sessions against them")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Loads every script folder and reports the runtimes.
    Check(CheckArgs),
    /// Replays a recorded session of host events.
    Replay(ReplayArgs),
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: String,
    #[arg(long = "options")]
    pub(crate) options: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct ReplayArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: String,
    #[arg(long = "session")]
    pub(crate) session: String,
    #[arg(long = "options")]
    pub(crate) options: Option<String>,
}
