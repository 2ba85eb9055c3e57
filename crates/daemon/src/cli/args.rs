pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cairn")]
#[command(about = "A peer-to-peer content-addressed storage node")]
#[command(version)]
pub struct Args {
    /// Path to the repository (defaults to ~/.cairn)
    #[arg(long, global = true, env = "CAIRN_PATH")]
    pub repo_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
