use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Language server for Skript workspaces")]
pub(crate) struct Cli {
    /// Accept one client connection over TCP instead of using stdio
    #[arg(long)]
    pub listen: bool,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    /// Index each given workspace directory and print its diagnostics
    #[arg(long)]
    pub diagnose: Vec<PathBuf>,
    /// Ignored; stdio is the default transport
    #[arg(long, hide = true)]
    pub stdio: bool,
}
