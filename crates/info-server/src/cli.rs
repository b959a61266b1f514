//! Command-line surface, grounded in the teacher's preference for a small
//! `clap`-derived struct over hand-rolled argument parsing.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "info-server", about = "Info-plane introspection and administration listener")]
pub struct Cli {
    /// Path to a TOML configuration file. Missing values fall back to
    /// built-in defaults.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Address to bind the Info listener on, overriding the config file.
    #[arg(long)]
    pub bind: Option<String>,

    /// Run one foreground tick-and-exit pass instead of serving forever.
    /// Useful for smoke-testing a config file.
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    pub fn parse_args() -> Cli {
        Cli::parse()
    }
}
