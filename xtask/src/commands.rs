use anyhow::Result;
use clap::Subcommand;
use xshell::Shell;

pub mod ci;
pub mod common;
pub mod fmt;

#[derive(Subcommand)]
pub enum Command {
    /// Run every check CI runs: fmt, clippy, then tests
    Ci(ci::Ci),
    /// Format the workspace, or only check it with --check
    Fmt(fmt::Fmt),
    /// Run the workspace tests
    Test(test::Test),
}

impl Command {
    pub fn run(self, sh: &Shell) -> Result<()> {
        match self {
            Command::Ci(cmd) => cmd.run(sh),
            Command::Fmt(cmd) => cmd.run(sh),
            Command::Test(cmd) => cmd.run(sh),
        }
    }
}
