use anyhow::Result;
use clap::{Args, Subcommand};
use xshell::Shell;

use super::{common, test::Test};

#[derive(Args)]
pub struct Ci {
    #[command(subcommand)]
    command: Option<CiCommand>,
}

#[derive(Subcommand)]
pub enum CiCommand {
    /// Check formatting
    Fmt,
    /// Run cargo clippy
    Clippy,
    /// Run cargo test
    Test(Test),
}

impl Ci {
    pub fn run(&self, sh: &Shell) -> Result<()> {
        match &self.command {
            Some(cmd) => cmd.run(sh),
            None => {
                CiCommand::Fmt.run(sh)?;
                CiCommand::Clippy.run(sh)?;
                CiCommand::Test(Test::default()).run(sh)?;
                eprintln!("CI checks passed!");
                Ok(())
            }
        }
    }
}

impl CiCommand {
    pub fn run(&self, sh: &Shell) -> Result<()> {
        match self {
            CiCommand::Fmt => common::run_fmt(sh, true),
            CiCommand::Clippy => common::run_clippy(sh),
            CiCommand::Test(test) => test.run(sh),
        }
    }
}
