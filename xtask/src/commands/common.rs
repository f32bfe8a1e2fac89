use anyhow::{Context, Result};
use xshell::{Shell, cmd};

pub fn run_fmt(sh: &Shell, check: bool) -> Result<()> {
    let check = check.then_some("--check");
    eprintln!("Running cargo fmt...");
    cmd!(sh, "cargo fmt --all -- {check...}")
        .run()
        .context("cargo fmt reported differences")?;
    Ok(())
}

/// Clippy over every target, warnings are errors
pub fn run_clippy(sh: &Shell) -> Result<()> {
    eprintln!("Running cargo clippy...");
    cmd!(sh, "cargo clippy --all-targets --workspace -- -D warnings").run()?;
    Ok(())
}

/// `cargo test` for the whole workspace; `args` go to cargo after the
/// workspace flag.
pub fn run_tests(sh: &Shell, args: &[String]) -> Result<()> {
    eprintln!("Running cargo test...");
    cmd!(sh, "cargo test --workspace {args...}").run()?;
    Ok(())
}
