use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use trident::cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check(args) => args.run(),
        Command::Home(args) => args.run(),
        Command::Move(args) => args.run(),
        Command::Arc(args) => args.run(),
        Command::Calibrate(args) => args.run(),
    }
}

#[derive(Parser)]
#[command(name = "trident", about = "Delta motion tooling for Trident")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a machine description and print its derived geometry.
    Check(cli::check::CheckArgs),
    /// Home the simulated printer and report where it ended up.
    Home(cli::home::HomeArgs),
    /// Home, then make a straight move.
    Move(cli::moves::MoveArgs),
    /// Home, then trace a circular arc.
    Arc(cli::arc::ArcArgs),
    /// Home, then sample calibration derivatives around the bed.
    Calibrate(cli::calibrate::CalibrateArgs),
}
