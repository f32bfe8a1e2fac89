use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use trident_core::{
    DeltaKinematics, MachineState, Tower,
    homing::{HomeRequest, HomingController},
    interfaces::{MotionSink, ReportSink, TracingReport},
    sim::Simulator,
};

pub mod arc;
pub mod calibrate;
pub mod check;
pub mod home;
pub mod moves;

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Path to the machine description (TOML or JSON). Built-in defaults
    /// are used when omitted.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Send reports to the log instead of stdout.
    #[arg(long)]
    pub log: bool,
}

impl CommonArgs {
    pub fn load(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => {
                let config = Config::from_file(path)?;
                tracing::info!("loaded machine description {}", path.display());
                config
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn reporter(&self) -> Box<dyn ReportSink> {
        if self.log {
            Box::new(TracingReport)
        } else {
            Box::new(Stdout)
        }
    }
}

/// Writes report lines to stdout
pub struct Stdout;

impl ReportSink for Stdout {
    fn line(&mut self, line: &str) {
        println!("{line}");
    }
}

/// A delta machine wired to a simulated printer.
pub struct Session {
    pub config: Config,
    pub machine: MachineState,
    pub sim: Simulator,
}

impl Session {
    pub fn new(config: Config) -> Result<Self> {
        let kinematics =
            DeltaKinematics::new(config.geometry.clone()).context("geometry rejected")?;
        let sim = Simulator::new(
            config
                .simulation
                .build(&kinematics)
                .context("failed to place simulated endstops")?,
        );
        sim.sink().set_dynamics(config.motion.dynamics());

        let mut machine = MachineState::new(kinematics, sim.sink(), sim.endstops());
        machine.positions.feedrate_mm_s = config.motion.feedrate_mm_s;
        machine.positions.feedrate_percentage = config.motion.feedrate_percentage;

        Ok(Self {
            config,
            machine,
            sim,
        })
    }

    /// Run the homing sequence with the configured settings.
    pub fn home(&mut self, request: HomeRequest) -> Result<HomingController> {
        let mut controller = HomingController::new(self.config.homing.clone());
        controller
            .home(&mut self.machine, request)
            .context("homing failed")?;
        Ok(controller)
    }

    /// Physical carriage heights of the simulated printer.
    pub fn report_carriages(&self, out: &mut dyn ReportSink) {
        let physical = self.sim.physical();
        let line = Tower::ALL
            .iter()
            .map(|t| format!("{t}:{:.3}", physical[*t]))
            .collect::<Vec<_>>()
            .join(" ");
        out.line(&format!("Carriages: {line}"));
    }
}
