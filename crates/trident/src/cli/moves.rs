use super::{CommonArgs, Session};
use crate::config::Config;
use anyhow::{Result, bail};
use clap::Args;
use trident_core::{
    Axis, ToolPosition, homing::HomeRequest, interfaces::ReportSink,
    report::report_current_position,
};

#[derive(Args, Debug, Clone, Default)]
pub struct MoveArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Target X; the current X when omitted.
    #[arg(long, allow_negative_numbers = true)]
    pub x: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub y: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub z: Option<f64>,

    /// Extruder target, ignored by blocking moves.
    #[arg(long, allow_negative_numbers = true)]
    pub e: Option<f64>,

    /// Feedrate in mm/s.
    #[arg(long)]
    pub feedrate: Option<f64>,

    /// Travel the way probing and tool changes do: clip-zone aware and
    /// synchronized.
    #[arg(long)]
    pub blocking: bool,

    /// Start from the power-up state instead of homing first.
    #[arg(long)]
    pub skip_home: bool,
}

impl MoveArgs {
    pub fn run(&self) -> Result<()> {
        let config = self.common.load()?;
        self.travel(config, self.common.reporter().as_mut())
    }

    pub fn travel(&self, config: Config, out: &mut dyn ReportSink) -> Result<()> {
        if let Some(feedrate) = self.feedrate.filter(|f| f.is_nan() || *f <= 0.0) {
            bail!("--feedrate must be positive, got {feedrate}");
        }
        let mut session = Session::new(config)?;
        if !self.skip_home {
            session.home(HomeRequest::default())?;
        }
        let positions = &session.machine.positions;
        if let Some(message) = positions.axis_unhomed_error(&Axis::LINEAR) {
            bail!(message);
        }

        let current = positions.current;
        let target = ToolPosition::new(
            self.x.unwrap_or(current.x),
            self.y.unwrap_or(current.y),
            self.z.unwrap_or(current.z),
            self.e.unwrap_or(current.e),
        );

        let machine = &mut session.machine;
        if self.blocking {
            machine.do_blocking_move_to(target.x, target.y, target.z, self.feedrate)?;
            out.line("Blocking move finished");
        } else {
            if let Some(feedrate) = self.feedrate {
                machine.positions.feedrate_mm_s = feedrate;
            }
            machine.positions.destination = target;
            let outcome = machine.prepare_move_to_destination()?;
            machine.synchronize();
            out.line(&format!("Move {outcome}"));
        }

        report_current_position(&session.machine.positions.current, out);
        session.report_carriages(out);
        Ok(())
    }
}
