use super::{CommonArgs, Session};
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use trident_core::{
    homing::HomeRequest,
    interfaces::ReportSink,
    report::{report_current_position, report_current_position_detail},
};

#[derive(Args, Debug, Clone, Default)]
pub struct HomeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Assign the origin without moving anything.
    #[arg(long)]
    pub simulate: bool,

    /// Drop to the clip height once homed.
    #[arg(long)]
    pub safe_zone: bool,

    /// Print every view of the final position.
    #[arg(long)]
    pub detail: bool,
}

impl HomeArgs {
    pub fn run(&self) -> Result<()> {
        let config = self.common.load()?;
        self.home(config, self.common.reporter().as_mut())
    }

    pub fn home(&self, mut config: Config, out: &mut dyn ReportSink) -> Result<()> {
        config.homing.home_to_safe_zone |= self.safe_zone;
        let mut session = Session::new(config)?;
        let controller = session.home(HomeRequest {
            come_back: false,
            simulate: self.simulate,
        })?;
        tracing::debug!(phases = ?controller.history(), "homing finished");

        report_current_position(&session.machine.positions.current, out);
        if self.detail {
            report_current_position_detail(&mut session.machine, out)?;
        }
        session.report_carriages(out);
        Ok(())
    }
}
