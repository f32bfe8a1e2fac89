use super::CommonArgs;
use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use trident_core::{
    DeltaKinematics, Kinematics, Tower, homing::home_carriage, interfaces::ReportSink,
    report::report_geometry,
};

#[derive(Args, Debug, Clone, Default)]
pub struct CheckArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

impl CheckArgs {
    pub fn run(&self) -> Result<()> {
        let config = self.common.load()?;
        check(&config, self.common.reporter().as_mut())
    }
}

/// Validate a machine description and print the geometry it derives.
pub fn check(config: &Config, out: &mut dyn ReportSink) -> Result<()> {
    let kinematics = DeltaKinematics::new(config.geometry.clone()).context("geometry rejected")?;
    report_geometry(kinematics.params(), out);

    out.line(&format!(
        "Clip start height: {:.3}",
        kinematics.clip_start_height()
    ));
    out.line(&format!("Probe radius in use: {:.2}", kinematics.cache().probe_radius));

    let home = home_carriage(&kinematics)?;
    let heights = Tower::ALL
        .iter()
        .map(|t| format!("{t}:{:.3}", home[*t]))
        .collect::<Vec<_>>()
        .join(" ");
    out.line(&format!("Home carriages: {heights}"));
    Ok(())
}
