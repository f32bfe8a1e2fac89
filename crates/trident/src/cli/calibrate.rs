use super::{CommonArgs, Session};
use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use std::f64::consts::TAU;
use trident_core::{
    CalibrationParameter, Kinematics, homing::HomeRequest, interfaces::ReportSink,
};

fn parse_parameter(s: &str) -> Result<CalibrationParameter, String> {
    CalibrationParameter::parse(s).ok_or_else(|| {
        format!("unknown parameter `{s}`, expected endstop-a/b/c, radius, angle-a, angle-b or rod")
    })
}

#[derive(Args, Debug, Clone, Default)]
pub struct CalibrateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Parameters to differentiate, comma separated. All of them by default.
    #[arg(long, value_parser = parse_parameter, value_delimiter = ',')]
    pub param: Vec<CalibrationParameter>,

    /// Points sampled on the ring, plus one at the centre.
    #[arg(long, default_value_t = 6)]
    pub points: usize,

    /// Ring radius; the probeable radius when omitted.
    #[arg(long)]
    pub radius: Option<f64>,

    /// Height the samples are taken at.
    #[arg(long, default_value_t = 0.0)]
    pub z: f64,
}

impl CalibrateArgs {
    pub fn run(&self) -> Result<()> {
        let config = self.common.load()?;
        self.sample(config, self.common.reporter().as_mut())
    }

    /// Sampled positions, centre first, then the ring starting at tower A.
    pub fn sample_points(&self, radius: f64) -> Vec<(f64, f64)> {
        let start = 210f64.to_radians();
        let ring = (0..self.points).map(|k| {
            let angle = start + TAU * k as f64 / self.points as f64;
            (radius * angle.cos(), radius * angle.sin())
        });
        std::iter::once((0.0, 0.0)).chain(ring).collect()
    }

    pub fn sample(&self, config: Config, out: &mut dyn ReportSink) -> Result<()> {
        let params = if self.param.is_empty() {
            CalibrationParameter::ALL.to_vec()
        } else {
            self.param.clone()
        };

        let mut session = Session::new(config)?;
        session.home(HomeRequest::default())?;

        let radius = self
            .radius
            .unwrap_or(session.machine.kinematics().cache().probe_radius);
        let header = params
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        out.line(&format!("Height derivatives at Z{:.2}: {header}", self.z));

        for (x, y) in self.sample_points(radius) {
            if !session.machine.kinematics().is_reachable_by_probe(x, y, (0.0, 0.0)) {
                tracing::warn!(x, y, "sample point out of reach, skipped");
                continue;
            }
            session.machine.do_blocking_move_to(x, y, self.z, None)?;

            let sample = session.machine.actual_carriage();
            let kinematics = session.machine.kinematics();
            let mut columns = Vec::with_capacity(params.len());
            for param in &params {
                let derivative = kinematics
                    .derivative(*param, &sample)
                    .with_context(|| format!("derivative of {param} at X{x:.2} Y{y:.2}"))?;
                columns.push(format!("{derivative:.4}"));
            }
            out.line(&format!("  X{x:.2} Y{y:.2} {}", columns.join(" ")));
        }
        Ok(())
    }
}
