use super::{CommonArgs, Session};
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use trident_core::{
    ToolPosition,
    arc::{ArcRequest, Plane},
    homing::HomeRequest,
    interfaces::ReportSink,
    report::report_current_position,
};

fn parse_plane(s: &str) -> Result<Plane, String> {
    Plane::parse(s).ok_or_else(|| format!("unknown plane `{s}`, expected xy, zx or yz"))
}

#[derive(Args, Debug, Clone, Default)]
pub struct ArcArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Arc end point; coordinates left out stay where the arc starts.
    #[arg(long, allow_negative_numbers = true)]
    pub x: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub y: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub z: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub e: Option<f64>,

    /// Centre offset from the start point along the plane's first axis.
    #[arg(long, allow_negative_numbers = true)]
    pub i: f64,

    /// Centre offset along the plane's second axis.
    #[arg(long, allow_negative_numbers = true)]
    pub j: f64,

    #[arg(long)]
    pub clockwise: bool,

    #[arg(long, value_parser = parse_plane, default_value = "xy")]
    pub plane: Plane,

    /// Where to travel before the arc starts.
    #[arg(long, allow_negative_numbers = true, default_value_t = 0.0)]
    pub start_x: f64,

    #[arg(long, allow_negative_numbers = true, default_value_t = 0.0)]
    pub start_y: f64,

    #[arg(long, default_value_t = 10.0)]
    pub start_z: f64,

    /// Overrides `arc.mm_per_segment` from the configuration.
    #[arg(long)]
    pub mm_per_segment: Option<f64>,
}

impl ArcArgs {
    pub fn run(&self) -> Result<()> {
        let config = self.common.load()?;
        self.trace(config, self.common.reporter().as_mut())
    }

    pub fn trace(&self, mut config: Config, out: &mut dyn ReportSink) -> Result<()> {
        if let Some(mm) = self.mm_per_segment {
            config.arc.mm_per_segment = mm;
            config.validate()?;
        }
        let mut session = Session::new(config)?;
        session.home(HomeRequest::default())?;
        session
            .machine
            .do_blocking_move_to(self.start_x, self.start_y, self.start_z, None)?;

        let start = session.machine.positions.current;
        let request = ArcRequest {
            target: ToolPosition::new(
                self.x.unwrap_or(start.x),
                self.y.unwrap_or(start.y),
                self.z.unwrap_or(start.z),
                self.e.unwrap_or(start.e),
            ),
            offset: (self.i, self.j),
            plane: self.plane,
            clockwise: self.clockwise,
        };
        let outcome = session.machine.plan_arc(&request, &session.config.arc)?;
        session.machine.synchronize();

        out.line(&format!("Arc {outcome}"));
        report_current_position(&session.machine.positions.current, out);
        session.report_carriages(out);
        Ok(())
    }
}
