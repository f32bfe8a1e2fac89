//! Circular arcs in one of the three principal planes.
//!
//! The radius vector is rotated incrementally with a small-angle rotation
//! matrix and snapped back onto the exact circle every `correction_interval`
//! segments. The linear axis and the extruder advance evenly, which turns the
//! arc into a helix when the linear axis moves.

use crate::{
    error::Result,
    kinematics::Kinematics,
    position::{Axis, ToolPosition},
    segment::{Execution, MAX_SEGMENTS, MotionContext, MoveOutcome},
};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tracing::{debug, warn};

/// Arcs shorter than this are skipped.
pub const MIN_ARC_LENGTH_MM: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plane {
    #[default]
    XY,
    ZX,
    YZ,
}

impl Plane {
    /// The two in-plane axes followed by the linear axis.
    pub const fn axes(self) -> (Axis, Axis, Axis) {
        match self {
            Plane::XY => (Axis::X, Axis::Y, Axis::Z),
            Plane::ZX => (Axis::Z, Axis::X, Axis::Y),
            Plane::YZ => (Axis::Y, Axis::Z, Axis::X),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "xy" => Some(Plane::XY),
            "zx" => Some(Plane::ZX),
            "yz" => Some(Plane::YZ),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcSettings {
    /// Target chord length (mm)
    pub mm_per_segment: f64,

    /// Segments between exact radius recomputations
    pub correction_interval: u32,
}

impl Default for ArcSettings {
    fn default() -> Self {
        Self {
            mm_per_segment: 1.0,
            correction_interval: 25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcRequest {
    pub target: ToolPosition,
    /// Centre relative to the start point, in plane axis order
    pub offset: (f64, f64),
    pub plane: Plane,
    pub clockwise: bool,
}

/// Fully resolved arc, ready to be walked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcPlan {
    start: ToolPosition,
    target: ToolPosition,
    plane: Plane,
    offset: (f64, f64),
    center: (f64, f64),
    angular_travel: f64,
    segments: usize,
    length_mm: f64,
    correction_interval: u32,
}

impl ArcPlan {
    /// Signed rotation in radians, positive counter-clockwise.
    pub fn angular_travel(&self) -> f64 {
        self.angular_travel
    }

    pub fn segments(&self) -> usize {
        self.segments
    }

    /// Path length including linear travel.
    pub fn length_mm(&self) -> f64 {
        self.length_mm
    }

    pub fn target(&self) -> ToolPosition {
        self.target
    }

    /// Chord points along the arc, ending exactly on the target.
    pub fn points(&self) -> ArcPoints {
        ArcPoints {
            plan: *self,
            step: 1,
            r_p: -self.offset.0,
            r_q: -self.offset.1,
            recalc_count: self.correction_interval.max(1),
            finished: false,
        }
    }
}

/// Iterator over the points of an [`ArcPlan`].
#[derive(Debug, Clone)]
pub struct ArcPoints {
    plan: ArcPlan,
    step: usize,
    r_p: f64,
    r_q: f64,
    recalc_count: u32,
    finished: bool,
}

impl Iterator for ArcPoints {
    type Item = ToolPosition;

    fn next(&mut self) -> Option<ToolPosition> {
        let plan = &self.plan;
        if self.finished {
            return None;
        }
        if self.step >= plan.segments {
            self.finished = true;
            return Some(plan.target);
        }

        let segments = plan.segments as f64;
        let theta = plan.angular_travel / segments;
        let i = self.step as f64;

        self.recalc_count -= 1;
        if self.recalc_count > 0 {
            let sin_t = theta;
            let cos_t = 1.0 - 0.5 * theta * theta;
            let r_q = self.r_p * sin_t + self.r_q * cos_t;
            self.r_p = self.r_p * cos_t - self.r_q * sin_t;
            self.r_q = r_q;
        } else {
            self.recalc_count = plan.correction_interval.max(1);
            let (sin_ti, cos_ti) = (i * theta).sin_cos();
            let (off_p, off_q) = plan.offset;
            self.r_p = -off_p * cos_ti + off_q * sin_ti;
            self.r_q = -off_p * sin_ti - off_q * cos_ti;
        }

        let (p, q, l) = plan.plane.axes();
        let mut point = plan.start;
        point.set(p, plan.center.0 + self.r_p);
        point.set(q, plan.center.1 + self.r_q);
        let fraction = i / segments;
        point.set(
            l,
            plan.start.get(l) + (plan.target.get(l) - plan.start.get(l)) * fraction,
        );
        point.e = plan.start.e + (plan.target.e - plan.start.e) * fraction;

        self.step += 1;
        Some(point)
    }
}

/// Resolve an arc from `current`. `None` when it is too short to move.
pub fn plan_arc(
    current: &ToolPosition,
    request: &ArcRequest,
    settings: &ArcSettings,
) -> Option<ArcPlan> {
    let (p, q, l) = request.plane.axes();
    let target = request.target;

    let r_p = -request.offset.0;
    let r_q = -request.offset.1;
    let radius = r_p.hypot(r_q);
    let center = (current.get(p) - r_p, current.get(q) - r_q);
    let rt_p = target.get(p) - center.0;
    let rt_q = target.get(q) - center.1;
    let linear_travel = target.get(l) - current.get(l);

    let mut angular_travel = (r_p * rt_q - r_q * rt_p).atan2(r_p * rt_p + r_q * rt_q);
    if angular_travel < 0.0 {
        angular_travel += TAU;
    }
    if request.clockwise {
        angular_travel -= TAU;
    }
    if angular_travel == 0.0 && current.get(p) == target.get(p) && current.get(q) == target.get(q)
    {
        angular_travel += TAU;
    }

    let flat_mm = radius * angular_travel;
    let length_mm = if linear_travel != 0.0 {
        flat_mm.hypot(linear_travel)
    } else {
        flat_mm.abs()
    };
    if length_mm < MIN_ARC_LENGTH_MM {
        return None;
    }

    let segments = if settings.mm_per_segment.is_nan() || settings.mm_per_segment <= 0.0 {
        warn!(
            mm_per_segment = settings.mm_per_segment,
            "arc segment length not positive, using the segment limit"
        );
        MAX_SEGMENTS
    } else {
        ((length_mm / settings.mm_per_segment)
            .floor()
            .min(MAX_SEGMENTS as f64) as usize)
            .max(1)
    };
    debug!(angular_travel, length_mm, segments, "planned arc");

    Some(ArcPlan {
        start: *current,
        target,
        plane: request.plane,
        offset: request.offset,
        center,
        angular_travel,
        segments,
        length_mm,
        correction_interval: settings.correction_interval,
    })
}

/// Queue an arc from `start`.
///
/// Every point is clamped to the soft limits and checked against the
/// kinematics before the first segment is queued.
pub fn run_arc<K: Kinematics + ?Sized>(
    ctx: &mut MotionContext<'_, K>,
    start: &ToolPosition,
    request: &ArcRequest,
    settings: &ArcSettings,
    feedrate_mm_s: f64,
) -> Result<Execution> {
    let Some(plan) = plan_arc(start, request, settings) else {
        return Ok(Execution {
            outcome: MoveOutcome::DegenerateMove,
            reached: *start,
        });
    };

    let endstops = ctx.endstops;
    let clamped = move |mut point: ToolPosition| {
        endstops.clamp_to_soft_limits(&mut point);
        point
    };

    for point in plan.points().map(clamped) {
        ctx.carriage_for(&point)?;
    }

    let hint = Some(plan.length_mm / plan.segments as f64);
    ctx.enqueue_all(
        *start,
        plan.points().map(clamped),
        plan.segments,
        feedrate_mm_s,
        hint,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn quarter(clockwise: bool) -> ArcRequest {
        ArcRequest {
            target: ToolPosition::new(0.0, 10.0, 0.0, 0.0),
            offset: (-10.0, 0.0),
            plane: Plane::XY,
            clockwise,
        }
    }

    fn start() -> ToolPosition {
        ToolPosition::new(10.0, 0.0, 0.0, 0.0)
    }

    #[test]
    fn winding_direction_sets_angular_travel() {
        let settings = ArcSettings::default();
        let ccw = plan_arc(&start(), &quarter(false), &settings).unwrap();
        assert!((ccw.angular_travel() - FRAC_PI_2).abs() < 1e-12);

        let cw = plan_arc(&start(), &quarter(true), &settings).unwrap();
        assert!((cw.angular_travel() + 3.0 * FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn coincident_endpoints_make_a_full_circle() {
        let request = ArcRequest {
            target: start(),
            ..quarter(false)
        };
        let plan = plan_arc(&start(), &request, &ArcSettings::default()).unwrap();
        assert!((plan.angular_travel() - 2.0 * PI).abs() < 1e-12);
        // 2π·10 ≈ 62.8mm at 1mm per segment
        assert_eq!(plan.segments(), 62);
    }

    #[test]
    fn points_stay_on_the_circle_and_end_on_target() {
        let plan = plan_arc(&start(), &quarter(false), &ArcSettings::default()).unwrap();
        let points: Vec<_> = plan.points().collect();
        assert_eq!(points.len(), plan.segments());
        // no exact correction within a quarter turn, so allow for drift
        for p in &points {
            assert!((p.x.hypot(p.y) - 10.0).abs() < 5e-3, "{p:?}");
        }
        assert_eq!(*points.last().unwrap(), plan.target());
    }

    #[test]
    fn exact_correction_matches_incremental_closely() {
        let incremental = ArcSettings {
            correction_interval: u32::MAX,
            ..ArcSettings::default()
        };
        let exact = ArcSettings {
            correction_interval: 1,
            ..ArcSettings::default()
        };
        let a: Vec<_> = plan_arc(&start(), &quarter(false), &incremental)
            .unwrap()
            .points()
            .collect();
        let b: Vec<_> = plan_arc(&start(), &quarter(false), &exact)
            .unwrap()
            .points()
            .collect();
        for (a, b) in a.iter().zip(&b) {
            assert!((a.x - b.x).abs() < 1e-2 && (a.y - b.y).abs() < 1e-2);
        }
    }

    #[test]
    fn helix_advances_linear_axis_evenly() {
        let request = ArcRequest {
            target: ToolPosition::new(0.0, 10.0, 8.0, 2.0),
            ..quarter(false)
        };
        let plan = plan_arc(&start(), &request, &ArcSettings::default()).unwrap();
        let points: Vec<_> = plan.points().collect();
        let n = points.len() as f64;
        assert!((points[0].z - 8.0 / n).abs() < 1e-9);
        assert!((points[0].e - 2.0 / n).abs() < 1e-9);
        assert_eq!(points.last().unwrap().z, 8.0);
    }

    #[test]
    fn zx_plane_rotates_z_and_x() {
        let current = ToolPosition::new(0.0, 5.0, 10.0, 0.0);
        let request = ArcRequest {
            target: ToolPosition::new(10.0, 5.0, 0.0, 0.0),
            offset: (-10.0, 0.0),
            plane: Plane::ZX,
            clockwise: false,
        };
        let plan = plan_arc(&current, &request, &ArcSettings::default()).unwrap();
        assert!((plan.angular_travel() - FRAC_PI_2).abs() < 1e-12);
        for p in plan.points() {
            assert_eq!(p.y, 5.0);
            assert!((p.z.hypot(p.x) - 10.0).abs() < 5e-3);
        }
    }

    #[test]
    fn zero_segment_length_is_capped() {
        let request = ArcRequest {
            target: start(),
            ..quarter(false)
        };
        for mm_per_segment in [0.0, -1.0, f64::NAN, 1e-12] {
            let settings = ArcSettings {
                mm_per_segment,
                ..ArcSettings::default()
            };
            let plan = plan_arc(&start(), &request, &settings).unwrap();
            assert_eq!(plan.segments(), MAX_SEGMENTS, "{mm_per_segment}");
        }
    }

    #[test]
    fn tiny_arc_is_skipped() {
        let request = ArcRequest {
            target: ToolPosition::new(10.0, 0.0001, 0.0, 0.0),
            offset: (-10.0, 0.0),
            plane: Plane::XY,
            clockwise: false,
        };
        assert!(plan_arc(&start(), &request, &ArcSettings::default()).is_none());
    }
}
