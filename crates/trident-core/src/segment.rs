//! Straight-line move subdivision.
//!
//! A straight line in tool space is a curve in carriage space, so XY moves
//! are cut into sub-moves short enough that the planner's straight carriage
//! segments stay close to the intended path. Pure vertical and extruder-only
//! moves are straight in both spaces and go through as one segment.

use crate::{
    error::{MotionError, Result},
    interfaces::{EndstopMonitor, IdleHook, IdleThrottle, LevelingCorrection, MotionSink, Segment},
    kinematics::Kinematics,
    position::{CarriagePosition, ToolPosition},
};
use std::fmt;
use tracing::{debug, warn};

/// Distances below this are treated as zero.
pub const MIN_DISTANCE_MM: f64 = 1e-6;

/// Upper bound on the sub-moves one move or arc is cut into.
pub const MAX_SEGMENTS: usize = u16::MAX as usize;

/// Result of handing a move to the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Completed { segments: usize },
    /// Nothing to do, no segment was queued
    DegenerateMove,
    /// The sink refused a segment; the accepted prefix stands
    SinkBackpressureStop { accepted: usize, planned: usize },
}

impl MoveOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, MoveOutcome::Completed { .. })
    }
}

impl fmt::Display for MoveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveOutcome::Completed { segments } => write!(f, "completed in {segments} segments"),
            MoveOutcome::DegenerateMove => f.write_str("nothing to move"),
            MoveOutcome::SinkBackpressureStop { accepted, planned } => {
                write!(f, "stopped after {accepted} of {planned} segments")
            }
        }
    }
}

/// Outcome plus the last position the sink accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Execution {
    pub outcome: MoveOutcome,
    pub reached: ToolPosition,
}

/// Everything needed to turn tool positions into queued segments.
pub struct MotionContext<'a, K: ?Sized> {
    pub kinematics: &'a K,
    pub endstops: &'a dyn EndstopMonitor,
    pub leveling: &'a dyn LevelingCorrection,
    pub sink: &'a mut dyn MotionSink,
    pub idle: &'a mut dyn IdleHook,
    pub throttle: &'a mut IdleThrottle,
    pub tool_index: u8,
}

impl<K: Kinematics + ?Sized> MotionContext<'_, K> {
    /// Carriage target for a logical position, leveling applied.
    pub fn carriage_for(&self, point: &ToolPosition) -> Result<CarriagePosition> {
        let mut leveled = *point;
        if self.leveling.is_enabled() {
            self.leveling.apply(&mut leveled);
        }
        self.kinematics.forward(&leveled)
    }

    /// Transform and queue one point. `Ok(false)` when the sink refused it.
    pub fn enqueue(
        &mut self,
        point: &ToolPosition,
        feedrate_mm_s: f64,
        length_hint_mm: Option<f64>,
    ) -> Result<bool> {
        let segment = Segment {
            carriage: self.carriage_for(point)?,
            extruder: point.e,
            feedrate_mm_s,
            tool_index: self.tool_index,
            length_hint_mm,
        };
        Ok(self.sink.enqueue_segment(&segment))
    }

    pub fn poll_idle(&mut self) {
        self.throttle.poll(&mut *self.idle);
    }

    /// Queue `points` in order, stopping at the first refusal.
    pub fn enqueue_all(
        &mut self,
        start: ToolPosition,
        points: impl Iterator<Item = ToolPosition>,
        planned: usize,
        feedrate_mm_s: f64,
        length_hint_mm: Option<f64>,
    ) -> Result<Execution> {
        let mut reached = start;
        for (accepted, point) in points.enumerate() {
            self.poll_idle();
            if !self.enqueue(&point, feedrate_mm_s, length_hint_mm)? {
                warn!(accepted, planned, "planner refused segment, move truncated");
                return Ok(Execution {
                    outcome: MoveOutcome::SinkBackpressureStop { accepted, planned },
                    reached,
                });
            }
            reached = point;
        }
        Ok(Execution {
            outcome: MoveOutcome::Completed { segments: planned },
            reached,
        })
    }
}

/// How a straight move will be cut up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPlan {
    pub start: ToolPosition,
    pub end: ToolPosition,
    pub feedrate_mm_s: f64,
    /// Number of sub-moves, at least 1
    pub lines: usize,
    /// `None` for pass-through moves
    pub length_hint_mm: Option<f64>,
}

impl SegmentPlan {
    /// Whether the move has a horizontal component.
    pub fn has_xy(&self) -> bool {
        self.end.x != self.start.x || self.end.y != self.start.y
    }

    /// Intermediate points followed by exactly `end`.
    pub fn points(&self) -> impl Iterator<Item = ToolPosition> + '_ {
        let delta = self.end - self.start;
        let lines = self.lines as f64;
        (1..self.lines)
            .map(move |i| self.start + delta * (i as f64 / lines))
            .chain(std::iter::once(self.end))
    }
}

/// Plans and runs straight moves.
#[derive(Debug, Default)]
pub struct MoveSegmenter;

impl MoveSegmenter {
    /// Cut a move from `start` to `end`. `None` for a zero-length move.
    pub fn plan<K: Kinematics + ?Sized>(
        kinematics: &K,
        start: &ToolPosition,
        end: &ToolPosition,
        feedrate_mm_s: f64,
    ) -> Option<SegmentPlan> {
        let delta = *end - *start;

        let mut distance = delta.xyz_length();
        if distance < MIN_DISTANCE_MM {
            distance = delta.e.abs();
        }
        // applies to pure Z moves too: a sub-micron lift with no E is dropped
        if distance < MIN_DISTANCE_MM {
            return None;
        }

        let mut plan = SegmentPlan {
            start: *start,
            end: *end,
            feedrate_mm_s,
            lines: 1,
            length_hint_mm: None,
        };
        if !plan.has_xy() {
            return Some(plan);
        }

        let seconds = if feedrate_mm_s > 0.0 {
            distance / feedrate_mm_s
        } else {
            0.0
        };
        let segments = ((kinematics.segments_per_second() * seconds)
            .floor()
            .min(MAX_SEGMENTS as f64) as usize)
            .max(1);
        let per_line = usize::from(kinematics.segments_per_line().max(1));
        plan.lines = segments.div_ceil(per_line);
        plan.length_hint_mm = Some(distance / plan.lines as f64);

        debug!(
            distance,
            segments,
            lines = plan.lines,
            "segmented move"
        );
        Some(plan)
    }

    /// Plan and queue a move.
    ///
    /// Rejects the move before anything is queued if the destination lies
    /// outside the soft limits or either endpoint has no forward solution.
    pub fn run<K: Kinematics + ?Sized>(
        ctx: &mut MotionContext<'_, K>,
        start: &ToolPosition,
        end: &ToolPosition,
        feedrate_mm_s: f64,
    ) -> Result<Execution> {
        let Some(plan) = Self::plan(ctx.kinematics, start, end, feedrate_mm_s) else {
            return Ok(Execution {
                outcome: MoveOutcome::DegenerateMove,
                reached: *start,
            });
        };

        if plan.has_xy()
            && ctx.endstops.soft_limits_enabled()
            && !ctx.kinematics.is_reachable(end.x, end.y)
        {
            warn!(x = end.x, y = end.y, "destination outside printable area");
            return Err(MotionError::UnreachableGeometry {
                x: end.x,
                y: end.y,
                z: end.z,
            });
        }

        // the rod radicand is concave along a line, so the endpoints bound it
        ctx.carriage_for(start)?;
        ctx.carriage_for(end)?;

        ctx.enqueue_all(
            *start,
            plan.points(),
            plan.lines,
            plan.feedrate_mm_s,
            plan.length_hint_mm,
        )
    }
}
