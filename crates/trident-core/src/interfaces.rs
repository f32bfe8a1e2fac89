//! Contracts with the collaborators around the motion core: the planner that
//! consumes carriage segments, the endstops, optional bed leveling and
//! sensorless homing, the idle callback and report output.

use crate::position::{CarriagePosition, ToolPosition, Tower};
use std::time::{Duration, Instant};

/// Wall-clock cadence for servicing the idle hook during long operations.
pub const IDLE_INTERVAL: Duration = Duration::from_millis(200);

/// One straight move in carriage space handed to the planner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub carriage: CarriagePosition,
    pub extruder: f64,
    pub feedrate_mm_s: f64,
    pub tool_index: u8,
    /// Tool-space length of the sub-move, when it came out of segmentation
    pub length_hint_mm: Option<f64>,
}

/// Acceleration and jerk limits per linear axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicLimits {
    /// mm/s²
    pub max_acceleration: [f64; 3],
    /// mm/s
    pub max_jerk: [f64; 3],
}

impl Default for DynamicLimits {
    fn default() -> Self {
        Self {
            max_acceleration: [3000.0; 3],
            max_jerk: [10.0; 3],
        }
    }
}

/// Downstream planner / step generator.
pub trait MotionSink {
    /// Queue a segment. `false` means the planner refused it.
    fn enqueue_segment(&mut self, segment: &Segment) -> bool;

    /// Block until every queued segment has executed.
    fn synchronize(&mut self, idle: &mut dyn IdleHook);

    /// Carriage height derived from the stepper counts.
    fn read_actual_position(&self, tower: Tower) -> f64;

    /// Override the planner position without moving.
    fn set_position(&mut self, tool: &ToolPosition, carriage: &CarriagePosition);

    /// Override the planner position in machine space only.
    fn set_carriage_position(&mut self, carriage: &CarriagePosition);

    fn dynamics(&self) -> DynamicLimits;

    fn set_dynamics(&mut self, limits: DynamicLimits);

    fn power_on(&mut self);
}

pub trait EndstopMonitor {
    fn is_triggered(&self, tower: Tower) -> bool;

    fn enable(&mut self, enabled: bool);

    fn soft_limits_enabled(&self) -> bool;

    /// Pull `position` back inside the software limits when they are active.
    fn clamp_to_soft_limits(&self, position: &mut ToolPosition);

    /// Whether an endstop triggered since the last call.
    fn validate_homing_move(&mut self) -> bool;

    /// Enter or leave homing mode. Leaving restores the global enable state.
    fn set_homing(&mut self, homing: bool);
}

/// Bed leveling correction applied to tool positions before the transform.
pub trait LevelingCorrection {
    fn apply(&self, position: &mut ToolPosition);

    fn unapply(&self, position: &mut ToolPosition);

    /// Returns the previous state.
    fn set_enabled(&mut self, enabled: bool) -> bool;

    fn is_enabled(&self) -> bool;
}

/// Stand-in when the machine has no bed leveling.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLeveling;

impl LevelingCorrection for NoLeveling {
    fn apply(&self, _position: &mut ToolPosition) {}

    fn unapply(&self, _position: &mut ToolPosition) {}

    fn set_enabled(&mut self, _enabled: bool) -> bool {
        false
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Driver-level stall detection used as an endstop.
pub trait SensorlessHoming {
    /// Switch the tower's driver to stall detection, returning whether it
    /// was in stealth mode.
    fn enable(&mut self, tower: Tower) -> bool;

    fn restore(&mut self, tower: Tower, stealth: bool);
}

/// Stand-in when the machine homes on physical switches.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSensorless;

impl SensorlessHoming for NoSensorless {
    fn enable(&mut self, _tower: Tower) -> bool {
        false
    }

    fn restore(&mut self, _tower: Tower, _stealth: bool) {}
}

/// Housekeeping callback serviced during long operations.
pub trait IdleHook {
    fn idle(&mut self);
}

// Null implementation for callers with nothing to service
impl IdleHook for () {
    fn idle(&mut self) {}
}

impl<F: FnMut()> IdleHook for F {
    fn idle(&mut self) {
        self()
    }
}

/// Rate limiter in front of an [`IdleHook`].
#[derive(Debug, Clone)]
pub struct IdleThrottle {
    interval: Duration,
    next: Instant,
}

impl Default for IdleThrottle {
    fn default() -> Self {
        Self::new(IDLE_INTERVAL)
    }
}

impl IdleThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now() + interval,
        }
    }

    /// Call `hook` if the interval has elapsed since it last ran.
    pub fn poll(&mut self, hook: &mut dyn IdleHook) {
        let now = Instant::now();
        if now >= self.next {
            self.next = now + self.interval;
            hook.idle();
        }
    }
}

/// Line-oriented output for human-readable reports.
pub trait ReportSink {
    fn line(&mut self, line: &str);
}

impl ReportSink for Vec<String> {
    fn line(&mut self, line: &str) {
        self.push(line.to_owned());
    }
}

/// Emits report lines as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReport;

impl ReportSink for TracingReport {
    fn line(&mut self, line: &str) {
        tracing::info!(target: "trident::report", "{line}");
    }
}
