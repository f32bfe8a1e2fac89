// Kinematics strategy shared by movement and homing

use crate::{
    error::Result,
    position::{CarriagePosition, ToolPosition, Tower},
};

pub mod delta;

pub use delta::{CalibrationParameter, DeltaKinematics};

/// Mapping between tool space and actuator space.
///
/// Selected once at startup; segmentation, arcs and homing are generic over
/// it.
pub trait Kinematics {
    /// Tool point to carriage heights.
    fn forward(&self, tool: &ToolPosition) -> Result<CarriagePosition>;

    /// Carriage heights to tool point. The extruder component is left at 0.
    fn inverse(&self, carriage: &CarriagePosition) -> Result<ToolPosition>;

    /// Whether the nozzle may visit (x, y).
    fn is_reachable(&self, x: f64, y: f64) -> bool;

    /// Whether both the nozzle point and the probe point offset from it are
    /// reachable.
    fn is_reachable_by_probe(&self, x: f64, y: f64, probe_offset: (f64, f64)) -> bool {
        self.is_reachable(x, y) && self.is_reachable(x - probe_offset.0, y - probe_offset.1)
    }

    /// Height above which the reachable XY area shrinks.
    fn clip_start_height(&self) -> f64;

    fn segments_per_second(&self) -> f64;

    fn segments_per_line(&self) -> u16;

    /// Tool position assigned once every tower has homed.
    fn home_position(&self) -> ToolPosition;

    /// Post-homing correction for one tower's endstop.
    fn endstop_adjustment(&self, tower: Tower) -> f64;

    /// Travel long enough to reach any endstop from anywhere in the envelope.
    fn homing_travel(&self) -> f64;
}
