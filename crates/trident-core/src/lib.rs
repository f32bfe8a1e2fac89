//! Motion-control core for delta printers.
//!
//! Converts tool-space moves into carriage-space segments, interpolates
//! arcs and runs the homing sequence. The planner, endstops and optional
//! bed leveling are reached through the traits in [`interfaces`]; this crate
//! does no I/O of its own beyond `tracing` events.

pub mod arc;
pub mod error;
pub mod geometry;
pub mod homing;
pub mod interfaces;
pub mod kinematics;
pub mod machine;
pub mod position;
pub mod report;
pub mod segment;
pub mod sim;

pub use error::{GeometryError, MotionError, Result};
pub use geometry::{GeometryCache, GeometryParameters};
pub use kinematics::{CalibrationParameter, DeltaKinematics, Kinematics};
pub use machine::MachineState;
pub use position::{Axis, CarriagePosition, ToolPosition, Tower};
