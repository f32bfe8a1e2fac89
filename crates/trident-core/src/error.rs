use crate::{homing::HomingPhase, position::Tower};
use thiserror::Error;

/// Parameter combinations that make the forward transform unsolvable.
///
/// These are detected when parameters are applied, never at move time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("geometry parameter `{name}` is not finite")]
    NotFinite { name: &'static str },

    #[error("geometry parameter `{name}` must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error(
        "tower {tower} rod {rod:.3}mm cannot reach the printable edge, at least {required:.3}mm required"
    )]
    RodTooShort { tower: Tower, rod: f64, required: f64 },

    #[error("tower positions are collinear, trilateration is undefined")]
    CollinearTowers,

    #[error("segments per line must be at least 1")]
    ZeroSegmentsPerLine,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotionError {
    #[error("position X{x:.3} Y{y:.3} Z{z:.3} is unreachable")]
    UnreachableGeometry { x: f64, y: f64, z: f64 },

    #[error("endstop did not trigger during {phase}")]
    HomingValidationFailure { phase: HomingPhase },

    #[error(transparent)]
    ConfigurationDomain(#[from] GeometryError),

    #[error("all {capacity} stored position slots are in use")]
    StoredSlotsFull { capacity: usize },

    #[error("no stored position to restore")]
    StoredSlotsEmpty,
}

pub type Result<T, E = MotionError> = std::result::Result<T, E>;
