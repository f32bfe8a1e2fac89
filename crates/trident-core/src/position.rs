//! Tool-space and carriage-space positions and the store that tracks them.
//!
//! `current` is the last position the motion sink is known to be driving
//! toward and `destination` is the target of the move being planned. Both are
//! logical coordinates; leveling is applied only when a point is converted to
//! carriages. Carriage positions only ever appear at the boundary with the
//! kinematics and the sink.

use crate::error::{MotionError, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    ops::{Add, AddAssign, Index, IndexMut, Mul, Sub},
};

/// Number of positions that can be saved for a later resume.
pub const STORED_POSITION_SLOTS: usize = 3;

/// Logical axis in tool space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
    E,
}

impl Axis {
    pub const LINEAR: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Parse axis from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "x" => Some(Axis::X),
            "y" => Some(Axis::Y),
            "z" => Some(Axis::Z),
            "e" => Some(Axis::E),
            _ => None,
        }
    }

    pub const fn code(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::E => 'E',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One of the three vertical actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tower {
    A,
    B,
    C,
}

impl Tower {
    pub const ALL: [Tower; 3] = [Tower::A, Tower::B, Tower::C];

    pub const fn index(self) -> usize {
        match self {
            Tower::A => 0,
            Tower::B => 1,
            Tower::C => 2,
        }
    }

    /// The tool-space axis whose homed flag this tower's homing establishes.
    pub const fn axis(self) -> Axis {
        match self {
            Tower::A => Axis::X,
            Tower::B => Axis::Y,
            Tower::C => Axis::Z,
        }
    }
}

impl fmt::Display for Tower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tower::A => "A",
            Tower::B => "B",
            Tower::C => "C",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub e: f64,
}

impl ToolPosition {
    pub const ZERO: ToolPosition = ToolPosition::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64, e: f64) -> Self {
        Self { x, y, z, e }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
            Axis::E => self.e,
        }
    }

    pub fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
            Axis::E => self.e = value,
        }
    }

    /// Euclidean length of the XYZ part.
    pub fn xyz_length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn with_xyz(self, x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z, ..self }
    }
}

impl Add for ToolPosition {
    type Output = ToolPosition;

    fn add(self, rhs: ToolPosition) -> ToolPosition {
        ToolPosition::new(
            self.x + rhs.x,
            self.y + rhs.y,
            self.z + rhs.z,
            self.e + rhs.e,
        )
    }
}

impl AddAssign for ToolPosition {
    fn add_assign(&mut self, rhs: ToolPosition) {
        *self = *self + rhs;
    }
}

impl Sub for ToolPosition {
    type Output = ToolPosition;

    fn sub(self, rhs: ToolPosition) -> ToolPosition {
        ToolPosition::new(
            self.x - rhs.x,
            self.y - rhs.y,
            self.z - rhs.z,
            self.e - rhs.e,
        )
    }
}

impl Mul<f64> for ToolPosition {
    type Output = ToolPosition;

    fn mul(self, rhs: f64) -> ToolPosition {
        ToolPosition::new(self.x * rhs, self.y * rhs, self.z * rhs, self.e * rhs)
    }
}

/// Carriage heights on towers A, B and C.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CarriagePosition {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl CarriagePosition {
    pub const fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    pub fn from_fn(mut f: impl FnMut(Tower) -> f64) -> Self {
        Self::new(f(Tower::A), f(Tower::B), f(Tower::C))
    }
}

impl Index<Tower> for CarriagePosition {
    type Output = f64;

    fn index(&self, tower: Tower) -> &f64 {
        match tower {
            Tower::A => &self.a,
            Tower::B => &self.b,
            Tower::C => &self.c,
        }
    }
}

impl IndexMut<Tower> for CarriagePosition {
    fn index_mut(&mut self, tower: Tower) -> &mut f64 {
        match tower {
            Tower::A => &mut self.a,
            Tower::B => &mut self.b,
            Tower::C => &mut self.c,
        }
    }
}

/// Per-axis homed state for X, Y and Z.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HomedFlags(u8);

impl HomedFlags {
    const fn bit(axis: Axis) -> u8 {
        match axis {
            Axis::X => 1 << 0,
            Axis::Y => 1 << 1,
            Axis::Z => 1 << 2,
            Axis::E => 0,
        }
    }

    pub const fn new() -> Self {
        Self(0)
    }

    pub fn set(&mut self, axis: Axis, homed: bool) {
        if homed {
            self.0 |= Self::bit(axis);
        } else {
            self.0 &= !Self::bit(axis);
        }
    }

    pub const fn is_homed(&self, axis: Axis) -> bool {
        let bit = Self::bit(axis);
        bit != 0 && self.0 & bit != 0
    }

    pub const fn all_homed(&self) -> bool {
        self.0 & 0b111 == 0b111
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Current/destination state, saved positions, homed flags and feedrate.
#[derive(Debug, Clone)]
pub struct PositionStore {
    pub current: ToolPosition,
    pub destination: ToolPosition,
    stored: Vec<ToolPosition>,
    homed: HomedFlags,
    /// Requested feedrate in mm/s.
    pub feedrate_mm_s: f64,
    /// Feedrate override, 100 means unscaled.
    pub feedrate_percentage: u16,
    pub active_tool: u8,
}

impl Default for PositionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionStore {
    pub fn new() -> Self {
        Self {
            current: ToolPosition::ZERO,
            destination: ToolPosition::ZERO,
            stored: Vec::with_capacity(STORED_POSITION_SLOTS),
            homed: HomedFlags::new(),
            feedrate_mm_s: 25.0,
            feedrate_percentage: 100,
            active_tool: 0,
        }
    }

    /// `feedrate` scaled by the feedrate override.
    pub fn scaled_feedrate(&self, feedrate_mm_s: f64) -> f64 {
        feedrate_mm_s * f64::from(self.feedrate_percentage) * 0.01
    }

    pub fn set_current_to_destination(&mut self) {
        self.current = self.destination;
    }

    pub fn sync_destination_to_current(&mut self) {
        self.destination = self.current;
    }

    pub fn push_stored(&mut self, position: ToolPosition) -> Result<()> {
        if self.stored.len() >= STORED_POSITION_SLOTS {
            return Err(MotionError::StoredSlotsFull {
                capacity: STORED_POSITION_SLOTS,
            });
        }
        self.stored.push(position);
        Ok(())
    }

    pub fn pop_stored(&mut self) -> Result<ToolPosition> {
        self.stored.pop().ok_or(MotionError::StoredSlotsEmpty)
    }

    pub fn stored_len(&self) -> usize {
        self.stored.len()
    }

    pub fn homed(&self) -> HomedFlags {
        self.homed
    }

    pub fn set_homed(&mut self, axis: Axis, homed: bool) {
        self.homed.set(axis, homed);
    }

    pub fn clear_homed(&mut self) {
        self.homed.clear();
    }

    /// Axes among those requested that still need homing, or `None` when
    /// every requested axis is homed.
    pub fn axis_unhomed_error(&self, axes: &[Axis]) -> Option<String> {
        let missing: String = axes
            .iter()
            .filter(|axis| !self.homed.is_homed(**axis))
            .map(|axis| axis.code())
            .collect();
        if missing.is_empty() {
            None
        } else {
            Some(format!("home {missing} first"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_parse() {
        assert_eq!(Axis::parse("x"), Some(Axis::X));
        assert_eq!(Axis::parse("E"), Some(Axis::E));
        assert_eq!(Axis::parse("w"), None);
    }

    #[test]
    fn carriage_indexing_matches_fields() {
        let mut carriage = CarriagePosition::from_fn(|t| t.index() as f64);
        assert_eq!(carriage[Tower::C], 2.0);
        carriage[Tower::B] = 7.5;
        assert_eq!(carriage.b, 7.5);
    }

    #[test]
    fn homed_flags_track_linear_axes_only() {
        let mut flags = HomedFlags::new();
        flags.set(Axis::X, true);
        flags.set(Axis::E, true);
        assert!(flags.is_homed(Axis::X));
        assert!(!flags.is_homed(Axis::E));
        assert!(!flags.all_homed());
        flags.set(Axis::Y, true);
        flags.set(Axis::Z, true);
        assert!(flags.all_homed());
        flags.clear();
        assert!(!flags.is_homed(Axis::Y));
    }

    #[test]
    fn stored_slots_are_a_bounded_stack() {
        let mut store = PositionStore::new();
        for i in 0..STORED_POSITION_SLOTS {
            store
                .push_stored(ToolPosition::new(i as f64, 0.0, 0.0, 0.0))
                .unwrap();
        }
        assert_eq!(
            store.push_stored(ToolPosition::ZERO),
            Err(MotionError::StoredSlotsFull {
                capacity: STORED_POSITION_SLOTS
            })
        );
        assert_eq!(store.pop_stored().unwrap().x, 2.0);
        assert_eq!(store.stored_len(), 2);
        store.pop_stored().unwrap();
        store.pop_stored().unwrap();
        assert_eq!(store.pop_stored(), Err(MotionError::StoredSlotsEmpty));
    }

    #[test]
    fn unhomed_error_lists_missing_axes() {
        let mut store = PositionStore::new();
        store.set_homed(Axis::Y, true);
        assert_eq!(
            store.axis_unhomed_error(&Axis::LINEAR).as_deref(),
            Some("home XZ first")
        );
        store.set_homed(Axis::X, true);
        store.set_homed(Axis::Z, true);
        assert_eq!(store.axis_unhomed_error(&Axis::LINEAR), None);
    }

    #[test]
    fn feedrate_override_scales() {
        let mut store = PositionStore::new();
        store.feedrate_percentage = 50;
        assert_eq!(store.scaled_feedrate(100.0), 50.0);
    }
}
