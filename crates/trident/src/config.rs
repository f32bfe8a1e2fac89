use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use trident_core::{
    CarriagePosition, DeltaKinematics, GeometryParameters,
    arc::ArcSettings,
    homing::HomingSettings,
    interfaces::DynamicLimits,
    sim::SimConfig,
};

/// Machine description for the simulated printer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Delta geometry
    #[serde(default)]
    pub geometry: GeometryParameters,

    /// Homing sequence tuning
    #[serde(default)]
    pub homing: HomingSettings,

    /// Feedrate and planner limits
    #[serde(default)]
    pub motion: MotionConfig,

    /// Arc interpolation
    #[serde(default)]
    pub arc: ArcSettings,

    /// Simulated printer behavior
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Motion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Default feedrate for moves that do not name one (mm/s)
    #[serde(default = "default_feedrate")]
    pub feedrate_mm_s: f64,

    /// Feedrate override in percent
    #[serde(default = "default_feedrate_percentage")]
    pub feedrate_percentage: u16,

    /// Per-tower acceleration limit (mm/s²)
    #[serde(default = "default_max_acceleration")]
    pub max_acceleration: [f64; 3],

    /// Per-tower jerk limit (mm/s)
    #[serde(default = "default_max_jerk")]
    pub max_jerk: [f64; 3],
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            feedrate_mm_s: default_feedrate(),
            feedrate_percentage: default_feedrate_percentage(),
            max_acceleration: default_max_acceleration(),
            max_jerk: default_max_jerk(),
        }
    }
}

impl MotionConfig {
    pub fn dynamics(&self) -> DynamicLimits {
        DynamicLimits {
            max_acceleration: self.max_acceleration,
            max_jerk: self.max_jerk,
        }
    }
}

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Segments buffered before the oldest one executes
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Clamp destinations onto the printable radius
    #[serde(default = "default_soft_limits")]
    pub soft_limits: bool,

    /// Keep endstops armed outside homing
    #[serde(default)]
    pub endstops_always_on: bool,

    /// How far each physical switch sits above its ideal height (mm)
    #[serde(default)]
    pub switch_error_mm: [f64; 3],

    /// Refuse segments once this many have been accepted
    pub accept_limit: Option<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            soft_limits: default_soft_limits(),
            endstops_always_on: false,
            switch_error_mm: [0.0; 3],
            accept_limit: None,
        }
    }
}

impl SimulationConfig {
    /// Simulator settings for a printer built around `kinematics`.
    pub fn build(&self, kinematics: &DeltaKinematics) -> trident_core::Result<SimConfig> {
        let ideal = SimConfig::for_delta(kinematics)?;
        let switch_heights =
            CarriagePosition::from_fn(|t| ideal.switch_heights[t] + self.switch_error_mm[t.index()]);
        Ok(SimConfig {
            switch_heights,
            queue_capacity: self.queue_capacity,
            soft_limits: self.soft_limits,
            endstops_always_on: self.endstops_always_on,
            accept_limit: self.accept_limit,
            ..ideal
        })
    }
}

fn default_feedrate() -> f64 {
    25.0
}

fn default_feedrate_percentage() -> u16 {
    100
}

fn default_max_acceleration() -> [f64; 3] {
    [3000.0; 3]
}

fn default_max_jerk() -> [f64; 3] {
    [10.0; 3]
}

fn default_queue_capacity() -> usize {
    16
}

fn default_soft_limits() -> bool {
    true
}

impl Config {
    /// Load configuration from a file, auto-detecting TOML or JSON format
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content).or_else(|_| Self::from_json(&content)),
        }
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse config as TOML")
    }

    /// Parse configuration from JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("failed to parse config as JSON")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.geometry.validate().context("invalid [geometry]")?;

        let homing = &self.homing;
        if homing.feedrate_mm_s.is_nan() || homing.feedrate_mm_s <= 0.0 {
            anyhow::bail!("homing.feedrate_mm_s must be positive");
        }
        if homing.seek_factor < 1.0 {
            anyhow::bail!("homing.seek_factor must be at least 1");
        }
        if homing.bump_mm.iter().any(|b| *b < 0.0) {
            anyhow::bail!("homing.bump_mm cannot be negative");
        }

        if self.motion.feedrate_mm_s.is_nan() || self.motion.feedrate_mm_s <= 0.0 {
            anyhow::bail!("motion.feedrate_mm_s must be positive");
        }
        if self.motion.feedrate_percentage == 0 {
            anyhow::bail!("motion.feedrate_percentage cannot be 0");
        }

        if self.arc.mm_per_segment.is_nan() || self.arc.mm_per_segment <= 0.0 {
            anyhow::bail!("arc.mm_per_segment must be positive");
        }

        if self.simulation.queue_capacity == 0 {
            anyhow::bail!("simulation.queue_capacity cannot be 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[geometry]
diagonal_rod = 250.0
radius = 124.0
print_radius = 110.0
probe_radius = 100.0
endstop_adj = [-0.4, 0.0, -0.15]

[homing]
bump_mm = [0.0, 0.0, 0.0]
home_to_safe_zone = true

[arc]
mm_per_segment = 0.5
"#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.geometry.diagonal_rod, 250.0);
        assert_eq!(config.geometry.endstop_adj, [-0.4, 0.0, -0.15]);
        assert_eq!(config.geometry.height, 350.0);
        assert!(config.homing.home_to_safe_zone);
        assert_eq!(config.homing.feedrate_mm_s, 100.0);
        assert_eq!(config.arc.mm_per_segment, 0.5);
        assert_eq!(config.arc.correction_interval, 25);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "motion": { "feedrate_mm_s": 60.0, "feedrate_percentage": 50 },
            "simulation": { "switch_error_mm": [0.2, 0.0, -0.1], "accept_limit": 40 }
        }"#;

        let config = Config::from_json(json).unwrap();
        assert_eq!(config.motion.feedrate_mm_s, 60.0);
        assert_eq!(config.motion.feedrate_percentage, 50);
        assert_eq!(config.motion.max_jerk, [10.0; 3]);
        assert_eq!(config.simulation.accept_limit, Some(40));
        assert!(config.simulation.soft_limits);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.geometry, GeometryParameters::default());
        assert_eq!(config.homing, HomingSettings::default());
        assert_eq!(config.simulation.queue_capacity, 16);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_short_rods() {
        let config = Config::from_toml("[geometry]\ndiagonal_rod = 200.0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("[geometry]"), "{err:#}");
    }

    #[test]
    fn test_validate_rejects_zero_arc_segment() {
        let config = Config::from_toml("[arc]\nmm_per_segment = 0.0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "arc.mm_per_segment must be positive");
    }

    #[test]
    fn test_switch_error_moves_switches() {
        let config = Config::from_toml("[simulation]\nswitch_error_mm = [0.5, 0.0, 0.0]\n").unwrap();
        let kinematics = DeltaKinematics::new(config.geometry.clone()).unwrap();
        let ideal = SimConfig::for_delta(&kinematics).unwrap();
        let sim = config.simulation.build(&kinematics).unwrap();
        assert_eq!(sim.switch_heights.a, ideal.switch_heights.a + 0.5);
        assert_eq!(sim.switch_heights.b, ideal.switch_heights.b);
        assert_eq!(sim.start, ideal.start);
    }
}
