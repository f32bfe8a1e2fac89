//! Machine geometry parameters and the constants derived from them.
//!
//! Tower A sits at 210°, tower B at 330° and tower C at 90°, each offset by
//! its angle adjustment and placed at `radius + tower_radius_adj` from the
//! centre. Everything in [`GeometryCache`] is a pure function of
//! [`GeometryParameters`]; callers batch parameter writes and recompute once.

use crate::{error::GeometryError, position::Tower};
use serde::{Deserialize, Serialize};

const TOWER_BASE_ANGLE_DEG: [f64; 3] = [210.0, 330.0, 90.0];
const COLLINEAR_EPSILON: f64 = 1e-9;

/// Raw delta geometry as configured or calibrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryParameters {
    /// Diagonal rod length (mm)
    pub diagonal_rod: f64,

    /// Horizontal distance from the effector centre to each tower (mm)
    pub radius: f64,

    /// Per-tower endstop trigger correction (mm), applied after homing
    pub endstop_adj: [f64; 3],

    /// Per-tower angular correction (degrees)
    pub tower_angle_adj: [f64; 3],

    /// Per-tower radius correction (mm)
    pub tower_radius_adj: [f64; 3],

    /// Per-tower rod length correction (mm)
    pub diagonal_rod_adj: [f64; 3],

    /// Radius of the printable disc (mm)
    pub print_radius: f64,

    /// Radius the probe may visit (mm), never beyond `print_radius`
    pub probe_radius: f64,

    /// Nozzle height above the bed with all carriages homed (mm)
    pub height: f64,

    /// Target number of straight sub-moves per second of travel
    pub segments_per_second: f64,

    /// Number of segments grouped into one planner line
    pub segments_per_line: u16,
}

impl Default for GeometryParameters {
    fn default() -> Self {
        Self {
            diagonal_rod: 300.0,
            radius: 150.0,
            endstop_adj: [0.0; 3],
            tower_angle_adj: [0.0; 3],
            tower_radius_adj: [0.0; 3],
            diagonal_rod_adj: [0.0; 3],
            print_radius: 140.0,
            probe_radius: 120.0,
            height: 350.0,
            segments_per_second: 200.0,
            segments_per_line: 5,
        }
    }
}

impl GeometryParameters {
    /// Reject combinations whose forward transform is unsolvable somewhere
    /// inside the printable disc.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let scalars = [
            ("diagonal_rod", self.diagonal_rod),
            ("radius", self.radius),
            ("print_radius", self.print_radius),
            ("probe_radius", self.probe_radius),
            ("height", self.height),
            ("segments_per_second", self.segments_per_second),
        ];
        let triples = [
            ("endstop_adj", self.endstop_adj),
            ("tower_angle_adj", self.tower_angle_adj),
            ("tower_radius_adj", self.tower_radius_adj),
            ("diagonal_rod_adj", self.diagonal_rod_adj),
        ];

        for (name, value) in scalars {
            if !value.is_finite() {
                return Err(GeometryError::NotFinite { name });
            }
        }
        for (name, values) in triples {
            if values.iter().any(|v| !v.is_finite()) {
                return Err(GeometryError::NotFinite { name });
            }
        }
        for (name, value) in scalars {
            if value <= 0.0 {
                return Err(GeometryError::NotPositive { name, value });
            }
        }
        if self.segments_per_line == 0 {
            return Err(GeometryError::ZeroSegmentsPerLine);
        }

        let cache = GeometryCache::recompute(self);
        if cache.q.abs() < COLLINEAR_EPSILON {
            return Err(GeometryError::CollinearTowers);
        }

        // The farthest printable point from a tower lies on the line through
        // the centre, on the opposite edge of the disc.
        for tower in Tower::ALL {
            let i = tower.index();
            let rod = self.diagonal_rod + self.diagonal_rod_adj[i];
            let required = cache.tower_x[i].hypot(cache.tower_y[i]) + self.print_radius;
            if rod < required {
                return Err(GeometryError::RodTooShort {
                    tower,
                    rod,
                    required,
                });
            }
        }

        Ok(())
    }
}

/// Constants derived from [`GeometryParameters`] for the transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryCache {
    /// Squared effective rod length per tower
    pub rod_sq: [f64; 3],
    pub tower_x: [f64; 3],
    pub tower_y: [f64; 3],
    pub x_bc: f64,
    pub x_ca: f64,
    pub x_ab: f64,
    pub y_bc: f64,
    pub y_ca: f64,
    pub y_ab: f64,
    pub q: f64,
    pub q2: f64,
    pub core_ka: f64,
    pub core_kb: f64,
    pub core_kc: f64,
    /// Soft endstop radius squared
    pub print_radius_sq: f64,
    pub print_radius: f64,
    /// Probe radius clamped to the printable radius
    pub probe_radius: f64,
    /// Height above which XY travel has to shrink
    pub clip_start_height: f64,
}

impl GeometryCache {
    pub fn recompute(params: &GeometryParameters) -> Self {
        let mut rod_sq = [0.0; 3];
        let mut tower_x = [0.0; 3];
        let mut tower_y = [0.0; 3];

        for i in 0..3 {
            let rod = params.diagonal_rod + params.diagonal_rod_adj[i];
            rod_sq[i] = rod * rod;

            let angle = (TOWER_BASE_ANGLE_DEG[i] + params.tower_angle_adj[i]).to_radians();
            let radius = params.radius + params.tower_radius_adj[i];
            tower_x[i] = angle.cos() * radius;
            tower_y[i] = angle.sin() * radius;
        }

        let [ax, bx, cx] = tower_x;
        let [ay, by, cy] = tower_y;

        let x_bc = cx - bx;
        let x_ca = ax - cx;
        let x_ab = bx - ax;
        let y_bc = cy - by;
        let y_ca = ay - cy;
        let y_ab = by - ay;

        let q = 2.0 * (x_ab * cy + x_ca * by + x_bc * ay);
        let q2 = q * q;

        let core_fa = ax * ax + ay * ay;
        let core_fb = bx * bx + by * by;
        let core_fc = cx * cx + cy * cy;

        let [d2a, d2b, d2c] = rod_sq;
        let core_ka = (d2b - d2c) + (core_fc - core_fb);
        let core_kb = (d2c - d2a) + (core_fa - core_fc);
        let core_kc = (d2a - d2b) + (core_fb - core_fa);

        let mut cache = Self {
            rod_sq,
            tower_x,
            tower_y,
            x_bc,
            x_ca,
            x_ab,
            y_bc,
            y_ca,
            y_ab,
            q,
            q2,
            core_ka,
            core_kb,
            core_kc,
            print_radius_sq: params.print_radius * params.print_radius,
            print_radius: params.print_radius,
            probe_radius: params.probe_radius.min(params.print_radius),
            clip_start_height: params.height,
        };

        let centre = cache.rod_height(Tower::A, 0.0, 0.0).max(0.0).sqrt();
        let edge = cache
            .rod_height(Tower::A, 0.0, params.print_radius)
            .max(0.0)
            .sqrt();
        cache.clip_start_height = params.height - (centre - edge).abs();
        cache
    }

    /// Squared vertical rod extent for tower `tower` at tool point (x, y).
    ///
    /// Negative when the point is out of the rod's reach.
    pub fn rod_height(&self, tower: Tower, x: f64, y: f64) -> f64 {
        let i = tower.index();
        let dx = x - self.tower_x[i];
        let dy = y - self.tower_y[i];
        self.rod_sq[i] - dx * dx - dy * dy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(cache: &GeometryCache) -> Vec<u64> {
        let mut out = Vec::new();
        for triple in [cache.rod_sq, cache.tower_x, cache.tower_y] {
            out.extend(triple.iter().map(|v| v.to_bits()));
        }
        out.extend(
            [
                cache.x_bc,
                cache.x_ca,
                cache.x_ab,
                cache.y_bc,
                cache.y_ca,
                cache.y_ab,
                cache.q,
                cache.q2,
                cache.core_ka,
                cache.core_kb,
                cache.core_kc,
                cache.print_radius_sq,
                cache.probe_radius,
                cache.clip_start_height,
            ]
            .iter()
            .map(|v| v.to_bits()),
        );
        out
    }

    #[test]
    fn recompute_is_bitwise_deterministic() {
        let params = GeometryParameters {
            tower_angle_adj: [0.3, -0.2, 0.1],
            tower_radius_adj: [0.5, 0.0, -0.25],
            diagonal_rod_adj: [0.1, 0.2, -0.1],
            ..GeometryParameters::default()
        };
        let first = GeometryCache::recompute(&params);
        let second = GeometryCache::recompute(&params);
        assert_eq!(bits(&first), bits(&second));
    }

    #[test]
    fn towers_sit_on_the_configured_radius() {
        let params = GeometryParameters::default();
        let cache = GeometryCache::recompute(&params);
        for i in 0..3 {
            let r = cache.tower_x[i].hypot(cache.tower_y[i]);
            assert!((r - params.radius).abs() < 1e-9);
        }
        // tower C is straight behind the centre
        assert!(cache.tower_x[2].abs() < 1e-9);
        assert!((cache.tower_y[2] - params.radius).abs() < 1e-9);
        assert_eq!(cache.rod_sq, [90_000.0; 3]);
    }

    #[test]
    fn probe_radius_is_clamped_to_print_radius() {
        let params = GeometryParameters {
            probe_radius: 200.0,
            ..GeometryParameters::default()
        };
        let cache = GeometryCache::recompute(&params);
        assert_eq!(cache.probe_radius, params.print_radius);
    }

    #[test]
    fn clip_height_is_below_machine_height() {
        let params = GeometryParameters::default();
        let cache = GeometryCache::recompute(&params);
        assert!(cache.clip_start_height < params.height);
        assert!(cache.clip_start_height > 0.0);
    }

    #[test]
    fn default_geometry_is_valid() {
        assert_eq!(GeometryParameters::default().validate(), Ok(()));
    }

    #[test]
    fn short_rod_is_a_configuration_error() {
        let params = GeometryParameters {
            diagonal_rod: 200.0,
            ..GeometryParameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(GeometryError::RodTooShort {
                tower: Tower::A,
                ..
            })
        ));
    }

    #[test]
    fn collinear_towers_are_rejected() {
        // A rotated onto B collapses the triangle
        let stacked = GeometryParameters {
            tower_angle_adj: [120.0, 0.0, 0.0],
            ..GeometryParameters::default()
        };
        assert_eq!(stacked.validate(), Err(GeometryError::CollinearTowers));
    }

    #[test]
    fn non_finite_and_non_positive_values_are_rejected() {
        let nan = GeometryParameters {
            radius: f64::NAN,
            ..GeometryParameters::default()
        };
        assert_eq!(
            nan.validate(),
            Err(GeometryError::NotFinite { name: "radius" })
        );

        let flat = GeometryParameters {
            height: 0.0,
            ..GeometryParameters::default()
        };
        assert_eq!(
            flat.validate(),
            Err(GeometryError::NotPositive {
                name: "height",
                value: 0.0
            })
        );

        let no_lines = GeometryParameters {
            segments_per_line: 0,
            ..GeometryParameters::default()
        };
        assert_eq!(
            no_lines.validate(),
            Err(GeometryError::ZeroSegmentsPerLine)
        );
    }
}
