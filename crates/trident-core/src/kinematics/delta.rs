// Delta kinematics - three vertical towers with rods to the effector

use crate::{
    error::{GeometryError, MotionError, Result},
    geometry::{GeometryCache, GeometryParameters},
    kinematics::Kinematics,
    position::{CarriagePosition, ToolPosition, Tower},
};
use std::fmt;

/// Central difference step for [`DeltaKinematics::derivative`], in mm or
/// degrees depending on the parameter.
pub const DERIVATIVE_PERTURBATION: f64 = 0.2;

/// Geometry parameter a calibration routine can ask the height sensitivity of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalibrationParameter {
    Endstop(Tower),
    Radius,
    AngleA,
    AngleB,
    DiagonalRod,
}

impl CalibrationParameter {
    pub const ALL: [CalibrationParameter; 7] = [
        CalibrationParameter::Endstop(Tower::A),
        CalibrationParameter::Endstop(Tower::B),
        CalibrationParameter::Endstop(Tower::C),
        CalibrationParameter::Radius,
        CalibrationParameter::AngleA,
        CalibrationParameter::AngleB,
        CalibrationParameter::DiagonalRod,
    ];

    /// Parse parameter name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "endstop-a" | "a" => Some(Self::Endstop(Tower::A)),
            "endstop-b" | "b" => Some(Self::Endstop(Tower::B)),
            "endstop-c" | "c" => Some(Self::Endstop(Tower::C)),
            "radius" | "r" => Some(Self::Radius),
            "angle-a" => Some(Self::AngleA),
            "angle-b" => Some(Self::AngleB),
            "rod" | "diagonal-rod" | "l" => Some(Self::DiagonalRod),
            _ => None,
        }
    }
}

impl fmt::Display for CalibrationParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endstop(tower) => write!(f, "endstop-{}", tower.to_string().to_lowercase()),
            Self::Radius => f.write_str("radius"),
            Self::AngleA => f.write_str("angle-a"),
            Self::AngleB => f.write_str("angle-b"),
            Self::DiagonalRod => f.write_str("diagonal-rod"),
        }
    }
}

/// Delta geometry together with its derived constants.
///
/// The cache is only ever replaced as a whole, right after the parameters it
/// was derived from have been validated and stored.
#[derive(Debug, Clone)]
pub struct DeltaKinematics {
    params: GeometryParameters,
    cache: GeometryCache,
}

impl DeltaKinematics {
    pub fn new(params: GeometryParameters) -> Result<Self, GeometryError> {
        params.validate()?;
        let cache = GeometryCache::recompute(&params);
        Ok(Self { params, cache })
    }

    pub fn params(&self) -> &GeometryParameters {
        &self.params
    }

    pub fn cache(&self) -> &GeometryCache {
        &self.cache
    }

    /// Apply a batch of parameter writes followed by a single recompute.
    ///
    /// On error the previous geometry stays in effect.
    pub fn update(
        &mut self,
        mutate: impl FnOnce(&mut GeometryParameters),
    ) -> Result<(), GeometryError> {
        let mut params = self.params.clone();
        mutate(&mut params);
        params.validate()?;
        self.cache = GeometryCache::recompute(&params);
        self.params = params;
        Ok(())
    }

    /// Sensitivity of the trilaterated Z to `parameter` around `sample`.
    ///
    /// Central difference over [`DERIVATIVE_PERTURBATION`]. The geometry in
    /// effect is left untouched.
    pub fn derivative(
        &self,
        parameter: CalibrationParameter,
        sample: &CarriagePosition,
    ) -> Result<f64> {
        let perturb = DERIVATIVE_PERTURBATION;

        let (z_hi, z_lo) = match parameter {
            CalibrationParameter::Endstop(tower) => {
                let mut hi = *sample;
                let mut lo = *sample;
                hi[tower] += perturb;
                lo[tower] -= perturb;
                (
                    trilaterate(&self.cache, &hi)?.z,
                    trilaterate(&self.cache, &lo)?.z,
                )
            }
            _ => {
                let perturbed = |delta: f64| {
                    let mut params = self.params.clone();
                    match parameter {
                        CalibrationParameter::Radius => params.radius += delta,
                        CalibrationParameter::AngleA => params.tower_angle_adj[0] += delta,
                        CalibrationParameter::AngleB => params.tower_angle_adj[1] += delta,
                        CalibrationParameter::DiagonalRod => params.diagonal_rod += delta,
                        CalibrationParameter::Endstop(_) => {}
                    }
                    GeometryCache::recompute(&params)
                };
                (
                    trilaterate(&perturbed(perturb), sample)?.z,
                    trilaterate(&perturbed(-perturb), sample)?.z,
                )
            }
        };

        Ok((z_hi - z_lo) / (2.0 * perturb))
    }
}

impl Kinematics for DeltaKinematics {
    fn forward(&self, tool: &ToolPosition) -> Result<CarriagePosition> {
        let mut carriage = CarriagePosition::default();
        for tower in Tower::ALL {
            let radicand = self.cache.rod_height(tower, tool.x, tool.y);
            if radicand < 0.0 {
                return Err(MotionError::UnreachableGeometry {
                    x: tool.x,
                    y: tool.y,
                    z: tool.z,
                });
            }
            carriage[tower] = tool.z + radicand.sqrt();
        }
        Ok(carriage)
    }

    fn inverse(&self, carriage: &CarriagePosition) -> Result<ToolPosition> {
        trilaterate(&self.cache, carriage)
    }

    fn is_reachable(&self, x: f64, y: f64) -> bool {
        x * x + y * y <= self.cache.print_radius_sq
    }

    fn clip_start_height(&self) -> f64 {
        self.cache.clip_start_height
    }

    fn segments_per_second(&self) -> f64 {
        self.params.segments_per_second
    }

    fn segments_per_line(&self) -> u16 {
        self.params.segments_per_line
    }

    fn home_position(&self) -> ToolPosition {
        ToolPosition::new(0.0, 0.0, self.params.height, 0.0)
    }

    fn endstop_adjustment(&self, tower: Tower) -> f64 {
        self.params.endstop_adj[tower.index()]
    }

    fn homing_travel(&self) -> f64 {
        self.params.height
    }
}

/// Intersection of the three rod spheres, taking the lower root.
fn trilaterate(cache: &GeometryCache, carriage: &CarriagePosition) -> Result<ToolPosition> {
    let (ha, hb, hc) = (carriage.a, carriage.b, carriage.c);
    let [xa, xb, xc] = cache.tower_x;
    let [ya, yb, yc] = cache.tower_y;

    let r = 2.0 * (cache.x_bc * ha + cache.x_ca * hb + cache.x_ab * hc);
    let u = 2.0 * (cache.y_bc * ha + cache.y_ca * hb + cache.y_ab * hc);

    let ka = cache.core_ka + hc * hc - hb * hb;
    let kb = cache.core_kb + ha * ha - hc * hc;
    let kc = cache.core_kc + hb * hb - ha * ha;

    let s = ka * ya + kb * yb + kc * yc;
    let t = ka * xa + kb * xb + kc * xc;

    let q = cache.q;
    let q2 = cache.q2;

    let a = u * u + r * r + q2;
    let minus_half_b = q2 * ha + q * (u * xa - r * ya) - (r * t + u * s);
    let c = (xa * q - s).powi(2) + (ya * q + t).powi(2) + (ha * ha - cache.rod_sq[0]) * q2;

    let discriminant = minus_half_b * minus_half_b - a * c;
    if discriminant < 0.0 || a == 0.0 {
        // report the best planar guess so the error names a location
        let z = if a == 0.0 { 0.0 } else { minus_half_b / a };
        return Err(MotionError::UnreachableGeometry {
            x: (u * z + s) / q,
            y: -(r * z + t) / q,
            z,
        });
    }

    let z = (minus_half_b - discriminant.sqrt()) / a;
    Ok(ToolPosition::new((u * z + s) / q, -(r * z + t) / q, z, 0.0))
}
