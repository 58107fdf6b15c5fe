use crate::{CalibError, Mat2, Real, TiltedSensor, Vec2};
use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};

/// Maximum number of distortion coefficients (`k1 … tauY`).
pub const MAX_DIST_COEFFS: usize = 14;

/// Lower bound on `|1 + k4 r² + k5 r⁴ + k6 r⁶|`.
pub const MIN_RADIAL_DIVISOR: Real = 1e-8;

const UNDISTORT_MAX_ITERS: usize = 20;

/// Active coefficient groups, selected by the vector length.
///
/// | model       | len | coefficients                          |
/// |-------------|-----|---------------------------------------|
/// | `Standard`  | 5   | `k1 k2 p1 p2 k3`                      |
/// | `Rational`  | 8   | `+ k4 k5 k6`                          |
/// | `ThinPrism` | 12  | `+ s1 s2 s3 s4`                       |
/// | `Tilted`    | 14  | `+ tauX tauY`                         |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionModel {
    Standard,
    Rational,
    ThinPrism,
    Tilted,
}

impl DistortionModel {
    pub const fn len(self) -> usize {
        match self {
            DistortionModel::Standard => 5,
            DistortionModel::Rational => 8,
            DistortionModel::ThinPrism => 12,
            DistortionModel::Tilted => 14,
        }
    }

    /// Model for a user-supplied coefficient count (4, 5, 8, 12 or 14).
    pub fn from_len(len: usize) -> Result<Self, CalibError> {
        match len {
            4 | 5 => Ok(DistortionModel::Standard),
            8 => Ok(DistortionModel::Rational),
            12 => Ok(DistortionModel::ThinPrism),
            14 => Ok(DistortionModel::Tilted),
            n => Err(CalibError::InvalidInput(format!(
                "distortion vector must have 4, 5, 8, 12 or 14 entries, got {n}"
            ))),
        }
    }

    /// Smallest layout holding every enabled group.
    ///
    /// Groups that are enabled only implicitly (e.g. `k4..k6` under a
    /// thin-prism-only model) are part of the vector but held at zero by the
    /// optimizer.
    pub fn from_flags(rational: bool, thin_prism: bool, tilted: bool) -> Self {
        if tilted {
            DistortionModel::Tilted
        } else if thin_prism {
            DistortionModel::ThinPrism
        } else if rational {
            DistortionModel::Rational
        } else {
            DistortionModel::Standard
        }
    }
}

/// Distortion coefficients in OpenCV order
/// `k1 k2 p1 p2 k3 k4 k5 k6 s1 s2 s3 s4 tauX tauY`.
///
/// Stored zero-padded to [`MAX_DIST_COEFFS`]; entries past
/// [`DistortionModel::len`] are always zero. Serialized as a plain array of
/// the model length.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Real>", into = "Vec<Real>")]
pub struct DistortionCoefficients {
    coeffs: [Real; MAX_DIST_COEFFS],
    model: DistortionModel,
}

/// Distorted point and its derivatives, before the tilted sensor stage.
#[derive(Clone, Debug)]
pub struct LensJacobian {
    pub distorted: Vec2,
    /// Columns `k1 … s4` (the first 12 coefficients).
    pub d_coeffs: SMatrix<Real, 2, 12>,
    /// Derivative with respect to the undistorted point.
    pub d_point: Mat2,
}

impl DistortionCoefficients {
    pub const K1: usize = 0;
    pub const K2: usize = 1;
    pub const P1: usize = 2;
    pub const P2: usize = 3;
    pub const K3: usize = 4;
    pub const K4: usize = 5;
    pub const K5: usize = 6;
    pub const K6: usize = 7;
    pub const S1: usize = 8;
    pub const S2: usize = 9;
    pub const S3: usize = 10;
    pub const S4: usize = 11;
    pub const TAU_X: usize = 12;
    pub const TAU_Y: usize = 13;

    pub fn zeros(model: DistortionModel) -> Self {
        Self {
            coeffs: [0.0; MAX_DIST_COEFFS],
            model,
        }
    }

    /// Build from a slice of 4, 5, 8, 12 or 14 coefficients.
    pub fn from_slice(values: &[Real]) -> Result<Self, CalibError> {
        let model = DistortionModel::from_len(values.len())?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CalibError::InvalidInput(
                "distortion coefficients must be finite".into(),
            ));
        }
        let mut out = Self::zeros(model);
        out.coeffs[..values.len()].copy_from_slice(values);
        Ok(out)
    }

    pub fn model(&self) -> DistortionModel {
        self.model
    }

    pub fn len(&self) -> usize {
        self.model.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Coefficients of the active model.
    pub fn as_slice(&self) -> &[Real] {
        &self.coeffs[..self.model.len()]
    }

    /// All 14 coefficients, zero-padded.
    pub fn full(&self) -> &[Real; MAX_DIST_COEFFS] {
        &self.coeffs
    }

    pub fn get(&self, idx: usize) -> Real {
        self.coeffs[idx]
    }

    /// Set one coefficient. Indices outside the active model are ignored.
    pub fn set(&mut self, idx: usize, value: Real) {
        if idx < self.model.len() {
            self.coeffs[idx] = value;
        }
    }

    /// Re-layout under another model, truncating or zero-padding.
    pub fn with_model(&self, model: DistortionModel) -> Self {
        let mut out = Self::zeros(model);
        let n = model.len().min(self.model.len());
        out.coeffs[..n].copy_from_slice(&self.coeffs[..n]);
        out
    }

    pub fn is_finite(&self) -> bool {
        self.coeffs.iter().all(|v| v.is_finite())
    }

    /// Tilted sensor stage for the current `tauX`, `tauY`.
    pub fn sensor(&self) -> TiltedSensor {
        TiltedSensor::new(self.coeffs[Self::TAU_X], self.coeffs[Self::TAU_Y])
    }

    /// Apply radial, tangential and thin prism terms to an ideal normalized point.
    pub fn distort(&self, p: &Vec2) -> Vec2 {
        let [k1, k2, p1, p2, k3, k4, k5, k6, s1, s2, s3, s4, _, _] = self.coeffs;
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let num = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;
        let (den, _) = clamp_divisor(1.0 + k4 * r2 + k5 * r4 + k6 * r6);
        let cd = num / den;

        let a1 = 2.0 * x * y;
        let a2 = r2 + 2.0 * x * x;
        let a3 = r2 + 2.0 * y * y;

        Vec2::new(
            x * cd + p1 * a1 + p2 * a2 + s1 * r2 + s2 * r4,
            y * cd + p1 * a3 + p2 * a1 + s3 * r2 + s4 * r4,
        )
    }

    /// [`Self::distort`] plus derivatives with respect to the coefficients
    /// and the input point.
    ///
    /// When the rational divisor is clamped it is treated as constant, so the
    /// `k4..k6` columns vanish.
    pub fn distort_with_jacobian(&self, p: &Vec2) -> LensJacobian {
        let [k1, k2, p1, p2, k3, k4, k5, k6, s1, s2, s3, s4, _, _] = self.coeffs;
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let num = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;
        let (den, clamped) = clamp_divisor(1.0 + k4 * r2 + k5 * r4 + k6 * r6);
        let cd = num / den;

        let a1 = 2.0 * x * y;
        let a2 = r2 + 2.0 * x * x;
        let a3 = r2 + 2.0 * y * y;

        let distorted = Vec2::new(
            x * cd + p1 * a1 + p2 * a2 + s1 * r2 + s2 * r4,
            y * cd + p1 * a3 + p2 * a1 + s3 * r2 + s4 * r4,
        );

        let mut d_coeffs = SMatrix::<Real, 2, 12>::zeros();
        let mut set = |col: usize, dx: Real, dy: Real| {
            d_coeffs[(0, col)] = dx;
            d_coeffs[(1, col)] = dy;
        };
        set(Self::K1, x * r2 / den, y * r2 / den);
        set(Self::K2, x * r4 / den, y * r4 / den);
        set(Self::P1, a1, a3);
        set(Self::P2, a2, a1);
        set(Self::K3, x * r6 / den, y * r6 / den);
        if !clamped {
            let g = -cd / den;
            set(Self::K4, g * x * r2, g * y * r2);
            set(Self::K5, g * x * r4, g * y * r4);
            set(Self::K6, g * x * r6, g * y * r6);
        }
        set(Self::S1, r2, 0.0);
        set(Self::S2, r4, 0.0);
        set(Self::S3, 0.0, r2);
        set(Self::S4, 0.0, r4);

        // d(cd)/d(r²)
        let mut dc = (k1 + 2.0 * k2 * r2 + 3.0 * k3 * r4) / den;
        if !clamped {
            dc -= num * (k4 + 2.0 * k5 * r2 + 3.0 * k6 * r4) / (den * den);
        }
        let prism_x = s1 + 2.0 * s2 * r2;
        let prism_y = s3 + 2.0 * s4 * r2;
        let cross = 2.0 * x * y * dc + 2.0 * p1 * x + 2.0 * p2 * y;
        let d_point = Mat2::new(
            cd + 2.0 * x * x * dc + 2.0 * p1 * y + 6.0 * p2 * x + 2.0 * x * prism_x,
            cross + 2.0 * y * prism_x,
            cross + 2.0 * x * prism_y,
            cd + 2.0 * y * y * dc + 6.0 * p1 * y + 2.0 * p2 * x + 2.0 * y * prism_y,
        );

        LensJacobian {
            distorted,
            d_coeffs,
            d_point,
        }
    }

    /// Invert the lens and sensor stages for a distorted normalized point.
    ///
    /// Fixed-point iteration on the radial and tangential terms, starting from
    /// the observed point. Falls back to the observed point when the radial
    /// factor turns negative or non-finite.
    pub fn undistort_normalized(&self, p: &Vec2) -> Vec2 {
        let [k1, k2, p1, p2, k3, k4, k5, k6, s1, s2, s3, s4, _, _] = self.coeffs;
        let observed = self.sensor().unapply(p);
        let (x0, y0) = (observed.x, observed.y);
        let (mut x, mut y) = (x0, y0);

        for _ in 0..UNDISTORT_MAX_ITERS {
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;
            let num = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;
            let (den, _) = clamp_divisor(1.0 + k4 * r2 + k5 * r4 + k6 * r6);
            let icdist = den / num;
            if !icdist.is_finite() || icdist < 0.0 {
                return observed;
            }
            let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x) + s1 * r2 + s2 * r4;
            let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y + s3 * r2 + s4 * r4;
            let nx = (x0 - dx) * icdist;
            let ny = (y0 - dy) * icdist;
            let change = (nx - x).abs() + (ny - y).abs();
            x = nx;
            y = ny;
            if change < 1e-15 {
                break;
            }
        }
        Vec2::new(x, y)
    }
}

impl Default for DistortionCoefficients {
    fn default() -> Self {
        Self::zeros(DistortionModel::Standard)
    }
}

impl TryFrom<Vec<Real>> for DistortionCoefficients {
    type Error = CalibError;

    fn try_from(values: Vec<Real>) -> Result<Self, Self::Error> {
        Self::from_slice(&values)
    }
}

impl From<DistortionCoefficients> for Vec<Real> {
    fn from(d: DistortionCoefficients) -> Self {
        d.as_slice().to_vec()
    }
}

/// Keep the divisor at least [`MIN_RADIAL_DIVISOR`] away from zero.
///
/// Returns the (possibly clamped) value and whether clamping happened.
fn clamp_divisor(d: Real) -> (Real, bool) {
    if d.abs() >= MIN_RADIAL_DIVISOR {
        (d, false)
    } else if d < 0.0 {
        (-MIN_RADIAL_DIVISOR, true)
    } else {
        (MIN_RADIAL_DIVISOR, true)
    }
}
