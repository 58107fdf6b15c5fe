use crate::{CalibError, Mat3, Pt2, Real, Vec2};
use serde::{Deserialize, Serialize};

/// Image dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Geometric centre `((w − 1)/2, (h − 1)/2)` in pixel coordinates.
    pub fn center(&self) -> Pt2 {
        Pt2::new(
            (self.width as Real - 1.0) * 0.5,
            (self.height as Real - 1.0) * 0.5,
        )
    }

    pub fn validate(&self) -> Result<(), CalibError> {
        if self.width == 0 || self.height == 0 {
            return Err(CalibError::InvalidInput(format!(
                "image size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Pinhole intrinsics `fx, fy, cx, cy` with zero skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraMatrix {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
}

impl CameraMatrix {
    /// Number of scalar intrinsics in the parameter vector.
    pub const DIM: usize = 4;

    pub fn new(fx: Real, fy: Real, cx: Real, cy: Real) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Placeholder guess: unit focal lengths and the principal point at the
    /// image centre.
    pub fn default_for(size: ImageSize) -> Self {
        let c = size.center();
        Self::new(1.0, 1.0, c.x, c.y)
    }

    /// Build from a 3×3 upper-triangular `K`; any skew entry is dropped.
    pub fn from_k(k: &Mat3) -> Self {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)])
    }

    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Inverse of [`Self::k_matrix`], valid for non-zero focal lengths.
    pub fn k_inverse(&self) -> Mat3 {
        Mat3::new(
            1.0 / self.fx,
            0.0,
            -self.cx / self.fx,
            0.0,
            1.0 / self.fy,
            -self.cy / self.fy,
            0.0,
            0.0,
            1.0,
        )
    }

    pub fn aspect_ratio(&self) -> Real {
        self.fx / self.fy
    }

    /// Normalized sensor-plane coordinates → pixels.
    pub fn to_pixel(&self, n: &Vec2) -> Pt2 {
        Pt2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }

    /// Pixels → normalized sensor-plane coordinates.
    pub fn to_normalized(&self, px: &Pt2) -> Vec2 {
        Vec2::new((px.x - self.cx) / self.fx, (px.y - self.cy) / self.fy)
    }

    pub fn to_array(&self) -> [Real; 4] {
        [self.fx, self.fy, self.cx, self.cy]
    }

    pub fn from_array(v: [Real; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Check that focal lengths are positive and finite.
    pub fn validate(&self) -> Result<(), CalibError> {
        if !self.is_finite() || self.fx <= 0.0 || self.fy <= 0.0 {
            return Err(CalibError::InvalidInput(format!(
                "camera matrix needs finite, positive focal lengths (fx = {}, fy = {})",
                self.fx, self.fy
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_normalized_round_trip() {
        let k = CameraMatrix::new(800.0, 780.0, 640.0, 360.0);
        let px = Pt2::new(100.0, 250.0);
        let back = k.to_pixel(&k.to_normalized(&px));
        assert!((back - px).norm() < 1e-12);
        assert!((k.k_matrix() * k.k_inverse() - Mat3::identity()).norm() < 1e-12);
    }

    #[test]
    fn image_center_is_half_pixel_corrected() {
        let c = ImageSize::new(1280, 720).center();
        assert_eq!(c, Pt2::new(639.5, 359.5));
        assert!(ImageSize::new(0, 10).validate().is_err());
    }
}
