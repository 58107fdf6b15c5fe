use crate::{rotation_from_rvec, rvec_from_rotation, Iso3, Mat3, Pt3, Real, Vec3};
use serde::{Deserialize, Serialize};

/// Rigid transform from the rig frame into the camera frame.
///
/// `rvec` is a Rodrigues vector (axis scaled by angle in radians).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rvec: Vec3,
    pub tvec: Vec3,
}

impl Pose {
    /// Number of scalar pose parameters in the parameter vector.
    pub const DIM: usize = 6;

    pub fn new(rvec: Vec3, tvec: Vec3) -> Self {
        Self { rvec, tvec }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::zeros(), Vec3::zeros())
    }

    pub fn from_rotation(rotation: &Mat3, tvec: Vec3) -> Self {
        Self::new(rvec_from_rotation(rotation), tvec)
    }

    pub fn from_iso3(iso: &Iso3) -> Self {
        Self::new(iso.rotation.scaled_axis(), iso.translation.vector)
    }

    pub fn to_iso3(&self) -> Iso3 {
        Iso3::new(self.tvec, self.rvec)
    }

    pub fn rotation(&self) -> Mat3 {
        rotation_from_rvec(&self.rvec)
    }

    pub fn transform_point(&self, p: &Pt3) -> Pt3 {
        Pt3::from(self.rotation() * p.coords + self.tvec)
    }

    /// `[rx, ry, rz, tx, ty, tz]`, the order used in the parameter vector.
    pub fn to_array(&self) -> [Real; 6] {
        [
            self.rvec.x,
            self.rvec.y,
            self.rvec.z,
            self.tvec.x,
            self.tvec.y,
            self.tvec.z,
        ]
    }

    pub fn from_array(v: [Real; 6]) -> Self {
        Self::new(Vec3::new(v[0], v[1], v[2]), Vec3::new(v[3], v[4], v[5]))
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}
