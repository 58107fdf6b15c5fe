//! Calibration options.
//!
//! Every field is optional in JSON; missing entries take their defaults.

use camcal_core::{CameraMatrix, DistortionCoefficients, DistortionModel, ImageSize, Pt2};
use camcal_linear::DecompMethod;
use camcal_optim::{ActiveParameterMask, TermCriteria};
use serde::{Deserialize, Serialize};

/// Behaviour switches of [`crate::calibrate`].
///
/// The model flags (`rational_model`, `thin_prism_model`, `tilted_model`)
/// choose the distortion vector length; the `fix_*` flags only decide which
/// entries inside that length are held.
///
/// ```
/// use camcal::CalibrationFlags;
/// use camcal::core::DistortionModel;
///
/// let flags = CalibrationFlags {
///     thin_prism_model: true,
///     ..Default::default()
/// };
/// assert_eq!(flags.model(), DistortionModel::ThinPrism);
/// assert_eq!(flags.model().len(), 12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationFlags {
    /// Start from `camera_matrix_guess` / `dist_coeffs_guess` instead of Zhang.
    pub use_intrinsic_guess: bool,
    pub fix_principal_point: bool,
    /// Keep `fx / fy` at the ratio of the camera matrix guess.
    pub fix_aspect_ratio: bool,
    pub fix_focal_length: bool,
    /// Force and hold `p1 = p2 = 0`.
    pub zero_tangent_dist: bool,
    pub fix_k1: bool,
    pub fix_k2: bool,
    pub fix_k3: bool,
    pub fix_k4: bool,
    pub fix_k5: bool,
    pub fix_k6: bool,
    /// Enable `k4 k5 k6` (8 coefficients).
    pub rational_model: bool,
    /// Enable `s1..s4` (12 coefficients).
    pub thin_prism_model: bool,
    pub fix_s1_s2_s3_s4: bool,
    /// Enable `tauX tauY` (14 coefficients).
    pub tilted_model: bool,
    pub fix_tau_x_tau_y: bool,
    /// Solve linear systems with LU instead of SVD.
    pub use_lu: bool,
}

impl CalibrationFlags {
    pub fn model(&self) -> DistortionModel {
        DistortionModel::from_flags(self.rational_model, self.thin_prism_model, self.tilted_model)
    }

    pub fn solver(&self) -> DecompMethod {
        if self.use_lu {
            DecompMethod::Lu
        } else {
            DecompMethod::Svd
        }
    }

    fn fixed_k(&self) -> [(usize, bool); 6] {
        [
            (DistortionCoefficients::K1, self.fix_k1),
            (DistortionCoefficients::K2, self.fix_k2),
            (DistortionCoefficients::K3, self.fix_k3),
            (DistortionCoefficients::K4, self.fix_k4),
            (DistortionCoefficients::K5, self.fix_k5),
            (DistortionCoefficients::K6, self.fix_k6),
        ]
    }

    /// Distortion indices whose initial value comes from the caller even
    /// without `use_intrinsic_guess`.
    pub fn held_distortion(&self) -> Vec<usize> {
        let mut held: Vec<usize> = self
            .fixed_k()
            .iter()
            .filter(|(_, fixed)| *fixed)
            .map(|(i, _)| *i)
            .collect();
        if self.fix_s1_s2_s3_s4 {
            held.extend(DistortionCoefficients::S1..=DistortionCoefficients::S4);
        }
        if self.fix_tau_x_tau_y {
            held.extend([DistortionCoefficients::TAU_X, DistortionCoefficients::TAU_Y]);
        }
        held
    }

    /// Free/fixed state of the 18 shared parameters.
    ///
    /// Groups inside the vector that the model flags leave disabled (for
    /// instance `k4..k6` of a tilted model without `rational_model`) are
    /// held at zero.
    pub fn to_mask(&self) -> ActiveParameterMask {
        let mut mask = ActiveParameterMask::all_free();
        let dist = ActiveParameterMask::dist;

        if self.fix_focal_length {
            mask.fix(ActiveParameterMask::FX);
            mask.fix(ActiveParameterMask::FY);
        }
        if self.fix_principal_point {
            mask.fix(ActiveParameterMask::CX);
            mask.fix(ActiveParameterMask::CY);
        }
        if self.zero_tangent_dist {
            mask.fix(dist(DistortionCoefficients::P1));
            mask.fix(dist(DistortionCoefficients::P2));
        }
        for (i, fixed) in self.fixed_k() {
            if fixed {
                mask.fix(dist(i));
            }
        }
        if !self.rational_model {
            for i in DistortionCoefficients::K4..=DistortionCoefficients::K6 {
                mask.fix(dist(i));
            }
        }
        if !self.thin_prism_model || self.fix_s1_s2_s3_s4 {
            for i in DistortionCoefficients::S1..=DistortionCoefficients::S4 {
                mask.fix(dist(i));
            }
        }
        if !self.tilted_model || self.fix_tau_x_tau_y {
            mask.fix(dist(DistortionCoefficients::TAU_X));
            mask.fix(dist(DistortionCoefficients::TAU_Y));
        }
        mask
    }
}

/// Inputs of [`crate::calibrate`] besides the views.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrateOptions {
    /// Defaults to `fx = fy = 1` with the principal point at the image centre.
    pub camera_matrix_guess: Option<CameraMatrix>,
    /// Any accepted length; defaults to all zero.
    pub dist_coeffs_guess: Option<DistortionCoefficients>,
    pub flags: CalibrationFlags,
    pub criteria: TermCriteria,
}

impl CalibrateOptions {
    pub fn camera_guess(&self, image_size: ImageSize) -> CameraMatrix {
        self.camera_matrix_guess
            .unwrap_or_else(|| CameraMatrix::default_for(image_size))
    }

    /// Principal point held by `fix_principal_point`.
    pub fn principal_point_guess(&self, image_size: ImageSize) -> Pt2 {
        match self.camera_matrix_guess {
            Some(k) => Pt2::new(k.cx, k.cy),
            None => image_size.center(),
        }
    }

    /// Distortion guess resized to the flagged model.
    pub fn dist_guess(&self) -> DistortionCoefficients {
        let model = self.flags.model();
        self.dist_coeffs_guess
            .as_ref()
            .map(|d| d.with_model(model))
            .unwrap_or_else(|| DistortionCoefficients::zeros(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_length_follows_flags_in_any_order() {
        let cases = [
            (false, false, false, 5),
            (true, false, false, 8),
            (false, true, false, 12),
            (true, true, false, 12),
            (false, false, true, 14),
            (true, false, true, 14),
            (false, true, true, 14),
            (true, true, true, 14),
        ];
        for (rational, thin_prism, tilted, len) in cases {
            let flags = CalibrationFlags {
                rational_model: rational,
                thin_prism_model: thin_prism,
                tilted_model: tilted,
                fix_k4: true,
                fix_s1_s2_s3_s4: true,
                ..Default::default()
            };
            assert_eq!(flags.model().len(), len);
        }
    }

    #[test]
    fn disabled_groups_are_held() {
        let flags = CalibrationFlags {
            tilted_model: true,
            ..Default::default()
        };
        let mask = flags.to_mask();
        let dist = ActiveParameterMask::dist;
        for i in DistortionCoefficients::K4..=DistortionCoefficients::S4 {
            assert!(!mask.is_free(dist(i)), "index {i}");
        }
        assert!(mask.is_free(dist(DistortionCoefficients::TAU_X)));
        assert!(mask.is_free(dist(DistortionCoefficients::K3)));
    }

    #[test]
    fn fix_flags_map_to_mask_entries() {
        let flags = CalibrationFlags {
            fix_principal_point: true,
            zero_tangent_dist: true,
            fix_k2: true,
            ..Default::default()
        };
        let mask = flags.to_mask();
        assert!(mask.is_free(ActiveParameterMask::FX));
        assert!(!mask.is_free(ActiveParameterMask::CX));
        assert!(!mask.is_free(ActiveParameterMask::CY));
        assert!(!mask.is_free(ActiveParameterMask::dist(DistortionCoefficients::P1)));
        assert!(!mask.is_free(ActiveParameterMask::dist(DistortionCoefficients::K2)));
        assert!(mask.is_free(ActiveParameterMask::dist(DistortionCoefficients::K1)));
        assert_eq!(mask.count_free(CameraMatrix::DIM + 5), 4);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let opts: CalibrateOptions =
            serde_json::from_str(r#"{"flags": {"rational_model": true, "use_lu": true}}"#).unwrap();
        assert_eq!(opts.flags.model(), DistortionModel::Rational);
        assert_eq!(opts.flags.solver(), DecompMethod::Lu);
        assert!(opts.camera_matrix_guess.is_none());
        assert_eq!(opts.criteria, TermCriteria::default());
        assert_eq!(opts.dist_guess().len(), 8);
    }

    #[test]
    fn principal_point_defaults_to_image_centre() {
        let size = ImageSize::new(1280, 720);
        let opts = CalibrateOptions::default();
        assert_eq!(opts.principal_point_guess(size), Pt2::new(639.5, 359.5));
        assert_eq!(opts.camera_guess(size).fx, 1.0);
    }
}
