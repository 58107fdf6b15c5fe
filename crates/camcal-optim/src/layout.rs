//! Canonical parameter vector layout.
//!
//! ```text
//! [ fx fy cx cy | d0 … d(L−1) | rvec₀ tvec₀ | rvec₁ tvec₁ | … ]
//!   intrinsics    distortion    one 6-block per view
//! ```
//!
//! `L` is the distortion model length (5, 8, 12 or 14). The intrinsic and
//! distortion entries form the *shared* block; every view owns one pose block.
//! Which shared entries move is decided once by an [`ActiveParameterMask`];
//! pose blocks are always free.

use camcal_core::{CameraMatrix, DistortionCoefficients, DistortionModel, Pose, Real};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Number of intrinsic + distortion scalars covered by a mask.
pub const SHARED_PARAMS: usize = CameraMatrix::DIM + camcal_core::MAX_DIST_COEFFS;

/// Free / fixed flag per intrinsic and distortion scalar.
///
/// Index mapping: `fx=0, fy=1, cx=2, cy=3`, then distortion coefficient `i`
/// at `4 + i` in the order `k1 k2 p1 p2 k3 k4 k5 k6 s1 s2 s3 s4 tauX tauY`.
///
/// ```
/// use camcal_optim::ActiveParameterMask;
///
/// let mut mask = ActiveParameterMask::all_free();
/// mask.fix(ActiveParameterMask::CX);
/// mask.fix(ActiveParameterMask::CY);
/// assert!(mask.is_free(ActiveParameterMask::FX));
/// assert!(!mask.is_free(ActiveParameterMask::CX));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveParameterMask {
    free: [bool; SHARED_PARAMS],
}

impl ActiveParameterMask {
    pub const FX: usize = 0;
    pub const FY: usize = 1;
    pub const CX: usize = 2;
    pub const CY: usize = 3;

    pub fn all_free() -> Self {
        Self {
            free: [true; SHARED_PARAMS],
        }
    }

    pub fn all_fixed() -> Self {
        Self {
            free: [false; SHARED_PARAMS],
        }
    }

    /// Mask index of distortion coefficient `i`.
    pub const fn dist(i: usize) -> usize {
        CameraMatrix::DIM + i
    }

    pub fn is_free(&self, idx: usize) -> bool {
        self.free[idx]
    }

    pub fn fix(&mut self, idx: usize) {
        self.free[idx] = false;
    }

    pub fn set_free(&mut self, idx: usize, free: bool) {
        self.free[idx] = free;
    }

    /// Number of free entries within the first `len` mask slots.
    pub fn count_free(&self, len: usize) -> usize {
        self.free[..len.min(SHARED_PARAMS)].iter().filter(|f| **f).count()
    }
}

impl Default for ActiveParameterMask {
    fn default() -> Self {
        Self::all_free()
    }
}

/// Resolved layout of one optimization problem.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamLayout {
    model: DistortionModel,
    num_views: usize,
    mask: ActiveParameterMask,
    aspect_ratio: Option<Real>,
    free: Vec<usize>,
    num_free_shared: usize,
}

impl ParamLayout {
    /// Build a layout.
    ///
    /// With `aspect_ratio = Some(a)` the focal lengths are tied by `fx = a·fy`:
    /// `fx` leaves the free set and follows `fy`. The tie is dropped when `fy`
    /// itself is fixed.
    pub fn new(
        model: DistortionModel,
        mask: ActiveParameterMask,
        aspect_ratio: Option<Real>,
        num_views: usize,
    ) -> Self {
        let mut mask = mask;
        let aspect_ratio = aspect_ratio.filter(|_| mask.is_free(ActiveParameterMask::FY));
        if aspect_ratio.is_some() {
            mask.fix(ActiveParameterMask::FX);
        }

        let shared_dim = CameraMatrix::DIM + model.len();
        let mut free: Vec<usize> = (0..shared_dim).filter(|&i| mask.is_free(i)).collect();
        let num_free_shared = free.len();
        free.extend(shared_dim..shared_dim + Pose::DIM * num_views);

        Self {
            model,
            num_views,
            mask,
            aspect_ratio,
            free,
            num_free_shared,
        }
    }

    /// Only the poses move; intrinsics and distortion are held.
    pub fn poses_only(model: DistortionModel, num_views: usize) -> Self {
        Self::new(model, ActiveParameterMask::all_fixed(), None, num_views)
    }

    pub fn model(&self) -> DistortionModel {
        self.model
    }

    pub fn num_views(&self) -> usize {
        self.num_views
    }

    /// Mask after resolving the aspect-ratio tie.
    pub fn mask(&self) -> &ActiveParameterMask {
        &self.mask
    }

    /// `Some(a)` when `fx = a·fy` is enforced.
    pub fn aspect_ratio(&self) -> Option<Real> {
        self.aspect_ratio
    }

    pub fn dist_len(&self) -> usize {
        self.model.len()
    }

    /// Size of the shared intrinsics + distortion block.
    pub fn shared_dim(&self) -> usize {
        CameraMatrix::DIM + self.model.len()
    }

    pub fn pose_offset(&self, view: usize) -> usize {
        self.shared_dim() + Pose::DIM * view
    }

    /// Total vector length.
    pub fn len(&self) -> usize {
        self.shared_dim() + Pose::DIM * self.num_views
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Global indices of the free entries, ascending. Shared entries come
    /// first, then six entries per view.
    pub fn free_indices(&self) -> &[usize] {
        &self.free
    }

    pub fn num_free(&self) -> usize {
        self.free.len()
    }

    /// Free shared entries (global indices below [`Self::shared_dim`]).
    pub fn free_shared(&self) -> &[usize] {
        &self.free[..self.num_free_shared]
    }

    pub fn num_free_shared(&self) -> usize {
        self.num_free_shared
    }

    /// Column of view `view`'s first pose parameter among the free columns.
    pub fn free_pose_column(&self, view: usize) -> usize {
        self.num_free_shared + Pose::DIM * view
    }

    pub fn pack(
        &self,
        camera: &CameraMatrix,
        dist: &DistortionCoefficients,
        poses: &[Pose],
    ) -> DVector<Real> {
        debug_assert_eq!(poses.len(), self.num_views);
        let mut x = DVector::<Real>::zeros(self.len());
        for (i, v) in camera.to_array().into_iter().enumerate() {
            x[i] = v;
        }
        let dist = dist.with_model(self.model);
        for (i, v) in dist.as_slice().iter().enumerate() {
            x[CameraMatrix::DIM + i] = *v;
        }
        for (view, pose) in poses.iter().enumerate() {
            let offset = self.pose_offset(view);
            for (k, v) in pose.to_array().into_iter().enumerate() {
                x[offset + k] = v;
            }
        }
        x
    }

    pub fn camera(&self, x: &DVector<Real>) -> CameraMatrix {
        CameraMatrix::new(x[0], x[1], x[2], x[3])
    }

    pub fn distortion(&self, x: &DVector<Real>) -> DistortionCoefficients {
        let mut dist = DistortionCoefficients::zeros(self.model);
        for i in 0..self.model.len() {
            dist.set(i, x[CameraMatrix::DIM + i]);
        }
        dist
    }

    pub fn pose(&self, x: &DVector<Real>, view: usize) -> Pose {
        let o = self.pose_offset(view);
        Pose::from_array([x[o], x[o + 1], x[o + 2], x[o + 3], x[o + 4], x[o + 5]])
    }

    pub fn unpack(&self, x: &DVector<Real>) -> (CameraMatrix, DistortionCoefficients, Vec<Pose>) {
        let poses = (0..self.num_views).map(|v| self.pose(x, v)).collect();
        (self.camera(x), self.distortion(x), poses)
    }

    /// `x + δ` on the free entries; fixed entries are copied untouched.
    ///
    /// `delta` is indexed like [`Self::free_indices`]. A tied `fx` is
    /// recomputed from the updated `fy`.
    pub fn apply_step(&self, x: &DVector<Real>, delta: &DVector<Real>) -> DVector<Real> {
        debug_assert_eq!(delta.len(), self.free.len());
        let mut out = x.clone();
        for (k, &g) in self.free.iter().enumerate() {
            out[g] += delta[k];
        }
        if let Some(a) = self.aspect_ratio {
            out[ActiveParameterMask::FX] = a * out[ActiveParameterMask::FY];
        }
        out
    }
}
