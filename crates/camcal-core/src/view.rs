//! Observation records for calibration data.

use crate::{CalibError, Pt2, Pt3};
use serde::{Deserialize, Serialize};

/// Minimum number of correspondences a view must carry.
pub const MIN_VIEW_POINTS: usize = 4;

/// Tolerance on `|Z|` for a rig to count as lying in its `Z = 0` plane.
pub const PLANAR_Z_TOLERANCE: f64 = 1e-9;

/// One image of the calibration rig: rig points and their observed pixels.
///
/// Validated once at construction: both sets have the same length, at least
/// [`MIN_VIEW_POINTS`] entries, and only finite coordinates. Deserialization
/// goes through the same checks.
///
/// # Example
///
/// ```
/// use camcal_core::{Pt2, Pt3, View};
///
/// let object = vec![
///     Pt3::new(0.0, 0.0, 0.0),
///     Pt3::new(0.1, 0.0, 0.0),
///     Pt3::new(0.0, 0.1, 0.0),
///     Pt3::new(0.1, 0.1, 0.0),
/// ];
/// let image = vec![
///     Pt2::new(320.0, 240.0),
///     Pt2::new(400.0, 240.0),
///     Pt2::new(320.0, 320.0),
///     Pt2::new(400.0, 320.0),
/// ];
/// let view = View::new(object, image).unwrap();
/// assert_eq!(view.len(), 4);
/// assert!(view.is_planar());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawView")]
pub struct View {
    object_points: Vec<Pt3>,
    image_points: Vec<Pt2>,
}

#[derive(Deserialize)]
struct RawView {
    object_points: Vec<Pt3>,
    image_points: Vec<Pt2>,
}

impl TryFrom<RawView> for View {
    type Error = CalibError;

    fn try_from(raw: RawView) -> Result<Self, Self::Error> {
        View::new(raw.object_points, raw.image_points)
    }
}

impl View {
    pub fn new(object_points: Vec<Pt3>, image_points: Vec<Pt2>) -> Result<Self, CalibError> {
        if object_points.len() != image_points.len() {
            return Err(CalibError::InvalidInput(format!(
                "object / image point counts must match: {} vs {}",
                object_points.len(),
                image_points.len()
            )));
        }
        if object_points.len() < MIN_VIEW_POINTS {
            return Err(CalibError::InvalidInput(format!(
                "a view needs at least {MIN_VIEW_POINTS} points, got {}",
                object_points.len()
            )));
        }
        let finite = object_points.iter().all(|p| p.coords.iter().all(|v| v.is_finite()))
            && image_points.iter().all(|p| p.coords.iter().all(|v| v.is_finite()));
        if !finite {
            return Err(CalibError::InvalidInput(
                "view contains non-finite coordinates".into(),
            ));
        }
        Ok(Self {
            object_points,
            image_points,
        })
    }

    pub fn object_points(&self) -> &[Pt3] {
        &self.object_points
    }

    pub fn image_points(&self) -> &[Pt2] {
        &self.image_points
    }

    pub fn len(&self) -> usize {
        self.object_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_points.is_empty()
    }

    /// `true` when every rig point lies in the `Z = 0` plane.
    pub fn is_planar(&self) -> bool {
        self.object_points
            .iter()
            .all(|p| p.z.abs() <= PLANAR_Z_TOLERANCE)
    }

    /// Rig `(X, Y)` coordinates, dropping `Z`.
    pub fn planar_points(&self) -> Vec<Pt2> {
        self.object_points.iter().map(|p| Pt2::new(p.x, p.y)).collect()
    }
}
