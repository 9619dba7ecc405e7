//! Intercondylar femur gap estimation.
//!
//! The gap is measured on two orthogonal slices through a point inside the
//! intercondylar notch:
//!
//! 1. The slicing origin starts at the femur bounding-box centre. Its
//!    vertical coordinate is divided by [`GapParams::vertical_divisor`] and
//!    its depth coordinate is moved back by
//!    [`GapParams::depth_shift_fraction`] of the depth extent.
//! 2. A horizontal slice (normal = vertical axis) and a sagittal slice
//!    (normal = depth axis) are taken through the origin.
//! 3. Sagittal points within half-width windows left and right of the
//!    origin are matched to their nearest horizontal-slice points.
//! 4. The two matches are levelled to the higher of their vertical and depth
//!    coordinates; the gap is the distance between them.
//!
//! The calibration constants encode where the notch lies on the knee models
//! this was tuned on and should only change together with the data set.

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::Mesh;
use crate::error::{FeatureError, FeatureResult};
use crate::measure::{measure_distance, slice_points};

/// A coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn unit(self) -> Vector3<f64> {
        let mut v = Vector3::zeros();
        v[self.index()] = 1.0;
        v
    }
}

/// Assignment of anatomical directions to coordinate axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisFrame {
    /// Medial-lateral direction, along which the gap is measured.
    pub horizontal: Axis,
    /// Proximal-distal direction.
    pub vertical: Axis,
    /// Anterior-posterior direction.
    pub depth: Axis,
}

impl Default for AxisFrame {
    fn default() -> Self {
        Self {
            horizontal: Axis::X,
            vertical: Axis::Y,
            depth: Axis::Z,
        }
    }
}

impl AxisFrame {
    pub fn validate(&self) -> FeatureResult<()> {
        let (h, v, d) = (self.horizontal, self.vertical, self.depth);
        if h == v || h == d || v == d {
            return Err(FeatureError::config(format!(
                "axis frame must use three distinct axes, got {h:?}/{v:?}/{d:?}"
            )));
        }
        Ok(())
    }
}

/// Which sagittal window points are matched against the horizontal slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowQuery {
    /// Match only the first point of each window.
    #[default]
    FirstPoint,
    /// Match every window point and keep the closest match. Equal distances
    /// keep the earliest window point.
    EachPoint,
}

/// Calibration of the gap search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapParams {
    /// The origin's vertical coordinate is divided by this.
    ///
    /// Default: `3.0`
    pub vertical_divisor: f64,

    /// Fraction of the depth extent subtracted from the origin's depth
    /// coordinate.
    ///
    /// Default: `0.25`
    pub depth_shift_fraction: f64,

    /// Window half-width as a fraction of the largest horizontal coordinate
    /// of the horizontal slice.
    ///
    /// Default: `0.5`
    pub window_fraction: f64,

    /// Default: [`WindowQuery::FirstPoint`]
    pub query: WindowQuery,

    pub axes: AxisFrame,
}

impl Default for GapParams {
    fn default() -> Self {
        Self {
            vertical_divisor: 3.0,
            depth_shift_fraction: 0.5 * 0.5,
            window_fraction: 0.5,
            query: WindowQuery::FirstPoint,
            axes: AxisFrame::default(),
        }
    }
}

impl GapParams {
    pub fn validate(&self) -> FeatureResult<()> {
        self.axes.validate()?;
        if self.vertical_divisor == 0.0 || !self.vertical_divisor.is_finite() {
            return Err(FeatureError::config(format!(
                "vertical_divisor must be finite and non-zero, got {}",
                self.vertical_divisor
            )));
        }
        if self.window_fraction.is_nan() || self.window_fraction <= 0.0 {
            return Err(FeatureError::config(format!(
                "window_fraction must be positive, got {}",
                self.window_fraction
            )));
        }
        Ok(())
    }
}

/// Result of [`find_gap`].
#[derive(Debug, Clone, PartialEq)]
pub struct FemurGap {
    pub distance: f64,
    pub left_point: Point3<f64>,
    pub right_point: Point3<f64>,
    /// Slicing origin.
    pub origin: Point3<f64>,
    /// Window half-width.
    pub frame: f64,
}

/// Find the nearest tree item for the window points selected by `query`.
///
/// Returns `(window index, item, squared distance)`.
fn nearest_in_window(
    tree: &ImmutableKdTree<f64, 2>,
    window: &[[f64; 2]],
    query: WindowQuery,
) -> Option<(usize, u64, f64)> {
    let candidates = match query {
        WindowQuery::FirstPoint => &window[..window.len().min(1)],
        WindowQuery::EachPoint => window,
    };

    let mut best: Option<(usize, u64, f64)> = None;
    for (i, q) in candidates.iter().enumerate() {
        let nn = tree.nearest_one::<SquaredEuclidean>(q);
        if best.is_none_or(|(_, _, d)| nn.distance < d) {
            best = Some((i, nn.item, nn.distance));
        }
    }
    best
}

/// Estimate the intercondylar gap of a femur surface.
pub fn find_gap(mesh: &Mesh, params: &GapParams) -> FeatureResult<FemurGap> {
    params.validate()?;
    let h = params.axes.horizontal.index();
    let v = params.axes.vertical.index();
    let d = params.axes.depth.index();

    let (min, max) = mesh
        .bounds()
        .ok_or_else(|| FeatureError::insufficient("origin", "femur surface has no vertices"))?;

    let mut origin = nalgebra::center(&min, &max);
    origin[v] /= params.vertical_divisor;
    origin[d] -= (max[d] - min[d]) * params.depth_shift_fraction;

    let horizontal = slice_points(mesh, origin, params.axes.vertical.unit());
    if horizontal.is_empty() {
        return Err(FeatureError::insufficient(
            "horizontal slice",
            format!("no surface crosses the plane through {origin:?}"),
        ));
    }
    let sagittal = slice_points(mesh, origin, params.axes.depth.unit());
    if sagittal.is_empty() {
        return Err(FeatureError::insufficient(
            "sagittal slice",
            format!("no surface crosses the plane through {origin:?}"),
        ));
    }

    let max_horizontal = horizontal
        .iter()
        .map(|p| p[h])
        .fold(f64::NEG_INFINITY, f64::max);
    let frame = params.window_fraction * max_horizontal;
    let centre = origin[h];

    let in_plane = |p: &Point3<f64>| [p[h], p[d]];
    let right: Vec<[f64; 2]> = sagittal
        .iter()
        .filter(|p| p[h] > centre && p[h] < centre + frame)
        .map(in_plane)
        .collect();
    let left: Vec<[f64; 2]> = sagittal
        .iter()
        .filter(|p| p[h] > centre - frame && p[h] < centre)
        .map(in_plane)
        .collect();

    debug!(
        horizontal_points = horizontal.len(),
        sagittal_points = sagittal.len(),
        right_window = right.len(),
        left_window = left.len(),
        frame,
        "Sliced femur"
    );

    // Horizontal-slice points share the vertical coordinate, so the search
    // runs in the slice plane. Items are indices into `horizontal`; planar
    // faces put many points on one coordinate, which the immutable tree allows.
    let plane_points: Vec<[f64; 2]> = horizontal.iter().map(in_plane).collect();
    let tree: ImmutableKdTree<f64, 2> = ImmutableKdTree::new_from_slice(&plane_points);

    let (right_idx, right_item, _) = nearest_in_window(&tree, &right, params.query)
        .ok_or_else(|| {
            FeatureError::insufficient(
                "right window",
                format!("no sagittal points between {centre} and {}", centre + frame),
            )
        })?;
    let (left_idx, left_item, _) = nearest_in_window(&tree, &left, params.query)
        .ok_or_else(|| {
            FeatureError::insufficient(
                "left window",
                format!("no sagittal points between {} and {centre}", centre - frame),
            )
        })?;
    trace!(right_idx, left_idx, "Selected window points");

    let mut right_point = horizontal[right_item as usize];
    let mut left_point = horizontal[left_item as usize];
    for axis in [v, d] {
        let level = right_point[axis].max(left_point[axis]);
        right_point[axis] = level;
        left_point[axis] = level;
    }

    let distance = measure_distance(left_point, right_point).distance;
    debug!(distance, "Measured femur gap");

    Ok(FemurGap {
        distance,
        left_point,
        right_point,
        origin,
        frame,
    })
}
