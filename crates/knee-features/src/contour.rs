//! Contour extraction and cartilage health classification.
//!
//! A projected cartilage silhouette is healthy when it is a single closed
//! region (no holes, no separate islands) whose outline is close to convex.
//! Two tests decide this:
//!
//! 1. **Hole test**: the thresholded image must yield exactly one border.
//!    Borders are found with Suzuki-Abe border following, which reports
//!    hole borders as well as outer borders, so a ring yields two.
//! 2. **Roughness test**: for the largest border, the ratio of its convex
//!    hull area to its own enclosed area must stay below a cutoff.

use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Thresholds for [`classify_health`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthParams {
    /// Pixels strictly brighter than this are foreground.
    ///
    /// Default: `100`
    pub intensity_threshold: u8,

    /// Convex hull area / contour area at or above which the outline counts
    /// as rough.
    ///
    /// Default: `1.2`
    pub convexity_cutoff: f64,
}

impl Default for HealthParams {
    fn default() -> Self {
        Self {
            intensity_threshold: 100,
            convexity_cutoff: 1.2,
        }
    }
}

/// A closed border in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelContour {
    pub points: Vec<Point<i32>>,
    /// True for hole borders.
    pub is_hole: bool,
}

impl PixelContour {
    pub fn new(points: Vec<Point<i32>>) -> Self {
        Self {
            points,
            is_hole: false,
        }
    }

    pub fn from_coords(coords: &[(i32, i32)]) -> Self {
        Self::new(coords.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    /// Enclosed area (shoelace formula).
    pub fn area(&self) -> f64 {
        shoelace_area(&self.points)
    }

    /// Convex hull vertices.
    pub fn hull(&self) -> Vec<Point<i32>> {
        if self.points.len() < 3 {
            return self.points.clone();
        }
        convex_hull(self.points.as_slice())
    }

    pub fn hull_area(&self) -> f64 {
        shoelace_area(&self.hull())
    }
}

fn shoelace_area(points: &[Point<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: i64 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
        })
        .sum();
    twice.unsigned_abs() as f64 / 2.0
}

/// Binarize: foreground 255 where `pixel > threshold`, 0 elsewhere.
pub fn threshold_image(image: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if image.get_pixel(x, y)[0] > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// All closed borders (outer and hole) of the thresholded image.
pub fn extract_contours(image: &GrayImage, threshold: u8) -> Vec<PixelContour> {
    let binary = threshold_image(image, threshold);
    find_contours::<i32>(&binary)
        .into_iter()
        .map(|c| PixelContour {
            points: c.points,
            is_hole: c.border_type == BorderType::Hole,
        })
        .collect()
}

/// Outcome of the health tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum HealthVerdict {
    Healthy,
    /// Border count other than one.
    Hole { contours: usize },
    /// Convexity ratio at or above the cutoff.
    Rough { ratio: f64 },
    /// Single border enclosing no area.
    Degenerate,
}

/// Detailed result of [`assess_health`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthAssessment {
    pub contour_count: usize,
    /// Area of the largest border, 0 when there is none.
    pub contour_area: f64,
    /// Convex hull area of the largest border.
    pub hull_area: f64,
    /// `hull_area / contour_area`, absent for zero contour area.
    pub convexity_ratio: Option<f64>,
    pub verdict: HealthVerdict,
}

impl HealthAssessment {
    pub fn is_healthy(&self) -> bool {
        self.verdict == HealthVerdict::Healthy
    }
}

/// Whether a hull/contour area pair counts as rough.
///
/// Zero contour area is always rough.
pub fn is_rough(hull_area: f64, contour_area: f64, cutoff: f64) -> bool {
    if contour_area <= 0.0 {
        return true;
    }
    hull_area / contour_area >= cutoff
}

/// Run both health tests over already extracted borders.
pub fn assess_contours(contours: &[PixelContour], params: &HealthParams) -> HealthAssessment {
    let largest = contours
        .iter()
        .map(|c| (c, c.area()))
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let (contour_area, hull_area) = match largest {
        Some((c, area)) => (area, c.hull_area()),
        None => (0.0, 0.0),
    };
    let convexity_ratio = (contour_area > 0.0).then(|| hull_area / contour_area);

    let verdict = if contours.len() != 1 {
        HealthVerdict::Hole {
            contours: contours.len(),
        }
    } else if contour_area <= 0.0 {
        HealthVerdict::Degenerate
    } else if is_rough(hull_area, contour_area, params.convexity_cutoff) {
        HealthVerdict::Rough {
            ratio: hull_area / contour_area,
        }
    } else {
        HealthVerdict::Healthy
    };

    HealthAssessment {
        contour_count: contours.len(),
        contour_area,
        hull_area,
        convexity_ratio,
        verdict,
    }
}

/// Threshold, extract borders and run both health tests.
pub fn assess_health(image: &GrayImage, params: &HealthParams) -> HealthAssessment {
    let contours = extract_contours(image, params.intensity_threshold);
    let assessment = assess_contours(&contours, params);
    debug!(
        contours = assessment.contour_count,
        area = assessment.contour_area,
        hull_area = assessment.hull_area,
        verdict = ?assessment.verdict,
        "Assessed projection health"
    );
    assessment
}

/// True only when the image shows a single, near-convex region.
pub fn classify_health(image: &GrayImage, params: &HealthParams) -> bool {
    assess_health(image, params).is_healthy()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_from(width: u32, height: u32, inside: impl Fn(u32, u32) -> bool) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if inside(x, y) { Luma([255]) } else { Luma([0]) }
        })
    }

    fn disc(cx: f64, cy: f64, r: f64) -> impl Fn(u32, u32) -> bool {
        move |x, y| {
            let (dx, dy) = (x as f64 - cx, y as f64 - cy);
            dx * dx + dy * dy <= r * r
        }
    }

    #[test]
    fn test_single_blob_is_healthy() {
        let image = image_from(64, 64, disc(32.0, 32.0, 20.0));
        let assessment = assess_health(&image, &HealthParams::default());
        assert_eq!(assessment.contour_count, 1);
        assert!(assessment.convexity_ratio.unwrap() < 1.2);
        assert!(classify_health(&image, &HealthParams::default()));
    }

    #[test]
    fn test_rectangle_has_unit_ratio() {
        let image = image_from(50, 50, |x, y| (10..30).contains(&x) && (20..30).contains(&y));
        let assessment = assess_health(&image, &HealthParams::default());
        assert_eq!(assessment.contour_area, 19.0 * 9.0);
        assert_eq!(assessment.convexity_ratio, Some(1.0));
        assert!(assessment.is_healthy());
    }

    #[test]
    fn test_annulus_has_two_contours() {
        let outer = disc(32.0, 32.0, 20.0);
        let inner = disc(32.0, 32.0, 8.0);
        let image = image_from(64, 64, |x, y| outer(x, y) && !inner(x, y));

        let contours = extract_contours(&image, 100);
        assert_eq!(contours.len(), 2);
        assert_eq!(contours.iter().filter(|c| c.is_hole).count(), 1);

        let assessment = assess_health(&image, &HealthParams::default());
        assert_eq!(assessment.verdict, HealthVerdict::Hole { contours: 2 });
        assert!(!classify_health(&image, &HealthParams::default()));
    }

    #[test]
    fn test_two_islands_are_unhealthy() {
        let a = disc(16.0, 32.0, 8.0);
        let b = disc(48.0, 32.0, 8.0);
        let image = image_from(64, 64, |x, y| a(x, y) || b(x, y));
        assert!(!classify_health(&image, &HealthParams::default()));
    }

    #[test]
    fn test_empty_image_is_unhealthy() {
        let image = GrayImage::new(32, 32);
        let assessment = assess_health(&image, &HealthParams::default());
        assert_eq!(assessment.verdict, HealthVerdict::Hole { contours: 0 });
    }

    #[test]
    fn test_threshold_is_strict() {
        let image = GrayImage::from_pixel(8, 8, Luma([100]));
        assert!(extract_contours(&image, 100).is_empty());
        let image = GrayImage::from_pixel(8, 8, Luma([101]));
        assert_eq!(extract_contours(&image, 100).len(), 1);
    }

    #[test]
    fn test_ratio_at_cutoff_is_rough() {
        // Notched rectangle: area 10, hull area 12
        let contour = PixelContour::from_coords(&[(0, 0), (4, 0), (4, 3), (2, 2), (0, 3)]);
        assert_eq!(contour.area(), 10.0);
        assert_eq!(contour.hull_area(), 12.0);

        let assessment = assess_contours(&[contour], &HealthParams::default());
        assert!(matches!(assessment.verdict, HealthVerdict::Rough { .. }));
    }

    #[test]
    fn test_ratio_just_below_cutoff_is_smooth() {
        assert!(!is_rough(11.999, 10.0, 1.2));
        assert!(is_rough(12.0, 10.0, 1.2));

        // 12x10 box with a shallow notch: area 102, hull area 120
        let shallow = PixelContour::from_coords(&[(0, 0), (12, 0), (12, 10), (6, 7), (0, 10)]);
        assert_eq!(shallow.area(), 102.0);
        assert_eq!(shallow.hull_area(), 120.0);
        let assessment = assess_contours(&[shallow], &HealthParams::default());
        assert!(assessment.convexity_ratio.unwrap() < 1.2);
        assert_eq!(assessment.verdict, HealthVerdict::Healthy);

        // Ratio exactly 1.2, cutoff nudged above it
        let notched = PixelContour::from_coords(&[(0, 0), (4, 0), (4, 3), (2, 2), (0, 3)]);
        let params = HealthParams {
            convexity_cutoff: 1.2 + 1e-9,
            ..Default::default()
        };
        assert_eq!(assess_contours(&[notched], &params).verdict, HealthVerdict::Healthy);
    }

    #[test]
    fn test_zero_area_is_unhealthy() {
        let image = image_from(16, 16, |x, y| x == 8 && y == 8);
        let assessment = assess_health(&image, &HealthParams::default());
        assert_eq!(assessment.contour_count, 1);
        assert_eq!(assessment.verdict, HealthVerdict::Degenerate);
        assert!(assessment.convexity_ratio.is_none());
        assert!(is_rough(0.0, 0.0, 1.2));
    }
}
