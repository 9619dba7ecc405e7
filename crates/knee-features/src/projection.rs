//! Planar projection and off-screen rasterization.
//!
//! A surface is flattened onto a plane and drawn, white on a transparent
//! background, by an orthographic camera looking along the plane normal.
//! The first colour channel of the result is the binary silhouette the
//! contour classifier works on.
//!
//! Rasterization is deterministic: triangle corners are snapped to pixel
//! centres and filled with their edges included. There is no anti-aliasing,
//! so the output contains only the values 0 and 255.

use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use nalgebra::{Point3, Vector3};
use tracing::{debug, trace};

use crate::Mesh;
use crate::error::{FeatureError, FeatureResult};

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 0]);
const FOREGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Snapped pixel coordinates are clamped to this range so polygon edges
/// stay finite to walk.
const SNAP_LIMIT: f64 = (1 << 20) as f64;

/// Camera and viewport settings for [`project_and_rasterize`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProjectionParams {
    /// Camera distance from the plane origin, in multiples of the surface
    /// bounding-box diagonal.
    ///
    /// Larger values make the silhouette smaller in the image.
    ///
    /// Default: `5.0`
    pub camera_offset_factor: f64,

    /// Vertical view angle in degrees. Together with the camera distance it
    /// fixes the visible height of the orthographic view.
    ///
    /// Default: `30.0`
    pub view_angle_deg: f64,

    /// Viewport width in pixels.
    ///
    /// Default: `1024`
    pub viewport_width: u32,

    /// Viewport height in pixels.
    ///
    /// Default: `768`
    pub viewport_height: u32,

    /// Projection plane normal used by the health features. Looking along
    /// +Y flattens a tibial cartilage layer onto the tibial plateau.
    ///
    /// Default: `[0, 1, 0]`
    pub normal: [f64; 3],

    /// Preferred image "up" direction. Replaced by +X when parallel to the
    /// projection normal.
    ///
    /// Default: `[0, 0, 1]`
    pub view_up: [f64; 3],
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            camera_offset_factor: 5.0,
            view_angle_deg: 30.0,
            viewport_width: 1024,
            viewport_height: 768,
            normal: [0.0, 1.0, 0.0],
            view_up: [0.0, 0.0, 1.0],
        }
    }
}

impl ProjectionParams {
    /// Parameters for a smaller, faster viewport.
    pub fn preview() -> Self {
        Self {
            viewport_width: 320,
            viewport_height: 240,
            ..Default::default()
        }
    }

    pub fn normal(&self) -> Vector3<f64> {
        Vector3::from(self.normal)
    }

    pub fn validate(&self) -> FeatureResult<()> {
        if !(self.camera_offset_factor.is_finite() && self.camera_offset_factor > 0.0) {
            return Err(FeatureError::config(format!(
                "camera_offset_factor must be positive, got {}",
                self.camera_offset_factor
            )));
        }
        if !(self.view_angle_deg > 0.0 && self.view_angle_deg < 180.0) {
            return Err(FeatureError::config(format!(
                "view_angle_deg must lie in (0, 180), got {}",
                self.view_angle_deg
            )));
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(FeatureError::config(format!(
                "viewport {}x{} has no pixels",
                self.viewport_width, self.viewport_height
            )));
        }
        if self.normal().norm() < f64::EPSILON {
            return Err(FeatureError::config("projection normal has zero length"));
        }
        Ok(())
    }
}

/// Project points orthogonally onto the plane through `origin` with `normal`.
pub fn project_points_to_plane(
    points: &[Point3<f64>],
    origin: Point3<f64>,
    normal: Vector3<f64>,
) -> Vec<Point3<f64>> {
    let n = normal.normalize();
    points
        .iter()
        .map(|p| p - n * (p - origin).dot(&n))
        .collect()
}

/// Orthographic camera looking along a plane normal.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Point3<f64>,
    pub focal_point: Point3<f64>,
    /// Unit image-right direction.
    pub right: Vector3<f64>,
    /// Unit image-up direction.
    pub up: Vector3<f64>,
    /// Half of the visible height in world units.
    pub half_height: f64,
}

impl Camera {
    /// Place a camera at `focal_point - normal * distance`, aimed at the
    /// focal point.
    pub fn looking_along(
        focal_point: Point3<f64>,
        normal: Vector3<f64>,
        distance: f64,
        params: &ProjectionParams,
    ) -> FeatureResult<Self> {
        let norm = normal.norm();
        if !norm.is_finite() || norm < f64::EPSILON {
            return Err(FeatureError::rendering("projection normal has zero length"));
        }
        let view_dir = normal / norm;

        let up = [Vector3::from(params.view_up), Vector3::x(), Vector3::y()]
            .into_iter()
            .map(|hint| hint - view_dir * hint.dot(&view_dir))
            .find(|u| u.norm() > 1e-9)
            .map(|u| u.normalize())
            .ok_or_else(|| FeatureError::rendering("cannot derive a view-up direction"))?;
        let right = view_dir.cross(&up);

        let half_height = distance * (params.view_angle_deg.to_radians() / 2.0).tan();
        if !(half_height.is_finite() && half_height > 0.0) {
            return Err(FeatureError::rendering(format!(
                "invalid view height {half_height} for camera distance {distance}"
            )));
        }

        Ok(Self {
            position: focal_point - view_dir * distance,
            focal_point,
            right,
            up,
            half_height,
        })
    }

    /// Map a world point to continuous pixel coordinates, y pointing down.
    pub fn to_pixel(&self, p: &Point3<f64>, width: u32, height: u32) -> (f64, f64) {
        let rel = p - self.focal_point;
        let half_width = self.half_height * width as f64 / height as f64;
        let sx = rel.dot(&self.right) / half_width;
        let sy = rel.dot(&self.up) / self.half_height;
        (
            (sx + 1.0) * 0.5 * width as f64,
            (1.0 - sy) * 0.5 * height as f64,
        )
    }
}

/// Owns the colour buffer used for off-screen rendering.
///
/// The buffer is cleared and reused between renders and only reallocated
/// when the viewport size changes.
#[derive(Debug, Clone)]
pub struct OffscreenRenderer {
    buffer: RgbaImage,
}

impl OffscreenRenderer {
    pub fn new(width: u32, height: u32) -> FeatureResult<Self> {
        if width == 0 || height == 0 {
            return Err(FeatureError::rendering(format!(
                "viewport {width}x{height} has no pixels"
            )));
        }
        Ok(Self {
            buffer: RgbaImage::new(width, height),
        })
    }

    pub fn for_params(params: &ProjectionParams) -> FeatureResult<Self> {
        Self::new(params.viewport_width, params.viewport_height)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// The RGBA buffer of the last render.
    pub fn buffer(&self) -> &RgbaImage {
        &self.buffer
    }

    fn prepare(&mut self, width: u32, height: u32) -> FeatureResult<()> {
        if width == 0 || height == 0 {
            return Err(FeatureError::rendering(format!(
                "viewport {width}x{height} has no pixels"
            )));
        }
        if self.buffer.dimensions() != (width, height) {
            debug!(width, height, "Resizing render buffer");
            self.buffer = RgbaImage::new(width, height);
        } else {
            for pixel in self.buffer.pixels_mut() {
                *pixel = BACKGROUND;
            }
        }
        Ok(())
    }

    /// Fill a triangle given in continuous pixel coordinates.
    ///
    /// Corners are snapped to the nearest pixel centre. Triangles that
    /// collapse to a single pixel still mark it.
    fn fill_triangle(&mut self, corners: [(f64, f64); 3]) -> bool {
        let (width, height) = self.buffer.dimensions();
        let mut poly: Vec<Point<i32>> = Vec::with_capacity(3);
        for (x, y) in corners {
            let p = Point::new(snap(x), snap(y));
            if poly.last() != Some(&p) {
                poly.push(p);
            }
        }
        while poly.len() > 1 && poly.first() == poly.last() {
            poly.pop();
        }

        let outside = poly.iter().all(|p| p.x < 0)
            || poly.iter().all(|p| p.y < 0)
            || poly.iter().all(|p| p.x >= width as i32)
            || poly.iter().all(|p| p.y >= height as i32);
        if outside {
            return false;
        }

        match poly.as_slice() {
            [] => return false,
            [p] => self.buffer.put_pixel(p.x as u32, p.y as u32, FOREGROUND),
            _ => draw_polygon_mut(&mut self.buffer, &poly, FOREGROUND),
        }
        true
    }

    /// First colour channel of the buffer as a grayscale image.
    pub fn channel(&self, channel: usize) -> GrayImage {
        let (width, height) = self.buffer.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            Luma([self.buffer.get_pixel(x, y)[channel]])
        })
    }

    /// Project `mesh` onto a plane and rasterize it into this renderer's
    /// buffer. See [`project_and_rasterize`].
    pub fn project_and_rasterize(
        &mut self,
        mesh: &Mesh,
        origin: Option<Point3<f64>>,
        normal: Vector3<f64>,
        params: &ProjectionParams,
    ) -> FeatureResult<GrayImage> {
        if mesh.is_empty() {
            return Err(FeatureError::rendering("surface has no faces"));
        }
        if mesh.vertices.iter().any(|v| !v.position.coords.iter().all(|c| c.is_finite())) {
            return Err(FeatureError::rendering("surface has non-finite coordinates"));
        }

        let origin = match origin {
            Some(o) => o,
            None => mesh
                .center()
                .ok_or_else(|| FeatureError::rendering("surface has no vertices"))?,
        };
        let distance = mesh.length() * params.camera_offset_factor;
        let camera = Camera::looking_along(origin, normal, distance, params)?;

        let (width, height) = (params.viewport_width, params.viewport_height);
        self.prepare(width, height)?;

        let positions: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| v.position).collect();
        let projected = project_points_to_plane(&positions, origin, normal);
        let pixels: Vec<(f64, f64)> = projected
            .iter()
            .map(|p| camera.to_pixel(p, width, height))
            .collect();

        let mut drawn = 0usize;
        for face in &mesh.faces {
            if self.fill_triangle(face.map(|i| pixels[i as usize])) {
                drawn += 1;
            }
        }

        trace!(faces = mesh.face_count(), drawn, "Rasterized projection");
        debug!(
            width,
            height,
            distance,
            half_height = camera.half_height,
            "Rendered planar projection"
        );

        Ok(self.channel(0))
    }
}

/// Pixel index whose centre is nearest to continuous coordinate `c`.
#[inline]
fn snap(c: f64) -> i32 {
    (c - 0.5).round().clamp(-SNAP_LIMIT, SNAP_LIMIT) as i32
}

/// Project a surface onto a plane and rasterize its silhouette.
///
/// `origin` defaults to the centre of the surface bounding box. Returns the
/// first colour channel of a white-on-transparent rendering: 255 where the
/// surface covers a pixel centre, 0 elsewhere.
///
/// Uses a fresh [`OffscreenRenderer`]; batch callers should keep one and
/// call [`OffscreenRenderer::project_and_rasterize`] instead.
pub fn project_and_rasterize(
    mesh: &Mesh,
    origin: Option<Point3<f64>>,
    normal: Vector3<f64>,
    params: &ProjectionParams,
) -> FeatureResult<GrayImage> {
    let mut renderer = OffscreenRenderer::for_params(params)?;
    renderer.project_and_rasterize(mesh, origin, normal, params)
}

/// Write a projection image as PNG.
pub fn save_projection(image: &GrayImage, path: &std::path::Path) -> FeatureResult<()> {
    image
        .save(path)
        .map_err(|e| FeatureError::io_write(path, std::io::Error::other(e)))?;
    debug!(path = %path.display(), "Saved projection image");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;

    /// Flat square in the XZ plane, seen along +Y.
    fn square_xz(size: f64) -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(size, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(size, 0.0, size));
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, size));
        mesh.faces.push([0, 1, 2]);
        mesh.faces.push([0, 2, 3]);
        mesh
    }

    #[test]
    fn test_project_points_to_plane() {
        let points = [Point3::new(1.0, 7.0, 2.0), Point3::new(-3.0, -2.0, 4.0)];
        let projected = project_points_to_plane(&points, Point3::new(0.0, 1.0, 0.0), Vector3::y());
        assert_eq!(projected[0], Point3::new(1.0, 1.0, 2.0));
        assert_eq!(projected[1], Point3::new(-3.0, 1.0, 4.0));
    }

    #[test]
    fn test_camera_frame() {
        let params = ProjectionParams::default();
        let camera = Camera::looking_along(Point3::origin(), Vector3::y(), 10.0, &params).unwrap();
        assert!((camera.up - Vector3::z()).norm() < 1e-12);
        assert!((camera.right - Vector3::x()).norm() < 1e-12);
        assert!((camera.position - Point3::new(0.0, -10.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_view_up_fallback() {
        let params = ProjectionParams::default();
        let camera = Camera::looking_along(Point3::origin(), Vector3::z(), 10.0, &params).unwrap();
        assert!((camera.up - Vector3::x()).norm() < 1e-12);
    }

    #[test]
    fn test_square_is_centered_and_binary() {
        let params = ProjectionParams::preview();
        let image = project_and_rasterize(&square_xz(1.0), None, Vector3::y(), &params).unwrap();

        assert_eq!(image.dimensions(), (320, 240));
        assert_eq!(image.get_pixel(160, 120)[0], 255);
        assert_eq!(image.get_pixel(0, 0)[0], 0);
        assert!(image.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let params = ProjectionParams::preview();
        let mesh = square_xz(2.0);
        let a = project_and_rasterize(&mesh, None, Vector3::y(), &params).unwrap();
        let b = project_and_rasterize(&mesh, None, Vector3::y(), &params).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_renderer_buffer_is_cleared_between_renders() {
        let params = ProjectionParams::preview();
        let mut renderer = OffscreenRenderer::for_params(&params).unwrap();

        let visible = renderer
            .project_and_rasterize(&square_xz(1.0), None, Vector3::y(), &params)
            .unwrap();
        assert!(visible.pixels().any(|p| p[0] == 255));

        // A far-off origin puts the square outside the view
        let empty = renderer
            .project_and_rasterize(
                &square_xz(1.0),
                Some(Point3::new(100.0, 0.0, 100.0)),
                Vector3::y(),
                &params,
            )
            .unwrap();
        assert!(empty.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_fill_triangle_includes_edges() {
        let mut renderer = OffscreenRenderer::new(16, 16).unwrap();
        assert!(renderer.fill_triangle([(0.5, 0.5), (8.5, 0.5), (0.5, 8.5)]));
        let buffer = renderer.buffer();

        for (x, y) in [(0, 0), (8, 0), (0, 8), (4, 4), (2, 3)] {
            assert_eq!(*buffer.get_pixel(x, y), FOREGROUND, "pixel ({x}, {y})");
        }
        for (x, y) in [(5, 5), (8, 8), (9, 0), (15, 15)] {
            assert_eq!(*buffer.get_pixel(x, y), BACKGROUND, "pixel ({x}, {y})");
        }
    }

    #[test]
    fn test_fill_triangle_degenerate_and_offscreen() {
        let mut renderer = OffscreenRenderer::new(16, 16).unwrap();

        // Collapses onto one pixel centre
        assert!(renderer.fill_triangle([(10.2, 10.2), (10.4, 10.3), (10.3, 10.45)]));
        assert_eq!(
            renderer.buffer().pixels().filter(|p| **p == FOREGROUND).count(),
            1
        );
        assert_eq!(*renderer.buffer().get_pixel(10, 10), FOREGROUND);

        assert!(!renderer.fill_triangle([(-9.0, 1.0), (-3.0, 2.0), (-5.0, 9.0)]));
        assert!(!renderer.fill_triangle([(1e12, 1.0), (2e12, 2.0), (3e12, 9.0)]));
        assert_eq!(
            renderer.buffer().pixels().filter(|p| **p == FOREGROUND).count(),
            1
        );
    }

    #[test]
    fn test_rendering_failures() {
        let params = ProjectionParams::default();
        let err = project_and_rasterize(&Mesh::new(), None, Vector3::y(), &params).unwrap_err();
        assert!(matches!(err, FeatureError::RenderingFailure { .. }));

        let err = project_and_rasterize(&square_xz(1.0), None, Vector3::zeros(), &params).unwrap_err();
        assert!(matches!(err, FeatureError::RenderingFailure { .. }));

        let zero = ProjectionParams {
            viewport_width: 0,
            ..Default::default()
        };
        let err = project_and_rasterize(&square_xz(1.0), None, Vector3::y(), &zero).unwrap_err();
        assert!(matches!(err, FeatureError::RenderingFailure { .. }));

        let mut bad = square_xz(1.0);
        bad.vertices[0].position.x = f64::NAN;
        let err = project_and_rasterize(&bad, None, Vector3::y(), &params).unwrap_err();
        assert!(matches!(err, FeatureError::RenderingFailure { .. }));
    }

    #[test]
    fn test_params_validate() {
        assert!(ProjectionParams::default().validate().is_ok());
        let bad = ProjectionParams {
            camera_offset_factor: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
