//! Property-based tests for feature extraction.
//!
//! Run with: cargo test -p knee-features -- proptest

use image::{GrayImage, Luma};
use knee_features::{
    Cell, CellKind, FeatureRow, FeatureTable, FeatureValue, Mesh, ProjectionParams, Vertex,
    VolumeMesh, contour::is_rough, curvature_summary, extract_contours, project_and_rasterize,
    slice_points,
};
use nalgebra::{Point3, Vector3};
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

fn arb_position() -> impl Strategy<Value = [f64; 3]> {
    prop::array::uniform3(-50.0..50.0f64)
}

/// Random triangle soup with valid indices.
fn arb_mesh(max_vertices: usize, max_faces: usize) -> impl Strategy<Value = Mesh> {
    (3..=max_vertices).prop_flat_map(move |n| {
        let vertices = prop::collection::vec(arb_position(), n);
        let faces = prop::collection::vec(prop::array::uniform3(0..n as u32), 1..=max_faces);
        (vertices, faces).prop_map(|(vertices, faces)| Mesh {
            vertices: vertices
                .into_iter()
                .map(|[x, y, z]| Vertex::from_coords(x, y, z))
                .collect(),
            faces,
        })
    })
}

/// Axis-aligned hexahedral block with the given corner and extents.
fn block(origin: [f64; 3], size: [f64; 3]) -> VolumeMesh {
    let mut mesh = VolumeMesh::new();
    let [x0, y0, z0] = origin;
    let [x1, y1, z1] = [x0 + size[0], y0 + size[1], z0 + size[2]];
    for z in [z0, z1] {
        for (x, y) in [(x0, y0), (x1, y0), (x1, y1), (x0, y1)] {
            mesh.points.push(Point3::new(x, y, z));
        }
    }
    mesh.cells.push(Cell::new(CellKind::Hexahedron, (0..8).collect()));
    mesh
}

/// Flat grid in the X/Y plane at height `z`.
fn flat_grid(n: usize, spacing: f64, z: f64) -> Mesh {
    let mut mesh = Mesh::new();
    for j in 0..=n {
        for i in 0..=n {
            mesh.vertices
                .push(Vertex::from_coords(i as f64 * spacing, j as f64 * spacing, z));
        }
    }
    let row = (n + 1) as u32;
    for j in 0..n as u32 {
        for i in 0..n as u32 {
            let a = j * row + i;
            mesh.faces.push([a, a + 1, a + row + 1]);
            mesh.faces.push([a, a + row + 1, a + row]);
        }
    }
    mesh
}

fn arb_code() -> impl Strategy<Value = String> {
    "[A-Z][0-9]{2}"
}

// =============================================================================
// Projection
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Rendered projections are strictly binary.
    #[test]
    fn proptest_projection_is_binary(mesh in arb_mesh(12, 16)) {
        let params = ProjectionParams {
            viewport_width: 64,
            viewport_height: 48,
            ..Default::default()
        };
        if let Ok(image) = project_and_rasterize(&mesh, None, params.normal(), &params) {
            prop_assert_eq!(image.dimensions(), (64, 48));
            prop_assert!(image.pixels().all(|p| p[0] == 0 || p[0] == 255));
        }
    }

    /// Rendering the same mesh twice gives the same image.
    #[test]
    fn proptest_projection_is_deterministic(mesh in arb_mesh(10, 10)) {
        let params = ProjectionParams {
            viewport_width: 48,
            viewport_height: 48,
            ..Default::default()
        };
        let first = project_and_rasterize(&mesh, None, params.normal(), &params);
        let second = project_and_rasterize(&mesh, None, params.normal(), &params);
        match (first, second) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(_), Err(_)) => {}
            _ => prop_assert!(false, "rendering succeeded only once"),
        }
    }
}

// =============================================================================
// Contours
// =============================================================================

proptest! {
    /// A filled rectangle is always a single outer border.
    #[test]
    fn proptest_rectangle_is_one_contour(
        x in 1u32..20,
        y in 1u32..20,
        w in 1u32..20,
        h in 1u32..20,
    ) {
        let image = GrayImage::from_fn(48, 48, |px, py| {
            if px >= x && px < x + w && py >= y && py < y + h {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        let contours = extract_contours(&image, 100);
        prop_assert_eq!(contours.len(), 1);
        prop_assert!(!contours[0].is_hole);
    }

    /// Raising the hull area never turns a rough contour smooth.
    #[test]
    fn proptest_roughness_is_monotone(
        area in 1.0..1000.0f64,
        hull in 1.0..2000.0f64,
        extra in 0.0..500.0f64,
        cutoff in 1.0..2.0f64,
    ) {
        if is_rough(hull, area, cutoff) {
            prop_assert!(is_rough(hull + extra, area, cutoff));
        }
    }
}

// =============================================================================
// Geometry
// =============================================================================

proptest! {
    /// Flat surfaces have zero mean curvature at every scale and height.
    #[test]
    fn proptest_flat_surface_has_no_curvature(
        n in 2usize..8,
        spacing in 0.1..10.0f64,
        z in -100.0..100.0f64,
    ) {
        let surface = flat_grid(n, spacing, z);
        let volume = VolumeMesh::from(&surface);
        let summary = curvature_summary(&volume, &Default::default()).unwrap();
        prop_assert!(summary.mean_abs.abs() < 1e-9, "mean {}", summary.mean_abs);
    }

    /// Slice points are unique and lie on the cutting plane.
    #[test]
    fn proptest_slice_points_on_plane(
        origin in arb_position(),
        size in prop::array::uniform3(0.5..20.0f64),
        t in 0.05..0.95f64,
    ) {
        let surface = block(origin, size).extract_surface();
        let point = Point3::new(origin[0], origin[1] + size[1] * t, origin[2]);
        let normal = Vector3::y();
        let points = slice_points(&surface, point, normal);

        prop_assert!(!points.is_empty());
        for (i, p) in points.iter().enumerate() {
            prop_assert!((p.y - point.y).abs() < 1e-9);
            prop_assert!(!points[..i].contains(p));
        }
    }
}

// =============================================================================
// Tables
// =============================================================================

proptest! {
    /// A left join keeps every left row in order and adds the right columns.
    #[test]
    fn proptest_left_join_keeps_left_rows(
        left_codes in prop::collection::vec(arb_code(), 0..12),
        right_codes in prop::collection::hash_set(arb_code(), 0..12),
    ) {
        let mut left = FeatureTable::new(vec!["Code".to_string(), "Age".to_string()]);
        for code in &left_codes {
            left.push_row(vec![FeatureValue::Text(code.clone()), FeatureValue::Integer(40)]);
        }
        let rows = right_codes
            .iter()
            .map(|code| FeatureRow { code: code.clone(), values: vec![FeatureValue::Bool(true)] })
            .collect();
        let right = FeatureTable::from_rows(&["healthy".to_string()], rows);

        let joined = left.left_join(&right).unwrap();
        prop_assert_eq!(joined.row_count(), left_codes.len());
        prop_assert_eq!(joined.column_count(), 3);
        prop_assert_eq!(joined.codes().unwrap(), left_codes.clone());

        for (row, code) in joined.rows().iter().zip(&left_codes) {
            let expected = if right_codes.contains(code) {
                FeatureValue::Bool(true)
            } else {
                FeatureValue::Missing
            };
            prop_assert_eq!(&row[2], &expected);
        }
    }
}
