//! Plane slicing and distance measurement.
//!
//! # Example
//!
//! ```
//! use knee_features::{Mesh, Vertex};
//! use knee_features::measure::slice_points;
//! use nalgebra::{Point3, Vector3};
//!
//! let mut mesh = Mesh::new();
//! mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
//! mesh.vertices.push(Vertex::from_coords(10.0, 0.0, 0.0));
//! mesh.vertices.push(Vertex::from_coords(5.0, 10.0, 0.0));
//! mesh.vertices.push(Vertex::from_coords(5.0, 5.0, 10.0));
//! mesh.faces.push([0, 1, 3]);
//! mesh.faces.push([1, 2, 3]);
//! mesh.faces.push([2, 0, 3]);
//! mesh.faces.push([0, 2, 1]);
//!
//! let points = slice_points(&mesh, Point3::new(0.0, 0.0, 5.0), Vector3::z());
//! assert_eq!(points.len(), 3);
//! assert!(points.iter().all(|p| (p.z - 5.0).abs() < 1e-12));
//! ```

use nalgebra::{Point3, Vector3};

use crate::Mesh;

/// Distance measurement result.
#[derive(Debug, Clone)]
pub struct DistanceMeasurement {
    pub from: Point3<f64>,
    pub to: Point3<f64>,
    /// Euclidean distance.
    pub distance: f64,
}

/// Intersect every triangle with a plane and collect the resulting segments.
///
/// A triangle touching the plane at a single vertex contributes nothing; a
/// triangle lying in the plane is skipped.
pub fn slice_segments(
    mesh: &Mesh,
    plane_point: Point3<f64>,
    plane_normal: Vector3<f64>,
) -> Vec<(Point3<f64>, Point3<f64>)> {
    let normal = plane_normal.normalize();
    let mut segments = Vec::new();

    for tri in mesh.triangles() {
        let mut hits: Vec<Point3<f64>> = Vec::with_capacity(3);
        for (a, b) in tri.edges() {
            if let Some(p) = plane_edge_intersection(plane_point, normal, a, b) {
                // A vertex on the plane is reported by both of its edges
                if !hits.contains(&p) {
                    hits.push(p);
                }
            }
        }

        if hits.len() == 2 {
            segments.push((hits[0], hits[1]));
        }
    }

    segments
}

/// Points where a mesh crosses a plane, without exact duplicates.
///
/// Points are returned in first-appearance order over the faces, which makes
/// the result deterministic for a given mesh.
pub fn slice_points(
    mesh: &Mesh,
    plane_point: Point3<f64>,
    plane_normal: Vector3<f64>,
) -> Vec<Point3<f64>> {
    let segments = slice_segments(mesh, plane_point, plane_normal);
    dedup_points(segments.into_iter().flat_map(|(a, b)| [a, b]))
}

/// Remove bit-identical points, keeping first appearances.
pub(crate) fn dedup_points(points: impl IntoIterator<Item = Point3<f64>>) -> Vec<Point3<f64>> {
    let mut seen: hashbrown::HashSet<[u64; 3]> = hashbrown::HashSet::new();
    points
        .into_iter()
        .filter(|p| {
            // -0.0 and 0.0 are the same coordinate
            let key = [p.x, p.y, p.z].map(|c| (c + 0.0).to_bits());
            seen.insert(key)
        })
        .collect()
}

/// Measure distance between two points.
pub fn measure_distance(from: Point3<f64>, to: Point3<f64>) -> DistanceMeasurement {
    let diff = to - from;
    DistanceMeasurement {
        from,
        to,
        distance: diff.norm(),
    }
}

fn plane_edge_intersection(
    plane_point: Point3<f64>,
    plane_normal: Vector3<f64>,
    a: Point3<f64>,
    b: Point3<f64>,
) -> Option<Point3<f64>> {
    let d_a = (a - plane_point).dot(&plane_normal);
    let d_b = (b - plane_point).dot(&plane_normal);

    // Same side of plane
    if d_a * d_b > 0.0 {
        return None;
    }

    // Edge lies in the plane
    if (d_a - d_b).abs() < 1e-10 {
        return None;
    }

    if d_a == 0.0 {
        return Some(a);
    }
    if d_b == 0.0 {
        return Some(b);
    }

    let t = d_a / (d_a - d_b);
    Some(a + (b - a) * t)
}
