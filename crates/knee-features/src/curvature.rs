//! Discrete surface curvature and its reduction to a scalar.
//!
//! Mean curvature uses the cotangent Laplace-Beltrami operator with the mixed
//! Voronoi area of Meyer et al. (2003):
//!
//! ```text
//! Δx_i = 1 / (2 A_i) · Σ_j (cot α_ij + cot β_ij) (x_j - x_i)
//! H_i  = -½ Δx_i · n_i
//! ```
//!
//! with `n_i` the area-weighted vertex normal, so that `H` is positive on a
//! sphere with outward normals and exactly zero on a plane. Gaussian
//! curvature is the angle defect over the same mixed area.
//!
//! Boundary vertices are treated like interior ones. On open surfaces their
//! values carry the usual discretisation bias, which is not corrected.

use std::f64::consts::PI;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Mesh;
use crate::error::{FeatureError, FeatureResult};
use crate::volume::VolumeMesh;

/// Which curvature to evaluate per vertex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurvatureKind {
    /// Signed mean curvature H.
    #[default]
    Mean,
    /// Gaussian curvature K (angle defect).
    Gaussian,
}

/// Curvature settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurvatureParams {
    /// Default: [`CurvatureKind::Mean`]
    pub kind: CurvatureKind,
}

/// Summary statistics of a per-vertex curvature field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvatureSummary {
    pub vertices: usize,
    /// Arithmetic mean of the absolute values.
    pub mean_abs: f64,
    pub min: f64,
    pub max: f64,
}

impl CurvatureSummary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mean_abs = values.iter().map(|v| v.abs()).sum::<f64>() / values.len() as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            vertices: values.len(),
            mean_abs,
            min,
            max,
        })
    }
}

/// Cotangent of the angle at `a` in triangle (a, b, c).
fn cotangent(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let cross_norm = ab.cross(&ac).norm();
    if cross_norm < 1e-12 {
        0.0
    } else {
        ab.dot(&ac) / cross_norm
    }
}

fn angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let denom = ab.norm() * ac.norm();
    if denom < 1e-24 {
        return 0.0;
    }
    (ab.dot(&ac) / denom).clamp(-1.0, 1.0).acos()
}

/// Mixed Voronoi area per vertex.
pub(crate) fn mixed_areas(mesh: &Mesh) -> Vec<f64> {
    let mut areas = vec![0.0; mesh.vertex_count()];

    for (face, tri) in mesh.faces.iter().zip(mesh.triangles()) {
        let p = [tri.v0, tri.v1, tri.v2];
        let tri_area = tri.area();
        if tri_area < 1e-14 {
            continue;
        }

        // Obtuse corners have a negative dot product of their edges
        let obtuse = (0..3).find(|&i| {
            let (a, b, c) = (p[i], p[(i + 1) % 3], p[(i + 2) % 3]);
            (b - a).dot(&(c - a)) < 0.0
        });

        for i in 0..3 {
            let contribution = match obtuse {
                None => {
                    let (a, b, c) = (p[i], p[(i + 1) % 3], p[(i + 2) % 3]);
                    // Edge a-b is opposite c, edge a-c is opposite b
                    0.125
                        * ((b - a).norm_squared() * cotangent(&c, &a, &b)
                            + (c - a).norm_squared() * cotangent(&b, &c, &a))
                }
                Some(o) if o == i => tri_area / 2.0,
                Some(_) => tri_area / 4.0,
            };
            areas[face[i] as usize] += contribution;
        }
    }

    areas
}

/// Signed mean curvature per vertex.
///
/// Vertices without incident area get zero.
pub fn mean_curvature(mesh: &Mesh) -> Vec<f64> {
    let n = mesh.vertex_count();
    let mut laplace = vec![nalgebra::Vector3::zeros(); n];

    for face in &mesh.faces {
        let p = face.map(|i| mesh.vertices[i as usize].position);
        for i in 0..3 {
            // The angle at corner i weights the opposite edge (j, k)
            let (j, k) = ((i + 1) % 3, (i + 2) % 3);
            let w = cotangent(&p[i], &p[j], &p[k]);
            let (vj, vk) = (face[j] as usize, face[k] as usize);
            laplace[vj] += (p[k] - p[j]) * w;
            laplace[vk] += (p[j] - p[k]) * w;
        }
    }

    let areas = mixed_areas(mesh);
    let normals = mesh.vertex_normals();

    laplace
        .iter()
        .zip(areas.iter().zip(normals.iter()))
        .map(|(l, (&area, normal))| {
            if area <= 0.0 {
                return 0.0;
            }
            let delta = l / (2.0 * area);
            -0.5 * delta.dot(normal)
        })
        .collect()
}

/// Gaussian curvature per vertex: `(2π - Σ θ) / A`.
pub fn gaussian_curvature(mesh: &Mesh) -> Vec<f64> {
    let mut angle_sums = vec![0.0; mesh.vertex_count()];
    let mut touched = vec![false; mesh.vertex_count()];

    for face in &mesh.faces {
        let p = face.map(|i| mesh.vertices[i as usize].position);
        for i in 0..3 {
            let v = face[i] as usize;
            angle_sums[v] += angle(&p[i], &p[(i + 1) % 3], &p[(i + 2) % 3]);
            touched[v] = true;
        }
    }

    let areas = mixed_areas(mesh);
    angle_sums
        .iter()
        .zip(areas.iter().zip(touched))
        .map(|(&sum, (&area, touched))| {
            if !touched || area <= 0.0 {
                0.0
            } else {
                (2.0 * PI - sum) / area
            }
        })
        .collect()
}

/// Per-vertex curvature of the requested kind.
pub fn vertex_curvature(mesh: &Mesh, kind: CurvatureKind) -> Vec<f64> {
    match kind {
        CurvatureKind::Mean => mean_curvature(mesh),
        CurvatureKind::Gaussian => gaussian_curvature(mesh),
    }
}

/// Curvature summary over the boundary surface of a volume mesh.
pub fn curvature_summary(
    mesh: &VolumeMesh,
    params: &CurvatureParams,
) -> FeatureResult<CurvatureSummary> {
    let surface = mesh.extract_surface();
    if surface.is_empty() {
        return Err(FeatureError::degenerate("boundary surface is empty"));
    }

    let values = vertex_curvature(&surface, params.kind);
    let summary = CurvatureSummary::from_values(&values)
        .ok_or_else(|| FeatureError::degenerate("boundary surface has no vertices"))?;

    debug!(
        kind = ?params.kind,
        vertices = summary.vertices,
        mean_abs = summary.mean_abs,
        "Computed surface curvature"
    );
    Ok(summary)
}

/// Mean of the absolute per-vertex curvature over the boundary surface.
pub fn mean_abs_curvature(mesh: &VolumeMesh, params: &CurvatureParams) -> FeatureResult<f64> {
    curvature_summary(mesh, params).map(|s| s.mean_abs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;

    /// Regular grid of `n x n` quads in the plane z = 0.
    fn flat_grid(n: u32) -> Mesh {
        let mut mesh = Mesh::new();
        for j in 0..=n {
            for i in 0..=n {
                mesh.vertices.push(Vertex::from_coords(i as f64, j as f64 * 0.7, 0.0));
            }
        }
        let row = n + 1;
        for j in 0..n {
            for i in 0..n {
                let a = j * row + i;
                mesh.faces.push([a, a + 1, a + row + 1]);
                mesh.faces.push([a, a + row + 1, a + row]);
            }
        }
        mesh
    }

    /// Subdivided icosahedron on a sphere, faces outward.
    fn icosphere(radius: f64, subdivisions: u32) -> Mesh {
        let t = (1.0 + 5.0_f64.sqrt()) / 2.0;
        let mut points: Vec<nalgebra::Vector3<f64>> = [
            (-1.0, t, 0.0),
            (1.0, t, 0.0),
            (-1.0, -t, 0.0),
            (1.0, -t, 0.0),
            (0.0, -1.0, t),
            (0.0, 1.0, t),
            (0.0, -1.0, -t),
            (0.0, 1.0, -t),
            (t, 0.0, -1.0),
            (t, 0.0, 1.0),
            (-t, 0.0, -1.0),
            (-t, 0.0, 1.0),
        ]
        .iter()
        .map(|&(x, y, z)| nalgebra::Vector3::new(x, y, z).normalize())
        .collect();
        let mut faces: Vec<[u32; 3]> = vec![
            [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
            [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
            [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
            [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
        ];

        for _ in 0..subdivisions {
            let mut midpoints: hashbrown::HashMap<(u32, u32), u32> = hashbrown::HashMap::new();
            let mut midpoint = |a: u32, b: u32, points: &mut Vec<nalgebra::Vector3<f64>>| {
                *midpoints.entry((a.min(b), a.max(b))).or_insert_with(|| {
                    let m = (points[a as usize] + points[b as usize]).normalize();
                    points.push(m);
                    (points.len() - 1) as u32
                })
            };
            let mut next = Vec::with_capacity(faces.len() * 4);
            for [a, b, c] in faces {
                let ab = midpoint(a, b, &mut points);
                let bc = midpoint(b, c, &mut points);
                let ca = midpoint(c, a, &mut points);
                next.push([a, ab, ca]);
                next.push([b, bc, ab]);
                next.push([c, ca, bc]);
                next.push([ab, bc, ca]);
            }
            faces = next;
        }

        Mesh {
            vertices: points
                .iter()
                .map(|p| Vertex::new(Point3::from(p * radius)))
                .collect(),
            faces,
        }
    }

    #[test]
    fn test_flat_mesh_has_zero_mean_curvature() {
        let mesh = flat_grid(6);
        let h = mean_curvature(&mesh);
        assert!(h.iter().all(|&v| v == 0.0));

        let volume = VolumeMesh::from(&mesh);
        let value = mean_abs_curvature(&volume, &CurvatureParams::default()).unwrap();
        assert_eq!(value, 0.0);
    }

    #[test]
    fn test_sphere_mean_curvature() {
        let radius = 2.0;
        let mesh = icosphere(radius, 3);
        let h = mean_curvature(&mesh);
        let mean = h.iter().sum::<f64>() / h.len() as f64;
        assert!(
            (mean - 1.0 / radius).abs() < 0.05 / radius,
            "mean curvature {mean} should be close to {}",
            1.0 / radius
        );
    }

    #[test]
    fn test_mean_abs_is_scale_dependent() {
        let small = VolumeMesh::from(&icosphere(1.0, 2));
        let large = VolumeMesh::from(&icosphere(4.0, 2));
        let params = CurvatureParams::default();
        let a = mean_abs_curvature(&small, &params).unwrap();
        let b = mean_abs_curvature(&large, &params).unwrap();
        assert!((a / b - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_gauss_bonnet_on_closed_surface() {
        let mesh = icosphere(1.5, 2);
        let k = gaussian_curvature(&mesh);
        let areas = mixed_areas(&mesh);
        let total: f64 = k.iter().zip(&areas).map(|(k, a)| k * a).sum();
        assert!((total - 4.0 * PI).abs() < 1e-9);
    }

    #[test]
    fn test_mixed_areas_sum_to_surface_area() {
        let mesh = icosphere(1.0, 2);
        let total: f64 = mixed_areas(&mesh).iter().sum();
        assert!((total - mesh.surface_area()).abs() < 1e-9);
    }

    #[test]
    fn test_empty_surface_is_degenerate() {
        let err = mean_abs_curvature(&VolumeMesh::new(), &CurvatureParams::default()).unwrap_err();
        assert!(matches!(err, FeatureError::DegenerateGeometry { .. }));
    }

    #[test]
    fn test_summary() {
        let summary = CurvatureSummary::from_values(&[-1.0, 0.5, 2.5]).unwrap();
        assert_eq!(summary.vertices, 3);
        assert!((summary.mean_abs - 4.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.min, -1.0);
        assert_eq!(summary.max, 2.5);
        assert!(CurvatureSummary::from_values(&[]).is_none());
    }
}
