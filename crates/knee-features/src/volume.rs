//! Volumetric cell meshes and boundary-surface extraction.
//!
//! Region meshes arrive from finite-element models: bones are usually rigid
//! shell surfaces, cartilage layers are solid hexahedral or tetrahedral
//! meshes. Both are stored as a [`VolumeMesh`]; the feature algorithms work
//! on its boundary surface from [`VolumeMesh::extract_surface`].

use hashbrown::HashMap;
use nalgebra::Point3;
use tracing::debug;

use crate::types::{Mesh, Vertex, points_bounds};

/// Supported cell shapes, by corner-node count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// 3-node surface triangle.
    Triangle,
    /// 4-node surface quadrilateral.
    Quad,
    /// 4-node tetrahedron.
    Tetra,
    /// 6-node triangular prism.
    Wedge,
    /// 8-node hexahedron.
    Hexahedron,
}

impl CellKind {
    /// Number of corner nodes.
    pub fn corner_count(self) -> usize {
        match self {
            CellKind::Triangle => 3,
            CellKind::Quad | CellKind::Tetra => 4,
            CellKind::Wedge => 6,
            CellKind::Hexahedron => 8,
        }
    }

    /// True for 2D (shell) cells.
    pub fn is_surface(self) -> bool {
        matches!(self, CellKind::Triangle | CellKind::Quad)
    }

    /// Boundary faces as local corner indices, outward for positive-volume
    /// cells in Abaqus node ordering.
    fn faces(self) -> &'static [&'static [usize]] {
        match self {
            CellKind::Triangle => &[&[0, 1, 2]],
            CellKind::Quad => &[&[0, 1, 2, 3]],
            CellKind::Tetra => &[&[0, 2, 1], &[0, 1, 3], &[1, 2, 3], &[2, 0, 3]],
            CellKind::Wedge => &[
                &[0, 2, 1],
                &[3, 4, 5],
                &[0, 1, 4, 3],
                &[1, 2, 5, 4],
                &[2, 0, 3, 5],
            ],
            CellKind::Hexahedron => &[
                &[0, 3, 2, 1],
                &[4, 5, 6, 7],
                &[0, 1, 5, 4],
                &[1, 2, 6, 5],
                &[2, 3, 7, 6],
                &[3, 0, 4, 7],
            ],
        }
    }
}

/// One cell: its shape and corner node indices into [`VolumeMesh::points`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub kind: CellKind,
    pub nodes: Vec<u32>,
}

impl Cell {
    pub fn new(kind: CellKind, nodes: Vec<u32>) -> Self {
        debug_assert_eq!(nodes.len(), kind.corner_count());
        Self { kind, nodes }
    }
}

/// A mesh of points and mixed solid/shell cells.
#[derive(Debug, Clone, Default)]
pub struct VolumeMesh {
    pub points: Vec<Point3<f64>>,
    pub cells: Vec<Cell>,
}

impl VolumeMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points, as reported in the point-count table.
    #[inline]
    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() || self.cells.is_empty()
    }

    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        points_bounds(self.points.iter())
    }

    /// Center of the bounding box.
    pub fn center(&self) -> Option<Point3<f64>> {
        self.bounds().map(|(min, max)| nalgebra::center(&min, &max))
    }

    /// Length of the bounding box diagonal.
    pub fn length(&self) -> f64 {
        self.bounds().map(|(min, max)| (max - min).norm()).unwrap_or(0.0)
    }

    /// Extract the boundary surface as a triangle mesh.
    ///
    /// Shell cells are kept as they are. Faces of solid cells are kept when
    /// no other solid cell shares them. Quads are split along their 0-2
    /// diagonal. Only points referenced by the surface are kept, in order of
    /// first use.
    pub fn extract_surface(&self) -> Mesh {
        // Count every solid face by its sorted node set
        let mut face_counts: HashMap<Vec<u32>, usize> = HashMap::new();
        for cell in self.cells.iter().filter(|c| !c.kind.is_surface()) {
            for local in cell.kind.faces() {
                let mut key: Vec<u32> = local.iter().map(|&i| cell.nodes[i]).collect();
                key.sort_unstable();
                *face_counts.entry(key).or_insert(0) += 1;
            }
        }

        let mut remap: HashMap<u32, u32> = HashMap::new();
        let mut mesh = Mesh::new();

        for cell in &self.cells {
            for local in cell.kind.faces() {
                let polygon: Vec<u32> = local.iter().map(|&i| cell.nodes[i]).collect();

                if !cell.kind.is_surface() {
                    let mut key = polygon.clone();
                    key.sort_unstable();
                    if face_counts.get(&key).copied().unwrap_or(0) != 1 {
                        continue;
                    }
                }

                let ids: Vec<u32> = polygon
                    .iter()
                    .map(|&node| {
                        *remap.entry(node).or_insert_with(|| {
                            mesh.vertices.push(Vertex::new(self.points[node as usize]));
                            (mesh.vertices.len() - 1) as u32
                        })
                    })
                    .collect();

                // Fan triangulation from the first corner
                for k in 1..ids.len() - 1 {
                    mesh.faces.push([ids[0], ids[k], ids[k + 1]]);
                }
            }
        }

        debug!(
            cells = self.cells.len(),
            surface_vertices = mesh.vertex_count(),
            surface_faces = mesh.face_count(),
            "Extracted boundary surface"
        );

        mesh
    }
}

impl From<&Mesh> for VolumeMesh {
    fn from(mesh: &Mesh) -> Self {
        Self {
            points: mesh.vertices.iter().map(|v| v.position).collect(),
            cells: mesh
                .faces
                .iter()
                .map(|f| Cell::new(CellKind::Triangle, f.to_vec()))
                .collect(),
        }
    }
}
