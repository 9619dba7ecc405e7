//! Mesh file input for Abaqus INP, STL, and OBJ.
//!
//! Knee models are exported from the finite-element pre-processor as one
//! Abaqus input deck per anatomical region. Only the geometry is read: the
//! `*NODE` and `*ELEMENT` blocks. Every other keyword block is skipped.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hashbrown::HashMap;
use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::error::{FeatureError, FeatureResult};
use crate::volume::{Cell, CellKind, VolumeMesh};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Inp,
    Stl,
    Obj,
}

impl MeshFormat {
    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .and_then(|ext| match ext.as_str() {
                "inp" => Some(MeshFormat::Inp),
                "stl" => Some(MeshFormat::Stl),
                "obj" => Some(MeshFormat::Obj),
                _ => None,
            })
    }
}

/// Load a mesh from file, auto-detecting format from extension.
pub fn load_mesh(path: &Path) -> FeatureResult<VolumeMesh> {
    let format = MeshFormat::from_path(path).ok_or_else(|| FeatureError::UnsupportedFormat {
        extension: path.extension().and_then(|e| e.to_str()).map(String::from),
    })?;

    debug!("Loading mesh from {:?} (format: {:?})", path, format);

    let mesh = match format {
        MeshFormat::Inp => load_inp(path)?,
        MeshFormat::Stl => load_stl(path)?,
        MeshFormat::Obj => load_obj(path)?,
    };

    if mesh.is_empty() {
        return Err(FeatureError::empty_mesh(format!(
            "{} has no nodes or no supported elements",
            path.display()
        )));
    }

    if let Some((min, max)) = mesh.bounds() {
        let dims = max - min;
        info!(
            "Loaded mesh: {} points, {} cells",
            mesh.n_points(),
            mesh.n_cells()
        );
        debug!(
            "Dimensions: {:.1} x {:.1} x {:.1}",
            dims.x, dims.y, dims.z
        );
    }

    Ok(mesh)
}

/// Load an Abaqus input deck.
pub fn load_inp(path: &Path) -> FeatureResult<VolumeMesh> {
    let text = std::fs::read_to_string(path).map_err(|e| FeatureError::io_read(path, e))?;
    parse_inp(&text, path)
}

/// Map an Abaqus element type to its cell shape and total node count
/// (corner plus mid-side nodes). Corner nodes always come first.
fn element_shape(element_type: &str) -> Option<(CellKind, usize)> {
    let t = element_type.to_ascii_uppercase();
    let shape = match t.as_str() {
        "C3D4" | "C3D4H" | "C3D4T" => (CellKind::Tetra, 4),
        "C3D10" | "C3D10H" | "C3D10M" | "C3D10MH" | "C3D10I" => (CellKind::Tetra, 10),
        "C3D6" | "C3D6H" | "C3D6T" => (CellKind::Wedge, 6),
        "C3D15" | "C3D15H" => (CellKind::Wedge, 15),
        "C3D8" | "C3D8R" | "C3D8H" | "C3D8I" | "C3D8RH" | "C3D8IH" | "C3D8T" => {
            (CellKind::Hexahedron, 8)
        }
        "C3D20" | "C3D20R" | "C3D20H" | "C3D20RH" => (CellKind::Hexahedron, 20),
        "S3" | "S3R" | "STRI3" | "M3D3" | "R3D3" | "SFM3D3" => (CellKind::Triangle, 3),
        "S6" | "STRI65" | "M3D6" => (CellKind::Triangle, 6),
        "S4" | "S4R" | "M3D4" | "M3D4R" | "R3D4" | "SFM3D4" | "SFM3D4R" => (CellKind::Quad, 4),
        "S8R" | "M3D8" | "M3D8R" => (CellKind::Quad, 8),
        _ => return None,
    };
    Some(shape)
}

/// Split `*KEYWORD, KEY=VALUE, ...` into the upper-cased keyword and a
/// parameter lookup.
fn parse_keyword(line: &str) -> (String, HashMap<String, String>) {
    let mut parts = line.trim_start_matches('*').split(',');
    let keyword = parts.next().unwrap_or("").trim().to_ascii_uppercase();
    let params = parts
        .filter_map(|p| {
            let mut kv = p.splitn(2, '=');
            let key = kv.next()?.trim().to_ascii_uppercase();
            let value = kv.next().unwrap_or("").trim().to_string();
            (!key.is_empty()).then_some((key, value))
        })
        .collect();
    (keyword, params)
}

#[derive(Debug)]
enum Block {
    Node,
    Element { shape: Option<(CellKind, usize)> },
    Other,
}

/// Parse the text of an Abaqus input deck.
///
/// `path` is only used for error reporting.
pub fn parse_inp(text: &str, path: &Path) -> FeatureResult<VolumeMesh> {
    let mut mesh = VolumeMesh::new();
    let mut node_ids: HashMap<i64, u32> = HashMap::new();
    let mut pending_elements: Vec<(usize, CellKind, Vec<i64>)> = Vec::new();
    let mut skipped_types: HashMap<String, usize> = HashMap::new();

    let mut block = Block::Other;
    // Element data may continue on the next line after a trailing comma
    let mut carry: Vec<i64> = Vec::new();
    let mut carry_line = 0;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with("**") {
            continue;
        }

        if line.starts_with('*') {
            if !carry.is_empty() {
                return Err(FeatureError::parse_error_at(
                    path,
                    carry_line,
                    "element definition is incomplete",
                ));
            }
            let (keyword, params) = parse_keyword(line);
            block = match keyword.as_str() {
                "NODE" => Block::Node,
                "ELEMENT" => {
                    let element_type = params.get("TYPE").cloned().unwrap_or_default();
                    let shape = element_shape(&element_type);
                    if shape.is_none() {
                        *skipped_types.entry(element_type).or_insert(0) += 1;
                    }
                    Block::Element { shape }
                }
                // Node numbering restarts in every part
                "PART" => {
                    resolve_elements(&mut mesh, &node_ids, &mut pending_elements, path)?;
                    node_ids.clear();
                    Block::Other
                }
                _ => Block::Other,
            };
            continue;
        }

        match &block {
            Block::Node => {
                let fields = parse_fields::<f64>(line, path, line_no)?;
                if fields.len() < 3 {
                    return Err(FeatureError::parse_error_at(
                        path,
                        line_no,
                        format!("node line needs an id and at least two coordinates, got {:?}", line),
                    ));
                }
                let id = fields[0] as i64;
                let z = fields.get(3).copied().unwrap_or(0.0);
                let point = Point3::new(fields[1], fields[2], z);
                if !(point.x.is_finite() && point.y.is_finite() && point.z.is_finite()) {
                    return Err(FeatureError::parse_error_at(
                        path,
                        line_no,
                        format!("node {} has a non-finite coordinate", id),
                    ));
                }
                mesh.points.push(point);
                if node_ids.insert(id, (mesh.points.len() - 1) as u32).is_some() {
                    warn!(node = id, line = line_no, "Duplicate node id, keeping the later one");
                }
            }
            Block::Element { shape: Some((kind, node_count)) } => {
                if carry.is_empty() {
                    carry_line = line_no;
                }
                carry.extend(parse_fields::<i64>(line, path, line_no)?);
                if line.ends_with(',') && carry.len() < node_count + 1 {
                    continue;
                }
                if carry.len() < node_count + 1 {
                    return Err(FeatureError::parse_error_at(
                        path,
                        carry_line,
                        format!(
                            "element needs {} nodes, found {}",
                            node_count,
                            carry.len().saturating_sub(1)
                        ),
                    ));
                }
                let corners = carry[1..=kind.corner_count()].to_vec();
                pending_elements.push((carry_line, *kind, corners));
                carry.clear();
            }
            Block::Element { shape: None } | Block::Other => {}
        }
    }

    if !carry.is_empty() {
        return Err(FeatureError::parse_error_at(
            path,
            carry_line,
            "element definition is incomplete",
        ));
    }

    resolve_elements(&mut mesh, &node_ids, &mut pending_elements, path)?;

    for (element_type, blocks) in &skipped_types {
        warn!(
            element_type = element_type.as_str(),
            blocks = blocks,
            path = %path.display(),
            "Skipped element block with unsupported type"
        );
    }

    debug!(
        points = mesh.n_points(),
        cells = mesh.n_cells(),
        "Parsed INP deck"
    );

    Ok(mesh)
}

/// Turn pending elements (node ids) into cells (point indices).
fn resolve_elements(
    mesh: &mut VolumeMesh,
    node_ids: &HashMap<i64, u32>,
    pending: &mut Vec<(usize, CellKind, Vec<i64>)>,
    path: &Path,
) -> FeatureResult<()> {
    for (line_no, kind, ids) in pending.drain(..) {
        let nodes = ids
            .iter()
            .map(|id| {
                node_ids.get(id).copied().ok_or_else(|| {
                    FeatureError::parse_error_at(
                        path,
                        line_no,
                        format!("element references undefined node {}", id),
                    )
                })
            })
            .collect::<FeatureResult<Vec<u32>>>()?;
        mesh.cells.push(Cell::new(kind, nodes));
    }
    Ok(())
}

fn parse_fields<T: std::str::FromStr>(line: &str, path: &Path, line_no: usize) -> FeatureResult<Vec<T>> {
    line.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            // Node ids are sometimes written as floats ("12.")
            s.parse::<T>()
                .or_else(|_| s.trim_end_matches('.').parse::<T>())
                .map_err(|_| {
                    FeatureError::parse_error_at(path, line_no, format!("invalid number {:?}", s))
                })
        })
        .collect()
}

/// Load mesh from STL file (binary or ASCII).
fn load_stl(path: &Path) -> FeatureResult<VolumeMesh> {
    let file = File::open(path).map_err(|e| FeatureError::io_read(path, e))?;
    let mut reader = BufReader::new(file);

    let stl = stl_io::read_stl(&mut reader)
        .map_err(|e| FeatureError::parse_error(path, e.to_string()))?;

    debug!(
        "STL contains {} vertices, {} triangles",
        stl.vertices.len(),
        stl.faces.len()
    );

    let mut mesh = VolumeMesh::new();
    mesh.points.reserve(stl.vertices.len());
    for v in &stl.vertices {
        mesh.points
            .push(Point3::new(v.0[0] as f64, v.0[1] as f64, v.0[2] as f64));
    }
    for face in &stl.faces {
        mesh.cells.push(Cell::new(
            CellKind::Triangle,
            face.vertices.iter().map(|&i| i as u32).collect(),
        ));
    }

    Ok(mesh)
}

/// Load mesh from OBJ file, merging all models.
fn load_obj(path: &Path) -> FeatureResult<VolumeMesh> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| FeatureError::parse_error(path, e.to_string()))?;

    let mut mesh = VolumeMesh::new();
    let mut vertex_offset = 0u32;

    for model in &models {
        let obj_mesh = &model.mesh;

        for chunk in obj_mesh.positions.chunks(3) {
            if chunk.len() == 3 {
                mesh.points
                    .push(Point3::new(chunk[0] as f64, chunk[1] as f64, chunk[2] as f64));
            }
        }

        for chunk in obj_mesh.indices.chunks(3) {
            if chunk.len() == 3 {
                mesh.cells.push(Cell::new(
                    CellKind::Triangle,
                    chunk.iter().map(|&i| i + vertex_offset).collect(),
                ));
            }
        }

        vertex_offset = mesh.points.len() as u32;
    }

    debug!(
        "OBJ loaded: {} points, {} triangles from {} models",
        mesh.n_points(),
        mesh.n_cells(),
        models.len()
    );

    Ok(mesh)
}
