//! Geometric feature extraction for knee bone and cartilage meshes.
//!
//! Each patient in a cohort has a directory of finite element meshes, one
//! file per anatomical region. This crate turns those meshes into a row of
//! numeric and boolean features per patient and joins the rows onto an
//! external table keyed by patient code.
//!
//! # Features
//!
//! - **Loading**: Abaqus `.inp` decks (plus STL and OBJ surfaces), with region
//!   detection from file name prefixes
//! - **Projection**: orthographic projection of a mesh onto a plane and an
//!   offscreen binary rendering of the result
//! - **Contour health**: a tissue projection is healthy when it is a single
//!   contour that is close to its convex hull
//! - **Curvature**: mean absolute discrete curvature of a surface
//! - **Femur gap**: the distance between the two femoral condyles
//! - **Tables**: CSV in, left join on `Code`, CSV out
//!
//! # Units and Axes
//!
//! Coordinates are used as stored in the input files, normally millimeters.
//! The default anatomical frame assumes X is horizontal (medial/lateral),
//! Y is vertical and Z is depth. [`GapParams::axes`] changes that frame.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use knee_features::{FeatureConfig, FeatureTable, add_feature_columns, load_cohort};
//!
//! let cohort = load_cohort(Path::new("data/raw/set_1")).unwrap();
//! let table = FeatureTable::read_csv(Path::new("data/raw/set_1/features.csv")).unwrap();
//!
//! let mut extractors = FeatureConfig::default().extractors().unwrap();
//! let (joined, report) = add_feature_columns(&cohort, &table, &mut extractors).unwrap();
//!
//! println!("{} rows, {} failed cells", joined.row_count(), report.failure_count());
//! joined.write_csv(Path::new("data/processed/set_1/out.csv")).unwrap();
//! ```
//!
//! # Single Features
//!
//! ```no_run
//! use std::path::Path;
//! use knee_features::{GapParams, find_gap, load_mesh};
//!
//! let femur = load_mesh(Path::new("BONE2-FEMUR.inp")).unwrap();
//! let gap = find_gap(&femur.extract_surface(), &GapParams::default()).unwrap();
//! println!("gap {:.2} between {} and {}", gap.distance, gap.left_point, gap.right_point);
//! ```
//!
//! # Output Columns
//!
//! | Column | Source region | Value |
//! |--------|---------------|-------|
//! | `tib_med_curv`, `tib_lat_curv` | tibial cartilage | mean absolute curvature |
//! | `tib_med_ishealthy`, `tib_lat_ishealthy` | tibial cartilage | `True`/`False` |
//! | `femur_gap_dist` | femur | condyle gap |
//! | `femur_left_gap_p`, `femur_right_gap_p` | femur | `[x, y, z]` endpoints |
//! | `*_PN` | every region | point count |

mod error;
mod types;
pub mod tracing_ext;

pub mod config;
pub mod contour;
pub mod curvature;
pub mod features;
pub mod gap;
pub mod io;
pub mod knee;
pub mod measure;
pub mod projection;
pub mod table;
pub mod volume;

// Re-export core types at crate root
pub use error::{
    ErrorCode, ErrorKind, ErrorLocation, FeatureError, FeatureResult, RecoverySuggestion,
};
pub use types::{Mesh, Triangle, Vertex};
pub use volume::{Cell, CellKind, VolumeMesh};

pub use config::FeatureConfig;
pub use contour::{
    HealthAssessment, HealthParams, HealthVerdict, PixelContour, assess_health, classify_health,
    extract_contours,
};
pub use curvature::{
    CurvatureKind, CurvatureParams, CurvatureSummary, curvature_summary, mean_abs_curvature,
};
pub use features::{
    BatchReport, CurvatureFeatures, FeatureExtractor, FeatureFailure, FemurGapFeatures,
    HealthFeatures, PointCountFeatures, add_feature_columns, default_extractors, extract_row,
};
pub use gap::{Axis, AxisFrame, FemurGap, GapParams, WindowQuery, find_gap};
pub use io::{MeshFormat, load_inp, load_mesh, parse_inp};
pub use knee::{Cohort, PatientKnee, REGION_PATTERNS, Region, classify_file_name, load_cohort};
pub use measure::{DistanceMeasurement, measure_distance, slice_points};
pub use projection::{
    Camera, OffscreenRenderer, ProjectionParams, project_and_rasterize, project_points_to_plane,
    save_projection,
};
pub use table::{FeatureRow, FeatureTable, FeatureValue, KEY_COLUMN};
