//! Error types for feature extraction with rich diagnostics.
//!
//! This module provides:
//! - Machine-readable error codes for programmatic handling
//! - A coarse [`ErrorKind`] used to aggregate per-patient failures in a batch
//! - Recovery suggestions for common issues
//! - Terminal display via miette
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `KNEE-XXXX`:
//! - `KNEE-1xxx`: I/O errors (file reading, writing, parsing)
//! - `KNEE-2xxx`: Input errors (missing regions, empty meshes)
//! - `KNEE-3xxx`: Geometry errors (degenerate shapes, empty slices, rendering)
//! - `KNEE-4xxx`: Table and configuration errors
//!
//! # Example
//!
//! ```rust,ignore
//! use knee_features::{FeatureError, ErrorKind, Region};
//!
//! let err = FeatureError::missing_region("9968924M00", Region::TibialCartilageLateral);
//! assert_eq!(err.kind(), ErrorKind::MissingRegion);
//! println!("Error code: {}", err.code()); // KNEE-2001
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::knee::Region;

/// Result type alias for feature extraction.
pub type FeatureResult<T> = Result<T, FeatureError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // I/O errors (1xxx)
    /// KNEE-1001: Failed to read file
    IoRead = 1001,
    /// KNEE-1002: Failed to write file
    IoWrite = 1002,
    /// KNEE-1003: Failed to parse file
    ParseError = 1003,
    /// KNEE-1004: Unsupported file format
    UnsupportedFormat = 1004,

    // Input errors (2xxx)
    /// KNEE-2001: Patient has no mesh for a required region
    MissingRegion = 2001,
    /// KNEE-2002: Mesh has no points or cells
    EmptyMesh = 2002,

    // Geometry errors (3xxx)
    /// KNEE-3001: Geometry too degenerate to measure
    DegenerateGeometry = 3001,
    /// KNEE-3002: A slice or search window contained no points
    InsufficientGeometry = 3002,
    /// KNEE-3003: Off-screen rendering failed
    RenderingFailure = 3003,

    // Table and configuration errors (4xxx)
    /// KNEE-4001: CSV read/write failure
    Csv = 4001,
    /// KNEE-4002: Table has no `Code` column
    MissingKeyColumn = 4002,
    /// KNEE-4003: Joined column already exists
    DuplicateColumn = 4003,
    /// KNEE-4004: Invalid configuration
    Config = 4004,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `KNEE-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "KNEE-1001",
            ErrorCode::IoWrite => "KNEE-1002",
            ErrorCode::ParseError => "KNEE-1003",
            ErrorCode::UnsupportedFormat => "KNEE-1004",
            ErrorCode::MissingRegion => "KNEE-2001",
            ErrorCode::EmptyMesh => "KNEE-2002",
            ErrorCode::DegenerateGeometry => "KNEE-3001",
            ErrorCode::InsufficientGeometry => "KNEE-3002",
            ErrorCode::RenderingFailure => "KNEE-3003",
            ErrorCode::Csv => "KNEE-4001",
            ErrorCode::MissingKeyColumn => "KNEE-4002",
            ErrorCode::DuplicateColumn => "KNEE-4003",
            ErrorCode::Config => "KNEE-4004",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse failure category used when aggregating per-patient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The patient bundle lacks a region the extractor needs.
    MissingRegion,
    /// Zero-area contour, empty slice, empty search window, empty surface.
    DegenerateGeometry,
    /// The raster context could not be created or rendered.
    RenderingFailure,
    /// Filesystem failures.
    Io,
    /// Malformed or unsupported input files.
    Parse,
    /// Feature table failures.
    Table,
    /// Invalid configuration.
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::MissingRegion => "missing region",
            ErrorKind::DegenerateGeometry => "degenerate geometry",
            ErrorKind::RenderingFailure => "rendering failure",
            ErrorKind::Io => "i/o",
            ErrorKind::Parse => "parse",
            ErrorKind::Table => "table",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}

/// Recovery suggestions for feature extraction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Re-export the file from the original software.
    ReexportFile { format: Option<String> },
    /// Check the input data for specific issues.
    CheckInput { checks: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::ReexportFile { format } => {
                if let Some(fmt) = format {
                    write!(f, "Try re-exporting the mesh as {} from the original software", fmt)
                } else {
                    write!(f, "Try re-exporting the mesh from the original software")
                }
            }
            RecoverySuggestion::CheckInput { checks } => {
                write!(f, "Check the input for: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::None => write!(f, "No automatic recovery available"),
        }
    }
}

/// Location information for errors.
#[derive(Debug, Clone)]
pub enum ErrorLocation {
    /// Error in a file, optionally at a line.
    File { path: PathBuf, line: Option<usize> },
    /// Error tied to one patient's region mesh.
    Patient { code: String, region: Region },
}

impl std::fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorLocation::File { path, line } => match line {
                Some(l) => write!(f, "{}:{}", path.display(), l),
                None => write!(f, "{}", path.display()),
            },
            ErrorLocation::Patient { code, region } => write!(f, "patient {} ({})", code, region),
        }
    }
}

/// Errors that can occur while loading meshes and extracting features.
#[derive(Debug, Error, Diagnostic)]
pub enum FeatureError {
    /// Error reading from a file.
    #[error("failed to read {path}")]
    #[diagnostic(
        code(knee::io::read),
        help("Check that the file exists and is readable. Try: ls -la {}", path.display())
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write {path}")]
    #[diagnostic(code(knee::io::write), help("Check that the directory exists and is writable"))]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing a mesh file.
    #[error("failed to parse {path}{}: {details}", .line.map(|l| format!(" (line {})", l)).unwrap_or_default())]
    #[diagnostic(
        code(knee::parse::error),
        help("The file may be truncated or use an unsupported element type.")
    )]
    ParseError {
        path: PathBuf,
        line: Option<usize>,
        details: String,
    },

    /// Unsupported mesh file format.
    #[error("unsupported mesh format: {extension:?}")]
    #[diagnostic(code(knee::format::unsupported), help("Supported formats: INP (Abaqus), STL, OBJ"))]
    UnsupportedFormat { extension: Option<String> },

    /// The patient bundle lacks a required region.
    #[error("patient {code} has no {region} mesh")]
    #[diagnostic(
        code(knee::input::missing_region),
        help("Check that the patient directory contains a file whose name starts with {}", region.file_pattern())
    )]
    MissingRegion { code: String, region: Region },

    /// Mesh without geometry.
    #[error("mesh is empty: {details}")]
    #[diagnostic(code(knee::input::empty))]
    EmptyMesh { details: String },

    /// Geometry that cannot be measured (zero-area contour, empty surface).
    #[error("degenerate geometry: {details}")]
    #[diagnostic(code(knee::geometry::degenerate))]
    DegenerateGeometry { details: String },

    /// A slice or search window produced no candidate points.
    #[error("insufficient geometry in {stage}: {details}")]
    #[diagnostic(
        code(knee::geometry::insufficient),
        help("The slicing origin may miss the bone. Check the axis frame and calibration constants.")
    )]
    InsufficientGeometry { stage: &'static str, details: String },

    /// Off-screen rendering failed.
    #[error("rendering failed: {details}")]
    #[diagnostic(code(knee::render::failed))]
    RenderingFailure { details: String },

    /// CSV failure.
    #[error("CSV error in {path}: {source}")]
    #[diagnostic(code(knee::table::csv))]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Table has no key column.
    #[error("table has no `{column}` column")]
    #[diagnostic(code(knee::table::key), help("The external table must contain a `Code` column"))]
    MissingKeyColumn { column: String },

    /// A joined column is already present in the table.
    #[error("column `{column}` already exists in the table")]
    #[diagnostic(code(knee::table::duplicate))]
    DuplicateColumn { column: String },

    /// Invalid configuration.
    #[error("invalid configuration: {details}")]
    #[diagnostic(code(knee::config::invalid))]
    Config { details: String },
}

impl FeatureError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            FeatureError::IoRead { .. } => ErrorCode::IoRead,
            FeatureError::IoWrite { .. } => ErrorCode::IoWrite,
            FeatureError::ParseError { .. } => ErrorCode::ParseError,
            FeatureError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            FeatureError::MissingRegion { .. } => ErrorCode::MissingRegion,
            FeatureError::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            FeatureError::DegenerateGeometry { .. } => ErrorCode::DegenerateGeometry,
            FeatureError::InsufficientGeometry { .. } => ErrorCode::InsufficientGeometry,
            FeatureError::RenderingFailure { .. } => ErrorCode::RenderingFailure,
            FeatureError::Csv { .. } => ErrorCode::Csv,
            FeatureError::MissingKeyColumn { .. } => ErrorCode::MissingKeyColumn,
            FeatureError::DuplicateColumn { .. } => ErrorCode::DuplicateColumn,
            FeatureError::Config { .. } => ErrorCode::Config,
        }
    }

    /// Returns the failure category used for batch reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FeatureError::MissingRegion { .. } => ErrorKind::MissingRegion,
            FeatureError::EmptyMesh { .. }
            | FeatureError::DegenerateGeometry { .. }
            | FeatureError::InsufficientGeometry { .. } => ErrorKind::DegenerateGeometry,
            FeatureError::RenderingFailure { .. } => ErrorKind::RenderingFailure,
            FeatureError::IoRead { .. } | FeatureError::IoWrite { .. } => ErrorKind::Io,
            FeatureError::ParseError { .. } | FeatureError::UnsupportedFormat { .. } => {
                ErrorKind::Parse
            }
            FeatureError::Csv { .. }
            | FeatureError::MissingKeyColumn { .. }
            | FeatureError::DuplicateColumn { .. } => ErrorKind::Table,
            FeatureError::Config { .. } => ErrorKind::Config,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            FeatureError::IoRead { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["file exists".into(), "file permissions".into()],
            },
            FeatureError::IoWrite { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            FeatureError::ParseError { .. } => RecoverySuggestion::ReexportFile {
                format: Some("Abaqus INP".into()),
            },
            FeatureError::UnsupportedFormat { .. } => RecoverySuggestion::ReexportFile {
                format: Some("INP, STL or OBJ".into()),
            },
            FeatureError::MissingRegion { region, .. } => RecoverySuggestion::CheckInput {
                checks: vec![format!("a file named {}*.inp", region.file_pattern())],
            },
            FeatureError::EmptyMesh { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["mesh has nodes and elements".into()],
            },
            FeatureError::DegenerateGeometry { .. } => RecoverySuggestion::None,
            FeatureError::InsufficientGeometry { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![
                    ("gap.vertical_divisor".into(), "move the slicing origin".into()),
                    ("gap.window_fraction".into(), "try a wider search window".into()),
                ],
            },
            FeatureError::RenderingFailure { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![("projection.viewport".into(), "use a non-zero size".into())],
            },
            FeatureError::Csv { .. } | FeatureError::MissingKeyColumn { .. } => {
                RecoverySuggestion::CheckInput {
                    checks: vec!["CSV header".into(), "a `Code` column".into()],
                }
            }
            FeatureError::DuplicateColumn { column } => RecoverySuggestion::CheckInput {
                checks: vec![format!("remove `{}` from the input table", column)],
            },
            FeatureError::Config { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["configuration file syntax".into()],
            },
        }
    }

    /// Returns location information if available.
    pub fn location(&self) -> Option<ErrorLocation> {
        match self {
            FeatureError::IoRead { path, .. }
            | FeatureError::IoWrite { path, .. }
            | FeatureError::Csv { path, .. } => Some(ErrorLocation::File {
                path: path.clone(),
                line: None,
            }),
            FeatureError::ParseError { path, line, .. } => Some(ErrorLocation::File {
                path: path.clone(),
                line: *line,
            }),
            FeatureError::MissingRegion { code, region } => Some(ErrorLocation::Patient {
                code: code.clone(),
                region: *region,
            }),
            _ => None,
        }
    }

    // Constructor helpers for common error patterns

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FeatureError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FeatureError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a ParseError without line information.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        FeatureError::ParseError {
            path: path.into(),
            line: None,
            details: details.into(),
        }
    }

    pub fn parse_error_at(path: impl Into<PathBuf>, line: usize, details: impl Into<String>) -> Self {
        FeatureError::ParseError {
            path: path.into(),
            line: Some(line),
            details: details.into(),
        }
    }

    pub fn missing_region(code: impl Into<String>, region: Region) -> Self {
        FeatureError::MissingRegion {
            code: code.into(),
            region,
        }
    }

    pub fn empty_mesh(details: impl Into<String>) -> Self {
        FeatureError::EmptyMesh {
            details: details.into(),
        }
    }

    pub fn degenerate(details: impl Into<String>) -> Self {
        FeatureError::DegenerateGeometry {
            details: details.into(),
        }
    }

    pub fn insufficient(stage: &'static str, details: impl Into<String>) -> Self {
        FeatureError::InsufficientGeometry {
            stage,
            details: details.into(),
        }
    }

    pub fn rendering(details: impl Into<String>) -> Self {
        FeatureError::RenderingFailure {
            details: details.into(),
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        FeatureError::Csv {
            path: path.into(),
            source,
        }
    }

    pub fn config(details: impl Into<String>) -> Self {
        FeatureError::Config {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_kinds() {
        let err = FeatureError::missing_region("P01", Region::TibialCartilageLateral);
        assert_eq!(err.code(), ErrorCode::MissingRegion);
        assert_eq!(err.code().as_str(), "KNEE-2001");
        assert_eq!(err.kind(), ErrorKind::MissingRegion);

        let err = FeatureError::insufficient("right window", "no points");
        assert_eq!(err.kind(), ErrorKind::DegenerateGeometry);
        assert_eq!(err.code().to_string(), "KNEE-3002");

        assert_eq!(FeatureError::rendering("x").kind(), ErrorKind::RenderingFailure);
    }

    #[test]
    fn test_display_and_location() {
        let err = FeatureError::parse_error_at("femur.inp", 12, "bad node line");
        assert_eq!(err.to_string(), "failed to parse femur.inp (line 12): bad node line");
        let loc = err.location().unwrap();
        assert_eq!(loc.to_string(), "femur.inp:12");

        let err = FeatureError::missing_region("P01", Region::Femur);
        assert_eq!(err.to_string(), "patient P01 has no femur mesh");
        assert!(err.location().unwrap().to_string().contains("P01"));
    }

    #[test]
    fn test_recovery_suggestion_display() {
        let err = FeatureError::missing_region("P01", Region::TibialCartilageMedial);
        let text = err.recovery_suggestion().to_string();
        assert!(text.contains("TIB_CART_MED"));
    }
}
