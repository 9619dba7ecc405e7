//! Tracing helpers for feature extraction.
//!
//! Enable output by installing a subscriber in the application:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=knee_features=debug for per-patient detail
//! ```
//!
//! # Log Levels
//!
//! - **WARN**: per-patient feature failures, unreadable region files
//! - **INFO**: cohort loading, batch summaries, timing
//! - **DEBUG**: per-stage detail (slices, windows, contours)
//! - **TRACE**: rasterizer and search internals

use std::time::Instant;
use tracing::span::EnteredSpan;
use tracing::{debug, info};

/// A performance timer that logs its duration on drop.
///
/// ```rust,ignore
/// use knee_features::tracing_ext::OperationTimer;
///
/// fn extract_all() {
///     let _timer = OperationTimer::new("extract_all");
///     // ... do work ...
/// } // logs elapsed time here
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    // Entered for the lifetime of the timer
    _span: EnteredSpan,
}

impl OperationTimer {
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("knee_operation", operation = name).entered();
        debug!(target: "knee_features::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            _span: span,
        }
    }

    /// Timer tagged with a patient code.
    pub fn for_patient(name: &'static str, code: &str) -> Self {
        let span = tracing::info_span!("knee_operation", operation = name, patient = code).entered();
        debug!(
            target: "knee_features::timing",
            operation = name,
            patient = code,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            _span: span,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        info!(
            target: "knee_features::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Operation completed"
        );
    }
}

/// Log volume mesh statistics at debug level.
pub fn log_mesh_stats(mesh: &crate::VolumeMesh, context: &str) {
    let (min_bounds, max_bounds) = mesh.bounds().unwrap_or_default();
    let dims = max_bounds - min_bounds;

    debug!(
        target: "knee_features::mesh_state",
        context = context,
        points = mesh.n_points(),
        cells = mesh.n_cells(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}

/// Log the outcome of one patient.
pub fn log_patient_result(code: &str, columns: usize, failures: usize, elapsed_ms: f64) {
    debug!(
        target: "knee_features::batch",
        patient = code,
        columns,
        failures,
        elapsed_ms = format!("{:.2}", elapsed_ms),
        "Patient processed"
    );
}

/// Log progress through a cohort.
pub fn log_progress(current: usize, total: usize, code: &str) {
    let percent = if total > 0 {
        (current as f64 / total as f64 * 100.0) as u32
    } else {
        100
    };
    info!(
        target: "knee_features::progress",
        current,
        total,
        percent,
        patient = code,
        "Extracting features"
    );
}
