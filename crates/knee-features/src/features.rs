//! Per-patient feature extractors and the batch table builder.
//!
//! Each [`FeatureExtractor`] contributes a fixed set of named columns. The
//! builder runs every extractor over every patient, one patient at a time in
//! code order, and left-joins the resulting columns onto an external table.
//! A failing column never aborts the batch: its cell is left missing, the
//! failure is logged and counted in the [`BatchReport`].

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::contour::{HealthParams, classify_health};
use crate::curvature::{CurvatureParams, mean_abs_curvature};
use crate::error::{ErrorKind, FeatureError, FeatureResult};
use crate::gap::{GapParams, find_gap};
use crate::knee::{Cohort, PatientKnee, Region};
use crate::projection::{OffscreenRenderer, ProjectionParams};
use crate::table::{FeatureRow, FeatureTable, FeatureValue};
use crate::tracing_ext::{OperationTimer, log_patient_result, log_progress};

/// Computes named feature columns for one patient.
pub trait FeatureExtractor {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Column names, in output order.
    fn columns(&self) -> &[&'static str];

    /// One outcome per column, in the order of [`columns`](Self::columns).
    fn extract(&mut self, knee: &PatientKnee) -> Vec<FeatureResult<FeatureValue>>;
}

/// Mean absolute curvature of the medial and lateral tibial cartilage.
#[derive(Debug, Clone, Default)]
pub struct CurvatureFeatures {
    pub params: CurvatureParams,
}

impl CurvatureFeatures {
    pub fn new(params: CurvatureParams) -> Self {
        Self { params }
    }
}

impl FeatureExtractor for CurvatureFeatures {
    fn name(&self) -> &'static str {
        "curvature"
    }

    fn columns(&self) -> &[&'static str] {
        &["tib_med_curv", "tib_lat_curv"]
    }

    fn extract(&mut self, knee: &PatientKnee) -> Vec<FeatureResult<FeatureValue>> {
        [Region::TibialCartilageMedial, Region::TibialCartilageLateral]
            .into_iter()
            .map(|region| {
                let mesh = knee.require(region)?;
                mean_abs_curvature(mesh, &self.params).map(FeatureValue::Number)
            })
            .collect()
    }
}

/// Hole/roughness health of the medial and lateral tibial cartilage.
///
/// Owns one render buffer that is reused for every patient.
#[derive(Debug, Clone)]
pub struct HealthFeatures {
    projection: ProjectionParams,
    health: HealthParams,
    renderer: OffscreenRenderer,
}

impl HealthFeatures {
    pub fn new(projection: ProjectionParams, health: HealthParams) -> FeatureResult<Self> {
        projection.validate()?;
        let renderer = OffscreenRenderer::for_params(&projection)?;
        Ok(Self {
            projection,
            health,
            renderer,
        })
    }

    fn region_health(&mut self, knee: &PatientKnee, region: Region) -> FeatureResult<bool> {
        let surface = knee.require(region)?.extract_surface();
        let image = self.renderer.project_and_rasterize(
            &surface,
            None,
            self.projection.normal(),
            &self.projection,
        )?;
        Ok(classify_health(&image, &self.health))
    }
}

impl FeatureExtractor for HealthFeatures {
    fn name(&self) -> &'static str {
        "health"
    }

    fn columns(&self) -> &[&'static str] {
        &["tib_med_ishealthy", "tib_lat_ishealthy"]
    }

    fn extract(&mut self, knee: &PatientKnee) -> Vec<FeatureResult<FeatureValue>> {
        [Region::TibialCartilageMedial, Region::TibialCartilageLateral]
            .into_iter()
            .map(|region| self.region_health(knee, region).map(FeatureValue::Bool))
            .collect()
    }
}

/// Intercondylar gap distance and its two endpoints.
#[derive(Debug, Clone, Default)]
pub struct FemurGapFeatures {
    pub params: GapParams,
}

impl FemurGapFeatures {
    pub fn new(params: GapParams) -> Self {
        Self { params }
    }
}

impl FeatureExtractor for FemurGapFeatures {
    fn name(&self) -> &'static str {
        "femur_gap"
    }

    fn columns(&self) -> &[&'static str] {
        &["femur_gap_dist", "femur_left_gap_p", "femur_right_gap_p"]
    }

    /// On failure the error is reported on the distance column; the endpoint
    /// columns are left missing without a separate failure.
    fn extract(&mut self, knee: &PatientKnee) -> Vec<FeatureResult<FeatureValue>> {
        let gap = knee
            .require(Region::Femur)
            .and_then(|femur| find_gap(&femur.extract_surface(), &self.params));

        match gap {
            Ok(gap) => vec![
                Ok(FeatureValue::Number(gap.distance)),
                Ok(gap.left_point.into()),
                Ok(gap.right_point.into()),
            ],
            Err(e) => vec![
                Err(e),
                Ok(FeatureValue::Missing),
                Ok(FeatureValue::Missing),
            ],
        }
    }
}

/// Number of mesh points per region.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointCountFeatures;

impl PointCountFeatures {
    const REGIONS: [Region; 7] = [
        Region::Patella,
        Region::Femur,
        Region::Tibia,
        Region::PatellarCartilage,
        Region::FemoralCartilage,
        Region::TibialCartilageMedial,
        Region::TibialCartilageLateral,
    ];
}

impl FeatureExtractor for PointCountFeatures {
    fn name(&self) -> &'static str {
        "point_count"
    }

    fn columns(&self) -> &[&'static str] {
        &[
            "Patella_PN",
            "Femur_PN",
            "Tibia_PN",
            "Patella_Car_PN",
            "Femur_Car_PN",
            "Tibia_M_Car_PN",
            "Tibia_L_Car_PN",
        ]
    }

    fn extract(&mut self, knee: &PatientKnee) -> Vec<FeatureResult<FeatureValue>> {
        Self::REGIONS
            .iter()
            .map(|&region| knee.require(region).map(|m| m.n_points().into()))
            .collect()
    }
}

/// The curvature, health and femur gap extractors.
pub fn default_extractors(
    projection: ProjectionParams,
    health: HealthParams,
    gap: GapParams,
    curvature: CurvatureParams,
) -> FeatureResult<Vec<Box<dyn FeatureExtractor>>> {
    Ok(vec![
        Box::new(CurvatureFeatures::new(curvature)),
        Box::new(HealthFeatures::new(projection, health)?),
        Box::new(FemurGapFeatures::new(gap)),
    ])
}

/// One failed feature cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureFailure {
    pub code: String,
    pub column: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Failures collected over a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub patients: usize,
    pub failures: Vec<FeatureFailure>,
}

impl BatchReport {
    pub fn record(&mut self, code: &str, column: &str, error: &FeatureError) {
        self.failures.push(FeatureFailure {
            code: code.to_string(),
            column: column.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn by_kind(&self) -> BTreeMap<ErrorKind, usize> {
        let mut counts = BTreeMap::new();
        for f in &self.failures {
            *counts.entry(f.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn by_column(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for f in &self.failures {
            *counts.entry(f.column.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of distinct patients with at least one failure.
    pub fn patients_with_failures(&self) -> usize {
        let mut codes: Vec<&str> = self.failures.iter().map(|f| f.code.as_str()).collect();
        codes.sort_unstable();
        codes.dedup();
        codes.len()
    }

    /// Log a summary of the batch.
    pub fn log_summary(&self) {
        if self.is_clean() {
            info!(patients = self.patients, "All features extracted");
            return;
        }
        for (kind, count) in self.by_kind() {
            warn!(%kind, count, "Feature failures by kind");
        }
        for (column, count) in self.by_column() {
            warn!(%column, count, "Feature failures by column");
        }
        warn!(
            patients = self.patients,
            affected = self.patients_with_failures(),
            failures = self.failure_count(),
            "Feature extraction finished with missing values"
        );
    }
}

/// Compute one row of features for a patient.
pub fn extract_row(
    knee: &PatientKnee,
    extractors: &mut [Box<dyn FeatureExtractor>],
    report: &mut BatchReport,
) -> FeatureRow {
    let mut values = Vec::new();
    for extractor in extractors.iter_mut() {
        let outcomes = extractor.extract(knee);
        debug_assert_eq!(outcomes.len(), extractor.columns().len());

        for (column, outcome) in extractor.columns().iter().zip(outcomes) {
            match outcome {
                Ok(value) => values.push(value),
                Err(e) => {
                    warn!(
                        patient = %knee.code,
                        extractor = extractor.name(),
                        column = *column,
                        error = %e,
                        "Feature failed"
                    );
                    report.record(&knee.code, column, &e);
                    values.push(FeatureValue::Missing);
                }
            }
        }
    }
    FeatureRow {
        code: knee.code.clone(),
        values,
    }
}

/// Run all extractors over the cohort and left-join the new columns onto
/// `table` on `Code`.
///
/// Rows of `table` are kept in order; patients absent from `table` produce
/// no row. Extractors with overlapping column names are rejected.
pub fn add_feature_columns(
    cohort: &Cohort,
    table: &FeatureTable,
    extractors: &mut [Box<dyn FeatureExtractor>],
) -> FeatureResult<(FeatureTable, BatchReport)> {
    let _timer = OperationTimer::new("add_feature_columns");

    let mut columns: Vec<String> = Vec::new();
    for extractor in extractors.iter() {
        for column in extractor.columns() {
            if columns.iter().any(|c| c == column) {
                return Err(FeatureError::DuplicateColumn {
                    column: column.to_string(),
                });
            }
            columns.push(column.to_string());
        }
    }

    let mut report = BatchReport {
        patients: cohort.len(),
        ..Default::default()
    };
    let mut rows = Vec::with_capacity(cohort.len());

    for (i, knee) in cohort.iter().enumerate() {
        log_progress(i + 1, cohort.len(), &knee.code);
        let timer = OperationTimer::for_patient("extract_patient", &knee.code);
        let before = report.failure_count();

        rows.push(extract_row(knee, extractors, &mut report));

        log_patient_result(
            &knee.code,
            columns.len(),
            report.failure_count() - before,
            timer.elapsed_ms(),
        );
    }

    let features = FeatureTable::from_rows(&columns, rows);
    let joined = table.left_join(&features)?;
    report.log_summary();

    Ok((joined, report))
}
