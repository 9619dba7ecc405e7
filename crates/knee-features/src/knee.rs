//! Patient knee bundles and cohort loading.
//!
//! A patient directory holds one Abaqus deck per anatomical region. Files are
//! assigned to regions by an ordered table of filename prefixes; the first
//! matching prefix wins and files matching nothing are ignored.
//!
//! ```text
//! data/raw/set_2/
//! ├── 9968924M00/
//! │   ├── BONE2-FEMUR-....inp
//! │   ├── TIB_CART_MED....inp
//! │   └── ...
//! └── 9911221M00/
//!     └── ...
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{FeatureError, FeatureResult};
use crate::io::load_inp;
use crate::tracing_ext::log_mesh_stats;
use crate::volume::VolumeMesh;

/// Anatomical regions of a knee model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Region {
    Femur,
    Tibia,
    Patella,
    FemoralCartilage,
    PatellarCartilage,
    TibialCartilageLateral,
    TibialCartilageMedial,
}

/// Filename prefix → region, evaluated in order, first match wins.
pub const REGION_PATTERNS: [(&str, Region); 7] = [
    ("BONE2-FEMUR", Region::Femur),
    ("BONE3-TIBIA", Region::Tibia),
    ("BONE5-PATELLA-", Region::Patella),
    ("FEM_CART", Region::FemoralCartilage),
    ("PAT_CART", Region::PatellarCartilage),
    ("TIB_CART_LAT", Region::TibialCartilageLateral),
    ("TIB_CART_MED", Region::TibialCartilageMedial),
];

impl Region {
    /// All regions in table order.
    pub const ALL: [Region; 7] = [
        Region::Femur,
        Region::Tibia,
        Region::Patella,
        Region::FemoralCartilage,
        Region::PatellarCartilage,
        Region::TibialCartilageLateral,
        Region::TibialCartilageMedial,
    ];

    /// The filename prefix that selects this region.
    pub fn file_pattern(self) -> &'static str {
        REGION_PATTERNS
            .iter()
            .find(|(_, region)| *region == self)
            .map(|(pattern, _)| *pattern)
            .unwrap_or("")
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Region::Femur => "femur",
            Region::Tibia => "tibia",
            Region::Patella => "patella",
            Region::FemoralCartilage => "femoral cartilage",
            Region::PatellarCartilage => "patellar cartilage",
            Region::TibialCartilageLateral => "lateral tibial cartilage",
            Region::TibialCartilageMedial => "medial tibial cartilage",
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Assign a file name to a region. Matching is a case-sensitive prefix test.
pub fn classify_file_name(name: &str) -> Option<Region> {
    REGION_PATTERNS
        .iter()
        .find(|(pattern, _)| name.starts_with(pattern))
        .map(|(_, region)| *region)
}

/// The region meshes of one patient.
#[derive(Debug, Clone, Default)]
pub struct PatientKnee {
    /// Patient code, the join key of the feature table.
    pub code: String,
    regions: BTreeMap<Region, VolumeMesh>,
}

impl PatientKnee {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            regions: BTreeMap::new(),
        }
    }

    /// Store a region mesh, replacing any previous one.
    pub fn insert(&mut self, region: Region, mesh: VolumeMesh) -> Option<VolumeMesh> {
        self.regions.insert(region, mesh)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_region(mut self, region: Region, mesh: VolumeMesh) -> Self {
        self.insert(region, mesh);
        self
    }

    pub fn get(&self, region: Region) -> Option<&VolumeMesh> {
        self.regions.get(&region)
    }

    /// Region mesh, or a `MissingRegion` error naming this patient.
    pub fn require(&self, region: Region) -> FeatureResult<&VolumeMesh> {
        self.get(region)
            .ok_or_else(|| FeatureError::missing_region(&self.code, region))
    }

    pub fn regions(&self) -> impl Iterator<Item = (Region, &VolumeMesh)> {
        self.regions.iter().map(|(r, m)| (*r, m))
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Load every `.inp` file below `dir` (recursively).
    ///
    /// The patient code is the directory name. A file that fails to parse is
    /// logged and leaves its region absent.
    pub fn load(dir: &Path) -> FeatureResult<Self> {
        let code = dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .ok_or_else(|| FeatureError::config(format!("{} has no directory name", dir.display())))?;

        let mut knee = PatientKnee::new(code);
        let mut files = Vec::new();
        collect_inp_files(dir, &mut files)?;

        for path in files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(region) = classify_file_name(name) else {
                debug!(file = name, "File matches no region pattern");
                continue;
            };

            match load_inp(&path) {
                Ok(mesh) if mesh.is_empty() => {
                    warn!(patient = %knee.code, %region, file = name, "Region mesh is empty");
                }
                Ok(mesh) => {
                    log_mesh_stats(&mesh, region.name());
                    if knee.insert(region, mesh).is_some() {
                        warn!(patient = %knee.code, %region, file = name, "Several files for one region, keeping the last");
                    }
                }
                Err(e) => {
                    warn!(patient = %knee.code, %region, file = name, error = %e, "Failed to load region mesh");
                }
            }
        }

        debug!(
            patient = %knee.code,
            regions = knee.region_count(),
            "Loaded patient knee"
        );
        Ok(knee)
    }
}

/// Collect `.inp` files below `dir` in sorted order.
fn collect_inp_files(dir: &Path, out: &mut Vec<PathBuf>) -> FeatureResult<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| FeatureError::io_read(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_inp_files(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("inp"))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// All patients of a data set, keyed and ordered by code.
#[derive(Debug, Clone, Default)]
pub struct Cohort {
    patients: BTreeMap<String, PatientKnee>,
}

impl Cohort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, knee: PatientKnee) {
        self.patients.insert(knee.code.clone(), knee);
    }

    pub fn get(&self, code: &str) -> Option<&PatientKnee> {
        self.patients.get(code)
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    /// Patients in code order.
    pub fn iter(&self) -> impl Iterator<Item = &PatientKnee> {
        self.patients.values()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.patients.keys().map(String::as_str)
    }
}

impl FromIterator<PatientKnee> for Cohort {
    fn from_iter<T: IntoIterator<Item = PatientKnee>>(iter: T) -> Self {
        let mut cohort = Cohort::new();
        for knee in iter {
            cohort.insert(knee);
        }
        cohort
    }
}

/// Load every patient directory directly below `data_dir`.
pub fn load_cohort(data_dir: &Path) -> FeatureResult<Cohort> {
    let mut cohort = Cohort::new();
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(data_dir)
        .map_err(|e| FeatureError::io_read(data_dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    for dir in dirs {
        match PatientKnee::load(&dir) {
            Ok(knee) => cohort.insert(knee),
            Err(e) => warn!(dir = %dir.display(), error = %e, "Skipping patient directory"),
        }
    }

    info!(
        data_dir = %data_dir.display(),
        patients = cohort.len(),
        "Loaded cohort"
    );
    Ok(cohort)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_file_names() {
        assert_eq!(classify_file_name("BONE2-FEMUR-1.inp"), Some(Region::Femur));
        assert_eq!(classify_file_name("BONE3-TIBIA.inp"), Some(Region::Tibia));
        assert_eq!(classify_file_name("BONE5-PATELLA-R.inp"), Some(Region::Patella));
        assert_eq!(classify_file_name("FEM_CART_1.inp"), Some(Region::FemoralCartilage));
        assert_eq!(classify_file_name("PAT_CART.inp"), Some(Region::PatellarCartilage));
        assert_eq!(
            classify_file_name("TIB_CART_LAT-1.inp"),
            Some(Region::TibialCartilageLateral)
        );
        assert_eq!(
            classify_file_name("TIB_CART_MED-1.inp"),
            Some(Region::TibialCartilageMedial)
        );
    }

    #[test]
    fn test_classify_is_anchored_and_case_sensitive() {
        assert_eq!(classify_file_name("X_FEM_CART.inp"), None);
        assert_eq!(classify_file_name("fem_cart.inp"), None);
        // Patella needs the trailing dash
        assert_eq!(classify_file_name("BONE5-PATELLA.inp"), None);
        assert_eq!(classify_file_name("MENISCUS.inp"), None);
    }

    #[test]
    fn test_pattern_table_covers_every_region_once() {
        for region in Region::ALL {
            let hits = REGION_PATTERNS.iter().filter(|(_, r)| *r == region).count();
            assert_eq!(hits, 1, "{region} should appear exactly once");
            assert!(!region.file_pattern().is_empty());
        }
    }

    #[test]
    fn test_require_missing_region() {
        let knee = PatientKnee::new("P01");
        let err = knee.require(Region::Femur).unwrap_err();
        assert!(matches!(err, FeatureError::MissingRegion { region: Region::Femur, .. }));
    }

    #[test]
    fn test_cohort_is_ordered_by_code() {
        let cohort: Cohort = ["B", "C", "A"].into_iter().map(PatientKnee::new).collect();
        let codes: Vec<&str> = cohort.codes().collect();
        assert_eq!(codes, vec!["A", "B", "C"]);
    }
}
