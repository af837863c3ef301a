use std::path::Path;
use std::str::FromStr;

use dfloc_3d::pose::Pose4;
use dfloc_icp::IcpConfig;
use dfloc_ndt::NdtConfig;
use dfloc_solver::SolverConfig;
use serde::{Deserialize, Serialize};

use crate::error::LocalizerError;

/// The registration method used for every update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignMethod {
    /// Direct registration against the distance field.
    #[default]
    DistanceField,
    /// Normal distributions transform against the map points.
    Ndt,
    /// Point to point ICP against the map points.
    Icp,
}

impl FromStr for AlignMethod {
    type Err = LocalizerError;

    /// Parse a method name or its numeric code (`1` distance field, `2` NDT, `3` ICP).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "dll" | "distance_field" => Ok(Self::DistanceField),
            "2" | "ndt" => Ok(Self::Ndt),
            "3" | "icp" => Ok(Self::Icp),
            _ => Err(LocalizerError::UnknownAlignMethod(s.to_string())),
        }
    }
}

/// Parameters of the localizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    /// Odometric translation in meters that triggers an update.
    pub update_min_d: f64,
    /// Odometric heading change in radians that triggers an update.
    pub update_min_a: f64,
    /// Elapsed time in seconds that triggers an update.
    pub update_min_time: f64,
    /// Pose used to initialize the localizer at construction.
    pub initial_pose: Option<Pose4>,
    /// Height added to the initial pose.
    pub initial_z_offset: f64,
    /// Take roll and pitch from the IMU instead of the odometry.
    pub use_imu: bool,
    /// Scan points closer than this range in meters are dropped.
    pub min_range: f64,
    /// Scan points farther than this range in meters are dropped.
    pub max_range: f64,
    /// Edge length of the voxel filter applied to scans, disabled when `None`.
    pub voxel_size: Option<f64>,
    /// The registration method.
    pub align_method: AlignMethod,
    /// Parameters of the distance field solver.
    pub solver: SolverConfig,
    /// Parameters of the ICP strategy.
    pub icp: IcpConfig,
    /// Parameters of the NDT strategy.
    pub ndt: NdtConfig,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            update_min_d: 0.1,
            update_min_a: 0.1,
            update_min_time: 1.0,
            initial_pose: None,
            initial_z_offset: 0.0,
            use_imu: false,
            min_range: 1.0,
            max_range: 100.0,
            voxel_size: None,
            align_method: AlignMethod::DistanceField,
            solver: SolverConfig::default(),
            icp: IcpConfig::default(),
            ndt: NdtConfig::default(),
        }
    }
}

impl LocalizerConfig {
    /// Read a configuration from a JSON file.
    ///
    /// Missing fields take their default value.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LocalizerError> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values are consistent.
    pub fn validate(&self) -> Result<(), LocalizerError> {
        if !(self.min_range >= 0.0 && self.max_range > self.min_range) {
            return Err(LocalizerError::InvalidConfig(format!(
                "range band [{}, {}] is empty",
                self.min_range, self.max_range
            )));
        }

        if let Some(size) = self.voxel_size {
            if !(size > 0.0 && size.is_finite()) {
                return Err(LocalizerError::InvalidConfig(format!(
                    "voxel size {size} must be positive"
                )));
            }
        }

        let thresholds = [self.update_min_d, self.update_min_a, self.update_min_time];
        if thresholds.iter().any(|t| !(*t >= 0.0)) {
            return Err(LocalizerError::InvalidConfig(
                "update thresholds must be non negative".to_string(),
            ));
        }

        self.solver.validate()?;
        self.ndt.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("localizer.json");
        std::fs::write(
            &path,
            r#"{
                "update_min_d": 0.5,
                "use_imu": true,
                "initial_pose": { "x": 1.0, "y": 2.0, "z": 0.0, "yaw": 0.5 },
                "align_method": "ndt",
                "solver": { "max_iterations": 20, "loss": { "Cauchy": { "scale": 0.2 } } }
            }"#,
        )?;

        let config = LocalizerConfig::from_json_file(&path)?;
        assert_eq!(config.update_min_d, 0.5);
        assert_eq!(config.update_min_a, 0.1);
        assert!(config.use_imu);
        assert_eq!(config.initial_pose, Some(Pose4::new(1.0, 2.0, 0.0, 0.5)));
        assert_eq!(config.align_method, AlignMethod::Ndt);
        assert_eq!(config.solver.max_iterations, 20);
        assert_eq!(config.solver.min_valid_points, 10);
        Ok(())
    }

    #[test]
    fn test_invalid_config() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "min_range": 10.0, "max_range": 5.0 }"#)?;
        assert!(matches!(
            LocalizerConfig::from_json_file(&path),
            Err(LocalizerError::InvalidConfig(_))
        ));

        std::fs::write(&path, r#"{ "solver": { "max_yaw_step": -0.1 } }"#)?;
        assert!(matches!(
            LocalizerConfig::from_json_file(&path),
            Err(LocalizerError::Solver(_))
        ));

        std::fs::write(&path, r#"{ "ndt": { "max_translation_step": -1.0 } }"#)?;
        assert!(matches!(
            LocalizerConfig::from_json_file(&path),
            Err(LocalizerError::Ndt(_))
        ));

        std::fs::write(&path, "not json")?;
        assert!(matches!(
            LocalizerConfig::from_json_file(&path),
            Err(LocalizerError::Json(_))
        ));
        Ok(())
    }

    #[test]
    fn test_align_method_from_str() -> Result<(), LocalizerError> {
        assert_eq!("1".parse::<AlignMethod>()?, AlignMethod::DistanceField);
        assert_eq!("NDT".parse::<AlignMethod>()?, AlignMethod::Ndt);
        assert_eq!("icp".parse::<AlignMethod>()?, AlignMethod::Icp);
        assert!("foo".parse::<AlignMethod>().is_err());
        Ok(())
    }
}
