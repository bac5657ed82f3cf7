use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Root used for rewritten identifiers (pydicom's organisational root)
pub const DEFAULT_UID_PREFIX: &str = "1.2.826.0.1.3680043.8.498";

/// HU value above which a single burned voxel is clamped to the bolus value
pub const DEFAULT_THRESHOLD_HU: f64 = 20.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("suffix length must be at least 1")]
    ZeroSuffixLength,

    #[error("UID prefix must not be empty")]
    EmptyPrefix,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parameters of one synthetic bolus run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BolusConfig {
    pub uid_prefix: String,
    /// Number of trailing UID components kept after the prefix
    pub suffix_length: usize,
    /// Dilation of every bolus mask, in voxels
    pub margin: usize,
    /// HU value burned into the bolus region
    pub hu_mask: f64,
    pub threshold_hu: f64,
    pub ct_file_prefix: String,
    pub rtstruct_file_name: String,
}

impl Default for BolusConfig {
    fn default() -> Self {
        Self {
            uid_prefix: DEFAULT_UID_PREFIX.to_owned(),
            suffix_length: 1,
            margin: 0,
            hu_mask: 0.0,
            threshold_hu: DEFAULT_THRESHOLD_HU,
            ct_file_prefix: "CT.slice_".to_owned(),
            rtstruct_file_name: "RS.Struct_mod.dcm".to_owned(),
        }
    }
}

impl BolusConfig {
    /// Read a JSON configuration; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.suffix_length == 0 {
            return Err(ConfigError::ZeroSuffixLength);
        }
        if self.uid_prefix.trim().is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        Ok(())
    }

    /// Output file name of the CT slice at 1-based `position`
    pub fn ct_file_name(&self, position: usize) -> String {
        format!("{}{:03}.dcm", self.ct_file_prefix, position)
    }
}

/// Storage locations of one run.
#[derive(Clone, Debug)]
pub struct RunPaths {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl RunPaths {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }
}
