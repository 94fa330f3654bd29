//! Pipeline configuration.
//!
//! Every field has a default matching the FLIR gantry camera,
//! so a config file only needs to name what differs.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde_derive::*;

use crate::{
    frame::{FrameShape, Rotation},
    metadata::ExtractorInfo,
    sensors::SensorConfig,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Catalog base URL used to build resource links.
    pub host: String,
    /// Root of the derived product tree.
    pub output_root: PathBuf,
    /// Where per-input staging directories are created.
    /// Defaults to the system temp directory.
    pub staging_root: Option<PathBuf>,
    /// Root of the on-disk catalog used by the CLI.
    pub catalog_root: PathBuf,
    /// Regenerate outputs even when they already exist.
    pub overwrite: bool,
    /// Stretch each preview over its own value range.
    pub scale_values: bool,
    pub sensor: SensorConfig,
    pub frame: FrameShape,
    pub rotation: Rotation,
    pub extractor: ExtractorInfo,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "http://localhost:9000/".into(),
            output_root: PathBuf::from("sites/ua-mac"),
            staging_root: None,
            catalog_root: PathBuf::from("catalog"),
            overwrite: false,
            scale_values: true,
            sensor: SensorConfig::default(),
            frame: FrameShape::default(),
            rotation: Rotation::default(),
            extractor: ExtractorInfo::default(),
        }
    }
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn staging_root(&self) -> PathBuf {
        self.staging_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
