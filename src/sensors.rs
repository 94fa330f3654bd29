//! Output path naming for derived sensor products.
//!
//! Products live under
//! `<root>/<level>/<sensor>/<date>/<timestamp>/` and are named
//! `<sensor>_<level tag>_<station>_<timestamp>.<ext>`, so both
//! artifacts of one capture share a directory and a stem.

use std::{
    fs,
    io,
    path::PathBuf,
};

use serde_derive::*;

use crate::input::Timestamp;

/// Naming parameters of the derived product.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    pub sensor: String,
    pub display_name: String,
    pub station: String,
    pub level: String,
    pub level_tag: String,
    /// Key of the source camera in upstream metadata.
    pub source_sensor: String,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            sensor: "ir_geotiff".into(),
            display_name: "Thermal IR GeoTIFFs".into(),
            station: "ua-mac".into(),
            level: "Level_1".into(),
            level_tag: "L1".into(),
            source_sensor: "flirIrCamera".into(),
        }
    }
}

pub const DEFAULT_EXT: &str = "tif";

#[derive(Debug, Clone)]
pub struct SensorPaths {
    root: PathBuf,
    config: SensorConfig,
}

impl SensorPaths {
    pub fn new<P: Into<PathBuf>>(root: P, config: SensorConfig) -> Self {
        SensorPaths {
            root: root.into(),
            config,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.config.display_name
    }

    /// Directory holding all products of one capture.
    pub fn sensor_dir(&self, ts: &Timestamp) -> PathBuf {
        self.root
            .join(&self.config.level)
            .join(&self.config.sensor)
            .join(ts.date())
            .join(ts.as_str())
    }

    /// Path of a product. Does not touch the filesystem.
    pub fn sensor_path(&self, ts: &Timestamp, ext: Option<&str>) -> PathBuf {
        let SensorConfig {
            sensor,
            station,
            level_tag,
            ..
        } = &self.config;
        let ext = ext.unwrap_or(DEFAULT_EXT);
        self.sensor_dir(ts)
            .join(format!("{sensor}_{level_tag}_{station}_{ts}.{ext}"))
    }

    /// Like [`sensor_path`][Self::sensor_path], creating the
    /// parent directory.
    pub fn create_sensor_path(&self, ts: &Timestamp, ext: Option<&str>) -> io::Result<PathBuf> {
        let path = self.sensor_path(ts, ext);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn paths_embed_timestamp() -> Result<()> {
        let ts: Timestamp = "2018-07-01__12-30-00".parse()?;
        let paths = SensorPaths::new("/sites", SensorConfig::default());

        let tif = paths.sensor_path(&ts, None);
        let png = paths.sensor_path(&ts, Some("png"));
        assert_eq!(
            tif,
            Path::new(
                "/sites/Level_1/ir_geotiff/2018-07-01/2018-07-01__12-30-00/\
                 ir_geotiff_L1_ua-mac_2018-07-01__12-30-00.tif"
            )
        );
        assert_eq!(png.extension().and_then(|e| e.to_str()), Some("png"));
        for p in [&tif, &png] {
            let name = p.file_name().unwrap().to_string_lossy();
            assert!(name.contains("2018-07-01__12-30-00"));
        }
        assert_eq!(tif.parent(), png.parent());
        Ok(())
    }

    #[test]
    fn lookup_does_not_create_directories() -> Result<()> {
        let dir = TempDir::new()?;
        let ts: Timestamp = "2018-07-01__12-30-00".parse()?;
        let paths = SensorPaths::new(dir.path(), SensorConfig::default());

        let path = paths.sensor_path(&ts, None);
        assert!(!path.parent().unwrap().exists());

        let created = paths.create_sensor_path(&ts, None)?;
        assert_eq!(created, path);
        assert!(path.parent().unwrap().is_dir());
        assert!(!path.exists());
        Ok(())
    }
}
