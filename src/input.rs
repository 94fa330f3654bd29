//! Input records handed to the pipeline by the dataset
//! discovery layer.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use lazy_static::lazy_static;
use regex::Regex;
use serde_derive::*;

use crate::error::PipelineError;

/// Suffix identifying the raw thermal dump.
pub const RAW_SUFFIX: &str = "_ir.bin";
/// Suffix of the locally downloaded dataset metadata.
pub const METADATA_SUFFIX: &str = "_dataset_metadata.json";

/// A file known to belong to the input dataset.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct InputFile {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub filepath: Option<PathBuf>,
}

impl InputFile {
    pub fn is_raw_frame(&self) -> bool {
        self.filename
            .as_deref()
            .map_or(false, |name| name.ends_with(RAW_SUFFIX))
    }
}

/// One raw-sensor dataset to convert.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct InputRecord {
    /// Identifier of the dataset in the catalog.
    pub id: String,
    /// Human readable name, `"<sensor> - <timestamp>"`.
    pub name: String,
    #[serde(default)]
    pub files: Vec<InputFile>,
    /// Files downloaded for processing.
    #[serde(default)]
    pub local_paths: Vec<PathBuf>,
    #[serde(default)]
    pub triggering_file: Option<String>,
    #[serde(default)]
    pub latest_file: Option<String>,
}

impl InputRecord {
    /// Whether the file that triggered this input is still
    /// the newest one in its dataset.
    pub fn is_latest(&self) -> bool {
        match (&self.triggering_file, &self.latest_file) {
            (Some(trigger), Some(latest)) => trigger == latest,
            _ => true,
        }
    }

    /// Raw dump among the dataset's known files.
    pub fn raw_file(&self) -> Option<&InputFile> {
        self.files.iter().rev().find(|f| f.is_raw_frame())
    }

    pub fn timestamp(&self) -> Result<Timestamp, PipelineError> {
        Timestamp::from_dataset_name(&self.name)
    }

    pub fn has_local_path(&self, path: &Path) -> bool {
        self.local_paths.iter().any(|p| p == path)
    }

    fn local_with_suffix(&self, suffix: &str) -> Option<&Path> {
        self.local_paths
            .iter()
            .rev()
            .find(|p| p.to_string_lossy().ends_with(suffix))
            .map(PathBuf::as_path)
    }

    pub fn local_raw_frame(&self) -> Option<&Path> {
        self.local_with_suffix(RAW_SUFFIX)
    }

    pub fn local_metadata(&self) -> Option<&Path> {
        self.local_with_suffix(METADATA_SUFFIX)
    }
}

/// Capture timestamp embedded in a dataset name, e.g.
/// `2018-07-01__12-30-00` or `2017-04-27__09-46-49-455`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Timestamp(String);

lazy_static! {
    static ref TIMESTAMP_RE: Regex =
        Regex::new(r"^\d{4}-\d{2}-\d{2}__\d{2}-\d{2}-\d{2}(-\d+)?$").unwrap();
}

impl Timestamp {
    /// Take everything after the first `" - "` of a dataset
    /// name as the timestamp.
    pub fn from_dataset_name(name: &str) -> Result<Self, PipelineError> {
        let (_, ts) = name
            .split_once(" - ")
            .ok_or_else(|| PipelineError::InvalidName(name.to_owned()))?;
        ts.parse()
            .map_err(|_| PipelineError::InvalidName(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn year(&self) -> &str {
        &self.0[0..4]
    }

    pub fn month(&self) -> &str {
        &self.0[5..7]
    }

    pub fn day(&self) -> &str {
        &self.0[8..10]
    }

    /// `YYYY-MM-DD`
    pub fn date(&self) -> &str {
        &self.0[0..10]
    }
}

impl FromStr for Timestamp {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if TIMESTAMP_RE.is_match(s) {
            Ok(Timestamp(s.to_owned()))
        } else {
            Err(PipelineError::InvalidName(s.to_owned()))
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> InputFile {
        InputFile {
            filename: Some(name.into()),
            filepath: Some(PathBuf::from("/raw").join(name)),
        }
    }

    #[test]
    fn timestamp_components() -> anyhow::Result<()> {
        let ts = Timestamp::from_dataset_name("Thermal IR - 2018-07-01__12-30-00")?;
        assert_eq!(ts.as_str(), "2018-07-01__12-30-00");
        assert_eq!((ts.year(), ts.month(), ts.day()), ("2018", "07", "01"));
        assert_eq!(ts.date(), "2018-07-01");
        Ok(())
    }

    #[test]
    fn timestamp_with_millis() -> anyhow::Result<()> {
        let ts = Timestamp::from_dataset_name("flirIrCamera - 2017-04-27__09-46-49-455")?;
        assert_eq!(ts.to_string(), "2017-04-27__09-46-49-455");
        Ok(())
    }

    #[test]
    fn malformed_names_are_rejected() {
        for name in ["flirIrCamera", "flirIrCamera - yesterday", "x - 2018-07-01"] {
            assert!(matches!(
                Timestamp::from_dataset_name(name),
                Err(PipelineError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn raw_file_by_suffix() {
        let mut input = InputRecord {
            files: vec![file("a_metadata.json"), InputFile::default()],
            ..Default::default()
        };
        assert!(input.raw_file().is_none());

        input.files.push(file("abc_ir.bin"));
        assert_eq!(
            input.raw_file().and_then(|f| f.filename.as_deref()),
            Some("abc_ir.bin")
        );
    }

    #[test]
    fn staleness() {
        let mut input = InputRecord::default();
        assert!(input.is_latest());

        input.triggering_file = Some("a_ir.bin".into());
        assert!(input.is_latest());

        input.latest_file = Some("b_ir.bin".into());
        assert!(!input.is_latest());

        input.latest_file = Some("a_ir.bin".into());
        assert!(input.is_latest());
    }

    #[test]
    fn local_paths_by_suffix() {
        let input = InputRecord {
            local_paths: vec![
                "/tmp/x/abc_dataset_metadata.json".into(),
                "/tmp/x/abc_ir.bin".into(),
            ],
            ..Default::default()
        };
        assert_eq!(input.local_raw_frame(), Some(Path::new("/tmp/x/abc_ir.bin")));
        assert_eq!(
            input.local_metadata(),
            Some(Path::new("/tmp/x/abc_dataset_metadata.json"))
        );
        assert!(input.has_local_path(Path::new("/tmp/x/abc_ir.bin")));
        assert!(!input.has_local_path(Path::new("/tmp/x/other.png")));
    }
}
