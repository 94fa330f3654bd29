//! Convert raw FLIR thermal dumps into geo-referenced
//! products.
//!
//! Each input is a dataset holding one `_ir.bin` frame (a
//! headerless grid of little-endian `u16` sensor counts) and
//! its cleaned capture metadata. For every input the crate
//! produces two artifacts under the sensor's output tree:
//!
//! 1. A PNG preview of the raw counts, stretched per frame.
//!
//! 2. A GeoTIFF of pixel-wise temperature in kelvin, placed by
//! the capture's bounding box (EPSG:4326). Counts are
//! converted with the Planck radiometric model, a port of the
//! [Thermimage R library].
//!
//! # Usage
//!
//! The [`Pipeline`] runs in two phases. [`Pipeline::check`]
//! decides whether an input needs work, and
//! [`Pipeline::process`] produces what is missing. Runs are
//! idempotent: outputs on disk are never rewritten unless
//! `overwrite` is set, and completion is recorded in the
//! catalog so repeated triggers are skipped.
//!
//! ```rust
//! # fn test_compile() -> anyhow::Result<()> {
//! use flir_geotiff::{Config, InputRecord, LocalCatalog, Parameters, Pipeline};
//!
//! let config = Config::default();
//! let catalog = LocalCatalog::new(&config.catalog_root);
//! let pipeline = Pipeline::new(config, catalog);
//!
//! let input: InputRecord = serde_json::from_str(r#"{
//!     "id": "raw-1",
//!     "name": "flirIrCamera - 2018-07-01__12-30-00"
//! }"#)?;
//! let outcome = pipeline.run(&input, Parameters::default())?;
//! # Ok(())
//! # }
//! ```
//!
//! [Thermimage R library]: //github.com/gtatters/Thermimage/blob/master/R/raw2temp.R

pub mod catalog;
pub mod config;
pub mod error;
pub mod frame;
pub mod geotiff;
pub mod input;
pub mod metadata;
pub mod pipeline;
pub mod preview;
pub mod sensors;
pub mod staging;
pub mod temperature;

#[cfg(feature = "cli")]
pub mod cli;

pub use crate::catalog::{Catalog, LocalCatalog};
pub use crate::config::Config;
pub use crate::error::{DecodeError, PipelineError, PipelineResult};
pub use crate::frame::{FrameDecoder, FrameShape, OrientedFrame, Rotation};
pub use crate::input::{InputRecord, Timestamp};
pub use crate::pipeline::{Decision, Outcome, Parameters, Pipeline, RunSummary, SkipReason};
