//! Decide, convert and emit for one input.
//!
//! A run has two phases. [`Pipeline::check`] cheaply decides
//! whether an input needs work at all. [`Pipeline::process`]
//! then produces whichever of the two artifacts (PNG preview,
//! GeoTIFF temperature raster) is missing on disk, uploads new
//! files and finally records completion against the input so
//! later updates to it do not trigger another conversion.
//!
//! Disk state is authoritative. The processing phase checks
//! each output path again instead of trusting the decision
//! phase, so a run interrupted after writing only one artifact
//! is completed by the next one.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use serde_derive::*;
use tracing::{debug, info};

use crate::{
    catalog::Catalog,
    config::Config,
    error::{DecodeError, PipelineError, PipelineResult},
    frame::{FrameDecoder, FrameSource, OrientedFrame},
    geotiff::{Attribution, GeoRasterWriter, GeoTiffWriter},
    input::InputRecord,
    metadata::{
        completion_content, extractor_metadata, has_upstream_copy, resource_url, CaptureMetadata,
        MetadataRecord,
    },
    preview::{PngPreview, PreviewRenderer},
    sensors::SensorPaths,
    staging::{relocate, Staging},
    temperature::{PlanckConverter, RadiometricConverter},
};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Preview,
    GeoRaster,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::Preview => "preview",
            ArtifactKind::GeoRaster => "georaster",
        })
    }
}

/// Why an input was not processed.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A newer file has arrived in the dataset since.
    Stale,
    /// No `_ir.bin` among the dataset's files.
    MissingInput,
    /// Both outputs exist in `dir`.
    OutputsPresent { dir: PathBuf },
    /// Completion metadata from this extractor is present.
    AlreadyProcessed,
    NoCalibrationMetadata,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Stale => f.write_str("not latest file"),
            SkipReason::MissingInput => f.write_str("IR bin file not found"),
            SkipReason::OutputsPresent { dir } => write!(f, "outputs found in {}", dir.display()),
            SkipReason::AlreadyProcessed => f.write_str("metadata indicates it was already processed"),
            SkipReason::NoCalibrationMetadata => f.write_str("no terraref metadata found"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Skip(SkipReason),
}

/// Per-message flags from the triggering event.
#[derive(Deserialize, Debug, Clone, Copy, Default)]
#[serde(default)]
pub struct Parameters {
    /// Upstream rules already vetted the input; skip the
    /// decision phase.
    pub rulechecked: bool,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// Written by this run.
    Produced,
    /// Already on disk, left untouched.
    Present,
}

/// What one processing run did.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub resource: String,
    pub target_dataset: String,
    pub preview: ArtifactStatus,
    pub georaster: ArtifactStatus,
    /// Artifacts written.
    pub created: usize,
    /// Bytes written across `created` artifacts.
    pub bytes: u64,
    /// Raw frame decodes performed.
    pub decodes: usize,
    /// URLs of files uploaded to the derived dataset.
    pub files_created: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Skipped(SkipReason),
    Processed(RunSummary),
}

/// Decodes the raw frame at most once per run and hands the
/// same frame to every consumer.
struct FrameCache<'a> {
    source: &'a dyn FrameSource,
    path: &'a Path,
    frame: Option<OrientedFrame>,
    decodes: usize,
}

impl<'a> FrameCache<'a> {
    fn new(source: &'a dyn FrameSource, path: &'a Path) -> Self {
        FrameCache {
            source,
            path,
            frame: None,
            decodes: 0,
        }
    }

    fn get(&mut self) -> Result<&OrientedFrame, DecodeError> {
        let frame = match self.frame.take() {
            Some(frame) => frame,
            None => {
                debug!(path = %self.path.display(), "decoding raw frame");
                self.decodes += 1;
                self.source.decode(self.path)?
            }
        };
        Ok(self.frame.insert(frame))
    }
}

/// The conversion controller.
pub struct Pipeline {
    config: Config,
    paths: SensorPaths,
    decoder: Box<dyn FrameSource>,
    converter: Box<dyn RadiometricConverter>,
    renderer: Box<dyn PreviewRenderer>,
    writer: Box<dyn GeoRasterWriter>,
    catalog: Box<dyn Catalog>,
}

impl Pipeline {
    /// Pipeline with the default decoder, converter, renderer
    /// and writer, configured from `config`.
    pub fn new<C: Catalog + 'static>(config: Config, catalog: C) -> Self {
        let paths = SensorPaths::new(config.output_root.clone(), config.sensor.clone());
        Pipeline {
            decoder: Box::new(FrameDecoder::new(config.frame, config.rotation)),
            converter: Box::new(PlanckConverter::default()),
            renderer: Box::new(PngPreview {
                scale: config.scale_values,
            }),
            writer: Box::new(GeoTiffWriter::default()),
            catalog: Box::new(catalog),
            paths,
            config,
        }
    }

    pub fn with_decoder<D: FrameSource + 'static>(mut self, decoder: D) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    pub fn with_converter<R: RadiometricConverter + 'static>(mut self, converter: R) -> Self {
        self.converter = Box::new(converter);
        self
    }

    pub fn with_renderer<R: PreviewRenderer + 'static>(mut self, renderer: R) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn with_writer<W: GeoRasterWriter + 'static>(mut self, writer: W) -> Self {
        self.writer = Box::new(writer);
        self
    }

    pub fn sensor_paths(&self) -> &SensorPaths {
        &self.paths
    }

    /// Check, then process if needed.
    pub fn run(&self, input: &InputRecord, params: Parameters) -> PipelineResult<Outcome> {
        match self.check(input, params)? {
            Decision::Skip(reason) => Ok(Outcome::Skipped(reason)),
            Decision::Proceed => self.process(input).map(Outcome::Processed),
        }
    }

    /// Decision phase. Filename checks come first, the catalog
    /// is only consulted once those pass. `overwrite` disables
    /// the two duplicate checks but not the correctness ones.
    pub fn check(&self, input: &InputRecord, params: Parameters) -> PipelineResult<Decision> {
        if params.rulechecked {
            return Ok(Decision::Proceed);
        }

        let skip = |reason: SkipReason| {
            info!(resource = %input.id, %reason, "skipping");
            Ok(Decision::Skip(reason))
        };

        if !input.is_latest() {
            return skip(SkipReason::Stale);
        }

        if input.raw_file().is_none() {
            return skip(SkipReason::MissingInput);
        }

        if !self.config.overwrite {
            let ts = input.timestamp()?;
            let png_path = self.paths.sensor_path(&ts, Some("png"));
            let tif_path = self.paths.sensor_path(&ts, None);
            if png_path.exists() && tif_path.exists() {
                return skip(SkipReason::OutputsPresent {
                    dir: self.paths.sensor_dir(&ts),
                });
            }
        }

        let records = self
            .catalog
            .download_metadata(&input.id)
            .map_err(|source| PipelineError::MetadataIo {
                resource: input.id.clone(),
                source,
            })?;
        if !self.config.overwrite
            && extractor_metadata(&records, &self.config.extractor.name).is_some()
        {
            return skip(SkipReason::AlreadyProcessed);
        }
        if CaptureMetadata::from_records(&records, &self.config.sensor.source_sensor).is_none() {
            return skip(SkipReason::NoCalibrationMetadata);
        }

        Ok(Decision::Proceed)
    }

    /// Processing phase. No metadata is written to the catalog
    /// unless both artifacts end up on disk.
    #[tracing::instrument(skip_all, fields(resource = %input.id))]
    pub fn process(&self, input: &InputRecord) -> PipelineResult<RunSummary> {
        info!("started processing");
        let (raw_path, metadata) = self.locate_inputs(input)?;

        let ts = input.timestamp()?;
        let png_path = self.paths.create_sensor_path(&ts, Some("png"))?;
        let tif_path = self.paths.create_sensor_path(&ts, None)?;

        let display_name = self.paths.display_name();
        let target = self
            .catalog
            .build_dataset_hierarchy(
                display_name,
                ts.year(),
                ts.month(),
                ts.day(),
                &format!("{display_name} - {ts}"),
            )
            .map_err(|source| PipelineError::MetadataIo {
                resource: display_name.to_owned(),
                source,
            })?;

        let staging = Staging::new(&self.config.staging_root(), &input.id)?;
        let mut frame = FrameCache::new(self.decoder.as_ref(), &raw_path);
        let mut summary = RunSummary {
            resource: input.id.clone(),
            target_dataset: target.clone(),
            preview: ArtifactStatus::Present,
            georaster: ArtifactStatus::Present,
            created: 0,
            bytes: 0,
            decodes: 0,
            files_created: vec![],
        };

        summary.preview = self.emit(
            ArtifactKind::Preview,
            &png_path,
            input,
            &staging,
            &mut summary,
            |staged| {
                let frame = frame.get()?;
                self.renderer
                    .render(frame, staged)
                    .map_err(|source| PipelineError::Artifact {
                        kind: ArtifactKind::Preview,
                        path: staged.to_owned(),
                        source,
                    })
            },
        )?;

        let attribution = Attribution {
            extractor: self.config.extractor.clone(),
            capture: Some(metadata.to_value()),
        };
        summary.georaster = self.emit(
            ArtifactKind::GeoRaster,
            &tif_path,
            input,
            &staging,
            &mut summary,
            |staged| {
                let bounds = metadata.bounding_box()?;
                let frame = frame.get()?;
                info!("generating temperature matrix");
                let artifact_err = |source| PipelineError::Artifact {
                    kind: ArtifactKind::GeoRaster,
                    path: staged.to_owned(),
                    source,
                };
                let temperatures = self
                    .converter
                    .to_temperature(frame, &metadata)
                    .map_err(artifact_err)?;
                self.writer
                    .write(&temperatures, &bounds, staged, &attribution)
                    .map_err(artifact_err)
            },
        )?;
        summary.decodes = frame.decodes;

        self.copy_upstream_metadata(input, &metadata, &target)?;

        // Recorded on the input itself, so that later changes to
        // it are recognised as already handled.
        info!("uploading extractor metadata");
        let completion = MetadataRecord::build(
            &self.config.host,
            &self.config.extractor,
            &target,
            completion_content(&summary.files_created),
        );
        self.upload_metadata(&input.id, &completion)?;

        info!(
            created = summary.created,
            bytes = summary.bytes,
            uploaded = summary.files_created.len(),
            "finished processing"
        );
        Ok(summary)
    }

    /// Raw dump and cleaned capture metadata among the input's
    /// downloaded files.
    fn locate_inputs(&self, input: &InputRecord) -> PipelineResult<(PathBuf, CaptureMetadata)> {
        let missing = |what| PipelineError::MissingInput {
            resource: input.id.clone(),
            missing: what,
        };

        let metadata_path = input.local_metadata().ok_or_else(|| missing("metadata"))?;
        let bytes = fs::read(metadata_path)?;
        let metadata =
            CaptureMetadata::from_dataset_json(&bytes, &self.config.sensor.source_sensor)?
                .ok_or_else(|| missing("metadata"))?;

        let raw_path = input.local_raw_frame().ok_or_else(|| missing("ir.bin"))?;
        if !raw_path.is_file() {
            return Err(missing("ir.bin"));
        }

        Ok((raw_path.to_owned(), metadata))
    }

    /// Produce one artifact unless it is already on disk.
    ///
    /// `build` writes into a staging path; the result is then
    /// moved into place, uploaded if the dataset does not
    /// already carry it, and counted.
    fn emit<F>(
        &self,
        kind: ArtifactKind,
        path: &Path,
        input: &InputRecord,
        staging: &Staging,
        summary: &mut RunSummary,
        build: F,
    ) -> PipelineResult<ArtifactStatus>
    where
        F: FnOnce(&Path) -> PipelineResult<()>,
    {
        if path.exists() && !self.config.overwrite {
            debug!(%kind, path = %path.display(), "already present");
            return Ok(ArtifactStatus::Present);
        }

        info!(%kind, path = %path.display(), "creating");
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| kind.to_string());
        let staged = staging.file(&name);
        build(&staged)?;
        relocate(&staged, path)?;

        if !input.has_local_path(path) {
            info!(%kind, dataset = %summary.target_dataset, "uploading");
            let file_id = self
                .catalog
                .upload_to_dataset(&summary.target_dataset, path)
                .map_err(|source| PipelineError::Upload {
                    path: path.to_owned(),
                    source,
                })?;
            summary
                .files_created
                .push(resource_url(&self.config.host, "files", &file_id));
        }

        summary.created += 1;
        summary.bytes += fs::metadata(path)?.len();
        Ok(ArtifactStatus::Produced)
    }

    /// Attach the capture metadata to the derived dataset, once
    /// per raw dataset.
    fn copy_upstream_metadata(
        &self,
        input: &InputRecord,
        metadata: &CaptureMetadata,
        target: &str,
    ) -> PipelineResult<()> {
        let content = metadata.to_upstream_content(&self.config.host, &input.id);
        let raw_source = resource_url(&self.config.host, "datasets", &input.id);
        let existing = self
            .catalog
            .download_metadata(target)
            .map_err(|source| PipelineError::MetadataIo {
                resource: target.to_owned(),
                source,
            })?;
        if has_upstream_copy(&existing, &self.config.extractor.name, &raw_source) {
            debug!(dataset = %target, "upstream metadata already copied");
            return Ok(());
        }

        info!(dataset = %target, "uploading upstream metadata");
        let upstream =
            MetadataRecord::build(&self.config.host, &self.config.extractor, target, content);
        self.upload_metadata(target, &upstream)
    }

    fn upload_metadata(&self, resource: &str, record: &MetadataRecord) -> PipelineResult<()> {
        self.catalog
            .upload_metadata(resource, record)
            .map_err(|source| PipelineError::MetadataIo {
                resource: resource.to_owned(),
                source,
            })
    }
}
