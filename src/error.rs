//! Error types.
//!
//! Collaborators (catalog, renderers, converters) report
//! failures as [`anyhow::Error`]; the pipeline wraps them
//! into a [`PipelineError`] variant naming the failing step.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::pipeline::ArtifactKind;

/// Failure to turn a raw sensor dump into a frame.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("could not read raw frame {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: {len} bytes is not a whole number of 16-bit samples")]
    OddLength { path: PathBuf, len: usize },

    #[error("{path}: expected {expected} samples ({height}x{width}), found {found}")]
    ShapeMismatch {
        path: PathBuf,
        height: usize,
        width: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The check phase accepted the input, but the raw dump or
    /// its metadata is gone by the time processing starts.
    #[error("could not locate each of ir+metadata for {resource}: missing {missing}")]
    MissingInput {
        resource: String,
        missing: &'static str,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("uploading {path} failed: {source:#}")]
    Upload {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("metadata i/o on {resource} failed: {source:#}")]
    MetadataIo {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("creating {kind} at {path} failed: {source:#}")]
    Artifact {
        kind: ArtifactKind,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid capture metadata: {0}")]
    InvalidMetadata(String),

    #[error("invalid dataset name {0:?}: expected `<sensor> - <timestamp>`")]
    InvalidName(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
