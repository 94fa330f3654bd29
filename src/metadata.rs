//! Catalog metadata records.
//!
//! Records follow the JSON-LD envelope used by the dataset
//! catalog: free-form `content`, the `agent` that produced it
//! and the resource it is `attachedTo`. Two kinds matter
//! here: the cleaned upstream capture metadata, and records
//! written by this extractor (the completion marker).

use serde_derive::*;
use serde_json::{json, Map, Value};

use crate::{error::PipelineError, geotiff::GeoBounds};

const CONTEXT_URL: &str = "https://clowder.ncsa.illinois.edu/contexts/metadata.jsonld";
const CLEANED_FLAG: &str = "terraref_cleaned_metadata";
const RAW_SOURCE_KEY: &str = "raw_data_source";

/// Identity of this extractor as recorded in metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExtractorInfo {
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
}

impl Default for ExtractorInfo {
    fn default() -> Self {
        ExtractorInfo {
            name: "terra.multispectral.flir2tif".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            author: String::new(),
            description: "FLIR raw frame to PNG preview and GeoTIFF temperature raster".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Agent {
    #[serde(rename = "@type", default)]
    pub ty: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttachedTo {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    #[serde(rename = "@context", default)]
    pub context: Vec<Value>,
    pub content: Value,
    pub agent: Agent,
    #[serde(
        rename = "attachedTo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub attached_to: Option<AttachedTo>,
}

impl MetadataRecord {
    /// Wrap `content` as produced by `extractor`, attached to
    /// dataset `target`.
    pub fn build(host: &str, extractor: &ExtractorInfo, target: &str, content: Value) -> Self {
        MetadataRecord {
            context: vec![
                Value::String(CONTEXT_URL.into()),
                json!({ "@vocab": format!("{}{}", host_root(host), "metadata/") }),
            ],
            content,
            agent: Agent {
                ty: "cat:extractor".into(),
                name: extractor.name.clone(),
                extractor_id: Some(resource_url(host, "api/extractors", &extractor.name)),
                version: Some(extractor.version.clone()),
            },
            attached_to: Some(AttachedTo {
                resource_type: "dataset".into(),
                id: target.into(),
            }),
        }
    }

    fn is_from_extractor(&self, name: &str) -> bool {
        self.agent.name == name
            || self
                .agent
                .extractor_id
                .as_deref()
                .and_then(|id| id.trim_end_matches('/').rsplit('/').next())
                .map_or(false, |last| last == name)
    }

    fn is_cleaned_capture(&self) -> bool {
        self.content
            .get(CLEANED_FLAG)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// `host` with exactly one trailing slash.
pub fn host_root(host: &str) -> String {
    if host.ends_with('/') {
        host.to_owned()
    } else {
        format!("{host}/")
    }
}

/// `<host>/<kind>/<id>`
pub fn resource_url(host: &str, kind: &str, id: &str) -> String {
    format!("{}{}/{}", host_root(host), kind, id)
}

/// Content previously written by extractor `name`, if any.
pub fn extractor_metadata<'a>(records: &'a [MetadataRecord], name: &str) -> Option<&'a Value> {
    records
        .iter()
        .find(|r| r.is_from_extractor(name))
        .map(|r| &r.content)
}

/// Whether extractor `name` already copied upstream metadata
/// from `raw_source` into the dataset owning `records`.
pub fn has_upstream_copy(records: &[MetadataRecord], name: &str, raw_source: &str) -> bool {
    records.iter().any(|r| {
        r.is_from_extractor(name)
            && r.content.get(RAW_SOURCE_KEY).and_then(Value::as_str) == Some(raw_source)
    })
}

/// The `files_created` list of a completion record.
pub fn completion_content(files_created: &[String]) -> Value {
    json!({ "files_created": files_created })
}

/// Cleaned upstream metadata of one capture.
///
/// Read-only: callers that need to forward it clone the
/// content via [`to_upstream_content`](Self::to_upstream_content).
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureMetadata {
    content: Map<String, Value>,
    sensor: String,
}

impl CaptureMetadata {
    /// Find the cleaned capture record among `records`.
    pub fn from_records(records: &[MetadataRecord], sensor: &str) -> Option<Self> {
        records
            .iter()
            .find(|r| r.is_cleaned_capture())
            .and_then(|r| Self::from_content(&r.content, sensor))
    }

    pub fn from_content(content: &Value, sensor: &str) -> Option<Self> {
        Some(CaptureMetadata {
            content: content.as_object()?.clone(),
            sensor: sensor.to_owned(),
        })
    }

    /// Parse the locally downloaded `*_dataset_metadata.json`,
    /// a JSON list of records.
    pub fn from_dataset_json(bytes: &[u8], sensor: &str) -> Result<Option<Self>, PipelineError> {
        let records: Vec<MetadataRecord> = serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::InvalidMetadata(format!("dataset metadata: {e}")))?;
        Ok(Self::from_records(&records, sensor))
    }

    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.content.get(key)
    }

    /// Calibration constants of the source sensor. Accepts
    /// both the flat layout and one keyed by sensor name.
    pub fn sensor_fixed_metadata(&self) -> Option<&Value> {
        let fixed = self.content.get("sensor_fixed_metadata")?;
        Some(fixed.get(&self.sensor).unwrap_or(fixed))
    }

    /// `spatial_metadata.<sensor>.bounding_box` as bounds.
    pub fn bounding_box(&self) -> Result<GeoBounds, PipelineError> {
        let bbox = self
            .content
            .get("spatial_metadata")
            .and_then(|s| s.get(&self.sensor))
            .and_then(|s| s.get("bounding_box"))
            .ok_or_else(|| {
                PipelineError::InvalidMetadata(format!(
                    "no spatial_metadata.{}.bounding_box",
                    self.sensor
                ))
            })?;
        GeoBounds::from_geojson(bbox).map_err(|e| PipelineError::InvalidMetadata(format!("{e:#}")))
    }

    /// Copy of the upstream content with a back-reference to
    /// the raw dataset it came from.
    pub fn to_upstream_content(&self, host: &str, raw_dataset_id: &str) -> Value {
        let mut content = self.content.clone();
        content.insert(
            RAW_SOURCE_KEY.into(),
            Value::String(resource_url(host, "datasets", raw_dataset_id)),
        );
        Value::Object(content)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.content.clone())
    }
}
