//! Write georeferenced temperature rasters.
//!
//! The raster is a single band of 32-bit floats laid out
//! north-up in WGS84 (EPSG:4326). The corner pixel is tied to
//! `(lon_min, lat_max)` and the pixel scale spreads the grid
//! evenly over the bounding box.

use std::{
    fs::File,
    io::{BufWriter, Seek, Write},
    path::Path,
};

use anyhow::{anyhow, ensure, Context, Result};
use itertools::Itertools;
use ndarray::Array2;
use serde_json::Value;
use tiff::{
    encoder::{colortype, TiffEncoder},
    tags::Tag,
};

use crate::metadata::ExtractorInfo;

pub const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
pub const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
pub const GEO_KEY_DIRECTORY: Tag = Tag::GeoKeyDirectoryTag;
pub const GDAL_METADATA: Tag = Tag::Unknown(42112);
pub const GDAL_NODATA: Tag = Tag::GdalNodata;

/// Geographic extent of a capture, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl GeoBounds {
    /// Extent of a GeoJSON polygon (or a bare ring of
    /// `[lon, lat]` positions).
    pub fn from_geojson(value: &Value) -> Result<Self> {
        let coords = value.get("coordinates").unwrap_or(value);
        let mut points = vec![];
        collect_positions(coords, &mut points)?;
        ensure!(!points.is_empty(), "bounding box has no coordinates");

        let (lon_min, lon_max) = points
            .iter()
            .map(|p| p.0)
            .minmax()
            .into_option()
            .ok_or_else(|| anyhow!("bounding box has no coordinates"))?;
        let (lat_min, lat_max) = points
            .iter()
            .map(|p| p.1)
            .minmax()
            .into_option()
            .ok_or_else(|| anyhow!("bounding box has no coordinates"))?;

        Ok(GeoBounds {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        })
    }

    /// Degrees per pixel along (x, y) for a `rows x cols` grid.
    pub fn pixel_scale(&self, rows: usize, cols: usize) -> (f64, f64) {
        (
            (self.lon_max - self.lon_min) / cols as f64,
            (self.lat_max - self.lat_min) / rows as f64,
        )
    }
}

fn collect_positions(value: &Value, out: &mut Vec<(f64, f64)>) -> Result<()> {
    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("expected coordinate array, found {}", value))?;
    match items.as_slice() {
        [Value::Number(lon), Value::Number(lat), ..] => {
            let lon = lon.as_f64().ok_or_else(|| anyhow!("bad longitude {}", lon))?;
            let lat = lat.as_f64().ok_or_else(|| anyhow!("bad latitude {}", lat))?;
            out.push((lon, lat));
        }
        _ => {
            for item in items {
                collect_positions(item, out)?;
            }
        }
    }
    Ok(())
}

/// Provenance written into the raster's metadata.
#[derive(Debug, Clone)]
pub struct Attribution {
    pub extractor: ExtractorInfo,
    /// Capture metadata, stored verbatim as JSON.
    pub capture: Option<Value>,
}

impl Attribution {
    fn items(&self) -> Vec<(&'static str, String)> {
        let mut items = vec![
            ("extractor_name", self.extractor.name.clone()),
            ("extractor_version", self.extractor.version.clone()),
        ];
        if !self.extractor.author.is_empty() {
            items.push(("extractor_author", self.extractor.author.clone()));
        }
        if !self.extractor.description.is_empty() {
            items.push(("extractor_description", self.extractor.description.clone()));
        }
        if let Some(capture) = &self.capture {
            items.push(("capture_metadata", capture.to_string()));
        }
        items
    }

    /// GDAL's `<GDALMetadata>` XML block.
    pub fn gdal_metadata_xml(&self) -> String {
        let mut xml = String::from("<GDALMetadata>\n");
        for (name, value) in self.items() {
            xml.push_str(&format!(
                "  <Item name=\"{}\">{}</Item>\n",
                xml_escape(name),
                xml_escape(&value)
            ));
        }
        xml.push_str("</GDALMetadata>");
        xml
    }
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Writes a value grid as a georeferenced raster file.
pub trait GeoRasterWriter {
    fn write(
        &self,
        grid: &Array2<f64>,
        bounds: &GeoBounds,
        path: &Path,
        attribution: &Attribution,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffWriter {
    pub nodata: Option<f64>,
}

impl GeoTiffWriter {
    // GeoKeyDirectory: header, then (key, location, count, value).
    fn geo_keys() -> [u16; 20] {
        [
            1, 1, 0, 4, // version 1.1.0, four keys
            1024, 0, 1, 2, // GTModelType = Geographic
            1025, 0, 1, 1, // GTRasterType = PixelIsArea
            2048, 0, 1, 4326, // GeographicType = WGS84
            2054, 0, 1, 9102, // GeogAngularUnits = degree
        ]
    }
}

impl GeoTiffWriter {
    /// Encode `grid` into `out`, flushing buffered bytes before
    /// handing the writer back.
    pub fn encode<W: Write + Seek>(
        &self,
        grid: &Array2<f64>,
        bounds: &GeoBounds,
        attribution: &Attribution,
        out: W,
    ) -> Result<W> {
        let (rows, cols) = grid.dim();
        ensure!(rows > 0 && cols > 0, "cannot write an empty raster");

        let (scale_x, scale_y) = bounds.pixel_scale(rows, cols);
        let data: Vec<f32> = grid.iter().map(|&v| v as f32).collect();

        let mut out = BufWriter::new(out);
        {
            let mut encoder = TiffEncoder::new(&mut out)?;
            let mut image = encoder.new_image::<colortype::Gray32Float>(cols as u32, rows as u32)?;
            let dir = image.encoder();
            dir.write_tag(MODEL_PIXEL_SCALE, &[scale_x, scale_y, 0.0][..])?;
            dir.write_tag(
                MODEL_TIEPOINT,
                &[0.0, 0.0, 0.0, bounds.lon_min, bounds.lat_max, 0.0][..],
            )?;
            dir.write_tag(GEO_KEY_DIRECTORY, &Self::geo_keys()[..])?;
            dir.write_tag(GDAL_METADATA, attribution.gdal_metadata_xml().as_str())?;
            if let Some(nodata) = self.nodata {
                dir.write_tag(GDAL_NODATA, nodata.to_string().as_str())?;
            }
            image.write_data(&data)?;
        }

        // dropping a BufWriter discards the final write error
        out.flush().context("flushing raster")?;
        out.into_inner()
            .map_err(|e| e.into_error())
            .context("flushing raster")
    }
}

impl GeoRasterWriter for GeoTiffWriter {
    fn write(
        &self,
        grid: &Array2<f64>,
        bounds: &GeoBounds,
        path: &Path,
        attribution: &Attribution,
    ) -> Result<()> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let file = self.encode(grid, bounds, attribution, file)?;
        file.sync_all()
            .with_context(|| format!("syncing {}", path.display()))
    }
}
