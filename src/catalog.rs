//! Access to the dataset catalog.
//!
//! The catalog stores metadata against datasets, hosts the
//! derived-dataset hierarchy and accepts uploaded files. The
//! pipeline only depends on the [`Catalog`] trait;
//! [`LocalCatalog`] implements it on a plain directory tree,
//! which is what the command-line tool uses.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::metadata::MetadataRecord;

pub trait Catalog {
    /// All metadata records attached to `resource_id`.
    fn download_metadata(&self, resource_id: &str) -> Result<Vec<MetadataRecord>>;

    /// Attach `record` to `resource_id`.
    fn upload_metadata(&self, resource_id: &str, record: &MetadataRecord) -> Result<()>;

    /// Find or create the `root / year / month / day / leaf`
    /// chain of datasets, returning the id of the leaf.
    fn build_dataset_hierarchy(
        &self,
        root: &str,
        year: &str,
        month: &str,
        day: &str,
        leaf: &str,
    ) -> Result<String>;

    /// Upload `path` into `dataset_id`, returning the file id.
    fn upload_to_dataset(&self, dataset_id: &str, path: &Path) -> Result<String>;
}

/// Catalog laid out on disk:
///
/// - `metadata/<resource>.json`: list of records
/// - `datasets/<dataset>/files/<name>`: uploaded files
#[derive(Debug, Clone)]
pub struct LocalCatalog {
    root: PathBuf,
}

impl LocalCatalog {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        LocalCatalog { root: root.into() }
    }

    fn metadata_path(&self, resource_id: &str) -> PathBuf {
        self.root
            .join("metadata")
            .join(format!("{}.json", slug(resource_id)))
    }

    fn dataset_dir(&self, dataset_id: &str) -> PathBuf {
        self.root.join("datasets").join(slug(dataset_id))
    }
}

/// Identifier safe to use as a single path component.
fn slug(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

impl Catalog for LocalCatalog {
    fn download_metadata(&self, resource_id: &str) -> Result<Vec<MetadataRecord>> {
        let path = self.metadata_path(resource_id);
        if !path.exists() {
            return Ok(vec![]);
        }
        let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
    }

    fn upload_metadata(&self, resource_id: &str, record: &MetadataRecord) -> Result<()> {
        let mut records = self.download_metadata(resource_id)?;
        records.push(record.clone());

        let path = self.metadata_path(resource_id);
        let dir = path
            .parent()
            .ok_or_else(|| anyhow!("bad metadata path {}", path.display()))?;
        fs::create_dir_all(dir)?;

        // replace, never truncate in place
        let tmp = path.with_extension("json.partial");
        fs::write(&tmp, serde_json::to_vec_pretty(&records)?)?;
        fs::rename(&tmp, &path)?;
        debug!(resource = resource_id, records = records.len(), "stored metadata");
        Ok(())
    }

    fn build_dataset_hierarchy(
        &self,
        root: &str,
        year: &str,
        month: &str,
        day: &str,
        leaf: &str,
    ) -> Result<String> {
        let id = [root, year, month, day, leaf]
            .iter()
            .map(|part| slug(part))
            .collect::<Vec<_>>()
            .join("--");
        let files = self.dataset_dir(&id).join("files");
        fs::create_dir_all(&files).with_context(|| format!("creating {}", files.display()))?;
        Ok(id)
    }

    fn upload_to_dataset(&self, dataset_id: &str, path: &Path) -> Result<String> {
        let name = path
            .file_name()
            .ok_or_else(|| anyhow!("cannot upload {}: no file name", path.display()))?
            .to_string_lossy()
            .into_owned();
        let files = self.dataset_dir(dataset_id).join("files");
        fs::create_dir_all(&files)?;
        fs::copy(path, files.join(&name))
            .with_context(|| format!("copying {} into {}", path.display(), dataset_id))?;
        Ok(format!("{}--{}", slug(dataset_id), slug(&name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{completion_content, ExtractorInfo};
    use tempfile::TempDir;

    #[test]
    fn metadata_accumulates() -> Result<()> {
        let dir = TempDir::new()?;
        let catalog = LocalCatalog::new(dir.path());
        assert!(catalog.download_metadata("raw/1")?.is_empty());

        let record = MetadataRecord::build("h", &ExtractorInfo::default(), "d", completion_content(&[]));
        catalog.upload_metadata("raw/1", &record)?;
        catalog.upload_metadata("raw/1", &record)?;

        let stored = catalog.download_metadata("raw/1")?;
        assert_eq!(stored, vec![record.clone(), record]);
        assert!(catalog.download_metadata("raw/2")?.is_empty());
        Ok(())
    }

    #[test]
    fn hierarchy_is_stable() -> Result<()> {
        let dir = TempDir::new()?;
        let catalog = LocalCatalog::new(dir.path());
        let leaf = "Thermal IR GeoTIFFs - 2018-07-01__12-30-00";
        let a = catalog.build_dataset_hierarchy("Thermal IR GeoTIFFs", "2018", "07", "01", leaf)?;
        let b = catalog.build_dataset_hierarchy("Thermal IR GeoTIFFs", "2018", "07", "01", leaf)?;
        assert_eq!(a, b);
        assert!(!a.contains('/') && !a.contains(' '));
        Ok(())
    }

    #[test]
    fn uploads_copy_files() -> Result<()> {
        let dir = TempDir::new()?;
        let catalog = LocalCatalog::new(dir.path().join("catalog"));
        let src = dir.path().join("x.png");
        fs::write(&src, b"png")?;

        let ds = catalog.build_dataset_hierarchy("r", "2018", "07", "01", "leaf")?;
        let id = catalog.upload_to_dataset(&ds, &src)?;
        assert!(id.ends_with("x.png"));
        assert!(src.exists());
        assert_eq!(
            fs::read(catalog.dataset_dir(&ds).join("files").join("x.png"))?,
            b"png"
        );
        Ok(())
    }
}
