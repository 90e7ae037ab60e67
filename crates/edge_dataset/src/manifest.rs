//! Completion marker for a materialized dataset root.
//!
//! `manifest.json` is written only after every image/edge pair is on disk, so a
//! root without it (or whose files disagree with it) is incomplete.

use crate::types::{
    sample_file_name, DatasetResult, EdgeDatasetError, EDGES_DIR, IMAGES_DIR, MANIFEST_FILE,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializeManifest {
    pub sample_count: usize,
    pub width: u32,
    pub height: u32,
    /// Structuring-element radius used by the edge extractor.
    pub disk_radius: u32,
    /// Source archive file name.
    pub archive: String,
    pub created_at_ms: u64,
    pub code_version: String,
}

impl MaterializeManifest {
    pub fn new(sample_count: usize, width: u32, height: u32, disk_radius: u32, archive: String) -> Self {
        let created_at_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            sample_count,
            width,
            height,
            disk_radius,
            archive,
            created_at_ms,
            code_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn path_in(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILE)
    }

    pub fn save(&self, root: &Path) -> DatasetResult<()> {
        let path = Self::path_in(root);
        let data =
            serde_json::to_vec_pretty(self).map_err(|e| EdgeDatasetError::Other(e.to_string()))?;
        fs::write(&path, data).map_err(|e| EdgeDatasetError::io(&path, e))
    }

    pub fn load(root: &Path) -> DatasetResult<Self> {
        let path = Self::path_in(root);
        let raw = fs::read(&path).map_err(|e| EdgeDatasetError::io(&path, e))?;
        serde_json::from_slice(&raw).map_err(|e| EdgeDatasetError::Json { path, source: e })
    }

    /// Load the manifest and check that every pair it promises exists.
    pub fn verify(root: &Path) -> DatasetResult<Self> {
        if !Self::path_in(root).exists() {
            return Err(EdgeDatasetError::Incomplete {
                root: root.to_path_buf(),
                msg: format!("{MANIFEST_FILE} missing"),
            });
        }
        let manifest = Self::load(root)?;
        for dir in [IMAGES_DIR, EDGES_DIR] {
            for i in 0..manifest.sample_count {
                let path = root.join(dir).join(sample_file_name(i));
                if !path.is_file() {
                    return Err(EdgeDatasetError::Incomplete {
                        root: root.to_path_buf(),
                        msg: format!("{} missing", path.display()),
                    });
                }
            }
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_without_manifest_is_incomplete() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            MaterializeManifest::verify(tmp.path()),
            Err(EdgeDatasetError::Incomplete { .. })
        ));
    }

    #[test]
    fn verify_detects_missing_pair() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join(IMAGES_DIR)).unwrap();
        fs::create_dir_all(root.join(EDGES_DIR)).unwrap();
        fs::write(root.join(IMAGES_DIR).join("00000.png"), b"x").unwrap();
        fs::write(root.join(EDGES_DIR).join("00000.png"), b"x").unwrap();
        fs::write(root.join(IMAGES_DIR).join("00001.png"), b"x").unwrap();

        let manifest = MaterializeManifest::new(2, 4, 4, 3, "a.mat".into());
        manifest.save(root).unwrap();
        let err = MaterializeManifest::verify(root).unwrap_err();
        assert!(err.to_string().contains("00001.png"));

        fs::write(root.join(EDGES_DIR).join("00001.png"), b"x").unwrap();
        assert_eq!(MaterializeManifest::verify(root).unwrap(), manifest);
    }
}
