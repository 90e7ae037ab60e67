//! Indexed store over a materialized root (`images/` + `edges/`).

use crate::aug::{normalize_edges, normalize_image, DatasetConfig, TransformPipeline};
use crate::types::{
    sample_file_name, DatasetResult, EdgeDatasetError, EdgeSample, SampleSource, EDGES_DIR,
    IMAGES_DIR,
};
use std::fs;
use std::path::{Path, PathBuf};

fn list_pngs(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| EdgeDatasetError::io(dir, e))? {
        let path = entry.map_err(|e| EdgeDatasetError::io(dir, e))?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("png") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// Image/boundary pairs addressed by index, decoded lazily on `get`.
#[derive(Debug, Clone)]
pub struct EdgeDataset {
    root: PathBuf,
    image_paths: Vec<PathBuf>,
    edge_paths: Vec<PathBuf>,
    border: u32,
    pipeline: TransformPipeline,
}

impl EdgeDataset {
    /// Index `root` and check that the i-th image and the i-th boundary map share
    /// the name `{i:05}.png`.
    pub fn open(root: &Path, cfg: DatasetConfig) -> DatasetResult<Self> {
        let image_paths = list_pngs(&root.join(IMAGES_DIR))?;
        let edge_paths = list_pngs(&root.join(EDGES_DIR))?;
        let mismatch = |msg: String| EdgeDatasetError::PairMismatch {
            root: root.to_path_buf(),
            msg,
        };

        if image_paths.len() != edge_paths.len() {
            return Err(mismatch(format!(
                "{} images but {} edge maps",
                image_paths.len(),
                edge_paths.len()
            )));
        }
        for (i, (img, edge)) in image_paths.iter().zip(&edge_paths).enumerate() {
            let expected = sample_file_name(i);
            if file_name(img) != expected || file_name(edge) != expected {
                return Err(mismatch(format!(
                    "position {i} holds {} / {}, expected {expected}",
                    file_name(img),
                    file_name(edge)
                )));
            }
        }

        let pipeline = cfg.pipeline();
        tracing::debug!(
            root = %root.display(),
            samples = image_paths.len(),
            border = cfg.border,
            transform = %pipeline.describe(),
            "opened edge dataset"
        );
        Ok(Self {
            root: root.to_path_buf(),
            image_paths,
            edge_paths,
            border: cfg.border,
            pipeline,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.image_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_paths.is_empty()
    }

    pub fn image_paths(&self) -> &[PathBuf] {
        &self.image_paths
    }

    pub fn edge_paths(&self) -> &[PathBuf] {
        &self.edge_paths
    }

    pub fn get(&self, index: usize) -> DatasetResult<EdgeSample> {
        if index >= self.len() {
            return Err(EdgeDatasetError::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        }
        let image = decode(&self.image_paths[index])?.to_rgb8();
        let edges = decode(&self.edge_paths[index])?.to_luma8();
        if image.dimensions() != edges.dimensions() {
            return Err(EdgeDatasetError::PairMismatch {
                root: self.root.clone(),
                msg: format!(
                    "sample {index}: image is {:?} but edge map is {:?}",
                    image.dimensions(),
                    edges.dimensions()
                ),
            });
        }

        let (w, h) = image.dimensions();
        let b = self.border;
        if w <= 2 * b || h <= 2 * b {
            return Err(EdgeDatasetError::InvalidConfig(format!(
                "border {b} leaves nothing of a {w}x{h} sample"
            )));
        }
        let (cw, ch) = (w - 2 * b, h - 2 * b);
        let image = image::imageops::crop_imm(&normalize_image(&image), b, b, cw, ch).to_image();
        let edges = image::imageops::crop_imm(&normalize_edges(&edges), b, b, cw, ch).to_image();
        self.pipeline.apply(index, image, edges)
    }
}

fn decode(path: &Path) -> DatasetResult<image::DynamicImage> {
    image::open(path).map_err(|source| EdgeDatasetError::Image {
        path: path.to_path_buf(),
        source,
    })
}

impl SampleSource for EdgeDataset {
    fn len(&self) -> usize {
        EdgeDataset::len(self)
    }

    fn load(&self, index: usize) -> DatasetResult<EdgeSample> {
        self.get(index)
    }
}
