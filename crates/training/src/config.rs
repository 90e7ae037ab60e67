//! TOML configuration for the training driver.
//!
//! ```toml
//! [data]
//! dataset = "nyudv2"
//! root = "data/nyudv2"
//! crop_size = [320, 320]
//! batch_size = 4
//!
//! [train]
//! name = "bdcn-nyud"
//! epochs = 10
//! ```

use anyhow::{bail, Context};
use edge_dataset::{split_sizes, DatasetConfig, LoaderConfig, NYUD_ARCHIVE_URL};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_NAME: &str = "edge-train.toml";

/// Dataset selector. Only NYUDv2 has a pipeline in this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Nyudv2,
    Bsds500,
    Unity,
}

impl FromStr for DatasetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nyudv2" => Ok(DatasetKind::Nyudv2),
            "bsds500" | "bdsd500" => Ok(DatasetKind::Bsds500),
            "unity" => Ok(DatasetKind::Unity),
            other => bail!("invalid dataset `{other}`"),
        }
    }
}

impl DatasetKind {
    pub fn is_supported(self) -> bool {
        matches!(self, DatasetKind::Nyudv2)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataSection {
    pub dataset: String,
    pub root: PathBuf,
    pub url: String,
    /// `[width, height]` resize applied before cropping.
    pub resize: Option<[u32; 2]>,
    /// `[width, height]`.
    pub crop_size: Option<[u32; 2]>,
    pub random_crop: bool,
    pub flip_horizontal_prob: f32,
    pub border: u32,
    pub batch_size: usize,
    pub num_workers: usize,
    pub shuffle: bool,
    /// Train/val/test proportions.
    pub split: [f64; 3],
    pub seed: Option<u64>,
    pub domain_transfer: bool,
    /// Generator weights used when `domain_transfer` is on.
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            dataset: "nyudv2".to_string(),
            root: PathBuf::from("data/nyudv2"),
            url: NYUD_ARCHIVE_URL.to_string(),
            resize: None,
            crop_size: Some([320, 320]),
            random_crop: false,
            flip_horizontal_prob: 0.0,
            border: edge_dataset::aug::DEFAULT_BORDER,
            batch_size: 4,
            num_workers: 0,
            shuffle: true,
            split: [0.7, 0.15, 0.15],
            seed: Some(42),
            domain_transfer: false,
            checkpoint_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainSection {
    pub name: String,
    pub epochs: usize,
    pub lr: f64,
    pub checkpoint_out: PathBuf,
}

impl Default for TrainSection {
    fn default() -> Self {
        Self {
            name: "edge-detector".to_string(),
            epochs: 10,
            lr: 1e-4,
            checkpoint_out: PathBuf::from("checkpoints/edge_detector.bin"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    pub data: DataSection,
    pub train: TrainSection,
}

impl TrainConfig {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("parsing training config")
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// Explicit path, else `edge-train.toml` in the working directory if present,
    /// else defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None if Path::new(DEFAULT_CONFIG_NAME).exists() => {
                Self::from_path(Path::new(DEFAULT_CONFIG_NAME))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn dataset_kind(&self) -> anyhow::Result<DatasetKind> {
        self.data.dataset.parse()
    }

    /// Fail before any data work on settings that cannot produce a run.
    pub fn validate(&self) -> anyhow::Result<()> {
        let kind = self.dataset_kind()?;
        if !kind.is_supported() {
            bail!("dataset `{}` is not supported; use `nyudv2`", self.data.dataset);
        }
        let [p_train, p_val, p_test] = self.data.split;
        split_sizes(0, (p_train, p_val, p_test)).context("data.split")?;
        if self.data.batch_size == 0 {
            bail!("data.batch_size must be at least 1");
        }
        if let (Some([rw, rh]), Some([cw, ch])) = (self.data.resize, self.data.crop_size) {
            if cw > rw || ch > rh {
                bail!("data.crop_size {cw}x{ch} exceeds data.resize {rw}x{rh}");
            }
        }
        if !(0.0..=1.0).contains(&self.data.flip_horizontal_prob) {
            bail!("data.flip_horizontal_prob must lie in [0, 1]");
        }
        if self.data.domain_transfer && self.data.checkpoint_path.is_none() {
            bail!("data.domain_transfer requires data.checkpoint_path");
        }
        if self.train.epochs == 0 {
            bail!("train.epochs must be at least 1");
        }
        if !(self.train.lr.is_finite() && self.train.lr > 0.0) {
            bail!("train.lr must be positive");
        }
        Ok(())
    }

    pub fn dataset_config(&self) -> DatasetConfig {
        DatasetConfig {
            border: self.data.border,
            target_size: self.data.resize.map(|[w, h]| (w, h)),
            crop_size: self.data.crop_size.map(|[w, h]| (w, h)),
            random_crop: self.data.random_crop,
            flip_horizontal_prob: self.data.flip_horizontal_prob,
            seed: self.data.seed,
            ..Default::default()
        }
    }

    pub fn loader_config(&self) -> LoaderConfig {
        let [p_train, p_val, p_test] = self.data.split;
        LoaderConfig {
            batch_size: self.data.batch_size,
            num_workers: self.data.num_workers,
            shuffle: self.data.shuffle,
            split: (p_train, p_val, p_test),
            seed: self.data.seed,
        }
    }
}
