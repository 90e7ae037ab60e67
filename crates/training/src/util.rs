use anyhow::Context;
use burn::backend::Autodiff;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use clap::Parser;
use edge_dataset::{prepare_nyud, BatchIter, EdgeDataset, SplitManager};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::{
    DomainTransfer, EdgeDetector, EdgeDetectorConfig, GeneratorTransfer, IdentityTransfer,
    TrainBackend, TrainConfig, TransferGeneratorConfig,
};

pub type ADBackend = Autodiff<TrainBackend>;

/// `RUST_LOG`-driven subscriber, `info` when unset.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[derive(Parser, Debug, Default)]
#[command(name = "train", about = "Train the edge detector on NYUDv2")]
pub struct TrainArgs {
    /// TOML config (defaults to ./edge-train.toml when present).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Override `train.epochs`.
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Override `data.batch_size`.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Override `data.root`.
    #[arg(long)]
    pub data_root: Option<PathBuf>,
    /// Override `train.checkpoint_out`.
    #[arg(long)]
    pub checkpoint_out: Option<PathBuf>,
}

impl TrainArgs {
    pub fn resolve(&self) -> anyhow::Result<TrainConfig> {
        let mut cfg = TrainConfig::load(self.config.as_deref())?;
        if let Some(epochs) = self.epochs {
            cfg.train.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            cfg.data.batch_size = batch_size;
        }
        if let Some(root) = &self.data_root {
            cfg.data.root = root.clone();
        }
        if let Some(out) = &self.checkpoint_out {
            cfg.train.checkpoint_out = out.clone();
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Parser, Debug, Default)]
#[command(name = "prepare", about = "Download and materialize the NYUDv2 edge dataset")]
pub struct PrepareArgs {
    /// TOML config (defaults to ./edge-train.toml when present).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Override `data.root`.
    #[arg(long)]
    pub data_root: Option<PathBuf>,
    /// Override `data.url`.
    #[arg(long)]
    pub url: Option<String>,
}

pub fn run_prepare(args: PrepareArgs) -> anyhow::Result<()> {
    let mut cfg = TrainConfig::load(args.config.as_deref())?;
    if let Some(root) = args.data_root {
        cfg.data.root = root;
    }
    if let Some(url) = args.url {
        cfg.data.url = url;
    }
    cfg.validate()?;
    let manifest = prepare_nyud(&cfg.data.root, &cfg.data.url)
        .with_context(|| format!("preparing {}", cfg.data.root.display()))?;
    tracing::info!(
        root = %cfg.data.root.display(),
        samples = manifest.sample_count,
        "dataset ready"
    );
    Ok(())
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let cfg = args.resolve()?;
    tracing::info!(run = %cfg.train.name, dataset = %cfg.data.dataset, "starting training");

    prepare_nyud(&cfg.data.root, &cfg.data.url)
        .with_context(|| format!("preparing {}", cfg.data.root.display()))?;
    let dataset = EdgeDataset::open(&cfg.data.root, cfg.dataset_config())?;
    let splits = SplitManager::new(Arc::new(dataset), cfg.loader_config())?;

    let device = <TrainBackend as Backend>::Device::default();
    let transfer: Box<dyn DomainTransfer<TrainBackend>> = match &cfg.data.checkpoint_path {
        Some(path) if cfg.data.domain_transfer => Box::new(GeneratorTransfer::load(
            path,
            TransferGeneratorConfig::default(),
            &device,
        )?),
        _ => Box::new(IdentityTransfer),
    };

    let (model, report) = train_detector(&cfg, &splits, transfer.as_ref(), &device)?;
    let model = model.valid();
    let test_loss = evaluate(&model, splits.test_batches(), transfer.as_ref(), &device)?;
    tracing::info!(
        test_loss = test_loss.unwrap_or(f32::NAN),
        epochs = report.epochs.len(),
        "training finished"
    );

    save_checkpoint(&model, &cfg.train.checkpoint_out)?;
    tracing::info!(path = %cfg.train.checkpoint_out.display(), "saved checkpoint");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_loss: f32,
    pub train_batches: usize,
    /// None when the validation split is empty.
    pub val_loss: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct TrainReport {
    pub epochs: Vec<EpochStats>,
}

/// Class-balanced binary cross-entropy on boundary logits.
///
/// Positive pixels are weighted by the negative fraction of the batch and negative
/// pixels by the positive fraction, so sparse boundaries are not drowned out.
pub fn balanced_bce<B: Backend>(logits: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
    let total = targets.dims().iter().product::<usize>() as f32;
    let positives: f32 = targets.clone().sum().into_scalar().elem();
    let (pos_w, neg_w) = if positives > 0.0 && positives < total {
        ((total - positives) / total, positives / total)
    } else {
        (1.0, 1.0)
    };
    let weights = targets.clone().mul_scalar(pos_w - neg_w).add_scalar(neg_w);
    // max(x, 0) - x * y + log(1 + exp(-|x|))
    let per_pixel = logits.clone().clamp_min(0.0) - logits.clone() * targets
        + logits.abs().neg().exp().add_scalar(1.0).log();
    (per_pixel * weights).mean()
}

fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or(0.0)
}

fn mean(values: &[f32]) -> Option<f32> {
    (!values.is_empty()).then(|| values.iter().sum::<f32>() / values.len() as f32)
}

/// Mean loss over every batch of `batches`; None when the split is empty.
///
/// Run it on an inference backend (`model.valid()` for a trained detector) so no
/// autodiff graph is recorded.
pub fn evaluate<B: Backend>(
    model: &EdgeDetector<B>,
    mut batches: BatchIter,
    transfer: &dyn DomainTransfer<B>,
    device: &B::Device,
) -> anyhow::Result<Option<f32>> {
    let mut losses = Vec::new();
    while let Some(batch) = batches.next_batch::<B>(device)? {
        let images = transfer.transfer(batch.images);
        let logits = model.forward(images);
        losses.push(scalar(balanced_bce(logits, batch.edges)));
    }
    Ok(mean(&losses))
}

pub fn train_detector(
    cfg: &TrainConfig,
    splits: &SplitManager,
    transfer: &dyn DomainTransfer<TrainBackend>,
    device: &<TrainBackend as Backend>::Device,
) -> anyhow::Result<(EdgeDetector<ADBackend>, TrainReport)> {
    if splits.train_len() == 0 {
        anyhow::bail!("training split is empty");
    }
    let mut model = EdgeDetector::<ADBackend>::new(EdgeDetectorConfig::default(), device);
    let mut optim = AdamConfig::new().init();
    let mut report = TrainReport::default();

    for epoch in 0..cfg.train.epochs {
        let mut losses = Vec::new();
        let mut batches = splits.train_batches();
        while let Some(batch) = batches.next_batch::<TrainBackend>(device)? {
            // Batches and the frozen transfer stay on the inner backend; only the
            // detector records gradients.
            let images = Tensor::<ADBackend, 4>::from_inner(transfer.transfer(batch.images));
            let edges = Tensor::<ADBackend, 4>::from_inner(batch.edges);
            let logits = model.forward(images);
            let loss = balanced_bce(logits, edges);
            let loss_detached = loss.clone().detach();
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(cfg.train.lr, model, grads);
            losses.push(scalar(loss_detached));
        }
        let val_loss = evaluate(&model.valid(), splits.val_batches(), transfer, device)?;
        let stats = EpochStats {
            epoch,
            train_loss: mean(&losses).unwrap_or(0.0),
            train_batches: losses.len(),
            val_loss,
        };
        tracing::info!(
            epoch,
            train_loss = stats.train_loss,
            val_loss = val_loss.unwrap_or(f32::NAN),
            batches = stats.train_batches,
            "epoch complete"
        );
        report.epochs.push(stats);
    }
    Ok((model, report))
}

pub fn save_checkpoint<B: Backend>(model: &EdgeDetector<B>, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating checkpoint dir {}", parent.display()))?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path, &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint: {e}"))
}

pub fn load_detector_from_checkpoint<P: AsRef<Path>>(
    path: P,
    device: &<TrainBackend as Backend>::Device,
) -> Result<EdgeDetector<TrainBackend>, RecorderError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    EdgeDetector::<TrainBackend>::new(EdgeDetectorConfig::default(), device).load_file(
        path.as_ref(),
        &recorder,
        device,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;

    type B = TrainBackend;

    fn tensor(values: Vec<f32>, device: &<B as Backend>::Device) -> Tensor<B, 4> {
        let n = values.len();
        Tensor::from_data(TensorData::new(values, [1, 1, 1, n]), device)
    }

    #[test]
    fn bce_matches_closed_form_when_unbalanced_weights_collapse() {
        let device = Default::default();
        // All-negative targets fall back to unit weights.
        let loss = scalar(balanced_bce(
            tensor(vec![0.0, 0.0], &device),
            tensor(vec![0.0, 0.0], &device),
        ));
        assert!((loss - std::f32::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn bce_weights_rare_positives_up() {
        let device = Default::default();
        // One positive among four: positives weigh 0.75, negatives 0.25.
        let targets = vec![1.0, 0.0, 0.0, 0.0];
        let logits = vec![0.0; 4];
        let loss = scalar(balanced_bce(tensor(logits, &device), tensor(targets, &device)));
        let expected = std::f32::consts::LN_2 * (0.75 + 3.0 * 0.25) / 4.0;
        assert!((loss - expected).abs() < 1e-5);
    }

    #[test]
    fn confident_correct_logits_have_low_loss() {
        let device = Default::default();
        let good = scalar(balanced_bce(
            tensor(vec![8.0, -8.0], &device),
            tensor(vec![1.0, 0.0], &device),
        ));
        let bad = scalar(balanced_bce(
            tensor(vec![-8.0, 8.0], &device),
            tensor(vec![1.0, 0.0], &device),
        ));
        assert!(good < 1e-3);
        assert!(bad > 1.0);
    }
}
