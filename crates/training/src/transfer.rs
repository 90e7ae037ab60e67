//! Optional image-domain transfer applied to each batch before the detector.

use anyhow::Context;
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use models::{TransferGenerator, TransferGeneratorConfig};
use std::path::Path;

pub trait DomainTransfer<B: Backend> {
    /// `[B, 3, H, W]` images in [-1, 1] to images of the same shape.
    fn transfer(&self, images: Tensor<B, 4>) -> Tensor<B, 4>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransfer;

impl<B: Backend> DomainTransfer<B> for IdentityTransfer {
    fn transfer(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        images
    }
}

/// Frozen generator restored from a checkpoint; its output carries no gradient.
#[derive(Debug)]
pub struct GeneratorTransfer<B: Backend> {
    generator: TransferGenerator<B>,
}

impl<B: Backend> GeneratorTransfer<B> {
    pub fn new(generator: TransferGenerator<B>) -> Self {
        Self { generator }
    }

    pub fn load(path: &Path, cfg: TransferGeneratorConfig, device: &B::Device) -> anyhow::Result<Self> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let generator = TransferGenerator::<B>::new(cfg, device)
            .load_file(path, &recorder, device)
            .with_context(|| format!("loading transfer generator from {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded domain-transfer generator");
        Ok(Self::new(generator))
    }
}

impl<B: Backend> DomainTransfer<B> for GeneratorTransfer<B> {
    fn transfer(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        self.generator.forward(images).detach()
    }
}
