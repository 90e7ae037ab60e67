//! Burn modules used by the edge training driver.
//!
//! - `EdgeDetector`: fully convolutional network emitting one boundary logit per pixel.
//! - `TransferGenerator`: image-to-image network mapping inputs toward another
//!   visual domain before detection.
//!
//! Both keep spatial size (`Same` padding) so outputs line up with the edge maps.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::{relu, tanh};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

fn conv3x3<B: Backend>(channels: [usize; 2], device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new(channels, [3, 3])
        .with_padding(PaddingConfig2d::Same)
        .init(device)
}

fn conv1x1<B: Backend>(channels: [usize; 2], device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new(channels, [1, 1])
        .with_padding(PaddingConfig2d::Valid)
        .init(device)
}

#[derive(Debug, Clone)]
pub struct EdgeDetectorConfig {
    pub hidden: usize,
    /// Extra 3x3 blocks after the stem.
    pub depth: usize,
}

impl Default for EdgeDetectorConfig {
    fn default() -> Self {
        Self {
            hidden: 16,
            depth: 2,
        }
    }
}

#[derive(Debug, Module)]
pub struct EdgeDetector<B: Backend> {
    stem: Conv2d<B>,
    blocks: Vec<Conv2d<B>>,
    head: Conv2d<B>,
}

impl<B: Backend> EdgeDetector<B> {
    pub fn new(cfg: EdgeDetectorConfig, device: &B::Device) -> Self {
        let hidden = cfg.hidden.max(1);
        let stem = conv3x3([3, hidden], device);
        let blocks = (0..cfg.depth)
            .map(|_| conv3x3([hidden, hidden], device))
            .collect();
        let head = conv1x1([hidden, 1], device);
        Self { stem, blocks, head }
    }

    /// `[B, 3, H, W]` images to `[B, 1, H, W]` boundary logits.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = relu(self.stem.forward(images));
        for block in &self.blocks {
            x = relu(block.forward(x));
        }
        self.head.forward(x)
    }
}

#[derive(Debug, Clone)]
pub struct TransferGeneratorConfig {
    pub hidden: usize,
}

impl Default for TransferGeneratorConfig {
    fn default() -> Self {
        Self { hidden: 16 }
    }
}

#[derive(Debug, Module)]
pub struct TransferGenerator<B: Backend> {
    encode: Conv2d<B>,
    mix: Conv2d<B>,
    decode: Conv2d<B>,
}

impl<B: Backend> TransferGenerator<B> {
    pub fn new(cfg: TransferGeneratorConfig, device: &B::Device) -> Self {
        let hidden = cfg.hidden.max(1);
        Self {
            encode: conv3x3([3, hidden], device),
            mix: conv3x3([hidden, hidden], device),
            decode: conv3x3([hidden, 3], device),
        }
    }

    /// Images in [-1, 1] to translated images in [-1, 1], same shape.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.encode.forward(images));
        let x = relu(self.mix.forward(x));
        tanh(self.decode.forward(x))
    }
}

pub mod prelude {
    pub use super::{EdgeDetector, EdgeDetectorConfig, TransferGenerator, TransferGeneratorConfig};
}
