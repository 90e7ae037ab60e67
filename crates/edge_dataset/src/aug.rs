//! Paired image/boundary-map transform pipeline.
//!
//! Geometric steps (resize, crop, flip) are applied identically to the image and
//! its boundary map so spatial correspondence is preserved; intensity steps only
//! touch the image.
//!
//! Planes are carried in [0, 1] while transforming (the float resampler clamps to
//! that range) and the image is mapped to [-1, 1] when the sample is built.

use crate::types::{DatasetResult, EdgeDatasetError, EdgeSample};
use image::imageops::FilterType;
use image::{ImageBuffer, Luma, Rgb};
use rand::{Rng, SeedableRng};

pub type ImagePlane = ImageBuffer<Rgb<f32>, Vec<f32>>;
pub type EdgePlane = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Pixels dropped from every side of both rasters before any transform.
pub const DEFAULT_BORDER: u32 = 8;

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Pixels cropped from every spatial edge right after decoding.
    pub border: u32,
    /// Resize both rasters to this (width, height) before cropping.
    pub target_size: Option<(u32, u32)>,
    /// Crop both rasters to this (width, height).
    pub crop_size: Option<(u32, u32)>,
    /// Pick a random crop offset instead of the centre.
    pub random_crop: bool,
    /// Probability of a horizontal flip of the pair.
    pub flip_horizontal_prob: f32,
    /// Probability of a brightness/contrast jitter on the image.
    pub color_jitter_prob: f32,
    /// Max jitter scale for brightness/contrast.
    pub color_jitter_strength: f32,
    /// Seed for per-sample deterministic augmentation.
    pub seed: Option<u64>,
    /// Optional transform pipeline override; if None, built from other fields.
    pub transform: Option<TransformPipeline>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            border: DEFAULT_BORDER,
            target_size: None,
            crop_size: None,
            random_crop: false,
            flip_horizontal_prob: 0.0,
            color_jitter_prob: 0.0,
            color_jitter_strength: 0.1,
            seed: None,
            transform: None,
        }
    }
}

impl DatasetConfig {
    pub fn pipeline(&self) -> TransformPipeline {
        self.transform
            .clone()
            .unwrap_or_else(|| TransformPipeline::from_config(self))
    }
}

#[derive(Debug, Clone)]
pub struct TransformPipeline {
    pub target_size: Option<(u32, u32)>,
    pub crop_size: Option<(u32, u32)>,
    pub random_crop: bool,
    pub flip_horizontal_prob: f32,
    pub color_jitter_prob: f32,
    pub color_jitter_strength: f32,
    pub seed: Option<u64>,
}

impl TransformPipeline {
    pub fn from_config(cfg: &DatasetConfig) -> Self {
        Self {
            target_size: cfg.target_size,
            crop_size: cfg.crop_size,
            random_crop: cfg.random_crop,
            flip_horizontal_prob: cfg.flip_horizontal_prob,
            color_jitter_prob: cfg.color_jitter_prob,
            color_jitter_strength: cfg.color_jitter_strength,
            seed: cfg.seed,
        }
    }

    pub fn describe(&self) -> String {
        let size = |s: Option<(u32, u32)>| {
            s.map(|(w, h)| format!("{w}x{h}"))
                .unwrap_or_else(|| "none".to_string())
        };
        format!(
            "resize={} crop={} random_crop={} flip_p={:.2} color_jitter_p={:.2} strength={:.2} seed={}",
            size(self.target_size),
            size(self.crop_size),
            self.random_crop,
            self.flip_horizontal_prob,
            self.color_jitter_prob,
            self.color_jitter_strength,
            self.seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }

    pub(crate) fn apply(
        &self,
        index: usize,
        mut image: ImagePlane,
        mut edges: EdgePlane,
    ) -> DatasetResult<EdgeSample> {
        // Seeded per sample when a seed is set, else thread-local.
        let mut rng_local;
        let mut seeded_rng;
        let rng: &mut dyn rand::RngCore = if let Some(seed) = self.seed {
            seeded_rng = rand::rngs::StdRng::seed_from_u64(seed ^ index as u64);
            &mut seeded_rng
        } else {
            rng_local = rand::rng();
            &mut rng_local
        };

        if let Some((w, h)) = self.target_size {
            if (w, h) != image.dimensions() {
                image = image::imageops::resize(&image, w, h, FilterType::Triangle);
                edges = image::imageops::resize(&edges, w, h, FilterType::Nearest);
            }
        }
        if let Some((cw, ch)) = self.crop_size {
            let (w, h) = image.dimensions();
            if cw > w || ch > h {
                return Err(EdgeDatasetError::InvalidConfig(format!(
                    "crop {cw}x{ch} larger than sample {w}x{h}"
                )));
            }
            let (x0, y0) = if self.random_crop {
                (rng.random_range(0..=w - cw), rng.random_range(0..=h - ch))
            } else {
                ((w - cw) / 2, (h - ch) / 2)
            };
            image = image::imageops::crop_imm(&image, x0, y0, cw, ch).to_image();
            edges = image::imageops::crop_imm(&edges, x0, y0, cw, ch).to_image();
        }
        maybe_hflip(&mut image, &mut edges, self.flip_horizontal_prob, rng);
        maybe_jitter(
            &mut image,
            self.color_jitter_prob,
            self.color_jitter_strength,
            rng,
        );
        Ok(build_sample(index, &image, &edges))
    }
}

#[derive(Debug, Clone)]
pub struct TransformPipelineBuilder {
    inner: TransformPipeline,
}

impl Default for TransformPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformPipelineBuilder {
    pub fn new() -> Self {
        Self {
            inner: TransformPipeline::from_config(&DatasetConfig::default()),
        }
    }
    pub fn target_size(mut self, size: Option<(u32, u32)>) -> Self {
        self.inner.target_size = size;
        self
    }
    pub fn crop_size(mut self, size: Option<(u32, u32)>, random: bool) -> Self {
        self.inner.crop_size = size;
        self.inner.random_crop = random;
        self
    }
    pub fn flip_horizontal_prob(mut self, p: f32) -> Self {
        self.inner.flip_horizontal_prob = p;
        self
    }
    pub fn color_jitter(mut self, prob: f32, strength: f32) -> Self {
        self.inner.color_jitter_prob = prob;
        self.inner.color_jitter_strength = strength;
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.inner.seed = seed;
        self
    }
    pub fn build(self) -> TransformPipeline {
        self.inner
    }
}

/// Image bytes to [0, 1]; shifted to [-1, 1] in `build_sample`.
pub(crate) fn normalize_image(img: &image::RgbImage) -> ImagePlane {
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y);
        Rgb([0, 1, 2].map(|c| p[c] as f32 / 255.0))
    })
}

/// Boundary-map bytes to [0, 1].
pub(crate) fn normalize_edges(img: &image::GrayImage) -> EdgePlane {
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        Luma([img.get_pixel(x, y)[0] as f32 / 255.0])
    })
}

fn build_sample(index: usize, image: &ImagePlane, edges: &EdgePlane) -> EdgeSample {
    let (width, height) = image.dimensions();
    let plane = (width * height) as usize;
    let mut image_chw = vec![0.0f32; plane * 3];
    for (x, y, pixel) in image.enumerate_pixels() {
        let base = (y * width + x) as usize;
        image_chw[base] = pixel[0] * 2.0 - 1.0;
        image_chw[plane + base] = pixel[1] * 2.0 - 1.0;
        image_chw[2 * plane + base] = pixel[2] * 2.0 - 1.0;
    }
    let edges_hw = edges.pixels().map(|p| p[0]).collect();
    EdgeSample {
        index,
        image_chw,
        edges_hw,
        width,
        height,
    }
}

pub(crate) fn maybe_hflip(
    image: &mut ImagePlane,
    edges: &mut EdgePlane,
    prob: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) < prob {
        image::imageops::flip_horizontal_in_place(image);
        image::imageops::flip_horizontal_in_place(edges);
    }
}

pub(crate) fn maybe_jitter(
    image: &mut ImagePlane,
    prob: f32,
    strength: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 || strength <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    let bright = 1.0 + rng.random_range(-strength..strength);
    let contrast = 1.0 + rng.random_range(-strength..strength);
    for pixel in image.pixels_mut() {
        for c in 0..3 {
            let v = ((pixel[c] - 0.5) * contrast + 0.5) * bright;
            pixel[c] = v.clamp(0.0, 1.0);
        }
    }
}
