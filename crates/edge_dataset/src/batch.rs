//! Batch iteration over one split, plus Burn tensor assembly.

use crate::types::{DatasetResult, EdgeDatasetError, EdgeSample, SampleSource};
use burn::tensor::{backend::Backend, Tensor};
use rayon::prelude::*;
use std::sync::Arc;

pub struct EdgeBatch<B: Backend> {
    /// `[batch, 3, height, width]`, values in [-1, 1].
    pub images: Tensor<B, 4>,
    /// `[batch, 1, height, width]`, values in [0, 1].
    pub edges: Tensor<B, 4>,
    pub indices: Vec<usize>,
}

/// Walks a fixed index order in chunks of `batch_size`; the last chunk may be short.
pub struct BatchIter {
    source: Arc<dyn SampleSource>,
    order: Vec<usize>,
    cursor: usize,
    batch_size: usize,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl BatchIter {
    pub fn new(
        source: Arc<dyn SampleSource>,
        order: Vec<usize>,
        batch_size: usize,
        pool: Option<Arc<rayon::ThreadPool>>,
    ) -> Self {
        Self {
            source,
            order,
            cursor: 0,
            batch_size: batch_size.max(1),
            pool,
        }
    }

    /// Sample indices in iteration order.
    pub fn indices(&self) -> &[usize] {
        &self.order
    }

    pub fn sample_count(&self) -> usize {
        self.order.len()
    }

    pub fn batch_count(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    fn load_chunk(&self, chunk: &[usize]) -> DatasetResult<Vec<EdgeSample>> {
        let source = &self.source;
        match &self.pool {
            Some(pool) => pool.install(|| chunk.par_iter().map(|&i| source.load(i)).collect()),
            None => chunk.iter().map(|&i| source.load(i)).collect(),
        }
    }

    pub fn next_batch<B: Backend>(
        &mut self,
        device: &B::Device,
    ) -> DatasetResult<Option<EdgeBatch<B>>> {
        let Some(samples) = self.next().transpose()? else {
            return Ok(None);
        };
        collate(&samples, device).map(Some)
    }
}

impl Iterator for BatchIter {
    type Item = DatasetResult<Vec<EdgeSample>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let chunk = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        Some(self.load_chunk(&chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.order.len() - self.cursor).div_ceil(self.batch_size);
        (left, Some(left))
    }
}

/// Stack samples of one size into image and edge tensors.
pub fn collate<B: Backend>(samples: &[EdgeSample], device: &B::Device) -> DatasetResult<EdgeBatch<B>> {
    let Some(first) = samples.first() else {
        return Err(EdgeDatasetError::Other("cannot collate an empty batch".to_string()));
    };
    let (width, height) = (first.width, first.height);
    let mut images_buf = Vec::with_capacity(samples.len() * 3 * first.pixel_count());
    let mut edges_buf = Vec::with_capacity(samples.len() * first.pixel_count());
    for sample in samples {
        if (sample.width, sample.height) != (width, height) {
            return Err(EdgeDatasetError::Other(
                "batch contains varying image sizes; set a target_size or crop_size to force consistency"
                    .to_string(),
            ));
        }
        images_buf.extend_from_slice(&sample.image_chw);
        edges_buf.extend_from_slice(&sample.edges_hw);
    }
    let (b, h, w) = (samples.len(), height as usize, width as usize);
    let images = Tensor::<B, 1>::from_floats(images_buf.as_slice(), device).reshape([b, 3, h, w]);
    let edges = Tensor::<B, 1>::from_floats(edges_buf.as_slice(), device).reshape([b, 1, h, w]);
    Ok(EdgeBatch {
        images,
        edges,
        indices: samples.iter().map(|s| s.index).collect(),
    })
}
