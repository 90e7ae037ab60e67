//! NYUDv2 edge-detection data pipeline.
//!
//! This crate provides utilities for:
//! - Fetching the labeled NYUDv2 archive
//! - Extracting thin boundary maps from instance label maps
//! - Materializing image/boundary PNG pairs with a completion manifest
//! - Indexed, augmented sample access
//! - Train/val/test splitting and Burn-compatible batching

pub mod archive;
pub mod aug;
pub mod batch;
pub mod edges;
pub mod fetch;
pub mod manifest;
pub mod materialize;
pub mod morphology;
pub mod splits;
pub mod store;
pub mod types;

pub use archive::{ImageStack, InstanceSlice, LabelData, LabelStack, RawArchive};
pub use aug::{DatasetConfig, TransformPipeline, TransformPipelineBuilder};
pub use batch::{collate, BatchIter, EdgeBatch};
pub use edges::{extract_boundary, find_outer_boundaries, BoundaryMap, LabelGrid};
pub use fetch::{ensure_local, FetchOutcome, NYUD_ARCHIVE_NAME, NYUD_ARCHIVE_URL};
pub use manifest::MaterializeManifest;
pub use materialize::{
    ensure_materialized, ensure_materialized_with, materialize, materialize_archive, prepare_nyud,
};
pub use splits::{split_sizes, LoaderConfig, SplitAssignment, SplitManager, SplitSizes};
pub use store::EdgeDataset;
pub use types::*;
