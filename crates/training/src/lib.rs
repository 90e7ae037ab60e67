#![recursion_limit = "256"]

pub mod config;
pub mod transfer;
pub mod util;

pub use config::{DataSection, DatasetKind, TrainConfig, TrainSection};
pub use models::{EdgeDetector, EdgeDetectorConfig, TransferGenerator, TransferGeneratorConfig};
pub use transfer::{DomainTransfer, GeneratorTransfer, IdentityTransfer};
pub use util::{run_prepare, run_train, PrepareArgs, TrainArgs};

/// Backend alias for training (CPU NdArray).
pub type TrainBackend = burn_ndarray::NdArray<f32>;
