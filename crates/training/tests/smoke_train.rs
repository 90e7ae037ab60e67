use std::sync::Arc;

use burn::module::AutodiffModule;
use edge_dataset::{DatasetResult, EdgeSample, LoaderConfig, SampleSource, SplitManager};
use training::util::{evaluate, load_detector_from_checkpoint, save_checkpoint, train_detector};
use training::{IdentityTransfer, TrainConfig};

/// 8x8 samples with a vertical boundary at column 3 and a matching intensity step.
struct StepEdges(usize);

impl SampleSource for StepEdges {
    fn len(&self) -> usize {
        self.0
    }

    fn load(&self, index: usize) -> DatasetResult<EdgeSample> {
        let (w, h) = (8usize, 8usize);
        let mut image_chw = vec![0.0; 3 * w * h];
        let mut edges_hw = vec![0.0; w * h];
        for y in 0..h {
            for x in 0..w {
                let v = if x < 4 { -0.8 } else { 0.8 };
                for c in 0..3 {
                    image_chw[c * w * h + y * w + x] = v;
                }
                if x == 3 {
                    edges_hw[y * w + x] = 1.0;
                }
            }
        }
        Ok(EdgeSample {
            index,
            image_chw,
            edges_hw,
            width: w as u32,
            height: h as u32,
        })
    }
}

#[test]
fn trains_evaluates_and_checkpoints() -> anyhow::Result<()> {
    let mut cfg = TrainConfig::default();
    cfg.train.epochs = 2;
    cfg.train.lr = 1e-2;

    let splits = SplitManager::new(
        Arc::new(StepEdges(10)),
        LoaderConfig {
            batch_size: 3,
            seed: Some(5),
            ..Default::default()
        },
    )?;
    let device = Default::default();
    let (model, report) = train_detector(&cfg, &splits, &IdentityTransfer, &device)?;
    assert_eq!(report.epochs.len(), 2);
    for stats in &report.epochs {
        assert!(stats.train_loss.is_finite());
        assert_eq!(stats.train_batches, 3);
        assert!(stats.val_loss.is_some());
    }

    // Evaluation runs on the inner backend, same as a detector restored from disk.
    let model = model.valid();
    let test_loss = evaluate(&model, splits.test_batches(), &IdentityTransfer, &device)?
        .expect("test split is not empty");
    assert!(test_loss.is_finite());

    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("ckpt/edge_detector.bin");
    save_checkpoint(&model, &path)?;
    let restored = load_detector_from_checkpoint(&path, &device)
        .map_err(|e| anyhow::anyhow!("reload failed: {e:?}"))?;
    let restored_loss = evaluate(&restored, splits.test_batches(), &IdentityTransfer, &device)?
        .expect("test split is not empty");
    assert!((restored_loss - test_loss).abs() < 1e-5);
    Ok(())
}

#[test]
fn empty_training_split_is_an_error() -> anyhow::Result<()> {
    let splits = SplitManager::new(Arc::new(StepEdges(0)), LoaderConfig::default())?;
    let device = Default::default();
    let result = train_detector(&TrainConfig::default(), &splits, &IdentityTransfer, &device);
    assert!(result.is_err());
    Ok(())
}
