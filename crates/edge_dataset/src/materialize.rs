//! Turns a raw archive into a directory of paired PNGs.
//!
//! Layout under the output root:
//! - `images/{i:05}.png`: RGB image i
//! - `edges/{i:05}.png`: boundary map i, 0 or 255
//! - `manifest.json`: written last, marks the root complete

use crate::archive::{InstanceSlice, RawArchive};
use crate::edges::{extract_boundary, DEFAULT_DISK_RADIUS};
use crate::fetch::{ensure_local, NYUD_ARCHIVE_NAME};
use crate::manifest::MaterializeManifest;
use crate::types::{sample_file_name, DatasetResult, EdgeDatasetError, EDGES_DIR, IMAGES_DIR};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;

const LOG_EVERY: usize = 100;

fn png_err(path: &Path) -> impl FnOnce(image::ImageError) -> EdgeDatasetError + '_ {
    move |source| EdgeDatasetError::Image {
        path: path.to_path_buf(),
        source,
    }
}

fn sample_progress(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message("materializing");
    pb
}

/// Write every image and its boundary map, then the manifest.
pub fn materialize(
    archive: &RawArchive,
    output_root: &Path,
    archive_name: &str,
    disk_radius: u32,
) -> DatasetResult<MaterializeManifest> {
    let images_dir = output_root.join(IMAGES_DIR);
    let edges_dir = output_root.join(EDGES_DIR);
    for dir in [&images_dir, &edges_dir] {
        fs::create_dir_all(dir).map_err(|e| EdgeDatasetError::io(dir, e))?;
    }

    let count = archive.sample_count();
    let (width, height) = archive.dimensions();
    tracing::info!(
        samples = count,
        width,
        height,
        root = %output_root.display(),
        "materializing dataset"
    );
    let pb = sample_progress(count);
    for i in 0..count {
        let name = sample_file_name(i);
        let image_path = images_dir.join(&name);
        archive
            .image_slice(i)?
            .save(&image_path)
            .map_err(png_err(&image_path))?;

        let boundary = match archive.instance_slice(i)? {
            InstanceSlice::U8(grid) => extract_boundary(&grid, disk_radius),
            InstanceSlice::U16(grid) => extract_boundary(&grid, disk_radius),
        };
        let edge_path = edges_dir.join(&name);
        boundary
            .to_gray_image()
            .save(&edge_path)
            .map_err(png_err(&edge_path))?;

        pb.inc(1);
        if (i + 1) % LOG_EVERY == 0 {
            tracing::info!(done = i + 1, total = count, "materialized samples");
        }
    }
    pb.finish_and_clear();

    let manifest = MaterializeManifest::new(
        count,
        width as u32,
        height as u32,
        disk_radius,
        archive_name.to_string(),
    );
    manifest.save(output_root)?;
    tracing::info!(samples = count, "materialization complete");
    Ok(manifest)
}

fn archive_name(archive_path: &Path) -> String {
    archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Decode `archive_path` and materialize it under `output_root`.
pub fn materialize_archive(archive_path: &Path, output_root: &Path) -> DatasetResult<MaterializeManifest> {
    let archive = RawArchive::open(archive_path)?;
    materialize(
        &archive,
        output_root,
        &archive_name(archive_path),
        DEFAULT_DISK_RADIUS,
    )
}

/// Skip when `root` holds a verified manifest; otherwise load the archive, then clear
/// partial output and rebuild. A failing `load` leaves `root` untouched.
pub fn ensure_materialized_with(
    root: &Path,
    archive_name: &str,
    load: impl FnOnce() -> DatasetResult<RawArchive>,
) -> DatasetResult<MaterializeManifest> {
    match MaterializeManifest::verify(root) {
        Ok(manifest) => {
            tracing::info!(
                root = %root.display(),
                samples = manifest.sample_count,
                "dataset already materialized"
            );
            return Ok(manifest);
        }
        Err(e @ (EdgeDatasetError::Incomplete { .. } | EdgeDatasetError::Json { .. })) => {
            tracing::warn!(root = %root.display(), reason = %e, "rebuilding dataset");
        }
        Err(e) => return Err(e),
    }
    let archive = load()?;
    for dir in [IMAGES_DIR, EDGES_DIR] {
        let path = root.join(dir);
        if path.exists() {
            fs::remove_dir_all(&path).map_err(|e| EdgeDatasetError::io(&path, e))?;
        }
    }
    let manifest_path = MaterializeManifest::path_in(root);
    if manifest_path.exists() {
        fs::remove_file(&manifest_path).map_err(|e| EdgeDatasetError::io(&manifest_path, e))?;
    }
    materialize(&archive, root, archive_name, DEFAULT_DISK_RADIUS)
}

pub fn ensure_materialized(archive_path: &Path, root: &Path) -> DatasetResult<MaterializeManifest> {
    ensure_materialized_with(root, &archive_name(archive_path), || {
        RawArchive::open(archive_path)
    })
}

/// Download the NYUDv2 archive into `root` if needed, then materialize it there.
pub fn prepare_nyud(root: &Path, url: &str) -> DatasetResult<MaterializeManifest> {
    let archive_path = root.join(NYUD_ARCHIVE_NAME);
    ensure_local(&archive_path, url)?;
    ensure_materialized(&archive_path, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ImageStack, LabelData, LabelStack};
    use std::cell::Cell;

    /// Two 6x5 samples; the right half of each is object 1.
    fn half_split_archive() -> RawArchive {
        let (h, w, n) = (5, 6, 2);
        let data = (0..h * w * 3 * n).map(|i| (i % 256) as u8).collect();
        let mut labels = vec![0u16; h * w * n];
        for s in 0..n {
            for x in 3..w {
                for y in 0..h {
                    labels[y + h * (x + w * s)] = 1;
                }
            }
        }
        RawArchive::new(
            ImageStack {
                height: h,
                width: w,
                channels: 3,
                count: n,
                data,
            },
            LabelStack {
                height: h,
                width: w,
                count: n,
                data: LabelData::U16(labels),
            },
        )
        .unwrap()
    }

    #[test]
    fn writes_pairs_and_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = materialize(&half_split_archive(), tmp.path(), "tiny.mat", 3).unwrap();
        assert_eq!(manifest.sample_count, 2);
        assert_eq!((manifest.width, manifest.height), (6, 5));
        for i in 0..2 {
            let edges = image::open(tmp.path().join(EDGES_DIR).join(sample_file_name(i)))
                .unwrap()
                .to_luma8();
            assert_eq!(edges.dimensions(), (6, 5));
            assert!(edges.pixels().all(|p| p[0] == 0 || p[0] == 255));
            assert!(edges.pixels().any(|p| p[0] == 255));
        }
        assert_eq!(MaterializeManifest::verify(tmp.path()).unwrap(), manifest);
    }

    #[test]
    fn complete_root_is_not_rebuilt() {
        let tmp = tempfile::tempdir().unwrap();
        materialize(&half_split_archive(), tmp.path(), "tiny.mat", 3).unwrap();
        let loads = Cell::new(0);
        ensure_materialized_with(tmp.path(), "tiny.mat", || {
            loads.set(loads.get() + 1);
            Ok(half_split_archive())
        })
        .unwrap();
        assert_eq!(loads.get(), 0);
    }

    #[test]
    fn partial_root_is_cleared_and_rebuilt() {
        let tmp = tempfile::tempdir().unwrap();
        let stale = tmp.path().join(IMAGES_DIR).join("00042.png");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"stale").unwrap();

        let manifest =
            ensure_materialized_with(tmp.path(), "tiny.mat", || Ok(half_split_archive())).unwrap();
        assert_eq!(manifest.sample_count, 2);
        assert!(!stale.exists());
        assert!(tmp.path().join(IMAGES_DIR).join("00001.png").is_file());
    }

    #[test]
    fn failed_load_keeps_existing_output() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for dir in [IMAGES_DIR, EDGES_DIR] {
            fs::create_dir_all(root.join(dir)).unwrap();
            fs::write(root.join(dir).join("00000.png"), b"prior").unwrap();
        }

        let err = ensure_materialized_with(root, "x.mat", || {
            Err(EdgeDatasetError::Archive {
                path: root.join("x.mat"),
                msg: "unreadable".to_string(),
            })
        })
        .unwrap_err();
        assert!(matches!(err, EdgeDatasetError::Archive { .. }));
        for dir in [IMAGES_DIR, EDGES_DIR] {
            assert_eq!(fs::read(root.join(dir).join("00000.png")).unwrap(), b"prior");
        }
    }

    #[test]
    fn unreadable_archive_fails_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        let err = materialize_archive(&tmp.path().join("x.mat"), tmp.path()).unwrap_err();
        assert!(matches!(err, EdgeDatasetError::Archive { .. }));
    }
}
