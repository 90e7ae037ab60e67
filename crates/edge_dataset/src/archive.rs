//! In-memory view of the NYUDv2 labeled archive.
//!
//! Arrays keep MATLAB axis order and column-major layout: `images` is
//! `[height, width, channels, count]` and `instances` is `[height, width, count]`.
//! A MAT v7.3 file is an HDF5 container whose datasets report these dims reversed,
//! so the raw HDF5 buffer can be used as-is.

use crate::edges::LabelGrid;
use crate::types::{DatasetResult, EdgeDatasetError};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ImageStack {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub count: usize,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum LabelData {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl LabelData {
    pub fn len(&self) -> usize {
        match self {
            LabelData::U8(v) => v.len(),
            LabelData::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct LabelStack {
    pub height: usize,
    pub width: usize,
    pub count: usize,
    pub data: LabelData,
}

/// One instance slice, keeping the source label width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceSlice {
    U8(LabelGrid<u8>),
    U16(LabelGrid<u16>),
}

#[derive(Debug, Clone)]
pub struct RawArchive {
    images: ImageStack,
    instances: LabelStack,
}

impl RawArchive {
    pub fn new(images: ImageStack, instances: LabelStack) -> DatasetResult<Self> {
        if images.channels != 3 {
            return Err(EdgeDatasetError::ArchiveShape(format!(
                "images must have 3 colour channels, got {}",
                images.channels
            )));
        }
        if images.height != instances.height || images.width != instances.width {
            return Err(EdgeDatasetError::ArchiveShape(format!(
                "images are {}x{} but instances are {}x{}",
                images.height, images.width, instances.height, instances.width
            )));
        }
        if images.count != instances.count {
            return Err(EdgeDatasetError::ArchiveShape(format!(
                "images hold {} samples but instances hold {}",
                images.count, instances.count
            )));
        }
        let image_len = images.height * images.width * images.channels * images.count;
        if images.data.len() != image_len {
            return Err(EdgeDatasetError::ArchiveShape(format!(
                "images buffer has {} elements, dims require {image_len}",
                images.data.len()
            )));
        }
        let label_len = instances.height * instances.width * instances.count;
        if instances.data.len() != label_len {
            return Err(EdgeDatasetError::ArchiveShape(format!(
                "instances buffer has {} elements, dims require {label_len}",
                instances.data.len()
            )));
        }
        Ok(Self { images, instances })
    }

    pub fn sample_count(&self) -> usize {
        self.images.count
    }

    /// `(width, height)` of every sample.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.images.width, self.images.height)
    }

    fn check_index(&self, index: usize) -> DatasetResult<()> {
        if index >= self.sample_count() {
            return Err(EdgeDatasetError::IndexOutOfBounds {
                index,
                len: self.sample_count(),
            });
        }
        Ok(())
    }

    pub fn image_slice(&self, index: usize) -> DatasetResult<image::RgbImage> {
        self.check_index(index)?;
        let stack = &self.images;
        let (height, width, channels) = (stack.height, stack.width, stack.channels);
        let data = &stack.data;
        let mut img = image::RgbImage::new(width as u32, height as u32);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                pixel[c] = data[y + height * (x + width * (c + channels * index))];
            }
        }
        Ok(img)
    }

    pub fn instance_slice(&self, index: usize) -> DatasetResult<InstanceSlice> {
        self.check_index(index)?;
        let (h, w) = (self.instances.height, self.instances.width);
        Ok(match &self.instances.data {
            LabelData::U8(data) => InstanceSlice::U8(transpose_slice(data, w, h, index)),
            LabelData::U16(data) => InstanceSlice::U16(transpose_slice(data, w, h, index)),
        })
    }

    #[cfg(feature = "mat73")]
    pub fn open(path: &Path) -> DatasetResult<Self> {
        hdf5_reader::read_archive(path)
    }

    #[cfg(not(feature = "mat73"))]
    pub fn open(path: &Path) -> DatasetResult<Self> {
        Err(EdgeDatasetError::Archive {
            path: path.to_path_buf(),
            msg: "MAT v7.3 decoding requires the `mat73` feature of edge_dataset".to_string(),
        })
    }
}

fn transpose_slice<L: crate::edges::Label>(
    data: &[L],
    width: usize,
    height: usize,
    index: usize,
) -> LabelGrid<L> {
    let base = width * height * index;
    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            out.push(data[base + y + height * x]);
        }
    }
    LabelGrid {
        width,
        height,
        data: out,
    }
}

#[cfg(feature = "mat73")]
mod hdf5_reader {
    use super::{ImageStack, LabelData, LabelStack, RawArchive};
    use crate::types::{DatasetResult, EdgeDatasetError};
    use std::path::Path;

    fn archive_err(path: &Path, msg: impl std::fmt::Display) -> EdgeDatasetError {
        EdgeDatasetError::Archive {
            path: path.to_path_buf(),
            msg: msg.to_string(),
        }
    }

    /// HDF5 dims come back reversed relative to MATLAB.
    fn matlab_dims(ds: &hdf5::Dataset) -> Vec<usize> {
        let mut dims = ds.shape();
        dims.reverse();
        dims
    }

    pub(super) fn read_archive(path: &Path) -> DatasetResult<RawArchive> {
        let file = hdf5::File::open(path).map_err(|e| archive_err(path, e))?;

        let images_ds = file
            .dataset("images")
            .map_err(|e| archive_err(path, format!("missing `images`: {e}")))?;
        let dims = matlab_dims(&images_ds);
        let [height, width, channels, count] = dims[..] else {
            return Err(archive_err(path, format!("`images` must be 4-D, got {dims:?}")));
        };
        let data = images_ds
            .read_raw::<u8>()
            .map_err(|e| archive_err(path, format!("reading `images`: {e}")))?;
        let images = ImageStack {
            height,
            width,
            channels,
            count,
            data,
        };

        let instances_ds = file
            .dataset("instances")
            .map_err(|e| archive_err(path, format!("missing `instances`: {e}")))?;
        let dims = matlab_dims(&instances_ds);
        let [height, width, count] = dims[..] else {
            return Err(archive_err(path, format!("`instances` must be 3-D, got {dims:?}")));
        };
        let elem_size = instances_ds
            .dtype()
            .map_err(|e| archive_err(path, e))?
            .size();
        let data = match elem_size {
            1 => LabelData::U8(
                instances_ds
                    .read_raw::<u8>()
                    .map_err(|e| archive_err(path, format!("reading `instances`: {e}")))?,
            ),
            _ => LabelData::U16(
                instances_ds
                    .read_raw::<u16>()
                    .map_err(|e| archive_err(path, format!("reading `instances`: {e}")))?,
            ),
        };
        let instances = LabelStack {
            height,
            width,
            count,
            data,
        };

        RawArchive::new(images, instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Column-major 2x3 images (h=2, w=3), 1 sample; pixel value encodes position.
    fn tiny_archive() -> RawArchive {
        let (h, w, c, n) = (2, 3, 3, 1);
        let mut data = vec![0u8; h * w * c * n];
        for ci in 0..c {
            for x in 0..w {
                for y in 0..h {
                    data[y + h * (x + w * ci)] = (100 * ci + 10 * y + x) as u8;
                }
            }
        }
        let mut labels = vec![0u8; h * w];
        for x in 0..w {
            for y in 0..h {
                labels[y + h * x] = (10 * y + x) as u8;
            }
        }
        RawArchive::new(
            ImageStack {
                height: h,
                width: w,
                channels: c,
                count: n,
                data,
            },
            LabelStack {
                height: h,
                width: w,
                count: n,
                data: LabelData::U8(labels),
            },
        )
        .unwrap()
    }

    #[test]
    fn image_slice_reads_column_major_layout() {
        let img = tiny_archive().image_slice(0).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1).0, [12, 112, 212]);
        assert_eq!(img.get_pixel(0, 1).0, [10, 110, 210]);
    }

    #[test]
    fn instance_slice_is_row_major() {
        let InstanceSlice::U8(grid) = tiny_archive().instance_slice(0).unwrap() else {
            panic!("expected u8 labels");
        };
        assert_eq!(grid.get(2, 1), 12);
        assert_eq!(grid.get(1, 0), 1);
    }

    #[test]
    fn mismatched_counts_are_rejected() {
        let err = RawArchive::new(
            ImageStack {
                height: 1,
                width: 1,
                channels: 3,
                count: 2,
                data: vec![0; 6],
            },
            LabelStack {
                height: 1,
                width: 1,
                count: 1,
                data: LabelData::U8(vec![0]),
            },
        )
        .unwrap_err();
        assert!(matches!(err, EdgeDatasetError::ArchiveShape(_)));
    }

    /// Writes `images` [h=2, w=3, c=3, n=2] and u16 `instances` [2, 3, 2] the way
    /// MATLAB stores them: HDF5 shape reversed, buffer column-major.
    #[cfg(feature = "mat73")]
    #[test]
    fn open_reads_reversed_hdf5_dims() {
        let (h, w, c, n) = (2usize, 3usize, 3usize, 2usize);
        let mut images = vec![0u8; h * w * c * n];
        let mut labels = vec![0u16; h * w * n];
        for s in 0..n {
            for x in 0..w {
                for y in 0..h {
                    for ci in 0..c {
                        images[y + h * (x + w * (ci + c * s))] = (100 * ci + 10 * y + x + s) as u8;
                    }
                    labels[y + h * (x + w * s)] = (1000 * s + 10 * y + x) as u16;
                }
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tiny.mat");
        {
            let file = hdf5::File::create(&path).unwrap();
            file.new_dataset::<u8>()
                .shape([n, c, w, h])
                .create("images")
                .unwrap()
                .write_raw(&images[..])
                .unwrap();
            file.new_dataset::<u16>()
                .shape([n, w, h])
                .create("instances")
                .unwrap()
                .write_raw(&labels[..])
                .unwrap();
        }

        let archive = RawArchive::open(&path).unwrap();
        assert_eq!(archive.sample_count(), 2);
        assert_eq!(archive.dimensions(), (3, 2));
        assert_eq!(archive.image_slice(1).unwrap().get_pixel(2, 1).0, [13, 113, 213]);
        let InstanceSlice::U16(grid) = archive.instance_slice(1).unwrap() else {
            panic!("expected u16 labels");
        };
        assert_eq!(grid.get(2, 1), 1012);
        assert_eq!(grid.get(0, 0), 1000);
    }

    #[cfg(feature = "mat73")]
    #[test]
    fn open_rejects_missing_dataset() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.mat");
        hdf5::File::create(&path).unwrap();
        assert!(matches!(
            RawArchive::open(&path),
            Err(EdgeDatasetError::Archive { .. })
        ));
    }

    #[test]
    fn slice_past_end_is_out_of_bounds() {
        assert!(matches!(
            tiny_archive().image_slice(1),
            Err(EdgeDatasetError::IndexOutOfBounds { index: 1, len: 1 })
        ));
    }
}
