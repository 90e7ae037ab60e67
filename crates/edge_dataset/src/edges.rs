//! Boundary extraction from per-pixel instance label maps.
//!
//! The pipeline is fixed: outer label boundaries, dilation by a disk, erosion by
//! the same disk, then thinning. Dilate-then-erode bridges small gaps between
//! boundary fragments caused by label noise before the skeleton is taken.

use crate::morphology::{binary_dilate, binary_erode, disk, thin, BinaryMask};

pub type BoundaryMap = BinaryMask;

pub const DEFAULT_DISK_RADIUS: u32 = 3;

/// Integer label type; `MAX` stands in for background when probing object adjacency.
pub trait Label: Copy + Ord + Default + Send + Sync + 'static {
    const MAX: Self;
}

impl Label for u8 {
    const MAX: Self = u8::MAX;
}

impl Label for u16 {
    const MAX: Self = u16::MAX;
}

impl Label for u32 {
    const MAX: Self = u32::MAX;
}

/// Row-major instance map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelGrid<L: Label> {
    pub width: usize,
    pub height: usize,
    pub data: Vec<L>,
}

impl<L: Label> LabelGrid<L> {
    pub fn from_vec(width: usize, height: usize, data: Vec<L>) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> L {
        self.data[y * self.width + x]
    }
}

const CROSS: [(isize, isize); 5] = [(0, 0), (1, 0), (-1, 0), (0, 1), (0, -1)];
const SQUARE: [(isize, isize); 9] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (0, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Min and max over a neighbourhood, ignoring out-of-bounds positions.
fn neighbourhood_extrema<L: Label>(
    grid: &LabelGrid<L>,
    x: usize,
    y: usize,
    offsets: &[(isize, isize)],
    map: impl Fn(L) -> L,
) -> (L, L) {
    let mut lo = map(grid.get(x, y));
    let mut hi = lo;
    for &(dx, dy) in offsets {
        let nx = x as isize + dx;
        let ny = y as isize + dy;
        if nx < 0 || ny < 0 || nx >= grid.width as isize || ny >= grid.height as isize {
            continue;
        }
        let v = map(grid.get(nx as usize, ny as usize));
        lo = lo.min(v);
        hi = hi.max(v);
    }
    (lo, hi)
}

/// Outer boundaries between label regions, background label 0.
///
/// A pixel is a boundary candidate when its 4-connected neighbourhood holds more
/// than one label. Candidates are kept when they are background, or when the
/// object pixel touches a different object in its 8-neighbourhood.
pub fn find_outer_boundaries<L: Label>(labels: &LabelGrid<L>) -> BoundaryMap {
    let background = L::default();
    let mut out = BinaryMask::new(labels.width, labels.height);
    for y in 0..labels.height {
        for x in 0..labels.width {
            let (lo, hi) = neighbourhood_extrema(labels, x, y, &CROSS, |v| v);
            if lo == hi {
                continue;
            }
            let keep = if labels.get(x, y) == background {
                true
            } else {
                let (_, dilated) = neighbourhood_extrema(labels, x, y, &SQUARE, |v| v);
                let (eroded, _) = neighbourhood_extrema(labels, x, y, &SQUARE, |v| {
                    if v == background {
                        L::MAX
                    } else {
                        v
                    }
                });
                dilated != eroded
            };
            out.set(x, y, keep);
        }
    }
    out
}

/// Binary boundary map of an instance map: outer boundaries, dilate, erode, thin.
pub fn extract_boundary<L: Label>(labels: &LabelGrid<L>, disk_radius: u32) -> BoundaryMap {
    let element = disk(disk_radius);
    let boundaries = find_outer_boundaries(labels);
    let dilated = binary_dilate(&boundaries, &element);
    let eroded = binary_erode(&dilated, &element);
    thin(&eroded)
}
