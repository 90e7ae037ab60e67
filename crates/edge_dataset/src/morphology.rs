//! Binary morphology on row-major masks: disk structuring elements, dilation,
//! erosion and topology-preserving thinning.
//!
//! Border conventions follow the usual scientific-imaging defaults so edge maps
//! stay pixel-compatible with reference outputs:
//! - dilation treats out-of-bounds pixels as unset,
//! - erosion treats out-of-bounds pixels as set,
//! - thinning treats out-of-bounds neighbours as unset.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: usize,
    height: usize,
    /// Row-major, always `width * height` entries.
    data: Vec<bool>,
}

impl BinaryMask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![false; width * height],
        }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<bool>) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major pixels.
    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        self.data[y * self.width + x] = value;
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// Scale to a single-channel raster with values {0, 255}.
    pub fn to_gray_image(&self) -> image::GrayImage {
        image::GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            image::Luma([if self.get(x as usize, y as usize) { 255 } else { 0 }])
        })
    }
}

/// Neighbourhood offsets `(dx, dy)` of a structuring element centred on the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    offsets: Vec<(isize, isize)>,
}

impl StructuringElement {
    pub fn offsets(&self) -> &[(isize, isize)] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Disk of the given radius: every offset with `dx² + dy² <= r²`.
pub fn disk(radius: u32) -> StructuringElement {
    let r = radius as isize;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                offsets.push((dx, dy));
            }
        }
    }
    StructuringElement { offsets }
}

#[inline]
fn offset(x: usize, y: usize, dx: isize, dy: isize, w: usize, h: usize) -> Option<usize> {
    let nx = x as isize + dx;
    let ny = y as isize + dy;
    if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
        None
    } else {
        Some(ny as usize * w + nx as usize)
    }
}

pub fn binary_dilate(mask: &BinaryMask, element: &StructuringElement) -> BinaryMask {
    let (w, h) = (mask.width, mask.height);
    let mut out = BinaryMask::new(w, h);
    for y in 0..h {
        for x in 0..w {
            if !mask.get(x, y) {
                continue;
            }
            // Symmetric elements only, so stamping equals the reflected dilation.
            for &(dx, dy) in element.offsets() {
                if let Some(i) = offset(x, y, dx, dy, w, h) {
                    out.data[i] = true;
                }
            }
        }
    }
    out
}

pub fn binary_erode(mask: &BinaryMask, element: &StructuringElement) -> BinaryMask {
    let (w, h) = (mask.width, mask.height);
    let mut out = BinaryMask::new(w, h);
    for y in 0..h {
        for x in 0..w {
            if !mask.get(x, y) {
                continue;
            }
            let keep = element
                .offsets()
                .iter()
                .all(|&(dx, dy)| offset(x, y, dx, dy, w, h).is_none_or(|i| mask.data[i]));
            out.set(x, y, keep);
        }
    }
    out
}

const fn bit(code: usize, i: usize) -> bool {
    (code >> i) & 1 == 1
}

/// Exactly one 0→1 transition around the 8-neighbourhood.
const fn crossing_number_is_one(n: usize) -> bool {
    let mut s = 0;
    let mut i = 0;
    while i < 8 {
        if !bit(n, i) && (bit(n, i + 1) || bit(n, (i + 2) % 8)) {
            s += 1;
        }
        i += 2;
    }
    s == 1
}

const fn neighbour_count_ok(n: usize) -> bool {
    let mut n1 = 0;
    let mut n2 = 0;
    let mut k = 1;
    while k < 8 {
        if bit(n, k) || bit(n, k - 1) {
            n1 += 1;
        }
        if bit(n, k) || bit(n, (k + 1) % 8) {
            n2 += 1;
        }
        k += 2;
    }
    let m = if n1 < n2 { n1 } else { n2 };
    m == 2 || m == 3
}

const fn build_thin_lut(first_pass: bool) -> [bool; 256] {
    let mut lut = [false; 256];
    let mut n = 0;
    while n < 256 {
        let directional = if first_pass {
            !((bit(n, 1) || bit(n, 2) || !bit(n, 7)) && bit(n, 0))
        } else {
            !((bit(n, 5) || bit(n, 6) || !bit(n, 3)) && bit(n, 4))
        };
        lut[n] = crossing_number_is_one(n) && neighbour_count_ok(n) && directional;
        n += 1;
    }
    lut
}

static THIN_LUT_FIRST: [bool; 256] = build_thin_lut(true);
static THIN_LUT_SECOND: [bool; 256] = build_thin_lut(false);

/// Neighbour weights: E=1, NE=2, N=4, NW=8, W=16, SW=32, S=64, SE=128.
const NEIGHBOUR_WEIGHTS: [(isize, isize, usize); 8] = [
    (1, 0, 1),
    (1, -1, 2),
    (0, -1, 4),
    (-1, -1, 8),
    (-1, 0, 16),
    (-1, 1, 32),
    (0, 1, 64),
    (1, 1, 128),
];

fn neighbour_code(mask: &BinaryMask, x: usize, y: usize) -> usize {
    NEIGHBOUR_WEIGHTS
        .iter()
        .filter(|&&(dx, dy, _)| {
            offset(x, y, dx, dy, mask.width, mask.height).is_some_and(|i| mask.data[i])
        })
        .map(|&(_, _, weight)| weight)
        .sum()
}

/// Thin a mask to one-pixel-wide, topology-preserving curves.
///
/// Each iteration runs two subiterations; within a subiteration every deletion
/// decision is taken on the mask as it stood when the subiteration began.
/// Iterates until the set-pixel count stops changing.
pub fn thin(mask: &BinaryMask) -> BinaryMask {
    let mut skel = mask.clone();
    let mut count = skel.count();
    loop {
        for lut in [&THIN_LUT_FIRST, &THIN_LUT_SECOND] {
            let deletions: Vec<usize> = (0..skel.height)
                .flat_map(|y| (0..skel.width).map(move |x| (x, y)))
                .filter(|&(x, y)| skel.get(x, y) && lut[neighbour_code(&skel, x, y)])
                .map(|(x, y)| y * skel.width + x)
                .collect();
            for i in deletions {
                skel.data[i] = false;
            }
        }
        let next = skel.count();
        if next == count {
            return skel;
        }
        count = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&str]) -> BinaryMask {
        let height = rows.len();
        let width = rows[0].len();
        let data = rows
            .iter()
            .flat_map(|r| r.chars().map(|c| c == '#'))
            .collect();
        BinaryMask::from_vec(width, height, data).unwrap()
    }

    #[test]
    fn disk_radius_three_has_29_offsets() {
        let se = disk(3);
        assert_eq!(se.len(), 29);
        assert!(se.offsets().contains(&(3, 0)));
        assert!(se.offsets().contains(&(2, 2)));
        assert!(!se.offsets().contains(&(3, 1)));
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        assert!(BinaryMask::from_vec(3, 2, vec![false; 5]).is_none());
        assert!(BinaryMask::from_vec(3, 2, vec![false; 7]).is_none());
    }

    #[test]
    fn gray_image_matches_mask_pixels() {
        let mask = mask_from_rows(&["#..", "..#"]);
        let gray = mask.to_gray_image();
        assert_eq!(gray.dimensions(), (3, 2));
        let expected: [u8; 6] = [255, 0, 0, 0, 0, 255];
        assert_eq!(gray.as_raw().as_slice(), &expected);
        assert_eq!(mask.as_slice().iter().filter(|v| **v).count(), mask.count());
    }

    #[test]
    fn disk_radius_zero_is_origin() {
        assert_eq!(disk(0).offsets(), &[(0, 0)]);
    }

    #[test]
    fn dilate_single_pixel_with_unit_disk_makes_a_cross() {
        let mask = mask_from_rows(&["....", ".#..", "....", "...."]);
        let out = binary_dilate(&mask, &disk(1));
        let expected = mask_from_rows(&[".#..", "###.", ".#..", "...."]);
        assert_eq!(out, expected);
    }

    #[test]
    fn erode_full_mask_is_unchanged_at_borders() {
        let mask = BinaryMask::from_vec(5, 4, vec![true; 20]).unwrap();
        assert_eq!(binary_erode(&mask, &disk(3)), mask);
    }

    #[test]
    fn erode_removes_thin_features() {
        let mask = mask_from_rows(&[".....", ".....", "#####", ".....", "....."]);
        assert_eq!(binary_erode(&mask, &disk(1)).count(), 0);
    }

    #[test]
    fn thin_lut_rejects_isolated_and_end_points() {
        // No neighbours, or a single neighbour: never deletable.
        assert!(!THIN_LUT_FIRST[0]);
        assert!(!THIN_LUT_SECOND[0]);
        assert!(!THIN_LUT_FIRST[64]);
        assert!(!THIN_LUT_SECOND[4]);
    }

    #[test]
    fn thin_is_idempotent() {
        let mask = mask_from_rows(&[
            ".......", ".#####.", ".#####.", ".#####.", ".......",
        ]);
        let once = thin(&mask);
        assert!(once.count() > 0);
        assert!(once.count() < mask.count());
        assert_eq!(thin(&once), once);
    }

    #[test]
    fn thin_keeps_one_pixel_lines() {
        let mask = mask_from_rows(&[".....", ".###.", "....."]);
        assert_eq!(thin(&mask), mask);
    }

    #[test]
    fn gray_image_uses_full_intensity() {
        let mask = mask_from_rows(&["#.", ".#"]);
        let img = mask.to_gray_image();
        assert_eq!(img.get_pixel(0, 0)[0], 255);
        assert_eq!(img.get_pixel(1, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 1)[0], 255);
    }
}
