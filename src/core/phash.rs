//! Block-mean perceptual hashing (bmvbhash) and the ordered duplicate index.
//!
//! The image is divided into `bits x bits` cells; each cell accumulates the
//! R+G+B sum of its pixels, fully transparent pixels counting as pure white
//! (765) so empty PNG margins do not read as dark content. Cells are
//! binarized against the median of their horizontal band and packed four bits
//! per lowercase hex digit.

use image::{DynamicImage, GenericImageView};

/// Per-pixel value: R+G+B, with fully transparent pixels counted as white.
#[inline]
fn pixel_value(rgba: [u8; 4]) -> f64 {
    if rgba[3] == 0 {
        765.0
    } else {
        rgba[0] as f64 + rgba[1] as f64 + rgba[2] as f64
    }
}

fn block_sums_even(img: &DynamicImage, bits: u32) -> Vec<f64> {
    let (width, height) = img.dimensions();
    let block_w = width / bits;
    let block_h = height / bits;
    let mut blocks = vec![0.0; (bits * bits) as usize];
    for (x, y, px) in img.pixels() {
        let bx = x / block_w;
        let by = y / block_h;
        blocks[(by * bits + bx) as usize] += pixel_value(px.0);
    }
    blocks
}

/// Area-weighted accumulation for dimensions not divisible by `bits`: a pixel
/// straddling a fractional cell boundary contributes to both cells in
/// proportion to the overlap, rather than being truncated into one.
fn block_sums_weighted(img: &DynamicImage, bits: u32) -> Vec<f64> {
    let (width, height) = img.dimensions();
    let block_w = width as f64 / bits as f64;
    let block_h = height as f64 / bits as f64;
    let mut blocks = vec![0.0; (bits * bits) as usize];

    for (x, y, px) in img.pixels() {
        let value = pixel_value(px.0);

        let y_mod = (y as f64 + 1.0) % block_h;
        let y_frac = y_mod.fract();
        let y_int = y_mod.trunc();
        let weight_top = 1.0 - y_frac;
        let weight_bottom = y_frac;
        // y_int is zero exactly on block boundaries and the bottom edge.
        let (block_top, block_bottom) = if y_int > 0.0 || y + 1 == height {
            let b = (y as f64 / block_h).floor() as usize;
            (b, b)
        } else {
            (
                (y as f64 / block_h).floor() as usize,
                (y as f64 / block_h).ceil() as usize,
            )
        };

        let x_mod = (x as f64 + 1.0) % block_w;
        let x_frac = x_mod.fract();
        let x_int = x_mod.trunc();
        let weight_left = 1.0 - x_frac;
        let weight_right = x_frac;
        let (block_left, block_right) = if x_int > 0.0 || x + 1 == width {
            let b = (x as f64 / block_w).floor() as usize;
            (b, b)
        } else {
            (
                (x as f64 / block_w).floor() as usize,
                (x as f64 / block_w).ceil() as usize,
            )
        };

        let bits = bits as usize;
        blocks[block_top * bits + block_left] += value * weight_top * weight_left;
        blocks[block_top * bits + block_right] += value * weight_top * weight_right;
        blocks[block_bottom * bits + block_left] += value * weight_bottom * weight_left;
        blocks[block_bottom * bits + block_right] += value * weight_bottom * weight_right;
    }
    blocks
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Compute the block-mean hash of `img` over a `bits x bits` grid, returned
/// as lowercase hex of length `bits * bits / 4`.
pub fn block_mean_hash(img: &DynamicImage, bits: u32) -> String {
    debug_assert!(bits % 4 == 0, "grid must pack into whole hex digits");
    let (width, height) = img.dimensions();
    let blocks = if width % bits == 0 && height % bits == 0 {
        block_sums_even(img, bits)
    } else {
        block_sums_weighted(img, bits)
    };

    let half_block_value =
        width as f64 * height as f64 * 256.0 * 3.0 / (bits as f64 * bits as f64 * 2.0);

    let band_len = blocks.len() / 4;
    let mut result = Vec::with_capacity(blocks.len());
    for band in blocks.chunks(band_len) {
        let m = median(band);
        for &v in band {
            // A cell exactly at the median reads as 1 only when the band is
            // mostly bright; this keeps flat dark and flat bright images at
            // opposite ends of the hash space.
            result.push(v > m || ((v - m).abs() < 1.0 && m > half_block_value));
        }
    }

    let mut hex = String::with_capacity(result.len() / 4);
    for chunk in result.chunks(4) {
        let mut digit = 0u32;
        for &bit in chunk {
            digit = (digit << 1) | bit as u32;
        }
        hex.push(char::from_digit(digit, 16).unwrap_or('0'));
    }
    hex
}

/// Hamming distance between two hex hashes, computed nibble-wise. Surplus
/// nibbles of the longer string each count four bits, keeping the distance
/// symmetric for unequal lengths.
pub fn hamming_hex(a: &str, b: &str) -> u32 {
    let mut distance: u32 = a
        .chars()
        .zip(b.chars())
        .map(|(ca, cb)| {
            let na = ca.to_digit(16).unwrap_or(0);
            let nb = cb.to_digit(16).unwrap_or(0);
            (na ^ nb).count_ones()
        })
        .sum();
    distance += 4 * (a.len().abs_diff(b.len())) as u32;
    distance
}

/// Append-only hash index with strictly-ordered duplicate attribution:
/// a hash is compared only against strictly earlier entries, and the earliest
/// match wins, so the first occurrence of a photo is never flagged.
#[derive(Debug, Clone)]
pub struct HashIndex {
    hashes: Vec<String>,
    threshold: u32,
}

impl HashIndex {
    pub fn new(threshold: u32) -> Self {
        Self {
            hashes: Vec::new(),
            threshold,
        }
    }

    /// Insert `hash` as the next index, returning the earliest prior index
    /// within the duplicate threshold, if any.
    pub fn insert_and_find(&mut self, hash: &str) -> Option<usize> {
        let found = self
            .hashes
            .iter()
            .position(|earlier| !earlier.is_empty() && hamming_hex(earlier, hash) <= self.threshold);
        self.hashes.push(hash.to_string());
        found
    }

    /// Reserve the next index without participating in matching; keeps the
    /// index aligned with image positions when an image is skipped.
    pub fn insert_placeholder(&mut self) {
        self.hashes.push(String::new());
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
