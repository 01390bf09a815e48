//! Dense optical flow and the flow-change features fed to the crash
//! classifier.

use ndarray::prelude::*;
use ndarray::Zip;
use tracing::trace;

use crate::frame::{resize_gray, resize_unit};
use crate::math::{convolve, filter2d};

pub const FLOW_ALPHA: f32 = 0.001;
pub const FLOW_ITERATIONS: usize = 8;

/// Fixed map size every clip is resampled to before flow is computed.
pub const MAP_WIDTH: usize = 134;
pub const MAP_HEIGHT: usize = 100;

pub const SUBSAMPLE: usize = 3;
pub const BLOCKS_Y: usize = 4;
pub const BLOCKS_X: usize = 4;
pub const BINS: usize = 20;
pub const BIN_WIDTH: f32 = 0.05;

pub const FEATURE_LEN: usize = BLOCKS_Y * BLOCKS_X * BINS;

// margin trimmed off every side of the map before blocking
const BLOCK_MARGIN: usize = 6;

#[derive(Debug, Clone)]
pub struct FlowField {
    pub h: Array2<f32>,
    pub v: Array2<f32>,
    pub magnitude: Array2<f32>,
}

fn kernels() -> (Array2<f32>, Array2<f32>, Array2<f32>, Array2<f32>) {
    let avg = array![
        [1.0 / 12.0, 1.0 / 6.0, 1.0 / 12.0],
        [1.0 / 6.0, 0.0, 1.0 / 6.0],
        [1.0 / 12.0, 1.0 / 6.0, 1.0 / 12.0]
    ];
    let dx = array![[-1.0f32, 1.0], [-1.0, 1.0]] * 0.25;
    let dy = array![[-1.0f32, -1.0], [1.0, 1.0]] * 0.25;
    let dt = Array2::from_elem((2, 2), 0.25f32);

    (avg, dx, dy, dt)
}

/// Horn–Schunck flow from `a` to `b` with a fixed iteration count.
pub fn horn_schunck(
    a: ArrayView2<'_, f32>,
    b: ArrayView2<'_, f32>,
    alpha: f32,
    iterations: usize,
) -> FlowField {
    let (avg, kx, ky, kt) = kernels();

    // derivatives repeat the edge pixel, the averaging pass mirrors past it
    let fx = convolve(a, kx.view()) + convolve(b, kx.view());
    let fy = convolve(a, ky.view()) + convolve(b, ky.view());
    let ft = convolve(a, kt.view()) - convolve(b, kt.view());

    let alpha2 = alpha * alpha;
    let mut h = Array2::<f32>::zeros(a.dim());
    let mut v = Array2::<f32>::zeros(a.dim());

    for _ in 0..iterations {
        let h_avg = filter2d(h.view(), avg.view());
        let v_avg = filter2d(v.view(), avg.view());

        let der = Zip::from(&h_avg)
            .and(&v_avg)
            .and(&fx)
            .and(&fy)
            .and(&ft)
            .map_collect(|&ha, &va, &fx, &fy, &ft| {
                (fx * ha + fy * va + ft) / (alpha2 + fx * fx + fy * fy)
            });

        h = &h_avg - &(&fx * &der);
        v = &v_avg - &(&fy * &der);
    }

    let magnitude = Zip::from(&h).and(&v).map_collect(|&h, &v| (h * h + v * v).sqrt());

    FlowField { h, v, magnitude }
}

/// Fraction of frame triples in which each pixel's flow magnitude changed
/// more than that triple's average change.
///
/// Triples are `(i + s, i + 2s, i + 3s)` for `i` stepping by `2s`, with the
/// subsample `s = 3`. Returns the accumulated map and the triple count.
pub fn flow_activity(frames: &[ArrayView2<'_, u8>]) -> (Array2<f32>, usize) {
    let mut acc = Array2::<f32>::zeros((MAP_HEIGHT, MAP_WIDTH));
    let s = SUBSAMPLE;

    let prepared = |f: &ArrayView2<'_, u8>| resize_gray(*f, MAP_WIDTH, MAP_HEIGHT).mapv(f32::from);

    let mut triples = 0;
    let mut i = 0;
    while i + 3 * s < frames.len() {
        let prev = prepared(&frames[i + s]);
        let curr = prepared(&frames[i + 2 * s]);
        let next = prepared(&frames[i + 3 * s]);

        let m1 = horn_schunck(prev.view(), curr.view(), FLOW_ALPHA, FLOW_ITERATIONS).magnitude;
        let m2 = horn_schunck(curr.view(), next.view(), FLOW_ALPHA, FLOW_ITERATIONS).magnitude;

        let delta = (m1 - m2).mapv(f32::abs);
        let mean = delta.mean().unwrap_or(0.0);
        Zip::from(&mut acc).and(&delta).for_each(|a, &d| {
            if d > mean {
                *a += 1.0;
            }
        });

        triples += 1;
        i += 2 * s;
    }

    if triples > 0 {
        acc /= triples as f32;
    }

    trace!(triples, "flow activity accumulated");
    (acc, triples)
}

/// Normalized `BINS`-bin histogram of every block of an `n` by `m` grid.
///
/// The map is resampled to the fixed map size first; a margin is trimmed
/// from each side and the rest split into equal blocks in raster order.
/// Values at or past `1.0` fall in the last bin, negatives in the first.
/// A block with no samples contributes zeros.
pub fn block_histogram(map: ArrayView2<'_, f32>, n: usize, m: usize) -> Vec<f32> {
    let mut out = vec![0.0; n * m * BINS];
    if n == 0 || m == 0 {
        return out;
    }

    let map = resize_unit(map, MAP_WIDTH, MAP_HEIGHT);
    let (height, width) = map.dim();
    let bh = height.saturating_sub(2 * BLOCK_MARGIN - 1) / n;
    let bw = width.saturating_sub(2 * BLOCK_MARGIN - 1) / m;

    for by in 0..n {
        for bx in 0..m {
            let y0 = BLOCK_MARGIN + by * bh;
            let x0 = BLOCK_MARGIN + bx * bw;
            let block = map.slice(s![
                y0.min(height)..(y0 + bh).min(height),
                x0.min(width)..(x0 + bw).min(width)
            ]);

            let hist = &mut out[(by * m + bx) * BINS..(by * m + bx + 1) * BINS];
            for &value in block.iter() {
                let bin = ((value / BIN_WIDTH).floor().max(0.0) as usize).min(BINS - 1);
                hist[bin] += 1.0;
            }

            let total = block.len() as f32;
            if total > 0.0 {
                hist.iter_mut().for_each(|h| *h /= total);
            }
        }
    }

    out
}

/// Feature vector of a cropped clip, `FEATURE_LEN` long.
pub fn flow_features(frames: &[ArrayView2<'_, u8>]) -> Vec<f32> {
    let (activity, _) = flow_activity(frames);

    block_histogram(activity.view(), BLOCKS_Y, BLOCKS_X)
}
