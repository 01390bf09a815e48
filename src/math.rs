use ndarray::prelude::*;

pub fn gauss(x: f32, c: f32) -> f32 {
    (-((x * x) / (2.0 * c * c))).exp()
}

/// Target correlation peak: a unit-height Gaussian centered on
/// `(height / 2, width / 2)`.
pub fn gaussian_peak(width: usize, height: usize, sigma: f32) -> Array2<f32> {
    let (cy, cx) = ((height / 2) as f32, (width / 2) as f32);

    Array2::from_shape_fn((height, width), |(r, c)| {
        let (dy, dx) = (r as f32 - cy, c as f32 - cx);
        gauss((dx * dx + dy * dy).sqrt(), sigma)
    })
}

fn hann(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }

    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos()))
        .collect()
}

/// Separable Hann window of `height` rows by `width` columns.
pub fn hanning(width: usize, height: usize) -> Array2<f32> {
    let (wx, wy) = (hann(width), hann(height));

    Array2::from_shape_fn((height, width), |(r, c)| wy[r] * wx[c])
}

#[inline]
fn reflect_101(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }

    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }

    i as usize
}

/// Correlates `src` with `kernel`, anchored at the kernel center
/// (`rows / 2`, `cols / 2`), mirroring borders without repeating the edge.
pub fn filter2d(src: ArrayView2<'_, f32>, kernel: ArrayView2<'_, f32>) -> Array2<f32> {
    let (rows, cols) = src.dim();
    let (kh, kw) = kernel.dim();
    let (ay, ax) = ((kh / 2) as isize, (kw / 2) as isize);

    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let mut acc = 0.0;
        for ((m, n), &k) in kernel.indexed_iter() {
            if k == 0.0 {
                continue;
            }

            let y = reflect_101(r as isize + m as isize - ay, rows);
            let x = reflect_101(c as isize + n as isize - ax, cols);
            acc += k * src[[y, x]];
        }
        acc
    })
}

#[inline]
fn reflect_edge(i: isize, n: usize) -> usize {
    let n = n as isize;
    let mut i = i.rem_euclid(2 * n);
    if i >= n {
        i = 2 * n - 1 - i;
    }

    i as usize
}

/// True convolution, `out[r, c] = sum k[m, n] * src[r + rows / 2 - m, c + cols / 2 - n]`,
/// mirroring borders with the edge pixel repeated.
pub fn convolve(src: ArrayView2<'_, f32>, kernel: ArrayView2<'_, f32>) -> Array2<f32> {
    let (rows, cols) = src.dim();
    let (kh, kw) = kernel.dim();
    let (ay, ax) = ((kh / 2) as isize, (kw / 2) as isize);

    Array2::from_shape_fn((rows, cols), |(r, c)| {
        kernel.indexed_iter().fold(0.0, |acc, ((m, n), &k)| {
            let y = reflect_edge(r as isize + ay - m as isize, rows);
            let x = reflect_edge(c as isize + ax - n as isize, cols);
            acc + k * src[[y, x]]
        })
    })
}

/// Population mean and standard deviation.
pub fn mean_std(a: ArrayView2<'_, f32>) -> (f32, f32) {
    let n = a.len().max(1) as f32;
    let mean = a.sum() / n;
    let var = a.fold(0.0, |acc, &v| acc + (v - mean) * (v - mean)) / n;

    (mean, var.sqrt())
}
