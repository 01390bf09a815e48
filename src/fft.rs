//! Two-dimensional discrete Fourier transforms over `ndarray` images,
//! row pass then column pass through `rustfft`.

use std::sync::Arc;

use ndarray::prelude::*;
use rustfft::{Fft, FftDirection, FftPlanner};

pub use rustfft::num_complex::Complex;

pub type Spectrum = Array2<Complex<f32>>;

/// Smallest `m >= n` of the form `2^a * 3^b * 5^c`.
pub fn optimal_size(n: usize) -> usize {
    let mut m = n.max(1);

    loop {
        let mut r = m;
        for p in [2, 3, 5] {
            while r % p == 0 {
                r /= p;
            }
        }

        if r == 1 {
            return m;
        }

        m += 1;
    }
}

fn run_lanes(plan: &Arc<dyn Fft<f32>>, lanes: ndarray::iter::LanesMut<'_, Complex<f32>, Ix1>) {
    let mut scratch = vec![Complex::new(0.0, 0.0); plan.get_inplace_scratch_len()];
    let mut line = Vec::new();

    for mut lane in lanes {
        line.clear();
        line.extend(lane.iter().copied());
        plan.process_with_scratch(&mut line, &mut scratch);
        lane.iter_mut().zip(&line).for_each(|(dst, v)| *dst = *v);
    }
}

fn transform2(src: &Spectrum, direction: FftDirection) -> Spectrum {
    let (rows, cols) = src.dim();
    let mut out = src.clone();
    if rows == 0 || cols == 0 {
        return out;
    }

    let mut planner = FftPlanner::<f32>::new();
    let row_plan = planner.plan_fft(cols, direction);
    let col_plan = planner.plan_fft(rows, direction);

    run_lanes(&row_plan, out.rows_mut());
    run_lanes(&col_plan, out.columns_mut());

    out
}

/// Forward 2D transform of a real image.
pub fn fft2(img: ArrayView2<'_, f32>) -> Spectrum {
    transform2(&img.mapv(|v| Complex::new(v, 0.0)), FftDirection::Forward)
}

/// Inverse 2D transform keeping only the real part, scaled by `1/(rows*cols)`.
pub fn ifft2_real(spec: &Spectrum) -> Array2<f32> {
    let scale = 1.0 / spec.len().max(1) as f32;

    transform2(spec, FftDirection::Inverse).mapv(|v| v.re * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn optimal_sizes_match_known_values() {
        assert_eq!(optimal_size(1), 1);
        assert_eq!(optimal_size(7), 8);
        assert_eq!(optimal_size(31), 32);
        assert_eq!(optimal_size(61), 64);
        assert_eq!(optimal_size(97), 100);
        assert_eq!(optimal_size(121), 125);
    }

    #[test]
    fn constant_image_has_only_a_dc_term() {
        let img = Array2::from_elem((6, 10), 2.0f32);
        let spec = fft2(img.view());

        assert_abs_diff_eq!(spec[[0, 0]].re, 120.0, epsilon = 1e-3);
        for ((r, c), v) in spec.indexed_iter() {
            if (r, c) != (0, 0) {
                assert!(v.norm() < 1e-3);
            }
        }
    }

    #[test]
    fn inverse_undoes_forward_in_2d() {
        let img = Array2::from_shape_fn((12, 15), |(r, c)| ((r * 7 + c * 3) % 11) as f32);
        let back = ifft2_real(&fft2(img.view()));

        for (a, b) in img.iter().zip(back.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
        }
    }

    #[test]
    fn prime_sizes_round_trip() {
        let img = Array2::from_shape_fn((7, 13), |(r, c)| (r * 13 + c) as f32);
        let back = ifft2_real(&fft2(img.view()));

        for (a, b) in img.iter().zip(back.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
        }
    }
}
