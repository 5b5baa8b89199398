//! AVX2+FMA kernels: eight f32 lanes per step, scalar remainder.

use std::arch::x86_64::*;

const LANES: usize = 8;

/// Squared L2 distance.
///
/// # Safety
/// Requires AVX2 and FMA on the running CPU. Slices must have equal length.
#[target_feature(enable = "avx2,fma")]
pub unsafe fn euclidean_squared(a: &[f32], b: &[f32]) -> f32 {
    let xs = a.chunks_exact(LANES);
    let ys = b.chunks_exact(LANES);
    let tail: f32 = xs
        .remainder()
        .iter()
        .zip(ys.remainder())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();

    let mut acc = _mm256_setzero_ps();
    for (x, y) in xs.zip(ys) {
        let diff = _mm256_sub_ps(_mm256_loadu_ps(x.as_ptr()), _mm256_loadu_ps(y.as_ptr()));
        acc = _mm256_fmadd_ps(diff, diff, acc);
    }
    reduce(acc) + tail
}

/// Inner product.
///
/// # Safety
/// Requires AVX2 and FMA on the running CPU. Slices must have equal length.
#[target_feature(enable = "avx2,fma")]
pub unsafe fn dot(a: &[f32], b: &[f32]) -> f32 {
    let xs = a.chunks_exact(LANES);
    let ys = b.chunks_exact(LANES);
    let tail: f32 = xs.remainder().iter().zip(ys.remainder()).map(|(x, y)| x * y).sum();

    let mut acc = _mm256_setzero_ps();
    for (x, y) in xs.zip(ys) {
        acc = _mm256_fmadd_ps(_mm256_loadu_ps(x.as_ptr()), _mm256_loadu_ps(y.as_ptr()), acc);
    }
    reduce(acc) + tail
}

#[target_feature(enable = "avx2")]
unsafe fn reduce(v: __m256) -> f32 {
    let pair = _mm_add_ps(_mm256_castps256_ps128(v), _mm256_extractf128_ps(v, 1));
    let pair = _mm_add_ps(pair, _mm_movehl_ps(pair, pair));
    let single = _mm_add_ss(pair, _mm_shuffle_ps(pair, pair, 0b01));
    _mm_cvtss_f32(single)
}
