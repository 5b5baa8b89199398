//! SIMD-optimized distance functions with runtime dispatch
//!
//! This module provides hardware-accelerated vector distance computations:
//! - **AVX2+FMA**: x86_64 hosts with AVX2 (most modern x86)
//! - **Scalar**: Portable fallback
//!
//! The variant is detected once, on first use, and shared process-wide.
//!
//! ## Usage
//!
//! ```rust
//! use annb_core::distance::{dot, euclidean_squared, simd_level};
//!
//! let a = vec![1.0, 2.0, 3.0, 4.0];
//! let b = vec![5.0, 6.0, 7.0, 8.0];
//!
//! let l2 = euclidean_squared(&a, &b);
//! let ip = dot(&a, &b);
//! assert!((l2 - 64.0).abs() < 1e-5);
//! assert!((ip - 70.0).abs() < 1e-5);
//!
//! println!("Using SIMD: {}", simd_level());
//! ```

pub mod scalar;

#[cfg(target_arch = "x86_64")]
pub mod avx2;

pub mod runtime;


use lazy_static::lazy_static;

pub use runtime::Variant;

lazy_static! {
    static ref DISPATCHER: Variant = Variant::detect();
}

/// Compute squared Euclidean distance between two vectors
///
/// Returns `sum((a[i] - b[i])^2)` for all i.
#[inline]
pub fn euclidean_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");
    DISPATCHER.euclidean_squared(a, b)
}

/// Compute dot product of two vectors
///
/// Returns `sum(a[i] * b[i])`.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");
    DISPATCHER.dot(a, b)
}

/// Euclidean norm of a vector.
#[inline]
pub fn norm(a: &[f32]) -> f32 {
    DISPATCHER.dot(a, a).sqrt()
}

/// Scale `v` in place to unit length. Zero vectors are left untouched.
pub fn normalize_in_place(v: &mut [f32]) {
    let n = norm(v);
    if n == 0.0 {
        return;
    }
    for x in v.iter_mut() {
        *x /= n;
    }
}

/// The variant selected for this process.
#[inline]
pub fn variant() -> Variant {
    *DISPATCHER
}

/// Returns the active SIMD implementation level (`"AVX2+FMA"` or `"Scalar"`).
#[inline]
pub fn simd_level() -> &'static str {
    DISPATCHER.name()
}
