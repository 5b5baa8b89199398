//! Kernel selection by CPU feature probing.

use super::scalar;

#[cfg(target_arch = "x86_64")]
use super::avx2;

/// Kernel family used for distance evaluation in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    #[cfg(target_arch = "x86_64")]
    Avx2,
    Scalar,
}

impl Variant {
    /// Best variant the running CPU supports.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
                return Variant::Avx2;
            }
        }
        Variant::Scalar
    }

    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(target_arch = "x86_64")]
            Variant::Avx2 => "AVX2+FMA",
            Variant::Scalar => "Scalar",
        }
    }

    pub fn is_accelerated(&self) -> bool {
        *self != Variant::Scalar
    }

    #[inline]
    pub fn euclidean_squared(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            // SAFETY: Avx2 is only produced by detect() after probing avx2 and fma
            #[cfg(target_arch = "x86_64")]
            Variant::Avx2 => unsafe { avx2::euclidean_squared(a, b) },
            Variant::Scalar => scalar::euclidean_squared(a, b),
        }
    }

    #[inline]
    pub fn dot(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            // SAFETY: see euclidean_squared
            #[cfg(target_arch = "x86_64")]
            Variant::Avx2 => unsafe { avx2::dot(a, b) },
            Variant::Scalar => scalar::dot(a, b),
        }
    }
}
