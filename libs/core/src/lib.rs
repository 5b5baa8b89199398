//! Low-level building blocks shared by the annb crates.
//!
//! - [`distance`]: SIMD-dispatched distance kernels (AVX2+FMA or scalar,
//!   selected once at runtime)
//! - [`telemetry`]: tracing subscriber initialization for binaries

pub mod distance;
pub mod telemetry;
