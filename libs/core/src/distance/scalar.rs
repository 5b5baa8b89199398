//! Portable kernels. Four independent accumulators let the compiler vectorize.

pub fn euclidean_squared(a: &[f32], b: &[f32]) -> f32 {
    fold4(a, b, |x, y| (x - y) * (x - y))
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    fold4(a, b, |x, y| x * y)
}

#[inline(always)]
fn fold4(a: &[f32], b: &[f32], term: impl Fn(f32, f32) -> f32) -> f32 {
    let xs = a.chunks_exact(4);
    let ys = b.chunks_exact(4);
    let mut tail = 0.0;
    for (x, y) in xs.remainder().iter().zip(ys.remainder()) {
        tail += term(*x, *y);
    }

    let mut acc = [0.0f32; 4];
    for (x, y) in xs.zip(ys) {
        for lane in 0..4 {
            acc[lane] += term(x[lane], y[lane]);
        }
    }
    (acc[0] + acc[1]) + (acc[2] + acc[3]) + tail
}
