//! Scalar and integer helpers

/// Clamps `v` to `[min, max]` for any partially ordered type
#[inline]
pub fn clamp<T: PartialOrd>(v: T, min: T, max: T) -> T {
    if v < min {
        min
    } else if v > max {
        max
    } else {
        v
    }
}

/// Smallest power of two greater than or equal to `x`
#[inline]
pub fn next_pow2(x: u32) -> u32 {
    if x <= 1 {
        return 1;
    }
    let mut n = x - 1;
    n |= n >> 1;
    n |= n >> 2;
    n |= n >> 4;
    n |= n >> 8;
    n |= n >> 16;
    n.wrapping_add(1)
}

/// Integer base-2 logarithm, rounded down. `ilog2(0)` is 0.
#[inline]
pub fn ilog2(x: u32) -> u32 {
    if x == 0 {
        return 0;
    }
    31 - x.leading_zeros()
}

/// Number of grid cells covering `[bmin, bmax]` on the XZ plane at cell size `cs`.
///
/// Rounds to the nearest cell, matching the classic Recast grid sizing.
pub fn calc_grid_size(bmin: [f32; 3], bmax: [f32; 3], cs: f32) -> (i32, i32) {
    let w = ((bmax[0] - bmin[0]) / cs + 0.5) as i32;
    let h = ((bmax[2] - bmin[2]) / cs + 0.5) as i32;
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_pow2() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(3), 4);
        assert_eq!(next_pow2(4), 4);
        assert_eq!(next_pow2(1025), 2048);
    }

    #[test]
    fn test_ilog2() {
        assert_eq!(ilog2(0), 0);
        assert_eq!(ilog2(1), 0);
        assert_eq!(ilog2(16), 4);
        assert_eq!(ilog2(17), 4);
    }

    #[test]
    fn test_calc_grid_size_rounds_to_nearest() {
        let (w, h) = calc_grid_size([0.0, 0.0, 0.0], [10.0, 1.0, 4.9], 0.3);
        assert_eq!(w, 33);
        assert_eq!(h, 16);
    }
}
