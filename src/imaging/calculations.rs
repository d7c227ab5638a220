//! Pure calculation functions for texture dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Smallest power of two greater than or equal to `n` (`0` maps to `1`).
pub fn next_power_of_two(n: u32) -> u32 {
    n.max(1).next_power_of_two()
}

/// Dimensions after rounding each axis up to a power of two.
pub fn power_of_two_dimensions(width: u32, height: u32) -> (u32, u32) {
    (next_power_of_two(width), next_power_of_two(height))
}

pub fn is_power_of_two(width: u32, height: u32) -> bool {
    width.is_power_of_two() && height.is_power_of_two()
}

/// Dimensions of every mip level below the base, halving each axis (minimum 1)
/// until the level is 1×1.
///
/// # Examples
/// ```
/// # use texforge::imaging::mip_dimensions;
/// assert_eq!(mip_dimensions(4, 2), vec![(2, 1), (1, 1)]);
/// assert!(mip_dimensions(1, 1).is_empty());
/// ```
pub fn mip_dimensions(width: u32, height: u32) -> Vec<(u32, u32)> {
    let mut levels = Vec::new();
    let (mut w, mut h) = (width.max(1), height.max(1));
    while w > 1 || h > 1 {
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        levels.push((w, h));
    }
    levels
}

/// Bytes held in memory by an RGBA8 image of this size.
pub fn rgba_bytes(width: u32, height: u32) -> u64 {
    (width as u64).saturating_mul(height as u64).saturating_mul(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_bytes_saturates() {
        assert_eq!(rgba_bytes(16, 8), 512);
        assert_eq!(rgba_bytes(u32::MAX, u32::MAX), u64::MAX);
    }

    #[test]
    fn next_power_of_two_rounds_up() {
        assert_eq!(next_power_of_two(0), 1);
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(3), 4);
        assert_eq!(next_power_of_two(64), 64);
        assert_eq!(next_power_of_two(130), 256);
    }

    #[test]
    fn power_of_two_dimensions_per_axis() {
        assert_eq!(power_of_two_dimensions(130, 60), (256, 64));
        assert!(is_power_of_two(256, 64));
        assert!(!is_power_of_two(130, 64));
    }

    #[test]
    fn mip_chain_of_square() {
        assert_eq!(
            mip_dimensions(8, 8),
            vec![(4, 4), (2, 2), (1, 1)]
        );
    }

    #[test]
    fn mip_chain_of_rectangle_clamps_short_axis() {
        assert_eq!(
            mip_dimensions(16, 2),
            vec![(8, 1), (4, 1), (2, 1), (1, 1)]
        );
    }

    #[test]
    fn mip_chain_of_npot() {
        assert_eq!(
            mip_dimensions(130, 130).first().copied(),
            Some((65, 65))
        );
        assert_eq!(mip_dimensions(130, 130).last().copied(), Some((1, 1)));
    }

    #[test]
    fn rgba_bytes_is_four_per_pixel() {
        assert_eq!(rgba_bytes(256, 128), 131072);
    }
}
