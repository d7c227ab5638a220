//! Compression block geometry.
//!
//! Every texture format encodes pixels in fixed rectangular blocks. A block is
//! described by its pixel footprint, the number of bits it occupies, and the
//! smallest payload a level may have (PVRTC, for example, never stores less
//! than 2×2 blocks even for a 1×1 level).
//!
//! Uncompressed formats are modelled as 1×1 "blocks" so the layout math in
//! [`layout`](crate::layout) needs no special case.

/// Static description of a format's compression block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    /// Block width in pixels.
    pub width: u32,
    /// Block height in pixels.
    pub height: u32,
    /// Encoded size of one block in bits.
    pub bits: u32,
    /// Minimum payload of a single level in bytes.
    pub min_size: u64,
}

impl BlockGeometry {
    pub const fn new(width: u32, height: u32, bits: u32, min_size: u64) -> Self {
        Self {
            width,
            height,
            bits,
            min_size,
        }
    }

    /// Number of blocks covering a `width × height` level, per axis.
    pub fn blocks(&self, width: u32, height: u32) -> (u64, u64) {
        (
            width.div_ceil(self.width) as u64,
            height.div_ceil(self.height) as u64,
        )
    }

    /// Encoded payload of one level, before container headers and padding.
    /// Saturates rather than overflowing on absurd dimensions.
    pub fn level_payload(&self, width: u32, height: u32) -> u64 {
        let (bx, by) = self.blocks(width, height);
        (bx.saturating_mul(by).saturating_mul(self.bits as u64) / 8).max(self.min_size)
    }
}

/// BC1 / DXT1 and DXT1 with 1-bit alpha.
pub const BLOCK_BC1: BlockGeometry = BlockGeometry::new(4, 4, 64, 8);
/// BC2 / BC3 (DXT3, DXT5).
pub const BLOCK_BC2_BC3: BlockGeometry = BlockGeometry::new(4, 4, 128, 16);
/// ETC1 and ETC2 RGB / RGB with punch-through alpha.
pub const BLOCK_ETC_RGB: BlockGeometry = BlockGeometry::new(4, 4, 64, 8);
/// ETC2 RGBA (EAC alpha block + colour block).
pub const BLOCK_ETC_RGBA: BlockGeometry = BlockGeometry::new(4, 4, 128, 16);
/// PVRTC 4 bits per pixel. Levels never shrink below 2×2 blocks.
pub const BLOCK_PVRTC_4BPP: BlockGeometry = BlockGeometry::new(4, 4, 64, 32);
/// PVRTC 2 bits per pixel. Levels never shrink below 2×2 blocks.
pub const BLOCK_PVRTC_2BPP: BlockGeometry = BlockGeometry::new(8, 4, 64, 32);
/// 32-bit uncompressed pixels.
pub const BLOCK_BGRA: BlockGeometry = BlockGeometry::new(1, 1, 32, 4);
/// 24-bit uncompressed pixels.
pub const BLOCK_BGR: BlockGeometry = BlockGeometry::new(1, 1, 24, 3);
