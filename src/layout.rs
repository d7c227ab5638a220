//! Compressed-size calculation for a base image and its mip chain.
//!
//! For each included level:
//!
//! ```text
//! blocks_x   = ceil(width  / block_width)
//! blocks_y   = ceil(height / block_height)
//! payload    = max(block_min_size, blocks_x * blocks_y * bits_per_block / 8)
//! level_size = round_up(payload, mip_data_padding) + mip_header_size
//! ```
//!
//! The sum is exact for the builtin containers: [`container::assemble`]
//! produces `header_len + compressed_size(..)` bytes, and the scheduler checks
//! that before writing anything.
//!
//! [`container::assemble`]: crate::container::assemble

use crate::imaging::mip_dimensions;
use crate::registry::{Container, Format};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelDims {
    pub width: u32,
    pub height: u32,
}

impl From<(u32, u32)> for LevelDims {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Base level plus zero or more mip levels, largest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipChain {
    pub base: LevelDims,
    pub mips: Vec<LevelDims>,
}

impl MipChain {
    pub fn base_only(width: u32, height: u32) -> Self {
        Self {
            base: (width, height).into(),
            mips: Vec::new(),
        }
    }

    /// Base plus every halving down to 1×1.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            base: (width, height).into(),
            mips: mip_dimensions(width, height)
                .into_iter()
                .map(LevelDims::from)
                .collect(),
        }
    }

    /// The first `levels` levels of the full chain, as recorded in a texture
    /// header. Zero counts as the base alone.
    pub fn with_levels(width: u32, height: u32, levels: u32) -> Self {
        let mut chain = Self::full(width, height);
        chain.mips.truncate(levels.saturating_sub(1) as usize);
        chain
    }

    /// Build from level dimensions, base first. `None` for an empty sequence.
    pub fn from_levels(levels: impl IntoIterator<Item = (u32, u32)>) -> Option<Self> {
        let mut iter = levels.into_iter().map(LevelDims::from);
        let base = iter.next()?;
        Some(Self {
            base,
            mips: iter.collect(),
        })
    }

    pub fn levels(&self) -> impl Iterator<Item = LevelDims> + '_ {
        std::iter::once(self.base).chain(self.mips.iter().copied())
    }

    pub fn len(&self) -> usize {
        1 + self.mips.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Bytes one level occupies inside `container`, header included.
pub fn level_size(level: LevelDims, format: &Format, container: &Container) -> u64 {
    let payload = format.block.level_payload(level.width, level.height);
    let padded = if container.mip_data_padding > 0 {
        payload
            .checked_next_multiple_of(container.mip_data_padding)
            .unwrap_or(u64::MAX)
    } else {
        payload
    };
    padded.saturating_add(container.mip_header_size)
}

/// Total size of the selected levels of `chain` encoded as `format` in
/// `container`, excluding the container's file header.
pub fn compressed_size(
    chain: &MipChain,
    format: &Format,
    container: &Container,
    include_base: bool,
    include_mips: bool,
) -> u64 {
    let base = include_base
        .then(|| level_size(chain.base, format, container))
        .unwrap_or(0);
    let mips = if include_mips {
        chain
            .mips
            .iter()
            .map(|l| level_size(*l, format, container))
            .fold(0, u64::saturating_add)
    } else {
        0
    };
    base.saturating_add(mips)
}
