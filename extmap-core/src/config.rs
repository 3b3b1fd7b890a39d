//! Device geometry used when building maps from raw enumeration output.
//!
//! Extent lists produced by scanning a device are expressed in bytes (or in some
//! fine-grained unit). Maps usually work in "effective blocks", so every coordinate is
//! shifted right by `block_size_log2` on its way in.

use crate::{Error, Result};

/// Geometry of the device a map describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapGeometry {
    /// Length of the device, in the same unit as the raw extent lists
    pub device_length: u64,

    /// Right shift applied to raw coordinates and lengths (0 = no shift)
    pub block_size_log2: u32,
}

impl MapGeometry {
    /// Create a geometry for a device of the given length with no shift
    pub fn new(device_length: u64) -> Self {
        Self {
            device_length,
            block_size_log2: 0,
        }
    }

    /// Set the device length
    pub fn with_device_length(mut self, device_length: u64) -> Self {
        self.device_length = device_length;
        self
    }

    /// Set the block size as a power of two
    pub fn with_block_size_log2(mut self, block_size_log2: u32) -> Self {
        self.block_size_log2 = block_size_log2;
        self
    }

    /// Block size in raw units, or `None` if the shift is out of range
    pub fn block_size(&self) -> Option<u64> {
        1u64.checked_shl(self.block_size_log2)
    }

    /// Shift a raw coordinate into block units
    pub fn shift(&self, value: u64) -> u64 {
        value.checked_shr(self.block_size_log2).unwrap_or(0)
    }

    /// Device length in block units
    pub fn device_blocks(&self) -> u64 {
        self.shift(self.device_length)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let block_size = self.block_size().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "block_size_log2 must be less than 64, got {}",
                self.block_size_log2
            ))
        })?;

        if self.device_length % block_size != 0 {
            return Err(Error::InvalidArgument(format!(
                "device_length {} is not a multiple of block size {}",
                self.device_length, block_size
            )));
        }

        Ok(())
    }
}
