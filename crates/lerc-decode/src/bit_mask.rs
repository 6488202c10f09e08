//! Validity mask with one bit per pixel
//!
//! Bit 7 of byte 0 corresponds to pixel 0, bit 6 to pixel 1, etc.
//! The mask covers `width * height` pixels and is shared by all dimensions of a pixel.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMask {
    bits: Vec<u8>,
    width: usize,
    height: usize,
}

impl BitMask {
    /// Mask with every pixel marked invalid
    pub fn new(width: usize, height: usize) -> Self {
        BitMask {
            bits: vec![0; Self::byte_count(width, height)],
            width,
            height,
        }
    }

    /// Mask with every pixel marked valid
    pub fn all_valid(width: usize, height: usize) -> Self {
        let mut mask = Self::new(width, height);
        mask.bits.fill(0xFF);
        mask
    }

    /// Wrap an already packed bitset, it must hold at least `ceil(width * height / 8)` bytes
    pub fn from_bits(mut bits: Vec<u8>, width: usize, height: usize) -> Result<Self> {
        let size = Self::byte_count(width, height);
        if bits.len() < size {
            return Err(Error::InvalidMask(format!("bitset holds {} bytes, {size} needed", bits.len())));
        }
        bits.truncate(size);
        Ok(BitMask { bits, width, height })
    }

    /// Number of bytes needed to store a mask of the given dimensions
    pub fn byte_count(width: usize, height: usize) -> usize {
        (width * height).div_ceil(8)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    fn bit(k: usize) -> u8 {
        0x80 >> (k & 7)
    }

    #[inline]
    pub fn is_valid(&self, k: usize) -> bool {
        self.bits.get(k >> 3).is_some_and(|&b| b & Self::bit(k) != 0)
    }

    #[inline]
    pub fn set_invalid(&mut self, k: usize) {
        if let Some(b) = self.bits.get_mut(k >> 3) {
            *b &= !Self::bit(k);
        }
    }

    pub fn count_valid(&self) -> usize {
        (0..self.pixel_count()).filter(|&k| self.is_valid(k)).count()
    }

    /// Number of valid pixels in the rectangle `[row0, row1) x [col0, col1)`
    pub fn count_valid_in(&self, row0: usize, row1: usize, col0: usize, col1: usize) -> usize {
        (row0..row1)
            .map(|row| (col0..col1).filter(|&col| self.is_valid(row * self.width + col)).count())
            .sum()
    }

    /// Keep a pixel valid only if it is also valid in `other`
    pub fn intersect(&mut self, other: &BitMask) {
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            *a &= *b;
        }
    }

    /// The packed bitset
    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    /// Expanded mask, one byte per pixel: 1 = valid, 0 = invalid
    pub fn to_bytes(&self) -> Vec<u8> {
        (0..self.pixel_count()).map(|k| self.is_valid(k) as u8).collect()
    }
}
