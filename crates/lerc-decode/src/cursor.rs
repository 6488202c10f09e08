//! Read position inside a LERC blob
//!
//! A [`Cursor`] borrows the input buffer and tracks the byte offset of the next read, plus the bit offset
//! inside the current 32-bit word for the bit-level Huffman reader. One cursor lives for exactly one decode call.

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    bit_pos: u32,
}

macro_rules! read_le {
    ($fn_name:ident, $t:ty) => {
        #[inline]
        pub fn $fn_name(&mut self) -> Result<$t> {
            let bytes = self.read_array::<{ std::mem::size_of::<$t>() }>()?;
            Ok(<$t>::from_le_bytes(bytes))
        }
    };
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Cursor { data, pos, bit_pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Bit offset inside the 32-bit word starting at the current position
    pub fn bit_position(&self) -> u32 {
        self.bit_pos
    }

    pub fn set_bit_position(&mut self, bit_pos: u32) {
        self.bit_pos = bit_pos;
    }

    #[inline]
    fn ensure(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(Error::UnexpectedEof {
                offset: self.pos,
                needed,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.ensure(count)?;
        self.pos += count;
        Ok(())
    }

    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.ensure(count)?;
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    #[inline]
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.read_bytes(N)?);
        Ok(arr)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let val = self.data[self.pos];
        self.pos += 1;
        Ok(val)
    }

    read_le!(read_i8, i8);
    read_le!(read_i16, i16);
    read_le!(read_u16, u16);
    read_le!(read_i32, i32);
    read_le!(read_u32, u32);
    read_le!(read_f32, f32);
    read_le!(read_f64, f64);

    /// Little endian 32-bit word `index` words past the current position, without moving the cursor
    #[inline]
    pub fn peek_word(&self, index: usize) -> Result<u32> {
        let start = self.pos + index * 4;
        match self.data.get(start..start + 4) {
            Some(bytes) => Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            None => Err(Error::UnexpectedEof {
                offset: start,
                needed: 4,
            }),
        }
    }

    /// Advance the bit offset by `bits`, moving to the next word when the current one is exhausted
    #[inline]
    pub fn advance_bits(&mut self, bits: u32) {
        self.bit_pos += bits;
        while self.bit_pos >= 32 {
            self.bit_pos -= 32;
            self.pos += 4;
        }
    }
}
