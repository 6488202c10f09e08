//! Unpacking of bit-stuffed unsigned integer codes
//!
//! Codes of a fixed bit width are packed back to back into little endian 32-bit words.
//! Two packing conventions exist and both must be kept bit exact:
//! - the current convention (Lerc2 version 3 and up) fills every word starting at its least significant bit,
//!   only the bytes that hold code bits are stored.
//! - the legacy convention (CntZImage and Lerc2 versions 1 and 2) fills every word starting at its most
//!   significant bit. The bytes of the last, partially used word are stored without the unused low bytes,
//!   so that word has to be shifted back up after loading.

use crate::cursor::Cursor;
use crate::error::{Error, Result};

/// Packing convention used by a stream, selected by format version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    /// CntZImage and Lerc2 versions 1 and 2
    Legacy,
    /// Lerc2 version 3 and up
    Current,
}

impl BitOrder {
    pub fn for_lerc2_version(version: i32) -> Self {
        if version >= 3 { BitOrder::Current } else { BitOrder::Legacy }
    }
}

fn check_parameters(num_elements: usize, num_bits: u32) -> Result<()> {
    if num_elements == 0 || num_bits == 0 || num_bits >= 32 {
        return Err(Error::BitStuffer(format!(
            "invalid parameters: {num_elements} elements of {num_bits} bits"
        )));
    }
    Ok(())
}

/// Load `bytes` into little endian words, the last word is zero padded
fn load_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect()
}

/// Unpack `num_elements` codes of `num_bits` bits with the current (least significant bit first) convention
pub fn unstuff(cursor: &mut Cursor, num_elements: usize, num_bits: u32) -> Result<Vec<u32>> {
    check_parameters(num_elements, num_bits)?;

    let total_bits = num_elements * num_bits as usize;
    let words = load_words(cursor.read_bytes(total_bits.div_ceil(8))?);
    let mask = (1u64 << num_bits) - 1;

    let mut result = Vec::with_capacity(num_elements);
    let mut bit_pos = 0usize;
    for _ in 0..num_elements {
        let idx = bit_pos >> 5;
        let window = (words[idx] as u64) | ((words.get(idx + 1).copied().unwrap_or(0) as u64) << 32);
        result.push(((window >> (bit_pos & 31)) & mask) as u32);
        bit_pos += num_bits as usize;
    }

    Ok(result)
}

/// Unpack `num_elements` codes of `num_bits` bits with the legacy (most significant bit first) convention
pub fn unstuff_legacy(cursor: &mut Cursor, num_elements: usize, num_bits: u32) -> Result<Vec<u32>> {
    check_parameters(num_elements, num_bits)?;

    let total_bits = num_elements * num_bits as usize;
    let num_bytes = total_bits.div_ceil(8);
    let mut words = load_words(cursor.read_bytes(num_bytes)?);

    let tail_bytes_not_needed = words.len() * 4 - num_bytes;
    if let Some(last) = words.last_mut() {
        *last <<= 8 * tail_bytes_not_needed;
    }

    let mask = (1u64 << num_bits) - 1;
    let mut result = Vec::with_capacity(num_elements);
    let mut bit_pos = 0usize;
    for _ in 0..num_elements {
        let idx = bit_pos >> 5;
        let window = ((words[idx] as u64) << 32) | words.get(idx + 1).copied().unwrap_or(0) as u64;
        let shift = 64 - (bit_pos & 31) - num_bits as usize;
        result.push(((window >> shift) & mask) as u32);
        bit_pos += num_bits as usize;
    }

    Ok(result)
}

/// Unpack with the given convention
pub fn unstuff_with(order: BitOrder, cursor: &mut Cursor, num_elements: usize, num_bits: u32) -> Result<Vec<u32>> {
    match order {
        BitOrder::Legacy => unstuff_legacy(cursor, num_elements, num_bits),
        BitOrder::Current => unstuff(cursor, num_elements, num_bits),
    }
}

/// Read an unsigned count stored in 1, 2 or 4 bytes
pub fn read_count(cursor: &mut Cursor, num_bytes: usize) -> Result<usize> {
    Ok(match num_bytes {
        1 => cursor.read_u8()? as usize,
        2 => cursor.read_u16()? as usize,
        4 => cursor.read_u32()? as usize,
        _ => return Err(Error::BitStuffer(format!("invalid count size of {num_bytes} bytes"))),
    })
}

/// Maps quantized codes back to values: `offset + code * scale`
#[derive(Debug, Clone, Copy)]
pub struct Quantization {
    pub offset: f64,
    pub scale: f64,
    pub max_value: f64,
}

impl Quantization {
    pub fn new(offset: f64, max_z_error: f64, max_value: f64) -> Self {
        Quantization {
            offset,
            scale: 2.0 * max_z_error,
            max_value,
        }
    }

    /// Value relative to `base`, clamped to the maximum
    #[inline]
    pub fn clamped(&self, code: u32, base: f64) -> f64 {
        (self.offset + code as f64 * self.scale + base).min(self.max_value)
    }

    /// CntZImage rule: every code at or above the level that reaches the maximum decodes to the maximum itself
    pub fn saturating(&self) -> impl Fn(u32) -> f64 + '_ {
        let max_code = ((self.max_value - self.offset) / self.scale).ceil();
        move |code| {
            if (code as f64) < max_code {
                self.offset + code as f64 * self.scale
            } else {
                self.max_value
            }
        }
    }
}

/// Decoder for the self describing bit-stuffed arrays of Lerc2 tiles and Huffman tables
///
/// Layout: one header byte (bits 0-4: bits per code, bit 5: lookup table present,
/// bits 6-7: size of the element count), the element count, then either the packed codes or
/// the lookup table size, the packed table without its implicit leading 0, and the packed table indices.
pub struct BitStuffer2 {
    order: BitOrder,
}

impl BitStuffer2 {
    pub fn new(lerc2_version: i32) -> Self {
        BitStuffer2 {
            order: BitOrder::for_lerc2_version(lerc2_version),
        }
    }

    pub fn decode(&self, cursor: &mut Cursor, max_element_count: usize) -> Result<Vec<u32>> {
        let header = cursor.read_u8()?;

        let bits67 = header >> 6;
        let count_bytes = if bits67 == 0 { 4 } else { 3 - bits67 as usize };
        let use_lut = header & (1 << 5) != 0;
        let num_bits = (header & 31) as u32;

        let num_elements = read_count(cursor, count_bytes)?;
        if num_elements > max_element_count {
            return Err(Error::BitStuffer(format!(
                "element count {num_elements} exceeds maximum of {max_element_count}"
            )));
        }

        if !use_lut {
            if num_bits == 0 {
                return Ok(vec![0; num_elements]);
            }
            return unstuff_with(self.order, cursor, num_elements, num_bits);
        }

        if num_bits == 0 {
            return Err(Error::BitStuffer("lookup table with 0 bits per entry".into()));
        }

        let lut_size = cursor.read_u8()? as usize;
        if lut_size < 2 {
            return Err(Error::BitStuffer(format!("invalid lookup table size {lut_size}")));
        }

        let mut lut = Vec::with_capacity(lut_size);
        lut.push(0);
        lut.extend(unstuff_with(self.order, cursor, lut_size - 1, num_bits)?);

        let index_bits = usize::BITS - (lut_size - 1).leading_zeros();
        let indices = unstuff_with(self.order, cursor, num_elements, index_bits)?;
        indices
            .into_iter()
            .map(|idx| {
                lut.get(idx as usize)
                    .copied()
                    .ok_or_else(|| Error::BitStuffer(format!("lookup table index {idx} out of range")))
            })
            .collect()
    }
}
