//! Run-length decoding of the packed validity mask
//!
//! The stream is a sequence of signed 16-bit little endian counts:
//! - positive count: copy that many literal bytes
//! - negative count: repeat the next byte `-count` times
//! - -32768: end of stream
//!
//! The end marker must be the last two bytes of the stream and must be reached exactly when the
//! output is full, anything else is a corrupt mask.

use crate::bit_mask::BitMask;
use crate::cursor::Cursor;
use crate::error::{Error, Result};

const END_OF_STREAM: i16 = i16::MIN;

pub struct Rle;

impl Rle {
    /// Decompress `data` (the complete encoded mask section) into `output`
    pub fn decompress(data: &[u8], output: &mut [u8]) -> Result<()> {
        let mut cursor = Cursor::new(data, 0);
        let mut dst_pos = 0;

        loop {
            let count = cursor.read_i16().map_err(|_| Error::MaskRle)?;
            if count == END_OF_STREAM {
                break;
            }

            let run_len = count.unsigned_abs() as usize;
            let dst = output.get_mut(dst_pos..dst_pos + run_len).ok_or(Error::MaskRle)?;
            if count > 0 {
                dst.copy_from_slice(cursor.read_bytes(run_len).map_err(|_| Error::MaskRle)?);
            } else {
                dst.fill(cursor.read_u8().map_err(|_| Error::MaskRle)?);
            }
            dst_pos += run_len;
        }

        if cursor.remaining() != 0 || dst_pos != output.len() {
            return Err(Error::MaskRle);
        }

        Ok(())
    }

    /// Decode an encoded mask section into a bit mask of the given dimensions
    pub fn decode_mask(data: &[u8], width: usize, height: usize) -> Result<BitMask> {
        let mut bits = vec![0u8; BitMask::byte_count(width, height)];
        Self::decompress(data, &mut bits)?;
        BitMask::from_bits(bits, width, height)
    }
}
