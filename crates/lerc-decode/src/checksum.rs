//! Fletcher-32 checksum as stored in Lerc2 headers (version 3 and up)

/// Number of 16-bit words that can be summed before the 32-bit sums must be reduced
const BLOCK_WORDS: usize = 359;

/// Fletcher-32 over `data`, bytes are combined into big endian 16-bit words.
/// A trailing odd byte is treated as the high byte of a final word.
pub fn fletcher32(data: &[u8]) -> u32 {
    let mut sum1 = 0xffffu32;
    let mut sum2 = 0xffffu32;

    let words = data.chunks_exact(2);
    let tail = words.remainder();

    let mut in_block = 0;
    for word in words {
        sum1 = sum1.wrapping_add(((word[0] as u32) << 8) | word[1] as u32);
        sum2 = sum2.wrapping_add(sum1);

        in_block += 1;
        if in_block == BLOCK_WORDS {
            sum1 = (sum1 & 0xffff) + (sum1 >> 16);
            sum2 = (sum2 & 0xffff) + (sum2 >> 16);
            in_block = 0;
        }
    }

    if in_block > 0 {
        sum1 = (sum1 & 0xffff) + (sum1 >> 16);
        sum2 = (sum2 & 0xffff) + (sum2 >> 16);
    }

    if let [last] = tail {
        sum1 = sum1.wrapping_add((*last as u32) << 8);
        sum2 = sum2.wrapping_add(sum1);
    }

    sum1 = (sum1 & 0xffff) + (sum1 >> 16);
    sum2 = (sum2 & 0xffff) + (sum2 >> 16);

    (sum2 << 16) | sum1
}
