//! Huffman code table as used by Lerc2 for 8-bit images
//!
//! The table is serialized as the code length and the exact code bits of every symbol in a range,
//! so codes are taken as stored instead of being regenerated from the lengths.
//! Short codes are resolved with a direct lookup table, longer ones by walking a binary trie.

use crate::bit_stuffer::BitStuffer2;
use crate::cursor::Cursor;
use crate::error::{Error, Result};

/// Maximum number of bits resolved by the direct lookup table
const MAX_NUM_BITS_LUT: u32 = 12;

/// Maximum number of symbols in a code table
const MAX_HISTO_SIZE: i32 = 1 << 15;

/// Trie node, children are indices into the node arena
#[derive(Debug, Clone, Default)]
struct TrieNode {
    symbol: Option<u16>,
    children: [Option<u32>; 2],
}

#[derive(Debug, Clone, Copy, Default)]
struct Code {
    len: u32,
    bits: u32,
}

#[derive(Debug, Clone)]
pub struct HuffmanTable {
    /// (code length, symbol) for every `num_bits_lut` bit prefix
    lut: Vec<Option<(u32, u16)>>,
    num_bits_lut: u32,
    /// Leading zero bits shared by all codes longer than the lookup table
    num_bits_to_skip_in_tree: u32,
    trie: Vec<TrieNode>,
}

#[inline]
fn wrap_index(i: i32, size: i32) -> i32 {
    if i < size { i } else { i - size }
}

fn huffman_err(msg: impl Into<String>) -> Error {
    Error::Huffman(msg.into())
}

impl HuffmanTable {
    /// Read a serialized code table and build the decoding structures
    pub fn read(cursor: &mut Cursor, lerc2_version: i32) -> Result<Self> {
        let version = cursor.read_i32()?;
        if version < 2 {
            return Err(huffman_err(format!("unsupported code table version {version}")));
        }

        let size = cursor.read_i32()?;
        let i0 = cursor.read_i32()?;
        let i1 = cursor.read_i32()?;

        if i0 >= i1 || i0 < 0 || size < 0 || size > MAX_HISTO_SIZE {
            return Err(huffman_err(format!("invalid code table range [{i0}, {i1}) of size {size}")));
        }

        if wrap_index(i0, size) >= size || wrap_index(i1 - 1, size) >= size {
            return Err(huffman_err(format!("code table range [{i0}, {i1}) exceeds size {size}")));
        }

        let num_lengths = (i1 - i0) as usize;
        let lengths = BitStuffer2::new(lerc2_version).decode(cursor, num_lengths)?;
        if lengths.len() != num_lengths {
            return Err(huffman_err(format!("expected {num_lengths} code lengths, got {}", lengths.len())));
        }

        let mut codes = vec![Code::default(); size as usize];
        for (i, &len) in (i0..i1).zip(&lengths) {
            if len > 32 {
                return Err(huffman_err(format!("invalid code length {len}")));
            }
            codes[wrap_index(i, size) as usize].len = len;
        }

        Self::read_codes(cursor, &mut codes, i0, i1)?;
        Self::build(&codes, i0, i1)
    }

    /// The code bits are packed most significant bit first into little endian words
    fn read_codes(cursor: &mut Cursor, codes: &mut [Code], i0: i32, i1: i32) -> Result<()> {
        let size = codes.len() as i32;
        cursor.set_bit_position(0);

        for i in i0..i1 {
            let code = &mut codes[wrap_index(i, size) as usize];
            if code.len == 0 {
                continue;
            }

            let bit_pos = cursor.bit_position();
            let mut bits = (cursor.peek_word(0)? << bit_pos) >> (32 - code.len);
            if 32 - bit_pos < code.len {
                bits |= cursor.peek_word(1)? >> (64 - bit_pos - code.len);
            }
            code.bits = bits;
            cursor.advance_bits(code.len);
        }

        if cursor.bit_position() > 0 {
            cursor.set_bit_position(0);
            cursor.skip(4)?;
        }

        Ok(())
    }

    fn build(codes: &[Code], i0: i32, i1: i32) -> Result<Self> {
        let size = codes.len() as i32;
        let used = || (i0..i1).map(|i| wrap_index(i, size) as usize).filter(|&k| codes[k].len > 0);

        let max_len = used().map(|k| codes[k].len).max().unwrap_or(0);
        if max_len == 0 {
            return Err(huffman_err("empty code table"));
        }

        let need_tree = max_len > MAX_NUM_BITS_LUT;
        let num_bits_lut = max_len.min(MAX_NUM_BITS_LUT);

        let mut lut = vec![None; 1 << num_bits_lut];
        let mut min_num_zero_bits = 32;
        for k in used() {
            let Code { len, bits } = codes[k];
            if len <= num_bits_lut {
                let shifted = (bits << (num_bits_lut - len)) as usize;
                for j in 0..(1usize << (num_bits_lut - len)) {
                    lut[shifted | j] = Some((len, k as u16));
                }
            } else {
                let significant_bits = (32 - bits.leading_zeros()).max(1);
                min_num_zero_bits = min_num_zero_bits.min(len - significant_bits);
            }
        }

        let mut table = HuffmanTable {
            lut,
            num_bits_lut,
            num_bits_to_skip_in_tree: if need_tree { min_num_zero_bits } else { 0 },
            trie: Vec::new(),
        };

        if need_tree {
            table.trie.push(TrieNode::default());
            for k in used() {
                let Code { len, bits } = codes[k];
                if len > num_bits_lut {
                    table.insert(bits, len - table.num_bits_to_skip_in_tree, k as u16);
                }
            }
        }

        log::debug!(
            "Huffman table: {} symbols, max code length {max_len}, {} trie nodes",
            used().count(),
            table.trie.len()
        );

        Ok(table)
    }

    fn insert(&mut self, bits: u32, len: u32, symbol: u16) {
        let mut node = 0usize;
        for j in (0..len).rev() {
            let bit = ((bits >> j) & 1) as usize;
            node = match self.trie[node].children[bit] {
                Some(child) => child as usize,
                None => {
                    let child = self.trie.len();
                    self.trie.push(TrieNode::default());
                    self.trie[node].children[bit] = Some(child as u32);
                    child
                }
            };
        }
        self.trie[node].symbol = Some(symbol);
    }

    /// Decode the next symbol at the cursor's word and bit position
    pub fn decode_one_value(&self, cursor: &mut Cursor) -> Result<u16> {
        let bit_pos = cursor.bit_position();
        let mut idx = ((cursor.peek_word(0)? << bit_pos) >> (32 - self.num_bits_lut)) as usize;
        if 32 - bit_pos < self.num_bits_lut {
            idx |= (cursor.peek_word(1)? >> (64 - bit_pos - self.num_bits_lut)) as usize;
        }

        if let Some((len, symbol)) = self.lut[idx] {
            cursor.advance_bits(len);
            return Ok(symbol);
        }

        if self.trie.is_empty() {
            return Err(huffman_err("code not in table"));
        }

        cursor.advance_bits(self.num_bits_to_skip_in_tree);

        let mut node = 0usize;
        loop {
            let bit = ((cursor.peek_word(0)? << cursor.bit_position()) >> 31) as usize;
            cursor.advance_bits(1);

            node = self.trie[node].children[bit].ok_or_else(|| huffman_err("code not in table"))? as usize;
            if let Some(symbol) = self.trie[node].symbol {
                return Ok(symbol);
            }
        }
    }
}
