#![allow(dead_code)]

//! Blob writers used by the integration tests

use lerc_decode::DataType;
use lerc_decode::checksum::fletcher32;

/// Pack codes from the low bits up, as Lerc2 version 3 and later store them
pub fn pack(codes: &[u32], num_bits: u32) -> Vec<u8> {
    let total_bits = codes.len() * num_bits as usize;
    let mut words = vec![0u32; total_bits.div_ceil(32) + 1];
    let mut bit_pos = 0usize;
    for &code in codes {
        let wide = (code as u64) << (bit_pos & 31);
        words[bit_pos >> 5] |= wide as u32;
        words[(bit_pos >> 5) + 1] |= (wide >> 32) as u32;
        bit_pos += num_bits as usize;
    }
    let mut bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    bytes.truncate(total_bits.div_ceil(8));
    bytes
}

/// Pack codes from the high bits down, with the unused bytes of the last word dropped
pub fn pack_legacy(codes: &[u32], num_bits: u32) -> Vec<u8> {
    let total_bits = codes.len() * num_bits as usize;
    let num_words = total_bits.div_ceil(32);
    let mut words = vec![0u32; num_words + 1];
    let mut bit_pos = 0usize;
    for &code in codes {
        let wide = ((code as u64) << (64 - num_bits as usize)) >> (bit_pos & 31);
        words[bit_pos >> 5] |= (wide >> 32) as u32;
        words[(bit_pos >> 5) + 1] |= wide as u32;
        bit_pos += num_bits as usize;
    }
    words.truncate(num_words);

    let num_bytes = total_bits.div_ceil(8);
    let tail = num_words * 4 - num_bytes;
    if let Some(last) = words.last_mut() {
        *last >>= 8 * tail;
    }
    let mut bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    bytes.truncate(num_bytes);
    bytes
}

/// Bit-stuffed array as stored in a tile: header byte, 1 byte count, packed codes
pub fn stuffed_block(codes: &[u32], num_bits: u32, version: i32) -> Vec<u8> {
    assert!(codes.len() < 256 && num_bits < 32);
    let mut out = vec![0b1000_0000 | num_bits as u8, codes.len() as u8];
    if num_bits > 0 {
        if version >= 3 {
            out.extend(pack(codes, num_bits));
        } else {
            out.extend(pack_legacy(codes, num_bits));
        }
    }
    out
}

/// Mask encoded as a single literal RLE run, `valid` holds one flag per pixel
pub fn rle_mask(valid: &[bool]) -> Vec<u8> {
    let mut bits = vec![0u8; valid.len().div_ceil(8)];
    for (k, _) in valid.iter().enumerate().filter(|(_, v)| **v) {
        bits[k >> 3] |= 0x80 >> (k & 7);
    }

    let mut out = (bits.len() as i16).to_le_bytes().to_vec();
    out.extend(&bits);
    out.extend(i16::MIN.to_le_bytes());
    out
}

/// Bits written most significant first into little endian words, as Huffman codes are stored
#[derive(Default)]
pub struct MsbWriter {
    words: Vec<u32>,
    bit_pos: u32,
}

impl MsbWriter {
    pub fn push(&mut self, bits: u32, len: u32) {
        for j in (0..len).rev() {
            if self.bit_pos == 0 {
                self.words.push(0);
            }
            if let Some(word) = self.words.last_mut() {
                *word |= ((bits >> j) & 1) << (31 - self.bit_pos);
            }
            self.bit_pos = (self.bit_pos + 1) % 32;
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

/// Huffman code table for symbols `i0..i0 + codes.len()` (wrapping at `size`), codes are (length, bits)
pub fn huffman_table(size: i32, i0: i32, codes: &[(u32, u32)], version: i32) -> Vec<u8> {
    let i1 = i0 + codes.len() as i32;
    let mut out = Vec::new();
    for v in [2, size, i0, i1] {
        out.extend(v.to_le_bytes());
    }

    let lengths: Vec<u32> = codes.iter().map(|c| c.0).collect();
    out.extend(stuffed_block(&lengths, 5, version));

    let mut writer = MsbWriter::default();
    for &(len, bits) in codes.iter().filter(|c| c.0 > 0) {
        writer.push(bits, len);
    }
    out.extend(writer.finish());
    out
}

/// Huffman coded symbol stream followed by the padding word the decoder skips
pub fn huffman_stream(codes: &[(u32, u32)]) -> Vec<u8> {
    let mut writer = MsbWriter::default();
    for &(len, bits) in codes {
        writer.push(bits, len);
    }
    let mut out = writer.finish();
    out.extend([0; 4]);
    out
}

/// Lerc2 blob writer, `body` is appended after the mask section and the header fields are patched on build
#[derive(Clone)]
pub struct Lerc2Blob {
    pub version: i32,
    pub width: i32,
    pub height: i32,
    pub dimensions: i32,
    pub num_valid: i32,
    pub micro_block_size: i32,
    pub data_type: DataType,
    pub max_z_error: f64,
    pub z_min: f64,
    pub z_max: f64,
    pub mask: Vec<u8>,
    pub body: Vec<u8>,
}

impl Lerc2Blob {
    pub fn new(version: i32, width: i32, height: i32, data_type: DataType) -> Self {
        Lerc2Blob {
            version,
            width,
            height,
            dimensions: 1,
            num_valid: width * height,
            micro_block_size: 8,
            data_type,
            max_z_error: 0.0,
            z_min: 0.0,
            z_max: 0.0,
            mask: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_range(mut self, max_z_error: f64, z_min: f64, z_max: f64) -> Self {
        self.max_z_error = max_z_error;
        self.z_min = z_min;
        self.z_max = z_max;
        self
    }

    pub fn with_mask(mut self, valid: &[bool]) -> Self {
        self.num_valid = valid.iter().filter(|v| **v).count() as i32;
        self.mask = rle_mask(valid);
        self
    }

    /// Invalid pixels without a stored mask, the decoder has to reuse the previous one
    pub fn with_inherited_mask(mut self, num_valid: i32) -> Self {
        self.num_valid = num_valid;
        self.mask.clear();
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = b"Lerc2 ".to_vec();
        out.extend(self.version.to_le_bytes());
        if self.version >= 3 {
            out.extend(0u32.to_le_bytes());
        }
        out.extend(self.height.to_le_bytes());
        out.extend(self.width.to_le_bytes());
        if self.version >= 4 {
            out.extend(self.dimensions.to_le_bytes());
        }
        out.extend(self.num_valid.to_le_bytes());
        out.extend(self.micro_block_size.to_le_bytes());
        let blob_size_pos = out.len();
        out.extend(0i32.to_le_bytes());
        out.extend(self.data_type.code().to_le_bytes());
        for v in [self.max_z_error, self.z_min, self.z_max] {
            out.extend(v.to_le_bytes());
        }
        out.extend((self.mask.len() as i32).to_le_bytes());
        out.extend(&self.mask);
        out.extend(&self.body);

        let blob_size = out.len() as i32;
        out[blob_size_pos..blob_size_pos + 4].copy_from_slice(&blob_size.to_le_bytes());
        if self.version >= 3 {
            let checksum = fletcher32(&out[14..]);
            out[10..14].copy_from_slice(&checksum.to_le_bytes());
        }
        out
    }
}

/// Tile header byte with the integrity tag of column `j0`
pub fn tile_flag(version: i32, j0: usize, mode: u8, diff: bool, offset_type: u8) -> u8 {
    let pattern = if version >= 5 { 14 } else { 15 };
    let tag = (((j0 >> 3) & pattern) as u8) << 2;
    let diff_bit = if diff { 4 } else { 0 };
    mode | tag | diff_bit | (offset_type << 6)
}

pub fn cntz_header(width: u32, height: u32, max_z_error: f64) -> Vec<u8> {
    let mut out = b"CntZImage ".to_vec();
    out.extend(11i32.to_le_bytes());
    out.extend(8i32.to_le_bytes());
    out.extend(height.to_le_bytes());
    out.extend(width.to_le_bytes());
    out.extend(max_z_error.to_le_bytes());
    out
}

pub fn cntz_section(num_y: u32, num_x: u32, num_bytes: u32, max_value: f32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(num_y.to_le_bytes());
    out.extend(num_x.to_le_bytes());
    out.extend(num_bytes.to_le_bytes());
    out.extend(max_value.to_le_bytes());
    out
}

/// CntZImage band whose pixel section is a single block of constant `value`
pub fn cntz_constant_band(width: u32, height: u32, mask: Option<&[bool]>, value: f32, with_mask_section: bool) -> Vec<u8> {
    let mut out = cntz_header(width, height, 0.0);
    if with_mask_section {
        match mask {
            Some(valid) => {
                let encoded = rle_mask(valid);
                out.extend(cntz_section(1, 1, encoded.len() as u32, 1.0));
                out.extend(encoded);
            }
            None => out.extend(cntz_section(0, 0, 0, 0.0)),
        }
    }
    out.extend(cntz_section(1, 1, 5, value));
    out.push(0x03);
    out.extend(value.to_le_bytes());
    out
}
