//! Lerc2 blob decoding (versions 1 to 5)
//!
//! A blob holds a header, the validity mask and the pixel data of `dimensions` values per pixel.
//! The pixel data is stored either as one contiguous sweep of native values, Huffman coded (8-bit types only)
//! or as micro block tiles which are each encoded with their own mode.
//! Values are decoded pixel interleaved and transposed to band sequential order afterwards unless
//! interleaved output was requested.

use crate::bit_mask::BitMask;
use crate::bit_stuffer::{BitStuffer2, Quantization};
use crate::checksum::fletcher32;
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::huffman::HuffmanTable;
use crate::pixel::{DataType, PixelData, PixelValue};
use crate::rle::Rle;

pub const FILE_KEY: &[u8] = b"Lerc2 ";

pub const MAX_SUPPORTED_VERSION: i32 = 5;

/// Bytes covered by the file key, the version and the checksum, the checksum starts right after them
const CHECKSUM_START: usize = 6 + 4 + 4;

const MAX_MICRO_BLOCK_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageEncodeMode {
    Tiling,
    DeltaHuffman,
    Huffman,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderInfo {
    pub version: i32,
    /// 0 for versions without checksum
    pub checksum: u32,
    pub height: usize,
    pub width: usize,
    pub dimensions: usize,
    pub num_valid_pixels: usize,
    pub micro_block_size: usize,
    pub blob_size: usize,
    pub data_type: DataType,
    pub max_z_error: f64,
    pub z_min: f64,
    pub z_max: f64,
}

impl HeaderInfo {
    /// Parse the header at the cursor position, the cursor is left at the start of the mask section
    pub fn read(cursor: &mut Cursor) -> Result<Self> {
        let key = cursor.read_bytes(FILE_KEY.len())?;
        if key != FILE_KEY {
            return Err(Error::UnknownIdentifier(String::from_utf8_lossy(key).into_owned()));
        }

        let version = cursor.read_i32()?;
        if !(1..=MAX_SUPPORTED_VERSION).contains(&version) {
            return Err(Error::UnsupportedVersion(version));
        }

        let checksum = if version >= 3 { cursor.read_u32()? } else { 0 };

        let height = cursor.read_i32()?;
        let width = cursor.read_i32()?;
        let dimensions = if version >= 4 { cursor.read_i32()? } else { 1 };
        let num_valid_pixels = cursor.read_i32()?;
        let micro_block_size = cursor.read_i32()?;
        let blob_size = cursor.read_i32()?;
        let data_type = DataType::try_from(cursor.read_i32()?)?;

        let max_z_error = cursor.read_f64()?;
        let z_min = cursor.read_f64()?;
        let z_max = cursor.read_f64()?;

        if height <= 0 || width <= 0 || dimensions <= 0 {
            return Err(Error::InvalidHeader(format!("invalid raster size {width}x{height}x{dimensions}")));
        }

        if width as f64 * height as f64 * dimensions as f64 > i32::MAX as f64 {
            return Err(Error::InvalidHeader(format!("raster of {width}x{height}x{dimensions} is too large")));
        }

        if num_valid_pixels < 0 || num_valid_pixels as i64 > width as i64 * height as i64 {
            return Err(Error::InvalidHeader(format!("invalid valid pixel count {num_valid_pixels}")));
        }

        if micro_block_size <= 0 || blob_size < 0 {
            return Err(Error::InvalidHeader(format!(
                "invalid micro block size {micro_block_size} or blob size {blob_size}"
            )));
        }

        Ok(HeaderInfo {
            version,
            checksum,
            height: height as usize,
            width: width as usize,
            dimensions: dimensions as usize,
            num_valid_pixels: num_valid_pixels as usize,
            micro_block_size: micro_block_size as usize,
            blob_size: blob_size as usize,
            data_type,
            max_z_error,
            z_min,
            z_max,
        })
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    fn try_huffman(&self) -> bool {
        self.version >= 2 && matches!(self.data_type, DataType::Int8 | DataType::Uint8) && self.max_z_error == 0.5
    }
}

/// Header of the blob at `offset` and the byte count of its encoded mask
pub fn read_info(data: &[u8], offset: usize) -> Result<(HeaderInfo, usize)> {
    let mut cursor = Cursor::new(data, offset);
    let header = HeaderInfo::read(&mut cursor)?;
    let mask_bytes = read_mask_byte_count(&mut cursor)?;
    Ok((header, mask_bytes))
}

fn read_mask_byte_count(cursor: &mut Cursor) -> Result<usize> {
    let num_bytes = cursor.read_i32()?;
    if num_bytes < 0 {
        return Err(Error::InvalidMask(format!("negative mask size {num_bytes}")));
    }
    Ok(num_bytes as usize)
}

/// A single decoded Lerc2 blob
#[derive(Debug, Clone)]
pub struct Lerc2Band {
    pub header: HeaderInfo,
    pub pixels: PixelData,
    /// Mask the band was decoded with, `None` when every pixel is valid
    pub mask: Option<BitMask>,
    /// Size of the encoded mask stored in this blob, 0 when the mask is implied or inherited
    pub mask_byte_count: usize,
    /// Per dimension (min, max), only present for version 4 and up
    pub dim_stats: Option<Vec<(f64, f64)>>,
    /// Offset where decoding stopped, normally the declared end of the blob
    pub end_offset: usize,
}

impl Lerc2Band {
    pub fn blob_end(&self, offset: usize) -> usize {
        offset + self.header.blob_size
    }
}

/// Decode the blob starting at `offset`
///
/// `previous_mask` is used when the blob has invalid pixels but no mask of its own.
pub fn decode(data: &[u8], offset: usize, previous_mask: Option<&BitMask>, pixel_interleaved: bool) -> Result<Lerc2Band> {
    let mut cursor = Cursor::new(data, offset);
    let header = HeaderInfo::read(&mut cursor)?;

    log::debug!(
        "Lerc2 v{} blob: {}x{}x{} {} ({} valid pixels, max error {}, blob size {})",
        header.version,
        header.width,
        header.height,
        header.dimensions,
        header.data_type,
        header.num_valid_pixels,
        header.max_z_error,
        header.blob_size,
    );

    let blob_end = offset + header.blob_size;
    if blob_end > data.len() {
        return Err(Error::UnexpectedEof {
            offset,
            needed: header.blob_size,
        });
    }

    if header.version >= 3 {
        if header.blob_size < CHECKSUM_START {
            return Err(Error::InvalidHeader(format!("blob size {} is too small", header.blob_size)));
        }

        let computed = fletcher32(&data[offset + CHECKSUM_START..blob_end]);
        if computed != header.checksum {
            return Err(Error::ChecksumMismatch {
                stored: header.checksum,
                computed,
            });
        }
    }

    let mask_byte_count = read_mask_byte_count(&mut cursor)?;
    let mask = read_mask(&mut cursor, &header, mask_byte_count, previous_mask)?;

    let mut decoder = BandDecoder {
        cursor,
        header: &header,
        mask: mask.as_ref(),
        z_min_vec: Vec::new(),
        z_max_vec: Vec::new(),
    };

    let mut pixels = match header.data_type {
        DataType::Int8 => i8::into_pixel_data(decoder.decode_values()?),
        DataType::Uint8 => u8::into_pixel_data(decoder.decode_values()?),
        DataType::Int16 => i16::into_pixel_data(decoder.decode_values()?),
        DataType::Uint16 => u16::into_pixel_data(decoder.decode_values()?),
        DataType::Int32 => i32::into_pixel_data(decoder.decode_values()?),
        DataType::Uint32 => u32::into_pixel_data(decoder.decode_values()?),
        DataType::Float32 => f32::into_pixel_data(decoder.decode_values()?),
        DataType::Float64 => f64::into_pixel_data(decoder.decode_values()?),
    };

    let dim_stats = decoder.dim_stats();
    let end_offset = decoder.cursor.position();

    if !pixel_interleaved {
        pixels.transpose(header.pixel_count(), header.dimensions, false);
    }

    Ok(Lerc2Band {
        header,
        pixels,
        mask,
        mask_byte_count,
        dim_stats,
        end_offset,
    })
}

fn read_mask(cursor: &mut Cursor, header: &HeaderInfo, num_bytes: usize, previous_mask: Option<&BitMask>) -> Result<Option<BitMask>> {
    let (width, height) = (header.width, header.height);
    let num_valid = header.num_valid_pixels;

    if num_valid == 0 || num_valid == header.pixel_count() {
        if num_bytes != 0 {
            return Err(Error::InvalidMask(format!(
                "{num_bytes} mask bytes stored for {num_valid} valid pixels"
            )));
        }

        return Ok(if num_valid == 0 { Some(BitMask::new(width, height)) } else { None });
    }

    if num_bytes > 0 {
        return Rle::decode_mask(cursor.read_bytes(num_bytes)?, width, height).map(Some);
    }

    match previous_mask {
        Some(mask) if mask.width() == width && mask.height() == height => {
            log::debug!("Lerc2 blob reuses the mask of the previous band");
            Ok(Some(mask.clone()))
        }
        Some(mask) => Err(Error::InvalidMask(format!(
            "previous mask of {}x{} does not match raster of {width}x{height}",
            mask.width(),
            mask.height()
        ))),
        None => Err(Error::InvalidMask("no mask stored and no previous mask to reuse".into())),
    }
}

/// Reduced type of the offset stored in front of a tile's data
fn get_data_type_used(dt: DataType, reduced_type_code: u8) -> Result<DataType> {
    let tc = reduced_type_code as i32;
    let code = match dt {
        DataType::Int16 | DataType::Int32 => dt.code() - tc,
        DataType::Uint16 | DataType::Uint32 => dt.code() - 2 * tc,
        DataType::Float32 => match tc {
            0 => return Ok(DataType::Float32),
            1 => return Ok(DataType::Int16),
            _ => return Ok(DataType::Uint8),
        },
        DataType::Float64 if tc == 0 => dt.code(),
        DataType::Float64 => dt.code() - 2 * tc + 1,
        DataType::Int8 | DataType::Uint8 => dt.code(),
    };

    DataType::from_code(code).ok_or(Error::InvalidOffsetType(reduced_type_code))
}

struct BandDecoder<'a, 'h> {
    cursor: Cursor<'a>,
    header: &'h HeaderInfo,
    mask: Option<&'h BitMask>,
    z_min_vec: Vec<f64>,
    z_max_vec: Vec<f64>,
}

impl BandDecoder<'_, '_> {
    #[inline]
    fn is_valid(&self, k: usize) -> bool {
        self.mask.is_none_or(|mask| mask.is_valid(k))
    }

    fn dim_stats(&self) -> Option<Vec<(f64, f64)>> {
        if self.header.version < 4 {
            return None;
        }

        if self.z_min_vec.len() == self.header.dimensions {
            Some(self.z_min_vec.iter().copied().zip(self.z_max_vec.iter().copied()).collect())
        } else {
            Some(vec![(self.header.z_min, self.header.z_max); self.header.dimensions])
        }
    }

    fn decode_values<T: PixelValue>(&mut self) -> Result<Vec<T>> {
        let header = self.header;
        let mut output = vec![T::default(); header.pixel_count() * header.dimensions];

        if header.num_valid_pixels == 0 {
            return Ok(output);
        }

        if header.z_min == header.z_max {
            self.fill_const_image(&mut output, &vec![header.z_min; header.dimensions]);
            return Ok(output);
        }

        if header.version >= 4 {
            self.read_min_max_ranges()?;
            if self.z_min_vec.iter().zip(&self.z_max_vec).all(|(min, max)| min == max) {
                let values = self.z_min_vec.clone();
                self.fill_const_image(&mut output, &values);
                return Ok(output);
            }
        }

        let read_data_one_sweep = self.cursor.read_u8()? != 0;
        if read_data_one_sweep {
            self.read_data_one_sweep(&mut output)?;
            return Ok(output);
        }

        let mode = if header.try_huffman() {
            match self.cursor.read_u8()? {
                0 => ImageEncodeMode::Tiling,
                1 => ImageEncodeMode::DeltaHuffman,
                2 if header.version >= 4 => ImageEncodeMode::Huffman,
                flag => return Err(Error::InvalidData(format!("invalid image encode mode {flag}"))),
            }
        } else {
            ImageEncodeMode::Tiling
        };

        match mode {
            ImageEncodeMode::Tiling => self.read_tiles(&mut output)?,
            ImageEncodeMode::DeltaHuffman | ImageEncodeMode::Huffman => self.decode_huffman(&mut output, mode)?,
        }

        Ok(output)
    }

    fn read_min_max_ranges(&mut self) -> Result<()> {
        let dims = self.header.dimensions;
        let dt = self.header.data_type;

        self.z_min_vec = (0..dims).map(|_| dt.read_as_f64(&mut self.cursor)).collect::<Result<_>>()?;
        self.z_max_vec = (0..dims).map(|_| dt.read_as_f64(&mut self.cursor)).collect::<Result<_>>()?;
        Ok(())
    }

    /// Every valid pixel gets `values[dim]` in each dimension
    fn fill_const_image<T: PixelValue>(&self, output: &mut [T], values: &[f64]) {
        let dims = self.header.dimensions;
        let values: Vec<T> = values.iter().map(|&v| T::from_f64(v)).collect();

        for k in 0..self.header.pixel_count() {
            if self.is_valid(k) {
                output[k * dims..(k + 1) * dims].copy_from_slice(&values);
            }
        }
    }

    fn read_data_one_sweep<T: PixelValue>(&mut self, output: &mut [T]) -> Result<()> {
        let dims = self.header.dimensions;
        for k in 0..self.header.pixel_count() {
            if self.is_valid(k) {
                for value in &mut output[k * dims..(k + 1) * dims] {
                    *value = T::read(&mut self.cursor)?;
                }
            }
        }

        Ok(())
    }

    fn read_tiles<T: PixelValue>(&mut self, output: &mut [T]) -> Result<()> {
        let mb_size = self.header.micro_block_size;
        if mb_size > MAX_MICRO_BLOCK_SIZE {
            return Err(Error::InvalidData(format!("micro block size {mb_size} exceeds {MAX_MICRO_BLOCK_SIZE}")));
        }

        let (height, width) = (self.header.height, self.header.width);
        let bit_stuffer = BitStuffer2::new(self.header.version);

        for i0 in (0..height).step_by(mb_size) {
            let i1 = (i0 + mb_size).min(height);
            for j0 in (0..width).step_by(mb_size) {
                let j1 = (j0 + mb_size).min(width);
                for dim in 0..self.header.dimensions {
                    self.read_tile(output, &bit_stuffer, (i0, i1), (j0, j1), dim)?;
                }
            }
        }

        Ok(())
    }

    fn read_tile<T: PixelValue>(
        &mut self,
        output: &mut [T],
        bit_stuffer: &BitStuffer2,
        (i0, i1): (usize, usize),
        (j0, j1): (usize, usize),
        dim: usize,
    ) -> Result<()> {
        let header = self.header;
        let width = header.width;
        let dims = header.dimensions;

        let flag = self.cursor.read_u8()?;

        let pattern = if header.version >= 5 { 14 } else { 15 };
        if ((flag >> 2) & pattern) as usize != (j0 >> 3) & pattern as usize {
            return Err(Error::Integrity { row: i0, col: j0 });
        }

        let diff = header.version >= 5 && flag & 4 != 0;
        if diff && dim == 0 {
            return Err(Error::InvalidData(format!(
                "tile at row {i0}, column {j0} references a previous dimension in dimension 0"
            )));
        }

        let bits67 = flag >> 6;
        let mode = flag & 3;

        // Index of the pixel value of `dim` for pixel `k`
        let at = |k: usize| k * dims + dim;

        if mode == 2 {
            for i in i0..i1 {
                for k in i * width + j0..i * width + j1 {
                    if self.is_valid(k) {
                        output[at(k)] = if diff { output[at(k) - 1] } else { T::default() };
                    }
                }
            }
            return Ok(());
        }

        if mode == 0 {
            if diff {
                return Err(Error::InvalidData(format!(
                    "raw tile at row {i0}, column {j0} cannot reference a previous dimension"
                )));
            }

            for i in i0..i1 {
                for k in i * width + j0..i * width + j1 {
                    if self.is_valid(k) {
                        output[at(k)] = T::read(&mut self.cursor)?;
                    }
                }
            }
            return Ok(());
        }

        let base_type = if diff && header.data_type.is_integer() { DataType::Int32 } else { header.data_type };
        let offset = get_data_type_used(base_type, bits67)?.read_as_f64(&mut self.cursor)?;

        let z_max = if header.version >= 4 && dims > 1 {
            self.z_max_vec.get(dim).copied().unwrap_or(header.z_max)
        } else {
            header.z_max
        };

        let quantization = Quantization::new(offset, header.max_z_error, z_max);
        let reference = |output: &[T], m: usize| if diff { output[m - 1].to_f64() } else { 0.0 };

        if mode == 3 {
            for i in i0..i1 {
                for k in i * width + j0..i * width + j1 {
                    if self.is_valid(k) {
                        let m = at(k);
                        output[m] = if diff {
                            T::from_f64(quantization.clamped(0, reference(output, m)))
                        } else {
                            T::from_f64(offset)
                        };
                    }
                }
            }
            return Ok(());
        }

        let tile_area = (i1 - i0) * (j1 - j0);
        let codes = bit_stuffer.decode(&mut self.cursor, tile_area)?;

        let all_pixels = codes.len() == tile_area;
        if !all_pixels {
            let expected = self.mask.map_or(tile_area, |mask| mask.count_valid_in(i0, i1, j0, j1));
            if codes.len() != expected {
                return Err(Error::BlockMaskMismatch {
                    expected,
                    decoded: codes.len(),
                });
            }
        }

        let mut code = codes.iter();
        for i in i0..i1 {
            for k in i * width + j0..i * width + j1 {
                if all_pixels || self.is_valid(k) {
                    if let Some(&c) = code.next() {
                        let m = at(k);
                        output[m] = T::from_f64(quantization.clamped(c, reference(output, m)));
                    }
                }
            }
        }

        Ok(())
    }

    fn decode_huffman<T: PixelValue>(&mut self, output: &mut [T], mode: ImageEncodeMode) -> Result<()> {
        let table = HuffmanTable::read(&mut self.cursor, self.header.version)?;

        let bias = if self.header.data_type == DataType::Int8 { 128 } else { 0 };
        let (height, width) = (self.header.height, self.header.width);
        let dims = self.header.dimensions;

        self.cursor.set_bit_position(0);

        if mode == ImageEncodeMode::DeltaHuffman {
            for dim in 0..dims {
                let mut prev = T::default();
                for i in 0..height {
                    for j in 0..width {
                        let k = i * width + j;
                        if !self.is_valid(k) {
                            continue;
                        }

                        let symbol = table.decode_one_value(&mut self.cursor)? as i32;
                        let delta = T::from_f64((symbol - bias) as f64);
                        let m = k * dims + dim;

                        let predictor = if j > 0 && self.is_valid(k - 1) {
                            prev
                        } else if i > 0 && self.is_valid(k - width) {
                            output[m - width * dims]
                        } else {
                            prev
                        };

                        let value = delta.add_wrapping(predictor);
                        output[m] = value;
                        prev = value;
                    }
                }
            }
        } else {
            for k in 0..height * width {
                if self.is_valid(k) {
                    for m in k * dims..(k + 1) * dims {
                        let symbol = table.decode_one_value(&mut self.cursor)? as i32;
                        output[m] = T::from_f64((symbol - bias) as f64);
                    }
                }
            }
        }

        let extra_words = if self.cursor.bit_position() > 0 { 2 } else { 1 };
        self.cursor.set_bit_position(0);
        self.cursor.skip(extra_words * 4)?;

        Ok(())
    }
}
