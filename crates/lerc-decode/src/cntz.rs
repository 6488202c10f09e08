//! Decoding of the legacy `CntZImage` container
//!
//! A band consists of a header, an optional mask section (only stored with the first band of a blob)
//! and the pixel section. The pixel section divides the raster in a grid of blocks, every block starts
//! with a header byte selecting its encoding:
//! - 0: raw float32 value for every valid pixel
//! - 1: bit-stuffed quantized values relative to an offset
//! - 2: all valid pixels are 0
//! - 3: all valid pixels equal the offset

use crate::bit_mask::BitMask;
use crate::bit_stuffer::{Quantization, unstuff_legacy};
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::pixel::{DataType, PixelData};
use crate::rle::Rle;

pub const FILE_KEY: &str = "CntZImage";

/// Length of the space padded identifier
pub const FILE_KEY_LEN: usize = 10;

/// Value written to invalid pixels when no explicit no data value is requested
pub const DEFAULT_NO_DATA_VALUE: f64 = -3.4027999387901484e38;

#[derive(Debug, Clone, PartialEq)]
pub struct CntZHeader {
    pub version: i32,
    pub image_type: i32,
    pub height: usize,
    pub width: usize,
    pub max_z_error: f64,
}

impl CntZHeader {
    pub fn read(cursor: &mut Cursor) -> Result<Self> {
        let id = String::from_utf8_lossy(cursor.read_bytes(FILE_KEY_LEN)?).into_owned();
        if id.trim() != FILE_KEY {
            return Err(Error::UnknownIdentifier(id.trim().to_string()));
        }

        let version = cursor.read_i32()?;
        let image_type = cursor.read_i32()?;
        let height = cursor.read_u32()? as usize;
        let width = cursor.read_u32()? as usize;
        let max_z_error = cursor.read_f64()?;

        if width == 0 || height == 0 || width as f64 * height as f64 > i32::MAX as f64 {
            return Err(Error::InvalidHeader(format!("invalid raster size {width}x{height}")));
        }

        Ok(CntZHeader {
            version,
            image_type,
            height,
            width,
            max_z_error,
        })
    }
}

/// Header shared by the mask and the pixel section
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionHeader {
    pub num_blocks_y: u32,
    pub num_blocks_x: u32,
    pub num_bytes: u32,
    pub max_value: f32,
}

impl SectionHeader {
    fn read(cursor: &mut Cursor) -> Result<Self> {
        Ok(SectionHeader {
            num_blocks_y: cursor.read_u32()?,
            num_blocks_x: cursor.read_u32()?,
            num_bytes: cursor.read_u32()?,
            max_value: cursor.read_f32()?,
        })
    }

    fn is_empty(&self) -> bool {
        self.num_bytes == 0 && self.num_blocks_y == 0 && self.num_blocks_x == 0 && self.max_value == 0.0
    }
}

/// Where a band gets its validity mask from
#[derive(Debug, Clone, Copy)]
pub enum MaskSource<'m> {
    /// The band stores its own mask section
    Stored,
    /// The band has no mask section and uses the mask of the first band
    Inherited(Option<&'m BitMask>),
}

#[derive(Debug, Clone)]
pub struct CntZBand {
    pub header: CntZHeader,
    pub mask_section: Option<SectionHeader>,
    pub pixel_section: SectionHeader,
    pub pixels: PixelData,
    /// `None` when every pixel is valid
    pub mask: Option<BitMask>,
    /// Size of the encoded mask stored in this band
    pub mask_byte_count: usize,
    pub min_value: f64,
    pub max_value: f64,
    pub end_offset: usize,
}

/// Decode the band at `offset`
///
/// Invalid pixels are set to `no_data_value`, the values are written as `pixel_type`.
pub fn decode(data: &[u8], offset: usize, mask_source: MaskSource, pixel_type: DataType, no_data_value: f64) -> Result<CntZBand> {
    let mut cursor = Cursor::new(data, offset);
    let header = CntZHeader::read(&mut cursor)?;

    log::debug!(
        "CntZImage v{} band: {}x{} (image type {}, max error {})",
        header.version,
        header.width,
        header.height,
        header.image_type,
        header.max_z_error
    );

    let (mask_section, mask) = match mask_source {
        MaskSource::Stored => {
            let section = SectionHeader::read(&mut cursor)?;
            let mask = if section.num_bytes > 0 {
                let encoded = cursor.read_bytes(section.num_bytes as usize)?;
                Some(Rle::decode_mask(encoded, header.width, header.height)?)
            } else {
                if section.is_empty() {
                    log::debug!("CntZImage band has an empty mask header, all pixels are valid");
                }
                None
            };
            (Some(section), mask)
        }
        MaskSource::Inherited(mask) => (None, mask.cloned()),
    };

    if let Some(mask) = &mask {
        if mask.width() != header.width || mask.height() != header.height {
            return Err(Error::InvalidMask(format!(
                "mask of {}x{} does not match raster of {}x{}",
                mask.width(),
                mask.height(),
                header.width,
                header.height
            )));
        }
    }

    let pixel_section = SectionHeader::read(&mut cursor)?;
    let mut reader = BlockReader {
        cursor,
        header: &header,
        mask: mask.as_ref(),
        quantization: Quantization::new(0.0, header.max_z_error, pixel_section.max_value as f64),
        values: vec![no_data_value; header.width * header.height],
    };
    reader.read_blocks(&pixel_section)?;

    let end_offset = reader.cursor.position();
    let values = reader.values;

    let mut pixels = PixelData::zeroed(pixel_type, values.len());
    for (k, &v) in values.iter().enumerate() {
        pixels.set(k, v);
    }

    let (min_value, max_value) = (0..values.len())
        .filter(|&k| mask.as_ref().is_none_or(|m| m.is_valid(k)))
        .filter_map(|k| pixels.get(k))
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            None => Some((v, v)),
        })
        .unwrap_or((0.0, 0.0));

    Ok(CntZBand {
        header,
        mask_byte_count: mask_section.map_or(0, |s| s.num_bytes as usize),
        mask_section,
        pixel_section,
        pixels,
        mask,
        min_value,
        max_value,
        end_offset,
    })
}

struct BlockReader<'a, 'h> {
    cursor: Cursor<'a>,
    header: &'h CntZHeader,
    mask: Option<&'h BitMask>,
    /// Scale and maximum of the pixel section, the offset is set per block
    quantization: Quantization,
    values: Vec<f64>,
}

/// Sizes of the blocks along one axis: `count` blocks of `size / count` plus a clipped remainder
fn block_sizes(size: usize, count: usize) -> impl Iterator<Item = (usize, usize)> {
    let block = size / count;
    (0..=count)
        .map(move |i| (i * block, if i < count { block } else { size % count }))
        .filter(|&(_, len)| len > 0)
}

impl BlockReader<'_, '_> {
    fn read_blocks(&mut self, section: &SectionHeader) -> Result<()> {
        let (num_y, num_x) = (section.num_blocks_y as usize, section.num_blocks_x as usize);
        if num_y == 0 || num_x == 0 {
            return Err(Error::InvalidHeader(format!("invalid block grid {num_x}x{num_y}")));
        }

        for (row0, rows) in block_sizes(self.header.height, num_y) {
            for (col0, cols) in block_sizes(self.header.width, num_x) {
                self.read_block(row0..row0 + rows, col0..col0 + cols)?;
            }
        }

        Ok(())
    }

    /// Valid pixel indices of the block in row major order
    fn valid_pixels(&self, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> Vec<usize> {
        let width = self.header.width;
        rows.flat_map(|row| cols.clone().map(move |col| row * width + col))
            .filter(|&k| self.mask.is_none_or(|m| m.is_valid(k)))
            .collect()
    }

    fn read_block(&mut self, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> Result<()> {
        let header_byte = self.cursor.read_u8()?;
        let encoding = header_byte & 63;
        if encoding > 3 {
            return Err(Error::InvalidBlockEncoding(encoding));
        }

        let pixels = self.valid_pixels(rows, cols);

        if encoding == 2 {
            for k in pixels {
                self.values[k] = 0.0;
            }
            return Ok(());
        }

        let mut offset = 0.0;
        let mut stuffed = None;
        if header_byte != 0 {
            offset = match header_byte >> 6 {
                2 => self.cursor.read_i8()? as f64,
                1 => self.cursor.read_i16()? as f64,
                0 => self.cursor.read_f32()? as f64,
                t => return Err(Error::InvalidOffsetType(t)),
            };

            if encoding == 1 {
                let bits_byte = self.cursor.read_u8()?;
                let num_bits = (bits_byte & 63) as u32;
                let count = match bits_byte >> 6 {
                    2 => self.cursor.read_u8()? as usize,
                    1 => self.cursor.read_u16()? as usize,
                    0 => self.cursor.read_u32()? as usize,
                    t => return Err(Error::InvalidValidPixelCountType(t)),
                };
                stuffed = Some((num_bits, count));
            }
        }

        match encoding {
            0 => {
                for k in pixels {
                    self.values[k] = self.cursor.read_f32()? as f64;
                }
            }
            1 => {
                let Some((num_bits, count)) = stuffed else {
                    return Err(Error::InvalidData("bit-stuffed block without offset".into()));
                };

                if count != pixels.len() {
                    return Err(Error::BlockMaskMismatch {
                        expected: pixels.len(),
                        decoded: count,
                    });
                }

                let codes = if num_bits == 0 || count == 0 {
                    vec![0; count]
                } else {
                    unstuff_legacy(&mut self.cursor, count, num_bits)?
                };

                let quantization = Quantization { offset, ..self.quantization };
                let value = quantization.saturating();
                for (k, code) in pixels.into_iter().zip(codes) {
                    self.values[k] = value(code);
                }
            }
            _ => {
                for k in pixels {
                    self.values[k] = offset;
                }
            }
        }

        Ok(())
    }
}
