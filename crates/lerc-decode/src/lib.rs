//! LERC (Limited Error Raster Compression) decoder in pure Rust
//!
//! Decodes both LERC containers: the legacy `CntZImage` format and Lerc2 (versions 1 to 5).
//! A blob can hold several bands, which are decoded in sequence and returned together with
//! the validity mask and the value range of every band.
//!
//! # Example
//! ```no_run
//! use lerc_decode::{DecodeOptions, decode};
//!
//! let blob = std::fs::read("tile.lerc").unwrap();
//! let decoded = decode(&blob, 0, &DecodeOptions::default()).unwrap();
//! println!("{}x{} {} ({} bands)", decoded.width, decoded.height, decoded.pixel_type, decoded.bands.len());
//! ```

pub mod bit_mask;
pub mod bit_stuffer;
pub mod checksum;
pub mod cntz;
pub mod cursor;
pub mod error;
pub mod huffman;
pub mod lerc2;
pub mod pixel;
pub mod rle;

pub use bit_mask::BitMask;
pub use error::{Error, Result};
pub use pixel::{DataType, PixelData, PixelValue};

/// Bands are decoded while more than this number of bytes remain in the buffer
const MIN_REMAINING_BYTES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    CntZImage,
    Lerc2,
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Container::CntZImage => write!(f, "CntZImage"),
            Container::Lerc2 => write!(f, "Lerc2"),
        }
    }
}

/// Identify the container of the blob at `offset`
pub fn detect_container(data: &[u8], offset: usize) -> Result<Container> {
    let id = data.get(offset..).unwrap_or_default();
    let id = &id[..id.len().min(cntz::FILE_KEY_LEN)];
    let id = String::from_utf8_lossy(id);

    if id.trim() == cntz::FILE_KEY {
        Ok(Container::CntZImage)
    } else if id.starts_with("Lerc2") {
        Ok(Container::Lerc2)
    } else {
        Err(Error::UnknownIdentifier(id.trim().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOptions {
    /// Element type of the returned pixels, defaults to float32 for CntZImage and the stored type for Lerc2
    pub pixel_type: Option<DataType>,
    /// Value written to invalid pixels
    pub no_data_value: Option<f64>,
    /// Return the validity mask with one byte per pixel
    pub return_mask: bool,
    /// Return the validity mask as a packed bitset
    pub return_encoded_mask: bool,
    /// Return the parsed headers of every band
    pub return_file_info: bool,
    /// Return multi-dimensional pixels interleaved instead of band sequential
    pub pixel_interleaved: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            pixel_type: None,
            no_data_value: None,
            return_mask: true,
            return_encoded_mask: false,
            return_file_info: false,
            pixel_interleaved: false,
        }
    }
}

impl DecodeOptions {
    pub fn with_pixel_type(mut self, pixel_type: DataType) -> Self {
        self.pixel_type = Some(pixel_type);
        self
    }

    pub fn with_no_data_value(mut self, no_data_value: f64) -> Self {
        self.no_data_value = Some(no_data_value);
        self
    }

    pub fn with_mask(mut self, return_mask: bool) -> Self {
        self.return_mask = return_mask;
        self
    }

    pub fn with_encoded_mask(mut self, return_encoded_mask: bool) -> Self {
        self.return_encoded_mask = return_encoded_mask;
        self
    }

    pub fn with_file_info(mut self, return_file_info: bool) -> Self {
        self.return_file_info = return_file_info;
        self
    }

    pub fn with_pixel_interleaved(mut self, pixel_interleaved: bool) -> Self {
        self.pixel_interleaved = pixel_interleaved;
        self
    }
}

/// Parsed headers of a decoded band
#[derive(Debug, Clone, PartialEq)]
pub enum FileInfo {
    CntZImage {
        header: cntz::CntZHeader,
        mask_section: Option<cntz::SectionHeader>,
        pixel_section: cntz::SectionHeader,
        eof_offset: usize,
    },
    Lerc2 {
        header: lerc2::HeaderInfo,
        mask_byte_count: usize,
        eof_offset: usize,
    },
}

impl FileInfo {
    /// Offset right after the band
    pub fn eof_offset(&self) -> usize {
        match self {
            FileInfo::CntZImage { eof_offset, .. } | FileInfo::Lerc2 { eof_offset, .. } => *eof_offset,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecodedBand {
    /// `width * height * dimensions` values
    pub pixels: PixelData,
    pub min_value: f64,
    pub max_value: f64,
    /// Per dimension (min, max), Lerc2 version 4 and up
    pub dim_stats: Option<Vec<(f64, f64)>>,
    pub file_info: Option<FileInfo>,
}

#[derive(Debug, Clone)]
pub struct DecodeResult {
    pub container: Container,
    pub width: usize,
    pub height: usize,
    pub dimensions: usize,
    pub pixel_type: DataType,
    pub bands: Vec<DecodedBand>,
    /// One byte per pixel, 1 = valid. `None` when all pixels are valid or the mask was not requested.
    pub mask: Option<Vec<u8>>,
    /// Packed validity mask, only when requested
    pub encoded_mask: Option<BitMask>,
    /// Masks of the individual Lerc2 bands when more than one band stores a mask
    pub band_masks: Option<Vec<Vec<u8>>>,
    /// Value written to invalid pixels, if any
    pub no_data_value: Option<f64>,
}

impl DecodeResult {
    /// Pixels of the first band
    pub fn pixels(&self) -> Option<&PixelData> {
        self.bands.first().map(|b| &b.pixels)
    }

    /// Smallest value over all bands
    pub fn min_value(&self) -> Option<f64> {
        self.bands.iter().map(|b| b.min_value).reduce(f64::min)
    }

    /// Largest value over all bands
    pub fn max_value(&self) -> Option<f64> {
        self.bands.iter().map(|b| b.max_value).reduce(f64::max)
    }
}

fn more_bands_follow(data: &[u8], offset: usize) -> bool {
    offset + MIN_REMAINING_BYTES < data.len()
}

fn check_band_size(band: usize, expected: (usize, usize), actual: (usize, usize)) -> Result<()> {
    if expected != actual {
        return Err(Error::InvalidHeader(format!(
            "band {band} is {}x{}, expected {}x{}",
            actual.0, actual.1, expected.0, expected.1
        )));
    }
    Ok(())
}

/// Decode all bands of the blob starting at `offset`
pub fn decode(data: &[u8], offset: usize, options: &DecodeOptions) -> Result<DecodeResult> {
    match detect_container(data, offset)? {
        Container::CntZImage => decode_cntz(data, offset, options),
        Container::Lerc2 => decode_lerc2(data, offset, options),
    }
}

fn decode_cntz(data: &[u8], mut offset: usize, options: &DecodeOptions) -> Result<DecodeResult> {
    let pixel_type = options.pixel_type.unwrap_or(DataType::Float32);
    let no_data_value = options.no_data_value.unwrap_or(cntz::DEFAULT_NO_DATA_VALUE);

    let mut bands = Vec::new();
    let mut size = (0, 0);
    let mut mask: Option<BitMask> = None;

    loop {
        let source = if bands.is_empty() {
            cntz::MaskSource::Stored
        } else {
            cntz::MaskSource::Inherited(mask.as_ref())
        };

        let band = cntz::decode(data, offset, source, pixel_type, no_data_value)?;
        let band_size = (band.header.width, band.header.height);
        if bands.is_empty() {
            size = band_size;
            mask = band.mask.clone();
        } else {
            check_band_size(bands.len(), size, band_size)?;
        }

        log::debug!("Decoded CntZImage band {} ending at offset {}", bands.len(), band.end_offset);

        offset = band.end_offset;
        bands.push(DecodedBand {
            pixels: band.pixels,
            min_value: band.min_value,
            max_value: band.max_value,
            dim_stats: None,
            file_info: options.return_file_info.then(|| FileInfo::CntZImage {
                header: band.header,
                mask_section: band.mask_section,
                pixel_section: band.pixel_section,
                eof_offset: band.end_offset,
            }),
        });

        if !more_bands_follow(data, offset) {
            break;
        }
    }

    Ok(DecodeResult {
        container: Container::CntZImage,
        width: size.0,
        height: size.1,
        dimensions: 1,
        pixel_type,
        bands,
        mask: mask.as_ref().filter(|_| options.return_mask).map(BitMask::to_bytes),
        encoded_mask: mask.filter(|_| options.return_encoded_mask),
        band_masks: None,
        no_data_value: Some(no_data_value),
    })
}

fn decode_lerc2(data: &[u8], mut offset: usize, options: &DecodeOptions) -> Result<DecodeResult> {
    let mut bands: Vec<DecodedBand> = Vec::new();
    let mut first: Option<(usize, usize, usize, DataType)> = None;
    // AND of the masks of all bands, bands without a mask are all valid
    let mut combined_mask: Option<BitMask> = None;
    let mut previous_mask: Option<BitMask> = None;
    let mut stored_masks: Vec<BitMask> = Vec::new();

    loop {
        let band = lerc2::decode(data, offset, previous_mask.as_ref(), options.pixel_interleaved)?;
        let header = &band.header;

        let (width, height, dimensions, pixel_type) = *first.get_or_insert((
            header.width,
            header.height,
            header.dimensions,
            options.pixel_type.unwrap_or(header.data_type),
        ));
        check_band_size(bands.len(), (width, height), (header.width, header.height))?;
        if header.dimensions != dimensions {
            return Err(Error::InvalidHeader(format!(
                "band {} has {} dimensions, expected {dimensions}",
                bands.len(),
                header.dimensions
            )));
        }

        let blob_end = band.blob_end(offset);
        if band.end_offset.abs_diff(blob_end) > 1 {
            log::warn!(
                "Lerc2 band {} ended at offset {}, declared end is {blob_end}",
                bands.len(),
                band.end_offset
            );
        }

        if let Some(mask) = &band.mask {
            match &mut combined_mask {
                Some(combined) => combined.intersect(mask),
                None => combined_mask = Some(mask.clone()),
            }
            if band.mask_byte_count > 0 {
                stored_masks.push(mask.clone());
            }
        }
        previous_mask = Some(band.mask.clone().unwrap_or_else(|| BitMask::all_valid(width, height)));

        log::debug!("Decoded Lerc2 band {} ending at offset {blob_end}", bands.len());

        bands.push(DecodedBand {
            pixels: band.pixels.convert(pixel_type),
            min_value: band.header.z_min,
            max_value: band.header.z_max,
            dim_stats: band.dim_stats,
            file_info: options.return_file_info.then(|| FileInfo::Lerc2 {
                header: band.header.clone(),
                mask_byte_count: band.mask_byte_count,
                eof_offset: blob_end,
            }),
        });

        offset = blob_end;
        if !more_bands_follow(data, offset) {
            break;
        }
    }

    let Some((width, height, dimensions, pixel_type)) = first else {
        return Err(Error::InvalidData("blob without bands".into()));
    };

    let mask = combined_mask;
    let band_masks = (stored_masks.len() > 1).then(|| stored_masks.iter().map(BitMask::to_bytes).collect::<Vec<_>>());

    let no_data_value = match (&mask, options.no_data_value) {
        (Some(mask), Some(value)) if pixel_type.can_represent(value) => {
            for band in &mut bands {
                fill_invalid(&mut band.pixels, mask, dimensions, options.pixel_interleaved, value);
            }
            Some(value)
        }
        _ => None,
    };

    Ok(DecodeResult {
        container: Container::Lerc2,
        width,
        height,
        dimensions,
        pixel_type,
        bands,
        mask: mask.as_ref().filter(|_| options.return_mask).map(BitMask::to_bytes),
        encoded_mask: mask.filter(|_| options.return_encoded_mask),
        band_masks,
        no_data_value,
    })
}

/// Write `value` to every dimension of the invalid pixels
fn fill_invalid(pixels: &mut PixelData, mask: &BitMask, dimensions: usize, interleaved: bool, value: f64) {
    let pixel_count = mask.pixel_count();
    for k in (0..pixel_count).filter(|&k| !mask.is_valid(k)) {
        for dim in 0..dimensions {
            let index = if interleaved { k * dimensions + dim } else { dim * pixel_count + k };
            pixels.set(index, value);
        }
    }
}

/// Summary of a blob, obtained without decoding Lerc2 pixel data
#[derive(Debug, Clone, PartialEq)]
pub struct BlobInfo {
    pub container: Container,
    pub version: i32,
    pub width: usize,
    pub height: usize,
    pub dimensions: usize,
    pub data_type: DataType,
    pub band_count: usize,
    /// Valid pixels of the first band
    pub num_valid_pixels: usize,
    /// Number of bands that store their own mask
    pub mask_count: usize,
    pub z_min: f64,
    pub z_max: f64,
    pub max_z_error: f64,
    /// Total size of all bands in bytes
    pub blob_size: usize,
}

/// Describe the blob starting at `offset`
///
/// Lerc2 bands are walked by their headers only. CntZImage bands do not declare their size,
/// so they are decoded to find where the next band starts.
pub fn blob_info(data: &[u8], offset: usize) -> Result<BlobInfo> {
    match detect_container(data, offset)? {
        Container::CntZImage => cntz_blob_info(data, offset),
        Container::Lerc2 => lerc2_blob_info(data, offset),
    }
}

fn lerc2_blob_info(data: &[u8], start: usize) -> Result<BlobInfo> {
    let (header, mask_bytes) = lerc2::read_info(data, start)?;
    let mut info = BlobInfo {
        container: Container::Lerc2,
        version: header.version,
        width: header.width,
        height: header.height,
        dimensions: header.dimensions,
        data_type: header.data_type,
        band_count: 1,
        num_valid_pixels: header.num_valid_pixels,
        mask_count: usize::from(mask_bytes > 0),
        z_min: header.z_min,
        z_max: header.z_max,
        max_z_error: header.max_z_error,
        blob_size: header.blob_size,
    };

    let mut offset = start + header.blob_size;
    while more_bands_follow(data, offset) {
        // trailing bytes that are not a band header end the walk
        let Ok((header, mask_bytes)) = lerc2::read_info(data, offset) else {
            break;
        };

        info.band_count += 1;
        info.mask_count += usize::from(mask_bytes > 0);
        info.z_min = info.z_min.min(header.z_min);
        info.z_max = info.z_max.max(header.z_max);
        info.blob_size += header.blob_size;
        offset += header.blob_size;
    }

    Ok(info)
}

fn cntz_blob_info(data: &[u8], start: usize) -> Result<BlobInfo> {
    let decoded = decode_cntz(data, start, &DecodeOptions::default().with_file_info(true).with_mask(false).with_encoded_mask(true))?;

    let (version, max_z_error, mask_count) = match decoded.bands.first().and_then(|b| b.file_info.as_ref()) {
        Some(FileInfo::CntZImage {
            header, mask_section, ..
        }) => (
            header.version,
            header.max_z_error,
            usize::from(mask_section.is_some_and(|s| s.num_bytes > 0)),
        ),
        _ => return Err(Error::InvalidData("blob without bands".into())),
    };

    let end = decoded.bands.last().and_then(|b| b.file_info.as_ref()).map_or(start, FileInfo::eof_offset);

    Ok(BlobInfo {
        container: Container::CntZImage,
        version,
        width: decoded.width,
        height: decoded.height,
        dimensions: 1,
        data_type: DataType::Float32,
        band_count: decoded.bands.len(),
        num_valid_pixels: decoded
            .encoded_mask
            .as_ref()
            .map_or(decoded.width * decoded.height, BitMask::count_valid),
        mask_count,
        z_min: decoded.min_value().unwrap_or(0.0),
        z_max: decoded.max_value().unwrap_or(0.0),
        max_z_error,
        blob_size: end - start,
    })
}
