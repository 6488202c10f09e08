use thiserror::Error;

/// Errors that can occur while decoding a LERC blob.
///
/// Every error is fatal for the decode call that produced it, there is no partial result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Unexpected file identifier string: {0:?}")]
    UnknownIdentifier(String),
    #[error("Unsupported Lerc2 version: 2.{0}")]
    UnsupportedVersion(i32),
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(i32),
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("Checksum failed (stored {stored:#010x}, computed {computed:#010x})")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("Invalid mask: {0}")]
    InvalidMask(String),
    #[error("Unexpected end of mask RLE encoding")]
    MaskRle,
    #[error("Invalid block encoding ({0})")]
    InvalidBlockEncoding(u8),
    #[error("Invalid block offset type ({0})")]
    InvalidOffsetType(u8),
    #[error("Invalid valid pixel count type ({0})")]
    InvalidValidPixelCountType(u8),
    #[error("Tile integrity issue at row {row}, column {col}")]
    Integrity { row: usize, col: usize },
    #[error("Block and Mask do not match (expected {expected} values, decoded {decoded})")]
    BlockMaskMismatch { expected: usize, decoded: usize },
    #[error("Bit stuffer error: {0}")]
    BitStuffer(String),
    #[error("Huffman decoding error: {0}")]
    Huffman(String),
    #[error("Invalid LERC data: {0}")]
    InvalidData(String),
    #[error("Unexpected end of data: {needed} bytes needed at offset {offset}")]
    UnexpectedEof { offset: usize, needed: usize },
}

pub type Result<T = ()> = std::result::Result<T, Error>;
