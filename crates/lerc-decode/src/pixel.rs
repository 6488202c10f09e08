//! Pixel element types and the typed pixel buffer returned by the decoder

use crate::cursor::Cursor;
use crate::error::{Error, Result};

/// Element types of a LERC image, numbered as in the Lerc2 header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum DataType {
    Int8 = 0,
    Uint8 = 1,
    Int16 = 2,
    Uint16 = 3,
    Int32 = 4,
    Uint32 = 5,
    Float32 = 6,
    Float64 = 7,
}

impl DataType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(DataType::Int8),
            1 => Some(DataType::Uint8),
            2 => Some(DataType::Int16),
            3 => Some(DataType::Uint16),
            4 => Some(DataType::Int32),
            5 => Some(DataType::Uint32),
            6 => Some(DataType::Float32),
            7 => Some(DataType::Float64),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Size of one element in bytes
    pub fn size(self) -> usize {
        match self {
            DataType::Int8 | DataType::Uint8 => 1,
            DataType::Int16 | DataType::Uint16 => 2,
            DataType::Int32 | DataType::Uint32 | DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        self < DataType::Float32
    }

    /// Whether `value` can be stored in this type without leaving its range
    pub fn can_represent(self, value: f64) -> bool {
        let (lo, hi) = match self {
            DataType::Int8 => (i8::MIN as f64, i8::MAX as f64),
            DataType::Uint8 => (u8::MIN as f64, u8::MAX as f64),
            DataType::Int16 => (i16::MIN as f64, i16::MAX as f64),
            DataType::Uint16 => (u16::MIN as f64, u16::MAX as f64),
            DataType::Int32 => (i32::MIN as f64, i32::MAX as f64),
            DataType::Uint32 => (u32::MIN as f64, u32::MAX as f64),
            DataType::Float32 => (f32::MIN as f64, f32::MAX as f64),
            DataType::Float64 => return true,
        };

        (value.is_nan() && !self.is_integer()) || (value >= lo && value <= hi)
    }

    /// Read a single value of this type and widen it to f64
    pub fn read_as_f64(self, cursor: &mut Cursor) -> Result<f64> {
        Ok(match self {
            DataType::Int8 => cursor.read_i8()? as f64,
            DataType::Uint8 => cursor.read_u8()? as f64,
            DataType::Int16 => cursor.read_i16()? as f64,
            DataType::Uint16 => cursor.read_u16()? as f64,
            DataType::Int32 => cursor.read_i32()? as f64,
            DataType::Uint32 => cursor.read_u32()? as f64,
            DataType::Float32 => cursor.read_f32()? as f64,
            DataType::Float64 => cursor.read_f64()?,
        })
    }

    pub fn to_str(self) -> &'static str {
        match self {
            DataType::Int8 => "int8",
            DataType::Uint8 => "uint8",
            DataType::Int16 => "int16",
            DataType::Uint16 => "uint16",
            DataType::Int32 => "int32",
            DataType::Uint32 => "uint32",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl TryFrom<i32> for DataType {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        DataType::from_code(code).ok_or(Error::UnsupportedDataType(code))
    }
}

/// Numeric element of a decoded pixel buffer
pub trait PixelValue: Copy + Default + PartialOrd + std::fmt::Debug {
    /// Saturating conversion for integers (`as` semantics)
    fn from_f64(val: f64) -> Self;
    fn to_f64(self) -> f64;
    /// Wrapping addition for integer types, regular addition for floats
    fn add_wrapping(self, other: Self) -> Self;
    fn read(cursor: &mut Cursor) -> Result<Self>;
    fn into_pixel_data(values: Vec<Self>) -> PixelData;
}

macro_rules! impl_pixel_value_int {
    ($($t:ty => $variant:ident),*) => {
        $(
            impl PixelValue for $t {
                #[inline]
                fn from_f64(val: f64) -> Self {
                    val as $t
                }

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn add_wrapping(self, other: Self) -> Self {
                    self.wrapping_add(other)
                }

                #[inline]
                fn read(cursor: &mut Cursor) -> Result<Self> {
                    Ok(<$t>::from_le_bytes(cursor.read_array()?))
                }

                fn into_pixel_data(values: Vec<Self>) -> PixelData {
                    PixelData::$variant(values)
                }
            }
        )*
    };
}

macro_rules! impl_pixel_value_fp {
    ($($t:ty => $variant:ident),*) => {
        $(
            impl PixelValue for $t {
                #[inline]
                fn from_f64(val: f64) -> Self {
                    val as $t
                }

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn add_wrapping(self, other: Self) -> Self {
                    self + other
                }

                #[inline]
                fn read(cursor: &mut Cursor) -> Result<Self> {
                    Ok(<$t>::from_le_bytes(cursor.read_array()?))
                }

                fn into_pixel_data(values: Vec<Self>) -> PixelData {
                    PixelData::$variant(values)
                }
            }
        )*
    };
}

impl_pixel_value_int!(i8 => Int8, u8 => Uint8, i16 => Int16, u16 => Uint16, i32 => Int32, u32 => Uint32);
impl_pixel_value_fp!(f32 => Float32, f64 => Float64);

/// Decoded pixel buffer of one band, `width * height * dimensions` elements
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    Int8(Vec<i8>),
    Uint8(Vec<u8>),
    Int16(Vec<i16>),
    Uint16(Vec<u16>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! for_each_variant {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            PixelData::Int8($v) => $body,
            PixelData::Uint8($v) => $body,
            PixelData::Int16($v) => $body,
            PixelData::Uint16($v) => $body,
            PixelData::Int32($v) => $body,
            PixelData::Uint32($v) => $body,
            PixelData::Float32($v) => $body,
            PixelData::Float64($v) => $body,
        }
    };
}

impl PixelData {
    /// Zero initialized buffer of the given type
    pub fn zeroed(data_type: DataType, len: usize) -> Self {
        match data_type {
            DataType::Int8 => PixelData::Int8(vec![0; len]),
            DataType::Uint8 => PixelData::Uint8(vec![0; len]),
            DataType::Int16 => PixelData::Int16(vec![0; len]),
            DataType::Uint16 => PixelData::Uint16(vec![0; len]),
            DataType::Int32 => PixelData::Int32(vec![0; len]),
            DataType::Uint32 => PixelData::Uint32(vec![0; len]),
            DataType::Float32 => PixelData::Float32(vec![0.0; len]),
            DataType::Float64 => PixelData::Float64(vec![0.0; len]),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            PixelData::Int8(_) => DataType::Int8,
            PixelData::Uint8(_) => DataType::Uint8,
            PixelData::Int16(_) => DataType::Int16,
            PixelData::Uint16(_) => DataType::Uint16,
            PixelData::Int32(_) => DataType::Int32,
            PixelData::Uint32(_) => DataType::Uint32,
            PixelData::Float32(_) => DataType::Float32,
            PixelData::Float64(_) => DataType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        for_each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index` widened to f64
    pub fn get(&self, index: usize) -> Option<f64> {
        for_each_variant!(self, v => v.get(index).map(|&x| x.to_f64()))
    }

    /// Store `value` at `index`, converted with `as` semantics
    pub fn set(&mut self, index: usize, value: f64) {
        for_each_variant!(self, v => {
            if let Some(slot) = v.get_mut(index) {
                *slot = PixelValue::from_f64(value);
            }
        })
    }

    /// Convert the buffer to another element type, values are converted with `as` semantics
    pub fn convert(self, data_type: DataType) -> PixelData {
        if self.data_type() == data_type {
            return self;
        }

        fn cast<S: PixelValue, D: PixelValue>(src: &[S]) -> PixelData {
            D::into_pixel_data(src.iter().map(|&v| D::from_f64(v.to_f64())).collect())
        }

        for_each_variant!(&self, v => match data_type {
            DataType::Int8 => cast::<_, i8>(v),
            DataType::Uint8 => cast::<_, u8>(v),
            DataType::Int16 => cast::<_, i16>(v),
            DataType::Uint16 => cast::<_, u16>(v),
            DataType::Int32 => cast::<_, i32>(v),
            DataType::Uint32 => cast::<_, u32>(v),
            DataType::Float32 => cast::<_, f32>(v),
            DataType::Float64 => cast::<_, f64>(v),
        })
    }

    /// Rearrange a multi-dimensional buffer between pixel interleaved (`[p0d0, p0d1, p1d0, ...]`)
    /// and band sequential (`[p0d0, p1d0, ..., p0d1, ...]`) order.
    pub fn transpose(&mut self, pixel_count: usize, dims: usize, to_interleaved: bool) {
        if dims <= 1 {
            return;
        }

        fn reorder<T: Copy>(src: &mut Vec<T>, pixel_count: usize, dims: usize, to_interleaved: bool) {
            let mut dst = src.clone();
            for k in 0..pixel_count {
                for d in 0..dims {
                    let interleaved = k * dims + d;
                    let sequential = d * pixel_count + k;
                    if to_interleaved {
                        dst[interleaved] = src[sequential];
                    } else {
                        dst[sequential] = src[interleaved];
                    }
                }
            }
            *src = dst;
        }

        for_each_variant!(self, v => reorder(v, pixel_count, dims, to_interleaved))
    }
}
