mod common;

use approx::assert_relative_eq;
use common::{Lerc2Blob, huffman_stream, huffman_table, stuffed_block, tile_flag};
use lerc_decode::checksum::fletcher32;
use lerc_decode::lerc2::{self, read_info};
use lerc_decode::{BitMask, DataType, DecodeOptions, Error, PixelData, decode};
use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng};

const WIDTH: usize = 20;
const HEIGHT: usize = 13;

struct RandomRaster {
    data: Vec<u8>,
    expected: Vec<f32>,
    valid: Vec<bool>,
}

/// Float32 raster with a random mask, every tile bit-stuffed with 5 bit codes
fn random_tiled_raster(version: i32, seed: u64) -> RandomRaster {
    let max_z_error = 0.25;
    let mut rng = StdRng::seed_from_u64(seed);
    let valid: Vec<bool> = (0..WIDTH * HEIGHT).map(|_| rng.random_bool(0.8)).collect();
    let mut expected = vec![0.0f32; WIDTH * HEIGHT];

    let mut body = Vec::new();
    if version >= 4 {
        body.extend((-50.0f32).to_le_bytes());
        body.extend(100.0f32.to_le_bytes());
    }
    body.push(0);

    for i0 in (0..HEIGHT).step_by(8) {
        let i1 = (i0 + 8).min(HEIGHT);
        for j0 in (0..WIDTH).step_by(8) {
            let j1 = (j0 + 8).min(WIDTH);
            let pixels: Vec<usize> = (i0..i1)
                .flat_map(|i| (j0..j1).map(move |j| i * WIDTH + j))
                .filter(|&k| valid[k])
                .collect();

            if pixels.is_empty() {
                body.push(tile_flag(version, j0, 2, false, 0));
                continue;
            }

            let offset = rng.random_range(-50i32..50) as f32;
            let codes: Vec<u32> = pixels.iter().map(|_| rng.random_range(0..32)).collect();
            body.push(tile_flag(version, j0, 1, false, 0));
            body.extend(offset.to_le_bytes());
            body.extend(stuffed_block(&codes, 5, version));

            for (&k, &code) in pixels.iter().zip(&codes) {
                expected[k] = offset + code as f32 * 2.0 * max_z_error as f32;
            }
        }
    }

    let data = Lerc2Blob::new(version, WIDTH as i32, HEIGHT as i32, DataType::Float32)
        .with_range(max_z_error, -50.0, 100.0)
        .with_mask(&valid)
        .with_body(body)
        .build();

    RandomRaster { data, expected, valid }
}

#[test_log::test]
fn random_bit_stuffed_tiles() {
    for (version, seed) in [(2, 1), (3, 2), (4, 3), (5, 4)] {
        let raster = random_tiled_raster(version, seed);
        let decoded = decode(&raster.data, 0, &DecodeOptions::default()).unwrap();

        let expected_mask: Vec<u8> = raster.valid.iter().map(|&v| u8::from(v)).collect();
        assert_eq!(decoded.mask.as_ref(), Some(&expected_mask), "version {version}");

        let PixelData::Float32(pixels) = &decoded.bands[0].pixels else {
            panic!("expected float32 pixels");
        };
        for (k, (&value, &expected)) in pixels.iter().zip(&raster.expected).enumerate() {
            if raster.valid[k] {
                assert_relative_eq!(value, expected, epsilon = 1e-6);
            } else {
                assert_eq!(value, 0.0, "invalid pixel {k} of version {version}");
            }
        }
    }
}

#[test_log::test]
fn no_data_in_random_tiles() {
    let raster = random_tiled_raster(3, 99);
    let decoded = decode(&raster.data, 0, &DecodeOptions::default().with_no_data_value(f64::NAN)).unwrap();
    assert!(decoded.no_data_value.is_some_and(f64::is_nan));

    let PixelData::Float32(pixels) = &decoded.bands[0].pixels else {
        panic!("expected float32 pixels");
    };
    for (k, value) in pixels.iter().enumerate() {
        assert_eq!(value.is_nan(), !raster.valid[k], "pixel {k}");
    }
}

#[test_log::test]
fn constant_and_zero_tiles() {
    // tile 0: constant -5 from an int8 offset, tile 1: all zero
    let mut body = vec![0, tile_flag(3, 0, 3, false, 2), (-5i8) as u8];
    body.push(tile_flag(3, 8, 2, false, 0));

    let blob = Lerc2Blob::new(3, 16, 2, DataType::Int16).with_range(0.5, -5.0, 0.0);
    let data = blob.clone().with_body(body).build();

    let decoded = decode(&data, 0, &DecodeOptions::default()).unwrap();
    let row: Vec<i16> = [-5; 8].into_iter().chain([0; 8]).collect();
    assert_eq!(decoded.bands[0].pixels, PixelData::Int16(row.repeat(2)));

    // the second tile carries the tag of column 0
    let body = vec![0, tile_flag(3, 0, 3, false, 2), (-5i8) as u8, tile_flag(3, 0, 2, false, 0)];
    let data = blob.with_body(body).build();
    assert_eq!(
        decode(&data, 0, &DecodeOptions::default()).unwrap_err(),
        Error::Integrity { row: 0, col: 8 }
    );
}

fn multi_dimension_blob() -> Vec<u8> {
    let mut body = vec![1, 10, 100, 4, 40, 250, 1];
    body.extend([1, 10, 100, 2, 20, 200, 3, 30, 150, 4, 40, 250]);

    let mut blob = Lerc2Blob::new(4, 2, 2, DataType::Uint8).with_range(0.5, 1.0, 250.0).with_body(body);
    blob.dimensions = 3;
    blob.build()
}

#[test_log::test]
fn multi_dimension_layouts() {
    let data = multi_dimension_blob();

    let decoded = decode(&data, 0, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.dimensions, 3);
    assert_eq!(
        decoded.bands[0].pixels,
        PixelData::Uint8(vec![1, 2, 3, 4, 10, 20, 30, 40, 100, 200, 150, 250])
    );
    assert_eq!(
        decoded.bands[0].dim_stats,
        Some(vec![(1.0, 4.0), (10.0, 40.0), (100.0, 250.0)])
    );

    let decoded = decode(&data, 0, &DecodeOptions::default().with_pixel_interleaved(true)).unwrap();
    assert_eq!(
        decoded.bands[0].pixels,
        PixelData::Uint8(vec![1, 10, 100, 2, 20, 200, 3, 30, 150, 4, 40, 250])
    );
}

#[test_log::test]
fn multi_dimension_no_data() {
    // ranges (1, 2) and (1, 3), one sweep flag, then the only valid pixel
    let mut body: Vec<u8> = [1u16, 2, 1, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
    body.push(1);
    body.extend([1u16, 3].iter().flat_map(|v| v.to_le_bytes()));

    let mut blob = Lerc2Blob::new(4, 2, 1, DataType::Uint16)
        .with_range(0.0, 1.0, 3.0)
        .with_mask(&[true, false])
        .with_body(body);
    blob.dimensions = 2;
    let data = blob.build();

    let decoded = decode(&data, 0, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.bands[0].pixels, PixelData::Uint16(vec![1, 0, 3, 0]));

    let options = DecodeOptions::default().with_no_data_value(9.0);
    let decoded = decode(&data, 0, &options).unwrap();
    assert_eq!(decoded.bands[0].pixels, PixelData::Uint16(vec![1, 9, 3, 9]));

    let decoded = decode(&data, 0, &options.with_pixel_interleaved(true)).unwrap();
    assert_eq!(decoded.bands[0].pixels, PixelData::Uint16(vec![1, 3, 9, 9]));
}

#[test_log::test]
fn huffman_delta_with_mask() {
    // symbols 1 -> "0", 4 -> "10", 5 -> "11"
    let codes = [(1, 0b0), (0, 0), (0, 0), (2, 0b10), (2, 0b11)];
    let mut body = vec![0, 1];
    body.extend(huffman_table(256, 1, &codes, 3));
    // deltas 5, 4 (left neighbour is invalid, previous value), 1 (pixel above), 1, 1
    body.extend(huffman_stream(&[(2, 0b11), (2, 0b10), (1, 0), (1, 0), (1, 0)]));

    let data = Lerc2Blob::new(3, 3, 2, DataType::Uint8)
        .with_range(0.5, 5.0, 9.0)
        .with_mask(&[true, false, true, true, true, true])
        .with_body(body)
        .build();

    let decoded = decode(&data, 0, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.bands[0].pixels, PixelData::Uint8(vec![5, 0, 9, 6, 7, 8]));
    assert_eq!(decoded.mask, Some(vec![1, 0, 1, 1, 1, 1]));
}

#[test_log::test]
fn huffman_delta_wraps_around() {
    // range [250, 267) of a 256 entry table: symbol 250 -> "0", symbol 10 -> "1"
    let mut codes = vec![(0, 0); 17];
    codes[0] = (1, 0b0);
    codes[16] = (1, 0b1);

    let mut body = vec![0, 1];
    body.extend(huffman_table(256, 250, &codes, 3));
    body.extend(huffman_stream(&[(1, 0), (1, 1)]));

    let data = Lerc2Blob::new(3, 2, 1, DataType::Uint8)
        .with_range(0.5, 4.0, 250.0)
        .with_body(body)
        .build();

    let decoded = decode(&data, 0, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.bands[0].pixels, PixelData::Uint8(vec![250, 4]));
}

#[test_log::test]
fn huffman_int8_with_bias() {
    let mut codes = vec![(0, 0); 131];
    codes[0] = (2, 0b00);
    codes[125] = (2, 0b01);
    codes[128] = (2, 0b10);
    codes[130] = (2, 0b11);

    // int8 ranges -128 and 2, no one sweep, plain Huffman
    let mut body = vec![0x80, 0x02, 0, 2];
    body.extend(huffman_table(256, 0, &codes, 4));
    body.extend(huffman_stream(&[(2, 0b01), (2, 0b10), (2, 0b11), (2, 0b00)]));

    let data = Lerc2Blob::new(4, 2, 2, DataType::Int8)
        .with_range(0.5, -128.0, 2.0)
        .with_body(body)
        .build();

    let decoded = decode(&data, 0, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.bands[0].pixels, PixelData::Int8(vec![-3, 0, 2, -128]));
    assert_eq!(decoded.bands[0].dim_stats, Some(vec![(-128.0, 2.0)]));
}

#[test_log::test]
fn plain_huffman_needs_version_4() {
    let data = Lerc2Blob::new(3, 2, 1, DataType::Uint8)
        .with_range(0.5, 0.0, 9.0)
        .with_body(vec![0, 2])
        .build();

    assert!(matches!(decode(&data, 0, &DecodeOptions::default()), Err(Error::InvalidData(_))));
}

#[test_log::test]
fn no_valid_pixels() {
    let mut blob = Lerc2Blob::new(3, 3, 1, DataType::Float32).with_range(0.0, 0.0, 0.0);
    blob.num_valid = 0;
    let data = blob.build();

    let decoded = decode(&data, 0, &DecodeOptions::default().with_no_data_value(-9999.0)).unwrap();
    assert_eq!(decoded.mask, Some(vec![0, 0, 0]));
    assert_eq!(decoded.bands[0].pixels, PixelData::Float32(vec![-9999.0; 3]));
}

#[test_log::test]
fn header_parsing() {
    let mut blob = Lerc2Blob::new(4, 5, 3, DataType::Uint16).with_range(0.0, 1.0, 1.0);
    blob.dimensions = 2;
    let data = blob.build();

    let (header, mask_bytes) = read_info(&data, 0).unwrap();
    assert_eq!(header.version, 4);
    assert_eq!((header.width, header.height, header.dimensions), (5, 3, 2));
    assert_eq!(header.data_type, DataType::Uint16);
    assert_eq!(header.blob_size, data.len());
    assert_eq!(header.checksum, fletcher32(&data[14..]));
    assert_eq!(mask_bytes, 0);
}

#[test_log::test]
fn unsupported_versions() {
    for version in [0i32, 6] {
        let mut data = Lerc2Blob::new(3, 2, 2, DataType::Uint8).build();
        data[6..10].copy_from_slice(&version.to_le_bytes());
        assert_eq!(read_info(&data, 0).unwrap_err(), Error::UnsupportedVersion(version));
    }
}

#[test_log::test]
fn invalid_data_type() {
    let mut data = Lerc2Blob::new(2, 2, 2, DataType::Uint8).build();
    // version 2 header: key, version, height, width, valid, micro block, blob size, type
    data[30..34].copy_from_slice(&9i32.to_le_bytes());
    assert_eq!(read_info(&data, 0).unwrap_err(), Error::UnsupportedDataType(9));
}

#[test_log::test]
fn one_sweep_int16() {
    let mut body = vec![1];
    for v in [-5i16, 0, 7, 100, 400, 3] {
        body.extend(v.to_le_bytes());
    }
    let data = Lerc2Blob::new(3, 3, 2, DataType::Int16)
        .with_range(0.0, -5.0, 400.0)
        .with_body(body)
        .build();

    let band = lerc2::decode(&data, 0, None, false).unwrap();
    assert_eq!(band.pixels, PixelData::Int16(vec![-5, 0, 7, 100, 400, 3]));
    assert!(band.mask.is_none());
    assert_eq!(band.end_offset, data.len());
    assert!(band.dim_stats.is_none());
}

#[test_log::test]
fn tile_modes_legacy_bit_order() {
    // 8x2 float raster, micro block 4: two tiles per row of tiles
    let mut body = vec![0];

    // tile at column 0: bit-stuffed, float offset 2.0, 8 codes of 3 bits
    body.push(tile_flag(2, 0, 1, false, 0));
    body.extend(2.0f32.to_le_bytes());
    body.extend(stuffed_block(&(0..8).collect::<Vec<_>>(), 3, 2));

    // tile at column 4: constant offset stored as int16 (reduced type 1)
    body.push(tile_flag(2, 4, 3, false, 1));
    body.extend(9i16.to_le_bytes());

    let mut blob = Lerc2Blob::new(2, 8, 2, DataType::Float32)
        .with_range(0.5, 0.0, 20.0)
        .with_body(body);
    blob.micro_block_size = 4;
    let data = blob.build();

    let band = lerc2::decode(&data, 0, None, false).unwrap();
    assert_eq!(
        band.pixels,
        PixelData::Float32(vec![2.0, 3.0, 4.0, 5.0, 9.0, 9.0, 9.0, 9.0, 6.0, 7.0, 8.0, 9.0, 9.0, 9.0, 9.0, 9.0])
    );
}

#[test_log::test]
fn tile_integrity_tag() {
    // 10x1 raster with micro block 8: the second tile starts at column 8 and must carry tag 1
    let blob = Lerc2Blob::new(3, 10, 1, DataType::Uint8).with_range(0.0, 0.0, 255.0);
    let data = blob.clone().with_body(vec![0, 0x02, 0x02]).build();
    assert_eq!(lerc2::decode(&data, 0, None, false).unwrap_err(), Error::Integrity { row: 0, col: 8 });

    let data = blob.with_body(vec![0, 0x02, 0x02 | (1 << 2)]).build();
    let band = lerc2::decode(&data, 0, None, false).unwrap();
    assert_eq!(band.pixels, PixelData::Uint8(vec![0; 10]));
}

#[test_log::test]
fn bit_stuffed_tile_with_mask() {
    // 4x1 raster, pixel 1 invalid, codes of 4 bits after an int16 offset of 10
    let tile = |codes: &[u32]| {
        let mut body = vec![0, tile_flag(3, 0, 1, false, 2)];
        body.extend(10i16.to_le_bytes());
        body.extend(stuffed_block(codes, 4, 3));
        body
    };

    let mut blob = Lerc2Blob::new(3, 4, 1, DataType::Int32)
        .with_range(0.5, 10.0, 22.0)
        .with_mask(&[true, false, true, true]);
    blob.micro_block_size = 4;

    let band = lerc2::decode(&blob.clone().with_body(tile(&[0, 5, 15])).build(), 0, None, false).unwrap();
    // the last code exceeds z_max and is clamped
    assert_eq!(band.pixels, PixelData::Int32(vec![10, 0, 15, 22]));
    assert_eq!(band.mask.as_ref().map(BitMask::to_bytes), Some(vec![1, 0, 1, 1]));
    assert!(band.mask_byte_count > 0);

    // two codes for three valid pixels
    let data = blob.with_body(tile(&[0, 5])).build();
    assert_eq!(
        lerc2::decode(&data, 0, None, false).unwrap_err(),
        Error::BlockMaskMismatch { expected: 3, decoded: 2 }
    );
}

#[test_log::test]
fn cross_band_tiles() {
    // v5, 2x1 raster with 2 dimensions: dimension 1 = dimension 0 + 3 (constant offset)
    let mut body = vec![1, 2, 4, 9];
    body.extend([0, tile_flag(5, 0, 0, false, 0), 1, 2]);
    // int32 base type with reduced type 2 gives int16
    body.push(tile_flag(5, 0, 3, true, 2));
    body.extend(3i16.to_le_bytes());

    let mut blob = Lerc2Blob::new(5, 2, 1, DataType::Uint8)
        .with_range(0.0, 1.0, 9.0)
        .with_body(body);
    blob.dimensions = 2;
    let data = blob.build();

    let band = lerc2::decode(&data, 0, None, true).unwrap();
    assert_eq!(band.pixels, PixelData::Uint8(vec![1, 4, 2, 5]));
    assert_eq!(band.dim_stats, Some(vec![(1.0, 4.0), (2.0, 9.0)]));

    let band = lerc2::decode(&data, 0, None, false).unwrap();
    assert_eq!(band.pixels, PixelData::Uint8(vec![1, 2, 4, 5]));

    // cross band flag on dimension 0
    blob.body[5] = tile_flag(5, 0, 2, true, 0);
    assert!(matches!(lerc2::decode(&blob.build(), 0, None, true), Err(Error::InvalidData(_))));
}

#[test_log::test]
fn constant_dimensions() {
    let body = [1i16, 2, 1, 2].iter().flat_map(|v| v.to_le_bytes()).collect();
    let mut blob = Lerc2Blob::new(4, 2, 2, DataType::Int16)
        .with_range(0.0, 1.0, 2.0)
        .with_body(body);
    blob.dimensions = 2;

    let band = lerc2::decode(&blob.build(), 0, None, false).unwrap();
    assert_eq!(band.pixels, PixelData::Int16(vec![1, 1, 1, 1, 2, 2, 2, 2]));
    assert_eq!(band.dim_stats, Some(vec![(1.0, 1.0), (2.0, 2.0)]));
}

#[test_log::test]
fn mask_from_the_previous_band() {
    let data = Lerc2Blob::new(3, 2, 2, DataType::Uint8)
        .with_range(0.0, 4.0, 4.0)
        .with_inherited_mask(3)
        .build();

    assert!(matches!(lerc2::decode(&data, 0, None, false), Err(Error::InvalidMask(_))));

    let mut previous = BitMask::all_valid(2, 2);
    previous.set_invalid(2);
    let band = lerc2::decode(&data, 0, Some(&previous), false).unwrap();
    assert_eq!(band.pixels, PixelData::Uint8(vec![4, 4, 0, 4]));
    assert_eq!(band.mask_byte_count, 0);
}

#[test_log::test]
fn huffman_delta() {
    // 4x1 bytes 10, 11, 12, 13: deltas 10, 1, 1, 1 with 0 -> "0", 1 -> "10", 10 -> "11"
    let mut codes = vec![(0, 0); 11];
    codes[0] = (1, 0b0);
    codes[1] = (2, 0b10);
    codes[10] = (2, 0b11);

    let mut body = vec![0, 1];
    body.extend(huffman_table(256, 0, &codes, 3));
    body.extend(huffman_stream(&[(2, 0b11), (2, 0b10), (2, 0b10), (2, 0b10)]));

    let data = Lerc2Blob::new(3, 4, 1, DataType::Uint8)
        .with_range(0.5, 10.0, 13.0)
        .with_body(body)
        .build();

    let band = lerc2::decode(&data, 0, None, false).unwrap();
    assert_eq!(band.pixels, PixelData::Uint8(vec![10, 11, 12, 13]));
    assert_eq!(band.end_offset, data.len());
}

fn two_float_blob(version: i32) -> Vec<u8> {
    let mut body = vec![1];
    body.extend(1.0f32.to_le_bytes());
    body.extend(2.0f32.to_le_bytes());
    Lerc2Blob::new(version, 2, 1, DataType::Float32)
        .with_range(0.0, 1.0, 2.0)
        .with_body(body)
        .build()
}

#[test_log::test]
fn checksum_mismatch() {
    let mut data = two_float_blob(3);
    let last = data.len() - 1;
    data[last] ^= 0x40;

    assert!(matches!(lerc2::decode(&data, 0, None, false), Err(Error::ChecksumMismatch { .. })));
}

#[test_log::test]
fn truncated_blob() {
    let data = two_float_blob(2);
    assert!(matches!(
        lerc2::decode(&data[..data.len() - 2], 0, None, false),
        Err(Error::UnexpectedEof { .. })
    ));
}
