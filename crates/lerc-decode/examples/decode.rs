//! Example: Decode a LERC file
//!
//! Usage: cargo run --example decode <path_to_lerc_file>
//! Set RUST_LOG=debug to see the parsed band headers.

use std::env;
use std::fs;
use std::process;

use lerc_decode::{DecodeOptions, PixelData};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <path_to_lerc_file>", args[0]);
        process::exit(1);
    }

    let path = &args[1];

    let data = match fs::read(path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path, e);
            process::exit(1);
        }
    };

    println!("Read {} bytes from '{}'", data.len(), path);
    println!();

    let info = match lerc_decode::blob_info(&data, 0) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error reading LERC info: {}", e);
            process::exit(1);
        }
    };

    println!("LERC Blob Information:");
    println!("  Container:     {} v{}", info.container, info.version);
    println!("  Dimensions:    {} x {} x {}", info.width, info.height, info.dimensions);
    println!("  Bands:         {}", info.band_count);
    println!("  Data type:     {}", info.data_type);
    println!("  Valid pixels:  {}", info.num_valid_pixels);
    println!("  Masks:         {}", info.mask_count);
    println!("  Z range:       {} to {}", info.z_min, info.z_max);
    println!("  Max Z error:   {}", info.max_z_error);
    println!("  Blob size:     {} bytes", info.blob_size);
    println!();

    let result = match lerc_decode::decode(&data, 0, &DecodeOptions::default().with_file_info(true)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error decoding LERC data: {}", e);
            process::exit(1);
        }
    };

    println!("Decoded Data:");
    if let Some(mask) = &result.mask {
        let valid_count = mask.iter().filter(|&&v| v != 0).count();
        println!("  Valid pixels:   {}", valid_count);
        println!("  Invalid pixels: {}", mask.len() - valid_count);
    } else {
        println!("  All pixels are valid (no mask)");
    }

    for (index, band) in result.bands.iter().enumerate() {
        println!();
        println!("Band {}: {} values of type {}", index, band.pixels.len(), band.pixels.data_type());
        println!("  Min: {}, Max: {}", band.min_value, band.max_value);
        if let Some(dim_stats) = &band.dim_stats {
            for (dim, (min, max)) in dim_stats.iter().enumerate() {
                println!("  Dimension {}: {} to {}", dim, min, max);
            }
        }
        if let Some(file_info) = &band.file_info {
            println!("  Ends at offset {}", file_info.eof_offset());
        }
        print_first_values(&band.pixels);
    }
}

fn print_first_values(pixels: &PixelData) {
    let sample_count = std::cmp::min(10, pixels.len());
    let values: Vec<String> = (0..sample_count)
        .filter_map(|i| pixels.get(i))
        .map(|v| match pixels {
            PixelData::Float32(_) | PixelData::Float64(_) => format!("{:.4}", v),
            _ => format!("{}", v),
        })
        .collect();

    println!("  First {} values: {}", sample_count, values.join(", "));
}
