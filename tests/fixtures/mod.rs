//! Synthetic medicine photos for tests

use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// Expected identification from the default mock recognizer.
pub const MOCK_NAME: &str = "PARACETAMOL 500 mg TABLET";
pub const MOCK_MEDICINE_ID: &str = "paracetamol-500mg-tablet";

/// Noisy "photo" so every seed yields distinct bytes and JPEG stays large.
fn photo(seed: u32, width: u32, height: u32) -> RgbImage {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    ImageBuffer::from_fn(width, height, |x, y| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let noise = (state & 0x3f) as u8;
        Rgb([
            (x as u8).wrapping_add(noise),
            (y as u8).wrapping_add(noise / 2),
            200u8.wrapping_sub(noise),
        ])
    })
}

fn encode(img: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).expect("encode test image");
    out.into_inner()
}

/// Camera-sized JPEG, tens of kilobytes.
pub fn jpeg_photo(seed: u32) -> Vec<u8> {
    encode(&photo(seed, 256, 256), ImageFormat::Jpeg)
}

/// Small PNG, cheap to hash and decode.
pub fn png_photo(seed: u32) -> Vec<u8> {
    encode(&photo(seed, 16, 16), ImageFormat::Png)
}
