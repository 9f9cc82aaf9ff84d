//! Code 128 (set B) encoding and PNG rendering of order barcodes.
//!
//! Rendering is a pure function of the barcode text.

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use std::io::Cursor;
use thiserror::Error;

use crate::errors::ServiceError;

/// Bar/space patterns for symbol values 0..=105, most significant bit first.
/// Every pattern is 11 modules wide and starts with a bar.
const PATTERNS: [u16; 106] = [
    0b11011001100, 0b11001101100, 0b11001100110, 0b10010011000, 0b10010001100, 0b10001001100,
    0b10011001000, 0b10011000100, 0b10001100100, 0b11001001000, 0b11001000100, 0b11000100100,
    0b10110011100, 0b10011011100, 0b10011001110, 0b10111001100, 0b10011101100, 0b10011100110,
    0b11001110010, 0b11001011100, 0b11001001110, 0b11011100100, 0b11001110100, 0b11101101110,
    0b11101001100, 0b11100101100, 0b11100100110, 0b11101100100, 0b11100110100, 0b11100110010,
    0b11011011000, 0b11011000110, 0b11000110110, 0b10100011000, 0b10001011000, 0b10001000110,
    0b10110001000, 0b10001101000, 0b10001100010, 0b11010001000, 0b11000101000, 0b11000100010,
    0b10110111000, 0b10110001110, 0b10001101110, 0b10111011000, 0b10111000110, 0b10001110110,
    0b11101110110, 0b11010001110, 0b11000101110, 0b11011101000, 0b11011100010, 0b11011101110,
    0b11101011000, 0b11101000110, 0b11100010110, 0b11101101000, 0b11101100010, 0b11100011010,
    0b11101111010, 0b11001000010, 0b11110001010, 0b10100110000, 0b10100001100, 0b10010110000,
    0b10010000110, 0b10000101100, 0b10000100110, 0b10110010000, 0b10110000100, 0b10011010000,
    0b10011000010, 0b10000110100, 0b10000110010, 0b11000010010, 0b11001010000, 0b11110111010,
    0b11000010100, 0b10001111010, 0b10100111100, 0b10010111100, 0b10010011110, 0b10111100100,
    0b10011110100, 0b10011110010, 0b11110100100, 0b11110010100, 0b11110010010, 0b11011011110,
    0b11011110110, 0b11110110110, 0b10101111000, 0b10100011110, 0b10001011110, 0b10111101000,
    0b10111100010, 0b11110101000, 0b11110100010, 0b10111011110, 0b10111101110, 0b11101011110,
    0b11110101110, 0b11010000100, 0b11010010000, 0b11010011100,
];

const START_B: usize = 104;
/// The stop symbol includes the final 2-module termination bar.
const STOP: u16 = 0b1100011101011;
const STOP_WIDTH: u32 = 13;
const SYMBOL_WIDTH: u32 = 11;
const QUIET_ZONE: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BarcodeError {
    #[error("barcode text is empty")]
    Empty,
    #[error("character {0:?} cannot be encoded in Code 128 set B")]
    UnsupportedCharacter(char),
    #[error("image encoding failed: {0}")]
    Image(String),
}

impl From<BarcodeError> for ServiceError {
    fn from(err: BarcodeError) -> Self {
        match err {
            BarcodeError::Image(msg) => ServiceError::InternalError(msg),
            other => ServiceError::ValidationError(other.to_string()),
        }
    }
}

/// Rendering dimensions in pixels.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub module_width: u32,
    pub height: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            module_width: 2,
            height: 80,
        }
    }
}

/// Symbol values for `text`: start, data, checksum. The stop symbol is implied.
pub fn encode(text: &str) -> Result<Vec<usize>, BarcodeError> {
    if text.is_empty() {
        return Err(BarcodeError::Empty);
    }

    let mut symbols = Vec::with_capacity(text.len() + 2);
    symbols.push(START_B);
    for ch in text.chars() {
        let code = ch as u32;
        if !(32..=126).contains(&code) {
            return Err(BarcodeError::UnsupportedCharacter(ch));
        }
        symbols.push((code - 32) as usize);
    }

    let weighted: usize = symbols
        .iter()
        .enumerate()
        .map(|(i, &value)| if i == 0 { value } else { i * value })
        .sum();
    symbols.push(weighted % 103);
    Ok(symbols)
}

/// Module sequence (`true` = bar) including quiet zones.
pub fn modules(text: &str) -> Result<Vec<bool>, BarcodeError> {
    let symbols = encode(text)?;
    let mut out = Vec::with_capacity(
        (symbols.len() as u32 * SYMBOL_WIDTH + STOP_WIDTH + 2 * QUIET_ZONE) as usize,
    );
    out.extend(std::iter::repeat(false).take(QUIET_ZONE as usize));
    for value in symbols {
        push_pattern(&mut out, PATTERNS[value], SYMBOL_WIDTH);
    }
    push_pattern(&mut out, STOP, STOP_WIDTH);
    out.extend(std::iter::repeat(false).take(QUIET_ZONE as usize));
    Ok(out)
}

fn push_pattern(out: &mut Vec<bool>, pattern: u16, width: u32) {
    for bit in (0..width).rev() {
        out.push(pattern & (1 << bit) != 0);
    }
}

/// PNG bytes of `text` rendered as a Code 128 barcode.
pub fn render_png(text: &str, options: RenderOptions) -> Result<Vec<u8>, BarcodeError> {
    let modules = modules(text)?;
    let module_width = options.module_width.max(1);
    let width = modules.len() as u32 * module_width;
    let height = options.height.max(1);

    let img = GrayImage::from_fn(width, height, |x, _| {
        if modules[(x / module_width) as usize] {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    });

    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut bytes, ImageFormat::Png)
        .map_err(|e| BarcodeError::Image(e.to_string()))?;
    Ok(bytes.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_reference() {
        // "PJJ123C": start B (104) + weighted data, mod 103
        let symbols = encode("PJJ123C").unwrap();
        assert_eq!(symbols.first(), Some(&START_B));
        assert_eq!(symbols.last(), Some(&55));
    }

    #[test]
    fn module_count_follows_length() {
        let text = "TTK3F9QZ1A";
        let modules = modules(text).unwrap();
        let expected = 2 * QUIET_ZONE + (text.len() as u32 + 2) * SYMBOL_WIDTH + STOP_WIDTH;
        assert_eq!(modules.len() as u32, expected);
        assert!(!modules[0]);
        assert!(modules[QUIET_ZONE as usize]);
    }

    #[test]
    fn rejects_non_ascii() {
        assert_eq!(encode("TT\u{e9}"), Err(BarcodeError::UnsupportedCharacter('\u{e9}')));
        assert_eq!(encode(""), Err(BarcodeError::Empty));
    }

    #[test]
    fn png_is_deterministic() {
        let a = render_png("TT12345678", RenderOptions::default()).unwrap();
        let b = render_png("TT12345678", RenderOptions::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(&a[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn png_dimensions() {
        let png = render_png("AB", RenderOptions { module_width: 3, height: 40 }).unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!(img.height(), 40);
        assert_eq!(img.width(), modules("AB").unwrap().len() as u32 * 3);
    }
}
