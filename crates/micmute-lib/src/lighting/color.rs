//! Colour parsing for lighting patterns.
//!
//! Config colours are `#RRGGBB`, `RRGGBB` or a colour name. The Chroma
//! REST API wants packed `0x00BBGGRR` integers, see [`Rgb::to_bgr`].

use crate::error::{MicmuteError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(0xFF, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 0xFF, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Packed `0x00BBGGRR`.
    pub fn to_bgr(self) -> u32 {
        (u32::from(self.b) << 16) | (u32::from(self.g) << 8) | u32::from(self.r)
    }
}

/// Parse a colour string.
///
/// Accepts:
/// - Hex: `"#FF0000"`, `"FF0000"`, `"#ff0000"`
/// - Named: `"red"`, `"green"`, `"blue"`, `"white"`, `"orange"`, `"yellow"`, `"purple"`, `"cyan"`, `"off"`
pub fn parse_color(s: &str) -> Result<Rgb> {
    let s = s.trim();

    match s.to_lowercase().as_str() {
        "red" => return Ok(Rgb::RED),
        "green" => return Ok(Rgb::GREEN),
        "blue" => return Ok(Rgb::new(0, 0, 0xFF)),
        "white" => return Ok(Rgb::new(0xFF, 0xFF, 0xFF)),
        "orange" => return Ok(Rgb::new(0xFF, 0x80, 0)),
        "yellow" => return Ok(Rgb::new(0xFF, 0xFF, 0)),
        "purple" => return Ok(Rgb::new(0x80, 0, 0xFF)),
        "cyan" => return Ok(Rgb::new(0, 0xFF, 0xFF)),
        "off" | "black" => return Ok(Rgb::BLACK),
        _ => {}
    }

    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 {
        return Err(MicmuteError::Color(format!(
            "Invalid color: {s} (use #RRGGBB or a color name)"
        )));
    }
    let val = u32::from_str_radix(hex, 16)
        .map_err(|_| MicmuteError::Color(format!("Invalid hex color: {s}")))?;
    let [_, r, g, b] = val.to_be_bytes();
    Ok(Rgb::new(r, g, b))
}

/// Format as `#RRGGBB`.
pub fn format_color(c: Rgb) -> String {
    format!("#{:02X}{:02X}{:02X}", c.r, c.g, c.b)
}
