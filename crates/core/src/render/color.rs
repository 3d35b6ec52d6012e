use std::fmt;

use serde::{Deserialize, Serialize};

/// Packed `0xRRGGBB` colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0x000000);
    pub const WHITE: Color = Color(0xFFFFFF);

    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self(u32::from(r) << 16 | u32::from(g) << 8 | u32::from(b))
    }

    pub fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn b(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{}{}{}",
            hex_byte(self.r().into()),
            hex_byte(self.g().into()),
            hex_byte(self.b().into())
        )
    }
}

/// Truncates toward zero and clamps into a colour channel. NaN maps to 0.
pub fn clamp_byte(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.trunc().clamp(0.0, 255.0) as u8
}

/// Two uppercase hex digits for a channel value, without prefix.
pub fn hex_byte(value: f64) -> String {
    format!("{:02X}", clamp_byte(value))
}

/// Builds a colour from unclamped channel values.
pub fn rgb_to_hex(r: f64, g: f64, b: f64) -> Color {
    Color::from_rgb(clamp_byte(r), clamp_byte(g), clamp_byte(b))
}
