//! ARGB colors and the packed premultiplied vertex format.

/// A color stored as packed ARGB (`0xAARRGGBB`), the format used by all
/// node color properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u32);

impl Color {
    pub const WHITE: Color = Color(0xFFFF_FFFF);
    pub const TRANSPARENT: Color = Color(0x0000_0000);

    pub fn argb(argb: u32) -> Self {
        Color(argb)
    }

    pub fn alpha(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn red(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(&self) -> u8 {
        self.0 as u8
    }

    /// Premultiply by a context alpha and pack as RGBA bytes (little-endian
    /// `r | g<<8 | b<<16 | a<<24`), the vertex color format.
    ///
    /// The scaled alpha is the color's alpha byte times the context alpha,
    /// rounded to nearest; each channel is then `channel * scaled / 255`
    /// with integer truncation. Premultiplication happens here, per corner,
    /// per frame — colors are never stored premultiplied.
    pub fn premultiplied(&self, context_alpha: f32) -> u32 {
        let scaled = ((self.alpha() as f32) * context_alpha + 0.5) as u32;
        let scaled = scaled.min(255);
        let r = (self.red() as u32 * scaled) / 255;
        let g = (self.green() as u32 * scaled) / 255;
        let b = (self.blue() as u32 * scaled) / 255;
        r | (g << 8) | (b << 16) | (scaled << 24)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// Unpack a packed RGBA vertex color back into `(r, g, b, a)` bytes.
#[cfg(test)]
pub(crate) fn unpack_rgba(packed: u32) -> (u8, u8, u8, u8) {
    (
        packed as u8,
        (packed >> 8) as u8,
        (packed >> 16) as u8,
        (packed >> 24) as u8,
    )
}
