use fixed::types::I32F32;

/// Page-space length in PDF points, stored as fixed-point so that identical
/// inputs always serialize to identical output bytes.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::from_bits(0));

    pub fn from_f32(value: f32) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        let milli = (value as f64 * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Pt::from_milli_i64(milli)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn from_milli_i64(milli: i64) -> Pt {
        Pt::from_milli_i128(milli as i128)
    }

    fn from_milli_i128(milli: i128) -> Pt {
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Pt(I32F32::from_bits(bits))
    }

    pub fn max(self, other: Pt) -> Pt {
        if self >= other { self } else { other }
    }

    pub fn min(self, other: Pt) -> Pt {
        if self <= other { self } else { other }
    }

    pub fn abs(self) -> Pt {
        if self.to_milli_i64() < 0 { -self } else { self }
    }
}

impl std::ops::Add for Pt {
    type Output = Pt;
    fn add(self, rhs: Pt) -> Pt {
        Pt::from_milli_i128(self.to_milli_i64() as i128 + rhs.to_milli_i64() as i128)
    }
}

impl std::ops::AddAssign for Pt {
    fn add_assign(&mut self, rhs: Pt) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt::from_milli_i128(self.to_milli_i64() as i128 - rhs.to_milli_i64() as i128)
    }
}

impl std::ops::SubAssign for Pt {
    fn sub_assign(&mut self, rhs: Pt) {
        *self = *self - rhs;
    }
}

impl std::ops::Neg for Pt {
    type Output = Pt;
    fn neg(self) -> Pt {
        Pt::from_milli_i128(-(self.to_milli_i64() as i128))
    }
}

impl std::ops::Mul<i32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: i32) -> Pt {
        let milli = self.to_milli_i64() as i128;
        Pt::from_milli_i128(milli.saturating_mul(rhs as i128))
    }
}

impl std::ops::Mul<f32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: f32) -> Pt {
        if !rhs.is_finite() {
            return Pt::ZERO;
        }
        Pt::from_f32(self.to_f32() * rhs)
    }
}

impl std::ops::Div<f32> for Pt {
    type Output = Pt;
    fn div(self, rhs: f32) -> Pt {
        if rhs == 0.0 || !rhs.is_finite() {
            Pt::ZERO
        } else {
            Pt::from_f32(self.to_f32() / rhs)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: Pt::from_f32(width),
            height: Pt::from_f32(height),
        }
    }

    pub fn letter() -> Self {
        // 8.5in x 11in at 72pt/in.
        Self::new(612.0, 792.0)
    }

    pub fn a4() -> Self {
        Self::new(595.28, 841.89)
    }

    pub fn rotated(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    pub fn is_landscape(self) -> bool {
        self.width > self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rgb` or `#rrggbb`. Anything unparseable falls back to black,
    /// matching the degradation policy for non-structural template values.
    pub fn from_hex(raw: &str) -> Color {
        let hex = raw.trim().trim_start_matches('#');
        let expand = |v: u8| -> u8 { v << 4 | v };
        let bytes = match hex.len() {
            3 => {
                let parse = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(expand);
                match (parse(0), parse(1), parse(2)) {
                    (Some(r), Some(g), Some(b)) => Some((r, g, b)),
                    _ => None,
                }
            }
            6 => {
                let parse = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
                match (parse(0), parse(2), parse(4)) {
                    (Some(r), Some(g), Some(b)) => Some((r, g, b)),
                    _ => None,
                }
            }
            _ => None,
        };
        match bytes {
            Some((r, g, b)) => Color {
                r: r as f32 / 255.0,
                g: g as f32 / 255.0,
                b: b as f32 / 255.0,
            },
            None => Color::BLACK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pt_milli_round_trip() {
        let value = Pt::from_f32(123.456);
        assert_eq!(value.to_milli_i64(), 123_456);
        assert_eq!(Pt::from_milli_i64(123_456), value);
    }

    #[test]
    fn pt_arithmetic_is_exact_at_milli_precision() {
        let a = Pt::from_f32(600.0);
        let b = Pt::from_f32(100.0);
        assert_eq!((a - b).to_milli_i64(), 500_000);
        assert_eq!((a - b + b), a);
    }

    #[test]
    fn color_hex_parsing() {
        let c = Color::from_hex("#ff0000");
        assert!((c.r - 1.0).abs() < 1e-6 && c.g == 0.0 && c.b == 0.0);
        assert_eq!(Color::from_hex("#fff"), Color::WHITE);
        assert_eq!(Color::from_hex("not-a-color"), Color::BLACK);
    }

    #[test]
    fn orientation_helpers() {
        assert!(!Size::letter().is_landscape());
        assert!(Size::letter().rotated().is_landscape());
    }
}
