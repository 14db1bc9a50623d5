//! Indexed color table and default colors.
//!
//! 256 palette entries seeded with the xterm defaults (16 ANSI colors, the
//! 6×6×6 color cube, 24 grays) plus the terminal's default foreground,
//! background, and cursor colors. OSC 4/104 edit entries; OSC 10/11/12 and
//! 110/111/112 edit and reset the defaults.

use vte::ansi::Rgb;

/// Default foreground (light gray).
const DEFAULT_FG: Rgb = Rgb { r: 0xd0, g: 0xd0, b: 0xd0 };
/// Default background (near black).
const DEFAULT_BG: Rgb = Rgb { r: 0x1a, g: 0x1b, b: 0x26 };
/// Default cursor color.
const DEFAULT_CURSOR: Rgb = Rgb { r: 0xc0, g: 0xca, b: 0xf5 };

/// The 16 base ANSI colors (xterm values).
const ANSI16: [Rgb; 16] = [
    Rgb { r: 0x00, g: 0x00, b: 0x00 },
    Rgb { r: 0xcd, g: 0x00, b: 0x00 },
    Rgb { r: 0x00, g: 0xcd, b: 0x00 },
    Rgb { r: 0xcd, g: 0xcd, b: 0x00 },
    Rgb { r: 0x00, g: 0x00, b: 0xee },
    Rgb { r: 0xcd, g: 0x00, b: 0xcd },
    Rgb { r: 0x00, g: 0xcd, b: 0xcd },
    Rgb { r: 0xe5, g: 0xe5, b: 0xe5 },
    Rgb { r: 0x7f, g: 0x7f, b: 0x7f },
    Rgb { r: 0xff, g: 0x00, b: 0x00 },
    Rgb { r: 0x00, g: 0xff, b: 0x00 },
    Rgb { r: 0xff, g: 0xff, b: 0x00 },
    Rgb { r: 0x5c, g: 0x5c, b: 0xff },
    Rgb { r: 0xff, g: 0x00, b: 0xff },
    Rgb { r: 0x00, g: 0xff, b: 0xff },
    Rgb { r: 0xff, g: 0xff, b: 0xff },
];

/// Indexed color table plus default fg/bg/cursor.
#[derive(Debug, Clone)]
pub struct Palette {
    colors: [Rgb; 256],
    /// Default foreground (OSC 10).
    pub default_fg: Rgb,
    /// Default background (OSC 11).
    pub default_bg: Rgb,
    /// Cursor color (OSC 12).
    pub cursor: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        let mut colors = [Rgb { r: 0, g: 0, b: 0 }; 256];
        colors[..16].copy_from_slice(&ANSI16);

        // 6x6x6 color cube (16..232).
        let steps = [0x00u8, 0x5f, 0x87, 0xaf, 0xd7, 0xff];
        for (i, color) in colors.iter_mut().enumerate().take(232).skip(16) {
            let idx = i - 16;
            *color = Rgb {
                r: steps[idx / 36],
                g: steps[(idx / 6) % 6],
                b: steps[idx % 6],
            };
        }

        // Grayscale ramp (232..256).
        for (i, color) in colors.iter_mut().enumerate().skip(232) {
            let level = (8 + (i - 232) * 10) as u8;
            *color = Rgb { r: level, g: level, b: level };
        }

        Self {
            colors,
            default_fg: DEFAULT_FG,
            default_bg: DEFAULT_BG,
            cursor: DEFAULT_CURSOR,
        }
    }
}

impl Palette {
    /// Color at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.colors.get(index).copied()
    }

    /// Set a palette entry (OSC 4).
    pub fn set(&mut self, index: usize, color: Rgb) {
        if let Some(slot) = self.colors.get_mut(index) {
            *slot = color;
        }
    }

    /// Reset a palette entry to its default (OSC 104 with an index).
    pub fn reset(&mut self, index: usize) {
        let defaults = Palette::default();
        if let Some(slot) = self.colors.get_mut(index) {
            *slot = defaults.colors[index];
        }
    }

    /// Reset every entry and the default colors (OSC 104 bare).
    pub fn reset_all(&mut self) {
        *self = Palette::default();
    }
}

/// Parse an OSC color spec: `rgb:RR/GG/BB` (1–4 hex digits per channel) or
/// `#RRGGBB`. Returns `None` for anything else.
pub fn parse_color_spec(spec: &str) -> Option<Rgb> {
    if let Some(rest) = spec.strip_prefix("rgb:") {
        let mut channels = rest.split('/');
        let r = scale_channel(channels.next()?)?;
        let g = scale_channel(channels.next()?)?;
        let b = scale_channel(channels.next()?)?;
        return Some(Rgb { r, g, b });
    }
    if let Some(hex) = spec.strip_prefix('#') {
        if hex.len() == 6 {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            return Some(Rgb { r, g, b });
        }
    }
    None
}

/// Scale a 1–4 hex digit channel to 8 bits (X11 semantics: high bits).
fn scale_channel(digits: &str) -> Option<u8> {
    if digits.is_empty() || digits.len() > 4 {
        return None;
    }
    let value = u16::from_str_radix(digits, 16).ok()?;
    let max = (1u32 << (4 * digits.len() as u32)) - 1;
    Some(((value as u32 * 255) / max) as u8)
}

/// Format a color as an XParseColor reply: `rgb:rrrr/gggg/bbbb`.
pub fn format_color_reply(color: Rgb) -> String {
    format!(
        "rgb:{:04x}/{:04x}/{:04x}",
        (color.r as u16) << 8 | color.r as u16,
        (color.g as u16) << 8 | color.g as u16,
        (color.b as u16) << 8 | color.b as u16,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_and_grayscale_seeded() {
        let p = Palette::default();
        // 16 = cube origin (black), 231 = cube max (white).
        assert_eq!(p.get(16).unwrap(), Rgb { r: 0, g: 0, b: 0 });
        assert_eq!(p.get(231).unwrap(), Rgb { r: 0xff, g: 0xff, b: 0xff });
        // Grayscale endpoints.
        assert_eq!(p.get(232).unwrap(), Rgb { r: 8, g: 8, b: 8 });
        assert_eq!(p.get(255).unwrap(), Rgb { r: 238, g: 238, b: 238 });
    }

    #[test]
    fn set_and_reset_entry() {
        let mut p = Palette::default();
        let red = Rgb { r: 255, g: 0, b: 0 };
        p.set(1, Rgb { r: 1, g: 2, b: 3 });
        assert_eq!(p.get(1).unwrap(), Rgb { r: 1, g: 2, b: 3 });
        p.reset(1);
        assert_eq!(p.get(1).unwrap(), Rgb { r: 0xcd, g: 0, b: 0 });
        p.set(9, red);
        p.reset_all();
        assert_eq!(p.get(9).unwrap(), Rgb { r: 0xff, g: 0, b: 0 });
    }

    #[test]
    fn parse_rgb_spec_forms() {
        assert_eq!(
            parse_color_spec("rgb:ff/00/80"),
            Some(Rgb { r: 0xff, g: 0, b: 0x80 })
        );
        assert_eq!(
            parse_color_spec("rgb:ffff/0000/8080"),
            Some(Rgb { r: 0xff, g: 0, b: 0x80 })
        );
        assert_eq!(
            parse_color_spec("#102030"),
            Some(Rgb { r: 0x10, g: 0x20, b: 0x30 })
        );
        assert_eq!(parse_color_spec("nonsense"), None);
    }

    #[test]
    fn reply_format_is_16_bit() {
        let reply = format_color_reply(Rgb { r: 0xd0, g: 0, b: 0x80 });
        assert_eq!(reply, "rgb:d0d0/0000/8080");
    }
}
