//! Per-address color tags for correlating browser log lines.

use std::net::IpAddr;

use owo_colors::{AnsiColors, OwoColorize};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Rotation order of session colors
const PALETTE: [AnsiColors; 8] = [
    AnsiColors::Cyan,
    AnsiColors::Magenta,
    AnsiColors::Green,
    AnsiColors::Blue,
    AnsiColors::BrightYellow,
    AnsiColors::BrightCyan,
    AnsiColors::BrightMagenta,
    AnsiColors::BrightGreen,
];

/// Terminal color identifying one remote address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTag(AnsiColors);

impl ColorTag {
    pub fn paint(self, text: &str) -> String {
        text.color(self.0).to_string()
    }
}

/// Hands out palette colors, one per distinct address, rotating when the
/// palette runs out. Cached for the assigner's lifetime.
#[derive(Default)]
pub struct ColorAssigner {
    inner: Mutex<Assigned>,
}

#[derive(Default)]
struct Assigned {
    by_ip: FxHashMap<IpAddr, ColorTag>,
    next: usize,
}

impl ColorAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color_for(&self, ip: IpAddr) -> ColorTag {
        let mut inner = self.inner.lock();
        if let Some(&tag) = inner.by_ip.get(&ip) {
            return tag;
        }
        let tag = ColorTag(PALETTE[inner.next % PALETTE.len()]);
        inner.next += 1;
        inner.by_ip.insert(ip, tag);
        tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_same_address_same_color() {
        let colors = ColorAssigner::new();
        let a = colors.color_for(ip(1));
        let b = colors.color_for(ip(2));
        assert_ne!(a, b);
        assert_eq!(colors.color_for(ip(1)), a);
    }

    #[test]
    fn test_palette_rotates() {
        let colors = ColorAssigner::new();
        let first = colors.color_for(ip(0));
        for i in 1..PALETTE.len() as u8 {
            colors.color_for(ip(i));
        }
        assert_eq!(colors.color_for(ip(200)), first);
    }

    #[test]
    fn test_assigners_independent() {
        let a = ColorAssigner::new();
        let b = ColorAssigner::new();
        a.color_for(ip(1));
        assert_eq!(b.color_for(ip(2)), a.color_for(ip(1)));
    }

    #[test]
    fn test_paint_keeps_text() {
        let painted = ColorTag(AnsiColors::Cyan).paint("[127.0.0.1]");
        assert!(painted.contains("[127.0.0.1]"));
    }
}
