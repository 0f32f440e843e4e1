use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Colours used both as word text and as ink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InkColor {
    Red,
    Green,
    Blue,
    Yellow,
}

pub const PALETTE: [InkColor; 4] = [
    InkColor::Red,
    InkColor::Green,
    InkColor::Blue,
    InkColor::Yellow,
];

impl InkColor {
    /// Upper-case word shown on screen and written to data files
    pub fn name(&self) -> &'static str {
        match self {
            InkColor::Red => "RED",
            InkColor::Green => "GREEN",
            InkColor::Blue => "BLUE",
            InkColor::Yellow => "YELLOW",
        }
    }

    /// Straight (non-premultiplied) RGBA used when drawing the ink
    pub fn rgba(&self) -> [u8; 4] {
        match self {
            InkColor::Red => [230, 40, 40, 255],
            InkColor::Green => [40, 200, 70, 255],
            InkColor::Blue => [60, 110, 255, 255],
            InkColor::Yellow => [250, 220, 40, 255],
        }
    }
}

impl fmt::Display for InkColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InkColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        PALETTE
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("'{}' is not a palette colour", trimmed))
    }
}

/// Raw response as delivered by the input layer, before it is mapped onto
/// the palette.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseToken(pub String);

impl ResponseToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResponseToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ResponseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response keys per ink colour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyMap {
    pub red: String,
    pub green: String,
    pub blue: String,
    pub yellow: String,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self {
            red: "r".to_string(),
            green: "g".to_string(),
            blue: "b".to_string(),
            yellow: "y".to_string(),
        }
    }
}

impl KeyMap {
    pub fn key_for(&self, color: InkColor) -> &str {
        match color {
            InkColor::Red => &self.red,
            InkColor::Green => &self.green,
            InkColor::Blue => &self.blue,
            InkColor::Yellow => &self.yellow,
        }
    }

    /// Maps a token onto the palette. Keys match case-insensitively, and a
    /// full colour name is accepted as well. `None` means malformed input.
    pub fn resolve(&self, token: &ResponseToken) -> Option<InkColor> {
        let raw = token.as_str().trim();
        if raw.is_empty() {
            return None;
        }
        PALETTE
            .iter()
            .copied()
            .find(|c| self.key_for(*c).eq_ignore_ascii_case(raw))
            .or_else(|| raw.parse().ok())
    }

    /// Returns the first key bound to more than one colour, if any
    pub fn duplicate_key(&self) -> Option<&str> {
        for (i, a) in PALETTE.iter().enumerate() {
            for b in &PALETTE[i + 1..] {
                let (ka, kb) = (self.key_for(*a), self.key_for(*b));
                if ka.eq_ignore_ascii_case(kb) {
                    return Some(ka);
                }
            }
        }
        None
    }

    /// Returns a key that spells out another colour's name, with that colour.
    /// Such a key would win over the name in `resolve`.
    pub fn key_shadowing_name(&self) -> Option<(&str, InkColor)> {
        PALETTE.iter().find_map(|bound| {
            let key = self.key_for(*bound);
            match key.trim().parse::<InkColor>() {
                Ok(named) if named != *bound => Some((key, named)),
                _ => None,
            }
        })
    }
}
