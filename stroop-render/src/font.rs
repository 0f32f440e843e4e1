use ab_glyph::FontVec;
use anyhow::{Context, Result, anyhow, bail};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Places a sans-serif TrueType font usually lives
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
    "C:\\Windows\\Fonts\\segoeui.ttf",
];

pub fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|e| anyhow!("{}: {}", path.display(), e))
}

/// Loads `explicit` if given, otherwise the first system font that parses.
pub fn find_font(explicit: Option<&Path>) -> Result<FontVec> {
    if let Some(path) = explicit {
        let font = load_font(path)?;
        info!("Using font {}", path.display());
        return Ok(font);
    }
    for candidate in SYSTEM_FONTS.iter().map(PathBuf::from) {
        if !candidate.is_file() {
            continue;
        }
        match load_font(&candidate) {
            Ok(font) => {
                info!("Using font {}", candidate.display());
                return Ok(font);
            }
            Err(e) => debug!("Skipping font: {:#}", e),
        }
    }
    bail!("no usable font found; pass one with --font")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_explicit_font_is_an_error() {
        let err = find_font(Some(Path::new("/nonexistent/font.ttf"))).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/font.ttf"));
    }

    #[test]
    fn garbage_is_not_a_font() {
        let dir = std::env::temp_dir().join(format!("stroop-font-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(load_font(&path).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
