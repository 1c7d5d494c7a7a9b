use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use labelsight_domain::{LsError, LsResult, TPtF};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::file_util;

/// Looked up in this order if no font is configured.
pub const FALLBACK_FONT_PATHS: [&str; 8] = [
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
];

pub fn find_fallback_font() -> Option<PathBuf> {
    FALLBACK_FONT_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

/// Font face and pixel size used to measure and render labels.
#[derive(Debug)]
pub struct LabelFont {
    font: FontVec,
    scale: PxScale,
}

impl LabelFont {
    pub fn from_bytes(data: Vec<u8>, size_px: f32) -> LsResult<Self> {
        let font = FontVec::try_from_vec(data)
            .map_err(|e| LsError::SurfaceUnavailable(format!("invalid font data, {e}")))?;
        Ok(Self {
            font,
            scale: PxScale::from(size_px),
        })
    }

    pub fn from_path(path: &Path, size_px: f32) -> LsResult<Self> {
        let data = file_util::read(path).map_err(|e| {
            LsError::SurfaceUnavailable(format!("cannot load font {path:?}, {}", e.msg()))
        })?;
        info!("loaded font {path:?}");
        Self::from_bytes(data, size_px)
    }

    /// Uses `path` if given, the first existing of [`FALLBACK_FONT_PATHS`] otherwise.
    pub fn load(path: Option<&Path>, size_px: f32) -> LsResult<Self> {
        match path {
            Some(p) => Self::from_path(p, size_px),
            None => {
                let p = find_fallback_font().ok_or_else(|| {
                    LsError::SurfaceUnavailable(
                        "no font configured and none of the fallback fonts exists".into(),
                    )
                })?;
                debug!("no font configured, falling back to {p:?}");
                Self::from_path(&p, size_px)
            }
        }
    }

    pub fn font(&self) -> &FontVec {
        &self.font
    }

    pub fn scale(&self) -> PxScale {
        self.scale
    }

    /// Advance width of `text` in pixels including kerning, like a canvas' `measureText`.
    pub fn measure(&self, text: &str) -> LsResult<TPtF> {
        if self.font.units_per_em().is_none() {
            return Err(LsError::Measurement(
                "font does not provide units per em".into(),
            ));
        }
        let scaled = self.font.as_scaled(self.scale);
        let mut width = 0.0f32;
        let mut prev = None;
        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = prev {
                width += scaled.kern(prev, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        if width.is_finite() {
            Ok(TPtF::from(width))
        } else {
            Err(LsError::Measurement(format!("width of '{text}' is {width}")))
        }
    }
}

#[test]
fn test_missing_font() {
    let err = LabelFont::load(Some(Path::new("/does/not/exist.ttf")), 16.0).unwrap_err();
    assert!(matches!(err, LsError::SurfaceUnavailable(_)));
    let err = LabelFont::from_bytes(b"no font".to_vec(), 16.0).unwrap_err();
    assert!(err.is_fatal_for_run());
}

#[test]
fn test_measure() {
    let Some(p) = find_fallback_font() else {
        return;
    };
    let font = LabelFont::from_path(&p, 16.0).unwrap();
    assert_eq!(font.measure("").unwrap(), 0.0);
    let w_short = font.measure("Type").unwrap();
    let w_long = font.measure("Type: cup, Brand: acme").unwrap();
    assert!(w_short > 0.0);
    assert!(w_long > w_short);
    let font_big = LabelFont::from_path(&p, 32.0).unwrap();
    assert!(font_big.measure("Type").unwrap() > w_short);
}
