use std::sync::Arc;

use image::{Rgba, RgbaImage};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use labelsight_domain::{BbF, LsError, LsResult, ShapeI, TPtF};

use tracing::{debug, warn};

use crate::{font::LabelFont, image_util};

/// The drawing capabilities the annotator needs. Coordinates are pixels of the source image with
/// the origin at the top-left corner.
pub trait Surface {
    fn shape(&self) -> ShapeI;
    /// Draws the outline of `bb`, the stroke is centered on the box edges.
    fn stroke_rect(&mut self, bb: &BbF, stroke_width: u32, color: Rgba<u8>);
    /// Width of `text` when rendered with the surface's font.
    fn measure_text(&self, text: &str) -> LsResult<TPtF>;
    /// Renders `text` with its top-left corner at `(x, y)`.
    fn fill_text(&mut self, text: &str, x: TPtF, y: TPtF, color: Rgba<u8>);
    fn to_image_bytes(&self) -> LsResult<Vec<u8>>;
}

/// Raster surface on a copy of the source image.
pub struct ImageSurface {
    im: RgbaImage,
    font: Option<Arc<LabelFont>>,
}

impl ImageSurface {
    /// `font` may be `None` if no text is going to be drawn.
    pub fn new(im: RgbaImage, font: Option<Arc<LabelFont>>) -> Self {
        Self { im, font }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.im
    }

    fn font(&self) -> LsResult<&LabelFont> {
        self.font
            .as_deref()
            .ok_or_else(|| LsError::SurfaceUnavailable("surface has no font for labels".into()))
    }
}

/// Nested outlines that make up a stroke of `stroke_width` centered on the edges of `bb`. Edges
/// far outside of a canvas of size `shape` are moved close to it, their outlines stay outside.
pub fn stroke_outlines(bb: &BbF, stroke_width: u32, shape: ShapeI) -> Vec<Rect> {
    let margin = TPtF::from(stroke_width) + 1.0;
    let clamp_x = |x: TPtF| x.clamp(-margin, TPtF::from(shape.w) + margin).round();
    let clamp_y = |y: TPtF| y.clamp(-margin, TPtF::from(shape.h) + margin).round();
    let (x1, x2) = (clamp_x(bb.x), clamp_x(bb.x2()));
    let (y1, y2) = (clamp_y(bb.y), clamp_y(bb.y2()));
    let half = TPtF::from(stroke_width / 2);
    (0..stroke_width)
        .map(|i| TPtF::from(i) - half)
        .filter_map(|offset| {
            // positive offsets shrink the outline towards the box center
            let w_o = x2 - x1 - 2.0 * offset;
            let h_o = y2 - y1 - 2.0 * offset;
            (w_o > 0.0 && h_o > 0.0).then(|| {
                Rect::at((x1 + offset) as i32, (y1 + offset) as i32)
                    .of_size(w_o as u32, h_o as u32)
            })
        })
        .collect()
}

impl Surface for ImageSurface {
    fn shape(&self) -> ShapeI {
        ShapeI::from_im(&self.im)
    }
    fn stroke_rect(&mut self, bb: &BbF, stroke_width: u32, color: Rgba<u8>) {
        for outline in stroke_outlines(bb, stroke_width, self.shape()) {
            draw_hollow_rect_mut(&mut self.im, outline, color);
        }
    }
    fn measure_text(&self, text: &str) -> LsResult<TPtF> {
        self.font()?.measure(text)
    }
    fn fill_text(&mut self, text: &str, x: TPtF, y: TPtF, color: Rgba<u8>) {
        let Some(font) = self.font.clone() else {
            warn!("surface has no font, label '{text}' is not rendered");
            return;
        };
        let w = TPtF::from(self.im.width());
        let h = TPtF::from(self.im.height());
        let text_w = font.measure(text).unwrap_or(w);
        let text_h = TPtF::from(font.scale().y);
        if x >= w || y >= h || x + text_w <= 0.0 || y + text_h <= 0.0 {
            debug!("label '{text}' at ({x}, {y}) is outside of the image");
            return;
        }
        draw_text_mut(
            &mut self.im,
            color,
            x.round() as i32,
            y.round() as i32,
            font.scale(),
            font.font(),
            text,
        );
    }
    fn to_image_bytes(&self) -> LsResult<Vec<u8>> {
        image_util::encode_png(&self.im)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    StrokeRect {
        bb: BbF,
        stroke_width: u32,
        color: Rgba<u8>,
    },
    FillText {
        text: String,
        x: TPtF,
        y: TPtF,
        color: Rgba<u8>,
    },
}

/// Fake surface that remembers every call. Text is measured as `char_width` per character.
#[derive(Clone, Debug)]
pub struct RecordingSurface {
    shape: ShapeI,
    char_width: TPtF,
    fail_measurement: bool,
    ops: Vec<DrawOp>,
}

impl RecordingSurface {
    pub fn new(shape: ShapeI) -> Self {
        Self {
            shape,
            char_width: 10.0,
            fail_measurement: false,
            ops: vec![],
        }
    }
    #[must_use]
    pub fn with_char_width(mut self, char_width: TPtF) -> Self {
        self.char_width = char_width;
        self
    }
    /// Every call to [`Surface::measure_text`] fails.
    #[must_use]
    pub fn failing_measurement(mut self) -> Self {
        self.fail_measurement = true;
        self
    }
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }
    pub fn strokes(&self) -> impl Iterator<Item = &BbF> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::StrokeRect { bb, .. } => Some(bb),
            DrawOp::FillText { .. } => None,
        })
    }
    /// `(text, x, y)` of every rendered label.
    pub fn texts(&self) -> impl Iterator<Item = (&str, TPtF, TPtF)> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::FillText { text, x, y, .. } => Some((text.as_str(), *x, *y)),
            DrawOp::StrokeRect { .. } => None,
        })
    }
}

impl Surface for RecordingSurface {
    fn shape(&self) -> ShapeI {
        self.shape
    }
    fn stroke_rect(&mut self, bb: &BbF, stroke_width: u32, color: Rgba<u8>) {
        self.ops.push(DrawOp::StrokeRect {
            bb: *bb,
            stroke_width,
            color,
        });
    }
    fn measure_text(&self, text: &str) -> LsResult<TPtF> {
        if self.fail_measurement {
            Err(LsError::Measurement(format!("cannot measure '{text}'")))
        } else {
            Ok(text.chars().count() as TPtF * self.char_width)
        }
    }
    fn fill_text(&mut self, text: &str, x: TPtF, y: TPtF, color: Rgba<u8>) {
        self.ops.push(DrawOp::FillText {
            text: text.to_string(),
            x,
            y,
            color,
        });
    }
    fn to_image_bytes(&self) -> LsResult<Vec<u8>> {
        image_util::encode_png(&RgbaImage::new(self.shape.w, self.shape.h))
    }
}

#[cfg(test)]
use crate::font::find_fallback_font;

#[test]
fn test_stroke_outlines() {
    let bb = BbF::from_tlbr(10.0, 10.0, 50.0, 30.0).unwrap();
    let shape = ShapeI::new(100, 100);
    let outlines = stroke_outlines(&bb, 2, shape);
    assert_eq!(
        outlines,
        vec![
            Rect::at(9, 9).of_size(42, 22),
            Rect::at(10, 10).of_size(40, 20)
        ]
    );
    assert_eq!(
        stroke_outlines(&bb, 1, shape),
        vec![Rect::at(10, 10).of_size(40, 20)]
    );
    assert!(stroke_outlines(&bb, 0, shape).is_empty());
    let tiny = BbF::from_arr(&[5.0, 5.0, 1.0, 1.0]);
    assert_eq!(stroke_outlines(&tiny, 4, shape).len(), 3);
    // the right edge is moved to the margin of 3px
    let far = BbF::from_tlbr(10.0, 10.0, 3e9, 30.0).unwrap();
    assert_eq!(
        stroke_outlines(&far, 2, shape),
        vec![
            Rect::at(9, 9).of_size(95, 22),
            Rect::at(10, 10).of_size(93, 20)
        ]
    );
}

#[test]
fn test_image_surface_stroke() {
    let red = Rgba([255, 0, 0, 255]);
    let mut s = ImageSurface::new(RgbaImage::new(20, 20), None);
    s.stroke_rect(&BbF::from_tlbr(5.0, 5.0, 15.0, 15.0).unwrap(), 2, red);
    // stroke is centered on the edge
    assert_eq!(*s.image().get_pixel(4, 10), red);
    assert_eq!(*s.image().get_pixel(5, 10), red);
    assert_eq!(*s.image().get_pixel(6, 10), Rgba([0, 0, 0, 0]));
    assert_eq!(*s.image().get_pixel(10, 10), Rgba([0, 0, 0, 0]));
    // partially outside is clipped silently
    s.stroke_rect(&BbF::from_tlbr(-5.0, -5.0, 30.0, 30.0).unwrap(), 2, red);
    assert_eq!(s.shape(), ShapeI::new(20, 20));
}

#[test]
fn test_image_surface_far_outside() {
    let red = Rgba([255, 0, 0, 255]);
    let mut s = ImageSurface::new(RgbaImage::new(40, 40), None);
    s.stroke_rect(&BbF::from_tlbr(5.0, 5.0, 3e9, 20.0).unwrap(), 2, red);
    // left and top edges are drawn, right edge is off the canvas
    assert_eq!(*s.image().get_pixel(4, 10), red);
    assert_eq!(*s.image().get_pixel(5, 10), red);
    assert_eq!(*s.image().get_pixel(20, 4), red);
    assert_eq!(*s.image().get_pixel(20, 5), red);
    assert_eq!(*s.image().get_pixel(39, 10), Rgba([0, 0, 0, 0]));
    s.stroke_rect(&BbF::from_tlbr(-3e9, -3e9, -2e9, -2e9).unwrap(), 2, red);
    s.stroke_rect(&BbF::from_tlbr(-3e9, -3e9, 3e9, 3e9).unwrap(), 2, red);
    assert_eq!(*s.image().get_pixel(30, 30), Rgba([0, 0, 0, 0]));
    let Some(p) = find_fallback_font() else {
        return;
    };
    let font = Arc::new(LabelFont::from_path(&p, 16.0).unwrap());
    let mut s = ImageSurface::new(RgbaImage::new(40, 40), Some(font));
    s.fill_text("far", 10.0, 3e9, red);
    s.fill_text("far", -3e9, 10.0, red);
    s.fill_text("far", 3e9, -3e9, red);
    assert!(s.image().pixels().all(|p| p.0 == [0, 0, 0, 0]));
}

#[test]
fn test_image_surface_without_font() {
    let mut s = ImageSurface::new(RgbaImage::new(20, 20), None);
    assert!(matches!(
        s.measure_text("a"),
        Err(LsError::SurfaceUnavailable(_))
    ));
    s.fill_text("a", 1.0, 1.0, Rgba([255, 255, 0, 255]));
    assert!(s.image().pixels().all(|p| p.0 == [0, 0, 0, 0]));
}

#[test]
fn test_image_surface_text() {
    let Some(p) = find_fallback_font() else {
        return;
    };
    let font = Arc::new(LabelFont::from_path(&p, 16.0).unwrap());
    let yellow = Rgba([255, 255, 0, 255]);
    let mut s = ImageSurface::new(RgbaImage::new(100, 40), Some(font));
    let w = s.measure_text("Hello").unwrap();
    assert!(w > 0.0 && w < 100.0);
    s.fill_text("Hello", 10.0, 10.0, yellow);
    let n_colored = s.image().pixels().filter(|p| p.0[3] > 0).count();
    assert!(n_colored > 0);
    // nothing above the anchor
    assert!((0..100).all(|x| s.image().get_pixel(x, 5).0[3] == 0));
}

#[test]
fn test_recording_surface() {
    let mut s = RecordingSurface::new(ShapeI::new(10, 10)).with_char_width(7.0);
    assert_eq!(s.measure_text("abc").unwrap(), 21.0);
    s.fill_text("abc", 1.0, 2.0, Rgba([0, 0, 0, 255]));
    assert_eq!(s.texts().collect::<Vec<_>>(), vec![("abc", 1.0, 2.0)]);
    let bytes = s.to_image_bytes().unwrap();
    let im = image::load_from_memory(&bytes).unwrap();
    assert_eq!((im.width(), im.height()), (10, 10));
    let s = s.failing_measurement();
    assert!(matches!(s.measure_text("a"), Err(LsError::Measurement(_))));
}
