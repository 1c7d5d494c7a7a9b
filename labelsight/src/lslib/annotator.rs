use std::sync::Arc;

use labelsight_domain::{Detection, LabelLayout, LsResult, PlacedLabel, ShapeI};
use tracing::{debug, info};

use crate::{
    cfg::AnnotateCfg,
    font::LabelFont,
    image_util,
    surface::{ImageSurface, Surface},
    time_scope,
    util::color_from_arr,
};

/// Draws detections onto images. One instance can be shared between threads, every call works on
/// its own canvas and its own list of placed labels.
#[derive(Debug, Clone)]
pub struct Annotator {
    cfg: AnnotateCfg,
    font: Option<Arc<LabelFont>>,
}

impl Annotator {
    /// Loads the configured font if labels are drawn.
    ///
    /// # Errors
    /// [`labelsight_domain::LsError::SurfaceUnavailable`] if labels are enabled but no font can
    /// be loaded.
    pub fn new(cfg: AnnotateCfg) -> LsResult<Self> {
        let font = if cfg.draw_labels {
            Some(Arc::new(LabelFont::load(
                cfg.font_path.as_deref(),
                cfg.font_size,
            )?))
        } else {
            None
        };
        Ok(Self { cfg, font })
    }

    pub fn with_font(cfg: AnnotateCfg, font: Option<Arc<LabelFont>>) -> Self {
        Self { cfg, font }
    }

    /// Strokes all boxes and places and renders their labels in input order. A detection with
    /// an empty label is drawn like one without label, it gets no placed label.
    ///
    /// # Errors
    /// If the width of a label cannot be measured. The surface may be partially drawn then.
    pub fn annotate_on<S: Surface>(
        &self,
        surface: &mut S,
        detections: &[Detection],
    ) -> LsResult<Vec<PlacedLabel>> {
        let box_color = color_from_arr(self.cfg.box_color);
        let label_color = color_from_arr(self.cfg.label_color);
        let mut layout = LabelLayout::new(surface.shape(), self.cfg.layout);
        for det in detections {
            surface.stroke_rect(&det.bb, self.cfg.stroke_width, box_color);
            let label = match det.label() {
                Some(label) if self.cfg.draw_labels && !label.is_empty() => label,
                _ => continue,
            };
            let text_width = surface.measure_text(label)?;
            let placed = layout.place(&det.bb, text_width);
            surface.fill_text(label, placed.x, placed.y, label_color);
        }
        debug!(
            "annotated {} detections with {} labels",
            detections.len(),
            layout.placed().len()
        );
        Ok(layout.into_placed())
    }

    /// Decodes `image_bytes`, draws `detections` and encodes the result as PNG of the same size.
    pub fn annotate(&self, image_bytes: &[u8], detections: &[Detection]) -> LsResult<Vec<u8>> {
        time_scope!("annotate");
        let im = image_util::decode(image_bytes)?;
        let shape = ShapeI::from_im(&im);
        let mut surface = ImageSurface::new(im.to_rgba8(), self.font.clone());
        let placed = self.annotate_on(&mut surface, detections)?;
        info!(
            "annotated image of size {}x{} with {} boxes and {} labels",
            shape.w,
            shape.h,
            detections.len(),
            placed.len()
        );
        surface.to_image_bytes()
    }
}

#[cfg(test)]
use {
    crate::{
        font::find_fallback_font,
        surface::{DrawOp, RecordingSurface},
        tracing_setup::init_tracing_for_tests,
    },
    image::{Rgba, RgbaImage},
    labelsight_domain::LsError,
};

#[cfg(test)]
fn det(x1: f64, y1: f64, x2: f64, y2: f64, label: &str) -> Detection {
    Detection::from_tlbr(x1, y1, x2, y2)
        .unwrap()
        .with_label(label)
}

#[cfg(test)]
fn annotator_without_font() -> Annotator {
    Annotator::with_font(AnnotateCfg::default(), None)
}

#[test]
fn test_near_identical_boxes() {
    init_tracing_for_tests();
    let mut s = RecordingSurface::new(ShapeI::new(200, 200));
    let dets = [det(10.0, 10.0, 50.0, 50.0, "A"), det(12.0, 12.0, 52.0, 52.0, "B")];
    let placed = annotator_without_font().annotate_on(&mut s, &dets).unwrap();
    assert_eq!(placed.len(), 2);
    assert_eq!((placed[0].x, placed[0].y), (10.0, 70.0));
    assert_eq!((placed[1].x, placed[1].y), (12.0, 92.0));
    assert_eq!(
        s.texts().collect::<Vec<_>>(),
        vec![("A", 10.0, 70.0), ("B", 12.0, 92.0)]
    );
}

#[test]
fn test_bottom_edge() {
    let mut s = RecordingSurface::new(ShapeI::new(100, 100));
    let placed = annotator_without_font()
        .annotate_on(&mut s, &[det(10.0, 85.0, 40.0, 98.0, "cup")])
        .unwrap();
    assert_eq!(placed[0].y, 75.0);
}

#[test]
fn test_right_edge() {
    let mut s = RecordingSurface::new(ShapeI::new(100, 100));
    // six characters of 10px each
    let placed = annotator_without_font()
        .annotate_on(&mut s, &[det(70.0, 10.0, 95.0, 30.0, "bottle")])
        .unwrap();
    assert_eq!((placed[0].x, placed[0].w), (30.0, 60.0));
}

#[test]
fn test_draw_order_and_colors() {
    let mut s = RecordingSurface::new(ShapeI::new(200, 200));
    let dets = [
        det(10.0, 10.0, 50.0, 50.0, "A"),
        Detection::from_tlbr(60.0, 60.0, 90.0, 90.0).unwrap(),
    ];
    annotator_without_font().annotate_on(&mut s, &dets).unwrap();
    let red = Rgba([255, 0, 0, 255]);
    let yellow = Rgba([255, 255, 0, 255]);
    assert_eq!(
        s.ops(),
        &[
            DrawOp::StrokeRect {
                bb: dets[0].bb,
                stroke_width: 2,
                color: red
            },
            DrawOp::FillText {
                text: "A".into(),
                x: 10.0,
                y: 70.0,
                color: yellow
            },
            DrawOp::StrokeRect {
                bb: dets[1].bb,
                stroke_width: 2,
                color: red
            },
        ]
    );
}

#[test]
fn test_box_only() {
    let cfg = AnnotateCfg {
        draw_labels: false,
        ..AnnotateCfg::default()
    };
    // no font is needed without labels
    let annotator = Annotator::new(cfg).unwrap();
    let mut s = RecordingSurface::new(ShapeI::new(100, 100)).failing_measurement();
    let placed = annotator
        .annotate_on(&mut s, &[det(1.0, 1.0, 5.0, 5.0, "x"), det(2.0, 2.0, 6.0, 6.0, "")])
        .unwrap();
    assert!(placed.is_empty());
    assert_eq!(s.strokes().count(), 2);
    assert_eq!(s.texts().count(), 0);
}

#[test]
fn test_empty_label_is_box_only() {
    let mut s = RecordingSurface::new(ShapeI::new(100, 100));
    let placed = annotator_without_font()
        .annotate_on(&mut s, &[det(1.0, 1.0, 5.0, 5.0, ""), det(2.0, 2.0, 6.0, 6.0, "x")])
        .unwrap();
    assert_eq!(placed.len(), 1);
    assert_eq!(s.strokes().count(), 2);
    assert_eq!(s.texts().map(|(t, _, _)| t).collect::<Vec<_>>(), vec!["x"]);
}

#[test]
fn test_measurement_error() {
    let mut s = RecordingSurface::new(ShapeI::new(100, 100)).failing_measurement();
    let err = annotator_without_font()
        .annotate_on(&mut s, &[det(1.0, 1.0, 5.0, 5.0, "x")])
        .unwrap_err();
    assert!(matches!(err, LsError::Measurement(_)));
}

#[test]
fn test_empty_detections() {
    let mut im = RgbaImage::new(7, 5);
    im.put_pixel(3, 2, Rgba([9, 8, 7, 255]));
    let bytes = image_util::encode_png(&im).unwrap();
    let mut s = RecordingSurface::new(ShapeI::new(7, 5));
    assert!(annotator_without_font().annotate_on(&mut s, &[]).unwrap().is_empty());
    assert!(s.ops().is_empty());
    let out = annotator_without_font().annotate(&bytes, &[]).unwrap();
    assert_eq!(image_util::decode(&out).unwrap().to_rgba8(), im);
}

#[test]
fn test_annotate_bytes() {
    init_tracing_for_tests();
    let im = RgbaImage::from_pixel(64, 48, Rgba([0, 0, 255, 255]));
    let bytes = image_util::encode_png(&im).unwrap();
    let box_only = annotator_without_font();
    let dets = [Detection::from_tlbr(8.0, 8.0, 32.0, 24.0).unwrap()];
    let out = box_only.annotate(&bytes, &dets).unwrap();
    let out = image_util::decode(&out).unwrap().to_rgba8();
    assert_eq!(out.dimensions(), (64, 48));
    assert_eq!(*out.get_pixel(8, 16), Rgba([255, 0, 0, 255]));
    assert_eq!(*out.get_pixel(20, 16), Rgba([0, 0, 255, 255]));
    // input is untouched
    assert_eq!(*im.get_pixel(8, 16), Rgba([0, 0, 255, 255]));
    let err = box_only.annotate(b"garbage", &dets).unwrap_err();
    assert!(matches!(err, LsError::Decode(_)));
}

#[test]
fn test_annotate_with_font() {
    let Some(font_path) = find_fallback_font() else {
        return;
    };
    let cfg = AnnotateCfg {
        font_path: Some(font_path),
        ..AnnotateCfg::default()
    };
    let annotator = Annotator::new(cfg).unwrap();
    let bytes = image_util::encode_png(&RgbaImage::new(120, 120)).unwrap();
    let dets = [det(10.0, 10.0, 50.0, 40.0, "Type: cup, Brand: acme")];
    let out = annotator.annotate(&bytes, &dets).unwrap();
    let out = image_util::decode(&out).unwrap().to_rgba8();
    let yellowish = out
        .pixels()
        .filter(|p| p.0[0] > 0 && p.0[1] > 0 && p.0[2] == 0)
        .count();
    assert!(yellowish > 0);
    // label band starts 20px below the box
    assert!(
        out.enumerate_pixels()
            .all(|(_, y, p)| p.0[1] == 0 || (60..80).contains(&y))
    );
}
