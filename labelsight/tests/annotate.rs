use image::{Rgba, RgbaImage};
use lslib::{
    image_util, tracing_setup::init_tracing_for_tests, Annotator, BbF, Detection, PlacedLabel,
    RecordingSurface, ShapeI,
};

fn labelled(x1: f64, y1: f64, x2: f64, y2: f64, label: &str) -> Detection {
    Detection::from_tlbr(x1, y1, x2, y2)
        .unwrap()
        .with_label(label)
}

/// Deterministic boxes spread over a canvas of size `w`x`h` with labels of varying length.
fn pseudo_random_detections(n: usize, w: f64, h: f64) -> Vec<Detection> {
    let mut state = 12345u64;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) as f64 / (1u64 << 31) as f64
    };
    (0..n)
        .map(|i| {
            let x1 = next() * (w - 20.0);
            let y1 = next() * (h - 20.0);
            let x2 = x1 + 5.0 + next() * (w - x1 - 5.0);
            let y2 = y1 + 5.0 + next() * (h - y1 - 5.0);
            let label = "x".repeat(1 + i % 12);
            labelled(x1, y1, x2, y2, &label)
        })
        .collect()
}

fn assert_no_overlap(placed: &[PlacedLabel]) {
    for (i, a) in placed.iter().enumerate() {
        for b in &placed[i + 1..] {
            assert!(!a.has_overlap_with_margin(b, 10.0), "{a:?} overlaps {b:?}");
        }
    }
}

fn annotator() -> Annotator {
    Annotator::with_font(Default::default(), None)
}

#[test]
fn test_dense_detections() {
    init_tracing_for_tests();
    for (n, w, h) in [(5, 100, 100), (40, 300, 200), (120, 640, 480), (60, 50, 50)] {
        let dets = pseudo_random_detections(n, w as f64, h as f64);
        let mut s = RecordingSurface::new(ShapeI::new(w, h)).with_char_width(8.0);
        let placed = annotator().annotate_on(&mut s, &dets).unwrap();
        assert_eq!(placed.len(), n);
        assert_no_overlap(&placed);
        for p in &placed {
            assert!(p.x >= 0.0 && p.y >= 0.0, "{p:?}");
            assert_eq!(p.h, 20.0);
        }
        // widths that fit are kept inside on the right
        for (p, d) in placed.iter().zip(&dets) {
            if p.w + 20.0 <= w as f64 {
                assert!(p.x2() <= w as f64, "{p:?} of {d:?}");
            }
        }
    }
}

#[test]
fn test_deterministic() {
    let dets = pseudo_random_detections(50, 200.0, 200.0);
    let run = || {
        let mut s = RecordingSurface::new(ShapeI::new(200, 200));
        let placed = annotator().annotate_on(&mut s, &dets).unwrap();
        (placed, s.ops().to_vec())
    };
    assert_eq!(run(), run());
}

#[test]
fn test_first_detection_claims_space() {
    let a = labelled(10.0, 10.0, 50.0, 50.0, "A");
    let b = labelled(12.0, 12.0, 52.0, 52.0, "B");
    let mut s = RecordingSurface::new(ShapeI::new(200, 200));
    let ab = annotator().annotate_on(&mut s, &[a.clone(), b.clone()]).unwrap();
    let mut s = RecordingSurface::new(ShapeI::new(200, 200));
    let ba = annotator().annotate_on(&mut s, &[b, a]).unwrap();
    assert_eq!((ab[0].y, ab[1].y), (70.0, 92.0));
    // A is pushed twice, 70 and 90 both collide with B at 72
    assert_eq!((ba[0].y, ba[1].y), (72.0, 110.0));
}

#[test]
fn test_edges() {
    let mut s = RecordingSurface::new(ShapeI::new(100, 100));
    let placed = annotator()
        .annotate_on(
            &mut s,
            &[
                labelled(10.0, 85.0, 40.0, 98.0, "abc"),
                labelled(70.0, 10.0, 95.0, 30.0, "abcdef"),
            ],
        )
        .unwrap();
    assert_eq!(placed[0], BbF::from_arr(&[10.0, 75.0, 30.0, 20.0]));
    assert_eq!(placed[1], BbF::from_arr(&[30.0, 50.0, 60.0, 20.0]));
}

#[test]
fn test_dimensions_preserved() {
    for (w, h) in [(1, 1), (31, 7), (200, 120)] {
        let im = RgbaImage::from_pixel(w, h, Rgba([10, 20, 30, 255]));
        let bytes = image_util::encode_png(&im).unwrap();
        let dets = [
            Detection::from_tlbr(-10.0, -10.0, 500.0, 500.0).unwrap(),
            Detection::from_tlbr(0.0, 0.0, 1.0, 1.0).unwrap(),
        ];
        let out = annotator().annotate(&bytes, &dets).unwrap();
        let out = image_util::decode(&out).unwrap();
        assert_eq!((out.width(), out.height()), (w, h));
    }
}
