use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    bb::BbF,
    core::{max, ShapeF, ShapeI, TPtF},
};

/// Position and measured size of a rendered label. `(x, y)` is the top-left anchor the text is
/// rendered at.
pub type PlacedLabel = BbF;

/// Constants of the label layout in pixels of the source image.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct LayoutParams {
    /// Fixed height reserved for one line of text.
    pub text_height: TPtF,
    /// Distance from the bottom edge of the box to the preferred label position.
    pub below_offset: TPtF,
    /// Distance from the top edge of the box when the label is flipped above it.
    pub above_offset: TPtF,
    /// Distance to the canvas border when a label is pushed back into the canvas.
    pub edge_margin: TPtF,
    /// Horizontal padding between two labels. There is no vertical padding.
    pub overlap_margin: TPtF,
    /// Downward shift per step while resolving overlaps.
    pub sweep_step: TPtF,
    /// After this many steps the label is moved below every label it collides with.
    pub max_sweep_steps: usize,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            text_height: 20.0,
            below_offset: 20.0,
            above_offset: 10.0,
            edge_margin: 10.0,
            overlap_margin: 10.0,
            sweep_step: 20.0,
            max_sweep_steps: 256,
        }
    }
}

/// Greedy placement of labels next to their boxes for one canvas. Labels are placed in the
/// order of the calls to [`LabelLayout::place`], earlier labels keep their position.
#[derive(Debug, Clone)]
pub struct LabelLayout {
    shape: ShapeF,
    params: LayoutParams,
    placed: Vec<PlacedLabel>,
}

impl LabelLayout {
    pub fn new(shape: ShapeI, params: LayoutParams) -> Self {
        Self {
            shape: shape.into(),
            params,
            placed: vec![],
        }
    }

    pub fn placed(&self) -> &[PlacedLabel] {
        &self.placed
    }

    pub fn into_placed(self) -> Vec<PlacedLabel> {
        self.placed
    }

    /// Whether `candidate` collides with any label placed so far.
    pub fn is_overlapping(&self, candidate: &BbF) -> bool {
        self.placed
            .iter()
            .any(|other| candidate.has_overlap_with_margin(other, self.params.overlap_margin))
    }

    /// Preferred position below the box, flipped above it if it would leave the canvas at the
    /// bottom and shifted left if it would leave the canvas on the right. Negative coordinates
    /// are replaced by the edge margin.
    pub fn initial_candidate(&self, bb: &BbF, text_width: TPtF) -> BbF {
        let p = &self.params;
        let h = p.text_height;

        let mut y = bb.y2() + p.below_offset;
        if y + h > self.shape.h {
            y = bb.y - p.above_offset;
        }
        if y < 0.0 {
            y = p.edge_margin;
        }

        let mut x = bb.x;
        if x + text_width > self.shape.w {
            x = self.shape.w - text_width - p.edge_margin;
        }
        if x < 0.0 {
            x = p.edge_margin;
        }
        BbF {
            x,
            y,
            w: text_width,
            h,
        }
    }

    /// Lowest bottom edge among placed labels that share the horizontal band of `candidate`.
    fn lowest_conflict_bottom(&self, candidate: &BbF) -> Option<TPtF> {
        let margin = self.params.overlap_margin;
        self.placed
            .iter()
            .filter(|o| candidate.x < o.x2() + margin && candidate.x2() + margin > o.x)
            .map(|o| o.y2())
            .reduce(max)
    }

    /// Places the label of `bb` that is `text_width` wide and records it.
    pub fn place(&mut self, bb: &BbF, text_width: TPtF) -> PlacedLabel {
        let mut candidate = self.initial_candidate(bb, text_width);
        let mut n_steps = 0;
        while self.is_overlapping(&candidate) {
            if n_steps >= self.params.max_sweep_steps {
                if let Some(bottom) = self.lowest_conflict_bottom(&candidate) {
                    warn!(
                        "label sweep stopped after {n_steps} steps, moving label from y={} to y={bottom}",
                        candidate.y
                    );
                    candidate.y = max(candidate.y, bottom);
                }
                break;
            }
            candidate.y += self.params.sweep_step;
            n_steps += 1;
        }
        if n_steps > 0 {
            debug!("label of box {bb:?} moved down {n_steps} times to {candidate:?}");
        }
        self.placed.push(candidate);
        candidate
    }
}

#[cfg(test)]
fn bb(x1: f64, y1: f64, x2: f64, y2: f64) -> BbF {
    BbF::from_tlbr(x1, y1, x2, y2).unwrap()
}

#[cfg(test)]
fn place_all<'a>(
    shape: ShapeI,
    params: LayoutParams,
    boxes_with_widths: impl Iterator<Item = (&'a BbF, TPtF)>,
) -> Vec<PlacedLabel> {
    let mut layout = LabelLayout::new(shape, params);
    for (bb, w) in boxes_with_widths {
        layout.place(bb, w);
    }
    layout.into_placed()
}

#[cfg(test)]
fn assert_no_overlap(placed: &[PlacedLabel], margin: f64) {
    for (i, a) in placed.iter().enumerate() {
        for b in placed.iter().skip(i + 1) {
            assert!(
                !a.has_overlap_with_margin(b, margin) && !b.has_overlap_with_margin(a, margin),
                "{a:?} and {b:?} overlap"
            );
        }
    }
}

#[test]
fn test_default_below_box() {
    let mut layout = LabelLayout::new(ShapeI::new(200, 200), LayoutParams::default());
    let placed = layout.place(&bb(10.0, 10.0, 50.0, 50.0), 30.0);
    assert_eq!(placed, BbF::from_arr(&[10.0, 70.0, 30.0, 20.0]));
}

#[test]
fn test_near_identical_boxes() {
    let mut layout = LabelLayout::new(ShapeI::new(200, 200), LayoutParams::default());
    let a = layout.place(&bb(10.0, 10.0, 50.0, 50.0), 12.0);
    let b = layout.place(&bb(12.0, 12.0, 52.0, 52.0), 12.0);
    assert_eq!((a.x, a.y), (10.0, 70.0));
    // default of b is (12, 72), one step down clears a
    assert_eq!((b.x, b.y), (12.0, 92.0));
    assert!(b.y >= a.y2());
    assert_no_overlap(layout.placed(), 10.0);
}

#[test]
fn test_bottom_edge_flips_above() {
    let mut layout = LabelLayout::new(ShapeI::new(100, 100), LayoutParams::default());
    let placed = layout.place(&bb(10.0, 85.0, 40.0, 98.0), 10.0);
    assert_eq!(placed.y, 75.0);
    assert_eq!(placed.x, 10.0);
}

#[test]
fn test_flip_above_clamps_to_margin() {
    // box covers almost the whole height, above the box is negative
    let mut layout = LabelLayout::new(ShapeI::new(100, 100), LayoutParams::default());
    let placed = layout.place(&bb(10.0, 5.0, 40.0, 95.0), 10.0);
    assert_eq!(placed.y, 10.0);
}

#[test]
fn test_right_edge_shifts_left() {
    let mut layout = LabelLayout::new(ShapeI::new(100, 100), LayoutParams::default());
    let placed = layout.place(&bb(70.0, 10.0, 95.0, 30.0), 60.0);
    assert_eq!(placed.x, 30.0);
    assert_eq!(placed.y, 50.0);
    assert!(placed.x2() <= 100.0);
}

#[test]
fn test_too_wide_label_clamps_to_margin() {
    let mut layout = LabelLayout::new(ShapeI::new(100, 100), LayoutParams::default());
    let placed = layout.place(&bb(70.0, 10.0, 95.0, 30.0), 120.0);
    assert_eq!(placed.x, 10.0);
}

#[test]
fn test_negative_box_is_clamped() {
    let mut layout = LabelLayout::new(ShapeI::new(100, 100), LayoutParams::default());
    let placed = layout.place(&bb(-30.0, -60.0, 10.0, -45.0), 20.0);
    assert_eq!((placed.x, placed.y), (10.0, 10.0));
}

#[test]
fn test_side_by_side_labels_respect_margin() {
    let mut layout = LabelLayout::new(ShapeI::new(300, 300), LayoutParams::default());
    let a = layout.place(&bb(10.0, 10.0, 50.0, 50.0), 40.0);
    // 5px gap to label a is within the margin
    let b = layout.place(&bb(55.0, 10.0, 95.0, 50.0), 40.0);
    // 10px gap is enough
    let c = layout.place(&bb(150.0, 10.0, 190.0, 50.0), 40.0);
    let d = layout.place(&bb(200.0, 10.0, 240.0, 50.0), 40.0);
    assert_eq!(a.y, 70.0);
    assert_eq!(b.y, 90.0);
    assert_eq!(c.y, 70.0);
    assert_eq!(d.y, 70.0);
}

#[test]
fn test_dense_cluster_no_overlap() {
    let shape = ShapeI::new(120, 120);
    let boxes = (0..40)
        .map(|i| {
            let off = f64::from(i % 7);
            bb(50.0 + off, 80.0 + off, 70.0 + off, 100.0 + off)
        })
        .collect::<Vec<_>>();
    let widths = (0..40).map(|i| 15.0 + f64::from(i % 5) * 7.0);
    let placed = place_all(shape, LayoutParams::default(), boxes.iter().zip(widths));
    assert_eq!(placed.len(), boxes.len());
    assert_no_overlap(&placed, 10.0);
    for p in &placed {
        assert!(p.x >= 0.0 && p.y >= 0.0);
    }
}

#[test]
fn test_sweep_cap_keeps_invariant() {
    let params = LayoutParams {
        max_sweep_steps: 2,
        ..LayoutParams::default()
    };
    let shape = ShapeI::new(100, 100);
    let boxes = vec![bb(10.0, 10.0, 30.0, 30.0); 10];
    let placed = place_all(shape, params, boxes.iter().map(|b| (b, 25.0)));
    assert_no_overlap(&placed, 10.0);
    assert_eq!(placed[0].y, 50.0);
    assert_eq!(placed[1].y, 70.0);
    assert_eq!(placed[2].y, 90.0);
    // cap reached, jumps below the lowest conflicting label
    assert_eq!(placed[3].y, 110.0);
    assert_eq!(placed[4].y, 130.0);
}

#[test]
fn test_zero_step_terminates() {
    let params = LayoutParams {
        sweep_step: 0.0,
        max_sweep_steps: 5,
        ..LayoutParams::default()
    };
    let shape = ShapeI::new(100, 100);
    let boxes = vec![bb(10.0, 10.0, 30.0, 30.0); 3];
    let placed = place_all(shape, params, boxes.iter().map(|b| (b, 25.0)));
    assert_no_overlap(&placed, 10.0);
    assert_eq!(placed[1].y, placed[0].y2());
}

#[test]
fn test_deterministic() {
    let shape = ShapeI::new(64, 64);
    let boxes = (0..12)
        .map(|i| {
            let v = f64::from(i * 5 % 40);
            bb(v, v / 2.0, v + 10.0, v / 2.0 + 10.0)
        })
        .collect::<Vec<_>>();
    let run = || {
        place_all(
            shape,
            LayoutParams::default(),
            boxes.iter().map(|b| (b, 20.0)),
        )
    };
    assert_eq!(run(), run());
}
