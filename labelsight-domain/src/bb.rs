use serde::{Deserialize, Serialize};

use crate::{
    core::{Calc, TPtF},
    lserr,
    result::LsResult,
};

pub type BbF = BB<TPtF>;

/// Axis aligned box with top-left corner `(x, y)`. For floating point boxes the right and
/// bottom edges are at `x + w` and `y + h`, like a canvas rectangle.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BB<T> {
    pub x: T,
    pub y: T,
    pub w: T,
    pub h: T,
}

impl<T> BB<T>
where
    T: Calc,
{
    /// `[x, y, w, h]`
    pub fn from_arr(a: &[T; 4]) -> Self {
        BB {
            x: a[0],
            y: a[1],
            w: a[2],
            h: a[3],
        }
    }

    /// Corners `(x1, y1)` and `(x2, y2)` as delivered by detectors. Requires `x1 < x2` and `y1 < y2`.
    pub fn from_tlbr(x1: T, y1: T, x2: T, y2: T) -> LsResult<Self> {
        if x1 < x2 && y1 < y2 {
            Ok(BB {
                x: x1,
                y: y1,
                w: x2 - x1,
                h: y2 - y1,
            })
        } else {
            Err(lserr!("box corners need x1 < x2 and y1 < y2"))
        }
    }

    /// Right edge.
    pub fn x2(&self) -> T {
        self.x + self.w
    }

    /// Bottom edge.
    pub fn y2(&self) -> T {
        self.y + self.h
    }

    /// Open-interval intersection test, touching edges do not count. `x_margin` widens `other`
    /// horizontally before testing.
    pub fn has_overlap_with_margin(&self, other: &Self, x_margin: T) -> bool {
        self.x < other.x2() + x_margin
            && self.x2() + x_margin > other.x
            && self.y < other.y2()
            && self.y2() > other.y
    }
}

#[test]
fn test_from_tlbr() {
    let bb = BbF::from_tlbr(10.0, 20.0, 40.0, 60.0).unwrap();
    assert_eq!(bb, BbF::from_arr(&[10.0, 20.0, 30.0, 40.0]));
    assert_eq!((bb.x2(), bb.y2()), (40.0, 60.0));
    assert!(BbF::from_tlbr(10.0, 20.0, 10.0, 60.0).is_err());
    assert!(BbF::from_tlbr(10.0, 60.0, 40.0, 20.0).is_err());
}

#[test]
fn test_has_overlap() {
    let bb1 = BbF::from_arr(&[5.0, 5.0, 10.0, 10.0]);
    let bb2 = BbF::from_arr(&[5.0, 5.0, 10.0, 10.0]);
    assert!(bb1.has_overlap_with_margin(&bb2, 0.0) && bb2.has_overlap_with_margin(&bb1, 0.0));
    let bb2 = BbF::from_arr(&[0.0, 0.0, 6.0, 6.0]);
    assert!(bb1.has_overlap_with_margin(&bb2, 0.0) && bb2.has_overlap_with_margin(&bb1, 0.0));
    let bb2 = BbF::from_arr(&[7.0, 7.0, 2.0, 2.0]);
    assert!(bb1.has_overlap_with_margin(&bb2, 0.0) && bb2.has_overlap_with_margin(&bb1, 0.0));
    // touching edges
    let bb2 = BbF::from_arr(&[15.0, 5.0, 10.0, 10.0]);
    assert!(!bb1.has_overlap_with_margin(&bb2, 0.0) && !bb2.has_overlap_with_margin(&bb1, 0.0));
    let bb2 = BbF::from_arr(&[5.0, 15.0, 10.0, 10.0]);
    assert!(!bb1.has_overlap_with_margin(&bb2, 0.0) && !bb2.has_overlap_with_margin(&bb1, 0.0));
    let bb2 = BbF::from_arr(&[17.0, 17.0, 112.0, 112.0]);
    assert!(!bb1.has_overlap_with_margin(&bb2, 0.0) && !bb2.has_overlap_with_margin(&bb1, 0.0));
}

#[test]
fn test_has_overlap_with_margin() {
    let placed = BbF::from_arr(&[10.0, 10.0, 20.0, 20.0]);
    // 5px gap to the right is within the 10px margin
    let right = BbF::from_arr(&[35.0, 10.0, 20.0, 20.0]);
    assert!(!right.has_overlap_with_margin(&placed, 0.0));
    assert!(right.has_overlap_with_margin(&placed, 10.0));
    // exactly 10px gap is free
    let right = BbF::from_arr(&[40.0, 10.0, 20.0, 20.0]);
    assert!(!right.has_overlap_with_margin(&placed, 10.0));
    // no vertical margin
    let below = BbF::from_arr(&[10.0, 30.0, 20.0, 20.0]);
    assert!(!below.has_overlap_with_margin(&placed, 10.0));
}
