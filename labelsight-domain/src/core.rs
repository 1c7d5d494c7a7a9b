use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    ops::{Add, Div, Mul, Sub},
};

pub type TPtF = f64;
pub type TPtI = u32;

pub trait Calc:
    Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Sized
    + PartialOrd
    + From<u32>
    + Clone
    + Copy
{
}
impl<T> Calc for T where
    T: Add<Output = Self>
        + Sub<Output = Self>
        + Mul<Output = Self>
        + Div<Output = Self>
        + Sized
        + PartialOrd
        + From<u32>
        + Clone
        + Copy
{
}

fn max_from_partial<T>(x1: &T, x2: &T) -> Ordering
where
    T: PartialOrd,
{
    match x1.partial_cmp(x2) {
        Some(o) => o,
        None => Ordering::Greater,
    }
}

pub fn max<T>(x1: T, x2: T) -> T
where
    T: PartialOrd,
{
    match max_from_partial(&x1, &x2) {
        Ordering::Less => x2,
        _ => x1,
    }
}

pub type ShapeI = Shape<TPtI>;
pub type ShapeF = Shape<TPtF>;

impl From<ShapeI> for ShapeF {
    fn from(value: ShapeI) -> Self {
        Self {
            w: f64::from(value.w),
            h: f64::from(value.h),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Shape<T>
where
    T: Calc,
{
    pub w: T,
    pub h: T,
}
impl<T> Shape<T>
where
    T: Calc,
{
    pub fn new(w: T, h: T) -> Self {
        Self { w, h }
    }
}

impl ShapeI {
    pub fn from_im<I>(im: &I) -> Self
    where
        I: GenericImageView,
    {
        Self {
            w: im.width(),
            h: im.height(),
        }
    }
}

#[test]
fn test_max() {
    assert_eq!(max(1.0, 2.0), 2.0);
    assert_eq!(max(3u32, 2u32), 3);
    // nan never wins a comparison against a number on the left
    assert_eq!(max(1.0, f64::NAN), 1.0);
}

#[test]
fn test_shape_from_im() {
    let im = image::RgbImage::new(13, 7);
    let shape = ShapeI::from_im(&im);
    assert_eq!(shape, ShapeI::new(13, 7));
    let shape_f: ShapeF = shape.into();
    assert_eq!(shape_f, ShapeF::new(13.0, 7.0));
}
