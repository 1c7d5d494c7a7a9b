mod bb;
mod core;
mod detection;
mod placement;
pub mod result;
pub use bb::{BbF, BB};
pub use crate::core::{max, Calc, Shape, ShapeF, ShapeI, TPtF, TPtI};
pub use detection::Detection;
pub use placement::{LabelLayout, LayoutParams, PlacedLabel};
pub use result::{to_ls, LsError, LsResult};
