pub mod annotator;
pub mod batch;
pub mod cfg;
pub mod file_util;
pub mod font;
pub mod image_util;
pub mod prediction;
pub mod surface;
pub mod threadpool;
pub mod tracing_setup;
pub mod util;
pub use annotator::Annotator;
pub use batch::{AnnotatedImage, AnnotatedOutput, BatchReport, FailedImage, OutputMode};
pub use labelsight_domain::{
    BbF, Detection, LabelLayout, LayoutParams, LsError, LsResult, PlacedLabel, ShapeI,
};
pub use prediction::{parse_predictions, FixedDetections, Predict, RestPredictor};
pub use surface::{DrawOp, ImageSurface, RecordingSurface, Surface};
