use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use labelsight_domain::{LsError, LsResult, to_ls};
use tracing::{error, info, warn};

use crate::{
    annotator::Annotator,
    file_util,
    image_util,
    prediction::Predict,
    threadpool::ThreadPool,
};

/// Where the annotated PNGs go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// `<stem>_annotated.png` next to the source or in the given folder.
    Files(Option<PathBuf>),
    DataUri,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotatedOutput {
    File(PathBuf),
    DataUri(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedImage {
    pub src: PathBuf,
    pub n_detections: usize,
    pub output: AnnotatedOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedImage {
    pub src: PathBuf,
    pub error: LsError,
}

/// Outcome of a batch in input order. Each image is either in `annotated` or in `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub annotated: Vec<AnnotatedImage>,
    pub failed: Vec<FailedImage>,
}

impl BatchReport {
    pub fn n_images(&self) -> usize {
        self.annotated.len() + self.failed.len()
    }
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Reads, predicts, annotates and stores one image.
pub fn annotate_file(
    src: &Path,
    predictor: &dyn Predict,
    annotator: &Annotator,
    output_mode: &OutputMode,
) -> LsResult<AnnotatedImage> {
    let image_bytes = file_util::read(src)?;
    let file_name = file_util::to_name_str(src)?;
    let detections = predictor.predict(&image_bytes, file_name)?;
    let png = annotator.annotate(&image_bytes, &detections)?;
    let output = match output_mode {
        OutputMode::Files(out_folder) => {
            let dst = file_util::annotated_path(src, out_folder.as_deref())?;
            if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(to_ls)?;
            }
            file_util::write(&dst, png)?;
            info!("wrote {dst:?}");
            AnnotatedOutput::File(dst)
        }
        OutputMode::DataUri => AnnotatedOutput::DataUri(image_util::to_data_uri(&png)),
    };
    Ok(AnnotatedImage {
        src: src.to_path_buf(),
        n_detections: detections.len(),
        output,
    })
}

/// Annotates all `paths` on `n_threads` workers. A failing or panicking image is logged and
/// reported, the remaining images are processed anyway. With `timeout_ms`, an image that is still
/// being processed `timeout_ms` after a worker picked it up counts as failed.
pub fn annotate_batch(
    paths: &[PathBuf],
    predictor: Arc<dyn Predict>,
    annotator: Arc<Annotator>,
    output_mode: &OutputMode,
    n_threads: usize,
    timeout_ms: Option<u64>,
) -> LsResult<BatchReport> {
    let mut tp = ThreadPool::<LsResult<AnnotatedImage>>::new(n_threads).with_timeout(timeout_ms);
    info!(
        "annotating {} images on {} threads",
        paths.len(),
        tp.n_threads()
    );
    let mut job_ids = Vec::with_capacity(paths.len());
    for src in paths {
        let src = src.clone();
        let predictor = predictor.clone();
        let annotator = annotator.clone();
        let output_mode = output_mode.clone();
        let job_id = tp.apply(Box::new(move || {
            annotate_file(&src, predictor.as_ref(), &annotator, &output_mode)
        }))?;
        job_ids.push(job_id);
    }
    let mut report = BatchReport::default();
    for (src, job_id) in paths.iter().zip(job_ids) {
        let res = tp
            .poll(job_id)
            .unwrap_or_else(|| {
                Err(LsError::new(&format!(
                    "timed out after {}ms",
                    timeout_ms.unwrap_or_default()
                )))
            })
            .and_then(|annotated| annotated);
        match res {
            Ok(annotated) => report.annotated.push(annotated),
            Err(e) if e.is_fatal_for_run() => return Err(e),
            Err(e) => {
                error!("failed to annotate {src:?}, {e}");
                report.failed.push(FailedImage {
                    src: src.clone(),
                    error: e,
                });
            }
        }
    }
    if report.is_success() {
        info!("annotated all {} images", report.n_images());
    } else {
        warn!(
            "annotated {} of {} images",
            report.annotated.len(),
            report.n_images()
        );
    }
    Ok(report)
}

#[cfg(test)]
use {
    crate::{
        cfg::AnnotateCfg, defer_folder_removal, file_util::DEFAULT_TMPDIR,
        prediction::FixedDetections, tracing_setup::init_tracing_for_tests,
    },
    image::{Rgba, RgbaImage},
    labelsight_domain::Detection,
    std::{thread, time::Duration},
};

#[cfg(test)]
fn box_only_annotator() -> Arc<Annotator> {
    let cfg = AnnotateCfg {
        draw_labels: false,
        ..AnnotateCfg::default()
    };
    Arc::new(Annotator::with_font(cfg, None))
}

#[cfg(test)]
fn write_test_image(path: &Path, w: u32, h: u32) {
    let im = RgbaImage::from_pixel(w, h, Rgba([0, 255, 0, 255]));
    file_util::write(path, image_util::encode_png(&im).unwrap()).unwrap();
}

#[test]
fn test_batch_isolates_failures() {
    init_tracing_for_tests();
    let folder = DEFAULT_TMPDIR.join("batch_isolates_failures_test");
    defer_folder_removal!(&folder);
    fs::create_dir_all(&folder).unwrap();
    let good = folder.join("good.png");
    let broken = folder.join("broken.png");
    let missing = folder.join("missing.png");
    write_test_image(&good, 40, 30);
    file_util::write(&broken, "not a png").unwrap();
    let predictor = Arc::new(FixedDetections(vec![
        Detection::from_tlbr(5.0, 5.0, 20.0, 20.0).unwrap(),
    ]));
    let out_folder = folder.join("out");
    let report = annotate_batch(
        &[broken.clone(), good.clone(), missing.clone()],
        predictor,
        box_only_annotator(),
        &OutputMode::Files(Some(out_folder.clone())),
        2,
        None,
    )
    .unwrap();
    assert_eq!(report.n_images(), 3);
    assert_eq!(report.annotated.len(), 1);
    let dst = out_folder.join("good_annotated.png");
    assert_eq!(report.annotated[0].output, AnnotatedOutput::File(dst.clone()));
    assert_eq!(report.annotated[0].n_detections, 1);
    let out = image::open(&dst).unwrap();
    assert_eq!((out.width(), out.height()), (40, 30));
    assert_eq!(report.failed[0].src, broken);
    assert!(matches!(report.failed[0].error, LsError::Decode(_)));
    assert_eq!(report.failed[1].src, missing);
}

#[test]
fn test_batch_data_uri() {
    let folder = DEFAULT_TMPDIR.join("batch_data_uri_test");
    defer_folder_removal!(&folder);
    fs::create_dir_all(&folder).unwrap();
    let paths = (0..5)
        .map(|i| {
            let p = folder.join(format!("im{i}.png"));
            write_test_image(&p, 10 + i, 10);
            p
        })
        .collect::<Vec<_>>();
    let report = annotate_batch(
        &paths,
        Arc::new(FixedDetections::default()),
        box_only_annotator(),
        &OutputMode::DataUri,
        3,
        None,
    )
    .unwrap();
    assert!(report.is_success());
    for (i, (annotated, src)) in report.annotated.iter().zip(&paths).enumerate() {
        assert_eq!(&annotated.src, src);
        let AnnotatedOutput::DataUri(uri) = &annotated.output else {
            panic!("expected data uri");
        };
        let im = image_util::decode(&image_util::from_data_uri(uri).unwrap()).unwrap();
        assert_eq!(im.width(), 10 + i as u32);
    }
}

#[cfg(test)]
struct SlowPredictor;
#[cfg(test)]
impl Predict for SlowPredictor {
    fn predict(&self, _: &[u8], file_name: &str) -> LsResult<Vec<Detection>> {
        if file_name.starts_with("slow") {
            thread::sleep(Duration::from_millis(1000));
        }
        Ok(vec![])
    }
}

#[test]
fn test_batch_timeout() {
    let folder = DEFAULT_TMPDIR.join("batch_timeout_test");
    defer_folder_removal!(&folder);
    fs::create_dir_all(&folder).unwrap();
    let slow = folder.join("slow.png");
    let fast = folder.join("fast.png");
    write_test_image(&slow, 4, 4);
    write_test_image(&fast, 4, 4);
    let report = annotate_batch(
        &[slow.clone(), fast.clone()],
        Arc::new(SlowPredictor),
        box_only_annotator(),
        &OutputMode::DataUri,
        2,
        Some(100),
    )
    .unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].src, slow);
    assert_eq!(report.annotated[0].src, fast);
}

#[test]
fn test_batch_timeout_more_images_than_threads() {
    let folder = DEFAULT_TMPDIR.join("batch_timeout_single_thread_test");
    defer_folder_removal!(&folder);
    fs::create_dir_all(&folder).unwrap();
    let paths = ["slow.png", "fast_1.png", "fast_2.png"].map(|name| {
        let p = folder.join(name);
        write_test_image(&p, 4, 4);
        p
    });
    let report = annotate_batch(
        &paths,
        Arc::new(SlowPredictor),
        box_only_annotator(),
        &OutputMode::DataUri,
        1,
        Some(100),
    )
    .unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].src, paths[0]);
    assert!(report.failed[0].error.msg().contains("timed out"));
    let annotated = report.annotated.iter().map(|a| &a.src).collect::<Vec<_>>();
    assert_eq!(annotated, vec![&paths[1], &paths[2]]);
}

#[cfg(test)]
struct PanickingPredictor;
#[cfg(test)]
impl Predict for PanickingPredictor {
    fn predict(&self, _: &[u8], file_name: &str) -> LsResult<Vec<Detection>> {
        if file_name.starts_with("panic") {
            panic!("predictor panicked on {file_name}");
        }
        Ok(vec![])
    }
}

#[test]
fn test_batch_survives_panicking_job() {
    init_tracing_for_tests();
    let folder = DEFAULT_TMPDIR.join("batch_panic_test");
    defer_folder_removal!(&folder);
    fs::create_dir_all(&folder).unwrap();
    let panicking = folder.join("panic.png");
    let fine = folder.join("fine.png");
    write_test_image(&panicking, 4, 4);
    write_test_image(&fine, 4, 4);
    let report = annotate_batch(
        &[panicking.clone(), fine.clone()],
        Arc::new(PanickingPredictor),
        box_only_annotator(),
        &OutputMode::DataUri,
        1,
        None,
    )
    .unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].src, panicking);
    assert!(report.failed[0].error.msg().contains("predictor panicked"));
    assert_eq!(report.annotated[0].src, fine);
}

#[test]
fn test_batch_box_far_outside_image() {
    let folder = DEFAULT_TMPDIR.join("batch_far_outside_test");
    defer_folder_removal!(&folder);
    fs::create_dir_all(&folder).unwrap();
    let p = folder.join("a.png");
    write_test_image(&p, 40, 40);
    let predictor = Arc::new(FixedDetections(vec![
        Detection::from_tlbr(5.0, 5.0, 3e9, 20.0)
            .unwrap()
            .with_label("far"),
        Detection::from_tlbr(-3e9, -3e9, 3e9, 3e9).unwrap(),
    ]));
    let report = annotate_batch(
        &[p.clone()],
        predictor,
        box_only_annotator(),
        &OutputMode::DataUri,
        1,
        None,
    )
    .unwrap();
    assert!(report.is_success());
    let AnnotatedOutput::DataUri(uri) = &report.annotated[0].output else {
        panic!("expected data uri");
    };
    let im = image_util::decode(&image_util::from_data_uri(uri).unwrap())
        .unwrap()
        .to_rgba8();
    assert_eq!(im.dimensions(), (40, 40));
    assert_eq!(*im.get_pixel(5, 10), Rgba([255, 0, 0, 255]));
}

#[cfg(test)]
struct NoSurfacePredictor;
#[cfg(test)]
impl Predict for NoSurfacePredictor {
    fn predict(&self, _: &[u8], _: &str) -> LsResult<Vec<Detection>> {
        Err(LsError::SurfaceUnavailable("no font".into()))
    }
}

#[test]
fn test_batch_aborts_on_environment_error() {
    let folder = DEFAULT_TMPDIR.join("batch_abort_test");
    defer_folder_removal!(&folder);
    fs::create_dir_all(&folder).unwrap();
    let p = folder.join("a.png");
    write_test_image(&p, 4, 4);
    let res = annotate_batch(
        &[p],
        Arc::new(NoSurfacePredictor),
        box_only_annotator(),
        &OutputMode::DataUri,
        1,
        None,
    );
    assert!(matches!(res, Err(LsError::SurfaceUnavailable(_))));
}
