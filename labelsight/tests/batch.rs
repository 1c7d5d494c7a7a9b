use std::{fs, path::Path, sync::Arc};

use image::{Rgba, RgbaImage};
use lslib::{
    batch::annotate_batch, cfg::AnnotateCfg, defer_folder_removal, file_util,
    file_util::DEFAULT_TMPDIR, image_util, parse_predictions, tracing_setup::init_tracing_for_tests,
    AnnotatedOutput, Annotator, FixedDetections, OutputMode,
};

const RESPONSE: &str = r#"{"predictions": [
    {"name": "cup", "brand": "acme", "box": {"x1": 10, "y1": 10, "x2": 50, "y2": 50}},
    {"name": "can", "brand": "fizz", "box": {"x1": 12, "y1": 12, "x2": 52, "y2": 52}}
]}"#;

fn write_png(p: &Path, w: u32, h: u32) {
    let im = RgbaImage::from_pixel(w, h, Rgba([0, 0, 255, 255]));
    file_util::write(p, image_util::encode_png(&im).unwrap()).unwrap();
}

#[test]
fn test_folder_to_annotated_files() {
    init_tracing_for_tests();
    let folder = DEFAULT_TMPDIR.join("integration_folder_test");
    defer_folder_removal!(&folder);
    let sub = folder.join("sub");
    fs::create_dir_all(&sub).unwrap();
    write_png(&folder.join("b.png"), 120, 90);
    write_png(&sub.join("a.png"), 64, 64);
    file_util::write(folder.join("notes.txt"), "no image").unwrap();
    // left over from an earlier run
    write_png(&folder.join("b_annotated.png"), 5, 5);

    let paths = file_util::collect_image_paths(&[folder.clone()]);
    assert_eq!(paths, vec![folder.join("b.png"), sub.join("a.png")]);

    let detections = parse_predictions(RESPONSE).unwrap();
    let cfg = AnnotateCfg {
        draw_labels: false,
        ..AnnotateCfg::default()
    };
    let report = annotate_batch(
        &paths,
        Arc::new(FixedDetections(detections)),
        Arc::new(Annotator::new(cfg).unwrap()),
        &OutputMode::Files(None),
        2,
        Some(10_000),
    )
    .unwrap();
    assert!(report.is_success());
    let outputs = report
        .annotated
        .iter()
        .map(|a| a.output.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        outputs,
        vec![
            AnnotatedOutput::File(folder.join("b_annotated.png")),
            AnnotatedOutput::File(sub.join("a_annotated.png")),
        ]
    );
    let b = image::open(folder.join("b_annotated.png")).unwrap().to_rgba8();
    assert_eq!(b.dimensions(), (120, 90));
    assert_eq!(*b.get_pixel(10, 30), Rgba([255, 0, 0, 255]));
    assert_eq!(*b.get_pixel(30, 30), Rgba([0, 0, 255, 255]));

    // a second run skips the annotated files
    assert_eq!(file_util::collect_image_paths(&[folder.clone()]).len(), 2);
}

#[test]
fn test_labels_rendered_with_system_font() {
    let Some(font_path) = lslib::font::find_fallback_font() else {
        return;
    };
    let folder = DEFAULT_TMPDIR.join("integration_font_test");
    defer_folder_removal!(&folder);
    fs::create_dir_all(&folder).unwrap();
    let src = folder.join("shelf.png");
    write_png(&src, 200, 200);
    let cfg = AnnotateCfg {
        font_path: Some(font_path),
        ..AnnotateCfg::default()
    };
    let report = annotate_batch(
        &[src.clone()],
        Arc::new(FixedDetections(parse_predictions(RESPONSE).unwrap())),
        Arc::new(Annotator::new(cfg).unwrap()),
        &OutputMode::DataUri,
        1,
        None,
    )
    .unwrap();
    let AnnotatedOutput::DataUri(uri) = &report.annotated[0].output else {
        panic!("expected a data uri");
    };
    assert!(uri.starts_with("data:image/png;base64,"));
    let im = image_util::decode(&image_util::from_data_uri(uri).unwrap())
        .unwrap()
        .to_rgba8();
    assert_eq!(im.dimensions(), (200, 200));
    // yellow text in the bands of both labels at y=70 and y=92
    let has_text_in = |y0: u32, y1: u32| {
        im.enumerate_pixels()
            .any(|(_, y, p)| (y0..y1).contains(&y) && p.0[1] > 100 && p.0[2] < 100)
    };
    assert!(has_text_in(70, 90));
    assert!(has_text_in(92, 112));
    assert!(!has_text_in(150, 200));
    // nothing but the source image is written in data uri mode
    assert_eq!(fs::read_dir(&folder).unwrap().count(), 1);
}
