#![deny(clippy::all)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![forbid(unsafe_code)]

use clap::Parser;
use labelsight_domain::{LsResult, lserr};
use lslib::{
    Annotator, FixedDetections, OutputMode, Predict, RestPredictor,
    batch::{AnnotatedOutput, annotate_batch},
    cfg::{Cfg, get_cfg_path, read_cfg_gen},
    file_util::{self, DEFAULT_HOMEDIR},
    parse_predictions, tracing_setup,
    util::trace_ok_err,
};
use std::{ops::Deref, panic, path::PathBuf, process::ExitCode, sync::Arc};
use tracing::{error, info};

/// Sends images to an object detection service and draws the detected boxes with
/// non-overlapping labels onto copies of the images.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Image files or folders that are searched recursively for images
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Config file, defaults to ~/.labelsight/ls_cfg.toml
    #[arg(long)]
    cfg: Option<PathBuf>,
    /// Base url of the detection service, requests go to <URL>/predict/
    #[arg(short, long)]
    url: Option<String>,
    /// Response of the detection service stored as json, used instead of the service
    #[arg(short, long)]
    detections: Option<PathBuf>,
    /// Folder for the annotated images, defaults to the folder of each input image
    #[arg(short, long)]
    out_folder: Option<PathBuf>,
    /// Only draw boxes
    #[arg(long)]
    no_labels: bool,
    /// Print data URIs to stdout instead of writing files
    #[arg(long)]
    data_uri: bool,
    /// Only log errors to stderr
    #[arg(short, long)]
    quiet: bool,
}

fn read_cfg(cli: &Cli) -> LsResult<Cfg> {
    let mut cfg = match &cli.cfg {
        Some(p) => read_cfg_gen::<Cfg>(p)?,
        None => Cfg::read_default_home()?,
    };
    if let Some(url) = &cli.url {
        cfg.prediction.base_url.clone_from(url);
    }
    if cli.out_folder.is_some() {
        cfg.out_folder.clone_from(&cli.out_folder);
    }
    if cli.no_labels {
        cfg.annotate.draw_labels = false;
    }
    Ok(cfg)
}

fn run(cli: &Cli, cfg: Cfg) -> LsResult<bool> {
    info!(
        "using cfg from {:?}",
        cli.cfg.clone().unwrap_or_else(|| get_cfg_path(&DEFAULT_HOMEDIR))
    );
    let paths = file_util::collect_image_paths(&cli.inputs);
    if paths.is_empty() {
        return Err(lserr!("no images found in {:?}", cli.inputs));
    }
    let predictor: Arc<dyn Predict> = match &cli.detections {
        Some(json_path) => {
            if paths.len() > 1 {
                return Err(lserr!(
                    "detections from {json_path:?} can only be used for a single image, got {}",
                    paths.len()
                ));
            }
            let detections = parse_predictions(&file_util::read_to_string(json_path)?)?;
            Arc::new(FixedDetections(detections))
        }
        None => Arc::new(RestPredictor::new(
            cfg.prediction.base_url.clone(),
            cfg.prediction.authorization.as_deref(),
        )),
    };
    // a missing font stops the run before any image is touched
    let annotator = Arc::new(Annotator::new(cfg.annotate.clone())?);
    let output_mode = if cli.data_uri {
        OutputMode::DataUri
    } else {
        OutputMode::Files(cfg.out_folder.clone())
    };
    let report = annotate_batch(
        &paths,
        predictor,
        annotator,
        &output_mode,
        cfg.n_threads(),
        cfg.batch.timeout_ms,
    )?;
    for annotated in &report.annotated {
        if let AnnotatedOutput::DataUri(uri) = &annotated.output {
            println!("{uri}");
        }
    }
    for failed in &report.failed {
        error!("{:?}: {}", failed.src, failed.error);
    }
    Ok(report.is_success())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let cfg = read_cfg(&cli);
    let homedir = cfg
        .as_ref()
        .map(Cfg::home_folder)
        .unwrap_or_else(|_| DEFAULT_HOMEDIR.to_path_buf());
    let _guard_flush_to_logfile = tracing_setup::tracing_setup(&homedir, cli.quiet);
    match panic::catch_unwind(|| trace_ok_err(cfg.and_then(|cfg| run(&cli, cfg)))) {
        Ok(Some(true)) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            let panic_s = e
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| e.downcast_ref::<&'static str>().map(Deref::deref));
            error!("{:?}", panic_s);
            if let Some(b) = tracing_setup::BACKTRACE.with(|b| b.borrow_mut().take()) {
                error!("{:?}", b);
            }
            ExitCode::FAILURE
        }
    }
}
