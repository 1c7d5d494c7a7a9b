use crate::file_util::{self, DEFAULT_HOMEDIR};
use labelsight_domain::{lserr, to_ls, LayoutParams, LsResult};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

const CFG_DEFAULT: &str = r#"
    # home_folder = "/somewhere/.labelsight"
    # out_folder = "annotated"
    [prediction]
    base_url = "http://127.0.0.1:8000"
    [annotate]
    draw_labels = true
    font_size = 16.0
    stroke_width = 2
    box_color = [255, 0, 0]
    label_color = [255, 255, 0]
    # font_path = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
    [annotate.layout]
    text_height = 20.0
    below_offset = 20.0
    above_offset = 10.0
    edge_margin = 10.0
    overlap_margin = 10.0
    sweep_step = 20.0
    max_sweep_steps = 256
    [batch]
    n_threads = 2
    # timeout_ms = 30000
    "#;

pub fn get_default_cfg() -> Cfg {
    toml::from_str(CFG_DEFAULT).expect("default config broken")
}

pub fn get_cfg_path(homedir: &Path) -> PathBuf {
    homedir.join("ls_cfg.toml")
}

pub fn get_log_folder(homedir: &Path) -> PathBuf {
    homedir.join("logs")
}

pub fn read_cfg_gen<CFG: Debug + DeserializeOwned + Default>(
    cfg_toml_path: &Path,
) -> LsResult<CFG> {
    if cfg_toml_path.exists() {
        let toml_str = file_util::read_to_string(cfg_toml_path)?;
        toml::from_str(&toml_str).map_err(|e| lserr!("could not parse cfg due to {:?}", e))
    } else {
        warn!("cfg {cfg_toml_path:?} file does not exist. using default cfg");
        Ok(CFG::default())
    }
}

pub fn write_cfg(cfg: &Cfg, p: &Path) -> LsResult<()> {
    if let Some(cfg_parent) = p.parent() {
        fs::create_dir_all(cfg_parent).map_err(to_ls)?;
    }
    let cfg_str = toml::to_string_pretty(cfg).map_err(to_ls)?;
    file_util::write(p, cfg_str)?;
    info!("wrote cfg to {p:?}");
    Ok(())
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".into()
}

/// Where to find the detection service. The endpoint is `{base_url}/predict/`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PredictionCfg {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub authorization: Option<String>,
}
impl Default for PredictionCfg {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            authorization: None,
        }
    }
}

/// How boxes and labels are drawn. With `draw_labels = false` only the boxes are stroked.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AnnotateCfg {
    pub draw_labels: bool,
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    pub stroke_width: u32,
    pub box_color: [u8; 3],
    pub label_color: [u8; 3],
    pub layout: LayoutParams,
}
impl Default for AnnotateCfg {
    fn default() -> Self {
        Self {
            draw_labels: true,
            font_path: None,
            font_size: 16.0,
            stroke_width: 2,
            box_color: [255, 0, 0],
            label_color: [255, 255, 0],
            layout: LayoutParams::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BatchCfg {
    pub n_threads: usize,
    /// Images that take longer are reported as failed, the batch goes on.
    pub timeout_ms: Option<u64>,
}
impl Default for BatchCfg {
    fn default() -> Self {
        Self {
            n_threads: 2,
            timeout_ms: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct Cfg {
    pub home_folder: Option<String>,
    pub out_folder: Option<PathBuf>,
    #[serde(default)]
    pub prediction: PredictionCfg,
    #[serde(default)]
    pub annotate: AnnotateCfg,
    #[serde(default)]
    pub batch: BatchCfg,
}

impl Cfg {
    /// Reads `ls_cfg.toml` from the home folder, falls back to defaults if the file is missing.
    pub fn read(homedir: &Path) -> LsResult<Self> {
        let cfg_path = get_cfg_path(homedir);
        if cfg_path.exists() {
            read_cfg_gen::<Cfg>(&cfg_path)
        } else {
            info!("no cfg file found at {cfg_path:?}. using default cfg");
            Ok(get_default_cfg())
        }
    }
    pub fn read_default_home() -> LsResult<Self> {
        Self::read(&DEFAULT_HOMEDIR)
    }
    pub fn home_folder(&self) -> PathBuf {
        match &self.home_folder {
            Some(hf) => PathBuf::from(hf),
            None => DEFAULT_HOMEDIR.to_path_buf(),
        }
    }
    pub fn n_threads(&self) -> usize {
        self.batch.n_threads.max(1)
    }
}

#[cfg(test)]
use crate::{defer_folder_removal, file_util::DEFAULT_TMPDIR};

#[test]
fn test_default_cfg() {
    let cfg = get_default_cfg();
    assert_eq!(cfg.prediction, PredictionCfg::default());
    assert_eq!(cfg.annotate, AnnotateCfg::default());
    assert_eq!(cfg.batch, BatchCfg::default());
    assert_eq!(cfg.annotate.layout, LayoutParams::default());
    assert_eq!(cfg.n_threads(), 2);
}

#[test]
fn test_partial_cfg() {
    let cfg: Cfg = toml::from_str(
        r#"
        [annotate]
        draw_labels = false
        [annotate.layout]
        max_sweep_steps = 3
        "#,
    )
    .unwrap();
    assert!(!cfg.annotate.draw_labels);
    assert_eq!(cfg.annotate.font_size, 16.0);
    assert_eq!(cfg.annotate.layout.max_sweep_steps, 3);
    assert_eq!(cfg.annotate.layout.text_height, 20.0);
    assert_eq!(cfg.prediction.base_url, "http://127.0.0.1:8000");
}

#[test]
fn test_write_read_cfg() {
    let home = DEFAULT_TMPDIR.join("cfg_write_read_test");
    defer_folder_removal!(&home);
    let mut cfg = get_default_cfg();
    cfg.prediction.base_url = "http://10.10.1.124:8000".into();
    cfg.batch.timeout_ms = Some(500);
    write_cfg(&cfg, &get_cfg_path(&home)).unwrap();
    let read = Cfg::read(&home).unwrap();
    assert_eq!(read, cfg);
}

#[test]
fn test_missing_cfg() {
    let home = DEFAULT_TMPDIR.join("cfg_does_not_exist_test");
    let cfg = Cfg::read(&home).unwrap();
    assert_eq!(cfg, get_default_cfg());
    assert!(read_cfg_gen::<Cfg>(&get_cfg_path(&home)).is_ok());
}
