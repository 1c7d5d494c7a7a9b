use labelsight_domain::{lserr, LsResult};
use lazy_static::lazy_static;
use std::{
    ffi::OsStr,
    fmt::Debug,
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{error, info};
use walkdir::WalkDir;

lazy_static! {
    pub static ref DEFAULT_TMPDIR: PathBuf = std::env::temp_dir().join("labelsight");
}
lazy_static! {
    pub static ref DEFAULT_HOMEDIR: PathBuf = match dirs::home_dir() {
        Some(p) => p.join(".labelsight"),
        _ => std::env::temp_dir().join("labelsight"),
    };
}

pub const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "bmp", "gif", "webp", "tif", "tiff"];
pub const ANNOTATED_SUFFIX: &str = "_annotated";

pub fn read_to_string<P>(p: P) -> LsResult<String>
where
    P: AsRef<Path> + Debug,
{
    fs::read_to_string(&p).map_err(|e| lserr!("could not read {:?} due to {:?}", p, e))
}

pub fn read<P>(p: P) -> LsResult<Vec<u8>>
where
    P: AsRef<Path> + Debug,
{
    fs::read(&p).map_err(|e| lserr!("could not read {:?} due to {:?}", p, e))
}

pub fn write<P, C>(path: P, contents: C) -> LsResult<()>
where
    P: AsRef<Path> + Debug,
    C: AsRef<[u8]>,
{
    fs::write(&path, contents).map_err(|e| lserr!("could not write to {:?} since {:?}", path, e))
}

pub fn osstr_to_str(p: Option<&OsStr>) -> io::Result<&str> {
    p.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{p:?} not found")))?
        .to_str()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{p:?} not convertible to unicode"),
            )
        })
}

pub fn to_stem_str(p: &Path) -> LsResult<&str> {
    osstr_to_str(p.file_stem())
        .map_err(|e| lserr!("to_stem_str could not transform '{:?}' due to '{:?}'", p, e))
}

pub fn to_name_str(p: &Path) -> LsResult<&str> {
    osstr_to_str(p.file_name())
        .map_err(|e| lserr!("to_name_str could not transform '{:?}' due to '{:?}'", p, e))
}

pub fn is_image_file(p: &Path) -> bool {
    p.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Files are taken as they are, folders are searched recursively for images. Results of earlier
/// runs, i.e., files whose stem ends with [`ANNOTATED_SUFFIX`], are skipped. The order is the
/// order of `inputs` and, within a folder, sorted by path.
pub fn collect_image_paths(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = vec![];
    for input in inputs {
        if input.is_dir() {
            let mut in_folder = WalkDir::new(input)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry.into_path()),
                    Err(e) => {
                        error!("could not read entry in {input:?}, {e:?}");
                        None
                    }
                })
                .filter(|p| p.is_file() && is_image_file(p))
                .filter(|p| {
                    !to_stem_str(p)
                        .map(|stem| stem.ends_with(ANNOTATED_SUFFIX))
                        .unwrap_or(false)
                })
                .collect::<Vec<_>>();
            in_folder.sort();
            info!("found {} images in {input:?}", in_folder.len());
            paths.extend(in_folder);
        } else {
            paths.push(input.clone());
        }
    }
    paths
}

/// `some/folder/img.jpg` becomes `out_folder/img_annotated.png`.
pub fn annotated_path(src: &Path, out_folder: Option<&Path>) -> LsResult<PathBuf> {
    let stem = to_stem_str(src)?;
    let fname = format!("{stem}{ANNOTATED_SUFFIX}.png");
    Ok(match out_folder {
        Some(folder) => folder.join(fname),
        None => src
            .parent()
            .map(|parent| parent.join(&fname))
            .unwrap_or_else(|| PathBuf::from(&fname)),
    })
}

pub fn checked_remove<'a, P: AsRef<Path> + Debug>(
    path: &'a P,
    func: fn(p: &'a P) -> io::Result<()>,
) {
    match func(path) {
        Ok(_) => info!("removed {path:?}"),
        Err(e) => error!("could not remove {path:?} due to {e:?}"),
    }
}
#[macro_export]
macro_rules! defer_folder_removal {
    ($path:expr) => {
        let func = || $crate::file_util::checked_remove($path, std::fs::remove_dir_all);
        $crate::defer!(func);
    };
}

#[test]
fn test_annotated_path() {
    let p = annotated_path(Path::new("a/b/img.jpg"), None).unwrap();
    assert_eq!(p, PathBuf::from("a/b/img_annotated.png"));
    let p = annotated_path(Path::new("img.jpeg"), Some(Path::new("out"))).unwrap();
    assert_eq!(p, PathBuf::from("out/img_annotated.png"));
}

#[test]
fn test_is_image_file() {
    assert!(is_image_file(Path::new("x/y.PNG")));
    assert!(is_image_file(Path::new("y.jpeg")));
    assert!(!is_image_file(Path::new("y.json")));
    assert!(!is_image_file(Path::new("noext")));
}

#[test]
fn test_collect_image_paths() {
    let folder = DEFAULT_TMPDIR.join("collect_image_paths_test");
    let sub = folder.join("sub");
    fs::create_dir_all(&sub).unwrap();
    defer_folder_removal!(&folder);
    for name in ["b.png", "a.jpg", "notes.txt", "a_annotated.png"] {
        fs::write(folder.join(name), b"x").unwrap();
    }
    fs::write(sub.join("c.bmp"), b"x").unwrap();
    let single = PathBuf::from("single.png");
    let paths = collect_image_paths(&[single.clone(), folder.clone()]);
    assert_eq!(
        paths,
        vec![
            single,
            folder.join("a.jpg"),
            folder.join("b.png"),
            sub.join("c.bmp")
        ]
    );
}
