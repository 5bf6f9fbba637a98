//! Writes the frozen asset set to the output directory

use std::{
    fs,
    io,
    path::{Component, Path, PathBuf},
};

use log::{debug, warn};
use serde::Serialize;

use crate::{
    assets::{Asset, FrozenAssets},
    error::{BundleError, Result},
};

/// One file written by the build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenAsset {
    pub name: String,
    pub path: PathBuf,
    pub size: usize,
}

/// Create `dir` if needed and write one file per asset, in collection order
///
/// Asset names may contain `/` to place files in subdirectories but must stay
/// inside `dir`. Every name is checked before anything touches the disk, and
/// files written before a failing write are removed again.
pub fn write_assets(dir: &Path, assets: &FrozenAssets) -> Result<Vec<WrittenAsset>> {
    let targets = assets
        .iter()
        .map(|(name, asset)| asset_path(dir, name).map(|path| (name, asset, path)))
        .collect::<Result<Vec<_>>>()?;

    fs::create_dir_all(dir).map_err(|e| BundleError::io(dir, e))?;

    let mut written = Vec::with_capacity(targets.len());
    for (name, asset, path) in targets {
        match write_one(&path, asset) {
            Ok(size) => written.push(WrittenAsset {
                name: name.to_owned(),
                path,
                size,
            }),
            Err(err) => {
                discard(&written);
                return Err(err);
            }
        }
    }
    Ok(written)
}

fn write_one(path: &Path, asset: &Asset) -> Result<usize> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BundleError::io(parent, e))?;
    }
    let content = asset.content();
    fs::write(path, &content).map_err(|e| BundleError::io(path, e))?;
    debug!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(content.len())
}

fn discard(written: &[WrittenAsset]) {
    for asset in written {
        if let Err(e) = fs::remove_file(&asset.path) {
            warn!("Failed to remove partial output {}: {e}", asset.path.display());
        }
    }
}

fn asset_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    let escapes = relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if name.is_empty() || escapes {
        return Err(BundleError::io(
            dir.join(name),
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("asset name `{name}` must be a relative path inside the output directory"),
            ),
        ));
    }
    Ok(dir.join(relative))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::assets::AssetCollection;

    #[test]
    fn test_writes_every_asset_and_creates_directory() -> Result<()> {
        let temp = TempDir::new().map_err(|e| BundleError::io("tempdir", e))?;
        let out = temp.path().join("dist/nested");

        let mut assets = AssetCollection::new();
        assets.insert("bundle.js", Asset::from_string("console.log(1);"));
        assets.insert("css/app.css", Asset::from_string("body{}"));
        let written = write_assets(&out, &assets.freeze())?;

        assert_eq!(
            written.iter().map(|w| w.name.as_str()).collect::<Vec<_>>(),
            vec!["bundle.js", "css/app.css"]
        );
        assert_eq!(written[0].size, "console.log(1);".len());
        assert_eq!(
            fs::read_to_string(out.join("bundle.js")).map_err(|e| BundleError::io(&out, e))?,
            "console.log(1);"
        );
        assert!(out.join("css/app.css").is_file());
        Ok(())
    }

    #[test]
    fn test_rejects_names_escaping_output_directory() {
        let temp = TempDir::new().expect("tempdir");
        let mut assets = AssetCollection::new();
        assets.insert("../outside.js", Asset::from_string(""));

        let err = write_assets(temp.path(), &assets.freeze()).expect_err("escaping name");
        assert_eq!(err.kind(), "IOError");
        assert!(!temp.path().join("../outside.js").exists());
    }

    #[test]
    fn test_invalid_name_is_rejected_before_anything_is_written() {
        let temp = TempDir::new().expect("tempdir");
        let out = temp.path().join("dist");
        let mut assets = AssetCollection::new();
        assets.insert("bundle.js", Asset::from_string("console.log(1);"));
        assets.insert("../escape.js", Asset::from_string(""));

        let err = write_assets(&out, &assets.freeze()).expect_err("escaping name");
        assert_eq!(err.kind(), "IOError");
        assert!(!out.exists());
    }

    #[test]
    fn test_failed_write_removes_earlier_files() {
        let temp = TempDir::new().expect("tempdir");
        let out = temp.path().join("dist");
        fs::create_dir_all(&out).expect("mkdir");
        // `sub` is a file, so `sub/late.js` cannot be created
        fs::write(out.join("sub"), "").expect("write blocker");

        let mut assets = AssetCollection::new();
        assets.insert("bundle.js", Asset::from_string("console.log(1);"));
        assets.insert("sub/late.js", Asset::from_string(""));

        let err = write_assets(&out, &assets.freeze()).expect_err("blocked write");
        assert_eq!(err.kind(), "IOError");
        assert!(!out.join("bundle.js").exists());
    }

    #[test]
    fn test_unwritable_directory_is_io_error() {
        let temp = TempDir::new().expect("tempdir");
        let blocker = temp.path().join("file");
        fs::write(&blocker, "not a directory").expect("write blocker");

        let err = write_assets(&blocker.join("dist"), &AssetCollection::new().freeze())
            .expect_err("parent is a file");
        assert_eq!(err.kind(), "IOError");
        assert!(err.to_string().contains("dist"));
    }
}
