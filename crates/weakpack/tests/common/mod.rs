#![allow(dead_code, clippy::print_stderr)]

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use tempfile::TempDir;
use weakpack::BundleOptions;

/// A throwaway project directory with source files
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn dist(&self) -> PathBuf {
        self.path().join("dist")
    }

    /// Options building `./src/index.js` into `dist/bundle.js`
    pub fn options(&self) -> BundleOptions {
        let mut options = BundleOptions::new("./src/index.js");
        options.context = self.path().to_path_buf();
        options.output.path = self.dist();
        options
    }

    pub fn read_output(&self, name: &str) -> String {
        fs::read_to_string(self.dist().join(name)).unwrap()
    }
}

/// Run `script` with node and return its stdout, or `None` when node is not
/// installed
pub fn run_node(script: &Path) -> Option<String> {
    let available = Command::new("node")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success());
    if !available {
        eprintln!("node not found on PATH, skipping runtime check");
        return None;
    }

    let output = Command::new("node").arg(script).output().unwrap();
    assert!(
        output.status.success(),
        "bundle failed under node:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    Some(String::from_utf8(output.stdout).unwrap())
}
